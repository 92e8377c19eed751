use crate::error::AppError;
use crate::models::Student;
use sqlx::SqlitePool;

pub async fn list_students(pool: &SqlitePool) -> Result<Vec<Student>, AppError> {
    let students = sqlx::query_as::<_, Student>(
        "SELECT id, name, email, created_at FROM students ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(students)
}

pub async fn get_student(pool: &SqlitePool, id: &str) -> Result<Option<Student>, AppError> {
    let student = sqlx::query_as::<_, Student>(
        "SELECT id, name, email, created_at FROM students WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(student)
}

/// 학생을 추가합니다. 이메일 중복은 `Conflict`로 바꿔 돌려줍니다.
pub async fn create_student(
    pool: &SqlitePool,
    id: &str,
    name: &str,
    email: &str,
) -> Result<Student, AppError> {
    sqlx::query("INSERT INTO students (id, name, email) VALUES (?, ?, ?)")
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                AppError::Conflict("A student with this email already exists".to_string())
            } else {
                AppError::Database(e)
            }
        })?;

    get_student(pool, id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created student".to_string()))
}
