use crate::error::AppError;
use crate::models::Subject;
use sqlx::SqlitePool;

pub async fn list_subjects(pool: &SqlitePool) -> Result<Vec<Subject>, AppError> {
    let subjects = sqlx::query_as::<_, Subject>(
        "SELECT id, code, name, created_at FROM subjects ORDER BY code",
    )
    .fetch_all(pool)
    .await?;

    Ok(subjects)
}

pub async fn get_subject(pool: &SqlitePool, id: &str) -> Result<Option<Subject>, AppError> {
    let subject = sqlx::query_as::<_, Subject>(
        "SELECT id, code, name, created_at FROM subjects WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(subject)
}

pub async fn create_subject(
    pool: &SqlitePool,
    id: &str,
    code: &str,
    name: &str,
) -> Result<Subject, AppError> {
    sqlx::query("INSERT INTO subjects (id, code, name) VALUES (?, ?, ?)")
        .bind(id)
        .bind(code)
        .bind(name)
        .execute(pool)
        .await
        .map_err(|e| {
            if super::is_unique_violation(&e) {
                AppError::Conflict(format!("Subject code {} already exists", code))
            } else {
                AppError::Database(e)
            }
        })?;

    get_subject(pool, id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created subject".to_string()))
}
