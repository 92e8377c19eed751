use crate::error::AppError;
use crate::models::Principal;
use sqlx::SqlitePool;

pub async fn create_account(
    pool: &SqlitePool,
    id: &str,
    username: &str,
    designation: &str,
    password_hash: &str,
) -> Result<Principal, AppError> {
    sqlx::query(
        r#"
        INSERT INTO accounts (id, username, designation, password_hash)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(id)
    .bind(username)
    .bind(designation)
    .bind(password_hash)
    .execute(pool)
    .await?;

    find_by_id(pool, id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created account".to_string()))
}

pub async fn find_by_username(pool: &SqlitePool, username: &str) -> Result<Option<Principal>, sqlx::Error> {
    sqlx::query_as::<_, Principal>(
        r#"
        SELECT id, username, designation, password_hash, created_at
        FROM accounts
        WHERE username = ?
        "#,
    )
    .bind(username)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<Principal>, sqlx::Error> {
    sqlx::query_as::<_, Principal>(
        r#"
        SELECT id, username, designation, password_hash, created_at
        FROM accounts
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
