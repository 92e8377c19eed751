//! # 로그인 세션 쿼리 모듈
//!
//! 세션 테이블의 모든 변경은 SQL 문 하나로 끝나므로 DB가 원자성을 보장합니다.
//! 애플리케이션 쪽 잠금을 DB 왕복 동안 쥐고 있을 필요가 없습니다.
//!
//! ## 세션 라이프사이클
//! ```text
//! [로그인] upsert_session() → 활성 → touch_session() (갱신, CAS) → ... → delete_session() / 만료
//! ```

use crate::models::Session;
use sqlx::SqlitePool;

/// 세션을 새로 만들거나 기존 세션을 덮어씁니다.
///
/// 같은 밀리초에 재로그인해도 `issued_at`이 반드시 커지도록
/// `MAX(새 시각, 기존 발급 시각 + 1)`을 사용합니다.
/// 이 값이 달라지면 이전 토큰은 복호화는 되더라도 더 이상 통과하지 못합니다.
pub async fn upsert_session(
    pool: &SqlitePool,
    principal_id: &str,
    issued_at: i64,
    expires_at: i64,
) -> Result<Session, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        INSERT INTO sessions (principal_id, issued_at, expires_at, renewal_count)
        VALUES (?, ?, ?, 0)
        ON CONFLICT(principal_id) DO UPDATE SET
            issued_at = MAX(excluded.issued_at, sessions.issued_at + 1),
            expires_at = excluded.expires_at,
            renewal_count = 0
        RETURNING principal_id, issued_at, expires_at, renewal_count
        "#,
    )
    .bind(principal_id)
    .bind(issued_at)
    .bind(expires_at)
    .fetch_one(pool)
    .await
}

pub async fn get_session(pool: &SqlitePool, principal_id: &str) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        SELECT principal_id, issued_at, expires_at, renewal_count
        FROM sessions
        WHERE principal_id = ?
        "#,
    )
    .bind(principal_id)
    .fetch_optional(pool)
    .await
}

/// 호출자가 읽었던 버전(`issued_at`, `renewal_count`) 그대로일 때만 만료 시각을 연장합니다.
///
/// - `Ok(Some(Session))`: 연장 성공
/// - `Ok(None)`: 그 사이 다른 요청이 먼저 갱신했거나 재로그인/로그아웃됨
pub async fn touch_session(
    pool: &SqlitePool,
    seen: &Session,
    new_expires_at: i64,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(
        r#"
        UPDATE sessions
        SET expires_at = ?, renewal_count = renewal_count + 1
        WHERE principal_id = ? AND issued_at = ? AND renewal_count = ?
        RETURNING principal_id, issued_at, expires_at, renewal_count
        "#,
    )
    .bind(new_expires_at)
    .bind(&seen.principal_id)
    .bind(seen.issued_at)
    .bind(seen.renewal_count)
    .fetch_optional(pool)
    .await
}

/// 세션을 삭제합니다. 삭제된 행이 있으면 true.
pub async fn delete_session(pool: &SqlitePool, principal_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE principal_id = ?")
        .bind(principal_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
