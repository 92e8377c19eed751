//! # 세션 저장소 (SessionStore)
//!
//! principal ID → 현재 세션 메타데이터. 실제 저장은 `sessions` 테이블이고,
//! 다른 코드는 이 타입의 메서드로만 세션을 읽고 씁니다.
//!
//! 모든 변경은 principal 단위로 원자적입니다.
//! - `create`: UPSERT 한 문장 (이전 세션을 덮어씀)
//! - `touch`: (issued_at, renewal_count) 버전에 대한 compare-and-swap
//!
//! CAS에서 지면 행을 다시 읽고, 여전히 연장이 필요할 때만 다시 시도합니다.

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::Duration;
use sqlx::SqlitePool;
use thiserror::Error;

use crate::{clock::Clock, db::sessions as db_sessions, models::Session};

/// CAS 시도 횟수
const TOUCH_ATTEMPTS: u32 = 3;
/// 첫 재시도 전 대기 시간. 시도마다 두 배가 됩니다.
const TOUCH_BACKOFF: StdDuration = StdDuration::from_millis(10);

#[derive(Debug, Error)]
pub enum SessionError {
    /// 동시 갱신 경쟁에서 계속 졌음 (HTTP 503)
    #[error("session update kept losing to concurrent requests")]
    Contended,
    #[error("session storage error: {0}")]
    Database(#[from] sqlx::Error),
}

/// `touch` 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TouchOutcome {
    /// 이 호출이 만료 시각을 연장했음
    Renewed(Session),
    /// 다른 요청이 이미 연장했거나 처음부터 연장이 필요 없었음
    Unchanged(Session),
    /// 그 사이 세션이 삭제됨 (로그아웃)
    Gone,
}

#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// 새 세션을 만듭니다. 같은 principal의 이전 세션은 덮어씁니다.
    pub async fn create(&self, principal_id: &str, ttl: Duration) -> Result<Session, SessionError> {
        let now = self.clock.now_millis();
        let session =
            db_sessions::upsert_session(&self.pool, principal_id, now, now + ttl.num_milliseconds())
                .await?;
        Ok(session)
    }

    pub async fn get(&self, principal_id: &str) -> Result<Option<Session>, SessionError> {
        Ok(db_sessions::get_session(&self.pool, principal_id).await?)
    }

    /// 세션 만료 시각을 `now + extend_by`로 연장합니다.
    ///
    /// `seen`은 호출자가 마지막으로 읽은 세션이고, `due`는 연장이 아직 필요한지 판단합니다.
    /// CAS에서 지면 행을 다시 읽어 `due`를 다시 확인하므로, 동시에 들어온 요청 중
    /// 정확히 하나만 `Renewed`를 받습니다.
    pub async fn touch<F>(
        &self,
        seen: &Session,
        extend_by: Duration,
        due: F,
    ) -> Result<TouchOutcome, SessionError>
    where
        F: Fn(&Session, i64) -> bool,
    {
        let mut current = seen.clone();
        let mut backoff = TOUCH_BACKOFF;

        for attempt in 1..=TOUCH_ATTEMPTS {
            let now = self.clock.now_millis();
            if !due(&current, now) {
                return Ok(TouchOutcome::Unchanged(current));
            }

            let new_expires_at = now + extend_by.num_milliseconds();
            if let Some(renewed) =
                db_sessions::touch_session(&self.pool, &current, new_expires_at).await?
            {
                return Ok(TouchOutcome::Renewed(renewed));
            }

            tracing::warn!(
                principal_id = %current.principal_id,
                attempt,
                "Lost session renewal race, re-reading"
            );

            current = match db_sessions::get_session(&self.pool, &current.principal_id).await? {
                Some(session) => session,
                None => return Ok(TouchOutcome::Gone),
            };
            // 다시 읽은 행이 다른 로그인의 세션이면 더 연장하지 않습니다.
            if current.issued_at != seen.issued_at {
                return Ok(TouchOutcome::Unchanged(current));
            }

            if attempt < TOUCH_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        let now = self.clock.now_millis();
        if !due(&current, now) {
            return Ok(TouchOutcome::Unchanged(current));
        }
        Err(SessionError::Contended)
    }

    /// 세션을 삭제합니다. 삭제할 세션이 있었으면 true.
    pub async fn invalidate(&self, principal_id: &str) -> Result<bool, SessionError> {
        Ok(db_sessions::delete_session(&self.pool, principal_id).await?)
    }
}
