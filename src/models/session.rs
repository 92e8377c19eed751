//! # 로그인 세션 모델
//!
//! principal 하나당 활성 세션은 하나뿐입니다.
//! 새로 로그인하면 이전 세션을 덮어쓰고, 요청이 갱신 구간에 들어오면 만료 시각을 연장합니다.
//!
//! 시각은 모두 UTC epoch 밀리초(i64)입니다.

use serde::{Deserialize, Serialize};

/// `sessions` 테이블 한 행에 대응합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Session {
    pub principal_id: String,
    /// 발급 시각. 같은 principal의 재로그인마다 반드시 커집니다.
    pub issued_at: i64,
    pub expires_at: i64,
    pub renewal_count: i64,
}

impl Session {
    pub fn is_expired_at(&self, now_millis: i64) -> bool {
        self.expires_at <= now_millis
    }

    /// 남은 시간(분, 내림)
    pub fn minutes_remaining(&self, now_millis: i64) -> i64 {
        ((self.expires_at - now_millis).max(0)) / 60_000
    }
}
