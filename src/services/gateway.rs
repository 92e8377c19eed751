//! # 인증 게이트웨이 (AuthGateway)
//!
//! 로그인 시 세션을 발급하고, 요청마다 토큰을 검증해 통과/거부/갱신을 결정합니다.
//!
//! ## 요청 검증 순서
//! 1. 토큰 복호화 실패 → `InvalidToken`
//! 2. 토큰 자체의 만료 시각이 지났거나 세션이 없거나 만료됨 → `Expired`
//! 3. 토큰의 발급 시각이 세션과 다름 (재로그인으로 대체됨) → `InvalidToken`
//! 4. principal이 더 이상 없음 → `InvalidToken`
//! 5. 남은 시간이 갱신 구간 안이면 세션을 연장하고 새 토큰을 발급
//!
//! 비밀번호 해싱은 Argon2id를 사용합니다.

use std::sync::{Arc, OnceLock};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Duration;
use sqlx::SqlitePool;

use crate::{
    clock::Clock,
    config::{BootstrapAccount, Config, MAX_SESSION_TTL_MINUTES},
    db::accounts as db_accounts,
    error::AppError,
    middleware::auth::AuthError,
    models::{Principal, Session},
    services::{
        session_store::{SessionError, SessionStore, TouchOutcome},
        token::{SessionPayload, TokenCodec},
    },
};

/// 세션 유효 시간과 갱신 구간
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    pub ttl: Duration,
    /// 만료까지 남은 시간이 이 값 이하이면 요청 시 세션을 연장합니다.
    pub renewal_window: Duration,
}

impl SessionPolicy {
    pub fn new(ttl_minutes: i64, renewal_fraction: f64) -> Self {
        let ttl = Duration::minutes(ttl_minutes.clamp(1, MAX_SESSION_TTL_MINUTES));
        let window_ms = (ttl.num_milliseconds() as f64 * renewal_fraction).round() as i64;
        Self {
            ttl,
            renewal_window: Duration::milliseconds(window_ms),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.session_ttl_minutes, config.session_renewal_fraction)
    }

    fn is_due(&self, session: &Session, now_millis: i64) -> bool {
        session.expires_at - now_millis <= self.renewal_window.num_milliseconds()
    }
}

/// 로그인 성공 결과
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub principal: Principal,
    pub token: String,
    pub session_time_minutes: i64,
}

/// 요청 인증 결과
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub principal: Principal,
    pub session_time_minutes: i64,
    pub renewed: bool,
    /// 이번 요청이 세션을 갱신했으면 새로 발급된 토큰
    pub token: Option<String>,
}

#[derive(Clone)]
pub struct AuthGateway {
    pool: SqlitePool,
    sessions: SessionStore,
    codec: TokenCodec,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl AuthGateway {
    pub fn new(
        pool: SqlitePool,
        codec: TokenCodec,
        clock: Arc<dyn Clock>,
        policy: SessionPolicy,
    ) -> Self {
        Self {
            sessions: SessionStore::new(pool.clone(), clock.clone()),
            pool,
            codec,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// 아이디/비밀번호를 확인하고 새 세션을 발급합니다.
    ///
    /// 계정이 없을 때와 비밀번호가 틀렸을 때는 로그에서만 구분되고,
    /// 클라이언트는 같은 응답을 받습니다. 계정이 없어도 더미 해시로 Argon2 검증을
    /// 한 번 수행하므로 응답 시간으로도 구분되지 않습니다.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginGrant, AuthError> {
        let found = db_accounts::find_by_username(&self.pool, username)
            .await
            .map_err(|e| AuthError::Internal(format!("account lookup failed: {}", e)))?;

        let principal = check_credentials(password, found).inspect_err(|e| match e {
            AuthError::UnknownAccount => tracing::warn!(username, "Login rejected: unknown account"),
            AuthError::BadPassword => tracing::warn!(username, "Login rejected: wrong password"),
            _ => {}
        })?;

        let session = self.sessions.create(&principal.id, self.policy.ttl).await?;
        let token = self.issue_token(&principal, &session)?;

        tracing::info!(principal_id = %principal.id, username, "Session issued");
        Ok(LoginGrant {
            principal,
            token,
            session_time_minutes: self.policy.ttl.num_minutes(),
        })
    }

    /// `Authorization: Token <x>` 헤더의 토큰을 검증합니다.
    pub async fn authenticate(&self, token: &str) -> Result<Authenticated, AuthError> {
        let payload = self.codec.decode(token).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            AuthError::InvalidToken
        })?;

        let now = self.clock.now_millis();
        // 저장소 조회 없이 거를 수 있는 오래된 토큰
        if payload.exp <= now {
            return Err(AuthError::Expired);
        }

        let session = self
            .sessions
            .get(&payload.sub)
            .await?
            .filter(|s| !s.is_expired_at(now))
            .ok_or(AuthError::Expired)?;

        if session.issued_at != payload.iat {
            tracing::warn!(principal_id = %payload.sub, "Token from a superseded session");
            return Err(AuthError::InvalidToken);
        }

        let principal = db_accounts::find_by_id(&self.pool, &payload.sub)
            .await
            .map_err(|e| AuthError::Internal(format!("account lookup failed: {}", e)))?
            .filter(|p| p.username == payload.usr)
            .ok_or_else(|| {
                tracing::warn!(principal_id = %payload.sub, "Token names an unknown principal");
                AuthError::InvalidToken
            })?;

        if !self.policy.is_due(&session, now) {
            return Ok(Authenticated {
                session_time_minutes: session.minutes_remaining(now),
                principal,
                renewed: false,
                token: None,
            });
        }

        let policy = self.policy;
        let outcome = self
            .sessions
            .touch(&session, policy.ttl, |s, at| policy.is_due(s, at))
            .await?;

        let now = self.clock.now_millis();
        match outcome {
            TouchOutcome::Renewed(renewed) => {
                let token = self.issue_token(&principal, &renewed)?;
                tracing::debug!(principal_id = %principal.id, renewal_count = renewed.renewal_count, "Session renewed");
                Ok(Authenticated {
                    session_time_minutes: renewed.minutes_remaining(now),
                    principal,
                    renewed: true,
                    token: Some(token),
                })
            }
            TouchOutcome::Unchanged(current) if current.issued_at == session.issued_at => {
                Ok(Authenticated {
                    session_time_minutes: current.minutes_remaining(now),
                    principal,
                    renewed: false,
                    token: None,
                })
            }
            TouchOutcome::Unchanged(_) => Err(AuthError::InvalidToken),
            TouchOutcome::Gone => Err(AuthError::Expired),
        }
    }

    /// 세션을 폐기합니다. 이후 같은 토큰은 `Expired`로 거부됩니다.
    pub async fn logout(&self, principal_id: &str) -> Result<(), AuthError> {
        self.sessions.invalidate(principal_id).await?;
        tracing::info!(principal_id, "Session invalidated");
        Ok(())
    }

    fn issue_token(&self, principal: &Principal, session: &Session) -> Result<String, AuthError> {
        self.codec
            .encode(&SessionPayload {
                sub: principal.id.clone(),
                usr: principal.username.clone(),
                iat: session.issued_at,
                exp: session.expires_at,
            })
            .map_err(|e| AuthError::Internal(format!("token encoding failed: {}", e)))
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Contended => AuthError::Unavailable,
            SessionError::Database(e) => AuthError::Internal(format!("session storage: {}", e)),
        }
    }
}

/// 비밀번호를 Argon2id PHC 문자열로 해싱합니다.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {}", e)))
}

/// 없는 계정에 대해 검증할 해시. 실제 해시와 같은 파라미터로 프로세스당 한 번 만듭니다.
fn dummy_password_hash() -> Option<&'static str> {
    static DUMMY: OnceLock<Option<String>> = OnceLock::new();
    DUMMY
        .get_or_init(|| hash_password("reportcard-unknown-account").ok())
        .as_deref()
}

/// 계정 조회 결과와 비밀번호를 확인합니다. 계정이 없어도 Argon2 검증을 수행합니다.
fn check_credentials(password: &str, found: Option<Principal>) -> Result<Principal, AuthError> {
    let Some(principal) = found else {
        if let Some(hash) = dummy_password_hash() {
            let _ = verify_password(password, hash);
        }
        return Err(AuthError::UnknownAccount);
    };

    verify_password(password, &principal.password_hash)?;
    Ok(principal)
}

fn verify_password(password: &str, password_hash: &str) -> Result<(), AuthError> {
    let parsed = PasswordHash::new(password_hash)
        .map_err(|e| AuthError::Internal(format!("password hash parse error: {}", e)))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| AuthError::BadPassword)
}

/// 설정된 초기 계정이 아직 없으면 만듭니다. 새로 만들었으면 true.
pub async fn provision_account(
    pool: &SqlitePool,
    account: &BootstrapAccount,
) -> Result<bool, AppError> {
    if db_accounts::find_by_username(pool, &account.username)
        .await?
        .is_some()
    {
        return Ok(false);
    }

    let password_hash = hash_password(&account.password)?;
    let id = uuid::Uuid::now_v7().to_string();
    db_accounts::create_account(pool, &id, &account.username, &account.designation, &password_hash)
        .await?;
    tracing::info!(username = %account.username, "Provisioned bootstrap account");
    Ok(true)
}
