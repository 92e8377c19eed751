//! # 애플리케이션 설정(Configuration) 모듈
//!
//! 환경변수에서 서버 설정값을 읽어오는 모듈입니다.
//! `.env` 파일이나 시스템 환경변수에서 값을 가져옵니다.
//!
//! 설정 항목:
//! - `DATABASE_URL`: SQLite 데이터베이스 경로
//! - `ENCRYPTION_KEY`: 세션 토큰 암호화 키의 원본 문자열 (필수)
//! - `SESSION_TTL_MINUTES`: 세션 유효 시간 (분)
//! - `SESSION_RENEWAL_FRACTION`: 만료 직전 몇 %를 갱신 구간으로 볼지 (0~1)
//! - `CALC_WORKERS`: 계산 작업 워커 수
//! - `CALC_MAX_JOB_SECONDS`: 작업 하나의 최대 실행 시간
//! - `CALC_JOB_RETENTION_SECONDS`: 끝난 작업 기록을 보관하는 시간
//! - `BOOTSTRAP_USERNAME` / `BOOTSTRAP_PASSWORD` / `BOOTSTRAP_DESIGNATION`: 초기 계정
//! - `HOST`, `PORT`: 서버 바인딩 주소

use std::{env, fmt, time::Duration};
use thiserror::Error;

/// 세션 유효 시간 상한 (1년)
pub const MAX_SESSION_TTL_MINUTES: i64 = 365 * 24 * 60;
/// 작업 하나의 최대 실행 시간 상한 (하루)
pub const MAX_JOB_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// 서버 시작 시 아직 없으면 만들어 두는 초기 계정
#[derive(Clone)]
pub struct BootstrapAccount {
    pub username: String,
    pub password: String,
    pub designation: String,
}

/// 애플리케이션 전체 설정을 담는 구조체
///
/// `Debug` 출력에서는 암호화 키와 초기 비밀번호를 가립니다.
#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub encryption_key: String,
    pub session_ttl_minutes: i64,
    pub session_renewal_fraction: f64,
    pub calc_workers: usize,
    pub calc_max_job_duration: Duration,
    pub calc_job_retention: Duration,
    pub bootstrap: Option<BootstrapAccount>,
    pub host: String,
    pub port: u16,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &self.database_url)
            .field("encryption_key", &"<redacted>")
            .field("session_ttl_minutes", &self.session_ttl_minutes)
            .field("session_renewal_fraction", &self.session_renewal_fraction)
            .field("calc_workers", &self.calc_workers)
            .field("calc_max_job_duration", &self.calc_max_job_duration)
            .field("calc_job_retention", &self.calc_job_retention)
            .field(
                "bootstrap",
                &self.bootstrap.as_ref().map(|b| b.username.as_str()),
            )
            .field("host", &self.host)
            .field("port", &self.port)
            .finish()
    }
}

impl Config {
    /// 환경변수에서 설정값을 읽어 Config 인스턴스를 생성합니다.
    ///
    /// `ENCRYPTION_KEY`만 필수이며, 나머지는 기본값이 있습니다.
    /// 숫자로 읽을 수 없는 값은 기본값으로 대체하고,
    /// 읽었지만 허용 범위를 벗어난 값은 에러로 처리합니다.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 환경변수 대신 임의의 조회 함수로 설정을 만듭니다. (테스트용)
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let encryption_key = lookup("ENCRYPTION_KEY")
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::Missing("ENCRYPTION_KEY"))?;

        let session_ttl_minutes: i64 = parse_or(&lookup, "SESSION_TTL_MINUTES", 200);
        if !(1..=MAX_SESSION_TTL_MINUTES).contains(&session_ttl_minutes) {
            return Err(ConfigError::Invalid {
                key: "SESSION_TTL_MINUTES",
                reason: format!("must be within 1..={}", MAX_SESSION_TTL_MINUTES),
            });
        }

        let session_renewal_fraction: f64 = parse_or(&lookup, "SESSION_RENEWAL_FRACTION", 0.2);
        if !(session_renewal_fraction > 0.0 && session_renewal_fraction <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "SESSION_RENEWAL_FRACTION",
                reason: "must be within (0, 1]".to_string(),
            });
        }

        let calc_workers: usize = parse_or(&lookup, "CALC_WORKERS", 4);
        if calc_workers == 0 {
            return Err(ConfigError::Invalid {
                key: "CALC_WORKERS",
                reason: "at least one worker is required".to_string(),
            });
        }

        let max_job_seconds: u64 = parse_or(&lookup, "CALC_MAX_JOB_SECONDS", 30);
        if !(1..=MAX_JOB_SECONDS).contains(&max_job_seconds) {
            return Err(ConfigError::Invalid {
                key: "CALC_MAX_JOB_SECONDS",
                reason: format!("must be within 1..={}", MAX_JOB_SECONDS),
            });
        }
        let retention_seconds: u64 = parse_or(&lookup, "CALC_JOB_RETENTION_SECONDS", 3600);

        // 사용자 이름과 비밀번호가 모두 있어야 초기 계정을 만듭니다.
        let bootstrap = match (lookup("BOOTSTRAP_USERNAME"), lookup("BOOTSTRAP_PASSWORD")) {
            (Some(username), Some(password)) if !username.is_empty() && !password.is_empty() => {
                Some(BootstrapAccount {
                    username,
                    password,
                    designation: lookup("BOOTSTRAP_DESIGNATION")
                        .unwrap_or_else(|| "superadmin".to_string()),
                })
            }
            _ => None,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:data/reportcard.db?mode=rwc".to_string()),
            encryption_key,
            session_ttl_minutes,
            session_renewal_fraction,
            calc_workers,
            calc_max_job_duration: Duration::from_secs(max_job_seconds),
            calc_job_retention: Duration::from_secs(retention_seconds),
            bootstrap,
            host: lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&lookup, "PORT", 3000),
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}
