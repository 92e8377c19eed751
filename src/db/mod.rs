//! # 데이터베이스 접근 계층 (Data Access Layer)
//!
//! 데이터베이스와 직접 상호작용하는 함수들을 모아둔 모듈입니다.
//! 라우트 핸들러와 서비스(인증 게이트웨이, 계산 스케줄러)가 이 모듈의 함수를 호출합니다.
//!
//! 각 하위 모듈:
//! - `accounts`: 인증 주체(계정) 조회/생성
//! - `sessions`: 로그인 세션 행 (원자적 UPSERT / compare-and-swap)
//! - `students`, `subjects`: 학생/과목 CRUD
//! - `report_cards`: 성적표와 점수, 계산 결과 기록
//! - `summaries`: 학생-연도 성적 요약

pub mod accounts;
pub mod report_cards;
pub mod sessions;
pub mod students;
pub mod subjects;
pub mod summaries;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// 연결 풀을 만들고 마이그레이션을 적용합니다.
///
/// `sqlite::memory:`를 넘기면 테스트용 인메모리 DB가 됩니다.
/// 인메모리 DB는 연결마다 별개의 DB이므로 연결을 하나로 고정하고, 유휴 연결이 닫히지 않게 합니다.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let in_memory = database_url.contains(":memory:");
    let options = SqliteConnectOptions::from_str(database_url)?
        .foreign_keys(true)
        .create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new();
    pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(max_connections)
    };

    let pool = pool_options.connect_with(options).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// UNIQUE 제약 위반인지 확인합니다. (중복 성적표, 중복 이메일 등)
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// 현재 시각을 DB에 저장하는 문자열 형식으로 바꿉니다.
pub fn timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}
