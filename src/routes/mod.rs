//! # 라우트 핸들러 모듈
//!
//! HTTP 요청을 처리하는 핸들러 함수들을 모아둔 모듈입니다.
//! Axum에서 핸들러는 HTTP 요청을 받아 응답을 반환하는 async 함수입니다.
//!
//! 각 하위 모듈:
//! - `auth`: 로그인, 로그아웃, 세션 정보
//! - `health`: 서버 상태 확인 (헬스체크)
//! - `students`: 학생 CRUD와 학생-연도 성적 요약
//! - `subjects`: 과목 CRUD와 과목 성취도
//! - `report_cards`: 성적표 CRUD, 재계산 요청
//! - `calculations`: 계산 작업 상태 조회, 학급 통계 요청

pub mod auth;
pub mod calculations;
pub mod health;
pub mod report_cards;
pub mod students;
pub mod subjects;

pub use calculations::*;
pub use health::*;
pub use report_cards::*;
pub use students::*;
pub use subjects::*;

use std::sync::Arc;

use axum::extract::FromRequest;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::Config,
    error::AppError,
    models::JobTarget,
    services::{
        gateway::{AuthGateway, SessionPolicy},
        scheduler::{CalculationScheduler, SchedulerConfig},
        token::TokenCodec,
    },
};

/// 모든 핸들러가 공유하는 상태
///
/// `SqlitePool`과 게이트웨이는 내부가 `Arc`라서 clone해도 같은 자원을 가리킵니다.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub gateway: AuthGateway,
    pub scheduler: Arc<CalculationScheduler>,
}

impl AppState {
    /// 설정에서 게이트웨이와 스케줄러를 만듭니다. 스케줄러 워커가 바로 시작됩니다.
    pub fn new(pool: SqlitePool, config: &Config, clock: Arc<dyn Clock>) -> Self {
        let gateway = AuthGateway::new(
            pool.clone(),
            TokenCodec::from_secret(&config.encryption_key),
            clock.clone(),
            SessionPolicy::from_config(config),
        );
        let scheduler = CalculationScheduler::start(
            pool.clone(),
            clock,
            SchedulerConfig::from_config(config),
        );

        Self {
            pool,
            gateway,
            scheduler: Arc::new(scheduler),
        }
    }

    pub(crate) fn schedule(&self, target: JobTarget) -> Result<Uuid, AppError> {
        Ok(self.scheduler.schedule(target)?)
    }
}

/// JSON 본문 추출기. 형식이 잘못된 본문은 `AppError::BadRequest`(400)로 거부합니다.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// 성적표 연도 범위 검사
pub(crate) fn validate_year(year: i64) -> Result<(), AppError> {
    if (2000..=2100).contains(&year) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Year {} is out of range (2000-2100)",
            year
        )))
    }
}
