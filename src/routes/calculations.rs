//! # 계산 작업 핸들러
//!
//! - `GET /api/v1/calculations/{job_id}`: 작업 상태 조회 (보관 기간이 지나면 404)
//! - `POST /api/v1/class-statistics`: 연도(와 학기) 학급 통계 계산 예약

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::{validate_year, ApiJson, AppState},
};

pub async fn get_calculation(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CalculationJobResponse>, AppError> {
    let job = state.scheduler.status(job_id).ok_or(AppError::NotFound)?;
    Ok(Json(job.into()))
}

pub async fn schedule_class_statistics(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    ApiJson(req): ApiJson<ClassStatisticsRequest>,
) -> Result<(StatusCode, Json<ScheduledResponse>), AppError> {
    validate_year(req.year)?;
    let job_id = state.schedule(JobTarget::ClassStatistics {
        year: req.year,
        term: req.term,
    })?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ScheduledResponse {
            calculation_status: CalculationStatus::Calculating,
            calculation_task_id: job_id,
        }),
    ))
}
