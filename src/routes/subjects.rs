//! # 과목 핸들러
//!
//! - `GET /api/v1/subjects`: 과목 목록 (코드 순)
//! - `POST /api/v1/subjects`: 과목 추가. 코드는 `MATH101`처럼 대문자 2~4자 + 숫자 2~4자
//! - `GET /api/v1/subjects/{id}/performance?year=`: 과목 성취도. 연도를 빼면 전체 기간

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    db::{report_cards as db_report_cards, subjects as db_subjects},
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::{validate_year, ApiJson, AppState},
    services::aggregation,
};

pub async fn list_subjects(
    State(state): State<AppState>,
    _auth_user: AuthUser,
) -> Result<Json<Vec<Subject>>, AppError> {
    let subjects = db_subjects::list_subjects(&state.pool).await?;
    Ok(Json(subjects))
}

pub async fn create_subject(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    ApiJson(req): ApiJson<CreateSubjectRequest>,
) -> Result<(StatusCode, Json<Subject>), AppError> {
    let code = req.code.trim();
    if !is_valid_subject_code(code) {
        return Err(AppError::BadRequest(format!(
            "Invalid subject code {:?}; expected 2-4 uppercase letters followed by 2-4 digits",
            code
        )));
    }
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Subject name is required".to_string()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let subject = db_subjects::create_subject(&state.pool, &id, code, name).await?;

    Ok((StatusCode::CREATED, Json(subject)))
}

pub async fn get_subject_performance(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<SubjectPerformanceQuery>,
) -> Result<Json<SubjectPerformance>, AppError> {
    if let Some(year) = query.year {
        validate_year(year)?;
    }
    let subject = db_subjects::get_subject(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    let rows = db_report_cards::load_subject_marks(&state.pool, &subject.id, query.year).await?;
    let performance = aggregation::subject_performance(&subject, query.year, &rows)
        .map_err(|e| AppError::Internal(format!("subject {} performance: {}", subject.id, e)))?;

    Ok(Json(performance))
}
