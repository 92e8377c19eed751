//! # 학생 핸들러
//!
//! ## 엔드포인트
//! - `GET /api/v1/students`: 학생 목록
//! - `POST /api/v1/students`: 학생 추가
//! - `GET /api/v1/students/{id}`: 학생 조회
//! - `GET /api/v1/students/{id}/performance?year=`: 학생-연도 성적 요약 (+ 재계산 예약)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::{
    db::{students as db_students, summaries as db_summaries},
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::{validate_year, ApiJson, AppState},
};

pub async fn list_students(
    State(state): State<AppState>,
    _auth_user: AuthUser,
) -> Result<Json<Vec<Student>>, AppError> {
    let students = db_students::list_students(&state.pool).await?;
    Ok(Json(students))
}

pub async fn create_student(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    ApiJson(req): ApiJson<CreateStudentRequest>,
) -> Result<(StatusCode, Json<Student>), AppError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("Student name is required".to_string()));
    }
    let email = req.email.trim();
    if !email.contains('@') {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    let id = uuid::Uuid::now_v7().to_string();
    let student = db_students::create_student(&state.pool, &id, name, email).await?;
    tracing::info!(student_id = %student.id, "Student created");

    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn get_student(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Student>, AppError> {
    let student = db_students::get_student(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(student))
}

/// 저장된 요약을 돌려주고, 최신 점수로 다시 계산하는 작업을 예약합니다.
/// 새 요약은 `GET /calculations/{calculationTaskId}`의 `result`에서 볼 수 있습니다.
pub async fn get_student_performance(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<String>,
    Query(query): Query<PerformanceQuery>,
) -> Result<Json<PerformanceResponse>, AppError> {
    validate_year(query.year)?;
    db_students::get_student(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    let stored = db_summaries::get_summary(&state.pool, &id, query.year).await?;
    let job_id = state.schedule(JobTarget::StudentYear {
        student_id: id.clone(),
        year: query.year,
    })?;

    let (summary, calculated_at) = match stored {
        Some(stored) => (Some(stored.summary), Some(stored.calculated_at)),
        None => (None, None),
    };

    Ok(Json(PerformanceResponse {
        student_id: id,
        year: query.year,
        summary,
        calculated_at,
        calculation_status: CalculationStatus::Calculating,
        calculation_task_id: job_id,
    }))
}
