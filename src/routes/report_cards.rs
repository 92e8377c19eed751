//! # 성적표 핸들러
//!
//! ## 엔드포인트
//! - `GET /api/v1/report-cards?year=&term=&studentId=`: 목록
//! - `POST /api/v1/report-cards`: 생성 (+ 점수), 집계 작업 예약
//! - `GET /api/v1/report-cards/{id}`: 조회
//! - `PATCH /api/v1/report-cards/{id}`: 학기/연도 변경, 점수 교체, 집계 작업 예약
//! - `DELETE /api/v1/report-cards/{id}`: 삭제
//! - `POST /api/v1/report-cards/recalculate`: 여러 성적표 재계산 예약
//!
//! 쓰기 요청은 집계를 기다리지 않고 바로 응답합니다.
//! 응답의 `calculationStatus`는 `"calculating"`이고 `calculationTaskId`로 작업을 조회할 수 있습니다.

use std::collections::HashSet;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    db::{report_cards as db_report_cards, students as db_students, subjects as db_subjects},
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    routes::{validate_year, ApiJson, AppState},
};

pub async fn list_report_cards(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Query(filter): Query<ReportCardFilter>,
) -> Result<Json<Vec<ReportCard>>, AppError> {
    let cards = db_report_cards::list_report_cards(&state.pool, &filter).await?;
    Ok(Json(cards))
}

pub async fn create_report_card(
    State(state): State<AppState>,
    auth_user: AuthUser,
    ApiJson(req): ApiJson<CreateReportCardRequest>,
) -> Result<(StatusCode, Json<ReportCardWriteResponse>), AppError> {
    validate_year(req.year)?;
    if db_students::get_student(&state.pool, &req.student_id)
        .await?
        .is_none()
    {
        return Err(AppError::BadRequest(format!(
            "Unknown student {}",
            req.student_id
        )));
    }
    validate_marks(&state, &req.marks).await?;

    if db_report_cards::duplicate_exists(&state.pool, &req.student_id, req.term, req.year, None)
        .await?
    {
        return Err(AppError::Conflict(format!(
            "Report card for student {}, for {}, and year {} already exists.",
            req.student_id, req.term, req.year
        )));
    }

    let id = Uuid::now_v7().to_string();
    db_report_cards::create_report_card(
        &state.pool,
        &id,
        &req.student_id,
        req.term,
        req.year,
        &req.marks,
    )
    .await?;
    tracing::info!(
        report_card_id = %id,
        created_by = %auth_user.principal.username,
        "Report card created"
    );

    let response = schedule_and_respond(&state, &id, &[req.year]).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_report_card(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ReportCard>, AppError> {
    let card = db_report_cards::get_report_card(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(Json(card))
}

pub async fn update_report_card(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateReportCardRequest>,
) -> Result<Json<ReportCardWriteResponse>, AppError> {
    let existing = db_report_cards::get_report_card(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    let term = req.term.unwrap_or(existing.term);
    let year = req.year.unwrap_or(existing.year);
    validate_year(year)?;
    if let Some(marks) = &req.marks {
        validate_marks(&state, marks).await?;
    }

    if (term, year) != (existing.term, existing.year)
        && db_report_cards::duplicate_exists(
            &state.pool,
            &existing.student_id,
            term,
            year,
            Some(&id),
        )
        .await?
    {
        return Err(AppError::Conflict(format!(
            "Report card for student {}, for {}, and year {} already exists.",
            existing.student_id, term, year
        )));
    }

    let updated = db_report_cards::update_report_card(
        &state.pool,
        &id,
        &existing.student_id,
        term,
        year,
        req.marks.as_deref(),
    )
    .await?;
    if !updated {
        return Err(AppError::NotFound);
    }

    // 연도가 바뀌면 예전 연도의 요약도 다시 계산합니다.
    let years: Vec<i64> = if year == existing.year {
        vec![year]
    } else {
        vec![year, existing.year]
    };
    let response = schedule_and_respond(&state, &id, &years).await?;
    Ok(Json(response))
}

pub async fn delete_report_card(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let existing = db_report_cards::get_report_card(&state.pool, &id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !db_report_cards::delete_report_card(&state.pool, &id).await? {
        return Err(AppError::NotFound);
    }

    state.schedule(JobTarget::StudentYear {
        student_id: existing.student_id,
        year: existing.year,
    })?;

    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledReportCard {
    pub report_card_id: String,
    pub calculation_status: CalculationStatus,
    pub calculation_task_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateResponse {
    pub scheduled: Vec<ScheduledReportCard>,
    /// 존재하지 않아 건너뛴 성적표 ID
    pub missing: Vec<String>,
}

/// 여러 성적표의 집계를 한 번에 다시 예약합니다.
pub async fn recalculate_report_cards(
    State(state): State<AppState>,
    _auth_user: AuthUser,
    ApiJson(req): ApiJson<RecalculateRequest>,
) -> Result<(StatusCode, Json<RecalculateResponse>), AppError> {
    if req.report_card_ids.is_empty() {
        return Err(AppError::BadRequest(
            "reportCardIds must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut response = RecalculateResponse {
        scheduled: Vec::new(),
        missing: Vec::new(),
    };
    for id in req.report_card_ids {
        if !seen.insert(id.clone()) {
            continue;
        }
        if db_report_cards::get_report_card(&state.pool, &id)
            .await?
            .is_none()
        {
            response.missing.push(id);
            continue;
        }

        let job_id = state.schedule(JobTarget::ReportCard {
            report_card_id: id.clone(),
        })?;
        response.scheduled.push(ScheduledReportCard {
            report_card_id: id,
            calculation_status: CalculationStatus::Calculating,
            calculation_task_id: job_id,
        });
    }

    tracing::info!(
        scheduled = response.scheduled.len(),
        missing = response.missing.len(),
        "Bulk recalculation scheduled"
    );
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// 점수 목록 검사: 과목 중복 금지, 점수 범위 0~100, 존재하는 과목
async fn validate_marks(state: &AppState, marks: &[MarkInput]) -> Result<(), AppError> {
    let mut seen = HashSet::new();
    for mark in marks {
        if !seen.insert(mark.subject_id.as_str()) {
            return Err(AppError::BadRequest(format!(
                "Subject {} appears more than once",
                mark.subject_id
            )));
        }
        mark.score.as_mark().map_err(|e| {
            AppError::BadRequest(format!("Invalid score for subject {}: {}", mark.subject_id, e))
        })?;
        if db_subjects::get_subject(&state.pool, &mark.subject_id)
            .await?
            .is_none()
        {
            return Err(AppError::BadRequest(format!(
                "Unknown subject {}",
                mark.subject_id
            )));
        }
    }
    Ok(())
}

/// 성적표 집계와 관련 학생-연도 요약 재계산을 예약하고 쓰기 응답을 만듭니다.
async fn schedule_and_respond(
    state: &AppState,
    report_card_id: &str,
    summary_years: &[i64],
) -> Result<ReportCardWriteResponse, AppError> {
    let mut report_card = db_report_cards::get_report_card(&state.pool, report_card_id)
        .await?
        .ok_or_else(|| AppError::Internal("Failed to retrieve report card".to_string()))?;

    let job_id = state.schedule(JobTarget::ReportCard {
        report_card_id: report_card_id.to_string(),
    })?;
    for year in summary_years {
        state.schedule(JobTarget::StudentYear {
            student_id: report_card.student_id.clone(),
            year: *year,
        })?;
    }

    report_card.calculation_status = CalculationStatus::Calculating;
    Ok(ReportCardWriteResponse {
        report_card,
        calculation_task_id: job_id,
    })
}
