//! # 에러 처리 모듈
//!
//! HTTP 경계에서 사용하는 `AppError`를 정의합니다.
//! 인증 에러(`AuthError`)는 `middleware::auth`에, 계산 작업 에러는
//! `models::calculation`에 따로 있습니다. 계산 작업 에러는 HTTP 응답으로
//! 나가지 않고 작업 기록에만 남습니다.
//!
//! - `AppError` 열거형(enum): 요청 처리 중 발생하는 에러를 하나의 타입으로 통합
//! - `IntoResponse` 구현: 에러를 `{ "error": { "code", "message" } }` 형태의 JSON 응답으로 변환

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::{middleware::auth::AuthError, services::scheduler::SchedulerError};

/// 애플리케이션에서 발생할 수 있는 요청 단위 에러
#[derive(Debug, Error)]
pub enum AppError {
    /// 요청한 리소스를 찾을 수 없음 (HTTP 404)
    #[error("Resource not found")]
    NotFound,

    /// 잘못된 요청 (HTTP 400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// 서버 내부 오류 (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// 데이터베이스 오류 (HTTP 500)
    /// #[from] 덕분에 sqlx 함수 결과에 `?`를 쓰면 자동으로 변환됩니다.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// 인증 실패 (HTTP 401 등, 세부 매핑은 AuthError가 결정)
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// 리소스 충돌 (HTTP 409). 같은 학생/학기/연도의 성적표 중복 등
    #[error("Conflict: {0}")]
    Conflict(String),

    /// 일시적으로 처리 불가 (HTTP 503). 스케줄러 종료 중 등
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        AppError::Unavailable(err.to_string())
    }
}

/// 잘못된 JSON 본문(형식 오류, 점수 소수 셋째 자리 등)은 400으로 돌려줍니다.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    /// 내부 에러(Database, Internal)는 실제 내용을 로그에만 기록하고,
    /// 클라이언트에는 일반적인 메시지만 반환합니다.
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                "not_found",
                "Resource not found".to_string(),
            ),
            AppError::BadRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", msg.clone())
            }
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
            // 인증 에러는 자체 응답 형식을 그대로 사용합니다.
            AppError::Auth(err) => return err.into_response(),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Unavailable(ref msg) => {
                tracing::warn!("Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "unavailable",
                    "The service is temporarily unavailable".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_variant() {
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Conflict("dup".into()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::Internal("boom".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Auth(AuthError::Expired).into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::Unavailable("closing".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
