//! # 인증 핸들러
//!
//! ## 엔드포인트
//! - `POST /api/v1/login`: Basic 인증으로 로그인, 세션 토큰 발급
//! - `POST /api/v1/logout`: 현재 세션 폐기
//! - `GET /api/v1/session`: 현재 세션 정보 (요청 자체가 세션을 갱신할 수 있음)

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{
    error::AppError,
    middleware::auth::{AuthUser, BasicCredentials},
    models::{LoginResponse, SessionInfoResponse},
    routes::AppState,
};

pub async fn login(
    State(state): State<AppState>,
    credentials: BasicCredentials,
) -> Result<Json<LoginResponse>, AppError> {
    let grant = state
        .gateway
        .login(&credentials.username, &credentials.password)
        .await?;

    Ok(Json(LoginResponse {
        token: grant.token,
        designation: grant.principal.designation,
        username: grant.principal.username,
        session_time: grant.session_time_minutes,
        session_renewed: false,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<Value>, AppError> {
    state.gateway.logout(&auth_user.principal.id).await?;

    Ok(Json(json!({ "message": "Logged out successfully" })))
}

pub async fn session(auth_user: AuthUser) -> Json<SessionInfoResponse> {
    Json(SessionInfoResponse {
        username: auth_user.principal.username,
        designation: auth_user.principal.designation,
        session_time: auth_user.session_time_minutes,
        session_renewed: auth_user.renewed,
        token: auth_user.token,
    })
}
