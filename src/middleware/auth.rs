//! # 인증 미들웨어
//!
//! - `AuthUser`: `Authorization: Token <x>` 헤더를 검증하는 추출기(extractor)
//! - `BasicCredentials`: 로그인용 `Authorization: Basic base64(user:pass)` 추출기
//! - `session_headers`: 세션 상태를 응답 헤더(`x-session-*`)로 돌려주는 미들웨어
//!
//! 세션이 갱신되면 새 토큰이 `x-session-token` 헤더로 나갑니다.
//! 추출기가 요청 확장(extension)에 들어 있는 `SessionEcho`에 결과를 적고,
//! 미들웨어가 응답을 만든 뒤 그 값을 헤더로 옮깁니다.

use std::sync::{Arc, Mutex};

use axum::{
    extract::{FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::json;
use thiserror::Error;

use crate::{models::Principal, routes::AppState, services::gateway::Authenticated};

pub const SESSION_TIME_HEADER: &str = "x-session-time";
pub const SESSION_RENEWED_HEADER: &str = "x-session-renewed";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authorization token is required")]
    MissingToken,
    #[error("login credentials are required")]
    MissingCredentials,
    #[error("invalid authorization token")]
    InvalidToken,
    #[error("session has expired")]
    Expired,
    #[error("unknown account")]
    UnknownAccount,
    #[error("wrong password")]
    BadPassword,
    #[error("session is busy")]
    Unavailable,
    #[error("authentication failed internally: {0}")]
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AuthError::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "missing_token",
                "Authorization token is required",
            ),
            AuthError::MissingCredentials => (
                StatusCode::UNAUTHORIZED,
                "missing_credentials",
                "Basic authorization credentials are required",
            ),
            AuthError::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                "Invalid authorization token",
            ),
            AuthError::Expired => (
                StatusCode::UNAUTHORIZED,
                "session_expired",
                "Session has expired, please log in again",
            ),
            // 계정 존재 여부를 드러내지 않도록 같은 응답을 씁니다.
            AuthError::UnknownAccount | AuthError::BadPassword => (
                StatusCode::UNAUTHORIZED,
                "invalid_credentials",
                "Invalid username or password",
            ),
            AuthError::Unavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "session_busy",
                "Session is busy, please retry",
            ),
            AuthError::Internal(ref msg) => {
                tracing::error!("Authentication error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred",
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

/// 인증된 요청의 주체와 세션 상태
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub principal: Principal,
    pub session_time_minutes: i64,
    pub renewed: bool,
    /// 세션이 갱신되었으면 새 토큰
    pub token: Option<String>,
}

impl From<Authenticated> for AuthUser {
    fn from(auth: Authenticated) -> Self {
        Self {
            principal: auth.principal,
            session_time_minutes: auth.session_time_minutes,
            renewed: auth.renewed,
            token: auth.token,
        }
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AuthError::MissingToken)?;

        let token = parse_token_header(auth_header)?;
        let user: AuthUser = state.gateway.authenticate(token).await?.into();

        if let Some(echo) = parts.extensions.get::<SessionEcho>() {
            echo.record(&user);
        }

        Ok(user)
    }
}

/// `Token <x>`에서 `<x>`를 꺼냅니다. 스킴 이름은 대소문자를 구분하지 않습니다.
pub fn parse_token_header(value: &str) -> Result<&str, AuthError> {
    let (scheme, token) = value.trim().split_once(' ').ok_or(AuthError::InvalidToken)?;
    if !scheme.eq_ignore_ascii_case("token") {
        return Err(AuthError::InvalidToken);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(token)
}

/// `Authorization: Basic base64(username:password)`
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl<S: Send + Sync> FromRequestParts<S> for BasicCredentials {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_basic_header)
            .ok_or(AuthError::MissingCredentials)
    }
}

pub fn parse_basic_header(value: &str) -> Option<BasicCredentials> {
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    if username.is_empty() {
        return None;
    }

    Some(BasicCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

#[derive(Debug, Clone)]
struct EchoedSession {
    minutes: i64,
    renewed: bool,
    token: Option<String>,
}

/// 추출기가 본 세션 상태를 미들웨어로 전달하는 통로
#[derive(Clone, Default)]
pub struct SessionEcho(Arc<Mutex<Option<EchoedSession>>>);

impl SessionEcho {
    fn record(&self, user: &AuthUser) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = Some(EchoedSession {
            minutes: user.session_time_minutes,
            renewed: user.renewed,
            token: user.token.clone(),
        });
    }

    fn take(&self) -> Option<EchoedSession> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// 인증된 요청의 응답에 `x-session-time`, `x-session-renewed`, (갱신 시) `x-session-token`을 붙입니다.
pub async fn session_headers(mut req: Request, next: Next) -> Response {
    let echo = SessionEcho::default();
    req.extensions_mut().insert(echo.clone());

    let mut response = next.run(req).await;

    if let Some(session) = echo.take() {
        let headers = response.headers_mut();
        headers.insert(SESSION_TIME_HEADER, HeaderValue::from(session.minutes));
        headers.insert(
            SESSION_RENEWED_HEADER,
            HeaderValue::from_static(if session.renewed { "true" } else { "false" }),
        );
        if let Some(token) = session.token.and_then(|t| HeaderValue::from_str(&t).ok()) {
            headers.insert(SESSION_TOKEN_HEADER, token);
        }
    }

    response
}
