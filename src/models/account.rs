use serde::{Deserialize, Serialize};

/// 인증 주체(Principal). 계정 생성은 외부(초기 계정 설정 포함)에서 이뤄지고,
/// 인증 계층은 읽기만 합니다.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Principal {
    pub id: String,
    pub username: String,
    pub designation: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: String,
}

/// `POST /login` 성공 응답. 필드 이름은 기존 클라이언트와 호환되도록 고정되어 있습니다.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub designation: String,
    pub username: String,
    pub session_time: i64,
    pub session_renewed: bool,
}

/// `GET /session` 응답
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfoResponse {
    pub username: String,
    pub designation: String,
    pub session_time: i64,
    pub session_renewed: bool,
    /// 이번 요청에서 세션이 갱신되었으면 새 토큰
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
