//! # 미들웨어 모듈
//!
//! - `auth`: 토큰/Basic 인증 추출기와 세션 응답 헤더 미들웨어

pub mod auth;
