//! # 서비스 계층
//!
//! 라우트 핸들러 뒤에서 실제 규칙을 담당하는 구성 요소들입니다.
//! - `token`: 세션 토큰 암호화/복호화
//! - `session_store`: principal별 세션 (원자적 생성/갱신/폐기)
//! - `gateway`: 로그인과 요청 인증, 세션 갱신 결정
//! - `aggregation`: 점수 집계와 등급 계산 (순수 함수)
//! - `locks`: 대상별 비동기 잠금
//! - `scheduler`: 집계 재계산 작업 큐와 워커

pub mod aggregation;
pub mod gateway;
pub mod locks;
pub mod scheduler;
pub mod session_store;
pub mod token;
