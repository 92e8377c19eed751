//! # 데이터 모델 모듈
//!
//! 애플리케이션에서 사용하는 데이터 구조체(struct)들을 정의합니다.
//! - `account`: 인증 주체(Principal)와 로그인 응답
//! - `session`: 로그인 세션
//! - `score`: 고정소수점 점수와 등급
//! - `student`: 학생과 과목
//! - `report_card`: 성적표, 점수, 집계 결과
//! - `statistics`: 학생-연도 요약과 학급 통계
//! - `calculation`: 비동기 계산 작업 기록

pub mod account;
pub mod calculation;
pub mod report_card;
pub mod score;
pub mod session;
pub mod statistics;
pub mod student;

pub use account::*;
pub use calculation::*;
pub use report_card::*;
pub use score::*;
pub use session::*;
pub use statistics::*;
pub use student::*;
