//! # reportcard
//!
//! 성적표 관리 API 서버 라이브러리입니다. 핵심은 두 가지입니다.
//! - 암호화된 세션 토큰 기반 인증 (`services::token`, `services::session_store`, `services::gateway`)
//! - 점수가 바뀔 때마다 집계를 다시 계산하는 비동기 작업 파이프라인
//!   (`services::scheduler`, `services::aggregation`)
//!
//! `main.rs`는 설정을 읽고 `app()`이 만든 라우터를 띄우기만 합니다.
//! 통합 테스트도 이 라이브러리를 통해 핸들러와 서비스를 직접 호출합니다.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use axum::{
    routing::{get, post},
    Router,
};
use routes::*;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// `/api/v1` 아래에 모든 라우트를 붙인 애플리케이션 라우터를 만듭니다.
pub fn app(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        .route("/session", get(routes::auth::session));

    let api_routes = Router::new()
        .merge(auth_routes)
        .route("/health", get(health_check))
        .route("/students", get(list_students).post(create_student))
        .route("/students/{id}", get(get_student))
        .route("/students/{id}/performance", get(get_student_performance))
        .route("/subjects", get(list_subjects).post(create_subject))
        .route("/subjects/{id}/performance", get(get_subject_performance))
        .route("/report-cards", get(list_report_cards).post(create_report_card))
        .route("/report-cards/recalculate", post(recalculate_report_cards))
        .route(
            "/report-cards/{id}",
            get(get_report_card)
                .patch(update_report_card)
                .delete(delete_report_card),
        )
        .route("/class-statistics", post(schedule_class_statistics))
        .route("/calculations/{job_id}", get(get_calculation))
        .with_state(state);

    // 개발 환경 기준으로 모든 출처를 허용합니다.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::auth::session_headers))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
