#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use axum::{
    body::{to_bytes, Body},
    http::{header::AUTHORIZATION, Request, Response},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{TimeZone, Utc};
use reportcard::{
    clock::ManualClock,
    config::Config,
    db,
    middleware::auth::AuthUser,
    models::{CalculationJob, MarkInput, Score, Student, Subject, Term},
    routes::AppState,
    services::gateway::hash_password,
};
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse battery";

pub struct TestApp {
    pub state: AppState,
    pub pool: SqlitePool,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn router(&self) -> Router {
        reportcard::app(self.state.clone())
    }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(&[]).await
}

/// 인메모리 DB와 수동 시계로 상태를 만듭니다. `overrides`로 설정값을 바꿀 수 있습니다.
pub async fn spawn_app_with(overrides: &[(&str, &str)]) -> TestApp {
    let mut settings = vec![
        ("ENCRYPTION_KEY".to_string(), "test-encryption-key".to_string()),
        ("CALC_WORKERS".to_string(), "4".to_string()),
        ("CALC_MAX_JOB_SECONDS".to_string(), "5".to_string()),
    ];
    settings.extend(overrides.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    let config = Config::from_lookup(|key| {
        settings
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    })
    .unwrap();

    let pool = db::connect("sqlite::memory:", 1).await.unwrap();
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap(),
    ));
    let state = AppState::new(pool.clone(), &config, clock.clone());

    TestApp { state, pool, clock }
}

pub async fn create_account(app: &TestApp, username: &str, designation: &str) {
    let hash = hash_password(PASSWORD).unwrap();
    let id = uuid::Uuid::now_v7().to_string();
    db::accounts::create_account(&app.pool, &id, username, designation, &hash)
        .await
        .unwrap();
}

/// 계정을 만들고 로그인해 토큰을 돌려줍니다.
pub async fn login_as(app: &TestApp, username: &str) -> String {
    create_account(app, username, "teacher").await;
    app.state
        .gateway
        .login(username, PASSWORD)
        .await
        .unwrap()
        .token
}

pub async fn auth_user(app: &TestApp, token: &str) -> AuthUser {
    app.state.gateway.authenticate(token).await.unwrap().into()
}

pub async fn create_student(app: &TestApp, name: &str) -> Student {
    let id = uuid::Uuid::now_v7().to_string();
    let email = format!("{}@school.test", name.to_lowercase().replace(' ', "."));
    db::students::create_student(&app.pool, &id, name, &email)
        .await
        .unwrap()
}

pub async fn create_subject(app: &TestApp, code: &str) -> Subject {
    let id = uuid::Uuid::now_v7().to_string();
    db::subjects::create_subject(&app.pool, &id, code, &format!("{code} course"))
        .await
        .unwrap()
}

pub fn mark(subject: &Subject, whole: i64) -> MarkInput {
    MarkInput {
        subject_id: subject.id.clone(),
        score: Score::whole(whole),
        remarks: String::new(),
    }
}

pub fn create_request(
    student: &Student,
    term: Term,
    year: i64,
    marks: Vec<MarkInput>,
) -> reportcard::models::CreateReportCardRequest {
    reportcard::models::CreateReportCardRequest {
        student_id: student.id.clone(),
        term,
        year,
        marks,
    }
}

/// 작업이 끝날 때까지 기다립니다.
pub async fn wait_for_job(app: &TestApp, job_id: uuid::Uuid) -> CalculationJob {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let job = app
            .state
            .scheduler
            .status(job_id)
            .expect("job should be tracked");
        if job.status.is_finished() {
            return job;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} did not finish: {job:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn basic_header(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

pub fn request(method: &str, uri: &str, authorization: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(value) = authorization {
        builder = builder.header(AUTHORIZATION, value);
    }
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &TestApp, req: Request<Body>) -> Response<Body> {
    app.router().oneshot(req).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
