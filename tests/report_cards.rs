mod common;

use axum::{
    extract::{Path, State},
    http::StatusCode,
};
use common::*;
use reportcard::{
    error::AppError,
    models::*,
    routes::{self, ApiJson},
};
use serde_json::json;

#[tokio::test]
async fn create_schedules_and_completes_aggregation() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let user = auth_user(&app, &token).await;
    let student = create_student(&app, "Ada Lovelace").await;
    let math = create_subject(&app, "MATH101").await;
    let eng = create_subject(&app, "ENG101").await;
    let sci = create_subject(&app, "SCI101").await;

    let (status, response) = routes::create_report_card(
        State(app.state.clone()),
        user.clone(),
        ApiJson(create_request(
            &student,
            Term::Term1,
            2026,
            vec![mark(&math, 80), mark(&eng, 80), mark(&sci, 99)],
        )),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::CREATED);

    let json = serde_json::to_value(&response.0).unwrap();
    assert_eq!(json["calculationStatus"], "calculating");
    assert_eq!(json["marks"].as_array().unwrap().len(), 3);
    assert_eq!(json["marks"][0]["subjectCode"], "MATH101");
    let job_id = response.0.calculation_task_id;
    assert_eq!(json["calculationTaskId"], job_id.to_string());

    let job = wait_for_job(&app, job_id).await;
    assert_eq!(job.status, JobStatus::Completed, "{:?}", job.error);
    assert_eq!(job.result.as_ref().unwrap()["averageScore"], "86.33");

    let card = routes::get_report_card(
        State(app.state.clone()),
        user,
        Path(response.0.report_card.id.clone()),
    )
    .await
    .unwrap()
    .0;
    assert_eq!(card.calculation_status, CalculationStatus::Completed);
    assert_eq!(card.aggregates.total_subjects, 3);
    assert_eq!(card.aggregates.total_score, Score::whole(259));
    assert_eq!(card.aggregates.average_score, Score::from_hundredths(8633));
    assert_eq!(card.aggregates.highest_score, Score::whole(99));
    assert_eq!(card.aggregates.lowest_score, Score::whole(80));
    assert_eq!(card.aggregates.percentage, Score::from_hundredths(8633));
    assert_eq!(card.aggregates.grade, Some(Grade::BPlus));
    assert!(card.last_calculated.is_some());
}

#[tokio::test]
async fn empty_report_card_completes_with_no_grade() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let user = auth_user(&app, &token).await;
    let student = create_student(&app, "Grace Hopper").await;

    let (_, response) = routes::create_report_card(
        State(app.state.clone()),
        user,
        ApiJson(create_request(&student, Term::Final, 2026, vec![])),
    )
    .await
    .unwrap();

    let job = wait_for_job(&app, response.0.calculation_task_id).await;
    assert_eq!(job.status, JobStatus::Completed);

    let card = reportcard::db::report_cards::get_report_card(&app.pool, &response.0.report_card.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(card.aggregates, Aggregates::empty());
    assert_eq!(card.calculation_status, CalculationStatus::Completed);
}

#[tokio::test]
async fn duplicate_student_term_year_conflicts() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let user = auth_user(&app, &token).await;
    let student = create_student(&app, "Alan Turing").await;
    let math = create_subject(&app, "MATH101").await;

    routes::create_report_card(
        State(app.state.clone()),
        user.clone(),
        ApiJson(create_request(&student, Term::Term1, 2026, vec![mark(&math, 70)])),
    )
    .await
    .unwrap();

    let err = routes::create_report_card(
        State(app.state.clone()),
        user.clone(),
        ApiJson(create_request(&student, Term::Term1, 2026, vec![mark(&math, 75)])),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let other_term = routes::create_report_card(
        State(app.state.clone()),
        user,
        ApiJson(create_request(&student, Term::Term2, 2026, vec![mark(&math, 75)])),
    )
    .await;
    assert!(other_term.is_ok());
}

#[tokio::test]
async fn invalid_marks_are_bad_requests() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let user = auth_user(&app, &token).await;
    let student = create_student(&app, "Edsger Dijkstra").await;
    let math = create_subject(&app, "MATH101").await;

    let mut too_high = mark(&math, 0);
    too_high.score = Score::from_hundredths(10_050);
    let cases = vec![
        create_request(&student, Term::Term1, 2026, vec![too_high]),
        create_request(&student, Term::Term1, 2026, vec![mark(&math, 70), mark(&math, 80)]),
        create_request(
            &student,
            Term::Term1,
            2026,
            vec![MarkInput {
                subject_id: "missing".into(),
                score: Score::whole(50),
                remarks: String::new(),
            }],
        ),
        create_request(&student, Term::Term1, 1999, vec![]),
    ];

    for req in cases {
        let err = routes::create_report_card(State(app.state.clone()), user.clone(), ApiJson(req))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)), "{err:?}");
    }
}

#[tokio::test]
async fn malformed_score_over_http_is_a_bad_request() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let student = create_student(&app, "Barbara Liskov").await;
    let math = create_subject(&app, "MATH101").await;

    let response = send(
        &app,
        request(
            "POST",
            "/api/v1/report-cards",
            Some(&format!("Token {token}")),
            Some(json!({
                "studentId": student.id,
                "term": "Term 1",
                "year": 2026,
                "marks": [{ "subjectId": math.id, "score": "88.125" }]
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "bad_request");
}

#[tokio::test]
async fn overlapping_jobs_end_with_latest_marks() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let user = auth_user(&app, &token).await;
    let student = create_student(&app, "Katherine Johnson").await;
    let math = create_subject(&app, "MATH101").await;
    let eng = create_subject(&app, "ENG101").await;
    let sci = create_subject(&app, "SCI101").await;

    let (_, created) = routes::create_report_card(
        State(app.state.clone()),
        user.clone(),
        ApiJson(create_request(&student, Term::Term1, 2026, vec![mark(&math, 50)])),
    )
    .await
    .unwrap();
    let id = created.0.report_card.id.clone();

    let updated = routes::update_report_card(
        State(app.state.clone()),
        user,
        Path(id.clone()),
        ApiJson(UpdateReportCardRequest {
            marks: Some(vec![mark(&math, 90), mark(&eng, 90), mark(&sci, 90)]),
            ..Default::default()
        }),
    )
    .await
    .unwrap();
    assert_eq!(updated.0.report_card.calculation_status, CalculationStatus::Calculating);

    let first = wait_for_job(&app, created.0.calculation_task_id).await;
    let second = wait_for_job(&app, updated.0.calculation_task_id).await;
    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(second.status, JobStatus::Completed);

    let card = reportcard::db::report_cards::get_report_card(&app.pool, &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(card.aggregates.average_score, Score::whole(90));
    assert_eq!(card.aggregates.grade, Some(Grade::A));
    assert_eq!(card.aggregates.total_subjects, 3);
    assert_eq!(card.calculation_status, CalculationStatus::Completed);
}

#[tokio::test]
async fn failing_job_keeps_previous_aggregates() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let user = auth_user(&app, &token).await;
    let student = create_student(&app, "Margaret Hamilton").await;
    let math = create_subject(&app, "MATH101").await;
    let eng = create_subject(&app, "ENG101").await;
    let sci = create_subject(&app, "SCI101").await;

    let (_, created) = routes::create_report_card(
        State(app.state.clone()),
        user,
        ApiJson(create_request(
            &student,
            Term::Term1,
            2026,
            vec![mark(&math, 70), mark(&eng, 80)],
        )),
    )
    .await
    .unwrap();
    let id = created.0.report_card.id.clone();
    wait_for_job(&app, created.0.calculation_task_id).await;

    // 검증을 거치지 않은 잘못된 점수를 직접 넣습니다.
    sqlx::query(
        "INSERT INTO marks (id, report_card_id, subject_id, position, score, remarks) VALUES (?, ?, ?, 2, 10050, '')",
    )
    .bind(uuid::Uuid::now_v7().to_string())
    .bind(&id)
    .bind(&sci.id)
    .execute(&app.pool)
    .await
    .unwrap();

    let job_id = app
        .state
        .scheduler
        .schedule(JobTarget::ReportCard { report_card_id: id.clone() })
        .unwrap();
    let job = wait_for_job(&app, job_id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("compute"));

    let card = reportcard::db::report_cards::get_report_card(&app.pool, &id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(card.calculation_status, CalculationStatus::Failed);
    assert_eq!(card.aggregates.average_score, Score::whole(75));
    assert_eq!(card.aggregates.total_subjects, 2);

    let polled = routes::get_calculation(
        State(app.state.clone()),
        auth_user(&app, &token).await,
        Path(job_id),
    )
    .await
    .unwrap();
    let json = serde_json::to_value(&polled.0).unwrap();
    assert_eq!(json["calculationStatus"], "failed");
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn job_that_overruns_is_marked_timed_out() {
    let app = spawn_app_with(&[("CALC_MAX_JOB_SECONDS", "1")]).await;
    let student = create_student(&app, "Radia Perlman").await;
    let card_id = uuid::Uuid::now_v7().to_string();
    reportcard::db::report_cards::create_report_card(
        &app.pool,
        &card_id,
        &student.id,
        Term::Term3,
        2026,
        &[],
    )
    .await
    .unwrap();

    // 인메모리 풀의 유일한 연결을 쥐고 있으면 작업이 DB를 기다리다 시간을 넘깁니다.
    let held = app.pool.acquire().await.unwrap();
    let job_id = app
        .state
        .scheduler
        .schedule(JobTarget::ReportCard { report_card_id: card_id.clone() })
        .unwrap();
    let job = wait_for_job(&app, job_id).await;
    drop(held);

    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.error.unwrap().contains("maximum duration"));

    // 실패 기록도 DB를 못 써서 상태가 남아 있지만, 다음 작업이 바로잡습니다.
    let card = reportcard::db::report_cards::get_report_card(&app.pool, &card_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(card.calculation_status, CalculationStatus::Pending);

    let retry = app
        .state
        .scheduler
        .schedule(JobTarget::ReportCard { report_card_id: card_id.clone() })
        .unwrap();
    assert_eq!(wait_for_job(&app, retry).await.status, JobStatus::Completed);
    let card = reportcard::db::report_cards::get_report_card(&app.pool, &card_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(card.calculation_status, CalculationStatus::Completed);
}

#[tokio::test]
async fn delete_then_fetch_is_not_found() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let user = auth_user(&app, &token).await;
    let student = create_student(&app, "Frances Allen").await;

    let (_, created) = routes::create_report_card(
        State(app.state.clone()),
        user.clone(),
        ApiJson(create_request(&student, Term::Term2, 2026, vec![])),
    )
    .await
    .unwrap();
    let id = created.0.report_card.id.clone();
    wait_for_job(&app, created.0.calculation_task_id).await;

    let status = routes::delete_report_card(State(app.state.clone()), user.clone(), Path(id.clone()))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);

    let err = routes::get_report_card(State(app.state.clone()), user, Path(id))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound));
}

#[tokio::test]
async fn bulk_recalculation_reports_missing_ids() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    let user = auth_user(&app, &token).await;
    let student = create_student(&app, "Donald Knuth").await;
    let math = create_subject(&app, "MATH101").await;

    let (_, created) = routes::create_report_card(
        State(app.state.clone()),
        user.clone(),
        ApiJson(create_request(&student, Term::Term1, 2026, vec![mark(&math, 95)])),
    )
    .await
    .unwrap();
    let id = created.0.report_card.id.clone();

    let (status, response) = routes::recalculate_report_cards(
        State(app.state.clone()),
        user,
        ApiJson(RecalculateRequest {
            report_card_ids: vec![id.clone(), "missing".into(), id.clone()],
        }),
    )
    .await
    .unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(response.0.scheduled.len(), 1);
    assert_eq!(response.0.missing, vec!["missing".to_string()]);

    let job = wait_for_job(&app, response.0.scheduled[0].calculation_task_id).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.result.unwrap()["grade"], "A+");
}
