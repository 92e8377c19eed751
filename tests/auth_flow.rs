mod common;

use axum::http::StatusCode;
use chrono::Duration;
use common::*;
use reportcard::middleware::auth::{AuthError, SESSION_RENEWED_HEADER, SESSION_TIME_HEADER, SESSION_TOKEN_HEADER};

#[tokio::test]
async fn login_returns_session_fields() {
    let app = spawn_app().await;
    create_account(&app, "registrar", "superadmin").await;

    let response = send(
        &app,
        request("POST", "/api/v1/login", Some(&basic_header("registrar", PASSWORD)), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    assert_eq!(body["designation"], "superadmin");
    assert_eq!(body["username"], "registrar");
    assert_eq!(body["sessionTime"], 200);
    assert_eq!(body["sessionRenewed"], false);
}

#[tokio::test]
async fn unknown_user_and_wrong_password_look_identical() {
    let app = spawn_app().await;
    create_account(&app, "registrar", "teacher").await;

    let wrong = send(
        &app,
        request("POST", "/api/v1/login", Some(&basic_header("registrar", "nope")), None),
    )
    .await;
    let unknown = send(
        &app,
        request("POST", "/api/v1/login", Some(&basic_header("ghost", PASSWORD)), None),
    )
    .await;

    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong.status(), unknown.status());
    assert_eq!(body_json(wrong).await, body_json(unknown).await);
}

#[tokio::test]
async fn missing_basic_header_is_rejected() {
    let app = spawn_app().await;
    let response = send(&app, request("POST", "/api/v1/login", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_scheme_is_required() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;

    let bearer = send(
        &app,
        request("GET", "/api/v1/session", Some(&format!("Bearer {token}")), None),
    )
    .await;
    assert_eq!(bearer.status(), StatusCode::UNAUTHORIZED);

    let missing = send(&app, request("GET", "/api/v1/session", None, None)).await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(missing).await["error"]["code"], "missing_token");

    let ok = send(
        &app,
        request("GET", "/api/v1/session", Some(&format!("token {token}")), None),
    )
    .await;
    assert_eq!(ok.status(), StatusCode::OK);
    assert_eq!(ok.headers()[SESSION_RENEWED_HEADER], "false");
    let body = body_json(ok).await;
    assert_eq!(body["username"], "registrar");
    assert_eq!(body["sessionRenewed"], false);
}

#[tokio::test]
async fn tampered_token_is_invalid() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;

    let mut chars: Vec<char> = token.chars().collect();
    chars[5] = if chars[5] == 'A' { 'B' } else { 'A' };
    let tampered: String = chars.into_iter().collect();

    let err = app.state.gateway.authenticate(&tampered).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
}

#[tokio::test]
async fn second_login_supersedes_first_token() {
    let app = spawn_app().await;
    let first = login_as(&app, "registrar").await;
    let second = app
        .state
        .gateway
        .login("registrar", PASSWORD)
        .await
        .unwrap()
        .token;

    let err = app.state.gateway.authenticate(&first).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken));
    assert!(app.state.gateway.authenticate(&second).await.is_ok());
}

#[tokio::test]
async fn logout_invalidates_the_session() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;

    let response = send(
        &app,
        request("POST", "/api/v1/logout", Some(&format!("Token {token}")), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let err = app.state.gateway.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::Expired));
}

#[tokio::test]
async fn expired_session_always_fails() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;

    app.clock.advance(Duration::minutes(200));
    let err = app.state.gateway.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::Expired));

    app.clock.advance(Duration::days(3));
    let err = app.state.gateway.authenticate(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::Expired));
}

#[tokio::test]
async fn outside_the_window_nothing_is_renewed() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;

    app.clock.advance(Duration::minutes(100));
    let auth = app.state.gateway.authenticate(&token).await.unwrap();
    assert!(!auth.renewed);
    assert!(auth.token.is_none());
    assert_eq!(auth.session_time_minutes, 100);
}

#[tokio::test]
async fn renewal_inside_window_reissues_token() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;

    app.clock.advance(Duration::minutes(170));
    let auth = app.state.gateway.authenticate(&token).await.unwrap();
    assert!(auth.renewed);
    assert_eq!(auth.session_time_minutes, 200);
    let renewed_token = auth.token.expect("renewal should issue a token");

    // 새 토큰은 이전 토큰의 만료 시각이 지나도 계속 통과합니다.
    app.clock.advance(Duration::minutes(50));
    let again = app.state.gateway.authenticate(&renewed_token).await.unwrap();
    assert!(!again.renewed);
    assert_eq!(again.session_time_minutes, 150);
    assert!(matches!(
        app.state.gateway.authenticate(&token).await.unwrap_err(),
        AuthError::Expired
    ));
}

#[tokio::test]
async fn renewal_is_echoed_in_response_headers() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    app.clock.advance(Duration::minutes(185));

    let response = send(
        &app,
        request("GET", "/api/v1/session", Some(&format!("Token {token}")), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[SESSION_RENEWED_HEADER], "true");
    assert_eq!(response.headers()[SESSION_TIME_HEADER], "200");
    let header_token = response.headers()[SESSION_TOKEN_HEADER]
        .to_str()
        .unwrap()
        .to_string();

    let body = body_json(response).await;
    assert_eq!(body["sessionRenewed"], true);
    assert_eq!(body["token"], header_token.as_str());
    assert!(app.state.gateway.authenticate(&header_token).await.is_ok());
}

#[tokio::test]
async fn concurrent_requests_renew_exactly_once() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    app.clock.advance(Duration::minutes(175));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let gateway = app.state.gateway.clone();
            let token = token.clone();
            tokio::spawn(async move { gateway.authenticate(&token).await })
        })
        .collect();

    let mut renewed = 0;
    for handle in handles {
        let auth = handle.await.unwrap().unwrap();
        if auth.renewed {
            renewed += 1;
        }
    }
    assert_eq!(renewed, 1);

    let session = sqlx::query_as::<_, (i64,)>("SELECT renewal_count FROM sessions")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(session.0, 1);
}

#[tokio::test]
async fn renewal_that_never_lands_is_a_503() {
    let app = spawn_app().await;
    let token = login_as(&app, "registrar").await;
    app.clock.advance(Duration::minutes(175));

    sqlx::query(
        "CREATE TRIGGER sessions_frozen BEFORE UPDATE ON sessions BEGIN SELECT RAISE(IGNORE); END",
    )
    .execute(&app.pool)
    .await
    .unwrap();

    let response = send(
        &app,
        request("GET", "/api/v1/session", Some(&format!("Token {token}")), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(response).await["error"]["code"], "session_busy");
}

#[tokio::test]
async fn unknown_user_pays_for_password_verification() {
    let app = spawn_app().await;
    create_account(&app, "registrar", "teacher").await;
    // 더미 해시를 미리 만들어 둡니다.
    let _ = app.state.gateway.login("warmup", PASSWORD).await;

    let mut wrong = std::time::Duration::ZERO;
    let mut unknown = std::time::Duration::ZERO;
    for _ in 0..3 {
        let started = std::time::Instant::now();
        let err = app.state.gateway.login("registrar", "nope").await.unwrap_err();
        wrong += started.elapsed();
        assert!(matches!(err, AuthError::BadPassword));

        let started = std::time::Instant::now();
        let err = app.state.gateway.login("ghost", "nope").await.unwrap_err();
        unknown += started.elapsed();
        assert!(matches!(err, AuthError::UnknownAccount));
    }

    assert!(
        unknown * 4 >= wrong,
        "unknown account took {unknown:?}, wrong password took {wrong:?}"
    );
}
