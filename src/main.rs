//! # reportcard 웹 서버 진입점
//!
//! 이 파일이 수행하는 작업:
//! 1. 환경변수(.env) 로딩
//! 2. 로깅(tracing) 초기화
//! 3. 설정 읽기
//! 4. SQLite 연결 풀 생성과 마이그레이션
//! 5. 초기 계정 준비
//! 6. 게이트웨이/스케줄러 상태 생성과 라우터 설정
//! 7. HTTP 서버 시작, 종료 신호를 받으면 남은 계산 작업을 마무리

use std::sync::Arc;

use anyhow::Result;
use reportcard::{
    clock::SystemClock, config::Config, db, routes::AppState, services::gateway::provision_account,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1단계: 환경변수 로딩 ──
    // .env 파일이 없어도 에러 없이 넘어갑니다.
    dotenvy::dotenv().ok();

    // ── 2단계: 로깅(tracing) 초기화 ──
    // RUST_LOG가 없으면 reportcard, tower_http, axum을 debug 레벨로 봅니다.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reportcard=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── 3단계: 설정 로딩 ──
    // Debug 출력은 암호화 키를 가립니다.
    let config = Config::from_env()?;
    tracing::info!(?config, "Starting reportcard server on {}:{}", config.host, config.port);

    // ── 4단계: 연결 풀 + 마이그레이션 ──
    if let Some(dir) = sqlite_parent_dir(&config.database_url) {
        tokio::fs::create_dir_all(&dir).await?;
    }
    tracing::info!("Connecting to database and running migrations...");
    let pool = db::connect(&config.database_url, 5).await?;

    // ── 5단계: 초기 계정 ──
    if let Some(account) = &config.bootstrap {
        provision_account(&pool, account).await?;
    }

    // ── 6단계: 상태와 라우터 ──
    let state = AppState::new(pool.clone(), &config, Arc::new(SystemClock));
    let scheduler = state.scheduler.clone();
    let app = reportcard::app(state);

    // ── 7단계: 서버 시작 ──
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 큐에 남은 작업을 끝낸 뒤 종료합니다.
    scheduler.shutdown().await;
    pool.close().await;
    Ok(())
}

/// `sqlite:data/reportcard.db?mode=rwc`에서 `data` 디렉토리를 꺼냅니다.
fn sqlite_parent_dir(database_url: &str) -> Option<std::path::PathBuf> {
    let path = database_url.strip_prefix("sqlite:")?;
    let path = path.split('?').next()?.trim_start_matches("//");
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
