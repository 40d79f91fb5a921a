use axum::routing::get;
use axum::Router;
use incident_bot::{db, AppConfig, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use incident_bot::snooze_manager::SnoozeManager;
use incident_bot::worker::DispatchWorkerPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "incident_bot=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting notification delivery core");

    let config = AppConfig::from_env().expect("Failed to load configuration");
    config.validate().expect("Configuration validation failed");

    info!("Configuration loaded");

    let pool = db::create_pool(&config.database_url)
        .await
        .expect("Failed to create database pool");

    db::run_migrations(&pool)
        .await
        .expect("Failed to run migrations");

    let snooze_manager = SnoozeManager::new(
        pool.clone(),
        config.processing_lock_heartbeat(),
        config.snooze_tick_interval(),
    );
    snooze_manager.spawn();

    let dispatcher_poll_interval = config.dispatcher_poll_interval();
    let dispatcher_workers = config.dispatcher_workers;
    let port = config.port;
    let state = AppState::new(pool.clone(), config);

    let worker_pool = Arc::new(DispatchWorkerPool::new(
        pool.clone(),
        state.dispatcher.clone(),
        dispatcher_workers,
        dispatcher_poll_interval,
    ));
    worker_pool.spawn();

    let app = Router::new()
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> (axum::http::StatusCode, axum::Json<serde_json::Value>) {
    use axum::http::StatusCode;
    use axum::Json;

    let db_healthy = db::health_check(&state.pool).await;

    if db_healthy {
        (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "healthy",
                "database": "connected",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unhealthy",
                "database": "disconnected",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        )
    }
}
