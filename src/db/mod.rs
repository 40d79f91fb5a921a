pub mod models;
pub mod queries;

use crate::error::CoreResult;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub async fn create_pool(database_url: &str) -> CoreResult<PgPool> {
    // Snooze-manager ticks, the dispatcher worker pool, and the Slack/webhook
    // senders all hold a connection for the duration of one DB round-trip;
    // 20 gives headroom for a full worker pool plus the snooze ticker.
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;

    info!("Database connection pool created");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> CoreResult<()> {
    info!("Running database migrations");
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| crate::error::CoreError::internal(e))?;
    info!("Database migrations complete");
    Ok(())
}

pub async fn health_check(pool: &PgPool) -> bool {
    sqlx::query("SELECT 1").fetch_one(pool).await.is_ok()
}
