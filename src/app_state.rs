//! Composition root: wires every capability interface to its concrete,
//! Postgres-backed implementation and assembles the senders and dispatcher
//! that `main.rs` spawns, matching the teacher's single `AppState` that
//! every Axum handler receives.

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::db::queries::slack_timestamps::PgAlertMessageTimestamps;
use crate::dispatcher::{Dispatcher, PgDispatcherBackend};
use crate::slack::ChannelSender;
use crate::webhook::WebhookSender;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(pool: PgPool, config: AppConfig) -> Self {
        let config = Arc::new(config);

        let timestamps = Arc::new(PgAlertMessageTimestamps::new(pool.clone()));
        let channel_sender = Arc::new(ChannelSender::new(
            config.slack_bot_token.clone(),
            config.slack_api_base.clone(),
            config.slack_throttle_interval(),
            config.slack_channel_cache_size,
            std::time::Duration::from_secs(config.slack_channel_cache_ttl_secs),
            config.slack_list_cache_size,
            std::time::Duration::from_secs(config.slack_list_cache_ttl_secs),
            timestamps,
        ));
        let webhook_sender = Arc::new(WebhookSender::new(config.webhook_timeout()));
        let backend = Arc::new(PgDispatcherBackend::new(pool.clone()));
        let dispatcher = Arc::new(Dispatcher::new(
            backend,
            channel_sender,
            webhook_sender,
            config.webhook_url_allowlist.clone(),
        ));

        Self {
            pool,
            config,
            dispatcher,
        }
    }
}
