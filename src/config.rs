use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    // Required
    pub database_url: String,
    pub slack_bot_token: String,

    // Slack API
    #[serde(default = "default_slack_api_base")]
    pub slack_api_base: String,
    #[serde(default = "default_slack_throttle_interval_ms")]
    pub slack_throttle_interval_ms: u64,
    #[serde(default = "default_slack_channel_cache_size")]
    pub slack_channel_cache_size: usize,
    #[serde(default = "default_slack_channel_cache_ttl_secs")]
    pub slack_channel_cache_ttl_secs: u64,
    #[serde(default = "default_slack_list_cache_size")]
    pub slack_list_cache_size: usize,
    #[serde(default = "default_slack_list_cache_ttl_secs")]
    pub slack_list_cache_ttl_secs: u64,

    // Webhooks
    #[serde(default)]
    pub webhook_url_allowlist: Vec<String>,
    #[serde(default = "default_webhook_timeout_secs")]
    pub webhook_timeout_secs: u64,

    // Snooze manager
    #[serde(default = "default_snooze_tick_interval_secs")]
    pub snooze_tick_interval_secs: u64,
    #[serde(default = "default_processing_lock_heartbeat_secs")]
    pub processing_lock_heartbeat_secs: u64,

    // Dispatcher worker pool
    #[serde(default = "default_dispatcher_workers")]
    pub dispatcher_workers: usize,
    #[serde(default = "default_dispatcher_poll_interval_ms")]
    pub dispatcher_poll_interval_ms: u64,

    // Server (health endpoint only - this core has no other HTTP surface)
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_slack_api_base() -> String {
    "https://slack.com/api".to_string()
}

fn default_slack_throttle_interval_ms() -> u64 {
    1200
}

fn default_slack_channel_cache_size() -> usize {
    1000
}

fn default_slack_channel_cache_ttl_secs() -> u64 {
    15 * 60
}

fn default_slack_list_cache_size() -> usize {
    250
}

fn default_slack_list_cache_ttl_secs() -> u64 {
    60
}

fn default_webhook_timeout_secs() -> u64 {
    3
}

fn default_snooze_tick_interval_secs() -> u64 {
    30
}

fn default_processing_lock_heartbeat_secs() -> u64 {
    60
}

fn default_dispatcher_workers() -> usize {
    8
}

fn default_dispatcher_poll_interval_ms() -> u64 {
    500
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

impl AppConfig {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder().add_source(
            config::Environment::default()
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database_url.is_empty() {
            return Err("DATABASE_URL is required".to_string());
        }
        if self.slack_bot_token.is_empty() {
            return Err("SLACK_BOT_TOKEN is required".to_string());
        }
        if self.slack_throttle_interval_ms == 0 {
            return Err("SLACK_THROTTLE_INTERVAL_MS must be positive".to_string());
        }

        if self.webhook_url_allowlist.is_empty() {
            tracing::warn!("no webhook URL allowlist configured - all webhook sends will be rejected as invalid/not-allowed");
        }

        Ok(())
    }

    pub fn slack_throttle_interval(&self) -> Duration {
        Duration::from_millis(self.slack_throttle_interval_ms)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_secs(self.webhook_timeout_secs)
    }

    pub fn snooze_tick_interval(&self) -> Duration {
        Duration::from_secs(self.snooze_tick_interval_secs)
    }

    pub fn processing_lock_heartbeat(&self) -> Duration {
        Duration::from_secs(self.processing_lock_heartbeat_secs)
    }

    pub fn dispatcher_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dispatcher_poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".to_string(),
            slack_bot_token: "xoxb-test".to_string(),
            slack_api_base: default_slack_api_base(),
            slack_throttle_interval_ms: default_slack_throttle_interval_ms(),
            slack_channel_cache_size: default_slack_channel_cache_size(),
            slack_channel_cache_ttl_secs: default_slack_channel_cache_ttl_secs(),
            slack_list_cache_size: default_slack_list_cache_size(),
            slack_list_cache_ttl_secs: default_slack_list_cache_ttl_secs(),
            webhook_url_allowlist: vec!["https://ok.example/".to_string()],
            webhook_timeout_secs: default_webhook_timeout_secs(),
            snooze_tick_interval_secs: default_snooze_tick_interval_secs(),
            processing_lock_heartbeat_secs: default_processing_lock_heartbeat_secs(),
            dispatcher_workers: default_dispatcher_workers(),
            dispatcher_poll_interval_ms: default_dispatcher_poll_interval_ms(),
            host: default_host(),
            port: default_port(),
        }
    }

    #[test]
    fn validate_requires_database_url() {
        let mut cfg = base_config();
        cfg.database_url.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_slack_bot_token() {
        let mut cfg = base_config();
        cfg.slack_bot_token.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_throttle_interval() {
        let mut cfg = base_config();
        cfg.slack_throttle_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_allows_empty_allowlist_with_warning() {
        let mut cfg = base_config();
        cfg.webhook_url_allowlist.clear();
        assert!(cfg.validate().is_ok());
    }

}
