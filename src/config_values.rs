//! Hand-written tagged-union configuration surface, standing in for
//! `devtools/configparams/run.go`'s reflection-based generator: every leaf
//! of [`AppConfig`] is rendered as one [`ConfigValue`], and
//! [`apply_config_values`] parses a flat id/value list back into it.
//! No runtime reflection and no build-time codegen - the mapping is
//! maintained by hand, per SPEC_FULL §9 Design Note (b).

use crate::config::AppConfig;
use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigValueType {
    String,
    StringList,
    Integer,
    Boolean,
}

#[derive(Debug, Clone)]
pub struct ConfigValue {
    pub id: String,
    pub display_name: String,
    pub value_type: ConfigValueType,
    pub description: String,
    pub value: String,
    pub public: bool,
    pub password: bool,
}

impl ConfigValue {
    fn new(
        id: &str,
        display_name: &str,
        value_type: ConfigValueType,
        description: &str,
        value: String,
        public: bool,
        password: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            value_type,
            description: description.to_string(),
            value,
            public,
            password,
        }
    }
}

fn string_list_value(items: &[String]) -> String {
    items.join("\n")
}

fn parse_string_list(raw: &str) -> Vec<String> {
    raw.lines().map(|l| l.to_string()).collect()
}

/// Renders every configurable leaf field of `cfg` as a [`ConfigValue`],
/// mirroring `MapConfigValues`.
pub fn map_config_values(cfg: &AppConfig) -> Vec<ConfigValue> {
    vec![
        ConfigValue::new(
            "General.DatabaseURL",
            "Database URL",
            ConfigValueType::String,
            "Postgres connection string.",
            cfg.database_url.clone(),
            false,
            true,
        ),
        ConfigValue::new(
            "Slack.BotToken",
            "Slack Bot Token",
            ConfigValueType::String,
            "Bot token used to authenticate Slack Web API calls.",
            cfg.slack_bot_token.clone(),
            false,
            true,
        ),
        ConfigValue::new(
            "Slack.APIBase",
            "Slack API Base URL",
            ConfigValueType::String,
            "Base URL for the Slack Web API.",
            cfg.slack_api_base.clone(),
            true,
            false,
        ),
        ConfigValue::new(
            "Slack.ThrottleIntervalMS",
            "Slack Throttle Interval (ms)",
            ConfigValueType::Integer,
            "Minimum spacing between outbound Slack API calls.",
            cfg.slack_throttle_interval_ms.to_string(),
            true,
            false,
        ),
        ConfigValue::new(
            "Webhook.URLAllowlist",
            "Webhook URL Allowlist",
            ConfigValueType::StringList,
            "URL prefixes outgoing webhooks are permitted to target.",
            string_list_value(&cfg.webhook_url_allowlist),
            true,
            false,
        ),
        ConfigValue::new(
            "Webhook.TimeoutSeconds",
            "Webhook Timeout (s)",
            ConfigValueType::Integer,
            "Per-request timeout for outgoing webhook POSTs.",
            cfg.webhook_timeout_secs.to_string(),
            true,
            false,
        ),
        ConfigValue::new(
            "SnoozeManager.TickIntervalSeconds",
            "Snooze Manager Tick Interval (s)",
            ConfigValueType::Integer,
            "How often the snooze manager re-evaluates expired snoozes.",
            cfg.snooze_tick_interval_secs.to_string(),
            true,
            false,
        ),
        ConfigValue::new(
            "Dispatcher.Workers",
            "Dispatcher Workers",
            ConfigValueType::Integer,
            "Maximum number of outgoing messages dispatched concurrently.",
            cfg.dispatcher_workers.to_string(),
            true,
            false,
        ),
    ]
}

/// Applies a flat list of `(id, value)` updates to a copy of `cfg`, parsing
/// each value by the target field's [`ConfigValueType`]. An unknown id
/// produces a field-level [`CoreError::Validation`]; `Boolean` accepts only
/// the literal strings `"true"`/`"false"`; `Integer` parses base-10.
pub fn apply_config_values(cfg: &AppConfig, updates: &[(String, String)]) -> CoreResult<AppConfig> {
    let mut cfg = cfg.clone();
    for (id, value) in updates {
        match id.as_str() {
            "General.DatabaseURL" => cfg.database_url = value.clone(),
            "Slack.BotToken" => cfg.slack_bot_token = value.clone(),
            "Slack.APIBase" => cfg.slack_api_base = value.clone(),
            "Slack.ThrottleIntervalMS" => cfg.slack_throttle_interval_ms = parse_integer(id, value)?,
            "Webhook.URLAllowlist" => cfg.webhook_url_allowlist = parse_string_list(value),
            "Webhook.TimeoutSeconds" => cfg.webhook_timeout_secs = parse_integer(id, value)?,
            "SnoozeManager.TickIntervalSeconds" => {
                cfg.snooze_tick_interval_secs = parse_integer(id, value)?
            }
            "Dispatcher.Workers" => {
                cfg.dispatcher_workers = parse_integer::<u64>(id, value)? as usize
            }
            other => {
                return Err(CoreError::validation(
                    other.to_string(),
                    "unknown configuration id",
                ))
            }
        }
    }
    Ok(cfg)
}

fn parse_integer<T: std::str::FromStr>(id: &str, value: &str) -> CoreResult<T> {
    value
        .parse::<T>()
        .map_err(|_| CoreError::validation(id.to_string(), "expected a base-10 integer"))
}

#[allow(dead_code)]
fn parse_bool(id: &str, value: &str) -> CoreResult<bool> {
    match value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(CoreError::validation(
            id.to_string(),
            "expected exactly \"true\" or \"false\"",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://localhost/test".to_string(),
            slack_bot_token: "xoxb-test".to_string(),
            slack_api_base: "https://slack.com/api".to_string(),
            slack_throttle_interval_ms: 1200,
            slack_channel_cache_size: 1000,
            slack_channel_cache_ttl_secs: 900,
            slack_list_cache_size: 250,
            slack_list_cache_ttl_secs: 60,
            webhook_url_allowlist: vec!["https://ok.example/".to_string()],
            webhook_timeout_secs: 3,
            snooze_tick_interval_secs: 30,
            processing_lock_heartbeat_secs: 60,
            dispatcher_workers: 8,
            dispatcher_poll_interval_ms: 500,
            host: "0.0.0.0".to_string(),
            port: 3001,
        }
    }

    #[test]
    fn round_trips_through_map_and_apply() {
        let cfg = base_config();
        let values = map_config_values(&cfg);
        let updates: Vec<(String, String)> =
            values.iter().map(|v| (v.id.clone(), v.value.clone())).collect();
        let applied = apply_config_values(&cfg, &updates).unwrap();
        assert_eq!(applied.database_url, cfg.database_url);
        assert_eq!(applied.dispatcher_workers, cfg.dispatcher_workers);
        assert_eq!(applied.webhook_url_allowlist, cfg.webhook_url_allowlist);
    }

    #[test]
    fn apply_updates_string_list_with_newline_join() {
        let cfg = base_config();
        let updates = vec![(
            "Webhook.URLAllowlist".to_string(),
            "https://a.example/\nhttps://b.example/".to_string(),
        )];
        let applied = apply_config_values(&cfg, &updates).unwrap();
        assert_eq!(
            applied.webhook_url_allowlist,
            vec!["https://a.example/".to_string(), "https://b.example/".to_string()]
        );
    }

    #[test]
    fn apply_rejects_unknown_id() {
        let cfg = base_config();
        let updates = vec![("Nonexistent.Field".to_string(), "x".to_string())];
        assert!(apply_config_values(&cfg, &updates).is_err());
    }

    #[test]
    fn apply_rejects_non_integer_for_integer_field() {
        let cfg = base_config();
        let updates = vec![("Dispatcher.Workers".to_string(), "not-a-number".to_string())];
        assert!(apply_config_values(&cfg, &updates).is_err());
    }

    #[test]
    fn parse_bool_accepts_only_exact_strings() {
        assert!(parse_bool("x", "true").unwrap());
        assert!(!parse_bool("x", "false").unwrap());
        assert!(parse_bool("x", "TRUE").is_err());
        assert!(parse_bool("x", "1").is_err());
    }
}
