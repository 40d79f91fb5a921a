use super::cache::TtlCache;
use super::client::{SlackApiResult, SlackClient};
use super::throttle::Throttle;
use crate::db::models::SendResult;
use crate::error::{CoreError, CoreResult};
use crate::notification::Notification;
use crate::permission::{Principal, PrincipalMatch};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

/// A Slack channel as returned by the directory lookup/list endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    pub name: String,
}

/// Maps a Slack `error` string to the user/caller-facing error it
/// represents, mirroring `notification/slack/channel.go`'s `wrapError`.
fn wrap_error(err_msg: &str) -> CoreError {
    match err_msg {
        "missing_scope" => CoreError::validation("channel_id", "Only channels supported."),
        "channel_not_found" => CoreError::validation("channel_id", "Invalid Slack channel ID."),
        "invalid_auth" | "account_inactive" | "token_revoked" | "not_authed" => {
            CoreError::ClientProvider {
                message: "User account must be linked.".to_string(),
            }
        }
        other => CoreError::ClientProvider {
            message: format!("Slack API error: {other}"),
        },
    }
}

/// Looks up previously-delivered Slack timestamps for an alert in a given
/// channel, and records new ones. A capability interface rather than a
/// concrete store, so the channel sender doesn't need to know how message
/// history is persisted (breaks the cyclic store wiring the teacher's
/// monolithic `NotificationStore` would otherwise require).
#[async_trait::async_trait]
pub trait AlertMessageTimestamps: Send + Sync {
    async fn find_slack_alert_msg_timestamps(
        &self,
        alert_id: i64,
        channel_id: &str,
    ) -> CoreResult<Vec<String>>;

    async fn record_slack_alert_msg_timestamp(
        &self,
        alert_id: i64,
        channel_id: &str,
        ts: &str,
    ) -> CoreResult<()>;
}

#[derive(Debug, Deserialize)]
struct ChannelInfoResponse {
    channel: ChannelInfo,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChannelsListResponse {
    channels: Vec<ChannelInfo>,
    response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ts: String,
}

pub struct ChannelSender {
    client: SlackClient,
    chan_throttle: Throttle,
    list_throttle: Throttle,
    chan_cache: TtlCache<String, Channel>,
    list_cache: TtlCache<String, Vec<Channel>>,
    chan_mutex: Mutex<()>,
    list_mutex: Mutex<()>,
    bot_token: String,
    timestamps: std::sync::Arc<dyn AlertMessageTimestamps>,
}

impl ChannelSender {
    pub fn new(
        bot_token: String,
        api_base: String,
        throttle_interval: Duration,
        channel_cache_size: usize,
        channel_cache_ttl: Duration,
        list_cache_size: usize,
        list_cache_ttl: Duration,
        timestamps: std::sync::Arc<dyn AlertMessageTimestamps>,
    ) -> Self {
        Self {
            client: SlackClient::new(bot_token.clone(), api_base),
            chan_throttle: Throttle::new(throttle_interval),
            list_throttle: Throttle::new(throttle_interval),
            chan_cache: TtlCache::new(channel_cache_size, channel_cache_ttl),
            list_cache: TtlCache::new(list_cache_size, list_cache_ttl),
            chan_mutex: Mutex::new(()),
            list_mutex: Mutex::new(()),
            bot_token,
            timestamps,
        }
    }

    /// Returns the cached channel entry, or loads it from `conversations.info`
    /// on a miss. The mutex is held across the miss + fetch so concurrent
    /// misses on the same key coalesce into one upstream call.
    pub async fn channel(&self, principal: &Principal, channel_id: &str) -> CoreResult<Channel> {
        principal.limit_check_any(&[PrincipalMatch::User, PrincipalMatch::System])?;
        let _guard = self.chan_mutex.lock().await;
        if let Some(channel) = self.chan_cache.get(&channel_id.to_string()).await {
            return Ok(channel);
        }
        let channel = self.load_channel(channel_id).await?;
        self.chan_cache
            .insert(channel_id.to_string(), channel.clone())
            .await;
        Ok(channel)
    }

    async fn load_channel(&self, channel_id: &str) -> CoreResult<Channel> {
        self.chan_throttle.wait().await;

        let result: SlackApiResult<ChannelInfoResponse> = self
            .client
            .call_form(
                "conversations.info",
                vec![("channel", channel_id.to_string())],
            )
            .await?;

        match result {
            SlackApiResult::Ok(res) => Ok(Channel {
                id: res.channel.id,
                name: format!("#{}", res.channel.name),
            }),
            SlackApiResult::RateLimited { retry_after } => {
                let wait = retry_after.unwrap_or(Duration::from_secs(1));
                self.chan_throttle
                    .set_wait_until(Instant::now() + wait)
                    .await;
                // Retry once, recursively, matching the original.
                Box::pin(self.load_channel(channel_id)).await
            }
            SlackApiResult::Error(err) => Err(wrap_error(&err)),
        }
    }

    /// Paginated fetch of non-archived channels, aborting after 10 pages.
    /// Defensively copies the list before caching and before returning so
    /// callers cannot mutate cached state.
    pub async fn list_channels(&self, principal: &Principal) -> CoreResult<Vec<Channel>> {
        principal.limit_check_any(&[PrincipalMatch::User, PrincipalMatch::System])?;
        let _guard = self.list_mutex.lock().await;
        if let Some(channels) = self.list_cache.get(&self.bot_token).await {
            return Ok(channels);
        }
        let channels = self.load_channels().await?;
        self.list_cache
            .insert(self.bot_token.clone(), channels.clone())
            .await;
        Ok(channels)
    }

    async fn load_channels(&self) -> CoreResult<Vec<Channel>> {
        let mut channels = Vec::new();
        let mut cursor = String::new();
        let mut page = 0;

        loop {
            page += 1;
            if page > 10 {
                return Err(CoreError::internal(anyhow::anyhow!(
                    "abort after > 10 pages of Slack channels"
                )));
            }

            self.list_throttle.wait().await;

            let mut params = vec![
                ("exclude_archived", "true".to_string()),
                ("types", "private_channel,public_channel".to_string()),
                ("limit", "200".to_string()),
            ];
            if !cursor.is_empty() {
                params.push(("cursor", cursor.clone()));
            }

            let result: SlackApiResult<ChannelsListResponse> = self
                .client
                .call_form("users.conversations", params)
                .await?;

            match result {
                SlackApiResult::Ok(res) => {
                    channels.extend(
                        res.channels
                            .into_iter()
                            .map(|c| Channel { id: c.id, name: c.name }),
                    );
                    let next_cursor = res
                        .response_metadata
                        .map(|m| m.next_cursor)
                        .unwrap_or_default();
                    if next_cursor.is_empty() {
                        break;
                    }
                    cursor = next_cursor;
                }
                SlackApiResult::RateLimited { retry_after } => {
                    let wait = retry_after.unwrap_or(Duration::from_secs(1));
                    self.list_throttle
                        .set_wait_until(Instant::now() + wait)
                        .await;
                    page -= 1; // re-fetch the current page, not a new one
                    continue;
                }
                SlackApiResult::Error(err) => return Err(wrap_error(&err)),
            }
        }

        for channel in &mut channels {
            channel.name = format!("#{}", channel.name);
        }

        Ok(channels)
    }

    /// Posts a new message for `Alert` notifications, then edits every
    /// previously-known timestamp for this alert with the freshly-rendered
    /// content - the "one thread per alert, edited on every status change"
    /// behavior. Timestamps are the idempotency key.
    pub async fn send(
        &self,
        channel_id: &str,
        alert_id: i64,
        notification: &Notification,
    ) -> CoreResult<SendResult> {
        let rendered = match notification {
            Notification::Alert { summary, .. } => summary.clone(),
            Notification::AlertBundle {
                service_name,
                count,
            } => format!(
                "Service '{service_name}' has {count} unacknowledged alerts."
            ),
            Notification::AlertStatus { summary, .. } => summary.clone(),
            _ => {
                return Err(CoreError::ClientProvider {
                    message: "unsupported message type for Slack channel sender".to_string(),
                })
            }
        };

        let timestamps = self
            .timestamps
            .find_slack_alert_msg_timestamps(alert_id, channel_id)
            .await?;

        let mut posted_ts = None;
        if matches!(notification, Notification::Alert { .. }) {
            let ts = self.post_message(channel_id, &rendered).await?;
            self.timestamps
                .record_slack_alert_msg_timestamp(alert_id, channel_id, &ts)
                .await?;
            posted_ts = Some(ts);
        }

        for ts in &timestamps {
            self.update_message(channel_id, ts, &rendered).await?;
        }

        Ok(SendResult::Delivered {
            provider_message_id: posted_ts,
        })
    }

    async fn post_message(&self, channel_id: &str, text: &str) -> CoreResult<String> {
        let result: SlackApiResult<PostMessageResponse> = self
            .client
            .call_form(
                "chat.postMessage",
                vec![
                    ("channel", channel_id.to_string()),
                    ("text", text.to_string()),
                ],
            )
            .await?;
        match result {
            SlackApiResult::Ok(res) => Ok(res.ts),
            SlackApiResult::RateLimited { .. } => Err(CoreError::TransientProvider {
                source: anyhow::anyhow!("rate limited posting message"),
            }),
            SlackApiResult::Error(err) => Err(wrap_error(&err)),
        }
    }

    async fn update_message(&self, channel_id: &str, ts: &str, text: &str) -> CoreResult<()> {
        let result: SlackApiResult<serde_json::Value> = self
            .client
            .call_form(
                "chat.update",
                vec![
                    ("channel", channel_id.to_string()),
                    ("ts", ts.to_string()),
                    ("text", text.to_string()),
                ],
            )
            .await?;
        match result {
            SlackApiResult::Ok(_) => Ok(()),
            SlackApiResult::RateLimited { .. } => Err(CoreError::TransientProvider {
                source: anyhow::anyhow!("rate limited updating message"),
            }),
            SlackApiResult::Error(err) => Err(wrap_error(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_error_maps_known_slack_errors() {
        assert!(matches!(
            wrap_error("channel_not_found"),
            CoreError::Validation { .. }
        ));
        assert!(matches!(
            wrap_error("invalid_auth"),
            CoreError::ClientProvider { .. }
        ));
        assert!(matches!(
            wrap_error("something_else"),
            CoreError::ClientProvider { .. }
        ));
    }
}
