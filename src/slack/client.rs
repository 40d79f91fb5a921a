use crate::error::CoreResult;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Transport for the Slack Web API, generalized from the teacher's
/// `SlackClient::call_api<T>` helper to the `x-www-form-urlencoded` POST
/// shape the directory-lookup endpoints use (`conversations.info`,
/// `users.conversations`), with the response status surfaced so callers can
/// implement `429`/`Retry-After` handling themselves rather than have it
/// swallowed by the transport.
#[derive(Clone)]
pub struct SlackClient {
    http_client: Client,
    bot_token: String,
    api_base: String,
}

/// The outcome of one Slack Web API call. `RateLimited` is a first-class
/// variant (not an error) so `channel`/`list_channels` can retry instead of
/// failing.
pub enum SlackApiResult<T> {
    Ok(T),
    RateLimited { retry_after: Option<Duration> },
    Error(String),
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    data: Option<T>,
}

impl SlackClient {
    pub fn new(bot_token: String, api_base: String) -> Self {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build Slack HTTP client");

        Self {
            http_client,
            bot_token,
            api_base,
        }
    }

    /// POSTs `method` with `params` (plus the bot token) form-encoded, and
    /// decodes the `{ok, error, ...}` envelope. A non-200/429 status is
    /// surfaced as an error; 429 is surfaced as `RateLimited` with whatever
    /// `Retry-After` Slack sent, parsed to seconds.
    pub async fn call_form<T: DeserializeOwned>(
        &self,
        method: &str,
        mut params: Vec<(&str, String)>,
    ) -> CoreResult<SlackApiResult<T>> {
        debug!(method, "calling Slack API");
        params.push(("token", self.bot_token.clone()));

        let url = format!("{}/{}", self.api_base.trim_end_matches('/'), method);
        let response = self.http_client.post(&url).form(&params).send().await?;

        if response.status().as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Ok(SlackApiResult::RateLimited { retry_after });
        }

        if !response.status().is_success() {
            return Err(crate::error::CoreError::TransientProvider {
                source: anyhow::anyhow!("non-200 response from Slack: {}", response.status()),
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        if !envelope.ok {
            return Ok(SlackApiResult::Error(
                envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            ));
        }

        match envelope.data {
            Some(data) => Ok(SlackApiResult::Ok(data)),
            None => Ok(SlackApiResult::Error("missing_data".to_string())),
        }
    }
}
