use crate::db::models::{AlertLogEventType, SendResult};
use crate::error::{CoreError, CoreResult};
use crate::notification::Notification;
use crate::permission::Principal;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// One-shot webhook POST, 3-second timeout by default. Reads `AuthUserID`
/// directly from the authenticated [`Principal`] rather than from a
/// logging-context side channel (`notification/webhook/sender.go` sourced
/// it from `log.ContextFields(ctx)`; see DESIGN.md Open Question 3). A
/// principal with no user id (e.g. the `System` principal most webhook
/// dests dispatch under) sends an empty `UserID`, matching the original's
/// best-effort lookup rather than failing the send.
pub struct WebhookSender {
    client: Client,
}

#[derive(Serialize)]
struct PostDataTest<'a> {
    #[serde(rename = "Type")]
    type_: &'a str,
    #[serde(rename = "UserID")]
    user_id: String,
}

#[derive(Serialize)]
struct PostDataVerification<'a> {
    #[serde(rename = "Type")]
    type_: &'a str,
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "UserID")]
    user_id: String,
}

#[derive(Serialize)]
struct PostDataAlert<'a> {
    #[serde(rename = "Type")]
    type_: &'a str,
    #[serde(rename = "AlertID")]
    alert_id: i64,
    #[serde(rename = "Summary")]
    summary: String,
    #[serde(rename = "UserID")]
    user_id: String,
}

#[derive(Serialize)]
struct PostDataAlertBundle<'a> {
    #[serde(rename = "Type")]
    type_: &'a str,
    #[serde(rename = "ServiceName")]
    service_name: String,
    #[serde(rename = "Count")]
    count: i64,
    #[serde(rename = "UserID")]
    user_id: String,
}

#[derive(Serialize)]
struct PostDataAlertStatus<'a> {
    #[serde(rename = "Type")]
    type_: &'a str,
    #[serde(rename = "AlertID")]
    alert_id: i64,
    #[serde(rename = "Summary")]
    summary: String,
    #[serde(rename = "Event")]
    event: &'a str,
    #[serde(rename = "UserID")]
    user_id: String,
}

impl WebhookSender {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to build webhook HTTP client");
        Self { client }
    }

    /// Builds one of the typed payloads, appends `?type=<AlertType>`, and
    /// POSTs. `AlertStatus` is suppressed (returns `Sent` without a request)
    /// unless the event is `Closed`. Rejects URLs failing `is_allowed`
    /// terminally; HTTP 500 is transient, anything else is `Sent`.
    pub async fn send(
        &self,
        url: &str,
        is_allowed: impl FnOnce(&str) -> bool,
        principal: &Principal,
        notification: &Notification,
    ) -> CoreResult<SendResult> {
        let user_id = principal.user_id().map(|id| id.to_string()).unwrap_or_default();

        let (alert_type, body) = match notification {
            Notification::Test => (
                "Test",
                serde_json::to_vec(&PostDataTest {
                    type_: "Test",
                    user_id: user_id.to_string(),
                })
                .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?,
            ),
            Notification::Verification { code } => (
                "Verification",
                serde_json::to_vec(&PostDataVerification {
                    type_: "Verification",
                    code: code.to_string(),
                    user_id: user_id.to_string(),
                })
                .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?,
            ),
            Notification::Alert { alert_id, summary } => (
                "Alert",
                serde_json::to_vec(&PostDataAlert {
                    type_: "Alert",
                    alert_id: *alert_id,
                    summary: summary.clone(),
                    user_id: user_id.to_string(),
                })
                .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?,
            ),
            Notification::AlertBundle {
                service_name,
                count,
            } => (
                "AlertBundle",
                serde_json::to_vec(&PostDataAlertBundle {
                    type_: "AlertBundle",
                    service_name: service_name.clone(),
                    count: *count,
                    user_id: user_id.to_string(),
                })
                .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?,
            ),
            Notification::AlertStatus {
                alert_id,
                summary,
                event,
                ..
            } => {
                if *event != AlertLogEventType::Closed {
                    return Ok(SendResult::Sent);
                }
                (
                    "AlertStatus",
                    serde_json::to_vec(&PostDataAlertStatus {
                        type_: "AlertStatus",
                        alert_id: *alert_id,
                        summary: summary.clone(),
                        event: "closed",
                        user_id: user_id.to_string(),
                    })
                    .map_err(|e| CoreError::internal(anyhow::anyhow!(e)))?,
                )
            }
            Notification::ScheduleOnCallUsers { .. } => {
                return Err(CoreError::ClientProvider {
                    message: "message type not supported by webhook sender".to_string(),
                })
            }
        };

        if !is_allowed(url) {
            return Ok(SendResult::FailedPerm {
                reason: "invalid or not allowed URL".to_string(),
            });
        }

        let response = self
            .client
            .post(url)
            .query(&[("type", alert_type)])
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;

        if response.status().as_u16() == 500 {
            let text = response.text().await.unwrap_or_default();
            return Err(CoreError::TransientProvider {
                source: anyhow::anyhow!("send failed, {text}"),
            });
        }

        Ok(SendResult::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn alert_status_suppressed_unless_closed_without_request() {
        let sender = WebhookSender::new(Duration::from_secs(3));
        let principal = Principal::user(uuid::Uuid::new_v4(), crate::permission::Role::User);
        let notification = Notification::AlertStatus {
            alert_id: 1,
            summary: "down".to_string(),
            status: crate::db::models::AlertStatus::Active,
            event: AlertLogEventType::Acknowledged,
        };
        let result = sender
            .send(
                "http://should-not-be-called.invalid",
                |_| panic!("is_allowed should not be called for a suppressed send"),
                &principal,
                &notification,
            )
            .await
            .unwrap();
        assert_eq!(result, SendResult::Sent);
    }

    #[tokio::test]
    async fn rejects_disallowed_url_without_request() {
        let sender = WebhookSender::new(Duration::from_secs(3));
        let principal = Principal::user(uuid::Uuid::new_v4(), crate::permission::Role::User);
        let notification = Notification::Test;
        let result = sender
            .send("http://evil", |_| false, &principal, &notification)
            .await
            .unwrap();
        assert_eq!(
            result,
            SendResult::FailedPerm {
                reason: "invalid or not allowed URL".to_string()
            }
        );
    }

    #[tokio::test]
    async fn system_principal_sends_with_empty_user_id() {
        let sender = WebhookSender::new(Duration::from_secs(3));
        let principal = Principal::system("Engine").unwrap();
        let notification = Notification::Test;
        let result = sender
            .send("http://should-not-be-called.invalid", |_| false, &principal, &notification)
            .await
            .unwrap();
        assert_eq!(
            result,
            SendResult::FailedPerm {
                reason: "invalid or not allowed URL".to_string()
            }
        );
    }
}
