//! Central send-message dispatch: one entry point that turns an
//! [`OutgoingMessage`] row into a rendered [`Notification`] plus a
//! provider-specific send, mirroring `engine/sendmessage.go`'s per-type
//! switch.

use std::sync::Arc;

use uuid::Uuid;

use crate::db::models::{DestProvider, OutgoingMessage, OutgoingMessageType, SendResult};
use crate::db::queries::outgoing::OriginalMessageStatus;
use crate::error::{CoreError, CoreResult};
use crate::notification::{Notification, OnCallUserWithCallback};
use crate::permission::{Principal, PrincipalMatch};
use crate::slack::ChannelSender;
use crate::webhook::WebhookSender;

/// The prepared lookups a dispatch needs, one capability per lookup rather
/// than a single monolithic store - this is what breaks the cyclic wiring a
/// combined notification store would otherwise require.
#[async_trait::async_trait]
pub trait DispatcherBackend: Send + Sync {
    async fn find_alert(&self, alert_id: i64) -> CoreResult<Option<crate::db::models::Alert>>;

    async fn find_alert_log_entry(
        &self,
        alert_log_id: i64,
    ) -> CoreResult<Option<crate::db::models::AlertLogEntry>>;

    async fn find_original_message_status(
        &self,
        alert_id: i64,
        dest: &crate::db::models::Dest,
        exclude_message_id: Uuid,
    ) -> CoreResult<Option<OriginalMessageStatus>>;

    async fn service_info(&self, service_id: Uuid) -> CoreResult<Option<(String, i64)>>;

    async fn verification_code(&self, verify_id: Uuid) -> CoreResult<Option<i64>>;

    async fn on_call_users(
        &self,
        schedule_id: Uuid,
    ) -> CoreResult<(String, Vec<crate::db::models::OnCallUser>)>;

    /// `INSERT ... ON CONFLICT DO NOTHING`; failures are logged, never
    /// propagated - this is a best-effort subscription record, not the
    /// delivery itself.
    async fn track_status_subscription(
        &self,
        dest: &crate::db::models::Dest,
        alert_id: i64,
    ) -> CoreResult<()>;

    /// Callback URL for a contact method, used to enrich `ScheduleOnCallUsers`
    /// recipients. Returns `None` if the user has no configured callback.
    async fn callback_url_for_user(&self, user_id: Uuid) -> CoreResult<Option<String>>;
}

/// [`DispatcherBackend`] backed directly by the `db::queries` modules - the
/// concrete wiring used at the composition root.
pub struct PgDispatcherBackend {
    pool: sqlx::PgPool,
}

impl PgDispatcherBackend {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DispatcherBackend for PgDispatcherBackend {
    async fn find_alert(&self, alert_id: i64) -> CoreResult<Option<crate::db::models::Alert>> {
        crate::db::queries::outgoing::find_alert(&self.pool, alert_id).await
    }

    async fn find_alert_log_entry(
        &self,
        alert_log_id: i64,
    ) -> CoreResult<Option<crate::db::models::AlertLogEntry>> {
        crate::db::queries::outgoing::find_alert_log_entry(&self.pool, alert_log_id).await
    }

    async fn find_original_message_status(
        &self,
        alert_id: i64,
        dest: &crate::db::models::Dest,
        exclude_message_id: Uuid,
    ) -> CoreResult<Option<OriginalMessageStatus>> {
        crate::db::queries::outgoing::find_original_message_status(
            &self.pool,
            alert_id,
            dest,
            exclude_message_id,
        )
        .await
    }

    async fn service_info(&self, service_id: Uuid) -> CoreResult<Option<(String, i64)>> {
        crate::db::queries::outgoing::service_info(&self.pool, service_id).await
    }

    async fn verification_code(&self, verify_id: Uuid) -> CoreResult<Option<i64>> {
        crate::db::queries::outgoing::verification_code(&self.pool, verify_id).await
    }

    async fn on_call_users(
        &self,
        schedule_id: Uuid,
    ) -> CoreResult<(String, Vec<crate::db::models::OnCallUser>)> {
        crate::db::queries::outgoing::on_call_users(&self.pool, schedule_id).await
    }

    async fn track_status_subscription(
        &self,
        dest: &crate::db::models::Dest,
        alert_id: i64,
    ) -> CoreResult<()> {
        crate::db::queries::outgoing::track_status_subscription(&self.pool, dest, alert_id).await
    }

    async fn callback_url_for_user(&self, user_id: Uuid) -> CoreResult<Option<String>> {
        crate::db::queries::outgoing::callback_url_for_user(&self.pool, user_id).await
    }
}

/// Outcome of [`Dispatcher::build_notification`]: either a notification ready
/// to send, or a terminal result that short-circuits the send (e.g. an
/// `AlertBundle` whose alerts were all acked/closed before it went out).
enum Prepared {
    Notification(Notification),
    Suppressed(SendResult),
}

pub struct Dispatcher {
    backend: Arc<dyn DispatcherBackend>,
    slack: Arc<ChannelSender>,
    webhook: Arc<WebhookSender>,
    webhook_allowlist: Vec<String>,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn DispatcherBackend>,
        slack: Arc<ChannelSender>,
        webhook: Arc<WebhookSender>,
        webhook_allowlist: Vec<String>,
    ) -> Self {
        Self {
            backend,
            slack,
            webhook,
            webhook_allowlist,
        }
    }

    fn is_webhook_url_allowed(&self, url: &str) -> bool {
        self.webhook_allowlist.iter().any(|p| url.starts_with(p))
    }

    /// Re-scopes the caller's principal the way `sendMessage` re-scopes its
    /// context: a user contact method dest acts as that user, anything else
    /// acts as the system "SendMessage" component.
    fn scoped_principal(&self, msg: &OutgoingMessage) -> CoreResult<Principal> {
        if msg.dest_kind == "contact_method" {
            let user_id = msg.user_id.ok_or_else(|| {
                CoreError::validation("user_id", "contact method dest requires a user_id")
            })?;
            Ok(Principal::user(user_id, crate::permission::Role::User))
        } else {
            Principal::system("SendMessage")
        }
    }

    /// Dispatches one outgoing message to its destination, returning the
    /// terminal [`SendResult`]. Dependency-lookup failures propagate as
    /// `CoreError` (transient, the caller retries); a message suppressed by
    /// `build_notification` (e.g. an `AlertBundle` with nothing left open)
    /// resolves directly to its `SendResult::FailedPerm`.
    pub async fn send_message(&self, msg: &OutgoingMessage) -> CoreResult<SendResult> {
        let principal = self.scoped_principal(msg)?;
        principal.limit_check_any(&[PrincipalMatch::System, PrincipalMatch::User])?;

        let dest = msg.dest();

        let notification = match self.build_notification(msg, &dest).await? {
            Prepared::Notification(n) => n,
            Prepared::Suppressed(result) => return Ok(result),
        };

        let result = match dest.provider {
            DestProvider::Slack => self.slack.send(&dest.value, msg.alert_id.unwrap_or(0), &notification).await?,
            DestProvider::Webhook => {
                self.webhook
                    .send(
                        &dest.value,
                        |url| self.is_webhook_url_allowed(url),
                        &principal,
                        &notification,
                    )
                    .await?
            }
        };

        self.post_send(msg, &dest, &notification, &result).await;

        Ok(result)
    }

    /// Builds the rendered [`Notification`] plus prework described in the
    /// `msg.Type` dispatch table, or a terminal [`SendResult`] when the
    /// message should be suppressed rather than sent.
    async fn build_notification(
        &self,
        msg: &OutgoingMessage,
        dest: &crate::db::models::Dest,
    ) -> CoreResult<Prepared> {
        let notification = match msg.message_type {
            OutgoingMessageType::AlertBundle => {
                let service_id = msg.service_id.ok_or_else(|| {
                    CoreError::validation("service_id", "AlertBundle requires service_id")
                })?;
                let (service_name, open_count) = self
                    .backend
                    .service_info(service_id)
                    .await?
                    .ok_or_else(|| CoreError::validation("service_id", "service not found"))?;
                if open_count == 0 {
                    return Ok(Prepared::Suppressed(SendResult::FailedPerm {
                        reason: "alerts acked/closed before message sent".to_string(),
                    }));
                }
                Notification::AlertBundle {
                    service_name,
                    count: open_count,
                }
            }
            OutgoingMessageType::Alert => {
                let alert_id = msg
                    .alert_id
                    .ok_or_else(|| CoreError::validation("alert_id", "Alert requires alert_id"))?;
                let alert = self
                    .backend
                    .find_alert(alert_id)
                    .await?
                    .ok_or_else(|| CoreError::validation("alert_id", "alert not found"))?;
                Notification::Alert {
                    alert_id,
                    summary: alert.summary,
                }
            }
            OutgoingMessageType::AlertStatus => {
                let alert_log_id = msg.alert_log_id.ok_or_else(|| {
                    CoreError::validation("alert_log_id", "AlertStatus requires alert_log_id")
                })?;
                let alert_id = msg.alert_id.ok_or_else(|| {
                    CoreError::validation("alert_id", "AlertStatus requires alert_id")
                })?;
                let log_entry = self
                    .backend
                    .find_alert_log_entry(alert_log_id)
                    .await?
                    .ok_or_else(|| CoreError::validation("alert_log_id", "log entry not found"))?;
                let alert = self
                    .backend
                    .find_alert(alert_id)
                    .await?
                    .ok_or_else(|| CoreError::validation("alert_id", "alert not found"))?;
                self.backend
                    .find_original_message_status(alert_id, dest, msg.id)
                    .await?
                    .ok_or_else(|| {
                        CoreError::validation(
                            "alert_id",
                            "AlertStatus requires a prior original message",
                        )
                    })?;
                Notification::AlertStatus {
                    alert_id,
                    summary: alert.summary,
                    status: log_entry.event.new_status(),
                    event: log_entry.event,
                }
            }
            OutgoingMessageType::Test => Notification::Test,
            OutgoingMessageType::Verification => {
                let verify_id = msg.verify_id.ok_or_else(|| {
                    CoreError::validation("verify_id", "Verification requires verify_id")
                })?;
                let code = self
                    .backend
                    .verification_code(verify_id)
                    .await?
                    .ok_or_else(|| CoreError::validation("verify_id", "verification code not found"))?;
                Notification::Verification { code }
            }
            OutgoingMessageType::ScheduleOnCallUsers => {
                let schedule_id = msg.schedule_id.ok_or_else(|| {
                    CoreError::validation(
                        "schedule_id",
                        "ScheduleOnCallUsers requires schedule_id",
                    )
                })?;
                let (schedule_name, users) = self.backend.on_call_users(schedule_id).await?;
                let mut enriched = Vec::with_capacity(users.len());
                for user in users {
                    let callback_url = self
                        .backend
                        .callback_url_for_user(user.id)
                        .await?
                        .unwrap_or_default();
                    enriched.push(OnCallUserWithCallback {
                        id: user.id,
                        name: user.name,
                        callback_url,
                    });
                }
                Notification::ScheduleOnCallUsers {
                    schedule_name,
                    users: enriched,
                }
            }
        };
        Ok(Prepared::Notification(notification))
    }

    /// Post-send side effects: `NotificationSent` logging plus first-message
    /// status-subscription tracking, both best-effort and non-fatal.
    async fn post_send(
        &self,
        msg: &OutgoingMessage,
        dest: &crate::db::models::Dest,
        notification: &Notification,
        result: &SendResult,
    ) {
        match notification {
            Notification::AlertBundle { .. } => {
                tracing::info!(message_id = %msg.id, service_id = ?msg.service_id, "notification sent");
            }
            Notification::Alert { alert_id, .. } => {
                tracing::info!(message_id = %msg.id, alert_id, "notification sent");

                if !matches!(result, SendResult::FailedPerm { .. }) {
                    let original = self
                        .backend
                        .find_original_message_status(*alert_id, dest, msg.id)
                        .await;
                    if matches!(original, Ok(None)) {
                        if let Err(err) = self.backend.track_status_subscription(dest, *alert_id).await {
                            tracing::warn!(message_id = %msg.id, error = %err, "failed to track status subscription");
                        }
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Alert, AlertLogEntry, AlertStatus, Dest, OnCallUser};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeBackend {
        alert: Option<Alert>,
        service_info: Option<(String, i64)>,
        tracked: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl DispatcherBackend for FakeBackend {
        async fn find_alert(&self, _alert_id: i64) -> CoreResult<Option<Alert>> {
            Ok(self.alert.clone())
        }
        async fn find_alert_log_entry(&self, _id: i64) -> CoreResult<Option<AlertLogEntry>> {
            Ok(None)
        }
        async fn find_original_message_status(
            &self,
            _alert_id: i64,
            _dest: &Dest,
            _exclude: Uuid,
        ) -> CoreResult<Option<OriginalMessageStatus>> {
            Ok(None)
        }
        async fn service_info(&self, _service_id: Uuid) -> CoreResult<Option<(String, i64)>> {
            Ok(self.service_info.clone())
        }
        async fn verification_code(&self, _verify_id: Uuid) -> CoreResult<Option<i64>> {
            Ok(None)
        }
        async fn on_call_users(&self, _schedule_id: Uuid) -> CoreResult<(String, Vec<OnCallUser>)> {
            Ok((String::new(), Vec::new()))
        }
        async fn track_status_subscription(&self, _dest: &Dest, alert_id: i64) -> CoreResult<()> {
            self.tracked.lock().unwrap().push(alert_id);
            Ok(())
        }
        async fn callback_url_for_user(&self, _user_id: Uuid) -> CoreResult<Option<String>> {
            Ok(None)
        }
    }

    fn make_msg(message_type: OutgoingMessageType) -> OutgoingMessage {
        OutgoingMessage {
            id: Uuid::new_v4(),
            message_type,
            dest_id: Uuid::new_v4(),
            dest_kind: "notification_channel".to_string(),
            dest_provider: "slack".to_string(),
            dest_value: "C0123".to_string(),
            alert_id: None,
            service_id: None,
            alert_log_id: None,
            schedule_id: None,
            verify_id: None,
            user_id: None,
        }
    }

    #[tokio::test]
    async fn alert_bundle_with_zero_open_count_is_suppressed() {
        let backend = Arc::new(FakeBackend {
            alert: None,
            service_info: Some(("svc".to_string(), 0)),
            tracked: Mutex::new(Vec::new()),
        });
        let mut msg = make_msg(OutgoingMessageType::AlertBundle);
        msg.service_id = Some(Uuid::new_v4());
        let dest = msg.dest();
        let dispatcher = backend.clone();
        let prepared = {
            let d = Dispatcher {
                backend: dispatcher,
                slack: Arc::new(unreachable_channel_sender()),
                webhook: Arc::new(crate::webhook::WebhookSender::new(std::time::Duration::from_secs(3))),
                webhook_allowlist: Vec::new(),
            };
            d.build_notification(&msg, &dest).await.unwrap()
        };
        match prepared {
            Prepared::Suppressed(SendResult::FailedPerm { reason }) => {
                assert_eq!(reason, "alerts acked/closed before message sent");
            }
            _ => panic!("expected a suppressed AlertBundle send"),
        }
    }

    #[tokio::test]
    async fn alert_missing_returns_validation_error() {
        let backend = Arc::new(FakeBackend {
            alert: None,
            service_info: None,
            tracked: Mutex::new(Vec::new()),
        });
        let mut msg = make_msg(OutgoingMessageType::Alert);
        msg.alert_id = Some(42);
        let dest = msg.dest();
        let d = Dispatcher {
            backend,
            slack: Arc::new(unreachable_channel_sender()),
            webhook: Arc::new(crate::webhook::WebhookSender::new(std::time::Duration::from_secs(3))),
            webhook_allowlist: Vec::new(),
        };
        let result = d.build_notification(&msg, &dest).await;
        assert!(matches!(result, Err(CoreError::Validation { .. })));
    }

    #[test]
    fn webhook_allowlist_matches_by_prefix() {
        let d = Dispatcher {
            backend: Arc::new(FakeBackend {
                alert: None,
                service_info: None,
                tracked: Mutex::new(Vec::new()),
            }),
            slack: Arc::new(unreachable_channel_sender()),
            webhook: Arc::new(crate::webhook::WebhookSender::new(std::time::Duration::from_secs(3))),
            webhook_allowlist: vec!["https://ok.example/".to_string()],
        };
        assert!(d.is_webhook_url_allowed("https://ok.example/hook"));
        assert!(!d.is_webhook_url_allowed("https://evil.example/hook"));
    }

    /// A `ChannelSender` wired to an unreachable Slack API base - safe for
    /// tests that never exercise the Slack branch.
    fn unreachable_channel_sender() -> crate::slack::ChannelSender {
        struct NoTimestamps;

        #[async_trait]
        impl crate::slack::AlertMessageTimestamps for NoTimestamps {
            async fn find_slack_alert_msg_timestamps(
                &self,
                _alert_id: i64,
                _channel_id: &str,
            ) -> CoreResult<Vec<String>> {
                Ok(Vec::new())
            }
            async fn record_slack_alert_msg_timestamp(
                &self,
                _alert_id: i64,
                _channel_id: &str,
                _ts: &str,
            ) -> CoreResult<()> {
                Ok(())
            }
        }

        crate::slack::ChannelSender::new(
            "test-token".to_string(),
            "http://127.0.0.1:1".to_string(),
            std::time::Duration::from_millis(1),
            10,
            std::time::Duration::from_secs(60),
            10,
            std::time::Duration::from_secs(60),
            Arc::new(NoTimestamps),
        )
    }
}
