use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of an alert. Advances triggered -> active (acknowledged)
/// -> closed, or triggered -> closed directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AlertStatus {
    Triggered,
    Active,
    Closed,
}

#[derive(Debug, Clone, FromRow)]
pub struct Alert {
    pub id: i64,
    pub service_id: Uuid,
    pub status: AlertStatus,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// Event recorded against an alert's timeline; drives the dispatcher's
/// new-status derivation for `AlertStatus` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum AlertLogEventType {
    Acknowledged,
    Escalated,
    Closed,
}

impl AlertLogEventType {
    pub fn new_status(self) -> AlertStatus {
        match self {
            AlertLogEventType::Acknowledged => AlertStatus::Active,
            AlertLogEventType::Escalated => AlertStatus::Triggered,
            AlertLogEventType::Closed => AlertStatus::Closed,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct AlertLogEntry {
    pub id: i64,
    pub alert_id: i64,
    pub event: AlertLogEventType,
    pub timestamp: DateTime<Utc>,
}

/// One row per alert: suppresses re-escalation until `last_ack_time +
/// delay_minutes` elapses. At most one row exists per `alert_id`.
#[derive(Debug, Clone, FromRow)]
pub struct AlertSnooze {
    pub id: Uuid,
    pub alert_id: i64,
    pub service_id: Uuid,
    pub last_ack_time: DateTime<Utc>,
    pub delay_minutes: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum ChannelType {
    Slack,
}

/// Durable directory entry for a non-user destination (currently: Slack
/// channels). `(channel_type, value)` is unique.
#[derive(Debug, Clone, FromRow)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub channel_type: ChannelType,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestKind {
    ContactMethod,
    NotificationChannel,
}

/// Which provider actually delivers to a [`Dest`]. Distinct from `DestKind`:
/// a webhook dest is always a notification channel, but the dispatcher
/// still needs to know *which* sender to invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestProvider {
    Slack,
    Webhook,
}

/// Tagged destination: either a user contact method or a shared notification
/// channel, delivered by a specific provider. Immutable value object, never
/// persisted on its own.
#[derive(Debug, Clone)]
pub struct Dest {
    pub kind: DestKind,
    pub provider: DestProvider,
    pub id: Uuid,
    pub value: String,
}

impl Dest {
    pub fn contact_method(provider: DestProvider, id: Uuid, value: impl Into<String>) -> Self {
        Self {
            kind: DestKind::ContactMethod,
            provider,
            id,
            value: value.into(),
        }
    }

    pub fn notification_channel(provider: DestProvider, id: Uuid, value: impl Into<String>) -> Self {
        Self {
            kind: DestKind::NotificationChannel,
            provider,
            id,
            value: value.into(),
        }
    }

    pub fn is_contact_method(&self) -> bool {
        self.kind == DestKind::ContactMethod
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum OutgoingMessageType {
    Alert,
    AlertBundle,
    AlertStatus,
    Test,
    Verification,
    ScheduleOnCallUsers,
}

/// One row the dispatcher consumes exactly once. Exactly the fields required
/// by `message_type` are expected to be populated; the dispatcher validates
/// this per-arm rather than at the type level, matching the original's flat
/// row shape.
#[derive(Debug, Clone, FromRow)]
pub struct OutgoingMessage {
    pub id: Uuid,
    pub message_type: OutgoingMessageType,
    pub dest_id: Uuid,
    pub dest_kind: String,
    pub dest_provider: String,
    pub dest_value: String,
    pub alert_id: Option<i64>,
    pub service_id: Option<Uuid>,
    pub alert_log_id: Option<i64>,
    pub schedule_id: Option<Uuid>,
    pub verify_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}

impl OutgoingMessage {
    pub fn dest(&self) -> Dest {
        let kind = if self.dest_kind == "contact_method" {
            DestKind::ContactMethod
        } else {
            DestKind::NotificationChannel
        };
        let provider = if self.dest_provider == "webhook" {
            DestProvider::Webhook
        } else {
            DestProvider::Slack
        };
        Dest {
            kind,
            provider,
            id: self.dest_id,
            value: self.dest_value.clone(),
        }
    }
}

/// Terminal outcome of a dispatch attempt. `FailedPerm` is data, not an
/// error: unknown message types, rendering failures, and "no open alerts"
/// all resolve here rather than propagating up as `CoreError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendResult {
    Delivered {
        provider_message_id: Option<String>,
    },
    Sent,
    FailedPerm {
        reason: String,
    },
}

impl SendResult {
    pub fn is_terminal_failure(&self) -> bool {
        matches!(self, SendResult::FailedPerm { .. })
    }
}

/// Tracks which alert statuses a dest has already been notified about, so
/// the dispatcher can tell "first message for this alert" from "update".
/// Either `channel_id` or `contact_method_id` is set, never both.
#[derive(Debug, Clone, FromRow)]
pub struct AlertStatusSubscription {
    pub channel_id: Option<Uuid>,
    pub contact_method_id: Option<Uuid>,
    pub alert_id: i64,
    pub last_alert_status: AlertStatus,
}

#[derive(Debug, Clone, FromRow)]
pub struct EscalationPolicyState {
    pub alert_id: i64,
    pub escalation_policy_id: Uuid,
    pub step_number: i32,
    pub escalation_policy_step_id: Uuid,
    pub next_escalation: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct EscalationPolicyStep {
    pub id: Uuid,
    pub escalation_policy_id: Uuid,
    pub step_number: i32,
    pub delay_minutes: i32,
}

#[derive(Debug, Clone, FromRow)]
pub struct OnCallUser {
    pub id: Uuid,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_log_event_type_maps_to_alert_status() {
        assert_eq!(
            AlertLogEventType::Acknowledged.new_status(),
            AlertStatus::Active
        );
        assert_eq!(
            AlertLogEventType::Escalated.new_status(),
            AlertStatus::Triggered
        );
        assert_eq!(AlertLogEventType::Closed.new_status(), AlertStatus::Closed);
    }

    #[test]
    fn dest_kind_classification() {
        let id = Uuid::new_v4();
        let cm = Dest::contact_method(DestProvider::Webhook, id, "+15555550100");
        let nc = Dest::notification_channel(DestProvider::Slack, id, "C0123");
        assert!(cm.is_contact_method());
        assert!(!nc.is_contact_method());
    }

    #[test]
    fn send_result_terminal_failure_classification() {
        assert!(SendResult::FailedPerm {
            reason: "bad url".to_string()
        }
        .is_terminal_failure());
        assert!(!SendResult::Sent.is_terminal_failure());
        assert!(!SendResult::Delivered {
            provider_message_id: None
        }
        .is_terminal_failure());
    }
}
