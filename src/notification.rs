use crate::db::models::{AlertLogEventType, AlertStatus, OnCallUser};

/// On-call user enriched with a callback URL, as sent in a
/// `ScheduleOnCallUsers` notification.
#[derive(Debug, Clone)]
pub struct OnCallUserWithCallback {
    pub id: uuid::Uuid,
    pub name: String,
    pub callback_url: String,
}

/// Provider-agnostic rendering of an outgoing message, constructed by the
/// dispatcher once per `OutgoingMessage` and handed to the provider-specific
/// sender picked by `Dest`.
#[derive(Debug, Clone)]
pub enum Notification {
    Alert {
        alert_id: i64,
        summary: String,
    },
    AlertBundle {
        service_name: String,
        count: i64,
    },
    AlertStatus {
        alert_id: i64,
        summary: String,
        status: AlertStatus,
        event: AlertLogEventType,
    },
    Test,
    Verification {
        code: i64,
    },
    ScheduleOnCallUsers {
        schedule_name: String,
        users: Vec<OnCallUserWithCallback>,
    },
}
