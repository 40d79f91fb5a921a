use crate::db::models::{
    Alert, AlertLogEntry, Dest, DestKind, OnCallUser, OutgoingMessage, SendResult,
};
use crate::error::CoreResult;
use sqlx::PgPool;
use uuid::Uuid;

/// Claims up to `limit` unclaimed rows for this worker in one round trip:
/// `FOR UPDATE SKIP LOCKED` inside the same statement that stamps
/// `claimed_at`, so two workers racing the same poll never claim the same
/// row twice.
pub async fn claim_batch(pool: &PgPool, limit: i64) -> CoreResult<Vec<OutgoingMessage>> {
    let rows = sqlx::query_as::<_, OutgoingMessage>(
        r#"
        WITH claimed AS (
            SELECT id FROM outgoing_messages
            WHERE sent_at IS NULL AND claimed_at IS NULL
            ORDER BY created_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        UPDATE outgoing_messages
        SET claimed_at = NOW()
        WHERE id IN (SELECT id FROM claimed)
        RETURNING outgoing_messages.*
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Releases a claim without marking the row sent, so a transient dispatch
/// failure is retried on a future poll instead of stuck claimed forever.
pub async fn release_claim(pool: &PgPool, id: Uuid) -> CoreResult<()> {
    sqlx::query("UPDATE outgoing_messages SET claimed_at = NULL WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Records the terminal outcome of a dispatch attempt against its row.
pub async fn record_result(pool: &PgPool, id: Uuid, result: &SendResult) -> CoreResult<()> {
    let (state, fail_reason): (&str, Option<String>) = match result {
        SendResult::Delivered { .. } => ("delivered", None),
        SendResult::Sent => ("sent", None),
        SendResult::FailedPerm { reason } => ("failed_perm", Some(reason.clone())),
    };
    sqlx::query(
        r#"
        UPDATE outgoing_messages
        SET sent_at = NOW(), state = $2, fail_reason = $3
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(state)
    .bind(fail_reason)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn find_alert(pool: &PgPool, alert_id: i64) -> CoreResult<Option<Alert>> {
    let row = sqlx::query_as::<_, Alert>("SELECT * FROM alerts WHERE id = $1")
        .bind(alert_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn find_alert_log_entry(
    pool: &PgPool,
    alert_log_id: i64,
) -> CoreResult<Option<AlertLogEntry>> {
    let row = sqlx::query_as::<_, AlertLogEntry>("SELECT * FROM alert_logs WHERE id = $1")
        .bind(alert_log_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// The outgoing message row (if any) that first recorded a status for this
/// `(alert_id, dest)` pair, excluding `exclude_message_id` (the message
/// currently being dispatched, so a message never treats itself as its own
/// predecessor).
#[derive(Debug, Clone)]
pub struct OriginalMessageStatus {
    pub message_id: Uuid,
    pub state: String,
}

pub async fn find_original_message_status(
    pool: &PgPool,
    alert_id: i64,
    dest: &Dest,
    exclude_message_id: Uuid,
) -> CoreResult<Option<OriginalMessageStatus>> {
    let row = sqlx::query_as::<_, (Uuid, String)>(
        r#"
        SELECT id, state FROM outgoing_messages
        WHERE alert_id = $1 AND dest_id = $2 AND id != $3 AND state IS NOT NULL
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .bind(alert_id)
    .bind(dest.id)
    .bind(exclude_message_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(message_id, state)| OriginalMessageStatus { message_id, state }))
}

/// `(service name, count of non-closed alerts)` for a service — used by the
/// dispatcher to suppress `AlertBundle` sends once every alert in the bundle
/// has been acked or closed.
pub async fn service_info(pool: &PgPool, service_id: Uuid) -> CoreResult<Option<(String, i64)>> {
    let row = sqlx::query_as::<_, (String, i64)>(
        r#"
        SELECT s.name, COUNT(a.id) FILTER (WHERE a.status != 'closed')
        FROM services s
        LEFT JOIN alerts a ON a.service_id = s.id
        WHERE s.id = $1
        GROUP BY s.name
        "#,
    )
    .bind(service_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn verification_code(pool: &PgPool, verify_id: Uuid) -> CoreResult<Option<i64>> {
    let row = sqlx::query_as::<_, (i64,)>(
        "SELECT code FROM user_verification_codes WHERE id = $1",
    )
    .bind(verify_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(code,)| code))
}

/// `(schedule name, users currently on call)` for a schedule.
pub async fn on_call_users(
    pool: &PgPool,
    schedule_id: Uuid,
) -> CoreResult<(String, Vec<OnCallUser>)> {
    let name: Option<(String,)> = sqlx::query_as("SELECT name FROM schedules WHERE id = $1")
        .bind(schedule_id)
        .fetch_optional(pool)
        .await?;
    let schedule_name = name.map(|(n,)| n).unwrap_or_default();

    let users = sqlx::query_as::<_, OnCallUser>(
        r#"
        SELECT u.id, u.name
        FROM schedule_on_call_users socu
        JOIN users u ON u.id = socu.user_id
        WHERE socu.schedule_id = $1
        "#,
    )
    .bind(schedule_id)
    .fetch_all(pool)
    .await?;

    Ok((schedule_name, users))
}

/// Callback URL of a user's default contact method, used to enrich
/// `ScheduleOnCallUsers` recipients.
pub async fn callback_url_for_user(pool: &PgPool, user_id: Uuid) -> CoreResult<Option<String>> {
    let row = sqlx::query_as::<_, (String,)>(
        r#"
        SELECT value FROM user_contact_methods
        WHERE user_id = $1
        ORDER BY created_at ASC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(value,)| value))
}

/// Records that `dest` has now seen `alert_id` at least once, so subsequent
/// sends know this isn't the first message. `ON CONFLICT DO NOTHING` makes
/// this idempotent under concurrent first-sends; failures here are logged,
/// never propagated, per the dispatcher's post-send side-effect policy.
pub async fn track_status_subscription(
    pool: &PgPool,
    dest: &Dest,
    alert_id: i64,
) -> CoreResult<()> {
    match dest.kind {
        DestKind::NotificationChannel => {
            sqlx::query(
                r#"
                INSERT INTO alert_status_subscriptions (channel_id, alert_id, last_alert_status)
                VALUES ($1, $2, 'triggered')
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(dest.id)
            .bind(alert_id)
            .execute(pool)
            .await?;
        }
        DestKind::ContactMethod => {
            sqlx::query(
                r#"
                INSERT INTO alert_status_subscriptions (contact_method_id, alert_id, last_alert_status)
                VALUES ($1, $2, 'triggered')
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(dest.id)
            .bind(alert_id)
            .execute(pool)
            .await?;
        }
    }
    Ok(())
}
