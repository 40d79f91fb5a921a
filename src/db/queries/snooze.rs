use crate::db::models::AlertSnooze;
use crate::error::CoreResult;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Find-or-update: one `AlertSnooze` row per `alert_id`. Mirrors
/// `alert/snooze/store.go`'s `_createOrUpdate` (find by alert_id, update
/// `delay_minutes` on a hit, insert on a miss).
pub async fn snooze_tx(
    tx: &mut Transaction<'_, Postgres>,
    alert_id: i64,
    service_id: Uuid,
    delay_minutes: i32,
) -> CoreResult<AlertSnooze> {
    let existing = sqlx::query_as::<_, AlertSnooze>(
        "SELECT * FROM snooze_alert WHERE alert_id = $1",
    )
    .bind(alert_id)
    .fetch_optional(&mut **tx)
    .await?;

    let row = if let Some(existing) = existing {
        sqlx::query_as::<_, AlertSnooze>(
            "UPDATE snooze_alert SET delay_minutes = $2 WHERE alert_id = $1 RETURNING *",
        )
        .bind(existing.alert_id)
        .bind(delay_minutes)
        .fetch_one(&mut **tx)
        .await?
    } else {
        sqlx::query_as::<_, AlertSnooze>(
            r#"
            INSERT INTO snooze_alert (id, alert_id, service_id, last_ack_time, delay_minutes)
            VALUES ($1, $2, $3, NOW(), $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(alert_id)
        .bind(service_id)
        .bind(delay_minutes)
        .fetch_one(&mut **tx)
        .await?
    };

    Ok(row)
}

pub async fn delete_by_alert_ids_tx(
    tx: &mut Transaction<'_, Postgres>,
    alert_ids: &[i64],
) -> CoreResult<()> {
    if alert_ids.is_empty() {
        return Ok(());
    }
    sqlx::query("DELETE FROM snooze_alert WHERE alert_id = ANY($1)")
        .bind(alert_ids)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn delete_by_service_id_tx(
    tx: &mut Transaction<'_, Postgres>,
    service_id: Uuid,
) -> CoreResult<()> {
    sqlx::query("DELETE FROM snooze_alert WHERE service_id = $1")
        .bind(service_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn find_by_alert_id(pool: &PgPool, alert_id: i64) -> CoreResult<Option<AlertSnooze>> {
    let row = sqlx::query_as::<_, AlertSnooze>("SELECT * FROM snooze_alert WHERE alert_id = $1")
        .bind(alert_id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

/// Step 1 of the snooze-manager tick: for every snooze row whose
/// `now() - last_ack_time > delay_minutes`, advance
/// `escalation_policy_state.next_escalation` by the current step's delay and
/// flip the alert to `triggered`.
///
/// The join keeps both `escalation_policy_step_number = ep_step.step_number`
/// and `escalation_policy_step_id = ep_step.id` — the second predicate alone
/// already pins the exact step row via its foreign key, but the first is
/// kept as a defensive check against a state row whose step_number has
/// drifted from the step it points at (see DESIGN.md Open Question 1).
pub async fn promote_expired_snoozes_tx(tx: &mut Transaction<'_, Postgres>) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        with snooze_alert as (
            select
                alert_id,
                service_id,
                last_ack_time,
                delay_minutes
            from snooze_alert
        ), next_delay_time as (
            select
                sa.alert_id,
                sa.last_ack_time,
                sa.delay_minutes,
                ep_step.delay_minutes as delay
            from snooze_alert sa
            join services svc on sa.service_id = svc.id
            join escalation_policy_state ep_state on sa.alert_id = ep_state.alert_id
            join escalation_policy_steps ep_step on svc.escalation_policy_id = ep_step.escalation_policy_id
            where ep_state.step_number = ep_step.step_number
              and ep_state.escalation_policy_step_id = ep_step.id
        ), update_ep_state as (
            update escalation_policy_state ep_state
            set next_escalation = now() + (cast(nd.delay as text) || ' minutes')::interval
            from next_delay_time nd
            where ep_state.alert_id = nd.alert_id
              and now() - nd.last_ack_time > (cast(nd.delay_minutes as text) || ' minutes')::interval
            returning ep_state.alert_id
        )
        update alerts a
        set status = 'triggered'
        from snooze_alert sa, escalation_policy_state ep_state, update_ep_state up_ep_state
        where a.id = sa.alert_id and a.id = ep_state.alert_id and a.id = up_ep_state.alert_id
        "#,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// Step 2 of the tick: drop any snooze row whose alert was just promoted to
/// `triggered` with a future `next_escalation`.
pub async fn delete_promoted_snoozes_tx(tx: &mut Transaction<'_, Postgres>) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        delete from snooze_alert sa
        using alerts a, escalation_policy_state ep_state
        where a.status = 'triggered'
          and sa.alert_id = a.id
          and ep_state.alert_id = sa.alert_id
          and ep_state.next_escalation > now()
        "#,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// Step 3 of the tick: drop any snooze row for an alert that is `closed`.
pub async fn delete_closed_alert_snoozes_tx(tx: &mut Transaction<'_, Postgres>) -> CoreResult<u64> {
    let result = sqlx::query(
        r#"
        delete from snooze_alert sa
        using alerts a
        where sa.alert_id = a.id and a.status = 'closed'
        "#,
    )
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}
