use crate::error::CoreResult;
use crate::schedule::ScheduleData;
use sqlx::PgPool;
use uuid::Uuid;

/// Reads and unmarshals the `schedules.data` jsonb column, mirroring
/// `schedule/storeoncallnotifications.go`'s `OnCallNotifications`.
pub async fn schedule_data(pool: &PgPool, schedule_id: Uuid) -> CoreResult<ScheduleData> {
    let row: Option<(serde_json::Value,)> =
        sqlx::query_as("SELECT data FROM schedules WHERE id = $1")
            .bind(schedule_id)
            .fetch_optional(pool)
            .await?;

    let Some((data,)) = row else {
        return Ok(ScheduleData::default());
    };

    let parsed: ScheduleData = serde_json::from_value(data).unwrap_or_default();
    Ok(parsed)
}

pub async fn set_schedule_data(
    pool: &PgPool,
    schedule_id: Uuid,
    data: &ScheduleData,
) -> CoreResult<()> {
    let value = serde_json::to_value(data)
        .map_err(|e| crate::error::CoreError::internal(anyhow::anyhow!(e)))?;
    sqlx::query("UPDATE schedules SET data = $2 WHERE id = $1")
        .bind(schedule_id)
        .bind(value)
        .execute(pool)
        .await?;
    Ok(())
}
