//! Durable storage for Slack message timestamps per `(alert_id, channel_id)`,
//! backing [`crate::slack::AlertMessageTimestamps`] - the persistence side of
//! the capability interface the channel sender depends on.

use sqlx::PgPool;

use crate::error::CoreResult;
use crate::slack::AlertMessageTimestamps;

pub struct PgAlertMessageTimestamps {
    pool: PgPool,
}

impl PgAlertMessageTimestamps {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AlertMessageTimestamps for PgAlertMessageTimestamps {
    async fn find_slack_alert_msg_timestamps(
        &self,
        alert_id: i64,
        channel_id: &str,
    ) -> CoreResult<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT ts FROM slack_alert_message_timestamps
            WHERE alert_id = $1 AND channel_id = $2
            ORDER BY created_at ASC
            "#,
        )
        .bind(alert_id)
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(ts,)| ts).collect())
    }

    async fn record_slack_alert_msg_timestamp(
        &self,
        alert_id: i64,
        channel_id: &str,
        ts: &str,
    ) -> CoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO slack_alert_message_timestamps (alert_id, channel_id, ts)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(alert_id)
        .bind(channel_id)
        .bind(ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
