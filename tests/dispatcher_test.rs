use incident_bot::db::models::{OutgoingMessage, OutgoingMessageType, SendResult};
use incident_bot::db::queries::outgoing;
use sqlx::Row;
use uuid::Uuid;

mod common;

async fn insert_service(pool: &sqlx::PgPool) -> Uuid {
    sqlx::query("INSERT INTO services (name, escalation_policy_id) VALUES ($1, $2) RETURNING id")
        .bind("Test Service")
        .bind(Uuid::new_v4())
        .fetch_one(pool)
        .await
        .unwrap()
        .get(0)
}

async fn insert_alert(pool: &sqlx::PgPool, service_id: Uuid) -> i64 {
    sqlx::query(
        "INSERT INTO alerts (service_id, status, summary) VALUES ($1, 'triggered', 'disk full') RETURNING id",
    )
    .bind(service_id)
    .fetch_one(pool)
    .await
    .unwrap()
    .get(0)
}

fn webhook_message(message_type: OutgoingMessageType, dest_value: &str) -> OutgoingMessage {
    OutgoingMessage {
        id: Uuid::new_v4(),
        message_type,
        dest_id: Uuid::new_v4(),
        dest_kind: "notification_channel".to_string(),
        dest_provider: "webhook".to_string(),
        dest_value: dest_value.to_string(),
        alert_id: None,
        service_id: None,
        alert_log_id: None,
        schedule_id: None,
        verify_id: None,
        user_id: Some(Uuid::new_v4()),
    }
}

#[tokio::test]
async fn webhook_send_rejects_url_outside_allowlist() {
    let ctx = common::TestContext::new().await;

    let msg = webhook_message(OutgoingMessageType::Test, "https://evil.example/hook");
    let result = ctx.state.dispatcher.send_message(&msg).await.unwrap();
    assert_eq!(
        result,
        SendResult::FailedPerm {
            reason: "invalid or not allowed URL".to_string()
        }
    );

    ctx.cleanup().await;
}

#[tokio::test]
async fn webhook_alert_bundle_suppressed_when_no_open_alerts() {
    let ctx = common::TestContext::new().await;
    let service_id = insert_service(&ctx.pool).await;

    let mut msg = webhook_message(OutgoingMessageType::AlertBundle, "https://ok.example/hook");
    msg.service_id = Some(service_id);

    let result = ctx.state.dispatcher.send_message(&msg).await.unwrap();
    assert_eq!(
        result,
        SendResult::FailedPerm {
            reason: "alerts acked/closed before message sent".to_string()
        }
    );

    ctx.cleanup().await;
}

#[tokio::test]
async fn claim_batch_is_exclusive_across_concurrent_claimers() {
    let ctx = common::TestContext::new().await;
    let service_id = insert_service(&ctx.pool).await;
    let alert_id = insert_alert(&ctx.pool, service_id).await;

    let dest_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO outgoing_messages
            (message_type, dest_id, dest_kind, dest_provider, dest_value, alert_id)
        VALUES ('alert', $1, 'notification_channel', 'webhook', 'https://ok.example/hook', $2)
        "#,
    )
    .bind(dest_id)
    .bind(alert_id)
    .execute(&ctx.pool)
    .await
    .unwrap();

    let first = outgoing::claim_batch(&ctx.pool, 10).await.unwrap();
    assert_eq!(first.len(), 1);

    let second = outgoing::claim_batch(&ctx.pool, 10).await.unwrap();
    assert!(second.is_empty(), "already-claimed row must not be claimed twice");

    outgoing::release_claim(&ctx.pool, first[0].id).await.unwrap();
    let third = outgoing::claim_batch(&ctx.pool, 10).await.unwrap();
    assert_eq!(third.len(), 1, "released row must become claimable again");

    outgoing::record_result(&ctx.pool, third[0].id, &SendResult::Sent)
        .await
        .unwrap();
    let state: Option<String> = sqlx::query("SELECT state FROM outgoing_messages WHERE id = $1")
        .bind(third[0].id)
        .fetch_one(&ctx.pool)
        .await
        .unwrap()
        .get(0);
    assert_eq!(state.as_deref(), Some("sent"));

    ctx.cleanup().await;
}
