use crate::db::models::{Channel, ChannelType};
use crate::error::{CoreError, CoreResult};
use crate::permission::{Principal, PrincipalMatch};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

const ALLOWED: &[PrincipalMatch] = &[PrincipalMatch::System, PrincipalMatch::User];

/// Resolves a display name for a channel whose `name` wasn't supplied up
/// front. Slack is the only registered type today; a type with no registered
/// namer and an empty name is a validation error.
pub trait NamerFunc: Send + Sync {
    fn name_for(&self, channel_type: ChannelType, value: &str) -> CoreResult<String>;
}

fn validate_value(channel_type: ChannelType, value: &str) -> CoreResult<()> {
    match channel_type {
        ChannelType::Slack => {
            if value.is_empty() || value.chars().count() > 32 {
                return Err(CoreError::validation(
                    "value",
                    "slack channel value must be 1-32 characters",
                ));
            }
        }
    }
    Ok(())
}

/// Idempotent upsert: looks up by `(channel_type, value)` and returns the
/// existing id on a hit; on a miss, resolves a name (via `namer` if `name`
/// is empty) and inserts. Relies on a unique index on `(channel_type,
/// value)` so concurrent `EnsureTx` calls with the same pair converge to one
/// row (callers retry on unique-violation).
pub async fn ensure_tx(
    tx: &mut Transaction<'_, Postgres>,
    principal: &Principal,
    channel_type: ChannelType,
    value: &str,
    name: Option<&str>,
    namer: &dyn NamerFunc,
) -> CoreResult<Uuid> {
    principal.limit_check_any(ALLOWED)?;
    validate_value(channel_type, value)?;

    if let Some(row) = sqlx::query_as::<_, (Uuid,)>(
        "SELECT id FROM notification_channels WHERE channel_type = $1 AND value = $2",
    )
    .bind(channel_type)
    .bind(value)
    .fetch_optional(&mut **tx)
    .await?
    {
        return Ok(row.0);
    }

    let resolved_name = match name {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => namer.name_for(channel_type, value)?,
    };

    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO notification_channels (id, name, channel_type, value) VALUES ($1, $2, $3, $4)",
    )
    .bind(id)
    .bind(resolved_name)
    .bind(channel_type)
    .bind(value)
    .execute(&mut **tx)
    .await?;

    Ok(id)
}

pub async fn find_one(pool: &PgPool, principal: &Principal, id: Uuid) -> CoreResult<Channel> {
    principal.limit_check_any(ALLOWED)?;
    sqlx::query_as::<_, Channel>("SELECT * FROM notification_channels WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::validation("id", "channel not found"))
}

pub async fn find_many(pool: &PgPool, principal: &Principal, ids: &[Uuid]) -> CoreResult<Vec<Channel>> {
    principal.limit_check_any(ALLOWED)?;
    if ids.len() > 50 {
        return Err(CoreError::validation(
            "ids",
            "at most 50 channel ids may be requested at once",
        ));
    }
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let channels = sqlx::query_as::<_, Channel>(
        "SELECT * FROM notification_channels WHERE id = ANY($1)",
    )
    .bind(ids)
    .fetch_all(pool)
    .await?;
    Ok(channels)
}

pub async fn find_all(pool: &PgPool, principal: &Principal) -> CoreResult<Vec<Channel>> {
    principal.limit_check_any(ALLOWED)?;
    let channels = sqlx::query_as::<_, Channel>("SELECT * FROM notification_channels")
        .fetch_all(pool)
        .await?;
    Ok(channels)
}

/// No-op on empty input; fails validation above 100 ids. Unlike the
/// original (`notificationchannel/store.go` `DeleteManyTx`), which prepares
/// a transactional statement handle and then silently executes the
/// non-transactional one regardless, this always executes through `tx` when
/// one is supplied.
pub async fn delete_many_tx(
    tx: &mut Transaction<'_, Postgres>,
    principal: &Principal,
    ids: &[Uuid],
) -> CoreResult<()> {
    principal.limit_check_any(ALLOWED)?;
    if ids.is_empty() {
        return Ok(());
    }
    if ids.len() > 100 {
        return Err(CoreError::validation(
            "ids",
            "at most 100 channel ids may be deleted at once",
        ));
    }
    sqlx::query("DELETE FROM notification_channels WHERE id = ANY($1)")
        .bind(ids)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

pub async fn delete_many(pool: &PgPool, principal: &Principal, ids: &[Uuid]) -> CoreResult<()> {
    principal.limit_check_any(ALLOWED)?;
    if ids.is_empty() {
        return Ok(());
    }
    if ids.len() > 100 {
        return Err(CoreError::validation(
            "ids",
            "at most 100 channel ids may be deleted at once",
        ));
    }
    sqlx::query("DELETE FROM notification_channels WHERE id = ANY($1)")
        .bind(ids)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticNamer;
    impl NamerFunc for StaticNamer {
        fn name_for(&self, _channel_type: ChannelType, value: &str) -> CoreResult<String> {
            Ok(format!("#{value}"))
        }
    }

    #[test]
    fn validate_value_rejects_empty_and_overlong_slack_value() {
        assert!(validate_value(ChannelType::Slack, "").is_err());
        assert!(validate_value(ChannelType::Slack, &"a".repeat(33)).is_err());
        assert!(validate_value(ChannelType::Slack, "C0123456").is_ok());
    }

    #[test]
    fn namer_resolves_display_name() {
        let namer = StaticNamer;
        assert_eq!(
            namer.name_for(ChannelType::Slack, "C0123456").unwrap(),
            "#C0123456"
        );
    }
}
