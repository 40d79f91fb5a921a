use crate::error::CoreResult;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use uuid::Uuid;

/// Cluster-wide advisory lock keyed by `(lock_type, version)` with heartbeat
/// renewal, standing in for the `processinglock` package referenced (but not
/// retrieved) by `engine/snoozemanager/db.go`'s `processinglock.NewLock`.
/// Only one live holder per `(lock_type, version)` may acquire at a time;
/// a holder is considered dead once its `last_heartbeat` is older than
/// `heartbeat_ttl`, at which point any caller may take over.
pub struct ProcessingLock {
    pool: PgPool,
    lock_type: String,
    version: i32,
    holder: String,
    heartbeat_ttl: Duration,
}

impl ProcessingLock {
    pub fn new(
        pool: PgPool,
        lock_type: impl Into<String>,
        version: i32,
        heartbeat_ttl: Duration,
    ) -> Self {
        Self {
            pool,
            lock_type: lock_type.into(),
            version,
            holder: Uuid::new_v4().to_string(),
            heartbeat_ttl,
        }
    }

    /// Attempts to acquire or renew the lock. Returns `None` if a different,
    /// still-live holder owns it.
    pub async fn acquire_or_renew(&self) -> CoreResult<Option<ProcessingLockGuard<'_>>> {
        let ttl_secs = self.heartbeat_ttl.as_secs() as f64;
        let row = sqlx::query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO processing_locks (id, lock_type, version, holder, last_heartbeat)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (lock_type, version) DO UPDATE
            SET holder = EXCLUDED.holder, last_heartbeat = NOW()
            WHERE processing_locks.holder = EXCLUDED.holder
               OR processing_locks.last_heartbeat < NOW() - ($5 || ' seconds')::interval
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&self.lock_type)
        .bind(self.version)
        .bind(&self.holder)
        .bind(ttl_secs.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id,)| ProcessingLockGuard { lock: self, id }))
    }
}

pub struct ProcessingLockGuard<'a> {
    lock: &'a ProcessingLock,
    #[allow(dead_code)]
    id: Uuid,
}

impl ProcessingLockGuard<'_> {
    pub async fn begin_tx(&self) -> CoreResult<Transaction<'static, Postgres>> {
        let tx = self.lock.pool.begin().await?;
        Ok(tx)
    }
}
