use crate::db::queries::snooze;
use crate::error::CoreResult;
use crate::processing_lock::ProcessingLock;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

/// Periodic control loop that defers re-escalation of acknowledged alerts
/// and re-triggers them once the snooze window elapses. Runs under a
/// cluster-wide [`ProcessingLock`] so at most one instance ticks at a time.
pub struct SnoozeManager {
    pool: PgPool,
    lock: ProcessingLock,
    tick_interval: Duration,
}

impl SnoozeManager {
    pub fn new(pool: PgPool, heartbeat_ttl: Duration, tick_interval: Duration) -> Self {
        let lock = ProcessingLock::new(pool.clone(), "snooze_manager", 1, heartbeat_ttl);
        Self {
            pool,
            lock,
            tick_interval,
        }
    }

    /// Spawns the ticker. Each tick runs in its own task (mirroring the
    /// teacher's job-worker spawn-per-unit-of-work pattern) so a panic
    /// inside one tick can't take down future ticks.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick_interval);
            loop {
                interval.tick().await;
                let pool = self.pool.clone();
                let acquired = match self.lock.acquire_or_renew().await {
                    Ok(guard) => guard,
                    Err(e) => {
                        error!(error = %e, "failed to acquire snooze-manager processing lock");
                        continue;
                    }
                };
                let Some(guard) = acquired else {
                    continue;
                };
                let handle = tokio::spawn(async move { tick(&pool, &guard).await });
                if let Err(e) = handle.await {
                    error!(error = %e, "snooze-manager tick task panicked");
                }
            }
        })
    }
}

/// Runs the three tick statements in one transaction: promote expired
/// snoozes, drop rows for alerts just promoted to `triggered`, drop rows
/// for alerts that are `closed`. Step 2 depends on state step 1 changed, so
/// order matters. Any SQL error rolls back the whole tick; missed ticks are
/// not accumulated.
async fn tick(
    pool: &PgPool,
    guard: &crate::processing_lock::ProcessingLockGuard<'_>,
) -> CoreResult<()> {
    let mut tx = guard.begin_tx().await?;

    let promoted = snooze::promote_expired_snoozes_tx(&mut tx).await?;
    let dropped_promoted = snooze::delete_promoted_snoozes_tx(&mut tx).await?;
    let dropped_closed = snooze::delete_closed_alert_snoozes_tx(&mut tx).await?;

    tx.commit().await?;

    info!(
        promoted,
        dropped_promoted, dropped_closed, "snooze-manager tick complete"
    );
    Ok(())
}

