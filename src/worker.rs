//! Dispatcher worker pool: a polling loop claims unsent rows and fans each
//! one out to its own spawned task, mirroring `jobs/worker.rs`'s
//! one-task-per-unit-of-work isolation, bounded here by a semaphore instead
//! of an unbounded receiver per worker.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::sync::Semaphore;

use crate::db::queries::outgoing;
use crate::dispatcher::Dispatcher;

pub struct DispatchWorkerPool {
    pool: PgPool,
    dispatcher: Arc<Dispatcher>,
    concurrency: usize,
    poll_interval: Duration,
    batch_size: i64,
}

impl DispatchWorkerPool {
    pub fn new(
        pool: PgPool,
        dispatcher: Arc<Dispatcher>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            pool,
            dispatcher,
            concurrency,
            poll_interval,
            batch_size: concurrency as i64,
        }
    }

    /// Runs until the process exits. Each claimed message is processed in
    /// its own `tokio::spawn`ed task so a panic dispatching one message can't
    /// take down the poller or any sibling dispatch.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(concurrency = self.concurrency, "dispatch worker pool started");
            let semaphore = Arc::new(Semaphore::new(self.concurrency));
            let mut ticker = tokio::time::interval(self.poll_interval);
            loop {
                ticker.tick().await;
                let batch = match outgoing::claim_batch(&self.pool, self.batch_size).await {
                    Ok(batch) => batch,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to claim outgoing messages");
                        continue;
                    }
                };
                for msg in batch {
                    let permit = semaphore.clone().acquire_owned().await.expect("semaphore closed");
                    let dispatcher = self.dispatcher.clone();
                    let pool = self.pool.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        let message_id = msg.id;
                        let result = dispatcher.send_message(&msg).await;
                        match result {
                            Ok(send_result) => {
                                if let Err(err) =
                                    outgoing::record_result(&pool, message_id, &send_result).await
                                {
                                    tracing::error!(message_id = %message_id, error = %err, "failed to record dispatch result");
                                }
                            }
                            Err(err) => {
                                tracing::warn!(message_id = %message_id, error = %err, "dispatch failed, will be retried");
                                if let Err(release_err) = outgoing::release_claim(&pool, message_id).await {
                                    tracing::error!(message_id = %message_id, error = %release_err, "failed to release claim for retry");
                                }
                            }
                        }
                    });
                }
            }
        })
    }
}
