//! Queue worker runtime: claims ready jobs from the durable queue and
//! dispatches them to the processor with bounded concurrency.
//!
//! Retry policy lives here and in `smpdb_db::jobs`, not in the processor:
//! a failed job is requeued with exponential backoff until its attempt cap,
//! then left permanently failed for the activity log and queue counters.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use sqlx::PgPool;

use smpdb_db::{FailureDisposition, JobRow};

use crate::processor::JobProcessor;
use crate::traits::{Collector, ProgressSink, RecordStore, WorkItemSource};

#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    /// Concurrent job executions per claim wave.
    pub concurrency: usize,
    /// Sleep between claim attempts when the queue is empty.
    pub poll_interval: Duration,
    pub backoff_base_secs: u64,
}

/// Best-effort progress writer for one claimed job row.
struct PgProgressSink {
    pool: PgPool,
    job_id: i64,
}

#[async_trait]
impl ProgressSink for PgProgressSink {
    async fn progress(&self, percent: i16) {
        if let Err(e) = smpdb_db::update_job_progress(&self.pool, self.job_id, percent).await {
            tracing::warn!(job_id = self.job_id, error = %e, "progress update failed");
        }
    }
}

pub struct QueueWorker<S, C, R> {
    pool: PgPool,
    processor: Arc<JobProcessor<S, C, R>>,
    config: QueueWorkerConfig,
}

impl<S, C, R> QueueWorker<S, C, R>
where
    S: WorkItemSource,
    C: Collector,
    R: RecordStore,
{
    pub fn new(
        pool: PgPool,
        processor: Arc<JobProcessor<S, C, R>>,
        config: QueueWorkerConfig,
    ) -> Self {
        Self {
            pool,
            processor,
            config,
        }
    }

    /// Runs until the process exits: claim a wave of ready jobs, execute
    /// them concurrently, and sleep one tick when the queue is empty.
    ///
    /// Claim failures are logged and retried on the next tick — the queue
    /// store owns durability, so nothing is lost while the DB is away.
    pub async fn run(&self) {
        let limit = i64::try_from(self.config.concurrency.max(1)).unwrap_or(i64::MAX);

        loop {
            let claimed = match smpdb_db::claim_ready_jobs(&self.pool, limit).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(error = %e, "failed to claim jobs");
                    Vec::new()
                }
            };

            if claimed.is_empty() {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            }

            tracing::debug!(claimed = claimed.len(), "dispatching claimed jobs");
            stream::iter(claimed)
                .map(|row| self.execute(row))
                .buffer_unordered(self.config.concurrency.max(1))
                .collect::<Vec<()>>()
                .await;
        }
    }

    /// Executes one claimed row and routes its outcome back to the queue.
    async fn execute(&self, row: JobRow) {
        let job = match row.collection_job() {
            Ok(job) => job,
            Err(e) => {
                // The payload itself is bad; retries cannot fix it, but the
                // attempt cap bounds the damage either way.
                tracing::error!(job_id = row.id, error = %e, "undecodable job payload");
                self.record_failure(&row, &e.to_string()).await;
                return;
            }
        };

        let progress = PgProgressSink {
            pool: self.pool.clone(),
            job_id: row.id,
        };

        match self.processor.process(&job, &progress).await {
            Ok(outcome) => {
                if let Err(e) = smpdb_db::complete_job(&self.pool, row.id).await {
                    tracing::error!(job_id = row.id, error = %e, "failed to mark job completed");
                } else {
                    tracing::debug!(
                        job_id = row.id,
                        records = outcome.records,
                        "job marked completed"
                    );
                }
            }
            Err(e) => {
                self.record_failure(&row, &format!("{e:#}")).await;
            }
        }
    }

    async fn record_failure(&self, row: &JobRow, message: &str) {
        match smpdb_db::fail_job(&self.pool, row, message, self.config.backoff_base_secs).await {
            Ok(FailureDisposition::Retrying { delay_secs }) => {
                tracing::warn!(
                    job_id = row.id,
                    attempt = row.attempts,
                    max_attempts = row.max_attempts,
                    delay_secs,
                    error = message,
                    "job failed; requeued with backoff"
                );
            }
            Ok(FailureDisposition::Exhausted) => {
                tracing::error!(
                    job_id = row.id,
                    attempts = row.attempts,
                    error = message,
                    "job permanently failed"
                );
            }
            Err(e) => {
                tracing::error!(job_id = row.id, error = %e, "failed to record job failure");
            }
        }
    }
}
