//! Database operations for the durable `jobs` queue.
//!
//! Workers claim ready rows with `FOR UPDATE SKIP LOCKED`, so any number of
//! concurrent claimers see disjoint jobs. Delivery is at-least-once: a
//! worker crash after claiming leaves the row `running` until an operator
//! requeues it, while ordinary failures are retried with exponential
//! backoff up to the row's attempt cap.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::Duration;
use uuid::Uuid;

use smpdb_core::CollectionJob;

use crate::DbError;

/// Retry delays are capped at one hour regardless of attempt count.
const MAX_BACKOFF_SECS: u64 = 3600;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRow {
    pub id: i64,
    pub public_id: Uuid,
    pub kind: String,
    pub platform: String,
    pub payload: serde_json::Value,
    pub status: String,
    /// Incremented when the row is claimed, so a claimed row's value counts
    /// the attempt currently executing.
    pub attempts: i32,
    pub max_attempts: i32,
    pub progress: i16,
    pub run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl JobRow {
    /// Decodes the JSONB payload back into a [`CollectionJob`].
    ///
    /// # Errors
    ///
    /// Returns [`DbError::InvalidJobPayload`] if the payload does not match
    /// the current job shape (e.g. a row enqueued by an older build).
    pub fn collection_job(&self) -> Result<CollectionJob, DbError> {
        serde_json::from_value(self.payload.clone()).map_err(|e| DbError::InvalidJobPayload {
            id: self.id,
            source: e,
        })
    }
}

/// Queue counters by status, for telemetry.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueDepth {
    pub queued: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
}

/// What happened to a failed job: requeued for another attempt, or
/// permanently failed with its attempt cap exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    Retrying { delay_secs: u64 },
    Exhausted,
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Exponential backoff before the next attempt: `base * 2^(attempt-1)`
/// seconds, capped at [`MAX_BACKOFF_SECS`]. `attempt` is the attempt that
/// just failed (1-based).
#[must_use]
pub fn compute_backoff_secs(attempt: u32, base_secs: u64) -> u64 {
    let shift = attempt.saturating_sub(1).min(10);
    base_secs
        .saturating_mul(1u64 << shift)
        .min(MAX_BACKOFF_SECS)
}

/// Applies ±25% jitter so simultaneous failures do not retry in lockstep.
fn jittered(secs: u64) -> u64 {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let delayed = (secs as f64 * (rand::random::<f64>() * 0.5 + 0.75)) as u64;
    delayed
}

// ---------------------------------------------------------------------------
// jobs operations
// ---------------------------------------------------------------------------

/// Enqueues one collection job, scheduled `delay` from now.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn enqueue_job(
    pool: &PgPool,
    job: &CollectionJob,
    delay: Duration,
    max_attempts: u32,
) -> Result<JobRow, DbError> {
    let public_id = Uuid::new_v4();
    let payload = serde_json::to_value(job).map_err(|e| DbError::InvalidJobPayload {
        id: 0,
        source: e,
    })?;

    let row = sqlx::query_as::<_, JobRow>(
        "INSERT INTO jobs (public_id, kind, platform, payload, status, max_attempts, run_at) \
         VALUES ($1, $2, $3, $4::jsonb, 'queued', $5, NOW() + make_interval(secs => $6)) \
         RETURNING id, public_id, kind, platform, payload, status, attempts, max_attempts, \
                   progress, run_at, last_error, started_at, finished_at, created_at",
    )
    .bind(public_id)
    .bind(job.kind.as_str())
    .bind(job.platform.as_str())
    .bind(payload)
    .bind(i32::try_from(max_attempts).unwrap_or(i32::MAX))
    .bind(delay.as_secs_f64())
    .fetch_one(pool)
    .await?;

    Ok(row)
}

/// Claims up to `limit` ready jobs, marking them `running` and counting the
/// attempt.
///
/// `FOR UPDATE SKIP LOCKED` keeps concurrent claimers from seeing the same
/// rows; ordering is by `run_at` then id, so staggered batches bias toward
/// their enqueue order without guaranteeing it.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the claim query fails.
pub async fn claim_ready_jobs(pool: &PgPool, limit: i64) -> Result<Vec<JobRow>, DbError> {
    let rows = sqlx::query_as::<_, JobRow>(
        "UPDATE jobs \
         SET status = 'running', attempts = attempts + 1, started_at = NOW(), updated_at = NOW() \
         WHERE id IN ( \
             SELECT id FROM jobs \
             WHERE status = 'queued' AND run_at <= NOW() \
             ORDER BY run_at, id \
             LIMIT $1 \
             FOR UPDATE SKIP LOCKED \
         ) \
         RETURNING id, public_id, kind, platform, payload, status, attempts, max_attempts, \
                   progress, run_at, last_error, started_at, finished_at, created_at",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Marks a running job as completed.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `running`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn complete_job(pool: &PgPool, id: i64) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'completed', progress = 100, finished_at = NOW(), updated_at = NOW() \
         WHERE id = $1 AND status = 'running'",
    )
    .bind(id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id,
            expected_status: "running",
        });
    }

    Ok(())
}

/// Records a job failure: requeues with backoff while attempts remain,
/// otherwise marks the job permanently failed.
///
/// The backoff is exponential in the failed attempt number with ±25%
/// jitter. The job's own retry cap was fixed at enqueue time.
///
/// # Errors
///
/// Returns [`DbError::InvalidJobTransition`] if the job is not `running`,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn fail_job(
    pool: &PgPool,
    job: &JobRow,
    error: &str,
    backoff_base_secs: u64,
) -> Result<FailureDisposition, DbError> {
    if job.attempts >= job.max_attempts {
        let result = sqlx::query(
            "UPDATE jobs \
             SET status = 'failed', last_error = $1, finished_at = NOW(), updated_at = NOW() \
             WHERE id = $2 AND status = 'running'",
        )
        .bind(error)
        .bind(job.id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::InvalidJobTransition {
                id: job.id,
                expected_status: "running",
            });
        }
        return Ok(FailureDisposition::Exhausted);
    }

    let attempt = u32::try_from(job.attempts).unwrap_or(0);
    let delay_secs = jittered(compute_backoff_secs(attempt, backoff_base_secs));

    #[allow(clippy::cast_precision_loss)]
    let result = sqlx::query(
        "UPDATE jobs \
         SET status = 'queued', last_error = $1, \
             run_at = NOW() + make_interval(secs => $2), updated_at = NOW() \
         WHERE id = $3 AND status = 'running'",
    )
    .bind(error)
    .bind(delay_secs as f64)
    .bind(job.id)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::InvalidJobTransition {
            id: job.id,
            expected_status: "running",
        });
    }

    Ok(FailureDisposition::Retrying { delay_secs })
}

/// Records coarse progress (0–100) on a running job.
///
/// Callers treat this as best-effort: a failed progress write must never
/// fail the job itself.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn update_job_progress(pool: &PgPool, id: i64, progress: i16) -> Result<(), DbError> {
    sqlx::query("UPDATE jobs SET progress = $1, updated_at = NOW() WHERE id = $2")
        .bind(progress.clamp(0, 100))
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Current queue counters by status.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn queue_depth(pool: &PgPool) -> Result<QueueDepth, DbError> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT status, COUNT(*) FROM jobs GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    let mut depth = QueueDepth::default();
    for (status, count) in rows {
        match status.as_str() {
            "queued" => depth.queued = count,
            "running" => depth.running = count,
            "completed" => depth.completed = count,
            "failed" => depth.failed = count,
            other => tracing::warn!(status = other, count, "unexpected job status in queue"),
        }
    }

    Ok(depth)
}
