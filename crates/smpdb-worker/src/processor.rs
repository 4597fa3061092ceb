//! Per-job execution: trigger → bounded wait → persist → reconcile, with
//! compensating state cleanup on failure.
//!
//! The processor performs no job-level retry of its own; a failure reverts
//! the job's sheet rows to not-started and re-raises so the queue's
//! backoff policy decides whether to try again. Rows reverted this way are
//! also re-selected by a later cycle, which covers jobs that exhaust their
//! queue retries.

use std::sync::Arc;

use smpdb_core::{CanonicalRecord, CollectionJob, ProcessState, SheetInfo, UpsertStats};
use smpdb_provider::build_inputs;

use crate::traits::{Collector, ProgressSink, RecordStore, WorkItemSource};

/// Outcome of a completed job.
#[derive(Debug, Clone, Copy)]
pub struct ProcessedJob {
    pub records: usize,
    pub stats: UpsertStats,
}

pub struct JobProcessor<S, C, R> {
    source: S,
    collector: C,
    store: R,
    state: Arc<ProcessState>,
}

/// True when a record belongs to `target`: case-insensitive author
/// username match, or exact author-id match. One job pools many targets
/// into a single snapshot, so this is how results are attributed back.
fn record_matches_target(record: &CanonicalRecord, target: &str) -> bool {
    let Some(author) = &record.author else {
        return false;
    };
    if let Some(username) = &author.username {
        if username.eq_ignore_ascii_case(target) {
            return true;
        }
    }
    author.id.as_deref() == Some(target)
}

impl<S: WorkItemSource, C: Collector, R: RecordStore> JobProcessor<S, C, R> {
    pub fn new(source: S, collector: C, store: R, state: Arc<ProcessState>) -> Self {
        Self {
            source,
            collector,
            store,
            state,
        }
    }

    /// Executes one claimed job and maintains the process counters.
    ///
    /// # Errors
    ///
    /// Re-raises any step failure after best-effort cleanup, so the queue
    /// runtime can apply its retry/backoff policy.
    pub async fn process(
        &self,
        job: &CollectionJob,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<ProcessedJob> {
        self.state.job_started();

        match self.execute(job, progress).await {
            Ok(outcome) => {
                self.state.job_completed();
                self.state.record_activity(format!(
                    "collected {} record(s) for {} {} target(s)",
                    outcome.records,
                    job.platform,
                    job.targets.len()
                ));
                Ok(outcome)
            }
            Err(e) => {
                self.revert_rows(job).await;
                self.state.job_failed();
                self.state
                    .record_activity(format!("job failed on {}: {e:#}", job.platform));
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        job: &CollectionJob,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<ProcessedJob> {
        let inputs = build_inputs(job.kind, job.platform, &job.targets);

        let handle = self.collector.trigger(job.platform, &inputs).await?;
        progress.progress(10).await;

        let records = self.collector.await_completion(&handle).await?;
        progress.progress(70).await;

        let stats = self
            .store
            .upsert(job.platform, &records, job.group_id)
            .await?;
        progress.progress(90).await;

        if let Some(sheet) = &job.sheet_info {
            self.reconcile(job, sheet, &records).await?;
        }

        tracing::info!(
            platform = %job.platform,
            targets = job.targets.len(),
            records = records.len(),
            inserted = stats.inserted,
            updated = stats.updated,
            "job completed"
        );

        Ok(ProcessedJob {
            records: records.len(),
            stats,
        })
    }

    /// Attributes pooled results back to individual rows: a target with
    /// matches gets its collected count recorded, a target with none is
    /// marked uncollectable. The zero-match case deliberately conflates
    /// "truly unscrapable" with "provider missed this target in an
    /// otherwise-successful batch"; see DESIGN notes.
    async fn reconcile(
        &self,
        job: &CollectionJob,
        sheet: &SheetInfo,
        records: &[CanonicalRecord],
    ) -> anyhow::Result<()> {
        let mut counts: Vec<(u32, u32)> = Vec::new();
        let mut uncollectable: Vec<u32> = Vec::new();

        for (target, row) in job.targets.iter().zip(&sheet.rows) {
            let matched = records
                .iter()
                .filter(|record| record_matches_target(record, target))
                .count();
            if matched > 0 {
                counts.push((*row, u32::try_from(matched).unwrap_or(u32::MAX)));
            } else {
                uncollectable.push(*row);
            }
        }

        if !counts.is_empty() {
            self.source
                .record_collected_counts(&sheet.source_id, &sheet.sheet_name, &counts)
                .await?;
        }
        if !uncollectable.is_empty() {
            self.source
                .mark_uncollectable(&sheet.source_id, &sheet.sheet_name, &uncollectable)
                .await?;
        }

        Ok(())
    }

    /// Best-effort compensation: clear the collecting marker on all of the
    /// job's rows so they become eligible again instead of stuck in limbo.
    async fn revert_rows(&self, job: &CollectionJob) {
        let Some(sheet) = &job.sheet_info else {
            return;
        };
        if let Err(e) = self
            .source
            .clear_state(&sheet.source_id, &sheet.sheet_name, &sheet.rows)
            .await
        {
            tracing::error!(
                source_id = %sheet.source_id,
                sheet_name = %sheet.sheet_name,
                error = %format!("{e:#}"),
                "failed to clear collecting markers after job failure"
            );
        }
    }
}

#[cfg(test)]
#[path = "processor_test.rs"]
mod tests;
