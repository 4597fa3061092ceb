//! Collection orchestrator: discovers eligible work items, batches them,
//! marks them in-flight, and enqueues collection jobs.
//!
//! One cycle runs at a time, enforced by the process-wide collecting flag.
//! A cycle that fails mid-way aborts, releases the flag, and leaves
//! recovery to the next tick — a failed cycle is never fatal.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use smpdb_core::{
    CollectionJob, ControlCommand, JobKind, Platform, ProcessState, SheetInfo, SheetSourceConfig,
    WorkItem, WorkItemStats,
};

use crate::traits::{JobQueue, WorkItemSource};

/// Scheduling knobs, sourced from `AppConfig`.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Work items per batch. Small by default for conservative provider load.
    pub batch_size: usize,
    /// Enqueue delay step between consecutive batches.
    pub stagger: Duration,
    /// Requested results per target, carried into each job.
    pub items_per_target: u32,
}

/// What one cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Paused, or another cycle is still running. No source writes happened.
    Skipped,
    /// Cycle ran but found no eligible work.
    NothingToDo,
    /// Batches were marked and jobs enqueued.
    Scheduled { batches: usize, jobs: usize },
}

pub struct CollectionScheduler<S, Q> {
    source: S,
    queue: Q,
    state: Arc<ProcessState>,
    sources: Vec<SheetSourceConfig>,
    config: SchedulerConfig,
}

impl<S: WorkItemSource, Q: JobQueue> CollectionScheduler<S, Q> {
    pub fn new(
        source: S,
        queue: Q,
        state: Arc<ProcessState>,
        sources: Vec<SheetSourceConfig>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            source,
            queue,
            state,
            sources,
            config,
        }
    }

    /// Runs one discover → batch → mark → enqueue cycle over all sources.
    ///
    /// Rows are marked `collecting` BEFORE their job is enqueued, so a
    /// concurrent cycle — or a crash-restart racing in-flight jobs — can
    /// never re-select them.
    ///
    /// # Errors
    ///
    /// Propagates source/queue failures after releasing the collecting
    /// flag; the caller logs and waits for the next tick.
    pub async fn run_cycle(&self) -> anyhow::Result<CycleOutcome> {
        if self.state.is_paused() {
            tracing::info!("collection cycle skipped: paused");
            return Ok(CycleOutcome::Skipped);
        }
        // The guard releases the flag on every exit path below, including
        // the `?` returns.
        let Some(_guard) = self.state.begin_cycle() else {
            tracing::info!("collection cycle skipped: already collecting");
            return Ok(CycleOutcome::Skipped);
        };

        let mut stats = WorkItemStats::default();
        let mut total_batches = 0usize;
        let mut total_jobs = 0usize;

        for source_config in &self.sources {
            let (batches, jobs) = self.schedule_source(source_config, &mut stats).await?;
            total_batches += batches;
            total_jobs += jobs;
        }

        self.state.set_work_item_stats(stats);
        self.state.mark_collection_finished();

        if total_jobs == 0 {
            tracing::info!(total = stats.total, "collection cycle: nothing to do");
            return Ok(CycleOutcome::NothingToDo);
        }

        self.state.record_activity(format!(
            "cycle scheduled {total_jobs} job(s) across {total_batches} batch(es)"
        ));
        tracing::info!(
            batches = total_batches,
            jobs = total_jobs,
            "collection cycle scheduled work"
        );

        Ok(CycleOutcome::Scheduled {
            batches: total_batches,
            jobs: total_jobs,
        })
    }

    /// Schedules one sheet source; returns `(batches, jobs)` enqueued.
    async fn schedule_source(
        &self,
        source_config: &SheetSourceConfig,
        stats: &mut WorkItemStats,
    ) -> anyhow::Result<(usize, usize)> {
        let source_id = &source_config.source_id;
        let sheet_name = &source_config.sheet_name;

        let items = self.source.list_work_items(source_id, sheet_name).await?;

        stats.total += items.len() as u64;
        stats.collected += items.iter().filter(|i| i.is_collected()).count() as u64;
        stats.collecting += items.iter().filter(|i| i.collecting).count() as u64;
        stats.uncollectable += items.iter().filter(|i| i.uncollectable).count() as u64;
        stats.uncollected += items.iter().filter(|i| i.is_eligible()).count() as u64;

        // Eligible rows, deduplicated per (platform, identifier): the
        // provider contract forbids duplicate inputs in one trigger, and a
        // duplicate sheet row is an operator mistake worth surfacing.
        let mut seen: HashSet<(Platform, String)> = HashSet::new();
        let eligible: Vec<&WorkItem> = items
            .iter()
            .filter(|item| item.is_eligible())
            .filter(|item| {
                let key = (item.platform, item.identifier.to_lowercase());
                if seen.insert(key) {
                    true
                } else {
                    tracing::warn!(
                        source_id = %source_id,
                        sheet_name = %sheet_name,
                        row = item.row,
                        identifier = %item.identifier,
                        "duplicate identifier in sheet; skipping row"
                    );
                    false
                }
            })
            .collect();

        if eligible.is_empty() {
            return Ok((0, 0));
        }

        tracing::info!(
            source = %source_config.display_name(),
            eligible = eligible.len(),
            "scheduling collection batches"
        );

        let mut batches = 0usize;
        let mut jobs = 0usize;

        for (batch_index, batch) in eligible.chunks(self.config.batch_size).enumerate() {
            let rows: Vec<u32> = batch.iter().map(|item| item.row).collect();
            // Mark before enqueue: once a job exists, its rows must already
            // be invisible to the next cycle.
            self.source
                .mark_collecting(source_id, sheet_name, &rows)
                .await?;

            let delay = self
                .config
                .stagger
                .saturating_mul(u32::try_from(batch_index).unwrap_or(u32::MAX));

            for platform in Platform::ALL {
                let subset: Vec<&WorkItem> = batch
                    .iter()
                    .filter(|item| item.platform == platform)
                    .copied()
                    .collect();
                if subset.is_empty() {
                    continue;
                }

                let targets: Vec<String> =
                    subset.iter().map(|item| item.identifier.clone()).collect();
                let subset_rows: Vec<u32> = subset.iter().map(|item| item.row).collect();

                let job = CollectionJob::new(
                    JobKind::Profile,
                    platform,
                    targets,
                    self.config.items_per_target,
                )
                .with_group(source_config.group_id)
                .with_sheet_info(SheetInfo {
                    source_id: source_id.clone(),
                    sheet_name: sheet_name.clone(),
                    rows: subset_rows,
                })?;

                self.queue.enqueue(&job, delay).await?;
                jobs += 1;
            }

            batches += 1;
        }

        Ok((batches, jobs))
    }

    /// Recurring driver: one cycle after the startup grace delay, then one
    /// per interval, each interval measured from the previous cycle's
    /// completion. Control commands arrive on `commands`:
    /// pause/resume flip the process flag, trigger starts a cycle
    /// immediately.
    ///
    /// Returns when the command channel closes (process shutdown).
    pub async fn run(
        &self,
        startup_grace: Duration,
        interval: Duration,
        mut commands: mpsc::UnboundedReceiver<ControlCommand>,
    ) {
        let mut wait = startup_grace;

        loop {
            self.state.set_next_run_at(Some(
                chrono::Utc::now()
                    + chrono::Duration::from_std(wait).unwrap_or_else(|_| chrono::Duration::zero()),
            ));

            let sleep = tokio::time::sleep(wait);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    () = &mut sleep => break,
                    command = commands.recv() => match command {
                        Some(ControlCommand::Pause) => {
                            self.state.pause();
                            self.state.record_activity("paused by monitor command");
                            tracing::info!("collection paused");
                        }
                        Some(ControlCommand::Resume) => {
                            self.state.resume();
                            self.state.record_activity("resumed by monitor command");
                            tracing::info!("collection resumed");
                        }
                        Some(ControlCommand::Trigger) => {
                            self.state.record_activity("cycle triggered by monitor command");
                            tracing::info!("collection cycle triggered");
                            break;
                        }
                        None => return,
                    },
                }
            }

            if let Err(e) = self.run_cycle().await {
                self.state.record_activity(format!("cycle failed: {e:#}"));
                tracing::error!(error = %format!("{e:#}"), "collection cycle failed");
            }

            wait = interval;
        }
    }
}

#[cfg(test)]
#[path = "scheduler_test.rs"]
mod tests;
