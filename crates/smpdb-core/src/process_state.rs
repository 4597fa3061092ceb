//! Process-wide mutable state, injected into every component that needs it.
//!
//! One [`ProcessState`] instance exists per worker process. The scheduler
//! and job processor update it, the status reporter reads it. Nothing in
//! here is durable — a restart loses counters and the activity log, never
//! queued work.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Maximum retained activity entries; oldest are evicted first.
pub const ACTIVITY_LOG_CAPACITY: usize = 100;

/// One line of the recent-activity ring buffer.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Aggregate work-item counts from the last completed scheduler read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkItemStats {
    pub total: u64,
    pub collected: u64,
    pub collecting: u64,
    pub uncollectable: u64,
    pub uncollected: u64,
}

#[derive(Debug, Default)]
struct Inner {
    next_run_at: Option<DateTime<Utc>>,
    last_collection_at: Option<DateTime<Utc>>,
    last_job_at: Option<DateTime<Utc>>,
    work_items: WorkItemStats,
    activity: VecDeque<ActivityEntry>,
}

/// Serializable snapshot of the full process state, pushed to the
/// monitoring endpoint and served from the local status route.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub pid: u32,
    pub uptime_secs: u64,
    pub paused: bool,
    pub collecting: bool,
    pub active_jobs: u64,
    pub completed_jobs: u64,
    pub failed_jobs: u64,
    pub next_run_at: Option<DateTime<Utc>>,
    pub last_collection_at: Option<DateTime<Utc>>,
    pub last_job_at: Option<DateTime<Utc>>,
    pub work_items: WorkItemStats,
    pub activity: Vec<ActivityEntry>,
}

/// Shared mutable counters, flags, and the activity ring buffer.
#[derive(Debug)]
pub struct ProcessState {
    started_at: Instant,
    paused: AtomicBool,
    collecting: AtomicBool,
    active_jobs: AtomicU64,
    completed_jobs: AtomicU64,
    failed_jobs: AtomicU64,
    inner: Mutex<Inner>,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            paused: AtomicBool::new(false),
            collecting: AtomicBool::new(false),
            active_jobs: AtomicU64::new(0),
            completed_jobs: AtomicU64::new(0),
            failed_jobs: AtomicU64::new(0),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.collecting.load(Ordering::SeqCst)
    }

    /// Claims the collection-cycle mutual-exclusion flag.
    ///
    /// Returns `None` when a cycle is already running. The returned guard
    /// releases the flag on drop, which covers every exit path of the
    /// cycle including error returns and panics.
    #[must_use]
    pub fn begin_cycle(&self) -> Option<CycleGuard<'_>> {
        self.collecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CycleGuard { state: self })
    }

    pub fn job_started(&self) {
        self.active_jobs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn job_completed(&self) {
        self.active_jobs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .ok();
        self.completed_jobs.fetch_add(1, Ordering::SeqCst);
        self.inner().last_job_at = Some(Utc::now());
    }

    pub fn job_failed(&self) {
        self.active_jobs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(n.saturating_sub(1))
            })
            .ok();
        self.failed_jobs.fetch_add(1, Ordering::SeqCst);
        self.inner().last_job_at = Some(Utc::now());
    }

    pub fn set_next_run_at(&self, at: Option<DateTime<Utc>>) {
        self.inner().next_run_at = at;
    }

    pub fn mark_collection_finished(&self) {
        self.inner().last_collection_at = Some(Utc::now());
    }

    pub fn set_work_item_stats(&self, stats: WorkItemStats) {
        self.inner().work_items = stats;
    }

    /// Appends an entry to the activity ring buffer, evicting the oldest
    /// once [`ACTIVITY_LOG_CAPACITY`] is reached.
    pub fn record_activity(&self, message: impl Into<String>) {
        let mut inner = self.inner();
        if inner.activity.len() == ACTIVITY_LOG_CAPACITY {
            inner.activity.pop_front();
        }
        inner.activity.push_back(ActivityEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        let inner = self.inner();
        StatusSnapshot {
            pid: std::process::id(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            paused: self.is_paused(),
            collecting: self.is_collecting(),
            active_jobs: self.active_jobs.load(Ordering::SeqCst),
            completed_jobs: self.completed_jobs.load(Ordering::SeqCst),
            failed_jobs: self.failed_jobs.load(Ordering::SeqCst),
            next_run_at: inner.next_run_at,
            last_collection_at: inner.last_collection_at,
            last_job_at: inner.last_job_at,
            work_items: inner.work_items,
            activity: inner.activity.iter().cloned().collect(),
        }
    }
}

/// Drop guard for the collection-cycle flag. See [`ProcessState::begin_cycle`].
#[derive(Debug)]
pub struct CycleGuard<'a> {
    state: &'a ProcessState,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.state.collecting.store(false, Ordering::SeqCst);
    }
}
