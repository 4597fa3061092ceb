//! In-memory fakes for the seam traits, shared by the scheduler and
//! processor tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use smpdb_core::{
    CanonicalRecord, CollectionJob, Platform, RecordAuthor, RecordMetrics, UpsertStats, WorkItem,
};
use smpdb_provider::{ProviderInput, SnapshotHandle};

use crate::traits::{Collector, JobQueue, ProgressSink, RecordStore, WorkItemSource};

/// Shared, ordered event log so tests can assert cross-fake ordering
/// (e.g. rows marked collecting before their job is enqueued).
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn event_log() -> EventLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn item(row: u32, identifier: &str, platform: Platform) -> WorkItem {
    WorkItem {
        row,
        identifier: identifier.to_owned(),
        platform,
        profile_url: None,
        followers: None,
        collected_count: 0,
        collecting: false,
        uncollectable: false,
    }
}

pub fn record_for(username: &str, url: &str) -> CanonicalRecord {
    CanonicalRecord {
        id: None,
        source_url: url.to_owned(),
        collected_at: None,
        author: Some(RecordAuthor {
            username: Some(username.to_owned()),
            ..RecordAuthor::default()
        }),
        content: None,
        metrics: Some(RecordMetrics::default()),
        posted_at: None,
        raw: serde_json::Value::Null,
    }
}

/// Work-item source over an in-memory row set. State transitions mutate
/// the rows so repeated cycles see the updated states, and every write is
/// appended to the event log.
pub struct FakeSource {
    items: Mutex<Vec<WorkItem>>,
    log: EventLog,
    pub fail_mark_collecting: bool,
    pub fail_list: bool,
}

impl FakeSource {
    pub fn new(items: Vec<WorkItem>, log: EventLog) -> Self {
        Self {
            items: Mutex::new(items),
            log,
            fail_mark_collecting: false,
            fail_list: false,
        }
    }

    pub fn items(&self) -> Vec<WorkItem> {
        self.items.lock().unwrap().clone()
    }

    fn apply(&self, rows: &[u32], f: impl Fn(&mut WorkItem)) {
        let mut items = self.items.lock().unwrap();
        for item in items.iter_mut() {
            if rows.contains(&item.row) {
                f(item);
            }
        }
    }

    fn log(&self, event: String) {
        self.log.lock().unwrap().push(event);
    }
}

#[async_trait]
impl WorkItemSource for FakeSource {
    async fn list_work_items(
        &self,
        _source_id: &str,
        _sheet_name: &str,
    ) -> anyhow::Result<Vec<WorkItem>> {
        if self.fail_list {
            anyhow::bail!("sheet backend unavailable");
        }
        Ok(self.items())
    }

    async fn mark_collecting(
        &self,
        _source_id: &str,
        _sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        if self.fail_mark_collecting {
            anyhow::bail!("sheet write failed");
        }
        self.apply(rows, |item| item.collecting = true);
        self.log(format!("mark_collecting {rows:?}"));
        Ok(())
    }

    async fn mark_uncollectable(
        &self,
        _source_id: &str,
        _sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        self.apply(rows, |item| {
            item.collecting = false;
            item.uncollectable = true;
        });
        self.log(format!("mark_uncollectable {rows:?}"));
        Ok(())
    }

    async fn clear_state(
        &self,
        _source_id: &str,
        _sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        self.apply(rows, |item| {
            item.collecting = false;
            item.uncollectable = false;
            item.collected_count = 0;
        });
        self.log(format!("clear_state {rows:?}"));
        Ok(())
    }

    async fn record_collected_counts(
        &self,
        _source_id: &str,
        _sheet_name: &str,
        counts: &[(u32, u32)],
    ) -> anyhow::Result<()> {
        for (row, count) in counts {
            self.apply(&[*row], |item| {
                item.collecting = false;
                item.collected_count = *count;
            });
        }
        self.log(format!("record_counts {counts:?}"));
        Ok(())
    }
}

/// Queue that records enqueued jobs and their delays.
pub struct FakeQueue {
    jobs: Mutex<Vec<(CollectionJob, Duration)>>,
    log: EventLog,
}

impl FakeQueue {
    pub fn new(log: EventLog) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn jobs(&self) -> Vec<(CollectionJob, Duration)> {
        self.jobs.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for FakeQueue {
    async fn enqueue(&self, job: &CollectionJob, delay: Duration) -> anyhow::Result<()> {
        let rows = job
            .sheet_info
            .as_ref()
            .map(|sheet| sheet.rows.clone())
            .unwrap_or_default();
        self.log.lock().unwrap().push(format!("enqueue {rows:?}"));
        self.jobs.lock().unwrap().push((job.clone(), delay));
        Ok(())
    }
}

/// Collector returning canned records, with per-step failure injection.
pub struct FakeCollector {
    pub records: Vec<CanonicalRecord>,
    pub fail_trigger: bool,
    pub fail_await: bool,
}

impl FakeCollector {
    pub fn with_records(records: Vec<CanonicalRecord>) -> Self {
        Self {
            records,
            fail_trigger: false,
            fail_await: false,
        }
    }
}

#[async_trait]
impl Collector for FakeCollector {
    async fn trigger(
        &self,
        platform: Platform,
        _inputs: &[ProviderInput],
    ) -> anyhow::Result<SnapshotHandle> {
        if self.fail_trigger {
            anyhow::bail!("trigger failed");
        }
        Ok(SnapshotHandle {
            snapshot_id: "s_test".to_owned(),
            platform,
        })
    }

    async fn await_completion(
        &self,
        _handle: &SnapshotHandle,
    ) -> anyhow::Result<Vec<CanonicalRecord>> {
        if self.fail_await {
            anyhow::bail!("snapshot timed out");
        }
        Ok(self.records.clone())
    }
}

/// Store that records upsert calls.
#[derive(Default)]
pub struct FakeStore {
    pub upserts: Mutex<Vec<(Platform, usize, Option<Uuid>)>>,
    pub fail_upsert: bool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            upserts: Mutex::new(Vec::new()),
            fail_upsert: false,
        }
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn upsert(
        &self,
        platform: Platform,
        records: &[CanonicalRecord],
        group_id: Option<Uuid>,
    ) -> anyhow::Result<UpsertStats> {
        if self.fail_upsert {
            anyhow::bail!("transaction aborted");
        }
        self.upserts
            .lock()
            .unwrap()
            .push((platform, records.len(), group_id));
        Ok(UpsertStats {
            inserted: records.len() as u64,
            updated: 0,
        })
    }
}

/// Progress sink recording reported percentages.
#[derive(Default)]
pub struct FakeProgress {
    pub reported: Mutex<Vec<i16>>,
}

#[async_trait]
impl ProgressSink for FakeProgress {
    async fn progress(&self, percent: i16) {
        self.reported.lock().unwrap().push(percent);
    }
}
