//! Production implementations of the seam traits, delegating to the
//! sheets, provider, and db crates.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use smpdb_core::{CanonicalRecord, CollectionJob, Platform, UpsertStats, WorkItem};
use smpdb_provider::{ProviderClient, ProviderInput, SnapshotHandle};
use smpdb_sheets::SheetWorkItems;

use crate::traits::{Collector, JobQueue, RecordStore, WorkItemSource};

/// Spreadsheet-backed [`WorkItemSource`].
pub struct SheetSource {
    inner: SheetWorkItems,
}

impl SheetSource {
    #[must_use]
    pub fn new(inner: SheetWorkItems) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl WorkItemSource for SheetSource {
    async fn list_work_items(
        &self,
        source_id: &str,
        sheet_name: &str,
    ) -> anyhow::Result<Vec<WorkItem>> {
        Ok(self.inner.list_work_items(source_id, sheet_name).await?)
    }

    async fn mark_collecting(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        Ok(self.inner.mark_collecting(source_id, sheet_name, rows).await?)
    }

    async fn mark_uncollectable(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        Ok(self
            .inner
            .mark_uncollectable(source_id, sheet_name, rows)
            .await?)
    }

    async fn clear_state(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        Ok(self.inner.clear_state(source_id, sheet_name, rows).await?)
    }

    async fn record_collected_counts(
        &self,
        source_id: &str,
        sheet_name: &str,
        counts: &[(u32, u32)],
    ) -> anyhow::Result<()> {
        Ok(self
            .inner
            .record_collected_counts(source_id, sheet_name, counts)
            .await?)
    }
}

/// Provider-backed [`Collector`].
pub struct ProviderCollector {
    inner: ProviderClient,
}

impl ProviderCollector {
    #[must_use]
    pub fn new(inner: ProviderClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Collector for ProviderCollector {
    async fn trigger(
        &self,
        platform: Platform,
        inputs: &[ProviderInput],
    ) -> anyhow::Result<SnapshotHandle> {
        Ok(self.inner.trigger(platform, inputs).await?)
    }

    async fn await_completion(
        &self,
        handle: &SnapshotHandle,
    ) -> anyhow::Result<Vec<CanonicalRecord>> {
        Ok(self.inner.await_completion(handle).await?)
    }
}

/// Postgres-backed [`RecordStore`].
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn upsert(
        &self,
        platform: Platform,
        records: &[CanonicalRecord],
        group_id: Option<Uuid>,
    ) -> anyhow::Result<UpsertStats> {
        Ok(smpdb_db::upsert_posts(&self.pool, platform, records, group_id).await?)
    }
}

/// Postgres-backed [`JobQueue`] enqueue handle.
pub struct PgJobQueue {
    pool: PgPool,
    max_attempts: u32,
}

impl PgJobQueue {
    #[must_use]
    pub fn new(pool: PgPool, max_attempts: u32) -> Self {
        Self { pool, max_attempts }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(&self, job: &CollectionJob, delay: Duration) -> anyhow::Result<()> {
        let row = smpdb_db::enqueue_job(&self.pool, job, delay, self.max_attempts).await?;
        tracing::debug!(
            job_id = row.id,
            public_id = %row.public_id,
            kind = %row.kind,
            platform = %row.platform,
            delay_secs = delay.as_secs(),
            "job enqueued"
        );
        Ok(())
    }
}
