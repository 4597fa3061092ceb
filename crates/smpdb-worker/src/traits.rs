//! Seam traits between the orchestration core and its collaborators.
//!
//! The scheduler and job processor are generic over these traits so their
//! state-machine logic can be unit-tested against in-memory fakes; the
//! production implementations in [`crate::adapters`] delegate to the
//! sheets, provider, and db crates.

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use smpdb_core::{CanonicalRecord, CollectionJob, Platform, UpsertStats, WorkItem};
use smpdb_provider::{ProviderInput, SnapshotHandle};

/// External source of truth for work items and their collection state.
///
/// State transitions are idempotent: re-applying a marker to a row is a
/// no-op side effect, not an error.
#[async_trait]
pub trait WorkItemSource: Send + Sync {
    async fn list_work_items(
        &self,
        source_id: &str,
        sheet_name: &str,
    ) -> anyhow::Result<Vec<WorkItem>>;

    async fn mark_collecting(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()>;

    async fn mark_uncollectable(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()>;

    async fn clear_state(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()>;

    async fn record_collected_counts(
        &self,
        source_id: &str,
        sheet_name: &str,
        counts: &[(u32, u32)],
    ) -> anyhow::Result<()>;
}

/// The provider's trigger → bounded-wait protocol.
///
/// Neither call carries a timeout beyond the transport default except the
/// bounded poll loop inside `await_completion`.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn trigger(
        &self,
        platform: Platform,
        inputs: &[ProviderInput],
    ) -> anyhow::Result<SnapshotHandle>;

    async fn await_completion(
        &self,
        handle: &SnapshotHandle,
    ) -> anyhow::Result<Vec<CanonicalRecord>>;
}

/// Durable persistence for canonical records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn upsert(
        &self,
        platform: Platform,
        records: &[CanonicalRecord],
        group_id: Option<Uuid>,
    ) -> anyhow::Result<UpsertStats>;
}

/// Enqueue side of the durable job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &CollectionJob, delay: Duration) -> anyhow::Result<()>;
}

/// Best-effort progress reporting for a running job.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn progress(&self, percent: i16);
}

// Shared handles delegate to their inner implementation, so components can
// be generic over either owned or Arc-wrapped collaborators.

#[async_trait]
impl<T: WorkItemSource + ?Sized> WorkItemSource for std::sync::Arc<T> {
    async fn list_work_items(
        &self,
        source_id: &str,
        sheet_name: &str,
    ) -> anyhow::Result<Vec<WorkItem>> {
        (**self).list_work_items(source_id, sheet_name).await
    }

    async fn mark_collecting(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        (**self).mark_collecting(source_id, sheet_name, rows).await
    }

    async fn mark_uncollectable(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        (**self).mark_uncollectable(source_id, sheet_name, rows).await
    }

    async fn clear_state(
        &self,
        source_id: &str,
        sheet_name: &str,
        rows: &[u32],
    ) -> anyhow::Result<()> {
        (**self).clear_state(source_id, sheet_name, rows).await
    }

    async fn record_collected_counts(
        &self,
        source_id: &str,
        sheet_name: &str,
        counts: &[(u32, u32)],
    ) -> anyhow::Result<()> {
        (**self)
            .record_collected_counts(source_id, sheet_name, counts)
            .await
    }
}

#[async_trait]
impl<T: Collector + ?Sized> Collector for std::sync::Arc<T> {
    async fn trigger(
        &self,
        platform: Platform,
        inputs: &[ProviderInput],
    ) -> anyhow::Result<SnapshotHandle> {
        (**self).trigger(platform, inputs).await
    }

    async fn await_completion(
        &self,
        handle: &SnapshotHandle,
    ) -> anyhow::Result<Vec<CanonicalRecord>> {
        (**self).await_completion(handle).await
    }
}

#[async_trait]
impl<T: RecordStore + ?Sized> RecordStore for std::sync::Arc<T> {
    async fn upsert(
        &self,
        platform: Platform,
        records: &[CanonicalRecord],
        group_id: Option<Uuid>,
    ) -> anyhow::Result<UpsertStats> {
        (**self).upsert(platform, records, group_id).await
    }
}

#[async_trait]
impl<T: JobQueue + ?Sized> JobQueue for std::sync::Arc<T> {
    async fn enqueue(&self, job: &CollectionJob, delay: Duration) -> anyhow::Result<()> {
        (**self).enqueue(job, delay).await
    }
}
