use std::sync::Arc;

use smpdb_core::{CollectionJob, JobKind, Platform, ProcessState, RecordAuthor, SheetInfo};
use uuid::Uuid;

use super::*;
use crate::testutil::{
    event_log, events, record_for, EventLog, FakeCollector, FakeProgress, FakeSource, FakeStore,
};

fn sheet_job(targets: &[&str], rows: &[u32]) -> CollectionJob {
    CollectionJob::new(
        JobKind::Profile,
        Platform::Instagram,
        targets.iter().map(|t| (*t).to_owned()).collect(),
        12,
    )
    .with_sheet_info(SheetInfo {
        source_id: "doc1".to_owned(),
        sheet_name: "Tracked".to_owned(),
        rows: rows.to_vec(),
    })
    .unwrap()
}

fn processor_with(
    collector: FakeCollector,
    store: FakeStore,
    log: &EventLog,
) -> (
    JobProcessor<Arc<FakeSource>, Arc<FakeCollector>, Arc<FakeStore>>,
    Arc<FakeSource>,
    Arc<FakeStore>,
    Arc<ProcessState>,
) {
    let source = Arc::new(FakeSource::new(Vec::new(), Arc::clone(log)));
    let store = Arc::new(store);
    let state = Arc::new(ProcessState::new());
    let processor = JobProcessor::new(
        Arc::clone(&source),
        Arc::new(collector),
        Arc::clone(&store),
        Arc::clone(&state),
    );
    (processor, source, store, state)
}

#[tokio::test]
async fn successful_job_reconciles_each_target() {
    let log = event_log();
    let records = vec![
        record_for("alice", "https://www.instagram.com/p/1/"),
        record_for("Alice", "https://www.instagram.com/p/2/"),
    ];
    let (processor, _source, store, state) =
        processor_with(FakeCollector::with_records(records), FakeStore::new(), &log);

    let progress = FakeProgress::default();
    let job = sheet_job(&["alice", "bob"], &[10, 11]);
    let outcome = processor.process(&job, &progress).await.unwrap();

    assert_eq!(outcome.records, 2);
    assert_eq!(outcome.stats.inserted, 2);

    // alice matched twice (case-insensitive), bob not at all.
    assert_eq!(
        events(&log),
        vec!["record_counts [(10, 2)]", "mark_uncollectable [11]"]
    );

    assert_eq!(store.upserts.lock().unwrap().len(), 1);
    assert_eq!(*progress.reported.lock().unwrap(), vec![10, 70, 90]);

    let snapshot = state.snapshot();
    assert_eq!(snapshot.completed_jobs, 1);
    assert_eq!(snapshot.failed_jobs, 0);
    assert_eq!(snapshot.active_jobs, 0);
    assert!(snapshot.last_job_at.is_some());
}

#[tokio::test]
async fn targets_match_by_author_id_as_well() {
    let log = event_log();
    let mut record = record_for("someone_else", "https://www.instagram.com/p/1/");
    record.author = Some(RecordAuthor {
        id: Some("99881".to_owned()),
        username: Some("someone_else".to_owned()),
        ..RecordAuthor::default()
    });
    let (processor, _source, _store, _state) =
        processor_with(FakeCollector::with_records(vec![record]), FakeStore::new(), &log);

    let progress = FakeProgress::default();
    let job = sheet_job(&["99881"], &[5]);
    processor.process(&job, &progress).await.unwrap();

    assert_eq!(events(&log), vec!["record_counts [(5, 1)]"]);
}

#[tokio::test]
async fn job_without_sheet_info_skips_reconciliation() {
    let log = event_log();
    let records = vec![record_for("alice", "https://www.instagram.com/p/1/")];
    let (processor, _source, store, _state) =
        processor_with(FakeCollector::with_records(records), FakeStore::new(), &log);

    let progress = FakeProgress::default();
    let job = CollectionJob::new(
        JobKind::Keyword,
        Platform::Instagram,
        vec!["iced coffee".to_owned()],
        25,
    );
    let outcome = processor.process(&job, &progress).await.unwrap();

    assert_eq!(outcome.records, 1);
    assert!(events(&log).is_empty(), "no sheet writes without sheet info");
    assert_eq!(store.upserts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn group_id_flows_through_to_the_store() {
    let log = event_log();
    let group = Uuid::new_v4();
    let records = vec![record_for("alice", "https://www.instagram.com/p/1/")];
    let (processor, _source, store, _state) =
        processor_with(FakeCollector::with_records(records), FakeStore::new(), &log);

    let progress = FakeProgress::default();
    let job = sheet_job(&["alice"], &[2]).with_group(Some(group));
    processor.process(&job, &progress).await.unwrap();

    assert_eq!(store.upserts.lock().unwrap()[0].2, Some(group));
}

#[tokio::test]
async fn trigger_failure_reverts_rows_and_counts_the_failure() {
    let log = event_log();
    let mut collector = FakeCollector::with_records(Vec::new());
    collector.fail_trigger = true;
    let (processor, _source, store, state) = processor_with(collector, FakeStore::new(), &log);

    let progress = FakeProgress::default();
    let job = sheet_job(&["alice", "bob"], &[10, 11]);
    let result = processor.process(&job, &progress).await;

    assert!(result.is_err(), "failure re-raised for the queue to retry");
    assert_eq!(events(&log), vec!["clear_state [10, 11]"]);
    assert!(store.upserts.lock().unwrap().is_empty());
    assert!(progress.reported.lock().unwrap().is_empty());

    let snapshot = state.snapshot();
    assert_eq!(snapshot.failed_jobs, 1);
    assert_eq!(snapshot.completed_jobs, 0);
    assert_eq!(snapshot.active_jobs, 0);
}

#[tokio::test]
async fn wait_timeout_reverts_rows() {
    let log = event_log();
    let mut collector = FakeCollector::with_records(Vec::new());
    collector.fail_await = true;
    let (processor, _source, _store, state) = processor_with(collector, FakeStore::new(), &log);

    let progress = FakeProgress::default();
    let job = sheet_job(&["alice"], &[4]);
    assert!(processor.process(&job, &progress).await.is_err());

    assert_eq!(events(&log), vec!["clear_state [4]"]);
    assert_eq!(*progress.reported.lock().unwrap(), vec![10]);
    assert_eq!(state.snapshot().failed_jobs, 1);
}

#[tokio::test]
async fn persistence_failure_reverts_rows() {
    let log = event_log();
    let records = vec![record_for("alice", "https://www.instagram.com/p/1/")];
    let mut store = FakeStore::new();
    store.fail_upsert = true;
    let (processor, _source, _store, state) =
        processor_with(FakeCollector::with_records(records), store, &log);

    let progress = FakeProgress::default();
    let job = sheet_job(&["alice"], &[4]);
    assert!(processor.process(&job, &progress).await.is_err());

    assert_eq!(events(&log), vec!["clear_state [4]"]);
    assert_eq!(*progress.reported.lock().unwrap(), vec![10, 70]);
    assert_eq!(state.snapshot().failed_jobs, 1);
}

#[tokio::test]
async fn failure_without_sheet_info_skips_reversion() {
    let log = event_log();
    let mut collector = FakeCollector::with_records(Vec::new());
    collector.fail_trigger = true;
    let (processor, _source, _store, state) = processor_with(collector, FakeStore::new(), &log);

    let progress = FakeProgress::default();
    let job = CollectionJob::new(
        JobKind::Hashtag,
        Platform::Tiktok,
        vec!["sunset".to_owned()],
        25,
    );
    assert!(processor.process(&job, &progress).await.is_err());

    assert!(events(&log).is_empty());
    assert_eq!(state.snapshot().failed_jobs, 1);
}

#[tokio::test]
async fn records_without_authors_never_match_targets() {
    let log = event_log();
    let mut record = record_for("alice", "https://www.instagram.com/p/1/");
    record.author = None;
    let (processor, _source, _store, _state) =
        processor_with(FakeCollector::with_records(vec![record]), FakeStore::new(), &log);

    let progress = FakeProgress::default();
    let job = sheet_job(&["alice"], &[9]);
    processor.process(&job, &progress).await.unwrap();

    assert_eq!(events(&log), vec!["mark_uncollectable [9]"]);
}
