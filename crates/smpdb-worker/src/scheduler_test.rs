use std::sync::Arc;
use std::time::Duration;

use smpdb_core::{JobKind, Platform, ProcessState, SheetSourceConfig};
use uuid::Uuid;

use super::*;
use crate::testutil::{event_log, events, item, EventLog, FakeQueue, FakeSource};

const STAGGER: Duration = Duration::from_secs(30);

fn sheet_source() -> SheetSourceConfig {
    SheetSourceConfig {
        source_id: "doc1".to_owned(),
        sheet_name: "Tracked".to_owned(),
        group_id: None,
        label: None,
    }
}

fn scheduler_with(
    items: Vec<smpdb_core::WorkItem>,
    batch_size: usize,
    log: &EventLog,
) -> (
    CollectionScheduler<Arc<FakeSource>, Arc<FakeQueue>>,
    Arc<FakeSource>,
    Arc<FakeQueue>,
    Arc<ProcessState>,
) {
    let source = Arc::new(FakeSource::new(items, Arc::clone(log)));
    let queue = Arc::new(FakeQueue::new(Arc::clone(log)));
    let state = Arc::new(ProcessState::new());
    let scheduler = CollectionScheduler::new(
        Arc::clone(&source),
        Arc::clone(&queue),
        Arc::clone(&state),
        vec![sheet_source()],
        SchedulerConfig {
            batch_size,
            stagger: STAGGER,
            items_per_target: 12,
        },
    );
    (scheduler, source, queue, state)
}

#[tokio::test]
async fn cycle_skipped_when_paused() {
    let log = event_log();
    let (scheduler, _source, queue, state) =
        scheduler_with(vec![item(2, "alice", Platform::Instagram)], 5, &log);
    state.pause();

    let outcome = scheduler.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Skipped);
    assert!(events(&log).is_empty(), "no source writes on a skipped cycle");
    assert!(queue.jobs().is_empty());
}

#[tokio::test]
async fn cycle_skipped_while_another_cycle_runs() {
    let log = event_log();
    let (scheduler, _source, queue, state) =
        scheduler_with(vec![item(2, "alice", Platform::Instagram)], 5, &log);

    let guard = state.begin_cycle().expect("first claim succeeds");
    let outcome = scheduler.run_cycle().await.unwrap();
    drop(guard);

    assert_eq!(outcome, CycleOutcome::Skipped);
    assert!(events(&log).is_empty(), "no source writes on a skipped cycle");
    assert!(queue.jobs().is_empty());
}

#[tokio::test]
async fn cycle_with_no_eligible_rows_does_nothing() {
    let log = event_log();
    let mut collected = item(2, "alice", Platform::Instagram);
    collected.collected_count = 4;
    let mut in_flight = item(3, "bob", Platform::Instagram);
    in_flight.collecting = true;
    let mut dead = item(4, "carol", Platform::Tiktok);
    dead.uncollectable = true;

    let (scheduler, _source, queue, state) =
        scheduler_with(vec![collected, in_flight, dead], 5, &log);

    let outcome = scheduler.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::NothingToDo);
    assert!(queue.jobs().is_empty());

    let stats = state.snapshot().work_items;
    assert_eq!(stats.total, 3);
    assert_eq!(stats.collected, 1);
    assert_eq!(stats.collecting, 1);
    assert_eq!(stats.uncollectable, 1);
    assert_eq!(stats.uncollected, 0);
}

#[tokio::test]
async fn three_rows_with_batch_size_two_make_two_staggered_batches() {
    let log = event_log();
    let (scheduler, source, queue, _state) = scheduler_with(
        vec![
            item(2, "alice", Platform::Instagram),
            item(3, "bob", Platform::Instagram),
            item(4, "carol", Platform::Instagram),
        ],
        2,
        &log,
    );

    let outcome = scheduler.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Scheduled { batches: 2, jobs: 2 });

    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0].1, Duration::ZERO, "batch 0 enqueued without delay");
    assert_eq!(jobs[1].1, STAGGER, "batch 1 delayed by one stagger step");
    assert_eq!(jobs[0].0.targets, vec!["alice", "bob"]);
    assert_eq!(jobs[0].0.sheet_info.as_ref().unwrap().rows, vec![2, 3]);
    assert_eq!(jobs[1].0.targets, vec!["carol"]);
    assert_eq!(jobs[1].0.sheet_info.as_ref().unwrap().rows, vec![4]);

    // Every batch is marked in the source before its job is enqueued.
    assert_eq!(
        events(&log),
        vec![
            "mark_collecting [2, 3]",
            "enqueue [2, 3]",
            "mark_collecting [4]",
            "enqueue [4]",
        ]
    );

    // The marks actually landed: all rows are now in-flight.
    assert!(source.items().iter().all(|i| i.collecting));
}

#[tokio::test]
async fn batches_split_by_platform_into_separate_jobs() {
    let log = event_log();
    let (scheduler, _source, queue, _state) = scheduler_with(
        vec![
            item(2, "alice", Platform::Instagram),
            item(3, "bob", Platform::Tiktok),
            item(4, "carol", Platform::Instagram),
        ],
        5,
        &log,
    );

    let outcome = scheduler.run_cycle().await.unwrap();

    assert_eq!(outcome, CycleOutcome::Scheduled { batches: 1, jobs: 2 });

    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 2);

    let instagram = &jobs[0].0;
    assert_eq!(instagram.platform, Platform::Instagram);
    assert_eq!(instagram.kind, JobKind::Profile);
    assert_eq!(instagram.targets, vec!["alice", "carol"]);
    assert_eq!(instagram.sheet_info.as_ref().unwrap().rows, vec![2, 4]);

    let tiktok = &jobs[1].0;
    assert_eq!(tiktok.platform, Platform::Tiktok);
    assert_eq!(tiktok.targets, vec!["bob"]);
    assert_eq!(tiktok.sheet_info.as_ref().unwrap().rows, vec![3]);

    // Same batch, same delay for both platform subsets.
    assert_eq!(jobs[0].1, jobs[1].1);
}

#[tokio::test]
async fn duplicate_identifiers_are_scheduled_once() {
    let log = event_log();
    let (scheduler, _source, queue, _state) = scheduler_with(
        vec![
            item(2, "alice", Platform::Instagram),
            item(3, "Alice", Platform::Instagram),
            item(4, "alice", Platform::Tiktok),
        ],
        5,
        &log,
    );

    scheduler.run_cycle().await.unwrap();

    let jobs = queue.jobs();
    assert_eq!(jobs.len(), 2);
    // Row 3 duplicates row 2 (case-insensitive) on the same platform; the
    // tiktok row is a distinct target.
    assert_eq!(jobs[0].0.targets, vec!["alice"]);
    assert_eq!(jobs[0].0.sheet_info.as_ref().unwrap().rows, vec![2]);
    assert_eq!(jobs[1].0.targets, vec!["alice"]);
    assert_eq!(jobs[1].0.sheet_info.as_ref().unwrap().rows, vec![4]);
}

#[tokio::test]
async fn group_id_is_carried_into_jobs() {
    let log = event_log();
    let group = Uuid::new_v4();
    let source = Arc::new(FakeSource::new(
        vec![item(2, "alice", Platform::Instagram)],
        Arc::clone(&log),
    ));
    let queue = Arc::new(FakeQueue::new(Arc::clone(&log)));
    let state = Arc::new(ProcessState::new());
    let scheduler = CollectionScheduler::new(
        Arc::clone(&source),
        Arc::clone(&queue),
        state,
        vec![SheetSourceConfig {
            source_id: "doc1".to_owned(),
            sheet_name: "Tracked".to_owned(),
            group_id: Some(group),
            label: None,
        }],
        SchedulerConfig {
            batch_size: 5,
            stagger: STAGGER,
            items_per_target: 12,
        },
    );

    scheduler.run_cycle().await.unwrap();

    assert_eq!(queue.jobs()[0].0.group_id, Some(group));
}

#[tokio::test]
async fn failed_cycle_releases_the_collecting_flag() {
    let log = event_log();
    let source = Arc::new({
        let mut s = FakeSource::new(
            vec![item(2, "alice", Platform::Instagram)],
            Arc::clone(&log),
        );
        s.fail_mark_collecting = true;
        s
    });
    let queue = Arc::new(FakeQueue::new(Arc::clone(&log)));
    let state = Arc::new(ProcessState::new());
    let scheduler = CollectionScheduler::new(
        Arc::clone(&source),
        Arc::clone(&queue),
        Arc::clone(&state),
        vec![sheet_source()],
        SchedulerConfig {
            batch_size: 5,
            stagger: STAGGER,
            items_per_target: 12,
        },
    );

    let result = scheduler.run_cycle().await;
    assert!(result.is_err(), "mark failure aborts the cycle");
    assert!(
        !state.is_collecting(),
        "collecting flag released on the error path"
    );
    assert!(queue.jobs().is_empty(), "no jobs enqueued after the failure");

    // The next tick is not blocked by the failed cycle.
    assert!(state.begin_cycle().is_some());
}

#[tokio::test]
async fn source_read_failure_aborts_cycle_without_writes() {
    let log = event_log();
    let source = Arc::new({
        let mut s = FakeSource::new(
            vec![item(2, "alice", Platform::Instagram)],
            Arc::clone(&log),
        );
        s.fail_list = true;
        s
    });
    let queue = Arc::new(FakeQueue::new(Arc::clone(&log)));
    let state = Arc::new(ProcessState::new());
    let scheduler = CollectionScheduler::new(
        source,
        Arc::clone(&queue),
        Arc::clone(&state),
        vec![sheet_source()],
        SchedulerConfig {
            batch_size: 5,
            stagger: STAGGER,
            items_per_target: 12,
        },
    );

    assert!(scheduler.run_cycle().await.is_err());
    assert!(events(&log).is_empty());
    assert!(!state.is_collecting());
}
