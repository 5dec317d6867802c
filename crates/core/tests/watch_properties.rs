//! Ledger → broker → reducer properties over arbitrary mutation sequences,
//! plus the end-to-end watch scenarios.

use std::sync::Arc;

use jobwatch_core::{
    EventKind, Job, JobLedger, JobStatus, JobsView, Progress, Snapshot, Subscription, WatchBroker,
    WatchEvent,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Create(u8),
    Start(u8),
    Progress(u8, u64),
    Terminate(u8, JobStatus),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let id = 0u8..6;
    prop_oneof![
        id.clone().prop_map(Op::Create),
        id.clone().prop_map(Op::Start),
        (id.clone(), 0u64..100).prop_map(|(i, d)| Op::Progress(i, d)),
        (
            id,
            prop_oneof![
                Just(JobStatus::Succeeded),
                Just(JobStatus::Failed),
                Just(JobStatus::Canceled)
            ]
        )
            .prop_map(|(i, s)| Op::Terminate(i, s)),
    ]
}

fn apply(ledger: &JobLedger, op: &Op) {
    // Invalid operations (unknown id, finished job) are expected and ignored.
    let _ = match op {
        Op::Create(i) => ledger.create(Job::new(format!("job-{i}"), "test", "Test")),
        Op::Start(i) => ledger.start(&format!("job-{i}")),
        Op::Progress(i, done) => ledger.update_progress(
            &format!("job-{i}"),
            Progress::new(100, "bytes").with_done(*done),
        ),
        Op::Terminate(i, status) => ledger.terminate(&format!("job-{i}"), *status, None),
    };
}

fn drain(sub: &mut Subscription) -> Vec<WatchEvent> {
    let mut events = Vec::new();
    while let Some(event) = sub.try_recv() {
        events.push(event);
    }
    events
}

fn view_from(snapshot: Snapshot) -> JobsView {
    let mut view = JobsView::new();
    view.apply_snapshot(snapshot.version, snapshot.active, snapshot.history);
    view
}

fn assert_classified(snapshot: &Snapshot) {
    for job in &snapshot.active {
        assert!(job.status.is_active(), "{} in active with {}", job.id, job.status);
        assert!(!snapshot.history.iter().any(|h| h.id == job.id));
    }
    for job in &snapshot.history {
        assert!(job.status.is_terminal(), "{} in history with {}", job.id, job.status);
    }
}

proptest! {
    #[test]
    fn test_versions_strictly_increase_without_gaps(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let ledger = JobLedger::default().with_history_retention(3);
        let mut sub = ledger.broker().subscribe(0);
        for op in &ops {
            apply(&ledger, op);
        }
        let events = drain(&mut sub);
        for (i, event) in events.iter().enumerate() {
            prop_assert_eq!(event.version, i as u64 + 1);
        }
        prop_assert_eq!(events.len() as u64, ledger.current_version());
    }

    #[test]
    fn test_snapshots_partition_by_status(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let ledger = JobLedger::default();
        for op in &ops {
            apply(&ledger, op);
            assert_classified(&ledger.snapshot(usize::MAX));
        }
    }

    #[test]
    fn test_replaying_all_events_matches_snapshot(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let ledger = JobLedger::default().with_history_retention(4);
        let mut sub = ledger.broker().subscribe(0);
        for op in &ops {
            apply(&ledger, op);
        }

        let mut view = JobsView::new();
        for event in drain(&mut sub) {
            view.apply_event(event.kind, event.version, event.job);
        }
        prop_assert_eq!(view, view_from(ledger.snapshot(usize::MAX)));
    }

    #[test]
    fn test_applying_events_twice_is_idempotent(ops in prop::collection::vec(op_strategy(), 0..60)) {
        let ledger = JobLedger::default();
        let mut sub = ledger.broker().subscribe(0);
        for op in &ops {
            apply(&ledger, op);
        }

        let mut once = JobsView::new();
        let mut twice = JobsView::new();
        for event in drain(&mut sub) {
            once.apply_event(event.kind, event.version, event.job.clone());
            twice.apply_event(event.kind, event.version, event.job.clone());
            twice.apply_event(event.kind, event.version, event.job);
        }
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn test_resumed_replay_reconstructs_latest_state(
        before in prop::collection::vec(op_strategy(), 1..40),
        after in prop::collection::vec(op_strategy(), 0..40),
    ) {
        let ledger = JobLedger::default();
        for op in &before {
            apply(&ledger, op);
        }
        let checkpoint = ledger.snapshot(usize::MAX);
        for op in &after {
            apply(&ledger, op);
        }

        let mut sub = ledger.broker().subscribe(checkpoint.version);
        prop_assume!(sub.resume_ok());

        let mut view = view_from(checkpoint);
        for event in drain(&mut sub) {
            view.apply_event(event.kind, event.version, event.job);
        }
        prop_assert_eq!(view, view_from(ledger.snapshot(usize::MAX)));
    }

    #[test]
    fn test_stale_events_never_change_state(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let ledger = JobLedger::default();
        let mut sub = ledger.broker().subscribe(0);
        for op in &ops {
            apply(&ledger, op);
        }
        let events = drain(&mut sub);

        let mut view = view_from(ledger.snapshot(usize::MAX));
        let before = view.clone();
        for event in events.into_iter().filter(|e| e.version < before.version()) {
            view.apply_event(event.kind, event.version, event.job);
        }
        prop_assert_eq!(view, before);
    }
}

#[test]
fn test_watcher_from_zero_sees_snapshot_then_three_events() {
    let ledger = JobLedger::default();
    let (snapshot, mut sub) = ledger.watch(0, 100);
    assert_eq!(snapshot.version, 0);
    assert!(!sub.resume_ok());

    ledger.create(Job::new("jobA", "file_transfer", "Copy A")).unwrap();
    ledger
        .update_progress("jobA", Progress::new(10, "files").with_done(5))
        .unwrap();
    ledger.terminate("jobA", JobStatus::Succeeded, None).unwrap();

    let events = drain(&mut sub);
    let kinds: Vec<_> = events.iter().map(|e| (e.kind, e.version)).collect();
    assert_eq!(
        kinds,
        vec![
            (EventKind::Added, 1),
            (EventKind::Modified, 2),
            (EventKind::Modified, 3),
        ]
    );
    assert_eq!(events[2].job.status, JobStatus::Succeeded);

    let mut view = view_from(snapshot);
    for event in events {
        view.apply_event(event.kind, event.version, event.job);
    }
    assert_eq!(view, view_from(ledger.snapshot(100)));
    assert_eq!(view.version(), 3);
    assert!(view.active().is_empty());
    assert_eq!(view.history()[0].id, "jobA");
}

#[test]
fn test_watchers_joining_at_different_times_converge() {
    let ledger = JobLedger::default();
    let (snap_a, mut sub_a) = ledger.watch(0, 100);

    ledger.create(Job::new("a", "t", "A")).unwrap();
    ledger.create(Job::new("b", "t", "B")).unwrap();
    ledger.start("a").unwrap();

    let (snap_b, mut sub_b) = ledger.watch(0, 100);

    ledger.terminate("a", JobStatus::Succeeded, None).unwrap();
    ledger
        .update_progress("b", Progress::new(4, "chunks").with_done(1))
        .unwrap();

    let mut view_a = view_from(snap_a);
    for event in drain(&mut sub_a) {
        view_a.apply_event(event.kind, event.version, event.job);
    }

    // a mid-stream resync on the second watcher must not disturb convergence
    let mut view_b = view_from(snap_b);
    let events_b = drain(&mut sub_b);
    view_b.apply_event(events_b[0].kind, events_b[0].version, events_b[0].job.clone());
    let resync = ledger.snapshot(100);
    view_b.apply_snapshot(resync.version, resync.active, resync.history);
    for event in events_b {
        view_b.apply_event(event.kind, event.version, event.job);
    }

    assert_eq!(view_a, view_b);
    assert_eq!(view_a.version(), 5);
}

#[test]
fn test_watchers_converge_when_history_exceeds_snapshot_limit() {
    let ledger = JobLedger::default();
    let (snap_a, mut sub_a) = ledger.watch(0, 2);

    for id in ["a", "b", "c", "d"] {
        ledger.create(Job::new(id, "t", id)).unwrap();
        ledger.terminate(id, JobStatus::Succeeded, None).unwrap();
    }

    let mut view_a = JobsView::new().with_history_cap(2);
    view_a.apply_snapshot(snap_a.version, snap_a.active, snap_a.history);
    for event in drain(&mut sub_a) {
        view_a.apply_event(event.kind, event.version, event.job);
    }

    let (snap_b, _sub_b) = ledger.watch(0, 2);
    let mut view_b = JobsView::new().with_history_cap(2);
    view_b.apply_snapshot(snap_b.version, snap_b.active, snap_b.history);

    assert_eq!(view_a, view_b);
    assert_eq!(view_a.version(), 8);
    let ids: Vec<&str> = view_a.history().iter().map(|j| j.id.as_str()).collect();
    assert_eq!(ids.len(), 2);
}

#[test]
fn test_resume_older_than_ring_falls_back_to_snapshot() {
    let broker = Arc::new(WatchBroker::new(2, 16));
    let ledger = JobLedger::new(broker);
    for i in 0..5 {
        ledger.create(Job::new(format!("job-{i}"), "t", "T")).unwrap();
    }

    let (snapshot, sub) = ledger.watch(1, 100);
    assert!(!sub.resume_ok());

    let mut view = JobsView::new();
    view.apply_event(EventKind::Added, 1, Job::new("phantom", "t", "Phantom"));
    view.apply_snapshot(snapshot.version, snapshot.active.clone(), snapshot.history.clone());

    assert!(view.get("phantom").is_none());
    assert_eq!(view.to_snapshot(), snapshot);
}
