mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use cadenza_core::dispatch::{ChangeDispatcher, DirtyState, DispatchConfig, FlagGuard};
use cadenza_core::persistence::MemoryPersistence;
use cadenza_types::{ChangeEntry, CompositionId, NodeId, NodePatch, Pending, Position};

use common::QueuedExecutor;

const DEBOUNCE: Duration = Duration::from_millis(2000);

fn setup() -> (ChangeDispatcher, Arc<MemoryPersistence>, QueuedExecutor) {
    let persistence = Arc::new(MemoryPersistence::new());
    let executor = QueuedExecutor::default();
    let dispatcher = ChangeDispatcher::new(
        CompositionId::new(3),
        DispatchConfig::default(),
        persistence.clone(),
        Box::new(executor.clone()),
    );
    (dispatcher, persistence, executor)
}

fn moved(id: u64, x: f64) -> ChangeEntry {
    ChangeEntry::NodeUpdate {
        id: NodeId::new(id),
        patch: NodePatch::position(Position::new(x, 0.0)),
    }
}

fn relabeled(id: u64, label: &str) -> ChangeEntry {
    ChangeEntry::NodeUpdate {
        id: NodeId::new(id),
        patch: NodePatch::label(label),
    }
}

#[test]
fn changes_inside_one_window_share_a_flush() {
    let (mut dispatcher, persistence, executor) = setup();
    let t0 = Instant::now();

    dispatcher.observe(&moved(1, 1.0), t0);
    dispatcher.observe(&relabeled(2, "Bass"), t0 + Duration::from_millis(1500));

    // the second edit pushed the deadline out
    assert!(!dispatcher.poll(t0 + DEBOUNCE));
    assert!(dispatcher.poll(t0 + Duration::from_millis(3500)));
    assert_eq!(executor.pending(), 1);
    executor.run_next();
    dispatcher.drain_feedback(t0 + Duration::from_millis(3600));

    let calls = persistence.calls();
    assert_eq!(calls.len(), 1);
    let (composition, summary) = &calls[0];
    assert_eq!(*composition, CompositionId::new(3));
    assert!(summary.nodes.contains_key(&NodeId::new(1)));
    assert!(summary.nodes.contains_key(&NodeId::new(2)));
    assert_eq!(dispatcher.state(), DirtyState::Clean);
}

#[test]
fn only_one_flush_in_flight() {
    let (mut dispatcher, persistence, executor) = setup();
    let t0 = Instant::now();

    dispatcher.observe(&moved(1, 1.0), t0);
    assert!(dispatcher.poll(t0 + DEBOUNCE));
    assert_eq!(dispatcher.state(), DirtyState::Saving);
    assert!(dispatcher.pending().is_empty());

    // an edit lands while the first flush is still running
    let t1 = t0 + DEBOUNCE + Duration::from_millis(100);
    dispatcher.observe(&moved(2, 2.0), t1);
    assert_eq!(dispatcher.state(), DirtyState::Waiting);
    assert!(!dispatcher.poll(t1 + DEBOUNCE));
    assert_eq!(executor.pending(), 1);

    // once the first completes, the overdue one starts
    executor.run_next();
    assert!(dispatcher.poll(t1 + DEBOUNCE));
    executor.run_next();
    dispatcher.drain_feedback(t1 + DEBOUNCE);

    let calls = persistence.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].1.nodes.contains_key(&NodeId::new(1)));
    assert!(!calls[0].1.nodes.contains_key(&NodeId::new(2)));
    assert!(calls[1].1.nodes.contains_key(&NodeId::new(2)));
    assert_eq!(dispatcher.state(), DirtyState::Clean);
}

#[test]
fn failed_flush_goes_back_under_newer_edits() {
    let (mut dispatcher, persistence, executor) = setup();
    let guard = FlagGuard::new();
    dispatcher.set_guard(Box::new(guard.clone()));
    persistence.fail_next(1);
    let t0 = Instant::now();

    dispatcher.observe(&moved(1, 1.0), t0);
    dispatcher.poll(t0 + DEBOUNCE);
    // newer value for the same node while the doomed flush runs
    dispatcher.observe(&moved(1, 9.0), t0 + DEBOUNCE);
    executor.run_next();
    dispatcher.drain_feedback(t0 + DEBOUNCE);

    assert_eq!(dispatcher.state(), DirtyState::Waiting);
    assert!(guard.is_armed());
    match &dispatcher.pending().nodes[&NodeId::new(1)] {
        Pending::Update(patch) => assert_eq!(patch.position, Some(Position::new(9.0, 0.0))),
        other => panic!("expected a pending update, got {:?}", other),
    }

    let retry = dispatcher.next_deadline().unwrap();
    assert!(dispatcher.poll(retry));
    executor.run_next();
    dispatcher.drain_feedback(retry);

    assert_eq!(dispatcher.state(), DirtyState::Clean);
    assert!(!guard.is_armed());
    assert_eq!(persistence.attempts(), 2);
    assert_eq!(persistence.call_count(), 1);
}

#[test]
fn backoff_grows_while_storage_is_down() {
    let (mut dispatcher, persistence, executor) = setup();
    persistence.set_failing(true);
    let t0 = Instant::now();
    dispatcher.observe(&moved(1, 1.0), t0);

    let mut now = t0 + DEBOUNCE;
    let mut gaps = Vec::new();
    for _ in 0..3 {
        assert!(dispatcher.poll(now));
        executor.run_next();
        dispatcher.drain_feedback(now);
        let next = dispatcher.next_deadline().unwrap();
        gaps.push(next - now);
        now = next;
    }

    assert_eq!(gaps, vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]);
    assert_eq!(dispatcher.failures(), 3);
    assert!(dispatcher.pending().nodes.contains_key(&NodeId::new(1)));
}

#[test]
fn flush_now_skips_the_window() {
    let (mut dispatcher, persistence, executor) = setup();
    let t0 = Instant::now();
    dispatcher.observe(&moved(1, 1.0), t0);

    assert!(dispatcher.flush_now(t0));
    executor.run_next();
    assert!(dispatcher.wait_idle(Duration::from_secs(1)));
    assert_eq!(persistence.call_count(), 1);
    assert_eq!(dispatcher.state(), DirtyState::Clean);
}

#[test]
fn wait_idle_times_out_on_a_stuck_flush() {
    let (mut dispatcher, _, executor) = setup();
    let t0 = Instant::now();
    dispatcher.observe(&moved(1, 1.0), t0);
    dispatcher.flush_now(t0);

    assert!(!dispatcher.wait_idle(Duration::from_millis(20)));
    assert!(dispatcher.is_flushing());
    assert_eq!(executor.pending(), 1);
}
