use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::clock::{Clock, MonotonicClock};
use crate::connectivity::{ConnectivityMonitor, ConnectivityState};
use crate::model::{IssueType, UserId};
use crate::store::{MemoryStore, StoreOp};

fn monitor(store: &MemoryStore, single_open_issue: bool) -> ConnectivityMonitor {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    ConnectivityMonitor::new(
        Arc::new(store.clone()),
        clock,
        UserId::from("user-1"),
        Some("abc123".to_string()),
        single_open_issue,
    )
}

#[tokio::test(start_paused = true)]
async fn offline_then_online_opens_and_resolves_one_issue() {
    // Arrange
    let store = MemoryStore::new();
    let mut monitor = monitor(&store, false);
    assert_eq!(monitor.state(), &ConnectivityState::Clear);

    // Act
    monitor.report_fault(IssueType::ConnectionLost, "Internet connection lost");
    let opened = monitor.next_opened().await.expect("insert in flight");
    monitor.apply_opened(opened.clone());
    let held = monitor.state().clone();
    sleep(Duration::from_secs(2)).await;
    monitor.connection_restored();
    sleep(Duration::from_millis(10)).await;

    // Assert
    assert_eq!(held, ConnectivityState::IssueOpen(opened.expect("issue id")));
    assert_eq!(monitor.state(), &ConnectivityState::Clear);
    let issues = store.snapshot().issues;
    assert_eq!(issues.len(), 1);
    assert!(issues[0].resolved);
    let resolved_at = issues[0].resolution_time.expect("resolution time");
    assert!(resolved_at > issues[0].occurred_at);
}

#[tokio::test]
async fn online_without_open_issue_is_a_no_op() {
    let store = MemoryStore::new();
    let mut monitor = monitor(&store, false);

    monitor.connection_restored();
    tokio::task::yield_now().await;

    assert_eq!(monitor.state(), &ConnectivityState::Clear);
    assert_eq!(store.calls(StoreOp::ResolveIssue), 0);
}

#[tokio::test]
async fn repeated_faults_each_insert_an_issue() {
    let store = MemoryStore::new();
    let mut monitor = monitor(&store, false);

    monitor.report_fault(IssueType::ConnectionLost, "Internet connection lost");
    monitor.report_fault(IssueType::LoadFailure, "Video failed to load");
    assert_eq!(monitor.in_flight(), 2);
    while let Some(opened) = monitor.next_opened().await {
        monitor.apply_opened(opened);
    }

    assert_eq!(store.snapshot().issues.len(), 2);
    assert!(matches!(monitor.state(), ConnectivityState::IssueOpen(_)));
}

#[tokio::test]
async fn single_open_issue_folds_repeated_faults() {
    let store = MemoryStore::new();
    let mut monitor = monitor(&store, true);

    monitor.report_fault(IssueType::ConnectionLost, "Internet connection lost");
    monitor.report_fault(IssueType::ConnectionLost, "Internet connection lost");
    while let Some(opened) = monitor.next_opened().await {
        monitor.apply_opened(opened);
    }
    monitor.report_fault(IssueType::LoadFailure, "Video failed to load");

    assert_eq!(monitor.in_flight(), 0);
    assert_eq!(store.calls(StoreOp::InsertIssue), 1);
}

#[tokio::test]
async fn rejected_insert_leaves_state_clear() {
    let store = MemoryStore::new();
    store.fail(StoreOp::InsertIssue);
    let mut monitor = monitor(&store, false);

    monitor.report_fault(IssueType::ConnectionLost, "Internet connection lost");
    let opened = monitor.next_opened().await.expect("insert in flight");
    monitor.apply_opened(opened);

    assert_eq!(monitor.state(), &ConnectivityState::Clear);
    assert!(store.snapshot().issues.is_empty());
}

#[tokio::test(start_paused = true)]
async fn restore_sees_an_insert_that_finished_unjoined() {
    // Arrange
    let store = MemoryStore::new();
    let mut monitor = monitor(&store, false);
    monitor.report_fault(IssueType::ConnectionLost, "Internet connection lost");
    sleep(Duration::from_millis(10)).await;
    assert_eq!(store.snapshot().issues.len(), 1);
    assert_eq!(monitor.state(), &ConnectivityState::Clear);

    // Act
    monitor.connection_restored();
    sleep(Duration::from_millis(10)).await;

    // Assert
    assert_eq!(monitor.state(), &ConnectivityState::Clear);
    assert_eq!(monitor.in_flight(), 0);
    let issues = store.snapshot().issues;
    assert!(issues[0].resolved);
    assert_eq!(store.calls(StoreOp::ResolveIssue), 1);
}
