//! Integration tests for the seen-set poller
//!
//! These drive complete cycles against an in-memory node with file-backed
//! seen-sets, covering restarts, delivery policies and the polling loop.

use pdtools::{
    core::{FetchRequest, RecordKind},
    node::NodeError,
    poller::{DeliveryPolicy, PollError, Poller},
    storage::{FileSeenStore, MemorySeenStore},
};
use std::{sync::Arc, time::Duration};
use tempfile::tempdir;
use tokio::sync::watch;

#[path = "../helpers/mod.rs"]
mod helpers;
use helpers::{
    alert,
    fake_node::{transport_error, FakeNode},
    mock_sink::RecordingSink,
    report, user_request,
};

fn file_store(dir: &std::path::Path, kind: RecordKind) -> Box<FileSeenStore> {
    Box::new(FileSeenStore::new(dir.join(kind.seen_file_name())))
}

#[tokio::test]
async fn test_new_records_are_delivered_once_and_persisted() {
    // Arrange
    let dir = tempdir().unwrap();
    let node = Arc::new(
        FakeNode::new()
            .with_records(RecordKind::Alert, vec![alert("a-1"), alert("a-2")])
            .with_records(RecordKind::UserRequest, vec![user_request("u-1")]),
    );
    let sink = Arc::new(RecordingSink::new());
    let mut poller = Poller::new(node.clone(), sink.clone())
        .track(FetchRequest::new(RecordKind::Alert), file_store(dir.path(), RecordKind::Alert))
        .track(
            FetchRequest::new(RecordKind::UserRequest),
            file_store(dir.path(), RecordKind::UserRequest),
        );
    poller.load().await.unwrap();

    // Act
    let first = poller.poll_once().await.unwrap();
    let second = poller.poll_once().await.unwrap();

    // Assert
    assert_eq!(sink.delivered_ids(), vec!["a-1", "a-2", "u-1"]);
    assert_eq!(first.get(RecordKind::Alert).unwrap().delivered, 2);
    assert_eq!(second.get(RecordKind::Alert).unwrap().new_records(), 0);
    assert_eq!(second.get(RecordKind::Alert).unwrap().fetched, 2);

    let alerts = std::fs::read_to_string(dir.path().join("alerts")).unwrap();
    assert_eq!(alerts, "a-1\na-2\n");
    let users = std::fs::read_to_string(dir.path().join("users")).unwrap();
    assert_eq!(users, "u-1\n");
}

#[tokio::test]
async fn test_restart_does_not_redeliver_seen_records() {
    let dir = tempdir().unwrap();
    let node = Arc::new(
        FakeNode::new().with_records(RecordKind::Report, vec![report("r-1", "email")]),
    );

    let first_sink = Arc::new(RecordingSink::new());
    let mut first = Poller::new(node.clone(), first_sink.clone()).track(
        FetchRequest::new(RecordKind::Report),
        file_store(dir.path(), RecordKind::Report),
    );
    first.load().await.unwrap();
    first.poll_once().await.unwrap();
    drop(first);

    // A fresh process reads the same seen-set file back.
    let second_sink = Arc::new(RecordingSink::new());
    let mut second = Poller::new(node.clone(), second_sink.clone()).track(
        FetchRequest::new(RecordKind::Report),
        file_store(dir.path(), RecordKind::Report),
    );
    second.load().await.unwrap();
    assert_eq!(second.tracked()[0].store().len(), 1);
    second.poll_once().await.unwrap();

    assert_eq!(first_sink.delivered_ids(), vec!["r-1"]);
    assert!(second_sink.delivered_ids().is_empty());
}

#[tokio::test]
async fn test_at_most_once_drops_failed_delivery() {
    let dir = tempdir().unwrap();
    let node = Arc::new(FakeNode::new().with_records(RecordKind::Alert, vec![alert("a-1")]));
    let sink = Arc::new(RecordingSink::failing(1));
    let mut poller = Poller::new(node, sink.clone())
        .policy(DeliveryPolicy::AtMostOnce)
        .track(FetchRequest::new(RecordKind::Alert), file_store(dir.path(), RecordKind::Alert));
    poller.load().await.unwrap();

    let report = poller.poll_once().await.unwrap();
    poller.poll_once().await.unwrap();

    assert_eq!(report.get(RecordKind::Alert).unwrap().dropped, 1);
    assert_eq!(sink.attempts(), 1, "a dropped record is never retried");
    assert!(sink.delivered_ids().is_empty());
    let alerts = std::fs::read_to_string(dir.path().join("alerts")).unwrap();
    assert_eq!(alerts, "a-1\n");
}

#[tokio::test]
async fn test_at_least_once_retries_on_next_cycle() {
    let dir = tempdir().unwrap();
    let node = Arc::new(FakeNode::new().with_records(RecordKind::Alert, vec![alert("a-1")]));
    let sink = Arc::new(RecordingSink::failing(1));
    let mut poller = Poller::new(node, sink.clone())
        .policy(DeliveryPolicy::AtLeastOnce)
        .track(FetchRequest::new(RecordKind::Alert), file_store(dir.path(), RecordKind::Alert));
    poller.load().await.unwrap();

    let first = poller.poll_once().await.unwrap();
    assert_eq!(first.get(RecordKind::Alert).unwrap().pending, 1);
    assert!(!dir.path().join("alerts").exists());

    let second = poller.poll_once().await.unwrap();
    assert_eq!(second.get(RecordKind::Alert).unwrap().delivered, 1);
    assert_eq!(sink.delivered_ids(), vec!["a-1"]);
    assert_eq!(sink.attempts(), 2);
}

#[tokio::test]
async fn test_node_errors_leave_other_kinds_untouched() {
    let node = Arc::new(
        FakeNode::new()
            .with_records(RecordKind::Alert, vec![alert("a-1")])
            .with_records(RecordKind::Report, vec![report("r-1", "email")]),
    );
    node.push_response(
        RecordKind::Alert,
        Err(NodeError::Api("You are not authorized".to_string())),
    );
    let sink = Arc::new(RecordingSink::new());
    let mut poller = Poller::new(node.clone(), sink.clone())
        .track(FetchRequest::new(RecordKind::Alert), Box::new(MemorySeenStore::new()))
        .track(FetchRequest::new(RecordKind::Report), Box::new(MemorySeenStore::new()));

    let report = poller.poll_once().await.unwrap();

    let alerts = report.get(RecordKind::Alert).unwrap();
    assert_eq!(alerts.fetched, 0);
    assert!(alerts.error.as_deref().unwrap().contains("not authorized"));
    assert_eq!(sink.delivered_ids(), vec!["r-1"]);

    // The alert shows up once the node answers again.
    poller.poll_once().await.unwrap();
    assert_eq!(sink.delivered_ids(), vec!["r-1", "a-1"]);
}

#[tokio::test]
async fn test_request_error_stops_the_cycle() {
    let node = Arc::new(FakeNode::new());
    node.push_response(
        RecordKind::Alert,
        Err(NodeError::Request("invalid node URL".to_string())),
    );
    let sink = Arc::new(RecordingSink::new());
    let mut poller = Poller::new(node, sink)
        .track(FetchRequest::new(RecordKind::Alert), Box::new(MemorySeenStore::new()));

    let result = poller.poll_once().await;

    assert!(matches!(result, Err(PollError::Node(NodeError::Request(_)))));
}

#[tokio::test]
async fn test_transport_error_does_not_end_the_loop() {
    // Arrange
    let failure = transport_error().await;
    assert!(failure.is_continuable());
    tokio::time::pause();

    let node = Arc::new(FakeNode::new());
    node.push_response(RecordKind::Alert, Err(failure));
    node.push_response(RecordKind::Alert, Ok(vec![alert("a-1")]));
    let sink = Arc::new(RecordingSink::new());
    let poller = Poller::new(node.clone(), sink.clone())
        .delay(Duration::from_secs(300))
        .track(FetchRequest::new(RecordKind::Alert), Box::new(MemorySeenStore::new()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(poller.run(shutdown_rx));

    // Act & Assert: the first cycle fails and the poller goes to sleep.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(node.fetch_count(RecordKind::Alert), 1);
    assert!(sink.delivered_ids().is_empty());

    // The second cycle succeeds after the delay.
    tokio::time::sleep(Duration::from_secs(301)).await;
    assert_eq!(node.fetch_count(RecordKind::Alert), 2);
    assert_eq!(sink.delivered_ids(), vec!["a-1"]);

    shutdown_tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("poller did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_before_first_cycle_skips_polling() {
    let node = Arc::new(FakeNode::new().with_records(RecordKind::Alert, vec![alert("a-1")]));
    let sink = Arc::new(RecordingSink::new());
    let poller = Poller::new(node.clone(), sink.clone())
        .track(FetchRequest::new(RecordKind::Alert), Box::new(MemorySeenStore::new()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();
    poller.run(shutdown_rx).await.unwrap();

    assert_eq!(node.fetch_count(RecordKind::Alert), 0);
    assert!(sink.delivered_ids().is_empty());
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_the_loop() {
    let node = Arc::new(FakeNode::new());
    let sink = Arc::new(RecordingSink::new());
    let poller = Poller::new(node.clone(), sink)
        .delay(Duration::from_secs(3600))
        .track(FetchRequest::new(RecordKind::Alert), Box::new(MemorySeenStore::new()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(poller.run(shutdown_rx));
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(shutdown_tx);

    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("poller did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(node.fetch_count(RecordKind::Alert), 1);
}

#[tokio::test]
async fn test_refused_report_does_not_stall_paged_forwarding() {
    // Arrange: five reports served two at a time, the first always refused.
    let dir = tempdir().unwrap();
    let reports = (0..5).map(|i| report(&format!("r-{}", i), "email")).collect();
    let node = Arc::new(FakeNode::new().with_records(RecordKind::Report, reports));
    let sink = Arc::new(RecordingSink::refusing(&["r-0"]));
    let mut poller = Poller::new(node.clone(), sink.clone())
        .policy(DeliveryPolicy::AtLeastOnce)
        .track(
            FetchRequest::new(RecordKind::Report).paged(2),
            file_store(dir.path(), RecordKind::Report),
        );
    poller.load().await.unwrap();

    // Act
    for _ in 0..5 {
        poller.poll_once().await.unwrap();
    }

    // Assert
    assert_eq!(sink.delivered_ids(), vec!["r-1", "r-2", "r-3", "r-4"]);
    assert_eq!(poller.tracked()[0].pending().len(), 1);
    let seen = std::fs::read_to_string(dir.path().join("reports")).unwrap();
    assert_eq!(seen, "r-1\nr-2\nr-3\nr-4\n");

    sink.accept_all();
    poller.poll_once().await.unwrap();
    assert_eq!(sink.delivered_ids().last().map(String::as_str), Some("r-0"));
    assert!(poller.tracked()[0].pending().is_empty());
}
