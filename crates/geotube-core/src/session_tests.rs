use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::clock::{Clock, MonotonicClock};
use crate::config::TrackerConfig;
use crate::load::{LoadMetricsRecorder, StaticNetworkInfo};
use crate::model::{GeoPoint, UserId, VideoRef};
use crate::session::SessionTracker;
use crate::store::{MemoryStore, StoreOp};

fn tracker(store: &MemoryStore) -> SessionTracker {
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    SessionTracker::new(Arc::new(store.clone()), clock, &TrackerConfig::default())
}

#[tokio::test(start_paused = true)]
async fn watch_duration_is_truncated_elapsed_seconds() {
    // Arrange
    let store = MemoryStore::new();
    let sessions = tracker(&store);
    let user = UserId::from("user-1");

    // Act
    let session = sessions
        .start_session(&user, &VideoRef::new("abc123"))
        .await
        .expect("session opened");
    sleep(Duration::from_millis(7_900)).await;
    sessions.close(session, true).await;

    // Assert
    let recorded = &store.snapshot().sessions[0];
    assert_eq!(recorded.watch_duration_seconds, Some(7));
    assert!(recorded.completed);
    let ended_at = recorded.ended_at.expect("session closed");
    assert_eq!((ended_at - recorded.started_at).num_milliseconds(), 7_900);
}

#[tokio::test(start_paused = true)]
async fn backend_latency_does_not_leak_into_duration() {
    // Arrange
    let store = MemoryStore::new();
    let sessions = tracker(&store);
    let user = UserId::from("user-1");
    store.set_latency(Some(Duration::from_secs(2)));

    // Act
    let session = sessions
        .start_session(&user, &VideoRef::new("abc123"))
        .await
        .expect("session opened");
    sleep(Duration::from_secs(5)).await;
    store.set_latency(Some(Duration::from_secs(3)));
    sessions.close(session, false).await;

    // Assert
    let recorded = &store.snapshot().sessions[0];
    assert_eq!(recorded.watch_duration_seconds, Some(5));
    assert!(!recorded.completed);
}

#[tokio::test]
async fn start_applies_defaults_and_location() {
    let store = MemoryStore::new();
    let sessions = tracker(&store);
    let mut video = VideoRef::new("abc123");
    video.geo = Some(GeoPoint {
        latitude: 40.4168,
        longitude: -3.7038,
    });

    sessions
        .start_session(&UserId::from("user-1"), &video)
        .await
        .expect("session opened");

    let recorded = &store.snapshot().sessions[0];
    assert_eq!(recorded.video_title, "Unknown Video");
    assert_eq!(recorded.channel_name, "Unknown Channel");
    assert_eq!(recorded.latitude, Some(40.4168));
    assert_eq!(recorded.longitude, Some(-3.7038));
    assert!(recorded.ended_at.is_none());
    assert_eq!(recorded.watch_duration_seconds, None);
}

#[tokio::test]
async fn rejected_start_returns_none() {
    let store = MemoryStore::new();
    store.fail(StoreOp::InsertSession);

    let opened = tracker(&store)
        .start_session(&UserId::from("user-1"), &VideoRef::new("abc123"))
        .await;

    assert!(opened.is_none());
    assert!(store.snapshot().sessions.is_empty());
}

#[tokio::test]
async fn rejected_close_is_swallowed() {
    let store = MemoryStore::new();
    let sessions = tracker(&store);
    let session = sessions
        .start_session(&UserId::from("user-1"), &VideoRef::new("abc123"))
        .await
        .expect("session opened");
    store.fail(StoreOp::CloseSession);

    sessions.close(session, true).await;

    assert_eq!(store.calls(StoreOp::CloseSession), 1);
    assert!(store.snapshot().sessions[0].ended_at.is_none());
}

#[tokio::test]
async fn load_metric_records_connection_class() {
    // Arrange
    let store = MemoryStore::new();
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let known = LoadMetricsRecorder::new(
        Arc::new(store.clone()),
        clock.clone(),
        Arc::new(StaticNetworkInfo(Some("3g".to_string()))),
    );
    let unknown = LoadMetricsRecorder::new(
        Arc::new(store.clone()),
        clock,
        Arc::new(StaticNetworkInfo::default()),
    );
    let user = UserId::from("user-1");

    // Act
    known.record_load(&user, "abc123", 420, true, None).await;
    unknown
        .record_load(&user, "abc123", 9_000, false, Some("Failed to load video"))
        .await;

    // Assert
    let metrics = store.snapshot().load_metrics;
    assert_eq!(metrics.len(), 2);
    assert_eq!(metrics[0].connection_type, "3g");
    assert_eq!(metrics[0].load_duration_ms, 420);
    assert_eq!(metrics[0].error_message, None);
    assert_eq!(metrics[1].connection_type, "unknown");
    assert_eq!(metrics[1].error_message.as_deref(), Some("Failed to load video"));
}

#[tokio::test]
async fn rejected_load_metric_is_swallowed() {
    let store = MemoryStore::new();
    store.fail(StoreOp::InsertLoadMetric);
    let recorder = LoadMetricsRecorder::new(
        Arc::new(store.clone()),
        Arc::new(MonotonicClock::new()),
        Arc::new(StaticNetworkInfo::default()),
    );

    recorder
        .record_load(&UserId::from("user-1"), "abc123", 100, true, None)
        .await;

    assert_eq!(store.calls(StoreOp::InsertLoadMetric), 1);
    assert!(store.snapshot().load_metrics.is_empty());
}
