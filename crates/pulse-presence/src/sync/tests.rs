use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::mpsc;
use tokio::time::{sleep, sleep_until, Instant};

use super::*;
use crate::memory::MemoryStore;
use crate::status::{PresenceFilter, PresenceRecord, Status};
use crate::store::PresenceStore;
use crate::transport::{HealthState, RetryPolicy, TransportMode};

fn base() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

fn record(user: &str, status: Status, offset_secs: i64) -> PresenceRecord {
    PresenceRecord::new(user, status, base() + ChronoDuration::seconds(offset_secs))
}

fn config(retry_initial_secs: u64) -> SyncConfig {
    SyncConfig {
        retry: RetryPolicy {
            initial: Duration::from_secs(retry_initial_secs),
            max: Duration::from_secs(300),
            max_attempts: None,
        },
        ..SyncConfig::default()
    }
}

fn start(
    store: &Arc<MemoryStore>,
    config: SyncConfig,
    filter: PresenceFilter,
) -> (SyncHandle, mpsc::Receiver<PresenceRecord>) {
    PresenceSynchronizer::new(store.clone(), store.clone(), config).observe(filter)
}

fn drain(rx: &mut mpsc::Receiver<PresenceRecord>) -> Vec<(String, Status)> {
    let mut out = Vec::new();
    while let Ok(r) = rx.try_recv() {
        out.push((r.user_id, r.status));
    }
    out
}

async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[test]
fn merge_delivers_edges_only() {
    let mut merge = StatusMerge::new();
    assert_eq!(merge.offer(&record("u1", Status::Online, 0)), MergeVerdict::Deliver);
    assert_eq!(merge.offer(&record("u1", Status::Online, 5)), MergeVerdict::Duplicate);
    assert_eq!(merge.offer(&record("u1", Status::Away, 10)), MergeVerdict::Deliver);
    assert_eq!(
        merge.last_delivered("u1"),
        Some((Status::Away, base() + ChronoDuration::seconds(10)))
    );
}

#[test]
fn merge_rejects_older_events() {
    let mut merge = StatusMerge::new();
    merge.offer(&record("u1", Status::Away, 10));
    assert_eq!(merge.offer(&record("u1", Status::Online, 3)), MergeVerdict::Stale);
    assert_eq!(merge.last_delivered("u1").map(|(s, _)| s), Some(Status::Away));
}

#[test]
fn merge_duplicate_refreshes_stamp() {
    let mut merge = StatusMerge::new();
    merge.offer(&record("u1", Status::Online, 0));
    merge.offer(&record("u1", Status::Online, 20));
    // Older than the refreshed stamp, so stale even though it is newer
    // than the first delivery.
    assert_eq!(merge.offer(&record("u1", Status::Away, 10)), MergeVerdict::Stale);
}

#[test]
fn merge_tracks_users_independently() {
    let mut merge = StatusMerge::new();
    merge.offer(&record("u1", Status::Online, 10));
    assert_eq!(merge.offer(&record("u2", Status::Online, 0)), MergeVerdict::Deliver);
}

#[test]
fn merge_filters_repeated_snapshot_rows() {
    let mut merge = StatusMerge::new();
    merge.offer(&record("a", Status::Online, 0));
    merge.offer(&record("b", Status::Away, 0));

    let second = [record("a", Status::Online, 30), record("b", Status::Offline, 30)];
    let delivered: Vec<_> = second
        .iter()
        .filter(|r| merge.offer(r) == MergeVerdict::Deliver)
        .collect();
    assert_eq!(delivered, vec![&record("b", Status::Offline, 30)]);
}

// ---------------------------------------------------------------------------
// Synchronizer
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn push_path_delivers_each_edge_once() {
    let store = Arc::new(MemoryStore::new());
    store.write_status(&record("u1", Status::Online, 0)).await.unwrap();

    let (handle, mut rx) = start(&store, SyncConfig::default(), PresenceFilter::All);
    settle().await;
    assert_eq!(handle.transport_state().health, HealthState::PushActive);

    // Reconcile snapshot delivered the existing row.
    assert_eq!(drain(&mut rx), vec![("u1".to_string(), Status::Online)]);

    store.write_status(&record("u1", Status::Online, 10)).await.unwrap();
    store.write_status(&record("u1", Status::Away, 20)).await.unwrap();
    store.write_status(&record("u1", Status::Away, 30)).await.unwrap();
    settle().await;

    assert_eq!(drain(&mut rx), vec![("u1".to_string(), Status::Away)]);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn filter_limits_delivered_users() {
    let store = Arc::new(MemoryStore::new());
    let (handle, mut rx) = start(
        &store,
        SyncConfig::default(),
        PresenceFilter::users(["u1"]),
    );
    settle().await;

    store.write_status(&record("u2", Status::Online, 0)).await.unwrap();
    store.write_status(&record("u1", Status::Online, 0)).await.unwrap();
    settle().await;

    assert_eq!(drain(&mut rx), vec![("u1".to_string(), Status::Online)]);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_subscription_degrades_within_connect_timeout() {
    let store = Arc::new(MemoryStore::new());
    store.set_withhold_ack(true);
    let t0 = Instant::now();

    let (handle, _rx) = start(&store, SyncConfig::default(), PresenceFilter::All);
    sleep_until(t0 + Duration::from_millis(4_900)).await;
    assert_eq!(handle.transport_state().health, HealthState::PushConnecting);
    assert_eq!(store.poll_count(), 0);

    sleep_until(t0 + Duration::from_millis(5_001)).await;
    let state = handle.transport_state();
    assert_eq!(state.health, HealthState::DegradedPoll);
    assert_eq!(state.mode, TransportMode::Poll);
    assert_eq!(store.poll_count(), 1);
    // The pending subscription was torn down.
    assert_eq!(store.live_subscriptions().await, 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn degraded_polling_recovers_to_push() {
    let store = Arc::new(MemoryStore::new());
    store.set_feed_available(false);
    let t0 = Instant::now();
    let at = |secs: u64| t0 + Duration::from_secs(secs) + Duration::from_millis(1);

    let (handle, _rx) = start(&store, config(65), PresenceFilter::All);
    settle().await;
    assert_eq!(handle.transport_state().health, HealthState::DegradedPoll);
    assert_eq!(store.poll_count(), 1);

    sleep_until(at(30)).await;
    assert_eq!(store.poll_count(), 2);
    sleep_until(at(60)).await;
    assert_eq!(store.poll_count(), 3);

    sleep_until(at(62)).await;
    store.set_feed_available(true);

    sleep_until(at(65)).await;
    assert_eq!(handle.transport_state().health, HealthState::PushActive);
    assert_eq!(store.subscribe_attempts(), 2);
    // One reconcile snapshot on re-entry.
    assert_eq!(store.poll_count(), 4);

    sleep_until(at(95)).await;
    assert_eq!(store.poll_count(), 4);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn transport_error_switches_to_polling_and_keeps_delivering() {
    let store = Arc::new(MemoryStore::new());
    let t0 = Instant::now();
    let (handle, mut rx) = start(&store, SyncConfig::default(), PresenceFilter::All);
    settle().await;

    store.inject_feed_error("socket reset").await;
    settle().await;
    assert_eq!(handle.transport_state().health, HealthState::DegradedPoll);
    assert_eq!(handle.transport_state().consecutive_failures, 1);

    // The feed is gone, so only the next poll can see this.
    store.write_status(&record("u2", Status::Away, 0)).await.unwrap();
    settle().await;
    assert!(drain(&mut rx).is_empty());

    sleep_until(t0 + Duration::from_secs(31)).await;
    assert_eq!(drain(&mut rx), vec![("u2".to_string(), Status::Away)]);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn feed_timeout_degrades() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _rx) = start(&store, SyncConfig::default(), PresenceFilter::All);
    settle().await;

    store.inject_feed_timeout().await;
    settle().await;
    assert_eq!(handle.transport_state().health, HealthState::DegradedPoll);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn poll_failure_streak_retries_push_early() {
    let store = Arc::new(MemoryStore::new());
    store.set_feed_available(false);
    store.set_polls_failing(true);
    let t0 = Instant::now();

    let (handle, _rx) = start(&store, config(300), PresenceFilter::All);
    sleep_until(t0 + Duration::from_secs(59)).await;
    assert_eq!(store.subscribe_attempts(), 1);

    // Third failed poll at t=60 pulls the retry forward.
    sleep_until(t0 + Duration::from_secs(61)).await;
    assert_eq!(store.subscribe_attempts(), 2);
    assert_eq!(handle.transport_state().consecutive_failures, 2);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn no_duplicates_across_push_and_poll() {
    let store = Arc::new(MemoryStore::new());
    let t0 = Instant::now();
    let (handle, mut rx) = start(&store, SyncConfig::default(), PresenceFilter::All);
    settle().await;

    store.write_status(&record("u1", Status::Online, 0)).await.unwrap();
    settle().await;
    store.inject_feed_error("socket reset").await;

    // The fallback poll and the reconcile snapshot after the retry both
    // see u1 online again.
    sleep_until(t0 + Duration::from_secs(31)).await;
    store.write_status(&record("u1", Status::Away, 40)).await.unwrap();
    sleep_until(t0 + Duration::from_secs(61)).await;

    assert_eq!(
        drain(&mut rx),
        vec![
            ("u1".to_string(), Status::Online),
            ("u1".to_string(), Status::Away),
        ]
    );
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_tears_down_subscription() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _rx) = start(&store, SyncConfig::default(), PresenceFilter::All);
    settle().await;
    assert_eq!(store.live_subscriptions().await, 1);

    handle.shutdown().await;
    assert_eq!(store.live_subscriptions().await, 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_receiver_stops_task() {
    let store = Arc::new(MemoryStore::new());
    let (handle, rx) = start(&store, SyncConfig::default(), PresenceFilter::All);
    settle().await;
    drop(rx);

    // Next loop turn notices the closed stream.
    store.write_status(&record("u1", Status::Online, 0)).await.unwrap();
    settle().await;
    assert_eq!(store.live_subscriptions().await, 0);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn poll_delivers_change_made_after_push_edge() {
    let store = Arc::new(MemoryStore::new());
    store.write_status(&record("a", Status::Online, 0)).await.unwrap();
    let t0 = Instant::now();
    let (handle, mut rx) = start(&store, config(30), PresenceFilter::All);
    settle().await;

    store.write_status(&record("a", Status::Away, 5)).await.unwrap();
    settle().await;
    assert_eq!(
        drain(&mut rx),
        vec![("a".to_string(), Status::Online), ("a".to_string(), Status::Away)]
    );

    // The feed fails before the next change reaches it, so only polling
    // can report a returning to online.
    store.inject_feed_error("socket reset").await;
    store.write_status(&record("a", Status::Online, 10)).await.unwrap();

    sleep_until(t0 + Duration::from_secs(100)).await;
    assert_eq!(handle.transport_state().health, HealthState::PushActive);
    assert_eq!(drain(&mut rx), vec![("a".to_string(), Status::Online)]);
    handle.shutdown().await;
}

/// A feed whose subscribe call never returns.
struct StalledFeed;

#[async_trait::async_trait]
impl crate::store::ChangeFeed for StalledFeed {
    async fn subscribe_changes(
        &self,
        _filter: &PresenceFilter,
    ) -> Result<crate::store::ChangeSubscription, crate::error::TransportError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn stalled_subscribe_degrades_within_connect_timeout() {
    let store = Arc::new(MemoryStore::new());
    store.write_status(&record("a", Status::Online, 0)).await.unwrap();
    let t0 = Instant::now();

    let (handle, mut rx) = PresenceSynchronizer::new(store.clone(), Arc::new(StalledFeed), config(300))
        .observe(PresenceFilter::All);
    sleep_until(t0 + Duration::from_millis(4_900)).await;
    assert_eq!(handle.transport_state().health, HealthState::PushConnecting);
    assert_eq!(store.poll_count(), 0);

    sleep_until(t0 + Duration::from_millis(5_001)).await;
    assert_eq!(handle.transport_state().health, HealthState::DegradedPoll);
    assert_eq!(store.poll_count(), 1);
    assert_eq!(drain(&mut rx), vec![("a".to_string(), Status::Online)]);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_interrupts_stalled_subscribe() {
    let store = Arc::new(MemoryStore::new());
    let (handle, _rx) = PresenceSynchronizer::new(store.clone(), Arc::new(StalledFeed), config(300))
        .observe(PresenceFilter::All);
    settle().await;

    let t0 = Instant::now();
    handle.shutdown().await;
    assert_eq!(Instant::now(), t0);
    assert_eq!(store.poll_count(), 0);
}
