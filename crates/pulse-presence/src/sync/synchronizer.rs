//! Background task running the push source, the poll source and the merge.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::helpers::sleep_until_opt;
use crate::status::{PresenceFilter, PresenceRecord};
use crate::store::{ChangeFeed, ChangeSubscription, FeedEvent, PresenceStore};
use crate::transport::{HealthAction, RetryPolicy, TransportHealthMonitor, TransportState};

use super::merge::{MergeVerdict, StatusMerge};

const OUTPUT_BUFFER: usize = 256;

/// Timing knobs for the synchronizer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
    pub poll_interval: Duration,
    pub poll_failure_threshold: u32,
    pub request_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                initial: Duration::from_secs(30),
                max: Duration::from_secs(300),
                max_attempts: None,
            },
            poll_interval: Duration::from_secs(30),
            poll_failure_threshold: 3,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Combines the push and poll sources behind one observation stream.
pub struct PresenceSynchronizer {
    store: Arc<dyn PresenceStore>,
    feed: Arc<dyn ChangeFeed>,
    config: SyncConfig,
}

impl PresenceSynchronizer {
    pub fn new(store: Arc<dyn PresenceStore>, feed: Arc<dyn ChangeFeed>, config: SyncConfig) -> Self {
        Self {
            store,
            feed,
            config,
        }
    }

    /// Start observing `filter`. Returns a handle controlling the background
    /// task and the stream of status edges. The task ends when the handle is
    /// shut down or dropped, or when the stream's receiver is dropped.
    pub fn observe(self, filter: PresenceFilter) -> (SyncHandle, mpsc::Receiver<PresenceRecord>) {
        let (out_tx, out_rx) = mpsc::channel(OUTPUT_BUFFER);
        let cancel = CancellationToken::new();
        let now = Instant::now();
        let health = TransportHealthMonitor::new(
            self.config.connect_timeout,
            self.config.retry,
            self.config.poll_failure_threshold,
            now,
        );
        let (state_tx, state_rx) = watch::channel(health.state());

        let task = SyncTask {
            store: self.store,
            feed: self.feed,
            config: self.config,
            filter,
            health,
            merge: StatusMerge::new(),
            subscription: None,
            next_poll: None,
            out: out_tx,
            state_tx,
            cancel: cancel.clone(),
        };
        let join = tokio::spawn(task.run());

        (
            SyncHandle {
                cancel,
                state_rx,
                task: Some(join),
            },
            out_rx,
        )
    }
}

/// Control handle for a running synchronizer.
pub struct SyncHandle {
    cancel: CancellationToken,
    state_rx: watch::Receiver<TransportState>,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    /// Current transport health snapshot.
    pub fn transport_state(&self) -> TransportState {
        *self.state_rx.borrow()
    }

    /// Receiver notified on every transport state change.
    pub fn watch_transport(&self) -> watch::Receiver<TransportState> {
        self.state_rx.clone()
    }

    /// Tear down the active transport, abort any in-flight poll and wait
    /// for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "synchronizer task ended abnormally");
            }
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

struct SyncTask {
    store: Arc<dyn PresenceStore>,
    feed: Arc<dyn ChangeFeed>,
    config: SyncConfig,
    filter: PresenceFilter,
    health: TransportHealthMonitor,
    merge: StatusMerge,
    subscription: Option<ChangeSubscription>,
    next_poll: Option<Instant>,
    out: mpsc::Sender<PresenceRecord>,
    state_tx: watch::Sender<TransportState>,
    cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollKind {
    /// Regular cycle while degraded.
    Scheduled,
    /// One-off snapshot after push comes back, covering the gap.
    Reconcile,
}

impl SyncTask {
    async fn run(mut self) {
        self.open_subscription().await;

        loop {
            self.publish_state();
            if self.out.is_closed() {
                debug!("observer stream dropped, stopping synchronizer");
                break;
            }

            let health_deadline = self.health.next_deadline();
            let poll_at = if self.health.is_polling() {
                self.next_poll
            } else {
                None
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                event = next_feed_event(&mut self.subscription) => {
                    self.handle_feed_event(event).await;
                }
                _ = sleep_until_opt(health_deadline) => {
                    self.handle_health_deadline().await;
                }
                _ = sleep_until_opt(poll_at) => {
                    self.poll(PollKind::Scheduled).await;
                }
            }
        }

        if let Some(sub) = self.subscription.take() {
            sub.close();
        }
        debug!("synchronizer stopped");
    }

    async fn handle_feed_event(&mut self, event: Option<FeedEvent>) {
        let now = Instant::now();
        match event {
            Some(FeedEvent::Acknowledged) => {
                if self.health.on_acknowledged(now) {
                    self.next_poll = None;
                    self.poll(PollKind::Reconcile).await;
                }
            }
            Some(FeedEvent::Change(record)) => {
                self.deliver(record, "push").await;
            }
            Some(FeedEvent::Error(message)) => {
                warn!(error = %message, "push transport error");
                if self.health.on_transport_error(now, &message) {
                    self.enter_polling(now);
                }
            }
            Some(FeedEvent::Timeout) => {
                warn!("push transport timeout");
                if self.health.on_transport_timeout(now) {
                    self.enter_polling(now);
                }
            }
            None => {
                self.subscription = None;
                if self.health.on_transport_error(now, "subscription closed") {
                    self.enter_polling(now);
                }
            }
        }
    }

    async fn handle_health_deadline(&mut self) {
        let now = Instant::now();
        match self.health.poll_deadline(now) {
            Some(HealthAction::Degraded) => self.enter_polling(now),
            Some(HealthAction::Resubscribe) => self.open_subscription().await,
            None => {}
        }
    }

    async fn open_subscription(&mut self) {
        if let Some(old) = self.subscription.take() {
            old.close();
        }
        let opened = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            r = tokio::time::timeout(
                self.config.connect_timeout,
                self.feed.subscribe_changes(&self.filter),
            ) => r,
        };
        let reason = match opened {
            Ok(Ok(sub)) => {
                debug!("push subscription requested");
                self.subscription = Some(sub);
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => "subscribe timed out".to_string(),
        };
        warn!(%reason, "push subscription failed");
        let now = Instant::now();
        if self.health.on_transport_error(now, &reason) {
            self.enter_polling(now);
        }
    }

    /// Drop the push subscription and make sure a poll is due. An overdue
    /// or missing schedule polls immediately; a pending one is kept so
    /// repeated failed retries do not multiply polls.
    fn enter_polling(&mut self, now: Instant) {
        if let Some(sub) = self.subscription.take() {
            sub.close();
        }
        let keep = self.next_poll.filter(|at| *at > now);
        self.next_poll = Some(keep.unwrap_or(now));
        info!("falling back to snapshot polling");
    }

    async fn poll(&mut self, kind: PollKind) {
        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return,
            r = tokio::time::timeout(
                self.config.request_timeout,
                self.store.poll_snapshot(&self.filter),
            ) => r,
        };

        let ok = match result {
            Ok(Ok(snapshot)) => {
                trace!(records = snapshot.len(), "poll snapshot received");
                // The merge drops rows observers already have, whichever
                // source delivered them.
                for record in snapshot {
                    self.deliver(record, "poll").await;
                }
                true
            }
            Ok(Err(e)) => {
                warn!(error = %e, "poll failed");
                false
            }
            Err(_elapsed) => {
                warn!("poll timed out");
                false
            }
        };

        if kind == PollKind::Scheduled {
            self.health.on_poll_result(ok, Instant::now());
            if self.health.is_polling() {
                self.next_poll = Some(started + self.config.poll_interval);
            }
        }
    }

    async fn deliver(&mut self, record: PresenceRecord, source: &'static str) {
        if !self.filter.matches(&record.user_id) {
            return;
        }
        match self.merge.offer(&record) {
            MergeVerdict::Deliver => {
                debug!(user_id = %record.user_id, status = %record.status, source, "status change");
                if self.out.send(record).await.is_err() {
                    debug!("observer stream closed");
                }
            }
            MergeVerdict::Duplicate => {
                trace!(user_id = %record.user_id, source, "dropping repeated status");
            }
            MergeVerdict::Stale => {
                debug!(user_id = %record.user_id, source, "dropping out-of-order status");
            }
        }
    }

    fn publish_state(&self) {
        let current = self.health.state();
        self.state_tx.send_if_modified(|state| {
            if *state != current {
                *state = current;
                true
            } else {
                false
            }
        });
    }
}

/// Next event of the active subscription; pending forever without one.
/// `None` means the subscription closed.
async fn next_feed_event(subscription: &mut Option<ChangeSubscription>) -> Option<FeedEvent> {
    match subscription {
        Some(sub) => sub.recv().await,
        None => std::future::pending().await,
    }
}
