//! In-process status store and change feed.
//!
//! Behaves like the shared store the presence core expects: upserts keyed
//! by user, stale `last_seen` silently ignored, accepted writes pushed to
//! every matching live subscription. Fault switches let local runs and
//! tests exercise the degraded paths without a network.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{StoreError, TransportError};
use crate::status::{PresenceFilter, PresenceRecord};
use crate::store::{ChangeFeed, ChangeSubscription, FeedEvent, PresenceStore};

const SUBSCRIPTION_BUFFER: usize = 256;
/// Oldest write log entries are dropped past this many.
pub const WRITE_LOG_CAPACITY: usize = 1024;

/// How the store treated one write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Accepted,
    /// `last_seen` was older than the stored record; ignored.
    Stale,
    /// Rejected by fault injection.
    Failed,
}

/// One write request as seen by the store.
#[derive(Debug, Clone)]
pub struct WriteLogEntry {
    pub at: Instant,
    pub record: PresenceRecord,
    pub outcome: WriteOutcome,
}

struct Subscriber {
    filter: PresenceFilter,
    tx: mpsc::Sender<FeedEvent>,
    cancel: CancellationToken,
}

impl Subscriber {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }
}

/// In-memory [`PresenceStore`] + [`ChangeFeed`].
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, PresenceRecord>>,
    writes: Mutex<VecDeque<WriteLogEntry>>,
    subscribers: Mutex<Vec<Subscriber>>,
    feed_available: AtomicBool,
    withhold_ack: AtomicBool,
    writes_failing: AtomicBool,
    polls_failing: AtomicBool,
    subscribe_attempts: AtomicU32,
    polls: AtomicU32,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            writes: Mutex::new(VecDeque::new()),
            subscribers: Mutex::new(Vec::new()),
            feed_available: AtomicBool::new(true),
            withhold_ack: AtomicBool::new(false),
            writes_failing: AtomicBool::new(false),
            polls_failing: AtomicBool::new(false),
            subscribe_attempts: AtomicU32::new(0),
            polls: AtomicU32::new(0),
        }
    }

    // -- fault injection ----------------------------------------------------

    /// When false, new subscriptions are refused outright.
    pub fn set_feed_available(&self, available: bool) {
        self.feed_available.store(available, Ordering::SeqCst);
    }

    /// When true, new subscriptions open but are never acknowledged.
    pub fn set_withhold_ack(&self, withhold: bool) {
        self.withhold_ack.store(withhold, Ordering::SeqCst);
    }

    pub fn set_writes_failing(&self, failing: bool) {
        self.writes_failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_polls_failing(&self, failing: bool) {
        self.polls_failing.store(failing, Ordering::SeqCst);
    }

    /// Push a transport error into every live subscription.
    pub async fn inject_feed_error(&self, message: &str) {
        self.broadcast_control(FeedEvent::Error(message.to_string()))
            .await;
    }

    /// Push a transport timeout into every live subscription.
    pub async fn inject_feed_timeout(&self) {
        self.broadcast_control(FeedEvent::Timeout).await;
    }

    // -- inspection ---------------------------------------------------------

    /// The most recent write requests, in arrival order.
    pub async fn writes(&self) -> Vec<WriteLogEntry> {
        self.writes.lock().await.iter().cloned().collect()
    }

    /// Only the writes that changed the stored record.
    pub async fn accepted_writes(&self) -> Vec<WriteLogEntry> {
        self.writes
            .lock()
            .await
            .iter()
            .filter(|w| w.outcome == WriteOutcome::Accepted)
            .cloned()
            .collect()
    }

    pub fn subscribe_attempts(&self) -> u32 {
        self.subscribe_attempts.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    pub async fn live_subscriptions(&self) -> usize {
        let mut subs = self.subscribers.lock().await;
        subs.retain(Subscriber::is_live);
        subs.len()
    }

    // -- internals ----------------------------------------------------------

    async fn broadcast_control(&self, event: FeedEvent) {
        let mut subs = self.subscribers.lock().await;
        subs.retain(Subscriber::is_live);
        for sub in subs.iter() {
            if sub.tx.try_send(event.clone()).is_err() {
                warn!("memory feed subscriber is full, dropping control event");
            }
        }
    }

    async fn fan_out(&self, record: &PresenceRecord) {
        let mut subs = self.subscribers.lock().await;
        subs.retain(Subscriber::is_live);
        for sub in subs.iter().filter(|s| s.filter.matches(&record.user_id)) {
            if sub.tx.try_send(FeedEvent::Change(record.clone())).is_err() {
                warn!(user_id = %record.user_id, "memory feed subscriber is full, dropping change");
            }
        }
    }

    async fn log_write(&self, record: &PresenceRecord, outcome: WriteOutcome) {
        let mut writes = self.writes.lock().await;
        if writes.len() == WRITE_LOG_CAPACITY {
            writes.pop_front();
        }
        writes.push_back(WriteLogEntry {
            at: Instant::now(),
            record: record.clone(),
            outcome,
        });
    }
}

#[async_trait]
impl PresenceStore for MemoryStore {
    async fn read_status(&self, user_id: &str) -> Result<Option<PresenceRecord>, StoreError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn write_status(&self, record: &PresenceRecord) -> Result<(), StoreError> {
        if self.writes_failing.load(Ordering::SeqCst) {
            self.log_write(record, WriteOutcome::Failed).await;
            return Err(StoreError::Unavailable("memory store writes disabled".into()));
        }

        let accepted = {
            let mut records = self.records.write().await;
            match records.get(&record.user_id) {
                Some(existing) if existing.last_seen > record.last_seen => false,
                _ => {
                    records.insert(record.user_id.clone(), record.clone());
                    true
                }
            }
        };

        if accepted {
            self.log_write(record, WriteOutcome::Accepted).await;
            self.fan_out(record).await;
        } else {
            debug!(user_id = %record.user_id, "ignoring stale write");
            self.log_write(record, WriteOutcome::Stale).await;
        }
        Ok(())
    }

    async fn poll_snapshot(
        &self,
        filter: &PresenceFilter,
    ) -> Result<Vec<PresenceRecord>, StoreError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.polls_failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store polls disabled".into()));
        }
        // BTreeMap iteration is already ordered by user_id.
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| filter.matches(&r.user_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ChangeFeed for MemoryStore {
    async fn subscribe_changes(
        &self,
        filter: &PresenceFilter,
    ) -> Result<ChangeSubscription, TransportError> {
        self.subscribe_attempts.fetch_add(1, Ordering::SeqCst);
        if !self.feed_available.load(Ordering::SeqCst) {
            return Err(TransportError::Refused("memory feed unavailable".into()));
        }

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let cancel = CancellationToken::new();
        if !self.withhold_ack.load(Ordering::SeqCst) {
            let _ = tx.try_send(FeedEvent::Acknowledged);
        }
        self.subscribers.lock().await.push(Subscriber {
            filter: filter.clone(),
            tx,
            cancel: cancel.clone(),
        });
        Ok(ChangeSubscription::new(rx, cancel))
    }
}
