//! External collaborators: the shared status store and its change feed.
//!
//! The presence core only ever reaches the outside world through these two
//! traits, so backends can be swapped (in-memory, Supabase) and tests can
//! inject failures.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{StoreError, TransportError};
use crate::status::{PresenceFilter, PresenceRecord};

/// Request/response access to the shared status store.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Read one user's record, `None` if the user was never written.
    async fn read_status(&self, user_id: &str) -> Result<Option<PresenceRecord>, StoreError>;

    /// Upsert a record. The store may silently ignore a record whose
    /// `last_seen` is older than the stored one.
    async fn write_status(&self, record: &PresenceRecord) -> Result<(), StoreError>;

    /// All records matching `filter`, ordered by `user_id`.
    async fn poll_snapshot(&self, filter: &PresenceFilter)
        -> Result<Vec<PresenceRecord>, StoreError>;
}

/// Push delivery of store changes.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open a subscription. Returning `Ok` only means the attempt started;
    /// the subscription is live once it yields [`FeedEvent::Acknowledged`].
    async fn subscribe_changes(
        &self,
        filter: &PresenceFilter,
    ) -> Result<ChangeSubscription, TransportError>;
}

/// What a live subscription can yield. The end of the channel means the
/// transport closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// The server accepted the subscription.
    Acknowledged,
    /// A single changed record.
    Change(PresenceRecord),
    /// The transport reported an error.
    Error(String),
    /// The transport reported a liveness timeout.
    Timeout,
}

/// A running push subscription. Dropping it tears the transport down.
#[derive(Debug)]
pub struct ChangeSubscription {
    events: mpsc::Receiver<FeedEvent>,
    cancel: CancellationToken,
}

impl ChangeSubscription {
    pub fn new(events: mpsc::Receiver<FeedEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Next event, or `None` once the transport has closed.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }

    /// Tear the subscription down. Safe to call more than once.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
