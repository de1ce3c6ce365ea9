//! Throttled writes of the local user's status to the shared store.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::activity::ActivityTransition;
use crate::error::StoreError;
use crate::status::{PresenceRecord, Status};
use crate::store::PresenceStore;

/// Result of one publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Sent,
    /// Same value as the last write, inside the throttle interval.
    Suppressed,
    /// The store did not take the write. Not retried; the next edge or
    /// heartbeat supersedes it.
    Failed(StoreError),
}

/// Maps an activity edge to the status it should publish.
pub fn target_status(transition: ActivityTransition) -> Status {
    match transition {
        ActivityTransition::Active => Status::Online,
        ActivityTransition::Idle => Status::Away,
        ActivityTransition::InactiveStrong => Status::Offline,
    }
}

/// Owns the write-rate policy for one session's user.
///
/// A write goes out when the value differs from the last one published or
/// when at least `min_interval` has passed since it was. Bookkeeping only
/// advances on success, so a failed write never suppresses its successor.
pub struct StatusPublisher {
    user_id: String,
    store: Arc<dyn PresenceStore>,
    min_interval: Duration,
    write_timeout: Duration,
    last_published_status: Option<Status>,
    last_published_at: Option<Instant>,
    last_seen: Option<DateTime<Utc>>,
}

impl StatusPublisher {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn PresenceStore>,
        min_interval: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            min_interval,
            write_timeout,
            last_published_status: None,
            last_published_at: None,
            last_seen: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn last_published_status(&self) -> Option<Status> {
        self.last_published_status
    }

    pub fn last_published_at(&self) -> Option<Instant> {
        self.last_published_at
    }

    /// Whether a write of `status` at `now` would pass the throttle.
    pub fn should_publish(&self, status: Status, now: Instant) -> bool {
        match (self.last_published_status, self.last_published_at) {
            (Some(last), Some(at)) if last == status => {
                now.saturating_duration_since(at) >= self.min_interval
            }
            _ => true,
        }
    }

    /// Consume an activity edge.
    pub async fn on_local_transition(
        &mut self,
        transition: ActivityTransition,
        now: Instant,
    ) -> PublishOutcome {
        self.publish(target_status(transition), now).await
    }

    /// Write `status` unless the throttle suppresses it.
    pub async fn publish(&mut self, status: Status, now: Instant) -> PublishOutcome {
        if !self.should_publish(status, now) {
            debug!(user_id = %self.user_id, %status, "publish suppressed by throttle");
            return PublishOutcome::Suppressed;
        }
        self.send(status, now).await
    }

    /// Write `status` regardless of the same-value throttle. For when
    /// another writer has replaced the stored value.
    pub async fn reassert(&mut self, status: Status, now: Instant) -> PublishOutcome {
        self.send(status, now).await
    }

    async fn send(&mut self, status: Status, now: Instant) -> PublishOutcome {
        let record = PresenceRecord::new(self.user_id.clone(), status, self.next_last_seen());
        match self.write(&record).await {
            Ok(()) => {
                debug!(user_id = %self.user_id, %status, "status published");
                self.last_published_status = Some(status);
                self.last_published_at = Some(now);
                self.last_seen = Some(record.last_seen);
                PublishOutcome::Sent
            }
            Err(e) => {
                warn!(user_id = %self.user_id, %status, error = %e, "status write failed");
                PublishOutcome::Failed(e)
            }
        }
    }

    /// Last write of the session: `offline`, regardless of throttling.
    /// The caller logs failures; nothing retries.
    pub async fn publish_final_offline(&mut self) -> Result<(), StoreError> {
        let record =
            PresenceRecord::new(self.user_id.clone(), Status::Offline, self.next_last_seen());
        self.write(&record).await?;
        info!(user_id = %self.user_id, "final offline status written");
        self.last_published_status = Some(Status::Offline);
        self.last_published_at = Some(Instant::now());
        self.last_seen = Some(record.last_seen);
        Ok(())
    }

    async fn write(&self, record: &PresenceRecord) -> Result<(), StoreError> {
        match tokio::time::timeout(self.write_timeout, self.store.write_status(record)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(StoreError::Timeout),
        }
    }

    /// Wall-clock stamp for the next write, never behind the previous one.
    fn next_last_seen(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.last_seen {
            Some(prev) if prev > now => prev,
            _ => now,
        }
    }
}
