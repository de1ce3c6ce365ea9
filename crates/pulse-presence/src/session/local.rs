//! The session's local half: activity monitor, publisher and heartbeat
//! driven from one select loop.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::activity::{ActivityMonitor, ActivityTransition};
use crate::heartbeat::{HeartbeatAction, HeartbeatScheduler};
use crate::helpers::sleep_until_opt;
use crate::publisher::{PublishOutcome, StatusPublisher};
use crate::status::Status;

/// Snapshot of the session's own activity bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalActivityState {
    pub is_active: bool,
    pub is_hidden: bool,
    pub last_local_event_at: Option<Instant>,
    pub last_published_at: Option<Instant>,
    pub last_published_status: Option<Status>,
}

/// Commands sent from the session handle to the local loop. Activity and
/// visibility travel separately and are never dropped.
#[derive(Debug)]
pub(crate) enum LocalCommand {
    /// The store reported a status for our own user.
    RemoteOwn(Status),
    State(oneshot::Sender<LocalActivityState>),
    Stop,
}

pub(crate) struct LocalLoop {
    pub(crate) monitor: ActivityMonitor,
    pub(crate) publisher: StatusPublisher,
    pub(crate) heartbeat: HeartbeatScheduler,
    pub(crate) commands: mpsc::Receiver<LocalCommand>,
    /// Coalesced interaction signal; a burst wakes the loop once.
    pub(crate) activity: Arc<Notify>,
    /// Latest visibility reported by the host.
    pub(crate) visibility: watch::Receiver<bool>,
}

impl LocalLoop {
    /// Run until stopped. Both timers are cancelled before the publisher is
    /// handed back for the final write.
    pub(crate) async fn run(mut self) -> StatusPublisher {
        let now = Instant::now();
        if let Some(transition) = self.monitor.start(now) {
            self.on_transition(transition, now).await;
        }
        self.heartbeat.start(now);

        loop {
            let inactivity_at = self.monitor.deadline();
            let heartbeat_at = self.heartbeat.next_tick();

            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    Some(LocalCommand::RemoteOwn(status)) => {
                        self.reconcile_own(status).await;
                    }
                    Some(LocalCommand::State(reply)) => {
                        let _ = reply.send(self.state());
                    }
                    Some(LocalCommand::Stop) | None => break,
                },
                // Visibility before activity: a hide queued behind a burst of
                // interactions still wins.
                changed = self.visibility.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let visible = *self.visibility.borrow_and_update();
                    let now = Instant::now();
                    if let Some(t) = self.monitor.notify_visibility_change(visible, now) {
                        self.on_transition(t, now).await;
                    }
                }
                _ = self.activity.notified() => {
                    let now = Instant::now();
                    if let Some(t) = self.monitor.notify_activity(now) {
                        self.on_transition(t, now).await;
                    }
                }
                _ = sleep_until_opt(inactivity_at) => {
                    let now = Instant::now();
                    if let Some(t) = self.monitor.poll_deadline(now) {
                        self.on_transition(t, now).await;
                    }
                }
                _ = sleep_until_opt(heartbeat_at) => {
                    let now = Instant::now();
                    match self.heartbeat.tick(now, self.monitor.is_active()) {
                        HeartbeatAction::Reassert => {
                            self.publisher.publish(Status::Online, now).await;
                        }
                        HeartbeatAction::Skip => trace!("heartbeat skipped, session not active"),
                    }
                }
            }
        }

        self.heartbeat.stop();
        self.monitor.stop();
        debug!("local activity loop stopped");
        self.publisher
    }

    async fn on_transition(&mut self, transition: ActivityTransition, now: Instant) {
        debug!(?transition, "local activity edge");
        self.publisher.on_local_transition(transition, now).await;
    }

    /// Another writer put a non-online status on our user while this
    /// session is active. Re-assert online once per foreign write. An idle
    /// or hidden session never writes over another session, so concurrent
    /// sessions for one user settle on online while any of them is active.
    async fn reconcile_own(&mut self, remote: Status) {
        if self.monitor.current_intent() != Some(ActivityTransition::Active) {
            return;
        }
        if remote == Status::Online {
            return;
        }
        let outcome = self.publisher.reassert(Status::Online, Instant::now()).await;
        if outcome == PublishOutcome::Sent {
            debug!(%remote, "re-asserted own status");
        }
    }

    fn state(&self) -> LocalActivityState {
        LocalActivityState {
            is_active: self.monitor.is_active(),
            is_hidden: self.monitor.is_hidden(),
            last_local_event_at: self.monitor.last_local_event_at(),
            last_published_at: self.publisher.last_published_at(),
            last_published_status: self.publisher.last_published_status(),
        }
    }
}
