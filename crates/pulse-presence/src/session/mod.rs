//! Presence session: one owned instance of the presence core for one
//! device or window.
//!
//! A session publishes its own user's status from local activity and,
//! separately, observes the status of the users it watches. Two background
//! tasks do the work: the local activity loop and the synchronizer. A
//! forwarder feeds the synchronizer's output into the observer registry.

mod config;
mod local;


pub use config::SessionConfig;
pub use local::LocalActivityState;

use std::sync::Arc;

use pulse_common::SessionId;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::activity::{ActivityMonitor, InteractionKind};
use crate::heartbeat::HeartbeatScheduler;
use crate::publisher::StatusPublisher;
use crate::registry::{ObserverRegistry, Subscription};
use crate::status::{PresenceRecord, Status};
use crate::store::{ChangeFeed, PresenceStore};
use crate::sync::{PresenceSynchronizer, SyncHandle};
use crate::transport::TransportState;

use local::{LocalCommand, LocalLoop};

const COMMAND_BUFFER: usize = 64;

/// Handle to a running presence session.
pub struct PresenceSession {
    id: SessionId,
    user_id: String,
    command_tx: mpsc::Sender<LocalCommand>,
    activity: Arc<Notify>,
    visibility_tx: watch::Sender<bool>,
    local_task: JoinHandle<StatusPublisher>,
    sync: SyncHandle,
    forwarder: JoinHandle<()>,
    registry: ObserverRegistry,
    own_watch: Subscription,
}

impl PresenceSession {
    /// Start a session for `user_id`. Must be called inside a tokio runtime.
    pub fn start(
        user_id: impl Into<String>,
        store: Arc<dyn PresenceStore>,
        feed: Arc<dyn ChangeFeed>,
        config: SessionConfig,
    ) -> Self {
        let user_id = user_id.into();
        let id = SessionId::new();
        info!(session_id = %id, user_id = %user_id, "starting presence session");

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let activity = Arc::new(Notify::new());
        let (visibility_tx, visibility_rx) = watch::channel(true);
        let local = LocalLoop {
            monitor: ActivityMonitor::new(config.inactivity_window),
            publisher: StatusPublisher::new(
                user_id.clone(),
                Arc::clone(&store),
                config.publish_min_interval,
                config.sync.request_timeout,
            ),
            heartbeat: HeartbeatScheduler::new(config.heartbeat_interval),
            commands: command_rx,
            activity: Arc::clone(&activity),
            visibility: visibility_rx,
        };
        let local_task = tokio::spawn(local.run());

        let filter = config.observe_filter(&user_id);
        let (sync, mut changes) =
            PresenceSynchronizer::new(store, feed, config.sync.clone()).observe(filter);

        let registry = ObserverRegistry::new();
        let own_tx = command_tx.clone();
        let own_watch = registry.subscribe(&user_id, move |record| {
            if own_tx
                .try_send(LocalCommand::RemoteOwn(record.status))
                .is_err()
            {
                trace!("local loop busy or stopped, own status not reconciled");
            }
        });

        let sink = registry.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(record) = changes.recv().await {
                sink.dispatch(&record);
            }
            debug!("change forwarder stopped");
        });

        Self {
            id,
            user_id,
            command_tx,
            activity,
            visibility_tx,
            local_task,
            sync,
            forwarder,
            registry,
            own_watch,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // -- input ports ----------------------------------------------------------

    /// A recognized local interaction happened. Bursts coalesce into one
    /// wake-up of the local loop.
    pub fn notify_activity(&self) {
        self.activity.notify_one();
    }

    pub fn notify_interaction(&self, kind: InteractionKind) {
        trace!(?kind, "local interaction");
        self.notify_activity();
    }

    /// The session became visible or hidden.
    pub fn notify_visibility_change(&self, visible: bool) {
        self.visibility_tx.send_replace(visible);
    }

    // -- queries --------------------------------------------------------------

    /// Cached status of `user_id`; `Offline` if never observed.
    pub fn current_status(&self, user_id: &str) -> Status {
        self.registry.current_status(user_id)
    }

    /// Call `callback` for every status change of `user_id`.
    pub fn subscribe<F>(&self, user_id: &str, callback: F) -> Subscription
    where
        F: Fn(&PresenceRecord) + Send + Sync + 'static,
    {
        self.registry.subscribe(user_id, callback)
    }

    /// Local activity bookkeeping, or `None` once the local loop has ended.
    pub async fn local_state(&self) -> Option<LocalActivityState> {
        let (tx, rx) = oneshot::channel();
        self.command_tx.send(LocalCommand::State(tx)).await.ok()?;
        rx.await.ok()
    }

    pub fn transport_state(&self) -> TransportState {
        self.sync.transport_state()
    }

    pub fn watch_transport(&self) -> watch::Receiver<TransportState> {
        self.sync.watch_transport()
    }

    // -- teardown -------------------------------------------------------------

    /// Stop the session: heartbeat and inactivity timer, then the active
    /// transport, then the final `offline` write, then the registry. A
    /// failed final write is logged and teardown continues.
    pub async fn shutdown(self) {
        let Self {
            id,
            user_id,
            command_tx,
            activity: _activity,
            visibility_tx: _visibility_tx,
            local_task,
            sync,
            forwarder,
            registry,
            mut own_watch,
        } = self;
        info!(session_id = %id, user_id = %user_id, "stopping presence session");

        own_watch.unsubscribe();
        if command_tx.send(LocalCommand::Stop).await.is_err() {
            debug!("local loop already stopped");
        }
        drop(command_tx);
        let publisher = match local_task.await {
            Ok(publisher) => Some(publisher),
            Err(e) => {
                warn!(error = %e, "local activity loop ended abnormally");
                None
            }
        };

        sync.shutdown().await;

        if let Some(mut publisher) = publisher {
            if let Err(e) = publisher.publish_final_offline().await {
                warn!(session_id = %id, user_id = %user_id, error = %e, "teardown write failed");
            }
        }

        registry.clear();
        if let Err(e) = forwarder.await {
            warn!(error = %e, "change forwarder ended abnormally");
        }
        info!(session_id = %id, "presence session stopped");
    }
}
