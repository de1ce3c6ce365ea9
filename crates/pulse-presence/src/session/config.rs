use std::time::Duration;

use crate::status::PresenceFilter;
use crate::sync::SyncConfig;

/// Everything a [`PresenceSession`](super::PresenceSession) needs besides
/// its collaborators.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Quiet period after which an active session turns idle.
    pub inactivity_window: Duration,
    /// Minimum gap between two writes of the same status.
    pub publish_min_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Transport and poll timing. `request_timeout` also bounds status writes.
    pub sync: SyncConfig,
    /// Users to observe. The session's own user is always added.
    pub watch: PresenceFilter,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity_window: Duration::from_secs(300),
            publish_min_interval: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(60),
            sync: SyncConfig::default(),
            watch: PresenceFilter::All,
        }
    }
}

impl SessionConfig {
    /// The filter actually observed: `watch` plus the session's own user.
    pub fn observe_filter(&self, own_user: &str) -> PresenceFilter {
        let mut filter = self.watch.clone();
        filter.include(own_user);
        filter
    }
}
