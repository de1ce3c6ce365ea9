//! Local activity and publishing configuration types.

use serde::{Deserialize, Serialize};

/// Activity detection, write throttling and heartbeat timing.
///
/// All durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Inactivity before a session is reported as away (valid range: 30-3600).
    pub inactivity_window: u32,
    /// Minimum spacing between two writes of the same status (valid range: 1-600).
    pub publish_min_interval: u32,
    /// Period at which an active session re-asserts online (valid range: 5-600).
    pub heartbeat_interval: u32,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            inactivity_window: 300,
            publish_min_interval: 30,
            heartbeat_interval: 60,
        }
    }
}
