//! Push/poll transport supervision configuration types.

use serde::{Deserialize, Serialize};

/// Transport health and polling fallback configuration.
///
/// All durations are in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long a push subscription may take to be acknowledged (valid range: 1-60).
    pub connect_timeout: u32,
    /// First delay before retrying push after a failure (valid range: 1-3600).
    pub retry_initial: u32,
    /// Cap for the doubling retry delay (valid range: 1-3600, >= retry_initial).
    pub retry_max: u32,
    /// Give up on push after this many failed attempts. 0 retries forever.
    pub retry_max_attempts: u32,
    /// Snapshot poll period while degraded (valid range: 5-600).
    pub poll_interval: u32,
    /// Consecutive failed polls treated as a transport failure (valid range: 1-20).
    pub poll_failure_threshold: u32,
    /// Upper bound for a single store request (valid range: 1-120).
    pub request_timeout: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: 5,
            retry_initial: 30,
            retry_max: 300,
            retry_max_attempts: 0,
            poll_interval: 30,
            poll_failure_threshold: 3,
            request_timeout: 10,
        }
    }
}
