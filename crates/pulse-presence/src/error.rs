//! Error taxonomy for the presence core.
//!
//! Nothing here is fatal to the host: every error is logged where it is
//! observed and either superseded by the next scheduled operation or fed
//! into the transport health monitor.

/// Failure talking to the shared status store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store rejected request: {0}")]
    Rejected(String),
    #[error("store response could not be decoded: {0}")]
    Decode(String),
    #[error("store request timed out")]
    Timeout,
}

/// Failure of the push-subscription transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The feed declined to open a subscription at all. Failures after a
    /// subscription is open arrive as `FeedEvent::Error` instead.
    #[error("subscription refused: {0}")]
    Refused(String),
}

impl From<StoreError> for pulse_common::PulseError {
    fn from(err: StoreError) -> Self {
        Self::Presence(err.to_string())
    }
}

impl From<TransportError> for pulse_common::PulseError {
    fn from(err: TransportError) -> Self {
        Self::Network(err.to_string())
    }
}
