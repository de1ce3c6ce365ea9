//! Configuration schema types for Pulse.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with the defaults the presence core is tuned for.

mod presence;
mod store;
mod system;
mod transport;

pub use presence::*;
pub use store::*;
pub use system::*;
pub use transport::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for Pulse.
///
/// Only override what you want to change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PulseConfig {
    pub presence: PresenceConfig,
    pub transport: TransportConfig,
    pub store: StoreConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================
