pub mod activity;
pub mod error;
pub mod heartbeat;
mod helpers;
pub mod memory;
pub mod publisher;
pub mod registry;
pub mod session;
pub mod status;
pub mod store;
pub mod supabase;
pub mod sync;
pub mod transport;

pub use activity::{ActivityMonitor, ActivityTransition, InteractionKind};
pub use error::{StoreError, TransportError};
pub use heartbeat::{HeartbeatAction, HeartbeatScheduler};
pub use memory::{MemoryStore, WriteLogEntry, WriteOutcome};
pub use publisher::{PublishOutcome, StatusPublisher};
pub use registry::{ObserverRegistry, Subscription};
pub use session::{LocalActivityState, PresenceSession, SessionConfig};
pub use status::{PresenceFilter, PresenceRecord, Status, StatusChangeEvent};
pub use store::{ChangeFeed, ChangeSubscription, FeedEvent, PresenceStore};
pub use supabase::{SupabaseChangeFeed, SupabaseConfig, SupabaseStore};
pub use sync::{PresenceSynchronizer, SyncConfig, SyncHandle};
pub use transport::{
    HealthAction, HealthState, RetryPolicy, TransportHealthMonitor, TransportMode, TransportState,
};
