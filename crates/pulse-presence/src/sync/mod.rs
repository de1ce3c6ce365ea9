//! Presence synchronizer: one de-duplicated stream of remote status
//! changes fed by the push subscription and the fallback poll loop.

mod merge;
mod synchronizer;

#[cfg(test)]
mod tests;

pub use merge::{MergeVerdict, StatusMerge};
pub use synchronizer::{PresenceSynchronizer, SyncConfig, SyncHandle};
