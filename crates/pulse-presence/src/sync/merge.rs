//! Edge-only merging of status events from both sources.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::status::{PresenceRecord, Status};

/// Decision for one offered event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeVerdict {
    Deliver,
    /// Same status as the last delivered event for this user.
    Duplicate,
    /// Older `last_seen` than the last delivered event for this user.
    Stale,
}

/// Remembers the last delivered event per user so observers only ever see
/// edges, in `last_seen` order, whichever source the event came from.
#[derive(Debug, Default)]
pub struct StatusMerge {
    last: HashMap<String, (Status, DateTime<Utc>)>,
}

impl StatusMerge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, record: &PresenceRecord) -> MergeVerdict {
        if let Some((status, last_seen)) = self.last.get_mut(&record.user_id) {
            if record.last_seen < *last_seen {
                return MergeVerdict::Stale;
            }
            if *status == record.status {
                // Keep the freshest stamp so later stale events are caught.
                *last_seen = record.last_seen;
                return MergeVerdict::Duplicate;
            }
        }
        self.last
            .insert(record.user_id.clone(), (record.status, record.last_seen));
        MergeVerdict::Deliver
    }

    pub fn last_delivered(&self, user_id: &str) -> Option<(Status, DateTime<Utc>)> {
        self.last.get(user_id).copied()
    }
}
