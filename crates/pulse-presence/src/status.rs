//! Status values, stored records, and observation filters.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// A user's presence status.
///
/// There is no meaningful ordering between variants; transitions are
/// decided by policy, never by comparison.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Away,
    #[default]
    Offline,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown status: {0}")]
pub struct ParseStatusError(String);

impl FromStr for Status {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "offline" => Ok(Self::Offline),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One row of the shared status store, and the shape of every change
/// event delivered to observers.
///
/// `last_seen` only ever moves forward for a given user; the store ignores
/// writes that would move it backwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub status: Status,
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    pub fn new(user_id: impl Into<String>, status: Status, last_seen: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            status,
            last_seen,
        }
    }
}

/// A change pushed by the store's subscription transport.
pub type StatusChangeEvent = PresenceRecord;

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Which users a subscription or snapshot covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PresenceFilter {
    #[default]
    All,
    Users(BTreeSet<String>),
}

impl PresenceFilter {
    pub fn users<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Users(ids.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, user_id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Users(ids) => ids.contains(user_id),
        }
    }

    /// Add a user to an explicit filter. `All` already covers everyone.
    pub fn include(&mut self, user_id: &str) {
        if let Self::Users(ids) = self {
            ids.insert(user_id.to_string());
        }
    }
}
