//! Shared status store configuration types.

use serde::{Deserialize, Serialize};

/// Which backend holds the shared presence table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum StoreBackend {
    /// In-process store, useful for local runs and demos.
    #[default]
    Memory,
    /// Supabase PostgREST + Realtime.
    Supabase,
}

/// Store connection configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Supabase project reference (e.g., "ojmqzagktzkualzgpcbq").
    pub project_ref: String,
    /// Supabase anon key. Falls back to `SUPABASE_ANON_KEY` when empty.
    pub api_key: String,
    /// Table holding one row per user.
    pub table: String,
    /// Postgres schema of the table.
    pub schema: String,
    /// Phoenix heartbeat interval on the realtime socket, in seconds (valid range: 5-60).
    pub realtime_heartbeat: u32,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field("table", &self.table)
            .field("schema", &self.schema)
            .field("realtime_heartbeat", &self.realtime_heartbeat)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            project_ref: String::new(),
            api_key: String::new(),
            table: "presence".into(),
            schema: "public".into(),
            realtime_heartbeat: 25,
        }
    }
}
