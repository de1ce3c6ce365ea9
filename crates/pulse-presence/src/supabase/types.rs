//! Connection settings and Phoenix protocol types for the Supabase backend.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::status::PresenceFilter;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where the presence table lives and how to reach it.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Supabase project reference (the `<ref>` in `<ref>.supabase.co`).
    pub project_ref: String,
    /// Supabase anon key (publishable).
    pub api_key: String,
    /// Optional user JWT; the anon key is used for auth when absent.
    pub access_token: Option<String>,
    pub table: String,
    pub schema: String,
    /// Phoenix heartbeat period. A heartbeat still unanswered at the next
    /// tick is reported as a transport timeout.
    pub heartbeat_interval: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("project_ref", &self.project_ref)
            .field("api_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("table", &self.table)
            .field("schema", &self.schema)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            project_ref: String::new(),
            api_key: String::new(),
            access_token: None,
            table: "presence".to_string(),
            schema: "public".to_string(),
            heartbeat_interval: Duration::from_secs(25),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl SupabaseConfig {
    /// WebSocket URL for Supabase Realtime.
    pub(crate) fn ws_url(&self) -> String {
        format!(
            "wss://{}.supabase.co/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            self.project_ref, self.api_key
        )
    }

    /// PostgREST endpoint of the presence table.
    pub(crate) fn rest_url(&self) -> String {
        format!(
            "https://{}.supabase.co/rest/v1/{}",
            self.project_ref, self.table
        )
    }

    /// Phoenix topic the change subscription joins.
    pub(crate) fn topic(&self) -> String {
        format!("realtime:{}", self.table)
    }

    /// Bearer token for both REST and Realtime.
    pub(crate) fn bearer(&self) -> &str {
        self.access_token.as_deref().unwrap_or(&self.api_key)
    }

    /// `phx_join` payload subscribing to row changes of the presence table.
    pub(crate) fn join_payload(&self, filter: &PresenceFilter) -> serde_json::Value {
        let mut change = serde_json::json!({
            "event": "*",
            "schema": self.schema,
            "table": self.table,
        });
        if let PresenceFilter::Users(ids) = filter {
            let list = in_list(ids.iter().map(String::as_str));
            change["filter"] = serde_json::json!(format!("user_id={list}"));
        }
        serde_json::json!({
            "config": {
                "broadcast": { "self": false, "ack": false },
                "presence": { "key": "" },
                "postgres_changes": [change],
            },
            "access_token": self.bearer(),
        })
    }
}

// ---------------------------------------------------------------------------
// Phoenix Protocol Types
// ---------------------------------------------------------------------------

/// A Phoenix protocol message envelope (v1 JSON format).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoenixMessage {
    pub topic: String,
    pub event: String,
    pub payload: serde_json::Value,
    #[serde(rename = "ref")]
    pub msg_ref: Option<String>,
}

impl PhoenixMessage {
    pub(crate) fn new(topic: &str, event: &str, payload: serde_json::Value, msg_ref: String) -> Self {
        Self {
            topic: topic.to_string(),
            event: event.to_string(),
            payload,
            msg_ref: Some(msg_ref),
        }
    }
}

/// PostgREST `in.(..)` operand with every value double-quoted, so ids
/// containing commas or parentheses stay intact.
pub(crate) fn in_list<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = ids
        .map(|id| format!("\"{}\"", id.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}
