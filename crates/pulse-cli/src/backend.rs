//! Builds the store/feed pair and session settings from configuration.

use std::sync::Arc;
use std::time::Duration;

use pulse_common::PulseError;
use pulse_config::schema::StoreBackend;
use pulse_config::PulseConfig;
use pulse_presence::{
    ChangeFeed, MemoryStore, PresenceFilter, PresenceStore, RetryPolicy, SessionConfig,
    SupabaseChangeFeed, SupabaseConfig, SupabaseStore, SyncConfig,
};

pub struct Backends {
    pub store: Arc<dyn PresenceStore>,
    pub feed: Arc<dyn ChangeFeed>,
    pub kind: &'static str,
}

fn secs(value: u32) -> Duration {
    Duration::from_secs(u64::from(value))
}

pub fn build(config: &PulseConfig, force_memory: bool) -> pulse_common::Result<Backends> {
    if force_memory || config.store.backend == StoreBackend::Memory {
        let memory = Arc::new(MemoryStore::new());
        return Ok(Backends {
            store: memory.clone(),
            feed: memory,
            kind: "memory",
        });
    }

    let supabase = supabase_config(config);
    if supabase.api_key.is_empty() {
        return Err(PulseError::Other(
            "Supabase store selected but no API key. Set store.api_key or SUPABASE_ANON_KEY."
                .into(),
        ));
    }
    let store = SupabaseStore::new(supabase.clone())?;
    Ok(Backends {
        store: Arc::new(store),
        feed: Arc::new(SupabaseChangeFeed::new(supabase)),
        kind: "supabase",
    })
}

fn supabase_config(config: &PulseConfig) -> SupabaseConfig {
    let api_key = if config.store.api_key.is_empty() {
        std::env::var("SUPABASE_ANON_KEY").unwrap_or_default()
    } else {
        config.store.api_key.clone()
    };
    SupabaseConfig {
        project_ref: config.store.project_ref.clone(),
        api_key,
        access_token: std::env::var("SUPABASE_ACCESS_TOKEN").ok(),
        table: config.store.table.clone(),
        schema: config.store.schema.clone(),
        heartbeat_interval: secs(config.store.realtime_heartbeat),
        connect_timeout: secs(config.transport.connect_timeout),
        request_timeout: secs(config.transport.request_timeout),
    }
}

pub fn session_config(config: &PulseConfig, watch: &[String]) -> SessionConfig {
    let t = &config.transport;
    SessionConfig {
        inactivity_window: secs(config.presence.inactivity_window),
        publish_min_interval: secs(config.presence.publish_min_interval),
        heartbeat_interval: secs(config.presence.heartbeat_interval),
        sync: SyncConfig {
            connect_timeout: secs(t.connect_timeout),
            retry: RetryPolicy {
                initial: secs(t.retry_initial),
                max: secs(t.retry_max),
                max_attempts: (t.retry_max_attempts > 0).then_some(t.retry_max_attempts),
            },
            poll_interval: secs(t.poll_interval),
            poll_failure_threshold: t.poll_failure_threshold,
            request_timeout: secs(t.request_timeout),
        },
        watch: PresenceFilter::users(watch.iter().cloned()),
    }
}
