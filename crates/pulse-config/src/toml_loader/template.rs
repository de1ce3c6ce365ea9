//! Default TOML config template with inline documentation comments.

/// Generate the default TOML config content with comments.
pub(crate) fn default_config_toml() -> &'static str {
    r##"# Pulse Configuration
# Schema version 1
# Only override what you want to change -- missing fields use defaults.
# All durations are in seconds.

[presence]
# inactivity_window = 300      # 30-3600, no interaction for this long -> away
# publish_min_interval = 30    # 1-600, same-status writes are spaced at least this far
# heartbeat_interval = 60      # 5-600, active sessions re-assert online this often

[transport]
# connect_timeout = 5          # 1-60, wait for the push subscription acknowledgement
# retry_initial = 30           # 1-3600, first push retry delay after a failure
# retry_max = 300              # 1-3600, retry delay cap (doubles up to this)
# retry_max_attempts = 0       # 0 = keep retrying push forever
# poll_interval = 30           # 5-600, snapshot polling period while degraded
# poll_failure_threshold = 3   # 1-20, failed polls in a row that count as a transport failure
# request_timeout = 10         # 1-120, bound for one store request

[store]
backend = "memory"             # memory, supabase
# project_ref = ""
# api_key = ""                 # falls back to SUPABASE_ANON_KEY
# table = "presence"
# schema = "public"
# realtime_heartbeat = 25      # 5-60

[logging]
# level = "INFO"               # DEBUG, INFO, WARNING, ERROR
"##
}
