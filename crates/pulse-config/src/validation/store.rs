//! Validation for the `[store]` section.

use crate::schema::{PulseConfig, StoreBackend};

use super::helpers::validate_range;

pub(crate) fn validate_store(errors: &mut Vec<String>, config: &PulseConfig) {
    let s = &config.store;
    validate_range(errors, "store.realtime_heartbeat", s.realtime_heartbeat, 5, 60);

    if s.table.trim().is_empty() {
        errors.push("store.table must not be empty".into());
    }
    if s.schema.trim().is_empty() {
        errors.push("store.schema must not be empty".into());
    }
    if s.backend == StoreBackend::Supabase && s.project_ref.trim().is_empty() {
        errors.push("store.project_ref is required for the supabase backend".into());
    }
}
