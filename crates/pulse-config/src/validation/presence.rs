//! Validation for the `[presence]` section.

use crate::schema::PulseConfig;

use super::helpers::validate_range;

pub(crate) fn validate_presence(errors: &mut Vec<String>, config: &PulseConfig) {
    let p = &config.presence;
    validate_range(errors, "presence.inactivity_window", p.inactivity_window, 30, 3600);
    validate_range(
        errors,
        "presence.publish_min_interval",
        p.publish_min_interval,
        1,
        600,
    );
    validate_range(errors, "presence.heartbeat_interval", p.heartbeat_interval, 5, 600);
}
