//! Validation for the `[transport]` section.

use crate::schema::PulseConfig;

use super::helpers::validate_range;

pub(crate) fn validate_transport(errors: &mut Vec<String>, config: &PulseConfig) {
    let t = &config.transport;
    validate_range(errors, "transport.connect_timeout", t.connect_timeout, 1, 60);
    validate_range(errors, "transport.retry_initial", t.retry_initial, 1, 3600);
    validate_range(errors, "transport.retry_max", t.retry_max, 1, 3600);
    validate_range(errors, "transport.poll_interval", t.poll_interval, 5, 600);
    validate_range(
        errors,
        "transport.poll_failure_threshold",
        t.poll_failure_threshold,
        1,
        20,
    );
    validate_range(errors, "transport.request_timeout", t.request_timeout, 1, 120);

    if t.retry_max < t.retry_initial {
        errors.push(format!(
            "transport.retry_max = {} must not be below transport.retry_initial = {}",
            t.retry_max, t.retry_initial
        ));
    }
}
