//! Full configuration validation.
//!
//! Validates all numeric ranges and cross-field constraints. Each section
//! has its own submodule; this orchestrator calls them all and collects
//! errors into a single `ConfigError`.

mod helpers;
mod presence;
mod store;
mod transport;


use crate::schema::PulseConfig;
use pulse_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &PulseConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    presence::validate_presence(&mut errors, config);
    transport::validate_transport(&mut errors, config);
    store::validate_store(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
