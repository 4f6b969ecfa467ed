//! Configuration validation.
//!
//! Serde handles syntax; this module checks values. All problems are
//! reported at once rather than stopping at the first.

use std::net::SocketAddr;

use crate::config::schema::RelayConfig;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{field}: must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field}: must not be empty")]
    Empty { field: &'static str },
    #[error("capture.path_prefix: {0:?} must start and end with '/' and not be the root")]
    InvalidPrefix(String),
    #[error("tls.bind_address: {0} is already used by the plain listener")]
    SharedAddress(SocketAddr),
}

/// Check `config` and return every problem found.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let plain = check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    check_nonzero(&mut errors, "listener.max_connections", config.listener.max_connections as u64);

    if let Some(tls) = &config.tls {
        let secure = check_address(&mut errors, "tls.bind_address", &tls.bind_address);
        if let (Some(plain), Some(secure)) = (plain, secure) {
            if plain == secure && secure.port() != 0 {
                errors.push(ValidationError::SharedAddress(secure));
            }
        }
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::Empty { field: "tls.cert_path" });
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::Empty { field: "tls.key_path" });
        }
    }

    let prefix = &config.capture.path_prefix;
    if prefix.len() < 2 || !prefix.starts_with('/') || !prefix.ends_with('/') {
        errors.push(ValidationError::InvalidPrefix(prefix.clone()));
    }
    check_nonzero(&mut errors, "capture.entry_ttl_secs", config.capture.entry_ttl_secs);
    check_nonzero(&mut errors, "capture.sweep_interval_secs", config.capture.sweep_interval_secs);
    check_nonzero(&mut errors, "capture.retry_delay_ms", config.capture.retry_delay_ms);
    check_nonzero(&mut errors, "capture.namespace_length", config.capture.namespace_length as u64);
    check_nonzero(&mut errors, "hub.subscriber_buffer", config.hub.subscriber_buffer as u64);
    check_nonzero(&mut errors, "timeouts.request_secs", config.timeouts.request_secs);

    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(
    errors: &mut Vec<ValidationError>,
    field: &'static str,
    value: &str,
) -> Option<SocketAddr> {
    match value.parse() {
        Ok(addr) => Some(addr),
        Err(_) => {
            errors.push(ValidationError::InvalidAddress {
                field,
                value: value.to_string(),
            });
            None
        }
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}
