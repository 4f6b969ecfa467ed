//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every field has a default so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the capture relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Plain listener.
    pub listener: ListenerConfig,

    /// Optional encrypted listener sharing the same request handling.
    pub tls: Option<TlsConfig>,

    /// Capture endpoint and correlation settings.
    pub capture: CaptureConfig,

    /// Viewer fan-out settings.
    pub hub: HubConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Encrypted listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Bind address for the TLS listener (e.g., "0.0.0.0:8443").
    pub bind_address: String,

    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Capture endpoint and correlation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Path prefix marking a capture endpoint; the namespace follows it.
    pub path_prefix: String,

    /// Age after which an unclaimed pending capture is swept.
    pub entry_ttl_secs: u64,

    /// How often the sweeper runs.
    pub sweep_interval_secs: u64,

    /// Retries after the first lookup when acknowledging a capture.
    pub retry_attempts: u32,

    /// Fixed delay between acknowledgement lookups in milliseconds.
    pub retry_delay_ms: u64,

    /// Length of namespaces minted by `/new`.
    pub namespace_length: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            path_prefix: "/s/".to_string(),
            entry_ttl_secs: 30,
            sweep_interval_secs: 5,
            retry_attempts: 3,
            retry_delay_ms: 50,
            namespace_length: 22,
        }
    }
}

/// Viewer fan-out settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// Events queued per viewer before it is considered unreachable.
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// How long shutdown waits for open connections in seconds.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            shutdown_grace_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
