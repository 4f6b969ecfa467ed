//! Capture Relay Library
//!
//! Accepts arbitrary traffic on capture endpoints (`/s/<namespace>`) and
//! streams every received byte, unchanged, to viewers watching that
//! namespace, together with the parsed request head once hyper has it.

// Core subsystems
pub mod capture;
pub mod config;
pub mod http;
pub mod hub;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::RelayConfig;
pub use http::CaptureServer;
pub use lifecycle::Shutdown;
