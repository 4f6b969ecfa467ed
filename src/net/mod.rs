//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (handshake, encrypted listener only)
//!     → connection.rs (metadata, lifecycle tracking)
//!     → capture tap, then the HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown
//! - Plain and encrypted listeners share everything above the handshake

pub mod connection;
pub mod listener;
pub mod tls;
