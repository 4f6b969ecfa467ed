//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     broadcast → accept loops stop → sweeper stops → open connections drain
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
