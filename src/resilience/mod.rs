//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Capture acknowledgement:
//!     → retries.rs (look up the pending capture, retry at fixed spacing)
//!     → found: publish End and acknowledge
//!     → exhausted: answer with a server error
//! ```

pub mod retries;

pub use retries::RetryPolicy;
