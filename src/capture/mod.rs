//! Connection capture and correlation engine.
//!
//! # Data Flow
//! ```text
//! accepted connection
//!     → tap.rs: first chunk names a capture endpoint?
//!         yes → engine.rs mints CaptureId, files it in correlation.rs,
//!               publishes Begin, then every chunk as Data
//!         no  → tap disengages, traffic flows untouched
//!     → hyper parses the same bytes
//!     → http::capture claims the entry (retrying briefly), publishes End
//!     → correlation.rs Sweeper evicts entries nobody claimed
//! ```
//!
//! # Design Decisions
//! - The raw view and the parsed view of a connection are produced
//!   independently and meet only through the Correlation Table
//! - Entries are keyed by the peer's source port
//! - A capture is sealed once End is published; later bytes are not relayed

pub mod correlation;
pub mod engine;
pub mod event;
pub mod namespace;
pub mod tap;

pub use correlation::{ConnectionKey, CorrelationEntry, CorrelationTable, Sweeper};
pub use engine::{CaptureEngine, CaptureHandle};
pub use event::{BeginEvent, CaptureEvent, CaptureId, EndEvent};
pub use tap::TapStream;
