//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → capture tap (raw bytes → Begin/Data)
//!     → server.rs (hyper connection, Axum router)
//!     → capture.rs (claim pending capture → End → 204)
//!     → viewer.rs (WebSocket viewers joining namespaces)
//!     → handlers.rs (namespace minting, health)
//! ```

pub mod capture;
pub mod handlers;
pub mod server;
pub mod viewer;
pub mod wire;

pub use server::{AppState, Bindings, CaptureServer, ServerError};
