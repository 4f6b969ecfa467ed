//! Namespace publish/subscribe fan-out.
//!
//! # Data Flow
//! ```text
//! capture engine ──publish(namespace, event)──▶ Hub ──try_send──▶ viewer queue ──▶ viewer socket
//!                                               │
//!                         viewer socket ──join/leave──┘
//! ```
//!
//! # Design Decisions
//! - One mutex guards the whole registry, so events for a namespace are
//!   delivered in publish order
//! - Each viewer owns a bounded queue; publishing never waits on a viewer
//! - A viewer whose queue is full or closed is evicted from every namespace
//! - No replay: a viewer only sees events published after it joined

mod registry;
mod subscriber;

pub use registry::{Hub, SubscriberId};
pub use subscriber::Subscriber;
