//! Small JSON endpoints: namespace minting and health.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::capture::namespace;
use crate::http::server::AppState;

#[derive(Debug, Serialize)]
pub struct NewNamespace {
    pub namespace: String,
    pub capture_path: String,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub active_connections: u64,
    pub pending_captures: usize,
    pub namespaces: usize,
}

/// Mint a fresh namespace for the caller to send traffic to.
pub async fn new_namespace(State(state): State<AppState>) -> Json<NewNamespace> {
    let namespace = namespace::generate(state.namespace_length);
    let capture_path = format!("{}{}", state.engine.prefix(), namespace);
    tracing::debug!(namespace = %namespace, "Namespace minted");
    Json(NewNamespace {
        namespace,
        capture_path,
    })
}

pub async fn health(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        active_connections: state.tracker.active_count(),
        pending_captures: state.engine.table().len(),
        namespaces: state.engine.hub().namespace_count(),
    })
}
