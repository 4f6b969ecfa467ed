//! Capture identifiers and the events published to namespace topics.
//!
//! For one capture the publish order is always `Begin`, any number of `Data`,
//! then at most one `End`. Nothing is published for a capture after its `End`.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Bytes;
use serde::Serialize;
use uuid::Uuid;

/// Opaque token correlating the raw and structured views of one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CaptureId(Uuid);

impl CaptureId {
    /// Mint a new random capture ID (UUID v4).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The 16 raw bytes, used as the prefix of binary data frames.
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for CaptureId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CaptureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// First event of a capture, published when the first chunk reveals a
/// capture-endpoint target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginEvent {
    pub capture_id: CaptureId,
    pub namespace: String,
    pub sender_address: String,
    pub server_address: String,
    pub server_port: u16,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Terminal event of a capture, carrying the parsed request metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndEvent {
    pub capture_id: CaptureId,
    pub headers: BTreeMap<String, String>,
    pub http_version: String,
    pub method: String,
    pub path: String,
    pub scheme: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEvent {
    Begin(BeginEvent),
    Data { capture_id: CaptureId, bytes: Bytes },
    End(EndEvent),
}

impl CaptureEvent {
    pub fn capture_id(&self) -> CaptureId {
        match self {
            CaptureEvent::Begin(begin) => begin.capture_id,
            CaptureEvent::Data { capture_id, .. } => *capture_id,
            CaptureEvent::End(end) => end.capture_id,
        }
    }

    /// Short label used for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureEvent::Begin(_) => "begin",
            CaptureEvent::Data { .. } => "data",
            CaptureEvent::End(_) => "end",
        }
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
