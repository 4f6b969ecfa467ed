//! The capture engine: owns the Correlation Table and the hub and exposes the
//! operations the raw tap and the acknowledgement handler call.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;

use crate::capture::correlation::{ConnectionKey, CorrelationEntry, CorrelationTable, Sweeper};
use crate::capture::event::{unix_millis, BeginEvent, CaptureEvent, CaptureId, EndEvent};
use crate::capture::namespace;
use crate::config::CaptureConfig;
use crate::hub::Hub;
use crate::net::connection::ConnectionMeta;
use crate::observability::metrics;
use crate::resilience::RetryPolicy;

/// State shared between the raw tap of a connection and the Correlation
/// Table entry for its capture.
#[derive(Debug)]
pub struct CaptureHandle {
    id: CaptureId,
    namespace: String,
    /// Set once End has been published. Held while publishing so no Data
    /// event can slip in after End.
    sealed: Mutex<bool>,
}

impl CaptureHandle {
    pub fn new(id: CaptureId, namespace: impl Into<String>) -> Self {
        Self {
            id,
            namespace: namespace.into(),
            sealed: Mutex::new(false),
        }
    }

    pub fn id(&self) -> CaptureId {
        self.id
    }

    /// Namespace taken from the raw request line.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn is_sealed(&self) -> bool {
        *self.sealed.lock().expect("capture handle mutex poisoned")
    }
}

/// Owning service object for capture state. Built once at startup and shared
/// by handle with every connection.
pub struct CaptureEngine {
    prefix: String,
    table: Arc<CorrelationTable>,
    hub: Arc<Hub>,
    retry: RetryPolicy,
    entry_ttl: Duration,
    sweep_interval: Duration,
}

impl CaptureEngine {
    pub fn new(config: &CaptureConfig, hub: Arc<Hub>) -> Self {
        Self {
            prefix: config.path_prefix.clone(),
            table: Arc::new(CorrelationTable::new()),
            hub,
            retry: RetryPolicy::new(
                config.retry_attempts,
                Duration::from_millis(config.retry_delay_ms),
            ),
            entry_ttl: Duration::from_secs(config.entry_ttl_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    pub fn table(&self) -> &Arc<CorrelationTable> {
        &self.table
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Sweeper for this engine's table, ready to be spawned.
    pub fn sweeper(&self) -> Sweeper {
        Sweeper::new(Arc::clone(&self.table), self.entry_ttl, self.sweep_interval)
    }

    /// Namespace addressed by `target`, if it is a capture endpoint.
    pub fn namespace_of<'a>(&self, target: &'a str) -> Option<&'a str> {
        namespace::extract(target, &self.prefix)
    }

    /// Inspect the first chunk of a connection. If it targets the capture
    /// endpoint, mint a capture, file it in the table and publish Begin.
    ///
    /// The chunk itself is not relayed here; see [`CaptureEngine::relay`].
    pub fn begin(&self, meta: &ConnectionMeta, first_chunk: &[u8]) -> Option<Arc<CaptureHandle>> {
        let target = namespace::request_target(first_chunk)?;
        let namespace = self.namespace_of(target)?;

        let handle = Arc::new(CaptureHandle::new(CaptureId::new(), namespace));
        if let Some(previous) = self
            .table
            .put(meta.key(), CorrelationEntry::new(Arc::clone(&handle)))
        {
            tracing::warn!(
                connection_id = %meta.id,
                key = %meta.key(),
                replaced = %previous.capture_id(),
                "Pending capture replaced before it was acknowledged"
            );
        }

        tracing::debug!(
            connection_id = %meta.id,
            capture_id = %handle.id,
            namespace,
            peer_addr = %meta.remote,
            "Capture started"
        );
        metrics::record_capture_started();

        self.hub.publish(
            namespace,
            CaptureEvent::Begin(BeginEvent {
                capture_id: handle.id,
                namespace: namespace.to_string(),
                sender_address: meta.remote.ip().to_string(),
                server_address: meta.local.ip().to_string(),
                server_port: meta.local.port(),
                timestamp: unix_millis(),
            }),
        );
        Some(handle)
    }

    /// Publish a chunk verbatim as a Data event. Returns false once the
    /// capture is sealed.
    pub fn relay(&self, handle: &CaptureHandle, chunk: &[u8]) -> bool {
        let sealed = handle.sealed.lock().expect("capture handle mutex poisoned");
        if *sealed {
            return false;
        }
        self.hub.publish(
            &handle.namespace,
            CaptureEvent::Data {
                capture_id: handle.id,
                bytes: Bytes::copy_from_slice(chunk),
            },
        );
        true
    }

    /// Take the pending capture for `key`, retrying per the retry policy
    /// while the raw path may not have filed it yet.
    pub async fn claim(&self, key: ConnectionKey) -> Option<Arc<CaptureHandle>> {
        self.retry
            .run(|attempt| {
                let entry = self.table.take(key);
                if entry.is_none() && attempt < self.retry.max_attempts() {
                    tracing::debug!(%key, attempt, delay = ?self.retry.delay, "Capture not filed yet, retrying");
                }
                entry
            })
            .await
            .map(|entry| entry.handle)
    }

    /// Publish End to `namespace` and seal the capture. Returns false if the
    /// capture was already sealed, in which case nothing is published.
    pub fn complete(&self, handle: &CaptureHandle, namespace: &str, end: EndEvent) -> bool {
        let mut sealed = handle.sealed.lock().expect("capture handle mutex poisoned");
        if *sealed {
            return false;
        }
        *sealed = true;
        self.hub.publish(namespace, CaptureEvent::End(end));
        metrics::record_capture_completed();
        true
    }

    /// Seal a claimed capture without publishing End. Viewers keep the
    /// Begin and Data they already received.
    pub fn abandon(&self, handle: &CaptureHandle) {
        let mut sealed = handle.sealed.lock().expect("capture handle mutex poisoned");
        if !*sealed {
            *sealed = true;
            metrics::record_capture_abandoned();
        }
    }

    /// Connection closed: drop its entry if it was never claimed.
    pub fn release(&self, key: ConnectionKey, handle: &CaptureHandle) {
        if self.table.release(key, handle.id) {
            tracing::debug!(%key, capture_id = %handle.id, "Released unclaimed capture on close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::connection::Scheme;
    use std::collections::BTreeMap;

    fn engine(hub: Arc<Hub>) -> CaptureEngine {
        let config = CaptureConfig {
            retry_delay_ms: 10,
            ..CaptureConfig::default()
        };
        CaptureEngine::new(&config, hub)
    }

    fn meta(port: u16) -> ConnectionMeta {
        ConnectionMeta::new(
            ([192, 168, 1, 10], port).into(),
            ([192, 168, 1, 1], 8080).into(),
            Scheme::Http,
        )
    }

    fn end(id: CaptureId) -> EndEvent {
        EndEvent {
            capture_id: id,
            headers: BTreeMap::new(),
            http_version: "1.1".into(),
            method: "POST".into(),
            path: "/s/abc123".into(),
            scheme: "http".into(),
        }
    }

    #[tokio::test]
    async fn begin_files_entry_and_publishes() {
        let hub = Arc::new(Hub::new(16));
        let (viewer, mut rx) = hub.subscriber();
        viewer.join("abc123");
        let engine = engine(hub.clone());

        let handle = engine
            .begin(&meta(40000), b"POST /s/abc123?x=1 HTTP/1.1\r\n")
            .unwrap();
        assert_eq!(handle.namespace(), "abc123");
        assert_eq!(engine.table().len(), 1);

        match &*rx.recv().await.unwrap() {
            CaptureEvent::Begin(begin) => {
                assert_eq!(begin.capture_id, handle.id());
                assert_eq!(begin.namespace, "abc123");
                assert_eq!(begin.sender_address, "192.168.1.10");
                assert_eq!(begin.server_address, "192.168.1.1");
                assert_eq!(begin.server_port, 8080);
            }
            other => panic!("expected begin, got {other:?}"),
        }
    }

    #[test]
    fn begin_ignores_ordinary_traffic() {
        let engine = engine(Arc::new(Hub::new(4)));
        assert!(engine.begin(&meta(40001), b"GET /index.html HTTP/1.1\r\n").is_none());
        assert!(engine.begin(&meta(40001), b"garbage").is_none());
        assert!(engine.table().is_empty());
    }

    #[tokio::test]
    async fn nothing_relayed_after_end() {
        let hub = Arc::new(Hub::new(16));
        let (viewer, mut rx) = hub.subscriber();
        viewer.join("abc123");
        let engine = engine(hub.clone());

        let handle = engine.begin(&meta(40002), b"GET /s/abc123 HTTP/1.1\r\n").unwrap();
        assert!(engine.relay(&handle, b"chunk"));
        assert!(engine.complete(&handle, "abc123", end(handle.id())));
        assert!(!engine.relay(&handle, b"late"));
        assert!(!engine.complete(&handle, "abc123", end(handle.id())));

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.kind())
            .collect();
        assert_eq!(kinds, vec!["begin", "data", "end"]);
    }

    #[tokio::test]
    async fn abandoned_capture_is_silenced() {
        let hub = Arc::new(Hub::new(16));
        let (viewer, mut rx) = hub.subscriber();
        viewer.join("abc123");
        let engine = engine(hub.clone());

        let handle = engine.begin(&meta(40005), b"POST /s/abc123 HTTP/1.1\r\n").unwrap();
        assert!(engine.relay(&handle, b"part"));
        engine.abandon(&handle);
        assert!(handle.is_sealed());
        assert!(!engine.relay(&handle, b"rest"));
        assert!(!engine.complete(&handle, "abc123", end(handle.id())));

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.kind())
            .collect();
        assert_eq!(kinds, vec!["begin", "data"]);
    }

    #[tokio::test]
    async fn claim_takes_entry_once() {
        let engine = engine(Arc::new(Hub::new(4)));
        let m = meta(40003);
        let handle = engine.begin(&m, b"GET /s/ns HTTP/1.1\r\n").unwrap();

        let claimed = engine.claim(m.key()).await.unwrap();
        assert_eq!(claimed.id(), handle.id());
        assert!(engine.claim(m.key()).await.is_none());
    }

    #[tokio::test]
    async fn claim_waits_for_late_registration() {
        let engine = Arc::new(engine(Arc::new(Hub::new(4))));
        let m = meta(40004);

        let late = engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(15)).await;
            late.begin(&m, b"GET /s/ns HTTP/1.1\r\n");
        });

        assert!(engine.claim(m.key()).await.is_some());
    }

    #[tokio::test]
    async fn release_drops_unclaimed_entry() {
        let engine = engine(Arc::new(Hub::new(4)));
        let m = meta(40005);
        let handle = engine.begin(&m, b"GET /s/ns HTTP/1.1\r\n").unwrap();
        engine.release(m.key(), &handle);
        assert!(engine.table().is_empty());
    }
}
