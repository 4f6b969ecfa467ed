//! Topic registry shared by publishers and viewers.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::capture::event::CaptureEvent;
use crate::hub::subscriber::Subscriber;
use crate::observability::metrics;

static SUBSCRIBER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a viewer registered with the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    fn next() -> Self {
        Self(SUBSCRIBER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "viewer-{}", self.0)
    }
}

struct Member {
    tx: mpsc::Sender<Arc<CaptureEvent>>,
    namespaces: HashSet<String>,
}

#[derive(Default)]
struct Registry {
    members: HashMap<SubscriberId, Member>,
    topics: HashMap<String, HashSet<SubscriberId>>,
}

impl Registry {
    /// Drop a member from every topic it joined. The member's queue closes
    /// once its sender is gone.
    fn remove_member(&mut self, id: SubscriberId) -> bool {
        let Some(member) = self.members.remove(&id) else {
            return false;
        };
        for namespace in &member.namespaces {
            self.unlink(namespace, id);
        }
        true
    }

    fn unlink(&mut self, namespace: &str, id: SubscriberId) {
        if let Some(ids) = self.topics.get_mut(namespace) {
            ids.remove(&id);
            if ids.is_empty() {
                self.topics.remove(namespace);
            }
        }
    }
}

/// Registry of namespaces and the viewers joined to them.
pub struct Hub {
    registry: Mutex<Registry>,
    buffer: usize,
}

impl Hub {
    /// Create a hub whose viewers may queue up to `buffer` undelivered events.
    pub fn new(buffer: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            buffer: buffer.max(1),
        }
    }

    /// Register a new viewer. It joins no namespace yet.
    ///
    /// The receiver yields events for every namespace the viewer joins and
    /// returns `None` once the viewer has been evicted.
    pub fn subscriber(self: &Arc<Self>) -> (Subscriber, mpsc::Receiver<Arc<CaptureEvent>>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = SubscriberId::next();
        let mut registry = self.registry.lock().expect("hub registry mutex poisoned");
        registry.members.insert(
            id,
            Member {
                tx,
                namespaces: HashSet::new(),
            },
        );
        metrics::record_viewers(registry.members.len());
        drop(registry);
        (Subscriber::new(id, Arc::clone(self)), rx)
    }

    /// Add `id` to `namespace`. Returns false if the viewer is no longer registered.
    pub fn join(&self, id: SubscriberId, namespace: &str) -> bool {
        let mut registry = self.registry.lock().expect("hub registry mutex poisoned");
        let Some(member) = registry.members.get_mut(&id) else {
            return false;
        };
        member.namespaces.insert(namespace.to_string());
        registry
            .topics
            .entry(namespace.to_string())
            .or_default()
            .insert(id);
        true
    }

    /// Remove `id` from `namespace`. Returns whether it was joined.
    pub fn leave(&self, id: SubscriberId, namespace: &str) -> bool {
        let mut registry = self.registry.lock().expect("hub registry mutex poisoned");
        let joined = registry
            .members
            .get_mut(&id)
            .is_some_and(|member| member.namespaces.remove(namespace));
        if joined {
            registry.unlink(namespace, id);
        }
        joined
    }

    /// Unregister a viewer entirely.
    pub fn remove(&self, id: SubscriberId) {
        let mut registry = self.registry.lock().expect("hub registry mutex poisoned");
        if registry.remove_member(id) {
            metrics::record_viewers(registry.members.len());
        }
    }

    /// Deliver `event` to every viewer joined to `namespace`.
    ///
    /// Never blocks: a viewer whose queue is full or closed is evicted.
    /// Returns the number of viewers the event was queued for.
    pub fn publish(&self, namespace: &str, event: CaptureEvent) -> usize {
        let kind = event.kind();
        let event = Arc::new(event);
        let mut registry = self.registry.lock().expect("hub registry mutex poisoned");

        let Some(ids) = registry.topics.get(namespace) else {
            metrics::record_event_published(kind, 0);
            return 0;
        };

        let mut delivered = 0;
        let mut unreachable = Vec::new();
        for id in ids {
            let Some(member) = registry.members.get(id) else {
                continue;
            };
            match member.tx.try_send(Arc::clone(&event)) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(viewer = %id, namespace, "Viewer queue full, evicting");
                    unreachable.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(viewer = %id, namespace, "Viewer gone, evicting");
                    unreachable.push(*id);
                }
            }
        }

        for id in unreachable {
            registry.remove_member(id);
            metrics::record_viewer_evicted();
        }
        metrics::record_viewers(registry.members.len());
        metrics::record_event_published(kind, delivered);
        delivered
    }

    /// Number of viewers currently joined to `namespace`.
    pub fn subscriber_count(&self, namespace: &str) -> usize {
        let registry = self.registry.lock().expect("hub registry mutex poisoned");
        registry.topics.get(namespace).map_or(0, HashSet::len)
    }

    /// Number of namespaces with at least one viewer.
    pub fn namespace_count(&self) -> usize {
        self.registry.lock().expect("hub registry mutex poisoned").topics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::event::CaptureId;
    use axum::body::Bytes;

    fn data(id: CaptureId, bytes: &'static [u8]) -> CaptureEvent {
        CaptureEvent::Data {
            capture_id: id,
            bytes: Bytes::from_static(bytes),
        }
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let hub = Arc::new(Hub::new(16));
        let (viewer, mut rx) = hub.subscriber();
        assert!(viewer.join("ns"));

        let id = CaptureId::new();
        hub.publish("ns", data(id, b"one"));
        hub.publish("ns", data(id, b"two"));
        hub.publish("other", data(id, b"elsewhere"));
        hub.publish("ns", data(id, b"three"));

        for expected in [&b"one"[..], b"two", b"three"] {
            match &*rx.recv().await.unwrap() {
                CaptureEvent::Data { bytes, .. } => assert_eq!(&bytes[..], expected),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_joiner_sees_only_later_events() {
        let hub = Arc::new(Hub::new(16));
        let (early, mut early_rx) = hub.subscriber();
        early.join("ns");

        let id = CaptureId::new();
        hub.publish("ns", data(id, b"before"));

        let (late, mut late_rx) = hub.subscriber();
        late.join("ns");
        assert_eq!(hub.publish("ns", data(id, b"after")), 2);

        assert_eq!(early_rx.recv().await.unwrap().capture_id(), id);
        assert_eq!(early_rx.recv().await.unwrap().capture_id(), id);
        match &*late_rx.recv().await.unwrap() {
            CaptureEvent::Data { bytes, .. } => assert_eq!(&bytes[..], b"after"),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_viewer_is_evicted_without_blocking_others() {
        let hub = Arc::new(Hub::new(1));
        let (slow, mut slow_rx) = hub.subscriber();
        let (fast, mut fast_rx) = hub.subscriber();
        slow.join("ns");
        fast.join("ns");

        let id = CaptureId::new();
        assert_eq!(hub.publish("ns", data(id, b"a")), 2);
        fast_rx.recv().await.unwrap();

        // slow never drained its single slot
        assert_eq!(hub.publish("ns", data(id, b"b")), 1);
        assert_eq!(hub.subscriber_count("ns"), 1);

        assert!(slow_rx.recv().await.is_some());
        assert!(slow_rx.recv().await.is_none());
        assert!(!slow.join("ns"));
        assert!(fast_rx.recv().await.is_some());
    }

    #[test]
    fn dropping_viewer_leaves_all_namespaces() {
        let hub = Arc::new(Hub::new(4));
        let (viewer, _rx) = hub.subscriber();
        viewer.join("a");
        viewer.join("b");
        assert_eq!(hub.namespace_count(), 2);

        drop(viewer);
        assert_eq!(hub.namespace_count(), 0);
        assert_eq!(hub.publish("a", data(CaptureId::new(), b"x")), 0);
    }

    #[test]
    fn leave_removes_single_namespace() {
        let hub = Arc::new(Hub::new(4));
        let (viewer, _rx) = hub.subscriber();
        viewer.join("a");
        viewer.join("b");
        assert!(viewer.leave("a"));
        assert!(!viewer.leave("a"));
        assert_eq!(hub.subscriber_count("a"), 0);
        assert_eq!(hub.subscriber_count("b"), 1);
    }
}
