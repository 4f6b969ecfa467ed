//! Correlation Table: pending captures keyed by connection, plus the sweeper
//! that evicts entries nobody claimed.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time;

use crate::capture::engine::CaptureHandle;
use crate::capture::event::CaptureId;
use crate::observability::metrics;

/// Key identifying one in-flight connection: the peer's source port.
///
/// A peer cannot have two open connections on the same source port at once,
/// so the port is unique among live connections from that peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey(u16);

impl ConnectionKey {
    pub fn from_remote(remote: SocketAddr) -> Self {
        Self(remote.port())
    }

    pub fn port(&self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "port-{}", self.0)
    }
}

/// A capture waiting for its structured acknowledgement.
#[derive(Debug, Clone)]
pub struct CorrelationEntry {
    pub handle: Arc<CaptureHandle>,
    pub created_at: Instant,
}

impl CorrelationEntry {
    pub fn new(handle: Arc<CaptureHandle>) -> Self {
        Self::at(handle, Instant::now())
    }

    pub fn at(handle: Arc<CaptureHandle>, created_at: Instant) -> Self {
        Self { handle, created_at }
    }

    pub fn capture_id(&self) -> CaptureId {
        self.handle.id()
    }
}

/// Map from connection key to pending capture.
///
/// One mutex guards the whole map; there is at most one entry per open
/// connection so contention stays low.
#[derive(Debug, Default)]
pub struct CorrelationTable {
    entries: Mutex<HashMap<ConnectionKey, CorrelationEntry>>,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an entry, replacing (and returning) any previous one for the key.
    pub fn put(&self, key: ConnectionKey, entry: CorrelationEntry) -> Option<CorrelationEntry> {
        let mut entries = self.entries.lock().expect("correlation table mutex poisoned");
        let previous = entries.insert(key, entry);
        metrics::record_pending_captures(entries.len());
        if previous.is_some() {
            metrics::record_correlation_evicted("replaced", 1);
        }
        previous
    }

    /// Remove and return the entry for `key`. An entry is handed out at most once.
    pub fn take(&self, key: ConnectionKey) -> Option<CorrelationEntry> {
        let mut entries = self.entries.lock().expect("correlation table mutex poisoned");
        let entry = entries.remove(&key);
        metrics::record_pending_captures(entries.len());
        entry
    }

    /// Remove the entry for `key` only if it still belongs to `capture_id`.
    ///
    /// Used when a connection closes so a newer connection reusing the same
    /// key keeps its own entry.
    pub fn release(&self, key: ConnectionKey, capture_id: CaptureId) -> bool {
        let mut entries = self.entries.lock().expect("correlation table mutex poisoned");
        let owned = entries
            .get(&key)
            .is_some_and(|entry| entry.capture_id() == capture_id);
        if owned {
            entries.remove(&key);
            metrics::record_pending_captures(entries.len());
            metrics::record_correlation_evicted("released", 1);
        }
        owned
    }

    /// Remove every entry older than `ttl` as of `now`. Returns how many went.
    pub fn sweep(&self, now: Instant, ttl: Duration) -> usize {
        let mut entries = self.entries.lock().expect("correlation table mutex poisoned");
        let before = entries.len();
        entries.retain(|_, entry| now.saturating_duration_since(entry.created_at) <= ttl);
        let removed = before - entries.len();
        metrics::record_pending_captures(entries.len());
        if removed > 0 {
            metrics::record_correlation_evicted("swept", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("correlation table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Periodically sweeps stale entries out of a [`CorrelationTable`].
pub struct Sweeper {
    table: Arc<CorrelationTable>,
    ttl: Duration,
    interval: Duration,
}

impl Sweeper {
    pub fn new(table: Arc<CorrelationTable>, ttl: Duration, interval: Duration) -> Self {
        Self { table, ttl, interval }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            ttl_secs = self.ttl.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Correlation sweeper starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.table.sweep(Instant::now(), self.ttl);
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.table.len(), "Swept stale captures");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("Correlation sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(created_at: Instant) -> CorrelationEntry {
        CorrelationEntry::at(Arc::new(CaptureHandle::new(CaptureId::new(), "ns")), created_at)
    }

    fn key(port: u16) -> ConnectionKey {
        ConnectionKey::from_remote(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[test]
    fn take_returns_entry_once() {
        let table = CorrelationTable::new();
        let e = entry(Instant::now());
        let id = e.capture_id();
        assert!(table.put(key(4000), e).is_none());

        let taken = table.take(key(4000)).unwrap();
        assert_eq!(taken.capture_id(), id);
        assert!(table.take(key(4000)).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn put_overwrites_previous_entry() {
        let table = CorrelationTable::new();
        let first = entry(Instant::now());
        let second = entry(Instant::now());
        let (first_id, second_id) = (first.capture_id(), second.capture_id());

        table.put(key(4001), first);
        let replaced = table.put(key(4001), second).unwrap();
        assert_eq!(replaced.capture_id(), first_id);
        assert_eq!(table.len(), 1);
        assert_eq!(table.take(key(4001)).unwrap().capture_id(), second_id);
    }

    #[test]
    fn keys_are_independent() {
        let table = CorrelationTable::new();
        table.put(key(5000), entry(Instant::now()));
        table.put(key(5001), entry(Instant::now()));
        assert!(table.take(key(5000)).is_some());
        assert!(table.take(key(5001)).is_some());
        assert!(table.take(key(5002)).is_none());
    }

    #[test]
    fn sweep_removes_only_entries_older_than_ttl() {
        let table = CorrelationTable::new();
        let now = Instant::now();
        let ttl = Duration::from_secs(30);
        table.put(key(6000), entry(now));
        table.put(key(6001), entry(now + Duration::from_secs(20)));

        // Both within TTL.
        assert_eq!(table.sweep(now + Duration::from_secs(30), ttl), 0);
        assert_eq!(table.len(), 2);

        // First is now 31s old, second only 11s.
        assert_eq!(table.sweep(now + Duration::from_secs(31), ttl), 1);
        assert!(table.take(key(6000)).is_none());
        assert!(table.take(key(6001)).is_some());
    }

    #[test]
    fn release_only_removes_matching_capture() {
        let table = CorrelationTable::new();
        let old = entry(Instant::now());
        let old_id = old.capture_id();
        table.put(key(7000), old);

        let newer = entry(Instant::now());
        table.put(key(7000), newer);

        assert!(!table.release(key(7000), old_id));
        assert_eq!(table.len(), 1);

        let current = table.take(key(7000)).unwrap();
        table.put(key(7000), current.clone());
        assert!(table.release(key(7000), current.capture_id()));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn sweeper_evicts_stale_entries_and_stops_on_shutdown() {
        let table = Arc::new(CorrelationTable::new());
        table.put(key(8000), entry(Instant::now()));

        let (tx, rx) = broadcast::channel(1);
        let sweeper = Sweeper::new(table.clone(), Duration::from_millis(20), Duration::from_millis(10));
        let task = tokio::spawn(sweeper.run(rx));

        time::sleep(Duration::from_millis(100)).await;
        assert!(table.is_empty());

        tx.send(()).unwrap();
        task.await.unwrap();
    }
}
