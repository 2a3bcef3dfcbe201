//! The latency table: which backends are alive and how fast they answer.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::backend::{Candidates, LatencyEntry};
use crate::load_balancer::selector::{select_fastest, Selection};

/// Probe results keyed by backend identity.
///
/// Written by the prober, read by the forwarder and the status endpoint.
/// Every operation takes the lock for the duration of one map access only;
/// callers never get to iterate the map outside the guard.
#[derive(Debug, Default)]
pub struct LatencyTable {
    entries: Mutex<BTreeMap<String, LatencyEntry>>,
}

impl LatencyTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, LatencyEntry>> {
        // Every mutation is a single map call; a poisoned map is still consistent.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or refresh the measurement for `identity`.
    pub fn upsert(&self, identity: &str, entry: LatencyEntry) {
        self.lock().insert(identity.to_owned(), entry);
    }

    /// Drop the measurement for `identity`, returning it if present.
    pub fn remove(&self, identity: &str) -> Option<LatencyEntry> {
        self.lock().remove(identity)
    }

    /// Remove every entry whose identity is absent from `discovered`.
    ///
    /// An empty discovery result empties the table. Returns the identities
    /// that were removed.
    pub fn retain_discovered(&self, discovered: &Candidates) -> Vec<String> {
        let mut entries = self.lock();
        if discovered.is_empty() {
            let stale = entries.keys().cloned().collect();
            entries.clear();
            return stale;
        }

        let stale: Vec<String> = entries
            .keys()
            .filter(|id| !discovered.contains_key(*id))
            .cloned()
            .collect();
        for id in &stale {
            entries.remove(id);
        }
        stale
    }

    /// Whether `addr` belongs to a backend currently in the table.
    pub fn is_backend(&self, addr: &SocketAddr) -> bool {
        self.lock().values().any(|entry| entry.addr == *addr)
    }

    /// The backend with the lowest RTT, if any.
    pub fn fastest(&self) -> Option<Selection> {
        let entries = self.lock();
        select_fastest(entries.iter().map(|(id, entry)| (id.as_str(), entry)))
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> BTreeMap<String, LatencyEntry> {
        self.lock().clone()
    }

    /// Number of live backends.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no backend is currently routable.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// A shared reference to the latency table.
pub type SharedLatencyTable = Arc<LatencyTable>;

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 9], port))
    }

    fn discovered(ids: &[(&str, u16)]) -> Candidates {
        ids.iter()
            .map(|(id, port)| (id.to_string(), addr(*port)))
            .collect()
    }

    #[test]
    fn stale_identities_are_evicted() {
        let table = LatencyTable::new();
        table.upsert("a", LatencyEntry::new(4.0, addr(1)));
        table.upsert("b", LatencyEntry::new(2.0, addr(2)));

        let removed = table.retain_discovered(&discovered(&[("a", 1), ("c", 3)]));

        assert_eq!(removed, vec!["b".to_string()]);
        assert_eq!(table.snapshot().keys().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn empty_discovery_clears_everything() {
        let table = LatencyTable::new();
        table.upsert("a", LatencyEntry::new(4.0, addr(1)));
        table.upsert("b", LatencyEntry::new(2.0, addr(2)));

        table.retain_discovered(&Candidates::new());

        assert!(table.is_empty());
        assert_eq!(table.fastest(), None);
    }

    #[test]
    fn backend_membership_follows_entries() {
        let table = LatencyTable::new();
        table.upsert("a", LatencyEntry::new(4.0, addr(1)));
        assert!(table.is_backend(&addr(1)));
        assert!(!table.is_backend(&addr(2)));

        table.remove("a");
        assert!(!table.is_backend(&addr(1)));
    }

    #[test]
    fn fastest_tracks_refreshed_measurements() {
        let table = LatencyTable::new();
        table.upsert("a", LatencyEntry::new(12.0, addr(1)));
        table.upsert("b", LatencyEntry::new(3.0, addr(2)));
        assert_eq!(table.fastest().unwrap().identity, "b");

        table.upsert("b", LatencyEntry::new(40.0, addr(2)));
        assert_eq!(table.fastest().unwrap().identity, "a");
        assert_eq!(table.len(), 2);
    }
}
