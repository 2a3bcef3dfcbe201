//! Reverse-routing state for backend replies.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

/// Default bound on the number of tracked clients.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Records which backend a client's most recent request went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingEntry {
    /// The client that sent the request.
    pub client_addr: SocketAddr,
    /// The backend the request was forwarded to.
    pub backend_addr: SocketAddr,
    /// When the request was forwarded.
    pub created_at: Instant,
}

#[derive(Debug)]
struct Slot {
    entry: ForwardingEntry,
    seq: u64,
}

#[derive(Debug)]
struct Inner {
    entries: HashMap<SocketAddr, Slot>,
    /// Insertion order, oldest first.
    order: BTreeMap<u64, SocketAddr>,
    /// backend -> (seq -> client), so a reply resolves without scanning.
    by_backend: HashMap<SocketAddr, BTreeMap<u64, SocketAddr>>,
    next_seq: u64,
}

impl Inner {
    fn unlink(&mut self, client: &SocketAddr) -> Option<ForwardingEntry> {
        let slot = self.entries.remove(client)?;
        self.order.remove(&slot.seq);
        if let Some(clients) = self.by_backend.get_mut(&slot.entry.backend_addr) {
            clients.remove(&slot.seq);
            if clients.is_empty() {
                self.by_backend.remove(&slot.entry.backend_addr);
            }
        }
        Some(slot.entry)
    }
}

/// A capacity-bounded, insertion-ordered map from client to backend.
///
/// One entry per client; a newer request from the same client replaces the
/// old mapping and counts as a fresh insertion. Once more than `max_entries`
/// clients are tracked, the oldest insertion is evicted regardless of
/// whether a reply has used it. Entries are never expired by age.
#[derive(Debug)]
pub struct ForwardingTable {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl ForwardingTable {
    /// Create a table holding at most `max_entries` mappings (minimum 1).
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                by_backend: HashMap::new(),
                next_seq: 0,
            }),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `client`'s request was sent to `backend`.
    ///
    /// Returns the entry evicted to stay within capacity, if any.
    pub fn insert(&self, client: SocketAddr, backend: SocketAddr) -> Option<ForwardingEntry> {
        let mut inner = self.lock();
        inner.unlink(&client);

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            client,
            Slot {
                entry: ForwardingEntry {
                    client_addr: client,
                    backend_addr: backend,
                    created_at: Instant::now(),
                },
                seq,
            },
        );
        inner.order.insert(seq, client);
        inner.by_backend.entry(backend).or_default().insert(seq, client);

        if inner.entries.len() > self.max_entries {
            let (_, oldest) = inner.order.pop_first()?;
            // `order` no longer holds the seq, unlink tolerates that.
            return inner.unlink(&oldest);
        }
        None
    }

    /// The client most recently mapped to `backend`.
    pub fn client_for(&self, backend: &SocketAddr) -> Option<SocketAddr> {
        self.lock()
            .by_backend
            .get(backend)
            .and_then(|clients| clients.last_key_value())
            .map(|(_, client)| *client)
    }

    /// The mapping for `client`, if still present.
    pub fn get(&self, client: &SocketAddr) -> Option<ForwardingEntry> {
        self.lock().entries.get(client).map(|slot| slot.entry)
    }

    /// Number of tracked clients.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether no client is tracked.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }
}

/// A shared reference to the forwarding table.
pub type SharedForwardingTable = Arc<ForwardingTable>;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn client(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 5], port))
    }

    fn backend(port: u16) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, 9], port))
    }

    #[test]
    fn reply_resolves_to_mapped_client() {
        let table = ForwardingTable::new(8);
        table.insert(client(40000), backend(13024));

        assert_eq!(table.client_for(&backend(13024)), Some(client(40000)));
        assert_eq!(table.client_for(&backend(13025)), None);
    }

    #[test]
    fn lookup_does_not_consume_mapping() {
        let table = ForwardingTable::new(8);
        table.insert(client(40000), backend(13024));

        assert_eq!(table.client_for(&backend(13024)), Some(client(40000)));
        assert_eq!(table.client_for(&backend(13024)), Some(client(40000)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn newest_client_wins_for_shared_backend() {
        let table = ForwardingTable::new(8);
        table.insert(client(1), backend(13024));
        table.insert(client(2), backend(13024));

        assert_eq!(table.client_for(&backend(13024)), Some(client(2)));
    }

    #[test]
    fn remapping_a_client_moves_it_off_the_old_backend() {
        let table = ForwardingTable::new(8);
        table.insert(client(1), backend(1));
        table.insert(client(1), backend(2));

        assert_eq!(table.len(), 1);
        assert_eq!(table.client_for(&backend(1)), None);
        assert_eq!(table.client_for(&backend(2)), Some(client(1)));
        assert_eq!(table.get(&client(1)).unwrap().backend_addr, backend(2));
    }

    #[test]
    fn remap_falls_back_to_previous_client() {
        let table = ForwardingTable::new(8);
        table.insert(client(1), backend(7));
        table.insert(client(2), backend(7));
        table.insert(client(2), backend(9));

        assert_eq!(table.client_for(&backend(7)), Some(client(1)));
        assert_eq!(table.client_for(&backend(9)), Some(client(2)));
    }

    #[test]
    fn overflow_evicts_oldest_insertion() {
        let table = ForwardingTable::new(2);
        assert!(table.insert(client(1), backend(1)).is_none());
        assert!(table.insert(client(2), backend(1)).is_none());
        let evicted = table.insert(client(3), backend(1)).unwrap();

        assert_eq!(evicted.client_addr, client(1));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn reinserting_refreshes_position() {
        let table = ForwardingTable::new(2);
        table.insert(client(1), backend(1));
        table.insert(client(2), backend(1));
        table.insert(client(1), backend(1));
        let evicted = table.insert(client(3), backend(1)).unwrap();

        assert_eq!(evicted.client_addr, client(2));
        assert!(table.get(&client(1)).is_some());
    }

    proptest! {
        #[test]
        fn capacity_keeps_newest_n(max in 1usize..16, total in 0usize..64) {
            let table = ForwardingTable::new(max);
            for i in 0..total {
                table.insert(client(i as u16), backend((i % 3) as u16));
            }

            prop_assert_eq!(table.len(), total.min(max));
            for i in 0..total {
                let kept = table.get(&client(i as u16)).is_some();
                prop_assert_eq!(kept, i + max >= total);
            }
        }
    }
}
