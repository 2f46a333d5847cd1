//! Client registry
//!
//! Maps a client identifier to its token bucket and last-seen timestamp.
//! Every read and write goes through a single mutex; critical sections are
//! O(1) except for the maintenance sweeps, which traverse the map once.

use crate::limiter::bucket::TokenBucket;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Registry entry owned by one client identifier.
#[derive(Debug, Clone)]
pub struct ClientEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

/// Point-in-time copy of a client entry.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientSnapshot {
    pub permits: f64,
    pub last_seen: Instant,
}

impl From<&ClientEntry> for ClientSnapshot {
    fn from(entry: &ClientEntry) -> Self {
        Self {
            permits: entry.bucket.permits(),
            last_seen: entry.last_seen,
        }
    }
}

/// Outcome of a [`ClientRegistry::rebuild`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildStats {
    pub entries: usize,
    pub capacity_before: usize,
    pub capacity_after: usize,
}

/// Concurrency-safe map of client identifier to bucket.
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ClientEntry>>,
    requests_per_second: f64,
    burst: u32,
}

impl ClientRegistry {
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
            requests_per_second,
            burst,
        }
    }

    fn entry<'a>(
        clients: &'a mut HashMap<String, ClientEntry>,
        id: &str,
        requests_per_second: f64,
        burst: u32,
        now: Instant,
    ) -> &'a mut ClientEntry {
        clients.entry(id.to_string()).or_insert_with(|| ClientEntry {
            bucket: TokenBucket::new(burst, requests_per_second, now),
            last_seen: now,
        })
    }

    /// Returns the entry for `id`, creating a full bucket if it is absent.
    pub fn get_or_create(&self, id: &str) -> ClientSnapshot {
        let now = Instant::now();
        let mut clients = self.clients.lock();
        let entry = Self::entry(&mut clients, id, self.requests_per_second, self.burst, now);
        ClientSnapshot::from(&*entry)
    }

    /// Refreshes last-seen for `id`. Returns `false` if the client is unknown.
    pub fn touch(&self, id: &str) -> bool {
        let now = Instant::now();
        match self.clients.lock().get_mut(id) {
            Some(entry) => {
                entry.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Admission check: get-or-create, touch and take a permit, all under
    /// one lock acquisition.
    pub fn allow(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock();
        let entry = Self::entry(&mut clients, id, self.requests_per_second, self.burst, now);
        entry.last_seen = now;
        entry.bucket.try_acquire(now)
    }

    /// Removes every client idle for longer than `threshold`.
    /// Returns the number of evicted entries.
    pub fn evict_idle(&self, threshold: Duration) -> usize {
        let now = Instant::now();
        let mut clients = self.clients.lock();
        let before = clients.len();
        clients.retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= threshold);
        before - clients.len()
    }

    /// Reallocates the backing map to fit the live entries.
    ///
    /// `HashMap` keeps its peak allocation after removals, so without this a
    /// burst of one-off clients would pin memory until restart. Entries and
    /// their bucket state are carried over untouched.
    pub fn rebuild(&self) -> RebuildStats {
        let mut clients = self.clients.lock();
        let capacity_before = clients.capacity();
        clients.shrink_to_fit();
        RebuildStats {
            entries: clients.len(),
            capacity_before,
            capacity_after: clients.capacity(),
        }
    }

    pub fn snapshot(&self, id: &str) -> Option<ClientSnapshot> {
        self.clients.lock().get(id).map(ClientSnapshot::from)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
