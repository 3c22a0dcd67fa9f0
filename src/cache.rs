//! Bounded metadata cache with access-order eviction.
//!
//! Memoizes (network, token) → decimals/name/version so repeated requests do
//! not re-issue chain reads. Process-local and safe to clear at any time:
//! token metadata is immutable, so a cleared or cold cache only costs extra
//! RPC round trips, never correctness.

use std::collections::HashMap;
use std::hash::Hash;

/// Capacity used when none is specified.
pub const DEFAULT_CACHE_CAPACITY: usize = 128;

/// A fixed-capacity map that evicts the least-recently-used entry on insert.
///
/// A `get` hit relocates the key to most-recently-used position. Not shared
/// across processes; owners wrap it in a `Mutex` for per-process sharing.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    // Access order, least-recently-used first.
    order: Vec<K>,
}

impl<K: Eq + Hash + Clone, V: Clone> BoundedCache<K, V> {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// A zero capacity is clamped to 1 so `insert` always succeeds.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Looks up a key, marking it most-recently-used on a hit.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let value = self.entries.get(key).cloned()?;
        self.touch(key);
        Some(value)
    }

    /// Inserts a value, evicting the least-recently-used entry at capacity.
    pub fn insert(&mut self, key: K, value: V) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key.clone(), value);
            self.touch(&key);
            return;
        }

        if self.entries.len() >= self.capacity {
            let lru = self.order.remove(0);
            self.entries.remove(&lru);
        }

        self.entries.insert(key.clone(), value);
        self.order.push(key);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn touch(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            let k = self.order.remove(pos);
            self.order.push(k);
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for BoundedCache<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Cached on-chain token metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    /// Token decimals
    pub decimals: u8,

    /// EIP-712 domain name reported by the token
    pub name: String,

    /// EIP-712 domain version reported by the token
    pub version: String,
}

/// Cache keyed by (canonical network id, token address).
pub type MetadataCache = BoundedCache<(String, String), TokenMetadata>;
