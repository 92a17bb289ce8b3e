//! Bounded recently-used container
//!
//! A map that keeps at most `maxsize` keys and throws away the least
//! recently used ones beyond that. Recency is tracked with a min-heap of
//! sequence numbers: every access pushes a fresh entry instead of moving the
//! old one, and stale entries are skipped when popped (lazy invalidation).
//! An entry is valid only while its sequence number is the one recorded for
//! its key in `lookup`.
//!
//! The container is not synchronized; callers sharing it must wrap it in a
//! lock (see `PoolManager`).

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::hash::Hash;

/// The heap is compacted once it holds more than `maxsize * CLEANUP_FACTOR` entries
pub const CLEANUP_FACTOR: usize = 10;

/// One access of a key, ordered by sequence number only
#[derive(Debug, Clone)]
struct PriorityEntry<K> {
    sequence: u64,
    key: K,
}

impl<K> PartialEq for PriorityEntry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl<K> Eq for PriorityEntry<K> {}

impl<K> PartialOrd for PriorityEntry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for PriorityEntry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

/// Capacity-bounded map with least-recently-used eviction
#[derive(Debug)]
pub struct RecentlyUsedContainer<K, V> {
    maxsize: usize,
    container: HashMap<K, V>,
    /// Min-heap of accesses; may hold stale entries
    heap: BinaryHeap<Reverse<PriorityEntry<K>>>,
    /// Sequence number of the current (valid) entry for each live key
    lookup: HashMap<K, u64>,
    counter: u64,
}

impl<K, V> RecentlyUsedContainer<K, V>
where
    K: Hash + Eq + Clone,
{
    /// Create a container holding at most `maxsize` keys (at least one)
    pub fn new(maxsize: usize) -> Self {
        RecentlyUsedContainer {
            maxsize: maxsize.max(1),
            container: HashMap::new(),
            heap: BinaryHeap::new(),
            lookup: HashMap::new(),
            counter: 0,
        }
    }

    /// Maximum number of live keys
    pub fn maxsize(&self) -> usize {
        self.maxsize
    }

    /// Heap size that triggers compaction
    fn heap_limit(&self) -> usize {
        self.maxsize.saturating_mul(CLEANUP_FACTOR)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.container.len()
    }

    /// Whether there are no live entries
    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    /// Number of physical heap entries, stale ones included
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    /// Membership test; does not count as an access
    pub fn contains_key(&self, key: &K) -> bool {
        self.container.contains_key(key)
    }

    /// Look up a value without touching its recency
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.container.get(key)
    }

    /// Look up a value and mark it as most recently used
    pub fn get(&mut self, key: &K) -> Option<&V> {
        if !self.container.contains_key(key) {
            return None;
        }

        if self.heap.len() > self.heap_limit() {
            self.prune_invalidated_entries();
        }

        self.push_entry(key.clone());
        self.container.get(key)
    }

    /// Store a value, evicting least recently used keys beyond `maxsize`
    ///
    /// Overwriting an existing key refreshes its recency and does not evict.
    /// Returns the evicted entries, oldest first.
    pub fn insert(&mut self, key: K, value: V) -> Vec<(K, V)> {
        self.container.insert(key.clone(), value);
        self.push_entry(key);

        let excess = self.container.len().saturating_sub(self.maxsize);
        self.prune_entries(excess)
    }

    /// Remove a key; absent keys are a no-op returning `None`
    pub fn remove(&mut self, key: &K) -> Option<V> {
        // Dropping the lookup entry invalidates the key's heap entry
        self.lookup.remove(key);
        self.container.remove(key)
    }

    /// Remove every entry, returning the values
    pub fn clear(&mut self) -> Vec<V> {
        self.heap.clear();
        self.lookup.clear();
        self.container.drain().map(|(_, v)| v).collect()
    }

    /// Live keys, in no particular order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.container.keys()
    }

    /// Live entries, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.container.iter()
    }

    /// Push a new entry for `key`, implicitly invalidating the previous one
    fn push_entry(&mut self, key: K) {
        let sequence = self.counter;
        self.counter += 1;

        self.lookup.insert(key.clone(), sequence);
        self.heap.push(Reverse(PriorityEntry { sequence, key }));
    }

    fn is_valid(&self, entry: &PriorityEntry<K>) -> bool {
        self.lookup.get(&entry.key) == Some(&entry.sequence)
    }

    /// Pop heap entries until `num` valid ones were evicted
    fn prune_entries(&mut self, mut num: usize) -> Vec<(K, V)> {
        let mut evicted = Vec::with_capacity(num);

        while num > 0 {
            let Some(Reverse(entry)) = self.heap.pop() else {
                break;
            };

            if !self.is_valid(&entry) {
                continue;
            }

            self.lookup.remove(&entry.key);
            if let Some(value) = self.container.remove(&entry.key) {
                evicted.push((entry.key, value));
            }
            num -= 1;
        }

        evicted
    }

    /// Rebuild the heap without invalidated entries
    fn prune_invalidated_entries(&mut self) {
        let lookup = &self.lookup;
        self.heap
            .retain(|Reverse(entry)| lookup.get(&entry.key) == Some(&entry.sequence));
    }
}
