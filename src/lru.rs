use std::hash::Hash;
use std::num::NonZeroU64;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;
use slab::Slab;

use crate::config::Config;

/// A weighted least-recently-used store with sliding expiration.
///
/// Entries live in a slab and are threaded onto a doubly linked list in
/// access order. The head is the most recently used entry, the tail the least
/// recently used one. Since every access moves an entry to the head and time
/// never goes backwards, the list is also ordered by last access time.
pub struct Lru<K, V> {
    /// Maps from keys to slots in `nodes`.
    map: FxHashMap<K, usize>,
    /// The entries.
    nodes: Slab<Node<K, V>>,
    /// The most recently used entry.
    head: Option<usize>,
    /// The least recently used entry.
    tail: Option<usize>,
    /// Summed weight of all entries, saturating at `u64::MAX`.
    weight: u64,
    /// Upper bound for `weight`.
    capacity: Option<NonZeroU64>,
    /// How long an entry may go unused before it expires.
    expiration: Option<Duration>,
}

/// A stored result with its bookkeeping.
struct Node<K, V> {
    key: K,
    value: V,
    weight: u64,
    accessed: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

/// The result of a lookup.
#[derive(Debug, PartialEq)]
pub enum Lookup<'a, V> {
    /// A live entry was found and marked as used.
    Hit(&'a V),
    /// An entry existed but had expired. It is gone now.
    Expired,
    /// There was no entry.
    Missing,
}

/// The result of an insertion.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// The entry was stored after evicting this many others.
    Retained { evicted: usize },
    /// The entry is heavier than the whole capacity and was not stored.
    Rejected,
}

impl<K, V> Lru<K, V> {
    /// Create an empty store.
    pub fn new(capacity: Option<u64>, expiration: Option<Duration>) -> Self {
        Self {
            map: FxHashMap::default(),
            nodes: Slab::new(),
            head: None,
            tail: None,
            weight: 0,
            capacity: capacity.and_then(NonZeroU64::new),
            expiration: expiration.filter(|d| !d.is_zero()),
        }
    }

    /// Create an empty store with the limits of a configuration.
    pub fn with_config(config: &Config) -> Self {
        Self::new(config.capacity(), config.expiration())
    }

    /// The number of stored entries, including expired ones that were not
    /// looked at yet.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Summed weight of all entries.
    pub fn weight(&self) -> u64 {
        self.weight
    }

    /// Remove all entries.
    pub fn clear(&mut self) {
        self.map.clear();
        self.nodes.clear();
        self.head = None;
        self.tail = None;
        self.weight = 0;
    }

    /// The keys from most to least recently used.
    #[cfg(test)]
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = &self.nodes[cursor?];
            cursor = node.next;
            Some(&node.key)
        })
    }

    fn is_expired(&self, node: &Node<K, V>, now: Instant) -> bool {
        self.expiration
            .is_some_and(|window| now.saturating_duration_since(node.accessed) > window)
    }

    /// Detach a node from the access list.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = {
            let node = &self.nodes[idx];
            (node.prev, node.next)
        };

        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }

        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
    }

    /// Attach a detached node as the most recently used one.
    fn push_front(&mut self, idx: usize) {
        let old = self.head.replace(idx);
        {
            let node = &mut self.nodes[idx];
            node.prev = None;
            node.next = old;
        }

        match old {
            Some(old) => self.nodes[old].prev = Some(idx),
            None => self.tail = Some(idx),
        }
    }
}

impl<K: Hash + Eq + Clone, V> Lru<K, V> {
    /// Look up a key, refreshing its recency on a hit.
    pub fn get(&mut self, key: &K, now: Instant) -> Lookup<'_, V> {
        let Some(&idx) = self.map.get(key) else {
            return Lookup::Missing;
        };

        if self.is_expired(&self.nodes[idx], now) {
            self.remove_node(idx);
            return Lookup::Expired;
        }

        self.nodes[idx].accessed = now;
        if self.head != Some(idx) {
            self.unlink(idx);
            self.push_front(idx);
        }

        Lookup::Hit(&self.nodes[idx].value)
    }

    /// Whether a live entry exists for the key. Does not count as an access.
    pub fn contains(&self, key: &K, now: Instant) -> bool {
        self.map
            .get(key)
            .is_some_and(|&idx| !self.is_expired(&self.nodes[idx], now))
    }

    /// Store a value, evicting least recently used entries until it fits.
    ///
    /// An existing entry for the same key is replaced. Weights below one are
    /// counted as one.
    pub fn insert(&mut self, key: K, value: V, weight: u64, now: Instant) -> Insertion {
        if let Some(&idx) = self.map.get(&key) {
            self.remove_node(idx);
        }

        let weight = weight.max(1);
        let mut evicted = 0;
        if let Some(capacity) = self.capacity {
            if weight > capacity.get() {
                return Insertion::Rejected;
            }

            while self.weight.saturating_add(weight) > capacity.get() {
                let Some(tail) = self.tail else { break };
                self.remove_node(tail);
                evicted += 1;
            }
        }

        let idx = self.nodes.insert(Node {
            key: key.clone(),
            value,
            weight,
            accessed: now,
            prev: None,
            next: None,
        });

        self.push_front(idx);
        self.map.insert(key, idx);
        self.weight = self.weight.saturating_add(weight);

        Insertion::Retained { evicted }
    }

    /// Remove the entry for a key, returning its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let idx = *self.map.get(key)?;
        Some(self.remove_node(idx))
    }

    /// Remove all expired entries and return how many there were.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let mut removed = 0;
        while let Some(tail) = self.tail {
            if !self.is_expired(&self.nodes[tail], now) {
                break;
            }
            self.remove_node(tail);
            removed += 1;
        }
        removed
    }

    fn remove_node(&mut self, idx: usize) -> V {
        self.unlink(idx);
        let node = self.nodes.remove(idx);
        self.map.remove(&node.key);
        self.weight = self.weight.saturating_sub(node.weight);
        node.value
    }
}
