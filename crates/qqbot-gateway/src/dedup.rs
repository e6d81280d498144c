//! Sequence-number de-duplication.

use std::collections::HashSet;

/// Remembers the last `capacity` sequence numbers.
///
/// The set always mirrors the occupied ring slots; inserting into a full
/// ring evicts the oldest entry, so a very old sequence can be admitted
/// again.
#[derive(Debug, Clone)]
pub struct SequenceDedupCache {
    ring: Vec<Option<u64>>,
    next: usize,
    seen: HashSet<u64>,
}

impl SequenceDedupCache {
    /// Create a cache holding `capacity` entries (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: vec![None; capacity],
            next: 0,
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Record `seq`. Returns `false` if it was already present.
    pub fn insert(&mut self, seq: u64) -> bool {
        if self.seen.contains(&seq) {
            return false;
        }
        if let Some(evicted) = self.ring[self.next].replace(seq) {
            self.seen.remove(&evicted);
        }
        self.seen.insert(seq);
        self.next = (self.next + 1) % self.ring.len();
        true
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.seen.contains(&seq)
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.ring.iter_mut().for_each(|slot| *slot = None);
        self.seen.clear();
        self.next = 0;
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.ring.len()
    }
}
