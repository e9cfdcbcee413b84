//! Adaptable priority queue.
//!
//! A binary min-heap stored in a growable array. Every entry remembers the
//! slot that owns it and every slot remembers where its entry currently sits
//! in the array, so both sides are updated on each swap and an arbitrary
//! entry can be removed or re-keyed in O(log n) without scanning.

use std::cmp::Ordering;

/// Stable reference to an entry, returned by [`AdaptablePriorityQueue::insert`].
///
/// Handles are generational: once the entry is removed the handle goes stale
/// and never aliases a later entry that happens to reuse the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    slot: usize,
    generation: u32,
}

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    /// Insertion sequence, used as a deterministic tie-break between equal keys.
    seq: u64,
    slot: usize,
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    /// Position of the owning entry in the heap array, `None` when vacant.
    index: Option<usize>,
}

#[derive(Debug)]
pub struct AdaptablePriorityQueue<K, V> {
    entries: Vec<Entry<K, V>>,
    slots: Vec<Slot>,
    free: Vec<usize>,
    next_seq: u64,
}

impl<K: Ord, V> Default for AdaptablePriorityQueue<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> AdaptablePriorityQueue<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            slots: Vec::new(),
            free: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Inserts an entry and restores heap order.
    pub fn insert(&mut self, key: K, value: V) -> Handle {
        let index = self.entries.len();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot].index = Some(index);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    index: Some(index),
                });
                self.slots.len() - 1
            }
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(Entry {
            key,
            value,
            seq,
            slot,
        });
        self.up_heap(index);

        Handle {
            slot,
            generation: self.slots[slot].generation,
        }
    }

    /// Returns the minimum entry without removing it.
    pub fn peek_min(&self) -> Option<(&K, &V)> {
        self.entries.first().map(|e| (&e.key, &e.value))
    }

    /// Removes and returns the minimum entry.
    pub fn remove_min(&mut self) -> Option<(K, V)> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = self.remove_at(0);
        Some((entry.key, entry.value))
    }

    /// Removes an arbitrary entry. Returns `None` if the handle is stale.
    pub fn remove(&mut self, handle: Handle) -> Option<(K, V)> {
        let index = self.index_of(handle)?;
        let entry = self.remove_at(index);
        Some((entry.key, entry.value))
    }

    /// Changes the key of a live entry, returning the previous key.
    pub fn replace_key(&mut self, handle: Handle, key: K) -> Option<K> {
        let index = self.index_of(handle)?;
        let old = std::mem::replace(&mut self.entries[index].key, key);
        self.restore(index);
        Some(old)
    }

    pub fn key(&self, handle: Handle) -> Option<&K> {
        self.index_of(handle).map(|i| &self.entries[i].key)
    }

    pub fn value(&self, handle: Handle) -> Option<&V> {
        self.index_of(handle).map(|i| &self.entries[i].value)
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.index_of(handle).is_some()
    }

    /// Removes every entry. Outstanding handles become stale.
    pub fn clear(&mut self) {
        for entry in self.entries.drain(..) {
            let slot = &mut self.slots[entry.slot];
            slot.index = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(entry.slot);
        }
    }

    /// Iterates over entries in heap-array order (not sorted).
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|e| (&e.key, &e.value))
    }

    fn index_of(&self, handle: Handle) -> Option<usize> {
        self.slots
            .get(handle.slot)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.index)
    }

    fn remove_at(&mut self, index: usize) -> Entry<K, V> {
        let entry = self.entries.swap_remove(index);

        let slot = &mut self.slots[entry.slot];
        slot.index = None;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(entry.slot);

        if index < self.entries.len() {
            let moved = self.entries[index].slot;
            self.slots[moved].index = Some(index);
            self.restore(index);
        }

        entry
    }

    fn restore(&mut self, index: usize) {
        let index = self.up_heap(index);
        self.down_heap(index);
    }

    fn up_heap(&mut self, mut index: usize) -> usize {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.less(index, parent) {
                self.swap(index, parent);
                index = parent;
            } else {
                break;
            }
        }
        index
    }

    fn down_heap(&mut self, mut index: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * index + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let smallest = if right < len && self.less(right, left) {
                right
            } else {
                left
            };

            if self.less(smallest, index) {
                self.swap(index, smallest);
                index = smallest;
            } else {
                break;
            }
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.entries[a], &self.entries[b]);
        match a.key.cmp(&b.key) {
            Ordering::Equal => a.seq < b.seq,
            o => o == Ordering::Less,
        }
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        let (slot_a, slot_b) = (self.entries[a].slot, self.entries[b].slot);
        self.slots[slot_a].index = Some(a);
        self.slots[slot_b].index = Some(b);
    }

    /// `key(parent) <= key(child)` for every non-root entry, and every slot
    /// index points back at its entry.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let ordered = (1..self.entries.len()).all(|i| {
            let parent = (i - 1) / 2;
            self.entries[parent].key <= self.entries[i].key
        });
        let indexed = self
            .entries
            .iter()
            .enumerate()
            .all(|(i, e)| self.slots[e.slot].index == Some(i));
        ordered && indexed
    }
}
