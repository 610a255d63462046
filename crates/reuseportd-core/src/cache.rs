//! Keyed LRU cache of listening sockets.
//!
//! A hash map from [`CacheKey`] to slab index sits over a doubly linked list
//! threaded through a `Vec<Slot>`. The list's MRU end is `head`, its LRU end
//! is `tail`. Every operation that moves an entry to `head` also refreshes
//! `last_touched`, so list order and age order never disagree — the
//! keepalive scan can walk from `tail` and stop at the first entry that
//! isn't stale yet.

use crate::key::CacheKey;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Slot<V> {
    key: CacheKey,
    value: V,
    last_touched: Instant,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct LruCache<V> {
    capacity: usize,
    map: HashMap<CacheKey, usize>,
    slots: Vec<Option<Slot<V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<V> LruCache<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Look up `key`; on hit, move it to the MRU end and refresh its age.
    pub fn get_touch(&mut self, key: &CacheKey) -> Option<&V> {
        let idx = *self.map.get(key)?;
        self.detach(idx);
        self.push_front(idx);
        self.slots[idx].as_mut().unwrap().last_touched = Instant::now();
        Some(&self.slots[idx].as_ref().unwrap().value)
    }

    /// Insert a freshly bound value at the MRU end, evicting the LRU entry
    /// first if the cache is at capacity. Returns the evicted entry, if any.
    pub fn insert(&mut self, key: CacheKey, value: V) -> Option<(CacheKey, V)> {
        let evicted = if self.map.len() >= self.capacity && self.capacity > 0 {
            self.pop_lru()
        } else {
            None
        };

        let idx = self.alloc_slot(Slot {
            key: key.clone(),
            value,
            last_touched: Instant::now(),
            prev: None,
            next: None,
        });
        self.push_front(idx);
        self.map.insert(key, idx);
        evicted
    }

    /// Remove `key` unconditionally (used for rollback of a just-inserted,
    /// not-yet-successfully-transferred entry).
    pub fn remove(&mut self, key: &CacheKey) -> Option<V> {
        let idx = self.map.remove(key)?;
        self.detach(idx);
        let slot = self.slots[idx].take().unwrap();
        self.free.push(idx);
        Some(slot.value)
    }

    /// Evict every entry whose age exceeds `keepalive`, scanning from the
    /// LRU end and stopping at the first entry that is still fresh.
    pub fn evict_stale(&mut self, keepalive: Duration) -> Vec<(CacheKey, V)> {
        let now = Instant::now();
        let mut evicted = Vec::new();
        loop {
            let Some(tail_idx) = self.tail else { break };
            let age = now.duration_since(self.slots[tail_idx].as_ref().unwrap().last_touched);
            if age <= keepalive {
                break;
            }
            let (key, value) = self.pop_lru().expect("tail index implies a poppable entry");
            evicted.push((key, value));
        }
        evicted
    }

    /// Remove every entry, returning them all (used for a reset signal).
    pub fn clear(&mut self) -> Vec<(CacheKey, V)> {
        let mut out = Vec::with_capacity(self.map.len());
        while let Some((key, value)) = self.pop_lru() {
            out.push((key, value));
        }
        out
    }

    fn pop_lru(&mut self) -> Option<(CacheKey, V)> {
        let idx = self.tail?;
        self.detach(idx);
        let slot = self.slots[idx].take().unwrap();
        self.free.push(idx);
        self.map.remove(&slot.key);
        Some((slot.key, slot.value))
    }

    fn alloc_slot(&mut self, slot: Slot<V>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Some(slot);
            idx
        } else {
            self.slots.push(Some(slot));
            self.slots.len() - 1
        }
    }

    fn detach(&mut self, idx: usize) {
        let (prev, next) = {
            let s = self.slots[idx].as_ref().unwrap();
            (s.prev, s.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.tail = prev,
        }
        let s = self.slots[idx].as_mut().unwrap();
        s.prev = None;
        s.next = None;
    }

    fn push_front(&mut self, idx: usize) {
        let old_head = self.head;
        {
            let s = self.slots[idx].as_mut().unwrap();
            s.next = old_head;
            s.prev = None;
        }
        if let Some(h) = old_head {
            self.slots[h].as_mut().unwrap().prev = Some(idx);
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }
}
