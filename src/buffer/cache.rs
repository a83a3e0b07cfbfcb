//! LRU cache of [`Node`]s keyed by page id.
//!
//! Recency is tracked with an intrusive doubly-linked list over a flat
//! `Vec` of slots, extended to hold the cached node itself and to call back
//! into the disk manager when a dirty entry is evicted.

use crate::error::Result;
use crate::node::Node;
use crate::types::PageId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

struct Slot {
    page_id: PageId,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner {
    nodes: HashMap<PageId, Node>,
    positions: HashMap<PageId, usize>,
    slots: Vec<Slot>,
    free_slots: Vec<usize>,
    /// Most-recently-used end of the list.
    head: Option<usize>,
    /// Least-recently-used end of the list; the next eviction victim.
    tail: Option<usize>,
}

impl Inner {
    fn new(capacity: usize) -> Self {
        Self {
            nodes: HashMap::with_capacity(capacity),
            positions: HashMap::with_capacity(capacity),
            slots: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn unlink(&mut self, pos: usize) {
        let (prev, next) = (self.slots[pos].prev, self.slots[pos].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
    }

    fn push_front(&mut self, pos: usize) {
        self.slots[pos].prev = None;
        self.slots[pos].next = self.head;
        if let Some(old_head) = self.head {
            self.slots[old_head].prev = Some(pos);
        }
        self.head = Some(pos);
        if self.tail.is_none() {
            self.tail = Some(pos);
        }
    }

    /// Move an already-linked slot to the MRU end.
    fn touch(&mut self, pos: usize) {
        if self.head == Some(pos) {
            return;
        }
        self.unlink(pos);
        self.push_front(pos);
    }

    /// Link a brand-new page id at the MRU end, returning its slot index.
    fn insert_new(&mut self, page_id: PageId) -> usize {
        let pos = if let Some(pos) = self.free_slots.pop() {
            self.slots[pos] = Slot {
                page_id,
                prev: None,
                next: None,
            };
            pos
        } else {
            let pos = self.slots.len();
            self.slots.push(Slot {
                page_id,
                prev: None,
                next: None,
            });
            pos
        };
        self.push_front(pos);
        self.positions.insert(page_id, pos);
        pos
    }

    /// Unlink and free the LRU slot, returning the page id it held.
    fn evict_lru_slot(&mut self) -> Option<PageId> {
        let pos = self.tail?;
        self.unlink(pos);
        let page_id = self.slots[pos].page_id;
        self.positions.remove(&page_id);
        self.free_slots.push(pos);
        Some(page_id)
    }
}

/// Capacity-bounded LRU cache of nodes, with a caller-supplied callback
/// invoked synchronously on eviction of a dirty entry.
///
/// Access order governs recency: both `get` (on a hit) and `put` (fresh
/// insert or update) promote an entry to most-recently-used. A `put` that is
/// an update of an existing key never evicts.
pub struct BufferCache {
    capacity: usize,
    inner: Mutex<Inner>,
    on_evict: Box<dyn Fn(Node) -> Result<()> + Send + Sync>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl BufferCache {
    /// Create a cache holding at most `capacity` entries (clamped to at
    /// least 1). `on_evict` is called once per dirty entry evicted, either
    /// by `put` displacing the LRU entry or by `flush_all`.
    pub fn new<F>(capacity: usize, on_evict: F) -> Self
    where
        F: Fn(Node) -> Result<()> + Send + Sync + 'static,
    {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner::new(capacity)),
            on_evict: Box::new(on_evict),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a cached node, promoting it to MRU on a hit.
    pub fn get(&self, page_id: PageId) -> Option<Node> {
        let mut inner = self.inner.lock();
        if let Some(&pos) = inner.positions.get(&page_id) {
            inner.touch(pos);
            self.hits.fetch_add(1, Ordering::Relaxed);
            inner.nodes.get(&page_id).cloned()
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            None
        }
    }

    /// Insert or update a cached node.
    ///
    /// An update of an existing key promotes to MRU without evicting. A
    /// fresh insert at capacity evicts the LRU entry first (flushing it if
    /// dirty) before linking the new entry at MRU.
    pub fn put(&self, page_id: PageId, node: Node) -> Result<()> {
        let mut inner = self.inner.lock();

        if let Some(&pos) = inner.positions.get(&page_id) {
            inner.touch(pos);
            inner.nodes.insert(page_id, node);
            return Ok(());
        }

        if inner.nodes.len() >= self.capacity {
            if let Some(evicted_id) = inner.evict_lru_slot() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                if let Some(evicted) = inner.nodes.remove(&evicted_id) {
                    if evicted.dirty() {
                        (self.on_evict)(evicted)?;
                    }
                }
            }
        }

        inner.insert_new(page_id);
        inner.nodes.insert(page_id, node);
        Ok(())
    }

    /// Flush every dirty cached node via the eviction callback, then clear
    /// the cache. Counters are preserved.
    pub fn flush_all(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        for node in inner.nodes.values() {
            if node.dirty() {
                (self.on_evict)(node.clone())?;
            }
        }
        *inner = Inner::new(self.capacity);
        Ok(())
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Fraction of lookups that were hits, in `[0.0, 1.0]`. Defined as `0.0`
    /// when no lookups have happened yet.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let misses = self.misses() as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}
