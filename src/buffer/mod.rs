//! Buffer cache: a capacity-bounded LRU cache of in-memory nodes with a
//! dirty-flush-on-evict policy and hit/miss/eviction accounting.

mod cache;

pub use cache::BufferCache;
