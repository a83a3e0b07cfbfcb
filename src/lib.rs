//! # btree-index
//!
//! An on-disk B+Tree index keyed by fixed 64-bit integers, with 64-bit
//! integer payloads. Durable, page-based storage of an ordered key→value
//! map: point insertion, point lookup, and ordered traversal via the
//! leaf-level sibling chain.
//!
//! ## Architecture
//!
//! - **Storage layer** (`storage`): [`DiskManager`] owns the backing page
//!   file, page allocation, and node (de)serialization.
//! - **Buffer layer** (`buffer`): [`BufferCache`] is a capacity-bounded LRU
//!   cache of in-memory nodes with a dirty-flush-on-evict policy.
//! - **B+Tree layer** (`btree`): [`BTreeEngine`] implements descent, binary
//!   search, splits, promotion, and root growth over the two layers above.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use btree_index::BTreeEngine;
//!
//! # fn main() -> btree_index::Result<()> {
//! let mut engine = BTreeEngine::open("my_index.db", 4096 * 1000)?;
//!
//! engine.insert(1, 100)?;
//! engine.insert(2, 200)?;
//! assert_eq!(engine.search(1)?, Some(100));
//! assert_eq!(engine.search(3)?, None);
//!
//! engine.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Non-goals
//!
//! Deletion, range iteration beyond the raw leaf chain, multi-writer
//! concurrency, WAL/checkpointing, compression, and variable-length
//! keys/values are all out of scope. See [`BTreeEngine::open`]'s docs for
//! the fresh-on-open behavior this implies.

pub mod btree;
pub mod buffer;
pub mod error;
pub mod node;
pub mod storage;
pub mod types;

pub use btree::BTreeEngine;
pub use buffer::BufferCache;
pub use error::{Result, StorageError};
pub use node::Node;
pub use storage::DiskManager;
pub use types::{BTreeConfig, PageId, PAGE_SIZE};
