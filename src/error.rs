//! Error types for the storage engine.

use crate::types::PageId;
use thiserror::Error;

/// Result type alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur in the storage engine.
#[derive(Error, Debug)]
pub enum StorageError {
    /// I/O error from the underlying file system.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A node's serialized form exceeds one page. Indicates an order /
    /// page-size mismatch; fatal, since it means pages written this way
    /// would never round-trip.
    #[error("node for page {page_id} serializes to {size} bytes, page holds {capacity}")]
    PageOverflow {
        page_id: PageId,
        size: usize,
        capacity: usize,
    },

    /// Requested page is out of the file's allocated range.
    #[error("page {0} not found")]
    PageNotFound(PageId),

    /// An operation was attempted after the engine (or its disk manager)
    /// was closed.
    #[error("engine is closed")]
    EngineClosed,
}

impl StorageError {
    /// Build a [`StorageError::PageOverflow`].
    pub fn overflow(page_id: PageId, size: usize, capacity: usize) -> Self {
        Self::PageOverflow {
            page_id,
            size,
            capacity,
        }
    }
}
