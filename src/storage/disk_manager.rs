//! Fixed-size page file: page allocation, node (de)serialization, and the
//! root pointer kept in the reserved metadata page.
//!
//! Page 0 stores only the current root page id, as an 8-byte big-endian
//! `i64` at offset 0. Every other page holds one serialized [`Node`].

use crate::error::{Result, StorageError};
use crate::node::Node;
use crate::types::PageId;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Owns the backing file: page allocation, node (de)serialization, and the
/// metadata page's root pointer.
///
/// All operations serialize through a single [`parking_lot::Mutex`] guarding
/// the file handle, since reads and writes both reposition the shared file
/// cursor. The engine's own usage model is single-threaded (see the crate's
/// concurrency notes); the lock exists so the type is `Send + Sync`, not to
/// support concurrent callers.
pub struct DiskManager {
    file: Mutex<File>,
    page_size: usize,
    closed: AtomicBool,
}

impl DiskManager {
    /// Open the page file at `path`, creating it (with just the metadata
    /// page reserved) if it does not exist or is empty.
    pub fn open(path: &Path, page_size: usize) -> Result<Self> {
        let is_new = path
            .metadata()
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;

        if is_new {
            file.set_len(page_size as u64)?;
            log::debug!("created fresh page file at {}", path.display());
        }

        Ok(Self {
            file: Mutex::new(file),
            page_size,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::EngineClosed);
        }
        Ok(())
    }

    /// True iff the file holds only the metadata page.
    pub fn is_fresh(&self) -> Result<bool> {
        self.ensure_open()?;
        let file = self.file.lock();
        Ok(file.metadata()?.len() == self.page_size as u64)
    }

    /// Allocate a fresh page at the end of the file and return its id.
    ///
    /// The new page's contents are unspecified until a subsequent
    /// [`DiskManager::write_node`] for that id.
    pub fn allocate_page(&self) -> Result<PageId> {
        self.ensure_open()?;
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        let page_id = PageId::new((len / self.page_size as u64) as i64);
        file.set_len(len + self.page_size as u64)?;
        log::trace!("allocated page {page_id}");
        Ok(page_id)
    }

    /// Persist the current root page id to the metadata page.
    pub fn write_root_page(&self, root: PageId) -> Result<()> {
        self.ensure_open()?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&root.value().to_be_bytes())?;
        Ok(())
    }

    /// Read the root page id from the metadata page.
    pub fn read_root_page(&self) -> Result<PageId> {
        self.ensure_open()?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(0))?;
        let mut buf = [0u8; 8];
        file.read_exact(&mut buf)?;
        Ok(PageId::new(i64::from_be_bytes(buf)))
    }

    /// Serialize `node` and write it to its own page, zero-padded to
    /// `page_size`.
    ///
    /// Fails with [`StorageError::PageOverflow`] if the node does not fit in
    /// one page — a misconfigured order relative to page size.
    pub fn write_node(&self, node: &Node) -> Result<()> {
        self.ensure_open()?;
        let bytes = node.serialize(self.page_size)?;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(node.page_id().file_offset(self.page_size)))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Read and deserialize the node resident at `page_id`.
    ///
    /// `order` is accepted to mirror the operation's specified signature;
    /// the wire format's own `key_count` field is what actually determines
    /// how many entries are live, so no caller-supplied bound is needed to
    /// decode correctly.
    pub fn read_node(&self, page_id: PageId, _order: usize) -> Result<Node> {
        self.ensure_open()?;
        let mut file = self.file.lock();
        let len = file.metadata()?.len();
        if page_id.file_offset(self.page_size) + self.page_size as u64 > len {
            return Err(StorageError::PageNotFound(page_id));
        }

        let mut buf = vec![0u8; self.page_size];
        file.seek(SeekFrom::Start(page_id.file_offset(self.page_size)))?;
        file.read_exact(&mut buf)?;
        drop(file);
        Node::deserialize(page_id, &buf)
    }

    /// Close the file. Further operations fail with
    /// [`StorageError::EngineClosed`].
    pub fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        log::debug!("disk manager closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PAGE_SIZE;
    use tempfile::tempdir;

    fn open(dir: &tempfile::TempDir) -> DiskManager {
        let _ = env_logger::try_init();
        DiskManager::open(&dir.path().join("test.db"), PAGE_SIZE).unwrap()
    }

    #[test]
    fn test_fresh_file_has_one_page() {
        let dir = tempdir().unwrap();
        let dm = open(&dir);
        assert!(dm.is_fresh().unwrap());
    }

    #[test]
    fn test_allocate_page_starts_at_one_and_extends_file() {
        let dir = tempdir().unwrap();
        let dm = open(&dir);
        let first = dm.allocate_page().unwrap();
        assert_eq!(first, PageId::new(1));
        let second = dm.allocate_page().unwrap();
        assert_eq!(second, PageId::new(2));
        assert!(!dm.is_fresh().unwrap());
    }

    #[test]
    fn test_root_page_round_trips() {
        let dir = tempdir().unwrap();
        let dm = open(&dir);
        dm.write_root_page(PageId::new(7)).unwrap();
        assert_eq!(dm.read_root_page().unwrap(), PageId::new(7));
    }

    #[test]
    fn test_node_round_trips_through_disk() {
        let dir = tempdir().unwrap();
        let dm = open(&dir);
        let page_id = dm.allocate_page().unwrap();
        let mut node = Node::new_leaf(page_id);
        if let Node::Leaf(ref mut n) = node {
            n.keys = vec![1, 2, 3];
            n.values = vec![10, 20, 30];
        }
        dm.write_node(&node).unwrap();

        let restored = dm.read_node(page_id, 254).unwrap();
        assert_eq!(restored.keys(), &[1, 2, 3]);
    }

    #[test]
    fn test_reading_an_unallocated_page_is_rejected() {
        let dir = tempdir().unwrap();
        let dm = open(&dir);
        assert!(matches!(
            dm.read_node(PageId::new(5), 254),
            Err(StorageError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_operations_fail_after_close() {
        let dir = tempdir().unwrap();
        let dm = open(&dir);
        dm.close().unwrap();
        assert!(matches!(
            dm.allocate_page(),
            Err(StorageError::EngineClosed)
        ));
    }
}
