//! The B+Tree engine: owns the current root page id and implements
//! insertion, point lookup, splitting, and the two informational
//! traversals over a [`BufferCache`] and [`DiskManager`].

use crate::buffer::BufferCache;
use crate::error::{Result, StorageError};
use crate::node::{InternalNode, LeafNode, Node};
use crate::storage::DiskManager;
use crate::types::{BTreeConfig, PageId};
use std::path::Path;
use std::sync::Arc;

/// Result of a node split: the key promoted to the parent, and the page id
/// of the freshly allocated right sibling.
struct Split {
    key: i64,
    right: PageId,
}

/// An on-disk B+Tree index keyed by `i64`, with `i64` payloads.
///
/// Single-threaded cooperative usage model: callers must not interleave
/// `insert`/`search`/`close` calls from multiple threads, even though the
/// underlying [`BufferCache`] happens to expose `Send + Sync` operations.
pub struct BTreeEngine {
    disk: Arc<DiskManager>,
    cache: BufferCache,
    root_page_id: PageId,
    order: usize,
    closed: bool,
}

impl BTreeEngine {
    /// Open a fresh index at `path`, deleting any pre-existing file.
    ///
    /// This makes the engine a single-session index (see the crate's design
    /// notes): there is currently no way to reopen a previously populated
    /// file and resume inserting into it. `cache_bytes` is converted to an
    /// entry capacity of at least 1 (`cache_bytes / PAGE_SIZE`).
    pub fn open<P: AsRef<Path>>(path: P, cache_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        let config = BTreeConfig::new(cache_bytes);
        let disk = Arc::new(DiskManager::open(path, config.page_size)?);
        let order = config.order();
        let capacity = config.cache_capacity();

        let disk_for_evict = Arc::clone(&disk);
        let cache = BufferCache::new(capacity, move |node| disk_for_evict.write_node(&node));

        let root_page_id = if disk.is_fresh()? {
            let root_id = disk.allocate_page()?;
            cache.put(root_id, Node::new_leaf(root_id))?;
            disk.write_root_page(root_id)?;
            root_id
        } else {
            disk.read_root_page()?
        };

        log::debug!("opened engine at {} (order={order}, cache capacity={capacity})", path.display());

        Ok(Self {
            disk,
            cache,
            root_page_id,
            order,
            closed: false,
        })
    }

    /// The derived order: the maximum number of keys a node may hold
    /// without splitting.
    pub fn order(&self) -> usize {
        self.order
    }

    /// The buffer cache backing this engine, for observability
    /// (`hits`/`misses`/`evictions`/`hit_rate`).
    pub fn cache(&self) -> &BufferCache {
        &self.cache
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StorageError::EngineClosed);
        }
        Ok(())
    }

    fn load(&self, page_id: PageId) -> Result<Node> {
        if let Some(node) = self.cache.get(page_id) {
            return Ok(node);
        }
        let node = self.disk.read_node(page_id, self.order)?;
        self.cache.put(page_id, node.clone())?;
        Ok(node)
    }

    /// Look up `key`, descending right on an exact internal match (the
    /// search path always routes into the subtree a leaf split promoted
    /// from — see `insert`'s descent note).
    pub fn search(&self, key: i64) -> Result<Option<i64>> {
        self.ensure_open()?;
        let mut page_id = self.root_page_id;
        loop {
            match self.load(page_id)? {
                Node::Internal(n) => {
                    page_id = match n.keys.binary_search(&key) {
                        Ok(i) => n.children[i + 1],
                        Err(i) => n.children[i],
                    };
                }
                Node::Leaf(n) => {
                    return Ok(match n.keys.binary_search(&key) {
                        Ok(i) => Some(n.values[i]),
                        Err(_) => None,
                    });
                }
            }
        }
    }

    /// Insert `key` with `value`, overwriting any existing value for `key`.
    ///
    /// Recurses to the target leaf, inserts or updates in place, then lets
    /// `insert_into` propagate any split back up. A split that reaches the
    /// root grows the tree by one level and persists the new root id to the
    /// metadata page.
    pub fn insert(&mut self, key: i64, value: i64) -> Result<()> {
        self.ensure_open()?;
        if let Some(split) = self.insert_into(self.root_page_id, key, value)? {
            let new_root_id = self.disk.allocate_page()?;
            let new_root = Node::new_internal(new_root_id, split.key, self.root_page_id, split.right);
            self.cache.put(new_root_id, new_root)?;
            self.root_page_id = new_root_id;
            self.disk.write_root_page(new_root_id)?;
            log::debug!("root grew to page {new_root_id} (promoted key {})", split.key);
        }
        Ok(())
    }

    fn insert_into(&mut self, page_id: PageId, key: i64, value: i64) -> Result<Option<Split>> {
        let mut node = self.load(page_id)?;

        // Matching an internal key descends left: new keys never exact-match
        // one, and an update that does still finds the right leaf because a
        // leaf's first key equals the separator promoted at split time.
        let descend = match &mut node {
            Node::Leaf(leaf) => {
                match leaf.keys.binary_search(&key) {
                    Ok(idx) => leaf.values[idx] = value,
                    Err(idx) => {
                        leaf.keys.insert(idx, key);
                        leaf.values.insert(idx, value);
                    }
                }
                None
            }
            Node::Internal(internal) => {
                let child_idx = internal.keys.binary_search(&key).unwrap_or_else(|i| i);
                Some((child_idx, internal.children[child_idx]))
            }
        };

        if let Some((child_idx, child_id)) = descend {
            if let Some(split) = self.insert_into(child_id, key, value)? {
                if let Node::Internal(internal) = &mut node {
                    internal.keys.insert(child_idx, split.key);
                    internal.children.insert(child_idx + 1, split.right);
                }
            }
        }

        node.set_dirty(true);

        if node.key_count() > self.order {
            Ok(Some(self.split(node)?))
        } else {
            self.cache.put(page_id, node)?;
            Ok(None)
        }
    }

    /// Split an overfull node at `mid = key_count / 2`, allocating a fresh
    /// right sibling and persisting both halves.
    fn split(&mut self, mut node: Node) -> Result<Split> {
        let right_page_id = self.disk.allocate_page()?;
        let mid = node.key_count() / 2;
        let page_id = node.page_id();

        let split = match &mut node {
            Node::Leaf(leaf) => {
                log::debug!("splitting leaf {page_id} at mid={mid}");
                let right_keys = leaf.keys.split_off(mid);
                let right_values = leaf.values.split_off(mid);
                let promoted = right_keys[0];
                let right = Node::Leaf(LeafNode {
                    page_id: right_page_id,
                    keys: right_keys,
                    values: right_values,
                    next: leaf.next,
                    dirty: true,
                });
                leaf.next = right_page_id;
                self.cache.put(right_page_id, right)?;
                Split { key: promoted, right: right_page_id }
            }
            Node::Internal(internal) => {
                log::debug!("splitting internal {page_id} at mid={mid}");
                let mut right_keys = internal.keys.split_off(mid);
                let promoted = right_keys.remove(0);
                let right_children = internal.children.split_off(mid + 1);
                let right = Node::Internal(InternalNode {
                    page_id: right_page_id,
                    keys: right_keys,
                    children: right_children,
                    dirty: true,
                });
                self.cache.put(right_page_id, right)?;
                Split { key: promoted, right: right_page_id }
            }
        };

        node.set_dirty(true);
        self.cache.put(page_id, node)?;
        Ok(split)
    }

    /// Flush every dirty node and close the backing file. The engine is
    /// unusable afterward.
    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.cache.flush_all()?;
        self.disk.close()?;
        self.closed = true;
        Ok(())
    }

    fn leftmost_leaf(&self) -> Result<PageId> {
        let mut page_id = self.root_page_id;
        loop {
            match self.load(page_id)? {
                Node::Leaf(_) => return Ok(page_id),
                Node::Internal(n) => page_id = n.children[0],
            }
        }
    }

    /// DFS dump of the tree from the root, for verification only.
    pub fn print_tree(&self) -> Result<String> {
        self.ensure_open()?;
        let mut out = String::new();
        self.print_node(self.root_page_id, 0, &mut out)?;
        Ok(out)
    }

    fn print_node(&self, page_id: PageId, indent: usize, out: &mut String) -> Result<()> {
        let pad = "  ".repeat(indent);
        match self.load(page_id)? {
            Node::Leaf(n) => {
                out.push_str(&format!("{pad}Leaf({page_id}) keys={:?} next={}\n", n.keys, n.next));
            }
            Node::Internal(n) => {
                out.push_str(&format!("{pad}Internal({page_id}) keys={:?}\n", n.keys));
                for child in n.children {
                    self.print_node(child, indent + 1, out)?;
                }
            }
        }
        Ok(())
    }

    /// Dump the leaf chain in ascending key order, for verification only.
    pub fn print_leaves(&self) -> Result<String> {
        self.ensure_open()?;
        let mut out = String::new();
        let mut page_id = self.leftmost_leaf()?;
        loop {
            match self.load(page_id)? {
                Node::Leaf(n) => {
                    out.push_str(&format!("Leaf({page_id}) keys={:?}\n", n.keys));
                    if !n.next.is_some() {
                        break;
                    }
                    page_id = n.next;
                }
                Node::Internal(_) => break,
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn engine(dir: &tempfile::TempDir, cache_bytes: usize) -> BTreeEngine {
        let _ = env_logger::try_init();
        BTreeEngine::open(dir.path().join("test.db"), cache_bytes).unwrap()
    }

    #[test]
    fn test_empty_tree_search_misses() {
        let dir = tempdir().unwrap();
        let engine = engine(&dir, 4096 * 1000);
        assert_eq!(engine.search(1).unwrap(), None);
    }

    #[test]
    fn test_insert_then_search_round_trips() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir, 4096 * 1000);
        engine.insert(1, 100).unwrap();
        engine.insert(2, 200).unwrap();
        assert_eq!(engine.search(1).unwrap(), Some(100));
        assert_eq!(engine.search(2).unwrap(), Some(200));
        assert_eq!(engine.search(3).unwrap(), None);
    }

    #[test]
    fn test_reinsert_overwrites_value() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir, 4096 * 1000);
        engine.insert(5, 1).unwrap();
        engine.insert(5, 2).unwrap();
        assert_eq!(engine.search(5).unwrap(), Some(2));
    }

    #[test]
    fn test_split_at_order_plus_one_grows_chain() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir, 4096 * 1000);
        let order = engine.order() as i64;
        for i in 1..=(order + 1) {
            engine.insert(i, i * 100).unwrap();
        }
        for i in 1..=(order + 1) {
            assert_eq!(engine.search(i).unwrap(), Some(i * 100));
        }

        let mid = (order + 1) / 2;
        let leaves = engine.print_leaves().unwrap();
        let lines: Vec<&str> = leaves.lines().collect();
        assert_eq!(lines.len(), 2, "expected exactly two leaves, got: {leaves}");

        let left_keys: Vec<i64> = (1..=mid).collect();
        let right_keys: Vec<i64> = (mid + 1..=order + 1).collect();
        assert!(lines[0].ends_with(&format!("keys={left_keys:?}")));
        assert!(lines[1].ends_with(&format!("keys={right_keys:?}")));

        let tree = engine.print_tree().unwrap();
        let first_line = tree.lines().next().unwrap();
        assert!(first_line.starts_with("Internal"));
        assert!(first_line.contains(&format!("keys=[{}]", mid + 1)));
    }

    #[test]
    fn test_reverse_order_insert_stays_valid() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir, 4096 * 1000);
        for i in (1..=10).rev() {
            engine.insert(i, i).unwrap();
        }
        for i in 1..=10 {
            assert_eq!(engine.search(i).unwrap(), Some(i));
        }
    }

    #[test]
    fn test_close_then_operate_fails() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir, 4096 * 1000);
        engine.insert(1, 1).unwrap();
        engine.close().unwrap();
        assert!(matches!(engine.search(1), Err(StorageError::EngineClosed)));
    }

    #[test]
    fn test_capacity_one_cache_still_completes_many_inserts() {
        let dir = tempdir().unwrap();
        let mut engine = engine(&dir, 512);
        for i in 1..=1000 {
            engine.insert(i, i * 100).unwrap();
        }
        for i in [1, 500, 1000] {
            assert_eq!(engine.search(i).unwrap(), Some(i * 100));
        }
        assert!(engine.cache().evictions() >= 999);
        let rate = engine.cache().hit_rate();
        assert!(rate > 0.0 && rate < 1.0);
    }
}
