//! Page-resident node model: the in-memory form of a leaf or internal
//! B+Tree node, plus its on-disk wire format.
//!
//! Layout (big-endian, zero-padded to the page size):
//!
//! ```text
//! offset  size  field
//!  0      1     is_leaf        (0 or 1)
//!  1      8     next           (i64; -1 if none)
//!  9      4     key_count      (i32)
//! 13      8*k   keys[0..k)
//! 13+8k   8*k           values[0..k)   if leaf
//!         8*(k+1)       children[0..=k] if internal
//! ```
//!
//! There is no version, checksum, or page-type tag beyond `is_leaf`: this
//! matches the format described by the file's invariants exactly, so pages
//! written by one run remain readable by the next.

use crate::error::{Result, StorageError};
use crate::types::PageId;

const IS_LEAF_OFFSET: usize = 0;
const NEXT_OFFSET: usize = 1;
const KEY_COUNT_OFFSET: usize = 9;
const KEYS_OFFSET: usize = 13;

/// A leaf or internal page-resident node.
///
/// A sum type mirrors the wire format's own discriminator (`is_leaf`) and
/// keeps the leaf-only (`values`) and internal-only (`children`) payloads
/// from ever coexisting in memory.
#[derive(Debug, Clone)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// A leaf node: `keys[i]` maps to `values[i]`, and `next` chains to the
/// following leaf in ascending key order (or [`PageId::NONE`] if this is
/// the last leaf).
#[derive(Debug, Clone)]
pub struct LeafNode {
    pub page_id: PageId,
    pub keys: Vec<i64>,
    pub values: Vec<i64>,
    pub next: PageId,
    pub dirty: bool,
}

/// An internal node: for `keys[i]`, every key in the subtree under
/// `children[i]` is `< keys[i]`, and every key under `children[i + 1]` is
/// `>= keys[i]`. With `key_count` keys there are `key_count + 1` live
/// children.
#[derive(Debug, Clone)]
pub struct InternalNode {
    pub page_id: PageId,
    pub keys: Vec<i64>,
    pub children: Vec<PageId>,
    pub dirty: bool,
}

impl Node {
    /// Create a fresh, empty leaf node for a newly allocated page.
    pub fn new_leaf(page_id: PageId) -> Self {
        Node::Leaf(LeafNode {
            page_id,
            keys: Vec::new(),
            values: Vec::new(),
            next: PageId::NONE,
            dirty: true,
        })
    }

    /// Create a fresh internal node with one key and two children, for a
    /// newly grown root.
    pub fn new_internal(page_id: PageId, key: i64, left: PageId, right: PageId) -> Self {
        Node::Internal(InternalNode {
            page_id,
            keys: vec![key],
            children: vec![left, right],
            dirty: true,
        })
    }

    pub fn page_id(&self) -> PageId {
        match self {
            Node::Leaf(n) => n.page_id,
            Node::Internal(n) => n.page_id,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn key_count(&self) -> usize {
        match self {
            Node::Leaf(n) => n.keys.len(),
            Node::Internal(n) => n.keys.len(),
        }
    }

    pub fn keys(&self) -> &[i64] {
        match self {
            Node::Leaf(n) => &n.keys,
            Node::Internal(n) => &n.keys,
        }
    }

    pub fn dirty(&self) -> bool {
        match self {
            Node::Leaf(n) => n.dirty,
            Node::Internal(n) => n.dirty,
        }
    }

    pub fn set_dirty(&mut self, dirty: bool) {
        match self {
            Node::Leaf(n) => n.dirty = dirty,
            Node::Internal(n) => n.dirty = dirty,
        }
    }

    /// Serialize this node into a page-sized, zero-padded buffer.
    ///
    /// Fails with [`StorageError::PageOverflow`] if the encoded form does
    /// not fit in `page_size` bytes.
    pub fn serialize(&self, page_size: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; page_size];

        let (is_leaf, key_count, body_len) = match self {
            Node::Leaf(n) => (
                true,
                n.keys.len(),
                KEYS_OFFSET + 8 * n.keys.len() + 8 * n.values.len(),
            ),
            Node::Internal(n) => (
                false,
                n.keys.len(),
                KEYS_OFFSET + 8 * n.keys.len() + 8 * n.children.len(),
            ),
        };

        if body_len > page_size {
            return Err(StorageError::overflow(self.page_id(), body_len, page_size));
        }

        buf[IS_LEAF_OFFSET] = is_leaf as u8;

        let next = match self {
            Node::Leaf(n) => n.next,
            Node::Internal(_) => PageId::NONE,
        };
        buf[NEXT_OFFSET..NEXT_OFFSET + 8].copy_from_slice(&next.value().to_be_bytes());
        buf[KEY_COUNT_OFFSET..KEY_COUNT_OFFSET + 4]
            .copy_from_slice(&(key_count as i32).to_be_bytes());

        let keys = self.keys();
        let mut offset = KEYS_OFFSET;
        for &key in keys {
            buf[offset..offset + 8].copy_from_slice(&key.to_be_bytes());
            offset += 8;
        }

        match self {
            Node::Leaf(n) => {
                for &value in &n.values {
                    buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
                    offset += 8;
                }
            }
            Node::Internal(n) => {
                for &child in &n.children {
                    buf[offset..offset + 8].copy_from_slice(&child.value().to_be_bytes());
                    offset += 8;
                }
            }
        }

        Ok(buf)
    }

    /// Deserialize a node from a page-sized buffer read from disk.
    ///
    /// `page_size` bounds how many bytes are available to read; the node's
    /// own `key_count` determines how many entries are actually live.
    pub fn deserialize(page_id: PageId, bytes: &[u8]) -> Result<Self> {
        let is_leaf = bytes[IS_LEAF_OFFSET] != 0;
        let next = PageId::new(i64::from_be_bytes(
            bytes[NEXT_OFFSET..NEXT_OFFSET + 8].try_into().unwrap(),
        ));
        let key_count = i32::from_be_bytes(
            bytes[KEY_COUNT_OFFSET..KEY_COUNT_OFFSET + 4]
                .try_into()
                .unwrap(),
        ) as usize;

        let mut offset = KEYS_OFFSET;
        let mut keys = Vec::with_capacity(key_count);
        for _ in 0..key_count {
            keys.push(i64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap()));
            offset += 8;
        }

        if is_leaf {
            let mut values = Vec::with_capacity(key_count);
            for _ in 0..key_count {
                values.push(i64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap()));
                offset += 8;
            }
            Ok(Node::Leaf(LeafNode {
                page_id,
                keys,
                values,
                next,
                dirty: false,
            }))
        } else {
            let mut children = Vec::with_capacity(key_count + 1);
            for _ in 0..=key_count {
                children.push(PageId::new(i64::from_be_bytes(
                    bytes[offset..offset + 8].try_into().unwrap(),
                )));
                offset += 8;
            }
            Ok(Node::Internal(InternalNode {
                page_id,
                keys,
                children,
                dirty: false,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PAGE_SIZE;

    #[test]
    fn test_leaf_roundtrip() {
        let mut node = Node::new_leaf(PageId::new(3));
        if let Node::Leaf(ref mut n) = node {
            n.keys = vec![1, 2, 3];
            n.values = vec![10, 20, 30];
            n.next = PageId::new(7);
        }

        let bytes = node.serialize(PAGE_SIZE).unwrap();
        assert_eq!(bytes.len(), PAGE_SIZE);

        let restored = Node::deserialize(PageId::new(3), &bytes).unwrap();
        match restored {
            Node::Leaf(n) => {
                assert_eq!(n.keys, vec![1, 2, 3]);
                assert_eq!(n.values, vec![10, 20, 30]);
                assert_eq!(n.next, PageId::new(7));
                assert!(!n.dirty);
            }
            Node::Internal(_) => panic!("expected leaf"),
        }
    }

    #[test]
    fn test_internal_roundtrip() {
        let node = Node::new_internal(PageId::new(5), 42, PageId::new(1), PageId::new(2));
        let bytes = node.serialize(PAGE_SIZE).unwrap();
        let restored = Node::deserialize(PageId::new(5), &bytes).unwrap();
        match restored {
            Node::Internal(n) => {
                assert_eq!(n.keys, vec![42]);
                assert_eq!(n.children, vec![PageId::new(1), PageId::new(2)]);
            }
            Node::Leaf(_) => panic!("expected internal"),
        }
    }

    #[test]
    fn test_overflow_is_detected() {
        let mut node = Node::new_leaf(PageId::new(1));
        if let Node::Leaf(ref mut n) = node {
            n.keys = (0..2000).collect();
            n.values = (0..2000).collect();
        }
        assert!(matches!(
            node.serialize(PAGE_SIZE),
            Err(StorageError::PageOverflow { .. })
        ));
    }

    #[test]
    fn test_empty_leaf_roundtrip() {
        let node = Node::new_leaf(PageId::new(1));
        let bytes = node.serialize(PAGE_SIZE).unwrap();
        let restored = Node::deserialize(PageId::new(1), &bytes).unwrap();
        assert_eq!(restored.key_count(), 0);
        assert!(restored.is_leaf());
    }
}
