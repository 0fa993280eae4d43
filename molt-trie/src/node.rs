//! Trie node model.
//!
//! A node is either a leaf carrying one key/value pair or an internal node
//! carrying a bitmap plus the dense child table. Published nodes are
//! shared-immutable: every edit copies the node, and child pointers are only
//! dereferenced under a reclamation guard or with exclusive access.
//!
//! Nodes do not own their children: dropping a `Node` releases its own
//! key/value/table storage only. Path copying depends on this: a superseded
//! copy shares child pointers with its replacement.

use crate::bits::HashBits;

pub(crate) struct Leaf<V> {
    pub(crate) key: Box<[u8]>,
    pub(crate) value: V,
}

pub(crate) struct Internal<V, B> {
    pub(crate) bitmap: B,
    pub(crate) children: Vec<*mut Node<V, B>>,
}

pub(crate) enum Node<V, B> {
    Leaf(Leaf<V>),
    Internal(Internal<V, B>),
}

// SAFETY: published nodes are immutable and child pointers are plain data;
// cross-thread access is mediated by the atomic root edge and guards.
unsafe impl<V: Send, B: Send> Send for Node<V, B> {}
unsafe impl<V: Sync, B: Sync> Sync for Node<V, B> {}

impl<V, B: HashBits> Node<V, B> {
    pub(crate) fn leaf(key: &[u8], value: V) -> Self {
        Node::Leaf(Leaf {
            key: key.into(),
            value,
        })
    }

    pub(crate) fn internal(bitmap: B, children: Vec<*mut Node<V, B>>) -> Self {
        Node::Internal(Internal { bitmap, children })
    }

    pub(crate) fn empty() -> Self {
        Self::internal(B::ZERO, Vec::new())
    }

    pub(crate) fn boxed(self) -> *mut Self {
        Box::into_raw(Box::new(self))
    }
}

/// Free `node` and every node reachable below it.
///
/// # Safety
///
/// The caller must have exclusive access to the subtree (no concurrent
/// readers or writers) and every node in it must be owned exactly once.
pub(crate) unsafe fn free_subtree<V, B>(node: *mut Node<V, B>) {
    // SAFETY: exclusive ownership per the contract.
    let boxed = unsafe { Box::from_raw(node) };
    if let Node::Internal(internal) = &*boxed {
        for &child in &internal.children {
            // SAFETY: children of an exclusively owned subtree are owned by
            // it; each appears in exactly one table.
            unsafe { free_subtree(child) };
        }
    }
}
