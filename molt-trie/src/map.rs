//! The concurrent trie map.
//!
//! Writers never lock: an operation copies every node on the root-to-leaf
//! path it touches, builds the replacement path in private memory, and
//! publishes it with a single compare-and-swap on the root edge. Interior
//! edges need no CAS, because until the root swap lands no other thread can
//! reach the copies. A losing swap frees the private copies and retries from a
//! fresh root; a winning swap retires the superseded originals through the
//! epoch collector, since readers may still be draining out of them.
//!
//! Readers never retry: published nodes are immutable, so one acquire load
//! of the root commits a traversal to a consistent snapshot.

use crate::bits::HashBits;
use crate::node::{free_subtree, Internal, Node};
use crate::table;
use core::fmt;
use core::sync::atomic::Ordering;
use molt::{pin, retire, Atomic, Shared};

/// A simple exponential backoff for the write retry loops.
struct Backoff {
    step: u32,
}

impl Backoff {
    #[inline(always)]
    fn new() -> Self {
        Self { step: 0 }
    }

    #[inline(always)]
    fn spin(&mut self) {
        for _ in 0..(1 << self.step.min(6)) {
            core::hint::spin_loop();
        }
        if self.step <= 6 {
            self.step += 1;
        }
    }
}

/// Bookkeeping for one path-copying attempt.
///
/// `fresh` holds the nodes allocated for the attempt: freed outright if the
/// root CAS loses, since nothing was published. `stale` holds the published
/// nodes the attempt supersedes: retired only after the CAS wins.
struct Revision<V, B> {
    fresh: Vec<*mut Node<V, B>>,
    stale: Vec<*mut Node<V, B>>,
}

impl<V: Send + 'static, B: HashBits> Revision<V, B> {
    fn new() -> Self {
        Self {
            fresh: Vec::new(),
            stale: Vec::new(),
        }
    }

    fn alloc(&mut self, node: Node<V, B>) -> *mut Node<V, B> {
        let ptr = node.boxed();
        self.fresh.push(ptr);
        ptr
    }

    fn supersede(&mut self, node: *mut Node<V, B>) {
        self.stale.push(node);
    }

    /// The attempt won its CAS: hand the superseded path to the collector.
    ///
    /// # Safety
    ///
    /// Every staled node must be unreachable from the new root and staled
    /// exactly once.
    unsafe fn commit(self) {
        for node in self.stale {
            // SAFETY: unlinked by the CAS; readers drain out through guards.
            unsafe { retire(node) };
        }
    }

    /// The attempt lost its CAS: nothing was published, free the copies.
    ///
    /// # Safety
    ///
    /// The root CAS must have failed, so no fresh node is reachable by any
    /// other thread.
    unsafe fn abort(self) {
        for node in self.fresh {
            // Fresh tables may point at published nodes, but dropping a node
            // releases only its own storage.
            // SAFETY: allocated by this attempt and never published.
            unsafe { drop(Box::from_raw(node)) };
        }
    }
}

/// Outcome of one level of the delete descent.
enum Deleted<V, B> {
    /// The key is not present below this node; nothing to publish.
    Absent,
    /// The node was rebuilt without the key.
    Swapped(*mut Node<V, B>),
    /// Removing the key emptied this node; the parent drops its edge instead
    /// of keeping an empty subtree.
    Pruned,
}

/// Lock-free concurrent hash array mapped trie.
///
/// Keys are byte strings; values are opaque and cloned out on reads and leaf
/// rewrites. `B` selects the hash width: `u32` gives 5-bit chunks (32-way
/// fan-out), `u64` gives 6-bit chunks (64-way fan-out). The hash is re-seeded
/// every six (respectively ten) levels, so depth is not limited by one hash
/// word.
///
/// # Examples
///
/// ```
/// use molt_trie::TrieMap64;
///
/// let map = TrieMap64::new();
/// map.put(b"hello", "world");
/// assert_eq!(map.get(b"hello"), Some("world"));
/// map.delete(b"hello");
/// assert_eq!(map.get(b"hello"), None);
/// ```
pub struct TrieMap<V, B: HashBits = u64> {
    root: Atomic<Node<V, B>>,
}

/// 32-bit-hash trie map (5-bit chunks, 32-way fan-out).
pub type TrieMap32<V> = TrieMap<V, u32>;
/// 64-bit-hash trie map (6-bit chunks, 64-way fan-out).
pub type TrieMap64<V> = TrieMap<V, u64>;

impl<V, B> TrieMap<V, B>
where
    V: Clone + Send + Sync + 'static,
    B: HashBits,
{
    /// Creates an empty map: an internal root with a zero bitmap.
    pub fn new() -> Self {
        Self {
            root: Atomic::new(Node::empty().boxed()),
        }
    }

    /// Inserts or updates `key`.
    ///
    /// Retries internally until the change is published; concurrent writers
    /// can only delay it, not fail it. The value is cloned per attempt
    /// because a losing attempt is discarded wholesale.
    pub fn put(&self, key: &[u8], value: V) {
        let mut backoff = Backoff::new();
        let guard = pin();
        loop {
            let root = self.root.load(Ordering::Acquire, &guard);
            // SAFETY: the root edge always holds a published internal node.
            let inner = unsafe { root_internal(root) };
            let mut rev = Revision::new();
            // SAFETY: `root` was loaded under `guard` from the root edge.
            let new_root = unsafe { self.put_level(root.as_raw(), inner, key, &value, 0, &mut rev) };

            match self.root.compare_exchange(
                root,
                // SAFETY: freshly built and valid; published by this CAS.
                unsafe { Shared::from_raw(new_root) },
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    // SAFETY: the CAS unlinked everything `rev` staled.
                    unsafe { rev.commit() };
                    return;
                }
                Err(_) => {
                    // SAFETY: the CAS failed; no fresh node was published.
                    unsafe { rev.abort() };
                    backoff.spin();
                }
            }
        }
    }

    /// One level of the put descent: returns the replacement for `node`,
    /// built in private memory. The caller links it into its own copy, or
    /// CAS-publishes it when `node` is the root.
    ///
    /// # Safety
    ///
    /// `node_ptr` must be a published node loaded under the current guard
    /// and `node` its internal payload.
    unsafe fn put_level(
        &self,
        node_ptr: *mut Node<V, B>,
        node: &Internal<V, B>,
        key: &[u8],
        value: &V,
        level: usize,
        rev: &mut Revision<V, B>,
    ) -> *mut Node<V, B> {
        let hash = B::hash_for_level(key, level);
        let index = hash.sparse_index(level);
        rev.supersede(node_ptr);

        if !node.bitmap.is_set(index) {
            // Empty slot: a new leaf joins this node's table.
            let leaf = rev.alloc(Node::leaf(key, value.clone()));
            let bitmap = node.bitmap.toggle(index);
            let pos = bitmap.dense_position(index);
            let children = table::extend(&node.children, bitmap, pos, leaf);
            return rev.alloc(Node::internal(bitmap, children));
        }

        let pos = node.bitmap.dense_position(index);
        let child_ptr = node.children[pos];
        // SAFETY: children of a published node are published.
        let replacement = match unsafe { &*child_ptr } {
            Node::Leaf(leaf) if leaf.key.as_ref() == key => {
                // Same key: swap in a fresh leaf carrying the new value.
                // The published leaf is never written through.
                rev.supersede(child_ptr);
                rev.alloc(Node::leaf(key, value.clone()))
            }
            Node::Leaf(leaf) => {
                // Slot taken by a different key: push both pairs one level
                // down until their indices diverge.
                rev.supersede(child_ptr);
                let moved = rev.alloc(Node::leaf(&leaf.key, leaf.value.clone()));
                let added = rev.alloc(Node::leaf(key, value.clone()));
                self.split_level(moved, &leaf.key, added, key, level + 1, rev)
            }
            // SAFETY: a published child loaded under the current guard.
            Node::Internal(child) => unsafe {
                self.put_level(child_ptr, child, key, value, level + 1, rev)
            },
        };

        let mut children = node.children.clone();
        children[pos] = replacement;
        rev.alloc(Node::internal(node.bitmap, children))
    }

    /// Builds the private chain of internal nodes separating two leaves
    /// whose sparse indices collide from `level` downward. Re-seeding
    /// supplies fresh index bits every `LEVELS_PER_SEED` levels, so distinct
    /// keys diverge eventually.
    fn split_level(
        &self,
        first: *mut Node<V, B>,
        first_key: &[u8],
        second: *mut Node<V, B>,
        second_key: &[u8],
        level: usize,
        rev: &mut Revision<V, B>,
    ) -> *mut Node<V, B> {
        let first_index = B::hash_for_level(first_key, level).sparse_index(level);
        let second_index = B::hash_for_level(second_key, level).sparse_index(level);

        if first_index == second_index {
            let child = self.split_level(first, first_key, second, second_key, level + 1, rev);
            let bitmap = B::ZERO.toggle(first_index);
            return rev.alloc(Node::internal(bitmap, vec![child]));
        }

        let bitmap = B::ZERO.toggle(first_index).toggle(second_index);
        let children = if first_index < second_index {
            vec![first, second]
        } else {
            vec![second, first]
        };
        rev.alloc(Node::internal(bitmap, children))
    }

    /// Looks up `key`, returning a clone of its value.
    ///
    /// Never retries and never blocks: the descent runs over immutable
    /// published nodes and observes the map as of its root load.
    pub fn get(&self, key: &[u8]) -> Option<V> {
        let guard = pin();
        let root = self.root.load(Ordering::Acquire, &guard);
        // SAFETY: the root edge always holds a published internal node.
        let mut node = unsafe { root_internal(root) };
        let mut level = 0;
        loop {
            let hash = B::hash_for_level(key, level);
            let index = hash.sparse_index(level);
            if !node.bitmap.is_set(index) {
                return None;
            }
            let pos = node.bitmap.dense_position(index);
            // SAFETY: children of a published node are published.
            match unsafe { &*node.children[pos] } {
                Node::Leaf(leaf) if leaf.key.as_ref() == key => return Some(leaf.value.clone()),
                Node::Leaf(_) => return None,
                Node::Internal(child) => {
                    node = child;
                    level += 1;
                }
            }
        }
    }

    /// Removes `key` if present.
    ///
    /// Deleting an absent key leaves the trie structurally unchanged and
    /// does not retry, including when the key's slot is occupied by a leaf
    /// with a different key. A delete that empties a subtree collapses it:
    /// the parent clears the bit and shrinks its table, cascading upward.
    pub fn delete(&self, key: &[u8]) {
        let mut backoff = Backoff::new();
        let guard = pin();
        loop {
            let root = self.root.load(Ordering::Acquire, &guard);
            // SAFETY: the root edge always holds a published internal node.
            let inner = unsafe { root_internal(root) };
            let mut rev = Revision::new();
            // SAFETY: `root` was loaded under `guard` from the root edge.
            let outcome = unsafe { self.delete_level(root.as_raw(), inner, key, 0, &mut rev) };
            let new_root = match outcome {
                Deleted::Absent => return,
                Deleted::Swapped(node) => node,
                // The last entry vanished: the root collapses back to the
                // empty internal node rather than being pruned away.
                Deleted::Pruned => rev.alloc(Node::empty()),
            };

            match self.root.compare_exchange(
                root,
                // SAFETY: freshly built and valid; published by this CAS.
                unsafe { Shared::from_raw(new_root) },
                Ordering::AcqRel,
                Ordering::Acquire,
                &guard,
            ) {
                Ok(_) => {
                    // SAFETY: the CAS unlinked everything `rev` staled.
                    unsafe { rev.commit() };
                    return;
                }
                Err(_) => {
                    // SAFETY: the CAS failed; no fresh node was published.
                    unsafe { rev.abort() };
                    backoff.spin();
                }
            }
        }
    }

    /// One level of the delete descent.
    ///
    /// # Safety
    ///
    /// `node_ptr` must be a published node loaded under the current guard
    /// and `node` its internal payload.
    unsafe fn delete_level(
        &self,
        node_ptr: *mut Node<V, B>,
        node: &Internal<V, B>,
        key: &[u8],
        level: usize,
        rev: &mut Revision<V, B>,
    ) -> Deleted<V, B> {
        let hash = B::hash_for_level(key, level);
        let index = hash.sparse_index(level);

        if !node.bitmap.is_set(index) {
            return Deleted::Absent;
        }

        let pos = node.bitmap.dense_position(index);
        let child_ptr = node.children[pos];
        // SAFETY: children of a published node are published.
        match unsafe { &*child_ptr } {
            Node::Leaf(leaf) if leaf.key.as_ref() == key => {
                rev.supersede(child_ptr);
                rev.supersede(node_ptr);
                self.drop_child(node, index, pos, rev)
            }
            // A different key in this slot means ours was never inserted.
            Node::Leaf(_) => Deleted::Absent,
            // SAFETY: a published child loaded under the current guard.
            Node::Internal(child) => match unsafe {
                self.delete_level(child_ptr, child, key, level + 1, rev)
            } {
                Deleted::Absent => Deleted::Absent,
                Deleted::Swapped(new_child) => {
                    rev.supersede(node_ptr);
                    let mut children = node.children.clone();
                    children[pos] = new_child;
                    Deleted::Swapped(rev.alloc(Node::internal(node.bitmap, children)))
                }
                Deleted::Pruned => {
                    rev.supersede(node_ptr);
                    self.drop_child(node, index, pos, rev)
                }
            },
        }
    }

    /// Rebuilds `node` without the child at `index`/`pos`, reporting
    /// `Pruned` when that child was the last one.
    fn drop_child(
        &self,
        node: &Internal<V, B>,
        index: usize,
        pos: usize,
        rev: &mut Revision<V, B>,
    ) -> Deleted<V, B> {
        let bitmap = node.bitmap.toggle(index);
        if bitmap == B::ZERO {
            return Deleted::Pruned;
        }
        let children = table::shrink(&node.children, bitmap, pos);
        Deleted::Swapped(rev.alloc(Node::internal(bitmap, children)))
    }

    /// The root node's bitmap: top-level occupancy, one bit per populated
    /// sparse index.
    pub fn root_bitmap(&self) -> B {
        let guard = pin();
        let root = self.root.load(Ordering::Acquire, &guard);
        // SAFETY: the root edge always holds a published internal node.
        unsafe { root_internal(root) }.bitmap
    }
}

impl<V, B> Default for TrieMap<V, B>
where
    V: Clone + Send + Sync + 'static,
    B: HashBits,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, B: HashBits> Drop for TrieMap<V, B> {
    fn drop(&mut self) {
        let guard = pin();
        let root = self.root.load(Ordering::Acquire, &guard);
        let root_raw = root.as_raw();
        drop(guard);
        // SAFETY: `&mut self` rules out concurrent readers and writers, and
        // every live node is owned by exactly one table.
        unsafe { free_subtree(root_raw) };
    }
}

impl<V, B> fmt::Debug for TrieMap<V, B>
where
    V: fmt::Debug,
    B: HashBits,
{
    /// Walks the trie, printing one line per leaf with its level and table
    /// position.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = pin();
        let root = self.root.load(Ordering::Acquire, &guard);
        // SAFETY: the root edge always holds a published internal node.
        let inner = unsafe { root_internal(root) };
        writeln!(f, "TrieMap")?;
        fmt_level(f, inner, 0)
    }
}

fn fmt_level<V: fmt::Debug, B: HashBits>(
    f: &mut fmt::Formatter<'_>,
    node: &Internal<V, B>,
    level: usize,
) -> fmt::Result {
    for (pos, &child) in node.children.iter().enumerate() {
        // SAFETY: children of a published node are published; the caller
        // holds a guard for the whole walk.
        match unsafe { &*child } {
            Node::Leaf(leaf) => writeln!(
                f,
                "level: {}, pos: {}, key: {}, value: {:?}",
                level,
                pos,
                leaf.key.escape_ascii(),
                leaf.value
            )?,
            Node::Internal(inner) => fmt_level(f, inner, level + 1)?,
        }
    }
    Ok(())
}

/// Extracts the internal payload of the root node.
///
/// # Safety
///
/// `shared` must be a published node loaded under a live guard.
unsafe fn root_internal<'g, V, B: HashBits>(shared: Shared<'g, Node<V, B>>) -> &'g Internal<V, B> {
    // SAFETY: forwarded from the caller.
    match unsafe { shared.deref() } {
        Node::Internal(inner) => inner,
        Node::Leaf(_) => unreachable!("the root is always an internal node"),
    }
}
