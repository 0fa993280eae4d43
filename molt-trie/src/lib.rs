//! Lock-free concurrent hash array mapped trie.
//!
//! A HAMT keyed by byte strings: each level consumes a chunk of the key's
//! hash as a sparse index into a bitmap, and children are packed densely in
//! popcount order so empty slots cost nothing. Writers copy the path they
//! touch and publish it with one compare-and-swap on the root; readers
//! traverse immutable published nodes and never retry. Superseded nodes are
//! reclaimed through [`molt`]'s epoch collector.
//!
//! # Key Features
//!
//! - **Lock-Free Writers**: path copying plus a root CAS; contention costs
//!   retries, never blocking
//! - **Wait-Free-Style Readers**: one acquire load commits a traversal to a
//!   consistent snapshot
//! - **Reproducible Hashing**: bit-exact MurmurHash3-style mixers, re-seeded
//!   as the trie deepens, exposed in [`murmur`] for verification
//! - **Two Widths**: 32-bit hashing with 32-way fan-out, or 64-bit with
//!   64-way, chosen by type parameter
//!
//! # Example
//!
//! ```
//! use molt_trie::TrieMap64;
//! use std::sync::Arc;
//! use std::thread;
//!
//! let map = Arc::new(TrieMap64::new());
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let map = Arc::clone(&map);
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 let key = format!("{t}-{i}");
//!                 map.put(key.as_bytes(), i);
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! assert_eq!(map.get(b"3-99"), Some(99));
//! ```

#![warn(missing_docs)]

mod bits;
mod map;
pub mod murmur;
mod node;
mod table;

pub use bits::HashBits;
pub use map::{TrieMap, TrieMap32, TrieMap64};
