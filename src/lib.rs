//! Molt: epoch-based memory reclamation for lock-free data structures.
//!
//! Lock-free structures unlink nodes that concurrent readers may still be
//! traversing, so freeing an unlinked node immediately is unsound. Molt
//! defers the free until every thread that could have seen the node has left
//! its critical section.
//!
//! # Key Features
//!
//! - **Cheap Critical Sections**: entering is one store and one fence; loads
//!   inside are plain atomic loads
//! - **Lock-Free Progress**: a stalled reader only delays reclamation, it
//!   never blocks other threads
//! - **Batched Retirement**: retired nodes accumulate per thread and are
//!   reclaimed in batches once two epochs have passed
//! - **Orphan Adoption**: garbage left behind by exited threads is adopted by
//!   the next thread that collects
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::Ordering;
//! use molt::{pin, Atomic};
//!
//! let atomic = Atomic::new(Box::into_raw(Box::new(42)));
//!
//! // Enter a critical section
//! let guard = pin();
//!
//! // Loads under the guard stay valid until it drops
//! let ptr = atomic.load(Ordering::Acquire, &guard);
//!
//! unsafe {
//!     if let Some(value) = ptr.as_ref() {
//!         assert_eq!(*value, 42);
//!     }
//! }
//!
//! drop(guard);
//! ```

#![warn(missing_docs)]

mod atomic;
mod deferred;
mod epoch;
mod guard;
mod utils;

pub use atomic::{Atomic, Shared};
pub use guard::{flush, pin, retire, Guard};

// Re-export for convenience
pub use core::sync::atomic::Ordering;
