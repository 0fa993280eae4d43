//! Guard and Handle for critical section management.

use crate::deferred::Deferred;
use crate::epoch::{global, Participant};
use core::cell::RefCell;
use core::marker::PhantomData;
use core::mem;

/// Local batch size that triggers a collection.
const COLLECT_THRESHOLD: usize = 64;

/// RAII guard representing an active critical section.
///
/// While a Guard exists, the thread is considered pinned and any
/// `Shared<'g, T>` pointers loaded through it are guaranteed to remain
/// valid. Pins nest; the thread unpins when the outermost guard drops.
pub struct Guard {
    participant: &'static Participant,
    // Guards belong to the pinning thread.
    _not_send: PhantomData<*mut ()>,
}

impl Drop for Guard {
    fn drop(&mut self) {
        let guards = self.participant.guards();
        let n = guards.get();
        guards.set(n - 1);
        if n == 1 {
            self.participant.clear();
        }
    }
}

/// Thread-local state: the registry record plus the batch of garbage this
/// thread has retired and not yet reclaimed.
struct Handle {
    participant: &'static Participant,
    deferred: RefCell<Vec<Deferred>>,
}

impl Handle {
    fn new() -> Self {
        Self {
            participant: global().register(),
            deferred: RefCell::new(Vec::with_capacity(COLLECT_THRESHOLD)),
        }
    }

    fn pin(&self) -> Guard {
        let guards = self.participant.guards();
        if guards.get() == 0 {
            self.participant.announce(global().epoch());
        }
        guards.set(guards.get() + 1);
        Guard {
            participant: self.participant,
            _not_send: PhantomData,
        }
    }

    fn defer(&self, entry: Deferred) {
        let mut deferred = self.deferred.borrow_mut();
        deferred.push(entry);
        if deferred.len() >= COLLECT_THRESHOLD {
            drop(deferred);
            self.collect();
        }
    }

    /// Try to advance the epoch, then reclaim every batched entry whose
    /// grace period has elapsed. Entries adopted from exited threads are
    /// folded into this thread's batch first.
    fn collect(&self) {
        let global = global();
        global.try_advance();
        let epoch = global.epoch();

        // Partition while holding the borrow, execute after releasing it: a
        // destructor may itself call `retire` on this thread.
        let mut ready = Vec::new();
        {
            let mut deferred = self.deferred.borrow_mut();
            deferred.extend(global.adopt_orphans());

            let mut kept = Vec::with_capacity(deferred.len());
            for entry in deferred.drain(..) {
                if entry.epoch() + 2 <= epoch {
                    ready.push(entry);
                } else {
                    kept.push(entry);
                }
            }
            *deferred = kept;
        }

        for entry in ready {
            // SAFETY: two epoch advances have completed since the entry was
            // retired, so no thread can still hold a reference to it.
            unsafe { entry.execute() };
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let leftovers = mem::take(&mut *self.deferred.borrow_mut());
        global().push_orphans(leftovers);
        self.participant.release();
    }
}

std::thread_local! {
    static HANDLE: Handle = Handle::new();
}

/// Enter a critical section.
///
/// Returns a [`Guard`]; while it exists, any `Shared<'g, T>` loaded through
/// it remains valid. Guards must not be created or held inside thread-local
/// destructors.
///
/// # Examples
///
/// ```rust
/// let guard = molt::pin();
/// // Access lock-free data structures safely
/// drop(guard);
/// ```
#[inline]
pub fn pin() -> Guard {
    HANDLE.with(|h| h.pin())
}

/// Retire an allocation for deferred destruction.
///
/// The pointee is dropped (via `Box::from_raw`) once every thread that could
/// have observed it has left its critical section.
///
/// # Safety
///
/// `ptr` must come from `Box::into_raw`, must already be unlinked from any
/// shared structure, and must not be passed to `retire` or freed again.
#[inline]
pub unsafe fn retire<T: Send + 'static>(ptr: *mut T) {
    // SAFETY: forwarded from the caller.
    let entry = unsafe { Deferred::new(ptr, global().retirement_epoch()) };
    HANDLE.with(|h| h.defer(entry));
}

/// Eagerly advance the epoch and reclaim whatever the calling thread's batch
/// allows. Useful in tests and teardown paths; normal operation collects
/// automatically once the batch fills up.
#[inline]
pub fn flush() {
    HANDLE.with(|h| h.collect());
}
