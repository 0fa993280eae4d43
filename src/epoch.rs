//! Global epoch, participant registry, and orphaned garbage.
//!
//! Every thread that touches a molt-protected structure owns a `Participant`
//! record in a global lock-free registry. While the thread is inside a
//! critical section its record announces the epoch it entered in; the epoch
//! can only advance when no announced epoch lags behind, which is what turns
//! "two epochs have passed" into "no thread can still hold this pointer".
//!
//! Records are never deallocated. A thread that exits releases its record for
//! reuse and pushes any garbage it still owes onto the orphan list, where the
//! next collecting thread adopts it.

use crate::deferred::Deferred;
use crate::utils::CacheAligned;
use core::cell::Cell;
use core::ptr;
use core::sync::atomic::{self, AtomicBool, AtomicPtr, AtomicUsize, Ordering};

/// Low bit of `Participant::state`: set while the thread is pinned.
pub(crate) const PINNED: usize = 1;

/// One registry record per live thread.
///
/// `state` holds `(epoch << 1) | PINNED` inside a critical section and `0`
/// outside. `guards` counts nested pins and is only ever touched by the
/// owning thread.
pub(crate) struct Participant {
    state: AtomicUsize,
    in_use: AtomicBool,
    next: AtomicPtr<Participant>,
    guards: Cell<usize>,
}

// SAFETY: `guards` is owner-thread-only by protocol; every cross-thread field
// is atomic.
unsafe impl Sync for Participant {}

impl Participant {
    fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
            in_use: AtomicBool::new(true),
            next: AtomicPtr::new(ptr::null_mut()),
            guards: Cell::new(0),
        }
    }

    /// Announce entry into a critical section at `epoch`.
    ///
    /// The `SeqCst` fence orders the announcement before any subsequent load
    /// from the protected structure: either a collector sees the pin and
    /// refuses to advance, or this thread sees every unlink that the advance
    /// justified.
    pub(crate) fn announce(&self, epoch: usize) {
        self.state.store((epoch << 1) | PINNED, Ordering::Relaxed);
        atomic::fence(Ordering::SeqCst);
    }

    /// Leave the critical section.
    pub(crate) fn clear(&self) {
        self.state.store(0, Ordering::Release);
    }

    pub(crate) fn guards(&self) -> &Cell<usize> {
        &self.guards
    }

    /// Release the record for reuse by a future thread.
    pub(crate) fn release(&self) {
        self.state.store(0, Ordering::Release);
        self.in_use.store(false, Ordering::Release);
    }
}

/// A batch of garbage abandoned by an exiting thread.
struct OrphanBag {
    items: Vec<Deferred>,
    next: *mut OrphanBag,
}

// SAFETY: `Deferred` is `Send` and the list link is only handed over through
// atomic exchanges.
unsafe impl Send for OrphanBag {}

/// Process-wide reclamation state.
pub(crate) struct Global {
    epoch: CacheAligned<AtomicUsize>,
    participants: AtomicPtr<Participant>,
    orphans: AtomicPtr<OrphanBag>,
}

static GLOBAL: Global = Global::new();

pub(crate) fn global() -> &'static Global {
    &GLOBAL
}

impl Global {
    const fn new() -> Self {
        Self {
            epoch: CacheAligned::new(AtomicUsize::new(0)),
            participants: AtomicPtr::new(ptr::null_mut()),
            orphans: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Current epoch, suitable for announcing a pin.
    pub(crate) fn epoch(&self) -> usize {
        self.epoch.load(Ordering::Relaxed)
    }

    /// Epoch stamp for a retirement.
    ///
    /// The fence keeps the stamp from predating the epoch that was current
    /// when the caller unlinked the allocation; a stale-low stamp would let
    /// the grace period end one epoch early.
    pub(crate) fn retirement_epoch(&self) -> usize {
        atomic::fence(Ordering::SeqCst);
        self.epoch.load(Ordering::Relaxed)
    }

    /// Claim a registry record, reusing a released one when possible.
    pub(crate) fn register(&self) -> &'static Participant {
        let mut curr = self.participants.load(Ordering::Acquire);
        while !curr.is_null() {
            // SAFETY: registry records are never deallocated.
            let record = unsafe { &*curr };
            if record
                .in_use
                .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                return record;
            }
            curr = record.next.load(Ordering::Acquire);
        }

        let record = Box::into_raw(Box::new(Participant::new()));
        loop {
            let head = self.participants.load(Ordering::Acquire);
            // SAFETY: `record` is unpublished until the CAS below succeeds.
            unsafe { (*record).next.store(head, Ordering::Relaxed) };
            if self
                .participants
                .compare_exchange(head, record, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                // SAFETY: now published and immortal.
                return unsafe { &*record };
            }
        }
    }

    /// Advance the epoch if no pinned thread still announces an older one.
    pub(crate) fn try_advance(&self) {
        let epoch = self.epoch.load(Ordering::Relaxed);
        atomic::fence(Ordering::SeqCst);

        let mut curr = self.participants.load(Ordering::Acquire);
        while !curr.is_null() {
            // SAFETY: registry records are never deallocated.
            let record = unsafe { &*curr };
            let state = record.state.load(Ordering::Relaxed);
            if state & PINNED != 0 && state >> 1 != epoch {
                return;
            }
            curr = record.next.load(Ordering::Acquire);
        }

        let _ = self.epoch.compare_exchange(
            epoch,
            epoch + 1,
            Ordering::SeqCst,
            Ordering::Relaxed,
        );
    }

    /// Steal the entire orphan list.
    pub(crate) fn adopt_orphans(&self) -> Vec<Deferred> {
        let mut head = self.orphans.swap(ptr::null_mut(), Ordering::Acquire);
        let mut items = Vec::new();
        while !head.is_null() {
            // SAFETY: the swap above made this thread the sole owner of the
            // list.
            let bag = unsafe { Box::from_raw(head) };
            head = bag.next;
            items.extend(bag.items);
        }
        items
    }

    /// Hand a batch of garbage to whichever thread collects next.
    pub(crate) fn push_orphans(&self, items: Vec<Deferred>) {
        if items.is_empty() {
            return;
        }
        let bag = Box::into_raw(Box::new(OrphanBag {
            items,
            next: ptr::null_mut(),
        }));
        loop {
            let head = self.orphans.load(Ordering::Acquire);
            // SAFETY: `bag` is unpublished until the CAS below succeeds.
            unsafe { (*bag).next = head };
            if self
                .orphans
                .compare_exchange(head, bag, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_registrations_get_distinct_records() {
        let a = global().register();
        let b = global().register();
        assert!(!ptr::eq(a, b));
        a.release();
        b.release();
    }

    #[test]
    fn advance_blocked_by_lagging_pin() {
        let record = global().register();

        // Re-announce until the announcement matches the current epoch, so
        // concurrent advances from other tests cannot slip in between.
        let pinned_at = loop {
            let epoch = global().epoch();
            record.announce(epoch);
            if global().epoch() == epoch {
                break epoch;
            }
        };

        // A pin at the current epoch allows exactly one advance past it.
        for _ in 0..8 {
            global().try_advance();
        }
        assert!(global().epoch() <= pinned_at + 1);

        record.clear();
        record.release();
    }
}
