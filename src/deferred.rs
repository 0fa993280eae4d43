//! Type-erased deferred destruction entries.

/// A retired allocation waiting out its grace period.
///
/// Carries the raw pointer, a monomorphized destructor, and the epoch the
/// owner was retired in. The entry may be executed by a thread other than the
/// one that created it (orphan adoption), hence the `Send` bound enforced at
/// the [`retire`](crate::retire) boundary.
pub(crate) struct Deferred {
    ptr: *mut u8,
    drop_fn: unsafe fn(*mut u8),
    epoch: usize,
}

// SAFETY: the pointee is `Send` (checked by `retire`) and ownership of the
// allocation transfers with the entry.
unsafe impl Send for Deferred {}

impl Deferred {
    /// Wrap `ptr` for deferred destruction, stamped with `epoch`.
    ///
    /// # Safety
    ///
    /// `ptr` must come from `Box::into_raw` and must not be used again except
    /// through [`execute`](Self::execute).
    pub(crate) unsafe fn new<T>(ptr: *mut T, epoch: usize) -> Self {
        unsafe fn drop_boxed<T>(ptr: *mut u8) {
            // SAFETY: `ptr` was produced by `Box::into_raw` on a `T` and this
            // destructor runs exactly once.
            unsafe { drop(Box::from_raw(ptr as *mut T)) };
        }

        Self {
            ptr: ptr as *mut u8,
            drop_fn: drop_boxed::<T>,
            epoch,
        }
    }

    /// The epoch this entry was retired in.
    pub(crate) fn epoch(&self) -> usize {
        self.epoch
    }

    /// Run the destructor.
    ///
    /// # Safety
    ///
    /// The grace period must have elapsed: no thread may still hold a
    /// reference obtained before the allocation was unlinked.
    pub(crate) unsafe fn execute(self) {
        // SAFETY: caller guarantees the pointee is unreachable.
        unsafe { (self.drop_fn)(self.ptr) };
    }
}
