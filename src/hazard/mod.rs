//! Data structures and functionality for temporarily protecting specific
//! pointers acquired by specific threads from concurrent reclamation.
//!
//! # Global List
//!
//! All hazard slots are stored in a global linked list. This list can never
//! remove and deallocate any of its entries, since this would require some
//! scheme for concurrent memory reclamation on its own. Consequently, this
//! linked list can only grow for the entire program runtime and is never
//! actually dropped in normal operation. However, its individual entries can
//! be reused arbitrarily often.
//!
//! # Hazard Slots
//!
//! A slot pairs a claim flag (is some thread currently using this slot?)
//! with one published address. Whenever a thread is about to dereference a
//! pointer it loaded from shared memory, it first publishes that pointer in
//! its own slot. Any thread retiring a record must scan every slot in the
//! list before the record may be reclaimed.

mod list;

use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};

pub(crate) use self::list::HazardList;

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardSlot
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One slot in the global hazard slot registry.
#[derive(Debug)]
pub(crate) struct HazardSlot {
    claimed: AtomicBool,
    protected: AtomicPtr<()>,
}

impl HazardSlot {
    #[inline]
    const fn new() -> Self {
        Self { claimed: AtomicBool::new(false), protected: AtomicPtr::new(ptr::null_mut()) }
    }

    /// Attempts to claim this (currently free) slot for the calling thread.
    #[inline]
    fn try_claim(&self) -> bool {
        self.claimed.compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed).is_ok()
    }

    /// Publishes `ptr` as the calling thread's current hazard, or clears the
    /// slot if `ptr` is null.
    ///
    /// This must use `SeqCst`: a concurrent scan's fence synchronizes-with
    /// this store, which is what guarantees a scan cannot miss a hazard
    /// published before the scan began.
    #[inline]
    pub(crate) fn set_protected(&self, ptr: *mut ()) {
        self.protected.store(ptr, Ordering::SeqCst);
    }

    #[inline]
    pub(crate) fn protected(&self, order: Ordering) -> *mut () {
        self.protected.load(order)
    }

    /// Returns the slot to the free pool. The slot itself is never freed.
    #[inline]
    pub(crate) fn release(&self) {
        debug_assert!(
            self.protected(Ordering::Relaxed).is_null(),
            "releasing a hazard slot that still protects a pointer"
        );
        self.claimed.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_and_release() {
        let slot = HazardSlot::new();
        assert!(slot.try_claim());
        assert!(!slot.try_claim());
        slot.set_protected(ptr::null_mut());
        slot.release();
        assert!(slot.try_claim());
    }

    #[test]
    fn publish_and_clear() {
        let slot = HazardSlot::new();
        let value = 7_u8;
        let addr = &value as *const u8 as *mut ();
        slot.set_protected(addr);
        assert_eq!(slot.protected(Ordering::SeqCst), addr);
        slot.set_protected(ptr::null_mut());
        assert!(slot.protected(Ordering::SeqCst).is_null());
    }
}
