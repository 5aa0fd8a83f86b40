//! A grow-only, iterable lock-free data structure for storing hazard slots.

use std::iter::FusedIterator;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use super::HazardSlot;

/// The number of hazard slots packed into one array node of the registry.
const ELEMENTS: usize = 32;

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardList
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A linked list of [`HazardArrayNode`]s containing re-usable hazard slots.
///
/// When a thread requests a slot, the list is traversed from head to tail and
/// each node is searched for a free slot. If none can be found, a new node is
/// appended to the list's tail. The list never shrinks, which is what spares
/// it from needing a reclamation scheme of its own.
#[derive(Debug)]
pub(crate) struct HazardList {
    head: AtomicPtr<HazardArrayNode>,
    /// Approximate number of slots ever allocated; used only to size the
    /// scan-threshold heuristic, never for correctness.
    len: AtomicUsize,
}

impl HazardList {
    #[inline]
    pub const fn new() -> Self {
        Self { head: AtomicPtr::new(ptr::null_mut()), len: AtomicUsize::new(0) }
    }

    /// Finds a free slot and claims it, allocating a new array node if every
    /// existing node is fully claimed.
    #[cold]
    pub fn acquire_slot(&self) -> &HazardSlot {
        loop {
            let mut curr = self.head.load(Ordering::Acquire);
            while !curr.is_null() {
                let node = unsafe { &*curr };
                for slot in &node.slots {
                    if slot.try_claim() {
                        return slot;
                    }
                }
                curr = node.next.load(Ordering::Acquire);
            }

            self.grow();
        }
    }

    /// Returns an iterator over every allocated slot, claimed or not.
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter { curr: unsafe { self.head.load(Ordering::Acquire).as_ref() }, idx: 0 }
    }

    /// Approximate count of slots ever allocated (`H` in the scan-threshold
    /// formula).
    #[inline]
    pub fn approx_len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Appends a new, fully free array node to the tail of the list.
    fn grow(&self) {
        let node = Box::into_raw(Box::new(HazardArrayNode::new()));

        let mut tail = &self.head as *const AtomicPtr<HazardArrayNode>;
        loop {
            let curr = unsafe { (*tail).load(Ordering::Acquire) };
            if curr.is_null() {
                if unsafe {
                    (*tail)
                        .compare_exchange(ptr::null_mut(), node, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                } {
                    self.len.fetch_add(ELEMENTS, Ordering::Relaxed);
                    return;
                }
                // someone else linked a node first; re-read and keep walking
                continue;
            }
            tail = unsafe { &(*curr).next as *const _ };
        }
    }
}

impl Drop for HazardList {
    /// Frees every allocated node. Only sound with no concurrent access,
    /// i.e. never for the process-wide static registry, only for tests that
    /// build their own private [`HazardList`].
    fn drop(&mut self) {
        let mut curr = *self.head.get_mut();
        while !curr.is_null() {
            let node = unsafe { Box::from_raw(curr) };
            curr = node.next.load(Ordering::Relaxed);
        }
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Iter
////////////////////////////////////////////////////////////////////////////////////////////////////

pub(crate) struct Iter<'a> {
    curr: Option<&'a HazardArrayNode>,
    idx: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a HazardSlot;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.curr?;
            if self.idx < ELEMENTS {
                let idx = self.idx;
                self.idx += 1;
                return Some(&node.slots[idx]);
            }

            self.curr = unsafe { node.next.load(Ordering::Acquire).as_ref() };
            self.idx = 0;
        }
    }
}

impl FusedIterator for Iter<'_> {}

////////////////////////////////////////////////////////////////////////////////////////////////////
// HazardArrayNode
////////////////////////////////////////////////////////////////////////////////////////////////////

struct HazardArrayNode {
    slots: [HazardSlot; ELEMENTS],
    next: AtomicPtr<Self>,
}

impl HazardArrayNode {
    fn new() -> Self {
        Self { slots: std::array::from_fn(|_| HazardSlot::new()), next: AtomicPtr::new(ptr::null_mut()) }
    }
}
