//! Process-wide shared state for hazard-pointer based reclamation.

use std::sync::atomic::{self, Ordering::SeqCst};

use crate::hazard::{HazardList, HazardSlot};

/// The single static instance of the hazard slot registry, shared by every
/// thread in the process.
pub(crate) static GLOBAL: Global = Global::new();

////////////////////////////////////////////////////////////////////////////////////////////////////
// Global
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Global data required for hazard-pointer based memory reclamation.
#[derive(Debug)]
pub(crate) struct Global {
    hazards: HazardList,
}

impl Global {
    #[inline]
    pub const fn new() -> Self {
        Self { hazards: HazardList::new() }
    }

    /// Claims a hazard slot for the calling thread.
    #[inline]
    pub fn acquire_slot(&'static self) -> &'static HazardSlot {
        self.hazards.acquire_slot()
    }

    /// Approximate number of slots currently allocated (`H`).
    #[inline]
    pub fn registry_len(&'static self) -> usize {
        self.hazards.approx_len().max(1)
    }

    /// Linear scan for a single address, used by the thread-exit drain.
    /// Unlike [`Self::collect_protected`], this doesn't build a snapshot
    /// vector: the drain loop re-checks just one address, repeatedly, until
    /// it clears.
    #[inline]
    pub fn hazards_contain(&'static self, addr: *mut ()) -> bool {
        if addr.is_null() {
            return false;
        }
        atomic::fence(SeqCst);
        self.hazards.iter().any(|slot| slot.protected(SeqCst) == addr)
    }

    /// Collects every currently published hazard into `out`, replacing its
    /// previous contents.
    ///
    /// The `SeqCst` fence here synchronizes-with every `SeqCst` publish of a
    /// hazard: together they guarantee a scan cannot miss a hazard that was
    /// published before the scan began.
    #[inline]
    pub fn collect_protected(&'static self, out: &mut Vec<*mut ()>) {
        out.clear();
        atomic::fence(SeqCst);

        for slot in self.hazards.iter() {
            let protected = slot.protected(SeqCst);
            if !protected.is_null() {
                out.push(protected);
            }
        }
    }
}
