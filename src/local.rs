//! Thread-local state for reserving a hazard slot and staging retired
//! records.

use std::cell::{Cell, UnsafeCell};
use std::sync::atomic::{AtomicPtr, Ordering};
use std::thread;

use crate::config::Config;
use crate::global::GLOBAL;
use crate::hazard::HazardSlot;
use crate::retired::{RetiredRecord, RetiredSet};

thread_local! {
    static LOCAL: Local = Local::new();
    static PENDING_CONFIG: Cell<Option<Config>> = Cell::new(None);
    static LOCAL_READY: Cell<bool> = Cell::new(false);
}

/// Runs `f` with the calling thread's [`Local`] reclaimer state.
#[inline]
pub(crate) fn with_local<R>(f: impl FnOnce(&Local) -> R) -> R {
    LOCAL.with(f)
}

/// Supplies the [`Config`] the calling thread's reclaimer will use once it
/// lazily initializes on this thread's first queue operation.
///
/// There is one reclaimer domain per thread, shared by every [`Queue`]
/// the thread touches, so a [`Config`] applies to the whole thread rather
/// than to a single queue. Returns `true` if the calling thread's
/// reclaimer had not yet been initialized and `config` was staged to take
/// effect; returns `false`, with no effect, if the thread already has a
/// running reclaimer (it defaulted, or an earlier call already won).
///
/// [`Queue`]: crate::Queue
pub fn init_config(config: Config) -> bool {
    if LOCAL_READY.with(Cell::get) {
        return false;
    }
    PENDING_CONFIG.with(|cell| cell.set(Some(config)));
    true
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Local
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Per-thread reclaimer: one claimed hazard slot plus a staging area for
/// records this thread has detached from the queue.
pub(crate) struct Local {
    inner: UnsafeCell<LocalInner>,
}

struct LocalInner {
    slot: &'static HazardSlot,
    retired: RetiredSet,
    scan_cache: Vec<*mut ()>,
    config: Config,
}

impl Local {
    fn new() -> Self {
        LOCAL_READY.with(|ready| ready.set(true));
        let config = PENDING_CONFIG.with(|cell| cell.take()).unwrap_or_default();
        let slot = GLOBAL.acquire_slot();
        Self {
            inner: UnsafeCell::new(LocalInner {
                slot,
                retired: RetiredSet::new(config.initial_retired_capacity()),
                scan_cache: Vec::new(),
                config,
            }),
        }
    }

    /// The load-publish-reload-compare idiom: publishes a hazard for
    /// whatever `source` currently points to, then confirms the publication
    /// happened before `source` could have changed again, retrying if not.
    ///
    /// Any retire of the returned pointer that could still race this call is
    /// guaranteed to observe the published hazard in its next scan.
    pub(crate) fn protect<T>(&self, source: &AtomicPtr<T>) -> *mut T {
        let inner = unsafe { &mut *self.inner.get() };
        loop {
            let ptr = source.load(Ordering::Acquire);
            inner.slot.set_protected(ptr as *mut ());
            let reloaded = source.load(Ordering::Acquire);
            if reloaded == ptr {
                return ptr;
            }
        }
    }

    /// Clears this thread's published hazard.
    pub(crate) fn unmark(&self) {
        let inner = unsafe { &*self.inner.get() };
        inner.slot.set_protected(std::ptr::null_mut());
    }

    /// Stages `ptr` for reclamation and opportunistically scans if the
    /// retire set has grown past the configured threshold.
    ///
    /// # Safety
    ///
    /// `ptr` must be exclusively owned by the calling thread (logically
    /// detached from the queue) and must never be dereferenced by this
    /// thread again.
    pub(crate) unsafe fn retire<T>(&self, ptr: *mut T) {
        let inner = unsafe { &mut *self.inner.get() };
        inner.retired.push(unsafe { RetiredRecord::new(ptr) });

        let registry_len = GLOBAL.registry_len();
        if inner.retired.len() > inner.config.scan_threshold(registry_len) {
            Self::scan(inner);
        }
    }

    fn scan(inner: &mut LocalInner) {
        GLOBAL.collect_protected(&mut inner.scan_cache);
        inner.scan_cache.sort_unstable();
        inner.retired.retain_hazarded(&inner.scan_cache);
    }
}

impl Drop for Local {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();

        debug_assert!(
            inner.slot.protected(Ordering::Relaxed).is_null(),
            "thread exiting with a live hazard still published"
        );
        inner.slot.release();

        // Busy-wait-drain: the only blocking operation in this crate. Every
        // record here is owned exclusively by this thread; it is never
        // handed off to another thread's retire set or a global pool, so
        // this thread alone is responsible for seeing it through to
        // deletion before it may exit.
        while let Some(record) = inner.retired.pop() {
            while GLOBAL.hazards_contain(record.address()) {
                thread::yield_now();
            }
            unsafe { record.reclaim() };
        }
    }
}
