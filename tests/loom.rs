//! Exhaustive interleaving check of the protect/retire/scan protocol on a
//! reduced model: one hazard slot, one protector, one retirer, sharing a
//! single address. The full `Queue<T>` isn't modeled directly here — doing
//! so would mean threading `loom`'s atomic types through every module in
//! this crate, which is a much larger rewrite than the protocol itself
//! warrants — so this isolates exactly the part of the design whose safety
//! argument depends on memory ordering: `Local::protect`'s
//! load-publish-reload-compare idiom against `Global::collect_protected`'s
//! fence-then-scan idiom — the pair a scan's safety argument rests on.
//!
//! Run with:
//! `RUSTFLAGS="--cfg loom" cargo test --release --test loom`

#[cfg(loom)]
mod model {
    use std::ptr;

    use loom::sync::atomic::{fence, AtomicBool, AtomicPtr, Ordering};
    use loom::sync::Arc;
    use loom::thread;

    /// If this ever observes `true`, a scan concluded a node was safe to
    /// reclaim while a protector was still inside the window between
    /// stabilizing its hazard and unmarking it — the exact race the
    /// protect/retire/scan protocol exists to rule out.
    #[test]
    fn scan_never_races_a_stabilized_hazard() {
        loom::model(|| {
            let raw = 0xdead_beef_usize as *mut ();

            let source = Arc::new(AtomicPtr::new(raw));
            let slot = Arc::new(AtomicPtr::<()>::new(ptr::null_mut()));
            let in_critical_section = Arc::new(AtomicBool::new(false));
            let unsafe_reclaim = Arc::new(AtomicBool::new(false));

            let protector = {
                let source = Arc::clone(&source);
                let slot = Arc::clone(&slot);
                let in_critical_section = Arc::clone(&in_critical_section);
                thread::spawn(move || {
                    // Local::protect's load-publish-reload-compare idiom.
                    let ptr = loop {
                        let p = source.load(Ordering::Acquire);
                        slot.store(p, Ordering::SeqCst);
                        if source.load(Ordering::Acquire) == p {
                            break p;
                        }
                    };

                    if !ptr.is_null() {
                        in_critical_section.store(true, Ordering::Release);
                        in_critical_section.store(false, Ordering::Release);
                    }

                    // unmark
                    slot.store(ptr::null_mut(), Ordering::SeqCst);
                })
            };

            let retirer = {
                let source = Arc::clone(&source);
                let slot = Arc::clone(&slot);
                let in_critical_section = Arc::clone(&in_critical_section);
                let unsafe_reclaim = Arc::clone(&unsafe_reclaim);
                thread::spawn(move || {
                    // detach: the head-CAS/swap that logically removes the node
                    let detached = source.swap(ptr::null_mut(), Ordering::AcqRel);
                    if detached.is_null() {
                        return;
                    }

                    // Global::collect_protected's fence-then-scan idiom.
                    fence(Ordering::SeqCst);
                    let published = slot.load(Ordering::SeqCst);

                    if published != detached && in_critical_section.load(Ordering::Acquire) {
                        unsafe_reclaim.store(true, Ordering::Release);
                    }
                })
            };

            protector.join().unwrap();
            retirer.join().unwrap();

            assert!(
                !unsafe_reclaim.load(Ordering::Acquire),
                "scan treated the node as unprotected while a hazard was still being stabilized for it"
            );
        });
    }
}
