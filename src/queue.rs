//! The lock-free, hazard-pointer reclaimed MPMC FIFO queue.

use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};

use crate::local;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

struct Node<T> {
    payload: AtomicPtr<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    fn allocate() -> *mut Self {
        Box::into_raw(Box::new(Self { payload: AtomicPtr::new(ptr::null_mut()), next: AtomicPtr::new(ptr::null_mut()) }))
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Queue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free, unbounded, multi-producer/multi-consumer FIFO queue.
///
/// The queue always contains at least one node: a dummy whose payload has
/// either never been set or has already been consumed. Detached nodes are
/// reclaimed through a hazard-pointer scheme, so no node is ever freed while
/// a concurrent reader might still dereference it.
pub struct Queue<T> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
    size: AtomicUsize,
}

unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> Queue<T> {
    /// Creates a new, empty queue.
    pub fn new() -> Self {
        let dummy = Node::allocate();
        Self { head: AtomicPtr::new(dummy), tail: AtomicPtr::new(dummy), size: AtomicUsize::new(0) }
    }

    /// Appends `value` to the tail of the queue. Never blocks and never
    /// fails (short of allocation failure, which is fatal to the process).
    pub fn push(&self, value: T) {
        let payload = Box::into_raw(Box::new(value));
        let mut spare = Node::allocate();

        local::with_local(|local| loop {
            let tail_ptr = local.protect(&self.tail);
            let tail = unsafe { &*tail_ptr };

            match tail.payload.compare_exchange(ptr::null_mut(), payload, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => {
                    // We own this tail slot now. Link our spare node as its
                    // successor, unless a helper has already done so.
                    if tail.next.compare_exchange(ptr::null_mut(), spare, Ordering::Release, Ordering::Relaxed).is_ok() {
                        let _ = self.tail.compare_exchange(tail_ptr, spare, Ordering::Release, Ordering::Relaxed);
                    } else {
                        // A helper beat us to it; our spare is unused.
                        drop(unsafe { Box::from_raw(spare) });
                    }
                    self.size.fetch_add(1, Ordering::Relaxed);
                    local.unmark();
                    return;
                }
                Err(_) => {
                    // Another producer claimed this tail slot but may not
                    // have linked its successor yet. Help them finish, then
                    // retry our own enqueue from a fresh tail.
                    if tail.next.compare_exchange(ptr::null_mut(), spare, Ordering::Release, Ordering::Relaxed).is_ok() {
                        let _ = self.tail.compare_exchange(tail_ptr, spare, Ordering::Release, Ordering::Relaxed);
                        spare = Node::allocate();
                    }
                }
            }
        });
    }

    /// Removes and returns the element at the head of the queue, or `None`
    /// if the queue was observably empty.
    pub fn pop(&self) -> Option<T> {
        local::with_local(|local| loop {
            let head_ptr = local.protect(&self.head);
            let tail_ptr = self.tail.load(Ordering::Acquire);

            if head_ptr == tail_ptr {
                local.unmark();
                return None;
            }

            let head = unsafe { &*head_ptr };
            let next_ptr = head.next.load(Ordering::Acquire);

            if self.head.compare_exchange(head_ptr, next_ptr, Ordering::Release, Ordering::Relaxed).is_err() {
                continue;
            }

            self.size.fetch_sub(1, Ordering::Relaxed);

            let payload_ptr = head.payload.load(Ordering::Acquire);
            debug_assert!(!payload_ptr.is_null(), "advanced head node had no payload");
            let value = unsafe { *Box::from_raw(payload_ptr) };

            local.unmark();
            unsafe { local.retire(head_ptr) };

            return Some(value);
        })
    }

    /// Approximate number of elements currently queued. Relaxed and
    /// advisory; not a synchronization point.
    pub fn len(&self) -> usize {
        self.size.load(Ordering::Relaxed)
    }

    /// Returns `true` if the queue was observably empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
        // Exactly one node remains: the current dummy. No concurrent access
        // is possible at this point, so it is freed directly rather than
        // routed through the reclaimer.
        let dummy = *self.head.get_mut();
        drop(unsafe { Box::from_raw(dummy) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn single_threaded_fifo_order() {
        let queue = Queue::new();
        for i in 0..5 {
            queue.push(i);
        }
        for i in 0..5 {
            assert_eq!(queue.pop(), Some(i));
        }
        assert_eq!(queue.pop(), None);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn two_producers_drain_after() {
        let queue = Arc::new(Queue::new());

        let q1 = Arc::clone(&queue);
        let t1 = thread::spawn(move || {
            for i in 0..1000 {
                q1.push(i);
            }
        });

        let q2 = Arc::clone(&queue);
        let t2 = thread::spawn(move || {
            for i in 1000..2000 {
                q2.push(i);
            }
        });

        t1.join().unwrap();
        t2.join().unwrap();

        let mut seen = Vec::new();
        while let Some(value) = queue.pop() {
            seen.push(value);
        }

        assert_eq!(seen.len(), 2000);
        let mut sorted = seen.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 2000, "no value was delivered twice");

        let first_half: Vec<_> = seen.iter().copied().filter(|v| *v < 1000).collect();
        let second_half: Vec<_> = seen.iter().copied().filter(|v| *v >= 1000).collect();
        assert!(first_half.windows(2).all(|w| w[0] < w[1]));
        assert!(second_half.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn concurrent_mixed_conservation() {
        const PER_PRODUCER: usize = 20_000;
        const PRODUCERS: usize = 4;

        let queue = Arc::new(Queue::new());
        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.push(p * PER_PRODUCER + i);
                    }
                })
            })
            .collect();

        for p in producers {
            p.join().unwrap();
        }

        let total = PRODUCERS * PER_PRODUCER;
        let consumed = Arc::new(std::sync::Mutex::new(Vec::with_capacity(total)));

        let consumers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let consumed = Arc::clone(&consumed);
                thread::spawn(move || {
                    let mut local = Vec::new();
                    while let Some(v) = queue.pop() {
                        local.push(v);
                    }
                    consumed.lock().unwrap().extend(local);
                })
            })
            .collect();

        for c in consumers {
            c.join().unwrap();
        }

        assert_eq!(queue.len(), 0);
        let mut all = consumed.lock().unwrap().clone();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn destructor_drains_move_only_elements() {
        struct DropCounter(Arc<AtomicUsize>);
        impl Drop for DropCounter {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let count = Arc::new(AtomicUsize::new(0));
        let queue = Queue::new();
        for _ in 0..1000 {
            queue.push(DropCounter(Arc::clone(&count)));
        }
        drop(queue);
        assert_eq!(count.load(Ordering::Relaxed), 1000);
    }

    #[test]
    fn churned_threads_leave_queue_empty() {
        let queue = Arc::new(Queue::new());

        for _ in 0..64 {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..1000 {
                    queue.push(i);
                }
                for _ in 0..1000 {
                    let _ = queue.pop();
                }
            })
            .join()
            .unwrap();
        }

        assert_eq!(queue.len(), 0);
        assert!(queue.pop().is_none());
    }
}
