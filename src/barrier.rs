//! Barrier Engine: a sense-reversing two-phase barrier.
//!
//! Grounded on `source/barrier.c`'s local-barrier allocation (one counter and
//! one sense flag per barrier, each cache-line isolated) and its wait
//! sequence: increment, and either reset-and-flip (last arrival) or spin on
//! the flipped sense (everyone else). A session holds three independent
//! instances of this type: the per-task local barrier, the session-wide
//! global barrier, and a completely separate internal barrier the
//! orchestrator uses for its own spawn/teardown handshake, so that user code
//! calling the public barrier functions can never desynchronize bootstrap.

use crate::cache::CachePadded;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub(crate) struct Barrier {
    count: CachePadded<AtomicUsize>,
    sense: CachePadded<AtomicBool>,
    total: usize,
}

thread_local! {
    // Keyed by barrier identity rather than carried on the caller's identity
    // record, since a single thread waits on three distinct barriers (local,
    // global, internal) over the life of a session.
    static LOCAL_SENSE: RefCell<HashMap<usize, bool>> = RefCell::new(HashMap::new());
}

impl Barrier {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            count: CachePadded::new(AtomicUsize::new(0)),
            sense: CachePadded::new(AtomicBool::new(false)),
            total,
        }
    }

    fn flip_local_sense(&self) -> bool {
        let key = self as *const _ as usize;
        LOCAL_SENSE.with(|map| {
            let mut map = map.borrow_mut();
            let entry = map.entry(key).or_insert(false);
            *entry = !*entry;
            *entry
        })
    }

    /// Blocks until `total` threads have called `wait` on this barrier,
    /// then releases all of them together. Reusable across rounds.
    pub(crate) fn wait(&self) {
        let target = self.flip_local_sense();
        let arrived = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == self.total {
            self.count.store(0, Ordering::Release);
            self.sense.store(target, Ordering::Release);
        } else {
            while self.sense.load(Ordering::Acquire) != target {
                std::hint::spin_loop();
            }
        }
    }

    /// Like `wait`, but returns the number of cycles this thread spent
    /// spinning. The thread that completes the barrier (the last to arrive)
    /// never spins and always returns 0.
    pub(crate) fn wait_timed(&self) -> u64 {
        let target = self.flip_local_sense();
        let start = crate::cycles::now();
        let arrived = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived == self.total {
            self.count.store(0, Ordering::Release);
            self.sense.store(target, Ordering::Release);
            0
        } else {
            while self.sense.load(Ordering::Acquire) != target {
                std::hint::spin_loop();
            }
            crate::cycles::elapsed_since(start)
        }
    }
}
