//! Data Exchange: single 64-bit value transfer built out of one cache-padded
//! atomic slot per task, plus one global slot, and the corresponding barrier.
//!
//! Grounded on `source/datashare.c`: `SSpindleDataShareBuffer` is an 8-byte
//! payload padded out to a full cache line, and `spindleDataShareSendLocal`/
//! `spindleDataShareReceiveLocal` are nothing more than "write, then barrier"
//! and "barrier, then read" around a single per-task buffer
//! (`spindleDataShareBufferBase[spindleGetTaskID()]`), with one further
//! buffer at the end of the array for the global functions. Each task has at
//! most one sender per round; concurrent senders race on the same slot, last
//! writer wins, exactly as the original's single-buffer-per-task layout implies.

use crate::barrier::Barrier;
use crate::cache::CachePadded;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) struct Exchange {
    /// `local_slots[task_id]`, one shared slot per task.
    local_slots: Vec<CachePadded<AtomicU64>>,
    /// The single session-wide slot.
    global_slot: CachePadded<AtomicU64>,
}

impl Exchange {
    pub(crate) fn new(task_count: usize) -> Self {
        let local_slots = (0..task_count).map(|_| CachePadded::new(AtomicU64::new(0))).collect();
        Self { local_slots, global_slot: CachePadded::new(AtomicU64::new(0)) }
    }

    pub(crate) fn send_local(&self, barrier: &Barrier, task_id: usize, value: u64) {
        self.local_slots[task_id].store(value, Ordering::Release);
        barrier.wait();
    }

    pub(crate) fn recv_local(&self, barrier: &Barrier, task_id: usize) -> u64 {
        barrier.wait();
        self.local_slots[task_id].load(Ordering::Acquire)
    }

    pub(crate) fn send_global(&self, barrier: &Barrier, value: u64) {
        self.global_slot.store(value, Ordering::Release);
        barrier.wait();
    }

    pub(crate) fn recv_global(&self, barrier: &Barrier) -> u64 {
        barrier.wait();
        self.global_slot.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn local_send_is_visible_to_all_receivers_after_one_barrier_round() {
        const N: usize = 5;
        let barrier = Arc::new(Barrier::new(N));
        let exchange = Arc::new(Exchange::new(1));

        let handles: Vec<_> = (0..N)
            .map(|local_id| {
                let barrier = barrier.clone();
                let exchange = exchange.clone();
                std::thread::spawn(move || {
                    if local_id == 0 {
                        exchange.send_local(&barrier, 0, 0xBEEF);
                        None
                    } else {
                        Some(exchange.recv_local(&barrier, 0))
                    }
                })
            })
            .collect();

        for (i, h) in handles.into_iter().enumerate() {
            if let Some(value) = h.join().unwrap() {
                assert_eq!(value, 0xBEEF, "receiver {i} got the wrong value");
            }
        }
    }

    #[test]
    fn global_exchange_is_independent_of_local_task_boundaries() {
        const N: usize = 6;
        let barrier = Arc::new(Barrier::new(N));
        let exchange = Arc::new(Exchange::new(0));

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let barrier = barrier.clone();
                let exchange = exchange.clone();
                std::thread::spawn(move || {
                    if i == 0 {
                        exchange.send_global(&barrier, 0xCAFE);
                        None
                    } else {
                        Some(exchange.recv_global(&barrier))
                    }
                })
            })
            .collect();

        for (i, h) in handles.into_iter().enumerate() {
            if let Some(value) = h.join().unwrap() {
                assert_eq!(value, 0xCAFE, "receiver {i} got the wrong value");
            }
        }
    }
}
