//! Identity Store: per-worker identity metadata, published once at worker
//! bootstrap and readable only from that same worker thread.
//!
//! Grounded on the teacher's `THREAD_NUMA_NODE: Cell<Option<usize>>` pattern
//! in `numa::topology` — a thread-local slot set once by the thread that owns
//! it, read by library code running on that thread. Here the slot carries the
//! session identity record instead of a single NUMA node id, and a 64-bit
//! scratch cell the original C library exposed as `spindleSetLocalVariable`.

use crate::error::{Result, SpindleError};
use std::cell::{Cell, RefCell};

#[derive(Debug, Clone, Copy)]
pub(crate) struct IdentityRecord {
    pub local_id: usize,
    pub global_id: usize,
    pub task_id: usize,
    pub local_count: usize,
    pub global_count: usize,
    pub task_count: usize,
}

thread_local! {
    static IDENTITY: RefCell<Option<IdentityRecord>> = const { RefCell::new(None) };
    static SCRATCH: Cell<u64> = const { Cell::new(0) };
}

/// Publishes this thread's identity. Called once by the worker bootstrap
/// before the user's task function runs.
pub(crate) fn install(record: IdentityRecord) {
    IDENTITY.with(|cell| *cell.borrow_mut() = Some(record));
    SCRATCH.with(|cell| cell.set(0));
}

/// Clears this thread's identity. Called after the worker's task function
/// returns, before the thread rejoins the orchestrator.
pub(crate) fn clear() {
    IDENTITY.with(|cell| *cell.borrow_mut() = None);
}

fn with_record<T>(f: impl FnOnce(&IdentityRecord) -> T) -> Result<T> {
    IDENTITY.with(|cell| cell.borrow().as_ref().map(f).ok_or(SpindleError::NotInSession))
}

/// This worker's index within its task (`0..local_count`).
pub fn local_id() -> Result<usize> {
    with_record(|r| r.local_id)
}

/// This worker's index across the whole session (`0..global_count`).
pub fn global_id() -> Result<usize> {
    with_record(|r| r.global_id)
}

/// The index of the task this worker belongs to (`0..task_count`).
pub fn task_id() -> Result<usize> {
    with_record(|r| r.task_id)
}

/// Number of workers in this worker's task.
pub fn local_count() -> Result<usize> {
    with_record(|r| r.local_count)
}

/// Total number of workers in the session.
pub fn global_count() -> Result<usize> {
    with_record(|r| r.global_count)
}

/// Number of tasks in the session.
pub fn task_count() -> Result<usize> {
    with_record(|r| r.task_count)
}

/// Reads this worker's 64-bit scratch value, initially zero.
pub fn get_scratch() -> Result<u64> {
    with_record(|_| ()).map(|()| SCRATCH.with(Cell::get))
}

/// Overwrites this worker's 64-bit scratch value.
pub fn set_scratch(value: u64) -> Result<()> {
    with_record(|_| ()).map(|()| SCRATCH.with(|cell| cell.set(value)))
}
