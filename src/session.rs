//! Session Orchestrator: turns a validated [`Plan`](crate::placement::Plan)
//! into real OS threads, publishes each worker's identity, and exposes the
//! barrier/exchange operations available while a session is running.
//!
//! Grounded on `source/osthread-linux.c`'s `spindleInternalThreadStartFuncLinux`
//! (affinitize, publish identity, barrier, run the user function) and on the
//! teacher's `NumaAwareThreadPool`/`WorkerConfig` for the `thread::Builder`
//! usage (named threads, configurable stack size). Session state that the C
//! original kept in process-wide globals is instead owned by one
//! `Arc<SessionShared>`, cloned into every worker closure — see the spec's
//! design notes on eliminating global mutable state.

use crate::barrier::Barrier;
use crate::error::{Result, SpindleError};
use crate::exchange::Exchange;
use crate::identity::{self, IdentityRecord};
use crate::placement::{self, WorkerAssignment};
use crate::types::{TaskFn, TaskSpec};
use std::cell::RefCell;
use std::sync::Arc;
use std::thread;

/// Default worker stack size, matching the teacher's `WorkerConfig` default.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Tuning knobs for a spawn session.
#[derive(Debug, Clone)]
pub struct SpawnOptions {
    stack_size: Option<usize>,
    thread_name_prefix: String,
    adopt_current_thread: bool,
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self {
            stack_size: Some(DEFAULT_STACK_SIZE),
            thread_name_prefix: "spindle-worker".to_string(),
            adopt_current_thread: false,
        }
    }
}

impl SpawnOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack size for every spawned OS thread. `None` uses the platform default.
    pub fn stack_size(mut self, bytes: Option<usize>) -> Self {
        self.stack_size = bytes;
        self
    }

    /// Prefix used to name each worker OS thread, as `"{prefix}-{global_id}"`.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// When set, worker 0 runs on the calling thread instead of a freshly
    /// spawned one. The calling thread is then unavailable to its caller
    /// until the session completes.
    pub fn adopt_current_thread(mut self, adopt: bool) -> Self {
        self.adopt_current_thread = adopt;
        self
    }
}

struct SessionShared {
    local_barriers: Vec<Barrier>,
    global_barrier: Barrier,
    internal_barrier: Barrier,
    exchange: Exchange,
}

thread_local! {
    static SESSION: RefCell<Option<Arc<SessionShared>>> = const { RefCell::new(None) };
}

/// Spawns `tasks` with default options and blocks until every worker returns.
pub fn spawn(tasks: &[TaskSpec]) -> Result<()> {
    spawn_with_options(tasks, &SpawnOptions::default())
}

/// Like [`spawn`], but runs the first worker on the calling thread.
pub fn spawn_adopting(tasks: &[TaskSpec]) -> Result<()> {
    spawn_with_options(tasks, &SpawnOptions::default().adopt_current_thread(true))
}

/// Spawns `tasks` per `options` and blocks until every worker returns.
///
/// A rejected plan creates no threads at all. Once the first worker thread
/// is created, the orchestrator commits to joining every thread it started,
/// even if a later thread fails to create: no thread is abandoned.
pub fn spawn_with_options(tasks: &[TaskSpec], options: &SpawnOptions) -> Result<()> {
    if tasks.is_empty() {
        return Ok(());
    }

    tracing::info!(task_count = tasks.len(), "spawn session starting");

    let topology = crate::topology::global()?;
    let plan = placement::plan(tasks, &topology)?;

    if plan.assignments.is_empty() {
        return Ok(());
    }

    let local_barriers = plan.task_local_counts.iter().map(|&n| Barrier::new(n)).collect();
    let global_barrier = Barrier::new(plan.global_count);
    let internal_barrier = Barrier::new(plan.global_count);
    let exchange = Exchange::new(tasks.len());
    let task_count = tasks.len();

    let shared = Arc::new(SessionShared { local_barriers, global_barrier, internal_barrier, exchange });

    let adopted_assignment = if options.adopt_current_thread { Some(plan.assignments[0]) } else { None };
    let spawned_assignments = if options.adopt_current_thread { &plan.assignments[1..] } else { &plan.assignments[..] };

    let mut handles = Vec::with_capacity(spawned_assignments.len());
    let mut spawn_error = None;

    for assignment in spawned_assignments {
        let assignment = *assignment;
        let shared = shared.clone();
        let task = tasks[assignment.task_index];
        let local_count = plan.task_local_counts[assignment.task_index];
        let global_count = plan.global_count;

        let mut builder = thread::Builder::new().name(format!("{}-{}", options.thread_name_prefix, assignment.global_id));
        if let Some(size) = options.stack_size {
            builder = builder.stack_size(size);
        }

        let result = builder.spawn(move || {
            worker_bootstrap(shared, assignment, task.func, task.arg, local_count, global_count, task_count);
        });

        match result {
            Ok(handle) => handles.push(handle),
            Err(source) => {
                spawn_error = Some(SpindleError::ThreadCreateFailure { worker_index: assignment.global_id, source });
                break;
            }
        }
    }

    if let Some(err) = spawn_error {
        for handle in handles {
            let _ = handle.join();
        }
        return Err(err);
    }

    if let Some(assignment) = adopted_assignment {
        let task = tasks[assignment.task_index];
        let local_count = plan.task_local_counts[assignment.task_index];
        worker_bootstrap(shared.clone(), assignment, task.func, task.arg, local_count, plan.global_count, task_count);
    }

    let mut join_error = None;
    for handle in handles {
        if handle.join().is_err() {
            join_error.get_or_insert(SpindleError::ThreadJoinFailure { worker_index: 0 });
        }
    }

    match join_error {
        Some(err) => {
            tracing::warn!(error = %err, "spawn session ended with a worker failure");
            Err(err)
        }
        None => {
            tracing::info!(global_count = plan.global_count, "spawn session complete");
            Ok(())
        }
    }
}

fn worker_bootstrap(
    shared: Arc<SessionShared>,
    assignment: WorkerAssignment,
    func: TaskFn,
    arg: usize,
    local_count: usize,
    global_count: usize,
    task_count: usize,
) {
    if let Err(source) = crate::topology::pin_current(assignment.logical_processor) {
        tracing::warn!(
            logical_processor = assignment.logical_processor,
            global_id = assignment.global_id,
            %source,
            "failed to set worker thread affinity; continuing unpinned"
        );
    }

    identity::install(IdentityRecord {
        local_id: assignment.local_id,
        global_id: assignment.global_id,
        task_id: assignment.task_index,
        local_count,
        global_count,
        task_count,
    });
    SESSION.with(|cell| *cell.borrow_mut() = Some(shared.clone()));

    // All workers reach this point, fully identified and affinitized, before
    // any of them touches user code or the public barrier/exchange surface.
    shared.internal_barrier.wait();

    func(arg);

    SESSION.with(|cell| *cell.borrow_mut() = None);
    identity::clear();
}

fn with_session<T>(f: impl FnOnce(&SessionShared, usize, usize, usize) -> T) -> Result<T> {
    let task_id = identity::task_id()?;
    let local_id = identity::local_id()?;
    let global_id = identity::global_id()?;
    SESSION.with(|cell| {
        let borrowed = cell.borrow();
        let shared = borrowed.as_ref().ok_or(SpindleError::NotInSession)?;
        Ok(f(shared, task_id, local_id, global_id))
    })
}

/// Blocks until every worker in the caller's task has called this.
pub fn barrier_local() -> Result<()> {
    with_session(|shared, task_id, _, _| shared.local_barriers[task_id].wait())
}

/// Blocks until every worker in the session has called this.
pub fn barrier_global() -> Result<()> {
    with_session(|shared, _, _, _| shared.global_barrier.wait())
}

/// Like [`barrier_local`], returning the number of cycles spent waiting.
pub fn timed_barrier_local() -> Result<u64> {
    with_session(|shared, task_id, _, _| shared.local_barriers[task_id].wait_timed())
}

/// Like [`barrier_global`], returning the number of cycles spent waiting.
pub fn timed_barrier_global() -> Result<u64> {
    with_session(|shared, _, _, _| shared.global_barrier.wait_timed())
}

/// Publishes `value` to every worker in the caller's task and waits for the
/// task's barrier. At most one worker per task should call this per round;
/// concurrent senders race on the same slot and the last writer wins.
pub fn send_local(value: u64) -> Result<()> {
    with_session(|shared, task_id, _, _| shared.exchange.send_local(&shared.local_barriers[task_id], task_id, value))
}

/// Waits for the task's barrier, then reads the value this task's sender
/// published this round.
pub fn recv_local() -> Result<u64> {
    with_session(|shared, task_id, _, _| shared.exchange.recv_local(&shared.local_barriers[task_id], task_id))
}

/// Publishes `value` to every worker in the session and waits for the global
/// barrier. At most one worker per session should call this per round;
/// concurrent senders race on the same slot and the last writer wins.
pub fn send_global(value: u64) -> Result<()> {
    with_session(|shared, _, _, _| shared.exchange.send_global(&shared.global_barrier, value))
}

/// Waits for the global barrier, then reads the value published this round.
pub fn recv_global() -> Result<u64> {
    with_session(|shared, _, _, _| shared.exchange.recv_global(&shared.global_barrier))
}
