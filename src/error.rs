//! Error types surfaced by [`spawn`](crate::spawn) and friends.
//!
//! Resolves the library's only real open design question: the original C
//! implementation returned `__LINE__` as a status code, which is debugging
//! grade, not a contract. Every failure kind gets a named variant instead.

use thiserror::Error;

/// Everything that can go wrong while planning or running a spawn session.
#[derive(Debug, Error)]
pub enum SpindleError {
    /// More tasks were requested than [`MAX_TASK_COUNT`](crate::MAX_TASK_COUNT) allows.
    #[error("task count {0} exceeds the maximum of {max}", max = crate::MAX_TASK_COUNT)]
    TooManyTasks(usize),

    /// `numa_node` values did not appear in non-decreasing order across the task list.
    #[error("task {task_index}: numa_node {numa_node} is less than the previous task's node")]
    NonMonotonicNumaOrder { task_index: usize, numa_node: usize },

    /// The all-remaining sentinel (`num_threads == 0`) was used on a task that
    /// was not the last task for its NUMA node.
    #[error("task {task_index}: the all-remaining thread sentinel may only be used on the last task of a NUMA node")]
    SentinelNotTerminal { task_index: usize },

    /// A task named a NUMA node the topology oracle does not know about.
    #[error("task {task_index}: unknown NUMA node {numa_node}")]
    UnknownNumaNode { task_index: usize, numa_node: usize },

    /// Not enough logical processors remained on the node to satisfy the request.
    #[error("task {task_index}: NUMA node {numa_node} has {available} threads remaining, task requested {requested}")]
    InsufficientThreads {
        task_index: usize,
        numa_node: usize,
        available: u32,
        requested: u32,
    },

    /// Not enough whole physical cores remained on the node (DisableSMT policy).
    #[error("task {task_index}: NUMA node {numa_node} has {available} physical cores remaining, task requested {requested} with SMT disabled")]
    InsufficientCores {
        task_index: usize,
        numa_node: usize,
        available: u32,
        requested: u32,
    },

    /// Cores within a task's assigned range did not all expose the same number
    /// of logical processors, which the PreferPhysical/PreferLogical affinity
    /// math assumes.
    #[error("task {task_index}: physical cores in range have non-uniform SMT width, unsupported")]
    NonUniformSmtWidth { task_index: usize },

    /// The topology oracle reported zero NUMA nodes and could not even
    /// synthesize a fallback.
    #[error("topology oracle reported no usable NUMA nodes")]
    TopologyUnavailable,

    /// A session-scoped allocation could not be made.
    #[error("session allocation failed: {0}")]
    AllocationFailure(&'static str),

    /// Creating a worker OS thread failed.
    #[error("failed to create worker OS thread {worker_index}: {source}")]
    ThreadCreateFailure {
        worker_index: usize,
        #[source]
        source: std::io::Error,
    },

    /// Joining a worker OS thread failed (it panicked).
    #[error("worker OS thread {worker_index} panicked before returning")]
    ThreadJoinFailure { worker_index: usize },

    /// An identity/barrier/exchange accessor was called from a thread that is
    /// not a worker of an active spawn session.
    #[error("this call is only valid on a worker thread inside an active spawn session")]
    NotInSession,
}

pub type Result<T> = std::result::Result<T, SpindleError>;
