//! Public task-specification types.

/// Highest allowed value of a spawn call's task count.
pub const MAX_TASK_COUNT: usize = 16;

/// Sentinel `num_threads` value meaning "all remaining threads on this NUMA node".
/// Only legal on the last task of a given NUMA node run.
pub const ALL_REMAINING: u32 = 0;

/// Rule for ordering worker-to-logical-processor assignments within a task.
///
/// As an example, consider a task with 7 threads assigned to 4 physical cores,
/// each exposing 2 logical processors via SMT. `PreferPhysical` assigns threads
/// in the order P0L0, P1L0, P2L0, P3L0, P0L1, P1L1, P2L1. `PreferLogical`
/// assigns P0L0, P0L1, P1L0, P1L1, P2L0, P2L1, P3L0. Regardless of policy,
/// separate tasks are always affinitized to different physical cores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtPolicy {
    /// Reserve one whole physical core per thread; never schedule two threads
    /// of the same task onto sibling logical processors.
    DisableSMT,
    /// Assign consecutive threads to different physical cores first, only
    /// doubling back onto a core's second (etc.) logical processor once every
    /// core in range has one thread.
    PreferPhysical,
    /// Saturate each physical core's logical processors before moving to the
    /// next physical core.
    PreferLogical,
}

/// The user-supplied entry point for a task's workers.
///
/// Accepts one opaque argument and returns nothing.
pub type TaskFn = fn(arg: usize);

/// One declared group of workers: a NUMA placement request plus the function
/// those workers should run.
#[derive(Debug, Clone, Copy)]
pub struct TaskSpec {
    /// Worker entry point.
    pub func: TaskFn,
    /// Opaque argument passed verbatim to `func` on every worker in this task.
    pub arg: usize,
    /// Zero-based index into the system's NUMA nodes.
    pub numa_node: usize,
    /// Explicit thread count, or [`ALL_REMAINING`] to consume the rest of the node.
    pub num_threads: u32,
    /// SMT placement policy for this task's workers.
    pub smt_policy: SmtPolicy,
}

impl TaskSpec {
    /// Convenience constructor for an explicit thread count.
    pub fn new(func: TaskFn, arg: usize, numa_node: usize, num_threads: u32, smt_policy: SmtPolicy) -> Self {
        Self { func, arg, numa_node, num_threads, smt_policy }
    }

    /// Convenience constructor using the all-remaining sentinel.
    pub fn all_remaining(func: TaskFn, arg: usize, numa_node: usize, smt_policy: SmtPolicy) -> Self {
        Self::new(func, arg, numa_node, ALL_REMAINING, smt_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_remaining_uses_sentinel() {
        fn noop(_: usize) {}
        let t = TaskSpec::all_remaining(noop, 0, 0, SmtPolicy::PreferPhysical);
        assert_eq!(t.num_threads, ALL_REMAINING);
    }
}
