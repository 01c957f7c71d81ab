//! Placement Planner: maps a task list onto the topology's NUMA nodes,
//! physical cores, and logical processors in a single left-to-right pass.
//!
//! Grounded directly on `source/spawn.c`'s `spindleThreadsSpawn`: a cursor
//! walks each NUMA node's physical cores in order, consuming whole cores per
//! task (never splitting one core's logical processors across two tasks),
//! then `spindleHelperGetThreadAffinityObject`'s per-policy index arithmetic
//! picks the exact logical processor for each thread within its task's core
//! range. The one deliberate gap from the original: `hwloc`'s topology-wide
//! `logical_index` is replaced with a per-node core array index, which is
//! equivalent because the walk never crosses a NUMA node boundary within a
//! single task.

use crate::error::{Result, SpindleError};
use crate::topology::{Core, Topology};
use crate::types::{SmtPolicy, TaskSpec, ALL_REMAINING, MAX_TASK_COUNT};

/// Where one worker thread lands.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WorkerAssignment {
    pub task_index: usize,
    pub local_id: usize,
    pub global_id: usize,
    pub logical_processor: usize,
}

/// The fully resolved outcome of planning a task list: every worker's
/// placement plus the per-task and session-wide counts the Identity Store
/// publishes to each worker.
pub(crate) struct Plan {
    pub assignments: Vec<WorkerAssignment>,
    pub task_local_counts: Vec<usize>,
    pub global_count: usize,
}

/// Plans worker placement for `tasks` against `topology`. Validates every
/// invariant before committing to any assignment: a rejected plan creates no
/// threads and leaves no partial state behind.
pub(crate) fn plan(tasks: &[TaskSpec], topology: &Topology) -> Result<Plan> {
    if tasks.is_empty() {
        return Ok(Plan { assignments: Vec::new(), task_local_counts: Vec::new(), global_count: 0 });
    }
    if tasks.len() > MAX_TASK_COUNT {
        return Err(SpindleError::TooManyTasks(tasks.len()));
    }

    let mut current_numa_node = tasks[0].numa_node;
    let mut core_cursor = 0usize;
    // (numa_node, start_core_idx, end_core_idx_inclusive) per task.
    let mut task_ranges: Vec<(usize, usize, usize)> = Vec::with_capacity(tasks.len());
    let mut task_num_threads: Vec<u32> = Vec::with_capacity(tasks.len());

    for (task_index, task) in tasks.iter().enumerate() {
        if task.numa_node < current_numa_node {
            return Err(SpindleError::NonMonotonicNumaOrder { task_index, numa_node: task.numa_node });
        }
        if task.numa_node >= topology.nodes() {
            return Err(SpindleError::UnknownNumaNode { task_index, numa_node: task.numa_node });
        }
        if task.numa_node != current_numa_node {
            current_numa_node = task.numa_node;
            core_cursor = 0;
        }

        let node = topology.node(current_numa_node).expect("just bounds-checked");
        let cores = node.cores();
        let cores_left = cores.len() - core_cursor;
        let threads_left: u32 = cores[core_cursor..].iter().map(|c| c.logicals().len() as u32).sum();

        let (start, end, consumed) = if task.num_threads == ALL_REMAINING {
            if cores_left < 1 {
                return Err(SpindleError::InsufficientCores {
                    task_index,
                    numa_node: current_numa_node,
                    available: 0,
                    requested: 1,
                });
            }
            let start = core_cursor;
            let end = cores.len() - 1;
            let total: u32 = cores[start..].iter().map(|c| {
                if task.smt_policy == SmtPolicy::DisableSMT { 1 } else { c.logicals().len() as u32 }
            }).sum();
            (start, end, total)
        } else {
            let requested = task.num_threads;
            if threads_left < requested {
                return Err(SpindleError::InsufficientThreads {
                    task_index,
                    numa_node: current_numa_node,
                    available: threads_left,
                    requested,
                });
            }
            if task.smt_policy == SmtPolicy::DisableSMT && (cores_left as u32) < requested {
                return Err(SpindleError::InsufficientCores {
                    task_index,
                    numa_node: current_numa_node,
                    available: cores_left as u32,
                    requested,
                });
            }

            let start = core_cursor;
            let mut assigned = 0u32;
            let mut idx = core_cursor;
            while assigned < requested {
                let by_core = if task.smt_policy == SmtPolicy::DisableSMT { 1 } else { cores[idx].logicals().len() as u32 };
                assigned += by_core;
                idx += 1;
            }
            (start, idx - 1, requested)
        };

        // The all-remaining sentinel must be the last task on its NUMA node:
        // enforce it by checking whether anything still follows on this node.
        if task.num_threads == ALL_REMAINING {
            let more_on_same_node = tasks.get(task_index + 1).map(|t| t.numa_node == current_numa_node).unwrap_or(false);
            if more_on_same_node {
                return Err(SpindleError::SentinelNotTerminal { task_index });
            }
        }

        tracing::debug!(
            task_index,
            numa_node = current_numa_node,
            core_start = start,
            core_end = end,
            threads = consumed,
            smt_policy = ?task.smt_policy,
            "task placed"
        );

        task_ranges.push((current_numa_node, start, end));
        task_num_threads.push(consumed);
        core_cursor = end + 1;
    }

    let task_local_counts: Vec<usize> = task_num_threads.iter().map(|&n| n as usize).collect();
    let global_count: usize = task_local_counts.iter().sum();

    let mut assignments = Vec::with_capacity(global_count);
    let mut global_id = 0usize;
    for (task_index, task) in tasks.iter().enumerate() {
        let (numa_node, start, end) = task_ranges[task_index];
        let cores: Vec<&Core> = topology.node(numa_node).expect("validated above").cores()[start..=end].iter().collect();
        for local_id in 0..task_num_threads[task_index] {
            let logical_processor = logical_for(&cores, local_id, task.smt_policy, task_index)?;
            assignments.push(WorkerAssignment { task_index, local_id: local_id as usize, global_id, logical_processor });
            global_id += 1;
        }
    }

    Ok(Plan { assignments, task_local_counts, global_count })
}

fn uniform_width(cores: &[&Core], task_index: usize) -> Result<u32> {
    let width = cores[0].logicals().len() as u32;
    if cores.iter().any(|c| c.logicals().len() as u32 != width) {
        return Err(SpindleError::NonUniformSmtWidth { task_index });
    }
    Ok(width)
}

/// Per-policy index arithmetic, translated from
/// `spindleHelperGetThreadAffinityObject`.
fn logical_for(cores: &[&Core], thread_index: u32, policy: SmtPolicy, task_index: usize) -> Result<usize> {
    match policy {
        SmtPolicy::DisableSMT => Ok(cores[thread_index as usize]
            .pu(0)
            .expect("every physical core exposes at least one logical processor")),
        SmtPolicy::PreferPhysical => {
            uniform_width(cores, task_index)?;
            let num_phys = cores.len() as u32;
            let phys_idx = (thread_index % num_phys) as usize;
            let log_idx = (thread_index / num_phys) as usize;
            Ok(cores[phys_idx].pu(log_idx).expect("uniform width guarantees this index exists"))
        }
        SmtPolicy::PreferLogical => {
            let width = uniform_width(cores, task_index)?;
            let phys_idx = (thread_index / width) as usize;
            let log_idx = (thread_index % width) as usize;
            Ok(cores[phys_idx].pu(log_idx).expect("uniform width guarantees this index exists"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn noop(_: usize) {}

    /// One node, 4 physical cores, 2 logical processors each (8 PUs total).
    fn dual_smt_topology() -> Topology {
        Topology::synthetic(vec![vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7]]])
    }

    #[test]
    fn disable_smt_uses_one_pu_per_core_in_core_order() {
        let topo = dual_smt_topology();
        let tasks = [TaskSpec::new(noop, 0, 0, 4, SmtPolicy::DisableSMT)];
        let plan = plan(&tasks, &topo).unwrap();
        let mut pus: Vec<usize> = plan.assignments.iter().map(|a| a.logical_processor).collect();
        pus.sort_unstable();
        assert_eq!(pus, vec![0, 2, 4, 6]);
        assert_eq!(plan.global_count, 4);
    }

    #[test]
    fn prefer_physical_spreads_before_doubling_back() {
        let topo = dual_smt_topology();
        let tasks = [TaskSpec::new(noop, 0, 0, 7, SmtPolicy::PreferPhysical)];
        let plan = plan(&tasks, &topo).unwrap();
        let mut by_local: Vec<_> = plan.assignments.clone();
        by_local.sort_by_key(|a| a.local_id);
        let pus: Vec<usize> = by_local.iter().map(|a| a.logical_processor).collect();
        assert_eq!(pus, vec![0, 2, 4, 6, 1, 3, 5]);
    }

    #[test]
    fn prefer_logical_saturates_each_core_before_moving_on() {
        let topo = dual_smt_topology();
        let tasks = [TaskSpec::new(noop, 0, 0, 7, SmtPolicy::PreferLogical)];
        let plan = plan(&tasks, &topo).unwrap();
        let mut by_local: Vec<_> = plan.assignments.clone();
        by_local.sort_by_key(|a| a.local_id);
        let pus: Vec<usize> = by_local.iter().map(|a| a.logical_processor).collect();
        assert_eq!(pus, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn two_tasks_on_one_node_never_share_a_core() {
        let topo = dual_smt_topology();
        let tasks = [
            TaskSpec::new(noop, 0, 0, 2, SmtPolicy::DisableSMT),
            TaskSpec::all_remaining(noop, 0, 0, SmtPolicy::PreferLogical),
        ];
        let plan = plan(&tasks, &topo).unwrap();
        let task0_pus: Vec<usize> =
            plan.assignments.iter().filter(|a| a.task_index == 0).map(|a| a.logical_processor).collect();
        let task1_pus: Vec<usize> =
            plan.assignments.iter().filter(|a| a.task_index == 1).map(|a| a.logical_processor).collect();
        assert_eq!(task0_pus, vec![0, 2]);
        assert_eq!(task1_pus, vec![4, 5, 6, 7]);
        assert_eq!(plan.task_local_counts, vec![2, 4]);
        assert_eq!(plan.global_count, 6);
    }

    #[test]
    fn overcommitted_request_is_rejected_before_any_assignment() {
        let topo = dual_smt_topology();
        let tasks = [TaskSpec::new(noop, 0, 0, 9, SmtPolicy::PreferLogical)];
        let err = plan(&tasks, &topo).unwrap_err();
        assert!(matches!(err, SpindleError::InsufficientThreads { .. }));
    }

    #[test]
    fn disable_smt_overcommit_on_cores_is_rejected() {
        let topo = dual_smt_topology();
        // 8 PUs total but only 4 physical cores; DisableSMT can't give 5 threads a whole core each.
        let tasks = [TaskSpec::new(noop, 0, 0, 5, SmtPolicy::DisableSMT)];
        let err = plan(&tasks, &topo).unwrap_err();
        assert!(matches!(err, SpindleError::InsufficientCores { .. }));
    }

    #[test]
    fn sentinel_must_be_last_task_on_its_node() {
        let topo = dual_smt_topology();
        let tasks = [
            TaskSpec::all_remaining(noop, 0, 0, SmtPolicy::PreferLogical),
            TaskSpec::new(noop, 0, 0, 1, SmtPolicy::DisableSMT),
        ];
        let err = plan(&tasks, &topo).unwrap_err();
        assert!(matches!(err, SpindleError::SentinelNotTerminal { task_index: 0 }));
    }

    #[test]
    fn numa_node_order_must_be_non_decreasing() {
        let topo = Topology::synthetic(vec![vec![vec![0, 1]], vec![vec![2, 3]]]);
        let tasks = [
            TaskSpec::new(noop, 0, 1, 1, SmtPolicy::DisableSMT),
            TaskSpec::new(noop, 0, 0, 1, SmtPolicy::DisableSMT),
        ];
        let err = plan(&tasks, &topo).unwrap_err();
        assert!(matches!(err, SpindleError::NonMonotonicNumaOrder { task_index: 1, .. }));
    }

    #[test]
    fn unknown_numa_node_is_rejected() {
        let topo = dual_smt_topology();
        let tasks = [TaskSpec::new(noop, 0, 5, 1, SmtPolicy::DisableSMT)];
        let err = plan(&tasks, &topo).unwrap_err();
        assert!(matches!(err, SpindleError::UnknownNumaNode { task_index: 0, numa_node: 5 }));
    }

    #[test]
    fn too_many_tasks_is_rejected() {
        let topo = dual_smt_topology();
        let tasks = vec![TaskSpec::new(noop, 0, 0, 0, SmtPolicy::PreferLogical); MAX_TASK_COUNT + 1];
        let err = plan(&tasks, &topo).unwrap_err();
        assert!(matches!(err, SpindleError::TooManyTasks(_)));
    }

    proptest::proptest! {
        /// Any task that fits within one node's total PU count produces a plan
        /// whose global IDs are exactly `0..global_count` with no gaps or
        /// repeats, and whose local IDs never reach their task's local count.
        #[test]
        fn valid_single_task_plan_is_a_clean_permutation(
            num_cores in 1usize..8,
            width in 1usize..3,
            requested_fraction in 0.1f64..1.0,
            policy_idx in 0usize..3,
        ) {
            let mut next_pu = 0usize;
            let cores: Vec<Vec<usize>> = (0..num_cores)
                .map(|_| (0..width).map(|_| { let pu = next_pu; next_pu += 1; pu }).collect())
                .collect();
            let topo = Topology::synthetic(vec![cores]);
            let total_threads = (num_cores * width) as u32;
            let policy = [SmtPolicy::DisableSMT, SmtPolicy::PreferPhysical, SmtPolicy::PreferLogical][policy_idx];
            let cap = if policy == SmtPolicy::DisableSMT { num_cores as u32 } else { total_threads };
            let requested = (1 + ((cap - 1) as f64 * requested_fraction) as u32).min(cap).max(1);

            let tasks = [TaskSpec::new(noop, 0, 0, requested, policy)];
            let result = plan(&tasks, &topo).unwrap();

            prop_assert_eq!(result.global_count, requested as usize);
            let mut global_ids: Vec<usize> = result.assignments.iter().map(|a| a.global_id).collect();
            global_ids.sort_unstable();
            prop_assert_eq!(global_ids, (0..requested as usize).collect::<Vec<_>>());

            for a in &result.assignments {
                prop_assert!(a.local_id < result.task_local_counts[a.task_index]);
            }

            let mut pus: Vec<usize> = result.assignments.iter().map(|a| a.logical_processor).collect();
            pus.sort_unstable();
            pus.dedup();
            prop_assert_eq!(pus.len(), result.assignments.len(), "no two workers share a logical processor");
        }
    }
}
