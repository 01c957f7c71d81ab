//! # toposync
//!
//! Topology-aware thread dispatch and synchronization.
//!
//! Declare a handful of [`TaskSpec`]s, each naming a NUMA node, a thread
//! count, and an SMT placement policy, and hand them to [`spawn`]. Every
//! worker thread it creates is pinned to a specific logical processor before
//! your code ever runs, and can query its place in the session (local and
//! global thread IDs, group membership) plus synchronize with the rest of
//! its group or the whole session through barriers and single-value data
//! exchange.
//!
//! ```no_run
//! use toposync::{spawn, SmtPolicy, TaskSpec};
//!
//! fn worker(_arg: usize) {
//!     println!("worker {} of {}", toposync::local_id().unwrap(), toposync::local_count().unwrap());
//!     toposync::barrier_global().unwrap();
//! }
//!
//! let tasks = [TaskSpec::new(worker, 0, 0, 4, SmtPolicy::PreferPhysical)];
//! spawn(&tasks).expect("spawn session failed");
//! ```

mod barrier;
mod cache;
mod cycles;
mod error;
mod exchange;
mod identity;
mod placement;
mod session;
mod topology;
pub mod types;

pub use error::{Result, SpindleError};
pub use identity::{get_scratch, global_count, global_id, local_count, local_id, set_scratch, task_count, task_id};
pub use session::{spawn, spawn_adopting, spawn_with_options, SpawnOptions, DEFAULT_STACK_SIZE};
pub use session::{barrier_global, barrier_local, recv_global, recv_local, send_global, send_local, timed_barrier_global, timed_barrier_local};
pub use topology::Topology;
pub use types::{SmtPolicy, TaskFn, TaskSpec, ALL_REMAINING, MAX_TASK_COUNT};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_populated() {
        assert!(!VERSION.trim().is_empty());
    }
}
