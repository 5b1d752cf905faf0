//! Run execution for tsize.
//!
//! This module provides:
//! - [`CancelToken`] - one permanent cancellation signal merged from every source
//! - [`TaskQueue`] - the shared pull point workers take templates from
//! - [`compile_templates`] - the orchestrator that drives the worker pool

mod cancel;
mod orchestrator;
mod queue;

pub use cancel::{CancelReason, CancelToken, InterruptGuard};
pub use orchestrator::compile_templates;
pub use queue::{Progress, TaskQueue};

/// Templates per worker below which another worker is not worth its startup cost.
pub const TASKS_PER_WORKER: usize = 5;

/// Worker count for `task_count` templates: `min(task_count / 5, parallelism)`.
///
/// Zero when there are fewer than five templates.
pub fn pool_size(task_count: usize, parallelism: usize) -> usize {
    (task_count / TASKS_PER_WORKER).min(parallelism)
}
