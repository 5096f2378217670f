//! Task Executor Metrics

use core::fmt;
use metrics::Counter;

/// Task Executor Metrics
#[derive(Clone, Debug)]
pub struct TaskExecutorMetrics {
    /// Number of spawned tasks
    pub(crate) tasks_total: Counter,
    /// Number of spawned tasks that ran to completion or were dropped
    pub(crate) finished_tasks_total: Counter,
    /// Number of tasks cancelled by a shutdown signal before completing
    pub(crate) cancelled_tasks_total: Counter,
}

impl Default for TaskExecutorMetrics {
    fn default() -> Self {
        Self {
            tasks_total: metrics::counter!("executor.spawn.tasks_total"),
            finished_tasks_total: metrics::counter!("executor.spawn.finished_tasks_total"),
            cancelled_tasks_total: metrics::counter!("executor.spawn.cancelled_tasks_total"),
        }
    }
}

impl TaskExecutorMetrics {
    /// Increments the counter for spawned tasks.
    pub(crate) fn inc_tasks(&self) {
        self.tasks_total.increment(1);
    }

    /// Increments the counter for tasks stopped by a shutdown signal.
    pub(crate) fn inc_cancelled_tasks(&self) {
        self.cancelled_tasks_total.increment(1);
    }
}

/// Bumps a counter when dropped, so a task counts as finished even if it
/// panics or is aborted.
pub struct IncCounterOnDrop(Counter);

impl fmt::Debug for IncCounterOnDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IncCounterOnDrop")
    }
}

impl IncCounterOnDrop {
    pub const fn new(counter: Counter) -> Self {
        Self(counter)
    }
}

impl Drop for IncCounterOnDrop {
    fn drop(&mut self) {
        self.0.increment(1);
    }
}
