//! Task spawning for long-lived background loops and fire-and-forget work.
//!
//! [`TaskExecutor`] wraps a tokio runtime handle. Every task it spawns runs in
//! a `tracing` span named after the task and is counted through the `metrics`
//! facade. Background loops are stopped with a [`Shutdown`] latch.

mod metrics;
mod shutdown;

pub use metrics::{IncCounterOnDrop, TaskExecutorMetrics};
pub use shutdown::{Shutdown, ShutdownSignal};

use std::future::Future;

use tokio::{runtime::Handle, task::JoinHandle};
use tracing::{Instrument, debug, debug_span};

/// Spawns named tasks onto a tokio runtime.
#[derive(Clone, Debug)]
pub struct TaskExecutor {
    handle: Handle,
    metrics: TaskExecutorMetrics,
}

impl TaskExecutor {
    /// Create an executor that spawns onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            metrics: TaskExecutorMetrics::default(),
        }
    }

    /// Create an executor for the runtime this is called from.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Create an executor for the current runtime, if there is one.
    pub fn try_current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }

    /// Runtime handle tasks are spawned onto.
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Spawn a task whose lifetime is independent of the caller.
    pub fn spawn<F>(&self, name: &'static str, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.metrics.inc_tasks();
        let finished = IncCounterOnDrop::new(self.metrics.finished_tasks_total.clone());

        let task = async move {
            let _finished = finished;
            fut.await;
        };

        self.handle.spawn(task.instrument(debug_span!("task", name)))
    }

    /// Spawn a task that is dropped as soon as `signal` fires.
    ///
    /// The signal is raced against the task in a single select, so shutdown is
    /// observed even while the task is parked on I/O or a timer.
    pub fn spawn_until_shutdown<F>(
        &self,
        name: &'static str,
        mut signal: ShutdownSignal,
        fut: F,
    ) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let metrics = self.metrics.clone();
        self.spawn(name, async move {
            tokio::select! {
                biased;
                _ = signal.wait() => {
                    debug!(task = name, "task stopped by shutdown signal");
                    metrics.inc_cancelled_tasks();
                }
                _ = fut => {}
            }
        })
    }
}
