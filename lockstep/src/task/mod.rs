//! Periodic tasks and their lifecycle.
//!
//! A [`Task`] is the user code, a [`TaskHandle`] is what the schedulers and
//! task threads share. A task is released on every tick where
//! `(tick - delay) mod divisor == 0`.

mod error;
pub use error::TaskError;

mod handle;
pub use handle::TaskHandle;

pub(crate) mod id;
pub use id::TaskId;

mod state;
pub use state::TaskState;

#[cfg(test)]
mod tests;

/// User code driven by a scheduler.
///
/// `C` is the scheduler's master context. The two context hooks run on the
/// scheduler thread while the task is parked, the lifecycle hooks run on the
/// task's own thread (or inline for [`SingleThreadedScheduler`]).
///
/// [`SingleThreadedScheduler`]: crate::runtime::SingleThreadedScheduler
pub trait Task<C>: Send {
    /// Lazy setup before the first `execute`.
    ///
    /// Returning `Ok(false)` means "not ready yet": `execute` is skipped and
    /// initialization is retried on the next release.
    fn initialize(&mut self) -> anyhow::Result<bool> {
        Ok(true)
    }

    /// One period of work.
    fn execute(&mut self) -> anyhow::Result<()>;

    /// Runs once when the task shuts down, whether or not it was initialized.
    fn cleanup(&mut self) {}

    /// Publishes the task's latest output into the master context.
    fn update_master_context(&mut self, context: &mut C);

    /// Refreshes the task's local copy from the master context.
    fn update_local_context(&mut self, context: &C);
}

/// Point-in-time description of a task, handed to error handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: TaskId,
    pub name: String,
    pub divisor: u64,
    pub delay: u64,
    pub state: TaskState,
}
