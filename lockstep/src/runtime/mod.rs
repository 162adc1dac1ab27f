use crate::errors::SchedulerError;

// Public API
mod barrier;
pub use barrier::BarrierScheduler;

mod builder;
pub use builder::Builder;
pub(crate) use builder::SchedulerConfig;

mod single;
pub use single::SingleThreadedScheduler;

mod ticker;
pub(crate) use ticker::Ticker;
pub use ticker::TickEvents;


/// Common surface of both schedulers, used by [`PeriodicDriver`].
///
/// [`PeriodicDriver`]: crate::rt::PeriodicDriver
pub trait Schedule {
    /// Processes one tick.
    fn run(&mut self) -> Result<TickEvents, SchedulerError>;

    /// Stops every task. Blocking, idempotent.
    fn shutdown(&mut self);

    /// Waits for every task to go idle, then flushes their outputs once more.
    fn wait_until_tasks_done(&mut self) -> Result<(), SchedulerError>;

    /// Number of ticks processed so far.
    fn tick(&self) -> u64;
}

/// What the scheduler does with a task that is still executing when it is
/// due again.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrunBehavior {
    /// Block the tick until every due task is parked. Keeps a consistent
    /// simulated clock rate, but every other task misses its deadline with
    /// the slow one. Do not use in a real-time loop.
    BusyWait,

    /// Leave the overrunning task alone and schedule everybody else. The task
    /// misses every release until it parks again.
    #[default]
    SkipTick,
}

/// Decision of a task error handler.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnTaskError {
    /// Clear the error, the task runs again on its next release.
    Resume,

    /// Shut every task down and fail the tick.
    #[default]
    Shutdown,
}
