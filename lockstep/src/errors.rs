use crate::task::TaskError;
use std::sync::Arc;

/// Misuse of a synchronization primitive or of the scheduler protocol.
///
/// These are programming errors. They are never silently ignored and the
/// scheduler treats them as fatal.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateViolation {
    #[error("only one thread can wait on a parking barrier at a time")]
    AlreadyWaiting,

    #[error("tried to release a task that was not waiting on its barrier")]
    ReleaseWithoutWaiter,

    #[error("operation not allowed while the scheduler is being ticked")]
    SchedulerRunning,
}

/// A centralized error type for scheduler construction and tick processing.
#[derive(thiserror::Error, Debug)]
pub enum SchedulerError {
    #[error("divisor must be > 0")]
    InvalidDivisor,

    #[error("unsupported priority {requested}, minimum: {min}, maximum: {max}")]
    InvalidPriority { requested: u8, min: u8, max: u8 },

    #[error("FATAL: {0}")]
    StateViolation(#[from] StateViolation),

    /// The scheduler found a task busy while the protocol says it is parked.
    #[error("FATAL: task {task} is desynchronized from the scheduler")]
    Desynchronized { task: String },

    /// A task error was not resumed by the exception handler.
    #[error("task {task} failed, scheduler shut down")]
    TaskFailed {
        task: String,
        #[source]
        source: Arc<TaskError>,
    },

    #[error("failed to spawn thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    #[error("An unexpected error occurred: {0}")]
    Other(#[from] anyhow::Error),
}

impl SchedulerError {
    /// Fatal errors indicate a broken invariant rather than a task failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SchedulerError::StateViolation(_) | SchedulerError::Desynchronized { .. }
        )
    }
}
