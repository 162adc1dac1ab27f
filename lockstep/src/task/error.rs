use std::any::Any;

/// Failure captured on a task thread.
///
/// Task failures never terminate the task thread. They are stored on the task
/// and surfaced once per tick to the scheduler's exception handler, which
/// decides between resuming and shutting down.
#[derive(thiserror::Error, Debug)]
pub enum TaskError {
    #[error("initialize failed: {0}")]
    Initialize(#[source] anyhow::Error),

    #[error("execute failed: {0}")]
    Execute(#[source] anyhow::Error),

    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        TaskError::Panicked(panic_payload_as_str(payload).unwrap_or("unknown").to_string())
    }
}

pub(crate) fn panic_payload_as_str(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return Some(s);
    }

    if let Some(s) = payload.downcast_ref::<String>() {
        return Some(s);
    }

    None
}
