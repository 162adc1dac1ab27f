use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a task as observed from outside its thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TaskState {
    /// Created, thread not started yet.
    New = 0,

    /// Parked on its barrier waiting for the scheduler.
    SleepingOnBarrier = 1,

    /// Running `initialize`, possibly for the n-th time.
    Initializing = 2,

    /// Running `execute`.
    Executing = 3,

    /// Shutdown was requested, the thread has not exited yet.
    ShutdownRequested = 4,

    /// `cleanup` returned. Terminal.
    ShutDown = 5,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::New,
            1 => TaskState::SleepingOnBarrier,
            2 => TaskState::Initializing,
            3 => TaskState::Executing,
            4 => TaskState::ShutdownRequested,
            5 => TaskState::ShutDown,
            _ => unreachable!("invalid task state: {raw}"),
        }
    }

    /// Shutdown states are sticky, regular transitions never leave them.
    #[inline]
    fn is_terminating(self) -> bool {
        matches!(self, TaskState::ShutdownRequested | TaskState::ShutDown)
    }
}

#[derive(Debug)]
pub(crate) struct AtomicTaskState(AtomicU8);

impl AtomicTaskState {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(TaskState::New as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` unless shutdown already started.
    pub(crate) fn advance(&self, next: TaskState) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (!TaskState::from_u8(raw).is_terminating()).then_some(next as u8)
            });
    }

    /// Moves to `ShutdownRequested` unless already `ShutDown`.
    pub(crate) fn request_shutdown(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                (TaskState::from_u8(raw) != TaskState::ShutDown)
                    .then_some(TaskState::ShutdownRequested as u8)
            });
    }

    pub(crate) fn set_shut_down(&self) {
        self.0.store(TaskState::ShutDown as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_is_sticky() {
        let state = AtomicTaskState::new();
        assert_eq!(state.load(), TaskState::New);

        state.advance(TaskState::SleepingOnBarrier);
        state.advance(TaskState::Executing);
        assert_eq!(state.load(), TaskState::Executing);

        state.request_shutdown();
        state.advance(TaskState::SleepingOnBarrier);
        assert_eq!(state.load(), TaskState::ShutdownRequested);

        state.set_shut_down();
        state.request_shutdown();
        state.advance(TaskState::Executing);
        assert_eq!(state.load(), TaskState::ShutDown);
    }
}
