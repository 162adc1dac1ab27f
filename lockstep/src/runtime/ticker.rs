use bitflags::bitflags;

/// Scheduler tick counter.
#[derive(Debug, Default)]
pub(crate) struct Ticker {
    tick: u64,
}

impl Ticker {
    pub(crate) fn new() -> Self {
        Self { tick: 0 }
    }

    #[inline]
    pub(crate) fn current(&self) -> u64 {
        self.tick
    }

    pub(crate) fn advance(&mut self) {
        self.tick += 1;
    }
}

bitflags! {
    /// Summary of what happened during one `run()` call.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct TickEvents: u8 {
        /// At least one task was released.
        const RELEASED = 1;

        /// At least one due task was still executing. Under `BusyWait` the
        /// tick waited for it, under `SkipTick` it was skipped.
        const OVERRUN = 1 << 1;

        /// At least one task error was handed to the error handler.
        const TASK_ERROR = 1 << 2;

        /// At least one task error was cleared on the handler's request.
        const RESUMED = 1 << 3;

        /// The scheduler is shut down, nothing was processed.
        const SHUTDOWN = 1 << 4;
    }
}
