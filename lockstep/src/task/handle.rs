use crate::errors::SchedulerError;
use crate::rt::registry;
use crate::sync::ParkingBarrier;
use crate::task::error::TaskError;
use crate::task::state::{AtomicTaskState, TaskState};
use crate::task::{Task, TaskId, TaskInfo};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error, trace, warn};

/// Shared handle to a periodic task.
///
/// The scheduler holds one clone, the task thread (if any) holds another. All
/// coordination goes through the handle, the task body itself is only ever
/// touched by one side at a time: the task thread between release and its next
/// barrier wait, the scheduler while the thread is parked.
pub struct TaskHandle<C>(Arc<TaskCore<C>>);

struct TaskCore<C> {
    id: TaskId,
    name: String,

    /// Release every `divisor` ticks. Always > 0.
    divisor: u64,

    /// Phase offset in ticks. Only grows, through `increment_delay`.
    delay: AtomicU64,

    barrier: ParkingBarrier,
    state: AtomicTaskState,

    shutdown_requested: AtomicBool,
    initialized: AtomicBool,
    cleanup_started: AtomicBool,

    /// Last failure, consumed by the scheduler's exception handler.
    error: Mutex<Option<Arc<TaskError>>>,

    body: Mutex<Box<dyn Task<C>>>,
}

impl<C> Clone for TaskHandle<C> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<C> fmt::Debug for TaskHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("divisor", &self.0.divisor)
            .field("delay", &self.delay())
            .field("state", &self.state())
            .finish()
    }
}

impl<C> TaskHandle<C> {
    /// Wraps `body` into a task released once every `divisor` ticks.
    pub fn new<T>(name: impl Into<String>, divisor: u64, body: T) -> Result<Self, SchedulerError>
    where
        T: Task<C> + 'static,
    {
        if divisor == 0 {
            return Err(SchedulerError::InvalidDivisor);
        }

        Ok(Self(Arc::new(TaskCore {
            id: TaskId::next(),
            name: name.into(),
            divisor,
            delay: AtomicU64::new(0),
            barrier: ParkingBarrier::new(),
            state: AtomicTaskState::new(),
            shutdown_requested: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            cleanup_started: AtomicBool::new(false),
            error: Mutex::new(None),
            body: Mutex::new(Box::new(body)),
        })))
    }

    pub fn id(&self) -> TaskId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn divisor(&self) -> u64 {
        self.0.divisor
    }

    pub fn delay(&self) -> u64 {
        self.0.delay.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TaskState {
        self.0.state.load()
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.0.id,
            name: self.0.name.clone(),
            divisor: self.0.divisor,
            delay: self.delay(),
            state: self.state(),
        }
    }

    /// Whether the task is due on `tick`, i.e. `(tick - delay) mod divisor == 0`.
    ///
    /// The difference is taken without wrapping, ticks before the delay are
    /// reduced with the euclidean remainder.
    pub fn is_pending(&self, tick: u64) -> bool {
        let offset = tick as i128 - self.delay() as i128;
        offset.rem_euclid(self.0.divisor as i128) == 0
    }

    /// Shifts every future release one tick later.
    pub fn increment_delay(&self) {
        self.0.delay.fetch_add(1, Ordering::AcqRel);
    }

    /// Whether the task thread is parked on its barrier.
    pub fn is_sleeping(&self) -> bool {
        self.0.barrier.is_sleeping()
    }

    /// Wakes the task thread. Returns whether it was actually parked.
    pub(crate) fn release(&self) -> bool {
        self.0.barrier.release()
    }

    /// Asks the task thread to exit at its next wake-up, waking it if parked.
    ///
    /// Idempotent. Does not wait for the thread, see [`has_shutdown`].
    ///
    /// [`has_shutdown`]: TaskHandle::has_shutdown
    pub fn request_shutdown(&self) {
        if !self.0.shutdown_requested.swap(true, Ordering::AcqRel) {
            debug!(task = %self.0.name, id = %self.0.id, "shutdown requested");
        }
        self.0.state.request_shutdown();
        self.0.barrier.release();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.0.shutdown_requested.load(Ordering::Acquire)
    }

    /// True once `cleanup` has returned.
    pub fn has_shutdown(&self) -> bool {
        self.state() == TaskState::ShutDown
    }

    pub fn error(&self) -> Option<Arc<TaskError>> {
        self.0.error.lock().clone()
    }

    pub fn has_error(&self) -> bool {
        self.0.error.lock().is_some()
    }

    pub(crate) fn clear_error(&self) {
        self.0.error.lock().take();
    }

    /// Copies the task's output into the master context. Must only be called
    /// while the task thread is parked.
    pub(crate) fn update_master_context(&self, context: &mut C) -> Result<(), SchedulerError> {
        let mut body = self.try_lock_body()?;
        body.update_master_context(context);
        Ok(())
    }

    /// Copies the master context into the task's local view. Same restriction
    /// as [`update_master_context`].
    ///
    /// [`update_master_context`]: TaskHandle::update_master_context
    pub(crate) fn update_local_context(&self, context: &C) -> Result<(), SchedulerError> {
        let mut body = self.try_lock_body()?;
        body.update_local_context(context);
        Ok(())
    }

    fn try_lock_body(
        &self,
    ) -> Result<parking_lot::MutexGuard<'_, Box<dyn Task<C>>>, SchedulerError> {
        self.0
            .body
            .try_lock()
            .ok_or_else(|| SchedulerError::Desynchronized {
                task: self.0.name.clone(),
            })
    }

    /// Body of a dedicated task thread.
    ///
    /// Parks on the barrier, and on every release either exits (shutdown
    /// requested), idles (an error is pending) or runs one cycle. `cleanup`
    /// runs exactly once on the way out.
    pub fn run(&self) -> Result<(), SchedulerError> {
        let core = &self.0;
        registry::attach_task(core.id);
        debug!(task = %core.name, id = %core.id, divisor = core.divisor, "task thread started");

        while !core.shutdown_requested.load(Ordering::Acquire) {
            core.state.advance(TaskState::SleepingOnBarrier);

            // A concurrent `run` on the same handle is a protocol violation.
            // Bail out without touching the body, the legitimate thread still
            // owns it.
            if let Err(violation) = core.barrier.wait() {
                error!(task = %core.name, id = %core.id, %violation, "rejected task thread");
                return Err(violation.into());
            }

            if core.shutdown_requested.load(Ordering::Acquire) {
                break;
            }

            if self.has_error() {
                trace!(task = %core.name, "error pending, skipping cycle");
                continue;
            }

            self.run_cycle();
        }

        self.finish();
        debug!(task = %core.name, id = %core.id, "task thread exited");
        Ok(())
    }

    /// Runs one release cycle: lazy initialization, then `execute`. Panics are
    /// caught and stored like errors. Returns the failure, if any.
    pub(crate) fn run_cycle(&self) -> Option<Arc<TaskError>> {
        let core = &self.0;
        let mut body = core.body.lock();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<(), TaskError> {
            if !core.initialized.load(Ordering::Acquire) {
                core.state.advance(TaskState::Initializing);
                if !body.initialize().map_err(TaskError::Initialize)? {
                    trace!(task = %core.name, "initialization not complete, retrying next cycle");
                    return Ok(());
                }
                core.initialized.store(true, Ordering::Release);
                debug!(task = %core.name, id = %core.id, "task initialized");
            }

            core.state.advance(TaskState::Executing);
            body.execute().map_err(TaskError::Execute)
        }))
        .unwrap_or_else(|payload| Err(TaskError::from_panic(payload.as_ref())));

        drop(body);

        match outcome {
            Ok(()) => None,
            Err(err) => {
                warn!(task = %core.name, id = %core.id, error = %err, "task cycle failed");
                let err = Arc::new(err);
                core.error.lock().replace(Arc::clone(&err));
                Some(err)
            }
        }
    }

    /// Runs `cleanup` once and marks the task as shut down. Later calls are
    /// no-ops.
    pub(crate) fn finish(&self) {
        let core = &self.0;
        if core.cleanup_started.swap(true, Ordering::AcqRel) {
            return;
        }

        core.state.request_shutdown();
        let mut body = core.body.lock();
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| body.cleanup())) {
            let err = TaskError::from_panic(payload.as_ref());
            warn!(task = %core.name, id = %core.id, error = %err, "cleanup panicked");
        }
        drop(body);

        core.state.set_shut_down();
    }
}
