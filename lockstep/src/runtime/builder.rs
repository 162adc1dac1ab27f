use crate::errors::SchedulerError;
use crate::rt::Priority;
use crate::runtime::{BarrierScheduler, OnTaskError, OverrunBehavior, SingleThreadedScheduler};
use crate::task::{TaskError, TaskHandle, TaskInfo};
use crate::utils::sys;
use anyhow::anyhow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Poll interval of `OverrunBehavior::BusyWait`. Should be much shorter than
/// the fastest task period.
const BUSY_WAIT_RESOLUTION: Duration = Duration::from_micros(10);

#[derive(Clone)]
pub(crate) struct TaskErrorHandler(
    pub(crate) Arc<dyn Fn(&TaskInfo, &TaskError) -> OnTaskError + Send + Sync + 'static>,
);

impl fmt::Debug for TaskErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskErrorHandler").field(&"<function>").finish()
    }
}

fn default_task_error_handler() -> TaskErrorHandler {
    TaskErrorHandler(Arc::new(|_, _| OnTaskError::default()))
}

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn(&TaskInfo) -> String + Send + Sync + 'static>);

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

fn default_thread_name_fn() -> ThreadNameFn {
    ThreadNameFn(Arc::new(|info| info.name.clone()))
}

/// Configures and builds a scheduler over a fixed set of tasks.
///
/// ```ignore
/// let scheduler = Builder::new()
///     .overrun_behavior(OverrunBehavior::BusyWait)
///     .on_task_error(|_, _| OnTaskError::Resume)
///     .build_barrier(tasks, Context::default())?;
/// ```
#[derive(Debug)]
pub struct Builder {
    overrun_behavior: OverrunBehavior,

    /// How long `BusyWait` sleeps between two checks.
    busy_wait_resolution: Duration,

    /// Consulted once per tick for every task holding an error.
    on_task_error: TaskErrorHandler,

    /// Name of each task thread, derived from the task.
    thread_name: ThreadNameFn,

    thread_stack_size: Option<usize>,

    /// Priority requested for every task thread. Validated at build time.
    task_priority: u8,

    /// Processors task threads are pinned to, empty means no pinning.
    task_cpus: Vec<usize>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Self {
        Self {
            overrun_behavior: OverrunBehavior::default(),
            busy_wait_resolution: BUSY_WAIT_RESOLUTION,
            on_task_error: default_task_error_handler(),
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            task_priority: Priority::MIN,
            task_cpus: Vec::new(),
        }
    }

    /// Defaults to [`OverrunBehavior::SkipTick`].
    pub fn overrun_behavior(mut self, val: OverrunBehavior) -> Self {
        self.overrun_behavior = val;
        self
    }

    /// Sleep between two overrun checks under [`OverrunBehavior::BusyWait`].
    ///
    /// Defaults to 10µs.
    #[track_caller]
    pub fn busy_wait_resolution(mut self, val: Duration) -> Self {
        assert!(!val.is_zero(), "busy_wait_resolution must be greater than 0");
        self.busy_wait_resolution = val;
        self
    }

    /// Sets the handler deciding what to do with a failed task.
    ///
    /// The default handler shuts the scheduler down on the first error.
    pub fn on_task_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskInfo, &TaskError) -> OnTaskError + Send + Sync + 'static,
    {
        self.on_task_error = TaskErrorHandler(Arc::new(f));
        self
    }

    /// Sets a function naming each task thread. Defaults to the task name.
    ///
    /// Thread names are truncated beyond 15 bytes according to pthread
    /// limitations.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&TaskInfo) -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for task threads.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(
            val.is_power_of_two(),
            "thread_stack_size must be a power of two"
        );
        self.thread_stack_size = Some(val);
        self
    }

    /// Real-time priority requested for task threads, in
    /// `[Priority::MIN, Priority::MAX]`.
    pub fn task_priority(mut self, val: u8) -> Self {
        self.task_priority = val;
        self
    }

    pub fn task_cpus(mut self, cpus: impl Into<Vec<usize>>) -> Self {
        self.task_cpus = cpus.into();
        self
    }

    /// Builds a scheduler driving one thread per task.
    ///
    /// Threads are not started, see [`BarrierScheduler::start_tasks`].
    pub fn build_barrier<C>(
        self,
        tasks: Vec<TaskHandle<C>>,
        context: C,
    ) -> Result<BarrierScheduler<C>, SchedulerError> {
        check_unique(&tasks)?;
        let cfg: SchedulerConfig = self.try_into()?;
        Ok(BarrierScheduler::new(cfg, tasks, context))
    }

    /// Builds a scheduler running every task inline on the caller's thread.
    pub fn build_single_threaded<C>(
        self,
        tasks: Vec<TaskHandle<C>>,
        context: C,
    ) -> Result<SingleThreadedScheduler<C>, SchedulerError> {
        check_unique(&tasks)?;
        let cfg: SchedulerConfig = self.try_into()?;
        Ok(SingleThreadedScheduler::new(cfg, tasks, context))
    }
}

/// A handle registered twice would be released twice on the same tick.
fn check_unique<C>(tasks: &[TaskHandle<C>]) -> Result<(), SchedulerError> {
    let mut seen = HashSet::with_capacity(tasks.len());
    for task in tasks {
        if !seen.insert(task.id()) {
            return Err(anyhow!("task {} ({}) registered twice", task.name(), task.id()).into());
        }
    }
    Ok(())
}

/// Rejects cpu indices the system does not have.
///
/// Whether a cpu is actually allowed for this process (cgroup cpuset) is
/// only known when a thread pins itself, and is reported by the thread
/// factory at spawn time.
fn check_cpus(cpus: &[usize], configured: usize) -> Result<(), SchedulerError> {
    if let Some(cpu) = cpus.iter().find(|cpu| **cpu >= configured) {
        return Err(
            anyhow!("task cpu {cpu} out of range, {configured} processors configured").into(),
        );
    }
    Ok(())
}

// Validated builder output, shared by both scheduler flavors.
#[derive(Debug, Clone)]
pub(crate) struct SchedulerConfig {
    pub(crate) overrun_behavior: OverrunBehavior,
    pub(crate) busy_wait_resolution: Duration,
    pub(crate) on_task_error: TaskErrorHandler,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) task_priority: Priority,
    pub(crate) task_cpus: Vec<usize>,
}

impl SchedulerConfig {
    pub(crate) fn handle_task_error(&self, info: &TaskInfo, err: &TaskError) -> OnTaskError {
        (self.on_task_error.0)(info, err)
    }

    pub(crate) fn thread_name(&self, info: &TaskInfo) -> String {
        (self.thread_name.0)(info)
    }
}

impl TryFrom<Builder> for SchedulerConfig {
    type Error = SchedulerError;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let task_priority = Priority::new(builder.task_priority)?;

        check_cpus(&builder.task_cpus, sys::configured_processors()?)?;

        Ok(SchedulerConfig {
            overrun_behavior: builder.overrun_behavior,
            busy_wait_resolution: builder.busy_wait_resolution,
            on_task_error: builder.on_task_error,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            task_priority,
            task_cpus: builder.task_cpus,
        })
    }
}
