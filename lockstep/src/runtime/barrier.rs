use crate::errors::{SchedulerError, StateViolation};
use crate::rt::{ThreadFactory, ThreadSpec};
use crate::runtime::{OnTaskError, OverrunBehavior, Schedule, SchedulerConfig, TickEvents, Ticker};
use crate::task::TaskHandle;
use anyhow::anyhow;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, trace, warn};

/// Releases tasks in lock-step at integer divisors of its own tick rate.
///
/// Every task runs on its own thread and parks on its barrier between cycles.
/// The scheduler owns the master context: on each tick it copies the previous
/// output of every due task into it, copies it back down into those tasks,
/// then releases them. Tasks therefore only ever touch the context from the
/// scheduler's thread, while they are parked.
///
/// [`run`] must be called at a fixed rate by an external driver, see
/// [`PeriodicDriver`].
///
/// [`run`]: BarrierScheduler::run
/// [`PeriodicDriver`]: crate::rt::PeriodicDriver
#[derive(Debug)]
pub struct BarrierScheduler<C> {
    cfg: SchedulerConfig,

    tasks: Vec<TaskHandle<C>>,

    /// Per-tick snapshot of "pending and parked". Taken once per tick so a
    /// task falling asleep mid-tick cannot be half processed.
    release_tasks: Vec<bool>,

    /// Task threads, aligned with `tasks`. `None` until started.
    threads: Vec<Option<JoinHandle<()>>>,

    context: C,

    ticker: Ticker,

    started: bool,
    shut_down: bool,
}

impl<C> BarrierScheduler<C> {
    pub(crate) fn new(cfg: SchedulerConfig, tasks: Vec<TaskHandle<C>>, context: C) -> Self {
        let n = tasks.len();
        Self {
            cfg,
            tasks,
            release_tasks: vec![false; n],
            threads: (0..n).map(|_| None).collect(),
            context,
            ticker: Ticker::new(),
            started: false,
            shut_down: false,
        }
    }

    /// Starts one thread per task through `factory`.
    ///
    /// Threads are named by the builder's `thread_name_fn` and requested at
    /// the configured task priority.
    pub fn start_tasks(&mut self, factory: &dyn ThreadFactory) -> Result<(), SchedulerError>
    where
        C: 'static,
    {
        if self.started {
            return Err(anyhow!("task threads already started").into());
        }
        self.started = true;

        for (task, slot) in self.tasks.iter().zip(self.threads.iter_mut()) {
            let spec = ThreadSpec::new(self.cfg.thread_name(&task.info()))
                .priority(self.cfg.task_priority)
                .stack_size(self.cfg.thread_stack_size)
                .cpus(self.cfg.task_cpus.clone());

            let handle = task.clone();
            let thread = factory.spawn(
                spec,
                Box::new(move || {
                    if let Err(e) = handle.run() {
                        error!(task = %handle.name(), error = %e, "task thread failed");
                    }
                }),
            )?;

            slot.replace(thread);
        }

        debug!(tasks = self.tasks.len(), "task threads started");
        Ok(())
    }

    /// Processes one tick.
    ///
    /// Returns `TaskFailed` after shutting every task down when the error
    /// handler does not resume a failed task. Fatal errors mean the scheduler
    /// and its tasks are out of sync, the scheduler should not be ticked
    /// again.
    pub fn run(&mut self) -> Result<TickEvents, SchedulerError> {
        if self.shut_down {
            return Ok(TickEvents::SHUTDOWN);
        }

        let tick = self.ticker.current();
        let mut events = TickEvents::empty();

        if self.cfg.overrun_behavior == OverrunBehavior::BusyWait && !self.all_tasks_on_schedule() {
            events |= TickEvents::OVERRUN;
            trace!(tick, "waiting for overrunning tasks");

            while !self.all_tasks_on_schedule() {
                thread::sleep(self.cfg.busy_wait_resolution);
            }
        }

        for (release, task) in self.release_tasks.iter_mut().zip(&self.tasks) {
            let pending = task.is_pending(tick);
            *release = pending && task.is_sleeping();

            if pending && !*release && !task.has_shutdown() {
                events |= TickEvents::OVERRUN;
                warn!(tick, task = %task.name(), "task overran, skipping release");
            }
        }

        // Copies the output of the task's previous cycle. Copying as soon as
        // a task parks would be fresher but adds jitter.
        for task in released(&self.tasks, &self.release_tasks) {
            task.update_master_context(&mut self.context)
                .inspect_err(|e| error!(tick, error = %e, "bubble up failed"))?;
        }

        for task in released(&self.tasks, &self.release_tasks) {
            task.update_local_context(&self.context)
                .inspect_err(|e| error!(tick, error = %e, "bubble down failed"))?;
        }

        for task in released(&self.tasks, &self.release_tasks) {
            if !task.release() {
                error!(tick, task = %task.name(), "tried to release a task that was not waiting");
                return Err(StateViolation::ReleaseWithoutWaiter.into());
            }
            events |= TickEvents::RELEASED;
        }

        let mut failed = None;
        for task in &self.tasks {
            let Some(err) = task.error() else {
                continue;
            };
            events |= TickEvents::TASK_ERROR;

            match self.cfg.handle_task_error(&task.info(), &err) {
                OnTaskError::Resume => {
                    warn!(tick, task = %task.name(), error = %err, "resuming failed task");
                    task.clear_error();
                    events |= TickEvents::RESUMED;
                }
                OnTaskError::Shutdown => {
                    failed = Some((task.name().to_owned(), err));
                    break;
                }
            }
        }

        if let Some((task, source)) = failed {
            error!(tick, task = %task, error = %source, "task failed, shutting down");
            self.shutdown();
            return Err(SchedulerError::TaskFailed { task, source });
        }

        trace!(tick, ?events, "tick processed");
        self.ticker.advance();
        Ok(events)
    }

    /// True iff every task due this tick is parked.
    fn all_tasks_on_schedule(&self) -> bool {
        let tick = self.ticker.current();
        self.tasks
            .iter()
            .all(|task| !task.is_pending(tick) || task.is_sleeping() || task.has_shutdown())
    }

    fn is_idle(&self, i: usize) -> bool {
        let task = &self.tasks[i];
        self.threads[i].is_none() || task.is_sleeping() || task.has_shutdown()
    }

    /// Stops every task and joins the task threads. Blocking, idempotent.
    ///
    /// A task in the middle of `execute` is never interrupted, shutdown waits
    /// for the cycle to end.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        for (task, slot) in self.tasks.iter().zip(self.threads.iter_mut()) {
            match slot.take() {
                Some(thread) => {
                    while !task.has_shutdown() {
                        if thread.is_finished() {
                            // The thread left without cleaning up.
                            task.finish();
                            break;
                        }
                        task.request_shutdown();
                        thread::yield_now();
                    }

                    if thread.join().is_err() {
                        error!(task = %task.name(), "task thread panicked");
                    }
                }
                None => {
                    task.request_shutdown();
                    task.finish();
                }
            }
        }

        self.shut_down = true;
        debug!(tick = self.ticker.current(), "scheduler shut down");
    }

    /// Blocks until every task is parked, then bubbles every task's output up
    /// and the master context back down one last time.
    ///
    /// Only meaningful while nobody ticks the scheduler, which `&mut self`
    /// guarantees.
    pub fn wait_until_tasks_done(&mut self) -> Result<(), SchedulerError> {
        while !(0..self.tasks.len()).all(|i| self.is_idle(i)) {
            thread::sleep(self.cfg.busy_wait_resolution);
        }

        for task in self.tasks.iter().filter(|t| !t.has_shutdown()) {
            task.update_master_context(&mut self.context)?;
        }

        for task in self.tasks.iter().filter(|t| !t.has_shutdown()) {
            task.update_local_context(&self.context)?;
        }

        Ok(())
    }

    pub fn tick(&self) -> u64 {
        self.ticker.current()
    }

    pub fn tasks(&self) -> &[TaskHandle<C>] {
        &self.tasks
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down
    }
}

impl<C> Drop for BarrierScheduler<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C> Schedule for BarrierScheduler<C> {
    fn run(&mut self) -> Result<TickEvents, SchedulerError> {
        BarrierScheduler::run(self)
    }

    fn shutdown(&mut self) {
        BarrierScheduler::shutdown(self)
    }

    fn wait_until_tasks_done(&mut self) -> Result<(), SchedulerError> {
        BarrierScheduler::wait_until_tasks_done(self)
    }

    fn tick(&self) -> u64 {
        self.ticker.current()
    }
}

/// Tasks marked for release in the current tick's snapshot.
fn released<'a, C>(
    tasks: &'a [TaskHandle<C>],
    release_tasks: &'a [bool],
) -> impl Iterator<Item = &'a TaskHandle<C>> {
    tasks
        .iter()
        .zip(release_tasks)
        .filter_map(|(task, release)| release.then_some(task))
}
