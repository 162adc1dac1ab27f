use crate::errors::SchedulerError;
use crate::runtime::{OnTaskError, Schedule, SchedulerConfig, TickEvents, Ticker};
use crate::task::TaskHandle;
use tracing::{debug, error, trace, warn};

/// Runs the same tasks as [`BarrierScheduler`] sequentially on the calling
/// thread. No task threads, no barriers: `run` returns once every due task
/// completed its cycle. Meant for deterministic simulation and tests.
///
/// [`BarrierScheduler`]: crate::runtime::BarrierScheduler
#[derive(Debug)]
pub struct SingleThreadedScheduler<C> {
    cfg: SchedulerConfig,
    tasks: Vec<TaskHandle<C>>,
    context: C,
    ticker: Ticker,
    shut_down: bool,
}

impl<C> SingleThreadedScheduler<C> {
    pub(crate) fn new(cfg: SchedulerConfig, tasks: Vec<TaskHandle<C>>, context: C) -> Self {
        Self {
            cfg,
            tasks,
            context,
            ticker: Ticker::new(),
            shut_down: false,
        }
    }

    /// Bubbles every due task up, then down, then runs their cycles in task
    /// order.
    pub fn run(&mut self) -> Result<TickEvents, SchedulerError> {
        if self.shut_down {
            return Ok(TickEvents::SHUTDOWN);
        }

        let tick = self.ticker.current();
        let mut events = TickEvents::empty();

        for task in self.tasks.iter().filter(|t| t.is_pending(tick)) {
            task.update_master_context(&mut self.context)?;
        }

        for task in self.tasks.iter().filter(|t| t.is_pending(tick)) {
            task.update_local_context(&self.context)?;
        }

        let mut failed = None;
        for task in self.tasks.iter().filter(|t| t.is_pending(tick)) {
            events |= TickEvents::RELEASED;

            let Some(err) = task.run_cycle() else {
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

    /// Runs `cleanup` on every task, once.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        for task in &self.tasks {
            task.request_shutdown();
            task.finish();
        }

        self.shut_down = true;
        debug!(tick = self.ticker.current(), "scheduler shut down");
    }

    /// Tasks are always idle between two `run` calls, this only performs the
    /// final bubble up and down.
    pub fn wait_until_tasks_done(&mut self) -> Result<(), SchedulerError> {
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

impl<C> Drop for SingleThreadedScheduler<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl<C> Schedule for SingleThreadedScheduler<C> {
    fn run(&mut self) -> Result<TickEvents, SchedulerError> {
        SingleThreadedScheduler::run(self)
    }

    fn shutdown(&mut self) {
        SingleThreadedScheduler::shutdown(self)
    }

    fn wait_until_tasks_done(&mut self) -> Result<(), SchedulerError> {
        SingleThreadedScheduler::wait_until_tasks_done(self)
    }

    fn tick(&self) -> u64 {
        self.ticker.current()
    }
}
