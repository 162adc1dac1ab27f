use crate::errors::{SchedulerError, StateViolation};
use crate::rt::{MonotonicClock, PeriodicParameters, ThreadFactory, ThreadSpec};
use crate::runtime::{Schedule, TickEvents};
use anyhow::anyhow;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Calls a scheduler's `run()` at a fixed rate on a dedicated thread.
///
/// Releases are computed from absolute deadlines (`start + n * period`) on a
/// [`MonotonicClock`], so late ticks do not shift later ones. When a tick
/// takes longer than a period, the missed deadlines are dropped rather than
/// replayed back to back.
///
/// The driver stops on [`stop`], on the first tick error, or when the
/// scheduler reports it is shut down.
///
/// [`stop`]: PeriodicDriver::stop
pub struct PeriodicDriver<S: Schedule + Send + 'static> {
    shared: Arc<Shared<S>>,
    thread: Option<JoinHandle<()>>,
}

struct Shared<S> {
    scheduler: Mutex<S>,
    stop: AtomicBool,
    paused: AtomicBool,
    finished: AtomicBool,
    ticks: AtomicU64,
    missed: AtomicU64,
    error: Mutex<Option<SchedulerError>>,
}

/// Result of [`PeriodicDriver::stop`].
#[derive(Debug)]
pub struct Stopped<S> {
    pub scheduler: S,

    /// Error that ended the driver loop, if it did not stop on request.
    pub error: Option<SchedulerError>,

    /// Ticks run by the driver.
    pub ticks: u64,

    /// Deadlines dropped because a tick overran the period.
    pub missed: u64,
}

impl<S: Schedule + Send + 'static> PeriodicDriver<S> {
    /// Spawns the driver thread through `factory`. `spec.period` is replaced
    /// by `period`.
    pub fn start(
        scheduler: S,
        period: PeriodicParameters,
        factory: &dyn ThreadFactory,
        spec: ThreadSpec,
        clock: Arc<dyn MonotonicClock>,
    ) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared {
            scheduler: Mutex::new(scheduler),
            stop: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            missed: AtomicU64::new(0),
            error: Mutex::new(None),
        });

        let thread = {
            let shared = Arc::clone(&shared);
            factory.spawn(
                spec.period(period),
                Box::new(move || drive(&shared, period, clock.as_ref())),
            )?
        };

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Ticks run so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Acquire)
    }

    /// Deadlines dropped so far.
    pub fn missed(&self) -> u64 {
        self.shared.missed.load(Ordering::Acquire)
    }

    /// False once the driver loop exited on its own.
    pub fn is_running(&self) -> bool {
        !self.shared.finished.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Acquire)
    }

    /// Suspends ticking. When this returns no tick is in progress and none
    /// will start before [`resume`].
    ///
    /// [`resume`]: PeriodicDriver::resume
    pub fn pause(&self) {
        self.shared.paused.store(true, Ordering::Release);
        // Waits out a tick in flight, the loop re-checks the flag under the
        // same lock.
        drop(self.shared.scheduler.lock());
    }

    /// Resumes ticking. The next deadline is one period from now.
    pub fn resume(&self) {
        self.shared.paused.store(false, Ordering::Release);
        if let Some(thread) = &self.thread {
            thread.thread().unpark();
        }
    }

    /// Runs `f` on the scheduler while the driver is paused or finished.
    pub fn with_scheduler<R>(&self, f: impl FnOnce(&mut S) -> R) -> Result<R, SchedulerError> {
        if self.is_running() && !self.is_paused() {
            return Err(StateViolation::SchedulerRunning.into());
        }
        Ok(f(&mut self.shared.scheduler.lock()))
    }

    /// [`Schedule::wait_until_tasks_done`] on the driven scheduler. Fails with
    /// `StateViolation::SchedulerRunning` unless the driver is paused or
    /// finished.
    pub fn wait_until_tasks_done(&self) -> Result<(), SchedulerError> {
        self.with_scheduler(|scheduler| scheduler.wait_until_tasks_done())?
    }

    /// Stops the loop, joins the driver thread and hands the scheduler back.
    ///
    /// The scheduler is not shut down.
    pub fn stop(mut self) -> Result<Stopped<S>, SchedulerError> {
        self.join()?;

        let shared = Arc::clone(&self.shared);
        drop(self);

        let shared = Arc::try_unwrap(shared)
            .map_err(|_| anyhow!("periodic driver state still shared after join"))?;

        Ok(Stopped {
            scheduler: shared.scheduler.into_inner(),
            error: shared.error.into_inner(),
            ticks: shared.ticks.into_inner(),
            missed: shared.missed.into_inner(),
        })
    }

    fn join(&mut self) -> Result<(), SchedulerError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.shared.stop.store(true, Ordering::Release);
        thread.thread().unpark();
        thread
            .join()
            .map_err(|_| anyhow!("periodic driver thread panicked"))?;
        Ok(())
    }
}

impl<S: Schedule + Send + 'static> Drop for PeriodicDriver<S> {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            error!(error = %e, "failed to stop periodic driver");
        }
    }
}

fn drive<S: Schedule>(shared: &Shared<S>, params: PeriodicParameters, clock: &dyn MonotonicClock) {
    let mut deadline = clock.now() + params.start;
    debug!(period = ?params.period, "periodic driver started");

    while !shared.stop.load(Ordering::Acquire) {
        if shared.paused.load(Ordering::Acquire) {
            thread::park();
            deadline = clock.now() + params.period;
            continue;
        }

        sleep_until(clock, deadline);

        let mut scheduler = shared.scheduler.lock();
        if shared.stop.load(Ordering::Acquire) || shared.paused.load(Ordering::Acquire) {
            continue;
        }

        let result = scheduler.run();
        drop(scheduler);

        match result {
            Ok(events) if events.contains(TickEvents::SHUTDOWN) => {
                debug!("scheduler shut down, stopping driver");
                break;
            }
            Ok(_) => {
                shared.ticks.fetch_add(1, Ordering::AcqRel);
            }
            Err(e) => {
                error!(error = %e, fatal = e.is_fatal(), "tick failed, stopping driver");
                shared.ticks.fetch_add(1, Ordering::AcqRel);
                shared.error.lock().replace(e);
                break;
            }
        }

        deadline += params.period;
        let now = clock.now();
        if now > deadline {
            let behind = (now - deadline).as_nanos() / params.period.as_nanos();
            let missed = u64::try_from(behind).unwrap_or(u64::MAX).saturating_add(1);
            shared.missed.fetch_add(missed, Ordering::AcqRel);
            deadline += params.period * u32::try_from(missed).unwrap_or(u32::MAX);
            warn!(missed, "tick overran its period, skipping deadlines");
        }
    }

    shared.finished.store(true, Ordering::Release);
    debug!("periodic driver exited");
}

fn sleep_until(clock: &dyn MonotonicClock, deadline: Duration) {
    let now = clock.now();
    if deadline > now {
        thread::sleep(deadline - now);
    }
}
