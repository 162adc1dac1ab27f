use crate::errors::SchedulerError;
use crate::rt::affinity::{self, ProcessorAffinity};
use crate::rt::registry::{self, ThreadRecord};
use crate::utils::ScopeGuard;
use crate::utils::thread::set_current_thread_name;
use anyhow::anyhow;
use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Real-time priority in the POSIX `SCHED_FIFO` range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 99;

    pub fn new(priority: u8) -> Result<Self, SchedulerError> {
        if !(Self::MIN..=Self::MAX).contains(&priority) {
            return Err(SchedulerError::InvalidPriority {
                requested: priority,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(priority))
    }

    pub fn max() -> Self {
        Self(Self::MAX)
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self(Self::MIN)
    }
}

/// Release parameters of a periodic thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodicParameters {
    pub period: Duration,

    /// Offset of the first release relative to thread start.
    pub start: Duration,
}

impl PeriodicParameters {
    #[track_caller]
    pub fn new(period: Duration) -> Self {
        assert!(!period.is_zero(), "period must be greater than 0");
        Self {
            period,
            start: Duration::ZERO,
        }
    }

    pub fn with_start(mut self, start: Duration) -> Self {
        self.start = start;
        self
    }
}

/// Everything a [`ThreadFactory`] needs to start one thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadSpec {
    pub name: String,
    pub priority: Priority,
    pub period: Option<PeriodicParameters>,
    pub stack_size: Option<usize>,

    /// Processors the thread is pinned to, empty means no pinning.
    pub cpus: Vec<usize>,
}

impl ThreadSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn period(mut self, period: PeriodicParameters) -> Self {
        self.period = Some(period);
        self
    }

    pub fn stack_size(mut self, stack_size: Option<usize>) -> Self {
        self.stack_size = stack_size;
        self
    }

    pub fn cpus(mut self, cpus: impl Into<Vec<usize>>) -> Self {
        self.cpus = cpus.into();
        self
    }
}

pub type ThreadBody = Box<dyn FnOnce() + Send + 'static>;

/// Starts the threads that run tasks and periodic drivers.
///
/// Implementations for a real-time OS apply `priority` and `period`, the
/// [`NonRealtimeThreadFactory`] only records them.
pub trait ThreadFactory: Send + Sync {
    fn spawn(&self, spec: ThreadSpec, body: ThreadBody) -> Result<JoinHandle<()>, SchedulerError>;
}

/// Plain `std::thread` factory.
///
/// Names the thread, pins it when `cpus` is set and keeps it in the
/// [`registry`] for its whole lifetime. Priority and period are recorded but
/// not applied.
///
/// [`registry`]: crate::rt::registry
#[derive(Clone)]
pub struct NonRealtimeThreadFactory {
    affinity: Arc<dyn ProcessorAffinity>,
}

impl Default for NonRealtimeThreadFactory {
    fn default() -> Self {
        Self {
            affinity: affinity::platform_default(),
        }
    }
}

impl std::fmt::Debug for NonRealtimeThreadFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonRealtimeThreadFactory")
            .field("affinity", &"<dyn ProcessorAffinity>")
            .finish()
    }
}

impl NonRealtimeThreadFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_affinity(affinity: Arc<dyn ProcessorAffinity>) -> Self {
        Self { affinity }
    }
}

impl ThreadFactory for NonRealtimeThreadFactory {
    /// Returns once the thread is named, pinned and registered. A failed pin
    /// is returned as an error and the body never runs.
    fn spawn(&self, spec: ThreadSpec, body: ThreadBody) -> Result<JoinHandle<()>, SchedulerError> {
        let mut builder = thread::Builder::new().name(spec.name.clone());
        if let Some(stack_size) = spec.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let name = spec.name.clone();
        let affinity = Arc::clone(&self.affinity);
        let (ready_tx, ready_rx) = mpsc::sync_channel::<anyhow::Result<()>>(1);

        let handle = builder.spawn(move || {
            set_current_thread_name(&spec.name);

            if !spec.cpus.is_empty() {
                if let Err(e) = affinity.pin_current_thread(&spec.cpus) {
                    let e = e.context(format!("failed to pin thread to cpus {:?}", spec.cpus));
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            }

            let id = registry::register_current(ThreadRecord {
                name: spec.name.clone(),
                priority: spec.priority,
                period: spec.period,
                task: None,
            });
            let _registration = ScopeGuard::new(move || registry::unregister(id));

            if ready_tx.send(Ok(())).is_err() {
                return;
            }
            drop(ready_tx);

            debug!(thread = %spec.name, priority = spec.priority.get(), "thread started");
            body();
        })?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(anyhow!("thread exited before starting")));

        if let Err(e) = started {
            if handle.join().is_err() {
                warn!(thread = %name, "thread panicked during startup");
            }
            error!(thread = %name, error = %e, "failed to start thread");
            return Err(e.into());
        }

        Ok(handle)
    }
}
