use crate::task::{Task, TaskHandle};
use anyhow::anyhow;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Master context shared by the scheduler tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct TestContext {
    /// Bumped by every writer task on each master update.
    pub counter: u64,
}

/// Counters observed from outside a [`RecordingTask`].
#[derive(Debug, Default)]
pub(crate) struct Spy {
    pub init_attempts: AtomicUsize,
    pub executed: AtomicUsize,
    pub cleaned_up: AtomicUsize,
    pub master_updates: AtomicUsize,
    pub local_updates: AtomicUsize,

    /// `counter` values received through local updates.
    pub seen: Mutex<Vec<u64>>,
}

impl Spy {
    pub(crate) fn executed(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    pub(crate) fn init_attempts(&self) -> usize {
        self.init_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn cleaned_up(&self) -> usize {
        self.cleaned_up.load(Ordering::SeqCst)
    }

    pub(crate) fn master_updates(&self) -> usize {
        self.master_updates.load(Ordering::SeqCst)
    }

    pub(crate) fn local_updates(&self) -> usize {
        self.local_updates.load(Ordering::SeqCst)
    }

    pub(crate) fn seen(&self) -> Vec<u64> {
        self.seen.lock().clone()
    }
}

/// Configurable task that records every hook invocation into a [`Spy`].
#[derive(Debug)]
pub(crate) struct RecordingTask {
    spy: Arc<Spy>,
    writer: bool,
    not_ready_for: usize,
    fail_init: bool,
    fail_at: Option<usize>,
    panic_at: Option<usize>,
}

impl RecordingTask {
    pub(crate) fn new(spy: &Arc<Spy>) -> Self {
        Self {
            spy: Arc::clone(spy),
            writer: false,
            not_ready_for: 0,
            fail_init: false,
            fail_at: None,
            panic_at: None,
        }
    }

    /// Increments `TestContext::counter` on every master update.
    pub(crate) fn writer(mut self) -> Self {
        self.writer = true;
        self
    }

    /// `initialize` reports "not ready" for the first `attempts` calls.
    pub(crate) fn not_ready_for(mut self, attempts: usize) -> Self {
        self.not_ready_for = attempts;
        self
    }

    pub(crate) fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// The n-th `execute` (1-based) returns an error.
    pub(crate) fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// The n-th `execute` (1-based) panics.
    pub(crate) fn panic_at(mut self, n: usize) -> Self {
        self.panic_at = Some(n);
        self
    }
}

impl Task<TestContext> for RecordingTask {
    fn initialize(&mut self) -> anyhow::Result<bool> {
        let attempt = self.spy.init_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_init {
            return Err(anyhow!("init attempt {attempt} failed"));
        }
        Ok(attempt > self.not_ready_for)
    }

    fn execute(&mut self) -> anyhow::Result<()> {
        let n = self.spy.executed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_at == Some(n) {
            panic!("execute {n} panicked");
        }
        if self.fail_at == Some(n) {
            return Err(anyhow!("execute {n} failed"));
        }
        Ok(())
    }

    fn cleanup(&mut self) {
        self.spy.cleaned_up.fetch_add(1, Ordering::SeqCst);
    }

    fn update_master_context(&mut self, context: &mut TestContext) {
        self.spy.master_updates.fetch_add(1, Ordering::SeqCst);
        if self.writer {
            context.counter += 1;
        }
    }

    fn update_local_context(&mut self, context: &TestContext) {
        self.spy.local_updates.fetch_add(1, Ordering::SeqCst);
        self.spy.seen.lock().push(context.counter);
    }
}

pub(crate) fn recording_task(
    name: &str,
    divisor: u64,
    configure: impl FnOnce(RecordingTask) -> RecordingTask,
) -> (TaskHandle<TestContext>, Arc<Spy>) {
    let spy = Arc::new(Spy::default());
    let task = configure(RecordingTask::new(&spy));
    let handle = TaskHandle::new(name, divisor, task).expect("valid divisor");
    (handle, spy)
}

/// Spins until `cond` holds, failing the test after 5 seconds.
#[track_caller]
pub(crate) fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(
            start.elapsed() < Duration::from_secs(5),
            "timed out waiting for {what}"
        );
        thread::sleep(Duration::from_micros(50));
    }
}

