use super::*;
use crate::errors::SchedulerError;
use crate::test_utils::*;
use anyhow::Result;
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::sync::{Arc, mpsc};
use std::thread;

assert_impl_all!(TaskHandle<TestContext>: Send, Sync, Clone);
assert_impl_all!(TaskError: Send, Sync);

#[test]
fn test_zero_divisor_is_rejected() {
    let spy = Arc::new(Spy::default());
    let res = TaskHandle::new("zero", 0, RecordingTask::new(&spy));
    assert!(matches!(res, Err(SchedulerError::InvalidDivisor)));
}

#[rstest]
#[case::every_tick(1, 0, 7, true)]
#[case::on_period(10, 0, 20, true)]
#[case::off_period(10, 0, 21, false)]
#[case::first_tick(10, 0, 0, true)]
#[case::delayed_on(10, 3, 13, true)]
#[case::delayed_off(10, 3, 10, false)]
#[case::before_delay(5, 7, 2, true)]
#[case::before_delay_off(5, 7, 3, false)]
fn test_is_pending(
    #[case] divisor: u64,
    #[case] delay: u64,
    #[case] tick: u64,
    #[case] expected: bool,
) {
    let (handle, _spy) = recording_task("pending", divisor, |t| t);
    for _ in 0..delay {
        handle.increment_delay();
    }
    assert_eq!(handle.delay(), delay);
    assert_eq!(handle.is_pending(tick), expected);
}

#[rstest]
#[case::every_tick(1, 100)]
#[case::every_tenth(10, 10)]
#[case::every_seventh(7, 15)]
fn test_release_count_over_hundred_ticks(#[case] divisor: u64, #[case] expected: usize) {
    let (handle, _spy) = recording_task("count", divisor, |t| t);
    let released = (0..100).filter(|tick| handle.is_pending(*tick)).count();
    assert_eq!(released, expected);
}

#[test]
fn test_initialize_is_retried_until_ready() {
    let (handle, spy) = recording_task("lazy", 1, |t| t.not_ready_for(2));

    assert!(handle.run_cycle().is_none());
    assert!(handle.run_cycle().is_none());
    assert_eq!(spy.init_attempts(), 2);
    assert_eq!(spy.executed(), 0);

    assert!(handle.run_cycle().is_none());
    assert_eq!(spy.init_attempts(), 3);
    assert_eq!(spy.executed(), 1);

    // Initialized once for good.
    assert!(handle.run_cycle().is_none());
    assert_eq!(spy.init_attempts(), 3);
    assert_eq!(spy.executed(), 2);
    assert_eq!(handle.state(), TaskState::Executing);
}

#[test]
fn test_failures_are_stored_on_the_handle() {
    let (handle, spy) = recording_task("fails", 1, |t| t.fail_at(2));

    assert!(handle.run_cycle().is_none());
    let err = handle.run_cycle().expect("second execute fails");
    assert!(matches!(*err, TaskError::Execute(_)));
    assert!(handle.has_error());
    assert_eq!(spy.executed(), 2);

    handle.clear_error();
    assert!(!handle.has_error());
    assert!(handle.error().is_none());
}

#[test]
fn test_init_failure_is_stored() {
    let (handle, spy) = recording_task("bad-init", 1, |t| t.fail_init());

    let err = handle.run_cycle().expect("init fails");
    assert!(matches!(*err, TaskError::Initialize(_)));
    assert_eq!(spy.executed(), 0);
}

#[test]
fn test_panics_are_caught() {
    let (handle, _spy) = recording_task("panics", 1, |t| t.panic_at(1));

    let err = handle.run_cycle().expect("execute panics");
    assert!(matches!(&*err, TaskError::Panicked(msg) if msg == "execute 1 panicked"));
    assert!(matches!(handle.error().as_deref(), Some(TaskError::Panicked(_))));
}

#[test]
fn test_cleanup_runs_once() {
    let (handle, spy) = recording_task("cleanup", 1, |t| t);

    assert!(!handle.has_shutdown());
    handle.finish();
    handle.finish();

    assert!(handle.has_shutdown());
    assert_eq!(spy.cleaned_up(), 1);
    assert_eq!(handle.state(), TaskState::ShutDown);
}

#[test]
fn test_task_thread_lifecycle() -> Result<()> {
    let (handle, spy) = recording_task("thread", 1, |t| t);
    assert_eq!(handle.state(), TaskState::New);

    let worker = {
        let handle = handle.clone();
        thread::spawn(move || handle.run())
    };

    wait_until("task parked", || handle.is_sleeping());
    assert_eq!(handle.state(), TaskState::SleepingOnBarrier);
    assert_eq!(spy.executed(), 0);

    for cycle in 1..=3 {
        assert!(handle.release());
        wait_until("cycle done", || spy.executed() == cycle && handle.is_sleeping());
    }

    handle.request_shutdown();
    worker.join().expect("task thread panicked")?;

    assert!(handle.has_shutdown());
    assert_eq!(spy.executed(), 3);
    assert_eq!(spy.cleaned_up(), 1);
    Ok(())
}

#[test]
fn test_pending_error_skips_cycles() -> Result<()> {
    let (handle, spy) = recording_task("error", 1, |t| t.fail_at(1));

    let worker = {
        let handle = handle.clone();
        thread::spawn(move || handle.run())
    };

    wait_until("task parked", || handle.is_sleeping());
    handle.release();
    wait_until("first cycle", || handle.has_error() && handle.is_sleeping());

    // Released again with the error still pending: no execute.
    handle.release();
    wait_until("task parked", || handle.is_sleeping());
    assert_eq!(spy.executed(), 1);

    handle.clear_error();
    handle.release();
    wait_until("second execute", || spy.executed() == 2 && handle.is_sleeping());

    handle.request_shutdown();
    worker.join().expect("task thread panicked")?;
    Ok(())
}

#[test]
fn test_shutdown_before_start() -> Result<()> {
    let (handle, spy) = recording_task("early", 1, |t| t);
    handle.request_shutdown();
    assert_eq!(handle.state(), TaskState::ShutdownRequested);

    let worker = {
        let handle = handle.clone();
        thread::spawn(move || handle.run())
    };
    worker.join().expect("task thread panicked")?;

    assert!(handle.has_shutdown());
    assert_eq!(spy.executed(), 0);
    assert_eq!(spy.cleaned_up(), 1);
    Ok(())
}

#[test]
fn test_second_task_thread_is_rejected() -> Result<()> {
    let (handle, spy) = recording_task("dup", 1, |t| t);

    let first = {
        let handle = handle.clone();
        thread::spawn(move || handle.run())
    };
    wait_until("task parked", || handle.is_sleeping());

    let second = {
        let handle = handle.clone();
        thread::spawn(move || handle.run())
    };
    let err = second.join().expect("task thread panicked").unwrap_err();
    assert!(err.is_fatal());

    // Rejected thread did not clean up behind the legitimate one.
    assert_eq!(spy.cleaned_up(), 0);

    handle.request_shutdown();
    first.join().expect("task thread panicked")?;
    assert_eq!(spy.cleaned_up(), 1);
    Ok(())
}

struct Gated {
    started: mpsc::Sender<()>,
    proceed: mpsc::Receiver<()>,
}

impl Task<TestContext> for Gated {
    fn execute(&mut self) -> anyhow::Result<()> {
        self.started.send(())?;
        self.proceed.recv()?;
        Ok(())
    }

    fn update_master_context(&mut self, _context: &mut TestContext) {}

    fn update_local_context(&mut self, _context: &TestContext) {}
}

#[test]
fn test_context_update_while_executing_is_desynchronized() -> Result<()> {
    let (started_tx, started_rx) = mpsc::channel();
    let (proceed_tx, proceed_rx) = mpsc::channel();
    let handle = TaskHandle::new(
        "gated",
        1,
        Gated {
            started: started_tx,
            proceed: proceed_rx,
        },
    )?;

    let worker = {
        let handle = handle.clone();
        thread::spawn(move || handle.run())
    };

    wait_until("task parked", || handle.is_sleeping());
    let mut context = TestContext::default();
    handle.update_master_context(&mut context)?;

    handle.release();
    started_rx.recv()?;

    let err = handle.update_local_context(&context).unwrap_err();
    assert!(matches!(err, SchedulerError::Desynchronized { ref task } if task == "gated"));
    assert!(err.is_fatal());

    proceed_tx.send(())?;
    wait_until("task parked", || handle.is_sleeping());
    handle.update_local_context(&context)?;

    handle.request_shutdown();
    worker.join().expect("task thread panicked")?;
    Ok(())
}
