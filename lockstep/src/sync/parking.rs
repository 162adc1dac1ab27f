use crate::errors::StateViolation;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread::{self, Thread};

/// Single-waiter suspend/resume primitive.
///
/// A thread calls [`wait`] and stays parked until another thread calls
/// [`release`]. At most one thread may be waiting at any time, a second
/// concurrent waiter is rejected with [`StateViolation::AlreadyWaiting`].
///
/// Neither side ever blocks on a lock: [`release`] only performs atomic
/// operations and an `unpark`, so a high priority releaser cannot be held up
/// by a preempted waiter.
///
/// [`wait`]: ParkingBarrier::wait
/// [`release`]: ParkingBarrier::release
#[derive(Debug, Default)]
pub struct ParkingBarrier {
    // Set by the waiter, cleared by whoever releases it. The swap in `release`
    // is what guarantees one wake-up per wait.
    sleeping: AtomicBool,

    // Handle used to unpark the waiter.
    waiter: ThreadSlot,
}

impl ParkingBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks the calling thread until the matching [`release`] call.
    ///
    /// [`release`]: ParkingBarrier::release
    pub fn wait(&self) -> Result<(), StateViolation> {
        if self
            .sleeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(StateViolation::AlreadyWaiting);
        }

        // A release racing the registration either finds our handle or makes
        // `register` unpark us, and `unpark` before `park` makes the next
        // `park` return immediately. Registering again on every wake-up covers
        // a wake still in flight for a previous waiter, and spurious wakeups
        // as per docs.
        while self.sleeping.load(Ordering::Acquire) {
            self.waiter.register(thread::current());
            if self.sleeping.load(Ordering::Acquire) {
                thread::park();
            }
        }

        Ok(())
    }

    /// Wakes the waiting thread, if any. Returns whether a waiter was released.
    ///
    /// Calling this when nobody is waiting is a no-op.
    pub fn release(&self) -> bool {
        if !self.sleeping.swap(false, Ordering::AcqRel) {
            return false;
        }

        self.waiter.wake();
        true
    }

    /// Snapshot of whether a thread is currently parked on this barrier.
    #[inline]
    pub fn is_sleeping(&self) -> bool {
        self.sleeping.load(Ordering::Acquire)
    }
}

const IDLE: u8 = 0;
const REGISTERING: u8 = 0b01;
const WAKING: u8 = 0b10;

/// Lock-free single slot holding the thread to unpark.
///
/// Same protocol as an atomic waker: `register` and `wake` each claim the
/// slot with a state bit, and whichever side loses the race hands the wake-up
/// over instead of waiting for the other one.
struct ThreadSlot {
    state: AtomicU8,
    thread: UnsafeCell<Option<Thread>>,
}

// SAFETY: `thread` is only accessed by the side that moved `state` out of
// IDLE, with acquire/release ordering on the transitions.
unsafe impl Send for ThreadSlot {}
unsafe impl Sync for ThreadSlot {}

impl Default for ThreadSlot {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
            thread: UnsafeCell::new(None),
        }
    }
}

impl std::fmt::Debug for ThreadSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadSlot")
            .field("state", &self.state.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl ThreadSlot {
    /// Stores `thread` as the one to wake. Only called by the single waiter.
    fn register(&self, thread: Thread) {
        match self
            .state
            .compare_exchange(IDLE, REGISTERING, Ordering::Acquire, Ordering::Acquire)
            .unwrap_or_else(|actual| actual)
        {
            IDLE => {
                // SAFETY: REGISTERING gives us exclusive access to the slot.
                unsafe { *self.thread.get() = Some(thread) };

                if self
                    .state
                    .compare_exchange(REGISTERING, IDLE, Ordering::AcqRel, Ordering::Acquire)
                    .is_err()
                {
                    // A wake arrived while we were storing, it left the
                    // unpark to us.
                    // SAFETY: the waker saw REGISTERING and did not touch
                    // the slot.
                    let thread = unsafe { (*self.thread.get()).take() };
                    self.state.swap(IDLE, Ordering::AcqRel);
                    if let Some(thread) = thread {
                        thread.unpark();
                    }
                }
            }
            WAKING => {
                // A wake is in flight for a previous registration, the
                // release already happened for this one.
                thread.unpark();
            }
            _ => {
                // Concurrent register, excluded by the `sleeping` token.
                debug_assert!(false, "concurrent thread slot registration");
            }
        }
    }

    /// Unparks the registered thread, if any. Never blocks.
    fn wake(&self) {
        if self.state.fetch_or(WAKING, Ordering::AcqRel) == IDLE {
            // SAFETY: WAKING gives us exclusive access to the slot.
            let thread = unsafe { (*self.thread.get()).take() };
            self.state.fetch_and(!WAKING, Ordering::Release);
            if let Some(thread) = thread {
                thread.unpark();
            }
        }
    }
}
