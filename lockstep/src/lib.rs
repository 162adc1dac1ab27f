//! Lock-step scheduling of periodic real-time tasks.
//!
//! A [`BarrierScheduler`] is ticked at a fixed base rate by an external driver
//! and releases each task, parked on its own thread, at an integer divisor of
//! that rate. Data moves between tasks only while they sleep, either through a
//! shared master context or through point-to-point [`binding`]s.
//!
//! The [`sync`] module also exposes the two lock-free SPSC exchange primitives
//! usable on their own: [`ConcurrentCopier`] and [`ConcurrentRingBuffer`].

pub mod binding;
pub use binding::{BindingContext, BindingTask, InPlaceCopy, Port, TaskBody};

mod errors;
pub use errors::{SchedulerError, StateViolation};

pub mod rt;

pub mod runtime;
pub use runtime::{
    BarrierScheduler, Builder, OnTaskError, OverrunBehavior, Schedule, SingleThreadedScheduler,
    TickEvents,
};

pub mod sync;
pub use sync::{ConcurrentCopier, ConcurrentRingBuffer, ParkingBarrier};

pub mod task;
pub use task::{Task, TaskError, TaskHandle, TaskId, TaskInfo, TaskState};

mod utils;

#[cfg(test)]
mod test_utils;
