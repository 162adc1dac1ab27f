//! Collaborators the schedulers consume: thread creation, processor
//! affinity, a monotonic clock and the periodic driver.
//!
//! The defaults here are not real-time. They name, pin and register threads
//! but leave the OS scheduling class alone, which is enough for simulation
//! and tests. A real-time deployment provides its own [`ThreadFactory`].

mod affinity;
pub use affinity::{NoAffinity, ProcessorAffinity};
#[cfg(target_os = "linux")]
pub use affinity::LinuxAffinity;

mod clock;
pub use clock::{MonotonicClock, StdMonotonicClock};

mod driver;
pub use driver::{PeriodicDriver, Stopped};

pub mod registry;
pub use registry::ThreadRecord;

mod thread;
pub use thread::{
    NonRealtimeThreadFactory, PeriodicParameters, Priority, ThreadBody, ThreadFactory, ThreadSpec,
};
