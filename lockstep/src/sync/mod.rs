//! Synchronization and exchange primitives.
//!
//! [`ParkingBarrier`] is the suspend/resume point of every task thread. The two
//! exchange primitives are independent of the scheduler and can be used
//! between any pair of threads, [`payload`] has fixed-capacity slot types
//! for them.

mod copier;
pub use copier::{ConcurrentCopier, CopierReader, CopierWriter};

mod parking;
pub use parking::ParkingBarrier;

pub mod payload;
pub use payload::{
    ChangeListenerBuffer, ChangeListenerDoubleBuffer, ChangeListenerLongBuffer,
    IndexedDoubleBuffer, PaddedDoubleArray,
};

mod ring;
pub use ring::{ConcurrentRingBuffer, RingConsumer, RingProducer};
