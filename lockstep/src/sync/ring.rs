//! Bounded single-producer/single-consumer queue in the style of the LMAX
//! disruptor.
//!
//! Every slot is pre-allocated by a factory and mutated in place, the queue
//! never allocates after construction. The producer claims slots with
//! [`RingProducer::next`] and publishes them in batches with
//! [`RingProducer::commit`]. The consumer caches the published position with
//! [`RingConsumer::poll`], walks it with [`RingConsumer::read`] and hands the
//! capacity back with [`RingConsumer::flush`].
//!
//! ```ignore
//! let (mut producer, mut consumer) = ConcurrentRingBuffer::new(1000, || 0u64);
//!
//! if let Some(slot) = producer.next() {
//!     *slot = 42;
//! }
//! producer.commit();
//!
//! if consumer.poll() {
//!     while let Some(value) = consumer.read() {
//!         // process value
//!     }
//!     consumer.flush();
//! }
//! ```
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared storage and published counters. Use [`ConcurrentRingBuffer::new`]
/// to obtain the producer and consumer halves.
///
/// Positions are monotonically increasing counts of slots, the slot index is
/// `position & mask`.
pub struct ConcurrentRingBuffer<T> {
    slots: Box<[UnsafeCell<T>]>,

    /// `capacity - 1`, capacity is a power of two.
    mask: u64,

    /// Number of slots made visible to the consumer. Written by the producer.
    commit_position: CachePadded<AtomicU64>,

    /// Number of slots handed back to the producer. Written by the consumer.
    consumer_position: CachePadded<AtomicU64>,
}

// SAFETY: the producer only writes slots in `[consumer_position + capacity)`
// that it has not yet committed, the consumer only reads slots below
// `commit_position` that it has not yet flushed. The ranges are disjoint and
// the counters are published with release/acquire ordering. Each half is a
// unique (non-Clone) value.
unsafe impl<T: Send> Send for ConcurrentRingBuffer<T> {}
unsafe impl<T: Send> Sync for ConcurrentRingBuffer<T> {}

impl<T> fmt::Debug for ConcurrentRingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentRingBuffer")
            .field("capacity", &self.slots.len())
            .field("commit_position", &self.commit_position.load(Ordering::Relaxed))
            .field(
                "consumer_position",
                &self.consumer_position.load(Ordering::Relaxed),
            )
            .finish()
    }
}

impl<T: Send> ConcurrentRingBuffer<T> {
    /// Creates a ring buffer holding `capacity` slots, rounded up to the next
    /// power of two, each initialized through `factory`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0 or cannot be rounded to a power of two.
    #[track_caller]
    pub fn new<F>(capacity: usize, factory: F) -> (RingProducer<T>, RingConsumer<T>)
    where
        F: FnMut() -> T,
    {
        assert!(capacity > 0, "capacity must be greater than 0");
        let capacity = capacity
            .checked_next_power_of_two()
            .expect("capacity overflows the next power of two");

        let mut factory = factory;
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(factory()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let ring = Arc::new(Self {
            slots,
            mask: capacity as u64 - 1,
            commit_position: CachePadded::new(AtomicU64::new(0)),
            consumer_position: CachePadded::new(AtomicU64::new(0)),
        });

        let producer = RingProducer {
            ring: Arc::clone(&ring),
            write_position: 0,
            cached_max_write_position: 0,
        };

        let consumer = RingConsumer {
            ring,
            read_position: 0,
            read_limit: 0,
        };

        (producer, consumer)
    }
}

impl<T> ConcurrentRingBuffer<T> {
    #[inline]
    fn capacity(&self) -> u64 {
        self.mask + 1
    }

    #[inline]
    fn slot(&self, position: u64) -> *mut T {
        self.slots[(position & self.mask) as usize].get()
    }
}

/// Producer half of a [`ConcurrentRingBuffer`].
#[derive(Debug)]
pub struct RingProducer<T> {
    ring: Arc<ConcurrentRingBuffer<T>>,

    /// Next position to claim.
    write_position: u64,

    /// Last known bound on `write_position`, refreshed from the consumer only
    /// when reached.
    cached_max_write_position: u64,
}

impl<T> RingProducer<T> {
    /// Claims the next slot for writing.
    ///
    /// Returns `None` when the slot is still owned by the consumer, i.e. the
    /// unflushed backlog already fills the buffer. The caller decides whether to
    /// retry later or drop the value.
    pub fn next(&mut self) -> Option<&mut T> {
        if self.write_position >= self.cached_max_write_position {
            self.cached_max_write_position =
                self.ring.consumer_position.load(Ordering::Acquire) + self.ring.capacity();

            if self.write_position >= self.cached_max_write_position {
                return None;
            }
        }

        let position = self.write_position;
        self.write_position += 1;

        // SAFETY: `position < consumer_position + capacity`, the consumer has
        // flushed the previous occupant of this slot and cannot read it again
        // until we commit past it.
        Some(unsafe { &mut *self.ring.slot(position) })
    }

    /// Publishes every slot claimed since the previous commit.
    pub fn commit(&mut self) {
        self.ring
            .commit_position
            .store(self.write_position, Ordering::Release);
    }

    /// Rounded capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }
}

/// Consumer half of a [`ConcurrentRingBuffer`].
#[derive(Debug)]
pub struct RingConsumer<T> {
    ring: Arc<ConcurrentRingBuffer<T>>,

    /// Next position to read.
    read_position: u64,

    /// Commit position observed by the last `poll`.
    read_limit: u64,
}

impl<T> RingConsumer<T> {
    /// Caches the producer's commit position. Returns whether unread data is
    /// available.
    pub fn poll(&mut self) -> bool {
        self.read_limit = self.ring.commit_position.load(Ordering::Acquire);
        self.read_position < self.read_limit
    }

    /// Returns the next unread slot up to the polled limit and advances past it.
    pub fn read(&mut self) -> Option<&T> {
        if self.read_position >= self.read_limit {
            return None;
        }

        let position = self.read_position;
        self.read_position += 1;

        // SAFETY: `position < commit_position`, fully written by the producer,
        // and not writable again before we flush past it.
        Some(unsafe { &*self.ring.slot(position) })
    }

    /// Like [`read`] but does not advance the cursor.
    ///
    /// [`read`]: RingConsumer::read
    pub fn peek(&self) -> Option<&T> {
        if self.read_position >= self.read_limit {
            return None;
        }

        // SAFETY: see `read`.
        Some(unsafe { &*self.ring.slot(self.read_position) })
    }

    /// Hands every slot read so far back to the producer.
    pub fn flush(&mut self) {
        self.ring
            .consumer_position
            .store(self.read_position, Ordering::Release);
    }

    /// Rounded capacity of the buffer.
    pub fn capacity(&self) -> usize {
        self.ring.slots.len()
    }
}
