//! Lock-free "latest value wins" exchange between one producer and one consumer.
//!
//! The copier owns exactly three pre-allocated buffers. At any time one may be
//! claimed by the reader, one holds the most recently committed value, and the
//! writer always has at least one free buffer to fill. No allocation and no
//! blocking happen after construction.
//!
//! ```text
//!   CopierWriter                               CopierReader
//!   get_copy_for_writing() ─┐             ┌─ get_copy_for_reading()
//!   commit() ───────────────┤             │
//!                           v             v
//!                  AtomicU8 { next_to_read | being_read }
//!                           │
//!                           v
//!                 [Buffer0, Buffer1, Buffer2]
//! ```
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Index of one of the three buffers.
pub(crate) type Slot = u8;

const NUM_SLOTS: usize = 3;

/// 2-bit encoding of `None` for a slot field.
const NO_SLOT: u8 = 0b11;

/// Which buffer the writer may use next, indexed by `[next_to_read][being_read]`
/// with `NO_SLOT` (3) standing for "none". The chosen slot is never equal to
/// either field. Rows and columns that cannot be reached still yield a slot
/// distinct from both fields.
const WRITE_SLOT: [[Slot; 4]; 4] = [
    //  being_read: 0  1  2  none
    /* next 0    */ [1, 2, 1, 1],
    /* next 1    */ [2, 0, 0, 0],
    /* next 2    */ [1, 0, 0, 0],
    /* next none */ [1, 0, 0, 0],
];

/// Explicit two-field state shared by both halves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CopierState {
    /// Most recently committed buffer.
    pub(crate) next_to_read: Option<Slot>,

    /// Buffer currently claimed by the reader.
    pub(crate) being_read: Option<Slot>,
}

impl CopierState {
    pub(crate) const INITIAL: CopierState = CopierState {
        next_to_read: None,
        being_read: None,
    };

    fn encode_field(slot: Option<Slot>) -> u8 {
        slot.map_or(NO_SLOT, |s| {
            debug_assert!((s as usize) < NUM_SLOTS);
            s
        })
    }

    fn decode_field(bits: u8) -> Option<Slot> {
        match bits & 0b11 {
            NO_SLOT => None,
            s => Some(s),
        }
    }

    pub(crate) fn pack(self) -> u8 {
        (Self::encode_field(self.next_to_read) << 2) | Self::encode_field(self.being_read)
    }

    pub(crate) fn unpack(bits: u8) -> Self {
        Self {
            next_to_read: Self::decode_field(bits >> 2),
            being_read: Self::decode_field(bits),
        }
    }

    /// Buffer the writer may fill without touching a committed or claimed one.
    pub(crate) fn write_slot(self) -> Slot {
        WRITE_SLOT[Self::encode_field(self.next_to_read) as usize]
            [Self::encode_field(self.being_read) as usize]
    }

    /// Publishes `slot` as the next buffer to read, keeping the reader's claim.
    pub(crate) fn commit(self, slot: Slot) -> Self {
        Self {
            next_to_read: Some(slot),
            being_read: self.being_read,
        }
    }

    /// Reader claims the most recently committed buffer, if any.
    pub(crate) fn claim(self) -> Option<(Self, Slot)> {
        self.next_to_read.map(|slot| {
            (
                Self {
                    next_to_read: Some(slot),
                    being_read: Some(slot),
                },
                slot,
            )
        })
    }
}

/// Shared core of the triple buffer. Use [`ConcurrentCopier::new`] to obtain
/// the writer and reader halves.
pub struct ConcurrentCopier<T> {
    buffers: [UnsafeCell<T>; NUM_SLOTS],
    state: CachePadded<AtomicU8>,
}

// SAFETY: a buffer is only ever accessed by the half that owns it according to
// `state`: the writer never touches `next_to_read` or `being_read`, and the
// reader only dereferences the slot it claimed through a successful CAS. Each
// half is a unique (non-Clone) value, so at most one thread acts as writer and
// one as reader.
unsafe impl<T: Send> Send for ConcurrentCopier<T> {}
unsafe impl<T: Send> Sync for ConcurrentCopier<T> {}

impl<T> fmt::Debug for ConcurrentCopier<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentCopier")
            .field("state", &CopierState::unpack(self.state.load(Ordering::Relaxed)))
            .finish()
    }
}

impl<T: Send> ConcurrentCopier<T> {
    /// Pre-allocates the three buffers through `factory` and splits the copier
    /// into its producer and consumer halves.
    pub fn new<F>(mut factory: F) -> (CopierWriter<T>, CopierReader<T>)
    where
        F: FnMut() -> T,
    {
        let copier = Arc::new(Self {
            buffers: [
                UnsafeCell::new(factory()),
                UnsafeCell::new(factory()),
                UnsafeCell::new(factory()),
            ],
            state: CachePadded::new(AtomicU8::new(CopierState::INITIAL.pack())),
        });

        (
            CopierWriter {
                copier: Arc::clone(&copier),
                writing: None,
            },
            CopierReader { copier },
        )
    }
}

impl<T> ConcurrentCopier<T> {
    #[inline]
    fn load_state(&self) -> CopierState {
        CopierState::unpack(self.state.load(Ordering::Acquire))
    }

    fn update_state<F>(&self, mut f: F) -> Option<CopierState>
    where
        F: FnMut(CopierState) -> Option<CopierState>,
    {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                f(CopierState::unpack(bits)).map(CopierState::pack)
            })
            .ok()
            .map(CopierState::unpack)
    }
}

/// Producer half of a [`ConcurrentCopier`].
#[derive(Debug)]
pub struct CopierWriter<T> {
    copier: Arc<ConcurrentCopier<T>>,

    /// Slot handed out by the last `get_copy_for_writing`.
    writing: Option<Slot>,
}

impl<T> CopierWriter<T> {
    /// Returns a buffer that is neither committed-for-reading nor being read.
    ///
    /// The buffer holds whatever was written to it last, callers are expected
    /// to overwrite it in place before calling [`commit`].
    ///
    /// [`commit`]: CopierWriter::commit
    pub fn get_copy_for_writing(&mut self) -> &mut T {
        let slot = self.copier.load_state().write_slot();
        self.writing = Some(slot);

        // SAFETY: the reader can only claim `next_to_read`, which only this
        // writer changes, and `write_slot` excludes it as well as the slot the
        // reader may currently hold.
        unsafe { &mut *self.copier.buffers[slot as usize].get() }
    }

    /// Publishes the buffer returned by the last `get_copy_for_writing` as the
    /// next object to read. Does nothing if no buffer was requested since the
    /// previous commit.
    pub fn commit(&mut self) {
        if let Some(slot) = self.writing.take() {
            // The closure never declines, so this always succeeds.
            let _ = self.copier.update_state(|state| Some(state.commit(slot)));
        }
    }
}

/// Consumer half of a [`ConcurrentCopier`].
#[derive(Debug)]
pub struct CopierReader<T> {
    copier: Arc<ConcurrentCopier<T>>,
}

impl<T> CopierReader<T> {
    /// Claims and returns the most recently committed object, or `None` if the
    /// writer never committed anything.
    ///
    /// The returned reference stays valid until the next call, the writer never
    /// writes into a claimed buffer.
    pub fn get_copy_for_reading(&mut self) -> Option<&T> {
        let mut claimed = None;

        self.copier.update_state(|state| {
            state.claim().map(|(next, slot)| {
                claimed = Some(slot);
                next
            })
        })?;

        // SAFETY: `claimed` is now `being_read`, which the writer excludes
        // until we claim another slot through `&mut self`.
        claimed.map(|slot| unsafe { &*self.copier.buffers[slot as usize].get() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::{assert_impl_all, assert_not_impl_any};
    use std::thread;

    assert_impl_all!(CopierWriter<Vec<u8>>: Send);
    assert_impl_all!(CopierReader<Vec<u8>>: Send);
    assert_not_impl_any!(CopierWriter<Vec<u8>>: Clone);
    assert_not_impl_any!(CopierReader<Vec<u8>>: Clone);

    fn all_states() -> impl Iterator<Item = CopierState> {
        let fields = [None, Some(0), Some(1), Some(2)];
        fields.into_iter().flat_map(move |next_to_read| {
            fields.into_iter().map(move |being_read| CopierState {
                next_to_read,
                being_read,
            })
        })
    }

    #[test]
    fn test_pack_unpack_all_states() {
        for state in all_states() {
            assert_eq!(CopierState::unpack(state.pack()), state);
        }
        assert_eq!(CopierState::INITIAL.pack(), 0b1111);
    }

    #[test]
    fn test_write_slot_never_collides() {
        for state in all_states() {
            let slot = state.write_slot();
            assert!((slot as usize) < NUM_SLOTS, "{state:?} -> {slot}");
            assert_ne!(Some(slot), state.next_to_read, "{state:?}");
            assert_ne!(Some(slot), state.being_read, "{state:?}");
        }
    }

    #[test]
    fn test_reachable_states_stay_consistent() {
        // Explore every state reachable from INITIAL through writer commits and
        // reader claims, checking the writer's slot at each step.
        let mut seen = vec![CopierState::INITIAL];
        let mut frontier = vec![CopierState::INITIAL];

        while let Some(state) = frontier.pop() {
            let slot = state.write_slot();
            assert_ne!(Some(slot), state.next_to_read);
            assert_ne!(Some(slot), state.being_read);

            let mut successors = vec![state.commit(slot)];
            if let Some((claimed, _)) = state.claim() {
                successors.push(claimed);
            }

            for next in successors {
                if !seen.contains(&next) {
                    seen.push(next);
                    frontier.push(next);
                }
            }
        }

        // The reader can only ever hold a slot that was committed.
        assert!(seen.iter().all(|s| s.being_read.is_none() || s.next_to_read.is_some()));
        assert!(seen.len() > 1);
    }

    #[test]
    fn test_read_before_commit_is_none() {
        let (mut writer, mut reader) = ConcurrentCopier::new(|| 0u64);
        assert!(reader.get_copy_for_reading().is_none());

        *writer.get_copy_for_writing() = 7;
        assert!(reader.get_copy_for_reading().is_none());

        writer.commit();
        assert_eq!(reader.get_copy_for_reading(), Some(&7));
    }

    #[test]
    fn test_commit_without_write_is_noop() {
        let (mut writer, mut reader) = ConcurrentCopier::new(|| 0u64);
        writer.commit();
        assert!(reader.get_copy_for_reading().is_none());
    }

    #[test]
    fn test_latest_value_wins_single_thread() {
        let (mut writer, mut reader) = ConcurrentCopier::new(|| 0u64);

        for i in 1..8 {
            *writer.get_copy_for_writing() = i;
            writer.commit();
        }
        assert_eq!(reader.get_copy_for_reading(), Some(&7));

        // Re-reading without a new commit yields the same value.
        assert_eq!(reader.get_copy_for_reading(), Some(&7));

        *writer.get_copy_for_writing() = 8;
        writer.commit();
        assert_eq!(reader.get_copy_for_reading(), Some(&8));
    }

    #[derive(Debug, Clone)]
    struct Sample {
        iteration: u64,
        values: Vec<u64>,
    }

    impl Sample {
        fn new() -> Self {
            Self {
                iteration: 0,
                values: vec![0; 64],
            }
        }

        fn update(&mut self, iteration: u64) {
            self.iteration = iteration;
            for (i, v) in self.values.iter_mut().enumerate() {
                *v = iteration.wrapping_mul(31).wrapping_add(i as u64);
            }
        }

        fn check(&self) {
            for (i, v) in self.values.iter().enumerate() {
                assert_eq!(
                    *v,
                    self.iteration.wrapping_mul(31).wrapping_add(i as u64),
                    "torn read at iteration {}",
                    self.iteration
                );
            }
        }
    }

    #[test]
    fn test_concurrent_reads_are_whole_and_monotonic() {
        const ITERATIONS: u64 = 200_000;
        let (mut writer, mut reader) = ConcurrentCopier::new(Sample::new);

        let producer = thread::spawn(move || {
            for i in 0..ITERATIONS {
                writer.get_copy_for_writing().update(i);
                writer.commit();
            }
        });

        let mut last_seen = 0;
        loop {
            let Some(sample) = reader.get_copy_for_reading() else {
                thread::yield_now();
                continue;
            };

            sample.check();
            assert!(sample.iteration >= last_seen, "went back in time");
            last_seen = sample.iteration;

            if last_seen == ITERATIONS - 1 {
                break;
            }
        }

        producer.join().expect("producer panicked");
    }
}
