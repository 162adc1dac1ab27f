//! Fixed-capacity payloads for the exchange primitives.
//!
//! Both [`ConcurrentCopier`] and [`ConcurrentRingBuffer`] pre-allocate their
//! slots through a factory and reuse them in place. The types below are built
//! for that: every allocation happens in `new`, and all later operations
//! mutate existing storage.
//!
//! Capacities are padded to the next multiple of a block size strictly above
//! the requested one, so every buffer ends with at least one spare block.
//!
//! ```ignore
//! let (mut writer, mut reader) = ConcurrentCopier::new(|| ChangeListenerDoubleBuffer::new(12));
//!
//! writer.get_copy_for_writing().update(3, 0.5);
//! writer.commit();
//! ```
//!
//! [`ConcurrentCopier`]: crate::sync::ConcurrentCopier
//! [`ConcurrentRingBuffer`]: crate::sync::ConcurrentRingBuffer
use anyhow::{Result, ensure};

/// Block size of change listener and indexed buffers.
pub const BLOCK_LEN: usize = 16;

/// Block size of [`PaddedDoubleArray`], one cache line of `f64`.
pub const PADDED_BLOCK_LEN: usize = 8;

#[inline]
fn padded_len(capacity: usize, block: usize) -> usize {
    (capacity / block + 1) * block
}

/// Values with a per-index "changed" latch.
///
/// The writer calls [`update`], the reader polls [`has_changed_and_reset`] to
/// only act on fields that were written since it last looked.
///
/// [`update`]: ChangeListenerBuffer::update
/// [`has_changed_and_reset`]: ChangeListenerBuffer::has_changed_and_reset
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeListenerBuffer<T> {
    changed: Box<[bool]>,
    values: Box<[T]>,
}

pub type ChangeListenerDoubleBuffer = ChangeListenerBuffer<f64>;
pub type ChangeListenerLongBuffer = ChangeListenerBuffer<i64>;

impl<T: Copy + Default> ChangeListenerBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let len = padded_len(capacity, BLOCK_LEN);
        Self {
            changed: vec![false; len].into_boxed_slice(),
            values: vec![T::default(); len].into_boxed_slice(),
        }
    }

    /// Padded capacity.
    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Stores `value` and raises the latch of `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= capacity()`.
    #[track_caller]
    pub fn update(&mut self, index: usize, value: T) {
        self.values[index] = value;
        self.changed[index] = true;
    }

    /// Returns whether `index` was updated since the previous call, and lowers
    /// the latch.
    #[track_caller]
    pub fn has_changed_and_reset(&mut self, index: usize) -> bool {
        std::mem::take(&mut self.changed[index])
    }

    /// Last value stored at `index`, changed or not.
    #[track_caller]
    pub fn value(&self, index: usize) -> T {
        self.values[index]
    }
}

/// Sparse list of `(index, value)` updates, appended by the producer and
/// walked by the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDoubleBuffer {
    indices: Box<[usize]>,
    values: Box<[f64]>,
    len: usize,
}

impl IndexedDoubleBuffer {
    pub fn new(capacity: usize) -> Self {
        let len = padded_len(capacity, BLOCK_LEN);
        Self {
            indices: vec![0; len].into_boxed_slice(),
            values: vec![0.0; len].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends one update.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is full.
    #[track_caller]
    pub fn put(&mut self, index: usize, value: f64) {
        assert!(self.len < self.capacity(), "indexed buffer is full");
        self.indices[self.len] = index;
        self.values[self.len] = value;
        self.len += 1;
    }

    /// Updates in insertion order. Iterating again starts over.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices[..self.len]
            .iter()
            .copied()
            .zip(self.values[..self.len].iter().copied())
    }

    /// Forgets every update, keeping the storage.
    pub fn clear(&mut self) {
        self.len = 0;
    }
}

/// `f64` array padded to whole cache lines, exchangeable as raw
/// native-endian bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedDoubleArray {
    data: Box<[f64]>,
}

impl PaddedDoubleArray {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; padded_len(capacity, PADDED_BLOCK_LEN)].into_boxed_slice(),
        }
    }

    /// Array sized for `initial`, holding a copy of it.
    pub fn from_values(initial: &[f64]) -> Self {
        let mut array = Self::new(initial.len());
        array.set_values(initial);
        array
    }

    /// Size of the byte image of an array created with `capacity`.
    pub fn expected_byte_len(capacity: usize) -> usize {
        padded_len(capacity, PADDED_BLOCK_LEN) * size_of::<f64>()
    }

    /// Padded length, in values.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false, an array holds at least one block.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len() * size_of::<f64>()
    }

    #[track_caller]
    pub fn get(&self, index: usize) -> f64 {
        self.data[index]
    }

    #[track_caller]
    pub fn set(&mut self, index: usize, value: f64) {
        self.data[index] = value;
    }

    /// Overwrites the first `values.len()` values.
    ///
    /// # Panics
    ///
    /// Panics if `values` is longer than the array.
    #[track_caller]
    pub fn set_values(&mut self, values: &[f64]) {
        self.data[..values.len()].copy_from_slice(values);
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Overwrites the leading bytes of the array's native-endian image with
    /// `bytes`. A trailing partial value only has its leading bytes replaced.
    pub fn set_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        ensure!(
            bytes.len() <= self.byte_len(),
            "{} bytes do not fit in a {} byte array",
            bytes.len(),
            self.byte_len()
        );

        for (value, chunk) in self.data.iter_mut().zip(bytes.chunks(size_of::<f64>())) {
            let mut raw = value.to_ne_bytes();
            raw[..chunk.len()].copy_from_slice(chunk);
            *value = f64::from_ne_bytes(raw);
        }
        Ok(())
    }

    /// Writes the whole native-endian image into `out`, which must be exactly
    /// [`byte_len`] bytes long.
    ///
    /// [`byte_len`]: PaddedDoubleArray::byte_len
    pub fn write_bytes(&self, out: &mut [u8]) -> Result<()> {
        ensure!(
            out.len() == self.byte_len(),
            "expected a {} byte buffer, got {}",
            self.byte_len(),
            out.len()
        );

        for (chunk, value) in out.chunks_exact_mut(size_of::<f64>()).zip(self.data.iter()) {
            chunk.copy_from_slice(&value.to_ne_bytes());
        }
        Ok(())
    }
}
