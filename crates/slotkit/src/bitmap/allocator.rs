use core::fmt;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Error, Result,
    lock::{self, RwLock},
};

const BITS_PER_BYTE: u64 = 8;

/// Mutable allocator state. Bits, counter and cursor always change together
/// under the same exclusive guard.
#[derive(Default)]
struct Slots {
    bits: Vec<u8>,
    available: i64,
    cursor: i64,
}

impl Slots {
    fn is_set(&self, byte: usize, bit: u8) -> bool {
        self.bits[byte] & (1 << bit) != 0
    }

    /// Returns the first clear index in `[from, len)`, or `None`.
    ///
    /// Works a byte at a time; padding bits past `len` in the final byte are
    /// always clear and are rejected by the bound check.
    fn first_free_from(&self, from: i64, len: i64) -> Option<i64> {
        if from >= len {
            return None;
        }
        let from = from as u64;
        let first_byte = (from / BITS_PER_BYTE) as usize;
        let mut mask = 0xFF_u8 << (from % BITS_PER_BYTE);

        for (byte_idx, byte) in self.bits.iter().enumerate().skip(first_byte) {
            let free = !*byte & mask;
            mask = 0xFF;
            if free == 0 {
                continue;
            }
            let idx =
                byte_idx as i64 * BITS_PER_BYTE as i64 + i64::from(free.trailing_zeros());
            return (idx < len).then_some(idx);
        }
        None
    }
}

/// A thread-safe bitset tracking which integers of a closed range are in use.
///
/// Bit `i` represents the value `start + i`; a clear bit means the value is
/// free, a set bit means it is used. The allocator keeps a count of free
/// values that always equals `len() - used()`.
///
/// ## Scan cursor
///
/// [`allocate_next`] and [`reserve_next`] scan forward from an internal
/// cursor and leave it one past whatever they return. The cursor never wraps
/// by itself: once it has passed a slot, freeing that slot does not make it
/// reachable again until [`reset_cursor`] is called. Callers therefore must
/// not read [`Error::Exhausted`] as "no capacity left".
///
/// ## Locking
///
/// Queries take a shared lock, mutations and scans take an exclusive lock.
/// With the `parking-lot` feature the lock is a [`parking_lot::RwLock`] and
/// never poisons.
///
/// [`allocate_next`]: Self::allocate_next
/// [`reserve_next`]: Self::reserve_next
/// [`reset_cursor`]: Self::reset_cursor
/// [`parking_lot::RwLock`]: https://docs.rs/parking_lot
#[derive(Default)]
pub struct BitSlotAllocator {
    start: i64,
    end: i64,
    len: i64,
    state: RwLock<Slots>,
}

impl BitSlotAllocator {
    /// Creates an allocator over `[start, end]` (both inclusive) with every
    /// value free.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRange`] if `end < start`, or if the range holds
    /// more values than can be addressed.
    ///
    /// # Example
    /// ```
    /// use slotkit::BitSlotAllocator;
    ///
    /// let slots = BitSlotAllocator::new(1, 200).unwrap();
    /// slots.push(20).unwrap();
    /// assert_eq!(slots.available(), 199);
    /// assert!(slots.push(201).is_err());
    /// ```
    pub fn new(start: i64, end: i64) -> Result<Self> {
        let invalid = || Error::InvalidRange { start, end };
        if end < start {
            return Err(invalid());
        }
        let len = end
            .checked_sub(start)
            .and_then(|span| span.checked_add(1))
            .ok_or_else(invalid)?;
        let byte_len =
            usize::try_from((len as u64).div_ceil(BITS_PER_BYTE)).map_err(|_| invalid())?;

        Ok(Self {
            start,
            end,
            len,
            state: RwLock::new(Slots {
                bits: vec![0; byte_len],
                available: len,
                cursor: 0,
            }),
        })
    }

    /// Marks `value` as used.
    ///
    /// Kept for callers that think in terms of allocation; the contract is
    /// identical to [`Self::push`].
    ///
    /// # Errors
    ///
    /// See [`Self::push`].
    pub fn allocate(&self, value: i64) -> Result<()> {
        self.push(value)
    }

    /// Marks `value` as used and decrements the available count.
    ///
    /// # Errors
    ///
    /// - [`Error::Uninitialized`] on a default-constructed allocator.
    /// - [`Error::OutOfRange`] if `value` is outside `[start, end]`.
    /// - [`Error::AlreadyUsed`] if the value is already marked; nothing is
    ///   mutated.
    pub fn push(&self, value: i64) -> Result<()> {
        let (byte, bit) = self.locate(value)?;
        let mut slots = lock::write(&self.state)?;
        if slots.is_set(byte, bit) {
            return Err(Error::AlreadyUsed { value });
        }
        slots.bits[byte] |= 1 << bit;
        slots.available -= 1;
        Ok(())
    }

    /// Marks `value` as free and increments the available count.
    ///
    /// Releasing a value that is already free is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// - [`Error::Uninitialized`] on a default-constructed allocator.
    /// - [`Error::OutOfRange`] if `value` is outside `[start, end]`.
    pub fn remove(&self, value: i64) -> Result<()> {
        let (byte, bit) = self.locate(value)?;
        let mut slots = lock::write(&self.state)?;
        if !slots.is_set(byte, bit) {
            return Ok(());
        }
        slots.bits[byte] &= !(1 << bit);
        slots.available += 1;
        Ok(())
    }

    /// Returns whether `value` is currently marked as used.
    ///
    /// # Errors
    ///
    /// - [`Error::Uninitialized`] on a default-constructed allocator.
    /// - [`Error::OutOfRange`] if `value` is outside `[start, end]`.
    pub fn is_used(&self, value: i64) -> Result<bool> {
        let (byte, bit) = self.locate(value)?;
        let slots = lock::read(&self.state)?;
        Ok(slots.is_set(byte, bit))
    }

    /// Returns the first free value at or after the scan cursor, without
    /// reserving it.
    ///
    /// The cursor moves one past the returned value, so consecutive calls
    /// return ascending values even if none of them are pushed. Use
    /// [`Self::reserve_next`] to find and mark a value in one step.
    ///
    /// # Errors
    ///
    /// - [`Error::Uninitialized`] on a default-constructed allocator.
    /// - [`Error::Exhausted`] if the available count is zero, or if no free
    ///   bit lies between the cursor and the end of the range.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn allocate_next(&self) -> Result<i64> {
        self.ensure_initialized()?;
        let mut slots = lock::write(&self.state)?;
        let idx = self.scan(&slots)?;
        slots.cursor = idx + 1;
        Ok(self.start + idx)
    }

    /// Finds the first free value at or after the scan cursor and marks it as
    /// used under a single exclusive lock.
    ///
    /// Cursor behavior matches [`Self::allocate_next`].
    ///
    /// # Errors
    ///
    /// Same as [`Self::allocate_next`].
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn reserve_next(&self) -> Result<i64> {
        self.ensure_initialized()?;
        let mut slots = lock::write(&self.state)?;
        let idx = self.scan(&slots)?;
        let (byte, bit) = split(idx as u64);
        slots.bits[byte] |= 1 << bit;
        slots.available -= 1;
        slots.cursor = idx + 1;
        Ok(self.start + idx)
    }

    /// Rewinds the scan cursor to the start of the range so that slots freed
    /// behind it become reachable again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] on a default-constructed allocator.
    pub fn reset_cursor(&self) -> Result<()> {
        self.ensure_initialized()?;
        lock::write(&self.state)?.cursor = 0;

        #[cfg(feature = "tracing")]
        tracing::trace!(start = self.start, end = self.end, "scan cursor reset");
        Ok(())
    }

    /// Returns the number of free values, or 0 for an uninitialized
    /// allocator.
    pub fn available(&self) -> i64 {
        if !self.is_initialized() {
            return 0;
        }
        lock::read(&self.state).map_or(0, |slots| slots.available)
    }

    /// Returns the number of used values.
    pub fn used(&self) -> i64 {
        if !self.is_initialized() {
            return 0;
        }
        self.len - self.available()
    }

    /// Returns the offset (from `start`) the next scan begins at.
    pub fn cursor(&self) -> i64 {
        lock::read(&self.state).map_or(0, |slots| slots.cursor)
    }

    /// Returns a snapshot of every used value in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Uninitialized`] on a default-constructed allocator.
    pub fn used_values(&self) -> Result<Vec<i64>> {
        self.ensure_initialized()?;
        let slots = lock::read(&self.state)?;
        let mut values = Vec::with_capacity((self.len - slots.available) as usize);
        for (byte_idx, &byte) in slots.bits.iter().enumerate() {
            let mut rest = byte;
            while rest != 0 {
                let bit = rest.trailing_zeros() as i64;
                values.push(self.start + byte_idx as i64 * BITS_PER_BYTE as i64 + bit);
                rest &= rest - 1;
            }
        }
        Ok(values)
    }

    /// First value of the range.
    pub const fn start(&self) -> i64 {
        self.start
    }

    /// Last value of the range (inclusive).
    pub const fn end(&self) -> i64 {
        self.end
    }

    /// Number of values in the range, 0 when uninitialized.
    pub const fn len(&self) -> i64 {
        self.len
    }

    /// Returns `true` only for an uninitialized allocator, since a
    /// constructed range always holds at least one value.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `false` for a default-constructed allocator.
    pub const fn is_initialized(&self) -> bool {
        self.len > 0
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::Uninitialized)
        }
    }

    fn locate(&self, value: i64) -> Result<(usize, u8)> {
        self.ensure_initialized()?;
        if value < self.start || value > self.end {
            return Err(Error::OutOfRange {
                value,
                start: self.start,
                end: self.end,
            });
        }
        // `value - start` cannot overflow: it is bounded by `end - start`,
        // which was checked at construction.
        Ok(split((value - self.start) as u64))
    }

    fn scan(&self, slots: &Slots) -> Result<i64> {
        if slots.available <= 0 {
            return Err(Error::Exhausted);
        }
        slots
            .first_free_from(slots.cursor, self.len)
            .ok_or(Error::Exhausted)
    }
}

const fn split(offset: u64) -> (usize, u8) {
    ((offset / BITS_PER_BYTE) as usize, (offset % BITS_PER_BYTE) as u8)
}

impl fmt::Debug for BitSlotAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("BitSlotAllocator");
        out.field("start", &self.start)
            .field("end", &self.end)
            .field("len", &self.len);
        match lock::read(&self.state) {
            Ok(slots) => out
                .field("available", &slots.available)
                .field("cursor", &slots.cursor),
            Err(_) => out.field("state", &"<poisoned>"),
        };
        out.finish()
    }
}
