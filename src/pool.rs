//! Buffer pools: fixed arrays of frame slots behind non-blocking locks.
//!
//! The same type backs the process-wide shared pool and each graph's local
//! pool. Slot count is fixed at construction; the audio thread only ever
//! try-locks a slot and touches the frame inside it.

#![forbid(unsafe_code)]

use crate::frame::{Coord, SpectralFrame};
use crate::invariant_ppt::{assert_invariant, POOL_SLOT_FRESH};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, TryLockError};

/// Errors from non-RT slot management.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    /// Slot index past the end of the pool.
    IndexOutOfRange,
    /// Slot is held by someone else.
    Locked,
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::IndexOutOfRange => write!(f, "buffer index out of range"),
            PoolError::Locked => write!(f, "buffer is locked"),
        }
    }
}

impl std::error::Error for PoolError {}

/// A fixed-size array of lockable frame slots.
#[derive(Debug)]
pub struct BufferPool {
    slots: Box<[Mutex<SpectralFrame>]>,
    lock_attempts: u32,
}

/// Scoped access to one slot's frame. Dropping it releases the slot.
#[derive(Debug)]
pub struct FrameGuard<'a> {
    guard: MutexGuard<'a, SpectralFrame>,
}

impl Deref for FrameGuard<'_> {
    type Target = SpectralFrame;

    fn deref(&self) -> &SpectralFrame {
        &self.guard
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut SpectralFrame {
        &mut self.guard
    }
}

impl BufferPool {
    /// A pool of `len` empty slots. `lock_attempts` bounds the try-lock loop
    /// used from the audio thread and is clamped to at least one.
    pub fn new(len: usize, lock_attempts: u32) -> Self {
        let slots = (0..len)
            .map(|_| Mutex::new(SpectralFrame::empty()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            lock_attempts: lock_attempts.max(1),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Try to lock slot `index` without blocking.
    ///
    /// Retries at most `lock_attempts` times with a spin hint in between and
    /// gives up with `None`. A poisoned slot is still handed out: frames hold
    /// plain floats, so a panic elsewhere cannot leave them unusable.
    pub fn try_lock(&self, index: usize) -> Option<FrameGuard<'_>> {
        let slot = self.slots.get(index)?;
        for _ in 0..self.lock_attempts {
            match slot.try_lock() {
                Ok(guard) => return Some(FrameGuard { guard }),
                Err(TryLockError::Poisoned(poisoned)) => {
                    return Some(FrameGuard {
                        guard: poisoned.into_inner(),
                    })
                }
                Err(TryLockError::WouldBlock) => std::hint::spin_loop(),
            }
        }
        None
    }

    /// (Re)allocate slot `index` to hold `samples` zeroed floats. Not RT-safe.
    ///
    /// A slot that already has the right size is cleared in place.
    pub fn alloc_slot(&self, index: usize, samples: usize) -> Result<(), PoolError> {
        let mut frame = self.try_lock(index).ok_or_else(|| self.miss(index))?;
        if frame.samples() == samples {
            frame.clear();
        } else {
            *frame = SpectralFrame::new(samples);
        }
        assert_invariant(
            POOL_SLOT_FRESH,
            frame.samples() == samples
                && frame.coord() == Coord::Complex
                && frame.as_slice().iter().all(|&x| x == 0.0),
            "fresh slot is rectangular and zeroed",
            Some("alloc_slot"),
        );
        log::debug!("buffer slot {} allocated with {} samples", index, samples);
        Ok(())
    }

    /// Release slot `index` back to an empty frame. Not RT-safe.
    pub fn free_slot(&self, index: usize) -> Result<(), PoolError> {
        let mut frame = self.try_lock(index).ok_or_else(|| self.miss(index))?;
        *frame = SpectralFrame::empty();
        Ok(())
    }

    /// Run `f` against slot `index` under its lock. Used by producers and
    /// inspection code off the audio thread.
    pub fn with_frame<R>(
        &self,
        index: usize,
        f: impl FnOnce(&mut SpectralFrame) -> R,
    ) -> Result<R, PoolError> {
        let mut frame = self.try_lock(index).ok_or_else(|| self.miss(index))?;
        Ok(f(&mut frame))
    }

    fn miss(&self, index: usize) -> PoolError {
        if index >= self.slots.len() {
            PoolError::IndexOutOfRange
        } else {
            PoolError::Locked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Complex;

    #[test]
    fn alloc_sizes_slot() {
        let pool = BufferPool::new(4, 4);
        pool.alloc_slot(2, 130).unwrap();
        let frame = pool.try_lock(2).unwrap();
        assert_eq!(frame.samples(), 130);
        assert_eq!(frame.num_bins(), 64);
    }

    #[test]
    fn alloc_out_of_range() {
        let pool = BufferPool::new(2, 4);
        assert_eq!(pool.alloc_slot(2, 16), Err(PoolError::IndexOutOfRange));
        assert!(pool.try_lock(5).is_none());
    }

    #[test]
    fn held_slot_is_not_relocked() {
        let pool = BufferPool::new(2, 3);
        let held = pool.try_lock(0).unwrap();
        assert!(pool.try_lock(0).is_none());
        assert_eq!(pool.alloc_slot(0, 8), Err(PoolError::Locked));
        assert!(pool.try_lock(1).is_some());
        drop(held);
        assert!(pool.try_lock(0).is_some());
    }

    #[test]
    fn with_frame_writes_through() {
        let pool = BufferPool::new(1, 1);
        pool.alloc_slot(0, 6).unwrap();
        pool.with_frame(0, |f| f.load_complex(1.0, 2.0, &[Complex::new(3.0, 4.0)]))
            .unwrap();
        let frame = pool.try_lock(0).unwrap();
        assert_eq!(frame.as_slice(), &[1.0, 2.0, 3.0, 4.0, 0.0, 0.0]);
    }

    #[test]
    fn realloc_same_size_resets_frame() {
        let pool = BufferPool::new(1, 1);
        pool.alloc_slot(0, 6).unwrap();
        pool.with_frame(0, |f| {
            f.write_raw(Coord::Polar).copy_from_slice(&[7.0, 8.0, 1.0, 2.0, 3.0, 4.0]);
        })
        .unwrap();
        pool.alloc_slot(0, 6).unwrap();
        let frame = pool.try_lock(0).unwrap();
        assert_eq!(frame.coord(), Coord::Complex);
        assert_eq!(frame.dc(), 0.0);
        assert_eq!(frame.nyquist(), 0.0);
        assert!(frame.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn free_returns_to_empty() {
        let pool = BufferPool::new(1, 1);
        pool.alloc_slot(0, 64).unwrap();
        pool.free_slot(0).unwrap();
        assert_eq!(pool.try_lock(0).unwrap().samples(), 0);
    }
}
