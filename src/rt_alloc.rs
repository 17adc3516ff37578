//! Bounded real-time memory pool.
//!
//! All memory is reserved up front in power-of-two size classes. On the audio
//! thread `alloc` is a free-list pop and `free` a push into pre-reserved
//! capacity, so neither touches the global allocator. Running out is an
//! ordinary `Err`, never a block or a panic.

#![forbid(unsafe_code)]

use crate::invariant_ppt::{assert_invariant, RT_POOL_CLASSES};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Sizing for [`RtPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtPoolOptions {
    /// Floats in the smallest class. Must be a power of two.
    pub min_block_len: usize,
    /// Each class doubles the previous one.
    pub num_classes: usize,
    pub blocks_per_class: usize,
}

impl Default for RtPoolOptions {
    fn default() -> Self {
        Self {
            min_block_len: 64,
            num_classes: 8,
            blocks_per_class: 16,
        }
    }
}

impl RtPoolOptions {
    /// Largest request the pool can ever satisfy.
    pub fn max_block_len(&self) -> usize {
        match self.num_classes {
            0 => 0,
            n => self.min_block_len << (n - 1),
        }
    }

    /// Total floats reserved by a pool with these options.
    pub fn total_floats(&self) -> usize {
        (0..self.num_classes)
            .map(|c| (self.min_block_len << c) * self.blocks_per_class)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Bigger than the largest class.
    TooLarge,
    /// Class has no free blocks left.
    Exhausted,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::TooLarge => write!(f, "request exceeds largest real-time block"),
            AllocError::Exhausted => write!(f, "real-time memory exhausted"),
        }
    }
}

impl std::error::Error for AllocError {}

/// A block on loan from an [`RtPool`]. Derefs to exactly the requested length.
#[derive(Debug)]
pub struct ScratchBuf {
    block: Box<[f32]>,
    len: usize,
    class: usize,
}

impl ScratchBuf {
    /// Floats available beyond the requested length.
    pub fn capacity(&self) -> usize {
        self.block.len()
    }
}

impl Deref for ScratchBuf {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.block[..self.len]
    }
}

impl DerefMut for ScratchBuf {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.block[..self.len]
    }
}

#[derive(Debug)]
pub struct RtPool {
    free: Vec<Vec<Box<[f32]>>>,
    options: RtPoolOptions,
    in_use: usize,
}

impl RtPool {
    /// Reserve every block now. Not RT-safe.
    pub fn new(options: RtPoolOptions) -> Self {
        let free: Vec<Vec<Box<[f32]>>> = (0..options.num_classes)
            .map(|c| {
                let len = options.min_block_len << c;
                let mut list = Vec::with_capacity(options.blocks_per_class);
                list.extend((0..options.blocks_per_class).map(|_| vec![0.0; len].into_boxed_slice()));
                list
            })
            .collect();
        assert_invariant(
            RT_POOL_CLASSES,
            options.num_classes == 0 || options.min_block_len.is_power_of_two(),
            "smallest class is a power of two",
            Some("RtPool::new"),
        );
        log::debug!(
            "real-time pool reserved {} floats in {} classes",
            options.total_floats(),
            options.num_classes
        );
        Self {
            free,
            options,
            in_use: 0,
        }
    }

    pub fn options(&self) -> &RtPoolOptions {
        &self.options
    }

    /// Blocks currently on loan.
    pub fn in_use(&self) -> usize {
        self.in_use
    }

    /// Free blocks left in the class that would serve `len`.
    pub fn available_for(&self, len: usize) -> usize {
        self.class_for(len).map_or(0, |c| self.free[c].len())
    }

    fn class_for(&self, len: usize) -> Option<usize> {
        (0..self.free.len()).find(|&c| self.options.min_block_len << c >= len)
    }

    /// Take a zeroed block of at least `len` floats. RT-safe.
    pub fn alloc(&mut self, len: usize) -> Result<ScratchBuf, AllocError> {
        let class = self.class_for(len).ok_or(AllocError::TooLarge)?;
        let mut block = self.free[class].pop().ok_or(AllocError::Exhausted)?;
        block.fill(0.0);
        self.in_use += 1;
        Ok(ScratchBuf { block, len, class })
    }

    /// Hand a block back. RT-safe.
    pub fn free(&mut self, buf: ScratchBuf) {
        let Some(list) = self.free.get_mut(buf.class) else {
            return;
        };
        // Never grow a free list from the audio thread.
        if list.len() < list.capacity() && buf.block.len() == self.options.min_block_len << buf.class {
            list.push(buf.block);
            self.in_use = self.in_use.saturating_sub(1);
        }
    }
}

impl Default for RtPool {
    fn default() -> Self {
        Self::new(RtPoolOptions::default())
    }
}
