//! Buffer resolution: float handle → locked frame.
//!
//! A handle arrives on a control input as an `f32`. It is truncated to an
//! index into the shared pool; indices past the shared pool continue into the
//! calling graph's local pool; anything past both falls back to shared slot 0.
//! The resolved slot is try-locked for the rest of the invocation and the
//! lock is released when the returned guard drops, on every exit path.

#![forbid(unsafe_code)]

use crate::diag::DiagSender;
use crate::frame::SpectralFrame;
use crate::pool::{BufferPool, FrameGuard};
use crate::rt_alloc::RtPool;
use std::fmt;

/// Wire value meaning "no valid buffer".
pub const NO_BUFFER: f32 = -1.0;

/// Why a handle did not produce a usable frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveError {
    /// Negative or NaN handle.
    InvalidHandle,
    /// Fallback needed but the shared pool has no slot 0.
    NoBuffers,
    /// The slot stayed locked for every bounded attempt.
    Contended,
    /// Paired frames disagree on bin count.
    BinCountMismatch,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::InvalidHandle => write!(f, "invalid buffer handle"),
            ResolveError::NoBuffers => write!(f, "no shared buffers to fall back to"),
            ResolveError::Contended => write!(f, "buffer lock contended"),
            ResolveError::BinCountMismatch => write!(f, "paired buffers differ in bin count"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// A concrete slot in one of the two pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufRef {
    Shared(usize),
    Local(usize),
}

/// Everything a unit may touch during one invocation.
///
/// Built by the scheduler for each block; nothing in it outlives the block.
pub struct ProcessContext<'a> {
    pub shared: &'a BufferPool,
    pub local: &'a BufferPool,
    pub rt: &'a mut RtPool,
    pub diag: &'a mut DiagSender,
}

impl<'a> ProcessContext<'a> {
    /// Map an already-validated index to a slot.
    pub fn locate_index(&self, index: usize) -> Option<BufRef> {
        let shared_len = self.shared.len();
        if index < shared_len {
            return Some(BufRef::Shared(index));
        }
        let local = index - shared_len;
        if local < self.local.len() {
            Some(BufRef::Local(local))
        } else if shared_len > 0 {
            Some(BufRef::Shared(0))
        } else {
            None
        }
    }

    /// Map a wire handle to a slot without locking it.
    pub fn locate(&self, handle: f32) -> Option<BufRef> {
        buffer_index(handle).and_then(|index| self.locate_index(index))
    }

    fn lock(&self, buf: BufRef) -> Result<FrameGuard<'a>, ResolveError> {
        let (pool, index): (&'a BufferPool, usize) = match buf {
            BufRef::Shared(i) => (self.shared, i),
            BufRef::Local(i) => (self.local, i),
        };
        pool.try_lock(index).ok_or(ResolveError::Contended)
    }
}

/// Truncate a wire handle to an index. Negative and NaN handles are invalid.
#[inline]
pub fn buffer_index(handle: f32) -> Option<usize> {
    if handle >= 0.0 {
        Some(handle as usize)
    } else {
        None
    }
}

/// Resolve one handle and lock its frame.
///
/// `out` is the unit's output slot: it receives [`NO_BUFFER`] when the
/// handle cannot be mapped and the handle itself otherwise.
pub fn resolve_buffer<'a>(
    ctx: &ProcessContext<'a>,
    handle: f32,
    out: &mut f32,
) -> Result<FrameGuard<'a>, ResolveError> {
    let buf = locate_or_clear(ctx, handle, out)?;
    *out = handle;
    ctx.lock(buf)
}

/// Two locked frames, or one if both handles named the same slot.
#[derive(Debug)]
pub enum FramePair<'a> {
    Distinct(FrameGuard<'a>, FrameGuard<'a>),
    Aliased(FrameGuard<'a>),
}

impl FramePair<'_> {
    pub fn num_bins(&self) -> usize {
        match self {
            FramePair::Distinct(a, _) => a.num_bins(),
            FramePair::Aliased(a) => a.num_bins(),
        }
    }

    pub fn samples(&self) -> usize {
        match self {
            FramePair::Distinct(a, _) => a.samples(),
            FramePair::Aliased(a) => a.samples(),
        }
    }

    /// The destination frame, plus the source frame when it is distinct.
    pub fn frames_mut(&mut self) -> (&mut SpectralFrame, Option<&mut SpectralFrame>) {
        match self {
            FramePair::Distinct(a, b) => (&mut **a, Some(&mut **b)),
            FramePair::Aliased(a) => (&mut **a, None),
        }
    }
}

/// Resolve and lock two handles; the result lands in the first.
///
/// Fails without touching either frame when their bin counts differ. The
/// first handle is echoed to `out` once both handles have mapped.
pub fn resolve_buffer_pair<'a>(
    ctx: &ProcessContext<'a>,
    handle1: f32,
    handle2: f32,
    out: &mut f32,
) -> Result<FramePair<'a>, ResolveError> {
    let buf1 = locate_or_clear(ctx, handle1, out)?;
    let buf2 = locate_or_clear(ctx, handle2, out)?;
    *out = handle1;
    if buf1 == buf2 {
        return Ok(FramePair::Aliased(ctx.lock(buf1)?));
    }
    let frame1 = ctx.lock(buf1)?;
    let frame2 = ctx.lock(buf2)?;
    if frame1.num_bins() != frame2.num_bins() {
        return Err(ResolveError::BinCountMismatch);
    }
    Ok(FramePair::Distinct(frame1, frame2))
}

fn locate_or_clear(
    ctx: &ProcessContext<'_>,
    handle: f32,
    out: &mut f32,
) -> Result<BufRef, ResolveError> {
    let Some(index) = buffer_index(handle) else {
        *out = NO_BUFFER;
        return Err(ResolveError::InvalidHandle);
    };
    ctx.locate_index(index).ok_or_else(|| {
        *out = NO_BUFFER;
        ResolveError::NoBuffers
    })
}
