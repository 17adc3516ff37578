//! Phase-vocoder units: buffer resolution, scratch guard and terminal state.
//!
//! A unit wraps a [`PvKernel`]. Each invocation it resolves its handle(s),
//! optionally makes sure it owns a scratch block, then hands the locked
//! frame(s) to the kernel. Running out of real-time memory moves the unit to
//! [`UnitState::Degenerate`], which is terminal.

#![forbid(unsafe_code)]

use crate::diag::Diagnostic;
use crate::frame::SpectralFrame;
use crate::pool::FrameGuard;
use crate::resolve::{resolve_buffer, resolve_buffer_pair, FramePair, ProcessContext, NO_BUFFER};
use crate::rt_alloc::{AllocError, RtPool, ScratchBuf};

/// How many buffer handles a kernel consumes from its leading inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Single,
    Pair,
}

impl Arity {
    pub const fn handles(self) -> usize {
        match self {
            Arity::Single => 1,
            Arity::Pair => 2,
        }
    }
}

/// The locked frame(s) a kernel works on for one invocation.
#[derive(Debug)]
pub enum Frames<'a> {
    One(FrameGuard<'a>),
    Two(FramePair<'a>),
}

impl Frames<'_> {
    /// Samples of the (first) frame.
    pub fn samples(&self) -> usize {
        match self {
            Frames::One(frame) => frame.samples(),
            Frames::Two(pair) => pair.samples(),
        }
    }

    pub fn num_bins(&self) -> usize {
        match self {
            Frames::One(frame) => frame.num_bins(),
            Frames::Two(pair) => pair.num_bins(),
        }
    }

    /// The frame results are written to.
    pub fn dest_mut(&mut self) -> &mut SpectralFrame {
        match self {
            Frames::One(frame) => &mut **frame,
            Frames::Two(pair) => pair.frames_mut().0,
        }
    }
}

/// Spectral computation plugged into a [`PvUnit`].
pub trait PvKernel: Send + 'static {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    fn arity(&self) -> Arity;

    /// Whether the kernel needs a scratch block the size of its frame.
    fn needs_scratch(&self) -> bool {
        false
    }

    /// Work on the frame(s) in place. `params` are the inputs after the
    /// handles; `scratch` is empty unless [`PvKernel::needs_scratch`].
    fn process(&mut self, frames: &mut Frames<'_>, params: &[f32], scratch: &mut [f32]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Active,
    /// Terminal: outputs the sentinel and does nothing else.
    Degenerate,
}

/// Outcome of [`ScratchGuard::ensure`] when no allocation error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScratchStatus {
    Ready,
    /// A block exists for a different bin count; skip this cycle.
    SizeMismatch,
}

/// Lazily acquired scratch block, pinned to the bin count it was sized for.
#[derive(Debug, Default)]
pub struct ScratchGuard {
    buf: Option<ScratchBuf>,
    num_bins: usize,
}

impl ScratchGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_acquired(&self) -> bool {
        self.buf.is_some()
    }

    /// Bin count the held block was sized for.
    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    /// Make sure a block of `samples` floats is held.
    ///
    /// The first call allocates from `rt`. Later calls reuse the block while
    /// the bin count stays the same; a changed bin count is reported as
    /// [`ScratchStatus::SizeMismatch`] and nothing is reallocated.
    pub fn ensure(
        &mut self,
        rt: &mut RtPool,
        samples: usize,
        num_bins: usize,
    ) -> Result<ScratchStatus, AllocError> {
        match self.buf {
            None => {
                self.buf = Some(rt.alloc(samples)?);
                self.num_bins = num_bins;
                Ok(ScratchStatus::Ready)
            }
            Some(_) if num_bins != self.num_bins => Ok(ScratchStatus::SizeMismatch),
            Some(_) => Ok(ScratchStatus::Ready),
        }
    }

    /// The held block, or an empty slice.
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }

    /// Return the block to `rt`. Not called from the audio thread.
    pub fn release(&mut self, rt: &mut RtPool) {
        if let Some(buf) = self.buf.take() {
            rt.free(buf);
        }
        self.num_bins = 0;
    }
}

/// A kernel plus the per-instance state the protocol needs.
#[derive(Debug)]
pub struct PvUnit<K: PvKernel> {
    kernel: K,
    state: UnitState,
    done: bool,
    scratch: ScratchGuard,
}

impl<K: PvKernel> PvUnit<K> {
    pub fn new(kernel: K) -> Self {
        Self {
            kernel,
            state: UnitState::Active,
            done: false,
            scratch: ScratchGuard::new(),
        }
    }

    pub fn kernel(&self) -> &K {
        &self.kernel
    }

    pub fn scratch(&self) -> &ScratchGuard {
        &self.scratch
    }

    /// Process one block. `inputs` lead with the buffer handle(s); `outputs[0]`
    /// receives the echoed handle or [`NO_BUFFER`].
    pub fn next(&mut self, ctx: &mut ProcessContext<'_>, inputs: &[f32], outputs: &mut [f32]) {
        let Some(out) = outputs.first_mut() else {
            return;
        };
        if self.state == UnitState::Degenerate {
            *out = NO_BUFFER;
            return;
        }
        let arity = self.kernel.arity();
        if inputs.len() < arity.handles() {
            *out = NO_BUFFER;
            return;
        }
        let resolved = match arity {
            Arity::Single => resolve_buffer(ctx, inputs[0], out).map(Frames::One),
            Arity::Pair => resolve_buffer_pair(ctx, inputs[0], inputs[1], out).map(Frames::Two),
        };
        let Ok(mut frames) = resolved else {
            return;
        };
        if self.kernel.needs_scratch()
            && !self.ensure_scratch(ctx, frames.samples(), frames.num_bins())
        {
            if self.state == UnitState::Degenerate {
                *out = NO_BUFFER;
            }
            return;
        }
        let params = &inputs[arity.handles()..];
        self.kernel
            .process(&mut frames, params, self.scratch.as_mut_slice());
    }

    /// Allocation guard: `true` when a scratch block for `num_bins` is held.
    ///
    /// A pool failure reports one diagnostic, moves the unit to
    /// [`UnitState::Degenerate`] and marks it done.
    pub fn ensure_scratch(
        &mut self,
        ctx: &mut ProcessContext<'_>,
        samples: usize,
        num_bins: usize,
    ) -> bool {
        match self.scratch.ensure(ctx.rt, samples, num_bins) {
            Ok(ScratchStatus::Ready) => true,
            Ok(ScratchStatus::SizeMismatch) => false,
            Err(_) => {
                ctx.diag
                    .report(Diagnostic::alloc_failed(self.kernel.name(), samples));
                self.state = UnitState::Degenerate;
                self.done = true;
                false
            }
        }
    }
}

/// Object-safe view of a unit for the scheduler.
pub trait UnitDyn: Send {
    fn name(&self) -> &'static str;
    fn state(&self) -> UnitState;
    /// Set once the unit should not be scheduled again.
    fn is_done(&self) -> bool;
    fn arity(&self) -> Arity;
    fn next(&mut self, ctx: &mut ProcessContext<'_>, inputs: &[f32], outputs: &mut [f32]);
    /// Give back anything borrowed from the real-time pool.
    fn release(&mut self, rt: &mut RtPool);
}

impl<K: PvKernel> UnitDyn for PvUnit<K> {
    fn name(&self) -> &'static str {
        self.kernel.name()
    }

    fn state(&self) -> UnitState {
        self.state
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn arity(&self) -> Arity {
        self.kernel.arity()
    }

    fn next(&mut self, ctx: &mut ProcessContext<'_>, inputs: &[f32], outputs: &mut [f32]) {
        PvUnit::next(self, ctx, inputs, outputs)
    }

    fn release(&mut self, rt: &mut RtPool) {
        self.scratch.release(rt)
    }
}
