//! Phase-vocoder kernels built on the frame protocol.
//!
//! Each kernel converts its frame(s) to the encoding it needs and then works
//! in place. Parameters follow the buffer handles on the unit's inputs.

#![forbid(unsafe_code)]

use crate::convert::{to_complex_apx, to_polar_apx};
use crate::frame::SpectralFrame;
use crate::unit::{Arity, Frames, PvKernel};

#[inline]
fn param(params: &[f32], index: usize) -> f32 {
    params.get(index).copied().unwrap_or(0.0)
}

/// Turn a control value into a bin index in `[0, hi)`.
///
/// The value is truncated. Negative, NaN and out-of-range values map to 0.
#[inline]
pub fn clip_index(x: f32, hi: usize) -> usize {
    if x >= 0.0 && (x as usize) < hi {
        x as usize
    } else {
        0
    }
}

/// Multiply magnitudes of the first frame by those of the second.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagMul;

impl PvKernel for MagMul {
    fn name(&self) -> &'static str {
        "MagMul"
    }

    fn arity(&self) -> Arity {
        Arity::Pair
    }

    fn process(&mut self, frames: &mut Frames<'_>, _params: &[f32], _scratch: &mut [f32]) {
        let Frames::Two(pair) = frames else {
            return;
        };
        match pair.frames_mut() {
            (dst, Some(src)) => {
                dst.set_dc(dst.dc() * src.dc());
                dst.set_nyquist(dst.nyquist() * src.nyquist());
                let a = to_polar_apx(dst);
                let b = to_polar_apx(src);
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    x.mag *= y.mag;
                }
            }
            (dst, None) => {
                dst.set_dc(dst.dc() * dst.dc());
                dst.set_nyquist(dst.nyquist() * dst.nyquist());
                for x in to_polar_apx(dst) {
                    x.mag *= x.mag;
                }
            }
        }
    }
}

/// Complex sum of two frames into the first.
#[derive(Debug, Clone, Copy, Default)]
pub struct Add;

impl PvKernel for Add {
    fn name(&self) -> &'static str {
        "Add"
    }

    fn arity(&self) -> Arity {
        Arity::Pair
    }

    fn process(&mut self, frames: &mut Frames<'_>, _params: &[f32], _scratch: &mut [f32]) {
        let Frames::Two(pair) = frames else {
            return;
        };
        match pair.frames_mut() {
            (dst, Some(src)) => {
                dst.set_dc(dst.dc() + src.dc());
                dst.set_nyquist(dst.nyquist() + src.nyquist());
                let a = to_complex_apx(dst);
                let b = to_complex_apx(src);
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    x.real += y.real;
                    x.imag += y.imag;
                }
            }
            (dst, None) => {
                dst.set_dc(dst.dc() * 2.0);
                dst.set_nyquist(dst.nyquist() * 2.0);
                for x in to_complex_apx(dst) {
                    x.real *= 2.0;
                    x.imag *= 2.0;
                }
            }
        }
    }
}

/// Zero every bin whose magnitude is below `params[0]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagAbove;

impl PvKernel for MagAbove {
    fn name(&self) -> &'static str {
        "MagAbove"
    }

    fn arity(&self) -> Arity {
        Arity::Single
    }

    fn process(&mut self, frames: &mut Frames<'_>, params: &[f32], _scratch: &mut [f32]) {
        let threshold = param(params, 0);
        let frame = frames.dest_mut();
        if frame.dc().abs() < threshold {
            frame.set_dc(0.0);
        }
        if frame.nyquist().abs() < threshold {
            frame.set_nyquist(0.0);
        }
        for bin in to_polar_apx(frame) {
            if bin.mag < threshold {
                bin.mag = 0.0;
            }
        }
    }
}

/// Add `params[0]` radians to every bin's phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseShift;

impl PvKernel for PhaseShift {
    fn name(&self) -> &'static str {
        "PhaseShift"
    }

    fn arity(&self) -> Arity {
        Arity::Single
    }

    fn process(&mut self, frames: &mut Frames<'_>, params: &[f32], _scratch: &mut [f32]) {
        let shift = param(params, 0);
        for bin in to_polar_apx(frames.dest_mut()) {
            bin.phase += shift;
        }
    }
}

/// Keep the bin at index `params[0]` and zero every other bin. DC and
/// Nyquist are left alone. Works in either encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinSelect;

impl PvKernel for BinSelect {
    fn name(&self) -> &'static str {
        "BinSelect"
    }

    fn arity(&self) -> Arity {
        Arity::Single
    }

    fn process(&mut self, frames: &mut Frames<'_>, params: &[f32], _scratch: &mut [f32]) {
        let frame = frames.dest_mut();
        let keep = clip_index(param(params, 0), frame.num_bins());
        for (i, pair) in frame.bin_floats_mut().chunks_exact_mut(2).enumerate() {
            if i != keep {
                pair.fill(0.0);
            }
        }
    }
}

/// Average each bin's magnitude with its `params[0]` neighbours on either
/// side. Phases are kept.
#[derive(Debug, Clone, Copy, Default)]
pub struct MagSmear;

impl PvKernel for MagSmear {
    fn name(&self) -> &'static str {
        "MagSmear"
    }

    fn arity(&self) -> Arity {
        Arity::Single
    }

    fn needs_scratch(&self) -> bool {
        true
    }

    fn process(&mut self, frames: &mut Frames<'_>, params: &[f32], scratch: &mut [f32]) {
        smear(frames.dest_mut(), param(params, 0), scratch);
    }
}

fn smear(frame: &mut SpectralFrame, width: f32, scratch: &mut [f32]) {
    let bins = to_polar_apx(frame);
    let n = bins.len();
    let Some(mags) = scratch.get_mut(..n) else {
        return;
    };
    if n == 0 {
        return;
    }
    let width = (width.max(0.0) as usize).min(n - 1);
    let scale = 1.0 / (2 * width + 1) as f32;

    // Sliding window over [j - width, j + width], clipped to the frame.
    let mut sum: f32 = bins[..width.min(n)].iter().map(|b| b.mag).sum();
    for (j, out) in mags.iter_mut().enumerate() {
        if let Some(entering) = bins.get(j + width) {
            sum += entering.mag;
        }
        if j > width {
            sum -= bins[j - width - 1].mag;
        }
        *out = sum * scale;
    }
    for (bin, &mag) in bins.iter_mut().zip(mags.iter()) {
        bin.mag = mag;
    }
}
