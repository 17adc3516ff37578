//! Spectral frame layout: DC, Nyquist and an ordered bin sequence in one block.
//!
//! Storage is a single contiguous `f32` block laid out as
//!
//! ```text
//! dc  nyq  re1 im1  re2 im2  ...  re(N-1) im(N-1)
//! ```
//!
//! where the pairs are read as `(magnitude, phase)` instead when the frame is
//! in [`Coord::Polar`]. The first two slots never move and conversions only
//! rewrite the pairs.

#![forbid(unsafe_code)]

use bytemuck::{Pod, Zeroable};

/// Which encoding the frame's bins currently hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Coord {
    /// Rectangular `(real, imag)` pairs.
    Complex,
    /// `(magnitude, phase)` pairs.
    Polar,
}

/// One bin in rectangular form.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Complex {
    pub real: f32,
    pub imag: f32,
}

impl Complex {
    pub const fn new(real: f32, imag: f32) -> Self {
        Self { real, imag }
    }
}

/// One bin in polar form. Phase is in radians.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Polar {
    pub mag: f32,
    pub phase: f32,
}

impl Polar {
    pub const fn new(mag: f32, phase: f32) -> Self {
        Self { mag, phase }
    }
}

/// A single bin tagged with the encoding its owning frame was in when read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinPair {
    Rect(Complex),
    Polar(Polar),
}

/// Scalar slots ahead of the bins.
const HEADER_LEN: usize = 2;

/// Number of bins held by a frame of `samples` floats.
#[inline]
pub const fn bins_for_samples(samples: usize) -> usize {
    samples.saturating_sub(HEADER_LEN) / 2
}

/// One windowed block's frequency-domain representation.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralFrame {
    coord: Coord,
    data: Box<[f32]>,
}

impl SpectralFrame {
    /// A zeroed frame of `samples` floats in [`Coord::Complex`].
    pub fn new(samples: usize) -> Self {
        Self {
            coord: Coord::Complex,
            data: vec![0.0; samples].into_boxed_slice(),
        }
    }

    /// An empty frame, as held by an unallocated pool slot.
    pub fn empty() -> Self {
        Self::new(0)
    }

    /// Build a rectangular frame from its parts.
    pub fn from_complex(dc: f32, nyquist: f32, bins: &[Complex]) -> Self {
        let mut frame = Self::new(HEADER_LEN + bins.len() * 2);
        frame.load_complex(dc, nyquist, bins);
        frame
    }

    /// Total float count of the backing block.
    #[inline]
    pub fn samples(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn num_bins(&self) -> usize {
        bins_for_samples(self.data.len())
    }

    #[inline]
    pub fn coord(&self) -> Coord {
        self.coord
    }

    #[inline]
    pub fn dc(&self) -> f32 {
        self.data.first().copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn nyquist(&self) -> f32 {
        self.data.get(1).copied().unwrap_or(0.0)
    }

    pub fn set_dc(&mut self, value: f32) {
        if let Some(slot) = self.data.first_mut() {
            *slot = value;
        }
    }

    pub fn set_nyquist(&mut self, value: f32) {
        if let Some(slot) = self.data.get_mut(1) {
            *slot = value;
        }
    }

    /// Read bin `index` in whichever encoding the frame currently holds.
    pub fn bin(&self, index: usize) -> Option<BinPair> {
        if index >= self.num_bins() {
            return None;
        }
        let base = HEADER_LEN + index * 2;
        let (a, b) = (self.data[base], self.data[base + 1]);
        Some(match self.coord {
            Coord::Complex => BinPair::Rect(Complex::new(a, b)),
            Coord::Polar => BinPair::Polar(Polar::new(a, b)),
        })
    }

    /// Rectangular bins, or `None` if the frame is polar.
    pub fn complex_bins(&self) -> Option<&[Complex]> {
        match self.coord {
            Coord::Complex => Some(bytemuck::cast_slice(self.bin_floats())),
            Coord::Polar => None,
        }
    }

    /// Polar bins, or `None` if the frame is rectangular.
    pub fn polar_bins(&self) -> Option<&[Polar]> {
        match self.coord {
            Coord::Polar => Some(bytemuck::cast_slice(self.bin_floats())),
            Coord::Complex => None,
        }
    }

    pub fn complex_bins_mut(&mut self) -> Option<&mut [Complex]> {
        match self.coord {
            Coord::Complex => Some(bytemuck::cast_slice_mut(self.bin_floats_mut())),
            Coord::Polar => None,
        }
    }

    pub fn polar_bins_mut(&mut self) -> Option<&mut [Polar]> {
        match self.coord {
            Coord::Polar => Some(bytemuck::cast_slice_mut(self.bin_floats_mut())),
            Coord::Complex => None,
        }
    }

    /// Overwrite the frame with rectangular data and mark it [`Coord::Complex`].
    ///
    /// Extra source bins are ignored; missing ones are zeroed.
    pub fn load_complex(&mut self, dc: f32, nyquist: f32, bins: &[Complex]) {
        self.coord = Coord::Complex;
        self.set_dc(dc);
        self.set_nyquist(nyquist);
        if let Some(dst) = self.complex_bins_mut() {
            let n = dst.len().min(bins.len());
            dst[..n].copy_from_slice(&bins[..n]);
            dst[n..].fill(Complex::default());
        }
    }

    /// Zero every slot and return to [`Coord::Complex`].
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.coord = Coord::Complex;
    }

    /// Raw backing block, header included.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Producer access to the raw block. The caller states which encoding it
    /// wrote through `coord`.
    pub fn write_raw(&mut self, coord: Coord) -> &mut [f32] {
        self.coord = coord;
        &mut self.data
    }

    pub(crate) fn set_coord(&mut self, coord: Coord) {
        self.coord = coord;
    }

    /// The paired floats past the header, trimmed to an even count.
    pub(crate) fn bin_floats(&self) -> &[f32] {
        let end = HEADER_LEN + self.num_bins() * 2;
        self.data.get(HEADER_LEN..end).unwrap_or(&[])
    }

    pub(crate) fn bin_floats_mut(&mut self) -> &mut [f32] {
        let end = HEADER_LEN + self.num_bins() * 2;
        self.data.get_mut(HEADER_LEN..end).unwrap_or(&mut [])
    }
}

impl Default for SpectralFrame {
    fn default() -> Self {
        Self::empty()
    }
}
