//! In-place approximate conversion between rectangular and polar bins.
//!
//! RT-safe: no allocation, no locking, no failure path. The caller already
//! holds the slot lock. DC and Nyquist are never read or written.

#![forbid(unsafe_code)]

use crate::approx;
use crate::frame::{Complex, Coord, Polar, SpectralFrame};

/// Put `frame` into [`Coord::Polar`] and return its polar bins.
///
/// A frame already in polar form is returned untouched.
pub fn to_polar_apx(frame: &mut SpectralFrame) -> &mut [Polar] {
    if frame.coord() == Coord::Complex {
        for pair in frame.bin_floats_mut().chunks_exact_mut(2) {
            let (re, im) = (pair[0], pair[1]);
            pair[0] = approx::magnitude(re, im);
            pair[1] = approx::atan2(im, re);
        }
        frame.set_coord(Coord::Polar);
    }
    bytemuck::cast_slice_mut(frame.bin_floats_mut())
}

/// Put `frame` into [`Coord::Complex`] and return its rectangular bins.
pub fn to_complex_apx(frame: &mut SpectralFrame) -> &mut [Complex] {
    if frame.coord() == Coord::Polar {
        for pair in frame.bin_floats_mut().chunks_exact_mut(2) {
            let (mag, phase) = (pair[0], pair[1]);
            pair[0] = mag * approx::cos(phase);
            pair[1] = mag * approx::sin(phase);
        }
        frame.set_coord(Coord::Complex);
    }
    bytemuck::cast_slice_mut(frame.bin_floats_mut())
}

/// Convert to `target`, whichever it is.
pub fn ensure_coord(frame: &mut SpectralFrame, target: Coord) {
    match target {
        Coord::Polar => {
            to_polar_apx(frame);
        }
        Coord::Complex => {
            to_complex_apx(frame);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn frame_from(dc: f32, nyq: f32, pairs: &[(f32, f32)]) -> SpectralFrame {
        let bins: Vec<Complex> = pairs.iter().map(|&(r, i)| Complex::new(r, i)).collect();
        SpectralFrame::from_complex(dc, nyq, &bins)
    }

    #[test]
    fn polar_of_axis_bins() {
        let mut frame = frame_from(0.0, 0.0, &[(2.0, 0.0), (0.0, 3.0), (-1.0, 0.0)]);
        let bins = to_polar_apx(&mut frame);
        assert!((bins[0].mag - 2.0).abs() < 1e-2);
        assert!(bins[0].phase.abs() < 1e-4);
        assert!((bins[1].mag - 3.0).abs() < 1e-2);
        assert!((bins[1].phase - std::f32::consts::FRAC_PI_2).abs() < 1e-4);
        assert!((bins[2].phase - std::f32::consts::PI).abs() < 1e-4);
        assert_eq!(frame.coord(), Coord::Polar);
    }

    #[test]
    fn second_conversion_is_noop() {
        let mut frame = frame_from(1.0, 2.0, &[(0.3, -0.7), (5.0, 1.0)]);
        to_polar_apx(&mut frame);
        let once = frame.clone();
        to_polar_apx(&mut frame);
        assert_eq!(frame, once);

        to_complex_apx(&mut frame);
        let back = frame.clone();
        to_complex_apx(&mut frame);
        assert_eq!(frame, back);
    }

    #[test]
    fn zero_bins_stay_zero() {
        let mut frame = SpectralFrame::new(10);
        to_polar_apx(&mut frame);
        assert!(frame.as_slice().iter().all(|&x| x == 0.0));
        to_complex_apx(&mut frame);
        assert!(frame.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn odd_trailing_sample_untouched() {
        let mut frame = SpectralFrame::new(5);
        frame.write_raw(Coord::Complex).copy_from_slice(&[0.0, 0.0, 3.0, 4.0, 42.0]);
        to_polar_apx(&mut frame);
        assert_eq!(frame.as_slice()[4], 42.0);
    }

    #[test]
    fn extreme_magnitudes_round_trip() {
        for (re, im) in [(3e19, 4e19), (-3e30, 1e30), (3e-21, -4e-21), (1e-30, 1e-30)] {
            let mut frame = frame_from(0.0, 0.0, &[(re, im)]);
            let mag = to_polar_apx(&mut frame)[0].mag;
            let exact = (re as f64).hypot(im as f64) as f32;
            assert!((mag - exact).abs() <= 5e-3 * exact, "({re}, {im}) -> {mag}");
            let back = to_complex_apx(&mut frame)[0];
            assert!(back.real.is_finite() && back.imag.is_finite());
            let err = ((back.real - re) as f64).hypot((back.imag - im) as f64);
            assert!(err <= 0.02 * exact as f64, "({re}, {im}) -> {back:?}");
        }
    }

    #[test]
    fn ensure_coord_dispatches() {
        let mut frame = frame_from(0.0, 0.0, &[(1.0, 1.0)]);
        ensure_coord(&mut frame, Coord::Polar);
        assert_eq!(frame.coord(), Coord::Polar);
        ensure_coord(&mut frame, Coord::Complex);
        assert_eq!(frame.coord(), Coord::Complex);
    }

    fn pairs() -> impl Strategy<Value = Vec<(f32, f32)>> {
        prop::collection::vec((-1000.0f32..1000.0, -1000.0f32..1000.0), 0..64)
    }

    proptest! {
        #[test]
        fn round_trip_within_tolerance(
            dc in -10.0f32..10.0,
            nyq in -10.0f32..10.0,
            bins in pairs(),
        ) {
            let mut frame = frame_from(dc, nyq, &bins);
            to_polar_apx(&mut frame);
            let out = to_complex_apx(&mut frame);
            for (&(re, im), got) in bins.iter().zip(out.iter()) {
                let mag = re.hypot(im);
                let err = (got.real - re).hypot(got.imag - im);
                prop_assert!(err <= 0.02 * mag + 1e-4, "({re}, {im}) -> {got:?}");
            }
        }

        #[test]
        fn header_is_bit_identical(
            dc in any::<f32>(),
            nyq in any::<f32>(),
            bins in pairs(),
        ) {
            let mut frame = frame_from(dc, nyq, &bins);
            to_polar_apx(&mut frame);
            prop_assert_eq!(frame.dc().to_bits(), dc.to_bits());
            prop_assert_eq!(frame.nyquist().to_bits(), nyq.to_bits());
            to_complex_apx(&mut frame);
            prop_assert_eq!(frame.dc().to_bits(), dc.to_bits());
            prop_assert_eq!(frame.nyquist().to_bits(), nyq.to_bits());
        }

        #[test]
        fn polar_is_idempotent(bins in pairs()) {
            let mut frame = frame_from(0.0, 0.0, &bins);
            to_polar_apx(&mut frame);
            let once: Vec<u32> = frame.as_slice().iter().map(|x| x.to_bits()).collect();
            to_polar_apx(&mut frame);
            let twice: Vec<u32> = frame.as_slice().iter().map(|x| x.to_bits()).collect();
            prop_assert_eq!(once, twice);
        }
    }
}
