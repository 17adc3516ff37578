//! Fast scalar approximations for the audio thread.
//!
//! None of these call into libm transcendental functions. Accuracy over the
//! ranges the bin converters see:
//! - [`magnitude`]: relative error under 0.2%
//! - [`atan2`]: absolute error under 1e-5 rad
//! - [`sin`] / [`cos`]: absolute error under 1.1e-3

#![forbid(unsafe_code)]

use std::f32::consts::{FRAC_PI_2, PI, TAU};

const INV_TAU: f32 = 1.0 / TAU;

/// Reciprocal square root: bit-level initial guess plus one Newton step.
#[inline]
pub fn rsqrt(x: f32) -> f32 {
    let guess = f32::from_bits(0x5f37_59df_u32.wrapping_sub(x.to_bits() >> 1));
    guess * (1.5 - 0.5 * x * guess * guess)
}

/// `hypot(re, im)` without a square root.
///
/// Scaled by the larger component so [`rsqrt`] only ever sees `[1, 2]`;
/// squaring the raw components would overflow or go subnormal at the
/// extremes of the `f32` range.
#[inline]
pub fn magnitude(re: f32, im: f32) -> f32 {
    let (a, b) = (re.abs(), im.abs());
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if hi == 0.0 || hi.is_infinite() {
        return hi;
    }
    let t = lo / hi;
    let s = 1.0 + t * t;
    hi * (s * rsqrt(s))
}

/// Minimax odd polynomial for `atan(z)` on `[-1, 1]`.
#[inline]
fn atan_unit(z: f32) -> f32 {
    let z2 = z * z;
    z * (0.999_977_26
        + z2 * (-0.332_623_47
            + z2 * (0.193_543_46 + z2 * (-0.116_432_87 + z2 * (0.052_653_32 + z2 * -0.011_721_2)))))
}

/// Four-quadrant arctangent, result in `[-PI, PI]`. `atan2(0, 0)` is `0`.
#[inline]
pub fn atan2(y: f32, x: f32) -> f32 {
    let ax = x.abs();
    let ay = y.abs();
    if ax == 0.0 && ay == 0.0 {
        return 0.0;
    }
    let mut angle = if ay > ax {
        FRAC_PI_2 - atan_unit(ax / ay)
    } else {
        atan_unit(ay / ax)
    };
    if x < 0.0 {
        angle = PI - angle;
    }
    if y < 0.0 {
        -angle
    } else {
        angle
    }
}

/// Fold any finite phase into `[-PI, PI]`.
#[inline]
pub fn wrap_phase(x: f32) -> f32 {
    x - TAU * (x * INV_TAU).round()
}

/// Parabolic sine with one refinement pass.
#[inline]
pub fn sin(x: f32) -> f32 {
    const B: f32 = 4.0 / PI;
    const C: f32 = -4.0 / (PI * PI);
    const P: f32 = 0.225;
    let x = wrap_phase(x);
    let y = B * x + C * x * x.abs();
    P * (y * y.abs() - y) + y
}

#[inline]
pub fn cos(x: f32) -> f32 {
    sin(x + FRAC_PI_2)
}
