//! Common

#![allow(dead_code)]

use num_traits::Num;
use std::ops::{Add, Mul, Sub};

/// Use 32-bit precision for floating point numbers.
pub type Float = f32;

/// Infinty (∞)
pub const INFINITY: Float = Float::INFINITY;

/// Largest finite `Float`.
pub const FLT_MAX: Float = Float::MAX;

/// Machine epsilon for `Float`.
pub const FLT_EPSILON: Float = Float::EPSILON;

/// PI (π)
pub const PI: Float = std::f32::consts::PI;

/// 1/PI (1/π)
pub const INV_PI: Float = 1.0 / PI;

/// PI/2 (π/2)
pub const PI_OVER_TWO: Float = PI * 0.5;

/// 2*PI (2π)
pub const TWO_PI: Float = PI * 2.0;

/// 1/2*PI (1/2π)
pub const INV_TWO_PI: Float = 1.0 / TWO_PI;

/// 4*PI (4π)
pub const FOUR_PI: Float = PI * 4.0;

/// 1/4*PI (1/4π)
pub const INV_FOUR_PI: Float = 1.0 / FOUR_PI;

/// 32-bit precision value for 1 - epsilon.
pub const ONE_MINUS_EPSILON: Float = hexf32!("0x1.fffffep-1"); // 0.99999994

/// Returns the minimum of 2 numbers.
///
/// * `a` - First number.
/// * `b` - Second number.
#[inline(always)]
pub fn min<T>(a: T, b: T) -> T
where
    T: Num + PartialOrd + Copy,
{
    if a < b {
        a
    } else {
        b
    }
}

/// Returns the maximum of 2 numbers.
///
/// * `a` - First number.
/// * `b` - Second number.
#[inline(always)]
pub fn max<T>(a: T, b: T) -> T
where
    T: Num + PartialOrd + Copy,
{
    if a > b {
        a
    } else {
        b
    }
}

/// Clamps a value to the closed interval [low, high].
///
/// * `val`  - The value.
/// * `low`  - Lower bound.
/// * `high` - Upper bound.
#[inline(always)]
pub fn clamp<T>(val: T, low: T, high: T) -> T
where
    T: PartialOrd,
{
    if val < low {
        low
    } else if val > high {
        high
    } else {
        val
    }
}

/// Clamps a value to [0, 1].
///
/// * `val` - The value.
#[inline(always)]
pub fn saturate(val: Float) -> Float {
    clamp(val, 0.0, 1.0)
}

/// Linearly interpolate between two values.
///
/// * `t`  - Parameter in [0, 1].
/// * `v1` - Value at `t = 0`.
/// * `v2` - Value at `t = 1`.
#[inline(always)]
pub fn lerp<P>(t: Float, v1: P, v2: P) -> P
where
    P: Add<P, Output = P> + Sub<P, Output = P> + Mul<Float, Output = P> + Copy,
{
    v1 + (v2 - v1) * t
}

/// Square root that treats negative inputs as zero.
///
/// * `x` - The value.
#[inline(always)]
pub fn safe_sqrt(x: Float) -> Float {
    x.max(0.0).sqrt()
}

/// Arc-cosine that clamps inputs to [-1, 1].
///
/// * `x` - The value.
#[inline(always)]
pub fn safe_acos(x: Float) -> Float {
    clamp(x, -1.0, 1.0).acos()
}

/// Division that returns 0 when the divisor is 0.
///
/// * `a` - Dividend.
/// * `b` - Divisor.
#[inline(always)]
pub fn safe_divide(a: Float, b: Float) -> Float {
    if b != 0.0 {
        a / b
    } else {
        0.0
    }
}

/// Reinterpret the bits of a float as a signed integer.
///
/// * `f` - The float.
#[inline(always)]
pub fn float_as_int(f: Float) -> i32 {
    f.to_bits() as i32
}

/// Reinterpret the bits of a signed integer as a float.
///
/// * `i` - The integer.
#[inline(always)]
pub fn int_as_float(i: i32) -> Float {
    Float::from_bits(i as u32)
}

/// Power heuristic for multiple importance sampling with two strategies.
///
/// * `a` - PDF of the strategy being weighted.
/// * `b` - PDF of the competing strategy.
#[inline(always)]
pub fn power_heuristic(a: Float, b: Float) -> Float {
    let a2 = a * a;
    let denom = a2 + b * b;
    if denom > 0.0 {
        a2 / denom
    } else {
        0.0
    }
}

/// Convert a linear value to sRGB.
///
/// * `value` - Linear value.
#[inline(always)]
pub fn linear_to_srgb(value: Float) -> Float {
    if value <= 0.0031308 {
        12.92 * value.max(0.0)
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Convert an sRGB value to linear.
///
/// * `value` - sRGB value.
#[inline(always)]
pub fn srgb_to_linear(value: Float) -> Float {
    if value <= 0.04045 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    #[test]
    fn srgb_round_trip_at_midpoint() {
        let v = srgb_to_linear(linear_to_srgb(0.5));
        assert!(approx_eq!(f32, v, 0.5, epsilon = 1e-5));
        assert_eq!(linear_to_srgb(-1.0), 0.0);
    }

    #[test]
    fn one_minus_epsilon_is_below_one() {
        assert!(ONE_MINUS_EPSILON < 1.0);
        assert_eq!(ONE_MINUS_EPSILON, 0.99999994);
    }

    #[test]
    fn power_heuristic_is_symmetric_at_equal_pdfs() {
        assert!(approx_eq!(f32, power_heuristic(2.0, 2.0), 0.5, ulps = 2));
        assert_eq!(power_heuristic(0.0, 0.0), 0.0);
    }

    #[test]
    fn safe_functions_handle_degenerate_input() {
        assert_eq!(safe_sqrt(-1.0), 0.0);
        assert_eq!(safe_divide(1.0, 0.0), 0.0);
        assert!(approx_eq!(f32, safe_acos(2.0), 0.0, ulps = 2));
    }

    proptest! {
        #[test]
        fn lerp_stays_within_endpoints(t in 0.0..1.0f32, a in -100.0..100.0f32, b in -100.0..100.0f32) {
            let v = lerp(t, a, b);
            prop_assert!(v >= a.min(b) - 1e-3 && v <= a.max(b) + 1e-3);
        }

        #[test]
        fn clamp_respects_bounds(v in -1000.0..1000.0f32) {
            let c = clamp(v, -1.0, 1.0);
            prop_assert!((-1.0..=1.0).contains(&c));
        }
    }
}
