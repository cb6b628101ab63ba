//! Spectrum

#![allow(dead_code)]
use crate::geometry::Vector3f;
use crate::math::*;
use std::ops::{Add, AddAssign, Div, DivAssign, Index, Mul, MulAssign, Sub};

/// Number of samples used in `Spectrum`.
pub const SPECTRUM_SAMPLES: usize = 3;

/// Radiance, throughput and closure weights in linear RGB.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RGBSpectrum {
    /// Red, green and blue components.
    pub c: [Float; SPECTRUM_SAMPLES],
}

/// Default to using `RGBSpectrum` for rendering.
pub type Spectrum = RGBSpectrum;

impl RGBSpectrum {
    /// Create a spectrum with every component set to `v`.
    ///
    /// * `v` - The value.
    pub const fn new(v: Float) -> Self {
        Self { c: [v, v, v] }
    }

    /// Create a spectrum from RGB components.
    ///
    /// * `r` - Red.
    /// * `g` - Green.
    /// * `b` - Blue.
    pub const fn rgb(r: Float, g: Float, b: Float) -> Self {
        Self { c: [r, g, b] }
    }

    /// Black.
    pub const fn zero() -> Self {
        Self::new(0.0)
    }

    /// White.
    pub const fn one() -> Self {
        Self::new(1.0)
    }

    /// Red component.
    pub fn r(&self) -> Float {
        self.c[0]
    }

    /// Green component.
    pub fn g(&self) -> Float {
        self.c[1]
    }

    /// Blue component.
    pub fn b(&self) -> Float {
        self.c[2]
    }

    /// Returns true if all components are zero.
    pub fn is_black(&self) -> bool {
        self.c.iter().all(|&v| v == 0.0)
    }

    /// Returns true if any component is NaN.
    pub fn has_nans(&self) -> bool {
        self.c.iter().any(|v| v.is_nan())
    }

    /// Returns true if all components are finite.
    pub fn is_finite(&self) -> bool {
        self.c.iter().all(|v| v.is_finite())
    }

    /// Mean of the components.
    pub fn average(&self) -> Float {
        (self.c[0] + self.c[1] + self.c[2]) / 3.0
    }

    /// Largest component.
    pub fn max_component_value(&self) -> Float {
        max(self.c[0], max(self.c[1], self.c[2]))
    }

    /// Luminance using Rec.709 weights.
    pub fn y(&self) -> Float {
        0.2126 * self.c[0] + 0.7152 * self.c[1] + 0.0722 * self.c[2]
    }

    /// Component-wise exponential.
    pub fn exp(&self) -> Self {
        Self::rgb(self.c[0].exp(), self.c[1].exp(), self.c[2].exp())
    }

    /// Component-wise clamp to [low, high].
    ///
    /// * `low`  - Lower bound.
    /// * `high` - Upper bound.
    pub fn clamp(&self, low: Float, high: Float) -> Self {
        Self::rgb(
            clamp(self.c[0], low, high),
            clamp(self.c[1], low, high),
            clamp(self.c[2], low, high),
        )
    }

    /// Component-wise division that yields 0 where the divisor is 0.
    ///
    /// * `other` - The divisor.
    pub fn safe_divide(&self, other: &Self) -> Self {
        Self::rgb(
            safe_divide(self.c[0], other.c[0]),
            safe_divide(self.c[1], other.c[1]),
            safe_divide(self.c[2], other.c[2]),
        )
    }
}

impl Add for RGBSpectrum {
    type Output = Self;

    fn add(self, o: Self) -> Self::Output {
        Self::rgb(self.c[0] + o.c[0], self.c[1] + o.c[1], self.c[2] + o.c[2])
    }
}

impl AddAssign for RGBSpectrum {
    fn add_assign(&mut self, o: Self) {
        for i in 0..SPECTRUM_SAMPLES {
            self.c[i] += o.c[i];
        }
    }
}

impl Sub for RGBSpectrum {
    type Output = Self;

    fn sub(self, o: Self) -> Self::Output {
        Self::rgb(self.c[0] - o.c[0], self.c[1] - o.c[1], self.c[2] - o.c[2])
    }
}

impl Mul for RGBSpectrum {
    type Output = Self;

    fn mul(self, o: Self) -> Self::Output {
        Self::rgb(self.c[0] * o.c[0], self.c[1] * o.c[1], self.c[2] * o.c[2])
    }
}

impl MulAssign for RGBSpectrum {
    fn mul_assign(&mut self, o: Self) {
        for i in 0..SPECTRUM_SAMPLES {
            self.c[i] *= o.c[i];
        }
    }
}

impl Mul<Float> for RGBSpectrum {
    type Output = Self;

    fn mul(self, f: Float) -> Self::Output {
        Self::rgb(self.c[0] * f, self.c[1] * f, self.c[2] * f)
    }
}

impl Mul<RGBSpectrum> for Float {
    type Output = RGBSpectrum;

    fn mul(self, s: RGBSpectrum) -> Self::Output {
        s * self
    }
}

impl MulAssign<Float> for RGBSpectrum {
    fn mul_assign(&mut self, f: Float) {
        for c in self.c.iter_mut() {
            *c *= f;
        }
    }
}

impl Div<Float> for RGBSpectrum {
    type Output = Self;

    fn div(self, f: Float) -> Self::Output {
        let inv = 1.0 / f;
        self * inv
    }
}

impl DivAssign<Float> for RGBSpectrum {
    fn div_assign(&mut self, f: Float) {
        let inv = 1.0 / f;
        *self *= inv;
    }
}

impl Index<usize> for RGBSpectrum {
    type Output = Float;

    fn index(&self, i: usize) -> &Self::Output {
        &self.c[i]
    }
}

impl From<Vector3f> for RGBSpectrum {
    fn from(v: Vector3f) -> Self {
        Self::rgb(v.x, v.y, v.z)
    }
}

impl From<[Float; 3]> for RGBSpectrum {
    fn from(c: [Float; 3]) -> Self {
        Self { c }
    }
}

impl std::fmt::Display for RGBSpectrum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.c[0], self.c[1], self.c[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    #[test]
    fn black_and_white() {
        assert!(Spectrum::zero().is_black());
        assert!(!Spectrum::one().is_black());
        assert!(approx_eq!(f32, Spectrum::one().y(), 1.0, epsilon = 1e-5));
    }

    #[test]
    fn safe_divide_ignores_zero_components() {
        let a = Spectrum::rgb(1.0, 2.0, 3.0);
        let b = Spectrum::rgb(2.0, 0.0, 3.0);
        assert_eq!(a.safe_divide(&b), Spectrum::rgb(0.5, 0.0, 1.0));
    }

    #[test]
    fn nan_detection() {
        assert!(Spectrum::rgb(0.0, Float::NAN, 0.0).has_nans());
        assert!(!Spectrum::rgb(0.0, Float::INFINITY, 0.0).is_finite());
    }
}
