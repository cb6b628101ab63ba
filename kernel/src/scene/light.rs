//! Emissive triangle lights

use crate::math::*;

/// An emissive triangle.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightTriangle {
    /// Primitive index in the scene's primitive table.
    pub prim: usize,

    /// World space area.
    pub area: Float,
}

/// Area weighted distribution over emissive triangles.
#[derive(Clone, Debug, Default)]
pub struct LightDistribution {
    /// Emissive triangles.
    pub triangles: Vec<LightTriangle>,

    /// Normalized cumulative area; `cdf[i]` is the end of triangle `i`.
    pub cdf: Vec<Float>,

    /// Total emissive area.
    pub total_area: Float,
}

impl LightDistribution {
    /// Build a distribution. Triangles with zero area are skipped.
    ///
    /// * `triangles` - Emissive triangles.
    pub fn new(triangles: Vec<LightTriangle>) -> Self {
        let triangles: Vec<LightTriangle> = triangles.into_iter().filter(|t| t.area > 0.0).collect();
        let total_area: Float = triangles.iter().map(|t| t.area).sum();
        let mut acc = 0.0;
        let cdf = triangles
            .iter()
            .map(|t| {
                acc += t.area;
                acc / total_area
            })
            .collect();
        Self {
            triangles,
            cdf,
            total_area,
        }
    }

    /// Returns true if there is nothing to sample.
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Pick a triangle proportionally to its area. Returns the triangle and
    /// `u` remapped to [0, 1) within the picked interval.
    ///
    /// * `u` - Random number.
    pub fn sample(&self, u: Float) -> Option<(&LightTriangle, Float)> {
        if self.is_empty() {
            return None;
        }
        let index = self
            .cdf
            .partition_point(|&c| c <= u)
            .min(self.triangles.len() - 1);
        let start = if index == 0 { 0.0 } else { self.cdf[index - 1] };
        let width = self.cdf[index] - start;
        let remapped = if width > 0.0 {
            clamp((u - start) / width, 0.0, ONE_MINUS_EPSILON)
        } else {
            0.0
        };
        Some((&self.triangles[index], remapped))
    }

    /// Area density of sampling any point on an emissive triangle.
    pub fn pdf_area(&self) -> Float {
        if self.total_area > 0.0 {
            1.0 / self.total_area
        } else {
            0.0
        }
    }

    /// Returns true if `prim` is an emissive triangle.
    ///
    /// * `prim` - Primitive index.
    pub fn contains(&self, prim: usize) -> bool {
        self.triangles.iter().any(|t| t.prim == prim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_by_area() {
        let d = LightDistribution::new(vec![
            LightTriangle { prim: 4, area: 1.0 },
            LightTriangle { prim: 7, area: 0.0 },
            LightTriangle { prim: 9, area: 3.0 },
        ]);
        assert_eq!(d.triangles.len(), 2);
        assert_eq!(d.sample(0.1).map(|(t, _)| t.prim), Some(4));
        assert_eq!(d.sample(0.3).map(|(t, _)| t.prim), Some(9));
        assert_eq!(d.sample(0.999).map(|(t, _)| t.prim), Some(9));
        let remapped = d.sample(0.625).map(|(_, u)| u).unwrap_or(-1.0);
        assert!((remapped - 0.5).abs() < 1e-5);
        assert!((d.pdf_area() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn empty_distribution() {
        let d = LightDistribution::new(Vec::new());
        assert!(d.sample(0.5).is_none());
        assert_eq!(d.pdf_area(), 0.0);
    }
}
