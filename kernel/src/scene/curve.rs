//! Curves

use crate::geometry::*;
use crate::math::*;

/// Linear curve segments rendered as ribbons facing the ray.
#[derive(Clone, Debug, Default)]
pub struct CurveSet {
    /// Control points.
    pub points: Vec<Point3f>,

    /// Radius at each control point.
    pub radius: Vec<Float>,

    /// Control point indices of each segment.
    pub segments: Vec<[usize; 2]>,

    /// Shader of each segment.
    pub shaders: Vec<usize>,
}

/// Hit on a curve segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CurveHit {
    /// Distance along the ray.
    pub t: Float,

    /// Parameter along the segment in [0, 1].
    pub u: Float,

    /// Signed offset across the ribbon in [-1, 1].
    pub v: Float,
}

impl CurveSet {
    /// Number of segments.
    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    /// Unit tangent of a segment.
    ///
    /// * `seg` - Segment index.
    pub fn tangent(&self, seg: usize) -> Vector3f {
        let [a, b] = self.segments[seg];
        (self.points[b] - self.points[a]).safe_normalize()
    }

    /// Intersect a ray with a segment's ribbon.
    ///
    /// * `seg`   - Segment index.
    /// * `p`     - Ray origin.
    /// * `d`     - Ray direction.
    /// * `t_max` - Maximum hit distance.
    pub fn intersect(&self, seg: usize, p: &Point3f, d: &Vector3f, t_max: Float) -> Option<CurveHit> {
        let [ia, ib] = self.segments[seg];
        let (p0, p1) = (self.points[ia], self.points[ib]);
        let axis = p1 - p0;
        let len2 = axis.length_squared();
        if len2 == 0.0 {
            return None;
        }

        // Closest approach between the ray and the segment's line.
        let w = *p - p0;
        let a = d.dot(d);
        let b = d.dot(&axis);
        let c = len2;
        let dd = d.dot(&w);
        let e = axis.dot(&w);
        let denom = a * c - b * b;
        if denom.abs() < 1e-12 {
            return None;
        }
        let t = (b * e - c * dd) / denom;
        let u = (a * e - b * dd) / denom;
        if t <= 0.0 || t >= t_max || !(0.0..=1.0).contains(&u) {
            return None;
        }

        let radius = lerp(u, self.radius[ia], self.radius[ib]);
        let on_ray = *p + *d * t;
        let on_curve = p0 + axis * u;
        let offset = on_ray - on_curve;
        let dist = offset.length();
        if dist > radius {
            return None;
        }

        let side = axis.cross(d).safe_normalize();
        let v = if radius > 0.0 {
            offset.dot(&side) / radius
        } else {
            0.0
        };
        Some(CurveHit { t, u, v })
    }

    /// Shading frame at a hit. Returns the position, a normal facing the
    /// ray and the position derivatives along and across the curve.
    ///
    /// * `seg` - Segment index.
    /// * `u`   - Parameter along the segment.
    /// * `d`   - Ray direction.
    pub fn shading_frame(
        &self,
        seg: usize,
        u: Float,
        d: &Vector3f,
    ) -> (Point3f, Normal3f, Vector3f, Vector3f) {
        let [ia, ib] = self.segments[seg];
        let (p0, p1) = (self.points[ia], self.points[ib]);
        let tg = self.tangent(seg);
        let ng = -(*d - tg * tg.dot(d)).safe_normalize();
        let p = lerp(u, p0, p1);
        let dpdu = p1 - p0;
        let dpdv = tg.cross(&ng);
        (p, ng, dpdu, dpdv)
    }
}
