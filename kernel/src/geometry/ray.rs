//! Rays and ray differentials

#![allow(dead_code)]
use super::*;
use crate::math::*;

/// Screen-space derivative of a scalar quantity.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Differential {
    /// Derivative along raster x.
    pub dx: Float,

    /// Derivative along raster y.
    pub dy: Float,
}

/// Screen-space derivative of a vector quantity.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Differential3 {
    /// Derivative along raster x.
    pub dx: Vector3f,

    /// Derivative along raster y.
    pub dy: Vector3f,
}

impl Differential {
    /// Returns a zero differential.
    pub fn zero() -> Self {
        Self::default()
    }
}

impl Differential3 {
    /// Returns a zero differential.
    pub fn zero() -> Self {
        Self::default()
    }

    /// Returns a differential with derivatives scaled by `s`.
    ///
    /// * `s` - Scale factor.
    pub fn scale(&self, s: Float) -> Self {
        Self {
            dx: self.dx * s,
            dy: self.dy * s,
        }
    }
}

/// A semi-infinite line with a parametric interval and optional differentials.
#[derive(Copy, Clone, Debug, Default)]
pub struct Ray {
    /// Origin.
    pub p: Point3f,

    /// Direction.
    pub d: Vector3f,

    /// Start of the parametric interval.
    pub t_min: Float,

    /// End of the parametric interval.
    pub t_max: Float,

    /// Time of the ray, within the shutter interval [0, 1].
    pub time: Float,

    /// Differential of the origin.
    pub dp: Differential3,

    /// Differential of the direction.
    pub dd: Differential3,
}

impl Ray {
    /// Create a new ray without differentials.
    ///
    /// * `p`     - Origin.
    /// * `d`     - Direction.
    /// * `t_max` - Maximum extent of the ray.
    /// * `time`  - Time.
    pub fn new(p: Point3f, d: Vector3f, t_max: Float, time: Float) -> Self {
        Self {
            p,
            d,
            t_min: 0.0,
            t_max,
            time,
            dp: Differential3::zero(),
            dd: Differential3::zero(),
        }
    }

    /// Returns the position along the ray at a given parameter.
    ///
    /// * `t` - The parameter.
    pub fn at(&self, t: Float) -> Point3f {
        self.p + self.d * t
    }

    /// Returns true if any component is NaN.
    pub fn has_nans(&self) -> bool {
        self.p.has_nans() || self.d.has_nans() || self.t_max.is_nan()
    }
}

impl std::fmt::Display for Ray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[o={}, d={}, t=[{}, {}], time={}]",
            self.p, self.d, self.t_min, self.t_max, self.time
        )
    }
}

/// Offset a surface position along the geometric normal so that a new ray
/// does not re-intersect the surface it starts on.
///
/// * `p`  - Surface position.
/// * `ng` - Geometric normal on the side the new ray leaves from.
pub fn ray_offset(p: Point3f, ng: Normal3f) -> Point3f {
    const EPSILON_F: Float = 1e-5;
    const EPSILON_TEST: Float = 1.0;
    const EPSILON_I: i32 = 32;

    let offset = |p: Float, n: Float| -> Float {
        if p.abs() < EPSILON_TEST {
            p + n * EPSILON_F
        } else {
            let ip = float_as_int(p);
            let away = (ip ^ float_as_int(n)) < 0;
            int_as_float(if away { ip - EPSILON_I } else { ip + EPSILON_I })
        }
    };

    Point3f::new(offset(p.x, ng.x), offset(p.y, ng.y), offset(p.z, ng.z))
}

/// Transfer a position differential to a surface hit at distance `t`.
///
/// * `dp` - Origin differential.
/// * `d`  - Ray direction.
/// * `dd` - Direction differential.
/// * `ng` - Geometric normal at the hit.
/// * `t`  - Hit distance.
pub fn differential_transfer(
    dp: &Differential3,
    d: &Vector3f,
    dd: &Differential3,
    ng: &Normal3f,
    t: Float,
) -> Differential3 {
    let dn = d.dot(ng);
    if dn == 0.0 {
        return Differential3::zero();
    }
    let tmp = *d / dn;
    let tmpx = dp.dx + dd.dx * t;
    let tmpy = dp.dy + dd.dy * t;
    Differential3 {
        dx: tmpx - tmp * tmpx.dot(ng),
        dy: tmpy - tmp * tmpy.dot(ng),
    }
}

/// Incoming direction differential from a ray direction differential.
///
/// * `dd` - Direction differential.
pub fn differential_incoming(dd: &Differential3) -> Differential3 {
    Differential3 {
        dx: -dd.dx,
        dy: -dd.dy,
    }
}

/// Solve for parametric `(du, dv)` from a position differential using the
/// projection that is best conditioned for the geometric normal.
///
/// * `dpdu` - Position derivative along u.
/// * `dpdv` - Position derivative along v.
/// * `dp`   - Position differential.
/// * `ng`   - Geometric normal.
pub fn differential_dudv(
    dpdu: &Vector3f,
    dpdv: &Vector3f,
    dp: &Differential3,
    ng: &Normal3f,
) -> (Differential, Differential) {
    let n = ng.abs();

    // Pick the two axes orthogonal to the dominant normal component.
    let (a, b) = if n.z < n.x || n.z < n.y {
        if n.y < n.x || n.y < n.z {
            (1, 2)
        } else {
            (2, 0)
        }
    } else {
        (0, 1)
    };

    let det = dpdu[a] * dpdv[b] - dpdv[a] * dpdu[b];
    let det = if det != 0.0 { 1.0 / det } else { 0.0 };

    let du = Differential {
        dx: (dp.dx[a] * dpdv[b] - dp.dx[b] * dpdv[a]) * det,
        dy: (dp.dy[a] * dpdv[b] - dp.dy[b] * dpdv[a]) * det,
    };
    let dv = Differential {
        dx: (dp.dx[b] * dpdu[a] - dp.dx[a] * dpdu[b]) * det,
        dy: (dp.dy[b] * dpdu[a] - dp.dy[a] * dpdu[b]) * det,
    };
    (du, dv)
}
