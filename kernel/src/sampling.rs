//! Sampling

use crate::geometry::*;
use crate::math::*;

/// Uniformly sample a point on the unit disk with the concentric mapping.
///
/// * `u1` - First random number.
/// * `u2` - Second random number.
pub fn concentric_sample_disk(u1: Float, u2: Float) -> (Float, Float) {
    // Map uniform random numbers to [-1,1]^2.
    let ox = 2.0 * u1 - 1.0;
    let oy = 2.0 * u2 - 1.0;

    // Handle degeneracy at the origin.
    if ox == 0.0 && oy == 0.0 {
        return (0.0, 0.0);
    }

    // Apply concentric mapping to point.
    let (r, theta) = if ox.abs() > oy.abs() {
        (ox, PI_OVER_TWO * 0.5 * (oy / ox))
    } else {
        (oy, PI_OVER_TWO - PI_OVER_TWO * 0.5 * (ox / oy))
    };
    (r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted hemisphere sample around `n`. Returns the direction and
/// its solid angle PDF.
///
/// * `n`  - Hemisphere axis.
/// * `u1` - First random number.
/// * `u2` - Second random number.
pub fn sample_cos_hemisphere(n: &Normal3f, u1: Float, u2: Float) -> (Vector3f, Float) {
    let (x, y) = concentric_sample_disk(u1, u2);
    let z = safe_sqrt(1.0 - x * x - y * y);
    let (t, b) = n.make_orthonormals();
    let omega_in = t * x + b * y + *n * z;
    (omega_in, z * INV_PI)
}

/// Uniform hemisphere sample around `n`. Returns the direction and its
/// solid angle PDF.
///
/// * `n`  - Hemisphere axis.
/// * `u1` - First random number.
/// * `u2` - Second random number.
pub fn sample_uniform_hemisphere(n: &Normal3f, u1: Float, u2: Float) -> (Vector3f, Float) {
    let z = u1;
    let r = safe_sqrt(1.0 - z * z);
    let phi = TWO_PI * u2;
    let (t, b) = n.make_orthonormals();
    let omega_in = t * (r * phi.cos()) + b * (r * phi.sin()) + *n * z;
    (omega_in, 0.5 * INV_PI)
}

/// Uniformly sample barycentric coordinates of a triangle.
///
/// * `u1` - First random number.
/// * `u2` - Second random number.
pub fn uniform_sample_triangle(u1: Float, u2: Float) -> (Float, Float) {
    let su0 = u1.sqrt();
    (1.0 - su0, u2 * su0)
}

/// Map a direction to equirectangular `(u, v)` in [0, 1]^2 with +Z up.
///
/// * `d` - Unit direction.
pub fn direction_to_equirectangular(d: &Vector3f) -> Point2f {
    let u = -d.y.atan2(d.x) * INV_TWO_PI + 0.5;
    let v = safe_acos(d.z / d.length().max(1e-20)) * INV_PI;
    Point2f::new(u, v)
}

/// Map equirectangular `(u, v)` back to a unit direction.
///
/// * `u` - Horizontal coordinate.
/// * `v` - Vertical coordinate.
pub fn equirectangular_to_direction(u: Float, v: Float) -> Vector3f {
    let phi = PI * (1.0 - 2.0 * u);
    let theta = PI * v;
    Vector3f::new(
        theta.sin() * phi.cos(),
        theta.sin() * phi.sin(),
        theta.cos(),
    )
}
