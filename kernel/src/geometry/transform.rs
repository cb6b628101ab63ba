//! Affine transforms and motion interpolation

#![allow(dead_code)]
use super::*;
use crate::math::*;
use std::ops::{Add, Mul, Sub};

/// A 3x4 affine transform stored in row-major order. Points transform as
/// `M * [p, 1]` and directions as `M * [d, 0]`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Transform {
    /// Rows of the matrix.
    pub m: [[Float; 4]; 3],
}

/// The identity transform.
pub const IDENTITY_TRANSFORM: Transform = Transform {
    m: [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    ],
};

impl Default for Transform {
    fn default() -> Self {
        IDENTITY_TRANSFORM
    }
}

impl Transform {
    /// Create a transform from its rows.
    ///
    /// * `m` - Matrix rows.
    pub fn new(m: [[Float; 4]; 3]) -> Self {
        Self { m }
    }

    /// Returns a translation.
    ///
    /// * `delta` - Translation.
    pub fn translate(delta: &Vector3f) -> Self {
        Self::new([
            [1.0, 0.0, 0.0, delta.x],
            [0.0, 1.0, 0.0, delta.y],
            [0.0, 0.0, 1.0, delta.z],
        ])
    }

    /// Returns a non-uniform scale.
    ///
    /// * `s` - Scale along each axis.
    pub fn scale(s: &Vector3f) -> Self {
        Self::new([
            [s.x, 0.0, 0.0, 0.0],
            [0.0, s.y, 0.0, 0.0],
            [0.0, 0.0, s.z, 0.0],
        ])
    }

    /// Returns a rotation about an axis.
    ///
    /// * `theta` - Angle in radians.
    /// * `axis`  - Rotation axis.
    pub fn rotate(theta: Float, axis: &Vector3f) -> Self {
        Quaternion::from_axis_angle(axis, theta).to_transform()
    }

    /// Compose `self * other` so that `other` is applied first.
    ///
    /// * `other` - The transform applied first.
    pub fn compose(&self, other: &Self) -> Self {
        let a = &self.m;
        let b = &other.m;
        let mut m = [[0.0; 4]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
            }
            row[3] += a[i][3];
        }
        Self { m }
    }

    /// Returns the determinant of the linear part.
    pub fn determinant(&self) -> Float {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// Returns true if the transform flips handedness.
    pub fn negative_scale(&self) -> bool {
        self.determinant() < 0.0
    }

    /// Returns the inverse transform. A singular matrix yields the identity.
    pub fn inverse(&self) -> Self {
        let det = self.determinant();
        if det == 0.0 {
            return IDENTITY_TRANSFORM;
        }
        let m = &self.m;
        let inv_det = 1.0 / det;

        let mut r = [[0.0; 4]; 3];
        r[0][0] = (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det;
        r[0][1] = (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det;
        r[0][2] = (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det;
        r[1][0] = (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det;
        r[1][1] = (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det;
        r[1][2] = (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det;
        r[2][0] = (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det;
        r[2][1] = (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det;
        r[2][2] = (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det;

        let t = Vector3f::new(m[0][3], m[1][3], m[2][3]);
        for row in r.iter_mut() {
            row[3] = -(row[0] * t.x + row[1] * t.y + row[2] * t.z);
        }
        Self { m: r }
    }

    /// Transform a point.
    ///
    /// * `p` - The point.
    pub fn transform_point(&self, p: &Point3f) -> Point3f {
        let m = &self.m;
        Point3f::new(
            m[0][0] * p.x + m[0][1] * p.y + m[0][2] * p.z + m[0][3],
            m[1][0] * p.x + m[1][1] * p.y + m[1][2] * p.z + m[1][3],
            m[2][0] * p.x + m[2][1] * p.y + m[2][2] * p.z + m[2][3],
        )
    }

    /// Transform a direction.
    ///
    /// * `d` - The direction.
    pub fn transform_direction(&self, d: &Vector3f) -> Vector3f {
        let m = &self.m;
        Vector3f::new(
            m[0][0] * d.x + m[0][1] * d.y + m[0][2] * d.z,
            m[1][0] * d.x + m[1][1] * d.y + m[1][2] * d.z,
            m[2][0] * d.x + m[2][1] * d.y + m[2][2] * d.z,
        )
    }

    /// Transform a direction by the transpose of the linear part. Called on
    /// an inverse transform this maps normals.
    ///
    /// * `d` - The direction.
    pub fn transform_direction_transposed(&self, d: &Vector3f) -> Vector3f {
        let m = &self.m;
        Vector3f::new(
            m[0][0] * d.x + m[1][0] * d.y + m[2][0] * d.z,
            m[0][1] * d.x + m[1][1] * d.y + m[2][1] * d.z,
            m[0][2] * d.x + m[1][2] * d.y + m[2][2] * d.z,
        )
    }

    /// Decompose into translation, rotation and scale. Shear is not
    /// represented.
    pub fn decompose(&self) -> DecomposedTransform {
        let m = &self.m;
        let translation = Vector3f::new(m[0][3], m[1][3], m[2][3]);

        let col = |j: usize| Vector3f::new(m[0][j], m[1][j], m[2][j]);
        let mut scale = Vector3f::new(col(0).length(), col(1).length(), col(2).length());
        if self.negative_scale() {
            scale.x = -scale.x;
        }

        let mut r = IDENTITY_TRANSFORM;
        for j in 0..3 {
            let s = if scale[j] != 0.0 { 1.0 / scale[j] } else { 0.0 };
            for i in 0..3 {
                r.m[i][j] = m[i][j] * s;
            }
        }

        DecomposedTransform {
            translation,
            rotation: Quaternion::from_transform(&r),
            scale,
        }
    }
}

/// Translation, rotation and scale components of a transform.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DecomposedTransform {
    /// Translation.
    pub translation: Vector3f,

    /// Rotation.
    pub rotation: Quaternion,

    /// Scale along each axis.
    pub scale: Vector3f,
}

impl DecomposedTransform {
    /// Recompose into an affine transform.
    pub fn compose(&self) -> Transform {
        let r = self.rotation.to_transform();
        let s = Transform::scale(&self.scale);
        Transform::translate(&self.translation).compose(&r.compose(&s))
    }

    /// Interpolate between two decomposed transforms.
    ///
    /// * `t`     - Interpolation parameter in [0, 1].
    /// * `other` - Transform at `t = 1`.
    pub fn interpolate(&self, t: Float, other: &Self) -> Self {
        Self {
            translation: lerp(t, self.translation, other.translation),
            rotation: self.rotation.slerp(t, &other.rotation),
            scale: lerp(t, self.scale, other.scale),
        }
    }
}

/// Object-to-world transform sampled at evenly spaced times across the
/// shutter interval.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionTransform {
    /// Decomposed steps; step `i` is at time `i / (len - 1)`.
    pub steps: Vec<DecomposedTransform>,
}

impl MotionTransform {
    /// Create a motion transform from matrices at evenly spaced times.
    ///
    /// * `steps` - At least one transform.
    pub fn new(steps: &[Transform]) -> Self {
        Self {
            steps: steps.iter().map(Transform::decompose).collect(),
        }
    }

    /// Returns the transform at a given time.
    ///
    /// * `time` - Time in [0, 1].
    pub fn at(&self, time: Float) -> Transform {
        match self.steps.len() {
            0 => IDENTITY_TRANSFORM,
            1 => self.steps[0].compose(),
            n => {
                let t = clamp(time, 0.0, 1.0) * (n - 1) as Float;
                let step = min(t as usize, n - 2);
                let frac = t - step as Float;
                self.steps[step]
                    .interpolate(frac, &self.steps[step + 1])
                    .compose()
            }
        }
    }
}

/// Rotation quaternion.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Quaternion {
    /// Imaginary part.
    pub v: Vector3f,

    /// Real part.
    pub w: Float,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            v: Vector3f::zero(),
            w: 1.0,
        }
    }
}

impl Quaternion {
    /// Create a new quaternion.
    ///
    /// * `v` - Imaginary part.
    /// * `w` - Real part.
    pub fn new(v: Vector3f, w: Float) -> Self {
        Self { v, w }
    }

    /// Returns the rotation of `theta` radians about `axis`.
    ///
    /// * `axis`  - Rotation axis.
    /// * `theta` - Angle in radians.
    pub fn from_axis_angle(axis: &Vector3f, theta: Float) -> Self {
        let half = theta * 0.5;
        Self::new(axis.normalize() * half.sin(), half.cos())
    }

    /// Extract the rotation from an orthonormal transform.
    ///
    /// * `t` - The transform.
    pub fn from_transform(t: &Transform) -> Self {
        let m = &t.m;
        let trace = m[0][0] + m[1][1] + m[2][2];
        if trace > 0.0 {
            let s = (trace + 1.0).sqrt();
            let w = s / 2.0;
            let s = 0.5 / s;
            let v = Vector3f::new(
                (m[2][1] - m[1][2]) * s,
                (m[0][2] - m[2][0]) * s,
                (m[1][0] - m[0][1]) * s,
            );
            Self::new(v, w)
        } else {
            // Largest diagonal component first.
            let nxt = [1, 2, 0];
            let mut q = [0.0; 3];
            let mut i = 0;
            if m[1][1] > m[0][0] {
                i = 1;
            }
            if m[2][2] > m[i][i] {
                i = 2;
            }
            let j = nxt[i];
            let k = nxt[j];

            let mut s = ((m[i][i] - (m[j][j] + m[k][k])) + 1.0).sqrt();
            q[i] = s * 0.5;
            if s != 0.0 {
                s = 0.5 / s;
            }
            let w = (m[k][j] - m[j][k]) * s;
            q[j] = (m[j][i] + m[i][j]) * s;
            q[k] = (m[k][i] + m[i][k]) * s;
            Self::new(Vector3f::new(q[0], q[1], q[2]), w)
        }
    }

    /// Returns the rotation matrix.
    pub fn to_transform(&self) -> Transform {
        let (x, y, z, w) = (self.v.x, self.v.y, self.v.z, self.w);
        let (xx, yy, zz) = (x * x, y * y, z * z);
        let (xy, xz, yz) = (x * y, x * z, y * z);
        let (wx, wy, wz) = (w * x, w * y, w * z);
        Transform::new([
            [1.0 - 2.0 * (yy + zz), 2.0 * (xy - wz), 2.0 * (xz + wy), 0.0],
            [2.0 * (xy + wz), 1.0 - 2.0 * (xx + zz), 2.0 * (yz - wx), 0.0],
            [2.0 * (xz - wy), 2.0 * (yz + wx), 1.0 - 2.0 * (xx + yy), 0.0],
        ])
    }

    /// Returns the dot product.
    ///
    /// * `q` - Other quaternion.
    pub fn dot(&self, q: &Self) -> Float {
        self.v.dot(&q.v) + self.w * q.w
    }

    /// Returns the unit quaternion.
    pub fn normalize(&self) -> Self {
        let len = self.dot(self).sqrt();
        if len > 0.0 {
            *self * (1.0 / len)
        } else {
            Self::default()
        }
    }

    /// Spherical linear interpolation along the shortest arc.
    ///
    /// * `t` - Interpolation parameter.
    /// * `q` - Quaternion at `t = 1`.
    pub fn slerp(&self, t: Float, q: &Self) -> Self {
        let mut q = *q;
        let mut cos_theta = self.dot(&q);
        if cos_theta < 0.0 {
            q = q * -1.0;
            cos_theta = -cos_theta;
        }

        if cos_theta > 0.9995 {
            (*self * (1.0 - t) + q * t).normalize()
        } else {
            let theta = safe_acos(cos_theta);
            let thetap = theta * t;
            let qperp = (q - *self * cos_theta).normalize();
            *self * thetap.cos() + qperp * thetap.sin()
        }
    }
}

impl Add for Quaternion {
    type Output = Self;

    fn add(self, q: Self) -> Self::Output {
        Self::new(self.v + q.v, self.w + q.w)
    }
}

impl Sub for Quaternion {
    type Output = Self;

    fn sub(self, q: Self) -> Self::Output {
        Self::new(self.v - q.v, self.w - q.w)
    }
}

impl Mul<Float> for Quaternion {
    type Output = Self;

    fn mul(self, f: Float) -> Self::Output {
        Self::new(self.v * f, self.w * f)
    }
}
