//! Ray hits

use crate::math::*;

/// Kind of primitive that was hit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    /// No primitive; background or a synthesized shading point.
    #[default]
    None,

    /// Static triangle.
    Triangle,

    /// Triangle whose vertices are interpolated over the shutter interval.
    MotionTriangle,

    /// Curve segment rendered as a camera-facing ribbon.
    Curve,

    /// Light source geometry.
    Lamp,
}

/// Result of a ray/scene intersection.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Intersection {
    /// Hit distance along the ray.
    pub t: Float,

    /// First barycentric or curve parameter.
    pub u: Float,

    /// Second barycentric or curve parameter.
    pub v: Float,

    /// Primitive index within the scene.
    pub prim: Option<usize>,

    /// Object index; `None` for geometry that is not instanced.
    pub object: Option<usize>,

    /// Primitive type.
    pub prim_type: PrimitiveType,
}
