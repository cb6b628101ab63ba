//! Shader evaluation kernel

use crate::geometry::*;
use crate::math::*;
use crate::path_state::PathRayFlags;
use crate::sampling::equirectangular_to_direction;
use crate::scene::KernelGlobals;
use crate::shader::ShaderData;

/// What a shader evaluation task computes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderEvalType {
    /// Background colour in an equirectangular direction.
    Background,

    /// Displacement offset of a surface point.
    Displace,
}

/// One shader evaluation request.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ShaderInput {
    /// Object index; unused for the background.
    pub object: usize,

    /// Primitive index; unused for the background.
    pub prim: usize,

    /// Barycentric u, or equirectangular u for the background.
    pub u: Float,

    /// Barycentric v, or equirectangular v for the background.
    pub v: Float,
}

/// Evaluate one input and add the result to its output. Background inputs
/// give a colour; displacement inputs give the offset of the displaced
/// point.
///
/// * `kg`        - Kernel globals.
/// * `eval_type` - Evaluation type.
/// * `input`     - Input record.
/// * `output`    - Output accumulator; overwritten at sample 0.
/// * `sample`    - Sample index.
#[inline]
pub fn shader_eval(
    kg: &KernelGlobals,
    eval_type: ShaderEvalType,
    input: &ShaderInput,
    output: &mut [Float; 4],
    sample: u32,
) {
    let data = &kg.data;
    let mut sd = ShaderData::default();

    let value = match eval_type {
        ShaderEvalType::Background => {
            let d = equirectangular_to_direction(input.u, input.v);
            let ray = Ray::new(Point3f::zero(), d, FLT_MAX, 0.5);
            sd.setup_from_background(data, &ray);
            let color = sd.eval_background(kg, None, PathRayFlags::empty());
            [color.r(), color.g(), color.b()]
        }
        ShaderEvalType::Displace => {
            sd.setup_from_displace(data, input.object, input.prim, input.u, input.v);
            let p = sd.p;
            sd.eval_displacement(kg, None);
            let offset = sd.p - p;
            [offset.x, offset.y, offset.z]
        }
    };

    if sample == 0 {
        *output = [0.0; 4];
    }
    for (out, v) in output.iter_mut().zip(value) {
        *out += v;
    }
}
