//! Shading point

use super::*;
use crate::closure::*;
use crate::geometry::*;
use crate::math::*;
use crate::scene::{ClosureCounts, KernelData};
use crate::spectrum::*;

/// Everything known about a point being shaded: local geometry, the
/// primitive and object it lies on, differentials for texture filtering and
/// the closures produced by its shader.
#[derive(Clone, Debug)]
pub struct ShaderData {
    /// World space position.
    pub p: Point3f,

    /// Shading normal.
    pub n: Normal3f,

    /// Geometric normal.
    pub ng: Normal3f,

    /// Direction towards the viewer.
    pub i: Vector3f,

    /// Shader index.
    pub shader: Option<usize>,

    /// Constant shader properties.
    pub shader_flag: ShaderFlags,

    /// Properties raised during setup and closure evaluation.
    pub runtime_flag: RuntimeFlags,

    /// Constant object properties.
    pub object_flag: ObjectFlags,

    /// Object index.
    pub object: Option<usize>,

    /// Primitive index in the scene's primitive table.
    pub prim: Option<usize>,

    /// Primitive type.
    pub prim_type: PrimitiveType,

    /// First barycentric or curve parameter.
    pub u: Float,

    /// Second barycentric or curve parameter.
    pub v: Float,

    /// Distance from the ray origin.
    pub ray_length: Float,

    /// Time in the shutter interval.
    pub time: Float,

    /// Position differential.
    pub dp: Differential3,

    /// Incoming direction differential.
    pub di: Differential3,

    /// Parametric derivative along u.
    pub du: Differential,

    /// Parametric derivative along v.
    pub dv: Differential,

    /// Position derivative along u.
    pub dpdu: Vector3f,

    /// Position derivative along v.
    pub dpdv: Vector3f,

    /// Normal derivative along screen x.
    pub dndx: Vector3f,

    /// Normal derivative along screen y.
    pub dndy: Vector3f,

    /// Object to world transform at `time`.
    pub ob_tfm: Transform,

    /// World to object transform at `time`.
    pub ob_itfm: Transform,

    /// Alpha used by ambient occlusion rays.
    pub ao_alpha: Float,

    /// Alpha used by shadow rays.
    pub shadow_alpha: Float,

    /// Sample count hints of the shader.
    pub samples: ClosureCounts,

    /// Bounce limits of the shader.
    pub bounces: ClosureCounts,

    /// Random number used to pick a closure.
    pub randb_closure: Float,

    /// LCG state for shaders that need extra random numbers.
    pub lcg_state: u32,

    /// Origin of the ray for volume shading points.
    pub ray_p: Point3f,

    /// Origin differential of the ray for volume shading points.
    pub ray_dp: Differential3,

    /// Closures.
    pub closures: ClosureArray,
}

impl Default for ShaderData {
    fn default() -> Self {
        Self {
            p: Point3f::zero(),
            n: Normal3f::zero(),
            ng: Normal3f::zero(),
            i: Vector3f::zero(),
            shader: None,
            shader_flag: ShaderFlags::empty(),
            runtime_flag: RuntimeFlags::empty(),
            object_flag: ObjectFlags::empty(),
            object: None,
            prim: None,
            prim_type: PrimitiveType::None,
            u: 0.0,
            v: 0.0,
            ray_length: 0.0,
            time: 0.5,
            dp: Differential3::zero(),
            di: Differential3::zero(),
            du: Differential::zero(),
            dv: Differential::zero(),
            dpdu: Vector3f::zero(),
            dpdv: Vector3f::zero(),
            dndx: Vector3f::zero(),
            dndy: Vector3f::zero(),
            ob_tfm: IDENTITY_TRANSFORM,
            ob_itfm: IDENTITY_TRANSFORM,
            ao_alpha: 1.0,
            shadow_alpha: 1.0,
            samples: ClosureCounts::uniform(1),
            bounces: ClosureCounts::uniform(0),
            randb_closure: 0.0,
            lcg_state: 0,
            ray_p: Point3f::zero(),
            ray_dp: Differential3::zero(),
            closures: ClosureArray::new(),
        }
    }
}

impl ShaderData {
    /// Returns true if the ray hit the back of the surface.
    pub fn is_backfacing(&self) -> bool {
        self.runtime_flag.contains(RuntimeFlags::BACKFACING)
    }

    /// Load the constant parameters of a shader. Unknown shaders leave the
    /// flags empty.
    ///
    /// * `data`   - Scene data.
    /// * `shader` - Shader index.
    pub fn load_shader_params(&mut self, data: &KernelData, shader: Option<usize>) {
        self.shader = shader;
        match shader.and_then(|s| data.shader(s)) {
            Some(ks) => {
                self.shader_flag = ks.flags;
                self.ao_alpha = ks.ao_alpha;
                self.shadow_alpha = ks.shadow_alpha;
                self.samples = ks.samples;
                self.bounces = ks.bounces;
            }
            None => {
                self.shader_flag = ShaderFlags::empty();
                self.ao_alpha = 1.0;
                self.shadow_alpha = 1.0;
                self.samples = ClosureCounts::uniform(1);
                self.bounces = ClosureCounts::uniform(0);
            }
        }
    }

    /// Fetch the object transforms, interpolated at `time` for moving
    /// objects.
    ///
    /// * `data` - Scene data.
    /// * `time` - Time in the shutter interval.
    pub fn setup_object_transforms(&mut self, data: &KernelData, time: Float) {
        let (tfm, itfm) = match self.object.and_then(|o| data.objects.get(o)) {
            Some(object) => object.transforms_at(time),
            None => (IDENTITY_TRANSFORM, IDENTITY_TRANSFORM),
        };
        self.ob_tfm = tfm;
        self.ob_itfm = itfm;
    }

    /// Returns true if geometry of the current object is stored in object
    /// space and needs the object transform.
    pub fn needs_object_transform(&self) -> bool {
        self.object.is_some() && !self.object_flag.contains(ObjectFlags::TRANSFORM_APPLIED)
    }

    /// Transform a normal from object to world space.
    ///
    /// * `n` - Normal in object space.
    pub fn object_normal_to_world(&self, n: &Normal3f) -> Normal3f {
        self.ob_itfm.transform_direction_transposed(n).safe_normalize()
    }

    /// Transform a direction from object to world space.
    ///
    /// * `d` - Direction in object space.
    pub fn object_dir_to_world(&self, d: &Vector3f) -> Vector3f {
        self.ob_tfm.transform_direction(d)
    }

    /// Add a closure, raising the runtime flags for its category. Returns
    /// true if the closure was kept.
    ///
    /// * `model`  - Scattering model.
    /// * `weight` - Weight.
    pub fn add_closure(&mut self, model: Closure, weight: Spectrum) -> bool {
        let sc = ShaderClosure::new(model, weight);
        if self.closures.push(sc) {
            self.runtime_flag |= RuntimeFlags::from_closure(&model);
            true
        } else {
            false
        }
    }

    /// Flip the normals and surface derivatives together so they face the
    /// viewer.
    pub(super) fn flip_backfacing(&mut self) {
        self.runtime_flag |= RuntimeFlags::BACKFACING;
        self.ng = -self.ng;
        self.n = -self.n;
        self.dpdu = -self.dpdu;
        self.dpdv = -self.dpdv;
        self.dndx = -self.dndx;
        self.dndy = -self.dndy;
    }
}
