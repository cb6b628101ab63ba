//! Kernel globals

use super::*;
use crate::film::{FilmSettings, PassLayout};
use crate::geometry::*;
use crate::math::*;
use crate::path_state::PathRayFlags;
use crate::shader::{ShaderEvaluator, ShaderFlags};
use crate::texture::{ImageTexture, TextureLookup};
use crate::volume::VolumeStack;
use std::sync::Arc;

/// Geometry shared by one or more objects.
#[derive(Clone, Debug)]
pub enum Geometry {
    /// Triangle mesh.
    Mesh(TriangleMesh),

    /// Curve segments.
    Curves(CurveSet),
}

impl Geometry {
    /// Number of primitives.
    pub fn num_prims(&self) -> usize {
        match self {
            Self::Mesh(mesh) => mesh.num_triangles(),
            Self::Curves(curves) => curves.num_segments(),
        }
    }

    /// Shader of a primitive.
    ///
    /// * `local` - Primitive index within the geometry.
    pub fn prim_shader(&self, local: usize) -> usize {
        match self {
            Self::Mesh(mesh) => mesh.shaders[local],
            Self::Curves(curves) => curves.shaders[local],
        }
    }

    /// Returns the mesh if this is one.
    pub fn as_mesh(&self) -> Option<&TriangleMesh> {
        match self {
            Self::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }

    /// Returns the curves if this is a curve set.
    pub fn as_curves(&self) -> Option<&CurveSet> {
        match self {
            Self::Curves(curves) => Some(curves),
            _ => None,
        }
    }
}

/// Entry of the scene wide primitive table.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PrimRef {
    /// Object that owns the primitive.
    pub object: usize,

    /// Primitive index within the object's geometry.
    pub local: usize,

    /// Primitive type.
    pub prim_type: PrimitiveType,
}

/// Immutable scene data read by the kernel.
#[derive(Clone, Debug, Default)]
pub struct KernelData {
    /// Integrator settings.
    pub integrator: IntegratorSettings,

    /// Film settings.
    pub film: FilmSettings,

    /// Render buffer layout derived from `film`.
    pub layout: PassLayout,

    /// Camera.
    pub camera: CameraSettings,

    /// Background.
    pub background: BackgroundSettings,

    /// Objects.
    pub objects: Vec<ObjectData>,

    /// Geometry referenced by objects.
    pub geometry: Vec<Geometry>,

    /// Shader table.
    pub shaders: Vec<KernelShader>,

    /// Primitive table.
    pub prims: Vec<PrimRef>,

    /// Emissive triangles.
    pub lights: LightDistribution,

    /// Volumes enclosing the camera.
    pub camera_volume_stack: VolumeStack,
}

impl KernelData {
    /// Shader entry, clamped to the shader table.
    ///
    /// * `shader` - Shader index.
    pub fn shader(&self, shader: usize) -> Option<&KernelShader> {
        self.shaders.get(shader)
    }

    /// Geometry of an object.
    ///
    /// * `object` - Object index.
    pub fn object_geometry(&self, object: usize) -> Option<&Geometry> {
        self.objects.get(object).and_then(|o| self.geometry.get(o.geometry))
    }

    /// Mesh and triangle index of a triangle primitive.
    ///
    /// * `prim` - Primitive index.
    pub fn prim_triangle(&self, prim: usize) -> Option<(&TriangleMesh, usize)> {
        let pref = self.prims.get(prim)?;
        let mesh = self.object_geometry(pref.object)?.as_mesh()?;
        Some((mesh, pref.local))
    }

    /// Curve set and segment index of a curve primitive.
    ///
    /// * `prim` - Primitive index.
    pub fn prim_curve(&self, prim: usize) -> Option<(&CurveSet, usize)> {
        let pref = self.prims.get(prim)?;
        let curves = self.object_geometry(pref.object)?.as_curves()?;
        Some((curves, pref.local))
    }

    /// Shader of a primitive.
    ///
    /// * `prim` - Primitive index.
    pub fn prim_shader(&self, prim: usize) -> Option<usize> {
        let pref = self.prims.get(prim)?;
        Some(self.object_geometry(pref.object)?.prim_shader(pref.local))
    }

    /// Returns true if shadow rays pass through the primitive's surface.
    ///
    /// * `prim` - Primitive index.
    pub fn transparent_shadow(&self, prim: usize) -> bool {
        self.prim_shader(prim)
            .and_then(|s| self.shader(s))
            .map_or(false, |s| {
                s.flags
                    .intersects(ShaderFlags::HAS_TRANSPARENT_SHADOW | ShaderFlags::USE_UNIFORM_ALPHA)
            })
    }

    /// Cryptomatte identifier of a shader.
    ///
    /// * `shader` - Shader index.
    pub fn cryptomatte_name(&self, shader: usize) -> Float {
        self.shader(shader).map_or(0.0, |s| s.cryptomatte_id)
    }
}

/// Everything a kernel invocation reads: scene data, the intersector, bound
/// textures and the shader evaluator.
#[derive(Clone)]
pub struct KernelGlobals {
    /// Scene data.
    pub data: Arc<KernelData>,

    /// Ray/scene intersection.
    pub intersector: Arc<dyn Intersector>,

    /// Textures by slot.
    pub textures: Vec<Option<Arc<ImageTexture>>>,

    /// Shader graph evaluator; `None` falls back to a grey diffuse surface.
    pub evaluator: Option<Arc<dyn ShaderEvaluator>>,
}

impl KernelGlobals {
    /// Create globals with the brute force intersector and no textures.
    ///
    /// * `data` - Scene data.
    pub fn new(data: Arc<KernelData>) -> Self {
        Self {
            intersector: Arc::new(SceneIntersector::new(data.clone())),
            data,
            textures: Vec::new(),
            evaluator: None,
        }
    }

    /// Set the shader evaluator.
    ///
    /// * `evaluator` - Evaluator.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn ShaderEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Set the bound textures.
    ///
    /// * `textures` - Textures by slot.
    pub fn with_textures(mut self, textures: Vec<Option<Arc<ImageTexture>>>) -> Self {
        self.textures = textures;
        self
    }

    /// Find the closest hit.
    ///
    /// * `ray`        - Ray.
    /// * `visibility` - Visibility mask.
    pub fn intersect(&self, ray: &Ray, visibility: PathRayFlags) -> Option<Intersection> {
        self.intersector.intersect(ray, visibility)
    }
}

impl TextureLookup for KernelGlobals {
    fn texture(&self, slot: usize) -> Option<&ImageTexture> {
        self.textures.texture(slot)
    }
}

impl std::fmt::Debug for KernelGlobals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelGlobals")
            .field("objects", &self.data.objects.len())
            .field("prims", &self.data.prims.len())
            .field("textures", &self.textures.len())
            .field("evaluator", &self.evaluator.is_some())
            .finish()
    }
}
