//! Scene builder

use super::*;
use crate::film::{FilmSettings, PassLayout};
use crate::geometry::*;
use crate::math::*;
use crate::shader::{ObjectFlags, ShaderFlags};
use crate::volume::{VolumeStack, VolumeStackEntry};

/// Collects scene data and prepares it for rendering.
#[derive(Clone, Debug, Default)]
pub struct SceneBuilder {
    data: KernelData,
}

impl SceneBuilder {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shader and return its index.
    ///
    /// * `shader` - Shader entry.
    pub fn add_shader(&mut self, shader: KernelShader) -> usize {
        self.data.shaders.push(shader);
        self.data.shaders.len() - 1
    }

    /// Add geometry and return its index.
    ///
    /// * `geometry` - Geometry.
    pub fn add_geometry(&mut self, geometry: Geometry) -> usize {
        self.data.geometry.push(geometry);
        self.data.geometry.len() - 1
    }

    /// Add an object and return its index.
    ///
    /// * `object` - Object.
    pub fn add_object(&mut self, object: ObjectData) -> usize {
        self.data.objects.push(object);
        self.data.objects.len() - 1
    }

    /// Set the camera.
    pub fn camera(&mut self, camera: CameraSettings) -> &mut Self {
        self.data.camera = camera;
        self
    }

    /// Set the integrator settings.
    pub fn integrator(&mut self, integrator: IntegratorSettings) -> &mut Self {
        self.data.integrator = integrator;
        self
    }

    /// Set the film settings.
    pub fn film(&mut self, film: FilmSettings) -> &mut Self {
        self.data.film = film;
        self
    }

    /// Set the background.
    pub fn background(&mut self, background: BackgroundSettings) -> &mut Self {
        self.data.background = background;
        self
    }

    /// Bake transforms, build the primitive table and light distribution.
    pub fn build(self) -> KernelData {
        let mut data = self.data;
        bake_transforms(&mut data);
        set_object_flags(&mut data);
        build_prims(&mut data);
        data.lights = build_lights(&data);
        data.layout = PassLayout::new(&data.film);
        data.camera_volume_stack = camera_volume_stack(&data);

        info!(
            "Scene has {} objects, {} primitives, {} emissive triangles",
            data.objects.len(),
            data.prims.len(),
            data.lights.triangles.len()
        );
        data
    }
}

/// Bake the transform of static meshes that are used by a single object into
/// their vertices.
fn bake_transforms(data: &mut KernelData) {
    let mut users = vec![0_usize; data.geometry.len()];
    for object in data.objects.iter() {
        if let Some(n) = users.get_mut(object.geometry) {
            *n += 1;
        }
    }

    for object in data.objects.iter_mut() {
        if object.motion.is_some() || users.get(object.geometry) != Some(&1) {
            continue;
        }
        if let Some(Geometry::Mesh(mesh)) = data.geometry.get_mut(object.geometry) {
            if mesh.has_motion() {
                continue;
            }
            mesh.apply_transform(&object.tfm);
            object.flags |= ObjectFlags::TRANSFORM_APPLIED;
            if object.tfm.negative_scale() {
                object.flags |= ObjectFlags::NEGATIVE_SCALE_APPLIED;
            }
            debug!("Baked transform of object '{}'", object.name);
        }
    }
}

/// Volume flags from the shaders used by each object.
fn set_object_flags(data: &mut KernelData) {
    let shaders = &data.shaders;
    for object in data.objects.iter_mut() {
        let has_volume = data.geometry.get(object.geometry).map_or(false, |g| {
            (0..g.num_prims()).any(|p| {
                shaders
                    .get(g.prim_shader(p))
                    .map_or(false, |s| s.flags.contains(ShaderFlags::HAS_VOLUME))
            })
        });
        if has_volume {
            object.flags |= ObjectFlags::HAS_VOLUME;
        }
    }
}

fn build_prims(data: &mut KernelData) {
    data.prims.clear();
    for (index, object) in data.objects.iter().enumerate() {
        let Some(geometry) = data.geometry.get(object.geometry) else {
            warn!("Object '{}' references missing geometry {}", object.name, object.geometry);
            continue;
        };
        let prim_type = match geometry {
            Geometry::Mesh(mesh) if mesh.has_motion() => PrimitiveType::MotionTriangle,
            Geometry::Mesh(_) => PrimitiveType::Triangle,
            Geometry::Curves(_) => PrimitiveType::Curve,
        };
        for local in 0..geometry.num_prims() {
            data.prims.push(PrimRef {
                object: index,
                local,
                prim_type,
            });
        }
    }
}

fn build_lights(data: &KernelData) -> LightDistribution {
    let mut triangles = Vec::new();
    for (prim, pref) in data.prims.iter().enumerate() {
        let emissive = data
            .prim_shader(prim)
            .and_then(|s| data.shader(s))
            .map_or(false, |s| s.flags.contains(ShaderFlags::HAS_EMISSION));
        if !emissive {
            continue;
        }
        let object = &data.objects[pref.object];
        if let Some((mesh, tri)) = data.prim_triangle(prim) {
            let tfm = if object.flags.contains(ObjectFlags::TRANSFORM_APPLIED) {
                IDENTITY_TRANSFORM
            } else {
                object.tfm
            };
            triangles.push(LightTriangle {
                prim,
                area: mesh.triangle_area(tri, &tfm),
            });
        }
    }
    LightDistribution::new(triangles)
}

/// Volumes whose closed boundary contains the camera, found by counting
/// boundary crossings along a ray from the camera.
fn camera_volume_stack(data: &KernelData) -> VolumeStack {
    let mut stack = VolumeStack::new();
    if !data.integrator.use_volumes {
        return stack;
    }

    let origin = data.camera.camera_to_world.transform_point(&Point3f::zero());
    let dir = Vector3f::new(0.48, 0.6, 0.64);

    for (index, object) in data.objects.iter().enumerate() {
        if !object.flags.contains(ObjectFlags::HAS_VOLUME) {
            continue;
        }
        let Some(Geometry::Mesh(mesh)) = data.geometry.get(object.geometry) else {
            continue;
        };
        let (p, d) = if object.flags.contains(ObjectFlags::TRANSFORM_APPLIED) {
            (origin, dir)
        } else {
            (object.itfm.transform_point(&origin), object.itfm.transform_direction(&dir))
        };

        let crossings = (0..mesh.num_triangles())
            .filter(|&tri| {
                let verts = mesh.triangle_verts(tri, 0.5);
                crate::scene::intersect_triangle(&p, &d, &verts, 0.0, INFINITY).is_some()
            })
            .count();
        if crossings % 2 == 1 {
            let shader = (0..mesh.num_triangles())
                .map(|tri| mesh.shaders[tri])
                .find(|&s| data.shader(s).map_or(false, |s| s.flags.contains(ShaderFlags::HAS_VOLUME)));
            if let Some(shader) = shader {
                stack.push(VolumeStackEntry::new(Some(index), shader));
            }
        }
    }
    stack
}
