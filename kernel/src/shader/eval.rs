//! Shader evaluation

use super::*;
use crate::closure::*;
use crate::math::*;
use crate::path_state::{PathRayFlags, PathState};
use crate::rng::lcg_state_init;
use crate::scene::KernelGlobals;
use crate::spectrum::*;
use crate::volume::VolumeStack;

/// Scramble constant of the per-shading-point LCG stream.
const LCG_SURFACE_SCRAMBLE: u32 = 0xb4bc3953;

/// Which part of a shader is evaluated.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShaderType {
    /// Surface closures.
    Surface,

    /// Volume closures.
    Volume,

    /// Displacement; modifies the position.
    Displacement,

    /// Surface closures seen by ambient occlusion rays.
    AoSurface,
}

/// Produces closures for a shading point. Implementations add closures
/// through `ShaderData::add_closure` or the closure array's `push` and
/// `merge_or_push`, which never exceed the array's capacity.
pub trait ShaderEvaluator: Send + Sync {
    /// Evaluate the shader of `sd`.
    ///
    /// * `kg`          - Kernel globals.
    /// * `sd`          - Shading point.
    /// * `state`       - Path state, if evaluated along a path.
    /// * `shader_type` - Part of the shader to evaluate.
    /// * `path_flag`   - Ray type flags.
    fn evaluate(
        &self,
        kg: &KernelGlobals,
        sd: &mut ShaderData,
        state: Option<&PathState>,
        shader_type: ShaderType,
        path_flag: PathRayFlags,
    );
}

impl ShaderData {
    /// Evaluate surface closures. Without an evaluator a grey diffuse
    /// closure is used.
    ///
    /// * `kg`        - Kernel globals.
    /// * `state`     - Path state.
    /// * `randb`     - Random number used to pick a closure.
    /// * `path_flag` - Ray type flags.
    pub fn eval_surface(
        &mut self,
        kg: &KernelGlobals,
        state: &PathState,
        randb: Float,
        path_flag: PathRayFlags,
    ) {
        self.closures.clear();
        self.randb_closure = randb;

        match &kg.evaluator {
            Some(evaluator) => {
                evaluator.evaluate(kg, self, Some(state), ShaderType::Surface, path_flag);
            }
            None => {
                let n = self.n;
                self.add_closure(Closure::Diffuse { n }, Spectrum::new(0.8));
            }
        }

        self.lcg_state = lcg_state_init(
            state.rng_hash,
            state.rng_offset,
            state.sample,
            LCG_SURFACE_SCRAMBLE,
        );
    }

    /// Evaluate the background shader and return its radiance. Without a
    /// background shader the world is black.
    ///
    /// * `kg`        - Kernel globals.
    /// * `state`     - Path state, if any.
    /// * `path_flag` - Ray type flags.
    pub fn eval_background(
        &mut self,
        kg: &KernelGlobals,
        state: Option<&PathState>,
        path_flag: PathRayFlags,
    ) -> Spectrum {
        self.closures.clear();
        self.randb_closure = 0.0;

        if self.shader.is_none() {
            return Spectrum::zero();
        }
        match &kg.evaluator {
            Some(evaluator) => {
                evaluator.evaluate(kg, self, state, ShaderType::Surface, path_flag);
                self.background_eval()
            }
            None => Spectrum::new(0.8),
        }
    }

    /// Evaluate the environment seen by ambient occlusion rays. A shader
    /// that produces nothing is white.
    ///
    /// * `kg`        - Kernel globals.
    /// * `state`     - Path state, if any.
    /// * `path_flag` - Ray type flags.
    pub fn eval_ao_env(
        &mut self,
        kg: &KernelGlobals,
        state: Option<&PathState>,
        path_flag: PathRayFlags,
    ) -> Spectrum {
        self.closures.clear();
        self.randb_closure = 0.0;

        let Some(evaluator) = &kg.evaluator else {
            return Spectrum::one();
        };
        evaluator.evaluate(kg, self, state, ShaderType::AoSurface, path_flag);
        if self.closures.is_empty() {
            Spectrum::one()
        } else {
            self.background_eval()
        }
    }

    /// Evaluate every volume on the stack that overlaps the current point,
    /// accumulating their closures into one array.
    ///
    /// * `kg`        - Kernel globals.
    /// * `state`     - Path state.
    /// * `stack`     - Volumes the point is inside of.
    /// * `path_flag` - Ray type flags.
    pub fn eval_volume(
        &mut self,
        kg: &KernelGlobals,
        state: &PathState,
        stack: &VolumeStack,
        path_flag: PathRayFlags,
    ) {
        let data = &kg.data;

        // Volumes with a velocity are shifted back to the shutter center.
        if let Some(shuttertime) = data.camera.shuttertime {
            let velocity = self
                .object
                .and_then(|o| data.objects.get(o))
                .and_then(|o| o.volume_velocity);
            if let Some(velocity) = velocity {
                let shader_scale = self
                    .shader
                    .and_then(|s| data.shader(s))
                    .map_or(1.0, |s| s.velocity_scale);
                let scale = shader_scale * shuttertime * data.camera.inv_fps;
                self.p -= velocity
                    * scale
                    * (self.time - 0.5 + data.camera.motion_offset * scale);
            }
        }

        self.closures.clear();
        self.runtime_flag = RuntimeFlags::empty();
        self.shader_flag = ShaderFlags::empty();
        self.object_flag = ObjectFlags::empty();

        for (i, entry) in stack.iter().enumerate() {
            if entry.t_enter > self.ray_length || entry.t_exit < self.ray_length {
                continue;
            }

            self.object = entry.object;
            self.load_shader_params(data, Some(entry.shader));
            if let Some(object) = entry.object.and_then(|o| data.objects.get(o)) {
                self.object_flag = object.flags;
                let time = self.time;
                self.setup_object_transforms(data, time);
            } else {
                self.object_flag = ObjectFlags::empty();
            }

            if let Some(evaluator) = &kg.evaluator {
                evaluator.evaluate(kg, self, Some(state), ShaderType::Volume, path_flag);
            }

            // Keep the array small when several volumes overlap.
            if i > 0 {
                self.merge_closures();
            }
        }
    }

    /// Evaluate displacement, which moves `p`.
    ///
    /// * `kg`    - Kernel globals.
    /// * `state` - Path state, if any.
    pub fn eval_displacement(&mut self, kg: &KernelGlobals, state: Option<&PathState>) {
        self.closures.clear();
        self.randb_closure = 0.0;
        if let Some(evaluator) = &kg.evaluator {
            evaluator.evaluate(kg, self, state, ShaderType::Displacement, PathRayFlags::empty());
        }
    }
}
