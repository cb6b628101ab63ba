//! Homogeneous volumes

use crate::geometry::*;
use crate::math::*;
use crate::path_state::{PathRayFlags, PathState};
use crate::rng::*;
use crate::scene::KernelGlobals;
use crate::shader::ShaderData;
use crate::spectrum::*;
use crate::volume::VolumeStack;

/// Outcome of integrating the volumes along a ray segment.
#[derive(Debug)]
pub enum VolumeIntegrateResult {
    /// The path scattered at the returned shading point.
    Scattered(Box<ShaderData>),

    /// The path passed through; only the throughput changed.
    Attenuated,

    /// Nothing gets through.
    Terminated,
}

/// Transmittance `exp(-sigma_t * t)`, treating zero extinction as clear
/// even over infinite distances.
fn transmittance(sigma_t: &Spectrum, t: Float) -> Spectrum {
    let t = t.min(FLT_MAX);
    Spectrum::rgb(
        if sigma_t.r() > 0.0 { (-sigma_t.r() * t).exp() } else { 1.0 },
        if sigma_t.g() > 0.0 { (-sigma_t.g() * t).exp() } else { 1.0 },
        if sigma_t.b() > 0.0 { (-sigma_t.b() * t).exp() } else { 1.0 },
    )
}

/// Transmittance of the volumes on a stack along a shadow ray segment.
///
/// * `kg`    - Kernel globals.
/// * `state` - Path state.
/// * `stack` - Volumes the ray is inside of.
/// * `ray`   - Shadow ray.
/// * `t`     - Segment length.
pub fn volume_shadow(kg: &KernelGlobals, state: &PathState, stack: &VolumeStack, ray: &Ray, t: Float) -> Spectrum {
    if !kg.data.integrator.use_volumes || stack.is_empty() {
        return Spectrum::one();
    }
    let mut sd = ShaderData::default();
    sd.setup_from_volume(ray);
    sd.eval_volume(kg, state, stack, PathRayFlags::SHADOW);
    let (sigma_t, _) = sd.volume_extinction();
    transmittance(&sigma_t, t)
}

/// Integrate the volumes on the path's stack up to distance `t`: pure
/// absorption attenuates the throughput, scattering media sample a
/// distance with one colour channel and either scatter there or pass
/// through with the throughput reweighted by the channel-averaged pdf.
///
/// * `kg`         - Kernel globals.
/// * `state`      - Path state.
/// * `ray`        - Ray through the volume.
/// * `t`          - Distance to the next surface.
/// * `throughput` - Path throughput, updated.
pub fn volume_integrate(
    kg: &KernelGlobals,
    state: &PathState,
    ray: &Ray,
    t: Float,
    throughput: &mut Spectrum,
) -> VolumeIntegrateResult {
    let mut sd = Box::<ShaderData>::default();
    sd.setup_from_volume(ray);
    sd.eval_volume(kg, state, &state.volume_stack, state.flag);
    let (sigma_t, sigma_s) = sd.volume_extinction();
    if sigma_t.is_black() {
        return VolumeIntegrateResult::Attenuated;
    }

    let channel = ((state.rng_1d(PRNG_PHASE_CHANNEL) * 3.0) as usize).min(2);
    let sample_sigma_t = sigma_t[channel];
    if sigma_s.is_black() || sample_sigma_t <= 0.0 {
        *throughput *= transmittance(&sigma_t, t);
        return if throughput.is_black() {
            VolumeIntegrateResult::Terminated
        } else {
            VolumeIntegrateResult::Attenuated
        };
    }

    let xi = state.rng_1d(PRNG_SCATTER_DISTANCE);
    let sample_t = -(1.0 - xi).max(Float::MIN_POSITIVE).ln() / sample_sigma_t;

    if sample_t < t {
        let tr = transmittance(&sigma_t, sample_t);
        let pdf = (sigma_t * tr).average();
        if pdf <= 0.0 {
            return VolumeIntegrateResult::Terminated;
        }
        *throughput *= sigma_s * tr / pdf;

        sd.p = ray.at(sample_t);
        sd.ray_length = sample_t;
        sd.dp = Differential3 {
            dx: ray.dp.dx + ray.dd.dx * sample_t,
            dy: ray.dp.dy + ray.dd.dy * sample_t,
        };
        sd.randb_closure = state.rng_1d(PRNG_BSDF);
        VolumeIntegrateResult::Scattered(sd)
    } else {
        let tr = transmittance(&sigma_t, t);
        let pdf = tr.average();
        if pdf <= 0.0 {
            return VolumeIntegrateResult::Terminated;
        }
        *throughput *= tr / pdf;
        VolumeIntegrateResult::Attenuated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::*;
    use crate::shader::*;
    use crate::volume::VolumeStackEntry;
    use float_cmp::*;
    use std::sync::Arc;

    fn fog(recipe: ShaderRecipe) -> (KernelGlobals, PathState) {
        let mut builder = SceneBuilder::new();
        let shader = builder.add_shader(KernelShader::new(
            "fog",
            ShaderFlags::HAS_VOLUME | ShaderFlags::HAS_ONLY_VOLUME,
        ));
        let kg = KernelGlobals::new(Arc::new(builder.build()))
            .with_evaluator(Arc::new(NodeGraphEvaluator::new(vec![recipe])));
        let mut state = PathState::default();
        state.volume_stack.push(VolumeStackEntry::new(None, shader));
        (kg, state)
    }

    fn ray() -> Ray {
        Ray::new(Point3f::zero(), Vector3f::new(0.0, 0.0, 1.0), INFINITY, 0.5)
    }

    #[test]
    fn absorption_attenuates() {
        let (kg, state) = fog(ShaderRecipe::volume(ClosureNode::VolumeAbsorption {
            color: Spectrum::zero().into(),
            density: 0.5,
        }));
        let mut throughput = Spectrum::one();
        let result = volume_integrate(&kg, &state, &ray(), 2.0, &mut throughput);
        assert!(matches!(result, VolumeIntegrateResult::Attenuated));
        assert!(approx_eq!(f32, throughput.r(), (-1.0f32).exp(), epsilon = 1e-5));
        assert_eq!(volume_shadow(&kg, &state, &state.volume_stack, &ray(), 2.0), throughput);
    }

    #[test]
    fn infinite_absorbing_segment_terminates() {
        let (kg, state) = fog(ShaderRecipe::volume(ClosureNode::VolumeAbsorption {
            color: Spectrum::zero().into(),
            density: 1.0,
        }));
        let mut throughput = Spectrum::one();
        let result = volume_integrate(&kg, &state, &ray(), INFINITY, &mut throughput);
        assert!(matches!(result, VolumeIntegrateResult::Terminated));
    }

    #[test]
    fn dense_scattering_scatters_inside() {
        let (kg, state) = fog(ShaderRecipe::volume(ClosureNode::VolumeScatter {
            color: Spectrum::one().into(),
            density: 1e4,
            anisotropy: 0.0,
        }));
        let mut throughput = Spectrum::one();
        match volume_integrate(&kg, &state, &ray(), 10.0, &mut throughput) {
            VolumeIntegrateResult::Scattered(sd) => {
                assert!(sd.p.z >= 0.0 && sd.p.z < 10.0);
                // A grey scattering medium keeps the throughput.
                assert!(approx_eq!(f32, throughput.g(), 1.0, epsilon = 1e-4));
            }
            other => panic!("expected a scattering event, got {other:?}"),
        }
    }

    #[test]
    fn empty_stack_is_clear() {
        let (kg, mut state) = fog(ShaderRecipe::default());
        state.volume_stack = VolumeStack::new();
        assert_eq!(volume_shadow(&kg, &state, &state.volume_stack, &ray(), 5.0), Spectrum::one());
        assert_eq!(transmittance(&Spectrum::zero(), INFINITY), Spectrum::one());
    }
}
