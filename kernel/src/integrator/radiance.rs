//! Path radiance accumulation

use crate::closure::{BsdfEval, Label, LightPass, NUM_LIGHT_PASSES};
use crate::geometry::*;
use crate::math::*;
use crate::path_state::{PathRayFlags, PathState};
use crate::scene::IntegratorSettings;
use crate::spectrum::*;

/// Bounces whose contribution is tracked separately; deeper bounces are
/// added to the last entry.
pub const MAX_RECORDED_BOUNCES: usize = 32;

/// Radiance split by where it came from. The passes are not clamped.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LightPasses {
    /// Emitters seen directly by the camera.
    pub emission: Spectrum,

    /// Background seen directly by the camera.
    pub background: Spectrum,

    /// Light reaching the first hit directly, per closure class.
    pub direct: [Spectrum; NUM_LIGHT_PASSES],

    /// All other light, per class of the first scattering event.
    pub indirect: [Spectrum; NUM_LIGHT_PASSES],
}

impl LightPasses {
    /// Sum of every pass.
    pub fn sum(&self) -> Spectrum {
        self.direct
            .iter()
            .chain(self.indirect.iter())
            .fold(self.emission + self.background, |acc, p| acc + *p)
    }
}

/// Radiance gathered along one camera path, with the auxiliary values
/// written to the feature passes.
#[derive(Clone, Debug, Default)]
pub struct PathRadiance {
    /// Camera-visible emission, light sampled at the first hit and light
    /// found by the first bounce.
    pub direct: Spectrum,

    /// Light reaching the camera after more scattering events.
    pub indirect: Spectrum,

    /// Light passes, when the film writes them.
    pub passes: Option<LightPasses>,

    /// Fraction of the path that saw a transparent background or holdout.
    pub transparent: Float,

    /// Unshadowed direct light, for the shadow feature.
    pub path_total: Spectrum,

    /// Shadowed direct light, for the shadow feature.
    pub path_total_shaded: Spectrum,

    /// Weighted normal of the first diffuse-like hit.
    pub denoising_normal: Vector3f,

    /// Weighted albedo of the first diffuse-like hit.
    pub denoising_albedo: Spectrum,

    /// Distance to the first opaque hit.
    pub depth: Option<Float>,

    bounce_contribution: [Float; MAX_RECORDED_BOUNCES],
    num_bounces: usize,

    /// Class of the first scattering event.
    first_pass: Option<LightPass>,

    use_denoising: bool,
}

impl PathRadiance {
    /// Create empty radiance.
    ///
    /// * `use_denoising`  - Track shadow information for the feature passes.
    /// * `use_light_pass` - Split the radiance into light passes.
    pub fn new(use_denoising: bool, use_light_pass: bool) -> Self {
        Self {
            use_denoising,
            passes: use_light_pass.then(LightPasses::default),
            ..Default::default()
        }
    }

    /// Returns true if the radiance is split into light passes.
    pub fn use_light_pass(&self) -> bool {
        self.passes.is_some()
    }

    /// Average radiance added at each bounce, up to the deepest one that
    /// added any.
    pub fn bounce_contribution(&self) -> &[Float] {
        &self.bounce_contribution[..self.num_bounces]
    }

    fn record_bounce(&mut self, bounce: u32, value: &Spectrum) {
        let index = (bounce as usize).min(MAX_RECORDED_BOUNCES - 1);
        self.bounce_contribution[index] += value.average();
        self.num_bounces = self.num_bounces.max(index + 1);
    }

    /// Remember the class of the first scattering event. Transparent
    /// pass-through does not count.
    ///
    /// * `label` - Sampled event.
    pub fn record_scatter(&mut self, label: Label) {
        if self.first_pass.is_none() {
            self.first_pass = LightPass::from_label(label);
        }
    }

    /// Attribute the rest of the path to subsurface scattering.
    pub fn record_subsurface(&mut self) {
        if self.first_pass.is_none() {
            self.first_pass = Some(LightPass::Subsurface);
        }
    }

    /// Add light from a surface the path hit: emission, or the background
    /// when `background` is set.
    ///
    /// * `state`      - Path state when the light was found.
    /// * `value`      - Radiance weighted by the path throughput.
    /// * `background` - The light is the background.
    pub fn add_emission(&mut self, state: &PathState, value: Spectrum, background: bool) {
        self.record_bounce(state.bounce, &value);
        if state.bounce <= 1 {
            self.direct += value;
        } else {
            self.indirect += value;
        }

        let first_pass = self.first_pass.unwrap_or(LightPass::Diffuse) as usize;
        if let Some(passes) = self.passes.as_mut() {
            match state.bounce {
                0 if background => passes.background += value,
                0 => passes.emission += value,
                1 => passes.direct[first_pass] += value,
                _ => passes.indirect[first_pass] += value,
            }
        }
    }

    /// Add sampled light.
    ///
    /// * `state` - Path state at the shading point.
    /// * `eval`  - BSDF or phase evaluation.
    /// * `scale` - Throughput times light radiance over light PDF.
    pub fn add_light(&mut self, state: &PathState, eval: &BsdfEval, scale: Spectrum) {
        let value = eval.sum() * scale;
        self.record_bounce(state.bounce, &value);
        if state.bounce == 0 {
            self.direct += value;
        } else {
            self.indirect += value;
        }

        let first_pass = self.first_pass;
        if let Some(passes) = self.passes.as_mut() {
            match (state.bounce, first_pass) {
                (0, Some(LightPass::Subsurface)) => passes.direct[LightPass::Subsurface as usize] += value,
                (0, _) => {
                    for (dst, src) in passes.direct.iter_mut().zip(eval.passes.iter()) {
                        *dst += *src * scale;
                    }
                }
                (_, pass) => passes.indirect[pass.unwrap_or(LightPass::Diffuse) as usize] += value,
            }
        }
    }

    /// Record direct light before and after shadowing.
    ///
    /// * `state`      - Path state.
    /// * `unshadowed` - Contribution without occlusion.
    /// * `shadowed`   - Contribution after occlusion.
    pub fn add_shadow_info(&mut self, state: &PathState, unshadowed: &Spectrum, shadowed: Spectrum) {
        if self.use_denoising && state.flag.contains(PathRayFlags::STORE_SHADOW_INFO) {
            self.path_total += *unshadowed;
            self.path_total_shaded += shadowed;
        }
    }

    /// Total radiance with the sample clamps applied.
    ///
    /// * `integrator` - Integrator settings.
    pub fn sum(&self, integrator: &IntegratorSettings) -> Spectrum {
        clamp_sample(self.direct, integrator.sample_clamp_direct)
            + clamp_sample(self.indirect, integrator.sample_clamp_indirect)
    }

    /// Shadow feature as (unshadowed, shadowed) averages.
    pub fn shadow(&self) -> (Float, Float) {
        (self.path_total.average(), self.path_total_shaded.average())
    }
}

/// Scale a sample down so that no component exceeds `limit`; 0 disables
/// clamping.
fn clamp_sample(value: Spectrum, limit: Float) -> Spectrum {
    if limit <= 0.0 {
        return value;
    }
    let max = value.max_component_value();
    if max > limit {
        value * (limit / max)
    } else {
        value
    }
}
