//! Path state

use super::*;
use crate::closure::Label;
use crate::math::*;
use crate::rng::*;
use crate::scene::IntegratorSettings;
use crate::shader::{ShaderData, ShaderFlags};
use crate::spectrum::*;
use crate::volume::*;

/// Per-path state carried across bounces.
#[derive(Copy, Clone, Debug, Default)]
pub struct PathState {
    /// Ray type and history.
    pub flag: PathRayFlags,

    /// Number of bounces other than transparent ones.
    pub bounce: u32,

    /// Number of diffuse reflections.
    pub diffuse_bounce: u32,

    /// Number of glossy reflections.
    pub glossy_bounce: u32,

    /// Number of transmissions.
    pub transmission_bounce: u32,

    /// Number of transparent pass-throughs.
    pub transparent_bounce: u32,

    /// Number of volume scattering events.
    pub volume_bounce: u32,

    /// Number of volume bounding surfaces crossed.
    pub volume_bounds_bounce: u32,

    /// Per-pixel random seed.
    pub rng_hash: u32,

    /// First random dimension of the current bounce.
    pub rng_offset: u32,

    /// Sample index.
    pub sample: u32,

    /// Total samples per pixel.
    pub num_samples: u32,

    /// Smallest PDF along the path.
    pub min_ray_pdf: Float,

    /// PDF of the last sampled direction.
    pub ray_pdf: Float,

    /// Distance travelled since the last scattering event, through
    /// transparent surfaces.
    pub ray_t: Float,

    /// Weight of the remaining denoising feature contributions.
    pub denoising_feature_weight: Float,

    /// Volumes the path is inside of.
    pub volume_stack: VolumeStack,
}

impl PathState {
    /// Initialize the state of a camera path.
    ///
    /// * `integrator`   - Integrator settings.
    /// * `denoising`    - True if denoising feature passes are written.
    /// * `rng_hash`     - Per-pixel random seed.
    /// * `sample`       - Sample index.
    /// * `camera_stack` - Volumes the camera is inside of.
    pub fn init(
        integrator: &IntegratorSettings,
        denoising: bool,
        rng_hash: u32,
        sample: u32,
        camera_stack: &VolumeStack,
    ) -> Self {
        let mut flag = PathRayFlags::CAMERA | PathRayFlags::MIS_SKIP;
        let denoising_feature_weight = if denoising {
            flag |= PathRayFlags::STORE_SHADOW_INFO;
            1.0
        } else {
            0.0
        };

        Self {
            flag,
            rng_hash,
            rng_offset: PRNG_BASE_NUM,
            sample,
            num_samples: integrator.aa_samples,
            min_ray_pdf: FLT_MAX,
            ray_pdf: 0.0,
            ray_t: 0.0,
            denoising_feature_weight,
            volume_stack: if integrator.use_volumes {
                *camera_stack
            } else {
                VolumeStack::new()
            },
            ..Default::default()
        }
    }

    /// Advance the state past a scattering event.
    ///
    /// * `integrator` - Integrator settings.
    /// * `label`      - The sampled event.
    pub fn next(&mut self, integrator: &IntegratorSettings, label: Label) {
        // Transparent pass-through keeps the previous ray's flags and has
        // its own bounce limit.
        if label.contains(Label::TRANSPARENT) {
            self.flag |= PathRayFlags::TRANSPARENT;
            self.transparent_bounce += 1;
            if !integrator.transparent_shadows {
                self.flag |= PathRayFlags::MIS_SKIP;
            }
            return;
        }

        self.bounce += 1;

        if label.contains(Label::VOLUME_SCATTER) {
            self.flag |= PathRayFlags::VOLUME_SCATTER;
            self.flag.remove(
                PathRayFlags::REFLECT
                    | PathRayFlags::TRANSMIT
                    | PathRayFlags::CAMERA
                    | PathRayFlags::TRANSPARENT
                    | PathRayFlags::DIFFUSE
                    | PathRayFlags::GLOSSY
                    | PathRayFlags::SINGULAR
                    | PathRayFlags::MIS_SKIP,
            );
            self.volume_bounce += 1;
        } else {
            let cleared = PathRayFlags::VOLUME_SCATTER
                | PathRayFlags::CAMERA
                | PathRayFlags::TRANSPARENT;
            if label.contains(Label::REFLECT) {
                self.flag |= PathRayFlags::REFLECT;
                self.flag.remove(PathRayFlags::TRANSMIT | cleared);
                if label.contains(Label::DIFFUSE) {
                    self.diffuse_bounce += 1;
                } else {
                    self.glossy_bounce += 1;
                }
            } else {
                debug_assert!(label.contains(Label::TRANSMIT));
                self.flag |= PathRayFlags::TRANSMIT;
                self.flag.remove(PathRayFlags::REFLECT | cleared);
                self.transmission_bounce += 1;
            }

            if label.contains(Label::DIFFUSE) {
                self.flag |= PathRayFlags::DIFFUSE | PathRayFlags::DIFFUSE_ANCESTOR;
                self.flag.remove(
                    PathRayFlags::GLOSSY | PathRayFlags::SINGULAR | PathRayFlags::MIS_SKIP,
                );
            } else if label.contains(Label::GLOSSY) {
                self.flag |= PathRayFlags::GLOSSY;
                self.flag.remove(
                    PathRayFlags::DIFFUSE | PathRayFlags::SINGULAR | PathRayFlags::MIS_SKIP,
                );
            } else {
                debug_assert!(label.contains(Label::SINGULAR));
                self.flag |=
                    PathRayFlags::GLOSSY | PathRayFlags::SINGULAR | PathRayFlags::MIS_SKIP;
                self.flag.remove(PathRayFlags::DIFFUSE);
            }
        }

        self.rng_offset += PRNG_BOUNCE_NUM;

        if self.denoising_feature_weight == 0.0 {
            self.flag.remove(PathRayFlags::STORE_SHADOW_INFO);
        }
    }

    /// Advance past a volume bounding surface. Returns false once too many
    /// bounding surfaces were crossed.
    pub fn volume_next(&mut self) -> bool {
        self.volume_bounds_bounce += 1;
        if self.volume_bounds_bounce > VOLUME_BOUNDS_MAX {
            return false;
        }
        if self.volume_bounds_bounce > 1 {
            self.rng_offset += PRNG_BOUNCE_NUM;
        }
        true
    }

    /// Visibility flags used to test objects against the next ray.
    /// Diffuse and glossy visibility apply to reflection only. Volume
    /// scattered rays use diffuse visibility.
    pub fn ray_visibility(&self) -> PathRayFlags {
        let mut flag = self.flag & PathRayFlags::ALL_VISIBILITY;
        if flag.contains(PathRayFlags::TRANSMIT) {
            flag.remove(PathRayFlags::DIFFUSE | PathRayFlags::GLOSSY);
        }
        if self.flag.contains(PathRayFlags::VOLUME_SCATTER) {
            flag |= PathRayFlags::DIFFUSE;
        }
        flag
    }

    /// Probability of continuing the path. Hard bounce limits return 0,
    /// paths below the minimum bounce count return 1 and all others fall
    /// back to the average throughput.
    ///
    /// * `integrator` - Integrator settings.
    /// * `sd`         - Current shading point.
    /// * `throughput` - Path throughput.
    pub fn terminate_probability(
        &self,
        integrator: &IntegratorSettings,
        sd: &ShaderData,
        throughput: &Spectrum,
    ) -> Float {
        if self.flag.contains(PathRayFlags::TRANSPARENT) {
            if self.transparent_bounce >= integrator.transparent_max_bounce {
                return 0.0;
            } else if self.transparent_bounce <= integrator.transparent_min_bounce {
                return 1.0;
            }
        } else {
            let (max_diffuse, max_glossy, max_transmission) =
                if sd.shader_flag.contains(ShaderFlags::OVERRIDE_BOUNCES) {
                    (
                        sd.bounces.diffuse,
                        sd.bounces.glossy,
                        sd.bounces.transmission,
                    )
                } else {
                    (
                        integrator.max_diffuse_bounce,
                        integrator.max_glossy_bounce,
                        integrator.max_transmission_bounce,
                    )
                };

            if self.bounce >= integrator.max_bounce
                || self.diffuse_bounce >= max_diffuse
                || self.glossy_bounce >= max_glossy
                || self.volume_bounce >= integrator.max_volume_bounce
                || self.transmission_bounce >= max_transmission
            {
                return 0.0;
            } else if self.bounce <= integrator.min_bounce {
                return 1.0;
            }
        }

        throughput.average()
    }

    /// Temporarily change the bounce count, used while evaluating shaders
    /// that depend on it.
    ///
    /// * `increase` - Increment if true, decrement otherwise.
    pub fn modify_bounce(&mut self, increase: bool) {
        if increase {
            self.bounce += 1;
        } else {
            self.bounce = self.bounce.saturating_sub(1);
        }
    }

    /// Random number for a dimension of the current bounce.
    ///
    /// * `dimension` - Dimension relative to the bounce's offset.
    pub fn rng_1d(&self, dimension: u32) -> Float {
        path_rng_1d(self.rng_hash, self.sample, self.rng_offset + dimension)
    }

    /// Pair of random numbers for the current bounce.
    ///
    /// * `dimension` - First dimension relative to the bounce's offset.
    pub fn rng_2d(&self, dimension: u32) -> (Float, Float) {
        path_rng_2d(self.rng_hash, self.sample, self.rng_offset + dimension)
    }

    /// Random number for decisions that must decorrelate across transparent
    /// bounces, which do not advance the offset.
    ///
    /// * `dimension` - Dimension relative to the bounce's offset.
    pub fn rng_1d_for_decision(&self, dimension: u32) -> Float {
        let offset = self.rng_offset + self.transparent_bounce * PRNG_BOUNCE_NUM;
        path_rng_1d(self.rng_hash, self.sample, offset + dimension)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> IntegratorSettings {
        IntegratorSettings {
            min_bounce: 1,
            max_bounce: 4,
            max_diffuse_bounce: 4,
            max_glossy_bounce: 4,
            max_transmission_bounce: 4,
            max_volume_bounce: 4,
            transparent_min_bounce: 2,
            transparent_max_bounce: 8,
            ..Default::default()
        }
    }

    fn camera_state(s: &IntegratorSettings) -> PathState {
        PathState::init(s, false, 0x1234, 0, &VolumeStack::new())
    }

    #[test]
    fn init_is_camera_ray() {
        let s = settings();
        let state = camera_state(&s);
        assert!(state.flag.contains(PathRayFlags::CAMERA | PathRayFlags::MIS_SKIP));
        assert_eq!(state.rng_offset, PRNG_BASE_NUM);
        assert_eq!(state.min_ray_pdf, FLT_MAX);
        assert_eq!(state.bounce, 0);
        assert!(!state.flag.contains(PathRayFlags::STORE_SHADOW_INFO));
    }

    #[test]
    fn init_with_denoising_stores_shadow_info() {
        let state = PathState::init(&settings(), true, 1, 0, &VolumeStack::new());
        assert!(state.flag.contains(PathRayFlags::STORE_SHADOW_INFO));
        assert_eq!(state.denoising_feature_weight, 1.0);
    }

    #[test]
    fn diffuse_reflection() {
        let s = settings();
        let mut state = camera_state(&s);
        state.next(&s, Label::REFLECT | Label::DIFFUSE);
        assert_eq!(state.bounce, 1);
        assert_eq!(state.diffuse_bounce, 1);
        assert!(state.flag.contains(PathRayFlags::REFLECT | PathRayFlags::DIFFUSE));
        assert!(state.flag.contains(PathRayFlags::DIFFUSE_ANCESTOR));
        assert!(!state.flag.contains(PathRayFlags::CAMERA));
        assert!(!state.flag.contains(PathRayFlags::MIS_SKIP));
        assert_eq!(state.rng_offset, PRNG_BASE_NUM + PRNG_BOUNCE_NUM);
    }

    #[test]
    fn singular_transmission() {
        let s = settings();
        let mut state = camera_state(&s);
        state.next(&s, Label::TRANSMIT | Label::SINGULAR);
        assert_eq!(state.transmission_bounce, 1);
        assert!(state.flag.contains(
            PathRayFlags::TRANSMIT
                | PathRayFlags::GLOSSY
                | PathRayFlags::SINGULAR
                | PathRayFlags::MIS_SKIP
        ));
        let vis = state.ray_visibility();
        assert!(!vis.contains(PathRayFlags::GLOSSY));
        assert!(vis.contains(PathRayFlags::TRANSMIT));
    }

    #[test]
    fn transparent_keeps_flags_and_offset() {
        let s = settings();
        let mut state = camera_state(&s);
        let before = state.rng_offset;
        state.next(&s, Label::TRANSMIT | Label::TRANSPARENT);
        assert_eq!(state.bounce, 0);
        assert_eq!(state.transparent_bounce, 1);
        assert_eq!(state.rng_offset, before);
        assert!(state.flag.contains(PathRayFlags::CAMERA | PathRayFlags::TRANSPARENT));
        assert!(state.flag.contains(PathRayFlags::MIS_SKIP));
        assert_ne!(state.rng_1d_for_decision(0), state.rng_1d(0));
    }

    #[test]
    fn volume_scatter_uses_diffuse_visibility() {
        let s = settings();
        let mut state = camera_state(&s);
        state.next(&s, Label::VOLUME_SCATTER);
        assert_eq!(state.volume_bounce, 1);
        let vis = state.ray_visibility();
        assert!(vis.contains(PathRayFlags::VOLUME_SCATTER | PathRayFlags::DIFFUSE));
        assert!(!vis.contains(PathRayFlags::CAMERA));
    }

    #[test]
    fn bounce_limits() {
        let s = settings();
        let sd = ShaderData::default();
        let throughput = Spectrum::new(0.5);

        let mut state = camera_state(&s);
        assert_eq!(state.terminate_probability(&s, &sd, &throughput), 1.0);

        state.next(&s, Label::REFLECT | Label::GLOSSY);
        state.next(&s, Label::REFLECT | Label::GLOSSY);
        assert_eq!(state.terminate_probability(&s, &sd, &throughput), 0.5);

        state.next(&s, Label::REFLECT | Label::GLOSSY);
        state.next(&s, Label::REFLECT | Label::GLOSSY);
        assert_eq!(state.terminate_probability(&s, &sd, &throughput), 0.0);
    }

    #[test]
    fn shader_override_limits() {
        let s = settings();
        let mut sd = ShaderData::default();
        sd.shader_flag = ShaderFlags::OVERRIDE_BOUNCES;
        sd.bounces.diffuse = 1;
        sd.bounces.glossy = 4;
        sd.bounces.transmission = 4;

        let mut state = camera_state(&s);
        state.next(&s, Label::REFLECT | Label::DIFFUSE);
        assert_eq!(state.terminate_probability(&s, &sd, &Spectrum::one()), 0.0);
    }

    #[test]
    fn transparent_limits() {
        let s = settings();
        let sd = ShaderData::default();
        let mut state = camera_state(&s);
        for _ in 0..2 {
            state.next(&s, Label::TRANSMIT | Label::TRANSPARENT);
        }
        assert_eq!(state.terminate_probability(&s, &sd, &Spectrum::new(0.25)), 1.0);
        state.next(&s, Label::TRANSMIT | Label::TRANSPARENT);
        assert_eq!(state.terminate_probability(&s, &sd, &Spectrum::new(0.25)), 0.25);
        for _ in 0..5 {
            state.next(&s, Label::TRANSMIT | Label::TRANSPARENT);
        }
        assert_eq!(state.terminate_probability(&s, &sd, &Spectrum::new(0.25)), 0.0);
    }

    #[test]
    fn volume_bounds_are_capped() {
        let mut state = camera_state(&settings());
        for _ in 0..VOLUME_BOUNDS_MAX {
            assert!(state.volume_next());
        }
        assert!(!state.volume_next());
    }

    #[test]
    fn modify_bounce_round_trips() {
        let mut state = camera_state(&settings());
        state.modify_bounce(true);
        assert_eq!(state.bounce, 1);
        state.modify_bounce(false);
        assert_eq!(state.bounce, 0);
    }
}
