//! Integrator and background settings

use crate::math::*;

/// Path tracing settings shared by every path.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct IntegratorSettings {
    /// Samples per pixel.
    pub aa_samples: u32,

    /// Seed mixed into per-pixel random seeds.
    pub seed: u32,

    /// Paths are never terminated probabilistically before this bounce.
    pub min_bounce: u32,

    /// Hard limit on the total number of bounces.
    pub max_bounce: u32,

    /// Hard limit on diffuse reflections.
    pub max_diffuse_bounce: u32,

    /// Hard limit on glossy reflections.
    pub max_glossy_bounce: u32,

    /// Hard limit on transmissions.
    pub max_transmission_bounce: u32,

    /// Hard limit on volume scattering events.
    pub max_volume_bounce: u32,

    /// Transparent surfaces are never terminated before this count.
    pub transparent_min_bounce: u32,

    /// Hard limit on transparent pass-throughs.
    pub transparent_max_bounce: u32,

    /// Trace shadow rays through transparent surfaces.
    pub transparent_shadows: bool,

    /// Evaluate volume shaders.
    pub use_volumes: bool,

    /// Minimum roughness applied to glossy closures after a diffuse bounce;
    /// 0 disables blurring.
    pub filter_glossy: Float,

    /// Clamp for direct light contributions; 0 disables clamping.
    pub sample_clamp_direct: Float,

    /// Clamp for indirect light contributions; 0 disables clamping.
    pub sample_clamp_indirect: Float,

    /// Replace indirect lighting by ambient occlusion after this many
    /// bounces; 0 disables it.
    pub ao_bounces: u32,

    /// Distance used for ambient occlusion rays after `ao_bounces`.
    pub ao_bounces_distance: Float,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self {
            aa_samples: 16,
            seed: 0,
            min_bounce: 3,
            max_bounce: 12,
            max_diffuse_bounce: 4,
            max_glossy_bounce: 4,
            max_transmission_bounce: 12,
            max_volume_bounce: 2,
            transparent_min_bounce: 8,
            transparent_max_bounce: 8,
            transparent_shadows: true,
            use_volumes: true,
            filter_glossy: 0.0,
            sample_clamp_direct: 0.0,
            sample_clamp_indirect: 0.0,
            ao_bounces: 0,
            ao_bounces_distance: 0.0,
        }
    }
}

/// World background settings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BackgroundSettings {
    /// Background surface shader; `None` renders black.
    pub shader: Option<usize>,

    /// Camera rays that miss write transparent alpha instead of the
    /// background.
    pub transparent: bool,

    /// Strength of ambient occlusion lighting; 0 disables it.
    pub ao_factor: Float,

    /// Maximum distance of ambient occlusion rays.
    pub ao_distance: Float,
}

impl Default for BackgroundSettings {
    fn default() -> Self {
        Self {
            shader: None,
            transparent: false,
            ao_factor: 0.0,
            ao_distance: FLT_MAX,
        }
    }
}
