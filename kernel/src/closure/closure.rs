//! Closures

use crate::geometry::*;
use crate::math::*;
use crate::spectrum::*;

/// Closures with a smaller sample weight are not added to a shading point.
pub const CLOSURE_WEIGHT_CUTOFF: Float = 1e-5;

/// Roughness below which microfacet distributions are treated as singular.
pub const MICROFACET_SINGULAR_ALPHA: Float = 1e-4;

/// Scattering model and its parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Closure {
    /// Lambertian reflection.
    Diffuse { n: Normal3f },

    /// Oren-Nayar rough diffuse reflection with precomputed `a` and `b`.
    OrenNayar { n: Normal3f, a: Float, b: Float },

    /// Lambertian transmission.
    Translucent { n: Normal3f },

    /// GGX microfacet reflection.
    Microfacet { n: Normal3f, alpha: Float },

    /// GGX microfacet refraction.
    MicrofacetRefraction { n: Normal3f, alpha: Float, ior: Float },

    /// Perfect specular reflection.
    Reflection { n: Normal3f },

    /// Perfect specular refraction.
    Refraction { n: Normal3f, ior: Float },

    /// Straight pass-through.
    Transparent,

    /// Subsurface scattering profile.
    Subsurface {
        n: Normal3f,
        radius: Spectrum,
        texture_blur: Float,
    },

    /// Emitted radiance.
    Emission,

    /// Background radiance.
    Background,

    /// Holdout mask.
    Holdout,

    /// Ambient occlusion.
    AmbientOcclusion,

    /// Henyey-Greenstein volume phase function.
    VolumeHenyeyGreenstein { g: Float },

    /// Volume absorption.
    VolumeAbsorption,
}

impl Closure {
    /// Oren-Nayar closure for a given roughness in [0, 1].
    ///
    /// * `n`     - Shading normal.
    /// * `sigma` - Roughness.
    pub fn oren_nayar(n: Normal3f, sigma: Float) -> Self {
        let sigma = saturate(sigma);
        let div = 1.0 / (PI + ((3.0 * PI - 4.0) / 6.0) * sigma);
        Self::OrenNayar {
            n,
            a: 1.0 * div,
            b: sigma * div,
        }
    }

    /// Microfacet reflection with a perceptual roughness.
    ///
    /// * `n`         - Shading normal.
    /// * `roughness` - Roughness in [0, 1].
    pub fn microfacet(n: Normal3f, roughness: Float) -> Self {
        Self::Microfacet {
            n,
            alpha: saturate(roughness) * saturate(roughness),
        }
    }

    /// Returns true for surface scattering closures.
    pub fn is_bsdf(&self) -> bool {
        matches!(
            self,
            Self::Diffuse { .. }
                | Self::OrenNayar { .. }
                | Self::Translucent { .. }
                | Self::Microfacet { .. }
                | Self::MicrofacetRefraction { .. }
                | Self::Reflection { .. }
                | Self::Refraction { .. }
                | Self::Transparent
        )
    }

    /// Returns true for diffuse reflection closures.
    pub fn is_bsdf_diffuse(&self) -> bool {
        matches!(self, Self::Diffuse { .. } | Self::OrenNayar { .. })
    }

    /// Returns true for glossy reflection closures.
    pub fn is_bsdf_glossy(&self) -> bool {
        matches!(self, Self::Microfacet { .. } | Self::Reflection { .. })
    }

    /// Returns true for transmission closures other than transparency.
    pub fn is_bsdf_transmission(&self) -> bool {
        matches!(
            self,
            Self::Translucent { .. } | Self::MicrofacetRefraction { .. } | Self::Refraction { .. }
        )
    }

    /// Returns true for singular closures whose PDF is a delta.
    pub fn is_bsdf_singular(&self) -> bool {
        match self {
            Self::Reflection { .. } | Self::Refraction { .. } | Self::Transparent => true,
            Self::Microfacet { alpha, .. } | Self::MicrofacetRefraction { alpha, .. } => {
                *alpha <= MICROFACET_SINGULAR_ALPHA
            }
            _ => false,
        }
    }

    /// Returns true for the transparent closure.
    pub fn is_transparent(&self) -> bool {
        matches!(self, Self::Transparent)
    }

    /// Returns true for subsurface closures.
    pub fn is_bssrdf(&self) -> bool {
        matches!(self, Self::Subsurface { .. })
    }

    /// Returns true for emission.
    pub fn is_emission(&self) -> bool {
        matches!(self, Self::Emission)
    }

    /// Returns true for background.
    pub fn is_background(&self) -> bool {
        matches!(self, Self::Background)
    }

    /// Returns true for holdout.
    pub fn is_holdout(&self) -> bool {
        matches!(self, Self::Holdout)
    }

    /// Returns true for ambient occlusion.
    pub fn is_ambient_occlusion(&self) -> bool {
        matches!(self, Self::AmbientOcclusion)
    }

    /// Returns true for volume phase functions.
    pub fn is_phase(&self) -> bool {
        matches!(self, Self::VolumeHenyeyGreenstein { .. })
    }

    /// Returns true for any volume closure.
    pub fn is_volume(&self) -> bool {
        matches!(
            self,
            Self::VolumeHenyeyGreenstein { .. } | Self::VolumeAbsorption
        )
    }

    /// Returns true if two closures of the same model can be combined into
    /// one by summing weights.
    ///
    /// * `other` - The other closure.
    pub fn can_merge(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Subsurface {
                    n: n1,
                    radius: r1,
                    texture_blur: b1,
                },
                Self::Subsurface {
                    n: n2,
                    radius: r2,
                    texture_blur: b2,
                },
            ) => n1 == n2 && r1 == r2 && b1 == b2,
            _ => self == other,
        }
    }

    /// Shading normal or `None` for closures that have no normal.
    pub fn normal(&self) -> Option<Normal3f> {
        match self {
            Self::Diffuse { n }
            | Self::OrenNayar { n, .. }
            | Self::Translucent { n }
            | Self::Microfacet { n, .. }
            | Self::MicrofacetRefraction { n, .. }
            | Self::Reflection { n }
            | Self::Refraction { n, .. }
            | Self::Subsurface { n, .. } => Some(*n),
            _ => None,
        }
    }

    /// Increase roughness to reduce noise from glossy paths after diffuse
    /// bounces.
    ///
    /// * `roughness` - Minimum roughness.
    pub fn blur(&mut self, roughness: Float) {
        match self {
            Self::Microfacet { alpha, .. } | Self::MicrofacetRefraction { alpha, .. } => {
                *alpha = alpha.max(roughness);
            }
            Self::Reflection { n } => {
                *self = Self::Microfacet {
                    n: *n,
                    alpha: roughness,
                };
            }
            _ => (),
        }
    }
}

/// A weighted closure in the shading point's closure array.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShaderClosure {
    /// Multiplier applied to the closure's evaluation.
    pub weight: Spectrum,

    /// Selection weight used during closure sampling.
    pub sample_weight: Float,

    /// The scattering model.
    pub model: Closure,
}

impl ShaderClosure {
    /// Create a closure whose sample weight is the absolute average of the
    /// weight.
    ///
    /// * `model`  - Scattering model.
    /// * `weight` - Weight.
    pub fn new(model: Closure, weight: Spectrum) -> Self {
        Self {
            weight,
            sample_weight: weight.average().abs(),
            model,
        }
    }

    /// Returns true if the closure is too weak to keep.
    pub fn below_cutoff(&self) -> bool {
        self.sample_weight <= CLOSURE_WEIGHT_CUTOFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_exclusive() {
        let n = Normal3f::new(0.0, 0.0, 1.0);
        let diffuse = Closure::Diffuse { n };
        assert!(diffuse.is_bsdf() && diffuse.is_bsdf_diffuse());
        assert!(!diffuse.is_bsdf_glossy() && !diffuse.is_bsdf_transmission());

        let glass = Closure::Refraction { n, ior: 1.5 };
        assert!(glass.is_bsdf_transmission() && glass.is_bsdf_singular());

        assert!(Closure::Transparent.is_bsdf());
        assert!(!Closure::Emission.is_bsdf());
        assert!(Closure::VolumeHenyeyGreenstein { g: 0.0 }.is_phase());
        assert!(!Closure::VolumeAbsorption.is_phase());
    }

    #[test]
    fn merge_requires_equal_parameters() {
        let n = Normal3f::new(0.0, 0.0, 1.0);
        let m = Normal3f::new(0.0, 1.0, 0.0);
        assert!(Closure::Diffuse { n }.can_merge(&Closure::Diffuse { n }));
        assert!(!Closure::Diffuse { n }.can_merge(&Closure::Diffuse { n: m }));
        assert!(!Closure::Diffuse { n }.can_merge(&Closure::Translucent { n }));
        assert!(Closure::Emission.can_merge(&Closure::Emission));
    }

    #[test]
    fn sample_weight_is_absolute_average() {
        let sc = ShaderClosure::new(Closure::Holdout, Spectrum::rgb(-0.3, -0.3, -0.3));
        assert!((sc.sample_weight - 0.3).abs() < 1e-6);
    }

    #[test]
    fn blur_roughens_specular() {
        let n = Normal3f::new(0.0, 0.0, 1.0);
        let mut c = Closure::Reflection { n };
        c.blur(0.25);
        assert_eq!(c, Closure::Microfacet { n, alpha: 0.25 });
    }
}
