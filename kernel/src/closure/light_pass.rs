//! Light passes

use super::{Closure, Label};
use crate::math::*;
use crate::spectrum::*;

/// Number of scattering classes light is split into.
pub const NUM_LIGHT_PASSES: usize = 5;

/// Scattering class a contribution is attributed to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LightPass {
    Diffuse = 0,
    Glossy = 1,
    Transmission = 2,
    Subsurface = 3,
    Scatter = 4,
}

impl LightPass {
    /// Every class in buffer order.
    pub const ALL: [LightPass; NUM_LIGHT_PASSES] = [
        LightPass::Diffuse,
        LightPass::Glossy,
        LightPass::Transmission,
        LightPass::Subsurface,
        LightPass::Scatter,
    ];

    /// Class of a sampled scattering event. Transparent pass-through has
    /// none.
    ///
    /// * `label` - Sampled event.
    pub fn from_label(label: Label) -> Option<Self> {
        if label.is_none() || label.contains(Label::TRANSPARENT) {
            None
        } else if label.contains(Label::VOLUME_SCATTER) {
            Some(Self::Scatter)
        } else if label.contains(Label::TRANSMIT) {
            Some(Self::Transmission)
        } else if label.intersects(Label::GLOSSY | Label::SINGULAR) {
            Some(Self::Glossy)
        } else {
            Some(Self::Diffuse)
        }
    }
}

impl Closure {
    /// Class this closure's scattering is attributed to.
    pub fn light_pass(&self) -> Option<LightPass> {
        match self {
            Self::Diffuse { .. } | Self::OrenNayar { .. } => Some(LightPass::Diffuse),
            Self::Microfacet { .. } | Self::Reflection { .. } => Some(LightPass::Glossy),
            Self::Translucent { .. }
            | Self::MicrofacetRefraction { .. }
            | Self::Refraction { .. }
            | Self::Transparent => Some(LightPass::Transmission),
            Self::Subsurface { .. } => Some(LightPass::Subsurface),
            Self::VolumeHenyeyGreenstein { .. } => Some(LightPass::Scatter),
            _ => None,
        }
    }
}

/// A BSDF or phase evaluation. With light passes enabled every class is
/// kept apart; otherwise everything lands in the diffuse slot.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BsdfEval {
    use_light_pass: bool,

    /// Value per class, indexed by `LightPass`.
    pub passes: [Spectrum; NUM_LIGHT_PASSES],
}

impl BsdfEval {
    /// Empty evaluation.
    ///
    /// * `use_light_pass` - Keep classes apart.
    pub fn new(use_light_pass: bool) -> Self {
        Self {
            use_light_pass,
            passes: [Spectrum::zero(); NUM_LIGHT_PASSES],
        }
    }

    /// Evaluation with a single class.
    ///
    /// * `use_light_pass` - Keep classes apart.
    /// * `pass`           - Class.
    /// * `value`          - Value.
    pub fn single(use_light_pass: bool, pass: LightPass, value: Spectrum) -> Self {
        let mut eval = Self::new(use_light_pass);
        eval.accum(pass, value);
        eval
    }

    /// Add a value to a class.
    ///
    /// * `pass`  - Class.
    /// * `value` - Value.
    pub fn accum(&mut self, pass: LightPass, value: Spectrum) {
        let index = if self.use_light_pass { pass as usize } else { 0 };
        self.passes[index] += value;
    }

    /// Value of a class.
    ///
    /// * `pass` - Class.
    pub fn get(&self, pass: LightPass) -> Spectrum {
        self.passes[pass as usize]
    }

    /// Scale every class.
    ///
    /// * `f` - Factor.
    pub fn scale(&mut self, f: Float) {
        for p in self.passes.iter_mut() {
            *p *= f;
        }
    }

    /// Combined value of every class.
    pub fn sum(&self) -> Spectrum {
        self.passes.iter().fold(Spectrum::zero(), |acc, p| acc + *p)
    }

    /// Returns true if every class is black.
    pub fn is_black(&self) -> bool {
        self.passes.iter().all(Spectrum::is_black)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::*;

    #[test]
    fn classes_stay_apart_only_with_light_passes() {
        let mut split = BsdfEval::new(true);
        split.accum(LightPass::Glossy, Spectrum::new(0.5));
        split.accum(LightPass::Diffuse, Spectrum::new(0.25));
        assert_eq!(split.get(LightPass::Glossy), Spectrum::new(0.5));
        assert_eq!(split.sum(), Spectrum::new(0.75));

        let mut merged = BsdfEval::new(false);
        merged.accum(LightPass::Glossy, Spectrum::new(0.5));
        merged.accum(LightPass::Diffuse, Spectrum::new(0.25));
        assert_eq!(merged.get(LightPass::Glossy), Spectrum::zero());
        assert_eq!(merged.get(LightPass::Diffuse), Spectrum::new(0.75));
        assert_eq!(merged.sum(), split.sum());

        split.scale(2.0);
        assert_eq!(split.sum(), Spectrum::new(1.5));
        assert!(BsdfEval::new(true).is_black());
    }

    #[test]
    fn labels_map_to_classes() {
        assert_eq!(
            LightPass::from_label(Label::REFLECT | Label::DIFFUSE),
            Some(LightPass::Diffuse)
        );
        assert_eq!(
            LightPass::from_label(Label::REFLECT | Label::SINGULAR),
            Some(LightPass::Glossy)
        );
        assert_eq!(
            LightPass::from_label(Label::TRANSMIT | Label::GLOSSY),
            Some(LightPass::Transmission)
        );
        assert_eq!(LightPass::from_label(Label::VOLUME_SCATTER), Some(LightPass::Scatter));
        assert_eq!(LightPass::from_label(Label::TRANSMIT | Label::TRANSPARENT), None);
        assert_eq!(LightPass::from_label(Label::NONE), None);

        let n = Normal3f::new(0.0, 0.0, 1.0);
        assert_eq!(Closure::microfacet(n, 0.3).light_pass(), Some(LightPass::Glossy));
        assert_eq!(Closure::Translucent { n }.light_pass(), Some(LightPass::Transmission));
        assert_eq!(Closure::Emission.light_pass(), None);
    }
}
