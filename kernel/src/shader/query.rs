//! Closure sampling, evaluation and queries

use super::*;
use crate::closure::*;
use crate::geometry::*;
use crate::math::*;
use crate::spectrum::*;

impl ShaderData {
    /// Evaluate all BSDF closures except `skip` and combine their PDFs with
    /// the balance heuristic, seeded with an already evaluated closure.
    fn bsdf_multi_eval(
        &self,
        omega_in: &Vector3f,
        skip: Option<usize>,
        mut eval: Spectrum,
        mut sum_pdf: Float,
        mut sum_sample_weight: Float,
    ) -> (Spectrum, Float) {
        for (i, sc) in self.closures.iter().enumerate() {
            if Some(i) == skip || !sc.model.is_bsdf() {
                continue;
            }
            let (e, pdf) = sc.model.bsdf_eval(&self.ng, &self.i, omega_in);
            if pdf != 0.0 {
                eval += e * sc.weight;
                sum_pdf += pdf * sc.sample_weight;
            }
            sum_sample_weight += sc.sample_weight;
        }
        let pdf = if sum_sample_weight > 0.0 {
            sum_pdf / sum_sample_weight
        } else {
            0.0
        };
        (eval, pdf)
    }

    /// Evaluate the BSDF for light arriving from `omega_in`. Returns the
    /// weighted evaluation and its PDF, with the evaluation multiplied by
    /// the power heuristic against `light_pdf` when `use_mis` is set.
    ///
    /// * `omega_in`  - Direction towards the light.
    /// * `light_pdf` - PDF of the light sample.
    /// * `use_mis`   - Apply multiple importance sampling.
    pub fn bsdf_eval(&self, omega_in: &Vector3f, light_pdf: Float, use_mis: bool) -> (Spectrum, Float) {
        let (eval, pdf) = self.bsdf_eval_passes(omega_in, light_pdf, use_mis, false);
        (eval.sum(), pdf)
    }

    /// Like `bsdf_eval`, keeping the contribution of each closure class
    /// apart when `use_light_pass` is set.
    ///
    /// * `omega_in`       - Direction towards the light.
    /// * `light_pdf`      - PDF of the light sample.
    /// * `use_mis`        - Apply multiple importance sampling.
    /// * `use_light_pass` - Split the evaluation by closure class.
    pub fn bsdf_eval_passes(
        &self,
        omega_in: &Vector3f,
        light_pdf: Float,
        use_mis: bool,
        use_light_pass: bool,
    ) -> (BsdfEval, Float) {
        let mut eval = BsdfEval::new(use_light_pass);
        let mut sum_pdf = 0.0;
        let mut sum_sample_weight = 0.0;
        for sc in self.closures.iter().filter(|sc| sc.model.is_bsdf()) {
            let (e, pdf) = sc.model.bsdf_eval(&self.ng, &self.i, omega_in);
            if pdf != 0.0 {
                if let Some(pass) = sc.model.light_pass() {
                    eval.accum(pass, e * sc.weight);
                }
                sum_pdf += pdf * sc.sample_weight;
            }
            sum_sample_weight += sc.sample_weight;
        }
        let pdf = if sum_sample_weight > 0.0 {
            sum_pdf / sum_sample_weight
        } else {
            0.0
        };
        if use_mis {
            eval.scale(power_heuristic(light_pdf, pdf));
        }
        (eval, pdf)
    }

    /// Pick a BSDF closure proportionally to its sample weight with
    /// `randb_closure` and sample a direction from it. The evaluation and
    /// PDF include every other BSDF closure at the sampled direction.
    ///
    /// * `u` - First random number.
    /// * `v` - Second random number.
    pub fn bsdf_sample(&self, u: Float, v: Float) -> BsdfSample {
        let picked = if self.closures.len() > 1 {
            let sum: Float = self
                .closures
                .iter()
                .filter(|sc| sc.model.is_bsdf())
                .map(|sc| sc.sample_weight)
                .sum();
            let r = self.randb_closure * sum;
            let mut acc = 0.0;
            self.closures.iter().position(|sc| {
                if !sc.model.is_bsdf() {
                    return false;
                }
                acc += sc.sample_weight;
                r <= acc
            })
        } else {
            Some(0)
        };

        let Some((index, sc)) = picked.and_then(|i| self.closures.get(i).map(|sc| (i, sc))) else {
            return BsdfSample::none();
        };
        if !sc.model.is_bsdf() {
            return BsdfSample::none();
        }

        let mut sample = sc.model.bsdf_sample(&self.ng, &self.i, &self.di, u, v);
        if sample.pdf != 0.0 {
            sample.eval = sample.eval * sc.weight;
            if self.closures.len() > 1 {
                let sw = sc.sample_weight;
                let (eval, pdf) =
                    self.bsdf_multi_eval(&sample.omega_in, Some(index), sample.eval, sample.pdf * sw, sw);
                sample.eval = eval;
                sample.pdf = pdf;
            }
        }
        sample
    }

    /// Sample a direction from one given closure only.
    ///
    /// * `sc` - The closure.
    /// * `u`  - First random number.
    /// * `v`  - Second random number.
    pub fn sample_closure(&self, sc: &ShaderClosure, u: Float, v: Float) -> BsdfSample {
        let mut sample = sc.model.bsdf_sample(&self.ng, &self.i, &self.di, u, v);
        if sample.pdf != 0.0 {
            sample.eval = sample.eval * sc.weight;
        }
        sample
    }

    /// Roughen glossy closures.
    ///
    /// * `roughness` - Minimum roughness.
    pub fn bsdf_blur(&mut self, roughness: Float) {
        for sc in self.closures.iter_mut().filter(|sc| sc.model.is_bsdf()) {
            sc.model.blur(roughness);
        }
    }

    /// Sum of the transparent closure weights. Volume-only shaders are fully
    /// transparent.
    pub fn transparency(&self) -> Spectrum {
        if self.shader_flag.contains(ShaderFlags::HAS_ONLY_VOLUME) {
            return Spectrum::one();
        }
        self.sum_weights(|c| c.is_transparent())
    }

    /// Remove the contribution of transparent closures.
    pub fn disable_transparency(&mut self) {
        for sc in self.closures.iter_mut().filter(|sc| sc.model.is_transparent()) {
            sc.weight = Spectrum::zero();
            sc.sample_weight = 0.0;
        }
    }

    /// Opacity of the surface, clamped to [0, 1].
    pub fn alpha(&self) -> Spectrum {
        (Spectrum::one() - self.transparency()).clamp(0.0, 1.0)
    }

    /// Sum of diffuse closure weights.
    pub fn diffuse(&self) -> Spectrum {
        self.sum_weights(|c| c.is_bsdf_diffuse())
    }

    /// Sum of glossy closure weights.
    pub fn glossy(&self) -> Spectrum {
        self.sum_weights(|c| c.is_bsdf_glossy())
    }

    /// Sum of transmission closure weights.
    pub fn transmission(&self) -> Spectrum {
        self.sum_weights(|c| c.is_bsdf_transmission())
    }

    /// Sum of subsurface closure weights.
    pub fn subsurface(&self) -> Spectrum {
        self.sum_weights(|c| c.is_bssrdf())
    }

    /// Ambient occlusion weight and the normal to trace occlusion rays
    /// around. Diffuse closures count with `ao_factor`.
    ///
    /// * `ao_factor` - Strength of ambient occlusion on diffuse closures.
    pub fn ao(&self, ao_factor: Float) -> (Spectrum, Normal3f) {
        let mut eval = Spectrum::zero();
        let mut n = Normal3f::zero();
        for sc in self.closures.iter() {
            if sc.model.is_bsdf_diffuse() {
                eval += sc.weight * ao_factor;
                n += sc.model.normal().unwrap_or(self.n) * sc.weight.average();
            } else if sc.model.is_ambient_occlusion() {
                eval += sc.weight;
                n += self.n * sc.weight.average();
            }
        }
        let n = if n.is_zero() { self.n } else { n.normalize() };
        (eval, n)
    }

    /// Sum of subsurface closure weights with their weighted average normal
    /// and texture blur.
    pub fn bssrdf_sum(&self) -> (Spectrum, Normal3f, Float) {
        let mut eval = Spectrum::zero();
        let mut n = Normal3f::zero();
        let mut texture_blur = 0.0;
        let mut weight_sum = 0.0;
        for sc in self.closures.iter() {
            if let Closure::Subsurface {
                n: sn,
                texture_blur: blur,
                ..
            } = sc.model
            {
                let avg = sc.weight.average().abs();
                n += sn * avg;
                eval += sc.weight;
                texture_blur += blur * avg;
                weight_sum += avg;
            }
        }
        let n = if n.is_zero() { self.n } else { n.normalize() };
        (eval, n, safe_divide(texture_blur, weight_sum))
    }

    /// Emitted radiance towards the viewer. Emission is two sided and zero
    /// at grazing angles.
    pub fn emissive_eval(&self) -> Spectrum {
        if self.ng.dot(&self.i).abs() <= 0.0 {
            return Spectrum::zero();
        }
        self.sum_weights(|c| c.is_emission())
    }

    /// Sum of holdout closure weights.
    pub fn holdout_eval(&self) -> Spectrum {
        self.sum_weights(|c| c.is_holdout())
    }

    /// Sum of background closure weights.
    pub fn background_eval(&self) -> Spectrum {
        self.sum_weights(|c| c.is_background())
    }

    fn phase_multi_eval(
        &self,
        omega_in: &Vector3f,
        skip: Option<usize>,
        mut eval: Spectrum,
        mut sum_pdf: Float,
        mut sum_sample_weight: Float,
    ) -> (Spectrum, Float) {
        for (i, sc) in self.closures.iter().enumerate() {
            if Some(i) == skip || !sc.model.is_phase() {
                continue;
            }
            let (e, pdf) = sc.model.phase_eval(&self.i, omega_in);
            if pdf != 0.0 {
                eval += e;
                sum_pdf += pdf * sc.sample_weight;
            }
            sum_sample_weight += sc.sample_weight;
        }
        let pdf = if sum_sample_weight > 0.0 {
            sum_pdf / sum_sample_weight
        } else {
            0.0
        };
        (eval, pdf)
    }

    /// Evaluate the phase functions for a scattered direction. The
    /// scattering coefficient is applied by the caller.
    ///
    /// * `omega_in` - Scattered direction.
    pub fn volume_phase_eval(&self, omega_in: &Vector3f) -> (Spectrum, Float) {
        self.phase_multi_eval(omega_in, None, Spectrum::zero(), 0.0, 0.0)
    }

    /// Pick a phase closure proportionally to its sample weight and sample
    /// a scattered direction from it.
    ///
    /// * `u` - First random number.
    /// * `v` - Second random number.
    pub fn volume_phase_sample(&self, u: Float, v: Float) -> BsdfSample {
        let picked = if self.closures.len() > 1 {
            let sum: Float = self
                .closures
                .iter()
                .filter(|sc| sc.model.is_phase())
                .map(|sc| sc.sample_weight)
                .sum();
            let r = self.randb_closure * sum;
            let mut acc = 0.0;
            self.closures.iter().position(|sc| {
                if !sc.model.is_phase() {
                    return false;
                }
                acc += sc.sample_weight;
                r <= acc
            })
        } else {
            Some(0)
        };

        match picked.and_then(|i| self.closures.get(i)) {
            Some(sc) if sc.model.is_phase() => self.phase_sample_closure(sc, u, v),
            _ => BsdfSample::none(),
        }
    }

    /// Sample a scattered direction from one given phase closure.
    ///
    /// * `sc` - The closure.
    /// * `u`  - First random number.
    /// * `v`  - Second random number.
    pub fn phase_sample_closure(&self, sc: &ShaderClosure, u: Float, v: Float) -> BsdfSample {
        sc.model.phase_sample(&self.i, &self.di, u, v)
    }

    /// Extinction coefficient and scattering coefficient of the volume
    /// closures.
    pub fn volume_extinction(&self) -> (Spectrum, Spectrum) {
        let scatter = self.sum_weights(|c| c.is_phase());
        let absorption = self.sum_weights(|c| matches!(c, Closure::VolumeAbsorption));
        (absorption + scatter, scatter)
    }

    /// Merge closures of the same model with equal parameters, keeping the
    /// order of the rest.
    pub fn merge_closures(&mut self) {
        self.closures.merge_identical();
    }

    fn sum_weights<F: Fn(&Closure) -> bool>(&self, filter: F) -> Spectrum {
        self.closures
            .iter()
            .filter(|sc| filter(&sc.model))
            .fold(Spectrum::zero(), |acc, sc| acc + sc.weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    fn shading_point() -> ShaderData {
        let mut sd = ShaderData::default();
        sd.n = Normal3f::new(0.0, 0.0, 1.0);
        sd.ng = sd.n;
        sd.i = Vector3f::new(0.0, 0.6, 0.8);
        sd
    }

    fn up() -> Normal3f {
        Normal3f::new(0.0, 0.0, 1.0)
    }

    #[test]
    fn eval_pdf_is_sample_weight_normalized() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.75));
        sd.add_closure(Closure::microfacet(up(), 0.5), Spectrum::new(0.25));

        let omega_in = Vector3f::new(0.0, -0.6, 0.8);
        let (_, p0) = Closure::Diffuse { n: up() }.bsdf_eval(&sd.ng, &sd.i, &omega_in);
        let (_, p1) = Closure::microfacet(up(), 0.5).bsdf_eval(&sd.ng, &sd.i, &omega_in);
        let (eval, pdf) = sd.bsdf_eval(&omega_in, 0.0, false);

        assert!(approx_eq!(f32, pdf, 0.75 * p0 + 0.25 * p1, epsilon = 1e-5));
        assert!(eval.average() > 0.0);
    }

    #[test]
    fn mis_scales_evaluation() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::one());
        let omega_in = Vector3f::new(0.0, 0.0, 1.0);
        let (plain, pdf) = sd.bsdf_eval(&omega_in, 0.0, false);
        let (mis, _) = sd.bsdf_eval(&omega_in, pdf, true);
        assert!(approx_eq!(f32, mis.r(), plain.r() * 0.5, epsilon = 1e-5));
    }

    #[test]
    fn light_pass_split_sums_to_combined() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.5));
        sd.add_closure(Closure::microfacet(up(), 0.5), Spectrum::new(0.3));
        sd.add_closure(Closure::Translucent { n: up() }, Spectrum::new(0.2));

        let omega_in = Vector3f::new(0.0, -0.6, 0.8);
        let (combined, pdf) = sd.bsdf_eval(&omega_in, 0.5, true);
        let (split, split_pdf) = sd.bsdf_eval_passes(&omega_in, 0.5, true, true);
        assert_eq!(pdf, split_pdf);
        for c in 0..3 {
            assert!(approx_eq!(f32, split.sum()[c], combined[c], epsilon = 1e-6));
        }

        let (diffuse, _) = Closure::Diffuse { n: up() }.bsdf_eval(&sd.ng, &sd.i, &omega_in);
        let mis = power_heuristic(0.5, pdf);
        assert!(approx_eq!(f32, split.get(LightPass::Diffuse).r(), diffuse.r() * 0.5 * mis, epsilon = 1e-6));
        assert!(split.get(LightPass::Glossy).r() > 0.0);
        // Light from above the surface does not pass through it.
        assert!(split.get(LightPass::Transmission).is_black());
    }

    #[test]
    fn sampled_pdf_includes_other_lobes() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.5));
        sd.add_closure(Closure::microfacet(up(), 0.3), Spectrum::new(0.5));

        sd.randb_closure = 0.1;
        let s = sd.bsdf_sample(0.3, 0.7);
        assert!(s.label.contains(Label::DIFFUSE));
        let (single_eval, single_pdf) = Closure::Diffuse { n: up() }.bsdf_eval(&sd.ng, &sd.i, &s.omega_in);
        let (full_eval, full) = sd.bsdf_eval(&s.omega_in, 0.0, false);
        assert!(approx_eq!(f32, s.pdf, full, epsilon = 1e-4));
        assert!(approx_eq!(f32, s.eval.r(), full_eval.r(), epsilon = 1e-4));
        assert!(s.pdf >= 0.5 * single_pdf - 1e-6);
        assert!(s.eval.r() >= 0.5 * single_eval.r() - 1e-6);
    }

    #[test]
    fn non_bsdf_closures_are_never_picked() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Emission, Spectrum::new(5.0));
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.5));
        sd.randb_closure = 0.0;
        let s = sd.bsdf_sample(0.5, 0.5);
        assert!(s.label.contains(Label::DIFFUSE));

        let mut only = shading_point();
        only.add_closure(Closure::Emission, Spectrum::new(5.0));
        assert!(only.bsdf_sample(0.5, 0.5).label.is_none());
    }

    #[test]
    fn sample_closure_ignores_other_lobes() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.5));
        sd.add_closure(Closure::microfacet(up(), 0.3), Spectrum::new(0.5));
        let first = sd.closures.iter().next().copied();
        let Some(sc) = first else {
            panic!("expected a closure");
        };

        let s = sd.sample_closure(&sc, 0.3, 0.7);
        assert!(s.label.contains(Label::DIFFUSE));
        let (eval, pdf) = sc.model.bsdf_eval(&sd.ng, &sd.i, &s.omega_in);
        assert!(approx_eq!(f32, s.pdf, pdf, epsilon = 1e-4));
        assert!(approx_eq!(f32, s.eval.r(), eval.r() * 0.5, epsilon = 1e-4));
    }

    #[test]
    fn draw_past_every_closure_is_no_event() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.5));
        sd.add_closure(Closure::Holdout, Spectrum::new(0.5));
        sd.randb_closure = 1.5;
        let s = sd.bsdf_sample(0.5, 0.5);
        assert!(s.label.is_none());
        assert_eq!(s.pdf, 0.0);
    }

    #[test]
    fn transparency_and_alpha() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Transparent, Spectrum::new(0.25));
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.75));
        assert_eq!(sd.transparency(), Spectrum::new(0.25));
        assert_eq!(sd.alpha(), Spectrum::new(0.75));
        assert!(sd.runtime_flag.contains(RuntimeFlags::TRANSPARENT));

        sd.disable_transparency();
        assert!(sd.transparency().is_black());

        sd.shader_flag |= ShaderFlags::HAS_ONLY_VOLUME;
        assert_eq!(sd.transparency(), Spectrum::one());
        assert!(sd.alpha().is_black());
    }

    #[test]
    fn query_totals_survive_merge() {
        let mut sd = shading_point();
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.2));
        sd.add_closure(Closure::microfacet(up(), 0.4), Spectrum::new(0.3));
        sd.add_closure(Closure::Diffuse { n: up() }, Spectrum::new(0.1));
        sd.add_closure(Closure::Emission, Spectrum::new(2.0));
        let before = (sd.diffuse(), sd.glossy(), sd.emissive_eval());
        sd.merge_closures();
        assert_eq!(sd.closures.len(), 3);
        let after = (sd.diffuse(), sd.glossy(), sd.emissive_eval());
        assert!(approx_eq!(f32, before.0.r(), after.0.r(), epsilon = 1e-6));
        assert_eq!(before.1, after.1);
        assert_eq!(before.2, after.2);
    }

    #[test]
    fn ao_normal_falls_back_to_shading_normal() {
        let mut sd = shading_point();
        let (eval, n) = sd.ao(1.0);
        assert!(eval.is_black());
        assert_eq!(n, sd.n);

        let tilted = Normal3f::new(0.6, 0.0, 0.8);
        sd.add_closure(Closure::Diffuse { n: tilted }, Spectrum::new(0.5));
        let (eval, n) = sd.ao(0.5);
        assert_eq!(eval, Spectrum::new(0.25));
        assert!(approx_eq!(f32, n.x, 0.6, epsilon = 1e-5));
    }

    #[test]
    fn bssrdf_sum_averages_blur() {
        let mut sd = shading_point();
        let radius = Spectrum::one();
        sd.add_closure(Closure::Subsurface { n: up(), radius, texture_blur: 1.0 }, Spectrum::new(0.5));
        sd.add_closure(Closure::Subsurface { n: up(), radius, texture_blur: 0.0 }, Spectrum::new(0.5));
        let (eval, n, blur) = sd.bssrdf_sum();
        assert_eq!(eval, Spectrum::one());
        assert_eq!(n, up());
        assert!(approx_eq!(f32, blur, 0.5, epsilon = 1e-6));
        assert!(sd.runtime_flag.contains(RuntimeFlags::BSSRDF));
    }

    #[test]
    fn phase_sample_matches_eval() {
        let mut sd = shading_point();
        sd.add_closure(Closure::VolumeHenyeyGreenstein { g: 0.4 }, Spectrum::new(0.3));
        sd.add_closure(Closure::VolumeAbsorption, Spectrum::new(0.2));
        sd.randb_closure = 0.5;
        let s = sd.volume_phase_sample(0.25, 0.75);
        assert!(s.label.contains(Label::VOLUME_SCATTER));
        let (_, pdf) = sd.volume_phase_eval(&s.omega_in);
        assert!(approx_eq!(f32, s.pdf, pdf, epsilon = 1e-4));

        let (sigma_t, sigma_s) = sd.volume_extinction();
        assert!(approx_eq!(f32, sigma_t.r(), 0.5, epsilon = 1e-6));
        assert!(approx_eq!(f32, sigma_s.r(), 0.3, epsilon = 1e-6));
    }

    proptest! {
        #[test]
        fn combined_pdf_dominates_each_lobe_share(
            randb in 0.0f32..1.0,
            u in 0.0f32..1.0,
            v in 0.0f32..1.0,
            w in 0.05f32..1.0,
        ) {
            let diffuse = Closure::Diffuse { n: up() };
            let glossy = Closure::microfacet(up(), 0.4);
            let mut sd = shading_point();
            sd.add_closure(diffuse, Spectrum::new(w));
            sd.add_closure(glossy, Spectrum::new(1.05 - w));
            sd.randb_closure = randb;

            let s = sd.bsdf_sample(u, v);
            if s.pdf > 0.0 {
                let total = w + (1.05 - w);
                let (_, p0) = diffuse.bsdf_eval(&sd.ng, &sd.i, &s.omega_in);
                let (_, p1) = glossy.bsdf_eval(&sd.ng, &sd.i, &s.omega_in);
                let share = (p0 * w).max(p1 * (1.05 - w)) / total;
                prop_assert!(s.pdf >= share * (1.0 - 1e-4));

                let (_, full) = sd.bsdf_eval(&s.omega_in, 0.0, false);
                prop_assert!((s.pdf - full).abs() <= 1e-3 * full.max(1.0));
            }
        }
    }
}
