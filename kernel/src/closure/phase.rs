//! Volume phase functions

use super::*;
use crate::geometry::*;
use crate::math::*;
use crate::spectrum::*;

/// Henyey-Greenstein phase function for the angle between the propagation
/// direction and the scattered direction.
///
/// * `cos_theta` - Cosine of the scattering angle.
/// * `g`         - Anisotropy in (-1, 1).
pub fn henyey_greenstein(cos_theta: Float, g: Float) -> Float {
    let denom = 1.0 + g * g - 2.0 * g * cos_theta;
    (1.0 - g * g) / (denom * denom.sqrt()) * INV_FOUR_PI
}

impl Closure {
    /// Evaluate a phase closure. Returns the evaluation and PDF.
    ///
    /// * `i`        - Direction towards the viewer.
    /// * `omega_in` - Scattered direction.
    pub fn phase_eval(&self, i: &Vector3f, omega_in: &Vector3f) -> (Spectrum, Float) {
        match *self {
            Self::VolumeHenyeyGreenstein { g } => {
                let p = henyey_greenstein((-*i).dot(omega_in), g);
                (Spectrum::new(p), p)
            }
            _ => (Spectrum::zero(), 0.0),
        }
    }

    /// Sample a scattered direction from a phase closure.
    ///
    /// * `i`  - Direction towards the viewer.
    /// * `di` - Differential of `i`.
    /// * `u`  - First random number.
    /// * `v`  - Second random number.
    pub fn phase_sample(&self, i: &Vector3f, di: &Differential3, u: Float, v: Float) -> BsdfSample {
        let g = match *self {
            Self::VolumeHenyeyGreenstein { g } => g,
            _ => return BsdfSample::none(),
        };

        let cos_theta = if g.abs() < 1e-3 {
            1.0 - 2.0 * u
        } else {
            let k = (1.0 - g * g) / (1.0 - g + 2.0 * g * u);
            (1.0 + g * g - k * k) / (2.0 * g)
        };
        let sin_theta = safe_sqrt(1.0 - cos_theta * cos_theta);
        let phi = TWO_PI * v;

        let forward = -*i;
        let (t, b) = forward.make_orthonormals();
        let omega_in =
            t * (sin_theta * phi.cos()) + b * (sin_theta * phi.sin()) + forward * cos_theta;
        let pdf = henyey_greenstein(cos_theta, g);

        BsdfSample {
            label: Label::VOLUME_SCATTER,
            eval: Spectrum::new(pdf),
            omega_in,
            domega_in: Differential3 {
                dx: -di.dx,
                dy: -di.dy,
            },
            pdf,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    #[test]
    fn isotropic_is_uniform() {
        let p = henyey_greenstein(0.3, 0.0);
        assert!(approx_eq!(f32, p, INV_FOUR_PI, epsilon = 1e-6));
    }

    #[test]
    fn forward_scattering_peaks_ahead() {
        assert!(henyey_greenstein(1.0, 0.7) > henyey_greenstein(-1.0, 0.7));
    }

    proptest! {
        #[test]
        fn sample_pdf_matches_eval(g in -0.9..0.9f32, u in 0.0..1.0f32, v in 0.0..1.0f32) {
            let c = Closure::VolumeHenyeyGreenstein { g };
            let i = Vector3f::new(0.0, 0.0, 1.0);
            let s = c.phase_sample(&i, &Differential3::zero(), u, v);
            let (eval, pdf) = c.phase_eval(&i, &s.omega_in);
            prop_assert!(approx_eq!(f32, pdf, s.pdf, epsilon = 1e-2 * s.pdf.max(1.0)));
            prop_assert!(approx_eq!(f32, eval.g(), s.eval.g(), epsilon = 1e-2 * s.pdf.max(1.0)));
        }
    }
}
