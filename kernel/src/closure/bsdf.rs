//! Surface scattering models

use super::*;
use crate::geometry::*;
use crate::math::*;
use crate::sampling::*;
use crate::spectrum::*;

/// PDF and evaluation reported for delta distributions.
pub const SINGULAR_PDF: Float = 1e6;

/// Result of sampling a scattering closure.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BsdfSample {
    /// Classification of the sampled event.
    pub label: Label,

    /// Evaluation for the sampled direction.
    pub eval: Spectrum,

    /// Sampled incoming direction.
    pub omega_in: Vector3f,

    /// Differential of the sampled direction.
    pub domega_in: Differential3,

    /// PDF of the sampled direction.
    pub pdf: Float,
}

impl BsdfSample {
    /// A sample that did not produce an event.
    pub fn none() -> Self {
        Self::default()
    }
}

impl Closure {
    /// Evaluate a surface closure for a pair of directions. Returns the
    /// evaluation and the PDF of sampling `omega_in`.
    ///
    /// * `ng`       - Geometric normal on the side of `i`.
    /// * `i`        - Direction towards the viewer.
    /// * `omega_in` - Direction towards the light.
    pub fn bsdf_eval(&self, ng: &Normal3f, i: &Vector3f, omega_in: &Vector3f) -> (Spectrum, Float) {
        let reflect = ng.dot(omega_in) >= 0.0;
        let (value, pdf) = match *self {
            Self::Diffuse { n } if reflect => {
                let v = n.dot(omega_in).max(0.0) * INV_PI;
                (v, v)
            }
            Self::OrenNayar { n, a, b } if reflect => {
                let nl = n.dot(omega_in).max(0.0);
                let nv = n.dot(i).max(0.0);
                let mut t = omega_in.dot(i) - nl * nv;
                if t > 0.0 {
                    t /= nl.max(nv) + Float::MIN_POSITIVE;
                }
                (nl * (a + b * t), 0.5 * INV_PI)
            }
            Self::Translucent { n } if !reflect => {
                let v = (-n.dot(omega_in)).max(0.0) * INV_PI;
                (v, v)
            }
            Self::Microfacet { n, alpha } if reflect && alpha > MICROFACET_SINGULAR_ALPHA => {
                ggx_eval_reflect(&n, alpha, i, omega_in)
            }
            Self::MicrofacetRefraction { n, alpha, ior }
                if !reflect && alpha > MICROFACET_SINGULAR_ALPHA =>
            {
                ggx_eval_transmit(&n, alpha, ior, i, omega_in)
            }
            _ => (0.0, 0.0),
        };
        (Spectrum::new(value), pdf)
    }

    /// Sample an incoming direction for a surface closure.
    ///
    /// * `ng` - Geometric normal on the side of `i`.
    /// * `i`  - Direction towards the viewer.
    /// * `di` - Differential of `i`.
    /// * `u`  - First random number.
    /// * `v`  - Second random number.
    pub fn bsdf_sample(
        &self,
        ng: &Normal3f,
        i: &Vector3f,
        di: &Differential3,
        u: Float,
        v: Float,
    ) -> BsdfSample {
        match *self {
            Self::Diffuse { n } => {
                let (omega_in, pdf) = sample_cos_hemisphere(&n, u, v);
                if ng.dot(&omega_in) > 0.0 {
                    BsdfSample {
                        label: Label::REFLECT | Label::DIFFUSE,
                        eval: Spectrum::new(pdf),
                        omega_in,
                        domega_in: reflect_differential(&n, di),
                        pdf,
                    }
                } else {
                    BsdfSample::none()
                }
            }
            Self::OrenNayar { n, .. } => {
                let (omega_in, _) = sample_uniform_hemisphere(&n, u, v);
                if ng.dot(&omega_in) > 0.0 {
                    let (eval, pdf) = self.bsdf_eval(ng, i, &omega_in);
                    BsdfSample {
                        label: Label::REFLECT | Label::DIFFUSE,
                        eval,
                        omega_in,
                        domega_in: reflect_differential(&n, di),
                        pdf,
                    }
                } else {
                    BsdfSample::none()
                }
            }
            Self::Translucent { n } => {
                let (omega_in, pdf) = sample_cos_hemisphere(&-n, u, v);
                if ng.dot(&omega_in) < 0.0 {
                    let r = reflect_differential(&n, di);
                    BsdfSample {
                        label: Label::TRANSMIT | Label::DIFFUSE,
                        eval: Spectrum::new(pdf),
                        omega_in,
                        domega_in: Differential3 {
                            dx: -r.dx,
                            dy: -r.dy,
                        },
                        pdf,
                    }
                } else {
                    BsdfSample::none()
                }
            }
            Self::Reflection { n } => singular_reflection(ng, &n, i, di),
            Self::Microfacet { n, alpha } => {
                if alpha <= MICROFACET_SINGULAR_ALPHA {
                    return singular_reflection(ng, &n, i, di);
                }
                if n.dot(i) <= 0.0 {
                    return BsdfSample::none();
                }
                let m = ggx_sample_microfacet(&n, alpha, i, u, v);
                let omega_in = m * (2.0 * m.dot(i)) - *i;
                if ng.dot(&omega_in) <= 0.0 {
                    return BsdfSample::none();
                }
                let (eval, pdf) = ggx_eval_reflect(&n, alpha, i, &omega_in);
                if pdf <= 0.0 {
                    return BsdfSample::none();
                }
                BsdfSample {
                    label: Label::REFLECT | Label::GLOSSY,
                    eval: Spectrum::new(eval),
                    omega_in,
                    domega_in: reflect_differential(&m, di),
                    pdf,
                }
            }
            Self::Refraction { n, ior } => singular_refraction(ng, &n, ior, i, di),
            Self::MicrofacetRefraction { n, alpha, ior } => {
                if alpha <= MICROFACET_SINGULAR_ALPHA {
                    return singular_refraction(ng, &n, ior, i, di);
                }
                if n.dot(i) <= 0.0 {
                    return BsdfSample::none();
                }
                let m = ggx_sample_microfacet(&n, alpha, i, u, v);
                let (omega_in, domega_in) = match refract(&m, ior, i, di) {
                    Some(t) => t,
                    None => return BsdfSample::none(),
                };
                if ng.dot(&omega_in) >= 0.0 {
                    return BsdfSample::none();
                }
                let (eval, pdf) = ggx_eval_transmit(&n, alpha, ior, i, &omega_in);
                if pdf <= 0.0 {
                    return BsdfSample::none();
                }
                BsdfSample {
                    label: Label::TRANSMIT | Label::GLOSSY,
                    eval: Spectrum::new(eval),
                    omega_in,
                    domega_in,
                    pdf,
                }
            }
            Self::Transparent => BsdfSample {
                label: Label::TRANSMIT | Label::TRANSPARENT,
                eval: Spectrum::one(),
                omega_in: -*i,
                domega_in: Differential3 {
                    dx: -di.dx,
                    dy: -di.dy,
                },
                pdf: 1.0,
            },
            _ => BsdfSample::none(),
        }
    }
}

/// Mirror an incoming differential about `n`.
fn reflect_differential(n: &Normal3f, di: &Differential3) -> Differential3 {
    Differential3 {
        dx: *n * (2.0 * n.dot(&di.dx)) - di.dx,
        dy: *n * (2.0 * n.dot(&di.dy)) - di.dy,
    }
}

/// Refract `i` through a surface with normal `n` when entering a medium of
/// relative index `ior`. Returns `None` on total internal reflection.
fn refract(
    n: &Normal3f,
    ior: Float,
    i: &Vector3f,
    di: &Differential3,
) -> Option<(Vector3f, Differential3)> {
    let cos = n.dot(i);
    let eta = 1.0 / ior;
    let arg = 1.0 - eta * eta * (1.0 - cos * cos);
    if arg <= 0.0 {
        return None;
    }
    let root = arg.sqrt();
    let t = -*i * eta + *n * (eta * cos - root);
    let dmu = eta - eta * eta * cos / root;
    let transfer = |d: &Vector3f| -> Vector3f { -*d * eta + *n * (dmu * n.dot(d)) };
    Some((
        t,
        Differential3 {
            dx: transfer(&di.dx),
            dy: transfer(&di.dy),
        },
    ))
}

fn singular_reflection(ng: &Normal3f, n: &Normal3f, i: &Vector3f, di: &Differential3) -> BsdfSample {
    let cos = n.dot(i);
    if cos <= 0.0 {
        return BsdfSample::none();
    }
    let omega_in = *n * (2.0 * cos) - *i;
    if ng.dot(&omega_in) <= 0.0 {
        return BsdfSample::none();
    }
    BsdfSample {
        label: Label::REFLECT | Label::SINGULAR,
        eval: Spectrum::new(SINGULAR_PDF),
        omega_in,
        domega_in: reflect_differential(n, di),
        pdf: SINGULAR_PDF,
    }
}

fn singular_refraction(
    ng: &Normal3f,
    n: &Normal3f,
    ior: Float,
    i: &Vector3f,
    di: &Differential3,
) -> BsdfSample {
    if n.dot(i) <= 0.0 {
        return BsdfSample::none();
    }
    match refract(n, ior, i, di) {
        Some((omega_in, domega_in)) if ng.dot(&omega_in) < 0.0 => BsdfSample {
            label: Label::TRANSMIT | Label::SINGULAR,
            eval: Spectrum::new(SINGULAR_PDF),
            omega_in,
            domega_in,
            pdf: SINGULAR_PDF,
        },
        _ => BsdfSample::none(),
    }
}

/// GGX normal distribution.
fn ggx_d(alpha2: Float, cos_theta_m: Float) -> Float {
    let cos2 = cos_theta_m * cos_theta_m;
    let cos4 = cos2 * cos2;
    let tan2 = (1.0 - cos2) / cos2;
    let denom = alpha2 + tan2;
    alpha2 / (PI * cos4 * denom * denom)
}

/// Smith masking for one direction.
fn ggx_g1(alpha2: Float, cos_n: Float) -> Float {
    let cos2 = cos_n * cos_n;
    2.0 / (1.0 + (1.0 + alpha2 * (1.0 - cos2) / cos2).sqrt())
}

fn ggx_eval_reflect(n: &Normal3f, alpha: Float, i: &Vector3f, omega_in: &Vector3f) -> (Float, Float) {
    let cos_no = n.dot(i);
    let cos_ni = n.dot(omega_in);
    if cos_no <= 0.0 || cos_ni <= 0.0 {
        return (0.0, 0.0);
    }
    let m = (*i + *omega_in).normalize();
    let alpha2 = alpha * alpha;
    let d = ggx_d(alpha2, n.dot(&m));
    let g1o = ggx_g1(alpha2, cos_no);
    let g1i = ggx_g1(alpha2, cos_ni);
    let common = d * 0.25 / cos_no;
    (g1o * g1i * common, g1o * common)
}

fn ggx_eval_transmit(
    n: &Normal3f,
    alpha: Float,
    ior: Float,
    i: &Vector3f,
    omega_in: &Vector3f,
) -> (Float, Float) {
    let cos_no = n.dot(i);
    let cos_ni = n.dot(omega_in);
    if cos_no <= 0.0 || cos_ni >= 0.0 {
        return (0.0, 0.0);
    }
    let ht = -(*omega_in * ior + *i);
    let ht2 = ht.dot(&ht);
    if ht2 == 0.0 {
        return (0.0, 0.0);
    }
    let m = ht / ht2.sqrt();
    let cos_ho = m.dot(i);
    let cos_hi = m.dot(omega_in);
    let cos_theta_m = n.dot(&m);
    if cos_theta_m <= 0.0 {
        return (0.0, 0.0);
    }
    let alpha2 = alpha * alpha;
    let d = ggx_d(alpha2, cos_theta_m);
    let g1o = ggx_g1(alpha2, cos_no);
    let g1i = ggx_g1(alpha2, cos_ni);
    let common = d * (ior * ior) / (cos_no * ht2);
    let jacobian = (cos_hi * cos_ho).abs();
    (g1o * g1i * jacobian * common, g1o * jacobian * common)
}

/// Sample a visible GGX microfacet normal.
fn ggx_sample_microfacet(n: &Normal3f, alpha: Float, i: &Vector3f, u: Float, v: Float) -> Normal3f {
    let (tx, ty) = n.make_orthonormals();
    let wo = Vector3f::new(i.dot(&tx), i.dot(&ty), i.dot(n));

    // Stretch the view direction to the hemisphere configuration.
    let vh = Vector3f::new(alpha * wo.x, alpha * wo.y, wo.z).normalize();
    let lensq = vh.x * vh.x + vh.y * vh.y;
    let t1 = if lensq > 0.0 {
        Vector3f::new(-vh.y, vh.x, 0.0) / lensq.sqrt()
    } else {
        Vector3f::new(1.0, 0.0, 0.0)
    };
    let t2 = vh.cross(&t1);

    // Sample the projected area.
    let r = u.sqrt();
    let phi = TWO_PI * v;
    let p1 = r * phi.cos();
    let s = 0.5 * (1.0 + vh.z);
    let p2 = (1.0 - s) * safe_sqrt(1.0 - p1 * p1) + s * r * phi.sin();
    let nh = t1 * p1 + t2 * p2 + vh * safe_sqrt(1.0 - p1 * p1 - p2 * p2);

    // Unstretch.
    let ne = Vector3f::new(alpha * nh.x, alpha * nh.y, nh.z.max(0.0)).normalize();
    (tx * ne.x + ty * ne.y + *n * ne.z).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    const N: Normal3f = Normal3f::new(0.0, 0.0, 1.0);

    fn view() -> Vector3f {
        Vector3f::new(0.3, 0.0, 1.0).normalize()
    }

    #[test]
    fn diffuse_eval_matches_sample() {
        let c = Closure::Diffuse { n: N };
        let s = c.bsdf_sample(&N, &view(), &Differential3::zero(), 0.3, 0.7);
        assert_eq!(s.label, Label::REFLECT | Label::DIFFUSE);
        let (eval, pdf) = c.bsdf_eval(&N, &view(), &s.omega_in);
        assert!(approx_eq!(f32, pdf, s.pdf, epsilon = 1e-4));
        assert!(approx_eq!(f32, eval.r(), s.eval.r(), epsilon = 1e-4));
    }

    #[test]
    fn diffuse_does_not_transmit() {
        let c = Closure::Diffuse { n: N };
        let (eval, pdf) = c.bsdf_eval(&N, &view(), &Vector3f::new(0.0, 0.0, -1.0));
        assert!(eval.is_black());
        assert_eq!(pdf, 0.0);
    }

    #[test]
    fn transparent_passes_straight_through() {
        let i = view();
        let s = Closure::Transparent.bsdf_sample(&N, &i, &Differential3::zero(), 0.5, 0.5);
        assert_eq!(s.omega_in, -i);
        assert_eq!(s.pdf, 1.0);
        assert!(s.label.contains(Label::TRANSPARENT));
    }

    #[test]
    fn mirror_reflects_about_normal() {
        let i = view();
        let s = Closure::Reflection { n: N }.bsdf_sample(&N, &i, &Differential3::zero(), 0.1, 0.2);
        assert!(s.label.contains(Label::SINGULAR));
        assert!(approx_eq!(f32, s.omega_in.x, -i.x, epsilon = 1e-5));
        assert!(approx_eq!(f32, s.omega_in.z, i.z, epsilon = 1e-5));
    }

    #[test]
    fn refraction_bends_towards_normal() {
        let i = view();
        let s = Closure::Refraction { n: N, ior: 1.5 }.bsdf_sample(
            &N,
            &i,
            &Differential3::zero(),
            0.0,
            0.0,
        );
        assert!(s.label.contains(Label::TRANSMIT));
        assert!(s.omega_in.z < 0.0);
        assert!(s.omega_in.x.abs() < i.x.abs());
    }

    #[test]
    fn refraction_total_internal_reflection_is_none() {
        let grazing = Vector3f::new(0.95, 0.0, 0.05).normalize();
        let s = Closure::Refraction { n: N, ior: 1.0 / 1.5 }.bsdf_sample(
            &N,
            &grazing,
            &Differential3::zero(),
            0.0,
            0.0,
        );
        assert!(s.label.is_none());
        assert_eq!(s.pdf, 0.0);
    }

    proptest! {
        #[test]
        fn ggx_sample_agrees_with_eval(u in 0.01..0.99f32, v in 0.01..0.99f32, r in 0.2..1.0f32) {
            let c = Closure::microfacet(N, r);
            let i = view();
            let s = c.bsdf_sample(&N, &i, &Differential3::zero(), u, v);
            if !s.label.is_none() {
                let (eval, pdf) = c.bsdf_eval(&N, &i, &s.omega_in);
                prop_assert!(approx_eq!(f32, pdf, s.pdf, epsilon = 1e-3 * s.pdf.max(1.0)));
                prop_assert!(approx_eq!(f32, eval.r(), s.eval.r(), epsilon = 1e-3 * s.eval.r().max(1.0)));
                prop_assert!(s.omega_in.z > 0.0);
            }
        }

        #[test]
        fn oren_nayar_is_non_negative(u in 0.0..1.0f32, v in 0.0..1.0f32, sigma in 0.0..1.0f32) {
            let c = Closure::oren_nayar(N, sigma);
            let s = c.bsdf_sample(&N, &view(), &Differential3::zero(), u, v);
            prop_assert!(s.eval.r() >= 0.0);
        }
    }
}
