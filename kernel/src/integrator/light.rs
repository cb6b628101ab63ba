//! Direct lighting

use super::*;
use crate::closure::{BsdfEval, LightPass};
use crate::geometry::*;
use crate::math::*;
use crate::path_state::{PathRayFlags, PathState};
use crate::rng::*;
use crate::sampling::*;
use crate::scene::*;
use crate::shader::*;
use crate::spectrum::*;

/// A point sampled on an emissive triangle.
#[derive(Copy, Clone, Debug)]
pub struct LightSample {
    /// Position on the light.
    pub p: Point3f,

    /// Geometric normal of the light.
    pub ng: Normal3f,

    /// Unit direction from the shading point to the light.
    pub d: Vector3f,

    /// Distance to the light.
    pub t: Float,

    /// Solid angle density.
    pub pdf: Float,

    /// Object of the triangle.
    pub object: usize,

    /// Primitive.
    pub prim: usize,

    /// Barycentric coordinates.
    pub u: Float,
    pub v: Float,
}

/// Pick an emissive triangle by area and a point on it.
///
/// * `data` - Scene data.
/// * `u`    - Random number for the triangle and first coordinate.
/// * `v`    - Random number for the second coordinate.
/// * `time` - Ray time.
/// * `p`    - Shading position.
pub fn light_sample(data: &KernelData, u: Float, v: Float, time: Float, p: &Point3f) -> Option<LightSample> {
    let (light, u) = data.lights.sample(u)?;
    let prim = light.prim;
    let (mesh, tri) = data.prim_triangle(prim)?;
    let object = data.prims.get(prim)?.object;
    let ob = data.objects.get(object)?;

    let (bu, bv) = uniform_sample_triangle(u, v);
    let mut lp = mesh.triangle_point(tri, bu, bv, time);
    let mut ng = mesh.triangle_normal(tri, time);
    if ob.flags.contains(ObjectFlags::TRANSFORM_APPLIED) {
        if ob.flags.contains(ObjectFlags::NEGATIVE_SCALE_APPLIED) {
            ng = -ng;
        }
    } else {
        let (tfm, itfm) = ob.transforms_at(time);
        lp = tfm.transform_point(&lp);
        ng = itfm.transform_direction_transposed(&ng).safe_normalize();
        if tfm.negative_scale() {
            ng = -ng;
        }
    }

    let to_light = lp - *p;
    let t = to_light.length();
    if t <= 0.0 {
        return None;
    }
    let d = to_light * (1.0 / t);
    let cos_light = ng.dot(&d).abs();
    if cos_light <= 0.0 {
        return None;
    }

    Some(LightSample {
        p: lp,
        ng,
        d,
        t,
        pdf: data.lights.pdf_area() * t * t / cos_light,
        object,
        prim,
        u: bu,
        v: bv,
    })
}

/// Solid angle density of sampling a hit on an emissive triangle.
///
/// * `data` - Scene data.
/// * `sd`   - Shading point on the light.
pub fn light_pdf(data: &KernelData, sd: &ShaderData) -> Float {
    let cos = sd.ng.dot(&sd.i).abs();
    if cos <= 0.0 {
        return 0.0;
    }
    data.lights.pdf_area() * sd.ray_length * sd.ray_length / cos
}

/// Emission leaving a sampled light point towards the shading point.
pub(super) fn light_emission(kg: &KernelGlobals, state: &PathState, ls: &LightSample, time: Float) -> Spectrum {
    let data = &kg.data;
    let mut sd = ShaderData::default();
    sd.setup_from_sample(
        data,
        &SurfaceSample {
            p: ls.p,
            ng: ls.ng,
            i: -ls.d,
            di: None,
            shader: data.prim_shader(ls.prim),
            object: Some(ls.object),
            prim: Some(ls.prim),
            u: ls.u,
            v: ls.v,
            t: ls.t,
            time,
            object_space: false,
            force_smooth_normal: false,
        },
    );
    sd.eval_surface(kg, state, 0.0, PathRayFlags::empty());
    sd.emissive_eval()
}

/// Transmittance along a shadow ray, passing through surfaces with
/// transparent shadows and homogeneous volumes. Returns `None` if the ray is
/// blocked.
///
/// * `kg`    - Kernel globals.
/// * `state` - Path state at the shading point.
/// * `ray`   - Shadow ray.
pub fn shadow_transmittance(kg: &KernelGlobals, state: &PathState, ray: &Ray) -> Option<Spectrum> {
    let data = &kg.data;
    if !data.integrator.transparent_shadows {
        return if kg.intersector.occluded(ray, PathRayFlags::SHADOW_OPAQUE) {
            None
        } else {
            Some(volume_shadow(kg, state, &state.volume_stack, ray, ray.t_max))
        };
    }

    let mut throughput = Spectrum::one();
    let mut ray = *ray;
    let mut stack = state.volume_stack;
    let mut sd = ShaderData::default();

    for _ in 0..=data.integrator.transparent_max_bounce {
        let Some(isect) = kg.intersect(&ray, PathRayFlags::SHADOW) else {
            throughput *= volume_shadow(kg, state, &stack, &ray, ray.t_max);
            return Some(throughput);
        };
        let prim = isect.prim?;
        if !data.transparent_shadow(prim) {
            return None;
        }

        throughput *= volume_shadow(kg, state, &stack, &ray, isect.t);

        sd.setup_from_ray(data, &isect, &ray);
        sd.eval_surface(kg, state, 0.0, PathRayFlags::SHADOW_TRANSPARENT);
        throughput *= sd.transparency();
        if throughput.is_black() {
            return None;
        }
        if data.integrator.use_volumes {
            stack.enter_exit(&sd);
        }

        ray.p = ray_offset(sd.p, -sd.ng);
        ray.t_max -= isect.t;
        if ray.t_max <= 0.0 {
            return Some(throughput);
        }
    }
    None
}

/// Add direct light from one sampled emissive triangle.
///
/// * `kg`         - Kernel globals.
/// * `sd`         - Shading point.
/// * `state`      - Path state.
/// * `throughput` - Path throughput.
/// * `radiance`   - Accumulated radiance.
pub(super) fn direct_light(
    kg: &KernelGlobals,
    sd: &ShaderData,
    state: &PathState,
    throughput: &Spectrum,
    radiance: &mut PathRadiance,
) {
    if !sd.runtime_flag.contains(RuntimeFlags::BSDF_HAS_EVAL) {
        return;
    }
    let (u, v) = state.rng_2d(PRNG_LIGHT_U);
    let Some(ls) = light_sample(&kg.data, u, v, sd.time, &sd.p) else {
        return;
    };
    if ls.pdf <= 0.0 {
        return;
    }
    // Shadow rays towards the back of the surface leave from its far side.
    let transmit = ls.d.dot(&sd.ng) < 0.0;

    let (bsdf, _) = sd.bsdf_eval_passes(&ls.d, ls.pdf, true, radiance.use_light_pass());
    if bsdf.is_black() {
        return;
    }
    let emission = light_emission(kg, state, &ls, sd.time);
    let scale = *throughput * emission / ls.pdf;
    let contribution = bsdf.sum() * scale;
    if contribution.is_black() {
        return;
    }

    let origin = ray_offset(sd.p, if transmit { -sd.ng } else { sd.ng });
    let dist = (ls.p - origin).length() * (1.0 - 1e-4);
    let shadow_ray = Ray::new(origin, ls.d, dist, sd.time);
    let shaded = shadow_transmittance(kg, state, &shadow_ray);

    radiance.add_shadow_info(state, &contribution, shaded.map_or(Spectrum::zero(), |s| contribution * s));
    if let Some(transmittance) = shaded {
        radiance.add_light(state, &bsdf, scale * transmittance);
    }
}

/// Direct light for a point inside a volume, weighted by the phase
/// function.
///
/// * `kg`         - Kernel globals.
/// * `sd`         - Volume shading point.
/// * `state`      - Path state.
/// * `throughput` - Path throughput.
/// * `radiance`   - Accumulated radiance.
pub(super) fn volume_direct_light(
    kg: &KernelGlobals,
    sd: &ShaderData,
    state: &PathState,
    throughput: &Spectrum,
    radiance: &mut PathRadiance,
) {
    let (u, v) = state.rng_2d(PRNG_LIGHT_U);
    let Some(ls) = light_sample(&kg.data, u, v, sd.time, &sd.p) else {
        return;
    };
    if ls.pdf <= 0.0 {
        return;
    }
    let (phase, phase_pdf) = sd.volume_phase_eval(&ls.d);
    if phase.is_black() {
        return;
    }
    let mis = power_heuristic(ls.pdf, phase_pdf);
    let emission = light_emission(kg, state, &ls, sd.time);
    let scale = *throughput * emission * (mis / ls.pdf);
    if (phase * scale).is_black() {
        return;
    }
    let eval = BsdfEval::single(radiance.use_light_pass(), LightPass::Scatter, phase);

    let shadow_ray = Ray::new(sd.p, ls.d, ls.t * (1.0 - 1e-4), sd.time);
    if let Some(transmittance) = shadow_transmittance(kg, state, &shadow_ray) {
        radiance.add_light(state, &eval, scale * transmittance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;
    use std::sync::Arc;

    /// A unit quad light at height 1 facing down, and a floor.
    fn lit_scene(transparent_blocker: bool) -> KernelGlobals {
        let mut builder = SceneBuilder::new();
        let floor = builder.add_shader(KernelShader::new("floor", ShaderFlags::empty()));
        let light = builder.add_shader(KernelShader::new("light", ShaderFlags::HAS_EMISSION));
        let glass = builder.add_shader(KernelShader::new("glass", ShaderFlags::HAS_TRANSPARENT_SHADOW));

        let lamp = TriangleMesh::quad(
            Point3f::new(-0.5, 1.0, -0.5),
            Vector3f::new(0.0, 0.0, 1.0),
            Vector3f::new(1.0, 0.0, 0.0),
            light,
        );
        let g = builder.add_geometry(Geometry::Mesh(lamp));
        builder.add_object(ObjectData::new("lamp", g, IDENTITY_TRANSFORM));

        let ground = TriangleMesh::quad(
            Point3f::new(-5.0, 0.0, -5.0),
            Vector3f::new(10.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 10.0),
            floor,
        );
        let g = builder.add_geometry(Geometry::Mesh(ground));
        builder.add_object(ObjectData::new("floor", g, IDENTITY_TRANSFORM));

        if transparent_blocker {
            let pane = TriangleMesh::quad(
                Point3f::new(-2.0, 0.5, -2.0),
                Vector3f::new(4.0, 0.0, 0.0),
                Vector3f::new(0.0, 0.0, 4.0),
                glass,
            );
            let g = builder.add_geometry(Geometry::Mesh(pane));
            builder.add_object(ObjectData::new("pane", g, IDENTITY_TRANSFORM));
        }

        let evaluator = NodeGraphEvaluator::new(vec![
            ShaderRecipe::surface(ClosureNode::Diffuse {
                color: Spectrum::one().into(),
                roughness: 0.0,
            }),
            ShaderRecipe::surface(ClosureNode::Emission {
                color: Spectrum::one().into(),
                strength: 1.0,
            }),
            ShaderRecipe::surface(ClosureNode::Transparent {
                color: Spectrum::new(0.5).into(),
            }),
        ]);
        KernelGlobals::new(Arc::new(builder.build())).with_evaluator(Arc::new(evaluator))
    }

    #[test]
    fn pdf_matches_geometry() {
        let kg = lit_scene(false);
        let p = Point3f::zero();
        let ls = light_sample(&kg.data, 0.5, 0.5, 0.5, &p);
        let Some(ls) = ls else {
            panic!("no light sample");
        };
        assert!(approx_eq!(f32, ls.p.y, 1.0, epsilon = 1e-5));
        let cos = ls.ng.dot(&ls.d).abs();
        assert!(approx_eq!(f32, ls.pdf, ls.t * ls.t / cos, epsilon = 1e-4));
    }

    #[test]
    fn unblocked_shadow_ray_is_clear() {
        let kg = lit_scene(false);
        let state = PathState::default();
        let ray = Ray::new(Point3f::new(0.0, 0.01, 0.0), Vector3f::new(0.0, 1.0, 0.0), 0.98, 0.5);
        assert_eq!(shadow_transmittance(&kg, &state, &ray), Some(Spectrum::one()));
    }

    #[test]
    fn transparent_blocker_attenuates() {
        let kg = lit_scene(true);
        let state = PathState::default();
        let ray = Ray::new(Point3f::new(0.0, 0.01, 0.0), Vector3f::new(0.0, 1.0, 0.0), 0.98, 0.5);
        assert_eq!(shadow_transmittance(&kg, &state, &ray), Some(Spectrum::new(0.5)));
    }

    #[test]
    fn direct_light_reaches_floor() {
        let kg = lit_scene(false);
        let state = PathState::default();
        let mut sd = ShaderData::default();
        sd.setup_from_sample(
            &kg.data,
            &SurfaceSample {
                p: Point3f::zero(),
                ng: Normal3f::new(0.0, 1.0, 0.0),
                i: Vector3f::new(0.0, 1.0, 0.0),
                shader: Some(0),
                ..Default::default()
            },
        );
        sd.eval_surface(&kg, &state, 0.0, PathRayFlags::CAMERA);

        let mut radiance = PathRadiance::new(false, false);
        direct_light(&kg, &sd, &state, &Spectrum::one(), &mut radiance);
        let total = radiance.sum(&kg.data.integrator);
        assert!(total.r() > 0.0);
        assert!(total.is_finite());
    }
}
