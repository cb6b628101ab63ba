//! Path tracing kernel

use super::*;
use crate::closure::*;
use crate::film::*;
use crate::geometry::*;
use crate::math::*;
use crate::path_state::{PathRayFlags, PathState};
use crate::rng::*;
use crate::sampling::*;
use crate::scene::*;
use crate::shader::*;
use crate::spectrum::*;

/// Surfaces whose glossy roughness is below this count as specular for the
/// denoising features.
const DENOISING_SPECULAR_ALPHA: Float = 0.075;

/// Trace one camera sample through a pixel and accumulate its passes into
/// the render buffer.
///
/// * `kg`        - Kernel globals.
/// * `ctx`       - Thread context.
/// * `buffer`    - Tile render buffer.
/// * `rng_state` - Tile per-pixel seeds, initialized at sample 0.
/// * `sample`    - Sample index.
/// * `x`         - Pixel x.
/// * `y`         - Pixel y.
/// * `offset`    - Tile buffer offset in pixels.
/// * `stride`    - Tile buffer row stride in pixels.
#[inline]
#[allow(clippy::too_many_arguments)]
pub fn path_trace(
    kg: &KernelGlobals,
    ctx: &mut ThreadContext,
    buffer: &mut [Float],
    rng_state: &mut [u32],
    sample: u32,
    x: usize,
    y: usize,
    offset: isize,
    stride: usize,
) {
    let data = &kg.data;
    let layout = data.layout;

    let index = offset + x as isize + (y * stride) as isize;
    let Some(seed) = usize::try_from(index).ok().and_then(|i| rng_state.get_mut(i)) else {
        return;
    };
    if sample == 0 {
        *seed = hash_uint2(x as u32, y as u32) ^ data.integrator.seed;
    }
    let rng_hash = *seed;

    let pixel = layout.pixel_index(offset, stride, x, y);
    let Some(buf) = buffer.get_mut(pixel..pixel + layout.pass_stride) else {
        return;
    };

    let (filter_u, filter_v) = path_rng_2d(rng_hash, sample, PRNG_FILTER_U);
    let (lens_u, lens_v) = path_rng_2d(rng_hash, sample, PRNG_LENS_U);
    let time = data.camera.sample_time(path_rng_1d(rng_hash, sample, PRNG_TIME));
    let ray = data
        .camera
        .generate_ray(x as Float + filter_u, y as Float + filter_v, lens_u, lens_v, time);

    let l = if ray.t_max > 0.0 {
        integrate(kg, ctx, buf, rng_hash, sample, ray, (x, y))
    } else {
        PathRadiance::new(false, false)
    };

    ctx.stats.paths += 1;
    for (bounce, value) in l.bounce_contribution().iter().enumerate() {
        ctx.stats.record_contribution(bounce as u32, *value);
    }

    let mut radiance = l.sum(&data.integrator);
    if !radiance.is_finite() {
        ctx.stats.nan_samples += 1;
        if ctx.stats.nan_samples == 1 {
            warn!("Discarding non-finite sample at pixel ({x}, {y})");
        }
        radiance = Spectrum::zero();
    }
    let alpha = saturate(1.0 - l.transparent);

    write_pass_spectrum(&mut buf[layout.combined..], &radiance);
    write_pass_float(&mut buf[layout.combined + 3..], alpha);

    if let (Some(o), Some(depth)) = (layout.depth, l.depth) {
        write_pass_float(&mut buf[o..], depth);
    }
    if let Some(o) = layout.denoising {
        let n = l.denoising_normal;
        write_pass_spectrum(&mut buf[o..], &Spectrum::rgb(n.x, n.y, n.z));
        write_pass_spectrum(&mut buf[o + 3..], &l.denoising_albedo);
        let (total, shaded) = l.shadow();
        write_pass_float(&mut buf[o + 6..], total);
        write_pass_float(&mut buf[o + 7..], shaded);
    }
    if let (Some(o), Some(passes)) = (layout.light, l.passes.as_ref()) {
        if passes.sum().is_finite() {
            write_light_passes(&mut buf[o..], passes);
        }
    }
}

/// Accumulate the light passes of a sample in their buffer order.
fn write_light_passes(buf: &mut [Float], passes: &LightPasses) {
    let values = [passes.emission, passes.background]
        .into_iter()
        .chain(passes.direct)
        .chain(passes.indirect);
    for (i, value) in values.enumerate() {
        write_pass_spectrum(&mut buf[3 * i..], &value);
    }
}

/// Follow a camera path until it terminates.
#[inline]
fn integrate(
    kg: &KernelGlobals,
    ctx: &mut ThreadContext,
    buf: &mut [Float],
    rng_hash: u32,
    sample: u32,
    mut ray: Ray,
    pixel: (usize, usize),
) -> PathRadiance {
    let data = &kg.data;
    let integrator = &data.integrator;
    let use_denoising = data.layout.denoising.is_some();
    let use_light_pass = data.layout.light.is_some();
    let camera_p = data.camera.camera_to_world.transform_point(&Point3f::zero());

    let mut state = PathState::init(integrator, use_denoising, rng_hash, sample, &data.camera_volume_stack);
    let mut l = PathRadiance::new(use_denoising, use_light_pass);
    let mut throughput = Spectrum::one();
    let mut survival: Float = 1.0;
    let mut feature_throughput = Spectrum::one();
    let mut transparent_background = true;
    let mut recorded_bounce = None;
    let mut sd = ShaderData::default();

    loop {
        if recorded_bounce != Some(state.bounce) {
            ctx.stats.record_throughput(state.bounce, (throughput * survival).average());
            recorded_bounce = Some(state.bounce);
        }

        let past_ao_bounces = integrator.ao_bounces > 0 && state.bounce > integrator.ao_bounces;
        if past_ao_bounces {
            ray.t_max = ray.t_max.min(integrator.ao_bounces_distance);
        }

        let hit = kg.intersect(&ray, state.ray_visibility());

        if integrator.use_volumes && !state.volume_stack.is_empty() {
            let t = hit.map_or(ray.t_max, |h| h.t);
            match volume_integrate(kg, &state, &ray, t, &mut throughput) {
                VolumeIntegrateResult::Scattered(vsd) => {
                    transparent_background = false;
                    let scattered = scatter_in_volume(
                        kg,
                        &vsd,
                        &mut state,
                        &mut ray,
                        &mut throughput,
                        &mut survival,
                        &mut l,
                    );
                    if !scattered {
                        break;
                    }
                    continue;
                }
                VolumeIntegrateResult::Attenuated => {}
                VolumeIntegrateResult::Terminated => break,
            }
        }

        let Some(isect) = hit else {
            if past_ao_bounces {
                sd.setup_from_ao_env(data, &ray);
                let env = sd.eval_ao_env(kg, Some(&state), state.flag);
                l.add_emission(&state, throughput * env * data.background.ao_factor, true);
            } else if data.background.transparent && transparent_background {
                l.transparent += throughput.average();
            } else {
                sd.setup_from_background(data, &ray);
                let background = sd.eval_background(kg, Some(&state), state.flag);
                l.add_emission(&state, throughput * background, true);
            }
            break;
        };

        sd.setup_from_ray(data, &isect, &ray);
        let randb = state.rng_1d_for_decision(PRNG_BSDF);
        sd.eval_surface(kg, &state, randb, state.flag);
        if sd.closures.dropped() > 0 {
            ctx.stats.dropped_closures += sd.closures.dropped() as u64;
            debug!("Dropped {} closures at shader {:?}", sd.closures.dropped(), sd.shader);
        }

        // Volume bounding surfaces without a BSDF are passed through.
        if !sd.runtime_flag.contains(RuntimeFlags::BSDF) && sd.shader_flag.contains(ShaderFlags::HAS_ONLY_VOLUME) {
            if !state.volume_next() {
                break;
            }
            if integrator.use_volumes {
                state.volume_stack.enter_exit(&sd);
            }
            ray.p = ray_offset(sd.p, -sd.ng);
            ray.t_max -= sd.ray_length;
            ray.dp = sd.dp;
            continue;
        }

        if state.flag.contains(PathRayFlags::CAMERA) {
            if l.depth.is_none() {
                l.depth = Some((sd.p - camera_p).length());
            }
            let matte_weight = (throughput * (Spectrum::one() - sd.transparency())).average();
            write_matte(kg, ctx, buf, pixel, &sd, matte_weight);
        }

        if sd.runtime_flag.contains(RuntimeFlags::HOLDOUT) || sd.object_flag.contains(ObjectFlags::HOLDOUT_MASK) {
            if transparent_background {
                let holdout = if sd.object_flag.contains(ObjectFlags::HOLDOUT_MASK) {
                    Spectrum::one()
                } else {
                    sd.holdout_eval().clamp(0.0, 1.0)
                };
                l.transparent += (holdout * throughput).average();
                if holdout == Spectrum::one() {
                    break;
                }
                throughput *= Spectrum::one() - holdout;
            }
        }

        if sd.runtime_flag.contains(RuntimeFlags::EMISSION) {
            let mut emission = sd.emissive_eval();
            if !state.flag.contains(PathRayFlags::MIS_SKIP) && sd.prim.map_or(false, |p| data.lights.contains(p)) {
                emission *= power_heuristic(state.ray_pdf, light_pdf(data, &sd));
            }
            l.add_emission(&state, throughput * emission, false);
        }

        if !russian_roulette(kg, &sd, &state, &mut throughput, &mut survival) {
            break;
        }

        if state.denoising_feature_weight > 0.0 {
            write_denoising_features(&sd, &mut state, &mut feature_throughput, &mut l);
        }

        if integrator.filter_glossy > 0.0 {
            let blur_pdf = state.min_ray_pdf / integrator.filter_glossy;
            if blur_pdf < 1.0 {
                sd.bsdf_blur((1.0 - blur_pdf).sqrt() * 0.5);
            }
        }

        if sd.runtime_flag.contains(RuntimeFlags::AO) || data.background.ao_factor > 0.0 {
            ambient_occlusion(kg, &sd, &state, &throughput, &mut l);
        }

        if sd.runtime_flag.contains(RuntimeFlags::BSSRDF) && subsurface_scatter(kg, &mut sd, &mut throughput) {
            l.record_subsurface();
        }

        direct_light(kg, &sd, &state, &throughput, &mut l);

        match surface_bounce(kg, &sd, &mut state, &mut ray, &mut throughput) {
            Some(label) => {
                l.record_scatter(label);
                if !label.contains(Label::TRANSPARENT) {
                    transparent_background = false;
                }
            }
            None => break,
        }
    }

    l
}

/// Terminate the path by its continuation probability. Survivors are
/// reweighted; `survival` keeps the product of probabilities.
fn russian_roulette(
    kg: &KernelGlobals,
    sd: &ShaderData,
    state: &PathState,
    throughput: &mut Spectrum,
    survival: &mut Float,
) -> bool {
    let probability = state.terminate_probability(&kg.data.integrator, sd, throughput);
    if probability <= 0.0 {
        return false;
    }
    if probability < 1.0 {
        if state.rng_1d_for_decision(PRNG_TERMINATE) >= probability {
            return false;
        }
        *throughput /= probability;
        *survival *= probability;
    }
    true
}

/// Sample the next direction from the surface closures and advance the
/// path. Returns the sampled label, or `None` if the path ends.
fn surface_bounce(
    kg: &KernelGlobals,
    sd: &ShaderData,
    state: &mut PathState,
    ray: &mut Ray,
    throughput: &mut Spectrum,
) -> Option<Label> {
    if !sd.runtime_flag.contains(RuntimeFlags::BSDF) {
        return None;
    }
    let integrator = &kg.data.integrator;

    let (u, v) = state.rng_2d(PRNG_BSDF_U);
    let s = sd.bsdf_sample(u, v);
    if s.label.is_none() || s.pdf <= 0.0 || s.eval.is_black() {
        return None;
    }

    *throughput *= s.eval / s.pdf;
    let transparent = s.label.contains(Label::TRANSPARENT);
    if !transparent {
        state.ray_pdf = s.pdf;
        state.min_ray_pdf = state.min_ray_pdf.min(s.pdf);
    }
    state.next(integrator, s.label);

    let transmit = s.label.contains(Label::TRANSMIT);
    ray.p = ray_offset(sd.p, if transmit { -sd.ng } else { sd.ng });
    ray.d = s.omega_in.normalize();
    ray.t_min = 0.0;
    ray.t_max = if transparent {
        (ray.t_max - sd.ray_length).max(0.0)
    } else {
        FLT_MAX
    };
    ray.dp = sd.dp;
    ray.dd = s.domega_in;

    if transmit && integrator.use_volumes {
        state.volume_stack.enter_exit(sd);
    }
    Some(s.label)
}

/// Light, Russian roulette and phase sampling at a volume scattering point.
/// Returns false if the path ends.
fn scatter_in_volume(
    kg: &KernelGlobals,
    sd: &ShaderData,
    state: &mut PathState,
    ray: &mut Ray,
    throughput: &mut Spectrum,
    survival: &mut Float,
    l: &mut PathRadiance,
) -> bool {
    volume_direct_light(kg, sd, state, throughput, l);

    if !russian_roulette(kg, sd, state, throughput, survival) {
        return false;
    }

    let (u, v) = state.rng_2d(PRNG_BSDF_U);
    let s = sd.volume_phase_sample(u, v);
    if s.pdf <= 0.0 || s.eval.is_black() {
        return false;
    }
    *throughput *= s.eval / s.pdf;
    state.ray_pdf = s.pdf;
    state.min_ray_pdf = state.min_ray_pdf.min(s.pdf);
    state.next(&kg.data.integrator, s.label);
    l.record_scatter(s.label);

    ray.p = sd.p;
    ray.d = s.omega_in.normalize();
    ray.t_min = 0.0;
    ray.t_max = FLT_MAX;
    ray.dp = sd.dp;
    ray.dd = s.domega_in;
    true
}

/// Ambient occlusion: diffuse and AO closures gather the environment if a
/// cosine distributed ray is unoccluded within the AO distance.
fn ambient_occlusion(
    kg: &KernelGlobals,
    sd: &ShaderData,
    state: &PathState,
    throughput: &Spectrum,
    l: &mut PathRadiance,
) {
    let data = &kg.data;
    let background = &data.background;
    let (weight, n) = sd.ao(background.ao_factor);
    if weight.is_black() {
        return;
    }
    let (u, v) = state.rng_2d(PRNG_LIGHT_TERMINATE);
    let (dir, pdf) = sample_cos_hemisphere(&n, u, v);
    if pdf <= 0.0 || dir.dot(&sd.ng) <= 0.0 {
        return;
    }
    let ray = Ray::new(ray_offset(sd.p, sd.ng), dir, background.ao_distance, sd.time);
    if kg.intersector.occluded(&ray, PathRayFlags::SHADOW_OPAQUE) {
        return;
    }
    let mut env = ShaderData::default();
    env.setup_from_ao_env(data, &ray);
    let color = env.eval_ao_env(kg, Some(state), PathRayFlags::empty());
    let eval = BsdfEval::single(l.use_light_pass(), LightPass::Diffuse, weight * color);
    l.add_light(state, &eval, *throughput);
}

/// Pick between the subsurface and surface closures by sample weight. When
/// subsurface is picked, a probe ray finds where light exits the object
/// and the shading point is replaced by a diffuse surface there. Returns
/// true if subsurface was picked.
fn subsurface_scatter(kg: &KernelGlobals, sd: &mut ShaderData, throughput: &mut Spectrum) -> bool {
    let mut bssrdf_sw = 0.0;
    let mut total_sw = 0.0;
    let mut radius = 0.0;
    for sc in sd.closures.iter() {
        if let Closure::Subsurface { radius: r, .. } = sc.model {
            bssrdf_sw += sc.sample_weight;
            radius += r.max_component_value() * sc.sample_weight;
        }
        if sc.model.is_bsdf() || sc.model.is_bssrdf() {
            total_sw += sc.sample_weight;
        }
    }
    if bssrdf_sw <= 0.0 || total_sw <= 0.0 {
        return false;
    }
    let pick = bssrdf_sw / total_sw;
    let radius = radius / bssrdf_sw;

    if lcg_step_float(&mut sd.lcg_state) >= pick {
        *throughput /= 1.0 - pick;
        return false;
    }
    *throughput /= pick;

    let (weight, n, _) = sd.bssrdf_sum();
    if radius > 0.0 {
        let (dx, dy) = concentric_sample_disk(lcg_step_float(&mut sd.lcg_state), lcg_step_float(&mut sd.lcg_state));
        let (t, b) = n.make_orthonormals();
        let origin = sd.p + n * radius + t * (dx * radius) + b * (dy * radius);
        let probe = Ray::new(origin, -n, 2.0 * radius, sd.time);
        let data = &kg.data;
        if let Some(hit) = kg.intersect(&probe, PathRayFlags::ALL_VISIBILITY) {
            let hit_object = hit.prim.and_then(|p| data.prims.get(p)).map(|r| r.object);
            if hit_object.is_some() && hit_object == sd.object {
                sd.setup_from_subsurface(data, &hit, &probe);
            }
        }
    }

    sd.closures.clear();
    sd.runtime_flag
        .remove(RuntimeFlags::BSDF | RuntimeFlags::BSDF_HAS_EVAL | RuntimeFlags::BSSRDF | RuntimeFlags::TRANSPARENT);
    let n = sd.n;
    sd.add_closure(Closure::Diffuse { n }, weight);
    true
}

/// Write the normal and albedo features at the first diffuse-like surface;
/// specular surfaces pass their albedo on to the next hit.
fn write_denoising_features(
    sd: &ShaderData,
    state: &mut PathState,
    feature_throughput: &mut Spectrum,
    l: &mut PathRadiance,
) {
    let mut normal = Vector3f::zero();
    let mut albedo = Spectrum::zero();
    let mut specular_albedo = Spectrum::zero();
    let mut sum_weight = 0.0;
    let mut sum_nonspecular_weight = 0.0;

    for sc in sd.closures.iter() {
        if !sc.model.is_bsdf() && !sc.model.is_bssrdf() {
            continue;
        }
        sum_weight += sc.sample_weight;
        let specular = match sc.model {
            Closure::Microfacet { alpha, .. } | Closure::MicrofacetRefraction { alpha, .. } => {
                alpha < DENOISING_SPECULAR_ALPHA
            }
            model => model.is_bsdf_singular() || model.is_transparent(),
        };
        if specular {
            specular_albedo += sc.weight;
        } else {
            normal += sc.model.normal().unwrap_or(sd.n) * sc.sample_weight;
            albedo += sc.weight;
            sum_nonspecular_weight += sc.sample_weight;
        }
    }

    if sum_weight == 0.0 || sum_nonspecular_weight > 0.5 * sum_weight {
        let n = if normal.is_zero() { sd.n } else { normal.normalize() };
        l.denoising_normal += n * state.denoising_feature_weight;
        l.denoising_albedo += *feature_throughput * albedo * state.denoising_feature_weight;
        state.denoising_feature_weight = 0.0;
    } else {
        *feature_throughput *= specular_albedo;
    }
}

/// Add a camera hit to the cryptomatte layers.
fn write_matte(
    kg: &KernelGlobals,
    ctx: &mut ThreadContext,
    buf: &mut [Float],
    (x, y): (usize, usize),
    sd: &ShaderData,
    weight: Float,
) {
    let data = &kg.data;
    let layout = &data.layout;
    if layout.cryptomatte_layers == 0 || weight == 0.0 {
        return;
    }
    let object = sd.object.and_then(|o| data.objects.get(o));
    let ids = [
        (CryptomatteFlags::OBJECT, object.map_or(ID_NONE, |o| o.cryptomatte_object)),
        (CryptomatteFlags::MATERIAL, sd.shader.map_or(ID_NONE, |s| data.cryptomatte_name(s))),
        (CryptomatteFlags::ASSET, object.map_or(ID_NONE, |o| o.cryptomatte_asset)),
    ];

    let mut coverage = ctx.coverage_mut(x, y);
    let layers = ids.iter().filter(|(flag, _)| data.film.cryptomatte.contains(*flag));
    for (layer, (_, id)) in layers.enumerate() {
        match coverage.as_deref_mut() {
            Some(maps) => {
                if let Some(map) = maps.get_mut(layer) {
                    accumulate_coverage(map, *id, weight);
                }
            }
            None => {
                let slots = layout
                    .cryptomatte_layer(layer)
                    .and_then(|start| buf.get_mut(start..start + layout.cryptomatte_layer_size));
                if let Some(slots) = slots {
                    write_id_slots(slots, *id, weight, false);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// A diffuse sphere on a diffuse floor under a quad light, seen from
    /// the front.
    fn sphere_scene(integrator: IntegratorSettings, film: FilmSettings) -> KernelGlobals {
        let mut builder = SceneBuilder::new();
        let diffuse = builder.add_shader(KernelShader::new("diffuse", ShaderFlags::empty()));
        let light = builder.add_shader(KernelShader::new("light", ShaderFlags::HAS_EMISSION));

        let sphere = builder.add_geometry(Geometry::Mesh(TriangleMesh::uv_sphere(1.0, 24, 12, diffuse)));
        builder.add_object(ObjectData::new("sphere", sphere, IDENTITY_TRANSFORM));

        let floor = TriangleMesh::quad(
            Point3f::new(-10.0, -1.0, -10.0),
            Vector3f::new(0.0, 0.0, 20.0),
            Vector3f::new(20.0, 0.0, 0.0),
            diffuse,
        );
        let floor = builder.add_geometry(Geometry::Mesh(floor));
        builder.add_object(ObjectData::new("floor", floor, IDENTITY_TRANSFORM));

        let lamp = TriangleMesh::quad(
            Point3f::new(-1.0, 3.0, -1.0),
            Vector3f::new(2.0, 0.0, 0.0),
            Vector3f::new(0.0, 0.0, 2.0),
            light,
        );
        let lamp = builder.add_geometry(Geometry::Mesh(lamp));
        builder.add_object(ObjectData::new("lamp", lamp, IDENTITY_TRANSFORM));

        builder
            .camera(CameraSettings::look_at(
                Point3f::new(0.0, 0.5, -5.0),
                Point3f::zero(),
                Vector3f::new(0.0, 1.0, 0.0),
                0.8,
                8,
                8,
            ))
            .integrator(integrator)
            .film(film);

        let evaluator = NodeGraphEvaluator::new(vec![
            ShaderRecipe::surface(ClosureNode::Diffuse {
                color: Spectrum::new(0.8).into(),
                roughness: 0.0,
            }),
            ShaderRecipe::surface(ClosureNode::Emission {
                color: Spectrum::one().into(),
                strength: 10.0,
            }),
        ]);
        KernelGlobals::new(Arc::new(builder.build())).with_evaluator(Arc::new(evaluator))
    }

    fn render(kg: &KernelGlobals, samples: u32) -> (Vec<Float>, ThreadContext) {
        let data = &kg.data;
        let (w, h) = (data.camera.width, data.camera.height);
        let mut buffer = vec![0.0; w * h * data.layout.pass_stride];
        let mut seeds = vec![0_u32; w * h];
        let mut ctx = ThreadContext::new();
        ctx.begin_tile(&data.film, &data.layout, 0, 0, w, h);
        for sample in 0..samples {
            for y in 0..h {
                for x in 0..w {
                    path_trace(kg, &mut ctx, &mut buffer, &mut seeds, sample, x, y, 0, w);
                }
            }
        }
        if ctx.has_coverage() {
            ctx.write_coverage(&data.layout, &mut buffer, 0, w);
        }
        (buffer, ctx)
    }

    fn bounded_integrator() -> IntegratorSettings {
        IntegratorSettings {
            max_bounce: 4,
            min_bounce: 1,
            ..Default::default()
        }
    }

    #[test]
    fn expected_throughput_never_increases() {
        let kg = sphere_scene(bounded_integrator(), FilmSettings::default());
        let (buffer, ctx) = render(&kg, 16);

        let throughput = &ctx.stats.expected_throughput;
        assert!(throughput.len() >= 2);
        for pair in throughput.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-3, "throughput rose: {throughput:?}");
        }
        assert!(buffer.iter().all(|v| v.is_finite() && *v >= 0.0));
        assert_eq!(ctx.stats.paths, 8 * 8 * 16);
    }

    #[test]
    fn no_contribution_past_max_bounce() {
        let integrator = bounded_integrator();
        let kg = sphere_scene(integrator, FilmSettings::default());
        let (_, ctx) = render(&kg, 8);

        let max = integrator.max_bounce as usize;
        assert!(ctx.stats.expected_throughput.len() <= max + 1);
        assert!(ctx.stats.bounce_contribution.iter().skip(max + 1).all(|v| *v == 0.0));
        assert!(ctx.stats.bounce_contribution.iter().sum::<Float>() > 0.0);
    }

    #[test]
    fn direct_only_stops_after_first_hit() {
        let integrator = IntegratorSettings {
            max_bounce: 0,
            min_bounce: 0,
            ..Default::default()
        };
        let kg = sphere_scene(integrator, FilmSettings::default());
        let (_, ctx) = render(&kg, 2);
        assert!(ctx.stats.bounce_contribution.len() <= 1);
    }

    #[test]
    fn writes_alpha_and_depth() {
        let film = FilmSettings {
            use_depth: true,
            ..Default::default()
        };
        let kg = sphere_scene(bounded_integrator(), film);
        let (buffer, _) = render(&kg, 4);
        let layout = kg.data.layout;
        let center = layout.pixel_index(0, 8, 4, 4);
        assert_eq!(buffer[center + 3], 4.0);
        let depth = buffer[center + layout.depth.unwrap_or(0)] / 4.0;
        assert!(depth > 3.5 && depth < 5.5, "depth {depth}");
    }

    #[test]
    fn transparent_background_clears_alpha() {
        let mut builder = SceneBuilder::new();
        builder.background(BackgroundSettings {
            transparent: true,
            ..Default::default()
        });
        let kg = KernelGlobals::new(Arc::new(builder.build()));
        let mut buffer = vec![0.0; kg.data.layout.pass_stride];
        let mut seeds = vec![0_u32; 1];
        let mut ctx = ThreadContext::new();
        path_trace(&kg, &mut ctx, &mut buffer, &mut seeds, 0, 0, 0, 0, 1);
        assert_eq!(&buffer[..4], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn cryptomatte_covers_every_pixel() {
        let film = FilmSettings {
            cryptomatte: CryptomatteFlags::OBJECT | CryptomatteFlags::ACCURATE,
            cryptomatte_depth: 1,
            ..Default::default()
        };
        let kg = sphere_scene(bounded_integrator(), film);
        let (buffer, _) = render(&kg, 4);
        let layout = kg.data.layout;
        let sphere_id = kg.data.objects[0].cryptomatte_object;
        let center = layout.pixel_index(0, 8, 4, 4) + layout.cryptomatte.unwrap_or(0);
        assert_eq!(buffer[center], sphere_id);
        assert!(buffer[center + 1] > 3.9);
    }

    #[test]
    fn cryptomatte_slots_keep_every_sample() {
        let film = FilmSettings {
            cryptomatte: CryptomatteFlags::OBJECT,
            cryptomatte_depth: 1,
            ..Default::default()
        };
        let kg = sphere_scene(bounded_integrator(), film);
        let (buffer, _) = render(&kg, 4);
        let layout = kg.data.layout;
        let start = layout.cryptomatte.unwrap_or(0);
        for px in buffer.chunks_exact(layout.pass_stride) {
            let slots = &px[start..start + layout.cryptomatte_layer_size];
            let weights: Vec<Float> = slots.chunks_exact(ID_SLOT_SIZE).map(|s| s[1]).collect();
            assert!(weights.windows(2).all(|w| w[0] >= w[1]), "unsorted {slots:?}");
            let total: Float = weights.iter().sum();
            assert!(total <= 4.0 + 1e-3, "total {total}");
        }
        let center = layout.pixel_index(0, 8, 4, 4) + start;
        assert_eq!(buffer[center], kg.data.objects[0].cryptomatte_object);
        assert!((buffer[center + 1] + buffer[center + 3] - 4.0).abs() < 1e-3);
    }

    #[test]
    fn denoising_albedo_of_diffuse_hit() {
        let film = FilmSettings {
            use_denoising: true,
            ..Default::default()
        };
        let kg = sphere_scene(bounded_integrator(), film);
        let (buffer, _) = render(&kg, 2);
        let layout = kg.data.layout;
        let center = layout.pixel_index(0, 8, 4, 4) + layout.denoising.unwrap_or(0);
        let albedo = buffer[center + 3] / 2.0;
        assert!((albedo - 0.8).abs() < 1e-4, "albedo {albedo}");
    }

    #[test]
    fn light_passes_add_up_to_combined() {
        let film = FilmSettings {
            use_light_passes: true,
            ..Default::default()
        };
        let kg = sphere_scene(bounded_integrator(), film);
        let (buffer, _) = render(&kg, 4);
        let layout = kg.data.layout;
        let light = layout.light.unwrap_or(0);
        let diffuse_direct = light + 3 * (2 + LightPass::Diffuse as usize);
        let diffuse_indirect = diffuse_direct + 3 * NUM_LIGHT_PASSES;

        for px in buffer.chunks_exact(layout.pass_stride) {
            for c in 0..3 {
                let passes: Float = (0..LIGHT_PASS_SIZE / 3).map(|i| px[light + 3 * i + c]).sum();
                let combined = px[layout.combined + c];
                assert!(
                    (passes - combined).abs() <= 1e-3 * combined.max(1.0),
                    "passes {passes} combined {combined}"
                );
            }
        }

        // Every surface is diffuse.
        let glossy_direct = light + 3 * (2 + LightPass::Glossy as usize);
        let pixels = || buffer.chunks_exact(layout.pass_stride);
        assert!(pixels().map(|px| px[diffuse_direct]).sum::<Float>() > 0.0);
        assert!(pixels().map(|px| px[diffuse_indirect]).sum::<Float>() > 0.0);
        assert!(pixels().all(|px| px[glossy_direct] == 0.0));

        let center = layout.pixel_index(0, 8, 4, 4);
        assert_eq!(buffer[center + light], 0.0);
    }

    #[test]
    fn seeds_out_of_range_are_ignored() {
        let kg = sphere_scene(bounded_integrator(), FilmSettings::default());
        let mut buffer = vec![0.0; 4];
        let mut seeds = vec![0_u32; 1];
        let mut ctx = ThreadContext::new();
        path_trace(&kg, &mut ctx, &mut buffer, &mut seeds, 0, 3, 3, 0, 8);
        assert!(buffer.iter().all(|v| *v == 0.0));
        assert_eq!(ctx.stats.paths, 0);
    }
}
