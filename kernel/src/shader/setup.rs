//! Shading point setup

use super::*;
use crate::geometry::*;
use crate::math::*;
use crate::scene::KernelData;

/// An explicitly chosen surface point, e.g. sampled on a light or used for
/// displacement, that has no intersection record.
#[derive(Copy, Clone, Debug, Default)]
pub struct SurfaceSample {
    /// Position.
    pub p: Point3f,

    /// Geometric normal.
    pub ng: Normal3f,

    /// Direction towards the viewer.
    pub i: Vector3f,

    /// Incoming direction differential; `None` zeroes all differentials.
    pub di: Option<Differential3>,

    /// Shader index.
    pub shader: Option<usize>,

    /// Object index.
    pub object: Option<usize>,

    /// Primitive index.
    pub prim: Option<usize>,

    /// First barycentric coordinate.
    pub u: Float,

    /// Second barycentric coordinate.
    pub v: Float,

    /// Distance from the viewer.
    pub t: Float,

    /// Time in the shutter interval.
    pub time: Float,

    /// Position, normal and direction are given in object space.
    pub object_space: bool,

    /// Interpolate vertex normals regardless of the shader flags.
    pub force_smooth_normal: bool,
}

impl ShaderData {
    /// Set up a shading point at a ray hit.
    ///
    /// * `data`  - Scene data.
    /// * `isect` - The intersection.
    /// * `ray`   - The ray that produced it.
    pub fn setup_from_ray(&mut self, data: &KernelData, isect: &Intersection, ray: &Ray) {
        let pref = isect.prim.and_then(|p| data.prims.get(p));
        self.object = isect.object.or(pref.map(|r| r.object));
        self.prim_type = isect.prim_type;
        self.object_flag = self
            .object
            .and_then(|o| data.objects.get(o))
            .map_or(ObjectFlags::empty(), |o| o.flags);
        self.runtime_flag = RuntimeFlags::empty();

        // Moving objects are resolved at the ray's time before anything else.
        self.setup_object_transforms(data, ray.time);
        self.time = ray.time;

        self.prim = isect.prim;
        self.ray_length = isect.t;
        self.u = isect.u;
        self.v = isect.v;

        let (origin, dir) = if self.needs_object_transform() {
            (
                self.ob_itfm.transform_point(&ray.p),
                self.ob_itfm.transform_direction(&ray.d),
            )
        } else {
            (ray.p, ray.d)
        };
        let (mut dndu, mut dndv) = self.load_prim_geometry(data, &origin, &dir, isect.t);
        if self.prim.is_none() {
            self.p = ray.at(isect.t);
        }
        self.i = -ray.d;
        self.geometry_to_world(&mut dndu, &mut dndv);

        let backfacing = self.ng.dot(&self.i) < 0.0;

        self.dp = differential_transfer(&ray.dp, &ray.d, &ray.dd, &self.ng, isect.t);
        self.di = differential_incoming(&ray.dd);
        self.update_parametric_differentials(&dndu, &dndv);

        if backfacing {
            self.flip_backfacing();
        }
    }

    /// Set up a shading point where a subsurface random walk exits. Object,
    /// transforms, time, hit distance, facing and the position and incoming
    /// differentials are carried over; local geometry is derived again.
    ///
    /// * `data`  - Scene data.
    /// * `isect` - Exit intersection.
    /// * `ray`   - Probe ray.
    pub fn setup_from_subsurface(&mut self, data: &KernelData, isect: &Intersection, ray: &Ray) {
        let backfacing = self.is_backfacing();

        self.object_flag = self
            .object
            .and_then(|o| data.objects.get(o))
            .map_or(ObjectFlags::empty(), |o| o.flags);
        self.runtime_flag = RuntimeFlags::empty();
        self.prim = isect.prim;
        self.prim_type = isect.prim_type;
        self.u = isect.u;
        self.v = isect.v;

        let (origin, dir) = if self.needs_object_transform() {
            (
                self.ob_itfm.transform_point(&ray.p),
                self.ob_itfm.transform_direction(&ray.d),
            )
        } else {
            (ray.p, ray.d)
        };
        let (mut dndu, mut dndv) = self.load_prim_geometry(data, &origin, &dir, isect.t);
        self.geometry_to_world(&mut dndu, &mut dndv);
        self.update_parametric_differentials(&dndu, &dndv);

        if backfacing {
            self.flip_backfacing();
        }

        // Only a diffuse closure is evaluated here, but shaders may read it.
        self.i = self.n;
    }

    /// Set up a shading point at an explicitly chosen surface position.
    ///
    /// * `data`   - Scene data.
    /// * `sample` - The surface point.
    pub fn setup_from_sample(&mut self, data: &KernelData, sample: &SurfaceSample) {
        self.p = sample.p;
        self.n = sample.ng;
        self.ng = sample.ng;
        self.i = sample.i;
        self.load_shader_params(data, sample.shader);
        if sample.force_smooth_normal {
            self.shader_flag |= ShaderFlags::SMOOTH_NORMAL;
        }

        self.prim_type = sample
            .prim
            .and_then(|p| data.prims.get(p))
            .map_or(PrimitiveType::None, |r| r.prim_type);
        self.object = sample.object;
        self.prim = sample.prim;
        self.u = sample.u;
        self.v = sample.v;
        self.ray_length = sample.t;
        self.time = sample.time;

        self.object_flag = ObjectFlags::empty();
        self.runtime_flag = RuntimeFlags::empty();
        if let Some(object) = self.object.and_then(|o| data.objects.get(o)) {
            self.object_flag = object.flags;
        }
        self.setup_object_transforms(data, sample.time);

        if sample.object_space {
            self.p = self.ob_tfm.transform_point(&self.p);
            self.ng = self.object_normal_to_world(&self.ng);
            self.n = self.ng;
            self.i = self.object_dir_to_world(&self.i);
        }

        let mut dndu = Vector3f::zero();
        let mut dndv = Vector3f::zero();
        self.dpdu = Vector3f::zero();
        self.dpdv = Vector3f::zero();
        if let Some((mesh, tri)) = self.prim.and_then(|p| data.prim_triangle(p)) {
            let instanced = self.needs_object_transform();
            if self.shader_flag.contains(ShaderFlags::SMOOTH_NORMAL) {
                if let Some(n) = mesh.smooth_normal(tri, self.u, self.v) {
                    self.n = if instanced { self.object_normal_to_world(&n) } else { n };
                }
            }
            let (dpdu, dpdv) = mesh.dpdudv(tri, self.time);
            (dndu, dndv) = mesh.dndudv(tri);
            if instanced {
                self.dpdu = self.object_dir_to_world(&dpdu);
                self.dpdv = self.object_dir_to_world(&dpdv);
                dndu = self.object_dir_to_world(&dndu);
                dndv = self.object_dir_to_world(&dndv);
            } else {
                self.dpdu = dpdu;
                self.dpdv = dpdv;
            }
        }

        match sample.di {
            Some(di) => {
                self.di = di;
                self.dp = differential_transfer(&self.dp, &self.i, &di, &self.ng, sample.t);
                self.update_parametric_differentials(&dndu, &dndv);
            }
            None => {
                self.dp = Differential3::zero();
                self.di = Differential3::zero();
                self.du = Differential::zero();
                self.dv = Differential::zero();
                self.dndx = Vector3f::zero();
                self.dndy = Vector3f::zero();
            }
        }

        if self.prim.is_some() && self.ng.dot(&self.i) < 0.0 {
            self.flip_backfacing();
        }
    }

    /// Set up a shading point on a triangle for displacement. Smooth normals
    /// are always used.
    ///
    /// * `data`   - Scene data.
    /// * `object` - Object index.
    /// * `prim`   - Primitive index.
    /// * `u`      - First barycentric coordinate.
    /// * `v`      - Second barycentric coordinate.
    pub fn setup_from_displace(&mut self, data: &KernelData, object: usize, prim: usize, u: Float, v: Float) {
        let flags = data.objects.get(object).map_or(ObjectFlags::empty(), |o| o.flags);
        let (p, ng, shader) = match data.prim_triangle(prim) {
            Some((mesh, tri)) => {
                let mut ng = mesh.triangle_normal(tri, 0.5);
                if flags.contains(ObjectFlags::NEGATIVE_SCALE_APPLIED) {
                    ng = -ng;
                }
                (mesh.triangle_point(tri, u, v, 0.5), ng, Some(mesh.shaders[tri]))
            }
            None => (Point3f::zero(), Normal3f::zero(), None),
        };

        self.setup_from_sample(
            data,
            &SurfaceSample {
                p,
                ng,
                i: Vector3f::zero(),
                di: None,
                shader,
                object: Some(object),
                prim: Some(prim),
                u,
                v,
                t: 0.0,
                time: 0.5,
                object_space: !flags.contains(ObjectFlags::TRANSFORM_APPLIED),
                force_smooth_normal: true,
            },
        );
    }

    /// Set up a shading point for a ray that left the scene.
    ///
    /// * `data` - Scene data.
    /// * `ray`  - The escaping ray.
    pub fn setup_from_background(&mut self, data: &KernelData, ray: &Ray) {
        self.p = ray.d;
        self.n = -ray.d;
        self.ng = -ray.d;
        self.i = -ray.d;
        self.load_shader_params(data, data.background.shader);
        self.object_flag = ObjectFlags::empty();
        self.runtime_flag = RuntimeFlags::empty();
        self.time = ray.time;
        self.ray_length = 0.0;

        self.object = None;
        self.prim = None;
        self.prim_type = PrimitiveType::None;
        self.u = 0.0;
        self.v = 0.0;
        self.clear_surface_derivatives();

        self.dp = ray.dd;
        self.di = differential_incoming(&self.dp);
        self.du = Differential::zero();
        self.dv = Differential::zero();
    }

    /// Set up a shading point for ambient occlusion environment lookups.
    ///
    /// * `data` - Scene data.
    /// * `ray`  - The occlusion ray.
    pub fn setup_from_ao_env(&mut self, data: &KernelData, ray: &Ray) {
        self.setup_from_background(data, ray);
    }

    /// Set up a shading point inside a volume at the ray origin. The shader
    /// is chosen per volume stack entry during evaluation.
    ///
    /// * `ray` - Ray through the volume.
    pub fn setup_from_volume(&mut self, ray: &Ray) {
        self.p = ray.p;
        self.n = -ray.d;
        self.ng = -ray.d;
        self.i = -ray.d;
        self.shader = None;
        self.runtime_flag = RuntimeFlags::empty();
        self.shader_flag = ShaderFlags::empty();
        self.object_flag = ObjectFlags::empty();
        self.time = ray.time;
        self.ray_length = 0.0;

        self.object = None;
        self.prim = None;
        self.prim_type = PrimitiveType::None;
        self.u = 0.0;
        self.v = 0.0;
        self.clear_surface_derivatives();

        self.dp = ray.dd;
        self.di = differential_incoming(&self.dp);
        self.du = Differential::zero();
        self.dv = Differential::zero();

        self.ray_p = ray.p;
        self.ray_dp = ray.dp;
    }

    /// Load the shader and local geometry of the current primitive in its
    /// own space. Returns the normal derivatives along u and v; these and
    /// the position derivatives are zero when the primitive does not
    /// provide them.
    fn load_prim_geometry(
        &mut self,
        data: &KernelData,
        origin: &Point3f,
        dir: &Vector3f,
        t: Float,
    ) -> (Vector3f, Vector3f) {
        let zero = (Vector3f::zero(), Vector3f::zero());
        let Some(prim) = self.prim else {
            self.load_shader_params(data, None);
            self.ng = -*dir;
            self.n = self.ng;
            self.dpdu = Vector3f::zero();
            self.dpdv = Vector3f::zero();
            return zero;
        };

        if self.prim_type == PrimitiveType::Curve {
            if let Some((curves, seg)) = data.prim_curve(prim) {
                self.load_shader_params(data, Some(curves.shaders[seg]));
                let (p, ng, dpdu, dpdv) = curves.shading_frame(seg, self.u, dir);
                self.p = p;
                self.ng = ng;
                self.n = ng;
                self.dpdu = dpdu;
                self.dpdv = dpdv;
                return zero;
            }
        } else if let Some((mesh, tri)) = data.prim_triangle(prim) {
            self.load_shader_params(data, Some(mesh.shaders[tri]));
            let mut ng = mesh.triangle_normal(tri, self.time);
            if self.object_flag.contains(ObjectFlags::NEGATIVE_SCALE_APPLIED) {
                ng = -ng;
            }
            self.p = mesh.refine(tri, *origin, *dir, t, self.time);
            self.ng = ng;
            self.n = ng;
            if self.shader_flag.contains(ShaderFlags::SMOOTH_NORMAL) {
                if let Some(n) = mesh.smooth_normal(tri, self.u, self.v) {
                    self.n = n;
                }
            }
            let (dpdu, dpdv) = mesh.dpdudv(tri, self.time);
            self.dpdu = dpdu;
            self.dpdv = dpdv;
            return mesh.dndudv(tri);
        }

        // Missing geometry degrades to a flat point facing the ray.
        self.load_shader_params(data, None);
        self.p = *origin + *dir * t;
        self.ng = -dir.safe_normalize();
        self.n = self.ng;
        self.dpdu = Vector3f::zero();
        self.dpdv = Vector3f::zero();
        zero
    }

    /// Transform geometry loaded in object space to world space.
    fn geometry_to_world(&mut self, dndu: &mut Vector3f, dndv: &mut Vector3f) {
        if !self.needs_object_transform() {
            return;
        }
        self.p = self.ob_tfm.transform_point(&self.p);
        self.n = self.object_normal_to_world(&self.n);
        self.ng = self.object_normal_to_world(&self.ng);
        self.dpdu = self.object_dir_to_world(&self.dpdu);
        self.dpdv = self.object_dir_to_world(&self.dpdv);
        *dndu = self.object_dir_to_world(dndu);
        *dndv = self.object_dir_to_world(dndv);
    }

    /// Derive `du`, `dv` from the position differential, then the screen
    /// space normal derivatives.
    fn update_parametric_differentials(&mut self, dndu: &Vector3f, dndv: &Vector3f) {
        let (du, dv) = differential_dudv(&self.dpdu, &self.dpdv, &self.dp, &self.ng);
        self.du = du;
        self.dv = dv;
        self.dndx = *dndu * du.dx + *dndv * dv.dx;
        self.dndy = *dndu * du.dy + *dndv * dv.dy;
    }

    fn clear_surface_derivatives(&mut self) {
        self.dpdu = Vector3f::zero();
        self.dpdv = Vector3f::zero();
        self.dndx = Vector3f::zero();
        self.dndy = Vector3f::zero();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::*;
    use float_cmp::*;

    fn quad_scene(tfm: Transform, smooth_normals: bool) -> KernelData {
        let mut builder = SceneBuilder::new();
        let flags = if smooth_normals {
            ShaderFlags::SMOOTH_NORMAL
        } else {
            ShaderFlags::empty()
        };
        let shader = builder.add_shader(KernelShader::new("grey", flags));
        let mut mesh = TriangleMesh::quad(
            Point3f::new(-1.0, -1.0, 0.0),
            Vector3f::new(2.0, 0.0, 0.0),
            Vector3f::new(0.0, 2.0, 0.0),
            shader,
        );
        if smooth_normals {
            mesh.normals = mesh
                .verts
                .iter()
                .map(|v| Normal3f::new(v.x * 0.5, 0.0, 1.0).normalize())
                .collect();
        }
        let geom = builder.add_geometry(Geometry::Mesh(mesh));
        builder.add_object(ObjectData::new("quad", geom, tfm));
        // A second user keeps the geometry instanced.
        builder.add_object(ObjectData::new("far", geom, Transform::translate(&Vector3f::new(0.0, 0.0, -100.0))));
        builder.build()
    }

    fn shade(data: &KernelData, ray: &Ray) -> Option<ShaderData> {
        let isect = SceneIntersector::new(std::sync::Arc::new(data.clone()))
            .intersect(ray, crate::path_state::PathRayFlags::CAMERA)?;
        let mut sd = ShaderData::default();
        sd.setup_from_ray(data, &isect, ray);
        Some(sd)
    }

    #[test]
    fn front_hit_is_not_flipped() {
        let data = quad_scene(IDENTITY_TRANSFORM, false);
        let ray = Ray::new(Point3f::new(0.2, 0.3, 5.0), Vector3f::new(0.0, 0.0, -1.0), INFINITY, 0.5);
        let sd = shade(&data, &ray);
        assert!(sd.is_some());
        let sd = sd.unwrap_or_default();
        assert!(!sd.is_backfacing());
        assert!(approx_eq!(f32, sd.ng.z, 1.0, epsilon = 1e-5));
        assert!(approx_eq!(f32, sd.p.x, 0.2, epsilon = 1e-5));
        assert!(approx_eq!(f32, sd.p.z, 0.0, epsilon = 1e-5));
        assert_eq!(sd.object, Some(0));
        assert!(sd.i.dot(&sd.ng) > 0.0);
    }

    #[test]
    fn backfacing_flips_normals_and_derivatives_together() {
        let data = quad_scene(IDENTITY_TRANSFORM, false);
        let front = Ray::new(Point3f::new(0.2, 0.3, 5.0), Vector3f::new(0.0, 0.0, -1.0), INFINITY, 0.5);
        let back = Ray::new(Point3f::new(0.2, 0.3, -5.0), Vector3f::new(0.0, 0.0, 1.0), 10.0, 0.5);
        let f = shade(&data, &front).unwrap_or_default();
        let b = shade(&data, &back).unwrap_or_default();

        assert!(b.is_backfacing());
        assert_eq!(b.ng, -f.ng);
        assert_eq!(b.n, -f.n);
        assert_eq!(b.dpdu, -f.dpdu);
        assert_eq!(b.dpdv, -f.dpdv);
        assert!(b.i.dot(&b.ng) > 0.0);
    }

    #[test]
    fn instanced_hit_is_transformed_to_world() {
        let tfm = Transform::translate(&Vector3f::new(0.0, 0.0, 2.0));
        let data = quad_scene(tfm, false);
        let ray = Ray::new(Point3f::new(0.2, 0.3, 5.0), Vector3f::new(0.0, 0.0, -1.0), INFINITY, 0.5);
        let sd = shade(&data, &ray).unwrap_or_default();
        assert!(!sd.object_flag.contains(ObjectFlags::TRANSFORM_APPLIED));
        assert!(approx_eq!(f32, sd.p.z, 2.0, epsilon = 1e-5));
        assert!(approx_eq!(f32, sd.ray_length, 3.0, epsilon = 1e-5));
        assert!(approx_eq!(f32, sd.ng.z, 1.0, epsilon = 1e-5));
    }

    #[test]
    fn smooth_normal_diverges_from_geometric() {
        let data = quad_scene(IDENTITY_TRANSFORM, true);
        let ray = Ray::new(Point3f::new(0.8, 0.0, 5.0), Vector3f::new(0.0, 0.0, -1.0), INFINITY, 0.5);
        let sd = shade(&data, &ray).unwrap_or_default();
        assert!(sd.n.x > 0.1);
        assert!(approx_eq!(f32, sd.ng.x, 0.0, epsilon = 1e-6));
    }

    #[test]
    fn differentials_follow_ray() {
        let data = quad_scene(IDENTITY_TRANSFORM, false);
        let mut ray = Ray::new(Point3f::new(0.0, 0.0, 5.0), Vector3f::new(0.0, 0.0, -1.0), INFINITY, 0.5);
        ray.dd = Differential3 {
            dx: Vector3f::new(0.01, 0.0, 0.0),
            dy: Vector3f::new(0.0, 0.01, 0.0),
        };
        let sd = shade(&data, &ray).unwrap_or_default();
        assert!(approx_eq!(f32, sd.dp.dx.x, 0.05, epsilon = 1e-5));
        assert!(approx_eq!(f32, sd.dp.dy.y, 0.05, epsilon = 1e-5));
        assert!(sd.du.dx != 0.0 || sd.dv.dx != 0.0);
        assert_eq!(sd.di.dx, -ray.dd.dx);
    }

    #[test]
    fn sample_without_differentials_zeroes_them() {
        let data = quad_scene(IDENTITY_TRANSFORM, false);
        let mut sd = ShaderData::default();
        sd.dp.dx = Vector3f::new(1.0, 1.0, 1.0);
        sd.setup_from_sample(
            &data,
            &SurfaceSample {
                p: Point3f::new(0.0, 0.0, 0.0),
                ng: Normal3f::new(0.0, 0.0, 1.0),
                i: Vector3f::new(0.0, 0.0, 1.0),
                shader: Some(0),
                time: 0.5,
                ..Default::default()
            },
        );
        assert_eq!(sd.dp, Differential3::zero());
        assert_eq!(sd.du, Differential::zero());
        assert_eq!(sd.dpdu, Vector3f::zero());
        assert!(!sd.is_backfacing());
    }

    #[test]
    fn background_point_faces_ray() {
        let data = KernelData::default();
        let mut sd = ShaderData::default();
        let ray = Ray::new(Point3f::zero(), Vector3f::new(0.0, 1.0, 0.0), INFINITY, 0.25);
        sd.setup_from_background(&data, &ray);
        assert_eq!(sd.n, Normal3f::new(0.0, -1.0, 0.0));
        assert_eq!(sd.shader, None);
        assert_eq!(sd.object, None);
        assert_eq!(sd.time, 0.25);
    }

    #[test]
    fn displace_forces_smooth_normal() {
        let data = quad_scene(IDENTITY_TRANSFORM, true);
        let mut sd = ShaderData::default();
        sd.setup_from_displace(&data, 0, 0, 0.3, 0.3);
        assert!(sd.shader_flag.contains(ShaderFlags::SMOOTH_NORMAL));
        assert!(!sd.is_backfacing());
        assert_eq!(sd.prim, Some(0));
    }
}
