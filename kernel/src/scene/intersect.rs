//! Ray/scene intersection

use super::*;
use crate::geometry::*;
use crate::math::*;
use crate::path_state::PathRayFlags;
use crate::shader::ObjectFlags;
use std::sync::Arc;

/// Ray queries against the scene.
pub trait Intersector: Send + Sync {
    /// Find the closest hit within the ray's interval on an object visible
    /// to the ray type.
    ///
    /// * `ray`        - Ray.
    /// * `visibility` - Visibility mask.
    fn intersect(&self, ray: &Ray, visibility: PathRayFlags) -> Option<Intersection>;

    /// Returns true if anything blocks the ray.
    ///
    /// * `ray`        - Ray.
    /// * `visibility` - Visibility mask.
    fn occluded(&self, ray: &Ray, visibility: PathRayFlags) -> bool {
        self.intersect(ray, visibility).is_some()
    }
}

/// Tests every primitive of the scene.
pub struct SceneIntersector {
    data: Arc<KernelData>,
}

impl SceneIntersector {
    /// Create an intersector over scene data.
    ///
    /// * `data` - Scene data.
    pub fn new(data: Arc<KernelData>) -> Self {
        Self { data }
    }
}

impl Intersector for SceneIntersector {
    fn intersect(&self, ray: &Ray, visibility: PathRayFlags) -> Option<Intersection> {
        let data = &self.data;
        let mut closest: Option<Intersection> = None;
        let mut t_max = ray.t_max;

        for (prim, pref) in data.prims.iter().enumerate() {
            let object = &data.objects[pref.object];
            if !object.visibility.intersects(visibility) {
                continue;
            }

            // Instanced geometry is tested in object space.
            let applied = object.flags.contains(ObjectFlags::TRANSFORM_APPLIED);
            let (p, d) = if applied {
                (ray.p, ray.d)
            } else {
                let (_, itfm) = object.transforms_at(ray.time);
                (itfm.transform_point(&ray.p), itfm.transform_direction(&ray.d))
            };

            let hit = match data.geometry.get(object.geometry) {
                Some(Geometry::Mesh(mesh)) => {
                    let verts = mesh.triangle_verts(pref.local, ray.time);
                    intersect_triangle(&p, &d, &verts, ray.t_min, t_max)
                }
                Some(Geometry::Curves(curves)) => curves
                    .intersect(pref.local, &p, &d, t_max)
                    .filter(|h| h.t > ray.t_min)
                    .map(|h| (h.t, h.u, h.v)),
                None => None,
            };

            if let Some((t, u, v)) = hit {
                t_max = t;
                closest = Some(Intersection {
                    t,
                    u,
                    v,
                    prim: Some(prim),
                    object: if applied { None } else { Some(pref.object) },
                    prim_type: pref.prim_type,
                });
            }
        }
        closest
    }
}

/// Watertight ray/triangle test. Returns the distance and the barycentric
/// weights of the first two vertices.
///
/// * `p`     - Ray origin.
/// * `d`     - Ray direction.
/// * `verts` - Triangle vertices.
/// * `t_min` - Minimum distance.
/// * `t_max` - Maximum distance.
pub fn intersect_triangle(
    p: &Point3f,
    d: &Vector3f,
    verts: &[Point3f; 3],
    t_min: Float,
    t_max: Float,
) -> Option<(Float, Float, Float)> {
    // Translate vertices based on ray origin.
    let mut p0t = verts[0] - *p;
    let mut p1t = verts[1] - *p;
    let mut p2t = verts[2] - *p;

    // Permute so the dominant direction axis becomes z.
    let ad = d.abs();
    let kz = if ad.x > ad.y {
        if ad.x > ad.z {
            0
        } else {
            2
        }
    } else if ad.y > ad.z {
        1
    } else {
        2
    };
    let kx = (kz + 1) % 3;
    let ky = (kx + 1) % 3;
    let permute = |v: &Vector3f| Vector3f::new(v[kx], v[ky], v[kz]);
    let dp = permute(d);
    p0t = permute(&p0t);
    p1t = permute(&p1t);
    p2t = permute(&p2t);

    // Shear so the ray points along +z.
    let sx = -dp.x / dp.z;
    let sy = -dp.y / dp.z;
    let sz = 1.0 / dp.z;
    p0t.x += sx * p0t.z;
    p0t.y += sy * p0t.z;
    p1t.x += sx * p1t.z;
    p1t.y += sy * p1t.z;
    p2t.x += sx * p2t.z;
    p2t.y += sy * p2t.z;

    let mut e0 = p1t.x * p2t.y - p1t.y * p2t.x;
    let mut e1 = p2t.x * p0t.y - p2t.y * p0t.x;
    let mut e2 = p0t.x * p1t.y - p0t.y * p1t.x;

    // Fall back to double precision on edges.
    if e0 == 0.0 || e1 == 0.0 || e2 == 0.0 {
        e0 = ((p1t.x as f64) * (p2t.y as f64) - (p1t.y as f64) * (p2t.x as f64)) as Float;
        e1 = ((p2t.x as f64) * (p0t.y as f64) - (p2t.y as f64) * (p0t.x as f64)) as Float;
        e2 = ((p0t.x as f64) * (p1t.y as f64) - (p0t.y as f64) * (p1t.x as f64)) as Float;
    }

    if (e0 < 0.0 || e1 < 0.0 || e2 < 0.0) && (e0 > 0.0 || e1 > 0.0 || e2 > 0.0) {
        return None;
    }
    let det = e0 + e1 + e2;
    if det == 0.0 {
        return None;
    }

    p0t.z *= sz;
    p1t.z *= sz;
    p2t.z *= sz;
    let t_scaled = e0 * p0t.z + e1 * p1t.z + e2 * p2t.z;
    if det < 0.0 && (t_scaled >= t_min * det || t_scaled < t_max * det) {
        return None;
    } else if det > 0.0 && (t_scaled <= t_min * det || t_scaled > t_max * det) {
        return None;
    }

    let inv_det = 1.0 / det;
    let t = t_scaled * inv_det;
    if t <= 0.0 {
        return None;
    }
    Some((t, e0 * inv_det, e1 * inv_det))
}
