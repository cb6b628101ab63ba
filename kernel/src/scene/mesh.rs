//! Triangle meshes

use crate::geometry::*;
use crate::math::*;

/// Indexed triangle mesh. Barycentric `(u, v)` weight the first and second
/// vertex of a triangle; the third vertex gets `1 - u - v`.
#[derive(Clone, Debug, Default)]
pub struct TriangleMesh {
    /// Vertex positions.
    pub verts: Vec<Point3f>,

    /// Vertex positions at evenly spaced times over the shutter interval.
    /// Empty for static meshes.
    pub motion_verts: Vec<Vec<Point3f>>,

    /// Vertex normals; empty for flat shaded meshes.
    pub normals: Vec<Normal3f>,

    /// Vertex texture coordinates; may be empty.
    pub uvs: Vec<Point2f>,

    /// Vertex indices of each triangle.
    pub triangles: Vec<[usize; 3]>,

    /// Shader of each triangle.
    pub shaders: Vec<usize>,

    /// Interpolate vertex normals across triangles.
    pub smooth: bool,
}

impl TriangleMesh {
    /// Create a static mesh with one shader for every triangle.
    ///
    /// * `verts`     - Vertex positions.
    /// * `triangles` - Vertex indices.
    /// * `shader`    - Shader index.
    pub fn new(verts: Vec<Point3f>, triangles: Vec<[usize; 3]>, shader: usize) -> Self {
        let shaders = vec![shader; triangles.len()];
        Self {
            verts,
            triangles,
            shaders,
            ..Default::default()
        }
    }

    /// Number of triangles.
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    /// Returns true if vertices move over the shutter interval.
    pub fn has_motion(&self) -> bool {
        self.motion_verts.len() > 1
    }

    /// Returns the vertex positions of a triangle at a given time.
    ///
    /// * `tri`  - Triangle index.
    /// * `time` - Time in [0, 1].
    pub fn triangle_verts(&self, tri: usize, time: Float) -> [Point3f; 3] {
        let [i0, i1, i2] = self.triangles[tri];
        if !self.has_motion() {
            return [self.verts[i0], self.verts[i1], self.verts[i2]];
        }

        let steps = self.motion_verts.len();
        let t = clamp(time, 0.0, 1.0) * (steps - 1) as Float;
        let step = min(t as usize, steps - 2);
        let frac = t - step as Float;
        let a = &self.motion_verts[step];
        let b = &self.motion_verts[step + 1];
        [
            lerp(frac, a[i0], b[i0]),
            lerp(frac, a[i1], b[i1]),
            lerp(frac, a[i2], b[i2]),
        ]
    }

    /// Geometric normal of a triangle, following the vertex winding.
    ///
    /// * `tri`  - Triangle index.
    /// * `time` - Time in [0, 1].
    pub fn triangle_normal(&self, tri: usize, time: Float) -> Normal3f {
        let [v0, v1, v2] = self.triangle_verts(tri, time);
        (v1 - v0).cross(&(v2 - v0)).normalize()
    }

    /// Position at barycentric coordinates.
    ///
    /// * `tri`  - Triangle index.
    /// * `u`    - First barycentric coordinate.
    /// * `v`    - Second barycentric coordinate.
    /// * `time` - Time in [0, 1].
    pub fn triangle_point(&self, tri: usize, u: Float, v: Float, time: Float) -> Point3f {
        let [v0, v1, v2] = self.triangle_verts(tri, time);
        v0 * u + v1 * v + v2 * (1.0 - u - v)
    }

    /// Interpolated vertex normal, or `None` without vertex normals.
    ///
    /// * `tri` - Triangle index.
    /// * `u`   - First barycentric coordinate.
    /// * `v`   - Second barycentric coordinate.
    pub fn smooth_normal(&self, tri: usize, u: Float, v: Float) -> Option<Normal3f> {
        if self.normals.is_empty() {
            return None;
        }
        let [i0, i1, i2] = self.triangles[tri];
        let n = self.normals[i2] * (1.0 - u - v) + self.normals[i0] * u + self.normals[i1] * v;
        Some(n.safe_normalize())
    }

    /// Position derivatives with respect to the barycentric coordinates.
    ///
    /// * `tri`  - Triangle index.
    /// * `time` - Time in [0, 1].
    pub fn dpdudv(&self, tri: usize, time: Float) -> (Vector3f, Vector3f) {
        let [v0, v1, v2] = self.triangle_verts(tri, time);
        (v0 - v2, v1 - v2)
    }

    /// Normal derivatives with respect to the barycentric coordinates; zero
    /// without vertex normals.
    ///
    /// * `tri` - Triangle index.
    pub fn dndudv(&self, tri: usize) -> (Vector3f, Vector3f) {
        if self.normals.is_empty() {
            return (Vector3f::zero(), Vector3f::zero());
        }
        let [i0, i1, i2] = self.triangles[tri];
        (
            self.normals[i0] - self.normals[i2],
            self.normals[i1] - self.normals[i2],
        )
    }

    /// Texture coordinate at barycentric coordinates, or `None` without
    /// texture coordinates.
    ///
    /// * `tri` - Triangle index.
    /// * `u`   - First barycentric coordinate.
    /// * `v`   - Second barycentric coordinate.
    pub fn uv(&self, tri: usize, u: Float, v: Float) -> Option<(Point2f, Point2f, Point2f)> {
        if self.uvs.is_empty() {
            return None;
        }
        let [i0, i1, i2] = self.triangles[tri];
        let (t0, t1, t2) = (self.uvs[i0], self.uvs[i1], self.uvs[i2]);
        let st = t0 * u + t1 * v + t2 * (1.0 - u - v);
        Some((st, t0 - t2, t1 - t2))
    }

    /// Refine a hit position by re-intersecting the triangle plane from the
    /// ray's estimated hit point. `p` and `d` must be in the mesh's space.
    ///
    /// * `tri`  - Triangle index.
    /// * `p`    - Ray origin.
    /// * `d`    - Ray direction.
    /// * `t`    - Hit distance.
    /// * `time` - Time in [0, 1].
    pub fn refine(&self, tri: usize, p: Point3f, d: Vector3f, t: Float, time: Float) -> Point3f {
        let p = p + d * t;
        let [v0, v1, v2] = self.triangle_verts(tri, time);
        let edge1 = v0 - v2;
        let edge2 = v1 - v2;
        let tvec = p - v2;
        let qvec = tvec.cross(&edge1);
        let pvec = d.cross(&edge2);
        let det = edge1.dot(&pvec);
        if det != 0.0 {
            p + d * (edge2.dot(&qvec) / det)
        } else {
            p
        }
    }

    /// Surface area of a triangle.
    ///
    /// * `tri` - Triangle index.
    /// * `tfm` - Transform applied to the vertices first.
    pub fn triangle_area(&self, tri: usize, tfm: &Transform) -> Float {
        let [v0, v1, v2] = self.triangle_verts(tri, 0.5);
        let (v0, v1, v2) = (
            tfm.transform_point(&v0),
            tfm.transform_point(&v1),
            tfm.transform_point(&v2),
        );
        0.5 * (v1 - v0).cross(&(v2 - v0)).length()
    }

    /// Transform positions and normals in place. Winding is kept, so a
    /// negative scale flips the geometric normal.
    ///
    /// * `tfm` - Transform.
    pub fn apply_transform(&mut self, tfm: &Transform) {
        for v in self.verts.iter_mut() {
            *v = tfm.transform_point(v);
        }
        for step in self.motion_verts.iter_mut() {
            for v in step.iter_mut() {
                *v = tfm.transform_point(v);
            }
        }
        let itfm = tfm.inverse();
        for n in self.normals.iter_mut() {
            *n = itfm.transform_direction_transposed(n).safe_normalize();
        }
    }

    /// Build a UV sphere centered at the origin with outward winding and
    /// smooth normals.
    ///
    /// * `radius`   - Radius.
    /// * `segments` - Number of longitudinal segments (at least 3).
    /// * `rings`    - Number of latitudinal rings (at least 2).
    /// * `shader`   - Shader index.
    pub fn uv_sphere(radius: Float, segments: usize, rings: usize, shader: usize) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut verts = Vec::with_capacity((segments + 1) * (rings + 1));
        let mut normals = Vec::with_capacity(verts.capacity());
        let mut uvs = Vec::with_capacity(verts.capacity());

        for r in 0..=rings {
            let v = r as Float / rings as Float;
            let theta = v * PI;
            for s in 0..=segments {
                let u = s as Float / segments as Float;
                let phi = u * TWO_PI;
                let n = Normal3f::new(theta.sin() * phi.cos(), theta.sin() * phi.sin(), theta.cos());
                verts.push(n * radius);
                normals.push(n);
                uvs.push(Point2f::new(u, v));
            }
        }

        let stride = segments + 1;
        let mut triangles = Vec::with_capacity(segments * rings * 2);
        for r in 0..rings {
            for s in 0..segments {
                let a = r * stride + s;
                let b = a + stride;
                if r != 0 {
                    triangles.push([a, b, a + 1]);
                }
                if r != rings - 1 {
                    triangles.push([a + 1, b, b + 1]);
                }
            }
        }

        let mut mesh = Self::new(verts, triangles, shader);
        mesh.normals = normals;
        mesh.uvs = uvs;
        mesh.smooth = true;
        mesh
    }

    /// Build a quad from a corner and two edges. The front face points
    /// along `edge_u x edge_v`.
    ///
    /// * `corner` - First corner.
    /// * `edge_u` - First edge.
    /// * `edge_v` - Second edge.
    /// * `shader` - Shader index.
    pub fn quad(corner: Point3f, edge_u: Vector3f, edge_v: Vector3f, shader: usize) -> Self {
        let verts = vec![
            corner,
            corner + edge_u,
            corner + edge_u + edge_v,
            corner + edge_v,
        ];
        let mut mesh = Self::new(verts, vec![[0, 1, 2], [0, 2, 3]], shader);
        mesh.uvs = vec![
            Point2f::new(0.0, 0.0),
            Point2f::new(1.0, 0.0),
            Point2f::new(1.0, 1.0),
            Point2f::new(0.0, 1.0),
        ];
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    fn unit_quad() -> TriangleMesh {
        TriangleMesh::quad(
            Point3f::new(-1.0, -1.0, 0.0),
            Vector3f::new(2.0, 0.0, 0.0),
            Vector3f::new(0.0, 2.0, 0.0),
            0,
        )
    }

    #[test]
    fn quad_faces_up() {
        let q = unit_quad();
        let n = q.triangle_normal(0, 0.0);
        assert!(approx_eq!(f32, n.z, 1.0, epsilon = 1e-6));
        assert!(approx_eq!(f32, q.triangle_area(0, &IDENTITY_TRANSFORM), 2.0, epsilon = 1e-5));
    }

    #[test]
    fn barycentric_convention() {
        let q = unit_quad();
        let [v0, v1, v2] = q.triangle_verts(0, 0.0);
        assert_eq!(q.triangle_point(0, 1.0, 0.0, 0.0), v0);
        assert_eq!(q.triangle_point(0, 0.0, 1.0, 0.0), v1);
        assert_eq!(q.triangle_point(0, 0.0, 0.0, 0.0), v2);
        let (dpdu, dpdv) = q.dpdudv(0, 0.0);
        assert_eq!(dpdu, v0 - v2);
        assert_eq!(dpdv, v1 - v2);
    }

    #[test]
    fn refine_lands_on_plane() {
        let q = unit_quad();
        let p = Point3f::new(0.2, 0.1, 5.0);
        let d = Vector3f::new(0.0, 0.0, -1.0);
        let hit = q.refine(0, p, d, 4.99, 0.0);
        assert!(hit.z.abs() < 1e-5);
    }

    #[test]
    fn motion_vertices_interpolate() {
        let mut q = unit_quad();
        let moved: Vec<Point3f> = q.verts.iter().map(|v| *v + Vector3f::new(0.0, 0.0, 2.0)).collect();
        q.motion_verts = vec![q.verts.clone(), moved];
        let [v0, _, _] = q.triangle_verts(0, 0.5);
        assert!(approx_eq!(f32, v0.z, 1.0, epsilon = 1e-6));
    }

    #[test]
    fn sphere_winding_is_outward() {
        let s = TriangleMesh::uv_sphere(2.0, 12, 8, 0);
        for tri in 0..s.num_triangles() {
            let c = s.triangle_point(tri, 1.0 / 3.0, 1.0 / 3.0, 0.0);
            assert!(s.triangle_normal(tri, 0.0).dot(&c) > 0.0, "triangle {tri}");
        }
    }

    #[test]
    fn flat_mesh_has_no_normal_derivatives() {
        let q = unit_quad();
        assert!(q.smooth_normal(0, 0.3, 0.3).is_none());
        assert_eq!(q.dndudv(0), (Vector3f::zero(), Vector3f::zero()));
    }
}
