//! Camera

use crate::geometry::*;
use crate::math::*;
use crate::sampling::concentric_sample_disk;

/// Perspective camera looking down +Z in camera space with +Y up.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    /// Camera to world transform.
    pub camera_to_world: Transform,

    /// Camera motion over the shutter interval.
    pub motion: Option<MotionTransform>,

    /// Vertical field of view in radians.
    pub fov: Float,

    /// Full frame width in pixels.
    pub width: usize,

    /// Full frame height in pixels.
    pub height: usize,

    /// Lens radius; 0 for a pinhole.
    pub aperture_size: Float,

    /// Distance to the plane of focus.
    pub focal_distance: Float,

    /// Fraction of the frame the shutter is open; `None` disables motion
    /// blur.
    pub shuttertime: Option<Float>,

    /// Inverse of the frame rate.
    pub inv_fps: Float,

    /// Offset of the shutter interval relative to the frame.
    pub motion_offset: Float,

    /// Near clip distance.
    pub clip_near: Float,

    /// Far clip distance.
    pub clip_far: Float,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            camera_to_world: IDENTITY_TRANSFORM,
            motion: None,
            fov: 0.8,
            width: 64,
            height: 64,
            aperture_size: 0.0,
            focal_distance: 1.0,
            shuttertime: None,
            inv_fps: 1.0 / 24.0,
            motion_offset: 0.0,
            clip_near: 1e-5,
            clip_far: FLT_MAX,
        }
    }
}

impl CameraSettings {
    /// Create a camera at `eye` looking at `target`.
    ///
    /// * `eye`    - Camera position.
    /// * `target` - Point to look at.
    /// * `up`     - Up vector.
    /// * `fov`    - Vertical field of view in radians.
    /// * `width`  - Frame width in pixels.
    /// * `height` - Frame height in pixels.
    pub fn look_at(
        eye: Point3f,
        target: Point3f,
        up: Vector3f,
        fov: Float,
        width: usize,
        height: usize,
    ) -> Self {
        let dir = (target - eye).normalize();
        let right = up.cross(&dir).normalize();
        let new_up = dir.cross(&right);
        let camera_to_world = Transform::new([
            [right.x, new_up.x, dir.x, eye.x],
            [right.y, new_up.y, dir.y, eye.y],
            [right.z, new_up.z, dir.z, eye.z],
        ]);
        Self {
            camera_to_world,
            fov,
            width,
            height,
            focal_distance: (target - eye).length(),
            ..Default::default()
        }
    }

    /// Camera space direction through a raster position.
    fn raster_direction(&self, x: Float, y: Float) -> Vector3f {
        let aspect = self.width as Float / self.height.max(1) as Float;
        let tan_half = (0.5 * self.fov).tan();
        let sx = (2.0 * x / self.width.max(1) as Float - 1.0) * tan_half * aspect;
        let sy = (1.0 - 2.0 * y / self.height.max(1) as Float) * tan_half;
        Vector3f::new(sx, sy, 1.0)
    }

    /// Map a random number to a time within the shutter interval. Returns
    /// the shutter center without motion blur.
    ///
    /// * `u` - Random number.
    pub fn sample_time(&self, u: Float) -> Float {
        match self.shuttertime {
            Some(_) => u,
            None => 0.5,
        }
    }

    /// Generate a world space camera ray with differentials.
    ///
    /// * `x`      - Raster x including the filter offset.
    /// * `y`      - Raster y including the filter offset.
    /// * `lens_u` - First lens random number.
    /// * `lens_v` - Second lens random number.
    /// * `time`   - Ray time.
    pub fn generate_ray(&self, x: Float, y: Float, lens_u: Float, lens_v: Float, time: Float) -> Ray {
        let tfm = match &self.motion {
            Some(motion) => motion.at(time),
            None => self.camera_to_world,
        };

        let d = self.raster_direction(x, y);
        let mut p = Point3f::zero();
        let mut dir = d.normalize();

        if self.aperture_size > 0.0 {
            let (lx, ly) = concentric_sample_disk(lens_u, lens_v);
            let lens = Point3f::new(lx * self.aperture_size, ly * self.aperture_size, 0.0);
            let focus = dir * (self.focal_distance / dir.z);
            p = lens;
            dir = (focus - lens).normalize();
        }

        let world_d = tfm.transform_direction(&dir).normalize();
        let mut ray = Ray::new(
            tfm.transform_point(&p),
            world_d,
            self.clip_far - self.clip_near,
            time,
        );
        ray.p = ray.at(self.clip_near);

        let ddx = tfm.transform_direction(&self.raster_direction(x + 1.0, y).normalize()).normalize();
        let ddy = tfm.transform_direction(&self.raster_direction(x, y + 1.0).normalize()).normalize();
        let center = tfm.transform_direction(&d.normalize()).normalize();
        ray.dd = Differential3 {
            dx: ddx - center,
            dy: ddy - center,
        };
        ray
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    #[test]
    fn center_ray_looks_at_target() {
        let cam = CameraSettings::look_at(
            Point3f::new(0.0, 0.0, -5.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            0.8,
            32,
            32,
        );
        let ray = cam.generate_ray(16.0, 16.0, 0.5, 0.5, 0.5);
        assert!(approx_eq!(f32, ray.d.z, 1.0, epsilon = 1e-5));
        assert!(ray.dd.dx.length() > 0.0);
        assert!(ray.dd.dx.x.abs() > ray.dd.dx.y.abs());
    }

    #[test]
    fn raster_y_points_down() {
        let cam = CameraSettings::look_at(
            Point3f::new(0.0, 0.0, -5.0),
            Point3f::new(0.0, 0.0, 0.0),
            Vector3f::new(0.0, 1.0, 0.0),
            0.8,
            32,
            32,
        );
        assert!(cam.generate_ray(16.0, 0.0, 0.5, 0.5, 0.5).d.y > 0.0);
        assert!(cam.generate_ray(16.0, 32.0, 0.5, 0.5, 0.5).d.y < 0.0);
    }

    #[test]
    fn time_is_shutter_center_without_blur() {
        let cam = CameraSettings::default();
        assert_eq!(cam.sample_time(0.1), 0.5);
    }
}
