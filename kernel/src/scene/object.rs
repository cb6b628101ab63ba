//! Objects

use crate::film::hash_name_float;
use crate::geometry::*;
use crate::path_state::PathRayFlags;
use crate::shader::ObjectFlags;

/// An instance of a geometry in the scene.
#[derive(Clone, Debug)]
pub struct ObjectData {
    /// Object name.
    pub name: String,

    /// Asset (parent) name used for cryptomatte.
    pub asset_name: String,

    /// Index of the instanced geometry.
    pub geometry: usize,

    /// Object to world transform.
    pub tfm: Transform,

    /// World to object transform.
    pub itfm: Transform,

    /// Transform interpolated over the shutter interval.
    pub motion: Option<MotionTransform>,

    /// Object flags.
    pub flags: ObjectFlags,

    /// Ray types the object is visible to.
    pub visibility: PathRayFlags,

    /// Object pass index.
    pub pass_id: u32,

    /// Cryptomatte object identifier.
    pub cryptomatte_object: f32,

    /// Cryptomatte asset identifier.
    pub cryptomatte_asset: f32,

    /// Constant velocity of the object's volume in meters per second.
    pub volume_velocity: Option<Vector3f>,
}

impl ObjectData {
    /// Create a static object.
    ///
    /// * `name`     - Object name.
    /// * `geometry` - Index of the instanced geometry.
    /// * `tfm`      - Object to world transform.
    pub fn new(name: &str, geometry: usize, tfm: Transform) -> Self {
        Self {
            name: String::from(name),
            asset_name: String::from(name),
            geometry,
            tfm,
            itfm: tfm.inverse(),
            motion: None,
            flags: ObjectFlags::empty(),
            visibility: PathRayFlags::ALL_VISIBILITY,
            pass_id: 0,
            cryptomatte_object: hash_name_float(name),
            cryptomatte_asset: hash_name_float(name),
            volume_velocity: None,
        }
    }

    /// Add transform motion blur.
    ///
    /// * `steps` - Transforms evenly spaced over the shutter interval.
    pub fn with_motion(mut self, steps: &[Transform]) -> Self {
        if steps.len() > 1 {
            self.motion = Some(MotionTransform::new(steps));
            self.flags |= ObjectFlags::OBJECT_MOTION;
        }
        self
    }

    /// Returns the object to world and world to object transforms at a
    /// given time.
    ///
    /// * `time` - Time in [0, 1].
    pub fn transforms_at(&self, time: f32) -> (Transform, Transform) {
        match (&self.motion, self.flags.contains(ObjectFlags::OBJECT_MOTION)) {
            (Some(motion), true) => {
                let tfm = motion.at(time);
                let itfm = tfm.inverse();
                (tfm, itfm)
            }
            _ => (self.tfm, self.itfm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    #[test]
    fn motion_interpolates_over_shutter() {
        let end = Transform::translate(&Vector3f::new(2.0, 0.0, 0.0));
        let object = ObjectData::new("moving", 0, IDENTITY_TRANSFORM).with_motion(&[IDENTITY_TRANSFORM, end]);
        assert!(object.flags.contains(ObjectFlags::OBJECT_MOTION));

        let (tfm, itfm) = object.transforms_at(0.5);
        let p = tfm.transform_point(&Point3f::zero());
        assert!(approx_eq!(f32, p.x, 1.0, epsilon = 1e-5));
        let back = itfm.transform_point(&p);
        assert!(approx_eq!(f32, back.x, 0.0, epsilon = 1e-5));
    }

    #[test]
    fn single_step_is_static() {
        let object = ObjectData::new("still", 0, IDENTITY_TRANSFORM).with_motion(&[IDENTITY_TRANSFORM]);
        assert!(object.motion.is_none());
        assert!(!object.flags.contains(ObjectFlags::OBJECT_MOTION));
    }
}
