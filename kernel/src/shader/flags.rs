//! Shading point flags

bitflags! {
    /// Constant properties of a shader.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderFlags: u32 {
        /// Interpolate vertex normals.
        const SMOOTH_NORMAL = 1 << 0;

        /// Surface emits light and takes part in light sampling.
        const HAS_EMISSION = 1 << 1;

        /// Shadow rays pass through the surface with its transparency.
        const HAS_TRANSPARENT_SHADOW = 1 << 2;

        /// Transparency is constant over the surface.
        const USE_UNIFORM_ALPHA = 1 << 3;

        /// Has a volume shader.
        const HAS_VOLUME = 1 << 4;

        /// Has a volume shader and no surface shader.
        const HAS_ONLY_VOLUME = 1 << 5;

        /// Has a displacement shader.
        const HAS_DISPLACEMENT = 1 << 6;

        /// Use the shader's bounce limits instead of the integrator's.
        const OVERRIDE_BOUNCES = 1 << 7;
    }
}

bitflags! {
    /// Constant properties of an object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ObjectFlags: u32 {
        /// Object renders as a holdout.
        const HOLDOUT_MASK = 1 << 0;

        /// Object transform changes over the shutter interval.
        const OBJECT_MOTION = 1 << 1;

        /// Geometry was baked into world space.
        const TRANSFORM_APPLIED = 1 << 2;

        /// The baked transform had a negative determinant.
        const NEGATIVE_SCALE_APPLIED = 1 << 3;

        /// Object has a volume shader.
        const HAS_VOLUME = 1 << 4;
    }
}

bitflags! {
    /// Properties of a shading point that change per evaluation.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuntimeFlags: u32 {
        /// The ray hit the back of the surface.
        const BACKFACING = 1 << 0;

        /// An emission closure was added.
        const EMISSION = 1 << 1;

        /// A BSDF closure was added.
        const BSDF = 1 << 2;

        /// A BSDF closure that can be evaluated (not singular) was added.
        const BSDF_HAS_EVAL = 1 << 3;

        /// A subsurface closure was added.
        const BSSRDF = 1 << 4;

        /// A holdout closure was added.
        const HOLDOUT = 1 << 5;

        /// A volume absorption or scattering closure was added.
        const EXTINCTION = 1 << 6;

        /// A volume phase closure was added.
        const SCATTER = 1 << 7;

        /// An ambient occlusion closure was added.
        const AO = 1 << 8;

        /// A transparent closure was added.
        const TRANSPARENT = 1 << 9;
    }
}

impl RuntimeFlags {
    /// Flags raised by adding a closure.
    ///
    /// * `closure` - The closure.
    pub fn from_closure(closure: &crate::closure::Closure) -> Self {
        let mut flags = Self::empty();
        if closure.is_bsdf() {
            flags |= Self::BSDF;
            if !closure.is_bsdf_singular() {
                flags |= Self::BSDF_HAS_EVAL;
            }
        }
        if closure.is_transparent() {
            flags |= Self::BSDF | Self::TRANSPARENT;
        }
        if closure.is_bssrdf() {
            flags |= Self::BSSRDF;
        }
        if closure.is_emission() {
            flags |= Self::EMISSION;
        }
        if closure.is_holdout() {
            flags |= Self::HOLDOUT;
        }
        if closure.is_ambient_occlusion() {
            flags |= Self::AO;
        }
        if closure.is_volume() {
            flags |= Self::EXTINCTION;
        }
        if closure.is_phase() {
            flags |= Self::SCATTER;
        }
        flags
    }
}
