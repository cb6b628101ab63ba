//! Path ray flags

bitflags! {
    /// Ray type and history of a path. The low bits double as visibility
    /// flags matched against object visibility.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PathRayFlags: u32 {
        const CAMERA = 1 << 0;
        const REFLECT = 1 << 1;
        const TRANSMIT = 1 << 2;
        const DIFFUSE = 1 << 3;
        const GLOSSY = 1 << 4;
        const SINGULAR = 1 << 5;
        const TRANSPARENT = 1 << 6;
        const SHADOW_OPAQUE = 1 << 7;
        const SHADOW_TRANSPARENT = 1 << 8;
        const VOLUME_SCATTER = 1 << 9;

        const MIS_SKIP = 1 << 12;
        const DIFFUSE_ANCESTOR = 1 << 13;
        const STORE_SHADOW_INFO = 1 << 14;
    }
}

impl PathRayFlags {
    /// Flags that participate in visibility tests.
    pub const ALL_VISIBILITY: Self = Self::from_bits_truncate((1 << 10) - 1);

    /// Any shadow ray.
    pub const SHADOW: Self = Self::SHADOW_OPAQUE.union(Self::SHADOW_TRANSPARENT);
}
