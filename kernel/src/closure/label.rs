//! Scattering event labels

bitflags! {
    /// Classification of a sampled scattering event. `NONE` (empty) means
    /// nothing was sampled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Label: u32 {
        const TRANSMIT = 1;
        const REFLECT = 2;
        const TRANSPARENT = 4;
        const DIFFUSE = 8;
        const GLOSSY = 16;
        const SINGULAR = 32;
        const VOLUME_SCATTER = 64;
    }
}

impl Label {
    /// No event.
    pub const NONE: Self = Self::empty();

    /// Returns true when no event was sampled.
    pub fn is_none(&self) -> bool {
        self.is_empty()
    }
}
