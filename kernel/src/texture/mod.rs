//! Image textures

mod error;
mod image;
mod io;

// Re-export
pub use error::*;
pub use image::*;
pub use io::*;

use crate::math::*;

/// Read access to the textures bound to the kernel.
pub trait TextureLookup {
    /// Returns the texture bound to a slot, if any.
    ///
    /// * `slot` - Texture slot.
    fn texture(&self, slot: usize) -> Option<&ImageTexture>;

    /// Sample a texture. Unbound slots return `TEX_IMAGE_MISSING`.
    ///
    /// * `slot`      - Texture slot.
    /// * `x`         - Horizontal texture coordinate.
    /// * `y`         - Vertical texture coordinate.
    /// * `footprint` - Size of the pixel footprint in texture coordinates,
    ///                 from the ray differentials; 0 if unknown.
    fn lookup(&self, slot: usize, x: Float, y: Float, footprint: Float) -> [Float; 4] {
        match self.texture(slot) {
            Some(texture) => texture.lookup(x, y, footprint),
            None => TEX_IMAGE_MISSING,
        }
    }
}

impl TextureLookup for Vec<Option<std::sync::Arc<ImageTexture>>> {
    fn texture(&self, slot: usize) -> Option<&ImageTexture> {
        self.get(slot).and_then(|t| t.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn unbound_slot_is_magenta() {
        let textures: Vec<Option<Arc<ImageTexture>>> = vec![None];
        assert_eq!(textures.lookup(0, 0.5, 0.5, 0.0), TEX_IMAGE_MISSING);
        assert_eq!(textures.lookup(7, 0.5, 0.5, 0.0), TEX_IMAGE_MISSING);
    }

    #[test]
    fn bound_slot_is_sampled() {
        let white = ImageTexture::new(
            1,
            1,
            vec![[1.0; 4]],
            Interpolation::Linear,
            Extension::Repeat,
        );
        let textures = vec![Some(Arc::new(white))];
        assert_eq!(textures.lookup(0, 0.3, 0.9, 0.0), [1.0; 4]);
    }
}
