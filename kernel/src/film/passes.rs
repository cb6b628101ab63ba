//! Render passes

use super::CryptomatteFlags;
use crate::closure::NUM_LIGHT_PASSES;
use crate::math::*;
use crate::spectrum::*;

/// Film settings that determine the render buffer layout.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FilmSettings {
    /// Write a depth pass.
    pub use_depth: bool,

    /// Write denoising feature passes.
    pub use_denoising: bool,

    /// Write emission, background and the direct and indirect light of
    /// every closure class.
    pub use_light_passes: bool,

    /// Cryptomatte layers and accuracy mode.
    pub cryptomatte: CryptomatteFlags,

    /// Number of (id, weight) pairs per cryptomatte layer, in pairs of two.
    pub cryptomatte_depth: usize,

    /// Exposure applied when converting the film.
    pub exposure: Float,
}

impl Default for FilmSettings {
    fn default() -> Self {
        Self {
            use_depth: false,
            use_denoising: false,
            use_light_passes: false,
            cryptomatte: CryptomatteFlags::empty(),
            cryptomatte_depth: 0,
            exposure: 1.0,
        }
    }
}

/// Float offsets of the passes within one pixel of the render buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PassLayout {
    /// Floats per pixel.
    pub pass_stride: usize,

    /// Combined RGBA, always at offset 0.
    pub combined: usize,

    /// Depth.
    pub depth: Option<usize>,

    /// Denoising normal (3), albedo (3) and shadow (2).
    pub denoising: Option<usize>,

    /// Light passes: emission, background, then direct and indirect RGB
    /// per closure class.
    pub light: Option<usize>,

    /// First cryptomatte layer.
    pub cryptomatte: Option<usize>,

    /// Number of cryptomatte layers.
    pub cryptomatte_layers: usize,

    /// Floats per cryptomatte layer.
    pub cryptomatte_layer_size: usize,
}

/// Floats in the denoising feature block.
pub const DENOISING_PASS_SIZE: usize = 8;

/// Floats in the light pass block.
pub const LIGHT_PASS_SIZE: usize = 3 * (2 + 2 * NUM_LIGHT_PASSES);

impl PassLayout {
    /// Compute offsets for a film configuration.
    ///
    /// * `film` - Film settings.
    pub fn new(film: &FilmSettings) -> Self {
        let mut layout = Self {
            combined: 0,
            pass_stride: 4,
            ..Default::default()
        };
        if film.use_depth {
            layout.depth = Some(layout.pass_stride);
            layout.pass_stride += 1;
        }
        if film.use_denoising {
            layout.denoising = Some(layout.pass_stride);
            layout.pass_stride += DENOISING_PASS_SIZE;
        }
        if film.use_light_passes {
            layout.light = Some(layout.pass_stride);
            layout.pass_stride += LIGHT_PASS_SIZE;
        }
        let layers = film.cryptomatte.num_layers();
        if layers > 0 && film.cryptomatte_depth > 0 {
            layout.cryptomatte = Some(layout.pass_stride);
            layout.cryptomatte_layers = layers;
            layout.cryptomatte_layer_size = 4 * film.cryptomatte_depth;
            layout.pass_stride += layers * layout.cryptomatte_layer_size;
        }
        layout
    }

    /// Offset of a cryptomatte layer.
    ///
    /// * `layer` - Layer index.
    pub fn cryptomatte_layer(&self, layer: usize) -> Option<usize> {
        match self.cryptomatte {
            Some(offset) if layer < self.cryptomatte_layers => Some(offset + layer * self.cryptomatte_layer_size),
            _ => None,
        }
    }

    /// Number of (id, weight) slots per cryptomatte layer.
    pub fn cryptomatte_slots(&self) -> usize {
        self.cryptomatte_layer_size / ID_SLOT_SIZE
    }

    /// Index of a tile pixel's first float in the render buffer.
    ///
    /// * `offset` - Tile buffer offset in pixels.
    /// * `stride` - Tile buffer row stride in pixels.
    /// * `x`      - Pixel x.
    /// * `y`      - Pixel y.
    pub fn pixel_index(&self, offset: isize, stride: usize, x: usize, y: usize) -> usize {
        (offset + x as isize + (y * stride) as isize) as usize * self.pass_stride
    }
}

/// Floats per cryptomatte (id, weight) slot.
pub const ID_SLOT_SIZE: usize = 2;

/// Accumulate a colour into a pixel pass.
///
/// * `buffer` - One pixel of the render buffer starting at the pass.
/// * `value`  - Value to add.
#[inline]
pub fn write_pass_spectrum(buffer: &mut [Float], value: &Spectrum) {
    buffer[0] += value.r();
    buffer[1] += value.g();
    buffer[2] += value.b();
}

/// Accumulate a float into a pixel pass.
///
/// * `buffer` - One pixel of the render buffer starting at the pass.
/// * `value`  - Value to add.
#[inline]
pub fn write_pass_float(buffer: &mut [Float], value: Float) {
    buffer[0] += value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_only() {
        let layout = PassLayout::new(&FilmSettings::default());
        assert_eq!(layout.pass_stride, 4);
        assert_eq!(layout.depth, None);
        assert_eq!(layout.cryptomatte_layer(0), None);
    }

    #[test]
    fn all_passes() {
        let film = FilmSettings {
            use_depth: true,
            use_denoising: true,
            cryptomatte: CryptomatteFlags::OBJECT | CryptomatteFlags::MATERIAL,
            cryptomatte_depth: 2,
            ..Default::default()
        };
        let layout = PassLayout::new(&film);
        assert_eq!(layout.depth, Some(4));
        assert_eq!(layout.denoising, Some(5));
        assert_eq!(layout.cryptomatte, Some(13));
        assert_eq!(layout.cryptomatte_layer_size, 8);
        assert_eq!(layout.cryptomatte_slots(), 4);
        assert_eq!(layout.cryptomatte_layer(1), Some(21));
        assert_eq!(layout.pass_stride, 29);
    }

    #[test]
    fn light_passes_follow_denoising() {
        let film = FilmSettings {
            use_denoising: true,
            use_light_passes: true,
            cryptomatte: CryptomatteFlags::OBJECT,
            cryptomatte_depth: 1,
            ..Default::default()
        };
        let layout = PassLayout::new(&film);
        assert_eq!(layout.light, Some(12));
        assert_eq!(layout.cryptomatte, Some(12 + LIGHT_PASS_SIZE));
        assert_eq!(layout.pass_stride, 12 + LIGHT_PASS_SIZE + 4);
    }

    #[test]
    fn pixel_index_uses_stride() {
        let layout = PassLayout::new(&FilmSettings::default());
        assert_eq!(layout.pixel_index(0, 8, 2, 1), 40);
        assert_eq!(layout.pixel_index(-2, 8, 2, 1), 32);
    }
}
