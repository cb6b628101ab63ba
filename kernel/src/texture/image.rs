//! Image texture sampling

use crate::math::*;

/// Colour returned for textures that are missing or failed to load.
pub const TEX_IMAGE_MISSING: [Float; 4] = [1.0, 0.0, 1.0, 1.0];

/// Texel reconstruction filter.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Interpolation {
    /// Nearest texel.
    Closest,

    /// Bilinear.
    #[default]
    Linear,

    /// Bicubic B-spline.
    Cubic,

    /// Cubic when magnified, linear otherwise.
    Smart,
}

/// Handling of coordinates outside [0, 1].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Extension {
    /// Tile the image.
    #[default]
    Repeat,

    /// Clamp to the edge texels.
    Extend,

    /// Transparent black outside the image.
    Clip,
}

/// An RGBA float image bound to a texture slot.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageTexture {
    /// Width in texels.
    pub width: usize,

    /// Height in texels.
    pub height: usize,

    /// Texels in row major order, row 0 at the bottom (y = 0).
    pub pixels: Vec<[Float; 4]>,

    /// Reconstruction filter.
    pub interpolation: Interpolation,

    /// Out of range handling.
    pub extension: Extension,
}

impl ImageTexture {
    /// Create a texture. A size mismatch results in the missing texture.
    ///
    /// * `width`         - Width in texels.
    /// * `height`        - Height in texels.
    /// * `pixels`        - Texels.
    /// * `interpolation` - Reconstruction filter.
    /// * `extension`     - Out of range handling.
    pub fn new(
        width: usize,
        height: usize,
        pixels: Vec<[Float; 4]>,
        interpolation: Interpolation,
        extension: Extension,
    ) -> Self {
        if width == 0 || height == 0 || pixels.len() != width * height {
            warn!("Texture pixel count does not match {width}x{height}");
            return Self::missing(interpolation, extension);
        }
        Self {
            width,
            height,
            pixels,
            interpolation,
            extension,
        }
    }

    /// A single magenta texel.
    ///
    /// * `interpolation` - Reconstruction filter.
    /// * `extension`     - Out of range handling.
    pub fn missing(interpolation: Interpolation, extension: Extension) -> Self {
        Self {
            width: 1,
            height: 1,
            pixels: vec![TEX_IMAGE_MISSING],
            interpolation,
            extension,
        }
    }

    /// Size of the texel data in bytes.
    pub fn memory_size(&self) -> usize {
        self.pixels.len() * std::mem::size_of::<[Float; 4]>()
    }

    /// Fetch a texel with the extension mode applied to integer
    /// coordinates.
    fn texel(&self, x: i64, y: i64) -> [Float; 4] {
        let (w, h) = (self.width as i64, self.height as i64);
        let (x, y) = match self.extension {
            Extension::Repeat => (x.rem_euclid(w), y.rem_euclid(h)),
            Extension::Extend => (x.clamp(0, w - 1), y.clamp(0, h - 1)),
            Extension::Clip => {
                if x < 0 || y < 0 || x >= w || y >= h {
                    return [0.0; 4];
                }
                (x, y)
            }
        };
        self.pixels[(y * w + x) as usize]
    }

    /// Sample the texture.
    ///
    /// * `x`         - Horizontal coordinate.
    /// * `y`         - Vertical coordinate.
    /// * `footprint` - Pixel footprint in texture coordinates.
    pub fn lookup(&self, x: Float, y: Float, footprint: Float) -> [Float; 4] {
        if !(x.is_finite() && y.is_finite()) {
            return TEX_IMAGE_MISSING;
        }

        // Bring coordinates into [0, 1] before they become texel indices.
        let (x, y) = match self.extension {
            Extension::Repeat => (x.rem_euclid(1.0), y.rem_euclid(1.0)),
            Extension::Extend => (x.clamp(0.0, 1.0), y.clamp(0.0, 1.0)),
            Extension::Clip => {
                if !((0.0..=1.0).contains(&x) && (0.0..=1.0).contains(&y)) {
                    return [0.0; 4];
                }
                (x, y)
            }
        };

        let interpolation = match self.interpolation {
            Interpolation::Smart => {
                // A footprint of less than a texel means the image is magnified.
                let texels = footprint * self.width.max(self.height) as Float;
                if texels < 1.0 {
                    Interpolation::Cubic
                } else {
                    Interpolation::Linear
                }
            }
            other => other,
        };

        match interpolation {
            Interpolation::Closest => {
                let ix = (x * self.width as Float).floor() as i64;
                let iy = (y * self.height as Float).floor() as i64;
                self.texel(ix, iy)
            }
            Interpolation::Cubic => self.lookup_cubic(x, y),
            _ => self.lookup_linear(x, y),
        }
    }

    fn lookup_linear(&self, x: Float, y: Float) -> [Float; 4] {
        let px = x * self.width as Float - 0.5;
        let py = y * self.height as Float - 0.5;
        let (fx, fy) = (px.floor(), py.floor());
        let (tx, ty) = (px - fx, py - fy);
        let (ix, iy) = (fx as i64, fy as i64);

        let weights = [
            ((ix, iy), (1.0 - tx) * (1.0 - ty)),
            ((ix + 1, iy), tx * (1.0 - ty)),
            ((ix, iy + 1), (1.0 - tx) * ty),
            ((ix + 1, iy + 1), tx * ty),
        ];
        let mut out = [0.0; 4];
        for ((sx, sy), w) in weights {
            accumulate(&mut out, &self.texel(sx, sy), w);
        }
        out
    }

    fn lookup_cubic(&self, x: Float, y: Float) -> [Float; 4] {
        let px = x * self.width as Float - 0.5;
        let py = y * self.height as Float - 0.5;
        let (fx, fy) = (px.floor(), py.floor());
        let wx = cubic_bspline_weights(px - fx);
        let wy = cubic_bspline_weights(py - fy);
        let (ix, iy) = (fx as i64, fy as i64);

        let mut out = [0.0; 4];
        for (j, wyj) in wy.iter().enumerate() {
            for (i, wxi) in wx.iter().enumerate() {
                let t = self.texel(ix + i as i64 - 1, iy + j as i64 - 1);
                accumulate(&mut out, &t, wxi * wyj);
            }
        }
        out
    }
}

/// Uniform cubic B-spline weights for the four texels around a sample.
///
/// * `t` - Fractional position in [0, 1).
fn cubic_bspline_weights(t: Float) -> [Float; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    [
        (-t3 + 3.0 * t2 - 3.0 * t + 1.0) / 6.0,
        (3.0 * t3 - 6.0 * t2 + 4.0) / 6.0,
        (-3.0 * t3 + 3.0 * t2 + 3.0 * t + 1.0) / 6.0,
        t3 / 6.0,
    ]
}

#[inline(always)]
fn accumulate(out: &mut [Float; 4], t: &[Float; 4], w: Float) {
    for c in 0..4 {
        out[c] += t[c] * w;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;

    fn ramp(interpolation: Interpolation, extension: Extension) -> ImageTexture {
        // 2x1 image: black then white.
        ImageTexture::new(2, 1, vec![[0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0]], interpolation, extension)
    }

    #[test]
    fn closest_picks_texel() {
        let t = ramp(Interpolation::Closest, Extension::Repeat);
        assert_eq!(t.lookup(0.2, 0.5, 0.0)[0], 0.0);
        assert_eq!(t.lookup(0.8, 0.5, 0.0)[0], 1.0);
    }

    #[test]
    fn linear_blends_between_centers() {
        let t = ramp(Interpolation::Linear, Extension::Extend);
        assert!(approx_eq!(f32, t.lookup(0.5, 0.5, 0.0)[0], 0.5, epsilon = 1e-5));
        assert!(approx_eq!(f32, t.lookup(0.0, 0.5, 0.0)[0], 0.0, epsilon = 1e-5));
    }

    #[test]
    fn repeat_wraps() {
        let t = ramp(Interpolation::Closest, Extension::Repeat);
        assert_eq!(t.lookup(1.8, 0.5, 0.0)[0], 1.0);
        assert_eq!(t.lookup(-0.2, 0.5, 0.0)[0], 1.0);
    }

    #[test]
    fn clip_is_black_outside() {
        let t = ramp(Interpolation::Linear, Extension::Clip);
        assert_eq!(t.lookup(1.5, 0.5, 0.0), [0.0; 4]);
        assert_eq!(t.lookup(0.5, -0.1, 0.0), [0.0; 4]);
    }

    #[test]
    fn extreme_coordinates_stay_in_range() {
        for interpolation in [Interpolation::Closest, Interpolation::Linear, Interpolation::Cubic] {
            for extension in [Extension::Repeat, Extension::Extend, Extension::Clip] {
                let t = ramp(interpolation, extension);
                assert_eq!(t.lookup(Float::INFINITY, 0.5, 0.0), TEX_IMAGE_MISSING);
                assert_eq!(t.lookup(0.5, Float::NEG_INFINITY, 0.0), TEX_IMAGE_MISSING);
                assert_eq!(t.lookup(Float::NAN, 0.5, 0.0), TEX_IMAGE_MISSING);
                for (x, y) in [(1e30, 0.5), (-1e30, 0.5), (0.5, 1e30), (Float::MAX, Float::MIN)] {
                    assert!(t.lookup(x, y, 0.0).iter().all(|c| c.is_finite()));
                }
            }
        }
        let t = ramp(Interpolation::Linear, Extension::Extend);
        assert!(approx_eq!(f32, t.lookup(1e30, 0.5, 0.0)[0], 1.0, epsilon = 1e-5));
        assert!(approx_eq!(f32, t.lookup(-1e30, 0.5, 0.0)[0], 0.0, epsilon = 1e-5));
    }

    #[test]
    fn bspline_weights_sum_to_one() {
        for t in [0.0, 0.25, 0.5, 0.99] {
            let s: Float = cubic_bspline_weights(t).iter().sum();
            assert!(approx_eq!(f32, s, 1.0, epsilon = 1e-5));
        }
    }

    #[test]
    fn cubic_preserves_constant() {
        let t = ImageTexture::new(3, 3, vec![[0.25; 4]; 9], Interpolation::Smart, Extension::Extend);
        let v = t.lookup(0.4, 0.6, 0.0);
        assert!(approx_eq!(f32, v[2], 0.25, epsilon = 1e-5));
    }

    #[test]
    fn size_mismatch_is_missing() {
        let t = ImageTexture::new(4, 4, vec![[0.0; 4]; 3], Interpolation::Linear, Extension::Repeat);
        assert_eq!(t.lookup(0.5, 0.5, 0.0), TEX_IMAGE_MISSING);
    }
}
