//! Film conversion

use crate::math::*;
use half::f16;

/// Scale an accumulated pixel, apply exposure and encode as sRGB bytes.
///
/// * `rgba`         - Accumulated combined pass of one pixel.
/// * `sample_scale` - Inverse of the number of samples.
/// * `exposure`     - Exposure multiplier for colour.
#[inline]
pub fn convert_to_byte(rgba: &[Float], sample_scale: Float, exposure: Float) -> [u8; 4] {
    let mut out = [0_u8; 4];
    for c in 0..3 {
        let v = linear_to_srgb(rgba[c] * sample_scale * exposure);
        out[c] = (saturate(v) * 255.0) as u8;
    }
    out[3] = (saturate(rgba[3] * sample_scale) * 255.0) as u8;
    out
}

/// Scale an accumulated pixel, apply exposure and store as linear half
/// floats.
///
/// * `rgba`         - Accumulated combined pass of one pixel.
/// * `sample_scale` - Inverse of the number of samples.
/// * `exposure`     - Exposure multiplier for colour.
#[inline]
pub fn convert_to_half_float(rgba: &[Float], sample_scale: Float, exposure: Float) -> [f16; 4] {
    [
        f16::from_f32(rgba[0] * sample_scale * exposure),
        f16::from_f32(rgba[1] * sample_scale * exposure),
        f16::from_f32(rgba[2] * sample_scale * exposure),
        f16::from_f32(rgba[3] * sample_scale),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_is_scaled_and_clamped() {
        let px = convert_to_byte(&[4.0, 0.0, 100.0, 4.0], 0.25, 1.0);
        assert_eq!(px, [255, 0, 255, 255]);
        let mid = convert_to_byte(&[0.5, 0.5, 0.5, 0.5], 1.0, 1.0);
        assert!(mid[0] > 180 && mid[0] < 190);
        assert_eq!(mid[3], 127);
    }

    #[test]
    fn half_keeps_hdr() {
        let px = convert_to_half_float(&[8.0, 2.0, 0.0, 2.0], 0.5, 2.0);
        assert_eq!(px[0].to_f32(), 8.0);
        assert_eq!(px[1].to_f32(), 2.0);
        assert_eq!(px[3].to_f32(), 1.0);
    }
}
