//! Random Number Generators.
//!
//! Path sampling uses a stateless hash of `(pixel seed, sample, dimension)`
//! so that every path vertex can be revisited in any order. Shaders that
//! need extra randomness step a small LCG seeded from the same values.

use crate::math::*;

/// Dimensions consumed by the camera before the first bounce.
pub const PRNG_FILTER_U: u32 = 0;
pub const PRNG_FILTER_V: u32 = 1;
pub const PRNG_LENS_U: u32 = 2;
pub const PRNG_LENS_V: u32 = 3;
pub const PRNG_TIME: u32 = 4;

/// First dimension used by bounce sampling.
pub const PRNG_BASE_NUM: u32 = 10;

/// Dimensions consumed at each bounce, relative to the path's `rng_offset`.
pub const PRNG_BSDF_U: u32 = 0;
pub const PRNG_BSDF_V: u32 = 1;
pub const PRNG_LIGHT_U: u32 = 2;
pub const PRNG_LIGHT_V: u32 = 3;
pub const PRNG_LIGHT_TERMINATE: u32 = 4;
pub const PRNG_TERMINATE: u32 = 5;
pub const PRNG_PHASE_CHANNEL: u32 = 6;
pub const PRNG_SCATTER_DISTANCE: u32 = 7;
pub const PRNG_BSDF: u32 = 8;

/// Number of dimensions consumed per bounce.
pub const PRNG_BOUNCE_NUM: u32 = 9;

#[inline(always)]
fn mix(a: &mut u32, b: &mut u32, c: &mut u32) {
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(14));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(11));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(25));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(16));
    *a ^= *c;
    *a = a.wrapping_sub(c.rotate_left(4));
    *b ^= *a;
    *b = b.wrapping_sub(a.rotate_left(14));
    *c ^= *b;
    *c = c.wrapping_sub(b.rotate_left(24));
}

/// Hash two integers.
///
/// * `kx` - First key.
/// * `ky` - Second key.
pub fn hash_uint2(kx: u32, ky: u32) -> u32 {
    let init = 0xdeadbeef_u32.wrapping_add((2 << 2) + 13);
    let (mut a, mut b, mut c) = (init.wrapping_add(kx), init.wrapping_add(ky), init);
    mix(&mut a, &mut b, &mut c);
    c
}

/// Hash three integers.
///
/// * `kx` - First key.
/// * `ky` - Second key.
/// * `kz` - Third key.
pub fn hash_uint3(kx: u32, ky: u32, kz: u32) -> u32 {
    let init = 0xdeadbeef_u32.wrapping_add((3 << 2) + 13);
    let (mut a, mut b, mut c) = (
        init.wrapping_add(kx),
        init.wrapping_add(ky),
        init.wrapping_add(kz),
    );
    mix(&mut a, &mut b, &mut c);
    c
}

/// Map 32 random bits to [0, 1).
#[inline(always)]
fn bits_to_float(bits: u32) -> Float {
    min(ONE_MINUS_EPSILON, bits as Float * hexf32!("0x1p-32"))
}

/// Returns a random number for a dimension of one path sample.
///
/// * `rng_hash`  - Per-pixel seed.
/// * `sample`    - Sample index.
/// * `dimension` - Sample dimension.
pub fn path_rng_1d(rng_hash: u32, sample: u32, dimension: u32) -> Float {
    bits_to_float(hash_uint3(rng_hash, sample, dimension))
}

/// Returns a pair of random numbers using dimensions `dimension` and
/// `dimension + 1`.
///
/// * `rng_hash`  - Per-pixel seed.
/// * `sample`    - Sample index.
/// * `dimension` - First sample dimension.
pub fn path_rng_2d(rng_hash: u32, sample: u32, dimension: u32) -> (Float, Float) {
    (
        path_rng_1d(rng_hash, sample, dimension),
        path_rng_1d(rng_hash, sample, dimension + 1),
    )
}

/// Advance an LCG state and return the new state.
///
/// * `rng` - LCG state.
pub fn lcg_step_uint(rng: &mut u32) -> u32 {
    *rng = 1103515245_u32.wrapping_mul(*rng).wrapping_add(12345);
    *rng
}

/// Advance an LCG state and return a float in [0, 1].
///
/// * `rng` - LCG state.
pub fn lcg_step_float(rng: &mut u32) -> Float {
    lcg_step_uint(rng) as Float * (1.0 / u32::MAX as Float)
}

/// Seed an LCG for one shading point.
///
/// * `rng_hash`   - Per-pixel seed.
/// * `rng_offset` - Path dimension offset.
/// * `sample`     - Sample index.
/// * `scramble`   - Scramble constant.
pub fn lcg_state_init(rng_hash: u32, rng_offset: u32, sample: u32, scramble: u32) -> u32 {
    let mut rng = rng_hash
        .wrapping_add(rng_offset)
        .wrapping_add(sample.wrapping_mul(scramble));
    lcg_step_uint(&mut rng);
    rng
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_rng_depends_on_every_key() {
        let base = path_rng_1d(1, 2, 3);
        assert_ne!(base, path_rng_1d(2, 2, 3));
        assert_ne!(base, path_rng_1d(1, 3, 3));
        assert_ne!(base, path_rng_1d(1, 2, 4));
    }

    #[test]
    fn path_rng_mean_is_near_half() {
        let n = 4096;
        let sum: Float = (0..n).map(|s| path_rng_1d(0x1234, s, PRNG_BASE_NUM)).sum();
        let mean = sum / n as Float;
        assert!((mean - 0.5).abs() < 0.03, "mean = {mean}");
    }

    proptest! {
        #[test]
        fn path_rng_in_unit_interval(h in 0u32..u32::MAX, s in 0u32..1024, d in 0u32..64) {
            let v = path_rng_1d(h, s, d);
            prop_assert!((0.0..1.0).contains(&v));
        }
    }
}
