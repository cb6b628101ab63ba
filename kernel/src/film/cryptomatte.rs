//! Cryptomatte

use super::ID_SLOT_SIZE;
use crate::math::*;
use itertools::Itertools;
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

bitflags! {
    /// Cryptomatte layers and accumulation mode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CryptomatteFlags: u32 {
        /// Object name layer.
        const OBJECT = 1 << 0;

        /// Material name layer.
        const MATERIAL = 1 << 1;

        /// Asset name layer.
        const ASSET = 1 << 2;

        /// Accumulate exact coverage per pixel and write it at the last
        /// sample instead of writing slots every sample.
        const ACCURATE = 1 << 3;
    }
}

impl CryptomatteFlags {
    /// Number of enabled layers.
    pub fn num_layers(&self) -> usize {
        (*self & (Self::OBJECT | Self::MATERIAL | Self::ASSET)).bits().count_ones() as usize
    }
}

/// Identifier of an empty slot.
pub const ID_NONE: Float = 0.0;

/// Per-pixel coverage: identifier to accumulated weight.
pub type CoverageMap = BTreeMap<OrderedFloat<Float>, Float>;

/// Hash a name to a float identifier. The exponent is clamped so the
/// result is always finite and never denormal.
///
/// * `name` - Name.
pub fn hash_name_float(name: &str) -> Float {
    let hash = murmur3_32(name.as_bytes(), 0);
    let mantissa = hash & ((1 << 23) - 1);
    let exponent = ((hash >> 23) & 0xff).clamp(1, 254) << 23;
    let sign = hash & (1 << 31);
    Float::from_bits(sign | exponent | mantissa)
}

/// MurmurHash3 x86 32-bit.
fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    let mut h = seed;
    let chunks = data.chunks_exact(4);
    let tail = chunks.remainder();
    for chunk in chunks {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let mut k = 0_u32;
    for (i, b) in tail.iter().enumerate() {
        k ^= (*b as u32) << (8 * i);
    }
    if !tail.is_empty() {
        k = k.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2);
        h ^= k;
    }

    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85ebca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2ae35);
    h ^= h >> 16;
    h
}

/// Add weight for an identifier to a run of (id, weight) slots kept sorted
/// by descending weight. The slot already holding `id` or the first empty
/// slot receives it. When the run is full the last slot absorbs the weight
/// and goes to the heavier of its identifier and `id`.
///
/// * `slots`  - `num_slots * ID_SLOT_SIZE` floats.
/// * `id`     - Identifier.
/// * `weight` - Weight.
/// * `init`   - Clear every slot first.
pub fn write_id_slots(slots: &mut [Float], id: Float, weight: Float, init: bool) {
    if weight == 0.0 {
        return;
    }

    if init {
        for slot in slots.chunks_exact_mut(ID_SLOT_SIZE) {
            slot[0] = ID_NONE;
            slot[1] = 0.0;
        }
    }

    let num_slots = slots.len() / ID_SLOT_SIZE;
    if num_slots == 0 {
        return;
    }

    let position = slots
        .chunks_exact(ID_SLOT_SIZE)
        .position(|slot| slot[1] == 0.0 || slot[0] == id);
    let mut index = position.unwrap_or(num_slots - 1);
    let slot = &mut slots[index * ID_SLOT_SIZE..(index + 1) * ID_SLOT_SIZE];
    if slot[1] == 0.0 || (position.is_none() && weight > slot[1]) {
        slot[0] = id;
    }
    slot[1] += weight;

    while index > 0 && slots[index * ID_SLOT_SIZE + 1] > slots[(index - 1) * ID_SLOT_SIZE + 1] {
        for k in 0..ID_SLOT_SIZE {
            slots.swap(index * ID_SLOT_SIZE + k, (index - 1) * ID_SLOT_SIZE + k);
        }
        index -= 1;
    }
}

/// Add weight for an identifier to a coverage map.
///
/// * `coverage` - Pixel coverage.
/// * `id`       - Identifier.
/// * `weight`   - Weight.
pub fn accumulate_coverage(coverage: &mut CoverageMap, id: Float, weight: Float) {
    *coverage.entry(OrderedFloat(id)).or_insert(0.0) += weight;
}

/// Write a pixel's coverage to its slots, heaviest first. Weight of
/// identifiers that do not fit is folded into the last slot.
///
/// * `coverage` - Pixel coverage.
/// * `slots`    - `num_slots * ID_SLOT_SIZE` floats of the layer.
pub fn flatten_coverage(coverage: &CoverageMap, slots: &mut [Float]) {
    if coverage.is_empty() {
        return;
    }

    let num_slots = slots.len() / ID_SLOT_SIZE;
    if num_slots == 0 {
        return;
    }

    let mut sorted: Vec<(Float, Float)> = coverage
        .iter()
        .map(|(id, weight)| (*weight, id.0))
        .sorted_by(|a, b| b.0.total_cmp(&a.0))
        .collect();

    if sorted.len() > num_slots {
        let leftover: Float = sorted[num_slots..].iter().map(|(w, _)| w).sum();
        sorted[num_slots - 1].0 += leftover;
        sorted.truncate(num_slots);
    }

    for (i, (weight, id)) in sorted.iter().enumerate() {
        write_id_slots(slots, *id, *weight, i == 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_finite_and_stable() {
        let a = hash_name_float("Cube");
        assert!(a.is_finite());
        assert!(a.is_normal());
        assert_eq!(a, hash_name_float("Cube"));
        assert_ne!(a, hash_name_float("Sphere"));
    }

    #[test]
    fn murmur_reference_values() {
        assert_eq!(murmur3_32(b"", 0), 0);
        assert_eq!(murmur3_32(b"", 1), 0x514e28b7);
        assert_eq!(murmur3_32(b"test", 0), 0xba6bd213);
    }

    #[test]
    fn id_slots_accumulate_and_fill() {
        let mut slots = [9.0; 4];
        write_id_slots(&mut slots, 3.0, 0.25, true);
        write_id_slots(&mut slots, 3.0, 0.25, false);
        write_id_slots(&mut slots, 5.0, 0.5, false);
        assert_eq!(slots, [3.0, 0.5, 5.0, 0.5]);
        write_id_slots(&mut slots, 7.0, 0.5, false);
        assert_eq!(slots, [5.0, 1.0, 3.0, 0.5]);
        write_id_slots(&mut slots, 7.0, 0.0, true);
        assert_eq!(slots, [5.0, 1.0, 3.0, 0.5]);
    }

    #[test]
    fn full_slots_stay_sorted_and_keep_weight() {
        let mut slots = [0.0; 4];
        write_id_slots(&mut slots, 1.0, 0.1, true);
        write_id_slots(&mut slots, 2.0, 0.3, false);
        assert_eq!(slots, [2.0, 0.3, 1.0, 0.1]);

        write_id_slots(&mut slots, 3.0, 0.6, false);
        assert_eq!(slots[0], 3.0);
        assert!((slots[1] - 0.7).abs() < 1e-6);
        assert_eq!(slots[2], 2.0);
        assert!((slots[3] - 0.3).abs() < 1e-6);
        assert!((slots[1] + slots[3] - 1.0).abs() < 1e-6);
    }

    proptest! {
        #[test]
        fn slots_sorted_and_weight_conserved(
            writes in proptest::collection::vec((1_u8..6, 0.01..1.0f32), 1..32),
            num_slots in 1_usize..4,
        ) {
            let mut slots = vec![0.0; num_slots * ID_SLOT_SIZE];
            let mut total = 0.0;
            for (id, weight) in writes.iter() {
                write_id_slots(&mut slots, *id as Float, *weight, false);
                total += *weight;
            }
            let weights: Vec<Float> = slots.chunks_exact(ID_SLOT_SIZE).map(|s| s[1]).collect();
            prop_assert!(weights.windows(2).all(|w| w[0] >= w[1]));
            let sum: Float = weights.iter().sum();
            prop_assert!((sum - total).abs() < 1e-3 * total.max(1.0));
        }
    }

    #[test]
    fn flatten_sorts_and_folds_overflow() {
        let mut coverage = CoverageMap::new();
        accumulate_coverage(&mut coverage, 1.0, 0.1);
        accumulate_coverage(&mut coverage, 2.0, 0.5);
        accumulate_coverage(&mut coverage, 3.0, 0.3);
        accumulate_coverage(&mut coverage, 4.0, 0.05);
        accumulate_coverage(&mut coverage, 4.0, 0.05);

        let mut slots = [0.0; 4];
        flatten_coverage(&coverage, &mut slots);
        assert_eq!(slots[0], 2.0);
        assert_eq!(slots[1], 0.5);
        assert_eq!(slots[2], 3.0);
        assert!((slots[3] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn layer_count() {
        let flags = CryptomatteFlags::OBJECT | CryptomatteFlags::ASSET | CryptomatteFlags::ACCURATE;
        assert_eq!(flags.num_layers(), 2);
    }
}
