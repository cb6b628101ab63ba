//! Per-thread kernel state

use crate::film::*;
use crate::math::*;

/// Counters gathered while tracing paths on one thread.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathStats {
    /// Number of camera paths traced.
    pub paths: u64,

    /// Samples whose radiance was not finite and was discarded.
    pub nan_samples: u64,

    /// Sum over paths of the throughput entering each bounce, weighted by
    /// the probability of surviving Russian roulette so far.
    pub expected_throughput: Vec<Float>,

    /// Sum of the radiance added at each bounce.
    pub bounce_contribution: Vec<Float>,

    /// Closures dropped because a shading point ran out of space.
    pub dropped_closures: u64,
}

impl PathStats {
    /// Record the expected throughput of a path entering a bounce.
    ///
    /// * `bounce` - Bounce index.
    /// * `value`  - Expected throughput.
    pub fn record_throughput(&mut self, bounce: u32, value: Float) {
        add_at(&mut self.expected_throughput, bounce as usize, value);
    }

    /// Record radiance added at a bounce.
    ///
    /// * `bounce` - Bounce index.
    /// * `value`  - Average of the added radiance.
    pub fn record_contribution(&mut self, bounce: u32, value: Float) {
        add_at(&mut self.bounce_contribution, bounce as usize, value);
    }

    /// Add the counters of another thread.
    ///
    /// * `other` - Counters to add.
    pub fn merge(&mut self, other: &Self) {
        self.paths += other.paths;
        self.nan_samples += other.nan_samples;
        self.dropped_closures += other.dropped_closures;
        for (i, v) in other.expected_throughput.iter().enumerate() {
            add_at(&mut self.expected_throughput, i, *v);
        }
        for (i, v) in other.bounce_contribution.iter().enumerate() {
            add_at(&mut self.bounce_contribution, i, *v);
        }
    }
}

fn add_at(values: &mut Vec<Float>, index: usize, value: Float) {
    if values.len() <= index {
        values.resize(index + 1, 0.0);
    }
    values[index] += value;
}

/// Mutable state owned by one worker thread and passed by reference to the
/// kernels it runs: cryptomatte coverage of the current tile and path
/// statistics.
#[derive(Clone, Debug, Default)]
pub struct ThreadContext {
    /// Tile rectangle the coverage maps cover.
    tile: (usize, usize, usize, usize),

    /// Coverage maps per tile pixel, one per cryptomatte layer.
    coverage: Vec<Vec<CoverageMap>>,

    /// Path statistics.
    pub stats: PathStats,
}

impl ThreadContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare for rendering a tile. Coverage maps are only kept when the
    /// film accumulates accurate cryptomatte coverage.
    ///
    /// * `film`   - Film settings.
    /// * `layout` - Pass layout.
    /// * `x`      - Tile x.
    /// * `y`      - Tile y.
    /// * `w`      - Tile width.
    /// * `h`      - Tile height.
    pub fn begin_tile(&mut self, film: &FilmSettings, layout: &PassLayout, x: usize, y: usize, w: usize, h: usize) {
        self.tile = (x, y, w, h);
        self.coverage.clear();
        if film.cryptomatte.contains(CryptomatteFlags::ACCURATE) && layout.cryptomatte_layers > 0 {
            self.coverage
                .resize_with(w * h, || vec![CoverageMap::new(); layout.cryptomatte_layers]);
        }
    }

    /// Returns true if accurate coverage is being accumulated.
    pub fn has_coverage(&self) -> bool {
        !self.coverage.is_empty()
    }

    /// Coverage maps of a pixel in the current tile.
    ///
    /// * `x` - Pixel x.
    /// * `y` - Pixel y.
    pub fn coverage_mut(&mut self, x: usize, y: usize) -> Option<&mut [CoverageMap]> {
        let (tx, ty, tw, th) = self.tile;
        if x < tx || y < ty || x >= tx + tw || y >= ty + th {
            return None;
        }
        let index = (x - tx) + (y - ty) * tw;
        self.coverage.get_mut(index).map(|c| c.as_mut_slice())
    }

    /// Write the accumulated coverage of the current tile into its buffer,
    /// sorted by descending weight. Called once after the last sample.
    ///
    /// * `layout` - Pass layout.
    /// * `buffer` - Tile buffer.
    /// * `offset` - Tile buffer offset in pixels.
    /// * `stride` - Tile buffer row stride in pixels.
    pub fn write_coverage(&mut self, layout: &PassLayout, buffer: &mut [Float], offset: isize, stride: usize) {
        let (tx, ty, tw, th) = self.tile;
        let slots = layout.cryptomatte_slots();
        for y in ty..ty + th {
            for x in tx..tx + tw {
                let Some(maps) = self.coverage.get((x - tx) + (y - ty) * tw) else {
                    continue;
                };
                let pixel = layout.pixel_index(offset, stride, x, y);
                for (layer, map) in maps.iter().enumerate() {
                    let Some(start) = layout.cryptomatte_layer(layer).map(|o| pixel + o) else {
                        continue;
                    };
                    if let Some(out) = buffer.get_mut(start..start + slots * ID_SLOT_SIZE) {
                        flatten_coverage(map, out);
                    }
                }
            }
        }
        for maps in self.coverage.iter_mut() {
            maps.iter_mut().for_each(|m| m.clear());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordered_float::OrderedFloat;

    fn accurate_film() -> FilmSettings {
        FilmSettings {
            cryptomatte: CryptomatteFlags::OBJECT | CryptomatteFlags::ACCURATE,
            cryptomatte_depth: 1,
            ..Default::default()
        }
    }

    #[test]
    fn coverage_is_tile_local() {
        let film = accurate_film();
        let layout = PassLayout::new(&film);
        let mut ctx = ThreadContext::new();
        ctx.begin_tile(&film, &layout, 4, 4, 2, 2);
        assert!(ctx.has_coverage());
        assert!(ctx.coverage_mut(3, 4).is_none());
        assert!(ctx.coverage_mut(6, 4).is_none());
        assert_eq!(ctx.coverage_mut(5, 5).map(|c| c.len()), Some(1));
    }

    #[test]
    fn no_coverage_without_accurate_mode() {
        let film = FilmSettings {
            cryptomatte: CryptomatteFlags::OBJECT,
            cryptomatte_depth: 1,
            ..Default::default()
        };
        let layout = PassLayout::new(&film);
        let mut ctx = ThreadContext::new();
        ctx.begin_tile(&film, &layout, 0, 0, 2, 2);
        assert!(!ctx.has_coverage());
        assert!(ctx.coverage_mut(0, 0).is_none());
    }

    #[test]
    fn coverage_is_flattened_into_buffer() {
        let film = accurate_film();
        let layout = PassLayout::new(&film);
        let mut ctx = ThreadContext::new();
        ctx.begin_tile(&film, &layout, 0, 0, 1, 1);
        if let Some(maps) = ctx.coverage_mut(0, 0) {
            maps[0].insert(OrderedFloat(2.0), 0.25);
            maps[0].insert(OrderedFloat(3.0), 0.75);
        }
        let mut buffer = vec![0.0; layout.pass_stride];
        ctx.write_coverage(&layout, &mut buffer, 0, 1);
        let start = layout.cryptomatte.unwrap_or(0);
        assert_eq!(&buffer[start..start + 4], &[3.0, 0.75, 2.0, 0.25]);
    }

    #[test]
    fn stats_merge_extends() {
        let mut a = PathStats::default();
        a.record_throughput(0, 1.0);
        let mut b = PathStats::default();
        b.record_throughput(2, 0.5);
        b.paths = 3;
        a.merge(&b);
        assert_eq!(a.expected_throughput, vec![1.0, 0.0, 0.5]);
        assert_eq!(a.paths, 3);
    }
}
