//! Render tiles

use crossbeam_channel::{unbounded, Receiver, Sender};
use kernel::math::Float;

/// Size of the full frame rendered by a session.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BufferParams {
    /// Width in pixels.
    pub width: usize,

    /// Height in pixels.
    pub height: usize,

    /// Floats per pixel.
    pub pass_stride: usize,
}

impl BufferParams {
    /// Number of floats in a full frame buffer.
    pub fn buffer_len(&self) -> usize {
        self.width * self.height * self.pass_stride
    }
}

/// A rectangle of pixels with its own buffers, owned by one worker at a
/// time.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderTile {
    /// Tile index in the frame.
    pub index: usize,

    /// Left pixel.
    pub x: usize,

    /// Bottom pixel.
    pub y: usize,

    /// Width in pixels.
    pub w: usize,

    /// Height in pixels.
    pub h: usize,

    /// First sample to take.
    pub start_sample: u32,

    /// Number of samples to take.
    pub num_samples: u32,

    /// One past the last sample taken so far.
    pub sample: u32,

    /// Buffer offset in pixels, so that pixel (x, y) is at
    /// `offset + x + y * stride`.
    pub offset: isize,

    /// Buffer row stride in pixels.
    pub stride: usize,

    /// Floats per pixel.
    pub pass_stride: usize,

    /// Render buffer.
    pub buffer: Vec<Float>,

    /// Per-pixel RNG seeds.
    pub rng_state: Vec<u32>,
}

impl RenderTile {
    /// Create a tile with zeroed buffers.
    ///
    /// * `index`        - Tile index.
    /// * `x`            - Left pixel.
    /// * `y`            - Bottom pixel.
    /// * `w`            - Width.
    /// * `h`            - Height.
    /// * `start_sample` - First sample.
    /// * `num_samples`  - Number of samples.
    /// * `pass_stride`  - Floats per pixel.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        start_sample: u32,
        num_samples: u32,
        pass_stride: usize,
    ) -> Self {
        Self {
            index,
            x,
            y,
            w,
            h,
            start_sample,
            num_samples,
            sample: start_sample,
            offset: -((x + y * w) as isize),
            stride: w,
            pass_stride,
            buffer: vec![0.0; w * h * pass_stride],
            rng_state: vec![0; w * h],
        }
    }

    /// Returns true if all samples were taken.
    pub fn is_finished(&self) -> bool {
        self.sample >= self.start_sample + self.num_samples
    }

    /// Number of samples taken.
    pub fn samples_taken(&self) -> u32 {
        self.sample.saturating_sub(self.start_sample)
    }

    /// Copy the tile into a full frame buffer.
    ///
    /// * `params` - Frame size.
    /// * `frame`  - Full frame buffer.
    pub fn write_to_frame(&self, params: &BufferParams, frame: &mut [Float]) {
        let row = self.w * self.pass_stride;
        for ty in 0..self.h {
            let src = ty * row;
            let dst = ((self.y + ty) * params.width + self.x) * params.pass_stride;
            let (Some(src), Some(dst)) = (self.buffer.get(src..src + row), frame.get_mut(dst..dst + row)) else {
                continue;
            };
            dst.copy_from_slice(src);
        }
    }
}

/// Split a frame into tiles of at most `tile_size` pixels square, in
/// row major order.
///
/// * `params`       - Frame size.
/// * `tile_size`    - Tile edge length.
/// * `start_sample` - First sample.
/// * `num_samples`  - Samples per tile.
pub fn make_tiles(params: &BufferParams, tile_size: usize, start_sample: u32, num_samples: u32) -> Vec<RenderTile> {
    let tile_size = tile_size.max(1);
    let mut tiles = Vec::new();
    for y in (0..params.height).step_by(tile_size) {
        for x in (0..params.width).step_by(tile_size) {
            let w = tile_size.min(params.width - x);
            let h = tile_size.min(params.height - y);
            tiles.push(RenderTile::new(
                tiles.len(),
                x,
                y,
                w,
                h,
                start_sample,
                num_samples,
                params.pass_stride,
            ));
        }
    }
    tiles
}

/// Tiles waiting to be rendered and tiles that are done. Tiles move by
/// value through the queue, so a tile belongs to at most one worker.
#[derive(Debug)]
pub struct TileQueue {
    pending_tx: Sender<RenderTile>,
    pending_rx: Receiver<RenderTile>,
    done_tx: Sender<RenderTile>,
    done_rx: Receiver<RenderTile>,
    len: usize,
}

impl TileQueue {
    /// Queue tiles for rendering.
    ///
    /// * `tiles` - Tiles in the order they are handed out.
    pub fn new(tiles: Vec<RenderTile>) -> Self {
        let (pending_tx, pending_rx) = unbounded();
        let (done_tx, done_rx) = unbounded();
        let len = tiles.len();
        for tile in tiles {
            // The receiver is owned by the queue, so the send cannot fail.
            let _ = pending_tx.send(tile);
        }
        Self {
            pending_tx,
            pending_rx,
            done_tx,
            done_rx,
            len,
        }
    }

    /// Number of tiles in the queue.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the queue was created without tiles.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Take the next tile to render.
    pub fn acquire_tile(&self) -> Option<RenderTile> {
        self.pending_rx.try_recv().ok()
    }

    /// Hand back a tile after rendering it.
    ///
    /// * `tile` - Tile.
    pub fn release_tile(&self, tile: RenderTile) {
        let _ = self.done_tx.send(tile);
    }

    /// Put a tile back for another worker without rendering it.
    ///
    /// * `tile` - Tile.
    pub fn requeue_tile(&self, tile: RenderTile) {
        let _ = self.pending_tx.send(tile);
    }

    /// Collect every tile once no worker holds one: rendered tiles and
    /// tiles never acquired, ordered by index.
    pub fn drain(&self) -> Vec<RenderTile> {
        let mut tiles: Vec<RenderTile> = self.done_rx.try_iter().chain(self.pending_rx.try_iter()).collect();
        tiles.sort_by_key(|t| t.index);
        tiles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn params() -> BufferParams {
        BufferParams {
            width: 10,
            height: 7,
            pass_stride: 2,
        }
    }

    #[test]
    fn tiles_cover_frame() {
        let tiles = make_tiles(&params(), 4, 0, 8);
        assert_eq!(tiles.len(), 3 * 2);
        let area: usize = tiles.iter().map(|t| t.w * t.h).sum();
        assert_eq!(area, 70);
        let last = &tiles[5];
        assert_eq!((last.x, last.y, last.w, last.h), (8, 4, 2, 3));
        assert_eq!(last.buffer.len(), 2 * 3 * 2);
    }

    #[test]
    fn tile_offset_maps_first_pixel_to_zero() {
        let tile = RenderTile::new(0, 8, 4, 2, 3, 0, 1, 1);
        let index = tile.offset + 8 + (4 * tile.stride) as isize;
        assert_eq!(index, 0);
        let last = tile.offset + 9 + (6 * tile.stride) as isize;
        assert_eq!(last as usize, tile.rng_state.len() - 1);
    }

    #[test]
    fn write_back_places_rows() {
        let params = params();
        let mut tile = RenderTile::new(0, 8, 4, 2, 3, 0, 1, params.pass_stride);
        tile.buffer.iter_mut().enumerate().for_each(|(i, v)| *v = i as Float + 1.0);
        let mut frame = vec![0.0; params.buffer_len()];
        tile.write_to_frame(&params, &mut frame);
        assert_eq!(frame[(4 * 10 + 8) * 2], 1.0);
        assert_eq!(frame[(6 * 10 + 9) * 2 + 1], 12.0);
        assert_eq!(frame.iter().filter(|v| **v != 0.0).count(), 12);
    }

    #[test]
    fn queue_hands_out_each_tile_once() {
        let queue = TileQueue::new(make_tiles(&params(), 2, 0, 1));
        let total = queue.len();
        let (tx, rx) = crossbeam_channel::unbounded();
        crossbeam::scope(|scope| {
            for _ in 0..3 {
                let tx = tx.clone();
                let queue = &queue;
                scope.spawn(move |_| {
                    while let Some(mut tile) = queue.acquire_tile() {
                        tx.send(tile.index).unwrap();
                        tile.sample = 1;
                        queue.release_tile(tile);
                    }
                });
            }
        })
        .unwrap();
        drop(tx);
        let seen: Vec<usize> = rx.iter().collect();
        let unique: HashSet<usize> = seen.iter().copied().collect();
        assert_eq!(seen.len(), total);
        assert_eq!(unique.len(), total);

        let tiles = queue.drain();
        assert_eq!(tiles.len(), total);
        assert!(tiles.iter().all(|t| t.is_finished()));
    }
}
