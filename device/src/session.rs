//! Render session

use crate::cpu::CpuDevice;
use crate::device::*;
use crate::error::DeviceError;
use crate::image::ImageManager;
use crate::memory::*;
use crate::progress::Progress;
use crate::task::*;
use crate::tile::*;
use half::f16;
use kernel::integrator::PathStats;
use kernel::math::Float;
use kernel::scene::KernelData;
use kernel::shader::ShaderEvaluator;
use kernel::texture::{Extension, Interpolation};
use std::sync::Arc;

/// Session parameters.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SessionParams {
    /// Samples per pixel.
    pub samples: u32,

    /// Tile width and height in pixels.
    pub tile_size: usize,

    /// Device configuration.
    pub device: DeviceConfig,

    /// Finish every queued tile when cancelled.
    pub need_finish_queue: bool,
}

impl Default for SessionParams {
    fn default() -> Self {
        Self {
            samples: 16,
            tile_size: 32,
            device: DeviceConfig::default(),
            need_finish_queue: false,
        }
    }
}

/// Cancels the render of a session from another thread.
#[derive(Clone)]
pub struct CancelHandle {
    device: Arc<CpuDevice>,
    progress: Arc<Progress>,
}

impl CancelHandle {
    /// Stop rendering at the next sample.
    ///
    /// * `message` - Reason shown to the user.
    pub fn cancel(&self, message: &str) {
        self.progress.set_cancel(message);
        self.device.task_cancel();
    }
}

/// Result of a render.
#[derive(Clone, Debug)]
pub struct RenderOutput {
    /// Image width.
    pub width: usize,

    /// Image height.
    pub height: usize,

    /// Accumulated render buffer of every pass.
    pub buffer: Vec<Float>,

    /// Display pixels as sRGB bytes, row 0 at the bottom.
    pub pixels_byte: Vec<u8>,

    /// Display pixels as linear half floats, row 0 at the bottom.
    pub pixels_half: Vec<f16>,

    /// Fewest samples taken by any tile.
    pub samples: u32,

    /// Path statistics.
    pub stats: PathStats,
}

impl RenderOutput {
    /// Linear RGBA pixels.
    pub fn rgba(&self) -> Vec<[Float; 4]> {
        self.pixels_half
            .chunks_exact(4)
            .map(|px| [px[0].to_f32(), px[1].to_f32(), px[2].to_f32(), px[3].to_f32()])
            .collect()
    }
}

/// Renders a scene on a CPU device: tiles the frame, path traces every
/// tile and converts the result to display pixels.
pub struct Session {
    params: SessionParams,
    device: Arc<CpuDevice>,
    progress: Arc<Progress>,
    images: ImageManager,
    data: Option<Arc<KernelData>>,
}

impl Session {
    /// Create the device.
    ///
    /// * `params` - Session parameters.
    pub fn new(params: SessionParams) -> Result<Self, DeviceError> {
        let device = Arc::new(CpuDevice::new(&params.device)?);
        Ok(Self {
            params,
            device,
            progress: Arc::new(Progress::new()),
            images: ImageManager::new(),
            data: None,
        })
    }

    /// Device the session renders on.
    pub fn device(&self) -> &CpuDevice {
        &self.device
    }

    /// Render progress.
    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Handle to cancel the render from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            device: self.device.clone(),
            progress: self.progress.clone(),
        }
    }

    /// Load an image and bind it on the device, returning the texture slot
    /// shaders refer to it by.
    ///
    /// * `filename`      - Image file.
    /// * `interpolation` - Reconstruction filter.
    /// * `extension`     - Behaviour outside [0, 1].
    pub fn add_image(
        &mut self,
        filename: &str,
        interpolation: Interpolation,
        extension: Extension,
    ) -> Result<usize, DeviceError> {
        let id = self.images.add_image(filename, interpolation, extension);
        self.images.device_update(self.device.as_ref())?;
        self.images
            .device_slot(id)
            .ok_or_else(|| DeviceError::NotAllocated(filename.to_owned()))
    }

    /// Set the scene to render.
    ///
    /// * `data`      - Scene data.
    /// * `evaluator` - Shader evaluator.
    pub fn scene_update(&mut self, data: Arc<KernelData>, evaluator: Option<Arc<dyn ShaderEvaluator>>) {
        self.device.scene_update(data.clone(), evaluator);
        self.data = Some(data);
    }

    /// Render the scene. A cancelled render returns what was accumulated.
    pub fn render(&self) -> Result<RenderOutput, DeviceError> {
        let data = self.data.as_ref().ok_or(DeviceError::NoScene)?;
        let params = BufferParams {
            width: data.camera.width,
            height: data.camera.height,
            pass_stride: data.layout.pass_stride,
        };
        let samples = self.params.samples.max(1);
        let tiles = make_tiles(&params, self.params.tile_size.max(1), 0, samples);
        info!(
            "Rendering {}x{} with {samples} samples in {} tiles",
            params.width,
            params.height,
            tiles.len()
        );
        self.progress.reset(
            (params.width * params.height) as u64 * samples as u64,
            tiles.len() as u64,
        );
        self.device.reset_stats();

        let queue = Arc::new(TileQueue::new(tiles));
        let mut task = DeviceTask::new(TaskKind::PathTrace { tiles: queue.clone() }, self.progress.clone());
        task.need_finish_queue = self.params.need_finish_queue;
        self.device.task_add(task)?;
        self.device.task_wait();

        let tiles = queue.drain();
        if self.progress.get_cancel() {
            warn!("Render cancelled: {}", self.progress.cancel_message());
        }

        let mut buffer = DeviceMemory::float("render_buffer", params.buffer_len());
        if let Some(frame) = buffer.data.as_float_mut() {
            for tile in tiles.iter() {
                tile.write_to_frame(&params, frame);
            }
        }

        let num_pixels = params.width * params.height;
        let mut rgba_byte = DeviceMemory::byte("rgba_byte", num_pixels * 4);
        let mut rgba_half = DeviceMemory::half("rgba_half", num_pixels * 4);
        self.device.mem_alloc(&mut buffer)?;
        self.device.mem_alloc(&mut rgba_byte)?;
        self.device.mem_alloc(&mut rgba_half)?;

        let converted = self.film_convert(&tiles, &params, &buffer, &rgba_byte, &rgba_half);
        if converted.is_ok() {
            self.device.mem_copy_from(&mut rgba_byte, 0, params.width, params.height, 4)?;
            self.device.mem_copy_from(&mut rgba_half, 0, params.width, params.height, 4)?;
        }
        self.device.mem_free(&mut buffer)?;
        self.device.mem_free(&mut rgba_byte)?;
        self.device.mem_free(&mut rgba_half)?;
        converted?;

        let pixels_byte = match rgba_byte.data {
            MemoryData::Byte(v) => v,
            _ => return Err(DeviceError::TypeMismatch(rgba_byte.name)),
        };
        let pixels_half = match rgba_half.data {
            MemoryData::Half(v) => v,
            _ => return Err(DeviceError::TypeMismatch(rgba_half.name)),
        };
        let buffer = match buffer.data {
            MemoryData::Float(v) => v,
            _ => return Err(DeviceError::TypeMismatch(buffer.name)),
        };

        let stats = self.device.stats();
        if stats.nan_samples > 0 {
            warn!("{} samples had invalid radiance", stats.nan_samples);
        }
        info!("Render finished in {:.2?}", self.progress.elapsed());

        Ok(RenderOutput {
            width: params.width,
            height: params.height,
            buffer,
            pixels_byte,
            pixels_half,
            samples: tiles.iter().map(RenderTile::samples_taken).min().unwrap_or(0),
            stats,
        })
    }

    /// Convert every tile with its own sample count.
    fn film_convert(
        &self,
        tiles: &[RenderTile],
        params: &BufferParams,
        buffer: &DeviceMemory,
        rgba_byte: &DeviceMemory,
        rgba_half: &DeviceMemory,
    ) -> Result<(), DeviceError> {
        let buffer = buffer.require_device()?;
        for tile in tiles.iter().filter(|t| t.sample > 0) {
            let kind = TaskKind::FilmConvert {
                buffer,
                rgba_byte: rgba_byte.device_pointer(),
                rgba_half: rgba_half.device_pointer(),
                sample: tile.sample - 1,
                x: tile.x,
                y: tile.y,
                w: tile.w,
                h: tile.h,
                offset: 0,
                stride: params.width,
            };
            self.device.task_add(DeviceTask::new(kind, self.progress.clone()))?;
        }
        self.device.task_wait();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::*;
    use kernel::film::FilmSettings;
    use kernel::scene::*;

    fn session(samples: u32, width: usize, height: usize) -> Session {
        let (mut builder, evaluator) = demo_scene(width, height, None);
        builder.film(FilmSettings {
            use_depth: true,
            ..Default::default()
        });
        let params = SessionParams {
            samples,
            tile_size: 8,
            device: DeviceConfig {
                num_threads: 2,
                isa: None,
            },
            ..Default::default()
        };
        let mut session = Session::new(params).unwrap();
        session.scene_update(Arc::new(builder.build()), Some(Arc::new(evaluator)));
        session
    }

    fn luminance(output: &RenderOutput, x: usize, y: usize) -> Float {
        let px = &output.rgba()[y * output.width + x];
        (px[0] + px[1] + px[2]) / 3.0
    }

    #[test]
    fn renders_lit_sphere() {
        let session = session(8, 24, 24);
        let output = session.render().unwrap();
        assert_eq!(output.pixels_byte.len(), 24 * 24 * 4);
        assert_eq!(output.samples, 8);
        assert_eq!(output.stats.nan_samples, 0);
        assert_eq!(output.stats.paths, 24 * 24 * 8);

        // The sphere's top faces the lamp; its centre is some way off.
        assert!(luminance(&output, 12, 16) > 0.0);
        for px in output.rgba().iter() {
            assert!(px.iter().all(|c| c.is_finite()));
            assert!(approx_eq!(f32, px[3], 1.0, epsilon = 1e-3));
        }
        assert_eq!(session.progress().fraction(), 1.0);
        assert_eq!(session.device().memory_used(), 0);
    }

    #[test]
    fn render_without_scene_fails() {
        let session = Session::new(SessionParams::default()).unwrap();
        assert!(matches!(session.render(), Err(DeviceError::NoScene)));
    }

    #[test]
    fn floor_texture_is_bound() {
        let mut session = session(1, 8, 8);
        let slot = session
            .add_image("/nonexistent/floor.png", Interpolation::Linear, Extension::Repeat)
            .unwrap();
        let again = session
            .add_image("/nonexistent/floor.png", Interpolation::Linear, Extension::Repeat)
            .unwrap();
        assert_eq!(slot, again);
        assert!(session.device().texture(slot).is_some());
    }

    #[test]
    fn cancelled_render_keeps_partial_samples() {
        let session = session(64, 16, 16);
        session.progress().set_update_callback(Box::new(|p| {
            if p.pixel_samples() >= 16 * 16 {
                p.set_cancel("enough");
            }
        }));
        let output = session.render().unwrap();
        assert!(output.samples < 64);
        assert!(session.progress().pixel_samples() < 16 * 16 * 64);
        assert_eq!(session.progress().cancel_message(), "enough");
    }

    #[test]
    fn cancel_handle_stops_render() {
        let session = session(4096, 16, 16);
        let handle = session.cancel_handle();
        let progress = session.progress();
        crossbeam::scope(|scope| {
            scope.spawn(|_| {
                while progress.pixel_samples() == 0 {
                    std::thread::yield_now();
                }
                handle.cancel("time limit");
            });
            let output = session.render().unwrap();
            assert!(output.samples < 4096);
        })
        .unwrap();
    }
}
