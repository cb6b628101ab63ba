//! CPU device

use crate::device::*;
use crate::error::DeviceError;
use crate::kernels::*;
use crate::memory::*;
use crate::pool::*;
use crate::progress::Progress;
use crate::task::*;
use crate::tile::*;
use kernel::integrator::{PathStats, ShaderEvalType, ShaderInput, ThreadContext};
use kernel::math::Float;
use kernel::scene::{KernelData, KernelGlobals};
use kernel::shader::ShaderEvaluator;
use kernel::texture::ImageTexture;
use std::sync::{Arc, Mutex};

/// Scene data and evaluator uploaded by `scene_update`.
type Scene = (Arc<KernelData>, Option<Arc<dyn ShaderEvaluator>>);

/// Runs tasks on a pool of CPU threads through the bound kernels.
pub struct CpuDevice {
    info: DeviceInfo,
    kernels: &'static dyn CpuKernels,
    pool: TaskPool,
    memory: Mutex<MemoryTable>,
    textures: Mutex<Vec<Option<Arc<ImageTexture>>>>,
    scene: Mutex<Option<Scene>>,
    globals: Mutex<Option<Arc<KernelGlobals>>>,
    stats: Arc<Mutex<PathStats>>,
}

impl CpuDevice {
    /// Bind the kernels and start the worker threads.
    ///
    /// * `config` - Device configuration.
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let kernels = init_kernels(config.isa)?;
        let pool = TaskPool::new(config.num_threads)?;
        let num_threads = pool.num_threads();
        let info = DeviceInfo {
            device_type: DeviceType::Cpu,
            description: format!("CPU ({} kernels, {num_threads} threads)", kernels.isa()),
            id: String::from("CPU"),
            num_threads,
            isa: kernels.isa(),
        };
        info!("Created device {}", info.description);

        Ok(Self {
            info,
            kernels,
            pool,
            memory: Mutex::new(MemoryTable::new()),
            textures: Mutex::new(Vec::new()),
            scene: Mutex::new(None),
            globals: Mutex::new(None),
            stats: Arc::new(Mutex::new(PathStats::default())),
        })
    }

    /// Path statistics of every path trace task since the last reset.
    pub fn stats(&self) -> PathStats {
        lock(&self.stats).clone()
    }

    /// Clear the path statistics.
    pub fn reset_stats(&self) {
        *lock(&self.stats) = PathStats::default();
    }

    /// Bytes of device memory currently allocated.
    pub fn memory_used(&self) -> usize {
        lock(&self.memory).used_bytes()
    }

    /// Texture bound in a slot.
    ///
    /// * `slot` - Texture slot.
    pub fn texture(&self, slot: usize) -> Option<Arc<ImageTexture>> {
        lock(&self.textures).get(slot).cloned().flatten()
    }

    /// Kernel globals for the uploaded scene and textures.
    fn kernel_globals(&self) -> Result<Arc<KernelGlobals>, DeviceError> {
        let mut globals = lock(&self.globals);
        if let Some(kg) = globals.as_ref() {
            return Ok(kg.clone());
        }
        let scene = lock(&self.scene);
        let (data, evaluator) = scene.as_ref().ok_or(DeviceError::NoScene)?;
        let mut kg = KernelGlobals::new(data.clone()).with_textures(lock(&self.textures).clone());
        if let Some(evaluator) = evaluator {
            kg = kg.with_evaluator(evaluator.clone());
        }
        let kg = Arc::new(kg);
        *globals = Some(kg.clone());
        Ok(kg)
    }

    fn invalidate_globals(&self) {
        *lock(&self.globals) = None;
    }

    fn device_buffer(&self, pointer: DevicePtr) -> Result<SharedMemory, DeviceError> {
        lock(&self.memory).get(pointer)
    }

    fn job(&self, kg: Arc<KernelGlobals>, task: DeviceTask) -> Result<Job, DeviceError> {
        let kernels = self.kernels;
        let job: Job = match task.kind.clone() {
            TaskKind::PathTrace { tiles } => {
                let stats = self.stats.clone();
                Box::new(move |pool: &JobState| {
                    let local = thread_path_trace(kernels, &kg, &tiles, &task, pool);
                    lock(&stats).merge(&local);
                })
            }
            TaskKind::FilmConvert {
                buffer,
                rgba_byte,
                rgba_half,
                sample,
                x,
                y,
                w,
                h,
                offset,
                stride,
            } => {
                let buffer = self.device_buffer(buffer)?;
                let rgba_byte = rgba_byte.map(|p| self.device_buffer(p)).transpose()?;
                let rgba_half = rgba_half.map(|p| self.device_buffer(p)).transpose()?;
                let region = FilmRegion {
                    sample,
                    x,
                    y,
                    w,
                    h,
                    offset,
                    stride,
                };
                Box::new(move |_: &JobState| {
                    thread_film_convert(kernels, &kg, &buffer, rgba_byte.as_ref(), rgba_half.as_ref(), &region);
                })
            }
            TaskKind::Shader {
                input,
                output,
                eval_type,
                shader_x,
                shader_w,
                num_samples,
            } => {
                let output = self.device_buffer(output)?;
                Box::new(move |pool: &JobState| {
                    let range = shader_x..shader_x + shader_w;
                    let inputs = input.get(range).unwrap_or(&[]);
                    let results = thread_shader(kernels, &kg, eval_type, inputs, num_samples, &task.progress, pool);
                    write_shader_output(&output, shader_x, &results);
                })
            }
        };
        Ok(job)
    }
}

impl Device for CpuDevice {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn mem_alloc(&self, mem: &mut DeviceMemory) -> Result<(), DeviceError> {
        let mut table = lock(&self.memory);
        if let Some(old) = mem.device_pointer() {
            table.free(old);
        }
        let size = mem.data.byte_size();
        let pointer = table.alloc(mem.data.clone());
        mem.set_device(Some(pointer), size);
        debug!("Allocated {} ({size} bytes, {} in use)", mem.name, table.used_bytes());
        Ok(())
    }

    fn mem_copy_to(&self, mem: &DeviceMemory) -> Result<(), DeviceError> {
        let buffer = self.device_buffer(mem.require_device()?)?;
        let mut device = lock(&buffer);
        if device.len() != mem.data.len() {
            return Err(DeviceError::OutOfBounds {
                name: mem.name.clone(),
                offset: 0,
                len: mem.data.len(),
                size: device.len(),
            });
        }
        if !device.copy_range_from(&mem.data, 0, mem.data.len()) {
            return Err(DeviceError::TypeMismatch(mem.name.clone()));
        }
        Ok(())
    }

    fn mem_copy_from(&self, mem: &mut DeviceMemory, y: usize, w: usize, h: usize, elem: usize) -> Result<(), DeviceError> {
        let buffer = self.device_buffer(mem.require_device()?)?;
        let device = lock(&buffer);
        let offset = y * w * elem;
        let len = w * h * elem;
        if offset + len > device.len() || offset + len > mem.data.len() {
            return Err(DeviceError::OutOfBounds {
                name: mem.name.clone(),
                offset,
                len,
                size: device.len().min(mem.data.len()),
            });
        }
        if !mem.data.copy_range_from(&device, offset, len) {
            return Err(DeviceError::TypeMismatch(mem.name.clone()));
        }
        Ok(())
    }

    fn mem_zero(&self, mem: &mut DeviceMemory) -> Result<(), DeviceError> {
        mem.data.zero();
        if let Some(pointer) = mem.device_pointer() {
            let buffer = self.device_buffer(pointer)?;
            lock(&buffer).zero();
        }
        Ok(())
    }

    fn mem_free(&self, mem: &mut DeviceMemory) -> Result<(), DeviceError> {
        if let Some(pointer) = mem.device_pointer() {
            let mut table = lock(&self.memory);
            table.free(pointer).ok_or(DeviceError::InvalidPointer(pointer))?;
            debug!("Freed {} ({} bytes in use)", mem.name, table.used_bytes());
        }
        mem.set_device(None, 0);
        Ok(())
    }

    fn tex_alloc(&self, name: &str, texture: ImageTexture) -> Result<usize, DeviceError> {
        let mut textures = lock(&self.textures);
        debug!(
            "Texture {name}: {}x{} ({} bytes)",
            texture.width,
            texture.height,
            texture.memory_size()
        );
        let texture = Some(Arc::new(texture));
        let slot = match textures.iter().position(|t| t.is_none()) {
            Some(slot) => {
                textures[slot] = texture;
                slot
            }
            None => {
                textures.push(texture);
                textures.len() - 1
            }
        };
        drop(textures);
        self.invalidate_globals();
        Ok(slot)
    }

    fn tex_free(&self, slot: usize) {
        if let Some(texture) = lock(&self.textures).get_mut(slot) {
            *texture = None;
        }
        self.invalidate_globals();
    }

    fn scene_update(&self, data: Arc<KernelData>, evaluator: Option<Arc<dyn ShaderEvaluator>>) {
        *lock(&self.scene) = Some((data, evaluator));
        self.invalidate_globals();
    }

    fn task_add(&self, task: DeviceTask) -> Result<(), DeviceError> {
        let kg = self.kernel_globals()?;
        // Converting a rendered tile must finish even if the render itself
        // was cancelled.
        let cancellable = !matches!(task.kind, TaskKind::FilmConvert { .. });
        let jobs = task
            .split(self.pool.num_threads())
            .into_iter()
            .map(|sub| self.job(kg.clone(), sub))
            .collect::<Result<Vec<_>, _>>()?;
        for job in jobs {
            if cancellable {
                self.pool.push(job);
            } else {
                self.pool.push_uncancellable(job);
            }
        }
        Ok(())
    }

    fn task_wait(&self) {
        self.pool.wait_work();
    }

    fn task_cancel(&self) {
        self.pool.cancel();
    }
}

fn task_cancelled(task: &DeviceTask, pool: &JobState) -> bool {
    pool.cancelled() || task.progress.get_cancel()
}

/// Render tiles from the queue until it is empty or the task is cancelled.
fn thread_path_trace(
    kernels: &dyn CpuKernels,
    kg: &KernelGlobals,
    tiles: &TileQueue,
    task: &DeviceTask,
    pool: &JobState,
) -> PathStats {
    let stop = || task_cancelled(task, pool) && !task.need_finish_queue;
    let mut ctx = ThreadContext::new();

    while let Some(mut tile) = tiles.acquire_tile() {
        if stop() {
            tiles.requeue_tile(tile);
            break;
        }
        render_tile(kernels, kg, &mut ctx, &mut tile, &task.progress, &stop);
        if tile.is_finished() {
            task.progress.add_finished_tile();
        }
        tiles.release_tile(tile);
        if stop() {
            break;
        }
    }
    ctx.stats
}

fn render_tile(
    kernels: &dyn CpuKernels,
    kg: &KernelGlobals,
    ctx: &mut ThreadContext,
    tile: &mut RenderTile,
    progress: &Progress,
    stop: &dyn Fn() -> bool,
) {
    let data = &kg.data;
    debug!("Tile {} ({}, {}) {}x{} started", tile.index, tile.x, tile.y, tile.w, tile.h);
    ctx.begin_tile(&data.film, &data.layout, tile.x, tile.y, tile.w, tile.h);

    let end = tile.start_sample + tile.num_samples;
    for sample in tile.sample..end {
        if stop() {
            break;
        }
        for y in tile.y..tile.y + tile.h {
            for x in tile.x..tile.x + tile.w {
                kernels.path_trace(
                    kg,
                    ctx,
                    &mut tile.buffer,
                    &mut tile.rng_state,
                    sample,
                    x,
                    y,
                    tile.offset,
                    tile.stride,
                );
            }
        }
        tile.sample = sample + 1;
        progress.add_samples((tile.w * tile.h) as u64);
    }

    if ctx.has_coverage() && tile.samples_taken() > 0 {
        ctx.write_coverage(&data.layout, &mut tile.buffer, tile.offset, tile.stride);
    }
    debug!("Tile {} finished at sample {}", tile.index, tile.sample);
}

/// Region and sample of a film conversion.
struct FilmRegion {
    sample: u32,
    x: usize,
    y: usize,
    w: usize,
    h: usize,
    offset: isize,
    stride: usize,
}

fn thread_film_convert(
    kernels: &dyn CpuKernels,
    kg: &KernelGlobals,
    buffer: &SharedMemory,
    rgba_byte: Option<&SharedMemory>,
    rgba_half: Option<&SharedMemory>,
    region: &FilmRegion,
) {
    let layout = kg.data.layout;
    let exposure = kg.data.film.exposure;
    let sample_scale = 1.0 / (region.sample + 1) as Float;

    // Output pixel index and accumulated RGBA of each pixel in the region.
    let mut pixels: Vec<(usize, [Float; 4])> = Vec::with_capacity(region.w * region.h);
    {
        let src = lock(buffer);
        let Some(src) = src.as_float() else {
            warn!("Film convert source is not a float buffer");
            return;
        };
        for y in region.y..region.y + region.h {
            for x in region.x..region.x + region.w {
                let index = region.offset + x as isize + (y * region.stride) as isize;
                let Ok(index) = usize::try_from(index) else {
                    continue;
                };
                let start = index * layout.pass_stride + layout.combined;
                if let Some(px) = src.get(start..start + 4) {
                    pixels.push((index, [px[0], px[1], px[2], px[3]]));
                }
            }
        }
    }

    if let Some(out) = rgba_byte {
        if let MemoryData::Byte(out) = &mut *lock(out) {
            for (index, px) in pixels.iter() {
                if let Some(dst) = out.get_mut(index * 4..index * 4 + 4) {
                    dst.copy_from_slice(&kernels.convert_to_byte(px, sample_scale, exposure));
                }
            }
        }
    }
    if let Some(out) = rgba_half {
        if let MemoryData::Half(out) = &mut *lock(out) {
            for (index, px) in pixels.iter() {
                if let Some(dst) = out.get_mut(index * 4..index * 4 + 4) {
                    dst.copy_from_slice(&kernels.convert_to_half_float(px, sample_scale, exposure));
                }
            }
        }
    }
}

fn thread_shader(
    kernels: &dyn CpuKernels,
    kg: &KernelGlobals,
    eval_type: ShaderEvalType,
    inputs: &[ShaderInput],
    num_samples: u32,
    progress: &Progress,
    pool: &JobState,
) -> Vec<[Float; 4]> {
    let mut results = vec![[0.0; 4]; inputs.len()];
    for sample in 0..num_samples {
        if pool.cancelled() || progress.get_cancel() {
            break;
        }
        for (input, out) in inputs.iter().zip(results.iter_mut()) {
            kernels.shader(kg, eval_type, input, out, sample);
        }
        progress.add_samples(inputs.len() as u64);
    }
    results
}

fn write_shader_output(output: &SharedMemory, first: usize, results: &[[Float; 4]]) {
    let mut output = lock(output);
    let Some(out) = output.as_float_mut() else {
        warn!("Shader output is not a float buffer");
        return;
    };
    for (i, value) in results.iter().enumerate() {
        let start = (first + i) * 4;
        if let Some(dst) = out.get_mut(start..start + 4) {
            dst.copy_from_slice(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel::film::PassLayout;
    use kernel::geometry::*;
    use kernel::scene::*;
    use kernel::shader::*;
    use kernel::spectrum::Spectrum;
    use kernel::texture::{Extension, Interpolation};
    use std::collections::HashSet;

    fn device(num_threads: usize) -> CpuDevice {
        CpuDevice::new(&DeviceConfig {
            num_threads,
            isa: None,
        })
        .unwrap()
    }

    fn empty_scene(width: usize, height: usize) -> Arc<KernelData> {
        let mut builder = SceneBuilder::new();
        builder.camera(CameraSettings::look_at(
            Point3f::new(0.0, 0.0, -5.0),
            Point3f::zero(),
            Vector3f::new(0.0, 1.0, 0.0),
            0.8,
            width,
            height,
        ));
        Arc::new(builder.build())
    }

    fn params(data: &KernelData) -> BufferParams {
        BufferParams {
            width: data.camera.width,
            height: data.camera.height,
            pass_stride: data.layout.pass_stride,
        }
    }

    #[test]
    fn memory_round_trip() {
        let device = device(1);
        let mut mem = DeviceMemory::float("buffer", 8);
        assert!(mem.require_device().is_err());
        device.mem_alloc(&mut mem).unwrap();
        assert_eq!(mem.device_size(), 32);
        assert_eq!(device.memory_used(), 32);

        mem.data = MemoryData::Float((0..8).map(|i| i as Float).collect());
        device.mem_copy_to(&mem).unwrap();
        mem.data.zero();
        device.mem_copy_from(&mut mem, 1, 2, 2, 1).unwrap();
        assert_eq!(mem.data, MemoryData::Float(vec![0.0, 0.0, 2.0, 3.0, 4.0, 5.0, 0.0, 0.0]));
        assert!(device.mem_copy_from(&mut mem, 3, 2, 2, 1).is_err());

        device.mem_zero(&mut mem).unwrap();
        device.mem_copy_from(&mut mem, 0, 8, 1, 1).unwrap();
        assert_eq!(mem.data, MemoryData::Float(vec![0.0; 8]));

        device.mem_free(&mut mem).unwrap();
        assert_eq!(mem.device_pointer(), None);
        assert_eq!(device.memory_used(), 0);
        assert!(device.mem_copy_to(&mem).is_err());
    }

    #[test]
    fn texture_slots_are_reused() {
        let device = device(1);
        let tex = || ImageTexture::missing(Interpolation::Closest, Extension::Clip);
        let a = device.tex_alloc("a", tex()).unwrap();
        let b = device.tex_alloc("b", tex()).unwrap();
        assert_ne!(a, b);
        device.tex_free(a);
        assert_eq!(device.tex_alloc("c", tex()).unwrap(), a);
    }

    #[test]
    fn task_without_scene_fails() {
        let device = device(1);
        let tiles = Arc::new(TileQueue::new(Vec::new()));
        let task = DeviceTask::new(TaskKind::PathTrace { tiles }, Arc::new(Progress::new()));
        assert!(matches!(device.task_add(task), Err(DeviceError::NoScene)));
    }

    #[test]
    fn each_tile_rendered_by_one_worker() {
        let device = device(2);
        let data = empty_scene(16, 16);
        device.scene_update(data.clone(), None);
        let params = params(&data);

        let samples = 3;
        let tiles = make_tiles(&params, 4, 0, samples);
        assert!(device.info().num_threads < tiles.len());
        let queue = Arc::new(TileQueue::new(tiles));
        let progress = Arc::new(Progress::new());
        device
            .task_add(DeviceTask::new(TaskKind::PathTrace { tiles: queue.clone() }, progress.clone()))
            .unwrap();
        device.task_wait();

        let tiles = queue.drain();
        let indices: HashSet<usize> = tiles.iter().map(|t| t.index).collect();
        assert_eq!(indices.len(), 16);
        assert!(tiles.iter().all(|t| t.sample == samples));
        assert_eq!(progress.pixel_samples(), (16 * 16 * samples) as u64);
        assert_eq!(progress.finished_tiles(), 16);

        let mut frame = vec![0.0; params.buffer_len()];
        for tile in tiles.iter() {
            tile.write_to_frame(&params, &mut frame);
        }
        let layout: PassLayout = data.layout;
        for pixel in frame.chunks(layout.pass_stride) {
            assert_eq!(pixel[layout.combined + 3], samples as Float);
        }
        assert_eq!(device.stats().paths, (16 * 16 * samples) as u64);
    }

    #[test]
    fn cancelled_tile_stays_in_bounds() {
        let device = device(2);
        let data = empty_scene(8, 8);
        device.scene_update(data.clone(), None);

        let mut tile = RenderTile::new(0, 0, 0, 8, 8, 0, 16, data.layout.pass_stride);
        let guard = 32;
        tile.buffer.extend(std::iter::repeat(-7.0).take(guard));
        tile.rng_state.extend(std::iter::repeat(7).take(guard));
        let queue = Arc::new(TileQueue::new(vec![tile]));

        let progress = Arc::new(Progress::new());
        progress.set_update_callback(Box::new(|p| {
            if p.pixel_samples() >= 4 * 64 {
                p.set_cancel("test");
            }
        }));
        let task = DeviceTask::new(TaskKind::PathTrace { tiles: queue.clone() }, progress.clone());
        assert!(!task.need_finish_queue);
        device.task_add(task).unwrap();
        device.task_wait();

        let tiles = queue.drain();
        assert_eq!(tiles.len(), 1);
        let tile = &tiles[0];
        assert!(tile.sample <= 16);
        assert_eq!(tile.sample, 4);
        let end = tile.buffer.len() - guard;
        assert!(tile.buffer[end..].iter().all(|v| *v == -7.0));
        assert!(tile.rng_state[64..].iter().all(|v| *v == 7));
        assert!(progress.get_cancel());
    }

    #[test]
    fn finish_queue_ignores_cancel() {
        let device = device(1);
        let data = empty_scene(8, 8);
        device.scene_update(data.clone(), None);
        let queue = Arc::new(TileQueue::new(make_tiles(&params(&data), 4, 0, 4)));
        let progress = Arc::new(Progress::new());
        progress.set_cancel("early");
        let mut task = DeviceTask::new(TaskKind::PathTrace { tiles: queue.clone() }, progress);
        task.need_finish_queue = true;
        device.task_add(task).unwrap();
        device.task_wait();
        assert!(queue.drain().iter().all(|t| t.is_finished()));
    }

    #[test]
    fn film_convert_scales_by_samples() {
        let device = device(2);
        let data = empty_scene(2, 2);
        device.scene_update(data.clone(), None);
        let layout = data.layout;

        let mut buffer = DeviceMemory::float("buffer", 4 * layout.pass_stride);
        if let Some(b) = buffer.data.as_float_mut() {
            for px in b.chunks_mut(layout.pass_stride) {
                px[layout.combined..layout.combined + 4].copy_from_slice(&[4.0, 0.0, 2.0, 4.0]);
            }
        }
        let mut rgba = DeviceMemory::byte("rgba", 16);
        device.mem_alloc(&mut buffer).unwrap();
        device.mem_alloc(&mut rgba).unwrap();

        let kind = TaskKind::FilmConvert {
            buffer: buffer.require_device().unwrap(),
            rgba_byte: rgba.device_pointer(),
            rgba_half: None,
            sample: 3,
            x: 0,
            y: 0,
            w: 2,
            h: 2,
            offset: 0,
            stride: 2,
        };
        // A cancel arriving after the render finished must not skip the
        // conversion.
        device.task_cancel();
        device.task_add(DeviceTask::new(kind, Arc::new(Progress::new()))).unwrap();
        device.task_wait();
        device.mem_copy_from(&mut rgba, 0, 16, 1, 1).unwrap();

        let MemoryData::Byte(bytes) = &rgba.data else {
            panic!("expected bytes");
        };
        for px in bytes.chunks(4) {
            assert_eq!(px[0], 255);
            assert_eq!(px[1], 0);
            assert_eq!(px[3], 255);
            assert!(px[2] > 180 && px[2] < 190);
        }
    }

    #[test]
    fn shader_task_fills_outputs() {
        let device = device(2);
        let mut builder = SceneBuilder::new();
        let world = builder.add_shader(KernelShader::new("world", ShaderFlags::empty()));
        builder.background(BackgroundSettings {
            shader: Some(world),
            ..Default::default()
        });
        let evaluator = NodeGraphEvaluator::new(vec![ShaderRecipe::surface(ClosureNode::Background {
            color: Spectrum::rgb(0.5, 0.25, 1.0).into(),
            strength: 1.0,
        })]);
        device.scene_update(Arc::new(builder.build()), Some(Arc::new(evaluator)));

        let n = 300;
        let input: Vec<ShaderInput> = (0..n)
            .map(|i| ShaderInput {
                u: i as Float / n as Float,
                v: 0.5,
                ..Default::default()
            })
            .collect();
        let mut output = DeviceMemory::float("output", n * 4);
        device.mem_alloc(&mut output).unwrap();
        let kind = TaskKind::Shader {
            input: Arc::new(input),
            output: output.require_device().unwrap(),
            eval_type: ShaderEvalType::Background,
            shader_x: 0,
            shader_w: n,
            num_samples: 2,
        };
        device.task_add(DeviceTask::new(kind, Arc::new(Progress::new()))).unwrap();
        device.task_wait();
        device.mem_copy_from(&mut output, 0, n * 4, 1, 1).unwrap();

        let values = output.data.as_float().unwrap();
        for px in values.chunks(4) {
            assert_eq!(px, &[1.0, 0.5, 2.0, 0.0]);
        }
    }
}
