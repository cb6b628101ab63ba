//! Device interface

use crate::error::DeviceError;
use crate::kernels::KernelIsa;
use crate::memory::DeviceMemory;
use crate::task::DeviceTask;
use kernel::scene::KernelData;
use kernel::shader::ShaderEvaluator;
use kernel::texture::ImageTexture;
use std::sync::Arc;

/// Kind of compute back end.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceType {
    Cpu,
}

/// Description of a device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Back end.
    pub device_type: DeviceType,

    /// Human readable name.
    pub description: String,

    /// Stable identifier.
    pub id: String,

    /// Worker threads.
    pub num_threads: usize,

    /// Bound kernel tier.
    pub isa: KernelIsa,
}

/// Device configuration.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Worker threads; 0 uses one per logical core.
    pub num_threads: usize,

    /// Kernel tier to use instead of the detected one.
    pub isa: Option<KernelIsa>,
}

/// A compute back end: memory, textures, scene data and tasks.
pub trait Device: Send + Sync {
    /// Device description.
    fn info(&self) -> &DeviceInfo;

    /// Allocate device storage for memory, initialised from the host copy.
    ///
    /// * `mem` - Memory.
    fn mem_alloc(&self, mem: &mut DeviceMemory) -> Result<(), DeviceError>;

    /// Copy the host contents to the device.
    ///
    /// * `mem` - Memory.
    fn mem_copy_to(&self, mem: &DeviceMemory) -> Result<(), DeviceError>;

    /// Copy rows of the device contents back to the host.
    ///
    /// * `mem`  - Memory.
    /// * `y`    - First row.
    /// * `w`    - Row width in elements.
    /// * `h`    - Number of rows.
    /// * `elem` - Values per element.
    fn mem_copy_from(&self, mem: &mut DeviceMemory, y: usize, w: usize, h: usize, elem: usize) -> Result<(), DeviceError>;

    /// Zero both the host and device contents.
    ///
    /// * `mem` - Memory.
    fn mem_zero(&self, mem: &mut DeviceMemory) -> Result<(), DeviceError>;

    /// Release the device storage.
    ///
    /// * `mem` - Memory.
    fn mem_free(&self, mem: &mut DeviceMemory) -> Result<(), DeviceError>;

    /// Bind a read-only texture, returning its slot.
    ///
    /// * `name`    - Name used in log messages.
    /// * `texture` - Texels with their interpolation and extension.
    fn tex_alloc(&self, name: &str, texture: ImageTexture) -> Result<usize, DeviceError>;

    /// Unbind a texture.
    ///
    /// * `slot` - Slot returned by `tex_alloc`.
    fn tex_free(&self, slot: usize);

    /// Make scene data and the shader evaluator visible to later tasks.
    ///
    /// * `data`      - Scene data.
    /// * `evaluator` - Shader evaluator.
    fn scene_update(&self, data: Arc<KernelData>, evaluator: Option<Arc<dyn ShaderEvaluator>>);

    /// Split a task and queue it on the workers.
    ///
    /// * `task` - Task.
    fn task_add(&self, task: DeviceTask) -> Result<(), DeviceError>;

    /// Block until every queued task finished.
    fn task_wait(&self);

    /// Cancel queued tasks.
    fn task_cancel(&self);
}
