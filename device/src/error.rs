//! Device errors

use crate::kernels::KernelIsa;
use crate::memory::DevicePtr;
use thiserror::Error;

/// Errors raised while setting up a device or managing its memory. Errors
/// inside running kernels are absorbed by the kernels themselves.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// A kernel tier was requested that the CPU does not support.
    #[error("CPU does not support the {0} kernels")]
    UnsupportedIsa(KernelIsa),

    /// Kernels were bound to a different tier earlier in the process.
    #[error("{bound} kernels already bound, cannot switch to {requested}")]
    KernelsBound { bound: KernelIsa, requested: KernelIsa },

    /// No kernels have been bound.
    #[error("no CPU kernels bound")]
    KernelsUnbound,

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    ThreadSpawn(#[from] std::io::Error),

    /// The memory has no device allocation.
    #[error("memory '{0}' is not allocated on the device")]
    NotAllocated(String),

    /// A device pointer does not refer to live memory.
    #[error("invalid device pointer {0:?}")]
    InvalidPointer(DevicePtr),

    /// A copy or write would fall outside an allocation.
    #[error("access to '{name}' at {offset}+{len} exceeds its size {size}")]
    OutOfBounds {
        name: String,
        offset: usize,
        len: usize,
        size: usize,
    },

    /// Host and device memory hold different element types.
    #[error("memory '{0}' does not hold the expected element type")]
    TypeMismatch(String),

    /// A task was submitted before a scene was uploaded.
    #[error("no scene uploaded to the device")]
    NoScene,
}
