//! Device memory

use crate::error::DeviceError;
use half::f16;
use kernel::math::Float;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a worker panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Access the kernels have to a buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MemoryType {
    /// Read by kernels only.
    ReadOnly,

    /// Read and written by kernels.
    #[default]
    ReadWrite,
}

/// Handle of a device allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePtr(pub u64);

/// Typed buffer contents.
#[derive(Clone, Debug, PartialEq)]
pub enum MemoryData {
    Float(Vec<Float>),
    UInt(Vec<u32>),
    Byte(Vec<u8>),
    Half(Vec<f16>),
}

impl MemoryData {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::UInt(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Half(v) => v.len(),
        }
    }

    /// Returns true if there are no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of one element in bytes.
    pub fn element_size(&self) -> usize {
        match self {
            Self::Float(_) => std::mem::size_of::<Float>(),
            Self::UInt(_) => std::mem::size_of::<u32>(),
            Self::Byte(_) => 1,
            Self::Half(_) => std::mem::size_of::<f16>(),
        }
    }

    /// Size of the contents in bytes.
    pub fn byte_size(&self) -> usize {
        self.len() * self.element_size()
    }

    /// Set every element to zero.
    pub fn zero(&mut self) {
        match self {
            Self::Float(v) => v.fill(0.0),
            Self::UInt(v) => v.fill(0),
            Self::Byte(v) => v.fill(0),
            Self::Half(v) => v.fill(f16::ZERO),
        }
    }

    /// Copy `len` elements starting at `offset` from `src` into the same
    /// range of `self`. Returns false if the types differ or the range is
    /// out of bounds in either buffer.
    ///
    /// * `src`    - Source buffer.
    /// * `offset` - First element.
    /// * `len`    - Number of elements.
    pub fn copy_range_from(&mut self, src: &MemoryData, offset: usize, len: usize) -> bool {
        fn copy<T: Copy>(dst: &mut [T], src: &[T], offset: usize, len: usize) -> bool {
            match (dst.get_mut(offset..offset + len), src.get(offset..offset + len)) {
                (Some(d), Some(s)) => {
                    d.copy_from_slice(s);
                    true
                }
                _ => false,
            }
        }
        match (self, src) {
            (Self::Float(d), Self::Float(s)) => copy(d, s, offset, len),
            (Self::UInt(d), Self::UInt(s)) => copy(d, s, offset, len),
            (Self::Byte(d), Self::Byte(s)) => copy(d, s, offset, len),
            (Self::Half(d), Self::Half(s)) => copy(d, s, offset, len),
            _ => false,
        }
    }

    /// Float contents, if this is a float buffer.
    pub fn as_float(&self) -> Option<&[Float]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable float contents, if this is a float buffer.
    pub fn as_float_mut(&mut self) -> Option<&mut [Float]> {
        match self {
            Self::Float(v) => Some(v),
            _ => None,
        }
    }
}

/// A buffer with a host copy and, once allocated, a device copy.
#[derive(Clone, Debug)]
pub struct DeviceMemory {
    /// Name used in log messages and errors.
    pub name: String,

    /// Kernel access.
    pub mem_type: MemoryType,

    /// Host contents.
    pub data: MemoryData,

    device_pointer: Option<DevicePtr>,
    device_size: usize,
}

impl DeviceMemory {
    /// Create host memory that is not yet allocated on a device.
    ///
    /// * `name`     - Name.
    /// * `mem_type` - Kernel access.
    /// * `data`     - Host contents.
    pub fn new(name: &str, mem_type: MemoryType, data: MemoryData) -> Self {
        Self {
            name: String::from(name),
            mem_type,
            data,
            device_pointer: None,
            device_size: 0,
        }
    }

    /// Zeroed read/write float buffer.
    ///
    /// * `name` - Name.
    /// * `len`  - Number of floats.
    pub fn float(name: &str, len: usize) -> Self {
        Self::new(name, MemoryType::ReadWrite, MemoryData::Float(vec![0.0; len]))
    }

    /// Zeroed read/write byte buffer.
    ///
    /// * `name` - Name.
    /// * `len`  - Number of bytes.
    pub fn byte(name: &str, len: usize) -> Self {
        Self::new(name, MemoryType::ReadWrite, MemoryData::Byte(vec![0; len]))
    }

    /// Zeroed read/write half float buffer.
    ///
    /// * `name` - Name.
    /// * `len`  - Number of half floats.
    pub fn half(name: &str, len: usize) -> Self {
        Self::new(name, MemoryType::ReadWrite, MemoryData::Half(vec![f16::ZERO; len]))
    }

    /// Device allocation, if any.
    pub fn device_pointer(&self) -> Option<DevicePtr> {
        self.device_pointer
    }

    /// Size of the device allocation in bytes.
    pub fn device_size(&self) -> usize {
        self.device_size
    }

    /// Device allocation, or an error naming this memory.
    pub fn require_device(&self) -> Result<DevicePtr, DeviceError> {
        self.device_pointer
            .ok_or_else(|| DeviceError::NotAllocated(self.name.clone()))
    }

    pub(crate) fn set_device(&mut self, pointer: Option<DevicePtr>, size: usize) {
        self.device_pointer = pointer;
        self.device_size = size;
    }
}

/// Shared handle to device side contents.
pub type SharedMemory = Arc<Mutex<MemoryData>>;

/// Device side allocations of a CPU device.
#[derive(Debug, Default)]
pub struct MemoryTable {
    next: u64,
    buffers: HashMap<DevicePtr, SharedMemory>,
    used_bytes: usize,
    peak_bytes: usize,
}

impl MemoryTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new allocation.
    ///
    /// * `data` - Initial contents.
    pub fn alloc(&mut self, data: MemoryData) -> DevicePtr {
        self.next += 1;
        let pointer = DevicePtr(self.next);
        self.used_bytes += data.byte_size();
        self.peak_bytes = self.peak_bytes.max(self.used_bytes);
        self.buffers.insert(pointer, Arc::new(Mutex::new(data)));
        pointer
    }

    /// Release an allocation, returning its size in bytes.
    ///
    /// * `pointer` - Allocation.
    pub fn free(&mut self, pointer: DevicePtr) -> Option<usize> {
        let buffer = self.buffers.remove(&pointer)?;
        let size = lock(&buffer).byte_size();
        self.used_bytes -= size;
        Some(size)
    }

    /// Contents of an allocation.
    ///
    /// * `pointer` - Allocation.
    pub fn get(&self, pointer: DevicePtr) -> Result<SharedMemory, DeviceError> {
        self.buffers
            .get(&pointer)
            .cloned()
            .ok_or(DeviceError::InvalidPointer(pointer))
    }

    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Bytes currently allocated.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    /// Largest number of bytes allocated at once.
    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes
    }
}
