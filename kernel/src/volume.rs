//! Volume stack

use crate::math::*;
use crate::shader::*;

/// Maximum number of volumes a path can be inside of at once.
pub const VOLUME_STACK_SIZE: usize = 32;

/// Maximum number of volume bounding surfaces crossed without counting a
/// bounce.
pub const VOLUME_BOUNDS_MAX: u32 = 1024;

/// A volume the path is inside of.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VolumeStackEntry {
    /// Object that bounds the volume.
    pub object: Option<usize>,

    /// Volume shader.
    pub shader: usize,

    /// Ray distance at which the volume starts.
    pub t_enter: Float,

    /// Ray distance at which the volume ends.
    pub t_exit: Float,
}

impl VolumeStackEntry {
    /// Create an entry for an unbounded interval.
    ///
    /// * `object` - Object.
    /// * `shader` - Volume shader.
    pub fn new(object: Option<usize>, shader: usize) -> Self {
        Self {
            object,
            shader,
            t_enter: 0.0,
            t_exit: INFINITY,
        }
    }
}

/// Bounded, ordered set of volumes the path is inside of.
#[derive(Copy, Clone, Debug)]
pub struct VolumeStack {
    entries: [Option<VolumeStackEntry>; VOLUME_STACK_SIZE],
    len: usize,
}

impl Default for VolumeStack {
    fn default() -> Self {
        Self {
            entries: [None; VOLUME_STACK_SIZE],
            len: 0,
        }
    }
}

impl VolumeStack {
    /// Returns an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the path is not inside any volume.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over the entries, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = &VolumeStackEntry> {
        self.entries[..self.len].iter().flatten()
    }

    /// Returns true if `object` is on the stack.
    ///
    /// * `object` - Object.
    pub fn contains(&self, object: Option<usize>) -> bool {
        self.iter().any(|e| e.object == object)
    }

    /// Push a volume. Returns false if the volume is already on the stack
    /// or the stack is full. One slot is kept free as a terminator so the
    /// stack holds at most `VOLUME_STACK_SIZE - 1` volumes.
    ///
    /// * `entry` - The volume.
    pub fn push(&mut self, entry: VolumeStackEntry) -> bool {
        if self.contains(entry.object) || self.len >= VOLUME_STACK_SIZE - 1 {
            return false;
        }
        self.entries[self.len] = Some(entry);
        self.len += 1;
        true
    }

    /// Remove a volume, keeping the order of the others. Returns false if it
    /// was not on the stack.
    ///
    /// * `object` - Object.
    pub fn remove(&mut self, object: Option<usize>) -> bool {
        let position = self.iter().position(|e| e.object == object);
        match position {
            Some(index) => {
                self.entries.copy_within(index + 1..self.len, index);
                self.len -= 1;
                self.entries[self.len] = None;
                true
            }
            None => false,
        }
    }

    /// Update the stack when a path crosses the boundary of a volume object.
    /// Hitting the back of a surface exits its volume, the front enters it.
    ///
    /// * `sd` - Shading point on the boundary.
    pub fn enter_exit(&mut self, sd: &ShaderData) {
        if !sd.shader_flag.contains(ShaderFlags::HAS_VOLUME) {
            return;
        }
        if sd.is_backfacing() {
            self.remove(sd.object);
        } else if let Some(shader) = sd.shader {
            self.push(VolumeStackEntry::new(sd.object, shader));
        }
    }
}
