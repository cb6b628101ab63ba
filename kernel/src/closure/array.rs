//! Closure storage

use super::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// Maximum number of closures held by one shading point.
pub const MAX_CLOSURE: usize = 64;

/// Logged once per process when closures have to be discarded.
static OVERFLOW_WARNED: AtomicBool = AtomicBool::new(false);

/// Fixed capacity closure array.
#[derive(Clone, Debug)]
pub struct ClosureArray {
    closures: [Option<ShaderClosure>; MAX_CLOSURE],
    len: usize,
    capacity: usize,
    dropped: usize,
}

impl Default for ClosureArray {
    fn default() -> Self {
        Self::new()
    }
}

impl ClosureArray {
    /// Create an empty array with the maximum capacity.
    pub fn new() -> Self {
        Self::with_capacity(MAX_CLOSURE)
    }

    /// Create an empty array that holds at most `capacity` closures.
    ///
    /// * `capacity` - Capacity, clamped to `MAX_CLOSURE`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            closures: [None; MAX_CLOSURE],
            len: 0,
            capacity: capacity.min(MAX_CLOSURE),
            dropped: 0,
        }
    }

    /// Number of closures.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if there are no closures.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Capacity of the array.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of closures discarded since the last `clear()`.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Remove all closures.
    pub fn clear(&mut self) {
        for c in self.closures[..self.len].iter_mut() {
            *c = None;
        }
        self.len = 0;
        self.dropped = 0;
    }

    /// Returns the closure at `index`.
    ///
    /// * `index` - Index.
    pub fn get(&self, index: usize) -> Option<&ShaderClosure> {
        if index < self.len {
            self.closures[index].as_ref()
        } else {
            None
        }
    }

    /// Returns the closure at `index` mutably.
    ///
    /// * `index` - Index.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut ShaderClosure> {
        if index < self.len {
            self.closures[index].as_mut()
        } else {
            None
        }
    }

    /// Iterate over the closures in order.
    pub fn iter(&self) -> impl Iterator<Item = &ShaderClosure> {
        self.closures[..self.len].iter().flatten()
    }

    /// Iterate over the closures mutably in order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ShaderClosure> {
        self.closures[..self.len].iter_mut().flatten()
    }

    /// Append a closure. Closures below the weight cutoff are ignored. When
    /// the array is full the closure is merged into an equivalent one if
    /// possible, otherwise it is dropped. Returns true if the closure's
    /// weight was kept.
    ///
    /// * `closure` - The closure.
    pub fn push(&mut self, closure: ShaderClosure) -> bool {
        if closure.below_cutoff() {
            return false;
        }
        if self.len < self.capacity {
            self.closures[self.len] = Some(closure);
            self.len += 1;
            return true;
        }
        self.merge_or_push(closure)
    }

    /// Add a closure to an equivalent existing closure, or append it. When
    /// the array is full and no equivalent closure exists, the existing
    /// closures are merged to make room; if that frees nothing the closure
    /// is dropped and a warning is logged once.
    ///
    /// * `closure` - The closure.
    pub fn merge_or_push(&mut self, closure: ShaderClosure) -> bool {
        if let Some(existing) = self.iter_mut().find(|sc| sc.model.can_merge(&closure.model)) {
            existing.weight += closure.weight;
            existing.sample_weight += closure.sample_weight;
            return true;
        }

        if self.len >= self.capacity {
            self.merge_identical();
        }

        if self.len < self.capacity {
            self.closures[self.len] = Some(closure);
            self.len += 1;
            true
        } else {
            self.dropped += 1;
            if !OVERFLOW_WARNED.swap(true, Ordering::Relaxed) {
                warn!(
                    "Shading point exceeded {} closures; extra closures are dropped",
                    self.capacity
                );
            }
            false
        }
    }

    /// Combine closures of the same model with identical parameters. The
    /// first occurrence keeps its position and accumulates the weight and
    /// sample weight of later ones; the relative order of the survivors is
    /// unchanged.
    pub fn merge_identical(&mut self) {
        let mut i = 0;
        while i < self.len {
            let mut j = i + 1;
            while j < self.len {
                let (head, tail) = self.closures.split_at_mut(j);
                match (head[i].as_mut(), tail[0].as_ref()) {
                    (Some(a), Some(b)) if a.model.can_merge(&b.model) => {
                        a.weight += b.weight;
                        a.sample_weight += b.sample_weight;
                        self.remove(j);
                    }
                    _ => j += 1,
                }
            }
            i += 1;
        }
    }

    /// Remove the closure at `index`, shifting the tail down by one.
    fn remove(&mut self, index: usize) {
        self.closures.copy_within(index + 1..self.len, index);
        self.len -= 1;
        self.closures[self.len] = None;
    }
}
