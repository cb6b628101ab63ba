//! Render progress

use crate::memory::lock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Called by workers after each progress update.
pub type ProgressCallback = Box<dyn Fn(&Progress) + Send + Sync>;

/// Progress and cancellation shared between a render's caller and the
/// device workers.
pub struct Progress {
    pixel_samples: AtomicU64,
    total_pixel_samples: AtomicU64,
    finished_tiles: AtomicU64,
    total_tiles: AtomicU64,
    cancel: AtomicBool,
    cancel_message: Mutex<String>,
    start: Mutex<Instant>,
    update: Mutex<Option<ProgressCallback>>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Progress")
            .field("pixel_samples", &self.pixel_samples())
            .field("total_pixel_samples", &self.total_pixel_samples())
            .field("finished_tiles", &self.finished_tiles())
            .field("cancel", &self.get_cancel())
            .finish()
    }
}

impl Progress {
    /// Create progress with nothing done.
    pub fn new() -> Self {
        Self {
            pixel_samples: AtomicU64::new(0),
            total_pixel_samples: AtomicU64::new(0),
            finished_tiles: AtomicU64::new(0),
            total_tiles: AtomicU64::new(0),
            cancel: AtomicBool::new(false),
            cancel_message: Mutex::new(String::new()),
            start: Mutex::new(Instant::now()),
            update: Mutex::new(None),
        }
    }

    /// Start a new render.
    ///
    /// * `total_pixel_samples` - Pixel samples the render will take.
    /// * `total_tiles`         - Tiles in the render.
    pub fn reset(&self, total_pixel_samples: u64, total_tiles: u64) {
        self.pixel_samples.store(0, Ordering::Relaxed);
        self.finished_tiles.store(0, Ordering::Relaxed);
        self.total_pixel_samples.store(total_pixel_samples, Ordering::Relaxed);
        self.total_tiles.store(total_tiles, Ordering::Relaxed);
        self.cancel.store(false, Ordering::Release);
        lock(&self.cancel_message).clear();
        *lock(&self.start) = Instant::now();
    }

    /// Install a callback run after every update.
    ///
    /// * `callback` - Callback.
    pub fn set_update_callback(&self, callback: ProgressCallback) {
        *lock(&self.update) = Some(callback);
    }

    /// Record finished samples.
    ///
    /// * `pixel_samples` - Number of pixels times samples finished.
    pub fn add_samples(&self, pixel_samples: u64) {
        self.pixel_samples.fetch_add(pixel_samples, Ordering::Relaxed);
        self.notify();
    }

    /// Record a finished tile.
    pub fn add_finished_tile(&self) {
        self.finished_tiles.fetch_add(1, Ordering::Relaxed);
        self.notify();
    }

    fn notify(&self) {
        if let Some(callback) = lock(&self.update).as_ref() {
            callback(self);
        }
    }

    /// Pixel samples finished so far.
    pub fn pixel_samples(&self) -> u64 {
        self.pixel_samples.load(Ordering::Relaxed)
    }

    /// Pixel samples the render will take.
    pub fn total_pixel_samples(&self) -> u64 {
        self.total_pixel_samples.load(Ordering::Relaxed)
    }

    /// Tiles finished so far.
    pub fn finished_tiles(&self) -> u64 {
        self.finished_tiles.load(Ordering::Relaxed)
    }

    /// Tiles in the render.
    pub fn total_tiles(&self) -> u64 {
        self.total_tiles.load(Ordering::Relaxed)
    }

    /// Fraction of the render done, in [0, 1].
    pub fn fraction(&self) -> f64 {
        let total = self.total_pixel_samples();
        if total == 0 {
            return 0.0;
        }
        (self.pixel_samples() as f64 / total as f64).min(1.0)
    }

    /// Time since the render started.
    pub fn elapsed(&self) -> Duration {
        lock(&self.start).elapsed()
    }

    /// Request cancellation.
    ///
    /// * `message` - Reason shown to the user.
    pub fn set_cancel(&self, message: &str) {
        *lock(&self.cancel_message) = String::from(message);
        self.cancel.store(true, Ordering::Release);
    }

    /// Returns true if cancellation was requested.
    pub fn get_cancel(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Reason given for cancellation.
    pub fn cancel_message(&self) -> String {
        lock(&self.cancel_message).clone()
    }
}
