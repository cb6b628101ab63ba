//! Device

#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate proptest;

mod cpu;
mod device;
mod error;
mod image;
mod kernels;
mod memory;
mod pool;
mod progress;
mod session;
mod task;
mod tile;

// Re-export
pub use cpu::*;
pub use device::*;
pub use error::*;
pub use image::*;
pub use kernels::*;
pub use memory::*;
pub use pool::*;
pub use progress::*;
pub use session::*;
pub use task::*;
pub use tile::*;
