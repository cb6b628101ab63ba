//! Kernel

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate hexf;
#[macro_use]
extern crate log;

#[cfg(test)]
#[macro_use]
extern crate proptest;

pub mod closure;
pub mod film;
pub mod geometry;
pub mod integrator;
pub mod math;
pub mod path_state;
pub mod rng;
pub mod sampling;
pub mod scene;
pub mod shader;
pub mod spectrum;
pub mod texture;
pub mod volume;
