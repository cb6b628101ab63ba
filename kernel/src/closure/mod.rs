//! Closures

mod array;
mod bsdf;
#[allow(clippy::module_inception)]
mod closure;
mod label;
mod light_pass;
mod phase;

// Re-export
pub use array::*;
pub use bsdf::*;
pub use closure::*;
pub use label::*;
pub use light_pass::*;
pub use phase::*;
