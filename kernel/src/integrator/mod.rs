//! Integrator

mod context;
mod light;
mod path_trace;
mod radiance;
mod shader_eval;
mod volume;

// Re-export
pub use context::*;
pub use light::*;
pub use path_trace::*;
pub use radiance::*;
pub use shader_eval::*;
pub use volume::*;
