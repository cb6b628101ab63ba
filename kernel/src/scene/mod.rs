//! Scene data

mod builder;
mod camera;
mod curve;
mod demo;
mod globals;
mod intersect;
mod light;
mod mesh;
mod object;
mod settings;
mod shader;

// Re-export
pub use builder::*;
pub use camera::*;
pub use curve::*;
pub use demo::*;
pub use globals::*;
pub use intersect::*;
pub use light::*;
pub use mesh::*;
pub use object::*;
pub use settings::*;
pub use shader::*;
