//! Geometry

mod intersection;
mod ray;
mod transform;
mod vector2;
mod vector3;

// Re-export
pub use intersection::*;
pub use ray::*;
pub use transform::*;
pub use vector2::*;
pub use vector3::*;
