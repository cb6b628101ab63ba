//! Shading points

mod data;
mod eval;
mod flags;
mod graph;
mod query;
mod setup;

// Re-export
pub use data::*;
pub use eval::*;
pub use flags::*;
pub use graph::*;
pub use query::*;
pub use setup::*;
