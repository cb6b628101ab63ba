//! Common math

mod common;
mod macros;

// Re-export
pub use common::*;
