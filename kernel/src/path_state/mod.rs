//! Path State

mod flags;
mod state;

// Re-export
pub use flags::*;
pub use state::*;
