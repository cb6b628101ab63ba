//! Film

mod convert;
mod cryptomatte;
mod passes;

// Re-export
pub use convert::*;
pub use cryptomatte::*;
pub use passes::*;
