//! Image errors

use thiserror::Error;

/// Errors raised while reading or writing images.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The file name has no extension or one that is not handled.
    #[error("unsupported image format for '{0}'")]
    UnsupportedFormat(String),

    /// Decoding failed.
    #[error("error reading image '{path}': {reason}")]
    Read { path: String, reason: String },

    /// Encoding failed.
    #[error("error writing image '{path}': {reason}")]
    Write { path: String, reason: String },

    /// Pixel data does not match the image size.
    #[error("image '{path}' has {len} values for {width}x{height} pixels")]
    Size {
        path: String,
        width: usize,
        height: usize,
        len: usize,
    },
}
