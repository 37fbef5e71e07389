//! Error types shared by the renderer crates.

use thiserror::Error;

/// Renderer-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A raw texture identifier with no entry in the texture tables.
    #[error("Unsupported texture type: {0}")]
    UnsupportedTextureType(String),

    /// Output size with a zero axis.
    #[error("Invalid output size {width}x{height}")]
    InvalidOutputSize { width: u32, height: u32 },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
