//! Error types for asset loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for asset loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Asset path does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// IO error while reading an asset.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding error.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Decoded or supplied texture data is unusable.
    #[error("Invalid texture: {0}")]
    InvalidTexture(String),

    /// Mesh data is unusable.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
