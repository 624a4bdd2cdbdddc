//! Error types shared by the non-GPU crates.

use thiserror::Error;

/// Main error type for configuration, windowing and host-side failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Surface creation errors reported by the windowing layer
    #[error("Surface error: {0}")]
    Surface(String),

    /// Invalid or unparsable configuration value
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
