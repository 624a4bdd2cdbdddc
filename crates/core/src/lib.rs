//! Core utilities shared by every vkforge crate.
//!
//! - Error type and result alias
//! - Logging initialization
//! - Frame timing
//! - Renderer configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::RendererConfig;
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging, init_logging_with};
pub use timer::FrameTimer;
