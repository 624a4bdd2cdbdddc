//! Renderer configuration.
//!
//! Defaults are suitable for a development build; every field can be
//! overridden through `VKFORGE_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result};

/// Startup configuration for the window and renderer.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    /// Window title.
    pub title: String,
    /// Initial window width in logical pixels.
    pub width: u32,
    /// Initial window height in logical pixels.
    pub height: u32,
    /// Enable the Khronos validation layer.
    pub validation: bool,
    /// Upper bound for every fence wait and single-time submission.
    pub wait_timeout: Duration,
    /// Render with the highest sample count supported by the device.
    pub msaa: bool,
    /// Directory containing `<name>.<stage>.spv` shader blobs.
    pub shader_dir: PathBuf,
    /// Texture to sample; a procedural checkerboard is used when unset.
    pub texture: Option<PathBuf>,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            title: "vkforge".to_string(),
            width: 800,
            height: 600,
            validation: cfg!(debug_assertions),
            wait_timeout: Duration::from_secs(5),
            msaa: true,
            shader_dir: PathBuf::from("shaders"),
            texture: None,
        }
    }
}

impl RendererConfig {
    /// Defaults overlaid with `VKFORGE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values returned by `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(title) = lookup("VKFORGE_TITLE") {
            config.title = title;
        }
        if let Some(width) = parse(&lookup, "VKFORGE_WIDTH")? {
            config.width = width;
        }
        if let Some(height) = parse(&lookup, "VKFORGE_HEIGHT")? {
            config.height = height;
        }
        if let Some(validation) = parse_flag(&lookup, "VKFORGE_VALIDATION")? {
            config.validation = validation;
        }
        if let Some(ms) = parse::<u64>(&lookup, "VKFORGE_WAIT_TIMEOUT_MS")? {
            config.wait_timeout = Duration::from_millis(ms);
        }
        if let Some(msaa) = parse_flag(&lookup, "VKFORGE_MSAA")? {
            config.msaa = msaa;
        }
        if let Some(dir) = lookup("VKFORGE_SHADER_DIR") {
            config.shader_dir = PathBuf::from(dir);
        }
        if let Some(texture) = lookup("VKFORGE_TEXTURE") {
            config.texture = Some(PathBuf::from(texture));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values the renderer cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.wait_timeout.is_zero() {
            return Err(Error::Config("wait timeout must be non-zero".to_string()));
        }
        Ok(())
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{key}: cannot parse '{raw}'"))),
        None => Ok(None),
    }
}

fn parse_flag(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<bool>> {
    match lookup(key).as_deref().map(str::trim) {
        Some("1" | "true" | "on" | "yes") => Ok(Some(true)),
        Some("0" | "false" | "off" | "no") => Ok(Some(false)),
        Some(other) => Err(Error::Config(format!("{key}: expected a boolean, got '{other}'"))),
        None => Ok(None),
    }
}
