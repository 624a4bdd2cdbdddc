//! Shader module creation from precompiled SPIR-V blobs.
//!
//! Blobs are opaque byte sequences found by file-name convention:
//! `<dir>/<name>.vert.spv` and `<dir>/<name>.frag.spv`. The only checks made
//! here are that a blob is non-empty and well-formed SPIR-V words; anything
//! else is left to the driver.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use vkforge_rhi::device::Device;
//! use vkforge_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkforge_rhi::RhiError> {
//! let vert = Shader::load(device.clone(), Path::new("shaders"), "textured", ShaderStage::Vertex)?;
//! let frag = Shader::load(device, Path::new("shaders"), "textured", ShaderStage::Fragment)?;
//! let stages = [vert.stage_create_info(), frag.stage_create_info()];
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

const ENTRY_POINT: &CStr = c"main";

/// Graphics pipeline stage a shader runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// File-name infix used by the shader build (`vert` / `frag`).
    pub fn extension(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert",
            ShaderStage::Fragment => "frag",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Path of the compiled blob for `name` in `stage`.
pub fn shader_path(dir: &Path, name: &str, stage: ShaderStage) -> PathBuf {
    dir.join(format!("{}.{}.spv", name, stage.extension()))
}

/// Decodes a SPIR-V blob into code words.
///
/// # Errors
///
/// [`RhiError::ShaderModuleError`] if the blob is empty, not a whole number
/// of words, or lacks the SPIR-V magic number.
pub fn read_spirv(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(RhiError::ShaderModuleError("empty shader blob".to_string()));
    }

    ash::util::read_spv(&mut Cursor::new(bytes))
        .map_err(|e| RhiError::ShaderModuleError(format!("invalid SPIR-V: {}", e)))
}

/// Vulkan shader module with its stage.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Reads `<dir>/<name>.<stage>.spv` and creates a module from it.
    pub fn load(
        device: Arc<Device>,
        dir: &Path,
        name: &str,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let path = shader_path(dir, name, stage);
        debug!("Loading {} shader from {:?}", stage, path);

        let bytes = std::fs::read(&path).map_err(|e| {
            RhiError::ShaderModuleError(format!("failed to read {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, stage)
    }

    /// Creates a module from an in-memory blob.
    ///
    /// # Errors
    ///
    /// [`RhiError::ShaderModuleError`] if the blob is malformed or the driver
    /// rejects it.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let code = read_spirv(bytes)?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe {
            device
                .handle()
                .create_shader_module(&create_info, None)
                .map_err(|e| {
                    RhiError::ShaderModuleError(format!("driver rejected {} shader: {}", stage, e))
                })?
        };

        info!("Created {} shader module ({} words)", stage, code.len());

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage description for pipeline creation; borrows the module.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    #[test]
    fn test_shader_stage_flags() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(format!("{}", ShaderStage::Fragment), "fragment");
    }

    #[test]
    fn test_shader_path_convention() {
        let dir = Path::new("shaders");
        assert_eq!(
            shader_path(dir, "textured", ShaderStage::Vertex),
            Path::new("shaders/textured.vert.spv")
        );
        assert_eq!(
            shader_path(dir, "textured", ShaderStage::Fragment),
            Path::new("shaders/textured.frag.spv")
        );
    }

    #[test]
    fn test_read_spirv_rejects_empty() {
        assert!(matches!(
            read_spirv(&[]),
            Err(RhiError::ShaderModuleError(_))
        ));
    }

    #[test]
    fn test_read_spirv_rejects_partial_word() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.push(0);
        assert!(matches!(
            read_spirv(&bytes),
            Err(RhiError::ShaderModuleError(_))
        ));
    }

    #[test]
    fn test_read_spirv_words() {
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());

        let words = read_spirv(&bytes).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
    }
}
