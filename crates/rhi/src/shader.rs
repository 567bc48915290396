//! Shader module loading.
//!
//! Shaders are consumed as precompiled SPIR-V (`glslc` output); see
//! `assets/shaders/` for the GLSL sources and build instructions.

use std::ffi::CStr;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Pipeline stage a shader module targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

impl ShaderStage {
    /// Converts to Vulkan stage flags.
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }

    /// Human-readable stage name.
    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        }
    }
}

/// A compiled shader module plus the metadata pipelines need.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
}

impl Shader {
    /// Loads a SPIR-V file and creates a shader module.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid SPIR-V, or
    /// module creation fails.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: impl AsRef<Path>,
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::Shader(format!("failed to read {}: {}", path.display(), e))
        })?;
        let shader = Self::from_spirv_bytes(device, &bytes, stage)?;
        debug!("Loaded {} shader from {}", stage.name(), path.display());
        Ok(shader)
    }

    /// Creates a shader module from SPIR-V bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not valid SPIR-V or module creation
    /// fails.
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        stage: ShaderStage,
    ) -> RhiResult<Self> {
        let words = ash::util::read_spv(&mut Cursor::new(bytes))
            .map_err(|e| RhiError::Shader(format!("invalid SPIR-V: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        Ok(Self {
            device,
            module,
            stage,
        })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the stage this module targets.
    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Returns the entry point name (always `main`).
    #[inline]
    pub fn entry_point(&self) -> &'static CStr {
        c"main"
    }

    /// Builds the pipeline stage create info for this module.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(self.entry_point())
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_flags() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn stage_names() {
        assert_eq!(ShaderStage::Vertex.name(), "vertex");
        assert_eq!(ShaderStage::Fragment.name(), "fragment");
    }
}
