// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. The binaries are compiled ahead of time
// (see build.rs) and read from disk at startup.

use super::VulkanDevice;
use crate::error::{SetupError, VkResultExt};
use anyhow::{Context, Result};
use ash::vk;
use std::io::{Cursor, ErrorKind};
use std::path::Path;

/// Read a SPIR-V binary into 32-bit words.
pub fn load_spirv(path: &Path) -> Result<Vec<u32>, SetupError> {
    let bytes = std::fs::read(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => SetupError::ShaderMissing(path.to_path_buf()),
        _ => SetupError::ShaderRead {
            path: path.to_path_buf(),
            source,
        },
    })?;

    // Checks the word size and the magic number, and copies into aligned storage
    ash::util::read_spv(&mut Cursor::new(&bytes[..])).map_err(|source| SetupError::InvalidSpirv {
        path: path.to_path_buf(),
        source,
    })
}

/// A shader module that is destroyed when dropped.
///
/// Only needed until the pipeline that uses it has been created.
pub struct ShaderModule<'a> {
    pub module: vk::ShaderModule,
    device: &'a VulkanDevice,
}

impl<'a> ShaderModule<'a> {
    pub fn new(device: &'a VulkanDevice, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .vk("vkCreateShaderModule")?;

        Ok(Self { module, device })
    }

    /// Load and wrap the SPIR-V file at `path`.
    pub fn from_file(device: &'a VulkanDevice, path: &Path) -> Result<Self> {
        let code = load_spirv(path)?;
        log::debug!("Loaded {} ({} words)", path.display(), code.len());
        Self::new(device, &code)
            .with_context(|| format!("Failed to create shader module from {}", path.display()))
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_shader_module(self.module, None);
        }
    }
}
