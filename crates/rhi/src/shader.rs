//! SPIR-V shader modules.
//!
//! Modules only need to live until the pipelines that use them are built;
//! the renderer drops them right after pipeline creation.

use std::ffi::CString;
use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

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
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
        })
    }
}

/// Decodes a SPIR-V blob into code words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the blob is empty or not a whole
/// number of words. Big-endian blobs are byte-swapped.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(RhiError::ShaderError("SPIR-V blob is empty".to_string()));
    }
    ash::util::read_spv(&mut Cursor::new(bytes)).map_err(|e| {
        RhiError::ShaderError(format!("Malformed SPIR-V ({} bytes): {}", bytes.len(), e))
    })
}

/// A `VkShaderModule` bound to one stage and entry point.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    entry_point: CString,
}

impl Shader {
    /// Reads and wraps the SPIR-V file at `path`.
    ///
    /// # Errors
    ///
    /// Returns a [`RhiError::ShaderError`] naming `path` if the file cannot
    /// be read or decoded, or the Vulkan error if module creation fails.
    pub fn from_spirv_file(
        device: Arc<Device>,
        path: &Path,
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let named = |msg: String| RhiError::ShaderError(format!("{}: {}", path.display(), msg));

        let bytes = std::fs::read(path).map_err(|e| named(e.to_string()))?;
        let code = spirv_words(&bytes).map_err(|e| named(e.to_string()))?;
        let shader = Self::from_words(device, &code, stage, entry_point)?;

        debug!("Loaded {} shader '{}'", stage, path.display());
        Ok(shader)
    }

    /// # Errors
    ///
    /// Returns an error if `entry_point` contains a NUL byte or module
    /// creation fails.
    pub fn from_words(
        device: Arc<Device>,
        code: &[u32],
        stage: ShaderStage,
        entry_point: &str,
    ) -> RhiResult<Self> {
        let entry_point = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Bad entry point name: {}", e)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        Ok(Self {
            device,
            module,
            stage,
            entry_point,
        })
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Stage description for pipeline creation. Borrows `self`.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("{} shader module destroyed", self.stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SPIR-V magic number followed by a version word, little-endian
    const HEADER: [u8; 8] = [0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00];

    #[test]
    fn test_stage_flags() {
        assert_eq!(
            ShaderStage::Vertex.to_vk_stage(),
            vk::ShaderStageFlags::VERTEX
        );
        assert_eq!(
            ShaderStage::Fragment.to_vk_stage(),
            vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(ShaderStage::Fragment.to_string(), "fragment");
    }

    #[test]
    fn test_spirv_words_decodes_header() {
        let words = spirv_words(&HEADER).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }

    #[test]
    fn test_spirv_words_rejects_empty_blob() {
        assert!(matches!(spirv_words(&[]), Err(RhiError::ShaderError(_))));
    }

    #[test]
    fn test_spirv_words_rejects_partial_word() {
        let err = spirv_words(&HEADER[..5]).unwrap_err();
        assert!(err.to_string().contains("5 bytes"));
    }

    #[test]
    fn test_spirv_words_rejects_text() {
        assert!(spirv_words(b"not spirv").is_err());
    }

    #[test]
    fn test_shader_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Shader>();
    }
}
