//! Errors raised by the Vulkan layer.

use ash::vk;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    #[error("No supported format: {0}")]
    NoSupportedFormat(String),

    /// A fixed-size pool or table is full.
    #[error("{what} capacity exceeded (limit {capacity})")]
    CapacityExceeded { what: &'static str, capacity: usize },

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// A handle or mapping that should exist does not.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Texture error: {0}")]
    TextureError(String),
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
