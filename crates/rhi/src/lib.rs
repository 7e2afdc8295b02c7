//! Thin RAII layer over `ash` for the two-subpass renderer.
//!
//! Every wrapper holds an `Arc<Device>` and destroys its Vulkan object on
//! drop, so teardown order follows ownership. The [`device::Device`] owns
//! the `gpu-allocator` instance that backs buffers and images.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

#[cfg(test)]
mod test_support;

pub use ash::vk;
pub use error::{RhiError, RhiResult};
