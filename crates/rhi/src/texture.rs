//! Texture upload.
//!
//! A [`Texture`] is a sampled image whose pixels were copied from a
//! staging buffer. The upload runs as a blocking one-time submission:
//!
//! ```text
//! UNDEFINED -> TRANSFER_DST_OPTIMAL      (barrier, then buffer-to-image copy)
//! TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageUsage, full_subresource_range};

/// Texture pixel format; decoded images are always expanded to RGBA8.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Access masks and pipeline stages of one layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Returns the barrier parameters for a supported layout transition.
///
/// # Errors
///
/// Returns [`RhiError::TextureError`] for any other pair of layouts.
pub fn layout_transition(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> RhiResult<LayoutTransition> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::empty(),
                dst_access: vk::AccessFlags::TRANSFER_WRITE,
                src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
                dst_stage: vk::PipelineStageFlags::TRANSFER,
            })
        }
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok(LayoutTransition {
                src_access: vk::AccessFlags::TRANSFER_WRITE,
                dst_access: vk::AccessFlags::SHADER_READ,
                src_stage: vk::PipelineStageFlags::TRANSFER,
                dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            })
        }
        _ => Err(RhiError::TextureError(format!(
            "Unsupported layout transition {:?} -> {:?}",
            old_layout, new_layout
        ))),
    }
}

/// Checks that `len` bytes hold exactly `width * height` RGBA8 pixels.
pub fn check_rgba8_len(width: u32, height: u32, len: usize) -> RhiResult<()> {
    if width == 0 || height == 0 {
        return Err(RhiError::TextureError(format!(
            "Texture has empty extent {}x{}",
            width, height
        )));
    }
    let expected = width as usize * height as usize * 4;
    if len != expected {
        return Err(RhiError::TextureError(format!(
            "Expected {} bytes of RGBA8 data for {}x{}, got {}",
            expected, width, height, len
        )));
    }
    Ok(())
}

/// Sampled texture image in `SHADER_READ_ONLY_OPTIMAL` layout.
pub struct Texture {
    image: Image,
}

impl Texture {
    /// Uploads tightly packed RGBA8 pixels into a new device-local image.
    ///
    /// # Errors
    ///
    /// Returns an error if the pixel data does not match the extent, or if
    /// any allocation, transition or copy fails.
    pub fn from_rgba8(
        device: Arc<Device>,
        pool: &CommandPool,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> RhiResult<Self> {
        check_rgba8_len(width, height, pixels.len())?;

        let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;
        let extent = vk::Extent2D { width, height };
        let image = Image::new(device, extent, TEXTURE_FORMAT, ImageUsage::Texture)?;

        let to_transfer = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        let to_shader_read = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        pool.one_time_submit(|cmd| {
            transition(
                cmd,
                image.handle(),
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                to_transfer,
            );

            cmd.copy_buffer_to_image(staging.handle(), image.handle(), extent);

            transition(
                cmd,
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                to_shader_read,
            );
        })?;

        debug!("Uploaded texture {}x{}", width, height);

        Ok(Self { image })
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }
}

fn transition(
    cmd: &CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    t: LayoutTransition,
) {
    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(full_subresource_range(vk::ImageAspectFlags::COLOR))
        .src_access_mask(t.src_access)
        .dst_access_mask(t.dst_access);

    cmd.image_barrier(t.src_stage, t.dst_stage, &barrier);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_to_transfer_dst() {
        let t = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::empty());
        assert_eq!(t.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn test_transition_to_shader_read() {
        let t = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(t.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(t.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(t.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_unsupported_transition_is_error() {
        let result = layout_transition(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::UNDEFINED,
        );
        assert!(matches!(result, Err(RhiError::TextureError(_))));
    }

    #[test]
    fn test_check_rgba8_len() {
        assert!(check_rgba8_len(2, 2, 16).is_ok());
        assert!(check_rgba8_len(2, 2, 12).is_err());
        assert!(check_rgba8_len(0, 2, 0).is_err());
    }
}
