//! Render pass and framebuffer wrappers.
//!
//! A render pass is described first as plain data ([`RenderPassDesc`]),
//! which owns its attachment references so it can be built, compared and
//! inspected without a device. [`RenderPass::new`] turns the description
//! into a VkRenderPass.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Attachment references used by one subpass.
#[derive(Clone, Debug, Default)]
pub struct SubpassDesc {
    /// Attachments read as input attachments.
    pub inputs: Vec<vk::AttachmentReference>,
    /// Attachments written as colour targets.
    pub colors: Vec<vk::AttachmentReference>,
    /// Depth/stencil target, if any.
    pub depth_stencil: Option<vk::AttachmentReference>,
}

/// Complete description of a graphics render pass.
#[derive(Clone, Debug, Default)]
pub struct RenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassDesc {
    /// Checks that every reference points at a declared attachment and
    /// every dependency at a declared subpass (or `SUBPASS_EXTERNAL`).
    pub fn validate(&self) -> RhiResult<()> {
        let attachment_count = self.attachments.len() as u32;
        let subpass_count = self.subpasses.len() as u32;

        if subpass_count == 0 {
            return Err(RhiError::InvalidHandle(
                "Render pass needs at least one subpass".to_string(),
            ));
        }

        for (i, subpass) in self.subpasses.iter().enumerate() {
            let refs = subpass
                .inputs
                .iter()
                .chain(&subpass.colors)
                .chain(subpass.depth_stencil.iter());
            for reference in refs {
                if reference.attachment >= attachment_count {
                    return Err(RhiError::InvalidHandle(format!(
                        "Subpass {} references attachment {} of {}",
                        i, reference.attachment, attachment_count
                    )));
                }
            }
        }

        let valid_subpass = |s: u32| s == vk::SUBPASS_EXTERNAL || s < subpass_count;
        for dependency in &self.dependencies {
            if !valid_subpass(dependency.src_subpass) || !valid_subpass(dependency.dst_subpass) {
                return Err(RhiError::InvalidHandle(format!(
                    "Dependency {} -> {} names a missing subpass",
                    dependency.src_subpass, dependency.dst_subpass
                )));
            }
        }

        Ok(())
    }
}

/// Vulkan render pass wrapper.
pub struct RenderPass {
    device: Arc<Device>,
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Creates a render pass from its description.
    ///
    /// # Errors
    ///
    /// Returns an error if the description is inconsistent or creation fails.
    pub fn new(device: Arc<Device>, desc: &RenderPassDesc) -> RhiResult<Self> {
        desc.validate()?;

        let subpasses: Vec<vk::SubpassDescription> = desc
            .subpasses
            .iter()
            .map(|s| {
                let mut subpass = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .input_attachments(&s.inputs)
                    .color_attachments(&s.colors);
                if let Some(depth) = s.depth_stencil.as_ref() {
                    subpass = subpass.depth_stencil_attachment(depth);
                }
                subpass
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&desc.attachments)
            .subpasses(&subpasses)
            .dependencies(&desc.dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created: {} attachment(s), {} subpass(es)",
            desc.attachments.len(),
            subpasses.len()
        );

        Ok(Self {
            device,
            render_pass,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        info!("Render pass destroyed");
    }
}

/// Vulkan framebuffer wrapper.
pub struct Framebuffer {
    device: Arc<Device>,
    framebuffer: vk::Framebuffer,
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a single-layer framebuffer.
    ///
    /// `attachments` must be in the render pass attachment order and all
    /// views must have the given extent.
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        debug!(
            "Created framebuffer {}x{} with {} attachment(s)",
            extent.width,
            extent.height,
            attachments.len()
        );

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
        debug!("Destroyed framebuffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(attachment: u32) -> vk::AttachmentReference {
        vk::AttachmentReference {
            attachment,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    fn single_attachment_desc() -> RenderPassDesc {
        RenderPassDesc {
            attachments: vec![vk::AttachmentDescription::default()],
            subpasses: vec![SubpassDesc {
                colors: vec![reference(0)],
                ..Default::default()
            }],
            dependencies: vec![],
        }
    }

    #[test]
    fn test_validate_accepts_consistent_desc() {
        assert!(single_attachment_desc().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_attachment() {
        let mut desc = single_attachment_desc();
        desc.subpasses[0].inputs.push(reference(3));
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_subpass() {
        let mut desc = single_attachment_desc();
        desc.dependencies.push(
            vk::SubpassDependency::default()
                .src_subpass(0)
                .dst_subpass(1),
        );
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_validate_allows_external_dependencies() {
        let mut desc = single_attachment_desc();
        desc.dependencies.push(
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0),
        );
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_desc() {
        assert!(RenderPassDesc::default().validate().is_err());
    }

    #[test]
    fn test_wrappers_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RenderPass>();
        assert_send_sync::<Framebuffer>();
    }
}
