//! The two-subpass render graph.
//!
//! # Overview
//!
//! One render pass with three attachments:
//!
//! | Index | Attachment | Load/Store | Final layout |
//! |-------|------------|------------|--------------|
//! | 0 | swap-chain image | CLEAR / STORE | `PRESENT_SRC_KHR` |
//! | 1 | offscreen colour | CLEAR / DONT_CARE | `COLOR_ATTACHMENT_OPTIMAL` |
//! | 2 | offscreen depth | CLEAR / DONT_CARE | `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` |
//!
//! Subpass 0 (geometry) renders meshes into attachments 1 and 2.
//! Subpass 1 (composition) reads both as input attachments and draws a
//! fullscreen triangle into attachment 0.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::info;

use renderer_rhi::device::Device;
use renderer_rhi::pipeline::{Pipeline, PipelineLayout};
use renderer_rhi::render_pass::{RenderPass, RenderPassDesc, SubpassDesc};

use crate::descriptors::DescriptorLayouts;
use crate::error::RendererResult;
use crate::pipelines;

/// Attachment index of the swap-chain image.
pub const SWAPCHAIN_ATTACHMENT: u32 = 0;
/// Attachment index of the offscreen colour target.
pub const COLOR_ATTACHMENT: u32 = 1;
/// Attachment index of the offscreen depth target.
pub const DEPTH_ATTACHMENT: u32 = 2;

/// Subpass drawing mesh models.
pub const GEOMETRY_SUBPASS: u32 = 0;
/// Subpass drawing the fullscreen composition triangle.
pub const COMPOSITION_SUBPASS: u32 = 1;

/// Clear colour of the swap-chain attachment.
pub const SWAPCHAIN_CLEAR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];
/// Clear colour of the offscreen colour attachment.
pub const COLOR_CLEAR: [f32; 4] = [0.1, 0.1, 0.1, 1.0];

/// Clear values in attachment order.
pub fn clear_values() -> [vk::ClearValue; 3] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: SWAPCHAIN_CLEAR,
            },
        },
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: COLOR_CLEAR,
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

fn attachment(
    format: vk::Format,
    store_op: vk::AttachmentStoreOp,
    final_layout: vk::ImageLayout,
) -> vk::AttachmentDescription {
    vk::AttachmentDescription::default()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(store_op)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(final_layout)
}

fn reference(attachment: u32, layout: vk::ImageLayout) -> vk::AttachmentReference {
    vk::AttachmentReference { attachment, layout }
}

/// Describes the geometry + composition render pass.
///
/// # Arguments
///
/// * `swapchain_format` - Format of the presentable images
/// * `depth_format` - Format chosen for the depth attachment
pub fn render_pass_desc(swapchain_format: vk::Format, depth_format: vk::Format) -> RenderPassDesc {
    let attachments = vec![
        attachment(
            swapchain_format,
            vk::AttachmentStoreOp::STORE,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ),
        attachment(
            renderer_rhi::image::COLOR_ATTACHMENT_FORMAT,
            vk::AttachmentStoreOp::DONT_CARE,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ),
        attachment(
            depth_format,
            vk::AttachmentStoreOp::DONT_CARE,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ),
    ];

    let geometry = SubpassDesc {
        inputs: Vec::new(),
        colors: vec![reference(
            COLOR_ATTACHMENT,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )],
        depth_stencil: Some(reference(
            DEPTH_ATTACHMENT,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        )),
    };

    let composition = SubpassDesc {
        inputs: vec![
            reference(COLOR_ATTACHMENT, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            reference(DEPTH_ATTACHMENT, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ],
        colors: vec![reference(
            SWAPCHAIN_ATTACHMENT,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )],
        depth_stencil: None,
    };

    let color_read_write =
        vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE;

    let dependencies = vec![
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(GEOMETRY_SUBPASS)
            .src_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::MEMORY_READ)
            .dst_access_mask(color_read_write),
        vk::SubpassDependency::default()
            .src_subpass(GEOMETRY_SUBPASS)
            .dst_subpass(COMPOSITION_SUBPASS)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::FRAGMENT_SHADER)
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ),
        vk::SubpassDependency::default()
            .src_subpass(COMPOSITION_SUBPASS)
            .dst_subpass(vk::SUBPASS_EXTERNAL)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::BOTTOM_OF_PIPE)
            .src_access_mask(color_read_write)
            .dst_access_mask(vk::AccessFlags::MEMORY_READ),
    ];

    RenderPassDesc {
        attachments,
        subpasses: vec![geometry, composition],
        dependencies,
    }
}

/// Render pass plus the pipeline of each subpass.
///
/// Fields drop in declaration order: pipelines and their layouts go
/// before the render pass they were compiled against.
pub struct RenderGraph {
    geometry_pipeline: Pipeline,
    geometry_layout: PipelineLayout,
    composition_pipeline: Pipeline,
    composition_layout: PipelineLayout,
    render_pass: RenderPass,
    swapchain_format: vk::Format,
    depth_format: vk::Format,
}

impl RenderGraph {
    /// Creates the render pass and compiles both pipelines against it.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `swapchain_format` - Format of the presentable images
    /// * `depth_format` - Format chosen for the depth attachment
    /// * `layouts` - Descriptor set layouts the pipelines bind
    /// * `shader_dir` - Directory holding the four SPIR-V blobs
    ///
    /// # Errors
    ///
    /// Returns an error if a shader cannot be loaded or any object fails to build.
    pub fn new(
        device: Arc<Device>,
        swapchain_format: vk::Format,
        depth_format: vk::Format,
        layouts: &DescriptorLayouts,
        shader_dir: &Path,
    ) -> RendererResult<Self> {
        let desc = render_pass_desc(swapchain_format, depth_format);
        let render_pass = RenderPass::new(device.clone(), &desc)?;

        let (geometry_pipeline, geometry_layout) =
            pipelines::create_geometry_pipeline(device.clone(), &render_pass, layouts, shader_dir)?;
        let (composition_pipeline, composition_layout) =
            pipelines::create_composition_pipeline(device, &render_pass, layouts, shader_dir)?;

        info!(
            "Render graph ready: swapchain {:?}, depth {:?}",
            swapchain_format, depth_format
        );

        Ok(Self {
            geometry_pipeline,
            geometry_layout,
            composition_pipeline,
            composition_layout,
            render_pass,
            swapchain_format,
            depth_format,
        })
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn geometry_pipeline(&self) -> &Pipeline {
        &self.geometry_pipeline
    }

    #[inline]
    pub fn geometry_layout(&self) -> &PipelineLayout {
        &self.geometry_layout
    }

    #[inline]
    pub fn composition_pipeline(&self) -> &Pipeline {
        &self.composition_pipeline
    }

    #[inline]
    pub fn composition_layout(&self) -> &PipelineLayout {
        &self.composition_layout
    }

    /// Swap-chain format the render pass was built for.
    #[inline]
    pub fn swapchain_format(&self) -> vk::Format {
        self.swapchain_format
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc() -> RenderPassDesc {
        render_pass_desc(vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT)
    }

    #[test]
    fn test_desc_is_valid() {
        let desc = desc();
        assert!(desc.validate().is_ok());
        assert_eq!(desc.attachments.len(), 3);
        assert_eq!(desc.subpasses.len(), 2);
        assert_eq!(desc.dependencies.len(), 3);
    }

    #[test]
    fn test_attachment_formats_and_ops() {
        let desc = desc();
        let [swap, color, depth] = [desc.attachments[0], desc.attachments[1], desc.attachments[2]];

        assert_eq!(swap.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(swap.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(swap.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        assert_eq!(color.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(color.final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        assert_eq!(depth.format, vk::Format::D32_SFLOAT);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(
            depth.final_layout,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        );

        for a in &desc.attachments {
            assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
            assert_eq!(a.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
            assert_eq!(a.initial_layout, vk::ImageLayout::UNDEFINED);
        }
    }

    #[test]
    fn test_geometry_subpass_targets() {
        let desc = desc();
        let geometry = &desc.subpasses[GEOMETRY_SUBPASS as usize];
        assert!(geometry.inputs.is_empty());
        assert_eq!(geometry.colors.len(), 1);
        assert_eq!(geometry.colors[0].attachment, COLOR_ATTACHMENT);
        assert_eq!(
            geometry.depth_stencil.map(|d| d.attachment),
            Some(DEPTH_ATTACHMENT)
        );
    }

    #[test]
    fn test_composition_reads_inputs() {
        let desc = desc();
        let composition = &desc.subpasses[COMPOSITION_SUBPASS as usize];

        let inputs: Vec<_> = composition
            .inputs
            .iter()
            .map(|r| (r.attachment, r.layout))
            .collect();
        assert_eq!(
            inputs,
            vec![
                (COLOR_ATTACHMENT, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
                (DEPTH_ATTACHMENT, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            ]
        );
        assert_eq!(composition.colors[0].attachment, SWAPCHAIN_ATTACHMENT);
        assert!(composition.depth_stencil.is_none());
    }

    #[test]
    fn test_dependencies() {
        let desc = desc();
        let deps = &desc.dependencies;

        assert_eq!(deps[0].src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[0].dst_subpass, GEOMETRY_SUBPASS);
        assert_eq!(deps[0].src_access_mask, vk::AccessFlags::MEMORY_READ);

        assert_eq!(deps[1].src_subpass, GEOMETRY_SUBPASS);
        assert_eq!(deps[1].dst_subpass, COMPOSITION_SUBPASS);
        assert_eq!(
            deps[1].src_stage_mask,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
        );
        assert_eq!(deps[1].dst_stage_mask, vk::PipelineStageFlags::FRAGMENT_SHADER);
        assert_eq!(deps[1].src_access_mask, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        assert_eq!(deps[1].dst_access_mask, vk::AccessFlags::SHADER_READ);

        assert_eq!(deps[2].src_subpass, COMPOSITION_SUBPASS);
        assert_eq!(deps[2].dst_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(deps[2].dst_stage_mask, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_clear_values() {
        let clears = clear_values();
        unsafe {
            assert_eq!(clears[0].color.float32, SWAPCHAIN_CLEAR);
            assert_eq!(clears[1].color.float32, COLOR_CLEAR);
            assert_eq!(clears[2].depth_stencil.depth, 1.0);
            assert_eq!(clears[2].depth_stencil.stencil, 0);
        }
    }

    #[test]
    fn test_render_graph_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<RenderGraph>();
    }
}
