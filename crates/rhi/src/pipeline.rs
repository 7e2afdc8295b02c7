//! Graphics pipelines bound to one subpass of a render pass.
//!
//! A pipeline is described by a [`SubpassPipelineDesc`] and built with
//! [`Pipeline::new_graphics`]. Viewport and scissor are always dynamic, so a
//! pipeline stays valid across swapchain rebuilds as long as the render pass
//! it was built against is kept.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::shader::{Shader, ShaderStage};
//! use renderer_rhi::pipeline::{
//!     DepthMode, Pipeline, PipelineLayout, SubpassPipelineDesc, VertexInput,
//! };
//! use renderer_rhi::vertex::Vertex;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>, render_pass: vk::RenderPass) -> Result<(), renderer_rhi::RhiError> {
//! let vert = Shader::from_spirv_file(device.clone(), Path::new("Shaders/vert.spv"), ShaderStage::Vertex, "main")?;
//! let frag = Shader::from_spirv_file(device.clone(), Path::new("Shaders/frag.spv"), ShaderStage::Fragment, "main")?;
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//!
//! let desc = SubpassPipelineDesc {
//!     vertex_shader: &vert,
//!     fragment_shader: &frag,
//!     vertex_input: VertexInput::of::<Vertex>(),
//!     depth: DepthMode::TestAndWrite(vk::CompareOp::LESS),
//!     render_pass,
//!     subpass: 0,
//! };
//! let pipeline = Pipeline::new_graphics(device, &layout, &desc)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;
use crate::vertex::VertexLayout;

/// Descriptor set layouts and push constant ranges visible to a pipeline.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a layout. `set_layouts` are given in set-number order.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        set_layouts: &[vk::DescriptorSetLayout],
        push_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };
        debug!(
            "Pipeline layout: {} set(s), {} push range(s)",
            set_layouts.len(),
            push_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Vertex buffer layout consumed by a pipeline.
#[derive(Clone, Debug, Default)]
pub struct VertexInput {
    bindings: Vec<vk::VertexInputBindingDescription>,
    attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexInput {
    /// No vertex buffers; the vertex shader generates its own positions.
    pub fn none() -> Self {
        Self::default()
    }

    /// The layout of `V` at binding 0.
    pub fn of<V: VertexLayout>() -> Self {
        Self {
            bindings: vec![V::binding()],
            attributes: V::attributes(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Depth state of a subpass pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DepthMode {
    /// No depth attachment access.
    Disabled,
    /// Test with the given comparison and write passing fragments.
    TestAndWrite(vk::CompareOp),
}

impl DepthMode {
    fn to_vk(self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        let state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);
        match self {
            DepthMode::Disabled => state.depth_test_enable(false).depth_write_enable(false),
            DepthMode::TestAndWrite(op) => state
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(op),
        }
    }
}

/// Blend state of the single colour output: `src.a * src + (1 - src.a) * dst`,
/// alpha taken from the source. Shared by every pipeline.
pub fn alpha_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
}

/// Everything that varies between the renderer's pipelines.
///
/// The fixed part is a triangle list, filled polygons, back-face culling
/// with counter-clockwise front faces, one sample per pixel, alpha blending
/// and a dynamic viewport and scissor.
pub struct SubpassPipelineDesc<'a> {
    pub vertex_shader: &'a Shader,
    pub fragment_shader: &'a Shader,
    pub vertex_input: VertexInput,
    pub depth: DepthMode,
    pub render_pass: vk::RenderPass,
    pub subpass: u32,
}

const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Graphics pipeline for one subpass.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    subpass: u32,
}

impl Pipeline {
    /// Builds a graphics pipeline from `desc`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if `desc` names a null render
    /// pass, or the Vulkan error if creation fails.
    pub fn new_graphics(
        device: Arc<Device>,
        layout: &PipelineLayout,
        desc: &SubpassPipelineDesc<'_>,
    ) -> RhiResult<Self> {
        if desc.render_pass == vk::RenderPass::null() {
            return Err(RhiError::PipelineError(format!(
                "Subpass {} pipeline has no render pass",
                desc.subpass
            )));
        }

        let stages = [
            desc.vertex_shader.stage_create_info(),
            desc.fragment_shader.stage_create_info(),
        ];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_input.bindings)
            .vertex_attribute_descriptions(&desc.vertex_input.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);
        let viewport = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = desc.depth.to_vk();
        let blend_attachments = [alpha_blend_attachment()];
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);
        let dynamic = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(layout.handle())
            .render_pass(desc.render_pass)
            .subpass(desc.subpass)
            .base_pipeline_index(-1);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines.first().copied().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no pipeline".to_string())
        })?;

        info!(
            "Graphics pipeline created for subpass {} ({} vertex binding(s))",
            desc.subpass,
            desc.vertex_input.bindings.len()
        );

        Ok(Self {
            device,
            pipeline,
            subpass: desc.subpass,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn subpass(&self) -> u32 {
        self.subpass
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed (subpass {})", self.subpass);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::Vertex;

    #[test]
    fn test_alpha_blend_state() {
        let state = alpha_blend_attachment();
        assert_eq!(state.blend_enable, vk::TRUE);
        assert_eq!(state.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(
            state.dst_color_blend_factor,
            vk::BlendFactor::ONE_MINUS_SRC_ALPHA
        );
        assert_eq!(state.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(state.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
        assert_eq!(state.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_depth_modes() {
        let off = DepthMode::Disabled.to_vk();
        assert_eq!(off.depth_test_enable, vk::FALSE);
        assert_eq!(off.depth_write_enable, vk::FALSE);

        let on = DepthMode::TestAndWrite(vk::CompareOp::LESS).to_vk();
        assert_eq!(on.depth_test_enable, vk::TRUE);
        assert_eq!(on.depth_write_enable, vk::TRUE);
        assert_eq!(on.depth_compare_op, vk::CompareOp::LESS);
        assert_eq!(on.stencil_test_enable, vk::FALSE);
    }

    #[test]
    fn test_vertex_input() {
        assert!(VertexInput::none().is_empty());

        let input = VertexInput::of::<Vertex>();
        assert!(!input.is_empty());
        assert_eq!(input.bindings[0].binding, 0);
        assert_eq!(input.attributes.len(), 3);
    }
}
