//! Geometry and composition pipelines.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use glam::Mat4;
use tracing::info;

use renderer_rhi::device::Device;
use renderer_rhi::pipeline::{
    DepthMode, Pipeline, PipelineLayout, SubpassPipelineDesc, VertexInput,
};
use renderer_rhi::render_pass::RenderPass;
use renderer_rhi::shader::{Shader, ShaderStage};
use renderer_rhi::vertex::Vertex;

use crate::descriptors::DescriptorLayouts;
use crate::error::RendererResult;
use crate::render_graph::{COMPOSITION_SUBPASS, GEOMETRY_SUBPASS};

/// Shader entry point used by every stage.
pub const SHADER_ENTRY: &str = "main";

/// Geometry-pass vertex shader file name.
pub const GEOMETRY_VERT: &str = "vert.spv";
/// Geometry-pass fragment shader file name.
pub const GEOMETRY_FRAG: &str = "frag.spv";
/// Composition-pass vertex shader file name.
pub const COMPOSITION_VERT: &str = "second_vert.spv";
/// Composition-pass fragment shader file name.
pub const COMPOSITION_FRAG: &str = "second_frag.spv";

/// Stage the per-model transform is pushed to.
pub const TRANSFORM_PUSH_STAGES: vk::ShaderStageFlags = vk::ShaderStageFlags::VERTEX;

/// Push constant range holding one model matrix.
pub fn transform_push_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(TRANSFORM_PUSH_STAGES)
        .offset(0)
        .size(std::mem::size_of::<Mat4>() as u32)
}

/// Paths of a vertex/fragment shader pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderPair {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPair {
    /// Shader pair of the geometry subpass under `dir`.
    pub fn geometry(dir: &Path) -> Self {
        Self {
            vertex: dir.join(GEOMETRY_VERT),
            fragment: dir.join(GEOMETRY_FRAG),
        }
    }

    /// Shader pair of the composition subpass under `dir`.
    pub fn composition(dir: &Path) -> Self {
        Self {
            vertex: dir.join(COMPOSITION_VERT),
            fragment: dir.join(COMPOSITION_FRAG),
        }
    }

    fn load(&self, device: &Arc<Device>) -> RendererResult<(Shader, Shader)> {
        let vertex = Shader::from_spirv_file(
            device.clone(),
            &self.vertex,
            ShaderStage::Vertex,
            SHADER_ENTRY,
        )?;
        let fragment = Shader::from_spirv_file(
            device.clone(),
            &self.fragment,
            ShaderStage::Fragment,
            SHADER_ENTRY,
        )?;
        Ok((vertex, fragment))
    }
}

/// Builds the pipeline that draws mesh models in subpass 0.
///
/// Binds `[uniform, sampler]` descriptor sets and takes the model matrix
/// as a vertex-stage push constant.
///
/// # Errors
///
/// Returns an error if a shader cannot be loaded or pipeline creation fails.
pub fn create_geometry_pipeline(
    device: Arc<Device>,
    render_pass: &RenderPass,
    layouts: &DescriptorLayouts,
    shader_dir: &Path,
) -> RendererResult<(Pipeline, PipelineLayout)> {
    let (vertex_shader, fragment_shader) = ShaderPair::geometry(shader_dir).load(&device)?;

    let layout = PipelineLayout::new(
        device.clone(),
        &[layouts.uniform().handle(), layouts.sampler().handle()],
        &[transform_push_range()],
    )?;

    let desc = SubpassPipelineDesc {
        vertex_shader: &vertex_shader,
        fragment_shader: &fragment_shader,
        vertex_input: VertexInput::of::<Vertex>(),
        depth: DepthMode::TestAndWrite(vk::CompareOp::LESS),
        render_pass: render_pass.handle(),
        subpass: GEOMETRY_SUBPASS,
    };
    let pipeline = Pipeline::new_graphics(device, &layout, &desc)?;

    info!("Geometry pipeline created");

    Ok((pipeline, layout))
}

/// Builds the pipeline that composes the geometry output in subpass 1.
///
/// Has no vertex input: the vertex shader emits a fullscreen triangle.
///
/// # Errors
///
/// Returns an error if a shader cannot be loaded or pipeline creation fails.
pub fn create_composition_pipeline(
    device: Arc<Device>,
    render_pass: &RenderPass,
    layouts: &DescriptorLayouts,
    shader_dir: &Path,
) -> RendererResult<(Pipeline, PipelineLayout)> {
    let (vertex_shader, fragment_shader) = ShaderPair::composition(shader_dir).load(&device)?;

    let layout = PipelineLayout::new(device.clone(), &[layouts.input().handle()], &[])?;

    let desc = SubpassPipelineDesc {
        vertex_shader: &vertex_shader,
        fragment_shader: &fragment_shader,
        vertex_input: VertexInput::none(),
        depth: DepthMode::Disabled,
        render_pass: render_pass.handle(),
        subpass: COMPOSITION_SUBPASS,
    };
    let pipeline = Pipeline::new_graphics(device, &layout, &desc)?;

    info!("Composition pipeline created");

    Ok((pipeline, layout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_push_range() {
        let range = transform_push_range();
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(range.offset, 0);
        assert_eq!(range.size, 64);
    }

    #[test]
    fn test_shader_pairs() {
        let dir = Path::new("Shaders");

        let geometry = ShaderPair::geometry(dir);
        assert_eq!(geometry.vertex, Path::new("Shaders/vert.spv"));
        assert_eq!(geometry.fragment, Path::new("Shaders/frag.spv"));

        let composition = ShaderPair::composition(dir);
        assert_eq!(composition.vertex, Path::new("Shaders/second_vert.spv"));
        assert_eq!(composition.fragment, Path::new("Shaders/second_frag.spv"));
    }
}
