//! Per-image command recording.
//!
//! A frame is first described as a [`DrawList`] of plain commands, then
//! replayed into the image's command buffer. Building the list touches
//! no GPU state, so the recording order can be checked without a device.

use ash::vk;
use glam::Mat4;

use renderer_rhi::RhiResult;
use renderer_rhi::command::CommandBuffer;

use crate::pipelines::TRANSFORM_PUSH_STAGES;
use crate::render_graph::clear_values;

/// One recorded command.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCommand {
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    },
    BindPipeline(vk::Pipeline),
    SetViewport(vk::Extent2D),
    SetScissor(vk::Extent2D),
    PushTransform {
        layout: vk::PipelineLayout,
        transform: Mat4,
    },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        sets: Vec<vk::DescriptorSet>,
    },
    DrawIndexed {
        index_count: u32,
    },
    NextSubpass,
    Draw {
        vertex_count: u32,
    },
    EndRenderPass,
}

/// A mesh as seen by the recorder.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeshDraw {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
    pub texture_set: vk::DescriptorSet,
}

/// A mesh model as seen by the recorder.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelDraw {
    pub transform: Mat4,
    pub meshes: Vec<MeshDraw>,
}

/// Everything one image's command buffer refers to.
#[derive(Clone, Debug)]
pub struct FrameInputs<'a> {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub geometry_pipeline: vk::Pipeline,
    pub geometry_layout: vk::PipelineLayout,
    pub composition_pipeline: vk::Pipeline,
    pub composition_layout: vk::PipelineLayout,
    pub uniform_set: vk::DescriptorSet,
    pub input_set: vk::DescriptorSet,
    pub models: &'a [ModelDraw],
}

/// Vertex count of the fullscreen composition triangle.
pub const FULLSCREEN_TRIANGLE_VERTICES: u32 = 3;

/// Ordered command list for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DrawList {
    commands: Vec<DrawCommand>,
}

impl DrawList {
    /// Builds the frame's commands.
    ///
    /// Geometry subpass: bind the geometry pipeline, set viewport and
    /// scissor, then per model push its transform and per mesh bind
    /// buffers and `{uniform, texture}` sets and draw. Composition subpass:
    /// bind the composition pipeline and input set and draw three vertices.
    pub fn build(inputs: &FrameInputs<'_>) -> Self {
        let mut commands = vec![
            DrawCommand::BeginRenderPass {
                render_pass: inputs.render_pass,
                framebuffer: inputs.framebuffer,
                extent: inputs.extent,
            },
            DrawCommand::BindPipeline(inputs.geometry_pipeline),
            DrawCommand::SetViewport(inputs.extent),
            DrawCommand::SetScissor(inputs.extent),
        ];

        for model in inputs.models {
            commands.push(DrawCommand::PushTransform {
                layout: inputs.geometry_layout,
                transform: model.transform,
            });
            for mesh in &model.meshes {
                commands.extend([
                    DrawCommand::BindVertexBuffer(mesh.vertex_buffer),
                    DrawCommand::BindIndexBuffer(mesh.index_buffer),
                    DrawCommand::BindDescriptorSets {
                        layout: inputs.geometry_layout,
                        sets: vec![inputs.uniform_set, mesh.texture_set],
                    },
                    DrawCommand::DrawIndexed {
                        index_count: mesh.index_count,
                    },
                ]);
            }
        }

        commands.extend([
            DrawCommand::NextSubpass,
            DrawCommand::BindPipeline(inputs.composition_pipeline),
            DrawCommand::BindDescriptorSets {
                layout: inputs.composition_layout,
                sets: vec![inputs.input_set],
            },
            DrawCommand::Draw {
                vertex_count: FULLSCREEN_TRIANGLE_VERTICES,
            },
            DrawCommand::EndRenderPass,
        ]);

        Self { commands }
    }

    #[inline]
    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    /// Resets `cmd` and records the list into it.
    ///
    /// # Errors
    ///
    /// Returns an error if resetting, beginning or ending the buffer fails.
    pub fn record(&self, cmd: &CommandBuffer) -> RhiResult<()> {
        cmd.reset()?;
        cmd.begin()?;
        self.replay(cmd);
        cmd.end()
    }

    fn replay(&self, cmd: &CommandBuffer) {
        let clears = clear_values();
        for command in &self.commands {
            match command {
                DrawCommand::BeginRenderPass {
                    render_pass,
                    framebuffer,
                    extent,
                } => cmd.begin_render_pass(*render_pass, *framebuffer, *extent, &clears),
                DrawCommand::BindPipeline(pipeline) => cmd.bind_graphics_pipeline(*pipeline),
                DrawCommand::SetViewport(extent) => cmd.set_viewport(&full_viewport(*extent)),
                DrawCommand::SetScissor(extent) => cmd.set_scissor(&vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent: *extent,
                }),
                DrawCommand::PushTransform { layout, transform } => {
                    cmd.push_constants(*layout, TRANSFORM_PUSH_STAGES, 0, transform)
                }
                DrawCommand::BindVertexBuffer(buffer) => cmd.bind_vertex_buffer(*buffer),
                DrawCommand::BindIndexBuffer(buffer) => cmd.bind_index_buffer_u32(*buffer),
                DrawCommand::BindDescriptorSets { layout, sets } => {
                    cmd.bind_graphics_sets(*layout, sets)
                }
                DrawCommand::DrawIndexed { index_count } => cmd.draw_indexed(*index_count),
                DrawCommand::NextSubpass => cmd.next_subpass(),
                DrawCommand::Draw { vertex_count } => cmd.draw(*vertex_count),
                DrawCommand::EndRenderPass => cmd.end_render_pass(),
            }
        }
    }
}

/// Viewport covering `extent` with depth range `[0, 1]`.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn h<T: Handle>(raw: u64) -> T {
        T::from_raw(raw)
    }

    fn mesh(id: u64, texture: u64) -> MeshDraw {
        MeshDraw {
            vertex_buffer: h(100 + id),
            index_buffer: h(200 + id),
            index_count: 3 * id as u32,
            texture_set: h(texture),
        }
    }

    fn inputs(models: &[ModelDraw]) -> FrameInputs<'_> {
        FrameInputs {
            render_pass: h(1),
            framebuffer: h(2),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            geometry_pipeline: h(3),
            geometry_layout: h(4),
            composition_pipeline: h(5),
            composition_layout: h(6),
            uniform_set: h(7),
            input_set: h(8),
            models,
        }
    }

    #[test]
    fn test_empty_scene_still_composes() {
        let list = DrawList::build(&inputs(&[]));
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };

        assert_eq!(
            list.commands(),
            &[
                DrawCommand::BeginRenderPass {
                    render_pass: h(1),
                    framebuffer: h(2),
                    extent,
                },
                DrawCommand::BindPipeline(h(3)),
                DrawCommand::SetViewport(extent),
                DrawCommand::SetScissor(extent),
                DrawCommand::NextSubpass,
                DrawCommand::BindPipeline(h(5)),
                DrawCommand::BindDescriptorSets {
                    layout: h(6),
                    sets: vec![h(8)],
                },
                DrawCommand::Draw { vertex_count: 3 },
                DrawCommand::EndRenderPass,
            ]
        );
    }

    #[test]
    fn test_model_draw_order() {
        let transform = Mat4::from_rotation_y(1.0);
        let models = [ModelDraw {
            transform,
            meshes: vec![mesh(1, 50), mesh(2, 51)],
        }];
        let list = DrawList::build(&inputs(&models));
        let commands = &list.commands()[4..];

        assert_eq!(
            commands[0],
            DrawCommand::PushTransform {
                layout: h(4),
                transform,
            }
        );
        assert_eq!(commands[1], DrawCommand::BindVertexBuffer(h(101)));
        assert_eq!(commands[2], DrawCommand::BindIndexBuffer(h(201)));
        assert_eq!(
            commands[3],
            DrawCommand::BindDescriptorSets {
                layout: h(4),
                sets: vec![h(7), h(50)],
            }
        );
        assert_eq!(commands[4], DrawCommand::DrawIndexed { index_count: 3 });
        assert_eq!(commands[5], DrawCommand::BindVertexBuffer(h(102)));
        assert_eq!(
            commands[7],
            DrawCommand::BindDescriptorSets {
                layout: h(4),
                sets: vec![h(7), h(51)],
            }
        );
        assert_eq!(commands[8], DrawCommand::DrawIndexed { index_count: 6 });
        assert_eq!(commands[9], DrawCommand::NextSubpass);
    }

    #[test]
    fn test_one_push_per_model() {
        let models = [
            ModelDraw {
                transform: Mat4::IDENTITY,
                meshes: vec![mesh(1, 50), mesh(2, 50), mesh(3, 50)],
            },
            ModelDraw {
                transform: Mat4::from_scale(glam::Vec3::splat(2.0)),
                meshes: vec![mesh(4, 50)],
            },
        ];
        let list = DrawList::build(&inputs(&models));

        let pushes = list
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::PushTransform { .. }))
            .count();
        let draws = list
            .commands()
            .iter()
            .filter(|c| matches!(c, DrawCommand::DrawIndexed { .. }))
            .count();
        assert_eq!(pushes, 2);
        assert_eq!(draws, 4);
    }

    #[test]
    fn test_build_is_deterministic() {
        let models = [ModelDraw {
            transform: Mat4::IDENTITY,
            meshes: vec![mesh(1, 50)],
        }];
        assert_eq!(
            DrawList::build(&inputs(&models)),
            DrawList::build(&inputs(&models))
        );
    }

    #[test]
    fn test_full_viewport() {
        let viewport = full_viewport(vk::Extent2D {
            width: 640,
            height: 480,
        });
        assert_eq!(viewport.width, 640.0);
        assert_eq!(viewport.height, 480.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
    }
}
