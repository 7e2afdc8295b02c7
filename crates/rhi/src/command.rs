//! Command pools and command buffer recording.
//!
//! [`CommandPool`] lives on the graphics family and hands out primary
//! buffers. It also runs blocking one-shot submissions for staging copies.
//! [`CommandBuffer`] records the small set of commands the renderer issues;
//! every draw is a single instance with zero offsets.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::command::{CommandPool, CommandBuffer};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone(), device.queue_families().graphics)?;
//!
//! // One buffer per swapchain image
//! let handles = pool.allocate_command_buffers(3)?;
//! let cmd = CommandBuffer::from_handle(device.clone(), handles[0]);
//!
//! cmd.reset()?;
//! cmd.begin()?;
//! // ... record ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Command pool whose buffers can be reset one by one.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a pool with `RESET_COMMAND_BUFFER` on `queue_family_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };
        info!("Command pool created on family {}", queue_family_index);

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        debug!("Allocated {} command buffer(s)", buffers.len());
        Ok(buffers)
    }

    /// Returns buffers to the pool. None of them may be pending.
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if !buffers.is_empty() {
            unsafe {
                self.device
                    .handle()
                    .free_command_buffers(self.pool, buffers)
            };
        }
    }

    /// Records `record` into a temporary buffer, submits it to the graphics
    /// queue and waits for the queue to drain.
    ///
    /// The temporary buffer is freed on every path.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation, recording, submission or the wait fails.
    pub fn one_time_submit(&self, record: impl FnOnce(&CommandBuffer)) -> RhiResult<()> {
        let handles = self.allocate_command_buffers(1)?;
        let Some(&handle) = handles.first() else {
            return Err(RhiError::InvalidHandle(
                "Driver returned no command buffer".to_string(),
            ));
        };
        let cmd = CommandBuffer::from_handle(self.device.clone(), handle);

        let submit = || -> RhiResult<()> {
            cmd.begin()?;
            record(&cmd);
            cmd.end()?;

            let submit_info = vk::SubmitInfo::default().command_buffers(&handles);
            unsafe {
                self.device
                    .submit_graphics(&[submit_info], vk::Fence::null())?
            };
            self.device.wait_graphics_idle()
        };
        let result = submit();

        self.free_command_buffers(&handles);
        result
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!("Command pool destroyed");
    }
}

/// Recording view of a command buffer.
///
/// Does not own the handle; the buffer is freed through its pool.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    #[inline]
    fn raw(&self) -> &ash::Device {
        self.device.handle()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Starts recording for a single submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not in the initial state.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.raw().begin_command_buffer(self.buffer, &begin_info)? };
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the buffer is not recording.
    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.raw().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// Returns the buffer to the initial state. It must not be pending.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.raw()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    // =========================================================================
    // Render Pass
    // =========================================================================

    /// Begins `render_pass` over the whole of `extent` with inline contents.
    ///
    /// `clear_values` holds one entry per attachment, in attachment order.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .clear_values(clear_values);

        unsafe {
            self.raw()
                .cmd_begin_render_pass(self.buffer, &begin_info, vk::SubpassContents::INLINE)
        };
    }

    pub fn next_subpass(&self) {
        unsafe {
            self.raw()
                .cmd_next_subpass(self.buffer, vk::SubpassContents::INLINE)
        };
    }

    pub fn end_render_pass(&self) {
        unsafe { self.raw().cmd_end_render_pass(self.buffer) };
    }

    // =========================================================================
    // State
    // =========================================================================

    pub fn bind_graphics_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.raw()
                .cmd_bind_pipeline(self.buffer, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    /// Binds `sets` to consecutive set numbers starting at 0.
    pub fn bind_graphics_sets(&self, layout: vk::PipelineLayout, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.raw().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                sets,
                &[],
            )
        };
    }

    /// Binds one vertex buffer at binding 0, offset 0.
    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        unsafe {
            self.raw()
                .cmd_bind_vertex_buffers(self.buffer, 0, &[buffer], &[0])
        };
    }

    /// Binds a buffer of 32-bit indices at offset 0.
    pub fn bind_index_buffer_u32(&self, buffer: vk::Buffer) {
        unsafe {
            self.raw()
                .cmd_bind_index_buffer(self.buffer, buffer, 0, vk::IndexType::UINT32)
        };
    }

    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        unsafe {
            self.raw()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport))
        };
    }

    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        unsafe {
            self.raw()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor))
        };
    }

    /// Pushes the bytes of `data` at `offset` for `stages`.
    pub fn push_constants<T: Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &T,
    ) {
        unsafe {
            self.raw().cmd_push_constants(
                self.buffer,
                layout,
                stages,
                offset,
                bytemuck::bytes_of(data),
            )
        };
    }

    // =========================================================================
    // Draws
    // =========================================================================

    /// Draws `vertex_count` vertices without vertex or index buffers.
    pub fn draw(&self, vertex_count: u32) {
        unsafe { self.raw().cmd_draw(self.buffer, vertex_count, 1, 0, 0) };
    }

    /// Draws the first `index_count` indices of the bound index buffer.
    pub fn draw_indexed(&self, index_count: u32) {
        unsafe {
            self.raw()
                .cmd_draw_indexed(self.buffer, index_count, 1, 0, 0, 0)
        };
    }

    // =========================================================================
    // Transfers
    // =========================================================================

    pub fn image_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: &vk::ImageMemoryBarrier,
    ) {
        unsafe {
            self.raw().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                std::slice::from_ref(barrier),
            )
        };
    }

    /// Copies the first `size` bytes of `src` to the start of `dst`.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe { self.raw().cmd_copy_buffer(self.buffer, src, dst, &[region]) };
    }

    /// Copies tightly packed texels from `src` into mip 0, layer 0 of a
    /// color image in `TRANSFER_DST_OPTIMAL` layout.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, extent: vk::Extent2D) {
        let region = vk::BufferImageCopy::default()
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            });

        unsafe {
            self.raw().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_command_types_are_send() {
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }
}
