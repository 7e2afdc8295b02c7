//! Swap-chain-dependent resources.
//!
//! Everything sized by or bound to the swap chain lives in one
//! [`SwapchainResources`] value so a resize can drop and rebuild it as a
//! unit. Per-image state is kept together in [`ImageResources`] records
//! rather than in parallel arrays.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use renderer_rhi::buffer::{Buffer, BufferUsage};
use renderer_rhi::command::{CommandBuffer, CommandPool};
use renderer_rhi::descriptor::DescriptorPool;
use renderer_rhi::device::Device;
use renderer_rhi::image::{COLOR_ATTACHMENT_FORMAT, Image, ImageUsage};
use renderer_rhi::render_pass::Framebuffer;
use renderer_rhi::swapchain::Swapchain;
use renderer_rhi::{RhiError, RhiResult};

use crate::descriptors::{
    DescriptorLayouts, INPUT_TYPE, INPUTS_PER_SET, InputWrite, UNIFORM_TYPE, UniformWrite,
    input_plan, uniform_plan, write_input_sets, write_uniform_sets,
};
use crate::error::RendererResult;
use crate::render_graph::RenderGraph;
use crate::ubo::ViewProjection;

/// Resources owned by one swap-chain image.
///
/// Created colour, depth, uniform buffer, framebuffer; the fields are
/// declared in the reverse of that so they drop in reverse creation order.
pub struct ImageResources {
    framebuffer: Framebuffer,
    uniform_buffer: Buffer,
    depth: Image,
    color: Image,
    uniform_set: vk::DescriptorSet,
    input_set: vk::DescriptorSet,
    command_buffer: CommandBuffer,
}

impl ImageResources {
    #[inline]
    pub fn framebuffer(&self) -> &Framebuffer {
        &self.framebuffer
    }

    #[inline]
    pub fn uniform_set(&self) -> vk::DescriptorSet {
        self.uniform_set
    }

    #[inline]
    pub fn input_set(&self) -> vk::DescriptorSet {
        self.input_set
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    /// Copies the view/projection value into the mapped uniform buffer.
    pub fn write_uniform(&self, value: &ViewProjection) -> RhiResult<()> {
        self.uniform_buffer.write_data(0, bytemuck::bytes_of(value))
    }
}

/// The replaceable swap-chain-dependent group.
///
/// Dropping it releases, in order: per-image records (last image first),
/// the command buffers, and the descriptor pools with their sets.
pub struct SwapchainResources {
    images: Vec<ImageResources>,
    uniform_pool: DescriptorPool,
    input_pool: DescriptorPool,
    command_buffers: Vec<vk::CommandBuffer>,
    command_pool: vk::CommandPool,
    device: Arc<Device>,
    extent: vk::Extent2D,
}

impl SwapchainResources {
    /// Builds the per-image records for every swap-chain image and writes
    /// their descriptor sets.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `swapchain` - Provides image count, views and extent
    /// * `graph` - Render pass the framebuffers are compatible with
    /// * `layouts` - Uniform and input set layouts
    /// * `command_pool` - Pool the per-image command buffers come from;
    ///   must outlive this value
    ///
    /// # Errors
    ///
    /// Returns an error if any object creation fails.
    pub fn new(
        device: Arc<Device>,
        swapchain: &Swapchain,
        graph: &RenderGraph,
        layouts: &DescriptorLayouts,
        command_pool: &CommandPool,
    ) -> RendererResult<Self> {
        let image_count = swapchain.image_count();
        let extent = swapchain.extent();

        let uniform_pool =
            DescriptorPool::single_type(device.clone(), UNIFORM_TYPE, 1, image_count)?;
        let input_pool =
            DescriptorPool::single_type(device.clone(), INPUT_TYPE, INPUTS_PER_SET, image_count)?;

        let uniform_sets = uniform_pool.allocate_many(layouts.uniform(), image_count)?;
        let input_sets = input_pool.allocate_many(layouts.input(), image_count)?;
        let command_buffers = command_pool.allocate_command_buffers(image_count)?;

        // Frees the command buffers if a later step fails
        let mut resources = Self {
            images: Vec::with_capacity(image_count as usize),
            uniform_pool,
            input_pool,
            command_buffers,
            command_pool: command_pool.handle(),
            device: device.clone(),
            extent,
        };

        for (i, &swapchain_view) in swapchain.image_views().iter().enumerate() {
            let color = Image::new(
                device.clone(),
                extent,
                COLOR_ATTACHMENT_FORMAT,
                ImageUsage::ColorAttachment,
            )?;
            let depth = Image::new(
                device.clone(),
                extent,
                graph.depth_format(),
                ImageUsage::DepthAttachment,
            )?;
            let uniform_buffer = Buffer::new(
                device.clone(),
                BufferUsage::Uniform,
                ViewProjection::SIZE as vk::DeviceSize,
            )?;
            let framebuffer = Framebuffer::new(
                device.clone(),
                graph.render_pass(),
                &[swapchain_view, color.view(), depth.view()],
                extent,
            )?;

            let (uniform_set, input_set, command_buffer) = match (
                uniform_sets.get(i),
                input_sets.get(i),
                resources.command_buffers.get(i),
            ) {
                (Some(&u), Some(&s), Some(&c)) => (u, s, c),
                _ => {
                    return Err(RhiError::InvalidHandle(format!(
                        "Missing per-image handle for image {}",
                        i
                    ))
                    .into());
                }
            };

            resources.images.push(ImageResources {
                framebuffer,
                uniform_buffer,
                depth,
                color,
                uniform_set,
                input_set,
                command_buffer: CommandBuffer::from_handle(device.clone(), command_buffer),
            });

            debug!("Created resources for swapchain image {}", i);
        }

        resources.write_descriptors();

        info!(
            "Swapchain resources created: {} image(s), {}x{}",
            resources.images.len(),
            extent.width,
            extent.height
        );

        Ok(resources)
    }

    /// Uniform writes derived from the per-image records.
    pub fn uniform_writes(&self) -> Vec<UniformWrite> {
        let targets: Vec<_> = self
            .images
            .iter()
            .map(|image| (image.uniform_set, image.uniform_buffer.handle()))
            .collect();
        uniform_plan(&targets)
    }

    /// Input attachment writes derived from the per-image records.
    pub fn input_writes(&self) -> Vec<InputWrite> {
        let targets: Vec<_> = self
            .images
            .iter()
            .map(|image| (image.input_set, image.color.view(), image.depth.view()))
            .collect();
        input_plan(&targets)
    }

    /// (Re)writes every uniform and input set from the per-image records.
    ///
    /// Idempotent: unchanged records produce the same writes.
    pub fn write_descriptors(&self) {
        write_uniform_sets(&self.device, &self.uniform_writes());
        write_input_sets(&self.device, &self.input_writes());
    }

    /// Per-image record for swap-chain image `index`.
    #[inline]
    pub fn image(&self, index: usize) -> Option<&ImageResources> {
        self.images.get(index)
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of uniform sets handed out by this group's pool.
    #[inline]
    pub fn uniform_sets_allocated(&self) -> u32 {
        self.uniform_pool.allocated()
    }

    /// Number of input sets handed out by this group's pool.
    #[inline]
    pub fn input_sets_allocated(&self) -> u32 {
        self.input_pool.allocated()
    }
}

impl Drop for SwapchainResources {
    fn drop(&mut self) {
        drop_last_first(&mut self.images);
        if !self.command_buffers.is_empty() {
            unsafe {
                self.device
                    .handle()
                    .free_command_buffers(self.command_pool, &self.command_buffers);
            }
        }
        debug!(
            "Swapchain resources destroyed ({} command buffer(s) freed)",
            self.command_buffers.len()
        );
    }
}

/// Drops `items` in reverse creation order.
fn drop_last_first<T>(items: &mut Vec<T>) {
    while items.pop().is_some() {}
}
