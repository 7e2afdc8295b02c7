//! GPU image management.
//!
//! This module handles device-local 2D images and their views: the
//! per-swapchain-image colour and depth attachments, and texture images.
//!
//! # Overview
//!
//! - [`ImageUsage`] selects the usage flags and view aspect for an image
//! - [`Image`] wraps VkImage and VkImageView with gpu-allocator managed memory
//! - [`DEPTH_FORMAT_CANDIDATES`] lists depth formats in order of preference
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::image::{Image, ImageUsage, choose_depth_format};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let extent = vk::Extent2D { width: 500, height: 500 };
//! let depth_format = choose_depth_format(&device)?;
//! let depth = Image::new(device, extent, depth_format, ImageUsage::DepthAttachment)?;
//! let _view = depth.view();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth formats tried in order; the first with optimal-tiling
/// depth/stencil attachment support wins.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D32_SFLOAT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Format of the intermediate colour attachment written by the geometry subpass.
pub const COLOR_ATTACHMENT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Picks the depth attachment format supported by the device.
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedFormat`] if no candidate is supported.
pub fn choose_depth_format(device: &Device) -> RhiResult<vk::Format> {
    device.find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

/// Image usage type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageUsage {
    /// Colour target of the geometry subpass, read as an input attachment later
    ColorAttachment,
    /// Depth target of the geometry subpass, read as an input attachment later
    DepthAttachment,
    /// Sampled texture filled by a transfer
    Texture,
}

impl ImageUsage {
    /// Converts to Vulkan image usage flags.
    pub fn to_vk_usage(self) -> vk::ImageUsageFlags {
        match self {
            ImageUsage::ColorAttachment => {
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT
            }
            ImageUsage::DepthAttachment => {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                    | vk::ImageUsageFlags::INPUT_ATTACHMENT
            }
            ImageUsage::Texture => {
                vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED
            }
        }
    }

    /// Returns the aspect the image view covers.
    pub fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            ImageUsage::DepthAttachment => vk::ImageAspectFlags::DEPTH,
            ImageUsage::ColorAttachment | ImageUsage::Texture => vk::ImageAspectFlags::COLOR,
        }
    }

    /// Returns a debug name for allocations.
    pub fn name(self) -> &'static str {
        match self {
            ImageUsage::ColorAttachment => "color_attachment",
            ImageUsage::DepthAttachment => "depth_attachment",
            ImageUsage::Texture => "texture",
        }
    }
}

/// Creates a 2D view over the first mip level and layer of `image`.
///
/// Also used for swapchain images, which the image wrapper does not own.
///
/// # Errors
///
/// Returns an error if view creation fails.
pub fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(full_subresource_range(aspect));

    let view = unsafe { device.handle().create_image_view(&view_info, None)? };
    Ok(view)
}

/// Subresource range covering one mip level and one layer.
#[inline]
pub fn full_subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

/// Device-local 2D image with one mip level, owning its view.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    usage: ImageUsage,
}

impl Image {
    /// Creates an image, binds device-local memory to it and creates its view.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `extent` - Image size in pixels
    /// * `format` - Pixel format
    /// * `usage` - What the image is used for
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is empty, or if image creation,
    /// allocation or view creation fails.
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: ImageUsage,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let handle = unsafe { device.handle().create_image(&image_info, None)? };
        // Owns the handle from here on; destroying a null view is a no-op
        let mut image = Self {
            device,
            image: handle,
            view: vk::ImageView::null(),
            allocation: None,
            format,
            extent,
            usage,
        };

        let requirements = unsafe { image.device.handle().get_image_memory_requirements(handle) };
        let allocation = image.device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: MemoryLocation::GpuOnly,
            // Optimal tiling is not linear
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        let allocation = image.allocation.insert(allocation);

        unsafe {
            image
                .device
                .handle()
                .bind_image_memory(handle, allocation.memory(), allocation.offset())?;
        }

        image.view = create_image_view(&image.device, handle, format, usage.aspect())?;

        debug!(
            "Created {} image: {}x{} ({:?})",
            usage.name(),
            extent.width,
            extent.height,
            format
        );

        Ok(image)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn usage(&self) -> ImageUsage {
        self.usage
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // View depends on the image, the image on its memory
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!("Failed to free image allocation: {:?}", e);
                    }
                }
                Err(e) => tracing::error!("Leaking image allocation: {}", e),
            }
        }

        debug!(
            "Destroyed {} image: {}x{}",
            self.usage.name(),
            self.extent.width,
            self.extent.height
        );
    }
}
