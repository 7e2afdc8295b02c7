//! Swap chain negotiation and ownership.
//!
//! Negotiation is split from creation: [`SurfaceSupport`] holds what the
//! surface reports, and [`SwapchainSettings::negotiate`] turns it into the
//! concrete format, present mode, extent and image count without touching
//! the device. [`Swapchain`] then creates the images and one view per image.
//!
//! A swap chain is never mutated in place; [`Swapchain::recreate`] builds a
//! replacement (handing the old handle to the driver) and drops the old one.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::image::create_image_view;
use crate::instance::Instance;

/// What a surface supports on one physical device.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries capabilities, formats and present modes of `surface`.
    ///
    /// # Errors
    ///
    /// Returns an error if any surface query fails.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        // SAFETY: the physical device and surface belong to the loader's instance.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// A device can present to the surface only if both lists are non-empty.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Concrete parameters chosen for one swap chain.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainSettings {
    /// Picks every parameter from the surface's support.
    ///
    /// `width` and `height` are the window framebuffer size, used only when
    /// the surface leaves the extent to the application.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] if the surface reports no
    /// formats or no present modes.
    pub fn negotiate(support: &SurfaceSupport, width: u32, height: u32) -> Result<Self, RhiError> {
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(format!(
                "Surface offers {} format(s) and {} present mode(s)",
                support.formats.len(),
                support.present_modes.len()
            )));
        }

        Ok(Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, width, height),
            image_count: determine_image_count(&support.capabilities),
        })
    }
}

/// Owns a `VkSwapchainKHR` and the views of its images.
///
/// The images themselves belong to the swap chain and go away with it.
pub struct Swapchain {
    device: Arc<Device>,
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    settings: SwapchainSettings,
}

impl Swapchain {
    /// Negotiates settings with `surface` and creates the swap chain.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `device` - The logical device
    /// * `surface` - The window surface
    /// * `width` - Window framebuffer width
    /// * `height` - Window framebuffer height
    ///
    /// # Errors
    ///
    /// Returns an error if a surface query, swap chain creation or image
    /// view creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        Self::build(
            instance,
            device,
            surface,
            width,
            height,
            vk::SwapchainKHR::null(),
        )
    }

    fn build(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        old: vk::SwapchainKHR,
    ) -> Result<Self, RhiError> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let support = SurfaceSupport::query(device.physical_device(), surface, &surface_loader)?;
        let settings = SwapchainSettings::negotiate(&support, width, height)?;

        let families = device.queue_families();
        let family_indices = [families.graphics, families.present];
        let (sharing_mode, shared_families): (_, &[u32]) = if families.is_split() {
            (vk::SharingMode::CONCURRENT, &family_indices)
        } else {
            (vk::SharingMode::EXCLUSIVE, &[])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(settings.image_count)
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true)
            .old_swapchain(old);

        let loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        // SAFETY: surface and device are alive; `old` is null or a retired swap chain.
        let handle = unsafe { loader.create_swapchain(&create_info, None)? };

        // From here on Drop cleans up whatever was created
        let mut swapchain = Self {
            device,
            loader,
            handle,
            images: Vec::new(),
            views: Vec::new(),
            settings,
        };

        // SAFETY: the handle was just created by this loader.
        swapchain.images = unsafe { swapchain.loader.get_swapchain_images(handle)? };
        for (i, &image) in swapchain.images.iter().enumerate() {
            let view = create_image_view(
                &swapchain.device,
                image,
                settings.surface_format.format,
                vk::ImageAspectFlags::COLOR,
            )
            .map_err(|e| RhiError::SwapchainError(format!("View of image {}: {}", i, e)))?;
            swapchain.views.push(view);
        }

        info!(
            "Swapchain created: {}x{}, {:?}/{:?}, {:?}, {} image(s), {:?} sharing",
            settings.extent.width,
            settings.extent.height,
            settings.surface_format.format,
            settings.surface_format.color_space,
            settings.present_mode,
            swapchain.images.len(),
            sharing_mode
        );

        Ok(swapchain)
    }

    /// Replaces this swap chain with one matching the surface's current state.
    ///
    /// Every framebuffer built on the old views must already be destroyed.
    /// Waits for the device to go idle first.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait or the new swap chain's creation fails;
    /// the old swap chain is kept in that case.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<(), RhiError> {
        self.device.wait_idle()?;

        let replacement = Self::build(
            instance,
            self.device.clone(),
            surface,
            width,
            height,
            self.handle,
        )?;
        // The old swap chain drops here, after the driver saw it as `old_swapchain`
        drop(std::mem::replace(self, replacement));
        Ok(())
    }

    /// Acquires the next image, signalling `semaphore` when it is ready.
    ///
    /// Waits without timeout.
    ///
    /// # Returns
    ///
    /// `(image_index, suboptimal)`.
    ///
    /// # Errors
    ///
    /// Returns the raw result, notably `ERROR_OUT_OF_DATE_KHR`, so the caller
    /// can decide whether to rebuild.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        // SAFETY: the swap chain is alive and the semaphore is unsignaled.
        unsafe {
            self.loader
                .acquire_next_image(self.handle, u64::MAX, semaphore, vk::Fence::null())
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// # Returns
    ///
    /// Whether the swap chain is suboptimal.
    ///
    /// # Errors
    ///
    /// Returns the raw result, notably `ERROR_OUT_OF_DATE_KHR`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.handle];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: the image was acquired from this swap chain.
        unsafe { self.loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    #[inline]
    pub fn settings(&self) -> &SwapchainSettings {
        &self.settings
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.settings.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }

    /// Number of images the driver actually created.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// One view per image, in image order.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // SAFETY: no framebuffer references the views any more and the
        // device has finished presenting from this swap chain.
        unsafe {
            for &view in &self.views {
                self.device.handle().destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
        }
        debug!(
            "Swapchain destroyed ({} image(s), {}x{})",
            self.images.len(),
            self.settings.extent.width,
            self.settings.extent.height
        );
    }
}

/// Format returned when the surface accepts any format.
const ANY_FORMAT_CHOICE: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Picks the surface format.
///
/// A lone `UNDEFINED` entry means any format is fine. Otherwise the first
/// 8-bit RGBA/BGRA UNORM format in the SRGB_NONLINEAR color space wins,
/// then the first reported format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats
        && only.format == vk::Format::UNDEFINED
    {
        return ANY_FORMAT_CHOICE;
    }

    let preferred = formats.iter().copied().find(|f| {
        matches!(
            f.format,
            vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM
        ) && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
    });

    if let Some(format) = preferred {
        return format;
    }

    match formats.first() {
        Some(&first) => {
            warn!("No 8-bit UNORM surface format, using {:?}", first.format);
            first
        }
        None => {
            warn!("Surface reported no formats, assuming R8G8B8A8_UNORM");
            ANY_FORMAT_CHOICE
        }
    }
}

/// MAILBOX when offered, else FIFO, which every driver supports.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Picks the image extent.
///
/// The surface's current extent is used unless its width is `u32::MAX`,
/// in which case the framebuffer size is clamped to the surface limits.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    // Not `clamp`: a surface reporting min > max must not panic
    let (min, max) = (capabilities.min_image_extent, capabilities.max_image_extent);
    vk::Extent2D {
        width: width.max(min.width).min(max.width),
        height: height.max(min.height).min(max.height),
    }
}

/// One image more than the minimum, capped by the maximum when there is one
/// (`max_image_count == 0` means unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => wanted,
        max => wanted.min(max),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn open_extent_caps(min: vk::Extent2D, max: vk::Extent2D) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: extent(u32::MAX, u32::MAX),
            min_image_extent: min,
            max_image_extent: max,
            ..Default::default()
        }
    }

    fn support(min_images: u32, max_images: u32, modes: &[vk::PresentModeKHR]) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: min_images,
                max_image_count: max_images,
                current_extent: extent(640, 480),
                ..Default::default()
            },
            formats: vec![format(
                vk::Format::B8G8R8A8_UNORM,
                vk::ColorSpaceKHR::SRGB_NONLINEAR,
            )],
            present_modes: modes.to_vec(),
        }
    }

    #[test]
    fn test_undefined_format_means_any() {
        let chosen = choose_surface_format(&[format(
            vk::Format::UNDEFINED,
            vk::ColorSpaceKHR::SRGB_NONLINEAR,
        )]);
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn test_unorm_in_nonlinear_space_is_preferred() {
        let chosen = choose_surface_format(&[
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(
                vk::Format::R8G8B8A8_UNORM,
                vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
            ),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ]);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_first_format_is_the_fallback() {
        let chosen = choose_surface_format(&[
            format(
                vk::Format::A2B10G10R10_UNORM_PACK32,
                vk::ColorSpaceKHR::HDR10_ST2084_EXT,
            ),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ]);
        assert_eq!(chosen.format, vk::Format::A2B10G10R10_UNORM_PACK32);
    }

    #[test]
    fn test_present_mode() {
        use vk::PresentModeKHR as M;
        assert_eq!(choose_present_mode(&[M::FIFO, M::MAILBOX]), M::MAILBOX);
        assert_eq!(choose_present_mode(&[M::IMMEDIATE, M::FIFO]), M::FIFO);
        assert_eq!(choose_present_mode(&[M::FIFO]), M::FIFO);
    }

    #[test]
    fn test_defined_current_extent_wins() {
        let caps = vk::SurfaceCapabilitiesKHR {
            current_extent: extent(1920, 1080),
            ..open_extent_caps(extent(1, 1), extent(4096, 4096))
        };
        assert_eq!(choose_extent(&caps, 800, 600), extent(1920, 1080));
    }

    #[test]
    fn test_open_extent_is_clamped() {
        let caps = open_extent_caps(extent(64, 32), extent(1024, 768));

        assert_eq!(choose_extent(&caps, 800, 600), extent(800, 600));
        assert_eq!(choose_extent(&caps, 0, 0), extent(64, 32));
        for (w, h) in [(1, 5000), (u32::MAX - 1, 10), (2048, 768)] {
            let e = choose_extent(&caps, w, h);
            assert!((64..=1024).contains(&e.width), "{w} -> {}", e.width);
            assert!((32..=768).contains(&e.height), "{h} -> {}", e.height);
        }
    }

    #[test]
    fn test_inverted_limits_do_not_panic() {
        let caps = open_extent_caps(extent(800, 600), extent(640, 480));
        assert_eq!(choose_extent(&caps, 1024, 100), extent(640, 480));
    }

    #[test]
    fn test_image_count_stays_in_bounds() {
        for (min, max) in [(1, 1), (1, 2), (2, 3), (3, 3), (2, 0), (4, 16)] {
            let caps = vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                ..Default::default()
            };
            let count = determine_image_count(&caps);
            assert!(count >= min);
            assert!(max == 0 || count <= max);
        }
    }

    #[test]
    fn test_negotiate_two_to_three_images_with_fifo() {
        let settings =
            SwapchainSettings::negotiate(&support(2, 3, &[vk::PresentModeKHR::FIFO]), 500, 500)
                .unwrap();

        assert_eq!(settings.image_count, 3);
        assert_eq!(settings.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(settings.extent, extent(640, 480));
        assert_eq!(settings.surface_format.format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_negotiate_unbounded_image_count() {
        let settings =
            SwapchainSettings::negotiate(&support(2, 0, &[vk::PresentModeKHR::MAILBOX]), 1, 1)
                .unwrap();
        assert_eq!(settings.image_count, 3);
        assert_eq!(settings.present_mode, vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_negotiate_rejects_inadequate_surface() {
        let mut no_modes = support(2, 3, &[]);
        assert!(!no_modes.is_adequate());
        assert!(matches!(
            SwapchainSettings::negotiate(&no_modes, 1, 1),
            Err(RhiError::SwapchainError(_))
        ));

        no_modes.present_modes.push(vk::PresentModeKHR::FIFO);
        no_modes.formats.clear();
        assert!(!no_modes.is_adequate());
    }
}
