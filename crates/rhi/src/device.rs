//! Logical device, queues and the memory allocator.
//!
//! [`Device`] is shared as `Arc<Device>` by every GPU object, so it is the
//! last thing in the RHI to go away. It owns the gpu-allocator instance and
//! releases it before the `VkDevice` itself.
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::instance::Instance;
//! use renderer_rhi::physical_device::select_physical_device;
//! use renderer_rhi::device::Device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), renderer_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let adapter = select_physical_device(instance.handle(), surface, &surface_loader)?;
//!
//! let device = Device::new(instance, &adapter)?;
//! let _queue = device.graphics_queue();
//! # Ok(())
//! # }
//! ```

use std::ffi::c_char;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{Adapter, QueueFamilies, REQUIRED_DEVICE_EXTENSIONS};

pub struct Device {
    device: ash::Device,
    // Kept for format queries against the adapter
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    allocator: ManuallyDrop<Mutex<Allocator>>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilies,
}

impl Device {
    /// Creates the logical device on `adapter`.
    ///
    /// One queue is taken from each distinct family. The swapchain extension
    /// and sampler anisotropy are enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator setup fails.
    pub fn new(instance: &Instance, adapter: &Adapter) -> RhiResult<Arc<Self>> {
        let queue_families = adapter.queue_families;
        let priorities = [1.0f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect();

        let extensions: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|name| name.as_ptr())
            .collect();
        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);
        let device = unsafe {
            instance
                .handle()
                .create_device(adapter.handle, &create_info, None)?
        };

        let graphics_queue = unsafe { device.get_device_queue(queue_families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(queue_families.present, 0) };
        debug!(
            "Queues: graphics family {}, present family {}",
            queue_families.graphics, queue_families.present
        );

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: adapter.handle,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("Logical device created on '{}'", adapter.name);

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: adapter.handle,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> QueueFamilies {
        self.queue_families
    }

    /// Locks the allocator. A poisoned lock is reported as an error.
    pub fn lock_allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::InvalidHandle("GPU allocator mutex poisoned".into()))
    }

    /// First of `candidates` whose `tiling` features include `features`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NoSupportedFormat`] if no candidate qualifies.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> RhiResult<vk::Format> {
        choose_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        })
    }

    /// Blocks until every queue is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails, e.g. on device loss.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits to the graphics queue.
    ///
    /// # Safety
    ///
    /// The command buffers must be fully recorded, the semaphores must
    /// follow a valid signal/wait order and `fence` must be unsignaled and
    /// not pending.
    ///
    /// # Errors
    ///
    /// Returns an error if submission fails.
    pub unsafe fn submit_graphics(
        &self,
        submits: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submits, fence)?
        };
        Ok(())
    }

    /// Blocks until the graphics queue is idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_graphics_idle(&self) -> RhiResult<()> {
        unsafe { self.device.queue_wait_idle(self.graphics_queue)? };
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Device wait before destruction failed: {:?}", e);
            }
            // Returns the allocator's memory blocks while the device exists
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// SAFETY: the function tables and handles are plain data and the allocator
// sits behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

/// First of `candidates` whose properties, as returned by `query`, list
/// `features` for `tiling`.
///
/// # Errors
///
/// Returns [`RhiError::NoSupportedFormat`] if no candidate qualifies.
pub fn choose_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut query: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> RhiResult<vk::Format> {
    let tiling_features = |props: vk::FormatProperties| match tiling {
        vk::ImageTiling::LINEAR => props.linear_tiling_features,
        vk::ImageTiling::OPTIMAL => props.optimal_tiling_features,
        _ => vk::FormatFeatureFlags::empty(),
    };

    candidates
        .iter()
        .copied()
        .find(|&format| tiling_features(query(format)).contains(features))
        .ok_or_else(|| {
            RhiError::NoSupportedFormat(format!(
                "none of {:?} supports {:?} with {:?} tiling",
                candidates, features, tiling
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEPTH_CANDIDATES: [vk::Format; 3] = [
        vk::Format::D32_SFLOAT_S8_UINT,
        vk::Format::D32_SFLOAT,
        vk::Format::D24_UNORM_S8_UINT,
    ];

    #[test]
    fn test_choose_supported_format_in_candidate_order() {
        let chosen = choose_supported_format(
            &DEPTH_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| vk::FormatProperties {
                optimal_tiling_features: if format == vk::Format::D32_SFLOAT_S8_UINT {
                    vk::FormatFeatureFlags::empty()
                } else {
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                },
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(chosen, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_choose_supported_format_checks_tiling() {
        let result = choose_supported_format(
            &DEPTH_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(RhiError::NoSupportedFormat(_))));
    }

    #[test]
    fn test_choose_supported_format_linear() {
        let chosen = choose_supported_format(
            &DEPTH_CANDIDATES,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| vk::FormatProperties {
                linear_tiling_features: if format == vk::Format::D24_UNORM_S8_UINT {
                    vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT
                } else {
                    vk::FormatFeatureFlags::empty()
                },
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(chosen, vk::Format::D24_UNORM_S8_UINT);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
