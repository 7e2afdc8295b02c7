//! Headless device for tests that need a real driver. Returns `None` (and
//! the test skips) when no loader or usable adapter is present.

use std::sync::Arc;

use ash::vk;

use crate::device::Device;
use crate::instance::Instance;
use crate::physical_device::{Adapter, QueueFamilies};

/// Device plus the instance it came from. Fields drop in order.
pub(crate) struct GpuContext {
    pub device: Arc<Device>,
    _instance: Instance,
}

pub(crate) fn headless_context() -> Option<GpuContext> {
    let instance = match Instance::new(false, &[]) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("Skipping: no Vulkan driver ({e})");
            return None;
        }
    };

    let handles = unsafe { instance.handle().enumerate_physical_devices() }.ok()?;
    for handle in handles {
        let families =
            unsafe { instance.handle().get_physical_device_queue_family_properties(handle) };
        let Some(graphics) = families
            .iter()
            .position(|f| f.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        else {
            continue;
        };

        let properties = unsafe { instance.handle().get_physical_device_properties(handle) };
        let adapter = Adapter {
            handle,
            name: properties
                .device_name_as_c_str()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            device_type: properties.device_type,
            api_version: properties.api_version,
            queue_families: QueueFamilies {
                graphics: graphics as u32,
                present: graphics as u32,
            },
        };

        match Device::new(&instance, &adapter) {
            Ok(device) => {
                return Some(GpuContext {
                    device,
                    _instance: instance,
                });
            }
            Err(e) => eprintln!("Skipping adapter {:?}: {e}", adapter),
        }
    }

    eprintln!("Skipping: no adapter can create a device");
    None
}

/// Allocations the device's allocator still holds.
pub(crate) fn live_allocations(device: &Device) -> usize {
    device
        .lock_allocator()
        .map(|allocator| allocator.generate_report().allocations.len())
        .unwrap_or(0)
}
