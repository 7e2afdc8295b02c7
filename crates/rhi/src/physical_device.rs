//! Adapter (physical device) selection.
//!
//! Adapters are visited in enumeration order and the first one that passes
//! every check is used. There is no scoring, so the choice is stable for a
//! given machine. An adapter qualifies when it has:
//!
//! 1. a graphics queue family and a family that can present to the surface
//! 2. every extension in [`REQUIRED_DEVICE_EXTENSIONS`]
//! 3. at least one surface format and one present mode
//! 4. sampler anisotropy
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::instance::Instance;
//! use renderer_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! # fn example(surface: vk::SurfaceKHR) -> Result<(), renderer_rhi::RhiError> {
//! let instance = Instance::new(false, &[])?;
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let adapter = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! println!("Using {}", adapter.name);
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::fmt;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SurfaceSupport;

/// Device extensions every adapter must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue families the renderer submits and presents on.
///
/// Both may be the same family.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.is_split() {
            vec![self.graphics, self.present]
        } else {
            vec![self.graphics]
        }
    }

    /// Whether swapchain images must be shared between two families.
    #[inline]
    pub fn is_split(&self) -> bool {
        self.graphics != self.present
    }
}

/// The adapter chosen by [`select_physical_device`].
#[derive(Clone)]
pub struct Adapter {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub queue_families: QueueFamilies,
}

impl fmt::Debug for Adapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "'{}' ({:?}, Vulkan {}.{}.{}, graphics family {}, present family {})",
            self.name,
            self.device_type,
            vk::api_version_major(self.api_version),
            vk::api_version_minor(self.api_version),
            vk::api_version_patch(self.api_version),
            self.queue_families.graphics,
            self.queue_families.present,
        )
    }
}

/// Why an adapter was passed over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rejection {
    MissingQueueFamilies,
    MissingExtensions,
    NoSurfaceFormats,
    NoAnisotropy,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rejection::MissingQueueFamilies => "no graphics or no present queue family",
            Rejection::MissingExtensions => "missing required device extensions",
            Rejection::NoSurfaceFormats => "no surface formats or present modes",
            Rejection::NoAnisotropy => "sampler anisotropy not supported",
        })
    }
}

/// Returns the first adapter that can drive the renderer.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no adapter qualifies, or the
/// Vulkan error if a query fails.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Adapter> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("{} Vulkan adapter(s) present", devices.len());

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = properties
            .device_name_as_c_str()
            .map_or_else(|_| "<unnamed>".to_string(), |n| n.to_string_lossy().into_owned());

        match evaluate(instance, device, surface, surface_loader)? {
            Ok(queue_families) => {
                let adapter = Adapter {
                    handle: device,
                    name,
                    device_type: properties.device_type,
                    api_version: properties.api_version,
                    queue_families,
                };
                info!("Selected adapter {:?}", adapter);
                return Ok(adapter);
            }
            Err(rejection) => debug!("Adapter '{}' skipped: {}", name, rejection),
        }
    }

    Err(RhiError::NoSuitableGpu)
}

fn evaluate(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Result<QueueFamilies, Rejection>> {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let Some(queue_families) = find_queue_families(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    }) else {
        return Ok(Err(Rejection::MissingQueueFamilies));
    };

    let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
    if !supports_extensions(&extensions, REQUIRED_DEVICE_EXTENSIONS) {
        return Ok(Err(Rejection::MissingExtensions));
    }

    if !SurfaceSupport::query(device, surface, surface_loader)?.is_adequate() {
        return Ok(Err(Rejection::NoSurfaceFormats));
    }

    let features = unsafe { instance.get_physical_device_features(device) };
    if features.sampler_anisotropy == vk::FALSE {
        return Ok(Err(Rejection::NoAnisotropy));
    }

    Ok(Ok(queue_families))
}

/// First graphics-capable family and first family `can_present` accepts.
///
/// Families that expose no queues are never picked.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut can_present: impl FnMut(u32) -> bool,
) -> Option<QueueFamilies> {
    let usable = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(i, family)| (i as u32, family))
    };

    let graphics = usable()
        .find(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i)?;
    let present = usable().map(|(i, _)| i).find(|&i| can_present(i))?;

    Some(QueueFamilies { graphics, present })
}

/// Whether every `required` name appears in `available`.
pub fn supports_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> bool {
    required.iter().all(|&name| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().is_ok_and(|n| n == name))
    })
}
