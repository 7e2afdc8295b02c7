//! Vulkan instance and validation messenger.
//!
//! [`Instance`] loads the Vulkan library, enables the surface extensions the
//! window system asks for and, when requested and installed, the Khronos
//! validation layer. Validation output is forwarded to `tracing`.
//!
//! # Example
//!
//! ```no_run
//! use renderer_rhi::instance::Instance;
//!
//! # fn example() -> Result<(), renderer_rhi::RhiError> {
//! let instance = Instance::new(cfg!(debug_assertions), &[ash::khr::surface::NAME.as_ptr()])?;
//! let _loader = instance.entry();
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::RhiResult;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APPLICATION_NAME: &CStr = c"Vulkan Renderer";

/// Debug-utils messenger owned by an [`Instance`].
struct DebugMessenger {
    loader: ash::ext::debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    fn new(entry: &Entry, instance: &ash::Instance) -> RhiResult<Self> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(forward_to_tracing));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None)? };
        Ok(Self { loader, messenger })
    }

    /// # Safety
    ///
    /// Must run before the owning instance is destroyed.
    unsafe fn destroy(self) {
        unsafe {
            self.loader
                .destroy_debug_utils_messenger(self.messenger, None)
        };
    }
}

/// The Vulkan instance, destroyed on drop.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    messenger: Option<DebugMessenger>,
}

impl Instance {
    /// Creates the instance.
    ///
    /// A missing validation layer is not an error: the instance comes up
    /// without it and a warning is logged.
    ///
    /// # Arguments
    ///
    /// * `enable_validation` - Request `VK_LAYER_KHRONOS_validation`
    /// * `surface_extensions` - Extensions the window system needs, as
    ///   returned by `ash_window::enumerate_required_extensions`
    ///
    /// # Errors
    ///
    /// Returns an error if the Vulkan library cannot be loaded, or if
    /// instance or messenger creation fails.
    pub fn new(enable_validation: bool, surface_extensions: &[*const c_char]) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let validation = enable_validation && layer_present(&entry, VALIDATION_LAYER)?;
        if enable_validation && !validation {
            warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }

        let extensions = instance_extensions(surface_extensions, validation);
        let layers: &[*const c_char] = if validation {
            &[VALIDATION_LAYER.as_ptr()]
        } else {
            &[]
        };

        let app_info = vk::ApplicationInfo::default()
            .application_name(APPLICATION_NAME)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);
        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(layers);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if validation {
            match DebugMessenger::new(&entry, &instance) {
                Ok(m) => Some(m),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance created ({} extension(s), validation {})",
            extensions.len(),
            if validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some(messenger) = self.messenger.take() {
                messenger.destroy();
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// `VK_KHR_surface`, then the window-system extensions without repeating
/// it, then debug-utils when validation is on.
fn instance_extensions(surface_extensions: &[*const c_char], validation: bool) -> Vec<*const c_char> {
    let base = ash::khr::surface::NAME;
    let mut extensions = vec![base.as_ptr()];
    extensions.extend(surface_extensions.iter().copied().filter(|&ext| {
        // Callers pass static, null-terminated names
        let name = unsafe { CStr::from_ptr(ext) };
        name != base
    }));
    if validation {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    extensions
}

fn layer_present(entry: &Entry, name: &CStr) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    Ok(layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|n| n == name)))
}

fn message_kind(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

unsafe extern "system" fn forward_to_tracing(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = unsafe { callback_data.as_ref() }
        .and_then(|data| unsafe { data.message_as_c_str() })
        .map_or(Cow::Borrowed("(no message)"), CStr::to_string_lossy);
    let kind = message_kind(message_type);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{}] {}", kind, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "[{}] {}", kind, message);
    } else {
        debug!(target: "vulkan", "[{}] {}", kind, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RhiError;

    fn driver_missing(e: &RhiError) -> bool {
        matches!(
            e,
            RhiError::LoadingError(_)
                | RhiError::VulkanError(vk::Result::ERROR_INCOMPATIBLE_DRIVER)
                | RhiError::VulkanError(vk::Result::ERROR_INITIALIZATION_FAILED)
                | RhiError::VulkanError(vk::Result::ERROR_EXTENSION_NOT_PRESENT)
                | RhiError::VulkanError(vk::Result::ERROR_LAYER_NOT_PRESENT)
        )
    }

    #[test]
    fn test_instance_without_validation() {
        match Instance::new(false, &[]) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(e) if driver_missing(&e) => eprintln!("Skipping: no Vulkan driver ({e})"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_instance_with_validation_if_installed() {
        match Instance::new(true, &[]) {
            Ok(instance) => {
                if instance.has_validation() {
                    assert!(instance.messenger.is_some());
                }
            }
            Err(e) if driver_missing(&e) => eprintln!("Skipping: no Vulkan driver ({e})"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_extensions_start_with_surface() {
        let extensions = instance_extensions(&[], false);
        assert_eq!(extensions, vec![ash::khr::surface::NAME.as_ptr()]);
    }

    #[test]
    fn test_extensions_skip_repeated_surface() {
        let requested = [
            ash::khr::surface::NAME.as_ptr(),
            ash::khr::xlib_surface::NAME.as_ptr(),
        ];
        let extensions = instance_extensions(&requested, true);
        let names: Vec<&CStr> = extensions
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect();
        assert_eq!(
            names,
            vec![
                ash::khr::surface::NAME,
                ash::khr::xlib_surface::NAME,
                ash::ext::debug_utils::NAME,
            ]
        );
    }

    #[test]
    fn test_message_kind() {
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION),
            "validation"
        );
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            "performance"
        );
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL),
            "general"
        );
    }
}
