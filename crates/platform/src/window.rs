//! winit window and the Vulkan surface created for it.

use std::ffi::{CStr, c_char};

use ash::vk;
use raw_window_handle::{
    DisplayHandle, HasDisplayHandle, HasWindowHandle, RawDisplayHandle, WindowHandle,
};
use tracing::{debug, info};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

use renderer_core::{Error, Result, WindowConfig};

/// `VkSurfaceKHR` plus the loader that destroys it.
///
/// Must be dropped before the instance it was created from.
pub struct Surface {
    handle: vk::SurfaceKHR,
    loader: ash::khr::surface::Instance,
}

impl Surface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Loader for capability, format and present mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        debug!("Vulkan surface destroyed");
    }
}

/// The application window.
pub struct Window {
    window: WinitWindow,
}

impl Window {
    /// Opens a window with the configured title and size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the window system refuses the window.
    pub fn new(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        let attributes = WindowAttributes::default()
            .with_title(config.title.as_str())
            .with_inner_size(PhysicalSize::new(config.width, config.height))
            .with_resizable(config.resizable);

        let window = event_loop
            .create_window(attributes)
            .map_err(|e| Error::Window(e.to_string()))?;

        info!(
            "Window '{}' opened at {}x{}",
            config.title, config.width, config.height
        );
        Ok(Self { window })
    }

    /// Framebuffer size in pixels, read from the window system rather than
    /// from the last resize event.
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }

    /// Instance extensions required to create a surface on this display.
    ///
    /// # Errors
    ///
    /// Returns an error if the display handle is gone or the platform is
    /// not supported by `ash-window`.
    pub fn required_extensions(&self) -> Result<Vec<*const c_char>> {
        surface_extensions(self.display()?.as_raw())
    }

    /// Creates a surface for this window. `instance` must outlive it.
    ///
    /// # Errors
    ///
    /// Returns an error if a raw handle is unavailable or creation fails.
    pub fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> Result<Surface> {
        let (display, window) = (self.display()?, self.raw_window()?);

        let handle = unsafe {
            ash_window::create_surface(entry, instance, display.as_raw(), window.as_raw(), None)
        }
        .map_err(|e| Error::Vulkan(format!("Surface creation failed: {}", e)))?;

        info!("Vulkan surface created");
        Ok(Surface {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }

    fn display(&self) -> Result<DisplayHandle<'_>> {
        self.window
            .display_handle()
            .map_err(|e| Error::Window(format!("No display handle: {}", e)))
    }

    fn raw_window(&self) -> Result<WindowHandle<'_>> {
        self.window
            .window_handle()
            .map_err(|e| Error::Window(format!("No window handle: {}", e)))
    }
}

/// Surface extensions for `display`. The names are static strings owned by
/// `ash-window`.
fn surface_extensions(display: RawDisplayHandle) -> Result<Vec<*const c_char>> {
    let extensions = ash_window::enumerate_required_extensions(display)
        .map_err(|e| Error::Vulkan(format!("Cannot list surface extensions: {}", e)))?;

    for &name in extensions {
        debug!("Surface extension {:?}", unsafe { CStr::from_ptr(name) });
    }
    Ok(extensions.to_vec())
}
