//! Semaphores, fences and the per-slot bundle of both.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// How many frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Binary semaphore, created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Host-visible completion signal of a queue submission.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so that the first wait
    /// on it returns at once.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            device
                .handle()
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `VulkanError(TIMEOUT)` on timeout, or the device error.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Unsignals the fence. It must not belong to a pending submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }

    /// Polls without blocking. Query errors read as not signaled.
    pub fn is_signaled(&self) -> bool {
        unsafe { self.device.handle().get_fence_status(self.fence) }.unwrap_or(false)
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// The two semaphores and the fence of one frame-in-flight slot.
///
/// The fence starts signaled. Per frame: wait on the fence, acquire an
/// image signaling `image_available`, reset the fence, submit waiting on
/// `image_available` and signaling `render_finished` plus the fence, then
/// present waiting on `render_finished`.
pub struct FrameSync {
    image_available: Semaphore,
    render_finished: Semaphore,
    fence: Fence,
}

impl FrameSync {
    /// # Errors
    ///
    /// Returns an error if any object cannot be created.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let sync = Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            fence: Fence::new(device, true)?,
        };
        debug!("Frame sync objects created");
        Ok(sync)
    }

    #[inline]
    pub fn image_available(&self) -> vk::Semaphore {
        self.image_available.handle()
    }

    #[inline]
    pub fn render_finished(&self) -> vk::Semaphore {
        self.render_finished.handle()
    }

    #[inline]
    pub fn fence(&self) -> &Fence {
        &self.fence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_frames_in_flight() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
