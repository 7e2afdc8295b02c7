//! Texture sampler.
//!
//! One sampler is shared by every texture in the texture table.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Maximum anisotropic filtering level requested.
pub const MAX_ANISOTROPY: f32 = 16.0;

/// Builds the create info of the shared texture sampler.
///
/// Linear filtering, repeat addressing on all axes, normalized
/// coordinates, a single LOD level and 16x anisotropy.
pub fn sampler_create_info() -> vk::SamplerCreateInfo<'static> {
    vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .mip_lod_bias(0.0)
        .min_lod(0.0)
        .max_lod(0.0)
        .anisotropy_enable(true)
        .max_anisotropy(MAX_ANISOTROPY)
}

/// Vulkan sampler wrapper.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Creates the texture sampler.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = sampler_create_info();
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };

        debug!("Created texture sampler");

        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
        debug!("Destroyed texture sampler");
    }
}
