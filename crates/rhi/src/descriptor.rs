//! Descriptor set layouts, pools and writes.
//!
//! Every pool in the renderer serves one descriptor type and a fixed number
//! of sets, so [`DescriptorPool::single_type`] is the usual constructor.
//! Sets are never freed on their own; they go away with their pool.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, layout_binding};
//!
//! # fn example(device: Arc<Device>) -> Result<(), renderer_rhi::RhiError> {
//! let ty = vk::DescriptorType::UNIFORM_BUFFER;
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[layout_binding(0, ty, vk::ShaderStageFlags::VERTEX)],
//! )?;
//!
//! let pool = DescriptorPool::single_type(device.clone(), ty, 1, 3)?;
//! let sets = pool.allocate_many(&layout, 3)?;
//! assert_eq!(sets.len(), 3);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// A single-descriptor binding visible to `stages`.
#[inline]
pub fn layout_binding(
    binding: u32,
    ty: vk::DescriptorType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(ty)
        .descriptor_count(1)
        .stage_flags(stages)
}

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };
        debug!("Descriptor set layout: {} binding(s)", bindings.len());

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Descriptor set layout destroyed");
    }
}

/// Descriptor pool that refuses to hand out more than `max_sets` sets.
///
/// Running out is reported as [`RhiError::CapacityExceeded`] without
/// calling into the driver.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
    allocated: AtomicU32,
}

impl DescriptorPool {
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };
        debug!("Descriptor pool: {} set(s)", max_sets);

        Ok(Self {
            device,
            pool,
            max_sets,
            allocated: AtomicU32::new(0),
        })
    }

    /// Pool for `max_sets` sets of `per_set` descriptors of type `ty` each.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn single_type(
        device: Arc<Device>,
        ty: vk::DescriptorType,
        per_set: u32,
        max_sets: u32,
    ) -> RhiResult<Self> {
        Self::new(device, max_sets, &[single_type_size(ty, per_set, max_sets)])
    }

    /// Allocates one set per entry of `layouts`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::CapacityExceeded`] when the sets do not fit, or
    /// the Vulkan error if allocation fails.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let requested = layouts.len() as u32;
        let before = self.allocated.load(Ordering::Acquire);
        check_pool_capacity(before, requested, self.max_sets)?;

        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);
        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        self.allocated.fetch_add(requested, Ordering::AcqRel);

        debug!(
            "Descriptor sets {}/{} in use",
            before + requested,
            self.max_sets
        );
        Ok(sets)
    }

    /// Allocates `count` sets that all use `layout`.
    ///
    /// # Errors
    ///
    /// Same as [`DescriptorPool::allocate`].
    pub fn allocate_many(
        &self,
        layout: &DescriptorSetLayout,
        count: u32,
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        self.allocate(&vec![layout.handle(); count as usize])
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }

    #[inline]
    pub fn allocated(&self) -> u32 {
        self.allocated.load(Ordering::Acquire)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!(
            "Descriptor pool destroyed ({}/{} used)",
            self.allocated(),
            self.max_sets
        );
    }
}

fn single_type_size(ty: vk::DescriptorType, per_set: u32, max_sets: u32) -> vk::DescriptorPoolSize {
    vk::DescriptorPoolSize::default()
        .ty(ty)
        .descriptor_count(per_set.saturating_mul(max_sets))
}

/// Fails if `requested` more sets would take a pool past `max_sets`.
pub fn check_pool_capacity(allocated: u32, requested: u32, max_sets: u32) -> RhiResult<()> {
    match allocated.checked_add(requested) {
        Some(total) if total <= max_sets => Ok(()),
        _ => Err(RhiError::CapacityExceeded {
            what: "descriptor pool",
            capacity: max_sets as usize,
        }),
    }
}

/// Submits descriptor writes. No-op for an empty slice.
pub fn apply_writes(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }
    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
    debug!("Applied {} descriptor write(s)", writes.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_binding() {
        let binding = layout_binding(
            1,
            vk::DescriptorType::INPUT_ATTACHMENT,
            vk::ShaderStageFlags::FRAGMENT,
        );
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::INPUT_ATTACHMENT);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_single_type_size() {
        let size = single_type_size(vk::DescriptorType::INPUT_ATTACHMENT, 2, 3);
        assert_eq!(size.ty, vk::DescriptorType::INPUT_ATTACHMENT);
        assert_eq!(size.descriptor_count, 6);

        let huge = single_type_size(vk::DescriptorType::UNIFORM_BUFFER, u32::MAX, 2);
        assert_eq!(huge.descriptor_count, u32::MAX);
    }

    #[test]
    fn test_pool_capacity_allows_exact_fill() {
        assert!(check_pool_capacity(0, 2, 2).is_ok());
        assert!(check_pool_capacity(1, 1, 2).is_ok());
        assert!(check_pool_capacity(2, 0, 2).is_ok());
    }

    #[test]
    fn test_pool_capacity_rejects_overflow() {
        let err = check_pool_capacity(2, 1, 2).unwrap_err();
        assert!(matches!(
            err,
            RhiError::CapacityExceeded { capacity: 2, .. }
        ));
        assert!(check_pool_capacity(u32::MAX, 1, u32::MAX).is_err());
    }
}
