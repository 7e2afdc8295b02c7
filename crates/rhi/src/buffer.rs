//! Buffers backed by gpu-allocator memory.
//!
//! Mesh data (vertex and index buffers) lives in device-local memory and is
//! filled once through a staging copy. Uniform and staging buffers are
//! host-visible and stay mapped for their whole lifetime, so writes are a
//! plain `memcpy` into the mapping.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use renderer_rhi::device::Device;
//! use renderer_rhi::buffer::{Buffer, BufferUsage};
//! use renderer_rhi::command::CommandPool;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), renderer_rhi::RhiError> {
//! let indices: [u32; 3] = [0, 1, 2];
//! let index_buffer = Buffer::new_device_local(
//!     device,
//!     pool,
//!     BufferUsage::Index,
//!     bytemuck::cast_slice(&indices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::command::CommandPool;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// What a buffer holds. Decides its usage flags and memory location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    Uniform,
    /// Host-written source of a transfer.
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_location(self) -> MemoryLocation {
        if self.is_host_visible() {
            MemoryLocation::CpuToGpu
        } else {
            MemoryLocation::GpuOnly
        }
    }

    /// Whether the buffer is mapped and written from the CPU.
    #[inline]
    pub fn is_host_visible(self) -> bool {
        matches!(self, BufferUsage::Uniform | BufferUsage::Staging)
    }

    /// Allocation name, also used in logs.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// A `VkBuffer` and the allocation bound to it.
///
/// Host access goes through `&self` with no locking; callers that share a
/// buffer between threads must serialize writes themselves.
pub struct Buffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    // None until memory is allocated, and again during drop
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates an uninitialized buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `size` is zero, or if creation, allocation or
    /// binding fails.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "Refusing to create an empty {} buffer",
                usage.name()
            )));
        }

        let create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let handle = unsafe { device.handle().create_buffer(&create_info, None)? };
        // Owns the handle from here on, so every early return below releases it
        let mut buffer = Self {
            device,
            buffer: handle,
            allocation: None,
            size,
            usage,
        };

        let requirements = unsafe { buffer.device.handle().get_buffer_memory_requirements(handle) };
        let allocation = buffer.device.lock_allocator()?.allocate(&AllocationCreateDesc {
            name: usage.name(),
            requirements,
            location: usage.memory_location(),
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        let allocation = buffer.allocation.insert(allocation);

        unsafe {
            buffer
                .device
                .handle()
                .bind_buffer_memory(handle, allocation.memory(), allocation.offset())?;
        }
        debug!("{} buffer: {} bytes", usage.name(), size);

        Ok(buffer)
    }

    /// Creates a host-visible buffer holding a copy of `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails or `usage` is not host-visible.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Creates a device-local buffer holding a copy of `data`.
    ///
    /// Blocks until the staging copy has finished on the graphics queue.
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer cannot be created or the copy fails.
    pub fn new_device_local(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::new_with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::new(device, usage, size)?;

        pool.one_time_submit(|cmd| cmd.copy_buffer(staging.handle(), buffer.handle(), size))?;

        Ok(buffer)
    }

    /// Copies `data` into the mapping at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not mapped or the range does not fit.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let base = self.mapping()?;
        // The mapping spans at least `size` bytes
        let mapped = unsafe { std::slice::from_raw_parts_mut(base.as_ptr(), self.size as usize) };
        write_bytes(mapped, offset, data)
    }

    /// Copies `len` bytes at `offset` out of the mapping.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not mapped or the range does not fit.
    pub fn read_data(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        let base = self.mapping()?;
        let mapped = unsafe { std::slice::from_raw_parts(base.as_ptr(), self.size as usize) };
        read_bytes(mapped, offset, len)
    }

    fn mapping(&self) -> RhiResult<NonNull<u8>> {
        self.allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .map(|ptr| ptr.cast::<u8>())
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("{} buffer is not mapped", self.usage.name()))
            })
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            let freed = self
                .device
                .lock_allocator()
                .and_then(|mut allocator| Ok(allocator.free(allocation)?));
            if let Err(e) = freed {
                error!("Failed to free {} buffer memory: {}", self.usage.name(), e);
            }
        }
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        debug!("{} buffer destroyed", self.usage.name());
    }
}

/// Copies `data` into `mapped` at `offset`, bounds-checked.
fn write_bytes(mapped: &mut [u8], offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
    check_range(offset, data.len(), mapped.len() as vk::DeviceSize)?;
    let start = offset as usize;
    mapped[start..start + data.len()].copy_from_slice(data);
    Ok(())
}

/// Copies `len` bytes at `offset` out of `mapped`, bounds-checked.
fn read_bytes(mapped: &[u8], offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
    check_range(offset, len, mapped.len() as vk::DeviceSize)?;
    let start = offset as usize;
    Ok(mapped[start..start + len].to_vec())
}

fn check_range(offset: vk::DeviceSize, len: usize, size: vk::DeviceSize) -> RhiResult<()> {
    match offset.checked_add(len as vk::DeviceSize) {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::InvalidHandle(format!(
            "Range {}+{} is outside a {}-byte buffer",
            offset, len, size
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[test]
    fn test_mesh_buffers_are_transfer_targets() {
        for usage in [BufferUsage::Vertex, BufferUsage::Index] {
            assert!(usage.to_vk_usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
            assert_eq!(usage.memory_location(), MemoryLocation::GpuOnly);
            assert!(!usage.is_host_visible());
        }
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
    }

    #[test]
    fn test_host_visible_buffers() {
        assert_eq!(
            BufferUsage::Uniform.to_vk_usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
        for usage in [BufferUsage::Uniform, BufferUsage::Staging] {
            assert!(usage.is_host_visible());
            assert_eq!(usage.memory_location(), MemoryLocation::CpuToGpu);
        }
    }

    #[test]
    fn test_check_range() {
        assert!(check_range(0, 128, 128).is_ok());
        assert!(check_range(64, 64, 128).is_ok());
        assert!(check_range(128, 0, 128).is_ok());
        assert!(check_range(64, 65, 128).is_err());
        assert!(check_range(u64::MAX, 1, 128).is_err());
    }

    #[test]
    fn test_bytes_round_trip_at_offset() {
        let mut mapped = [0u8; 16];
        write_bytes(&mut mapped, 4, &[1, 2, 3, 4]).unwrap();

        assert_eq!(read_bytes(&mapped, 4, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(read_bytes(&mapped, 0, 4).unwrap(), vec![0; 4]);
        assert!(read_bytes(&mapped, 16, 0).unwrap().is_empty());
    }

    #[test]
    fn test_bytes_out_of_range_leave_mapping_untouched() {
        let mut mapped = [7u8; 8];
        assert!(write_bytes(&mut mapped, 6, &[0; 4]).is_err());
        assert_eq!(mapped, [7u8; 8]);

        assert!(read_bytes(&mapped, 4, 5).is_err());
        assert!(read_bytes(&mapped, u64::MAX, 1).is_err());
    }

    #[test]
    fn test_uniform_round_trip() {
        let Some(ctx) = test_support::headless_context() else {
            return;
        };
        let matrices = [
            glam::Mat4::perspective_rh(1.0, 1.5, 0.1, 100.0),
            glam::Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -2.5)),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&matrices);
        assert_eq!(bytes.len(), 128);

        let buffer = Buffer::new(ctx.device.clone(), BufferUsage::Uniform, 128).unwrap();
        buffer.write_data(0, bytes).unwrap();

        assert_eq!(buffer.read_data(0, 128).unwrap(), bytes);
        assert_eq!(buffer.read_data(64, 64).unwrap(), &bytes[64..]);
        assert!(buffer.read_data(64, 65).is_err());
    }

    #[test]
    fn test_failed_allocation_releases_buffer() {
        let Some(ctx) = test_support::headless_context() else {
            return;
        };
        let before = test_support::live_allocations(&ctx.device);

        // No implementation can back a 256 TiB host-visible buffer
        assert!(Buffer::new(ctx.device.clone(), BufferUsage::Uniform, 1 << 48).is_err());
        assert_eq!(test_support::live_allocations(&ctx.device), before);

        let buffer = Buffer::new(ctx.device.clone(), BufferUsage::Staging, 64).unwrap();
        assert_eq!(test_support::live_allocations(&ctx.device), before + 1);
        drop(buffer);
        assert_eq!(test_support::live_allocations(&ctx.device), before);
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
