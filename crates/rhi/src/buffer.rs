//! GPU buffers and their builder.
//!
//! # Overview
//!
//! - [`BufferBuilder`] accumulates usage flags, memory properties and
//!   allocation flags, then creates the buffer in one call
//! - [`Buffer`] owns a `VkBuffer` together with its gpu-allocator memory
//! - [`BufferMapping`] is a scoped view of host-visible memory
//!
//! Usage and memory-property setters OR into the accumulated state, so
//! `with_buffer_usage(A).with_buffer_usage(B)` yields `A | B`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::buffer::BufferBuilder;
//! use ash::vk;
//!
//! # fn example(device: Arc<DeviceContext>) -> Result<(), vkframe_rhi::RhiError> {
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//!
//! let mut buffer = BufferBuilder::new(24, "triangle")
//!     .with_buffer_usage(vk::BufferUsageFlags::VERTEX_BUFFER)
//!     .with_persistent_mapping()
//!     .build(&device)?;
//! buffer.copy_data(0, bytemuck::cast_slice(&vertices))?;
//! # Ok(())
//! # }
//! ```

use std::ptr::NonNull;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, trace};

use crate::allocator::{MemoryFlags, select_location};
use crate::command::{CommandPools, UPLOAD_QUEUE};
use crate::device::DeviceContext;
use crate::error::{RhiError, RhiResult};

/// Accumulates buffer creation state.
///
/// Single use: a second [`BufferBuilder::build`] panics until
/// [`BufferBuilder::reset`] is called.
#[derive(Clone, Debug)]
pub struct BufferBuilder {
    name: String,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_properties: vk::MemoryPropertyFlags,
    flags: MemoryFlags,
    built: bool,
}

impl BufferBuilder {
    /// Starts a builder for a buffer of `size` bytes.
    pub fn new(size: vk::DeviceSize, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size,
            usage: vk::BufferUsageFlags::empty(),
            memory_properties: vk::MemoryPropertyFlags::empty(),
            flags: MemoryFlags::default(),
            built: false,
        }
    }

    /// Adds usage flags.
    pub fn with_buffer_usage(mut self, usage: vk::BufferUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    /// Adds required memory properties.
    pub fn with_memory_properties(mut self, properties: vk::MemoryPropertyFlags) -> Self {
        self.memory_properties |= properties;
        self
    }

    /// Host-visible memory that the host may read as well as write.
    pub fn with_host_visibility(mut self) -> Self {
        self.memory_properties |= vk::MemoryPropertyFlags::HOST_VISIBLE;
        self.flags.host_random_access = true;
        self
    }

    /// Allows querying the buffer's device address.
    pub fn with_device_addresses(mut self) -> Self {
        self.usage |= vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS;
        self
    }

    /// Host-coherent memory with a pointer that stays valid for the
    /// buffer's lifetime.
    pub fn with_persistent_mapping(mut self) -> Self {
        self.memory_properties |=
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        self.flags.persistent_mapping = true;
        self
    }

    /// Gives the buffer its own memory object.
    pub fn with_unique_allocation(mut self) -> Self {
        self.flags.dedicated = true;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn memory_properties(&self) -> vk::MemoryPropertyFlags {
        self.memory_properties
    }

    #[inline]
    pub fn flags(&self) -> MemoryFlags {
        self.flags
    }

    /// True once [`BufferBuilder::build`] has been called.
    #[inline]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// True if the accumulated properties request host-visible memory.
    pub fn is_host_visible(&self) -> bool {
        self.memory_properties
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
            || self.flags.persistent_mapping
    }

    /// Allows the builder to be built again.
    pub fn reset(&mut self) {
        self.built = false;
    }

    /// Creates the buffer.
    ///
    /// # Panics
    ///
    /// Panics if the size is zero, no usage was given, or the builder was
    /// already built.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] or [`RhiError::AllocatorError`]
    /// if the device rejects the buffer or memory is exhausted.
    pub fn build(&mut self, device: &Arc<DeviceContext>) -> RhiResult<Buffer> {
        assert!(
            !self.built,
            "buffer builder '{}' was already built; call reset() first",
            self.name
        );
        assert!(self.size > 0, "buffer '{}' has zero size", self.name);
        assert!(
            !self.usage.is_empty(),
            "buffer '{}' has no usage flags",
            self.name
        );
        self.built = true;

        let create_info = vk::BufferCreateInfo::default()
            .size(self.size)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let location = select_location(self.memory_properties, self.flags);

        let (buffer, allocation) =
            device
                .allocator()
                .allocate_buffer(&create_info, &self.name, location, self.flags)?;
        device.set_debug_name(buffer, &self.name);

        Ok(Buffer {
            device: device.clone(),
            buffer,
            allocation: Some(allocation),
            size: self.size,
            usage: self.usage,
            persistent: self.flags.persistent_mapping,
            name: self.name.clone(),
        })
    }

    /// Creates the buffer and fills it with `data`.
    ///
    /// Host-visible buffers are written directly. Device-local buffers get
    /// `TRANSFER_DST` added and are filled through a staging buffer on
    /// [`UPLOAD_QUEUE`], the family that later reads them.
    ///
    /// # Errors
    ///
    /// Same as [`BufferBuilder::build`], plus submission errors from the
    /// staging copy.
    pub fn build_with_data<T: bytemuck::Pod>(
        &mut self,
        device: &Arc<DeviceContext>,
        pools: &CommandPools,
        data: &[T],
    ) -> RhiResult<Buffer> {
        let bytes: &[u8] = bytemuck::cast_slice(data);

        if self.is_host_visible() {
            let mut buffer = self.build(device)?;
            buffer.copy_data(0, bytes)?;
            return Ok(buffer);
        }

        self.usage |= vk::BufferUsageFlags::TRANSFER_DST;
        let buffer = self.build(device)?;

        let staging_name = format!("{} staging", self.name);
        let mut staging = BufferBuilder::new(bytes.len() as vk::DeviceSize, staging_name)
            .with_buffer_usage(vk::BufferUsageFlags::TRANSFER_SRC)
            .with_persistent_mapping()
            .build(device)?;
        staging.copy_data(0, bytes)?;

        let region = vk::BufferCopy::default().size(bytes.len() as vk::DeviceSize);
        let (buffer, _staging) = pools.submit_one_shot_keeping(
            UPLOAD_QUEUE,
            "buffer upload",
            (buffer, staging),
            |cmd, (buffer, staging)| {
                cmd.copy_buffer(staging.handle(), buffer.handle(), &[region]);
            },
        )?;

        Ok(buffer)
    }
}

/// GPU buffer with gpu-allocator managed memory.
///
/// The buffer and its allocation are created together and freed together.
pub struct Buffer {
    device: Arc<DeviceContext>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    persistent: bool,
    name: String,
}

impl Buffer {
    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the usage flags the buffer was created with.
    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable host pointer for persistently mapped buffers.
    ///
    /// `None` unless the buffer was built with persistent mapping.
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        if !self.persistent {
            return None;
        }
        self.host_ptr()
    }

    /// Maps the buffer for the lifetime of the returned guard.
    ///
    /// The guard borrows the buffer exclusively, so two mappings of the
    /// same buffer can never be live at once.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the memory is not host-visible.
    pub fn map(&mut self) -> RhiResult<BufferMapping<'_>> {
        let ptr = self.host_ptr().ok_or_else(|| {
            RhiError::InvalidHandle(format!("buffer '{}' is not host-visible", self.name))
        })?;
        let len = usize::try_from(self.size).map_err(|_| {
            RhiError::InvalidHandle(format!("buffer '{}' is too large to map", self.name))
        })?;
        trace!("Mapped buffer '{}'", self.name);
        Ok(BufferMapping {
            buffer: self,
            ptr,
            len,
        })
    }

    /// Copies `data` into the buffer at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the memory is not host-visible
    /// or the write would run past the end of the buffer.
    pub fn copy_data(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let mut mapping = self.map()?;
        mapping.write(offset, data)
    }

    /// Returns the buffer's GPU virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the buffer was not built with device addresses.
    pub fn device_address(&self) -> vk::DeviceAddress {
        assert!(
            self.usage
                .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS),
            "buffer '{}' was not built with device addresses",
            self.name
        );
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.buffer);
        unsafe { self.device.handle().get_buffer_device_address(&info) }
    }

    fn host_ptr(&self) -> Option<NonNull<u8>> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.cast::<u8>())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.device.allocator().free(allocation);
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed buffer '{}'", self.name);
    }
}

/// Scoped access to a host-visible buffer.
///
/// Host memory handed out by gpu-allocator is coherent, so writes are
/// visible to the device once the guard is dropped and the buffer is
/// submitted.
pub struct BufferMapping<'a> {
    buffer: &'a mut Buffer,
    ptr: NonNull<u8>,
    len: usize,
}

impl BufferMapping<'_> {
    /// The mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The mapped bytes, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Writes `data` at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidHandle`] if the write runs past the end.
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        let range = write_range(offset, data.len(), self.len).ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "write of {} bytes at offset {} exceeds buffer '{}' of {} bytes",
                data.len(),
                offset,
                self.buffer.name,
                self.len
            ))
        })?;
        self.as_mut_slice()[range].copy_from_slice(data);
        Ok(())
    }
}

impl Drop for BufferMapping<'_> {
    fn drop(&mut self) {
        trace!("Unmapped buffer '{}'", self.buffer.name);
    }
}

/// Byte range of a write, or `None` if it does not fit.
fn write_range(
    offset: vk::DeviceSize,
    len: usize,
    capacity: usize,
) -> Option<std::ops::Range<usize>> {
    let start = usize::try_from(offset).ok()?;
    let end = start.checked_add(len)?;
    (end <= capacity).then_some(start..end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_flags_accumulate() {
        let pairs = [
            (
                vk::BufferUsageFlags::VERTEX_BUFFER,
                vk::BufferUsageFlags::TRANSFER_DST,
            ),
            (
                vk::BufferUsageFlags::STORAGE_BUFFER,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
            ),
            (
                vk::BufferUsageFlags::INDEX_BUFFER,
                vk::BufferUsageFlags::INDEX_BUFFER,
            ),
            (
                vk::BufferUsageFlags::TRANSFER_SRC,
                vk::BufferUsageFlags::INDIRECT_BUFFER | vk::BufferUsageFlags::STORAGE_BUFFER,
            ),
        ];

        for (a, b) in pairs {
            let builder = BufferBuilder::new(64, "accumulate")
                .with_buffer_usage(a)
                .with_buffer_usage(b);
            assert_eq!(builder.usage(), a | b);
        }
    }

    #[test]
    fn test_memory_properties_accumulate() {
        let builder = BufferBuilder::new(64, "props")
            .with_memory_properties(vk::MemoryPropertyFlags::DEVICE_LOCAL)
            .with_memory_properties(vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert_eq!(
            builder.memory_properties(),
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE
        );
        assert!(builder.is_host_visible());
    }

    #[test]
    fn test_convenience_setters() {
        let builder = BufferBuilder::new(64, "flags")
            .with_buffer_usage(vk::BufferUsageFlags::STORAGE_BUFFER)
            .with_device_addresses()
            .with_persistent_mapping()
            .with_unique_allocation();

        assert!(builder.usage().contains(
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS
        ));
        assert!(
            builder
                .memory_properties()
                .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
        );
        assert!(builder.flags().persistent_mapping);
        assert!(builder.flags().dedicated);
        assert!(!builder.flags().host_random_access);
    }

    #[test]
    fn test_host_visibility_is_random_access() {
        let builder = BufferBuilder::new(16, "readback").with_host_visibility();
        assert!(builder.flags().host_random_access);
        assert!(builder.is_host_visible());
    }

    #[test]
    fn test_device_local_is_not_host_visible() {
        let builder = BufferBuilder::new(16, "gpu")
            .with_memory_properties(vk::MemoryPropertyFlags::DEVICE_LOCAL);
        assert!(!builder.is_host_visible());
    }

    #[test]
    fn test_reset_clears_built() {
        let mut builder = BufferBuilder::new(16, "reset");
        builder.built = true;
        builder.reset();
        assert!(!builder.is_built());
    }

    #[test]
    fn test_write_range() {
        assert_eq!(write_range(0, 4, 16), Some(0..4));
        assert_eq!(write_range(12, 4, 16), Some(12..16));
        assert_eq!(write_range(13, 4, 16), None);
        assert_eq!(write_range(u64::MAX, 1, 16), None);
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
