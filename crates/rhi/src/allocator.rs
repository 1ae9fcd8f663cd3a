//! Device memory allocation.
//!
//! # Overview
//!
//! [`MemoryAllocator`] wraps gpu-allocator and turns a create-info plus a
//! (memory properties, [`MemoryFlags`]) pair into a buffer or image that is
//! already bound to its memory. The subject and its [`Allocation`] come back
//! together and must be freed together.
//!
//! Host-visible memory from gpu-allocator is mapped for the lifetime of the
//! allocation. Persistent mapping exposes that pointer directly; otherwise
//! access goes through [`crate::buffer::Buffer::map`], which borrows the
//! buffer exclusively so two mappings can never overlap.
//!
//! Allocation failure is returned to the caller as-is. Nothing is retried with
//! a smaller size.
//!
//! The allocator is guarded by a mutex so the device context stays `Sync`,
//! but resource creation is expected to happen from the render thread.

use std::sync::{Mutex, PoisonError};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{
    Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc,
};
use tracing::{debug, warn};

use crate::error::{RhiError, RhiResult};

/// Allocation behaviour requested alongside the memory properties.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryFlags {
    /// The host reads as well as writes, so prefer cached memory.
    pub host_random_access: bool,
    /// Keep a stable host pointer for the allocation's lifetime.
    pub persistent_mapping: bool,
    /// Give the resource its own `VkDeviceMemory`.
    pub dedicated: bool,
}

impl MemoryFlags {
    /// Merges two flag sets; every flag set in either stays set.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            host_random_access: self.host_random_access || other.host_random_access,
            persistent_mapping: self.persistent_mapping || other.persistent_mapping,
            dedicated: self.dedicated || other.dedicated,
        }
    }
}

/// Chooses a gpu-allocator location for the requested properties.
///
/// - nothing host-visible → [`MemoryLocation::GpuOnly`]
/// - host-visible with random access or host-cached → [`MemoryLocation::GpuToCpu`]
/// - any other host-visible request → [`MemoryLocation::CpuToGpu`]
pub fn select_location(properties: vk::MemoryPropertyFlags, flags: MemoryFlags) -> MemoryLocation {
    let host_visible = properties.intersects(
        vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT
            | vk::MemoryPropertyFlags::HOST_CACHED,
    ) || flags.persistent_mapping;

    if !host_visible {
        return MemoryLocation::GpuOnly;
    }

    if flags.host_random_access || properties.contains(vk::MemoryPropertyFlags::HOST_CACHED) {
        MemoryLocation::GpuToCpu
    } else {
        MemoryLocation::CpuToGpu
    }
}

/// Totals from [`MemoryAllocator::report`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocatorSummary {
    pub allocations: usize,
    /// Bytes handed out to live allocations.
    pub allocated_bytes: u64,
    /// Bytes of device memory blocks the allocator holds.
    pub reserved_bytes: u64,
}

impl AllocatorSummary {
    /// Fraction of reserved memory in use, 0 when nothing is reserved.
    pub fn utilization(&self) -> f64 {
        if self.reserved_bytes == 0 {
            0.0
        } else {
            self.allocated_bytes as f64 / self.reserved_bytes as f64
        }
    }
}

/// Mutex-guarded gpu-allocator instance bound to one logical device.
pub struct MemoryAllocator {
    device: ash::Device,
    allocator: Mutex<Allocator>,
}

impl MemoryAllocator {
    pub(crate) fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
    ) -> RhiResult<Self> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: true,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            device: device.clone(),
            allocator: Mutex::new(allocator),
        })
    }

    /// Creates a buffer and binds freshly allocated memory to it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if the buffer cannot be created,
    /// or [`RhiError::AllocatorError`] if memory is exhausted. Nothing is
    /// leaked on either path.
    pub fn allocate_buffer(
        &self,
        create_info: &vk::BufferCreateInfo,
        name: &str,
        location: MemoryLocation,
        flags: MemoryFlags,
    ) -> RhiResult<(vk::Buffer, Allocation)> {
        let buffer = unsafe { self.device.create_buffer(create_info, None) }
            .map_err(|e| RhiError::creation("buffer", e))?;
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let scheme = if flags.dedicated {
            AllocationScheme::DedicatedBuffer(buffer)
        } else {
            AllocationScheme::GpuAllocatorManaged
        };

        let allocation = match self.allocate(name, requirements, location, true, scheme) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free(allocation);
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(RhiError::creation("buffer memory binding", e));
        }

        debug!(
            "Allocated buffer '{}': {} bytes at {:?}{}",
            name,
            create_info.size,
            location,
            if flags.dedicated { " (dedicated)" } else { "" }
        );

        Ok((buffer, allocation))
    }

    /// Creates an image and binds freshly allocated memory to it.
    ///
    /// # Errors
    ///
    /// Same outcomes as [`MemoryAllocator::allocate_buffer`].
    pub fn allocate_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        name: &str,
        location: MemoryLocation,
        flags: MemoryFlags,
    ) -> RhiResult<(vk::Image, Allocation)> {
        let image = unsafe { self.device.create_image(create_info, None) }
            .map_err(|e| RhiError::creation("image", e))?;
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let scheme = if flags.dedicated {
            AllocationScheme::DedicatedImage(image)
        } else {
            AllocationScheme::GpuAllocatorManaged
        };
        let linear = create_info.tiling == vk::ImageTiling::LINEAR;

        let allocation = match self.allocate(name, requirements, location, linear, scheme) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        let bound = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bound {
            self.free(allocation);
            unsafe { self.device.destroy_image(image, None) };
            return Err(RhiError::creation("image memory binding", e));
        }

        debug!(
            "Allocated image '{}': {}x{} {:?}",
            name, create_info.extent.width, create_info.extent.height, create_info.format
        );

        Ok((image, allocation))
    }

    /// Returns an allocation to the allocator.
    pub fn free(&self, allocation: Allocation) {
        let mut allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = allocator.free(allocation) {
            warn!("Failed to free allocation: {:?}", e);
        }
    }

    /// Logs and returns a summary of the allocator's memory blocks.
    pub fn report(&self) -> AllocatorSummary {
        let allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        let report = allocator.generate_report();
        let summary = AllocatorSummary {
            allocations: report.allocations.len(),
            allocated_bytes: report.total_allocated_bytes,
            reserved_bytes: report.total_reserved_bytes,
        };
        debug!(
            "Allocator: {} allocation(s), {} bytes allocated in {} bytes of blocks ({:.0}% used)",
            summary.allocations,
            summary.allocated_bytes,
            summary.reserved_bytes,
            summary.utilization() * 100.0
        );
        summary
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
        allocation_scheme: AllocationScheme,
    ) -> RhiResult<Allocation> {
        let mut allocator = self.allocator.lock().unwrap_or_else(PoisonError::into_inner);
        let allocation = allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme,
        })?;
        Ok(allocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_local_is_gpu_only() {
        assert_eq!(
            select_location(vk::MemoryPropertyFlags::DEVICE_LOCAL, MemoryFlags::default()),
            MemoryLocation::GpuOnly
        );
        assert_eq!(
            select_location(vk::MemoryPropertyFlags::empty(), MemoryFlags::default()),
            MemoryLocation::GpuOnly
        );
    }

    #[test]
    fn test_host_visible_is_upload() {
        assert_eq!(
            select_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE,
                MemoryFlags::default()
            ),
            MemoryLocation::CpuToGpu
        );
    }

    #[test]
    fn test_random_access_is_readback() {
        let flags = MemoryFlags {
            host_random_access: true,
            ..Default::default()
        };
        assert_eq!(
            select_location(vk::MemoryPropertyFlags::HOST_VISIBLE, flags),
            MemoryLocation::GpuToCpu
        );
        assert_eq!(
            select_location(
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_CACHED,
                MemoryFlags::default()
            ),
            MemoryLocation::GpuToCpu
        );
    }

    #[test]
    fn test_persistent_mapping_forces_host_visible() {
        let flags = MemoryFlags {
            persistent_mapping: true,
            ..Default::default()
        };
        assert_eq!(
            select_location(vk::MemoryPropertyFlags::DEVICE_LOCAL, flags),
            MemoryLocation::CpuToGpu
        );
    }

    #[test]
    fn test_flags_union() {
        let a = MemoryFlags {
            dedicated: true,
            ..Default::default()
        };
        let b = MemoryFlags {
            persistent_mapping: true,
            ..Default::default()
        };
        let merged = a.union(b);
        assert!(merged.dedicated);
        assert!(merged.persistent_mapping);
        assert!(!merged.host_random_access);
    }

    #[test]
    fn test_allocator_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<MemoryAllocator>();
    }

    #[test]
    fn test_summary_utilization() {
        let summary = AllocatorSummary {
            allocations: 2,
            allocated_bytes: 48 << 20,
            reserved_bytes: 64 << 20,
        };
        assert_eq!(summary.utilization(), 0.75);
        assert_eq!(AllocatorSummary::default().utilization(), 0.0);
    }
}
