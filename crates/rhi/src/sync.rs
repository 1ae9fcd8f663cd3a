//! Synchronization primitives.
//!
//! - [`Semaphore`] orders work between queue submissions and presentation
//! - [`Fence`] lets the host wait for GPU work, with a bounded timeout
//!
//! Both destroy their handle exactly once, on drop.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::sync::{Semaphore, Fence};
//!
//! # fn example(device: Arc<DeviceContext>) -> Result<(), vkframe_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone(), "image available")?;
//! let in_flight = Fence::new(device.clone(), true, "frame 0")?;
//!
//! // Bounded wait: a stalled GPU surfaces as RhiError::Timeout.
//! in_flight.wait(1_000_000_000)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::DeviceContext;
use crate::error::{RhiError, RhiResult, map_wait_result};

/// Binary semaphore for GPU-to-GPU ordering.
pub struct Semaphore {
    device: Arc<DeviceContext>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled semaphore.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if creation fails.
    pub fn new(device: Arc<DeviceContext>, name: &str) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None) }
            .map_err(|e| RhiError::creation("semaphore", e))?;
        device.set_debug_name(semaphore, name);

        debug!("Created semaphore '{}'", name);

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
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
        debug!("Destroyed semaphore");
    }
}

/// Fence for GPU-to-host synchronization.
pub struct Fence {
    device: Arc<DeviceContext>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signaled so the first wait
    /// returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if creation fails.
    pub fn new(device: Arc<DeviceContext>, signaled: bool, name: &str) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None) }
            .map_err(|e| RhiError::creation("fence", e))?;
        device.set_debug_name(fence, name);

        debug!("Created fence '{}' (signaled: {})", name, signaled);

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits until the fence is signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout_ns` - Bound on the wait; `u64::MAX` waits forever
    ///
    /// # Errors
    ///
    /// - [`RhiError::Timeout`] if the bound expires
    /// - [`RhiError::DeviceLost`] if the device was lost
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout_ns)
        }
        .map_err(|e| map_wait_result(e, "fence", timeout_ns))
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence]) }?;
        Ok(())
    }

    /// Polls the fence without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost.
    pub fn is_signaled(&self) -> RhiResult<bool> {
        unsafe { self.device.handle().get_fence_status(self.fence) }
            .map_err(|e| map_wait_result(e, "fence", 0))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }
}
