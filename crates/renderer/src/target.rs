//! The presentation-engine seam of the swapchain manager.
//!
//! [`SwapchainManager`](crate::swapchain_manager::SwapchainManager) owns the
//! state machine and the order of operations; a [`PresentTarget`] performs
//! them. [`VulkanTarget`](crate::vulkan_target::VulkanTarget) drives a real
//! swapchain. Tests drive a recording target instead.

use ash::vk;
use vkframe_rhi::RhiResult;

use crate::frame::FrameOptions;

/// Shape of a freshly built image set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    pub image_count: u32,
    pub extent: vk::Extent2D,
    pub colour_format: vk::Format,
}

/// Result of asking the presentation engine for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// `index` is ready to render to. A suboptimal chain still works but
    /// should be rebuilt after presenting.
    Acquired { index: u32, suboptimal: bool },
    /// The chain no longer matches the surface and must be rebuilt first.
    OutOfDate,
}

/// Result of handing an image to the presentation engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    /// True when the chain should be rebuilt.
    #[inline]
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Operations the swapchain manager sequences.
///
/// Methods are called from the frame thread only, and only in the orders
/// the manager's state machine allows:
///
/// - Build: `create_frame_slots` once, then `create_chain` and
///   `create_depth_buffer`
/// - Frame: `acquire`, `record_frame`, `end_recording`, `submit_frame`,
///   `present`
/// - Resize: `surface_extent`, then `wait_idle`, `destroy_views`,
///   `create_chain` and `create_depth_buffer` unless the surface has no area
/// - Shutdown: `wait_idle`, then `destroy`
pub trait PresentTarget {
    /// Blocks until every submission has completed.
    fn wait_idle(&mut self) -> RhiResult<()>;

    /// Creates the per-slot acquire synchronization for `slots` frames in
    /// flight.
    fn create_frame_slots(&mut self, slots: usize) -> RhiResult<()>;

    /// Extent a chain built now for a `width` x `height` request would get,
    /// or `None` while the surface has no drawable area.
    fn surface_extent(&mut self, width: u32, height: u32) -> RhiResult<Option<vk::Extent2D>>;

    /// Builds the image set at `width` x `height`, with one view, command
    /// buffer, fence and render-finished semaphore per image. A previous
    /// chain is retired only after its replacement exists.
    fn create_chain(&mut self, width: u32, height: u32) -> RhiResult<ChainInfo>;

    /// Destroys the views and per-image resources of the current chain.
    fn destroy_views(&mut self);

    /// Builds a depth buffer matching `extent`, replacing any previous one,
    /// and returns its format.
    fn create_depth_buffer(&mut self, extent: vk::Extent2D) -> RhiResult<vk::Format>;

    /// Requests the next image, signaling the acquire semaphore of `slot`.
    ///
    /// Returns [`vkframe_rhi::RhiError::Timeout`] if no image becomes
    /// available within `timeout_ns`.
    fn acquire(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<AcquireOutcome>;

    /// Replaces `slot`'s acquire semaphore, which was signaled by an acquire
    /// that no submission consumed. The device must be idle.
    fn discard_acquire(&mut self, slot: usize) -> RhiResult<()>;

    /// Waits for the previous submission of `image`'s command buffer, then
    /// resets and begins recording it according to `options`.
    fn record_frame(
        &mut self,
        image: u32,
        options: FrameOptions,
        timeout_ns: u64,
    ) -> RhiResult<()>;

    /// Closes whatever `record_frame` opened.
    fn end_recording(&mut self, image: u32, options: FrameOptions);

    /// Submits `image`'s command buffer. When `present` is set the
    /// submission waits on `slot`'s acquire semaphore and signals `image`'s
    /// render-finished semaphore. When `blocking` is set the call returns
    /// only after the GPU completed it.
    fn submit_frame(
        &mut self,
        image: u32,
        slot: usize,
        present: bool,
        blocking: bool,
        timeout_ns: u64,
    ) -> RhiResult<()>;

    /// Queues `image` for display.
    fn present(&mut self, image: u32) -> RhiResult<PresentOutcome>;

    /// Releases every object the target created. The device must be idle.
    fn destroy(&mut self);
}
