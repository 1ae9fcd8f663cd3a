//! Depth buffer matching the swap images.
//!
//! # Overview
//!
//! [`DepthBuffer`] picks the first depth format the device supports for
//! optimal-tiling attachments, creates a GPU-only image at the swapchain
//! extent and leaves it in depth-attachment layout. It is rebuilt with every
//! swapchain rebuild.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkframe_rhi::command::CommandPools;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_renderer::depth_buffer::DepthBuffer;
//!
//! # fn example(device: Arc<DeviceContext>, pools: &CommandPools) -> Result<(), vkframe_rhi::RhiError> {
//! let extent = vk::Extent2D { width: 1920, height: 1080 };
//! let depth = DepthBuffer::new(&device, pools, extent, false)?;
//!
//! let view = depth.view();
//! let format = depth.format();
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vkframe_rhi::barrier::TrackedLayout;
use vkframe_rhi::command::CommandPools;
use vkframe_rhi::device::DeviceContext;
use vkframe_rhi::image::{Image, ImageBuilder, aspect_for_format};
use vkframe_rhi::{RhiError, RhiResult};

/// Depth (and optionally stencil) attachment for the frame.
///
/// The image, its memory and its view are released on drop. The caller
/// guarantees the GPU no longer uses it.
pub struct DepthBuffer {
    image: Image,
    has_stencil: bool,
}

impl DepthBuffer {
    /// Creates a depth buffer of `extent`.
    ///
    /// # Arguments
    ///
    /// * `device` - Logical device used to pick the format and allocate
    /// * `pools` - Pools for the initial layout transition
    /// * `extent` - Size in pixels, normally the swapchain extent
    /// * `with_stencil` - Require a stencil component
    ///
    /// # Errors
    ///
    /// - [`RhiError::SwapchainError`] for a zero extent
    /// - [`RhiError::ResourceCreation`] if no depth format is supported or
    ///   the image cannot be created
    pub fn new(
        device: &Arc<DeviceContext>,
        pools: &CommandPools,
        extent: vk::Extent2D,
        with_stencil: bool,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "depth buffer needs a non-zero extent, got {}x{}",
                extent.width, extent.height
            )));
        }

        let format = device.find_depth_format(with_stencil)?;
        let image = ImageBuilder::new(extent.width, extent.height, "depth buffer")
            .with_format(format)
            .with_usages(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .with_layout(TrackedLayout::DepthStencilAttachment)
            .build(device, pools)?;

        debug!(
            "Created depth buffer: {}x{}, {:?}",
            extent.width, extent.height, format
        );

        Ok(Self {
            image,
            has_stencil: format_has_stencil(format),
        })
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image.handle()
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.image.format()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    /// True when the chosen format carries a stencil component.
    #[inline]
    pub fn has_stencil(&self) -> bool {
        self.has_stencil
    }
}

/// True if `format` has a stencil aspect.
pub fn format_has_stencil(format: vk::Format) -> bool {
    aspect_for_format(format).contains(vk::ImageAspectFlags::STENCIL)
}
