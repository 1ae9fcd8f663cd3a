//! [`PresentTarget`] backed by a real Vulkan swapchain.
//!
//! # Overview
//!
//! Per swap image the target owns:
//! - A primary graphics command buffer
//! - A fence signaled when the image's last submission completes
//! - A render-finished semaphore that presentation waits on
//!
//! Per frame-in-flight slot it owns an acquire semaphore. Before a slot's
//! semaphore is signaled again, the fence of the image it last fed is
//! waited on.
//!
//! With the default [`FrameOptions`] each frame transitions the swap image
//! to colour-attachment layout and opens a dynamic rendering pass over it
//! and the depth buffer, clearing to the configured colour and depth 1.0,
//! with a Y-flipped viewport.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vkframe_rhi::barrier::{transition_colour_to_present, transition_present_to_colour};
use vkframe_rhi::command::{CommandBuffer, CommandPools, QueueKind, SemaphoreWait};
use vkframe_rhi::device::DeviceContext;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::rendering::{
    ColourAttachment, DEFAULT_CLEAR_COLOUR, DEFAULT_CLEAR_DEPTH, DepthAttachment, RenderingConfig,
};
use vkframe_rhi::swapchain::{Swapchain, SwapchainDesc, surface_extent};
use vkframe_rhi::sync::{Fence, Semaphore};
use vkframe_rhi::{RhiError, RhiResult};

use crate::depth_buffer::DepthBuffer;
use crate::frame::FrameOptions;
use crate::target::{AcquireOutcome, ChainInfo, PresentOutcome, PresentTarget};

/// Viewport covering `extent` with +Y pointing up.
pub fn flipped_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: extent.height as f32,
        width: extent.width as f32,
        height: -(extent.height as f32),
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Resources owned by one swap image.
struct ImageResources {
    command_buffer: CommandBuffer,
    fence: Fence,
    render_finished: Semaphore,
}

/// Construction parameters for [`VulkanTarget`].
#[derive(Clone, Copy, Debug)]
pub struct TargetDesc {
    pub vsync: bool,
    /// Require a stencil component in the depth buffer.
    pub with_stencil: bool,
    pub clear_colour: [f32; 4],
}

impl Default for TargetDesc {
    fn default() -> Self {
        Self {
            vsync: false,
            with_stencil: false,
            clear_colour: DEFAULT_CLEAR_COLOUR,
        }
    }
}

/// Swapchain, depth buffer and per-frame synchronization for one surface.
///
/// The surface must outlive the target.
pub struct VulkanTarget {
    instance: Arc<Instance>,
    device: Arc<DeviceContext>,
    pools: Arc<CommandPools>,
    surface: vk::SurfaceKHR,
    desc: TargetDesc,
    swapchain: Option<Swapchain>,
    images: Vec<ImageResources>,
    acquire_semaphores: Vec<Semaphore>,
    /// Image whose submission last waited on each slot's acquire semaphore.
    slot_images: Vec<Option<u32>>,
    depth: Option<DepthBuffer>,
}

impl VulkanTarget {
    pub fn new(
        instance: Arc<Instance>,
        device: Arc<DeviceContext>,
        pools: Arc<CommandPools>,
        surface: vk::SurfaceKHR,
        desc: TargetDesc,
    ) -> Self {
        Self {
            instance,
            device,
            pools,
            surface,
            desc,
            swapchain: None,
            images: Vec::new(),
            acquire_semaphores: Vec::new(),
            slot_images: Vec::new(),
            depth: None,
        }
    }

    /// Command buffer recording for swap image `image`.
    ///
    /// # Panics
    ///
    /// Panics if `image` is not an index of the current chain.
    #[inline]
    pub fn command_buffer(&self, image: u32) -> &CommandBuffer {
        &self.images[image as usize].command_buffer
    }

    #[inline]
    pub fn swapchain(&self) -> Option<&Swapchain> {
        self.swapchain.as_ref()
    }

    #[inline]
    pub fn depth_buffer(&self) -> Option<&DepthBuffer> {
        self.depth.as_ref()
    }

    #[inline]
    pub fn device(&self) -> &Arc<DeviceContext> {
        &self.device
    }

    fn chain(&self) -> RhiResult<&Swapchain> {
        self.swapchain
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("no swapchain has been created".to_string()))
    }

    fn begin_rendering(&self, cmd: &CommandBuffer, image: u32) -> RhiResult<()> {
        let swapchain = self.chain()?;
        let depth = self
            .depth
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("no depth buffer".to_string()))?;
        let extent = swapchain.extent();

        let colour = ColourAttachment::new(swapchain.image_view(image as usize))
            .with_clear_colour(self.desc.clear_colour);
        let mut depth_attachment = DepthAttachment::new(depth.view())
            .with_clear_depth_stencil(DEFAULT_CLEAR_DEPTH, 0);
        depth_attachment = if depth.has_stencil() {
            depth_attachment.with_stencil()
        } else {
            depth_attachment.with_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        };

        let bundle = RenderingConfig::from_extent(extent)
            .with_colour_attachment(colour)
            .with_depth_attachment(depth_attachment)
            .build();
        cmd.begin_rendering(&bundle.info());

        cmd.set_viewport(&flipped_viewport(extent));
        cmd.set_scissor(&vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        });
        Ok(())
    }
}

impl PresentTarget for VulkanTarget {
    fn wait_idle(&mut self) -> RhiResult<()> {
        self.device.wait_idle()
    }

    fn create_frame_slots(&mut self, slots: usize) -> RhiResult<()> {
        self.acquire_semaphores = (0..slots)
            .map(|i| Semaphore::new(self.device.clone(), &format!("acquire semaphore {i}")))
            .collect::<RhiResult<_>>()?;
        self.slot_images = vec![None; slots];
        Ok(())
    }

    fn surface_extent(&mut self, width: u32, height: u32) -> RhiResult<Option<vk::Extent2D>> {
        surface_extent(&self.instance, &self.device, self.surface, width, height)
    }

    fn create_chain(&mut self, width: u32, height: u32) -> RhiResult<ChainInfo> {
        match self.swapchain.as_mut() {
            Some(swapchain) => swapchain.recreate(&self.instance, self.surface, width, height)?,
            None => {
                let desc = SwapchainDesc {
                    width,
                    height,
                    vsync: self.desc.vsync,
                };
                self.swapchain = Some(Swapchain::new(
                    &self.instance,
                    self.device.clone(),
                    self.surface,
                    desc,
                )?);
            }
        }

        let swapchain = self.chain()?;
        let info = ChainInfo {
            image_count: swapchain.image_count(),
            extent: swapchain.extent(),
            colour_format: swapchain.format(),
        };

        let pool = self.pools.pool(QueueKind::Graphics);
        let command_buffers = pool.allocate_command_buffers(info.image_count)?;
        let handles: Vec<vk::CommandBuffer> = command_buffers.iter().map(|c| c.handle()).collect();

        let device = &self.device;
        let images = command_buffers
            .into_iter()
            .enumerate()
            .map(|(i, command_buffer)| {
                let name = format!("frame command buffer {i}");
                device.set_debug_name(command_buffer.handle(), &name);
                Ok(ImageResources {
                    command_buffer,
                    // Signaled so the first wait on each image returns at once.
                    fence: Fence::new(device.clone(), true, &format!("frame fence {i}"))?,
                    render_finished: Semaphore::new(
                        device.clone(),
                        &format!("render finished {i}"),
                    )?,
                })
            })
            .collect::<RhiResult<Vec<_>>>();
        let images = match images {
            Ok(images) => images,
            Err(e) => {
                pool.free_command_buffers(&handles);
                return Err(e);
            }
        };
        self.images = images;
        self.slot_images.fill(None);

        debug!("Frame resources ready for {} swap images", info.image_count);
        Ok(info)
    }

    fn destroy_views(&mut self) {
        let handles: Vec<vk::CommandBuffer> = self
            .images
            .iter()
            .map(|r| r.command_buffer.handle())
            .collect();
        if !handles.is_empty() {
            self.pools
                .pool(QueueKind::Graphics)
                .free_command_buffers(&handles);
        }
        self.images.clear();
        self.slot_images.fill(None);

        if let Some(swapchain) = self.swapchain.as_mut() {
            swapchain.destroy_image_views();
        }
    }

    fn create_depth_buffer(&mut self, extent: vk::Extent2D) -> RhiResult<vk::Format> {
        let depth = DepthBuffer::new(&self.device, &self.pools, extent, self.desc.with_stencil)?;
        let format = depth.format();
        self.depth = Some(depth);
        Ok(format)
    }

    fn acquire(&mut self, slot: usize, timeout_ns: u64) -> RhiResult<AcquireOutcome> {
        if let Some(previous) = self.slot_images[slot] {
            self.images[previous as usize].fence.wait(timeout_ns)?;
        }

        let semaphore = self.acquire_semaphores[slot].handle();
        match self.chain()?.acquire(semaphore, timeout_ns) {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(RhiError::SurfaceOutOfDate) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e),
        }
    }

    fn discard_acquire(&mut self, slot: usize) -> RhiResult<()> {
        let replacement =
            Semaphore::new(self.device.clone(), &format!("acquire semaphore {slot}"))?;
        self.acquire_semaphores[slot] = replacement;
        self.slot_images[slot] = None;
        debug!("Replaced acquire semaphore of slot {}", slot);
        Ok(())
    }

    fn record_frame(
        &mut self,
        image: u32,
        options: FrameOptions,
        timeout_ns: u64,
    ) -> RhiResult<()> {
        let resources = &self.images[image as usize];
        resources.fence.wait(timeout_ns)?;

        let cmd = &resources.command_buffer;
        cmd.reset()?;
        cmd.begin()?;

        if options.auto_transition_frame_buffer {
            transition_present_to_colour(cmd, self.chain()?.image(image as usize));
        }
        if options.auto_begin_dynamic_rendering {
            self.begin_rendering(cmd, image)?;
        }
        Ok(())
    }

    fn end_recording(&mut self, image: u32, options: FrameOptions) {
        let cmd = &self.images[image as usize].command_buffer;

        if options.auto_begin_dynamic_rendering {
            cmd.end_rendering();
        }
        if options.auto_transition_frame_buffer
            && let Some(swapchain) = self.swapchain.as_ref()
        {
            transition_colour_to_present(cmd, swapchain.image(image as usize));
        }
    }

    fn submit_frame(
        &mut self,
        image: u32,
        slot: usize,
        present: bool,
        blocking: bool,
        timeout_ns: u64,
    ) -> RhiResult<()> {
        let resources = &self.images[image as usize];
        resources.fence.reset()?;

        let waits = [SemaphoreWait {
            semaphore: self.acquire_semaphores[slot].handle(),
            stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        }];
        let signals = [resources.render_finished.handle()];
        let (waits, signals): (&[SemaphoreWait], &[vk::Semaphore]) = if present {
            (&waits, &signals)
        } else {
            (&[], &[])
        };

        self.pools.submit(
            QueueKind::Graphics,
            &resources.command_buffer,
            waits,
            signals,
            resources.fence.handle(),
        )?;

        if present {
            self.slot_images[slot] = Some(image);
        }
        if blocking {
            resources.fence.wait(timeout_ns)?;
        }
        Ok(())
    }

    fn present(&mut self, image: u32) -> RhiResult<PresentOutcome> {
        let wait = self.images[image as usize].render_finished.handle();
        match self
            .chain()?
            .present(self.device.present_queue(), image, wait)
        {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(RhiError::SurfaceOutOfDate) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e),
        }
    }

    fn destroy(&mut self) {
        self.destroy_views();
        self.depth = None;
        self.swapchain = None;
        self.acquire_semaphores.clear();
        self.slot_images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flipped_viewport() {
        let viewport = flipped_viewport(vk::Extent2D {
            width: 800,
            height: 600,
        });
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 600.0);
        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, -600.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_default_desc_uses_default_clear_colour() {
        let desc = TargetDesc::default();
        assert_eq!(desc.clear_colour, [0.2, 0.2, 0.2, 1.0]);
        assert!(!desc.vsync);
        assert!(!desc.with_stencil);
    }
}
