//! GPU images and their builder.
//!
//! # Overview
//!
//! [`ImageBuilder`] accumulates format, usage, mip and layer configuration
//! and creates the image, its memory and a default view in one call.
//! [`Image`] owns all three and remembers the last layout issued for each
//! subresource, so transitions only name the target layout.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkframe_rhi::barrier::TrackedLayout;
//! use vkframe_rhi::command::CommandPools;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::image::ImageBuilder;
//!
//! # fn example(device: Arc<DeviceContext>, pools: &CommandPools) -> Result<(), vkframe_rhi::RhiError> {
//! let target = ImageBuilder::new(1024, 1024, "offscreen colour")
//!     .with_format(vk::Format::R16G16B16A16_SFLOAT)
//!     .with_usages(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED)
//!     .with_layout(TrackedLayout::ShaderReadOnly)
//!     .build(&device, pools)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::allocator::MemoryFlags;
use crate::barrier::{LayoutTracker, TrackedLayout, layout_barrier, mip_level_count};
use crate::command::{CommandBuffer, CommandPools, QueueKind};
use crate::device::DeviceContext;
use crate::error::{RhiError, RhiResult};

/// Aspect mask implied by a format.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Accumulates image creation state.
#[derive(Clone, Debug)]
pub struct ImageBuilder {
    name: String,
    width: u32,
    height: u32,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    aspect: Option<vk::ImageAspectFlags>,
    mip_levels: u32,
    layers: u32,
    cubemap: bool,
    layout: TrackedLayout,
    flags: MemoryFlags,
    built: bool,
}

impl ImageBuilder {
    pub fn new(width: u32, height: u32, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::empty(),
            aspect: None,
            mip_levels: 1,
            layers: 1,
            cubemap: false,
            layout: TrackedLayout::Undefined,
            flags: MemoryFlags::default(),
            built: false,
        }
    }

    pub fn with_format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    /// Adds usage flags.
    pub fn with_usages(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    /// Overrides the aspect derived from the format.
    pub fn with_aspects(mut self, aspect: vk::ImageAspectFlags) -> Self {
        self.aspect = Some(aspect);
        self
    }

    pub fn with_mips(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels.max(1);
        self
    }

    /// Allocates the full chain down to 1x1 along the smaller dimension.
    pub fn with_full_mip_chain(mut self) -> Self {
        self.mip_levels = mip_level_count(self.width, self.height);
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.layers = layers.max(1);
        self
    }

    /// Six layers, cube-compatible, viewed as a cube.
    pub fn as_cubemap(mut self) -> Self {
        self.cubemap = true;
        self.layers = 6;
        self
    }

    /// Layout the image is left in after `build`.
    pub fn with_layout(mut self, layout: TrackedLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_unique_allocation(mut self) -> Self {
        self.flags.dedicated = true;
        self
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn layers(&self) -> u32 {
        self.layers
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// The aspect used for the default view and transitions.
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect.unwrap_or_else(|| aspect_for_format(self.format))
    }

    pub fn reset(&mut self) {
        self.built = false;
    }

    fn view_type(&self) -> vk::ImageViewType {
        match (self.cubemap, self.layers) {
            (true, _) => vk::ImageViewType::CUBE,
            (false, 1) => vk::ImageViewType::TYPE_2D,
            (false, _) => vk::ImageViewType::TYPE_2D_ARRAY,
        }
    }

    /// Creates the image, its memory and default view.
    ///
    /// When the requested layout is not `Undefined`, the image is moved into
    /// it with a one-shot graphics submission.
    ///
    /// # Panics
    ///
    /// Panics on a zero extent, empty usage, or a second build.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] or [`RhiError::AllocatorError`]
    /// if the device rejects the image or memory is exhausted.
    pub fn build(&mut self, device: &Arc<DeviceContext>, pools: &CommandPools) -> RhiResult<Image> {
        let image = self.build_undefined(device)?;
        if self.layout == TrackedLayout::Undefined {
            return Ok(image);
        }

        // Kept alive by the pools if the transition outlasts the wait.
        let target = self.layout;
        pools.submit_one_shot_keeping(QueueKind::Graphics, &self.name, image, |cmd, image| {
            image.transition(
                cmd,
                target,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::ALL_COMMANDS,
            );
        })
    }

    /// Creates the image in `Undefined` layout without touching a queue.
    ///
    /// # Panics
    ///
    /// Same as [`ImageBuilder::build`].
    ///
    /// # Errors
    ///
    /// Same as [`ImageBuilder::build`].
    pub fn build_undefined(&mut self, device: &Arc<DeviceContext>) -> RhiResult<Image> {
        assert!(
            !self.built,
            "image builder '{}' was already built; call reset() first",
            self.name
        );
        assert!(
            self.width > 0 && self.height > 0,
            "image '{}' has zero extent",
            self.name
        );
        assert!(!self.usage.is_empty(), "image '{}' has no usage flags", self.name);
        self.built = true;

        let create_flags = if self.cubemap {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let create_info = vk::ImageCreateInfo::default()
            .flags(create_flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(self.format)
            .extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            })
            .mip_levels(self.mip_levels)
            .array_layers(self.layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let (image, allocation) = device.allocator().allocate_image(
            &create_info,
            &self.name,
            MemoryLocation::GpuOnly,
            self.flags,
        )?;

        let aspect = self.aspect();
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(self.view_type())
            .format(self.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(self.mip_levels)
                    .base_array_layer(0)
                    .layer_count(self.layers),
            );

        let view = match unsafe { device.handle().create_image_view(&view_info, None) } {
            Ok(view) => view,
            Err(e) => {
                device.allocator().free(allocation);
                unsafe { device.handle().destroy_image(image, None) };
                return Err(RhiError::creation("image view", e));
            }
        };

        device.set_debug_name(image, &self.name);
        device.set_debug_name(view, &self.name);

        Ok(Image {
            device: device.clone(),
            image,
            view,
            allocation: Some(allocation),
            format: self.format,
            extent: vk::Extent2D {
                width: self.width,
                height: self.height,
            },
            aspect,
            usage: self.usage,
            tracker: LayoutTracker::new(self.mip_levels, self.layers, TrackedLayout::Undefined),
            name: self.name.clone(),
        })
    }
}

/// GPU image with memory, default view and layout tracking.
pub struct Image {
    device: Arc<DeviceContext>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    aspect: vk::ImageAspectFlags,
    usage: vk::ImageUsageFlags,
    tracker: LayoutTracker,
    name: String,
}

impl Image {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Default view over every mip and layer.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.tracker.mip_levels()
    }

    #[inline]
    pub fn layers(&self) -> u32 {
        self.tracker.layers()
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last layout issued for a subresource.
    #[inline]
    pub fn layout(&self, mip: u32, layer: u32) -> TrackedLayout {
        self.tracker.get(mip, layer)
    }

    /// Layout tracking state, for callers recording their own barriers.
    #[inline]
    pub fn tracker_mut(&mut self) -> &mut LayoutTracker {
        &mut self.tracker
    }

    /// Records a transition of every subresource into `new`.
    ///
    /// Subresources already in `new` are skipped. A uniform image is moved
    /// with a single barrier.
    pub fn transition(
        &mut self,
        cmd: &CommandBuffer,
        new: TrackedLayout,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    ) {
        let barriers: Vec<vk::ImageMemoryBarrier<'static>> = match self.tracker.uniform() {
            Some(old) if old == new => Vec::new(),
            Some(old) => vec![layout_barrier(
                self.image,
                old,
                new,
                vk::ImageSubresourceRange::default()
                    .aspect_mask(self.aspect)
                    .base_mip_level(0)
                    .level_count(self.mip_levels())
                    .base_array_layer(0)
                    .layer_count(self.layers()),
            )],
            None => {
                let mut barriers = Vec::new();
                for layer in 0..self.layers() {
                    for mip in 0..self.mip_levels() {
                        let old = self.tracker.get(mip, layer);
                        if old != new {
                            barriers.push(layout_barrier(
                                self.image,
                                old,
                                new,
                                crate::barrier::single_subresource(self.aspect, mip, layer),
                            ));
                        }
                    }
                }
                barriers
            }
        };

        if !barriers.is_empty() {
            cmd.pipeline_barrier(src_stage, dst_stage, &barriers);
        }
        self.tracker.set_all(new);
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
        if let Some(allocation) = self.allocation.take() {
            self.device.allocator().free(allocation);
        }
        unsafe {
            self.device.handle().destroy_image(self.image, None);
        }
        debug!("Destroyed image '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_accumulates() {
        let builder = ImageBuilder::new(64, 64, "usage")
            .with_usages(vk::ImageUsageFlags::SAMPLED)
            .with_usages(vk::ImageUsageFlags::TRANSFER_DST);
        assert_eq!(
            builder.usage(),
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
        );
    }

    #[test]
    fn test_full_mip_chain() {
        let builder = ImageBuilder::new(512, 128, "mips").with_full_mip_chain();
        assert_eq!(builder.mip_levels(), 8);
    }

    #[test]
    fn test_cubemap_has_six_layers() {
        let builder = ImageBuilder::new(64, 64, "sky").as_cubemap();
        assert_eq!(builder.layers(), 6);
        assert_eq!(builder.view_type(), vk::ImageViewType::CUBE);
    }

    #[test]
    fn test_view_type_for_arrays() {
        assert_eq!(
            ImageBuilder::new(4, 4, "a").view_type(),
            vk::ImageViewType::TYPE_2D
        );
        assert_eq!(
            ImageBuilder::new(4, 4, "b").with_layers(3).view_type(),
            vk::ImageViewType::TYPE_2D_ARRAY
        );
    }

    #[test]
    fn test_aspect_from_format() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for_format(vk::Format::B8G8R8A8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
        let builder = ImageBuilder::new(4, 4, "override")
            .with_format(vk::Format::D24_UNORM_S8_UINT)
            .with_aspects(vk::ImageAspectFlags::DEPTH);
        assert_eq!(builder.aspect(), vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_image_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Image>();
    }
}
