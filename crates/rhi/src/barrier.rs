//! Image layout transitions.
//!
//! # Overview
//!
//! A transition is a pure function of (old layout, new layout, aspect,
//! stages, subresource). The access masks come from [`access_mask_for`],
//! an exhaustive `match` over [`TrackedLayout`]: adding a layout does not
//! compile until the table says what it needs.
//!
//! Images remember the last layout issued for every (mip, layer) pair in a
//! [`LayoutTracker`] so callers only name the target layout.
//!
//! Mip generation follows [`mipmap_plan`]: each layer walks its mip chain
//! from 0 upward, blitting level `n - 1` into level `n`.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use vkframe_rhi::barrier::{transition_present_to_colour, transition_colour_to_present};
//! use vkframe_rhi::command::CommandBuffer;
//!
//! # fn example(cmd: &CommandBuffer, swap_image: vk::Image) {
//! transition_present_to_colour(cmd, swap_image);
//! // ... draw ...
//! transition_colour_to_present(cmd, swap_image);
//! # }
//! ```

use ash::vk;

use crate::command::CommandBuffer;

/// Image layouts the frame layer issues barriers for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TrackedLayout {
    Undefined,
    General,
    ColourAttachment,
    DepthStencilAttachment,
    DepthStencilReadOnly,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    Present,
}

impl TrackedLayout {
    /// Converts to the Vulkan layout.
    pub fn to_vk(self) -> vk::ImageLayout {
        match self {
            TrackedLayout::Undefined => vk::ImageLayout::UNDEFINED,
            TrackedLayout::General => vk::ImageLayout::GENERAL,
            TrackedLayout::ColourAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            TrackedLayout::DepthStencilAttachment => {
                vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
            }
            TrackedLayout::DepthStencilReadOnly => vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
            TrackedLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            TrackedLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            TrackedLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            TrackedLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Maps a Vulkan layout back, if it is one the tracker knows.
    pub fn from_vk(layout: vk::ImageLayout) -> Option<Self> {
        Some(match layout {
            vk::ImageLayout::UNDEFINED => TrackedLayout::Undefined,
            vk::ImageLayout::GENERAL => TrackedLayout::General,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => TrackedLayout::ColourAttachment,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
                TrackedLayout::DepthStencilAttachment
            }
            vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => TrackedLayout::DepthStencilReadOnly,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => TrackedLayout::ShaderReadOnly,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL => TrackedLayout::TransferSrc,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL => TrackedLayout::TransferDst,
            vk::ImageLayout::PRESENT_SRC_KHR => TrackedLayout::Present,
            _ => return None,
        })
    }
}

/// Access mask for memory operations performed in `layout`.
///
/// Used as the destination mask for the new layout and the source mask for
/// the old one. Present and undefined need no visibility.
pub fn access_mask_for(layout: TrackedLayout) -> vk::AccessFlags {
    match layout {
        TrackedLayout::Undefined | TrackedLayout::Present => vk::AccessFlags::empty(),
        TrackedLayout::General => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        TrackedLayout::ColourAttachment => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        TrackedLayout::DepthStencilAttachment => vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        TrackedLayout::DepthStencilReadOnly => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::SHADER_READ
        }
        TrackedLayout::ShaderReadOnly => {
            vk::AccessFlags::SHADER_READ | vk::AccessFlags::INPUT_ATTACHMENT_READ
        }
        TrackedLayout::TransferSrc => vk::AccessFlags::TRANSFER_READ,
        TrackedLayout::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
    }
}

/// Builds the barrier moving a subresource range between layouts.
pub fn layout_barrier(
    image: vk::Image,
    old: TrackedLayout,
    new: TrackedLayout,
    range: vk::ImageSubresourceRange,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(access_mask_for(old))
        .dst_access_mask(access_mask_for(new))
        .old_layout(old.to_vk())
        .new_layout(new.to_vk())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
}

/// Range covering a single mip level of a single layer.
#[inline]
pub fn single_subresource(
    aspect: vk::ImageAspectFlags,
    mip: u32,
    layer: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(mip)
        .level_count(1)
        .base_array_layer(layer)
        .layer_count(1)
}

/// Records a transition of one (mip, layer) subresource.
#[allow(clippy::too_many_arguments)]
pub fn image_transition_barrier(
    cmd: &CommandBuffer,
    image: vk::Image,
    old: TrackedLayout,
    new: TrackedLayout,
    aspect: vk::ImageAspectFlags,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
    mip: u32,
    layer: u32,
) {
    let barrier = layout_barrier(image, old, new, single_subresource(aspect, mip, layer));
    cmd.pipeline_barrier(src_stage, dst_stage, &[barrier]);
}

/// Records a transition of an arbitrary subresource range.
pub fn transition_range(
    cmd: &CommandBuffer,
    image: vk::Image,
    old: TrackedLayout,
    new: TrackedLayout,
    range: vk::ImageSubresourceRange,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
) {
    cmd.pipeline_barrier(src_stage, dst_stage, &[layout_barrier(image, old, new, range)]);
}

/// Swap image, freshly acquired, to colour attachment.
///
/// The previous contents are discarded.
pub fn transition_present_to_colour(cmd: &CommandBuffer, image: vk::Image) {
    image_transition_barrier(
        cmd,
        image,
        TrackedLayout::Undefined,
        TrackedLayout::ColourAttachment,
        vk::ImageAspectFlags::COLOR,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        0,
        0,
    );
}

/// Swap image, rendered, to presentable.
pub fn transition_colour_to_present(cmd: &CommandBuffer, image: vk::Image) {
    image_transition_barrier(
        cmd,
        image,
        TrackedLayout::ColourAttachment,
        TrackedLayout::Present,
        vk::ImageAspectFlags::COLOR,
        vk::PipelineStageFlags::ALL_COMMANDS,
        vk::PipelineStageFlags::BOTTOM_OF_PIPE,
        0,
        0,
    );
}

pub fn transition_colour_to_sampler(cmd: &CommandBuffer, image: vk::Image) {
    image_transition_barrier(
        cmd,
        image,
        TrackedLayout::ColourAttachment,
        TrackedLayout::ShaderReadOnly,
        vk::ImageAspectFlags::COLOR,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        0,
        0,
    );
}

pub fn transition_sampler_to_colour(cmd: &CommandBuffer, image: vk::Image) {
    image_transition_barrier(
        cmd,
        image,
        TrackedLayout::ShaderReadOnly,
        TrackedLayout::ColourAttachment,
        vk::ImageAspectFlags::COLOR,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        0,
        0,
    );
}

fn depth_aspect(with_stencil: bool) -> vk::ImageAspectFlags {
    if with_stencil {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

pub fn transition_depth_to_sampler(cmd: &CommandBuffer, image: vk::Image, with_stencil: bool) {
    image_transition_barrier(
        cmd,
        image,
        TrackedLayout::DepthStencilAttachment,
        TrackedLayout::DepthStencilReadOnly,
        depth_aspect(with_stencil),
        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        0,
        0,
    );
}

pub fn transition_sampler_to_depth(cmd: &CommandBuffer, image: vk::Image, with_stencil: bool) {
    image_transition_barrier(
        cmd,
        image,
        TrackedLayout::DepthStencilReadOnly,
        TrackedLayout::DepthStencilAttachment,
        depth_aspect(with_stencil),
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        0,
        0,
    );
}

// ===== Mip chains =====

/// Number of mip levels for a `width` x `height` image:
/// `floor(log2(min(width, height))) + 1`.
///
/// Zero-sized dimensions count as 1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let smallest = width.min(height).max(1);
    u32::BITS - smallest.leading_zeros()
}

/// Extent of one dimension at `level`: `max(dimension >> level, 1)`.
#[inline]
pub fn mip_extent(dimension: u32, level: u32) -> u32 {
    dimension.checked_shr(level).unwrap_or(0).max(1)
}

/// One step of mip generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MipOp {
    Transition {
        mip: u32,
        layer: u32,
        old: TrackedLayout,
        new: TrackedLayout,
    },
    Blit {
        layer: u32,
        src_mip: u32,
        dst_mip: u32,
    },
}

/// Steps that generate mips `1..mip_levels` for every layer.
///
/// Expects mip 0 of each layer in `TransferDst` (freshly uploaded) and the
/// remaining mips undefined. Leaves every mip of every layer in `end`.
pub fn mipmap_plan(mip_levels: u32, layers: u32, end: TrackedLayout) -> Vec<MipOp> {
    let mut ops = Vec::new();

    for layer in 0..layers {
        ops.push(MipOp::Transition {
            mip: 0,
            layer,
            old: TrackedLayout::TransferDst,
            new: TrackedLayout::TransferSrc,
        });

        for mip in 1..mip_levels {
            ops.push(MipOp::Transition {
                mip,
                layer,
                old: TrackedLayout::Undefined,
                new: TrackedLayout::TransferDst,
            });
            ops.push(MipOp::Blit {
                layer,
                src_mip: mip - 1,
                dst_mip: mip,
            });
            ops.push(MipOp::Transition {
                mip: mip - 1,
                layer,
                old: TrackedLayout::TransferSrc,
                new: end,
            });

            let is_last = mip + 1 == mip_levels;
            ops.push(MipOp::Transition {
                mip,
                layer,
                old: TrackedLayout::TransferDst,
                new: if is_last { end } else { TrackedLayout::TransferSrc },
            });
        }

        if mip_levels <= 1 {
            ops.push(MipOp::Transition {
                mip: 0,
                layer,
                old: TrackedLayout::TransferSrc,
                new: end,
            });
        }
    }

    ops
}

/// Records mip generation for a colour image.
///
/// `extent` is the size of mip 0. Every mip of every layer ends in `end`,
/// visible to `end_stage`.
#[allow(clippy::too_many_arguments)]
pub fn generate_mipmaps(
    cmd: &CommandBuffer,
    image: vk::Image,
    extent: vk::Extent2D,
    mip_levels: u32,
    layers: u32,
    end: TrackedLayout,
    end_stage: vk::PipelineStageFlags,
) {
    let aspect = vk::ImageAspectFlags::COLOR;

    for op in mipmap_plan(mip_levels, layers, end) {
        match op {
            MipOp::Transition {
                mip,
                layer,
                old,
                new,
            } => {
                let dst_stage = if new == end {
                    end_stage
                } else {
                    vk::PipelineStageFlags::TRANSFER
                };
                image_transition_barrier(
                    cmd,
                    image,
                    old,
                    new,
                    aspect,
                    vk::PipelineStageFlags::TRANSFER,
                    dst_stage,
                    mip,
                    layer,
                );
            }
            MipOp::Blit {
                layer,
                src_mip,
                dst_mip,
            } => {
                let blit = vk::ImageBlit::default()
                    .src_subresource(layer_subresource(src_mip, layer))
                    .src_offsets(mip_corners(extent, src_mip))
                    .dst_subresource(layer_subresource(dst_mip, layer))
                    .dst_offsets(mip_corners(extent, dst_mip));
                cmd.blit_image(
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                );
            }
        }
    }
}

fn layer_subresource(mip: u32, layer: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(mip)
        .base_array_layer(layer)
        .layer_count(1)
}

fn mip_corners(extent: vk::Extent2D, mip: u32) -> [vk::Offset3D; 2] {
    [
        vk::Offset3D::default(),
        vk::Offset3D {
            x: i32::try_from(mip_extent(extent.width, mip)).unwrap_or(i32::MAX),
            y: i32::try_from(mip_extent(extent.height, mip)).unwrap_or(i32::MAX),
            z: 1,
        },
    ]
}

// ===== Layout tracking =====

/// Last issued layout of every (mip, layer) subresource of an image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutTracker {
    mip_levels: u32,
    layers: u32,
    layouts: Vec<TrackedLayout>,
}

impl LayoutTracker {
    pub fn new(mip_levels: u32, layers: u32, initial: TrackedLayout) -> Self {
        let count = (mip_levels.max(1) * layers.max(1)) as usize;
        Self {
            mip_levels: mip_levels.max(1),
            layers: layers.max(1),
            layouts: vec![initial; count],
        }
    }

    #[inline]
    fn index(&self, mip: u32, layer: u32) -> usize {
        assert!(
            mip < self.mip_levels && layer < self.layers,
            "subresource (mip {mip}, layer {layer}) out of range"
        );
        (layer * self.mip_levels + mip) as usize
    }

    /// Layout last issued for one subresource.
    pub fn get(&self, mip: u32, layer: u32) -> TrackedLayout {
        self.layouts[self.index(mip, layer)]
    }

    /// Records a layout for one subresource.
    pub fn set(&mut self, mip: u32, layer: u32, layout: TrackedLayout) {
        let index = self.index(mip, layer);
        self.layouts[index] = layout;
    }

    /// Records a layout for every subresource.
    pub fn set_all(&mut self, layout: TrackedLayout) {
        self.layouts.fill(layout);
    }

    /// The shared layout, if every subresource is in the same one.
    pub fn uniform(&self) -> Option<TrackedLayout> {
        let first = *self.layouts.first()?;
        self.layouts.iter().all(|l| *l == first).then_some(first)
    }

    /// Replays a mip plan so the tracker matches what the GPU will see.
    pub fn apply(&mut self, ops: &[MipOp]) {
        for op in ops {
            if let MipOp::Transition { mip, layer, new, .. } = *op {
                self.set(mip, layer, new);
            }
        }
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    #[inline]
    pub fn layers(&self) -> u32 {
        self.layers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TrackedLayout; 9] = [
        TrackedLayout::Undefined,
        TrackedLayout::General,
        TrackedLayout::ColourAttachment,
        TrackedLayout::DepthStencilAttachment,
        TrackedLayout::DepthStencilReadOnly,
        TrackedLayout::ShaderReadOnly,
        TrackedLayout::TransferSrc,
        TrackedLayout::TransferDst,
        TrackedLayout::Present,
    ];

    #[test]
    fn test_access_table() {
        assert_eq!(
            access_mask_for(TrackedLayout::TransferDst),
            vk::AccessFlags::TRANSFER_WRITE
        );
        assert_eq!(
            access_mask_for(TrackedLayout::TransferSrc),
            vk::AccessFlags::TRANSFER_READ
        );
        assert_eq!(
            access_mask_for(TrackedLayout::ColourAttachment),
            vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        );
        assert_eq!(
            access_mask_for(TrackedLayout::DepthStencilAttachment),
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert!(
            access_mask_for(TrackedLayout::ShaderReadOnly).contains(vk::AccessFlags::SHADER_READ)
        );
        assert!(access_mask_for(TrackedLayout::Present).is_empty());
        assert!(access_mask_for(TrackedLayout::Undefined).is_empty());
    }

    #[test]
    fn test_layout_round_trip() {
        for layout in ALL {
            assert_eq!(TrackedLayout::from_vk(layout.to_vk()), Some(layout));
        }
        assert_eq!(TrackedLayout::from_vk(vk::ImageLayout::PREINITIALIZED), None);
    }

    #[test]
    fn test_barrier_masks_follow_layouts() {
        let barrier = layout_barrier(
            vk::Image::null(),
            TrackedLayout::TransferDst,
            TrackedLayout::ShaderReadOnly,
            single_subresource(vk::ImageAspectFlags::COLOR, 2, 4),
        );
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert!(barrier.dst_access_mask.contains(vk::AccessFlags::SHADER_READ));
        assert_eq!(barrier.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.subresource_range.base_mip_level, 2);
        assert_eq!(barrier.subresource_range.base_array_layer, 4);
        assert_eq!(barrier.subresource_range.level_count, 1);
        assert_eq!(barrier.subresource_range.layer_count, 1);
    }

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(800, 600), 10);
        assert_eq!(mip_level_count(1024, 3), 2);
        assert_eq!(mip_level_count(0, 64), 1);
    }

    #[test]
    fn test_mip_level_count_matches_log2() {
        for w in [1u32, 3, 17, 64, 100, 513, 4096] {
            for h in [1u32, 2, 31, 128, 999] {
                let expected = (f64::from(w.min(h))).log2().floor() as u32 + 1;
                assert_eq!(mip_level_count(w, h), expected, "{w}x{h}");
            }
        }
    }

    #[test]
    fn test_mip_extent_is_monotonic() {
        let (w, h) = (800u32, 600u32);
        let levels = mip_level_count(w, h);
        let mut previous = (u32::MAX, u32::MAX);
        for level in 0..levels {
            let extent = (mip_extent(w, level), mip_extent(h, level));
            assert_eq!(extent.0, (w >> level).max(1));
            assert_eq!(extent.1, (h >> level).max(1));
            assert!(extent.0 <= previous.0 && extent.1 <= previous.1);
            assert!(extent.0 >= 1 && extent.1 >= 1);
            previous = extent;
        }
        assert_eq!(mip_extent(5, 40), 1);
    }

    #[test]
    fn test_mipmap_plan_ends_in_target_layout() {
        let levels = 4;
        let layers = 6;
        let ops = mipmap_plan(levels, layers, TrackedLayout::ShaderReadOnly);

        let mut tracker = LayoutTracker::new(levels, layers, TrackedLayout::Undefined);
        for layer in 0..layers {
            tracker.set(0, layer, TrackedLayout::TransferDst);
        }

        for op in &ops {
            if let MipOp::Transition {
                mip,
                layer,
                old,
                new,
            } = *op
            {
                assert_eq!(tracker.get(mip, layer), old, "stale old layout at {op:?}");
                tracker.set(mip, layer, new);
            }
        }
        assert_eq!(tracker.uniform(), Some(TrackedLayout::ShaderReadOnly));
    }

    #[test]
    fn test_mipmap_plan_blits_every_level_per_layer() {
        let ops = mipmap_plan(5, 6, TrackedLayout::ShaderReadOnly);
        let blits: Vec<_> = ops
            .iter()
            .filter_map(|op| match op {
                MipOp::Blit {
                    layer,
                    src_mip,
                    dst_mip,
                } => Some((*layer, *src_mip, *dst_mip)),
                _ => None,
            })
            .collect();

        assert_eq!(blits.len(), 4 * 6);
        for (layer, src, dst) in blits {
            assert!(layer < 6);
            assert_eq!(dst, src + 1);
        }
    }

    #[test]
    fn test_mipmap_plan_single_level() {
        let ops = mipmap_plan(1, 1, TrackedLayout::ShaderReadOnly);
        assert!(!ops.iter().any(|op| matches!(op, MipOp::Blit { .. })));
        let mut tracker = LayoutTracker::new(1, 1, TrackedLayout::TransferDst);
        tracker.apply(&ops);
        assert_eq!(tracker.uniform(), Some(TrackedLayout::ShaderReadOnly));
    }

    #[test]
    fn test_tracker_uniform() {
        let mut tracker = LayoutTracker::new(3, 2, TrackedLayout::Undefined);
        assert_eq!(tracker.uniform(), Some(TrackedLayout::Undefined));
        tracker.set(2, 1, TrackedLayout::TransferDst);
        assert_eq!(tracker.uniform(), None);
        tracker.set_all(TrackedLayout::General);
        assert_eq!(tracker.uniform(), Some(TrackedLayout::General));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_tracker_rejects_out_of_range() {
        let tracker = LayoutTracker::new(2, 1, TrackedLayout::Undefined);
        tracker.get(2, 0);
    }
}
