//! Dynamic rendering attachments (Vulkan 1.3).
//!
//! Frames render without `VkRenderPass` objects: a [`RenderingConfig`]
//! names the colour and depth attachments for one pass, and
//! [`RenderingInfoBundle`] keeps the attachment infos alive for as long as
//! the `VkRenderingInfo` that points at them.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use vkframe_rhi::rendering::{ColourAttachment, DepthAttachment, RenderingConfig};
//! use vkframe_rhi::command::CommandBuffer;
//!
//! # fn example(swap_view: vk::ImageView, depth_view: vk::ImageView, cmd: &CommandBuffer) {
//! let config = RenderingConfig::new(800, 600)
//!     .with_colour_attachment(ColourAttachment::new(swap_view))
//!     .with_depth_attachment(DepthAttachment::new(depth_view));
//!
//! let bundle = config.build();
//! cmd.begin_rendering(&bundle.info());
//! // ... draw commands ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// Clear colour used when none is configured.
pub const DEFAULT_CLEAR_COLOUR: [f32; 4] = [0.2, 0.2, 0.2, 1.0];

/// Depth value a cleared depth attachment starts from.
pub const DEFAULT_CLEAR_DEPTH: f32 = 1.0;

/// A colour attachment.
///
/// Defaults: `COLOR_ATTACHMENT_OPTIMAL`, clear to [`DEFAULT_CLEAR_COLOUR`],
/// store.
#[derive(Clone, Copy)]
pub struct ColourAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: vk::ClearColorValue,
    /// Resolve target for multisampled rendering; null when unused.
    pub resolve_image_view: vk::ImageView,
    pub resolve_mode: vk::ResolveModeFlags,
}

impl ColourAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearColorValue {
                float32: DEFAULT_CLEAR_COLOUR,
            },
            resolve_image_view: vk::ImageView::null(),
            resolve_mode: vk::ResolveModeFlags::NONE,
        }
    }

    #[inline]
    pub fn with_clear_colour(mut self, colour: [f32; 4]) -> Self {
        self.clear_value = vk::ClearColorValue { float32: colour };
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self
    }

    /// Keeps the previous contents instead of clearing.
    #[inline]
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    #[inline]
    pub fn dont_store(mut self) -> Self {
        self.store_op = vk::AttachmentStoreOp::DONT_CARE;
        self
    }

    #[inline]
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Resolves into `view` at the end of the pass.
    #[inline]
    pub fn with_resolve(mut self, view: vk::ImageView, mode: vk::ResolveModeFlags) -> Self {
        self.resolve_image_view = view;
        self.resolve_mode = mode;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let info = vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: self.clear_value,
            });

        if self.resolve_image_view == vk::ImageView::null() {
            return info;
        }
        info.resolve_image_view(self.resolve_image_view)
            .resolve_image_layout(self.layout)
            .resolve_mode(self.resolve_mode)
    }
}

impl std::fmt::Debug for ColourAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Float clears are the only kind this module writes.
        let clear = unsafe { self.clear_value.float32 };
        f.debug_struct("ColourAttachment")
            .field("image_view", &self.image_view)
            .field("layout", &self.layout)
            .field("load_op", &self.load_op)
            .field("store_op", &self.store_op)
            .field("clear_value", &clear)
            .field("resolve_image_view", &self.resolve_image_view)
            .finish()
    }
}

/// A depth (and optionally stencil) attachment.
///
/// Defaults: `DEPTH_ATTACHMENT_OPTIMAL`, clear to [`DEFAULT_CLEAR_DEPTH`],
/// contents discarded after the pass.
#[derive(Clone, Copy, Debug)]
pub struct DepthAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: vk::ClearDepthStencilValue,
    /// Also bind the view as the stencil attachment.
    pub has_stencil: bool,
}

impl DepthAttachment {
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_value: vk::ClearDepthStencilValue {
                depth: DEFAULT_CLEAR_DEPTH,
                stencil: 0,
            },
            has_stencil: false,
        }
    }

    /// A combined depth/stencil attachment for formats with a stencil aspect.
    #[inline]
    pub fn with_stencil(mut self) -> Self {
        self.has_stencil = true;
        self.layout = vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL;
        self
    }

    #[inline]
    pub fn with_clear_depth_stencil(mut self, depth: f32, stencil: u32) -> Self {
        self.clear_value = vk::ClearDepthStencilValue { depth, stencil };
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self
    }

    #[inline]
    pub fn load(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::LOAD;
        self
    }

    #[inline]
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Keeps the depth contents for later passes.
    #[inline]
    pub fn store(mut self) -> Self {
        self.store_op = vk::AttachmentStoreOp::STORE;
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                depth_stencil: self.clear_value,
            })
    }
}

/// Attachments and render area of one dynamic rendering pass.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    pub colour_attachments: Vec<ColourAttachment>,
    pub depth_attachment: Option<DepthAttachment>,
    pub render_area: vk::Rect2D,
    pub layer_count: u32,
    pub flags: vk::RenderingFlags,
}

impl RenderingConfig {
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            colour_attachments: Vec::new(),
            depth_attachment: None,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width, height },
            },
            layer_count: 1,
            flags: vk::RenderingFlags::empty(),
        }
    }

    #[inline]
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self::new(extent.width, extent.height)
    }

    #[inline]
    pub fn with_colour_attachment(mut self, attachment: ColourAttachment) -> Self {
        self.colour_attachments.push(attachment);
        self
    }

    #[inline]
    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    #[inline]
    pub fn with_layer_count(mut self, count: u32) -> Self {
        self.layer_count = count;
        self
    }

    #[inline]
    pub fn with_flags(mut self, flags: vk::RenderingFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle::new(self)
    }
}

/// Owns the attachment infos a `VkRenderingInfo` points at.
pub struct RenderingInfoBundle {
    colour_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    stencil_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
    layer_count: u32,
    flags: vk::RenderingFlags,
}

impl RenderingInfoBundle {
    pub fn new(config: &RenderingConfig) -> Self {
        let colour_attachments = config
            .colour_attachments
            .iter()
            .map(ColourAttachment::to_rendering_attachment_info)
            .collect();

        let depth_attachment = config
            .depth_attachment
            .as_ref()
            .map(DepthAttachment::to_rendering_attachment_info);
        let stencil_attachment = config
            .depth_attachment
            .as_ref()
            .filter(|d| d.has_stencil)
            .map(DepthAttachment::to_rendering_attachment_info);

        Self {
            colour_attachments,
            depth_attachment,
            stencil_attachment,
            render_area: config.render_area,
            layer_count: config.layer_count,
            flags: config.flags,
        }
    }

    /// The rendering info, valid while this bundle lives.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(self.layer_count)
            .flags(self.flags)
            .color_attachments(&self.colour_attachments);

        if let Some(depth) = &self.depth_attachment {
            info = info.depth_attachment(depth);
        }
        if let Some(stencil) = &self.stencil_attachment {
            info = info.stencil_attachment(stencil);
        }

        info
    }

    #[inline]
    pub fn colour_attachments(&self) -> &[vk::RenderingAttachmentInfo<'static>] {
        &self.colour_attachments
    }

    #[inline]
    pub fn depth_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.depth_attachment.as_ref()
    }

    #[inline]
    pub fn stencil_attachment(&self) -> Option<&vk::RenderingAttachmentInfo<'static>> {
        self.stencil_attachment.as_ref()
    }

    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_colour_attachment_defaults() {
        let attachment = ColourAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        let clear = unsafe { attachment.clear_value.float32 };
        assert_eq!(clear, [0.2, 0.2, 0.2, 1.0]);
    }

    #[test]
    fn test_colour_attachment_builder() {
        let attachment = ColourAttachment::new(vk::ImageView::null())
            .load()
            .with_clear_colour([1.0, 0.0, 0.0, 1.0])
            .dont_store();

        // Setting a clear colour switches back to clearing.
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
        let info = attachment.to_rendering_attachment_info();
        assert_eq!(unsafe { info.clear_value.color.float32 }, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(info.resolve_mode, vk::ResolveModeFlags::NONE);
    }

    #[test]
    fn test_depth_attachment_defaults() {
        let attachment = DepthAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.clear_value.depth, 1.0);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert!(!attachment.has_stencil);
    }

    #[test]
    fn test_colour_depth_pair_bundle() {
        let config = RenderingConfig::new(800, 600)
            .with_colour_attachment(ColourAttachment::new(vk::ImageView::null()))
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()));

        let bundle = config.build();
        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 1);
        assert!(!info.p_depth_attachment.is_null());
        assert!(info.p_stencil_attachment.is_null());
        assert_eq!(info.render_area.extent.width, 800);
        assert_eq!(info.layer_count, 1);
    }

    #[test]
    fn test_stencil_shares_depth_view() {
        let config = RenderingConfig::new(64, 64)
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()).with_stencil());

        let bundle = config.build();
        let stencil = bundle.stencil_attachment().map(|s| s.image_layout);
        assert_eq!(stencil, Some(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL));
        assert!(bundle.colour_attachments().is_empty());
    }
}
