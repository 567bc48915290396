//! Dynamic rendering attachment configuration (Vulkan 1.3).
//!
//! Builds `VkRenderingInfo` without VkRenderPass objects. The lifetime wrinkle
//! is that `VkRenderingInfo` borrows its attachment-info arrays, so
//! [`RenderingConfig::build`] produces a [`RenderingInfoBundle`] that owns the
//! arrays and hands out the info referencing them.
//!
//! ```no_run
//! use ash::vk;
//! use orrery_rhi::command::CommandBuffer;
//! use orrery_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
//!
//! # fn example(color_view: vk::ImageView, depth_view: vk::ImageView, cmd: &CommandBuffer) {
//! let config = RenderingConfig::new(1280, 720)
//!     .with_color_attachment(ColorAttachment::new(color_view).with_clear_color([0.01, 0.01, 0.01, 1.0]))
//!     .with_depth_attachment(DepthAttachment::new(depth_view).with_clear_depth(1.0));
//!
//! let bundle = config.build();
//! cmd.begin_rendering(&bundle.info());
//! // ... draw ...
//! cmd.end_rendering();
//! # }
//! ```

use ash::vk;

/// Configuration for a color attachment.
#[derive(Clone)]
pub struct ColorAttachment {
    /// The image view to render to.
    pub image_view: vk::ImageView,
    /// The image layout during rendering.
    pub layout: vk::ImageLayout,
    /// How to initialize attachment contents.
    pub load_op: vk::AttachmentLoadOp,
    /// How to handle attachment contents after rendering.
    pub store_op: vk::AttachmentStoreOp,
    /// Clear value when load_op is CLEAR.
    pub clear_value: vk::ClearColorValue,
}

impl ColorAttachment {
    /// Creates a color attachment that clears to black and stores.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }
    }

    /// Sets the clear color as RGBA floats.
    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_value = vk::ClearColorValue { float32: color };
        self
    }

    /// Converts to a `VkRenderingAttachmentInfo`.
    #[inline]
    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: self.clear_value,
            })
    }
}

/// Configuration for a depth attachment.
///
/// Defaults to clearing to depth 1.0 and discarding the result, the right
/// shape for a single-pass depth test.
#[derive(Clone, Debug)]
pub struct DepthAttachment {
    /// The depth image view.
    pub image_view: vk::ImageView,
    /// The image layout during rendering.
    pub layout: vk::ImageLayout,
    /// How to initialize attachment contents.
    pub load_op: vk::AttachmentLoadOp,
    /// How to handle attachment contents after rendering.
    pub store_op: vk::AttachmentStoreOp,
    /// Clear value when load_op is CLEAR.
    pub clear_value: vk::ClearDepthStencilValue,
}

impl DepthAttachment {
    /// Creates a depth attachment that clears to 1.0 and discards.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            clear_value: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        }
    }

    /// Sets the clear depth value (typically 1.0, the far plane).
    #[inline]
    pub fn with_clear_depth(mut self, depth: f32) -> Self {
        self.clear_value.depth = depth;
        self
    }

    /// Converts to a `VkRenderingAttachmentInfo`.
    #[inline]
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

/// Complete rendering configuration for one dynamic-rendering pass.
#[derive(Clone, Default)]
pub struct RenderingConfig {
    /// Color attachments for this pass.
    pub color_attachments: Vec<ColorAttachment>,
    /// Optional depth attachment.
    pub depth_attachment: Option<DepthAttachment>,
    /// Render area.
    pub render_area: vk::Rect2D,
}

impl RenderingConfig {
    /// Creates a configuration covering a `width` x `height` render area.
    #[inline]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            color_attachments: Vec::new(),
            depth_attachment: None,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D { width, height },
            },
        }
    }

    /// Creates a configuration from an extent.
    #[inline]
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self::new(extent.width, extent.height)
    }

    /// Adds a color attachment.
    #[inline]
    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    /// Sets the depth attachment.
    #[inline]
    pub fn with_depth_attachment(mut self, attachment: DepthAttachment) -> Self {
        self.depth_attachment = Some(attachment);
        self
    }

    /// Returns the render area extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    /// Builds the bundle that owns the attachment-info arrays.
    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle::new(self)
    }
}

/// Owns the attachment infos a `VkRenderingInfo` borrows.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth_attachment: Option<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    /// Creates a bundle from a rendering configuration.
    pub fn new(config: &RenderingConfig) -> Self {
        Self {
            color_attachments: config
                .color_attachments
                .iter()
                .map(|a| a.to_rendering_attachment_info())
                .collect(),
            depth_attachment: config
                .depth_attachment
                .as_ref()
                .map(|a| a.to_rendering_attachment_info()),
            render_area: config.render_area,
        }
    }

    /// Returns the `VkRenderingInfo` referencing this bundle's data.
    ///
    /// Valid as long as the bundle is alive.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments);

        if let Some(ref depth) = self.depth_attachment {
            info = info.depth_attachment(depth);
        }

        info
    }

    /// Returns the render area.
    #[inline]
    pub fn render_area(&self) -> vk::Rect2D {
        self.render_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn color_attachment_defaults() {
        let attachment = ColorAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
    }

    #[test]
    fn color_attachment_clear_color() {
        let attachment =
            ColorAttachment::new(vk::ImageView::null()).with_clear_color([0.01, 0.01, 0.01, 1.0]);
        let clear = unsafe { attachment.clear_value.float32 };
        assert_eq!(clear, [0.01, 0.01, 0.01, 1.0]);
    }

    #[test]
    fn depth_attachment_defaults_to_far_plane() {
        let attachment = DepthAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.clear_value.depth, 1.0);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn config_covers_full_extent() {
        let config = RenderingConfig::new(1280, 720);
        assert_eq!(config.render_area.offset.x, 0);
        assert_eq!(config.render_area.offset.y, 0);
        assert_eq!(config.extent().width, 1280);
        assert_eq!(config.extent().height, 720);
    }

    #[test]
    fn bundle_carries_attachments() {
        let config = RenderingConfig::new(800, 600)
            .with_color_attachment(ColorAttachment::new(vk::ImageView::null()))
            .with_depth_attachment(DepthAttachment::new(vk::ImageView::null()));

        let bundle = config.build();
        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 1);
        assert_eq!(info.layer_count, 1);
        assert_eq!(bundle.render_area().extent.width, 800);
    }
}
