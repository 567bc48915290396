//! Frame lifecycle and presentation-surface management.
//!
//! [`FrameManager`] runs the per-frame protocol:
//!
//! ```text
//! begin_frame -> begin_render_pass -> draw -> end_render_pass -> end_frame
//! ```
//!
//! It owns the swapchain, the depth buffer, and one command buffer + sync
//! set per frame in flight (allocated once, re-recorded every frame). The
//! host records frame N+1 while the GPU executes frame N; reusing a slot's
//! fence is what keeps the device from touching a slot whose previous
//! submission has not completed.
//!
//! Presentation staleness is not an error. `begin_frame` returns `Ok(None)`
//! when the surface is out of date (the caller skips the tick and retries
//! next loop iteration), and `end_frame` rebuilds the surface when present
//! reports staleness or the window's sticky resize flag is set. A zero-area
//! window (minimized) stalls the rebuild in a poll loop until the extent is
//! valid again.
//!
//! Contract violations (beginning a frame twice, driving the render pass
//! with a command stream from another frame, ending without beginning)
//! panic; they are caller bugs, not runtime conditions.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use orrery_platform::{Surface, Window};
use orrery_rhi::command::{CommandBuffer, CommandPool};
use orrery_rhi::device::Device;
use orrery_rhi::instance::Instance;
use orrery_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use orrery_rhi::swapchain::Swapchain;
use orrery_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};
use orrery_rhi::{RhiError, RhiResult};

use crate::depth_buffer::{DEFAULT_DEPTH_FORMAT, DepthBuffer};

/// Clear color for the frame's render pass.
const CLEAR_COLOR: [f32; 4] = [0.01, 0.01, 0.01, 1.0];

/// Begin/end nesting and frame-slot rotation, kept separate from the Vulkan
/// plumbing so the protocol itself is testable.
#[derive(Debug)]
pub struct FrameCycle {
    frames_in_flight: usize,
    current_frame: usize,
    in_progress: bool,
}

impl FrameCycle {
    /// Creates a cycle over `frames_in_flight` slots, starting at slot 0.
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight > 0, "need at least one frame in flight");
        Self {
            frames_in_flight,
            current_frame: 0,
            in_progress: false,
        }
    }

    /// Marks the current frame as begun.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    pub fn begin(&mut self) {
        assert!(
            !self.in_progress,
            "begin_frame called while a frame is already in progress"
        );
        self.in_progress = true;
    }

    /// Marks the current frame as ended and advances to the next slot.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn end(&mut self) {
        assert!(
            self.in_progress,
            "end_frame called with no frame in progress"
        );
        self.in_progress = false;
        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;
    }

    /// Whether a frame is currently in progress.
    #[inline]
    pub fn is_in_progress(&self) -> bool {
        self.in_progress
    }

    /// Index of the current frame-in-flight slot.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }
}

/// Polls `extent` until it reports a non-zero area, invoking `wait` between
/// polls.
///
/// This is the deliberate stall used while the window is minimized; the
/// wait hook keeps it interruptible and off the hot path.
fn wait_for_nonzero_extent<E, W>(mut extent: E, mut wait: W) -> vk::Extent2D
where
    E: FnMut() -> vk::Extent2D,
    W: FnMut(),
{
    loop {
        let current = extent();
        if current.width > 0 && current.height > 0 {
            return current;
        }
        wait();
    }
}

/// Command buffer and synchronization primitives for one frame slot.
struct FrameSlot {
    command_buffer: CommandBuffer,
    sync: FrameSync,
}

/// Owns the presentation surface and drives the frame protocol.
pub struct FrameManager {
    device: Arc<Device>,
    /// Pool the per-slot command buffers come from; freed together with it.
    command_pool: CommandPool,
    swapchain: Swapchain,
    depth_buffer: DepthBuffer,
    frames: Vec<FrameSlot>,
    cycle: FrameCycle,
    /// Swapchain image index acquired for the frame in progress.
    image_index: u32,
    /// Formats pinned at startup; a rebuild must reproduce them.
    color_format: vk::Format,
    depth_format: vk::Format,
}

impl FrameManager {
    /// Creates the frame manager, its swapchain, depth buffer, and one
    /// command buffer + sync set per frame in flight.
    ///
    /// Blocks until the window reports a non-zero drawable extent.
    ///
    /// # Errors
    ///
    /// Returns an error if any device object creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: &Surface,
        window: &Window,
    ) -> RhiResult<Self> {
        let extent =
            wait_for_nonzero_extent(|| window.drawable_extent(), || window.wait_events());

        let swapchain = Swapchain::new(
            instance,
            device.clone(),
            surface.handle(),
            extent.width,
            extent.height,
        )?;
        let depth_buffer = DepthBuffer::new(
            device.clone(),
            swapchain.extent().width,
            swapchain.extent().height,
            DEFAULT_DEPTH_FORMAT,
        )?;

        let graphics_family = device.queue_families().graphics_family.unwrap();
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            frames.push(FrameSlot {
                command_buffer: CommandBuffer::new(device.clone(), &command_pool)?,
                sync: FrameSync::new(device.clone())?,
            });
        }

        let color_format = swapchain.format();
        let depth_format = depth_buffer.format();

        info!(
            "Frame manager ready: {} frames in flight, {} swapchain images",
            MAX_FRAMES_IN_FLIGHT,
            swapchain.image_count()
        );

        Ok(Self {
            device,
            command_pool,
            swapchain,
            depth_buffer,
            frames,
            cycle: FrameCycle::new(MAX_FRAMES_IN_FLIGHT),
            image_index: 0,
            color_format,
            depth_format,
        })
    }

    /// Begins a frame: waits for the slot's previous submission, acquires a
    /// presentable image, and opens command recording.
    ///
    /// Returns `Ok(None)` when the surface was out of date: the surface has
    /// been rebuilt and the caller should skip rendering this tick. A
    /// suboptimal-but-usable surface proceeds normally.
    ///
    /// # Panics
    ///
    /// Panics if a frame is already in progress.
    ///
    /// # Errors
    ///
    /// Any acquire failure other than staleness is fatal.
    pub fn begin_frame(
        &mut self,
        instance: &Instance,
        surface: &Surface,
        window: &Window,
    ) -> RhiResult<Option<vk::CommandBuffer>> {
        assert!(
            !self.cycle.is_in_progress(),
            "begin_frame called while a frame is already in progress"
        );

        let frame = self.cycle.current_frame();
        self.frames[frame].sync.in_flight().wait(u64::MAX)?;

        let acquired = {
            let semaphore = self.frames[frame].sync.image_available().handle();
            self.swapchain.acquire_next_image(semaphore)
        };

        match acquired {
            Ok((index, _suboptimal)) => {
                self.image_index = index;
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Surface out of date at acquire, rebuilding");
                self.recreate_surface(instance, surface, window)?;
                return Ok(None);
            }
            Err(e) => {
                return Err(RhiError::Swapchain(format!(
                    "failed to acquire presentable image: {e:?}"
                )));
            }
        }

        // Reset only after a successful acquire, so a skipped tick leaves
        // the fence signaled for the next attempt
        self.frames[frame].sync.in_flight().reset()?;

        let command_buffer = &self.frames[frame].command_buffer;
        command_buffer.reset()?;
        command_buffer.begin()?;

        self.cycle.begin();
        Ok(Some(command_buffer.handle()))
    }

    /// Opens the frame's render pass on `cmd`: transitions the render
    /// targets, begins dynamic rendering with the fixed clear color and
    /// depth 1.0, and sets the full-surface viewport and scissor.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress or `cmd` is not the command stream
    /// returned by this frame's `begin_frame`.
    pub fn begin_render_pass(&self, cmd: vk::CommandBuffer) {
        assert!(
            self.cycle.is_in_progress(),
            "begin_render_pass called with no frame in progress"
        );
        assert_eq!(
            cmd,
            self.current_command_buffer(),
            "render pass must use the command stream returned by the current begin_frame"
        );

        let command_buffer = &self.frames[self.cycle.current_frame()].command_buffer;
        let extent = self.swapchain.extent();
        let image = self.swapchain.image(self.image_index as usize);

        let color_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(1)
            .layer_count(1);
        let depth_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::DEPTH)
            .level_count(1)
            .layer_count(1);

        // Previous contents are cleared anyway, so both targets transition
        // from UNDEFINED
        let to_attachment = [
            vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(image)
                .subresource_range(color_range),
            vk::ImageMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::empty())
                .dst_access_mask(
                    vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                )
                .old_layout(vk::ImageLayout::UNDEFINED)
                .new_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .image(self.depth_buffer.image())
                .subresource_range(depth_range),
        ];

        command_buffer.pipeline_barrier(
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            &to_attachment,
        );

        let config = RenderingConfig::from_extent(extent)
            .with_color_attachment(
                ColorAttachment::new(self.swapchain.image_view(self.image_index as usize))
                    .with_clear_color(CLEAR_COLOR),
            )
            .with_depth_attachment(
                DepthAttachment::new(self.depth_buffer.image_view()).with_clear_depth(1.0),
            );
        let bundle = config.build();
        command_buffer.begin_rendering(&bundle.info());

        let viewport = vk::Viewport::default()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);
        command_buffer.set_viewport(&viewport);

        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        command_buffer.set_scissor(&scissor);
    }

    /// Closes the frame's render pass and transitions the color target for
    /// presentation.
    ///
    /// # Panics
    ///
    /// Panics under the same contract as [`FrameManager::begin_render_pass`].
    pub fn end_render_pass(&self, cmd: vk::CommandBuffer) {
        assert!(
            self.cycle.is_in_progress(),
            "end_render_pass called with no frame in progress"
        );
        assert_eq!(
            cmd,
            self.current_command_buffer(),
            "render pass must use the command stream returned by the current begin_frame"
        );

        let command_buffer = &self.frames[self.cycle.current_frame()].command_buffer;
        command_buffer.end_rendering();

        let color_range = vk::ImageSubresourceRange::default()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .level_count(1)
            .layer_count(1);

        let to_present = [vk::ImageMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::empty())
            .old_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.swapchain.image(self.image_index as usize))
            .subresource_range(color_range)];

        command_buffer.pipeline_barrier(
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            vk::PipelineStageFlags::BOTTOM_OF_PIPE,
            &to_present,
        );
    }

    /// Ends the frame: closes recording, submits, presents, and advances to
    /// the next frame-in-flight slot.
    ///
    /// Staleness at present (out of date, suboptimal, or the window's
    /// sticky resize flag) triggers a surface rebuild and is not an error.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    ///
    /// # Errors
    ///
    /// Any submission or presentation failure other than staleness is fatal.
    pub fn end_frame(
        &mut self,
        instance: &Instance,
        surface: &Surface,
        window: &Window,
    ) -> RhiResult<()> {
        assert!(
            self.cycle.is_in_progress(),
            "end_frame called with no frame in progress"
        );

        let frame = self.cycle.current_frame();
        let slot = &self.frames[frame];
        slot.command_buffer.end()?;

        let wait_semaphores = [slot.sync.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.sync.render_finished().handle()];
        let command_buffers = [slot.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.handle().queue_submit(
                self.device.graphics_queue(),
                &[submit_info],
                slot.sync.in_flight().handle(),
            )?;
        }

        let presented = self.swapchain.present(
            self.device.present_queue(),
            self.image_index,
            slot.sync.render_finished().handle(),
        );

        let stale = match presented {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => {
                return Err(RhiError::Swapchain(format!(
                    "failed to present swapchain image: {e:?}"
                )));
            }
        };

        if stale || window.was_resized() {
            window.reset_resized();
            self.recreate_surface(instance, surface, window)?;
        }

        self.cycle.end();
        Ok(())
    }

    /// Rebuilds the swapchain and depth buffer for the current window size.
    ///
    /// Stalls while the drawable extent is zero (minimized). The old
    /// swapchain stays alive through the handover; the device is idled
    /// before any old resource is released. A color or depth format that
    /// differs from the original build is a fatal configuration error;
    /// pipelines were compiled against those formats.
    ///
    /// # Errors
    ///
    /// Returns an error on device failure or format mismatch.
    pub fn recreate_surface(
        &mut self,
        instance: &Instance,
        surface: &Surface,
        window: &Window,
    ) -> RhiResult<()> {
        let extent =
            wait_for_nonzero_extent(|| window.drawable_extent(), || window.wait_events());

        self.device.wait_idle()?;

        self.swapchain
            .recreate(instance, surface.handle(), extent.width, extent.height)?;
        self.depth_buffer = DepthBuffer::new(
            self.device.clone(),
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            self.depth_format,
        )?;

        if self.swapchain.format() != self.color_format
            || self.depth_buffer.format() != self.depth_format
        {
            return Err(RhiError::Swapchain(
                "render-target format changed across surface rebuild".to_string(),
            ));
        }

        info!(
            "Surface rebuilt at {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );

        Ok(())
    }

    /// Command stream of the frame in progress.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn current_command_buffer(&self) -> vk::CommandBuffer {
        assert!(
            self.cycle.is_in_progress(),
            "no command buffer outside of a frame"
        );
        self.frames[self.cycle.current_frame()].command_buffer.handle()
    }

    /// Index of the frame-in-flight slot in progress.
    ///
    /// # Panics
    ///
    /// Panics if no frame is in progress.
    pub fn current_frame_index(&self) -> usize {
        assert!(
            self.cycle.is_in_progress(),
            "no frame index outside of a frame"
        );
        self.cycle.current_frame()
    }

    /// Whether a frame is in progress.
    #[inline]
    pub fn is_frame_in_progress(&self) -> bool {
        self.cycle.is_in_progress()
    }

    /// Current surface extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Current surface aspect ratio.
    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.swapchain.aspect_ratio()
    }

    /// Number of frames in flight.
    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Number of presentable images in the swapchain.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    /// Color format of the presentable images.
    #[inline]
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }

    /// Format of the depth buffer.
    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Returns the command pool the frame streams were allocated from.
    #[inline]
    pub fn command_pool(&self) -> &CommandPool {
        &self.command_pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_rotates_with_frame_count_period() {
        let mut cycle = FrameCycle::new(2);
        let mut seen = Vec::new();
        for _ in 0..6 {
            cycle.begin();
            seen.push(cycle.current_frame());
            cycle.end();
        }
        assert_eq!(seen, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn cycle_period_matches_other_counts() {
        let mut cycle = FrameCycle::new(3);
        let mut seen = Vec::new();
        for _ in 0..7 {
            cycle.begin();
            seen.push(cycle.current_frame());
            cycle.end();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    #[should_panic(expected = "already in progress")]
    fn double_begin_is_a_contract_violation() {
        let mut cycle = FrameCycle::new(2);
        cycle.begin();
        cycle.begin();
    }

    #[test]
    #[should_panic(expected = "no frame in progress")]
    fn end_without_begin_is_a_contract_violation() {
        let mut cycle = FrameCycle::new(2);
        cycle.end();
    }

    #[test]
    fn index_is_stable_within_a_frame() {
        let mut cycle = FrameCycle::new(2);
        cycle.begin();
        assert!(cycle.is_in_progress());
        assert_eq!(cycle.current_frame(), 0);
        cycle.end();
        assert!(!cycle.is_in_progress());
        assert_eq!(cycle.current_frame(), 1);
    }

    #[test]
    fn extent_poll_returns_immediately_when_valid() {
        let mut waits = 0;
        let extent = wait_for_nonzero_extent(
            || vk::Extent2D {
                width: 800,
                height: 600,
            },
            || waits += 1,
        );
        assert_eq!((extent.width, extent.height), (800, 600));
        assert_eq!(waits, 0);
    }

    #[test]
    fn extent_poll_stalls_until_nonzero() {
        // Minimized for three polls, then restored
        let mut polls = 0;
        let mut waits = 0;
        let extent = wait_for_nonzero_extent(
            || {
                polls += 1;
                if polls <= 3 {
                    vk::Extent2D {
                        width: 0,
                        height: 0,
                    }
                } else {
                    vk::Extent2D {
                        width: 1280,
                        height: 720,
                    }
                }
            },
            || waits += 1,
        );
        assert_eq!((extent.width, extent.height), (1280, 720));
        assert_eq!(waits, 3);
    }

    #[test]
    fn extent_poll_rejects_half_zero_extents() {
        // A width-only extent is still unusable
        let mut polls = 0;
        let extent = wait_for_nonzero_extent(
            || {
                polls += 1;
                if polls == 1 {
                    vk::Extent2D {
                        width: 800,
                        height: 0,
                    }
                } else {
                    vk::Extent2D {
                        width: 800,
                        height: 600,
                    }
                }
            },
            || {},
        );
        assert_eq!(extent.height, 600);
        assert_eq!(polls, 2);
    }
}
