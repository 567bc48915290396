//! Synchronization primitives.
//!
//! Wrappers for the Vulkan synchronization objects the frame loop needs:
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations
//! - [`Fence`] - GPU-to-CPU completion signaling
//! - [`FrameSync`] - the per-frame-in-flight bundle of all three primitives
//!
//! # Usage pattern
//!
//! ```text
//! 1. Wait on in_flight_fence (host waits for the previous use of this slot)
//! 2. Acquire swapchain image (signals image_available)
//! 3. Record commands
//! 4. Submit: wait image_available, signal render_finished + in_flight_fence
//! 5. Present (waits on render_finished)
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Maximum number of frames processed concurrently.
///
/// Two slots let the host record frame N+1 while the GPU executes frame N.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Vulkan semaphore wrapper for GPU-to-GPU synchronization.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
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
    }
}

/// Vulkan fence wrapper for GPU-to-CPU synchronization.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `signaled` - If true, the fence starts signaled. Frame-in-flight
    ///   fences start signaled so the first wait does not block forever.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or the timeout expires.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds; `u64::MAX` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or device loss.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Non-blocking check of the fence state.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Per-frame-in-flight synchronization primitives.
///
/// One of these exists per frame slot; reusing a slot's primitives is what
/// guarantees the device never starts executing a slot's new commands until
/// its previous submission completed.
pub struct FrameSync {
    /// Semaphore signaled when a swapchain image is available.
    image_available: Semaphore,
    /// Semaphore signaled when rendering is complete.
    render_finished: Semaphore,
    /// Fence used to wait for frame completion before reusing resources.
    in_flight: Fence,
}

impl FrameSync {
    /// Creates a new set of frame synchronization primitives.
    ///
    /// The in-flight fence starts signaled so the first frame proceeds
    /// without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if any primitive creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        debug!("Created frame synchronization primitives");

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    /// Semaphore signaled by swapchain image acquisition.
    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    /// Semaphore signaled when this frame's rendering completes.
    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    /// Fence signaled when this frame's submission completes.
    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_frames_in_flight_is_reasonable() {
        assert!(MAX_FRAMES_IN_FLIGHT >= 1);
        assert!(MAX_FRAMES_IN_FLIGHT <= 4);
    }

    #[test]
    fn sync_primitives_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
