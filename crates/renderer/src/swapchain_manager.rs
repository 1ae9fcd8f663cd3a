//! Swapchain state machine and per-frame cycle.
//!
//! # Overview
//!
//! [`SwapchainManager`] sequences a [`PresentTarget`] through the frame
//! cycle described in [`crate::state`]:
//!
//! 1. [`begin_frame`](SwapchainManager::begin_frame): acquire an image
//!    (bounded by the configured timeout), reset and record its command
//!    buffer, optionally transition it and begin dynamic rendering
//! 2. Client code records draws
//! 3. [`end_frame`](SwapchainManager::end_frame): close recording and submit.
//!    While minimized the submission blocks on its fence
//! 4. [`present`](SwapchainManager::present): hand the image to the
//!    presentation engine
//!
//! Out-of-date and suboptimal results rebuild the chain instead of failing.
//! A rebuild waits for the device to go idle, destroys the old views,
//! creates the new chain, then the new depth buffer. The next frame
//! re-acquires. While the surface has no drawable area, or after a rebuild
//! failed, the rebuild stays pending and `begin_frame` retries it.
//!
//! Objects retired through [`retire`](SwapchainManager::retire) are released
//! once the submission that may still use them has completed.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_renderer::swapchain_manager::{SwapchainManager, SwapchainSettings};
//! use vkframe_renderer::frame::FrameStatus;
//! use vkframe_renderer::target::PresentTarget;
//!
//! # fn example<T: PresentTarget>(target: T) -> Result<(), vkframe_rhi::RhiError> {
//! let mut manager = SwapchainManager::new(target, SwapchainSettings::default());
//! manager.initialize(800, 600)?;
//!
//! for _ in 0..3 {
//!     if manager.begin_frame()? != FrameStatus::Recording {
//!         continue;
//!     }
//!     // ... record draws ...
//!     manager.end_frame()?;
//!     manager.present()?;
//! }
//!
//! manager.shutdown()?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use vkframe_core::{Config, MAX_FRAMES_IN_FLIGHT};
use vkframe_rhi::deferred::DeferredDestroyQueue;
use vkframe_rhi::{RhiError, RhiResult};

use crate::frame::{FrameOptions, FrameState, FrameStatus, PresentStatus};
use crate::state::SwapchainState;
use crate::target::{AcquireOutcome, ChainInfo, PresentOutcome, PresentTarget};

/// Default bound on acquire and frame-fence waits.
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Frame-cycle settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainSettings {
    /// Frames the host may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Bound on acquire and fence waits, in nanoseconds.
    pub timeout_ns: u64,
    pub options: FrameOptions,
}

impl Default for SwapchainSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            timeout_ns: DEFAULT_FRAME_TIMEOUT.as_nanos() as u64,
            options: FrameOptions::default(),
        }
    }
}

impl SwapchainSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            frames_in_flight: config.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT) as usize,
            timeout_ns: config.acquire_timeout_ns(),
            options: FrameOptions {
                auto_transition_frame_buffer: config.auto_transition_frame_buffer,
                auto_begin_dynamic_rendering: config.auto_begin_dynamic_rendering,
            },
        }
    }
}

/// Drives a [`PresentTarget`] through acquire, record, submit and present.
pub struct SwapchainManager<T: PresentTarget> {
    target: T,
    settings: SwapchainSettings,
    state: SwapchainState,
    frame: FrameState,
    chain: Option<ChainInfo>,
    depth_format: vk::Format,
    minimized: bool,
    /// Size most recently asked for.
    requested: vk::Extent2D,
    pending_resize: Option<vk::Extent2D>,
    rebuild_after_present: bool,
    /// The chain must be rebuilt before the next acquire.
    rebuild_pending: bool,
    /// Image (and its slot) acquired by a frame that failed to record.
    held_image: Option<(u32, usize)>,
    /// Serial of the last submission that used each image.
    image_serials: Vec<u64>,
    next_serial: u64,
    deferred: DeferredDestroyQueue,
}

impl<T: PresentTarget> SwapchainManager<T> {
    pub fn new(target: T, settings: SwapchainSettings) -> Self {
        Self {
            target,
            settings,
            state: SwapchainState::Uninitialized,
            frame: FrameState::default(),
            chain: None,
            depth_format: vk::Format::UNDEFINED,
            minimized: false,
            requested: vk::Extent2D::default(),
            pending_resize: None,
            rebuild_after_present: false,
            rebuild_pending: false,
            held_image: None,
            image_serials: Vec::new(),
            next_serial: 1,
            deferred: DeferredDestroyQueue::new(),
        }
    }

    /// Builds the frame slots, the image set and the depth buffer.
    ///
    /// # Panics
    ///
    /// Panics if called more than once.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainError`] for a zero-area size, or any
    /// creation error from the target.
    pub fn initialize(&mut self, width: u32, height: u32) -> RhiResult<()> {
        assert!(
            self.state == SwapchainState::Uninitialized,
            "swapchain manager initialized twice (state {})",
            self.state
        );
        if width == 0 || height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "cannot initialize a {width}x{height} swapchain"
            )));
        }

        self.target
            .create_frame_slots(self.settings.frames_in_flight.max(1))?;
        self.build_chain(width, height)?;
        self.requested = vk::Extent2D { width, height };
        self.state.advance(SwapchainState::Ready);

        info!(
            "Swapchain manager ready: {}x{}, {} images, {} frame(s) in flight",
            width,
            height,
            self.image_count(),
            self.settings.frames_in_flight
        );
        Ok(())
    }

    /// Starts a frame.
    ///
    /// A pending rebuild is retried first. While it cannot complete because
    /// the surface has no drawable area the frame is skipped.
    ///
    /// # Panics
    ///
    /// Panics unless the manager is `Ready`.
    ///
    /// # Errors
    ///
    /// - [`RhiError::Timeout`] if no image or command buffer became
    ///   available in time; the manager returns to `Ready`
    /// - Rebuild errors; the rebuild stays pending
    /// - Fatal errors from the target
    pub fn begin_frame(&mut self) -> RhiResult<FrameStatus> {
        if self.rebuild_pending {
            self.state.advance(SwapchainState::Resizing);
            if !self.rebuild_current()? {
                return Ok(FrameStatus::Skipped);
            }
        }

        self.state.advance(SwapchainState::Acquiring);

        let mut slot =
            FrameState::slot_for(self.frame.frame_counter, self.settings.frames_in_flight);
        self.frame.minimized = self.minimized;

        let (index, options) = if self.frame.minimized {
            (self.frame.swap_index, FrameOptions::BARE)
        } else if let Some((index, held_slot)) = self.held_image.take() {
            // Its acquire semaphore is still signaled; this frame waits on it.
            slot = held_slot;
            (index, self.settings.options)
        } else {
            match self.acquire(slot) {
                Ok(Some(index)) => (index, self.settings.options),
                Ok(None) if self.rebuild_pending => return Ok(FrameStatus::Skipped),
                Ok(None) => return Ok(FrameStatus::Rebuilt),
                Err(e) => {
                    self.return_to_ready();
                    return Err(e);
                }
            }
        };
        self.frame.slot = slot;

        if let Err(e) = self
            .target
            .record_frame(index, options, self.settings.timeout_ns)
        {
            if !self.frame.minimized {
                self.held_image = Some((index, slot));
            }
            self.state.advance(SwapchainState::Ready);
            return Err(e);
        }

        let completed = self.image_serials[index as usize];
        self.deferred.collect(completed);

        self.frame.swap_index = index;
        self.frame.recording = true;
        self.state.advance(SwapchainState::Rendering);
        Ok(FrameStatus::Recording)
    }

    /// Acquires an image, rebuilding on out-of-date. `None` means rebuilt.
    fn acquire(&mut self, slot: usize) -> RhiResult<Option<u32>> {
        let outcome = match self.target.acquire(slot, self.settings.timeout_ns) {
            Err(RhiError::SurfaceOutOfDate) => AcquireOutcome::OutOfDate,
            other => other?,
        };

        match outcome {
            AcquireOutcome::Acquired { index, suboptimal } => {
                if index >= self.image_count() {
                    return Err(RhiError::SwapchainError(format!(
                        "presentation engine returned image {} of {}",
                        index,
                        self.image_count()
                    )));
                }
                if suboptimal {
                    debug!("Acquired image {} from a suboptimal swapchain", index);
                    self.rebuild_after_present = true;
                }
                Ok(Some(index))
            }
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date on acquire, rebuilding");
                self.state.advance(SwapchainState::Resizing);
                self.rebuild_current()?;
                Ok(None)
            }
        }
    }

    /// Closes recording and submits the frame.
    ///
    /// While minimized the call blocks until the GPU has finished the frame.
    ///
    /// # Panics
    ///
    /// Panics unless a frame is recording.
    ///
    /// # Errors
    ///
    /// Returns the submission error; the manager returns to `Ready`.
    pub fn end_frame(&mut self) -> RhiResult<()> {
        self.state.advance(SwapchainState::Presenting);

        let index = self.frame.swap_index;
        let options = if self.frame.minimized {
            FrameOptions::BARE
        } else {
            self.settings.options
        };
        self.target.end_recording(index, options);
        self.frame.recording = false;

        let serial = self.next_serial;
        self.next_serial += 1;
        self.image_serials[index as usize] = serial;

        let blocking = self.frame.minimized;
        let submitted = self.target.submit_frame(
            index,
            self.frame.slot,
            !self.frame.minimized,
            blocking,
            self.settings.timeout_ns,
        );
        if let Err(e) = submitted {
            self.state.advance(SwapchainState::Ready);
            return Err(e);
        }

        if blocking {
            self.deferred.collect(serial);
        }
        Ok(())
    }

    /// Hands the frame's image to the presentation engine.
    ///
    /// # Panics
    ///
    /// Panics unless `end_frame` has submitted the frame.
    ///
    /// # Errors
    ///
    /// Returns fatal presentation errors and rebuild failures.
    pub fn present(&mut self) -> RhiResult<PresentStatus> {
        assert!(
            self.state == SwapchainState::Presenting,
            "present called in state {}; call end_frame first",
            self.state
        );

        self.frame.frame_counter += 1;

        if self.frame.minimized {
            self.state.advance(SwapchainState::Ready);
            return Ok(PresentStatus::Suppressed);
        }

        let outcome = match self.target.present(self.frame.swap_index) {
            Ok(outcome) => outcome,
            Err(RhiError::SurfaceOutOfDate) => PresentOutcome::OutOfDate,
            Err(e) => {
                self.state.advance(SwapchainState::Ready);
                return Err(e);
            }
        };

        if outcome.needs_rebuild() || self.rebuild_after_present || self.pending_resize.is_some()
        {
            debug!("Rebuilding swapchain after present ({:?})", outcome);
            self.state.advance(SwapchainState::Resizing);
            return Ok(if self.rebuild_current()? {
                PresentStatus::Rebuilt
            } else {
                PresentStatus::RebuildDeferred
            });
        }

        self.state.advance(SwapchainState::Ready);
        Ok(PresentStatus::Presented)
    }

    /// Rebuilds the chain for a new drawable size.
    ///
    /// A zero-area size is ignored. A request made mid-frame is applied
    /// after the frame is presented.
    ///
    /// Returns whether the chain was rebuilt by this call. While the surface
    /// itself has no drawable area the current chain is kept and the rebuild
    /// is left pending.
    ///
    /// # Errors
    ///
    /// Returns the rebuild error. The manager returns to `Ready` with the
    /// rebuild pending; the next `begin_frame` or `resize` retries it.
    pub fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool> {
        if width == 0 || height == 0 {
            debug!("Ignoring zero-area resize to {}x{}", width, height);
            return Ok(false);
        }

        let extent = vk::Extent2D { width, height };
        match self.state {
            SwapchainState::Uninitialized | SwapchainState::ShutDown => {
                debug!("Ignoring resize in state {}", self.state);
                Ok(false)
            }
            state if state.in_frame() => {
                self.pending_resize = Some(extent);
                Ok(false)
            }
            _ => {
                if !self.rebuild_pending && self.extent() == Some(extent) {
                    return Ok(false);
                }
                self.state.advance(SwapchainState::Resizing);
                self.rebuild(extent)
            }
        }
    }

    /// Marks the window minimized or restored. Takes effect at the next
    /// `begin_frame`.
    pub fn set_minimized(&mut self, minimized: bool) {
        if self.minimized != minimized {
            debug!("Window {}", if minimized { "minimized" } else { "restored" });
        }
        self.minimized = minimized;
    }

    /// Queues `value` for release once the GPU is done with the current
    /// frame's submission.
    pub fn retire<V: Send + 'static>(&mut self, label: &'static str, value: V) {
        self.deferred.retire(self.next_serial, label, value);
    }

    /// Waits for the device, releases everything and destroys the target.
    ///
    /// Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns the idle-wait error after releasing resources anyway.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        if self.state == SwapchainState::ShutDown {
            return Ok(());
        }
        if self.state.in_frame() {
            warn!("Shutting down mid-frame (state {})", self.state);
        }

        let idle = self.target.wait_idle();
        if let Err(e) = &idle {
            warn!("Device did not go idle before shutdown: {:?}", e);
        }

        let released = self.deferred.flush();
        self.target.destroy();
        self.chain = None;
        self.state.advance(SwapchainState::ShutDown);

        info!(
            "Swapchain manager shut down after {} frame(s), {} deferred release(s)",
            self.frame.frame_counter, released
        );
        idle
    }

    fn rebuild_current(&mut self) -> RhiResult<bool> {
        let extent = self.pending_resize.unwrap_or(self.requested);
        self.rebuild(extent)
    }

    /// Runs a rebuild from `Resizing` and always lands in `Ready`. Returns
    /// false if the surface had no area and the chain was kept.
    fn rebuild(&mut self, extent: vk::Extent2D) -> RhiResult<bool> {
        self.requested = extent;
        self.pending_resize = None;
        self.rebuild_pending = true;

        let rebuilt = self.replace_chain(extent);
        if let Ok(true) = rebuilt {
            self.rebuild_pending = false;
            self.rebuild_after_present = false;
        } else if let Err(e) = &rebuilt {
            warn!("Swapchain rebuild failed, retrying next frame: {}", e);
        }
        self.state.advance(SwapchainState::Ready);
        rebuilt
    }

    fn replace_chain(&mut self, extent: vk::Extent2D) -> RhiResult<bool> {
        let Some(drawable) = self.target.surface_extent(extent.width, extent.height)? else {
            debug!(
                "Surface has no drawable area, keeping the {}x{} chain",
                self.extent().map_or(0, |e| e.width),
                self.extent().map_or(0, |e| e.height)
            );
            return Ok(false);
        };
        info!("Resizing swapchain to {}x{}", drawable.width, drawable.height);

        self.target.wait_idle()?;
        self.deferred.flush();
        if let Some((_, slot)) = self.held_image.take() {
            self.target.discard_acquire(slot)?;
        }
        self.target.destroy_views();
        self.chain = None;
        self.build_chain(extent.width, extent.height)?;
        Ok(true)
    }

    fn return_to_ready(&mut self) {
        if self.state != SwapchainState::Ready {
            self.state.advance(SwapchainState::Ready);
        }
    }

    fn build_chain(&mut self, width: u32, height: u32) -> RhiResult<()> {
        let chain = self.target.create_chain(width, height)?;
        self.chain = Some(chain);
        self.image_serials = vec![0; chain.image_count as usize];
        self.frame.swap_index = 0;

        self.depth_format = self.target.create_depth_buffer(chain.extent)?;
        Ok(())
    }

    #[inline]
    pub fn state(&self) -> SwapchainState {
        self.state
    }

    #[inline]
    pub fn frame_state(&self) -> &FrameState {
        &self.frame
    }

    /// True while a rebuild is waiting for a drawable surface or a retry.
    #[inline]
    pub fn rebuild_pending(&self) -> bool {
        self.rebuild_pending
    }

    /// Number of images in the current chain, 0 before initialization.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.chain.map_or(0, |c| c.image_count)
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    #[inline]
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.chain.map(|c| c.extent)
    }

    #[inline]
    pub fn colour_format(&self) -> Option<vk::Format> {
        self.chain.map(|c| c.colour_format)
    }

    #[inline]
    pub fn settings(&self) -> &SwapchainSettings {
        &self.settings
    }

    /// Releases waiting on a future submission.
    #[inline]
    pub fn pending_releases(&self) -> usize {
        self.deferred.len()
    }

    #[inline]
    pub fn target(&self) -> &T {
        &self.target
    }

    #[inline]
    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }
}

impl<T: PresentTarget> Drop for SwapchainManager<T> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Swapchain manager shutdown during drop failed: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashSet, VecDeque};
    use std::sync::Arc;

    use super::*;

    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    /// Target that records calls and tracks every object it hands out.
    #[derive(Default)]
    struct RecordingTarget {
        min_images: u32,
        calls: Vec<String>,
        next_handle: u64,
        live_views: HashSet<u64>,
        views: Vec<u64>,
        double_destroys: usize,
        live_fences: usize,
        live_semaphores: usize,
        image_semaphores: usize,
        slot_count: usize,
        extent: vk::Extent2D,
        next_image: u32,
        recording: Option<u32>,
        acquired: Vec<u32>,
        submissions: Vec<(u32, bool, bool)>,
        submitted_slots: Vec<usize>,
        acquire_script: VecDeque<RhiResult<AcquireOutcome>>,
        present_script: VecDeque<RhiResult<PresentOutcome>>,
        fail_next_chain: bool,
        fail_next_record: bool,
        /// Surface reports no drawable area, as while minimized.
        zero_surface: bool,
        discarded_slots: Vec<usize>,
        destroyed: bool,
    }

    impl RecordingTarget {
        fn new(min_images: u32) -> Self {
            Self {
                min_images,
                ..Self::default()
            }
        }

        fn image_count(&self) -> u32 {
            self.min_images + 1
        }

        fn count(&self, call: &str) -> usize {
            self.calls.iter().filter(|c| c.as_str() == call).count()
        }
    }

    impl PresentTarget for RecordingTarget {
        fn wait_idle(&mut self) -> RhiResult<()> {
            self.calls.push("wait_idle".into());
            Ok(())
        }

        fn create_frame_slots(&mut self, slots: usize) -> RhiResult<()> {
            self.calls.push("create_frame_slots".into());
            self.slot_count = slots;
            self.live_semaphores += slots;
            Ok(())
        }

        fn surface_extent(
            &mut self,
            width: u32,
            height: u32,
        ) -> RhiResult<Option<vk::Extent2D>> {
            self.calls.push("surface_extent".into());
            Ok((!self.zero_surface).then_some(vk::Extent2D { width, height }))
        }

        fn create_chain(&mut self, width: u32, height: u32) -> RhiResult<ChainInfo> {
            self.calls.push("create_chain".into());
            if std::mem::take(&mut self.fail_next_chain) {
                return Err(RhiError::creation(
                    "swapchain",
                    vk::Result::ERROR_OUT_OF_HOST_MEMORY,
                ));
            }
            assert!(width > 0 && height > 0, "chain built with zero extent");
            assert!(self.views.is_empty(), "old views still alive at create_chain");

            for _ in 0..self.image_count() {
                self.next_handle += 1;
                self.views.push(self.next_handle);
                self.live_views.insert(self.next_handle);
            }
            self.live_fences += self.image_count() as usize;
            self.image_semaphores = self.image_count() as usize;
            self.live_semaphores += self.image_semaphores;
            self.extent = vk::Extent2D { width, height };
            self.next_image = 0;

            Ok(ChainInfo {
                image_count: self.image_count(),
                extent: self.extent,
                colour_format: vk::Format::B8G8R8A8_SRGB,
            })
        }

        fn destroy_views(&mut self) {
            self.calls.push("destroy_views".into());
            for view in self.views.drain(..) {
                if !self.live_views.remove(&view) {
                    self.double_destroys += 1;
                }
            }
            self.live_fences -= std::mem::take(&mut self.image_semaphores).min(self.live_fences);
            self.live_semaphores = self.slot_count;
        }

        fn create_depth_buffer(&mut self, extent: vk::Extent2D) -> RhiResult<vk::Format> {
            self.calls.push("create_depth_buffer".into());
            assert_eq!(extent, self.extent);
            Ok(DEPTH)
        }

        fn acquire(&mut self, slot: usize, _timeout_ns: u64) -> RhiResult<AcquireOutcome> {
            self.calls.push("acquire".into());
            assert!(slot < self.slot_count, "slot {slot} out of range");
            if let Some(scripted) = self.acquire_script.pop_front() {
                return scripted;
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count();
            self.acquired.push(index);
            Ok(AcquireOutcome::Acquired {
                index,
                suboptimal: false,
            })
        }

        fn discard_acquire(&mut self, slot: usize) -> RhiResult<()> {
            self.calls.push("discard_acquire".into());
            self.discarded_slots.push(slot);
            Ok(())
        }

        fn record_frame(
            &mut self,
            image: u32,
            _options: FrameOptions,
            _timeout_ns: u64,
        ) -> RhiResult<()> {
            self.calls.push("record_frame".into());
            if std::mem::take(&mut self.fail_next_record) {
                return Err(RhiError::Timeout {
                    what: "frame fence",
                    timeout: DEFAULT_FRAME_TIMEOUT,
                });
            }
            assert!(self.recording.is_none(), "command buffer already recording");
            assert!(image < self.image_count());
            self.recording = Some(image);
            Ok(())
        }

        fn end_recording(&mut self, image: u32, _options: FrameOptions) {
            self.calls.push("end_recording".into());
            assert_eq!(self.recording.take(), Some(image));
        }

        fn submit_frame(
            &mut self,
            image: u32,
            slot: usize,
            present: bool,
            blocking: bool,
            _timeout_ns: u64,
        ) -> RhiResult<()> {
            self.calls.push("submit_frame".into());
            self.submitted_slots.push(slot);
            self.submissions.push((image, present, blocking));
            Ok(())
        }

        fn present(&mut self, image: u32) -> RhiResult<PresentOutcome> {
            self.calls.push("present".into());
            assert!(image < self.image_count());
            self.present_script
                .pop_front()
                .unwrap_or(Ok(PresentOutcome::Presented))
        }

        fn destroy(&mut self) {
            self.calls.push("destroy".into());
            assert!(!self.destroyed, "target destroyed twice");
            self.destroyed = true;
            self.destroy_views();
            self.live_semaphores = 0;
        }
    }

    fn manager() -> SwapchainManager<RecordingTarget> {
        let mut manager =
            SwapchainManager::new(RecordingTarget::new(2), SwapchainSettings::default());
        manager.initialize(800, 600).unwrap();
        manager
    }

    fn run_frame(manager: &mut SwapchainManager<RecordingTarget>) -> PresentStatus {
        assert_eq!(manager.begin_frame().unwrap(), FrameStatus::Recording);
        manager.end_frame().unwrap();
        manager.present().unwrap()
    }

    #[test]
    fn test_initialize_builds_chain_then_depth() {
        let manager = manager();
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert_eq!(manager.image_count(), 3);
        assert_eq!(manager.depth_format(), DEPTH);
        assert_eq!(
            manager.target().calls,
            vec!["create_frame_slots", "create_chain", "create_depth_buffer"]
        );
    }

    #[test]
    fn test_initialize_rejects_zero_area() {
        let mut manager =
            SwapchainManager::new(RecordingTarget::new(2), SwapchainSettings::default());
        assert!(manager.initialize(0, 600).is_err());
        assert_eq!(manager.state(), SwapchainState::Uninitialized);
        assert_eq!(manager.target().count("create_chain"), 0);
    }

    #[test]
    fn test_three_frames_stay_in_range_and_release_everything() {
        let mut manager = manager();
        let image_count = manager.image_count();

        for _ in 0..3 {
            assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
            assert!(manager.frame_state().swap_index < image_count);
            assert_eq!(manager.state(), SwapchainState::Ready);
        }
        assert_eq!(manager.frame_state().frame_counter, 3);
        assert_eq!(manager.target().acquired, vec![0, 1, 2]);
        assert!(
            manager
                .target()
                .submissions
                .iter()
                .all(|&(_, present, blocking)| present && !blocking)
        );

        manager.shutdown().unwrap();
        let target = manager.target();
        assert_eq!(manager.state(), SwapchainState::ShutDown);
        assert!(target.live_views.is_empty());
        assert_eq!(target.live_fences, 0);
        assert_eq!(target.live_semaphores, 0);
        assert_eq!(target.double_destroys, 0);
    }

    #[test]
    fn test_frames_alternate_slots() {
        let mut manager = manager();
        let mut slots = Vec::new();
        for _ in 0..4 {
            manager.begin_frame().unwrap();
            slots.push(manager.frame_state().slot);
            manager.end_frame().unwrap();
            manager.present().unwrap();
        }
        assert_eq!(slots, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_resize_round_trip_keeps_shape() {
        let mut manager = manager();
        let images = manager.image_count();
        let depth = manager.depth_format();

        assert!(manager.resize(1024, 768).unwrap());
        assert_eq!(manager.extent(), Some(vk::Extent2D { width: 1024, height: 768 }));
        assert!(manager.resize(800, 600).unwrap());

        assert_eq!(manager.image_count(), images);
        assert_eq!(manager.depth_format(), depth);
        assert_eq!(manager.state(), SwapchainState::Ready);

        manager.shutdown().unwrap();
        assert_eq!(manager.target().double_destroys, 0);
        assert!(manager.target().live_views.is_empty());
    }

    #[test]
    fn test_resize_sequence() {
        let mut manager = manager();
        manager.target_mut().calls.clear();

        manager.resize(640, 480).unwrap();
        assert_eq!(
            manager.target().calls,
            vec![
                "surface_extent",
                "wait_idle",
                "destroy_views",
                "create_chain",
                "create_depth_buffer"
            ]
        );

        // The next frame re-acquires from the new chain.
        run_frame(&mut manager);
        assert_eq!(manager.target().calls[5], "acquire");
    }

    #[test]
    fn test_zero_area_resize_is_noop() {
        let mut manager = manager();
        let views_before = manager.target().live_views.clone();
        manager.target_mut().calls.clear();

        assert!(!manager.resize(0, 600).unwrap());
        assert!(!manager.resize(800, 0).unwrap());

        assert!(manager.target().calls.is_empty());
        assert_eq!(manager.target().live_views, views_before);
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
    }

    #[test]
    fn test_same_size_resize_is_noop() {
        let mut manager = manager();
        assert!(!manager.resize(800, 600).unwrap());
        assert_eq!(manager.target().count("create_chain"), 1);
    }

    #[test]
    fn test_resize_mid_frame_applies_after_present() {
        let mut manager = manager();
        manager.begin_frame().unwrap();
        assert!(!manager.resize(1280, 720).unwrap());
        assert_eq!(manager.target().count("create_chain"), 1);

        manager.end_frame().unwrap();
        assert_eq!(manager.present().unwrap(), PresentStatus::Rebuilt);
        assert_eq!(manager.extent(), Some(vk::Extent2D { width: 1280, height: 720 }));
        assert_eq!(manager.state(), SwapchainState::Ready);
    }

    #[test]
    fn test_out_of_date_acquire_rebuilds() {
        let mut manager = manager();
        manager
            .target_mut()
            .acquire_script
            .push_back(Ok(AcquireOutcome::OutOfDate));

        assert_eq!(manager.begin_frame().unwrap(), FrameStatus::Rebuilt);
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert_eq!(manager.target().count("create_chain"), 2);
        assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
    }

    #[test]
    fn test_out_of_date_error_is_not_fatal() {
        let mut manager = manager();
        manager
            .target_mut()
            .present_script
            .push_back(Err(RhiError::SurfaceOutOfDate));

        assert_eq!(run_frame(&mut manager), PresentStatus::Rebuilt);
        assert_eq!(manager.target().count("create_chain"), 2);
    }

    #[test]
    fn test_suboptimal_acquire_rebuilds_after_present() {
        let mut manager = manager();
        manager
            .target_mut()
            .acquire_script
            .push_back(Ok(AcquireOutcome::Acquired {
                index: 1,
                suboptimal: true,
            }));

        assert_eq!(run_frame(&mut manager), PresentStatus::Rebuilt);
        assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
    }

    #[test]
    fn test_acquire_timeout_returns_to_ready() {
        let mut manager = manager();
        manager
            .target_mut()
            .acquire_script
            .push_back(Err(RhiError::Timeout {
                what: "swapchain image",
                timeout: DEFAULT_FRAME_TIMEOUT,
            }));

        let err = manager.begin_frame().unwrap_err();
        assert_eq!(err.class(), vkframe_rhi::ErrorClass::Timeout);
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
    }

    #[test]
    fn test_out_of_range_index_is_an_error() {
        let mut manager = manager();
        manager
            .target_mut()
            .acquire_script
            .push_back(Ok(AcquireOutcome::Acquired {
                index: 7,
                suboptimal: false,
            }));

        assert!(manager.begin_frame().is_err());
        assert_eq!(manager.target().count("record_frame"), 0);
    }

    #[test]
    fn test_minimized_frame_blocks_and_skips_present() {
        let mut manager = manager();
        manager.set_minimized(true);

        assert_eq!(run_frame(&mut manager), PresentStatus::Suppressed);
        assert_eq!(manager.target().count("acquire"), 0);
        assert_eq!(manager.target().count("present"), 0);
        assert_eq!(manager.target().submissions, vec![(0, false, true)]);

        manager.set_minimized(false);
        assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
    }

    #[test]
    fn test_failed_rebuild_can_be_retried() {
        let mut manager = manager();
        manager.target_mut().fail_next_chain = true;

        assert!(manager.resize(1024, 768).is_err());
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert!(manager.rebuild_pending());

        assert!(manager.resize(1024, 768).unwrap());
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert!(!manager.rebuild_pending());
        assert_eq!(manager.target().double_destroys, 0);
    }

    #[test]
    fn test_failed_rebuild_after_present_retries_next_frame() {
        let mut manager = manager();
        manager
            .target_mut()
            .present_script
            .push_back(Ok(PresentOutcome::OutOfDate));
        manager.target_mut().fail_next_chain = true;

        manager.begin_frame().unwrap();
        manager.end_frame().unwrap();
        let err = manager.present().unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert!(manager.rebuild_pending());
        assert_eq!(manager.extent(), None);

        // The next frame rebuilds first, then records into the new chain.
        assert_eq!(manager.begin_frame().unwrap(), FrameStatus::Recording);
        assert_eq!(manager.target().count("create_chain"), 3);
        assert!(!manager.rebuild_pending());
        manager.end_frame().unwrap();
        assert_eq!(manager.present().unwrap(), PresentStatus::Presented);
    }

    #[test]
    fn test_failed_rebuild_on_acquire_returns_to_ready() {
        let mut manager = manager();
        manager
            .target_mut()
            .acquire_script
            .push_back(Ok(AcquireOutcome::OutOfDate));
        manager.target_mut().fail_next_chain = true;

        assert!(manager.begin_frame().is_err());
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
    }

    #[test]
    fn test_out_of_date_on_zero_area_surface_keeps_chain() {
        let mut manager = manager();
        let views_before = manager.target().live_views.clone();
        manager
            .target_mut()
            .present_script
            .push_back(Ok(PresentOutcome::OutOfDate));
        manager.target_mut().zero_surface = true;

        manager.begin_frame().unwrap();
        manager.end_frame().unwrap();
        assert_eq!(manager.present().unwrap(), PresentStatus::RebuildDeferred);
        assert_eq!(manager.target().count("create_chain"), 1);
        assert_eq!(manager.target().count("destroy_views"), 0);
        assert_eq!(manager.target().live_views, views_before);
        assert!(manager.rebuild_pending());

        // Still no area: nothing is acquired or recorded.
        assert_eq!(manager.begin_frame().unwrap(), FrameStatus::Skipped);
        assert_eq!(manager.state(), SwapchainState::Ready);
        assert_eq!(manager.target().count("acquire"), 1);

        manager.target_mut().zero_surface = false;
        assert_eq!(manager.begin_frame().unwrap(), FrameStatus::Recording);
        assert_eq!(manager.target().count("create_chain"), 2);
        assert_eq!(manager.extent(), Some(vk::Extent2D { width: 800, height: 600 }));
    }

    #[test]
    fn test_failed_recording_reuses_the_acquired_image() {
        let mut manager = manager();
        manager.target_mut().fail_next_record = true;

        let err = manager.begin_frame().unwrap_err();
        assert_eq!(err.class(), vkframe_rhi::ErrorClass::Timeout);
        assert_eq!(manager.state(), SwapchainState::Ready);

        // No second acquire: the frame waits on the semaphore already signaled.
        assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
        assert_eq!(manager.target().count("acquire"), 1);
        assert_eq!(manager.target().acquired, vec![0]);
        assert_eq!(manager.target().submissions[0], (0, true, false));
        assert_eq!(manager.target().submitted_slots, vec![0]);
    }

    #[test]
    fn test_rebuild_discards_an_unconsumed_acquire() {
        let mut manager = manager();
        manager.target_mut().fail_next_record = true;
        assert!(manager.begin_frame().is_err());

        assert!(manager.resize(1024, 768).unwrap());
        assert_eq!(manager.target().discarded_slots, vec![0]);

        assert_eq!(run_frame(&mut manager), PresentStatus::Presented);
        assert_eq!(manager.target().count("acquire"), 2);
    }

    #[test]
    fn test_retired_objects_wait_for_their_submission() {
        let mut manager = manager();
        let tracked = Arc::new(());

        manager.begin_frame().unwrap();
        manager.retire("test object", tracked.clone());
        manager.end_frame().unwrap();
        manager.present().unwrap();
        assert_eq!(Arc::strong_count(&tracked), 2);

        // Images 1 and 2 have never been submitted.
        run_frame(&mut manager);
        run_frame(&mut manager);
        assert_eq!(manager.pending_releases(), 1);

        // Recording image 0 again proves its first submission finished.
        run_frame(&mut manager);
        assert_eq!(manager.pending_releases(), 0);
        assert_eq!(Arc::strong_count(&tracked), 1);
    }

    #[test]
    fn test_shutdown_flushes_and_is_idempotent() {
        let mut manager = manager();
        manager.retire("test object", vec![0u8; 16]);
        manager.shutdown().unwrap();
        manager.shutdown().unwrap();
        assert_eq!(manager.pending_releases(), 0);
        assert_eq!(manager.target().count("destroy"), 1);
    }

    #[test]
    #[should_panic(expected = "invalid swapchain state transition Ready -> Presenting")]
    fn test_end_frame_without_begin_panics() {
        let mut manager = manager();
        let _ = manager.end_frame();
    }

    #[test]
    #[should_panic(expected = "call end_frame first")]
    fn test_present_while_recording_panics() {
        let mut manager = manager();
        manager.begin_frame().unwrap();
        let _ = manager.present();
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn test_double_initialize_panics() {
        let mut manager = manager();
        let _ = manager.initialize(800, 600);
    }

    #[test]
    fn test_settings_from_config() {
        let config = Config::default()
            .with_frames_in_flight(9)
            .with_acquire_timeout(Some(Duration::from_millis(5)))
            .with_auto_rendering(false);
        let settings = SwapchainSettings::from_config(&config);
        assert_eq!(settings.frames_in_flight, MAX_FRAMES_IN_FLIGHT as usize);
        assert_eq!(settings.timeout_ns, 5_000_000);
        assert!(!settings.options.auto_begin_dynamic_rendering);
        assert!(settings.options.auto_transition_frame_buffer);
    }
}
