//! Per-frame bookkeeping.

/// What `begin_frame` records automatically before handing the command
/// buffer to client code.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameOptions {
    /// Move the swap image into colour-attachment layout before any draws.
    pub auto_transition_frame_buffer: bool,
    /// Begin a dynamic rendering pass over the swap image and depth buffer.
    pub auto_begin_dynamic_rendering: bool,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            auto_transition_frame_buffer: true,
            auto_begin_dynamic_rendering: true,
        }
    }
}

impl FrameOptions {
    /// Options for a frame that has no swap image to draw into.
    pub const BARE: FrameOptions = FrameOptions {
        auto_transition_frame_buffer: false,
        auto_begin_dynamic_rendering: false,
    };
}

/// State of the frame in flight on the host.
///
/// Reset by `begin_frame`, finalized by `present`. Only the swap index and
/// the frame counter survive from one frame to the next.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameState {
    /// Index of the swap image the current frame renders to.
    pub swap_index: u32,
    /// Frames presented (or completed while minimized) since initialization.
    pub frame_counter: u64,
    /// Frame-in-flight slot used by the current frame.
    pub slot: usize,
    /// Submission is suppressed to the invisible surface.
    pub minimized: bool,
    /// The current frame's command buffer is recording.
    pub recording: bool,
}

impl FrameState {
    /// Slot for frame `frame_counter` with `slots` frames in flight.
    #[inline]
    pub fn slot_for(frame_counter: u64, slots: usize) -> usize {
        (frame_counter % slots.max(1) as u64) as usize
    }
}

/// Outcome of `begin_frame`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The command buffer is recording; draw, then `end_frame` and `present`.
    Recording,
    /// The surface was out of date and the chain was rebuilt. Skip this frame.
    Rebuilt,
    /// The chain needs a rebuild the surface cannot take yet, as while
    /// minimized. Nothing was recorded; try again next frame.
    Skipped,
}

/// Outcome of `present`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    /// The image was queued for display.
    Presented,
    /// Nothing was displayed because the window is minimized.
    Suppressed,
    /// The surface changed; the chain was rebuilt after presenting.
    Rebuilt,
    /// The chain needs a rebuild that could not run now. `begin_frame`
    /// retries it.
    RebuildDeferred,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options_record_everything() {
        let options = FrameOptions::default();
        assert!(options.auto_transition_frame_buffer);
        assert!(options.auto_begin_dynamic_rendering);

        assert_ne!(options, FrameOptions::BARE);
        assert!(!FrameOptions::BARE.auto_begin_dynamic_rendering);
    }

    #[test]
    fn test_slot_cycles() {
        let slots: Vec<usize> = (0..5).map(|n| FrameState::slot_for(n, 2)).collect();
        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(FrameState::slot_for(7, 0), 0);
    }
}
