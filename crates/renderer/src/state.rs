//! Swapchain lifecycle states.
//!
//! ```text
//!                  +-----------------------------------------+
//!                  v                                         |
//! Uninitialized -> Ready -> Acquiring -> Rendering -> Presenting
//!                  |  ^        |                         |
//!                  v  |        v                         |
//!                 Resizing <---+-------------------------+
//! ```
//!
//! Any state may move to `ShutDown`. Requesting any other transition is a
//! programming error and panics.

use std::fmt;

/// Where the swapchain manager is in its frame cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SwapchainState {
    /// No image set exists yet.
    Uninitialized,
    /// Between frames. A resize may be requested.
    Ready,
    /// Waiting on the presentation engine for an image.
    Acquiring,
    /// The frame's command buffer is recording.
    Rendering,
    /// The frame was submitted and is being handed to the presentation engine.
    Presenting,
    /// Tearing down and rebuilding the image set.
    Resizing,
    /// Resources are released; no further transitions are valid.
    ShutDown,
}

impl SwapchainState {
    /// True if `self -> next` is an edge of the state machine.
    pub fn can_transition_to(self, next: SwapchainState) -> bool {
        use SwapchainState::*;

        match (self, next) {
            (ShutDown, _) => false,
            (_, ShutDown) => true,
            (Uninitialized, Ready) => true,
            (Ready, Acquiring) | (Ready, Resizing) => true,
            // A timed-out acquire leaves the chain untouched.
            (Acquiring, Rendering) | (Acquiring, Resizing) | (Acquiring, Ready) => true,
            (Rendering, Presenting) => true,
            (Presenting, Ready) | (Presenting, Resizing) => true,
            // Failed or deferred rebuilds also land in Ready, still pending.
            (Resizing, Ready) => true,
            _ => false,
        }
    }

    /// True while a frame is between `begin_frame` and `present`.
    #[inline]
    pub fn in_frame(self) -> bool {
        matches!(
            self,
            SwapchainState::Acquiring | SwapchainState::Rendering | SwapchainState::Presenting
        )
    }

    /// Moves to `next`.
    ///
    /// # Panics
    ///
    /// Panics if the transition is not an edge of the state machine.
    pub(crate) fn advance(&mut self, next: SwapchainState) {
        assert!(
            self.can_transition_to(next),
            "invalid swapchain state transition {self} -> {next}"
        );
        *self = next;
    }
}

impl fmt::Display for SwapchainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SwapchainState::Uninitialized => "Uninitialized",
            SwapchainState::Ready => "Ready",
            SwapchainState::Acquiring => "Acquiring",
            SwapchainState::Rendering => "Rendering",
            SwapchainState::Presenting => "Presenting",
            SwapchainState::Resizing => "Resizing",
            SwapchainState::ShutDown => "ShutDown",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::SwapchainState::*;
    use super::*;

    #[test]
    fn test_frame_cycle() {
        let mut state = Uninitialized;
        for next in [Ready, Acquiring, Rendering, Presenting, Ready] {
            state.advance(next);
        }
        assert_eq!(state, Ready);
    }

    #[test]
    fn test_resize_edges() {
        assert!(Ready.can_transition_to(Resizing));
        assert!(Acquiring.can_transition_to(Resizing));
        assert!(Presenting.can_transition_to(Resizing));
        assert!(Resizing.can_transition_to(Ready));
        assert!(!Rendering.can_transition_to(Resizing));
        assert!(!Uninitialized.can_transition_to(Resizing));
        assert!(!Resizing.can_transition_to(Acquiring));
        assert!(!Resizing.can_transition_to(Resizing));
    }

    #[test]
    fn test_shutdown_is_terminal() {
        for state in [Uninitialized, Ready, Acquiring, Rendering, Presenting, Resizing] {
            assert!(state.can_transition_to(ShutDown));
        }
        assert!(!ShutDown.can_transition_to(Ready));
        assert!(!ShutDown.can_transition_to(ShutDown));
    }

    #[test]
    fn test_in_frame() {
        assert!(Rendering.in_frame());
        assert!(!Ready.in_frame());
        assert!(!Resizing.in_frame());
    }

    #[test]
    #[should_panic(expected = "invalid swapchain state transition Ready -> Presenting")]
    fn test_skipping_a_state_panics() {
        let mut state = Ready;
        state.advance(Presenting);
    }

    #[test]
    #[should_panic(expected = "Uninitialized -> Acquiring")]
    fn test_frame_before_initialize_panics() {
        let mut state = Uninitialized;
        state.advance(Acquiring);
    }
}
