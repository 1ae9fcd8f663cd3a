//! Frame orchestration on top of the RHI.
//!
//! This crate drives the per-frame cycle:
//! - Swapchain state machine and resize handling
//! - Per-image command buffers and synchronization
//! - Depth buffer management
//! - Fence-gated release of retired objects
//!
//! [`Renderer`] wires these to a window; [`SwapchainManager`] can drive any
//! [`PresentTarget`](target::PresentTarget).

pub mod depth_buffer;
pub mod frame;
pub mod renderer;
pub mod state;
pub mod swapchain_manager;
pub mod target;
pub mod vulkan_target;

pub use renderer::Renderer;
pub use swapchain_manager::{SwapchainManager, SwapchainSettings};
pub use vkframe_core::MAX_FRAMES_IN_FLIGHT;
