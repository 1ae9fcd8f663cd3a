//! Windowing collaborator for the frame layer.
//!
//! This crate provides:
//! - A winit window that tracks its drawable size and minimized state
//! - An RAII Vulkan surface created through `ash-window`
//! - The instance extensions surface creation needs on this platform

mod window;

pub use window::{Surface, Window, required_extensions};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
