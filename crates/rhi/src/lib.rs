//! Vulkan host-side layer (Render Hardware Interface).
//!
//! This crate wraps `ash` with owned, reference-counted GPU objects:
//! - Instance, physical device selection and [`device::DeviceContext`]
//! - Memory allocation and buffer/image builders
//! - Shader reflection, descriptor set layouts and pipeline builders
//! - Descriptor pools, writes and coalescing set binders
//! - Command pools per queue role and one-shot submission
//! - Layout transitions, mip generation and per-subresource layout tracking
//! - Swapchain, synchronization and fence-gated deferred destruction

mod error;

pub mod allocator;
pub mod barrier;
pub mod binder;
pub mod buffer;
pub mod command;
pub mod debug;
pub mod deferred;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod reflection;
pub mod rendering;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{ErrorClass, RhiError, RhiResult, classify_vk_result};

// Re-export ash types that users might need
pub use ash::vk;
