//! Core utilities shared by every vkframe crate.
//!
//! This crate provides:
//! - Error types and result aliases
//! - Logging initialization
//! - Runtime configuration
//! - Frame timing

mod config;
mod error;
mod logging;
mod timer;

pub use config::{Config, MAX_FRAMES_IN_FLIGHT};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging, init_logging_with};
pub use timer::FrameTimer;
