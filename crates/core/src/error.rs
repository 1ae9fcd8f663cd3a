//! Error types shared by the windowing and configuration layers.

use thiserror::Error;

/// Errors raised outside the GPU abstraction layer.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or surface hookup failed.
    #[error("Window error: {0}")]
    Window(String),

    /// Vulkan surface creation failed.
    #[error("Surface error: {0}")]
    Surface(String),

    /// A configuration value could not be parsed or is out of range.
    #[error("Config error: {key}: {message}")]
    Config {
        /// The environment key or field name.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Result type alias using the core Error type.
pub type Result<T> = std::result::Result<T, Error>;
