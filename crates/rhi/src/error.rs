//! Error types for the GPU abstraction layer.
//!
//! Configuration mistakes (invalid builder state, slot overflow, duplicate
//! binding indices) panic at the call site. Everything in this module is a
//! runtime outcome that the frame orchestrator has to route: retry after a
//! resize, report a timeout, or shut down.

use std::time::Duration;

use ash::vk;
use thiserror::Error;

/// How the caller is expected to react to an [`RhiError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// The device rejected a create/allocate call. The caller may recover.
    ResourceCreation,
    /// The surface is out of date or suboptimal. Drives a swapchain resize.
    Transient,
    /// A bounded wait expired.
    Timeout,
    /// The device is unusable. The render loop must terminate.
    Fatal,
}

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    #[error("Failed to create {what}: {source}")]
    ResourceCreation {
        what: &'static str,
        #[source]
        source: vk::Result,
    },

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Surface is out of date")]
    SurfaceOutOfDate,

    #[error("Timed out after {timeout:?} waiting for {what}")]
    Timeout { what: &'static str, timeout: Duration },

    #[error("Device lost")]
    DeviceLost,

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

impl RhiError {
    /// Wraps a failed create call with the name of the object being created.
    pub fn creation(what: &'static str, source: vk::Result) -> Self {
        match source {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            source => Self::ResourceCreation { what, source },
        }
    }

    /// Classifies the error into the propagation taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::VulkanError(result) => classify_vk_result(*result),
            Self::ResourceCreation { .. } | Self::AllocatorError(_) => {
                ErrorClass::ResourceCreation
            }
            Self::SurfaceOutOfDate => ErrorClass::Transient,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::DeviceLost => ErrorClass::Fatal,
            Self::LoadingError(_)
            | Self::NoSuitableGpu
            | Self::SurfaceError(_)
            | Self::SwapchainError(_) => ErrorClass::Fatal,
            Self::ShaderError(_) | Self::InvalidHandle(_) | Self::PipelineError(_) => {
                ErrorClass::ResourceCreation
            }
        }
    }

    /// Returns true if the error should trigger a swapchain rebuild.
    #[inline]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Returns true if the render loop must stop.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        self.class() == ErrorClass::Fatal
    }
}

/// Maps a raw Vulkan result onto the taxonomy.
pub fn classify_vk_result(result: vk::Result) -> ErrorClass {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR => ErrorClass::Transient,
        vk::Result::TIMEOUT | vk::Result::NOT_READY => ErrorClass::Timeout,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_FORMAT_NOT_SUPPORTED
        | vk::Result::ERROR_FEATURE_NOT_PRESENT
        | vk::Result::ERROR_TOO_MANY_OBJECTS
        | vk::Result::ERROR_FRAGMENTED_POOL
        | vk::Result::ERROR_OUT_OF_POOL_MEMORY => ErrorClass::ResourceCreation,
        _ => ErrorClass::Fatal,
    }
}

/// Converts an expired wait into [`RhiError::Timeout`], device loss into
/// [`RhiError::DeviceLost`], and passes everything else through.
pub(crate) fn map_wait_result(
    result: vk::Result,
    what: &'static str,
    timeout_ns: u64,
) -> RhiError {
    match result {
        vk::Result::TIMEOUT => RhiError::Timeout {
            what,
            timeout: Duration::from_nanos(timeout_ns),
        },
        vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
        other => RhiError::VulkanError(other),
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_results_are_transient() {
        assert_eq!(
            RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DATE_KHR).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            classify_vk_result(vk::Result::SUBOPTIMAL_KHR),
            ErrorClass::Transient
        );
        assert!(RhiError::SurfaceOutOfDate.is_transient());
    }

    #[test]
    fn test_device_lost_is_fatal() {
        assert!(RhiError::VulkanError(vk::Result::ERROR_DEVICE_LOST).is_fatal());
        assert!(RhiError::DeviceLost.is_fatal());
        assert!(matches!(
            RhiError::creation("buffer", vk::Result::ERROR_DEVICE_LOST),
            RhiError::DeviceLost
        ));
    }

    #[test]
    fn test_out_of_memory_is_recoverable() {
        let err = RhiError::creation("image", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(err.class(), ErrorClass::ResourceCreation);
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_wait_timeout_is_distinct() {
        let err = map_wait_result(vk::Result::TIMEOUT, "frame fence", 1_000_000);
        assert_eq!(err.class(), ErrorClass::Timeout);
        match err {
            RhiError::Timeout { what, timeout } => {
                assert_eq!(what, "frame fence");
                assert_eq!(timeout, Duration::from_millis(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
