//! Runtime configuration.
//!
//! [`Config`] carries everything the frame layer needs to know before the
//! device exists: window size, validation, presentation preferences and the
//! per-frame automation switches. Values start from [`Config::default`] and
//! can be overridden from the environment with [`Config::from_env`].
//!
//! | variable | field |
//! |---|---|
//! | `VKFRAME_WIDTH` / `VKFRAME_HEIGHT` | initial drawable size |
//! | `VKFRAME_VALIDATION` | `enable_validation` |
//! | `VKFRAME_VSYNC` | `vsync` |
//! | `VKFRAME_FRAMES_IN_FLIGHT` | `frames_in_flight` |
//! | `VKFRAME_ACQUIRE_TIMEOUT_MS` | `acquire_timeout` (`0` waits forever) |
//! | `VKFRAME_STRICT_REFLECTION` | `strict_reflection` |
//! | `VKFRAME_LOG` | `log_filter` |

use std::time::Duration;

use glam::Vec4;

use crate::error::{Error, Result};
use crate::logging::DEFAULT_LOG_FILTER;

/// Upper bound for frames in flight.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 4;

/// Runtime configuration for the frame layer.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Window title.
    pub title: String,
    /// Initial drawable width in pixels.
    pub width: u32,
    /// Initial drawable height in pixels.
    pub height: u32,
    /// Enable the Khronos validation layer and debug naming.
    pub enable_validation: bool,
    /// Prefer FIFO presentation over mailbox/immediate.
    pub vsync: bool,
    /// Number of frames the host may record ahead of the GPU.
    pub frames_in_flight: u32,
    /// Bound on image acquisition and frame fence waits. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
    /// Transition the swap image to colour-attachment layout in `begin_frame`.
    pub auto_transition_frame_buffer: bool,
    /// Begin dynamic rendering over colour + depth in `begin_frame`.
    pub auto_begin_dynamic_rendering: bool,
    /// Clear colour used by automatic dynamic rendering.
    pub clear_colour: Vec4,
    /// Panic on descriptor type/count mismatches between shader stages.
    pub strict_reflection: bool,
    /// Fallback tracing filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            title: "vkframe".to_string(),
            width: 1280,
            height: 720,
            enable_validation: cfg!(debug_assertions),
            vsync: false,
            frames_in_flight: 2,
            acquire_timeout: Some(Duration::from_secs(1)),
            auto_transition_frame_buffer: true,
            auto_begin_dynamic_rendering: true,
            clear_colour: Vec4::new(0.2, 0.2, 0.2, 1.0),
            strict_reflection: false,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `VKFRAME_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a variable is present but malformed.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value is present but malformed.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VKFRAME_WIDTH") {
            self.width = parse_u32("VKFRAME_WIDTH", &v)?;
        }
        if let Some(v) = lookup("VKFRAME_HEIGHT") {
            self.height = parse_u32("VKFRAME_HEIGHT", &v)?;
        }
        if let Some(v) = lookup("VKFRAME_VALIDATION") {
            self.enable_validation = parse_bool("VKFRAME_VALIDATION", &v)?;
        }
        if let Some(v) = lookup("VKFRAME_VSYNC") {
            self.vsync = parse_bool("VKFRAME_VSYNC", &v)?;
        }
        if let Some(v) = lookup("VKFRAME_FRAMES_IN_FLIGHT") {
            let frames = parse_u32("VKFRAME_FRAMES_IN_FLIGHT", &v)?;
            if frames == 0 || frames > MAX_FRAMES_IN_FLIGHT {
                return Err(Error::config(
                    "VKFRAME_FRAMES_IN_FLIGHT",
                    format!("must be in 1..={MAX_FRAMES_IN_FLIGHT}, got {frames}"),
                ));
            }
            self.frames_in_flight = frames;
        }
        if let Some(v) = lookup("VKFRAME_ACQUIRE_TIMEOUT_MS") {
            let ms = parse_u32("VKFRAME_ACQUIRE_TIMEOUT_MS", &v)?;
            self.acquire_timeout = (ms > 0).then(|| Duration::from_millis(u64::from(ms)));
        }
        if let Some(v) = lookup("VKFRAME_STRICT_REFLECTION") {
            self.strict_reflection = parse_bool("VKFRAME_STRICT_REFLECTION", &v)?;
        }
        if let Some(v) = lookup("VKFRAME_LOG") {
            self.log_filter = v;
        }
        Ok(self)
    }

    /// Sets the window title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Sets the initial drawable size.
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Enables or disables validation layers.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = enabled;
        self
    }

    /// Enables or disables vsync.
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Sets the number of frames in flight, clamped to `1..=4`.
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames.clamp(1, MAX_FRAMES_IN_FLIGHT);
        self
    }

    /// Sets the acquire timeout. `None` waits forever.
    pub fn with_acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Toggles the automatic swap-image layout transition.
    pub fn with_auto_transition(mut self, enabled: bool) -> Self {
        self.auto_transition_frame_buffer = enabled;
        self
    }

    /// Toggles automatic dynamic rendering in `begin_frame`.
    pub fn with_auto_rendering(mut self, enabled: bool) -> Self {
        self.auto_begin_dynamic_rendering = enabled;
        self
    }

    /// Sets the clear colour.
    pub fn with_clear_colour(mut self, colour: Vec4) -> Self {
        self.clear_colour = colour;
        self
    }

    /// Toggles strict reflection.
    pub fn with_strict_reflection(mut self, strict: bool) -> Self {
        self.strict_reflection = strict;
        self
    }

    /// Acquire timeout in nanoseconds as Vulkan expects it.
    pub fn acquire_timeout_ns(&self) -> u64 {
        self.acquire_timeout
            .map_or(u64::MAX, |t| u64::try_from(t.as_nanos()).unwrap_or(u64::MAX))
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::config(key, format!("'{value}' is not a number: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(key, format!("'{value}' is not a boolean"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.frames_in_flight, 2);
        assert!(config.auto_transition_frame_buffer);
        assert!(config.auto_begin_dynamic_rendering);
        assert_eq!(config.acquire_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn test_overrides_applied() {
        let config = Config::default()
            .with_overrides(lookup(&[
                ("VKFRAME_WIDTH", "800"),
                ("VKFRAME_HEIGHT", "600"),
                ("VKFRAME_VSYNC", "yes"),
                ("VKFRAME_FRAMES_IN_FLIGHT", "3"),
                ("VKFRAME_STRICT_REFLECTION", "1"),
            ]))
            .unwrap();

        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.vsync);
        assert_eq!(config.frames_in_flight, 3);
        assert!(config.strict_reflection);
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let config = Config::default()
            .with_overrides(lookup(&[("VKFRAME_ACQUIRE_TIMEOUT_MS", "0")]))
            .unwrap();
        assert_eq!(config.acquire_timeout, None);
        assert_eq!(config.acquire_timeout_ns(), u64::MAX);
    }

    #[test]
    fn test_timeout_in_nanoseconds() {
        let config = Config::default().with_acquire_timeout(Some(Duration::from_millis(5)));
        assert_eq!(config.acquire_timeout_ns(), 5_000_000);
    }

    #[test]
    fn test_malformed_values_rejected() {
        let err = Config::default()
            .with_overrides(lookup(&[("VKFRAME_WIDTH", "wide")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config { ref key, .. } if key == "VKFRAME_WIDTH"));

        let err = Config::default()
            .with_overrides(lookup(&[("VKFRAME_VALIDATION", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(
            Config::default()
                .with_overrides(lookup(&[("VKFRAME_FRAMES_IN_FLIGHT", "0")]))
                .is_err()
        );
        assert_eq!(Config::default().with_frames_in_flight(9).frames_in_flight, 4);
        assert_eq!(Config::default().with_frames_in_flight(0).frames_in_flight, 1);
    }
}
