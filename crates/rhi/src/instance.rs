//! The `VkInstance` that every other object in the crate hangs off.
//!
//! # Overview
//!
//! [`Instance::new`] enables exactly what the frame layer uses:
//!
//! - The surface extensions the window reports, or the platform set when
//!   the caller passes none
//! - With validation requested and installed, `VK_LAYER_KHRONOS_validation`
//!   plus `VK_EXT_debug_utils`, whose messages are forwarded to `tracing`
//!
//! Debug utils is also the extension behind object names, so
//! [`DeviceContext::set_debug_name`](crate::device::DeviceContext::set_debug_name)
//! is a no-op unless [`Instance::has_debug_utils`] is true.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::instance::Instance;
//!
//! # fn example() -> Result<(), vkframe_rhi::RhiError> {
//! let instance = Instance::new("example", cfg!(debug_assertions), &[])?;
//! if !instance.has_debug_utils() {
//!     // objects stay unnamed in captures
//! }
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, warn};

use crate::error::{RhiError, RhiResult};

/// Engine name reported to drivers and tools.
pub const ENGINE_NAME: &CStr = c"vkframe";

/// Dynamic rendering and synchronization2 are core from 1.3.
pub const API_VERSION: u32 = vk::API_VERSION_1_3;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Owns the loader, the instance and, with validation, the messenger that
/// routes validation output into the log.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    messenger: Option<Messenger>,
}

/// `VK_EXT_debug_utils` loader and the messenger created through it.
struct Messenger {
    loader: ash::ext::debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
}

impl Instance {
    /// Loads Vulkan and creates the instance.
    ///
    /// # Arguments
    ///
    /// * `app_name` - Reported to the driver; interior NULs fall back to
    ///   [`ENGINE_NAME`]
    /// * `validation` - Enable validation if the layer is installed. A
    ///   missing layer is logged, not an error
    /// * `surface_extensions` - Extensions the window needs for its surface.
    ///   Empty selects [`platform_surface_extensions`]
    ///
    /// # Errors
    ///
    /// - [`RhiError::LoadingError`] if no Vulkan loader is installed
    /// - [`RhiError::VulkanError`] if an extension is missing or the
    ///   instance or messenger cannot be created
    pub fn new(
        app_name: &str,
        validation: bool,
        surface_extensions: &[*const c_char],
    ) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };
        let validation = validation && layer_installed(&entry, VALIDATION_LAYER)?;

        let app_name = CString::new(app_name).unwrap_or_else(|_| ENGINE_NAME.to_owned());
        let version = vk::make_api_version(0, 0, 1, 0);
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(version)
            .engine_name(ENGINE_NAME)
            .engine_version(version)
            .api_version(API_VERSION);

        let extensions = instance_extensions(surface_extensions, validation);
        let layers: &[*const c_char] = if validation {
            &[VALIDATION_LAYER.as_ptr()]
        } else {
            &[]
        };

        // Chained so instance creation and destruction are covered as well.
        let mut messenger_info = messenger_create_info();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(layers);
        if validation {
            create_info = create_info.push_next(&mut messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let info = messenger_create_info();
            match unsafe { loader.create_debug_utils_messenger(&info, None) } {
                Ok(handle) => Some(Messenger { loader, handle }),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance ready: {} extension(s), validation {}",
            extensions.len(),
            if validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// True if the validation layer is active.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }

    /// True if `VK_EXT_debug_utils` is enabled, so objects can be named.
    #[inline]
    pub fn has_debug_utils(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let Some(messenger) = self.messenger.take() {
            unsafe {
                messenger
                    .loader
                    .destroy_debug_utils_messenger(messenger.handle, None);
            }
        }
        unsafe { self.instance.destroy_instance(None) };
        debug!("Vulkan instance destroyed");
    }
}

/// Surface extensions for the platforms winit targets.
pub fn platform_surface_extensions() -> Vec<&'static CStr> {
    let mut extensions = vec![ash::khr::surface::NAME];

    #[cfg(target_os = "windows")]
    extensions.push(ash::khr::win32_surface::NAME);

    #[cfg(all(unix, not(target_os = "macos")))]
    extensions.extend([
        ash::khr::xlib_surface::NAME,
        ash::khr::xcb_surface::NAME,
        ash::khr::wayland_surface::NAME,
    ]);

    #[cfg(target_os = "macos")]
    extensions.push(ash::ext::metal_surface::NAME);

    extensions
}

/// Surface extensions (or the platform set), plus debug utils when
/// validating.
fn instance_extensions(surface: &[*const c_char], debug_utils: bool) -> Vec<*const c_char> {
    let mut extensions: Vec<*const c_char> = if surface.is_empty() {
        platform_surface_extensions()
            .into_iter()
            .map(CStr::as_ptr)
            .collect()
    } else {
        surface.to_vec()
    };
    if debug_utils {
        extensions.push(ash::ext::debug_utils::NAME.as_ptr());
    }
    extensions
}

fn layer_installed(entry: &Entry, name: &CStr) -> RhiResult<bool> {
    let layers = unsafe { entry.enumerate_instance_layer_properties()? };
    let installed = layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|n| n == name));
    if !installed {
        warn!("{:?} requested but not installed, continuing without it", name);
    }
    Ok(installed)
}

fn messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(log_vulkan_message))
}

/// Tag for a message's type flags. Validation outranks performance, which
/// outranks general.
fn message_tag(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if types.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// Forwards a debug-utils message to `tracing` at the matching level.
///
/// # Safety
///
/// Called by the loader with callback data valid for the duration of the
/// call.
unsafe extern "system" fn log_vulkan_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = match unsafe { data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        },
        _ => Cow::Borrowed("(no message)"),
    };
    let tag = message_tag(types);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "[{}] {}", tag, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "[{}] {}", tag, message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!(target: "vulkan", "[{}] {}", tag, message);
    } else {
        debug!(target: "vulkan", "[{}] {}", tag, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_extensions_start_with_surface() {
        let extensions = platform_surface_extensions();
        assert_eq!(extensions[0], ash::khr::surface::NAME);
        #[cfg(any(target_os = "windows", unix))]
        assert!(extensions.len() >= 2);
    }

    #[test]
    fn test_caller_extensions_replace_platform_set() {
        let surface = [ash::khr::surface::NAME.as_ptr()];
        assert_eq!(instance_extensions(&surface, false), surface.to_vec());

        let with_debug = instance_extensions(&surface, true);
        assert_eq!(with_debug.len(), 2);
        assert_eq!(with_debug[1], ash::ext::debug_utils::NAME.as_ptr());
    }

    #[test]
    fn test_empty_surface_list_uses_platform_set() {
        let extensions = instance_extensions(&[], false);
        assert_eq!(extensions.len(), platform_surface_extensions().len());
    }

    #[test]
    fn test_message_tag_prefers_validation() {
        type T = vk::DebugUtilsMessageTypeFlagsEXT;
        assert_eq!(message_tag(T::VALIDATION | T::PERFORMANCE), "validation");
        assert_eq!(message_tag(T::PERFORMANCE), "performance");
        assert_eq!(message_tag(T::GENERAL), "general");
        assert_eq!(message_tag(T::empty()), "general");
    }

    #[test]
    fn test_instance_without_validation() {
        match Instance::new("vkframe-test", false, &[]) {
            Ok(instance) => {
                assert!(!instance.has_validation());
                assert!(!instance.has_debug_utils());
            }
            // No loader on this machine.
            Err(RhiError::LoadingError(_)) => {}
            Err(e) => panic!("unexpected error: {e:?}"),
        }
    }
}
