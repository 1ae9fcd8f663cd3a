//! Debug names and command-buffer labels.
//!
//! Everything here is a no-op when `VK_EXT_debug_utils` was not enabled on the
//! instance, so callers can name objects unconditionally.

use std::ffi::CString;

use ash::vk;
use tracing::trace;

/// Converts a label into a C string, dropping interior NULs.
///
/// Returns `None` for an empty label so nothing is submitted.
pub fn debug_label(name: &str) -> Option<CString> {
    if name.is_empty() {
        return None;
    }
    let bytes: Vec<u8> = name.bytes().filter(|&b| b != 0).collect();
    CString::new(bytes).ok()
}

/// Device-level debug utils loader.
pub struct DebugUtils {
    loader: ash::ext::debug_utils::Device,
}

impl DebugUtils {
    pub(crate) fn new(instance: &ash::Instance, device: &ash::Device) -> Self {
        Self {
            loader: ash::ext::debug_utils::Device::new(instance, device),
        }
    }

    /// Attaches a name to any Vulkan handle.
    pub fn set_name<H: vk::Handle>(&self, handle: H, name: &str) {
        let Some(label) = debug_label(name) else {
            return;
        };
        let info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&label);
        // Naming is best effort; a failure only loses the label.
        if let Err(e) = unsafe { self.loader.set_debug_utils_object_name(&info) } {
            trace!("Failed to name object '{}': {:?}", name, e);
        }
    }

    /// Opens a named region in a command buffer.
    pub fn begin_label(&self, command_buffer: vk::CommandBuffer, name: &str, colour: [f32; 4]) {
        let Some(label) = debug_label(name) else {
            return;
        };
        let info = vk::DebugUtilsLabelEXT::default()
            .label_name(&label)
            .color(colour);
        unsafe { self.loader.cmd_begin_debug_utils_label(command_buffer, &info) };
    }

    /// Closes the innermost region opened with [`DebugUtils::begin_label`].
    pub fn end_label(&self, command_buffer: vk::CommandBuffer) {
        unsafe { self.loader.cmd_end_debug_utils_label(command_buffer) };
    }

    /// Inserts a single marker into a command buffer.
    pub fn insert_label(&self, command_buffer: vk::CommandBuffer, name: &str, colour: [f32; 4]) {
        let Some(label) = debug_label(name) else {
            return;
        };
        let info = vk::DebugUtilsLabelEXT::default()
            .label_name(&label)
            .color(colour);
        unsafe { self.loader.cmd_insert_debug_utils_label(command_buffer, &info) };
    }
}
