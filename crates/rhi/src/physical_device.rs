//! Physical device (GPU) selection.
//!
//! # Overview
//!
//! Selection walks every GPU and keeps the ones that:
//! 1. Expose a graphics queue family and a family that can present to the surface
//! 2. Support Vulkan 1.3 and the swapchain extension
//! 3. Report at least one surface format and present mode
//!
//! The survivors are scored (discrete GPUs first) and the best one wins.
//!
//! Queue families are picked the way the frame layer uses them: the first
//! graphics family, a *different* family with compute for async compute, and a
//! *different* family with transfer for copies. When no dedicated family
//! exists the role aliases onto the graphics/present family.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new("example", false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;
use crate::swapchain::SwapchainSupportDetails;

/// Queue family indices for each queue role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for graphics work and frame submission.
    pub graphics_family: Option<u32>,
    /// Family able to present to the window surface.
    pub present_family: Option<u32>,
    /// Family used for async compute. Aliases graphics when none is dedicated.
    pub compute_family: Option<u32>,
    /// Family used for copy work. Aliases graphics when none is dedicated.
    pub copy_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True when every role has a family.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some()
            && self.present_family.is_some()
            && self.compute_family.is_some()
            && self.copy_family.is_some()
    }

    /// True when async compute runs on its own family.
    #[inline]
    pub fn has_async_compute(&self) -> bool {
        self.compute_family.is_some() && self.compute_family != self.graphics_family
    }

    /// True when copies run on their own family.
    #[inline]
    pub fn has_async_copy(&self) -> bool {
        self.copy_family.is_some() && self.copy_family != self.graphics_family
    }

    /// Returns the unique queue family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(4);

        for family in [
            self.graphics_family,
            self.present_family,
            self.compute_family,
            self.copy_family,
        ]
        .into_iter()
        .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }

        families
    }
}

/// Picks queue families from the family property list.
///
/// `supports_present` is queried per family index.
pub fn pick_queue_families<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> QueueFamilyIndices
where
    F: FnMut(u32) -> bool,
{
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }
        let present = supports_present(i);

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
            if present && indices.present_family.is_none() {
                indices.present_family = Some(i);
            }
        }

        if indices.graphics_family != Some(i)
            && indices.compute_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::COMPUTE)
        {
            indices.compute_family = Some(i);
        }

        if indices.graphics_family != Some(i)
            && indices.copy_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::TRANSFER)
        {
            indices.copy_family = Some(i);
        }
    }

    // A graphics family that cannot present: fall back to any presenting family.
    if indices.present_family.is_none() {
        indices.present_family = (0..families.len() as u32)
            .find(|&i| families[i as usize].queue_count > 0 && supports_present(i));
    }

    let fallback = indices.present_family.or(indices.graphics_family);
    if indices.compute_family.is_none() {
        indices.compute_family = fallback;
    }
    if indices.copy_family.is_none() {
        indices.copy_family = fallback;
    }

    indices
}

/// Information about a physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices for each role.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Returns the total device local memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the most suitable physical device for presenting to `surface`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] if no GPU meets the requirements.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableGpu);
    }

    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| check_device_suitability(instance, device, surface, surface_loader))
        .map(|info| {
            let score = rate_device(&info);
            debug!(
                "GPU '{}' ({}) - Score: {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            (info, score)
        })
        .max_by_key(|(_, score)| *score);

    let Some((selected, score)) = best else {
        warn!("No suitable GPU found with required capabilities");
        return Err(RhiError::NoSuitableGpu);
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, Score: {}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        score
    );
    if selected.queue_families.has_async_compute() {
        info!("Device supports async compute");
    }
    if selected.queue_families.has_async_copy() {
        info!("Device supports async copy");
    }

    Ok(selected)
}

fn check_device_suitability(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Option<PhysicalDeviceInfo> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let family_properties = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let device_name = properties
        .device_name_as_c_str()
        .ok()
        .and_then(|name| name.to_str().ok())
        .unwrap_or("Unknown")
        .to_string();

    let queue_families = pick_queue_families(&family_properties, |i| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, i, surface)
            .unwrap_or(false)
    });

    if !queue_families.is_complete() {
        debug!(
            "GPU '{}' skipped: missing queue families {:?}",
            device_name, queue_families
        );
        return None;
    }

    if vk::api_version_major(properties.api_version) == 1
        && vk::api_version_minor(properties.api_version) < 3
    {
        debug!(
            "GPU '{}' skipped: Vulkan 1.3 not supported (version: {}.{})",
            device_name,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version)
        );
        return None;
    }

    if !supports_swapchain_extension(instance, device) {
        debug!("GPU '{}' skipped: no swapchain extension", device_name);
        return None;
    }

    match SwapchainSupportDetails::query(device, surface, surface_loader) {
        Ok(details) if details.is_adequate() => {}
        _ => {
            debug!("GPU '{}' skipped: inadequate surface support", device_name);
            return None;
        }
    }

    Some(PhysicalDeviceInfo {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
    })
}

fn supports_swapchain_extension(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
    let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
        return false;
    };
    extensions.iter().any(|ext| {
        // SAFETY: extension_name is a NUL-terminated array filled by the driver.
        let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
        name == ash::khr::swapchain::NAME
    })
}

/// Rates a physical device. Higher is better.
fn rate_device(info: &PhysicalDeviceInfo) -> u32 {
    let mut score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    score += info.properties.limits.max_image_dimension2_d;

    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;
    score += vram_mb.min(16000);

    if info.queue_families.has_async_compute() {
        score += 100;
    }
    if info.queue_families.has_async_copy() {
        score += 100;
    }

    score
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_single_family_aliases_every_role() {
        let families = [family(
            vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
        )];
        let indices = pick_queue_families(&families, |_| true);

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(0));
        assert_eq!(indices.compute_family, Some(0));
        assert_eq!(indices.copy_family, Some(0));
        assert!(!indices.has_async_compute());
        assert!(!indices.has_async_copy());
        assert_eq!(indices.unique_families(), vec![0]);
    }

    #[test]
    fn test_dedicated_compute_and_copy_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = pick_queue_families(&families, |i| i == 0);

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.compute_family, Some(1));
        // The first non-graphics family with transfer wins, as with compute.
        assert_eq!(indices.copy_family, Some(1));
        assert!(indices.has_async_compute());
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn test_present_on_other_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::TRANSFER),
        ];
        let indices = pick_queue_families(&families, |i| i == 1);

        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
        assert_eq!(indices.copy_family, Some(1));
        // No dedicated compute: falls back to the present family.
        assert_eq!(indices.compute_family, Some(1));
        assert!(indices.is_complete());
    }

    #[test]
    fn test_empty_families_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        let indices = pick_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
    }

    #[test]
    fn test_no_present_support_is_incomplete() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let indices = pick_queue_families(&families, |_| false);
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_unique_families_all_distinct() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
            compute_family: Some(2),
            copy_family: Some(3),
        };
        assert_eq!(indices.unique_families(), vec![0, 1, 2, 3]);
    }
}
