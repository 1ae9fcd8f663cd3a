//! Logical device, queues and per-device shared state.
//!
//! # Overview
//!
//! [`DeviceContext`] owns everything that lives exactly as long as the
//! logical device:
//! - One queue per [`QueueKind`] plus the present queue (roles may alias)
//! - The [`MemoryAllocator`]
//! - The optional debug-utils loader used for naming
//! - The null descriptor-set layout used to pad sparse pipeline layouts
//!
//! Every resource holds an `Arc<DeviceContext>`, so the device is destroyed
//! only after the last resource has released its handles. The allocator is
//! torn down before `vkDestroyDevice`.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::physical_device::select_physical_device;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::command::QueueKind;
//! use ash::vk;
//!
//! let instance = Instance::new("example", false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let physical_device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//!
//! let device = DeviceContext::new(&instance, &physical_device_info)
//!     .expect("Failed to create logical device");
//!
//! let graphics = device.queue(QueueKind::Graphics);
//! let null_layout = device.null_descriptor_set_layout().expect("null layout");
//! ```

use std::ffi::CStr;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, PoisonError};

use ash::vk;
use tracing::{debug, error, info};

use crate::allocator::MemoryAllocator;
use crate::command::QueueKind;
use crate::debug::DebugUtils;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME, ash::khr::dynamic_rendering::NAME];

/// Extensions enabled only when the device exposes them.
const OPTIONAL_EXTENSIONS: &[&CStr] = &[
    ash::khr::acceleration_structure::NAME,
    ash::khr::deferred_host_operations::NAME,
];

/// Depth formats in order of preference, with and without stencil.
pub fn depth_format_candidates(with_stencil: bool) -> &'static [vk::Format] {
    if with_stencil {
        &[vk::Format::D24_UNORM_S8_UINT, vk::Format::D32_SFLOAT_S8_UINT]
    } else {
        &[
            vk::Format::D32_SFLOAT,
            vk::Format::D24_UNORM_S8_UINT,
            vk::Format::D32_SFLOAT_S8_UINT,
        ]
    }
}

/// Logical device plus the state every resource shares.
pub struct DeviceContext {
    device: ash::Device,
    instance: ash::Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    allocator: ManuallyDrop<MemoryAllocator>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: vk::Queue,
    copy_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
    debug_utils: Option<DebugUtils>,
    acceleration_structures: bool,
    null_layout: Mutex<Option<vk::DescriptorSetLayout>>,
}

impl DeviceContext {
    /// Creates the logical device, its queues and the memory allocator.
    ///
    /// Enabled on top of the required extensions:
    /// - Vulkan 1.2 descriptor indexing and buffer device address
    /// - Vulkan 1.3 dynamic rendering and synchronization2
    /// - Base features the GPU reports (anisotropy, wireframe, wide lines)
    /// - Acceleration structures when exposed
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let graphics_family = queue_families.graphics_family.ok_or(RhiError::NoSuitableGpu)?;
        let present_family = queue_families.present_family.ok_or(RhiError::NoSuitableGpu)?;
        let compute_family = queue_families.compute_family.unwrap_or(graphics_family);
        let copy_family = queue_families.copy_family.unwrap_or(graphics_family);

        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let available = unsafe {
            instance
                .handle()
                .enumerate_device_extension_properties(physical_device_info.device)?
        };
        let has_extension = |name: &CStr| {
            available
                .iter()
                .any(|ext| ext.extension_name_as_c_str().is_ok_and(|n| n == name))
        };
        let acceleration_structures = OPTIONAL_EXTENSIONS.iter().all(|ext| has_extension(ext));

        let mut extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();
        if acceleration_structures {
            extension_names.extend(OPTIONAL_EXTENSIONS.iter().map(|ext| ext.as_ptr()));
        }

        let mut features_1_2 = vk::PhysicalDeviceVulkan12Features::default()
            .descriptor_indexing(true)
            .buffer_device_address(true)
            .runtime_descriptor_array(true)
            .descriptor_binding_partially_bound(true)
            .descriptor_binding_variable_descriptor_count(true)
            .shader_sampled_image_array_non_uniform_indexing(true);

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true)
            .maintenance4(true);

        let mut acceleration_features =
            vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
                .acceleration_structure(true);

        let supported = &physical_device_info.features;
        let features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(supported.sampler_anisotropy == vk::TRUE)
            .fill_mode_non_solid(supported.fill_mode_non_solid == vk::TRUE)
            .wide_lines(supported.wide_lines == vk::TRUE)
            .multi_draw_indirect(supported.multi_draw_indirect == vk::TRUE)
            .tessellation_shader(supported.tessellation_shader == vk::TRUE)
            .geometry_shader(supported.geometry_shader == vk::TRUE);

        let mut create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut features_1_2)
            .push_next(&mut features_1_3);
        if acceleration_structures {
            create_info = create_info.push_next(&mut acceleration_features);
        }

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)
        }
        .map_err(|e| RhiError::creation("logical device", e))?;

        info!(
            "Logical device created with {} extension(s)",
            extension_names.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        let compute_queue = unsafe { device.get_device_queue(compute_family, 0) };
        let copy_queue = unsafe { device.get_device_queue(copy_family, 0) };
        debug!(
            "Queues: graphics={} present={} compute={} copy={}",
            graphics_family, present_family, compute_family, copy_family
        );

        let allocator = match MemoryAllocator::new(
            instance.handle(),
            &device,
            physical_device_info.device,
        ) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e);
            }
        };
        info!("GPU memory allocator initialized");

        let debug_utils = instance
            .has_debug_utils()
            .then(|| DebugUtils::new(instance.handle(), &device));

        Ok(Arc::new(Self {
            device,
            instance: instance.handle().clone(),
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            allocator: ManuallyDrop::new(allocator),
            graphics_queue,
            present_queue,
            compute_queue,
            copy_queue,
            queue_families,
            debug_utils,
            acceleration_structures,
            null_layout: Mutex::new(None),
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the instance function table.
    #[inline]
    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the physical device properties.
    #[inline]
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    /// Returns the device limits.
    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    /// Returns the queue for a role. Roles without a dedicated family alias
    /// the graphics queue.
    #[inline]
    pub fn queue(&self, kind: QueueKind) -> vk::Queue {
        match kind {
            QueueKind::Graphics => self.graphics_queue,
            QueueKind::Copy => self.copy_queue,
            QueueKind::AsyncCompute => self.compute_queue,
        }
    }

    /// Returns the family index backing a queue role.
    #[inline]
    pub fn queue_family(&self, kind: QueueKind) -> u32 {
        let graphics = self.queue_families.graphics_family.unwrap_or_default();
        match kind {
            QueueKind::Graphics => graphics,
            QueueKind::Copy => self.queue_families.copy_family.unwrap_or(graphics),
            QueueKind::AsyncCompute => self.queue_families.compute_family.unwrap_or(graphics),
        }
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the memory allocator.
    #[inline]
    pub fn allocator(&self) -> &MemoryAllocator {
        &self.allocator
    }

    /// Returns the debug-utils loader when validation is enabled.
    #[inline]
    pub fn debug_utils(&self) -> Option<&DebugUtils> {
        self.debug_utils.as_ref()
    }

    /// True if acceleration-structure descriptors can be written.
    #[inline]
    pub fn supports_acceleration_structures(&self) -> bool {
        self.acceleration_structures
    }

    /// Names a Vulkan object for validation messages and captures.
    ///
    /// Does nothing for an empty name or when debug utils are unavailable.
    pub fn set_debug_name<H: vk::Handle>(&self, handle: H, name: &str) {
        if let Some(debug_utils) = &self.debug_utils {
            debug_utils.set_name(handle, name);
        }
    }

    /// Returns the shared descriptor-set layout with zero bindings.
    ///
    /// Created on first use and destroyed with the device. Pipeline layouts
    /// use it to fill set slots below the highest bound slot.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout cannot be created.
    pub fn null_descriptor_set_layout(&self) -> RhiResult<vk::DescriptorSetLayout> {
        let mut slot = self.null_layout.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(layout) = *slot {
            return Ok(layout);
        }

        let create_info = vk::DescriptorSetLayoutCreateInfo::default();
        let layout = unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| RhiError::creation("null descriptor set layout", e))?;
        self.set_debug_name(layout, "null descriptor set layout");
        debug!("Created null descriptor set layout");

        *slot = Some(layout);
        Ok(layout)
    }

    /// True if `format` supports `features` with the given tiling.
    pub fn supports_format_features(
        &self,
        format: vk::Format,
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> bool {
        let props = unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        };
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            _ => props.optimal_tiling_features.contains(features),
        }
    }

    /// Returns the first candidate supporting `features` with optimal tiling.
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        candidates.iter().copied().find(|&format| {
            self.supports_format_features(format, vk::ImageTiling::OPTIMAL, features)
        })
    }

    /// Picks a depth attachment format.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if no candidate is supported.
    pub fn find_depth_format(&self, with_stencil: bool) -> RhiResult<vk::Format> {
        self.find_supported_format(
            depth_format_candidates(with_stencil),
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
        .ok_or(RhiError::creation(
            "depth attachment",
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
        ))
    }

    /// Waits for the device to become idle.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle() }.map_err(|e| match e {
            vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
            other => RhiError::VulkanError(other),
        })
    }

    /// Submits to the queue for `kind`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are recorded and were allocated for this role
    /// - The fence (if not null) is unsignaled and not in use
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost.
    pub unsafe fn submit(
        &self,
        kind: QueueKind,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.queue(kind), submit_infos, fence)
        }
        .map_err(|e| match e {
            vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
            other => RhiError::VulkanError(other),
        })
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            let null_layout = self
                .null_layout
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(layout) = null_layout {
                self.device.destroy_descriptor_set_layout(layout, None);
            }

            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::dynamic_rendering::NAME));
    }

    #[test]
    fn test_depth_candidates() {
        assert_eq!(depth_format_candidates(false)[0], vk::Format::D32_SFLOAT);
        assert_eq!(depth_format_candidates(true)[0], vk::Format::D24_UNORM_S8_UINT);
        assert!(
            depth_format_candidates(true)
                .iter()
                .all(|f| *f != vk::Format::D32_SFLOAT)
        );
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DeviceContext>();
    }
}
