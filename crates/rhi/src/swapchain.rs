//! Swapchain creation, image acquisition and presentation.
//!
//! # Overview
//!
//! [`Swapchain`] wraps `VkSwapchainKHR` and the views of its images:
//! - Surface capability querying ([`SwapchainSupportDetails`])
//! - Format, present mode, extent and image count negotiation
//! - Bounded acquisition: a stalled present engine surfaces as
//!   [`RhiError::Timeout`] instead of blocking forever
//! - Recreation for resize, reusing the old chain as `old_swapchain`
//!
//! Out-of-date results are reported as [`RhiError::SurfaceOutOfDate`] so the
//! frame orchestrator can route them to a resize.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::instance::Instance;
//! use vkframe_rhi::swapchain::{Swapchain, SwapchainDesc};
//! use ash::vk;
//!
//! # fn example(
//! #     instance: &Instance,
//! #     device: Arc<DeviceContext>,
//! #     surface: vk::SurfaceKHR,
//! #     image_available: vk::Semaphore,
//! #     render_finished: vk::Semaphore,
//! # ) -> Result<(), vkframe_rhi::RhiError> {
//! let desc = SwapchainDesc { width: 800, height: 600, vsync: true };
//! let swapchain = Swapchain::new(instance, device.clone(), surface, desc)?;
//!
//! let (index, _suboptimal) = swapchain.acquire(image_available, 1_000_000_000)?;
//! // ... record and submit work that renders to swapchain.image(index) ...
//! let _suboptimal = swapchain.present(device.present_queue(), index, render_finished)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::DeviceContext;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Swapchain surface support details.
///
/// Contains information about what the surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            max_image_count_label(&capabilities)
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// True when at least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Requested swapchain parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainDesc {
    pub width: u32,
    pub height: u32,
    /// Forces FIFO presentation.
    pub vsync: bool,
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain handle and one view per image. The images themselves
/// belong to the swapchain and go away with it.
///
/// # Thread Safety
///
/// Not internally synchronized. Acquire, present and recreate must be driven
/// from the thread that runs the frame loop.
pub struct Swapchain {
    device: Arc<DeviceContext>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    color_space: vk::ColorSpaceKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    vsync: bool,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// - Preferred format: B8G8R8A8_SRGB with SRGB_NONLINEAR
    /// - Present mode: MAILBOX, then IMMEDIATE, then FIFO; FIFO when `vsync`
    /// - Image usage: COLOR_ATTACHMENT and TRANSFER_DST
    ///
    /// # Errors
    ///
    /// - [`RhiError::SwapchainError`] if the surface reports no formats or
    ///   present modes, or the requested extent is zero
    /// - [`RhiError::SurfaceOutOfDate`] while the surface has no drawable
    ///   area
    /// - [`RhiError::ResourceCreation`] if the swapchain or a view cannot be
    ///   created
    pub fn new(
        instance: &Instance,
        device: Arc<DeviceContext>,
        surface: vk::SurfaceKHR,
        desc: SwapchainDesc,
    ) -> RhiResult<Self> {
        Self::create_internal(instance, device, surface, desc, vk::SwapchainKHR::null())
    }

    fn create_internal(
        instance: &Instance,
        device: Arc<DeviceContext>,
        surface: vk::SurfaceKHR,
        desc: SwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        if desc.width == 0 || desc.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "cannot create a {}x{} swapchain",
                desc.width, desc.height
            )));
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes, desc.vsync);
        // A minimized surface reports 0x0; retry once it has an area again.
        let extent = choose_extent(&support.capabilities, desc.width, desc.height)
            .ok_or(RhiError::SurfaceOutOfDate)?;
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            extent.width, extent.height, surface_format.format, present_mode, image_count
        );

        let queue_families = device.queue_families();
        let graphics_family = queue_families
            .graphics_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let present_family = queue_families
            .present_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let queue_family_indices = [graphics_family, present_family];

        let (sharing_mode, shared_families) = if graphics_family != present_family {
            debug!(
                "Using CONCURRENT sharing between graphics ({}) and present ({}) families",
                graphics_family, present_family
            );
            (vk::SharingMode::CONCURRENT, queue_family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(|e| RhiError::creation("swapchain", e))?;

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };
        if images.len() < 2 {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(RhiError::SwapchainError(format!(
                "present engine returned {} image(s), at least 2 are required",
                images.len()
            )));
        }

        let image_views = match create_image_views(&device, &images, surface_format.format) {
            Ok(views) => views,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };
        device.set_debug_name(swapchain, "swapchain");

        info!("Swapchain created with {} images", images.len());

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            color_space: surface_format.color_space,
            extent,
            present_mode,
            vsync: desc.vsync,
        })
    }

    /// Rebuilds the swapchain for a new size.
    ///
    /// Waits for the device to go idle, destroys the old views, creates the
    /// new chain from the old one, then destroys the old chain. On failure the
    /// old chain is kept, minus its views.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceOutOfDate`], before touching the old
    /// chain, while the surface has no drawable area. Otherwise returns an
    /// error if the idle wait or creation fails.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        if surface_extent(instance, &self.device, surface, width, height)?.is_none() {
            return Err(RhiError::SurfaceOutOfDate);
        }
        self.device.wait_idle()?;

        info!("Recreating swapchain for new size: {}x{}", width, height);

        self.destroy_image_views();

        let old_swapchain = self.swapchain;
        let desc = SwapchainDesc {
            width,
            height,
            vsync: self.vsync,
        };
        let mut replacement =
            Self::create_internal(instance, self.device.clone(), surface, desc, old_swapchain)?;

        unsafe {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }

        self.swapchain = std::mem::replace(&mut replacement.swapchain, vk::SwapchainKHR::null());
        self.images = std::mem::take(&mut replacement.images);
        self.image_views = std::mem::take(&mut replacement.image_views);
        self.format = replacement.format;
        self.color_space = replacement.color_space;
        self.extent = replacement.extent;
        self.present_mode = replacement.present_mode;

        Ok(())
    }

    /// Acquires the next presentable image.
    ///
    /// # Arguments
    ///
    /// * `semaphore` - Signaled when the image is ready to be rendered to
    /// * `timeout_ns` - Bound on the wait; `u64::MAX` waits forever
    ///
    /// # Returns
    ///
    /// `(image_index, suboptimal)`. A suboptimal chain is still usable but
    /// should be rebuilt after presenting.
    ///
    /// # Errors
    ///
    /// - [`RhiError::SurfaceOutOfDate`] when the chain must be rebuilt first
    /// - [`RhiError::Timeout`] when no image became available in time
    /// - [`RhiError::DeviceLost`] on device loss
    pub fn acquire(&self, semaphore: vk::Semaphore, timeout_ns: u64) -> RhiResult<(u32, bool)> {
        self.acquire_with_fence(semaphore, vk::Fence::null(), timeout_ns)
    }

    /// Like [`acquire`](Self::acquire), additionally signaling `fence`.
    ///
    /// # Errors
    ///
    /// See [`acquire`](Self::acquire).
    pub fn acquire_with_fence(
        &self,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
        timeout_ns: u64,
    ) -> RhiResult<(u32, bool)> {
        unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, timeout_ns, semaphore, fence)
        }
        .map_err(|e| map_acquire_result(e, timeout_ns))
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// # Returns
    ///
    /// True if the chain is suboptimal and should be rebuilt.
    ///
    /// # Errors
    ///
    /// - [`RhiError::SurfaceOutOfDate`] when the chain must be rebuilt
    /// - [`RhiError::DeviceLost`] on device loss
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .map_err(map_present_result)
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn color_space(&self) -> vk::ColorSpaceKHR {
        self.color_space
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn vsync(&self) -> bool {
        self.vsync
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the swapchain image at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Destroys the image views. The swapchain itself stays usable for
    /// [`recreate`](Self::recreate).
    pub fn destroy_image_views(&mut self) {
        for image_view in self.image_views.drain(..) {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        // Null after `recreate` moved the handle out.
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

fn map_acquire_result(result: vk::Result, timeout_ns: u64) -> RhiError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::SurfaceOutOfDate,
        vk::Result::TIMEOUT | vk::Result::NOT_READY => RhiError::Timeout {
            what: "swapchain image",
            timeout: Duration::from_nanos(timeout_ns),
        },
        vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
        vk::Result::ERROR_SURFACE_LOST_KHR => {
            RhiError::SurfaceError("surface lost during acquire".to_string())
        }
        other => RhiError::VulkanError(other),
    }
}

fn map_present_result(result: vk::Result) -> RhiError {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR => RhiError::SurfaceOutOfDate,
        vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
        vk::Result::ERROR_SURFACE_LOST_KHR => {
            RhiError::SurfaceError("surface lost during present".to_string())
        }
        other => RhiError::VulkanError(other),
    }
}

fn max_image_count_label(capabilities: &vk::SurfaceCapabilitiesKHR) -> String {
    if capabilities.max_image_count == 0 {
        "unlimited".to_string()
    } else {
        capabilities.max_image_count.to_string()
    }
}

/// Picks B8G8R8A8_SRGB, then B8G8R8A8_UNORM, then whatever comes first.
///
/// `formats` must not be empty.
fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats
            .iter()
            .find(|f| f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
            .copied()
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        debug!("Selected preferred surface format: B8G8R8A8_SRGB with SRGB_NONLINEAR");
        return format;
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return format;
    }

    warn!("Using first available surface format: {:?}", formats[0].format);
    formats[0]
}

/// Extent a swapchain created now for a `width` x `height` request would
/// get, or `None` while the surface has no drawable area.
///
/// # Errors
///
/// Returns an error if the surface capabilities cannot be queried.
pub fn surface_extent(
    instance: &Instance,
    device: &DeviceContext,
    surface: vk::SurfaceKHR,
    width: u32,
    height: u32,
) -> RhiResult<Option<vk::Extent2D>> {
    let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
    let capabilities = unsafe {
        surface_loader.get_physical_device_surface_capabilities(device.physical_device(), surface)
    }?;
    Ok(choose_extent(&capabilities, width, height))
}

/// MAILBOX, then IMMEDIATE, then FIFO. `vsync` always selects FIFO, which
/// every implementation supports.
fn choose_present_mode(present_modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        debug!("Selected FIFO present mode (vsync requested)");
        return vk::PresentModeKHR::FIFO;
    }

    for mode in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
        if present_modes.contains(&mode) {
            debug!("Selected {:?} present mode", mode);
            return mode;
        }
    }

    debug!("Selected FIFO present mode (no low-latency mode available)");
    vk::PresentModeKHR::FIFO
}

/// Uses the surface's current extent unless it is the "decided by the
/// swapchain" sentinel, in which case the request is clamped to the limits.
///
/// `None` when the result has no area, as for a minimized window.
fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> Option<vk::Extent2D> {
    if capabilities.current_extent.width != u32::MAX {
        let current = capabilities.current_extent;
        return (current.width > 0 && current.height > 0).then_some(current);
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{})",
        extent.width, extent.height, width, height
    );

    (extent.width > 0 && extent.height > 0).then_some(extent)
}

/// One more than the minimum, at least two, capped at the maximum when set.
fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = (capabilities.min_image_count + 1).max(2);

    let image_count = if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    };

    debug!(
        "Image count: {} (min: {}, max: {})",
        image_count,
        capabilities.min_image_count,
        max_image_count_label(capabilities)
    );

    image_count
}

fn create_image_views(
    device: &DeviceContext,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for (i, &image) in images.iter().enumerate() {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => {
                device.set_debug_name(view, &format!("swapchain view {i}"));
                image_views.push(view);
            }
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::creation("swapchain image view", e));
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn capabilities(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_SRGB),
            srgb(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_fallbacks() {
        let formats = [srgb(vk::Format::R8G8B8A8_UNORM), srgb(vk::Format::B8G8R8A8_UNORM)];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_UNORM);

        let formats = [srgb(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_immediate_before_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::IMMEDIATE);

        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_vsync_forces_fifo() {
        let modes = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 800, 600).unwrap();
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_of_minimized_surface_is_none() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, 800, 600), None);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 640,
                height: 0,
            },
            ..Default::default()
        };
        assert_eq!(choose_extent(&capabilities, 800, 600), None);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 1000,
                height: 1000,
            },
            ..Default::default()
        };

        let extent = choose_extent(&capabilities, 2000, 50).unwrap();
        assert_eq!((extent.width, extent.height), (1000, 100));

        let extent = choose_extent(&capabilities, 800, 600).unwrap();
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_determine_image_count() {
        assert_eq!(determine_image_count(&capabilities(2, 8)), 3);
        assert_eq!(determine_image_count(&capabilities(3, 3)), 3);
        assert_eq!(determine_image_count(&capabilities(2, 0)), 3);
    }

    #[test]
    fn test_image_count_never_single_buffered() {
        assert_eq!(determine_image_count(&capabilities(1, 0)), 2);
        assert_eq!(determine_image_count(&capabilities(0, 0)), 2);
    }

    #[test]
    fn test_acquire_results_map_to_taxonomy() {
        assert!(matches!(
            map_acquire_result(vk::Result::ERROR_OUT_OF_DATE_KHR, 10),
            RhiError::SurfaceOutOfDate
        ));
        assert!(matches!(
            map_acquire_result(vk::Result::NOT_READY, 0),
            RhiError::Timeout { .. }
        ));
        assert!(map_acquire_result(vk::Result::ERROR_DEVICE_LOST, 10).is_fatal());
    }

    #[test]
    fn test_present_out_of_date_is_transient() {
        assert!(map_present_result(vk::Result::ERROR_OUT_OF_DATE_KHR).is_transient());
        assert!(map_present_result(vk::Result::ERROR_SURFACE_LOST_KHR).is_fatal());
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let mut details = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![srgb(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(details.is_adequate());

        details.present_modes.clear();
        assert!(!details.is_adequate());
    }
}
