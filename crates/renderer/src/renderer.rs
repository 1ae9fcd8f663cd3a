//! Renderer façade.
//!
//! This module provides [`Renderer`], which owns the instance, surface,
//! device, command pools and the swapchain manager for one window, and
//! tears them down in dependency order.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_core::Config;
//! use vkframe_platform::Window;
//! use vkframe_renderer::Renderer;
//! use vkframe_renderer::frame::FrameStatus;
//!
//! # fn example(window: &Window) -> Result<(), vkframe_rhi::RhiError> {
//! let mut renderer = Renderer::new(&Config::default(), window)?;
//!
//! renderer.set_minimized(window.is_minimized());
//! if renderer.begin_frame()? == FrameStatus::Recording {
//!     let _cmd = renderer.command_buffer();
//!     // ... bind pipelines and draw ...
//!     renderer.end_frame()?;
//!     renderer.present()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use vkframe_core::Config;
use vkframe_platform::{Surface, Window};
use vkframe_rhi::allocator::MemoryAllocator;
use vkframe_rhi::buffer::BufferBuilder;
use vkframe_rhi::command::{CommandBuffer, CommandPools, QueueKind};
use vkframe_rhi::descriptor::{DescriptorSetLayoutBuilder, DescriptorWriter};
use vkframe_rhi::device::DeviceContext;
use vkframe_rhi::image::ImageBuilder;
use vkframe_rhi::instance::Instance;
use vkframe_rhi::physical_device::select_physical_device;
use vkframe_rhi::pipeline::{ComputePipelineBuilder, GraphicsPipelineBuilder};
use vkframe_rhi::reflection::ReflectionPolicy;
use vkframe_rhi::shader::ShaderBuilder;
use vkframe_rhi::{RhiError, RhiResult};

use crate::frame::{FrameState, FrameStatus, PresentStatus};
use crate::state::SwapchainState;
use crate::swapchain_manager::{SwapchainManager, SwapchainSettings};
use crate::vulkan_target::{TargetDesc, VulkanTarget};

/// Owns every Vulkan object needed to draw into one window.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device, release deferred objects, destroy the swapchain,
///    depth buffer and frame synchronization
/// 2. Destroy the command pools
/// 3. Destroy the device
/// 4. Destroy the surface
/// 5. Destroy the instance
///
/// ManuallyDrop is used to enforce this order.
pub struct Renderer {
    frames: ManuallyDrop<SwapchainManager<VulkanTarget>>,
    pools: ManuallyDrop<Arc<CommandPools>>,
    device: ManuallyDrop<Arc<DeviceContext>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Arc<Instance>>,
    reflection_policy: ReflectionPolicy,
}

impl Renderer {
    /// Creates a renderer for `window` configured by `config`.
    ///
    /// The swapchain is sized from the window, or from `config` while the
    /// window reports a zero size.
    ///
    /// # Errors
    ///
    /// - [`RhiError::SurfaceError`] if the window system rejects the surface
    /// - [`RhiError::NoSuitableGpu`] if no device can present to it
    /// - Any creation error from the device, pools or swapchain
    pub fn new(config: &Config, window: &Window) -> RhiResult<Self> {
        let (width, height) = if window.width() == 0 || window.height() == 0 {
            (config.width, config.height)
        } else {
            (window.width(), window.height())
        };

        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let surface_extensions = window
            .required_extensions()
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;
        let instance = Arc::new(Instance::new(
            &config.title,
            config.enable_validation,
            &surface_extensions,
        )?);

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = DeviceContext::new(&instance, &physical_device_info)?;
        let pools = Arc::new(CommandPools::new(device.clone())?);

        let target = VulkanTarget::new(
            instance.clone(),
            device.clone(),
            pools.clone(),
            surface.handle(),
            TargetDesc {
                vsync: config.vsync,
                with_stencil: false,
                clear_colour: config.clear_colour.to_array(),
            },
        );
        let mut frames = SwapchainManager::new(target, SwapchainSettings::from_config(config));
        frames.initialize(width, height)?;

        let reflection_policy = if config.strict_reflection {
            ReflectionPolicy::Strict
        } else {
            ReflectionPolicy::Warn
        };

        info!(
            "Renderer initialized on {}: {} swapchain images, depth {:?}",
            physical_device_info.device_name(),
            frames.image_count(),
            frames.depth_format()
        );

        Ok(Self {
            frames: ManuallyDrop::new(frames),
            pools: ManuallyDrop::new(pools),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            reflection_policy,
        })
    }

    /// See [`SwapchainManager::begin_frame`].
    ///
    /// # Errors
    ///
    /// Returns timeouts and fatal errors; out-of-date surfaces are handled.
    pub fn begin_frame(&mut self) -> RhiResult<FrameStatus> {
        self.frames.begin_frame()
    }

    /// Command buffer of the frame being recorded.
    ///
    /// # Panics
    ///
    /// Panics if no chain exists.
    pub fn command_buffer(&self) -> &CommandBuffer {
        self.frames
            .target()
            .command_buffer(self.frames.frame_state().swap_index)
    }

    /// See [`SwapchainManager::end_frame`].
    ///
    /// # Errors
    ///
    /// Returns the submission error.
    pub fn end_frame(&mut self) -> RhiResult<()> {
        self.frames.end_frame()
    }

    /// See [`SwapchainManager::present`].
    ///
    /// # Errors
    ///
    /// Returns fatal presentation errors and rebuild failures.
    pub fn present(&mut self) -> RhiResult<PresentStatus> {
        self.frames.present()
    }

    /// Rebuilds the swapchain for a new window size. Zero sizes are ignored.
    ///
    /// # Errors
    ///
    /// Returns the rebuild error.
    pub fn resize(&mut self, width: u32, height: u32) -> RhiResult<bool> {
        self.frames.resize(width, height)
    }

    pub fn set_minimized(&mut self, minimized: bool) {
        self.frames.set_minimized(minimized);
    }

    /// Releases `value` once the GPU has finished the frame being recorded.
    pub fn retire<V: Send + 'static>(&mut self, label: &'static str, value: V) {
        self.frames.retire(label, value);
    }

    /// Records `record` into a fresh command buffer, submits it to `kind`'s
    /// queue and waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] if the GPU does not finish in time.
    pub fn submit_one_shot<F>(&self, kind: QueueKind, name: &str, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        self.pools.submit_one_shot(kind, name, record)
    }

    /// Labels `handle` in debugging tools.
    pub fn set_debug_name<H: vk::Handle>(&self, handle: H, name: &str) {
        self.device.set_debug_name(handle, name);
    }

    pub fn create_buffer(&self, size: vk::DeviceSize, name: &str) -> BufferBuilder {
        BufferBuilder::new(size, name)
    }

    pub fn create_image(&self, width: u32, height: u32, name: &str) -> ImageBuilder {
        ImageBuilder::new(width, height, name)
    }

    pub fn create_descriptor_set_layout(&self, name: &str) -> DescriptorSetLayoutBuilder {
        DescriptorSetLayoutBuilder::new(name)
    }

    /// Shader builder using the configured reflection policy.
    pub fn create_shader(&self) -> ShaderBuilder<'_> {
        ShaderBuilder::new(&self.device).with_policy(self.reflection_policy)
    }

    /// Graphics pipeline builder targeting the swapchain and depth formats.
    pub fn create_graphics_pipeline<'a>(&self, name: &str) -> GraphicsPipelineBuilder<'a> {
        GraphicsPipelineBuilder::new(name)
            .with_colour_formats(&[self.colour_format()])
            .with_depth_format(self.depth_format())
    }

    pub fn create_compute_pipeline<'a>(&self, name: &str) -> ComputePipelineBuilder<'a> {
        ComputePipelineBuilder::new(name)
    }

    pub fn descriptor_writer(&self) -> DescriptorWriter<'_> {
        DescriptorWriter::new(&self.device)
    }

    /// Waits for the GPU and destroys the swapchain. Further frames are
    /// invalid; the remaining objects go with `drop`.
    ///
    /// # Errors
    ///
    /// Returns the idle-wait error.
    pub fn shutdown(&mut self) -> RhiResult<()> {
        self.frames.shutdown()
    }

    #[inline]
    pub fn device(&self) -> &Arc<DeviceContext> {
        &self.device
    }

    #[inline]
    pub fn allocator(&self) -> &MemoryAllocator {
        self.device.allocator()
    }

    #[inline]
    pub fn pools(&self) -> &CommandPools {
        &self.pools
    }

    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Policy for shader programs built against this renderer.
    #[inline]
    pub fn reflection_policy(&self) -> ReflectionPolicy {
        self.reflection_policy
    }

    #[inline]
    pub fn state(&self) -> SwapchainState {
        self.frames.state()
    }

    #[inline]
    pub fn frame_state(&self) -> &FrameState {
        self.frames.frame_state()
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.frames.image_count()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.frames.extent().unwrap_or_default()
    }

    #[inline]
    pub fn colour_format(&self) -> vk::Format {
        self.frames.colour_format().unwrap_or(vk::Format::UNDEFINED)
    }

    #[inline]
    pub fn depth_format(&self) -> vk::Format {
        self.frames.depth_format()
    }

    #[inline]
    pub fn frames(&self) -> &SwapchainManager<VulkanTarget> {
        &self.frames
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.frames.shutdown() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }

        unsafe {
            ManuallyDrop::drop(&mut self.frames);
            ManuallyDrop::drop(&mut self.pools);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
