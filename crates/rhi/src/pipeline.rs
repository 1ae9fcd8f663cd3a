//! Graphics and compute pipeline creation.
//!
//! # Overview
//!
//! - [`PipelineLayoutDesc`] accumulates push-constant ranges and descriptor
//!   set layouts by slot. When the pipeline layout is created, slots below
//!   the highest assigned slot that were never assigned get the device's
//!   null descriptor set layout.
//! - [`GraphicsPipelineBuilder`] and [`ComputePipelineBuilder`] emit an
//!   immutable [`Pipeline`] in one creation call. A pipeline that was not
//!   given a layout creates and owns one.
//! - [`PipelineCache`] wraps a `VkPipelineCache` both builders can use.
//!
//! Graphics pipelines target dynamic rendering, and viewport and scissor are
//! always dynamic state.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::pipeline::GraphicsPipelineBuilder;
//! use vkframe_rhi::shader::ShaderProgram;
//! use vkframe_rhi::vertex::{MeshVertex, VertexType};
//!
//! # fn example(device: Arc<DeviceContext>, program: &ShaderProgram) -> Result<(), vkframe_rhi::RhiError> {
//! let pipeline = GraphicsPipelineBuilder::new("mesh")
//!     .with_shader(program)
//!     .with_vertex_input_state(MeshVertex::input_layout())
//!     .with_raster(vk::CullModeFlags::BACK, vk::PolygonMode::FILL)
//!     .with_depth_state(vk::CompareOp::LESS_OR_EQUAL, true, true, false)
//!     .with_colour_formats(&[vk::Format::B8G8R8A8_SRGB])
//!     .with_depth_format(vk::Format::D32_SFLOAT)
//!     .build(&device, None)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::DeviceContext;
use crate::error::{RhiError, RhiResult};
use crate::shader::{ComputeShader, ShaderProgram, ShaderStage};
use crate::vertex::VertexInputLayout;

/// Descriptor set slots a pipeline layout may use.
pub const MAX_DESCRIPTOR_SET_SLOTS: u32 = 32;

// ============================================================================
// Layouts
// ============================================================================

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<DeviceContext>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The device context
    /// * `descriptor_set_layouts` - One layout per set slot, without gaps
    /// * `push_constant_ranges` - Push constant ranges
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<DeviceContext>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        name: &str,
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None) }
            .map_err(|e| RhiError::creation("pipeline layout", e))?;
        device.set_debug_name(layout, name);

        debug!(
            "Created pipeline layout: {} set layout(s), {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Replaces unassigned slots with `null_layout`.
pub fn fill_set_layouts(
    slots: &[Option<vk::DescriptorSetLayout>],
    null_layout: vk::DescriptorSetLayout,
) -> Vec<vk::DescriptorSetLayout> {
    slots.iter().map(|slot| slot.unwrap_or(null_layout)).collect()
}

/// Layout state shared by the graphics and compute builders.
#[derive(Clone, Debug, Default)]
pub struct PipelineLayoutDesc {
    explicit_layout: Option<vk::PipelineLayout>,
    push_constants: Vec<vk::PushConstantRange>,
    shader_push_constants: Vec<vk::PushConstantRange>,
    set_layouts: Vec<Option<vk::DescriptorSetLayout>>,
    shader_set_layouts: Vec<Option<vk::DescriptorSetLayout>>,
    create_flags: vk::PipelineCreateFlags,
}

impl PipelineLayoutDesc {
    /// Uses an existing layout; set layouts and push constants are then
    /// ignored.
    pub fn set_layout(&mut self, layout: vk::PipelineLayout) {
        self.explicit_layout = Some(layout);
    }

    pub fn add_push_constant(&mut self, stages: vk::ShaderStageFlags, offset: u32, size: u32) {
        self.push_constants.push(
            vk::PushConstantRange::default()
                .stage_flags(stages)
                .offset(offset)
                .size(size),
        );
    }

    /// Assigns `layout` to set `slot`, growing the slot table as needed.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not below [`MAX_DESCRIPTOR_SET_SLOTS`].
    pub fn set_descriptor_set_layout(&mut self, slot: u32, layout: vk::DescriptorSetLayout) {
        assert!(
            slot < MAX_DESCRIPTOR_SET_SLOTS,
            "descriptor set slot {slot} exceeds the limit of {MAX_DESCRIPTOR_SET_SLOTS}"
        );
        let slot = slot as usize;
        if self.set_layouts.len() <= slot {
            self.set_layouts.resize(slot + 1, None);
        }
        self.set_layouts[slot] = Some(layout);
    }

    /// Takes the reflected layouts and push constants of a shader, replacing
    /// those of any shader set before. Explicit slots and ranges are kept.
    fn add_shader_resources(
        &mut self,
        set_layouts: Vec<Option<vk::DescriptorSetLayout>>,
        push_constants: &[vk::PushConstantRange],
    ) {
        self.shader_set_layouts = set_layouts;
        self.shader_push_constants = push_constants.to_vec();
    }

    /// The slot table, explicit assignments taking precedence over
    /// reflected ones. `None` marks a gap.
    pub fn slots(&self) -> Vec<Option<vk::DescriptorSetLayout>> {
        let len = self.set_layouts.len().max(self.shader_set_layouts.len());
        (0..len)
            .map(|i| {
                self.set_layouts
                    .get(i)
                    .copied()
                    .flatten()
                    .or_else(|| self.shader_set_layouts.get(i).copied().flatten())
            })
            .collect()
    }

    /// Explicit ranges followed by the reflected ones.
    pub fn push_constants(&self) -> Vec<vk::PushConstantRange> {
        self.push_constants
            .iter()
            .chain(&self.shader_push_constants)
            .copied()
            .collect()
    }

    #[inline]
    pub fn create_flags(&self) -> vk::PipelineCreateFlags {
        self.create_flags
    }

    #[inline]
    pub fn explicit_layout(&self) -> Option<vk::PipelineLayout> {
        self.explicit_layout
    }

    /// The layout to build with, creating one when none was given.
    fn resolve(
        &self,
        device: &Arc<DeviceContext>,
        name: &str,
    ) -> RhiResult<(vk::PipelineLayout, Option<PipelineLayout>)> {
        if let Some(layout) = self.explicit_layout {
            return Ok((layout, None));
        }

        let slots = self.slots();
        let set_layouts = if slots.iter().any(Option::is_none) {
            fill_set_layouts(&slots, device.null_descriptor_set_layout()?)
        } else {
            slots.into_iter().flatten().collect()
        };

        let owned = PipelineLayout::new(
            device.clone(),
            &set_layouts,
            &self.push_constants(),
            &format!("{name} layout"),
        )?;
        Ok((owned.handle(), Some(owned)))
    }
}

// ============================================================================
// Pipelines
// ============================================================================

/// Vulkan pipeline wrapper, owning its layout when it created one.
pub struct Pipeline {
    device: Arc<DeviceContext>,
    pipeline: vk::Pipeline,
    bind_point: vk::PipelineBindPoint,
    layout: vk::PipelineLayout,
    // Dropped after the pipeline.
    _owned_layout: Option<PipelineLayout>,
    name: String,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Destroyed pipeline '{}'", self.name);
    }
}

/// Vulkan pipeline cache wrapper.
pub struct PipelineCache {
    device: Arc<DeviceContext>,
    cache: vk::PipelineCache,
}

impl PipelineCache {
    /// Creates a cache, seeded with data from a previous run if given.
    ///
    /// # Errors
    ///
    /// Returns an error if cache creation fails.
    pub fn new(device: Arc<DeviceContext>, initial_data: &[u8]) -> RhiResult<Self> {
        let create_info = vk::PipelineCacheCreateInfo::default().initial_data(initial_data);
        let cache = unsafe { device.handle().create_pipeline_cache(&create_info, None) }
            .map_err(|e| RhiError::creation("pipeline cache", e))?;
        debug!("Created pipeline cache ({} bytes seeded)", initial_data.len());
        Ok(Self { device, cache })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineCache {
        self.cache
    }

    /// Serialized cache contents, for persisting between runs.
    ///
    /// # Errors
    ///
    /// Returns an error if the data cannot be retrieved.
    pub fn data(&self) -> RhiResult<Vec<u8>> {
        Ok(unsafe { self.device.handle().get_pipeline_cache_data(self.cache)? })
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_cache(self.cache, None);
        }
    }
}

fn cache_handle(cache: Option<&PipelineCache>) -> vk::PipelineCache {
    cache.map_or(vk::PipelineCache::null(), PipelineCache::handle)
}

// ============================================================================
// Graphics
// ============================================================================

/// Builder for graphics pipelines.
///
/// Defaults: triangle list, fill, no culling, counter-clockwise front
/// faces, depth test off, blending off, one sample.
///
/// The shader program must outlive [`build`](Self::build).
pub struct GraphicsPipelineBuilder<'a> {
    name: String,
    program: Option<&'a ShaderProgram>,
    layout: PipelineLayoutDesc,

    vertex_input: VertexInputLayout,
    topology: vk::PrimitiveTopology,
    primitive_restart: bool,
    patch_control_points: u32,

    cull_mode: vk::CullModeFlags,
    polygon_mode: vk::PolygonMode,
    front_face: vk::FrontFace,
    samples: vk::SampleCountFlags,

    depth_compare_op: vk::CompareOp,
    depth_test: bool,
    depth_write: bool,
    stencil_test: bool,

    blend: vk::PipelineColorBlendAttachmentState,

    colour_formats: Vec<vk::Format>,
    depth_format: vk::Format,
    stencil_format: vk::Format,

    dynamic_states: Vec<vk::DynamicState>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: None,
            layout: PipelineLayoutDesc::default(),
            vertex_input: VertexInputLayout::new(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            patch_control_points: 0,
            cull_mode: vk::CullModeFlags::NONE,
            polygon_mode: vk::PolygonMode::FILL,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_compare_op: vk::CompareOp::ALWAYS,
            depth_test: false,
            depth_write: false,
            stencil_test: false,
            blend: vk::PipelineColorBlendAttachmentState::default()
                .color_write_mask(vk::ColorComponentFlags::RGBA),
            colour_formats: Vec::new(),
            depth_format: vk::Format::UNDEFINED,
            stencil_format: vk::Format::UNDEFINED,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }

    /// Uses the program's stages, reflected set layouts and push constants.
    pub fn with_shader(mut self, program: &'a ShaderProgram) -> Self {
        self.layout
            .add_shader_resources(program.descriptor_set_layouts(), program.push_constants());
        self.program = Some(program);
        self
    }

    pub fn with_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.layout.set_layout(layout);
        self
    }

    pub fn with_push_constant(
        mut self,
        stages: vk::ShaderStageFlags,
        offset: u32,
        size: u32,
    ) -> Self {
        self.layout.add_push_constant(stages, offset, size);
        self
    }

    /// # Panics
    ///
    /// Panics if `slot` is not below [`MAX_DESCRIPTOR_SET_SLOTS`].
    pub fn with_descriptor_set_layout(
        mut self,
        slot: u32,
        layout: vk::DescriptorSetLayout,
    ) -> Self {
        self.layout.set_descriptor_set_layout(slot, layout);
        self
    }

    /// Marks the pipeline for use with descriptor buffers.
    pub fn with_descriptor_buffers(mut self) -> Self {
        self.layout.create_flags |= vk::PipelineCreateFlags::DESCRIPTOR_BUFFER_EXT;
        self
    }

    pub fn with_vertex_input_state(mut self, layout: VertexInputLayout) -> Self {
        self.vertex_input = layout;
        self
    }

    pub fn with_topology(
        mut self,
        topology: vk::PrimitiveTopology,
        primitive_restart: bool,
    ) -> Self {
        self.topology = topology;
        self.primitive_restart = primitive_restart;
        self
    }

    /// Control points per patch; enables tessellation state.
    pub fn with_tessellation_patch_vertex_count(mut self, control_points: u32) -> Self {
        self.patch_control_points = control_points;
        self
    }

    pub fn with_raster(
        mut self,
        cull_mode: vk::CullModeFlags,
        polygon_mode: vk::PolygonMode,
    ) -> Self {
        self.cull_mode = cull_mode;
        self.polygon_mode = polygon_mode;
        self
    }

    pub fn with_front_face(mut self, front_face: vk::FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_depth_state(
        mut self,
        compare_op: vk::CompareOp,
        depth_test: bool,
        depth_write: bool,
        stencil_test: bool,
    ) -> Self {
        self.depth_compare_op = compare_op;
        self.depth_test = depth_test;
        self.depth_write = depth_write;
        self.stencil_test = stencil_test;
        self
    }

    /// Blend state applied to every colour attachment.
    pub fn with_blend_state(
        mut self,
        src: vk::BlendFactor,
        dst: vk::BlendFactor,
        enabled: bool,
    ) -> Self {
        self.blend = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(enabled)
            .src_color_blend_factor(src)
            .dst_color_blend_factor(dst)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(src)
            .dst_alpha_blend_factor(dst)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        self
    }

    pub fn with_colour_formats(mut self, formats: &[vk::Format]) -> Self {
        self.colour_formats = formats.to_vec();
        self
    }

    pub fn with_depth_format(mut self, format: vk::Format) -> Self {
        self.depth_format = format;
        self
    }

    /// Combined depth/stencil format, used for both attachments.
    pub fn with_depth_stencil_format(mut self, format: vk::Format) -> Self {
        self.depth_format = format;
        self.stencil_format = format;
        self
    }

    /// Adds a dynamic state beyond viewport and scissor.
    pub fn with_dynamic_state(mut self, state: vk::DynamicState) -> Self {
        if !self.dynamic_states.contains(&state) {
            self.dynamic_states.push(state);
        }
        self
    }

    #[inline]
    pub fn layout_desc(&self) -> &PipelineLayoutDesc {
        &self.layout
    }

    #[inline]
    pub fn dynamic_states(&self) -> &[vk::DynamicState] {
        &self.dynamic_states
    }

    /// One blend state per colour attachment.
    pub fn blend_attachments(&self) -> Vec<vk::PipelineColorBlendAttachmentState> {
        vec![self.blend; self.colour_formats.len()]
    }

    /// Creates the pipeline, and its layout if none was given.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if no shader program or no
    /// attachment format was set, or an error if layout or pipeline creation
    /// fails.
    pub fn build(
        self,
        device: &Arc<DeviceContext>,
        cache: Option<&PipelineCache>,
    ) -> RhiResult<Pipeline> {
        let program = self.program.ok_or_else(|| {
            RhiError::PipelineError(format!("Pipeline '{}' has no shader program", self.name))
        })?;
        if self.colour_formats.is_empty() && self.depth_format == vk::Format::UNDEFINED {
            return Err(RhiError::PipelineError(format!(
                "Pipeline '{}' has no attachment formats",
                self.name
            )));
        }

        let (layout, owned_layout) = self.layout.resolve(device, &self.name)?;
        let mesh = program.has_stage(ShaderStage::Mesh);
        let stages = program.stage_infos();

        let vertex_input_state = self.vertex_input.create_info();
        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(self.primitive_restart);
        let tessellation_state = vk::PipelineTessellationStateCreateInfo::default()
            .patch_control_points(self.patch_control_points);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(self.polygon_mode)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .line_width(1.0);

        let multisample_state =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(self.samples);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare_op)
            .stencil_test_enable(self.stencil_test);

        let blend_attachments = self.blend_attachments();
        let colour_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&self.dynamic_states);

        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&self.colour_formats)
            .depth_attachment_format(self.depth_format)
            .stencil_attachment_format(self.stencil_format);

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .flags(self.layout.create_flags())
            .stages(&stages)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&colour_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);
        if !mesh {
            create_info = create_info
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state);
        }
        if self.patch_control_points > 0 {
            create_info = create_info.tessellation_state(&tessellation_state);
        }

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(cache_handle(cache), &[create_info], None)
        }
        .map_err(|(_, e)| RhiError::creation("graphics pipeline", e))?
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("No graphics pipeline returned".into()))?;
        device.set_debug_name(pipeline, &self.name);

        info!(
            "Created graphics pipeline '{}' ({} stage(s))",
            self.name,
            stages.len()
        );

        Ok(Pipeline {
            device: device.clone(),
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            layout,
            _owned_layout: owned_layout,
            name: self.name,
        })
    }
}

// ============================================================================
// Compute
// ============================================================================

/// Builder for compute pipelines.
pub struct ComputePipelineBuilder<'a> {
    name: String,
    shader: Option<&'a ComputeShader>,
    layout: PipelineLayoutDesc,
}

impl<'a> ComputePipelineBuilder<'a> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shader: None,
            layout: PipelineLayoutDesc::default(),
        }
    }

    pub fn with_shader(mut self, shader: &'a ComputeShader) -> Self {
        self.layout
            .add_shader_resources(shader.descriptor_set_layouts(), shader.push_constants());
        self.shader = Some(shader);
        self
    }

    pub fn with_layout(mut self, layout: vk::PipelineLayout) -> Self {
        self.layout.set_layout(layout);
        self
    }

    pub fn with_push_constant(
        mut self,
        stages: vk::ShaderStageFlags,
        offset: u32,
        size: u32,
    ) -> Self {
        self.layout.add_push_constant(stages, offset, size);
        self
    }

    /// # Panics
    ///
    /// Panics if `slot` is not below [`MAX_DESCRIPTOR_SET_SLOTS`].
    pub fn with_descriptor_set_layout(
        mut self,
        slot: u32,
        layout: vk::DescriptorSetLayout,
    ) -> Self {
        self.layout.set_descriptor_set_layout(slot, layout);
        self
    }

    pub fn with_descriptor_buffers(mut self) -> Self {
        self.layout.create_flags |= vk::PipelineCreateFlags::DESCRIPTOR_BUFFER_EXT;
        self
    }

    #[inline]
    pub fn layout_desc(&self) -> &PipelineLayoutDesc {
        &self.layout
    }

    /// Creates the pipeline, and its layout if none was given.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if no shader was set, or an error
    /// if layout or pipeline creation fails.
    pub fn build(
        self,
        device: &Arc<DeviceContext>,
        cache: Option<&PipelineCache>,
    ) -> RhiResult<Pipeline> {
        let shader = self.shader.ok_or_else(|| {
            RhiError::PipelineError(format!("Pipeline '{}' has no compute shader", self.name))
        })?;

        let (layout, owned_layout) = self.layout.resolve(device, &self.name)?;

        let create_info = vk::ComputePipelineCreateInfo::default()
            .flags(self.layout.create_flags())
            .stage(shader.stage_info())
            .layout(layout);

        let pipeline = unsafe {
            device
                .handle()
                .create_compute_pipelines(cache_handle(cache), &[create_info], None)
        }
        .map_err(|(_, e)| RhiError::creation("compute pipeline", e))?
        .into_iter()
        .next()
        .ok_or_else(|| RhiError::PipelineError("No compute pipeline returned".into()))?;
        device.set_debug_name(pipeline, &self.name);

        info!("Created compute pipeline '{}'", self.name);

        Ok(Pipeline {
            device: device.clone(),
            pipeline,
            bind_point: vk::PipelineBindPoint::COMPUTE,
            layout,
            _owned_layout: owned_layout,
            name: self.name,
        })
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn layout(raw: u64) -> vk::DescriptorSetLayout {
        vk::DescriptorSetLayout::from_raw(raw)
    }

    #[test]
    fn test_sparse_slot_fills_with_null_layout() {
        let builder =
            GraphicsPipelineBuilder::new("sparse").with_descriptor_set_layout(3, layout(7));
        let slots = builder.layout_desc().slots();
        assert_eq!(slots, vec![None, None, None, Some(layout(7))]);

        let null = layout(0xdead);
        assert_eq!(
            fill_set_layouts(&slots, null),
            vec![null, null, null, layout(7)]
        );
    }

    #[test]
    fn test_explicit_slot_wins_over_reflected() {
        let mut desc = PipelineLayoutDesc::default();
        desc.set_descriptor_set_layout(1, layout(10));
        desc.add_shader_resources(vec![Some(layout(1)), Some(layout(2)), None], &[]);

        assert_eq!(
            desc.slots(),
            vec![Some(layout(1)), Some(layout(10)), None]
        );
    }

    #[test]
    fn test_reflected_push_constants_accumulate() {
        let mut desc = PipelineLayoutDesc::default();
        desc.add_push_constant(vk::ShaderStageFlags::VERTEX, 0, 64);
        desc.add_shader_resources(
            Vec::new(),
            &[vk::PushConstantRange::default()
                .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                .offset(64)
                .size(16)],
        );
        assert_eq!(desc.push_constants().len(), 2);
        assert_eq!(desc.push_constants()[1].offset, 64);
    }

    #[test]
    fn test_second_shader_replaces_reflected_push_constants() {
        let range = |stages: vk::ShaderStageFlags, size: u32| {
            vk::PushConstantRange::default()
                .stage_flags(stages)
                .offset(0)
                .size(size)
        };
        let mut desc = PipelineLayoutDesc::default();
        desc.add_push_constant(vk::ShaderStageFlags::COMPUTE, 128, 16);
        desc.add_shader_resources(Vec::new(), &[range(vk::ShaderStageFlags::COMPUTE, 64)]);
        desc.add_shader_resources(Vec::new(), &[range(vk::ShaderStageFlags::COMPUTE, 32)]);

        let ranges = desc.push_constants();
        assert_eq!(ranges.len(), 2);
        assert_eq!((ranges[0].offset, ranges[0].size), (128, 16));
        assert_eq!((ranges[1].offset, ranges[1].size), (0, 32));
    }

    #[test]
    #[should_panic(expected = "exceeds the limit")]
    fn test_slot_limit() {
        let _ = ComputePipelineBuilder::new("too many").with_descriptor_set_layout(32, layout(1));
    }

    #[test]
    fn test_last_slot_allowed() {
        let builder = ComputePipelineBuilder::new("edge").with_descriptor_set_layout(31, layout(1));
        assert_eq!(builder.layout_desc().slots().len(), 32);
    }

    #[test]
    fn test_viewport_and_scissor_always_dynamic() {
        let builder = GraphicsPipelineBuilder::new("dyn")
            .with_dynamic_state(vk::DynamicState::LINE_WIDTH)
            .with_dynamic_state(vk::DynamicState::VIEWPORT);
        assert_eq!(
            builder.dynamic_states(),
            &[
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::SCISSOR,
                vk::DynamicState::LINE_WIDTH
            ]
        );
    }

    #[test]
    fn test_blend_state_last_write_wins() {
        let builder = GraphicsPipelineBuilder::new("blend")
            .with_colour_formats(&[vk::Format::R8G8B8A8_UNORM, vk::Format::R16G16B16A16_SFLOAT])
            .with_blend_state(vk::BlendFactor::ONE, vk::BlendFactor::ONE, true)
            .with_blend_state(
                vk::BlendFactor::SRC_ALPHA,
                vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
                true,
            );

        let attachments = builder.blend_attachments();
        assert_eq!(attachments.len(), 2);
        assert_eq!(attachments[1].src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(attachments[0].blend_enable, vk::TRUE);
    }

    #[test]
    fn test_descriptor_buffer_flag() {
        let builder = GraphicsPipelineBuilder::new("db").with_descriptor_buffers();
        assert!(
            builder
                .layout_desc()
                .create_flags()
                .contains(vk::PipelineCreateFlags::DESCRIPTOR_BUFFER_EXT)
        );
    }

    #[test]
    fn test_explicit_layout_recorded() {
        let raw = vk::PipelineLayout::from_raw(42);
        let builder = ComputePipelineBuilder::new("explicit").with_layout(raw);
        assert_eq!(builder.layout_desc().explicit_layout(), Some(raw));
    }
}
