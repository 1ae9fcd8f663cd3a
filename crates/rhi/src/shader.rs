//! Shader programs built from SPIR-V with reflected resource layouts.
//!
//! # Overview
//!
//! - [`ShaderBuilder`] collects one SPIR-V binary per graphics stage,
//!   creates the modules, reflects them and builds a [`ShaderProgram`].
//! - [`ComputeShader`] is the single-stage equivalent for compute.
//!
//! Both own a descriptor set layout for each set their stages use. Sets
//! below the highest one that no stage uses have no layout; pipeline
//! creation fills them with the device's null layout.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::shader::{ShaderBuilder, read_spirv_file};
//!
//! # fn example(device: Arc<DeviceContext>) -> Result<(), vkframe_rhi::RhiError> {
//! let program = ShaderBuilder::new(&device)
//!     .with_vertex_binary(read_spirv_file("shaders/mesh.vert.spv")?, "main")
//!     .with_fragment_binary(read_spirv_file("shaders/mesh.frag.spv")?, "main")
//!     .build("mesh")?;
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::descriptor::{DescriptorSetLayout, DescriptorSetLayoutBuilder};
use crate::device::DeviceContext;
use crate::error::{RhiError, RhiResult};
use crate::reflection::{ReflectionPolicy, ResourceLayout, reflect_spirv};

/// Pipeline stage a shader binary is compiled for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
    TessControl,
    TessEvaluation,
    Mesh,
    Compute,
}

impl ShaderStage {
    /// Graphics stages in the order they appear in a program.
    pub const GRAPHICS: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::Fragment,
        ShaderStage::Geometry,
        ShaderStage::TessControl,
        ShaderStage::TessEvaluation,
        ShaderStage::Mesh,
    ];

    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Geometry => vk::ShaderStageFlags::GEOMETRY,
            ShaderStage::TessControl => vk::ShaderStageFlags::TESSELLATION_CONTROL,
            ShaderStage::TessEvaluation => vk::ShaderStageFlags::TESSELLATION_EVALUATION,
            ShaderStage::Mesh => vk::ShaderStageFlags::MESH_EXT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Geometry => "geometry",
            ShaderStage::TessControl => "tessellation control",
            ShaderStage::TessEvaluation => "tessellation evaluation",
            ShaderStage::Mesh => "mesh",
            ShaderStage::Compute => "compute",
        }
    }

    fn graphics_index(self) -> Option<usize> {
        Self::GRAPHICS.iter().position(|&s| s == self)
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Reads a SPIR-V file into memory.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the file cannot be read.
pub fn read_spirv_file(path: impl AsRef<Path>) -> RhiResult<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| {
        RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
    })
}

/// Converts little-endian SPIR-V bytes into code words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the length is not a multiple of 4.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if !bytes.len().is_multiple_of(4) {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// One created stage of a program.
struct StageModule {
    stage: ShaderStage,
    module: vk::ShaderModule,
    entry_point: CString,
}

fn create_module(
    device: &DeviceContext,
    stage: ShaderStage,
    code: &[u32],
    entry_point: &str,
    name: &str,
) -> RhiResult<StageModule> {
    let entry_point = CString::new(entry_point)
        .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(code);
    let module = unsafe { device.handle().create_shader_module(&create_info, None) }
        .map_err(|e| RhiError::creation("shader module", e))?;
    device.set_debug_name(module, name);

    Ok(StageModule {
        stage,
        module,
        entry_point,
    })
}

/// Creates a layout per non-empty reflected set.
fn create_set_layouts(
    device: &Arc<DeviceContext>,
    resources: &ResourceLayout,
    name: &str,
) -> RhiResult<Vec<Option<DescriptorSetLayout>>> {
    (0..resources.set_count() as u32)
        .map(|set| {
            let bindings = resources.set_bindings(set);
            if bindings.is_empty() {
                return Ok(None);
            }
            let mut builder = bindings.iter().fold(
                DescriptorSetLayoutBuilder::new(format!("{name} set {set}")),
                |builder, b| {
                    builder.with_binding_at(
                        b.binding,
                        b.descriptor_type,
                        b.descriptor_count,
                        b.stage_flags,
                        vk::DescriptorBindingFlags::empty(),
                    )
                },
            );
            builder.build(device).map(Some)
        })
        .collect()
}

fn layout_handles(layouts: &[Option<DescriptorSetLayout>]) -> Vec<Option<vk::DescriptorSetLayout>> {
    layouts
        .iter()
        .map(|l| l.as_ref().map(DescriptorSetLayout::handle))
        .collect()
}

// ============================================================================
// Graphics programs
// ============================================================================

struct StageSource {
    bytes: Vec<u8>,
    entry_point: String,
}

fn insert_source(sources: &mut [Option<StageSource>; 6], stage: ShaderStage, source: StageSource) {
    let Some(index) = stage.graphics_index() else {
        panic!("{stage} shaders are not part of a graphics program");
    };
    assert!(
        sources[index].is_none(),
        "multiple {stage} shaders attached to one program"
    );
    sources[index] = Some(source);
}

fn check_stage_combination(stages: &[ShaderStage]) {
    assert!(
        !(stages.contains(&ShaderStage::Mesh) && stages.contains(&ShaderStage::Vertex)),
        "cannot combine the vertex pipeline with mesh shaders"
    );
}

/// Builder for [`ShaderProgram`].
pub struct ShaderBuilder<'a> {
    device: &'a Arc<DeviceContext>,
    sources: [Option<StageSource>; 6],
    policy: ReflectionPolicy,
}

impl<'a> ShaderBuilder<'a> {
    pub fn new(device: &'a Arc<DeviceContext>) -> Self {
        Self {
            device,
            sources: Default::default(),
            policy: ReflectionPolicy::default(),
        }
    }

    /// Adds the binary for `stage`.
    ///
    /// # Panics
    ///
    /// Panics if `stage` already has a binary, or is
    /// [`ShaderStage::Compute`] (use [`ComputeShader`]).
    pub fn add_binary(
        mut self,
        stage: ShaderStage,
        bytes: impl Into<Vec<u8>>,
        entry_point: &str,
    ) -> Self {
        insert_source(
            &mut self.sources,
            stage,
            StageSource {
                bytes: bytes.into(),
                entry_point: entry_point.to_owned(),
            },
        );
        self
    }

    pub fn with_vertex_binary(self, bytes: impl Into<Vec<u8>>, entry_point: &str) -> Self {
        self.add_binary(ShaderStage::Vertex, bytes, entry_point)
    }

    pub fn with_fragment_binary(self, bytes: impl Into<Vec<u8>>, entry_point: &str) -> Self {
        self.add_binary(ShaderStage::Fragment, bytes, entry_point)
    }

    pub fn with_geometry_binary(self, bytes: impl Into<Vec<u8>>, entry_point: &str) -> Self {
        self.add_binary(ShaderStage::Geometry, bytes, entry_point)
    }

    pub fn with_tess_control_binary(self, bytes: impl Into<Vec<u8>>, entry_point: &str) -> Self {
        self.add_binary(ShaderStage::TessControl, bytes, entry_point)
    }

    pub fn with_tess_eval_binary(self, bytes: impl Into<Vec<u8>>, entry_point: &str) -> Self {
        self.add_binary(ShaderStage::TessEvaluation, bytes, entry_point)
    }

    pub fn with_mesh_binary(self, bytes: impl Into<Vec<u8>>, entry_point: &str) -> Self {
        self.add_binary(ShaderStage::Mesh, bytes, entry_point)
    }

    /// How cross-stage binding mismatches are handled.
    pub fn with_policy(mut self, policy: ReflectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stages that have a binary, in program order.
    pub fn stages(&self) -> Vec<ShaderStage> {
        ShaderStage::GRAPHICS
            .iter()
            .zip(&self.sources)
            .filter_map(|(&stage, source)| source.as_ref().map(|_| stage))
            .collect()
    }

    /// Creates the modules and reflected set layouts.
    ///
    /// # Panics
    ///
    /// Panics if both mesh and vertex binaries were added, or on a binding
    /// mismatch under [`ReflectionPolicy::Strict`].
    ///
    /// # Errors
    ///
    /// Returns an error if a binary is malformed, fails reflection, or a
    /// module or layout cannot be created.
    pub fn build(self, name: &str) -> RhiResult<ShaderProgram> {
        let stages = self.stages();
        check_stage_combination(&stages);
        if stages.is_empty() {
            return Err(RhiError::ShaderError(format!(
                "Shader program '{name}' has no stages"
            )));
        }

        let mut program = ShaderProgram {
            device: self.device.clone(),
            name: name.to_owned(),
            modules: Vec::with_capacity(stages.len()),
            resources: ResourceLayout::new(self.policy),
            set_layouts: Vec::new(),
        };

        for (stage, source) in ShaderStage::GRAPHICS.into_iter().zip(self.sources) {
            let Some(source) = source else {
                continue;
            };
            let code = spirv_words(&source.bytes)?;
            let reflection = reflect_spirv(&code, &source.entry_point, stage.to_vk_stage())?;
            program.resources.add_stage(&reflection);
            program.modules.push(create_module(
                self.device,
                stage,
                &code,
                &source.entry_point,
                name,
            )?);
        }

        program.set_layouts = create_set_layouts(self.device, &program.resources, name)?;

        info!(
            "Built shader program '{}': {} stage(s), {} set(s), {} push constant range(s)",
            name,
            program.modules.len(),
            program.set_layouts.len(),
            program.resources.push_constants().len()
        );

        Ok(program)
    }
}

/// Shader modules for one graphics pipeline plus their reflected layouts.
pub struct ShaderProgram {
    device: Arc<DeviceContext>,
    name: String,
    modules: Vec<StageModule>,
    resources: ResourceLayout,
    set_layouts: Vec<Option<DescriptorSetLayout>>,
}

impl ShaderProgram {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stages(&self) -> Vec<ShaderStage> {
        self.modules.iter().map(|m| m.stage).collect()
    }

    pub fn has_stage(&self, stage: ShaderStage) -> bool {
        self.modules.iter().any(|m| m.stage == stage)
    }

    /// Stage create infos borrowing this program.
    pub fn stage_infos(&self) -> Vec<vk::PipelineShaderStageCreateInfo<'_>> {
        self.modules
            .iter()
            .map(|m| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(m.stage.to_vk_stage())
                    .module(m.module)
                    .name(&m.entry_point)
            })
            .collect()
    }

    /// One entry per set index; `None` where no stage uses the set.
    pub fn descriptor_set_layouts(&self) -> Vec<Option<vk::DescriptorSetLayout>> {
        layout_handles(&self.set_layouts)
    }

    #[inline]
    pub fn push_constants(&self) -> &[vk::PushConstantRange] {
        self.resources.push_constants()
    }

    pub fn set_bindings(&self, set: u32) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        self.resources.set_bindings(set)
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        for module in &self.modules {
            unsafe {
                self.device
                    .handle()
                    .destroy_shader_module(module.module, None);
            }
        }
        debug!("Destroyed shader program '{}'", self.name);
    }
}

// ============================================================================
// Compute
// ============================================================================

/// A compute shader module with its reflected layouts.
pub struct ComputeShader {
    device: Arc<DeviceContext>,
    name: String,
    module: StageModule,
    resources: ResourceLayout,
    set_layouts: Vec<Option<DescriptorSetLayout>>,
}

impl ComputeShader {
    /// Creates and reflects a compute shader.
    ///
    /// # Errors
    ///
    /// Returns an error if the binary is malformed, fails reflection, or the
    /// module or a layout cannot be created.
    pub fn new(
        device: &Arc<DeviceContext>,
        bytes: &[u8],
        entry_point: &str,
        name: &str,
    ) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let reflection = reflect_spirv(&code, entry_point, vk::ShaderStageFlags::COMPUTE)?;
        let mut resources = ResourceLayout::default();
        resources.add_stage(&reflection);

        let module = create_module(device, ShaderStage::Compute, &code, entry_point, name)?;
        let mut shader = Self {
            device: device.clone(),
            name: name.to_owned(),
            module,
            resources,
            set_layouts: Vec::new(),
        };
        shader.set_layouts = create_set_layouts(device, &shader.resources, name)?;

        info!(
            "Built compute shader '{}': {} set(s)",
            name,
            shader.set_layouts.len()
        );

        Ok(shader)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(self.module.module)
            .name(&self.module.entry_point)
    }

    pub fn descriptor_set_layouts(&self) -> Vec<Option<vk::DescriptorSetLayout>> {
        layout_handles(&self.set_layouts)
    }

    #[inline]
    pub fn push_constants(&self) -> &[vk::PushConstantRange] {
        self.resources.push_constants()
    }

    pub fn set_bindings(&self, set: u32) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        self.resources.set_bindings(set)
    }
}

impl Drop for ComputeShader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module.module, None);
        }
        debug!("Destroyed compute shader '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_flags() {
        assert_eq!(
            ShaderStage::TessEvaluation.to_vk_stage(),
            vk::ShaderStageFlags::TESSELLATION_EVALUATION
        );
        assert_eq!(ShaderStage::Mesh.to_vk_stage(), vk::ShaderStageFlags::MESH_EXT);
        assert_eq!(ShaderStage::Compute.to_string(), "compute");
    }

    #[test]
    fn test_program_order() {
        assert_eq!(ShaderStage::Vertex.graphics_index(), Some(0));
        assert_eq!(ShaderStage::Mesh.graphics_index(), Some(5));
        assert_eq!(ShaderStage::Compute.graphics_index(), None);
    }

    #[test]
    fn test_spirv_words_little_endian() {
        let words = spirv_words(&[0x03, 0x02, 0x23, 0x07, 1, 0, 0, 0]).unwrap();
        assert_eq!(words, vec![0x0723_0203, 1]);
    }

    #[test]
    fn test_spirv_words_rejects_misaligned() {
        assert!(matches!(
            spirv_words(&[0u8; 5]),
            Err(RhiError::ShaderError(_))
        ));
    }

    fn source() -> StageSource {
        StageSource {
            bytes: Vec::new(),
            entry_point: "main".to_owned(),
        }
    }

    #[test]
    fn test_sources_fill_program_slots() {
        let mut sources: [Option<StageSource>; 6] = Default::default();
        insert_source(&mut sources, ShaderStage::Fragment, source());
        insert_source(&mut sources, ShaderStage::Vertex, source());
        assert!(sources[0].is_some());
        assert!(sources[1].is_some());
        assert!(sources[2].is_none());
    }

    #[test]
    #[should_panic(expected = "multiple vertex shaders")]
    fn test_duplicate_stage_panics() {
        let mut sources: [Option<StageSource>; 6] = Default::default();
        insert_source(&mut sources, ShaderStage::Vertex, source());
        insert_source(&mut sources, ShaderStage::Vertex, source());
    }

    #[test]
    #[should_panic(expected = "not part of a graphics program")]
    fn test_compute_stage_rejected() {
        let mut sources: [Option<StageSource>; 6] = Default::default();
        insert_source(&mut sources, ShaderStage::Compute, source());
    }

    #[test]
    #[should_panic(expected = "mesh shaders")]
    fn test_mesh_with_vertex_panics() {
        check_stage_combination(&[ShaderStage::Vertex, ShaderStage::Mesh]);
    }

    #[test]
    fn test_mesh_with_fragment_allowed() {
        check_stage_combination(&[ShaderStage::Fragment, ShaderStage::Mesh]);
    }

    #[test]
    fn test_missing_file_is_shader_error() {
        let err = read_spirv_file("does/not/exist.spv").unwrap_err();
        assert!(matches!(err, RhiError::ShaderError(_)));
    }
}
