//! SPIR-V reflection and cross-stage resource merging.
//!
//! [`reflect_spirv`] extracts the descriptor bindings and push-constant
//! blocks one entry point uses. [`ResourceLayout`] merges several stages into
//! the per-set binding tables and push-constant ranges a pipeline layout
//! needs:
//!
//! - bindings at the same (set, binding) union their stage masks; a type or
//!   count disagreement is resolved by the [`ReflectionPolicy`]
//! - push-constant ranges with identical offset and size union their stage
//!   masks; any other overlap is kept as a separate range and reported

use ash::vk;
use spirq::ty::{DescriptorType, Type};
use spirq::var::Variable;
use tracing::{debug, warn};

use crate::error::{RhiError, RhiResult};

/// What to do when two stages disagree about a binding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReflectionPolicy {
    /// Panic: the shaders are inconsistent.
    Strict,
    /// Log a warning and keep the first stage's declaration.
    #[default]
    Warn,
    /// Log at debug level and take the later stage's declaration.
    LastWriterWins,
}

/// One descriptor binding used by a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReflectedBinding {
    pub set: u32,
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
}

/// One push-constant block used by a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushConstantBlock {
    pub offset: u32,
    pub size: u32,
}

/// Resources referenced by one shader stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageReflection {
    pub stage: vk::ShaderStageFlags,
    pub bindings: Vec<ReflectedBinding>,
    pub push_constants: Vec<PushConstantBlock>,
}

fn descriptor_type_to_vk(ty: &DescriptorType) -> Option<vk::DescriptorType> {
    let vk_ty = match ty {
        DescriptorType::Sampler(..) => vk::DescriptorType::SAMPLER,
        DescriptorType::CombinedImageSampler(..) => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        DescriptorType::SampledImage(..) => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorType::StorageImage(..) => vk::DescriptorType::STORAGE_IMAGE,
        DescriptorType::UniformTexelBuffer(..) => vk::DescriptorType::UNIFORM_TEXEL_BUFFER,
        DescriptorType::StorageTexelBuffer(..) => vk::DescriptorType::STORAGE_TEXEL_BUFFER,
        DescriptorType::UniformBuffer(..) => vk::DescriptorType::UNIFORM_BUFFER,
        DescriptorType::StorageBuffer(..) => vk::DescriptorType::STORAGE_BUFFER,
        DescriptorType::InputAttachment(..) => vk::DescriptorType::INPUT_ATTACHMENT,
        DescriptorType::AccelStruct(..) => vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(vk_ty)
}

/// Push-constant block placement: the lowest member offset, and the block
/// size measured from there.
fn push_constant_block(ty: &Type) -> Option<PushConstantBlock> {
    let size = ty.nbyte()? as u32;
    let offset = match ty {
        Type::Struct(st) => st
            .members
            .iter()
            .filter_map(|m| m.offset)
            .min()
            .unwrap_or(0) as u32,
        _ => 0,
    };
    Some(PushConstantBlock {
        offset,
        size: size.saturating_sub(offset),
    })
}

/// Reflects the resources used by entry point `entry` of a SPIR-V module.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the module cannot be parsed, has no
/// such entry point, or uses a descriptor type Vulkan has no equivalent for.
pub fn reflect_spirv(
    code: &[u32],
    entry: &str,
    stage: vk::ShaderStageFlags,
) -> RhiResult<StageReflection> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(code)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| RhiError::ShaderError(format!("SPIR-V reflection failed: {e:?}")))?;

    let entry_point = entry_points
        .iter()
        .find(|ep| ep.name == entry)
        .ok_or_else(|| RhiError::ShaderError(format!("Entry point '{entry}' not found")))?;

    let mut reflection = StageReflection {
        stage,
        bindings: Vec::new(),
        push_constants: Vec::new(),
    };

    for var in &entry_point.vars {
        match var {
            Variable::Descriptor {
                desc_bind,
                desc_ty,
                nbind,
                ..
            } => {
                let ty = descriptor_type_to_vk(desc_ty).ok_or_else(|| {
                    RhiError::ShaderError(format!("Unsupported descriptor type {desc_ty:?}"))
                })?;
                reflection.bindings.push(ReflectedBinding {
                    set: desc_bind.set(),
                    binding: desc_bind.bind(),
                    ty,
                    // Runtime-sized arrays report zero.
                    count: (*nbind).max(1),
                });
            }
            Variable::PushConstant { name, ty } => match push_constant_block(ty) {
                Some(block) => reflection.push_constants.push(block),
                None => warn!(
                    "Push constant block {:?} has no static size, skipped",
                    name
                ),
            },
            _ => {}
        }
    }

    debug!(
        "Reflected {:?} '{}': {} binding(s), {} push constant block(s)",
        stage,
        entry,
        reflection.bindings.len(),
        reflection.push_constants.len()
    );

    Ok(reflection)
}

fn ranges_overlap(a: &vk::PushConstantRange, b: &PushConstantBlock) -> bool {
    a.offset < b.offset + b.size && b.offset < a.offset + a.size
}

/// Descriptor bindings and push constants merged across stages.
#[derive(Clone, Debug, Default)]
pub struct ResourceLayout {
    policy: ReflectionPolicy,
    sets: Vec<Vec<vk::DescriptorSetLayoutBinding<'static>>>,
    push_constants: Vec<vk::PushConstantRange>,
}

impl ResourceLayout {
    pub fn new(policy: ReflectionPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Folds one stage's resources into the layout.
    ///
    /// # Panics
    ///
    /// Panics under [`ReflectionPolicy::Strict`] when a binding's type or
    /// count differs from an earlier stage.
    pub fn add_stage(&mut self, reflection: &StageReflection) {
        for binding in &reflection.bindings {
            self.merge_binding(binding, reflection.stage);
        }
        for block in &reflection.push_constants {
            self.merge_push_constant(block, reflection.stage);
        }
    }

    fn merge_binding(&mut self, reflected: &ReflectedBinding, stage: vk::ShaderStageFlags) {
        let set_index = reflected.set as usize;
        if self.sets.len() <= set_index {
            self.sets.resize_with(set_index + 1, Vec::new);
        }
        let set = &mut self.sets[set_index];

        let position = set.binary_search_by_key(&reflected.binding, |b| b.binding);
        let existing = match position {
            Ok(i) => &mut set[i],
            Err(i) => {
                set.insert(
                    i,
                    vk::DescriptorSetLayoutBinding::default()
                        .binding(reflected.binding)
                        .descriptor_type(reflected.ty)
                        .descriptor_count(reflected.count)
                        .stage_flags(stage),
                );
                return;
            }
        };

        existing.stage_flags |= stage;
        if existing.descriptor_type == reflected.ty && existing.descriptor_count == reflected.count
        {
            return;
        }

        match self.policy {
            ReflectionPolicy::Strict => panic!(
                "set {} binding {}: {:?} declares {:?} x{}, earlier stages declared {:?} x{}",
                reflected.set,
                reflected.binding,
                stage,
                reflected.ty,
                reflected.count,
                existing.descriptor_type,
                existing.descriptor_count
            ),
            ReflectionPolicy::Warn => warn!(
                "set {} binding {}: {:?} declares {:?} x{}, keeping {:?} x{}",
                reflected.set,
                reflected.binding,
                stage,
                reflected.ty,
                reflected.count,
                existing.descriptor_type,
                existing.descriptor_count
            ),
            ReflectionPolicy::LastWriterWins => {
                debug!(
                    "set {} binding {}: {:?} overrides {:?} x{} with {:?} x{}",
                    reflected.set,
                    reflected.binding,
                    stage,
                    existing.descriptor_type,
                    existing.descriptor_count,
                    reflected.ty,
                    reflected.count
                );
                existing.descriptor_type = reflected.ty;
                existing.descriptor_count = reflected.count;
            }
        }
    }

    fn merge_push_constant(&mut self, block: &PushConstantBlock, stage: vk::ShaderStageFlags) {
        if let Some(range) = self
            .push_constants
            .iter_mut()
            .find(|r| r.offset == block.offset && r.size == block.size)
        {
            range.stage_flags |= stage;
            return;
        }

        if let Some(other) = self.push_constants.iter().find(|r| ranges_overlap(r, block)) {
            warn!(
                "Push constant range {}..{} for {:?} overlaps {}..{} for {:?}; kept separate",
                block.offset,
                block.offset + block.size,
                stage,
                other.offset,
                other.offset + other.size,
                other.stage_flags
            );
        }

        self.push_constants.push(
            vk::PushConstantRange::default()
                .stage_flags(stage)
                .offset(block.offset)
                .size(block.size),
        );
    }

    #[inline]
    pub fn policy(&self) -> ReflectionPolicy {
        self.policy
    }

    /// Number of set slots, including empty slots below the highest set.
    #[inline]
    pub fn set_count(&self) -> usize {
        self.sets.len()
    }

    /// Bindings of set `set`, sorted by binding index. Empty for unused sets.
    pub fn set_bindings(&self, set: u32) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        self.sets.get(set as usize).map_or(&[], Vec::as_slice)
    }

    #[inline]
    pub fn push_constants(&self) -> &[vk::PushConstantRange] {
        &self.push_constants
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(set: u32, binding: u32, ty: vk::DescriptorType, count: u32) -> ReflectedBinding {
        ReflectedBinding {
            set,
            binding,
            ty,
            count,
        }
    }

    fn stage(
        stage: vk::ShaderStageFlags,
        bindings: Vec<ReflectedBinding>,
        push_constants: Vec<PushConstantBlock>,
    ) -> StageReflection {
        StageReflection {
            stage,
            bindings,
            push_constants,
        }
    }

    #[test]
    fn test_shared_binding_unions_stages() {
        let mut layout = ResourceLayout::new(ReflectionPolicy::Strict);
        layout.add_stage(&stage(
            vk::ShaderStageFlags::VERTEX,
            vec![binding(0, 0, vk::DescriptorType::UNIFORM_BUFFER, 1)],
            vec![],
        ));
        layout.add_stage(&stage(
            vk::ShaderStageFlags::FRAGMENT,
            vec![
                binding(0, 0, vk::DescriptorType::UNIFORM_BUFFER, 1),
                binding(0, 1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
            ],
            vec![],
        ));

        let set0 = layout.set_bindings(0);
        assert_eq!(set0.len(), 2);
        assert_eq!(
            set0[0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(set0[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_sets_are_indexed_with_gaps() {
        let mut layout = ResourceLayout::default();
        layout.add_stage(&stage(
            vk::ShaderStageFlags::COMPUTE,
            vec![binding(2, 3, vk::DescriptorType::STORAGE_BUFFER, 1)],
            vec![],
        ));

        assert_eq!(layout.set_count(), 3);
        assert!(layout.set_bindings(0).is_empty());
        assert!(layout.set_bindings(1).is_empty());
        assert_eq!(layout.set_bindings(2)[0].binding, 3);
        assert!(layout.set_bindings(7).is_empty());
    }

    #[test]
    fn test_bindings_sorted_by_index() {
        let mut layout = ResourceLayout::default();
        layout.add_stage(&stage(
            vk::ShaderStageFlags::FRAGMENT,
            vec![
                binding(0, 4, vk::DescriptorType::SAMPLED_IMAGE, 1),
                binding(0, 1, vk::DescriptorType::SAMPLER, 1),
            ],
            vec![],
        ));

        let indices: Vec<u32> = layout.set_bindings(0).iter().map(|b| b.binding).collect();
        assert_eq!(indices, vec![1, 4]);
    }

    #[test]
    #[should_panic(expected = "set 0 binding 0")]
    fn test_strict_policy_panics_on_type_mismatch() {
        let mut layout = ResourceLayout::new(ReflectionPolicy::Strict);
        layout.add_stage(&stage(
            vk::ShaderStageFlags::VERTEX,
            vec![binding(0, 0, vk::DescriptorType::UNIFORM_BUFFER, 1)],
            vec![],
        ));
        layout.add_stage(&stage(
            vk::ShaderStageFlags::FRAGMENT,
            vec![binding(0, 0, vk::DescriptorType::STORAGE_BUFFER, 1)],
            vec![],
        ));
    }

    #[test]
    fn test_warn_policy_keeps_first_declaration() {
        let mut layout = ResourceLayout::new(ReflectionPolicy::Warn);
        layout.add_stage(&stage(
            vk::ShaderStageFlags::VERTEX,
            vec![binding(0, 0, vk::DescriptorType::SAMPLED_IMAGE, 4)],
            vec![],
        ));
        layout.add_stage(&stage(
            vk::ShaderStageFlags::FRAGMENT,
            vec![binding(0, 0, vk::DescriptorType::SAMPLED_IMAGE, 8)],
            vec![],
        ));

        let b = layout.set_bindings(0)[0];
        assert_eq!(b.descriptor_count, 4);
        assert!(b.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_last_writer_wins_overwrites() {
        let mut layout = ResourceLayout::new(ReflectionPolicy::LastWriterWins);
        layout.add_stage(&stage(
            vk::ShaderStageFlags::VERTEX,
            vec![binding(1, 0, vk::DescriptorType::UNIFORM_BUFFER, 1)],
            vec![],
        ));
        layout.add_stage(&stage(
            vk::ShaderStageFlags::FRAGMENT,
            vec![binding(1, 0, vk::DescriptorType::STORAGE_BUFFER, 1)],
            vec![],
        ));

        assert_eq!(
            layout.set_bindings(1)[0].descriptor_type,
            vk::DescriptorType::STORAGE_BUFFER
        );
    }

    #[test]
    fn test_identical_push_constants_merge() {
        let block = PushConstantBlock { offset: 0, size: 64 };
        let mut layout = ResourceLayout::default();
        layout.add_stage(&stage(vk::ShaderStageFlags::VERTEX, vec![], vec![block]));
        layout.add_stage(&stage(vk::ShaderStageFlags::FRAGMENT, vec![], vec![block]));

        assert_eq!(layout.push_constants().len(), 1);
        assert_eq!(
            layout.push_constants()[0].stage_flags,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
    }

    #[test]
    fn test_partially_overlapping_push_constants_stay_separate() {
        let mut layout = ResourceLayout::default();
        layout.add_stage(&stage(
            vk::ShaderStageFlags::VERTEX,
            vec![],
            vec![PushConstantBlock { offset: 0, size: 64 }],
        ));
        layout.add_stage(&stage(
            vk::ShaderStageFlags::FRAGMENT,
            vec![],
            vec![PushConstantBlock { offset: 16, size: 16 }],
        ));

        let ranges = layout.push_constants();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].offset, 16);
        assert_eq!(ranges[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_overlap_check() {
        let range = vk::PushConstantRange::default().offset(0).size(16);
        assert!(ranges_overlap(&range, &PushConstantBlock { offset: 8, size: 16 }));
        assert!(!ranges_overlap(&range, &PushConstantBlock { offset: 16, size: 16 }));
    }

    #[test]
    fn test_reflect_rejects_garbage() {
        let code = [0u32; 8];
        assert!(reflect_spirv(&code, "main", vk::ShaderStageFlags::VERTEX).is_err());
    }
}
