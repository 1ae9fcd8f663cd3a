//! Descriptor set layouts, pools and descriptor writes.
//!
//! # Overview
//!
//! - [`DescriptorSetLayoutBuilder`] accumulates bindings (auto-indexed or at
//!   an explicit index) with per-binding flags and emits a
//!   [`DescriptorSetLayout`] in one creation call.
//! - [`DescriptorPool`] allocates sets; [`DescriptorPool::with_defaults`]
//!   sizes every common descriptor type at [`DEFAULT_POOL_CAPACITY`].
//! - [`DescriptorWriter`] writes sampled images, storage images, buffers and
//!   acceleration structures into allocated sets.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::descriptor::{DescriptorPool, DescriptorSetLayoutBuilder, DescriptorWriter};
//!
//! # fn example(device: Arc<DeviceContext>, ubo: vk::Buffer) -> Result<(), vkframe_rhi::RhiError> {
//! let layout = DescriptorSetLayoutBuilder::new("camera")
//!     .with_uniform_buffers(1, vk::ShaderStageFlags::VERTEX)
//!     .with_samplers(4, vk::ShaderStageFlags::FRAGMENT)
//!     .build(&device)?;
//!
//! let pool = DescriptorPool::with_defaults(device.clone())?;
//! let set = pool.allocate(&[layout.handle()])?[0];
//!
//! DescriptorWriter::new(&device).write_buffer(
//!     set,
//!     0,
//!     vk::DescriptorType::UNIFORM_BUFFER,
//!     ubo,
//!     0,
//!     0,
//! );
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::DeviceContext;
use crate::error::{RhiError, RhiResult};

/// Sets and per-type descriptors in a default pool.
pub const DEFAULT_POOL_CAPACITY: u32 = 128;

/// Descriptor types a default pool reserves space for.
const DEFAULT_POOL_TYPES: [vk::DescriptorType; 7] = [
    vk::DescriptorType::UNIFORM_BUFFER,
    vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
    vk::DescriptorType::STORAGE_BUFFER,
    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
    vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
    vk::DescriptorType::SAMPLED_IMAGE,
    vk::DescriptorType::STORAGE_IMAGE,
];

// ============================================================================
// Layout
// ============================================================================

/// Descriptor set layout wrapper.
///
/// Immutable after creation; share it behind `Arc` when several pipelines
/// use it.
pub struct DescriptorSetLayout {
    device: Arc<DeviceContext>,
    layout: vk::DescriptorSetLayout,
    binding_count: usize,
}

impl DescriptorSetLayout {
    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Number of bindings the layout was created with.
    #[inline]
    pub fn binding_count(&self) -> usize {
        self.binding_count
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Builder for [`DescriptorSetLayout`].
///
/// Bindings and their flags live in parallel vectors of equal length, and
/// are passed to Vulkan together through
/// `VkDescriptorSetLayoutBindingFlagsCreateInfo`.
#[derive(Debug, Clone, Default)]
pub struct DescriptorSetLayoutBuilder {
    name: String,
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    binding_flags: Vec<vk::DescriptorBindingFlags>,
    create_flags: vk::DescriptorSetLayoutCreateFlags,
    built: bool,
}

impl DescriptorSetLayoutBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a binding at the next free index.
    ///
    /// The search starts at the current binding count and skips indices
    /// already taken by [`with_binding_at`](Self::with_binding_at).
    pub fn with_binding(
        self,
        ty: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorBindingFlags,
    ) -> Self {
        let index = self.next_free_index();
        self.with_binding_at(index, ty, count, stages, flags)
    }

    /// Adds a binding at an explicit index.
    ///
    /// Lower indices are not filled in; the resulting table may be sparse.
    ///
    /// # Panics
    ///
    /// Panics if `index` is already bound.
    pub fn with_binding_at(
        mut self,
        index: u32,
        ty: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
        flags: vk::DescriptorBindingFlags,
    ) -> Self {
        assert!(
            !self.bindings.iter().any(|b| b.binding == index),
            "descriptor set layout '{}' already has binding {}",
            self.name,
            index
        );

        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default()
                .binding(index)
                .descriptor_type(ty)
                .descriptor_count(count)
                .stage_flags(stages),
        );
        self.binding_flags.push(flags);
        self
    }

    /// `count` separate sampler bindings.
    pub fn with_samplers(self, count: u32, stages: vk::ShaderStageFlags) -> Self {
        self.with_repeated(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, count, stages)
    }

    pub fn with_uniform_buffers(self, count: u32, stages: vk::ShaderStageFlags) -> Self {
        self.with_repeated(vk::DescriptorType::UNIFORM_BUFFER, count, stages)
    }

    pub fn with_storage_buffers(self, count: u32, stages: vk::ShaderStageFlags) -> Self {
        self.with_repeated(vk::DescriptorType::STORAGE_BUFFER, count, stages)
    }

    pub fn with_storage_images(self, count: u32, stages: vk::ShaderStageFlags) -> Self {
        self.with_repeated(vk::DescriptorType::STORAGE_IMAGE, count, stages)
    }

    pub fn with_sampled_images(self, count: u32, stages: vk::ShaderStageFlags) -> Self {
        self.with_repeated(vk::DescriptorType::SAMPLED_IMAGE, count, stages)
    }

    pub fn with_acceleration_structures(self, count: u32, stages: vk::ShaderStageFlags) -> Self {
        self.with_repeated(
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
            count,
            stages,
        )
    }

    /// ORs `flags` into the layout creation flags.
    pub fn with_creation_flags(mut self, flags: vk::DescriptorSetLayoutCreateFlags) -> Self {
        self.create_flags |= flags;
        self
    }

    fn with_repeated(
        mut self,
        ty: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        for _ in 0..count {
            self = self.with_binding(ty, 1, stages, vk::DescriptorBindingFlags::empty());
        }
        self
    }

    fn next_free_index(&self) -> u32 {
        let mut index = self.bindings.len() as u32;
        while self.bindings.iter().any(|b| b.binding == index) {
            index += 1;
        }
        index
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding<'static>] {
        &self.bindings
    }

    #[inline]
    pub fn binding_flags(&self) -> &[vk::DescriptorBindingFlags] {
        &self.binding_flags
    }

    /// Creation flags, including any implied by the binding flags.
    pub fn creation_flags(&self) -> vk::DescriptorSetLayoutCreateFlags {
        let update_after_bind = self
            .binding_flags
            .iter()
            .any(|f| f.contains(vk::DescriptorBindingFlags::UPDATE_AFTER_BIND));
        if update_after_bind {
            self.create_flags | vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL
        } else {
            self.create_flags
        }
    }

    #[inline]
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Allows the builder to be built again.
    pub fn reset(&mut self) {
        self.built = false;
    }

    fn mark_built(&mut self) {
        assert!(
            !self.built,
            "descriptor set layout builder '{}' was already built; call reset() first",
            self.name
        );
        self.built = true;
    }

    /// Creates the layout.
    ///
    /// # Panics
    ///
    /// Panics if the builder was already built.
    ///
    /// # Errors
    ///
    /// Returns an error if Vulkan rejects the layout.
    pub fn build(&mut self, device: &Arc<DeviceContext>) -> RhiResult<DescriptorSetLayout> {
        self.mark_built();
        debug_assert_eq!(self.bindings.len(), self.binding_flags.len());

        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default()
            .binding_flags(&self.binding_flags);
        let create_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(self.creation_flags())
            .bindings(&self.bindings)
            .push_next(&mut flags_info);

        let layout = unsafe { device.handle().create_descriptor_set_layout(&create_info, None) }
            .map_err(|e| RhiError::creation("descriptor set layout", e))?;
        device.set_debug_name(layout, &self.name);

        debug!(
            "Created descriptor set layout '{}' with {} binding(s)",
            self.name,
            self.bindings.len()
        );

        Ok(DescriptorSetLayout {
            device: device.clone(),
            layout,
            binding_count: self.bindings.len(),
        })
    }
}

// ============================================================================
// Pool
// ============================================================================

/// Pool sizes for [`DescriptorPool::with_defaults`].
///
/// Acceleration structures get their own entry when the device supports
/// them.
pub fn default_pool_sizes(
    per_type: u32,
    acceleration_structures: bool,
) -> Vec<vk::DescriptorPoolSize> {
    let mut sizes: Vec<_> = DEFAULT_POOL_TYPES
        .iter()
        .map(|&ty| {
            vk::DescriptorPoolSize::default()
                .ty(ty)
                .descriptor_count(per_type)
        })
        .collect();
    if acceleration_structures {
        sizes.push(
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                .descriptor_count(per_type),
        );
    }
    sizes
}

/// Descriptor pool created with `FREE_DESCRIPTOR_SET`.
///
/// # Thread Safety
///
/// Pool operations are not internally synchronized. Synchronize access
/// externally when sharing between threads.
pub struct DescriptorPool {
    device: Arc<DeviceContext>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool.
    ///
    /// # Arguments
    ///
    /// * `device` - The device context
    /// * `max_sets` - Maximum number of sets allocated at once
    /// * `pool_sizes` - Capacity per descriptor type
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<DeviceContext>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None) }
            .map_err(|e| RhiError::creation("descriptor pool", e))?;

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Creates a pool with [`DEFAULT_POOL_CAPACITY`] sets and descriptors of
    /// each common type.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn with_defaults(device: Arc<DeviceContext>) -> RhiResult<Self> {
        let sizes = default_pool_sizes(
            DEFAULT_POOL_CAPACITY,
            device.supports_acceleration_structures(),
        );
        Self::new(device, DEFAULT_POOL_CAPACITY, &sizes)
    }

    /// Allocates one set per layout.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails (e.g., pool exhausted).
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Allocates one set whose last binding has a variable descriptor count.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_variable(
        &self,
        layout: vk::DescriptorSetLayout,
        count: u32,
    ) -> RhiResult<vk::DescriptorSet> {
        let layouts = [layout];
        let counts = [count];
        let mut variable_info = vk::DescriptorSetVariableDescriptorCountAllocateInfo::default()
            .descriptor_counts(&counts);
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts)
            .push_next(&mut variable_info);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        debug!("Allocated variable descriptor set with {} descriptor(s)", count);

        sets.into_iter().next().ok_or_else(|| {
            RhiError::InvalidHandle("variable descriptor set allocation returned no set".into())
        })
    }

    /// Frees sets back to the pool.
    ///
    /// The sets must not be in use by the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if freeing fails.
    pub fn free(&self, sets: &[vk::DescriptorSet]) -> RhiResult<()> {
        if sets.is_empty() {
            return Ok(());
        }
        unsafe {
            self.device.handle().free_descriptor_sets(self.pool, sets)?;
        }

        debug!("Freed {} descriptor set(s)", sets.len());

        Ok(())
    }

    /// Returns every allocated set to the pool.
    ///
    /// No set from this pool may be in use by the GPU.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }

        debug!("Reset descriptor pool");

        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

// ============================================================================
// Writes
// ============================================================================

/// Buffer range to write, mapping 0 to the whole buffer.
#[inline]
pub fn buffer_range(range: vk::DeviceSize) -> vk::DeviceSize {
    if range == 0 { vk::WHOLE_SIZE } else { range }
}

/// Writes single descriptors into allocated sets.
///
/// Each call is one `vkUpdateDescriptorSets`. The set must not be in use by
/// pending GPU work unless its layout was created update-after-bind.
pub struct DescriptorWriter<'a> {
    device: &'a DeviceContext,
}

impl<'a> DescriptorWriter<'a> {
    pub fn new(device: &'a DeviceContext) -> Self {
        Self { device }
    }

    /// Writes a `SAMPLED_IMAGE` descriptor.
    pub fn write_sampled_image(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) {
        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(layout)];
        self.update(
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .dst_array_element(array_element)
                .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                .image_info(&image_info),
        );
    }

    /// Writes a `COMBINED_IMAGE_SAMPLER` descriptor.
    pub fn write_combined_image_sampler(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        sampler: vk::Sampler,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) {
        let image_info = [vk::DescriptorImageInfo::default()
            .sampler(sampler)
            .image_view(view)
            .image_layout(layout)];
        self.update(
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .dst_array_element(array_element)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info),
        );
    }

    /// Writes a `STORAGE_IMAGE` descriptor; storage images are always in
    /// `GENERAL` layout when accessed.
    pub fn write_storage_image(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        array_element: u32,
        view: vk::ImageView,
    ) {
        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(view)
            .image_layout(vk::ImageLayout::GENERAL)];
        self.update(
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .dst_array_element(array_element)
                .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                .image_info(&image_info),
        );
    }

    /// Writes a buffer descriptor of type `ty`.
    ///
    /// A `range` of 0 binds from `offset` to the end of the buffer.
    pub fn write_buffer(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) {
        let buffer_info = [vk::DescriptorBufferInfo::default()
            .buffer(buffer)
            .offset(offset)
            .range(buffer_range(range))];
        self.update(
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(binding)
                .descriptor_type(ty)
                .buffer_info(&buffer_info),
        );
    }

    /// Writes a top-level acceleration structure descriptor.
    pub fn write_acceleration_structure(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        acceleration_structure: vk::AccelerationStructureKHR,
    ) {
        let structures = [acceleration_structure];
        let mut as_info = vk::WriteDescriptorSetAccelerationStructureKHR::default()
            .acceleration_structures(&structures);
        let mut write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
            .push_next(&mut as_info);
        write.descriptor_count = 1;
        self.update(write);
    }

    fn update(&self, write: vk::WriteDescriptorSet<'_>) {
        unsafe {
            self.device.handle().update_descriptor_sets(&[write], &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_index_follows_binding_count() {
        let builder = DescriptorSetLayoutBuilder::new("test")
            .with_uniform_buffers(1, vk::ShaderStageFlags::VERTEX)
            .with_samplers(2, vk::ShaderStageFlags::FRAGMENT);

        let indices: Vec<u32> = builder.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(
            builder.bindings()[1].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_explicit_index_may_be_sparse() {
        let builder = DescriptorSetLayoutBuilder::new("sparse").with_binding_at(
            5,
            vk::DescriptorType::STORAGE_BUFFER,
            1,
            vk::ShaderStageFlags::COMPUTE,
            vk::DescriptorBindingFlags::empty(),
        );
        assert_eq!(builder.bindings().len(), 1);
        assert_eq!(builder.bindings()[0].binding, 5);
    }

    #[test]
    fn test_auto_index_skips_explicit_indices() {
        let builder = DescriptorSetLayoutBuilder::new("mixed")
            .with_binding_at(
                1,
                vk::DescriptorType::STORAGE_IMAGE,
                1,
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorBindingFlags::empty(),
            )
            .with_storage_buffers(2, vk::ShaderStageFlags::COMPUTE);

        let indices: Vec<u32> = builder.bindings().iter().map(|b| b.binding).collect();
        assert_eq!(indices, vec![1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "already has binding 0")]
    fn test_duplicate_index_panics() {
        let _ = DescriptorSetLayoutBuilder::new("dup")
            .with_uniform_buffers(1, vk::ShaderStageFlags::VERTEX)
            .with_binding_at(
                0,
                vk::DescriptorType::SAMPLED_IMAGE,
                1,
                vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorBindingFlags::empty(),
            );
    }

    #[test]
    fn test_flags_stay_parallel_to_bindings() {
        let builder = DescriptorSetLayoutBuilder::new("bindless")
            .with_uniform_buffers(1, vk::ShaderStageFlags::ALL)
            .with_binding(
                vk::DescriptorType::SAMPLED_IMAGE,
                1024,
                vk::ShaderStageFlags::FRAGMENT,
                vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT
                    | vk::DescriptorBindingFlags::PARTIALLY_BOUND,
            );

        assert_eq!(builder.bindings().len(), builder.binding_flags().len());
        assert!(builder.binding_flags()[0].is_empty());
        assert!(
            builder.binding_flags()[1]
                .contains(vk::DescriptorBindingFlags::VARIABLE_DESCRIPTOR_COUNT)
        );
        assert_eq!(builder.bindings()[1].descriptor_count, 1024);
    }

    #[test]
    fn test_creation_flags_accumulate() {
        let builder = DescriptorSetLayoutBuilder::new("flags")
            .with_creation_flags(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR)
            .with_binding(
                vk::DescriptorType::STORAGE_BUFFER,
                1,
                vk::ShaderStageFlags::COMPUTE,
                vk::DescriptorBindingFlags::UPDATE_AFTER_BIND,
            );

        let flags = builder.creation_flags();
        assert!(flags.contains(vk::DescriptorSetLayoutCreateFlags::PUSH_DESCRIPTOR_KHR));
        assert!(flags.contains(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL));
    }

    #[test]
    fn test_default_pool_sizes() {
        let sizes = default_pool_sizes(DEFAULT_POOL_CAPACITY, false);
        assert_eq!(sizes.len(), DEFAULT_POOL_TYPES.len());
        assert!(sizes.iter().all(|s| s.descriptor_count == 128));

        let with_as = default_pool_sizes(16, true);
        assert_eq!(
            with_as.last().map(|s| s.ty),
            Some(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
        );
    }

    #[test]
    fn test_zero_range_means_whole_buffer() {
        assert_eq!(buffer_range(0), vk::WHOLE_SIZE);
        assert_eq!(buffer_range(256), 256);
    }

    #[test]
    fn test_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<DescriptorSetLayout>();
        assert_send_sync::<DescriptorPool>();
    }

    #[test]
    #[should_panic(expected = "was already built; call reset() first")]
    fn test_layout_builder_is_single_use() {
        let mut builder = DescriptorSetLayoutBuilder::new("once")
            .with_uniform_buffers(1, vk::ShaderStageFlags::VERTEX);
        builder.mark_built();
        builder.mark_built();
    }

    #[test]
    fn test_layout_builder_reset() {
        let mut builder = DescriptorSetLayoutBuilder::new("again");
        builder.mark_built();
        assert!(builder.is_built());

        builder.reset();
        assert!(!builder.is_built());
        builder.mark_built();
    }
}
