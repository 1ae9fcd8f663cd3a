//! Descriptor set binding helpers.
//!
//! [`DescriptorSetBinder`] binds each set as it is given.
//! [`DescriptorSetMultiBinder`] collects sets by slot and, on commit, issues
//! one `vkCmdBindDescriptorSets` per contiguous run of slots.
//!
//! ```no_run
//! use ash::vk;
//! use vkframe_rhi::binder::DescriptorSetMultiBinder;
//! use vkframe_rhi::command::CommandBuffer;
//!
//! # fn example(cmd: &CommandBuffer, layout: vk::PipelineLayout, sets: [vk::DescriptorSet; 3]) {
//! // Slots 2, 3 and 4 go out as a single bind call.
//! DescriptorSetMultiBinder::new(0)
//!     .bind(sets[0], 2)
//!     .bind(sets[1], 3)
//!     .bind(sets[2], 4)
//!     .commit(cmd, layout, vk::PipelineBindPoint::GRAPHICS);
//! # }
//! ```

use ash::vk;

use crate::command::CommandBuffer;

/// Width of the slot window a [`DescriptorSetMultiBinder`] can fill.
pub const MAX_BOUND_SETS: usize = 16;

/// Binds descriptor sets one slot at a time.
pub struct DescriptorSetBinder<'a> {
    cmd: &'a CommandBuffer,
    layout: vk::PipelineLayout,
    bind_point: vk::PipelineBindPoint,
}

impl<'a> DescriptorSetBinder<'a> {
    pub fn new(
        cmd: &'a CommandBuffer,
        layout: vk::PipelineLayout,
        bind_point: vk::PipelineBindPoint,
    ) -> Self {
        Self {
            cmd,
            layout,
            bind_point,
        }
    }

    /// Records a bind of `set` at `slot` immediately.
    pub fn bind(&self, set: vk::DescriptorSet, slot: u32) -> &Self {
        self.cmd
            .bind_descriptor_sets(self.bind_point, self.layout, slot, &[set], &[]);
        self
    }
}

/// A contiguous run of sets bound with one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRange {
    pub first_slot: u32,
    pub sets: Vec<vk::DescriptorSet>,
}

/// Splits a slot window into contiguous runs of bound sets.
///
/// `slots[i]` is the set at slot `first_slot + i`. Holes end a run and are
/// never bound.
pub fn plan_bind_ranges(first_slot: u32, slots: &[Option<vk::DescriptorSet>]) -> Vec<BindRange> {
    let mut ranges = Vec::new();
    let mut current: Option<BindRange> = None;

    for (i, slot) in slots.iter().enumerate() {
        match (slot, current.as_mut()) {
            (Some(set), Some(range)) => range.sets.push(*set),
            (Some(set), None) => {
                current = Some(BindRange {
                    first_slot: first_slot + i as u32,
                    sets: vec![*set],
                });
            }
            (None, _) => ranges.extend(current.take()),
        }
    }
    ranges.extend(current);
    ranges
}

/// Collects sets by slot and binds them in as few calls as possible.
#[derive(Debug, Clone)]
pub struct DescriptorSetMultiBinder {
    first_slot: u32,
    slots: [Option<vk::DescriptorSet>; MAX_BOUND_SETS],
}

impl DescriptorSetMultiBinder {
    /// Creates a binder whose window covers slots
    /// `first_slot..first_slot + MAX_BOUND_SETS`.
    pub fn new(first_slot: u32) -> Self {
        Self {
            first_slot,
            slots: [None; MAX_BOUND_SETS],
        }
    }

    /// Places `set` at `slot`, replacing any set already there.
    ///
    /// # Panics
    ///
    /// Panics if `slot` falls outside the binder's window.
    pub fn bind(mut self, set: vk::DescriptorSet, slot: u32) -> Self {
        let index = slot
            .checked_sub(self.first_slot)
            .map(|i| i as usize)
            .filter(|&i| i < MAX_BOUND_SETS);
        let Some(index) = index else {
            panic!(
                "descriptor set slot {} outside binder window {}..{}",
                slot,
                self.first_slot,
                self.first_slot as usize + MAX_BOUND_SETS
            );
        };
        self.slots[index] = Some(set);
        self
    }

    /// Number of slots currently holding a set.
    pub fn bound_count(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// The bind calls [`commit`](Self::commit) would record.
    pub fn bind_ranges(&self) -> Vec<BindRange> {
        plan_bind_ranges(self.first_slot, &self.slots)
    }

    /// Records one bind call per contiguous run of slots.
    pub fn commit(
        &self,
        cmd: &CommandBuffer,
        layout: vk::PipelineLayout,
        bind_point: vk::PipelineBindPoint,
    ) {
        for range in self.bind_ranges() {
            cmd.bind_descriptor_sets(bind_point, layout, range.first_slot, &range.sets, &[]);
        }
    }
}
