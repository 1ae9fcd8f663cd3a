//! Command pools, command buffers and queue submission.
//!
//! # Overview
//!
//! - [`QueueKind`] names the three submission roles: graphics, copy and
//!   async compute. Roles without a dedicated family share the graphics queue.
//! - [`CommandPools`] owns one reset-capable pool per role and is the entry
//!   point for submission, including the synchronous
//!   [`CommandPools::submit_one_shot`] used during uploads.
//! - [`CommandBuffer`] wraps `VkCommandBuffer` with the recording surface.
//!
//! Frame submissions never block the host; ordering is expressed through
//! semaphores. Host waits happen only in `submit_wait` and `submit_one_shot`,
//! and both are bounded.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::DeviceContext;
//! use vkframe_rhi::command::{CommandPools, UPLOAD_QUEUE};
//!
//! # fn example(device: Arc<DeviceContext>) -> Result<(), vkframe_rhi::RhiError> {
//! let pools = CommandPools::new(device.clone())?;
//!
//! pools.submit_one_shot(UPLOAD_QUEUE, "upload", |cmd| {
//!     // cmd.copy_buffer(staging, target, &regions);
//!     let _ = cmd;
//! })?;
//! # Ok(())
//! # }
//! ```

use std::any::Any;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::DeviceContext;
use crate::error::{RhiError, RhiResult};
use crate::sync::Fence;

/// Upper bound on host waits for one-shot submissions.
pub const ONE_SHOT_TIMEOUT: Duration = Duration::from_secs(10);

/// Queue for staging uploads into exclusive resources. Graphics, so the
/// data never needs a queue-family ownership transfer before it is used.
pub const UPLOAD_QUEUE: QueueKind = QueueKind::Graphics;

/// Submission role of a command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Frame rendering and presentation-adjacent work.
    Graphics,
    /// Transfers and uploads.
    Copy,
    /// Compute that may overlap graphics work.
    AsyncCompute,
}

impl QueueKind {
    /// Every role, in pool order.
    pub const ALL: [QueueKind; 3] = [QueueKind::Graphics, QueueKind::Copy, QueueKind::AsyncCompute];

    #[inline]
    fn index(self) -> usize {
        match self {
            QueueKind::Graphics => 0,
            QueueKind::Copy => 1,
            QueueKind::AsyncCompute => 2,
        }
    }

    /// Human-readable role name.
    pub fn name(self) -> &'static str {
        match self {
            QueueKind::Graphics => "graphics",
            QueueKind::Copy => "copy",
            QueueKind::AsyncCompute => "async compute",
        }
    }
}

/// A semaphore the submission waits on, with the stage that waits.
#[derive(Clone, Copy, Debug)]
pub struct SemaphoreWait {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags,
}

/// Vulkan command pool wrapper.
///
/// Pools are not thread-safe; record from one thread per pool.
pub struct CommandPool {
    device: Arc<DeviceContext>,
    pool: vk::CommandPool,
    queue_family_index: u32,
    kind: QueueKind,
}

impl CommandPool {
    /// Creates a pool for the family backing `kind`.
    ///
    /// Created with `RESET_COMMAND_BUFFER` so buffers can be reset one at a
    /// time.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if creation fails.
    pub fn new(device: Arc<DeviceContext>, kind: QueueKind) -> RhiResult<Self> {
        let queue_family_index = device.queue_family(kind);
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None) }
            .map_err(|e| RhiError::creation("command pool", e))?;
        device.set_debug_name(pool, &format!("{} command pool", kind.name()));

        info!(
            "Command pool created for {} (queue family {})",
            kind.name(),
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
            kind,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Returns the role this pool records for.
    #[inline]
    pub fn kind(&self) -> QueueKind {
        self.kind
    }

    /// Allocates primary command buffers from this pool.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info) }
            .map_err(|e| RhiError::creation("command buffer", e))?;
        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer::from_handle(self.device.clone(), buffer))
            .collect())
    }

    /// Allocates a single primary command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffer(&self) -> RhiResult<CommandBuffer> {
        self.allocate_command_buffers(1)?
            .pop()
            .ok_or(RhiError::creation("command buffer", vk::Result::ERROR_UNKNOWN))
    }

    /// Returns command buffers to the pool.
    ///
    /// The buffers must not be pending execution.
    pub fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        if buffers.is_empty() {
            return;
        }
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.pool, buffers);
        }
    }

    /// Resets every buffer allocated from the pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self, release_resources: bool) -> RhiResult<()> {
        let flags = if release_resources {
            vk::CommandPoolResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandPoolResetFlags::empty()
        };

        unsafe { self.device.handle().reset_command_pool(self.pool, flags) }?;
        Ok(())
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!("Command pool destroyed for {}", self.kind.name());
    }
}

/// One-shot submission whose wait expired before completion.
struct PendingOneShot {
    kind: QueueKind,
    buffer: vk::CommandBuffer,
    fence: Fence,
    /// Objects the commands reference, released with the buffer.
    resources: Option<Box<dyn Any + Send>>,
}

/// One command pool per [`QueueKind`].
pub struct CommandPools {
    device: Arc<DeviceContext>,
    pools: [CommandPool; 3],
    pending: Mutex<Vec<PendingOneShot>>,
}

impl CommandPools {
    /// Creates the graphics, copy and async-compute pools.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceCreation`] if any pool cannot be created.
    pub fn new(device: Arc<DeviceContext>) -> RhiResult<Self> {
        let pools = [
            CommandPool::new(device.clone(), QueueKind::Graphics)?,
            CommandPool::new(device.clone(), QueueKind::Copy)?,
            CommandPool::new(device.clone(), QueueKind::AsyncCompute)?,
        ];

        Ok(Self {
            device,
            pools,
            pending: Mutex::new(Vec::new()),
        })
    }

    /// Returns the pool for a role.
    #[inline]
    pub fn pool(&self, kind: QueueKind) -> &CommandPool {
        &self.pools[kind.index()]
    }

    /// Returns the device the pools were created on.
    #[inline]
    pub fn device(&self) -> &Arc<DeviceContext> {
        &self.device
    }

    /// Allocates a primary command buffer for `kind` and begins recording it
    /// for one-time submission.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation or `vkBeginCommandBuffer` fails.
    pub fn begin(&self, kind: QueueKind, name: &str) -> RhiResult<CommandBuffer> {
        let pool = self.pool(kind);
        let cmd = pool.allocate_command_buffer()?;
        self.device.set_debug_name(cmd.handle(), name);

        if let Err(e) = cmd.begin() {
            pool.free_command_buffers(&[cmd.handle()]);
            return Err(e);
        }
        Ok(cmd)
    }

    /// Ends `cmd` and submits it to the queue for `kind`.
    ///
    /// Non-blocking: ordering is carried by `waits` and `signals`, completion
    /// by `fence` (pass `vk::Fence::null()` for none).
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost, or the
    /// underlying error if `vkEndCommandBuffer` or `vkQueueSubmit` fails.
    pub fn submit(
        &self,
        kind: QueueKind,
        cmd: &CommandBuffer,
        waits: &[SemaphoreWait],
        signals: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        cmd.end()?;

        let wait_semaphores: Vec<vk::Semaphore> = waits.iter().map(|w| w.semaphore).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = waits.iter().map(|w| w.stage).collect();
        let command_buffers = [cmd.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(signals);

        unsafe { self.device.submit(kind, &[submit_info], fence) }
    }

    /// Submits `cmd` and blocks until it completes or `timeout` expires.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Timeout`] if the wait expires; the buffer is then
    /// still pending and must not be freed by the caller.
    pub fn submit_wait(
        &self,
        kind: QueueKind,
        cmd: &CommandBuffer,
        timeout: Duration,
    ) -> RhiResult<()> {
        let fence = Fence::new(self.device.clone(), false, "submit wait")?;
        self.submit(kind, cmd, &[], &[], fence.handle())?;
        match fence.wait(timeout_ns(timeout)) {
            Err(RhiError::Timeout { what, timeout }) => {
                self.park(kind, cmd.handle(), fence, None);
                Err(RhiError::Timeout { what, timeout })
            }
            other => other,
        }
    }

    /// Records, submits and waits for a single command buffer.
    ///
    /// The buffer is freed once the GPU is done with it. If the bounded wait
    /// expires, the buffer and its fence are kept until a later call finds
    /// them complete, and [`RhiError::Timeout`] is returned.
    ///
    /// # Errors
    ///
    /// - [`RhiError::Timeout`] after [`ONE_SHOT_TIMEOUT`]
    /// - [`RhiError::DeviceLost`] if the device was lost
    /// - [`RhiError::ResourceCreation`] if the buffer or fence cannot be created
    pub fn submit_one_shot<F>(&self, kind: QueueKind, name: &str, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer),
    {
        self.submit_one_shot_keeping(kind, name, (), |cmd, _| record(cmd))
    }

    /// Like [`submit_one_shot`](Self::submit_one_shot), for commands that
    /// reference `resources`, such as a staging buffer and its destination.
    ///
    /// `resources` are handed back once the GPU has finished. If the wait
    /// expires they are parked with the command buffer instead, so nothing
    /// the pending commands use is destroyed early.
    ///
    /// # Errors
    ///
    /// Same as [`submit_one_shot`](Self::submit_one_shot).
    pub fn submit_one_shot_keeping<K, F>(
        &self,
        kind: QueueKind,
        name: &str,
        mut resources: K,
        record: F,
    ) -> RhiResult<K>
    where
        K: Send + 'static,
        F: FnOnce(&CommandBuffer, &mut K),
    {
        self.reclaim()?;

        let cmd = self.begin(kind, name)?;
        record(&cmd, &mut resources);

        let pool = self.pool(kind);
        let fence = match Fence::new(self.device.clone(), false, name) {
            Ok(fence) => fence,
            Err(e) => {
                pool.free_command_buffers(&[cmd.handle()]);
                return Err(e);
            }
        };
        if let Err(e) = self.submit(kind, &cmd, &[], &[], fence.handle()) {
            // Not pending if the submit itself failed.
            if !e.is_fatal() {
                pool.free_command_buffers(&[cmd.handle()]);
            }
            return Err(e);
        }

        match fence.wait(timeout_ns(ONE_SHOT_TIMEOUT)) {
            Ok(()) => {
                pool.free_command_buffers(&[cmd.handle()]);
                Ok(resources)
            }
            Err(e) => {
                warn!("One-shot submission '{}' did not finish: {}", name, e);
                self.park(kind, cmd.handle(), fence, Some(Box::new(resources)));
                Err(e)
            }
        }
    }

    /// Frees parked one-shot buffers, and the resources parked with them,
    /// whose fences have signaled.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] if the device was lost.
    pub fn reclaim(&self) -> RhiResult<()> {
        let done = {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            take_completed(&mut pending, |shot| shot.fence.is_signaled())?
        };
        for shot in done {
            self.pool(shot.kind).free_command_buffers(&[shot.buffer]);
        }
        Ok(())
    }

    /// Number of one-shot submissions still waiting to be reclaimed.
    pub fn pending_one_shots(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn park(
        &self,
        kind: QueueKind,
        buffer: vk::CommandBuffer,
        fence: Fence,
        resources: Option<Box<dyn Any + Send>>,
    ) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.push(PendingOneShot {
            kind,
            buffer,
            fence,
            resources,
        });
    }
}

/// Removes and returns the entries `is_done` reports complete, keeping the
/// rest in place.
fn take_completed<T>(
    pending: &mut Vec<T>,
    mut is_done: impl FnMut(&T) -> RhiResult<bool>,
) -> RhiResult<Vec<T>> {
    let mut done = Vec::new();
    let mut index = 0;
    while index < pending.len() {
        if is_done(&pending[index])? {
            done.push(pending.swap_remove(index));
        } else {
            index += 1;
        }
    }
    Ok(done)
}

impl Drop for CommandPools {
    fn drop(&mut self) {
        let pending = std::mem::take(
            self.pending
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if !pending.is_empty() {
            if let Err(e) = self.device.wait_idle() {
                warn!("Failed to wait for pending one-shot work: {:?}", e);
            }
            for done in pending {
                self.pool(done.kind).free_command_buffers(&[done.buffer]);
            }
        }
    }
}

fn timeout_ns(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Vulkan command buffer wrapper.
///
/// Does not own the handle; it is returned to its pool explicitly or when
/// the pool is destroyed.
#[derive(Clone)]
pub struct CommandBuffer {
    device: Arc<DeviceContext>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Wraps an existing command buffer handle.
    #[inline]
    pub fn from_handle(device: Arc<DeviceContext>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Returns the device this buffer records for.
    #[inline]
    pub fn device(&self) -> &Arc<DeviceContext> {
        &self.device
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording for one-time submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is already recording.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)
        }?;
        Ok(())
    }

    /// Ends recording.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not recording.
    pub fn end(&self) -> RhiResult<()> {
        unsafe { self.device.handle().end_command_buffer(self.buffer) }?;
        Ok(())
    }

    /// Resets the buffer so it can be recorded again.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())
        }?;
        Ok(())
    }

    // =========================================================================
    // Debug Labels
    // =========================================================================

    /// Opens a named region visible in captures and validation output.
    pub fn begin_debug_area(&self, name: &str) {
        if let Some(debug_utils) = self.device.debug_utils() {
            debug_utils.begin_label(self.buffer, name, [1.0, 1.0, 1.0, 1.0]);
        }
    }

    /// Closes the innermost region opened with [`Self::begin_debug_area`].
    pub fn end_debug_area(&self) {
        if let Some(debug_utils) = self.device.debug_utils() {
            debug_utils.end_label(self.buffer);
        }
    }

    /// Inserts a single named marker.
    pub fn insert_debug_marker(&self, name: &str) {
        if let Some(debug_utils) = self.device.debug_utils() {
            debug_utils.insert_label(self.buffer, name, [1.0, 1.0, 0.0, 1.0]);
        }
    }

    // =========================================================================
    // Dynamic Rendering (Vulkan 1.3)
    // =========================================================================

    /// Begins dynamic rendering.
    pub fn begin_rendering(&self, rendering_info: &vk::RenderingInfo) {
        unsafe {
            self.device
                .handle()
                .cmd_begin_rendering(self.buffer, rendering_info);
        }
    }

    /// Ends dynamic rendering.
    pub fn end_rendering(&self) {
        unsafe {
            self.device.handle().cmd_end_rendering(self.buffer);
        }
    }

    // =========================================================================
    // Pipeline Binding
    // =========================================================================

    /// Binds a pipeline.
    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_pipeline(self.buffer, bind_point, pipeline);
        }
    }

    /// Binds vertex buffers starting at `first_binding`.
    pub fn bind_vertex_buffers(
        &self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.device.handle().cmd_bind_vertex_buffers(
                self.buffer,
                first_binding,
                buffers,
                offsets,
            );
        }
    }

    /// Binds an index buffer.
    pub fn bind_index_buffer(
        &self,
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_index_buffer(self.buffer, buffer, offset, index_type);
        }
    }

    /// Binds a contiguous run of descriptor sets starting at `first_set`.
    pub fn bind_descriptor_sets(
        &self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                bind_point,
                layout,
                first_set,
                descriptor_sets,
                dynamic_offsets,
            );
        }
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    /// Sets viewport 0.
    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport));
        }
    }

    /// Sets scissor 0.
    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor));
        }
    }

    // =========================================================================
    // Drawing and Dispatch
    // =========================================================================

    pub fn draw(
        &self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.handle().cmd_draw(
                self.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }

    pub fn draw_indexed(
        &self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.handle().cmd_draw_indexed(
                self.buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    pub fn dispatch(&self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe {
            self.device.handle().cmd_dispatch(
                self.buffer,
                group_count_x,
                group_count_y,
                group_count_z,
            );
        }
    }

    // =========================================================================
    // Push Constants
    // =========================================================================

    /// Pushes a plain-old-data value.
    pub fn push_constants<T: bytemuck::Pod>(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &T,
    ) {
        self.push_constants_bytes(layout, stages, offset, bytemuck::bytes_of(data));
    }

    /// Pushes raw bytes.
    pub fn push_constants_bytes(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device
                .handle()
                .cmd_push_constants(self.buffer, layout, stages, offset, data);
        }
    }

    // =========================================================================
    // Synchronization
    // =========================================================================

    /// Inserts a pipeline barrier carrying image barriers only.
    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                image_barriers,
            );
        }
    }

    /// Inserts a pipeline barrier carrying buffer barriers only.
    pub fn buffer_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        buffer_barriers: &[vk::BufferMemoryBarrier],
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                buffer_barriers,
                &[],
            );
        }
    }

    // =========================================================================
    // Copy Commands
    // =========================================================================

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, regions);
        }
    }

    pub fn copy_buffer_to_image(
        &self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::BufferImageCopy],
    ) {
        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                dst_layout,
                regions,
            );
        }
    }

    /// Scaled copy between images.
    pub fn blit_image(
        &self,
        src: vk::Image,
        src_layout: vk::ImageLayout,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        regions: &[vk::ImageBlit],
        filter: vk::Filter,
    ) {
        unsafe {
            self.device.handle().cmd_blit_image(
                self.buffer,
                src,
                src_layout,
                dst,
                dst_layout,
                regions,
                filter,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_kind_indices_are_distinct() {
        let mut seen = [false; 3];
        for kind in QueueKind::ALL {
            assert!(!seen[kind.index()]);
            seen[kind.index()] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn test_timeout_conversion_saturates() {
        assert_eq!(timeout_ns(Duration::from_millis(2)), 2_000_000);
        assert_eq!(timeout_ns(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_uploads_stay_on_the_graphics_family() {
        assert_eq!(UPLOAD_QUEUE, QueueKind::Graphics);
    }

    #[test]
    fn test_parked_resources_live_until_completed() {
        let staging = Arc::new(());
        let mut pending = vec![(false, staging.clone()), (true, Arc::new(()))];

        let done = take_completed(&mut pending, |(finished, _)| Ok(*finished)).unwrap();
        assert_eq!(done.len(), 1);
        drop(done);
        assert_eq!(pending.len(), 1);
        assert_eq!(Arc::strong_count(&staging), 2);

        pending[0].0 = true;
        let done = take_completed(&mut pending, |(finished, _)| Ok(*finished)).unwrap();
        drop(done);
        assert!(pending.is_empty());
        assert_eq!(Arc::strong_count(&staging), 1);
    }

    #[test]
    fn test_completion_errors_keep_everything_parked() {
        let mut pending = vec![1, 2, 3];
        let result = take_completed(&mut pending, |_| Err(RhiError::DeviceLost));
        assert!(result.is_err());
        assert_eq!(pending.len(), 3);
    }

    #[test]
    fn test_command_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
    }

    #[test]
    fn test_command_pools_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CommandPools>();
    }
}
