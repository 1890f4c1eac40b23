//! Core backend abstraction traits
//!
//! The render graph talks to the GPU only through these traits. Native
//! backends live outside this crate; [`DummyContext`](super::dummy::DummyContext)
//! implements them headlessly for tests and tooling.

use crate::backend::types::*;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create texture: {0}")]
    TextureCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Failed to create pipeline: {0}")]
    PipelineCreationFailed(String),
    #[error("Descriptor heap exhausted ({0} slots)")]
    HeapExhausted(usize),
    #[error("Failed to submit {queue} queue: {reason}")]
    SubmitFailed { queue: QueueKind, reason: String },
    #[error("Failed to present: {0}")]
    PresentFailed(String),
    #[error("Fence wait failed: {0}")]
    FenceFailed(String),
    #[error("Unknown handle: {0}")]
    InvalidHandle(u64),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Records commands into one queue's open command list
pub trait CommandRecorder {
    /// Batch of state transitions
    fn transition(&mut self, barriers: &[Barrier]);

    fn set_pipeline(&mut self, pipeline: PipelineHandle);

    fn set_view(&mut self, view: &View);

    /// Bind the render target, optionally clearing it first
    fn set_render_target(&mut self, target: CpuDescriptor, clear: Option<[f32; 4]>);

    fn bind(&mut self, binding: &Binding);

    fn draw_mesh(&mut self, mesh: &MeshDraw);

    fn copy_buffer(&mut self, dst: BufferHandle, src: BufferHandle, size: u64);

    fn copy_texture(&mut self, dst: TextureHandle, src: TextureHandle);
}

/// Device, queues, swapchain and synchronization of a graphics backend
///
/// Slot numbering follows the swapchain: [`current_frame`](Self::current_frame)
/// is the back buffer the next frame renders into and advances on
/// [`present`](Self::present).
pub trait GraphicsContext {
    /// Backend name for logging
    fn name(&self) -> &str;

    // === Frame ===

    /// Open the queue's command list for the current frame slot
    fn begin_commands(&mut self, queue: QueueKind) -> BackendResult<()>;

    /// Recorder for the queue's open command list
    fn commands(&mut self, queue: QueueKind) -> &mut dyn CommandRecorder;

    /// Close and submit the queue's command list
    fn submit(&mut self, queue: QueueKind) -> BackendResult<()>;

    /// Block until everything submitted to `queue` has executed
    fn wait_queue_idle(&mut self, queue: QueueKind) -> BackendResult<()>;

    fn present(&mut self) -> BackendResult<()>;

    fn current_frame(&self) -> usize;

    fn frame_count(&self) -> usize;

    fn scene_size(&self) -> TextureSize;

    fn window_size(&self) -> TextureSize;

    /// Swapchain image of the current frame slot
    fn back_buffer(&self) -> TextureHandle;

    fn back_buffer_view(&self) -> CpuDescriptor;

    /// Recreate the swapchain for a new window size
    fn resize(&mut self, window: TextureSize) -> BackendResult<()>;

    // === Resources ===

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle>;

    /// Write texel data into a host-visible texture
    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()>;

    fn release_texture(&mut self, texture: TextureHandle);

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle>;

    /// Write bytes into a host-visible buffer
    fn write_buffer(&mut self, buffer: BufferHandle, data: &[u8]) -> BackendResult<()>;

    fn release_buffer(&mut self, buffer: BufferHandle);

    fn create_render_target_view(&mut self, texture: TextureHandle)
        -> BackendResult<CpuDescriptor>;

    /// Write a shader resource view into a heap slot
    fn create_shader_view(
        &mut self,
        texture: TextureHandle,
        slot: HeapSlot,
    ) -> BackendResult<GpuDescriptor>;

    fn alloc_heap_slot(&mut self) -> BackendResult<HeapSlot>;

    fn free_heap_slot(&mut self, slot: HeapSlot);

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> BackendResult<PipelineHandle>;

    // === Synchronization ===

    /// Signal the direct queue's frame fence with `value`
    fn signal_fence(&mut self, value: u64) -> BackendResult<()>;

    fn completed_fence_value(&self) -> u64;

    /// Block the host until the frame fence reaches `value`
    fn wait_fence(&mut self, value: u64) -> BackendResult<()>;

    /// Reset the command allocators of a frame slot
    fn reset_allocator(&mut self, slot: usize) -> BackendResult<()>;
}
