//! Dummy graphics context for testing and tooling.
//!
//! Performs no GPU work. Every recorded command and every queue, swapchain
//! and fence operation is kept in inspectable logs so frame scheduling can be
//! verified without hardware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::traits::{BackendError, BackendResult, CommandRecorder, GraphicsContext};
use super::types::*;

const LOG_TARGET: &str = "backend";

/// A command recorded into a dummy command list
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Transition(Vec<Barrier>),
    SetPipeline(PipelineHandle),
    SetView(View),
    SetRenderTarget {
        target: CpuDescriptor,
        clear: Option<[f32; 4]>,
    },
    Bind(Binding),
    DrawMesh(MeshDraw),
    CopyBuffer {
        dst: BufferHandle,
        src: BufferHandle,
        size: u64,
    },
    CopyTexture {
        dst: TextureHandle,
        src: TextureHandle,
    },
}

/// Queue, swapchain and fence activity in call order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    BeginCommands(QueueKind),
    Submit(QueueKind),
    WaitQueueIdle(QueueKind),
    Present,
    SignalFence(u64),
    WaitFence(u64),
    ResetAllocator(usize),
    Resize(TextureSize),
}

/// A closed command list handed to a queue
#[derive(Debug, Clone)]
pub struct Submission {
    pub queue: QueueKind,
    pub frame: usize,
    pub commands: Vec<Command>,
}

/// Command list of one queue
#[derive(Debug, Default)]
pub struct DummyRecorder {
    commands: Vec<Command>,
}

impl DummyRecorder {
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }
}

impl CommandRecorder for DummyRecorder {
    fn transition(&mut self, barriers: &[Barrier]) {
        self.commands.push(Command::Transition(barriers.to_vec()));
    }

    fn set_pipeline(&mut self, pipeline: PipelineHandle) {
        self.commands.push(Command::SetPipeline(pipeline));
    }

    fn set_view(&mut self, view: &View) {
        self.commands.push(Command::SetView(*view));
    }

    fn set_render_target(&mut self, target: CpuDescriptor, clear: Option<[f32; 4]>) {
        self.commands.push(Command::SetRenderTarget { target, clear });
    }

    fn bind(&mut self, binding: &Binding) {
        self.commands.push(Command::Bind(binding.clone()));
    }

    fn draw_mesh(&mut self, mesh: &MeshDraw) {
        self.commands.push(Command::DrawMesh(*mesh));
    }

    fn copy_buffer(&mut self, dst: BufferHandle, src: BufferHandle, size: u64) {
        self.commands.push(Command::CopyBuffer { dst, src, size });
    }

    fn copy_texture(&mut self, dst: TextureHandle, src: TextureHandle) {
        self.commands.push(Command::CopyTexture { dst, src });
    }
}

#[derive(Debug)]
struct FenceState {
    signaled: u64,
    completed: u64,
    auto_complete: bool,
}

/// Simulated frame fence
///
/// By default a signaled value completes immediately. With auto completion
/// disabled, values stay pending until [`complete`](Self::complete) is called,
/// possibly from another thread.
#[derive(Debug, Clone)]
pub struct DummyFence {
    state: Arc<(Mutex<FenceState>, Condvar)>,
}

impl DummyFence {
    fn new() -> Self {
        Self {
            state: Arc::new((
                Mutex::new(FenceState {
                    signaled: 0,
                    completed: 0,
                    auto_complete: true,
                }),
                Condvar::new(),
            )),
        }
    }

    pub fn set_auto_complete(&self, enabled: bool) {
        self.state.0.lock().auto_complete = enabled;
    }

    /// Mark every value up to `value` as executed
    pub fn complete(&self, value: u64) {
        let (lock, condvar) = &*self.state;
        let mut state = lock.lock();
        state.completed = state.completed.max(value);
        condvar.notify_all();
    }

    pub fn completed(&self) -> u64 {
        self.state.0.lock().completed
    }

    pub fn signaled(&self) -> u64 {
        self.state.0.lock().signaled
    }

    fn signal(&self, value: u64) {
        let (lock, condvar) = &*self.state;
        let mut state = lock.lock();
        state.signaled = state.signaled.max(value);
        if state.auto_complete {
            state.completed = state.signaled;
            condvar.notify_all();
        }
    }

    fn wait(&self, value: u64, timeout: Duration) -> BackendResult<()> {
        let (lock, condvar) = &*self.state;
        let mut state = lock.lock();
        if state.completed >= value {
            return Ok(());
        }
        if state.signaled < value {
            return Err(BackendError::FenceFailed(format!(
                "value {} was never signaled (last signaled {})",
                value, state.signaled
            )));
        }
        while state.completed < value {
            if condvar.wait_for(&mut state, timeout).timed_out() && state.completed < value {
                return Err(BackendError::FenceFailed(format!(
                    "timed out waiting for value {}",
                    value
                )));
            }
        }
        Ok(())
    }
}

/// Headless [`GraphicsContext`]
#[derive(Debug)]
pub struct DummyContext {
    frame_count: usize,
    current_frame: usize,
    scene_size: TextureSize,
    window_size: TextureSize,
    recorders: [DummyRecorder; QueueKind::COUNT],
    recording: [bool; QueueKind::COUNT],
    submissions: Vec<Submission>,
    events: Vec<Event>,
    fence: DummyFence,
    fence_timeout: Duration,
    heap: Vec<bool>,
    next_handle: u64,
    textures: HashMap<u64, TextureDescriptor>,
    buffers: HashMap<u64, BufferDescriptor>,
    presented: u64,
}

impl DummyContext {
    pub fn new(frame_count: usize, scene_size: TextureSize, window_size: TextureSize) -> Self {
        Self::with_heap_size(frame_count, scene_size, window_size, 1024)
    }

    pub fn with_heap_size(
        frame_count: usize,
        scene_size: TextureSize,
        window_size: TextureSize,
        heap_size: usize,
    ) -> Self {
        let frame_count = frame_count.max(1);
        log::trace!(
            target: LOG_TARGET,
            "DummyContext: {} frames, scene {}, window {}",
            frame_count,
            scene_size,
            window_size
        );
        Self {
            frame_count,
            current_frame: 0,
            scene_size,
            window_size,
            recorders: Default::default(),
            recording: [false; QueueKind::COUNT],
            submissions: Vec::new(),
            events: Vec::new(),
            fence: DummyFence::new(),
            fence_timeout: Duration::from_secs(5),
            heap: vec![false; heap_size],
            // Handles 1..=frame_count are the swapchain images
            next_handle: frame_count as u64 + 1,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            presented: 0,
        }
    }

    /// Handle to the frame fence, usable from other threads
    pub fn fence(&self) -> DummyFence {
        self.fence.clone()
    }

    pub fn set_fence_timeout(&mut self, timeout: Duration) {
        self.fence_timeout = timeout;
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    pub fn clear_logs(&mut self) {
        self.events.clear();
        self.submissions.clear();
    }

    /// All barriers submitted so far, in submission order
    pub fn submitted_barriers(&self) -> Vec<Barrier> {
        self.submissions
            .iter()
            .flat_map(|submission| submission.commands.iter())
            .filter_map(|command| match command {
                Command::Transition(barriers) => Some(barriers.iter().copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn used_heap_slots(&self) -> usize {
        self.heap.iter().filter(|used| **used).count()
    }

    pub fn texture_descriptor(&self, texture: TextureHandle) -> Option<&TextureDescriptor> {
        self.textures.get(&texture.0)
    }

    fn next_handle(&mut self) -> u64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }
}

impl GraphicsContext for DummyContext {
    fn name(&self) -> &str {
        "Dummy Context"
    }

    fn begin_commands(&mut self, queue: QueueKind) -> BackendResult<()> {
        let index = queue.index();
        self.recorders[index].commands.clear();
        self.recording[index] = true;
        self.events.push(Event::BeginCommands(queue));
        Ok(())
    }

    fn commands(&mut self, queue: QueueKind) -> &mut dyn CommandRecorder {
        &mut self.recorders[queue.index()]
    }

    fn submit(&mut self, queue: QueueKind) -> BackendResult<()> {
        let index = queue.index();
        if !self.recording[index] {
            return Err(BackendError::SubmitFailed {
                queue,
                reason: "command list is not open".to_string(),
            });
        }
        self.recording[index] = false;
        let commands = std::mem::take(&mut self.recorders[index].commands);
        log::trace!(
            target: LOG_TARGET,
            "DummyContext: submitting {} commands to {} queue",
            commands.len(),
            queue
        );
        self.submissions.push(Submission {
            queue,
            frame: self.current_frame,
            commands,
        });
        self.events.push(Event::Submit(queue));
        Ok(())
    }

    fn wait_queue_idle(&mut self, queue: QueueKind) -> BackendResult<()> {
        self.events.push(Event::WaitQueueIdle(queue));
        Ok(())
    }

    fn present(&mut self) -> BackendResult<()> {
        if self.recording[QueueKind::Direct.index()] {
            return Err(BackendError::PresentFailed(
                "direct command list still open".to_string(),
            ));
        }
        self.events.push(Event::Present);
        self.presented += 1;
        self.current_frame = (self.current_frame + 1) % self.frame_count;
        Ok(())
    }

    fn current_frame(&self) -> usize {
        self.current_frame
    }

    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn scene_size(&self) -> TextureSize {
        self.scene_size
    }

    fn window_size(&self) -> TextureSize {
        self.window_size
    }

    fn back_buffer(&self) -> TextureHandle {
        TextureHandle(self.current_frame as u64 + 1)
    }

    fn back_buffer_view(&self) -> CpuDescriptor {
        CpuDescriptor(self.current_frame as u64)
    }

    fn resize(&mut self, window: TextureSize) -> BackendResult<()> {
        self.window_size = window;
        self.current_frame = 0;
        self.events.push(Event::Resize(window));
        Ok(())
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        if desc.size.is_empty() {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has empty size {}",
                desc.label, desc.size
            )));
        }
        log::trace!(
            target: LOG_TARGET,
            "DummyContext: creating texture {:?} ({})",
            desc.label,
            desc.size
        );
        let handle = self.next_handle();
        self.textures.insert(handle, desc.clone());
        Ok(TextureHandle(handle))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()> {
        let desc = self
            .textures
            .get(&texture.0)
            .ok_or(BackendError::InvalidHandle(texture.0))?;
        if (data.len() as u64) < desc.byte_size() {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} expects {} bytes, got {}",
                desc.label,
                desc.byte_size(),
                data.len()
            )));
        }
        Ok(())
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        self.textures.remove(&texture.0);
    }

    fn create_buffer(&mut self, desc: &BufferDescriptor) -> BackendResult<BufferHandle> {
        log::trace!(
            target: LOG_TARGET,
            "DummyContext: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        let handle = self.next_handle();
        self.buffers.insert(handle, desc.clone());
        Ok(BufferHandle(handle))
    }

    fn write_buffer(&mut self, buffer: BufferHandle, data: &[u8]) -> BackendResult<()> {
        let desc = self
            .buffers
            .get(&buffer.0)
            .ok_or(BackendError::InvalidHandle(buffer.0))?;
        if data.len() as u64 > desc.size {
            return Err(BackendError::BufferCreationFailed(format!(
                "{:?} holds {} bytes, got {}",
                desc.label,
                desc.size,
                data.len()
            )));
        }
        Ok(())
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        self.buffers.remove(&buffer.0);
    }

    fn create_render_target_view(
        &mut self,
        texture: TextureHandle,
    ) -> BackendResult<CpuDescriptor> {
        match self.textures.get(&texture.0) {
            Some(desc) if desc.render_target => Ok(CpuDescriptor(self.next_handle())),
            Some(desc) => Err(BackendError::TextureCreationFailed(format!(
                "{:?} is not a render target",
                desc.label
            ))),
            None => Err(BackendError::InvalidHandle(texture.0)),
        }
    }

    fn create_shader_view(
        &mut self,
        texture: TextureHandle,
        slot: HeapSlot,
    ) -> BackendResult<GpuDescriptor> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::InvalidHandle(texture.0));
        }
        match self.heap.get(slot.0) {
            Some(true) => Ok(GpuDescriptor(slot.0 as u64)),
            _ => Err(BackendError::InvalidHandle(slot.0 as u64)),
        }
    }

    fn alloc_heap_slot(&mut self) -> BackendResult<HeapSlot> {
        let index = self
            .heap
            .iter()
            .position(|used| !*used)
            .ok_or(BackendError::HeapExhausted(self.heap.len()))?;
        self.heap[index] = true;
        Ok(HeapSlot(index))
    }

    fn free_heap_slot(&mut self, slot: HeapSlot) {
        if let Some(used) = self.heap.get_mut(slot.0) {
            *used = false;
        }
    }

    fn create_pipeline(&mut self, desc: &PipelineDescriptor) -> BackendResult<PipelineHandle> {
        if desc.vertex_shader.is_empty() || desc.pixel_shader.is_empty() {
            return Err(BackendError::PipelineCreationFailed(format!(
                "{:?} is missing a shader",
                desc.label
            )));
        }
        Ok(PipelineHandle(self.next_handle()))
    }

    fn signal_fence(&mut self, value: u64) -> BackendResult<()> {
        self.fence.signal(value);
        self.events.push(Event::SignalFence(value));
        Ok(())
    }

    fn completed_fence_value(&self) -> u64 {
        self.fence.completed()
    }

    fn wait_fence(&mut self, value: u64) -> BackendResult<()> {
        self.events.push(Event::WaitFence(value));
        self.fence.wait(value, self.fence_timeout)
    }

    fn reset_allocator(&mut self, slot: usize) -> BackendResult<()> {
        if slot >= self.frame_count {
            return Err(BackendError::InvalidHandle(slot as u64));
        }
        self.events.push(Event::ResetAllocator(slot));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DummyContext {
        DummyContext::new(2, TextureSize::new(64, 64), TextureSize::new(128, 64))
    }

    #[test]
    fn test_present_advances_back_buffer() {
        let mut ctx = context();
        let first = ctx.back_buffer();
        ctx.present().unwrap();
        assert_eq!(ctx.current_frame(), 1);
        assert_ne!(ctx.back_buffer(), first);
        ctx.present().unwrap();
        assert_eq!(ctx.back_buffer(), first);
    }

    #[test]
    fn test_submit_requires_open_list() {
        let mut ctx = context();
        assert!(ctx.submit(QueueKind::Copy).is_err());

        ctx.begin_commands(QueueKind::Copy).unwrap();
        ctx.commands(QueueKind::Copy)
            .copy_buffer(BufferHandle(10), BufferHandle(11), 4);
        ctx.submit(QueueKind::Copy).unwrap();

        assert_eq!(ctx.submissions().len(), 1);
        assert_eq!(ctx.submissions()[0].commands.len(), 1);
    }

    #[test]
    fn test_present_with_open_direct_list_fails() {
        let mut ctx = context();
        ctx.begin_commands(QueueKind::Direct).unwrap();
        assert!(ctx.present().is_err());
    }

    #[test]
    fn test_heap_slots_are_recycled() {
        let mut ctx = DummyContext::with_heap_size(
            2,
            TextureSize::new(4, 4),
            TextureSize::new(4, 4),
            2,
        );
        let a = ctx.alloc_heap_slot().unwrap();
        let _b = ctx.alloc_heap_slot().unwrap();
        assert!(matches!(
            ctx.alloc_heap_slot(),
            Err(BackendError::HeapExhausted(2))
        ));
        ctx.free_heap_slot(a);
        assert_eq!(ctx.alloc_heap_slot().unwrap(), a);
    }

    #[test]
    fn test_fence_auto_completes() {
        let mut ctx = context();
        ctx.signal_fence(3).unwrap();
        assert_eq!(ctx.completed_fence_value(), 3);
        ctx.wait_fence(3).unwrap();
    }

    #[test]
    fn test_fence_wait_on_unsignaled_value_fails() {
        let mut ctx = context();
        assert!(matches!(
            ctx.wait_fence(1),
            Err(BackendError::FenceFailed(_))
        ));
    }

    #[test]
    fn test_manual_fence_completed_from_another_thread() {
        let mut ctx = context();
        let fence = ctx.fence();
        fence.set_auto_complete(false);
        ctx.signal_fence(1).unwrap();
        assert_eq!(ctx.completed_fence_value(), 0);

        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            fence.complete(1);
        });
        ctx.wait_fence(1).unwrap();
        worker.join().unwrap();
        assert_eq!(ctx.completed_fence_value(), 1);
    }

    #[test]
    fn test_render_target_view_requires_flag() {
        let mut ctx = context();
        let desc = TextureDescriptor::new_2d(
            TextureSize::new(4, 4),
            TextureFormat::Rgba8Unorm,
            ResourceState::CopyDest,
        );
        let plain = ctx.create_texture(&desc).unwrap();
        assert!(ctx.create_render_target_view(plain).is_err());

        let target = ctx.create_texture(&desc.render_target()).unwrap();
        assert!(ctx.create_render_target_view(target).is_ok());
    }
}
