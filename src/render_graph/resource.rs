//! Graph-owned GPU resources and their tracked state

use crate::backend::types::*;
use crate::render_graph::pass::PassId;

/// Unique identifier for a render graph resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub(crate) u32);

impl ResourceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What kind of native object backs a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// The swapchain image of the current frame slot, supplied by the context
    BackBuffer,
    RenderTarget,
    Texture,
    Buffer,
}

/// A GPU resource flowing through the graph
///
/// Owned by exactly one pass. `state` is the state the GPU will be in once
/// every barrier recorded so far has executed; only barrier insertion moves
/// it.
#[derive(Debug, Clone)]
pub struct Resource {
    name: String,
    kind: ResourceKind,
    owner: PassId,
    state: ResourceState,
    initial_state: ResourceState,
    handle: Option<NativeHandle>,
    heap_slot: Option<HeapSlot>,
    render_target_view: Option<CpuDescriptor>,
    shader_view: Option<GpuDescriptor>,
}

impl Resource {
    pub(crate) fn new(name: impl Into<String>, kind: ResourceKind, owner: PassId) -> Self {
        Self {
            name: name.into(),
            kind,
            owner,
            state: ResourceState::Invalid,
            initial_state: ResourceState::Invalid,
            handle: None,
            heap_slot: None,
            render_target_view: None,
            shader_view: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn owner(&self) -> PassId {
        self.owner
    }

    /// Tracked state
    pub fn state(&self) -> ResourceState {
        self.state
    }

    /// State the owner declares when producing the resource
    pub fn initial_state(&self) -> ResourceState {
        self.initial_state
    }

    pub fn handle(&self) -> Option<NativeHandle> {
        self.handle
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        match self.handle {
            Some(NativeHandle::Texture(texture)) => Some(texture),
            _ => None,
        }
    }

    pub fn buffer(&self) -> Option<BufferHandle> {
        match self.handle {
            Some(NativeHandle::Buffer(buffer)) => Some(buffer),
            _ => None,
        }
    }

    pub fn heap_slot(&self) -> Option<HeapSlot> {
        self.heap_slot
    }

    pub fn render_target_view(&self) -> Option<CpuDescriptor> {
        self.render_target_view
    }

    pub fn shader_view(&self) -> Option<GpuDescriptor> {
        self.shader_view
    }

    pub fn bind_texture(&mut self, texture: TextureHandle) {
        self.handle = Some(NativeHandle::Texture(texture));
    }

    pub fn bind_buffer(&mut self, buffer: BufferHandle) {
        self.handle = Some(NativeHandle::Buffer(buffer));
    }

    pub fn bind_render_target_view(&mut self, view: CpuDescriptor) {
        self.render_target_view = Some(view);
    }

    pub fn bind_shader_view(&mut self, slot: HeapSlot, view: GpuDescriptor) {
        self.heap_slot = Some(slot);
        self.shader_view = Some(view);
    }

    /// Drop every native binding, returning the heap slot if one was held
    pub fn unbind(&mut self) -> Option<HeapSlot> {
        self.handle = None;
        self.render_target_view = None;
        self.shader_view = None;
        self.heap_slot.take()
    }

    /// Set the state the resource starts each lifetime in
    pub(crate) fn declare_initial_state(&mut self, state: ResourceState) {
        if self.initial_state == ResourceState::Invalid {
            self.initial_state = state;
            self.state = state;
        }
    }

    /// Record a transition, returning the previous state
    pub(crate) fn transition_to(&mut self, next: ResourceState) -> ResourceState {
        std::mem::replace(&mut self.state, next)
    }

    /// Put back a state whose barrier never reached the GPU
    pub(crate) fn restore_state(&mut self, state: ResourceState) {
        self.state = state;
    }

    /// Forget tracked state after the native object was recreated
    pub(crate) fn reset_state(&mut self) {
        self.state = self.initial_state;
    }
}
