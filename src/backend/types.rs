//! Common types shared between the render graph and backends

use crate::render_graph::ResourceId;
use std::fmt;

/// Pipeline state a GPU resource can be in
///
/// Mirrors the usage states a native API tracks per resource. The graph only
/// compares these; translating them into native barrier flags is the
/// backend's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceState {
    /// Unknown or not yet declared
    #[default]
    Invalid,
    Common,
    /// Host-visible upload heap
    Upload,
    CopyDest,
    CopySource,
    VertexAndConstantBuffer,
    IndexBuffer,
    RenderTarget,
    PixelShaderResource,
    DepthWrite,
    Present,
}

impl ResourceState {
    /// Check if the state is a write state
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::CopyDest | ResourceState::RenderTarget | ResourceState::DepthWrite
        )
    }

    /// Check if the state is read-only
    pub fn is_read(self) -> bool {
        matches!(
            self,
            ResourceState::Upload
                | ResourceState::CopySource
                | ResourceState::VertexAndConstantBuffer
                | ResourceState::IndexBuffer
                | ResourceState::PixelShaderResource
                | ResourceState::Present
        )
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceState::Invalid => "invalid",
            ResourceState::Common => "common",
            ResourceState::Upload => "upload",
            ResourceState::CopyDest => "copy-dest",
            ResourceState::CopySource => "copy-source",
            ResourceState::VertexAndConstantBuffer => "vertex-and-constant-buffer",
            ResourceState::IndexBuffer => "index-buffer",
            ResourceState::RenderTarget => "render-target",
            ResourceState::PixelShaderResource => "pixel-shader-resource",
            ResourceState::DepthWrite => "depth-write",
            ResourceState::Present => "present",
        };
        f.write_str(name)
    }
}

/// Command queue a pass records into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics queue, also used for presentation
    Direct,
    /// Dedicated copy/upload queue
    Copy,
}

impl QueueKind {
    pub const COUNT: usize = 2;
    pub const ALL: [QueueKind; Self::COUNT] = [QueueKind::Direct, QueueKind::Copy];

    pub fn index(self) -> usize {
        match self {
            QueueKind::Direct => 0,
            QueueKind::Copy => 1,
        }
    }
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::Direct => f.write_str("direct"),
            QueueKind::Copy => f.write_str("copy"),
        }
    }
}

/// Handle to a GPU texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u64);

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

/// Handle to a pipeline state object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineHandle(pub(crate) u64);

/// CPU-side descriptor (render target views)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CpuDescriptor(pub(crate) u64);

/// Shader-visible descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuDescriptor(pub(crate) u64);

macro_rules! raw_handle {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                /// Wrap a backend-specific raw value
                pub fn from_raw(raw: u64) -> Self {
                    Self(raw)
                }

                pub fn raw(self) -> u64 {
                    self.0
                }
            }
        )*
    };
}

raw_handle!(TextureHandle, BufferHandle, PipelineHandle, CpuDescriptor, GpuDescriptor);

/// Slot in the shader-visible descriptor heap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HeapSlot(pub usize);

/// Native object a barrier targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeHandle {
    Texture(TextureHandle),
    Buffer(BufferHandle),
}

/// A single resource state transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Barrier {
    pub resource: ResourceId,
    /// `None` when the owning pass has not created the native object yet
    pub handle: Option<NativeHandle>,
    pub before: ResourceState,
    pub after: ResourceState,
}

/// Root signature binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Descriptor table starting at a heap descriptor
    Table { index: u32, table: GpuDescriptor },
    /// Inline 32-bit root constants
    Const { index: u32, values: Vec<u32> },
}

/// Binding layout entry of a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingLayout {
    Table { visibility: ShaderVisibility },
    Const { visibility: ShaderVisibility, count: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderVisibility {
    All,
    Vertex,
    Pixel,
}

/// Width and height of a texture or surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSize {
    pub width: u32,
    pub height: u32,
}

impl TextureSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl fmt::Display for TextureSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Viewport plus matching scissor rect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub viewport: Viewport,
    pub scissor: ScissorRect,
}

impl View {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            viewport: Viewport {
                x,
                y,
                width,
                height,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: ScissorRect {
                left: x as i32,
                top: y as i32,
                right: (x + width) as i32,
                bottom: (y + height) as i32,
            },
        }
    }

    /// View covering the whole surface
    pub fn full(size: TextureSize) -> Self {
        Self::new(0.0, 0.0, size.width as f32, size.height as f32)
    }

    /// Fit `scene` into `window` preserving aspect ratio, centered with bars
    pub fn letterbox(scene: TextureSize, window: TextureSize) -> Self {
        let width_ratio = scene.width as f32 / window.width.max(1) as f32;
        let height_ratio = scene.height as f32 / window.height.max(1) as f32;

        let (mut x, mut y) = (1.0, 1.0);
        if width_ratio < height_ratio {
            x = width_ratio / height_ratio;
        } else {
            y = height_ratio / width_ratio;
        }

        let width = x * window.width as f32;
        let height = y * window.height as f32;
        let left = window.width as f32 * (1.0 - x) / 2.0;
        let top = window.height as f32 * (1.0 - y) / 2.0;

        Self::new(left, top, width, height)
    }
}

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Rgba16Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            TextureFormat::Rgba8Unorm
            | TextureFormat::Rgba8UnormSrgb
            | TextureFormat::Bgra8Unorm
            | TextureFormat::Depth32Float => 4,
            TextureFormat::Rgba16Float => 8,
        }
    }
}

/// Texture descriptor
#[derive(Debug, Clone)]
pub struct TextureDescriptor {
    pub label: Option<String>,
    pub size: TextureSize,
    pub format: TextureFormat,
    pub initial_state: ResourceState,
    /// Allow render target views
    pub render_target: bool,
    /// Place in a CPU-writable upload heap
    pub host_visible: bool,
}

impl TextureDescriptor {
    pub fn new_2d(size: TextureSize, format: TextureFormat, initial_state: ResourceState) -> Self {
        Self {
            label: None,
            size,
            format,
            initial_state,
            render_target: false,
            host_visible: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn render_target(mut self) -> Self {
        self.render_target = true;
        self
    }

    pub fn host_visible(mut self) -> Self {
        self.host_visible = true;
        self
    }

    pub fn byte_size(&self) -> u64 {
        self.size.width as u64 * self.size.height as u64 * self.format.bytes_per_pixel() as u64
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub initial_state: ResourceState,
    pub host_visible: bool,
}

/// Pipeline state descriptor
#[derive(Debug, Clone)]
pub struct PipelineDescriptor {
    pub label: Option<String>,
    pub vertex_shader: String,
    pub pixel_shader: String,
    pub bindings: Vec<BindingLayout>,
    pub depth: bool,
}

/// Indexed mesh draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshDraw {
    pub vertex_buffer: BufferHandle,
    pub vertex_stride: u32,
    pub vertex_count: u32,
    pub index_buffer: BufferHandle,
    pub index_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_wide_window() {
        let view = View::letterbox(TextureSize::new(1280, 720), TextureSize::new(1920, 720));
        assert_eq!(view.viewport.width, 1280.0);
        assert_eq!(view.viewport.height, 720.0);
        assert_eq!(view.viewport.x, 320.0);
        assert_eq!(view.viewport.y, 0.0);
        assert_eq!(view.scissor.right, 1600);
    }

    #[test]
    fn test_letterbox_tall_window() {
        let view = View::letterbox(TextureSize::new(1280, 720), TextureSize::new(1280, 1024));
        assert_eq!(view.viewport.width, 1280.0);
        assert_eq!(view.viewport.height, 720.0);
        assert_eq!(view.viewport.y, 152.0);
        assert_eq!(view.scissor.bottom, 872);
    }

    #[test]
    fn test_state_read_write() {
        assert!(ResourceState::RenderTarget.is_write());
        assert!(!ResourceState::RenderTarget.is_read());
        assert!(ResourceState::PixelShaderResource.is_read());
        assert!(!ResourceState::Invalid.is_read());
        assert!(!ResourceState::Invalid.is_write());
    }

    #[test]
    fn test_queue_index() {
        for (i, queue) in QueueKind::ALL.iter().enumerate() {
            assert_eq!(queue.index(), i);
        }
    }
}
