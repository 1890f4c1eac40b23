//! Scene assets and the sink loaders stream them into
//!
//! Loaders run on background threads and append textures, geometry,
//! primitives and nodes to a [`WorldSink`]. The renderer reads what has been
//! published so far without taking locks.

pub mod append_log;
pub mod gltf;
pub mod world;

pub use append_log::AppendLog;
pub use world::World;

use crate::backend::types::TextureSize;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Quat, Vec2, Vec3};
use parking_lot::MutexGuard;
use thiserror::Error;

/// Errors that can occur while loading assets
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("glTF parse error: {0}")]
    Parse(#[from] gltf_dep::Error),
    #[error("mesh {mesh} primitive {primitive} has no POSITION attribute")]
    MissingPositions { mesh: usize, primitive: usize },
    #[error("unsupported topology: {0}")]
    UnsupportedTopology(String),
    #[error("image decode error: {0}")]
    ImageDecode(String),
    #[error("sink cannot hold {count} more {what}")]
    Capacity { what: &'static str, count: usize },
    #[error("failed to spawn loader thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Interleaved mesh vertex
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv: Vec2,
}

impl Vertex {
    pub const STRIDE: u32 = std::mem::size_of::<Vertex>() as u32;

    /// Bitwise key, equal for identical vertices
    pub fn key(&self) -> [u32; 8] {
        bytemuck::cast(*self)
    }
}

/// RGBA8 texture
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    pub name: String,
    pub size: TextureSize,
    pub data: Vec<u8>,
}

impl Texture {
    /// 2x2 opaque white texture used when a material has none
    pub fn placeholder() -> Self {
        Self {
            name: "default".to_string(),
            size: TextureSize::new(2, 2),
            data: vec![0xFF; 2 * 2 * 4],
        }
    }
}

/// One drawable piece of a mesh; fields index into the sink's tables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    pub texture: usize,
    pub vertices: usize,
    pub indices: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    /// Indices of child nodes
    pub children: Vec<usize>,
    /// Indices of the primitives drawn for this node
    pub primitives: Vec<usize>,
}

impl Node {
    pub fn transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: String::new(),
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            children: Vec::new(),
            primitives: Vec::new(),
        }
    }
}

/// Append-only destination for loaded assets
///
/// Loaders hold [`lock_loader`](Self::lock_loader) for a whole import, so
/// imports on different threads never interleave while the renderer reads.
/// Every `add_*` returns the index the element was stored at; indices never
/// change once returned.
pub trait WorldSink: Send + Sync {
    /// Claim room for `count` textures; `false` if they cannot fit
    fn reserve_textures(&self, count: usize) -> bool;

    /// Claim room for `count` nodes; `false` if they cannot fit
    fn reserve_nodes(&self, count: usize) -> bool;

    /// Exclusive right to append a whole document
    fn lock_loader(&self) -> MutexGuard<'_, ()>;

    /// Index the next added node will receive
    fn next_node_index(&self) -> usize;

    fn add_texture(&self, texture: Texture) -> Result<usize, AssetError>;

    fn add_vertex_buffer(&self, vertices: Vec<Vertex>) -> Result<usize, AssetError>;

    fn add_index_buffer(&self, indices: Vec<u32>) -> Result<usize, AssetError>;

    fn add_primitive(&self, primitive: Primitive) -> Result<usize, AssetError>;

    fn add_node(&self, node: Node) -> Result<usize, AssetError>;
}
