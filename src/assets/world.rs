//! The shared scene world

use parking_lot::{Mutex, MutexGuard};

use super::append_log::AppendLog;
use super::{AssetError, Node, Primitive, Texture, Vertex, WorldSink};

/// Scene data streamed in by loaders and drawn by the renderer
#[derive(Debug)]
pub struct World {
    textures: AppendLog<Texture>,
    vertex_buffers: AppendLog<Vec<Vertex>>,
    index_buffers: AppendLog<Vec<u32>>,
    primitives: AppendLog<Primitive>,
    nodes: AppendLog<Node>,
    loader: Mutex<()>,
}

impl World {
    /// Create a world with fixed table capacities
    ///
    /// Vertex and index buffer tables hold one entry per primitive.
    pub fn new(max_textures: usize, max_nodes: usize, max_primitives: usize) -> Self {
        Self {
            textures: AppendLog::with_capacity(max_textures),
            vertex_buffers: AppendLog::with_capacity(max_primitives),
            index_buffers: AppendLog::with_capacity(max_primitives),
            primitives: AppendLog::with_capacity(max_primitives),
            nodes: AppendLog::with_capacity(max_nodes),
            loader: Mutex::new(()),
        }
    }

    pub fn textures(&self) -> &AppendLog<Texture> {
        &self.textures
    }

    pub fn vertex_buffers(&self) -> &AppendLog<Vec<Vertex>> {
        &self.vertex_buffers
    }

    pub fn index_buffers(&self) -> &AppendLog<Vec<u32>> {
        &self.index_buffers
    }

    pub fn primitives(&self) -> &AppendLog<Primitive> {
        &self.primitives
    }

    pub fn nodes(&self) -> &AppendLog<Node> {
        &self.nodes
    }
}

fn append<T>(log: &AppendLog<T>, what: &'static str, value: T) -> Result<usize, AssetError> {
    log.push(value)
        .map_err(|_| AssetError::Capacity { what, count: 1 })
}

impl WorldSink for World {
    fn reserve_textures(&self, count: usize) -> bool {
        self.textures.reserve(count)
    }

    fn reserve_nodes(&self, count: usize) -> bool {
        self.nodes.reserve(count)
    }

    fn lock_loader(&self) -> MutexGuard<'_, ()> {
        self.loader.lock()
    }

    fn next_node_index(&self) -> usize {
        self.nodes.len()
    }

    fn add_texture(&self, texture: Texture) -> Result<usize, AssetError> {
        append(&self.textures, "textures", texture)
    }

    fn add_vertex_buffer(&self, vertices: Vec<Vertex>) -> Result<usize, AssetError> {
        append(&self.vertex_buffers, "vertex buffers", vertices)
    }

    fn add_index_buffer(&self, indices: Vec<u32>) -> Result<usize, AssetError> {
        append(&self.index_buffers, "index buffers", indices)
    }

    fn add_primitive(&self, primitive: Primitive) -> Result<usize, AssetError> {
        append(&self.primitives, "primitives", primitive)
    }

    fn add_node(&self, node: Node) -> Result<usize, AssetError> {
        append(&self.nodes, "nodes", node)
    }
}
