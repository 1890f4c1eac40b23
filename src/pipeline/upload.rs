//! Streams world assets to the GPU on the copy queue

use std::sync::Arc;

use parking_lot::Mutex;

use crate::assets::World;
use crate::backend::types::*;
use crate::render_graph::*;

/// A world texture resident on the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    pub texture: TextureHandle,
    pub slot: HeapSlot,
    pub view: GpuDescriptor,
}

/// A world vertex or index buffer resident on the GPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuBuffer {
    pub buffer: BufferHandle,
    /// Number of vertices or indices
    pub count: u32,
}

/// GPU copies of the world tables
///
/// Entries are stored at the same index as their world counterpart, so a
/// primitive's indices can be used directly.
#[derive(Debug, Default)]
pub struct GpuTables {
    pub textures: Vec<GpuTexture>,
    pub vertex_buffers: Vec<GpuBuffer>,
    pub index_buffers: Vec<GpuBuffer>,
    /// Uploaded textures still in `CopyDest`, waiting for a direct queue
    /// transition before they can be sampled
    pub pending: Vec<TextureHandle>,
}

impl GpuTables {
    pub fn is_empty(&self) -> bool {
        self.textures.is_empty() && self.vertex_buffers.is_empty() && self.index_buffers.is_empty()
    }
}

/// Tables shared between the upload pass and the passes drawing from them
pub type SharedTables = Arc<Mutex<GpuTables>>;

/// Uploads world textures and geometry that appeared since the last frame
///
/// Textures are written into host-visible staging textures and copied into
/// device textures on the copy queue, then get a shader view in the
/// descriptor heap. The `texture-table` output stands for the whole set of
/// uploaded textures; the copy queue cannot move them out of `CopyDest`, so
/// new ones are queued in [`GpuTables::pending`] for the consumer to
/// transition. Geometry lives in host-visible buffers that are drawn from
/// directly.
///
/// Staging textures are released one frame later; the copy queue is idle by
/// then.
pub struct UploadPass {
    world: Arc<World>,
    tables: SharedTables,
    budget: usize,
    table: Option<ResourceId>,
    staging: Vec<TextureHandle>,
    uploaded_bytes: u64,
}

impl UploadPass {
    /// `budget` caps how many textures and buffers are uploaded per frame
    pub fn new(world: Arc<World>, tables: SharedTables, budget: usize) -> Self {
        Self {
            world,
            tables,
            budget: budget.max(1),
            table: None,
            staging: Vec::new(),
            uploaded_bytes: 0,
        }
    }

    pub fn tables(&self) -> &SharedTables {
        &self.tables
    }

    /// Resource standing for the uploaded textures, once set up
    pub fn texture_table(&self) -> Option<ResourceId> {
        self.table
    }

    fn release_staging(&mut self, ctx: &mut PassContext) {
        for texture in self.staging.drain(..) {
            ctx.context().release_texture(texture);
        }
    }

    fn upload_textures(
        &mut self,
        ctx: &mut PassContext,
        tables: &mut GpuTables,
        budget: &mut usize,
    ) -> GraphResult<()> {
        let world = Arc::clone(&self.world);
        let start = tables.textures.len();
        for texture in world.textures().iter_from(start).take(*budget) {
            let desc = TextureDescriptor::new_2d(
                texture.size,
                TextureFormat::Rgba8Unorm,
                ResourceState::CopyDest,
            )
            .with_label(texture.name.as_str());

            let mut staging_desc = desc.clone().host_visible();
            staging_desc.initial_state = ResourceState::Upload;
            let staging = ctx.context().create_texture(&staging_desc)?;
            self.staging.push(staging);
            ctx.context().write_texture(staging, &texture.data)?;

            let device = ctx.context().create_texture(&desc)?;
            ctx.commands().copy_texture(device, staging);

            let slot = ctx.context().alloc_heap_slot()?;
            let view = ctx.context().create_shader_view(device, slot)?;
            tables.textures.push(GpuTexture {
                texture: device,
                slot,
                view,
            });
            tables.pending.push(device);
            self.uploaded_bytes += desc.byte_size();
            *budget -= 1;
        }
        Ok(())
    }

    fn upload_geometry(
        &mut self,
        ctx: &mut PassContext,
        tables: &mut GpuTables,
        budget: &mut usize,
    ) -> GraphResult<()> {
        let world = Arc::clone(&self.world);

        let start = tables.vertex_buffers.len();
        for (offset, vertices) in world.vertex_buffers().iter_from(start).enumerate() {
            if *budget == 0 {
                break;
            }
            let bytes: &[u8] = bytemuck::cast_slice(vertices);
            let buffer = create_host_buffer(
                ctx,
                format!("vertices #{}", start + offset),
                ResourceState::VertexAndConstantBuffer,
                bytes,
            )?;
            tables.vertex_buffers.push(GpuBuffer {
                buffer,
                count: vertices.len() as u32,
            });
            self.uploaded_bytes += bytes.len() as u64;
            *budget -= 1;
        }

        let start = tables.index_buffers.len();
        for (offset, indices) in world.index_buffers().iter_from(start).enumerate() {
            if *budget == 0 {
                break;
            }
            let bytes: &[u8] = bytemuck::cast_slice(indices);
            let buffer = create_host_buffer(
                ctx,
                format!("indices #{}", start + offset),
                ResourceState::IndexBuffer,
                bytes,
            )?;
            tables.index_buffers.push(GpuBuffer {
                buffer,
                count: indices.len() as u32,
            });
            self.uploaded_bytes += bytes.len() as u64;
            *budget -= 1;
        }
        Ok(())
    }
}

fn create_host_buffer(
    ctx: &mut PassContext,
    label: String,
    state: ResourceState,
    bytes: &[u8],
) -> GraphResult<BufferHandle> {
    let desc = BufferDescriptor {
        label: Some(label),
        size: bytes.len() as u64,
        initial_state: state,
        host_visible: true,
    };
    let buffer = ctx.context().create_buffer(&desc)?;
    ctx.context().write_buffer(buffer, bytes)?;
    Ok(buffer)
}

impl RenderPass for UploadPass {
    fn queue(&self) -> QueueKind {
        QueueKind::Copy
    }

    fn setup(&mut self, builder: &mut PassBuilder) {
        let table = builder.add_resource("texture-table", ResourceKind::Texture);
        builder.new_output("texture-table", ResourceState::CopyDest, Some(table));
        self.table = Some(table);
    }

    fn execute(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
        self.release_staging(ctx);

        let tables = Arc::clone(&self.tables);
        let mut tables = tables.lock();
        let mut budget = self.budget;
        let before = (
            tables.textures.len(),
            tables.vertex_buffers.len(),
            tables.index_buffers.len(),
        );

        self.upload_textures(ctx, &mut tables, &mut budget)?;
        self.upload_geometry(ctx, &mut tables, &mut budget)?;

        if budget < self.budget {
            log::debug!(
                target: ctx.log_target(),
                "{}: uploaded {} textures, {} vertex buffers, {} index buffers",
                ctx.name(),
                tables.textures.len() - before.0,
                tables.vertex_buffers.len() - before.1,
                tables.index_buffers.len() - before.2
            );
        }
        Ok(())
    }

    fn stop(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
        self.release_staging(ctx);

        let tables = Arc::clone(&self.tables);
        let mut guard = tables.lock();
        let tables = &mut *guard;
        tables.pending.clear();
        for texture in tables.textures.drain(..) {
            ctx.context().free_heap_slot(texture.slot);
            ctx.context().release_texture(texture.texture);
        }
        for buffer in tables
            .vertex_buffers
            .drain(..)
            .chain(tables.index_buffers.drain(..))
        {
            ctx.context().release_buffer(buffer.buffer);
        }
        Ok(())
    }

    fn debug_ui(&mut self, ui: &mut egui::Ui) {
        let tables = self.tables.lock();
        ui.label(format!("Textures: {}", tables.textures.len()));
        ui.label(format!(
            "Buffers: {} vertex, {} index",
            tables.vertex_buffers.len(),
            tables.index_buffers.len()
        ));
        ui.label(format!("Uploaded: {} KiB", self.uploaded_bytes / 1024));
    }
}
