//! Draws the world into an offscreen scene target

use std::sync::Arc;

use glam::Mat4;

use crate::assets::{Node, Vertex, World};
use crate::backend::types::*;
use crate::pipeline::upload::SharedTables;
use crate::render_graph::*;

/// Native objects backing the scene target
#[derive(Debug, Clone, Copy)]
struct SceneTarget {
    texture: TextureHandle,
    size: TextureSize,
    pipeline: PipelineHandle,
}

/// Renders every uploaded primitive of the world at scene resolution
///
/// Consumes the texture table in the pixel-shader state and produces
/// `scene-target` as a render target. Textures uploaded since the last frame
/// are transitioned from `CopyDest` before drawing. Primitives whose geometry
/// has not been uploaded yet are skipped; a missing texture falls back to
/// the first table entry.
pub struct ScenePass {
    world: Arc<World>,
    tables: SharedTables,
    clear_color: [f32; 4],
    table: Option<InputId>,
    target: Option<ResourceId>,
    native: Option<SceneTarget>,
    drawn: usize,
}

impl ScenePass {
    pub fn new(world: Arc<World>, tables: SharedTables, clear_color: [f32; 4]) -> Self {
        Self {
            world,
            tables,
            clear_color,
            table: None,
            target: None,
            native: None,
            drawn: 0,
        }
    }

    /// Primitives drawn by the last executed frame
    pub fn drawn(&self) -> usize {
        self.drawn
    }

    fn target(&self) -> GraphResult<ResourceId> {
        self.target
            .ok_or_else(|| GraphError::Unbound("scene-target".to_string()))
    }
}

fn scene_pipeline() -> PipelineDescriptor {
    PipelineDescriptor {
        label: Some("scene".to_string()),
        vertex_shader: "scene.vs".to_string(),
        pixel_shader: "scene.ps".to_string(),
        bindings: vec![
            BindingLayout::Table {
                visibility: ShaderVisibility::Pixel,
            },
            BindingLayout::Const {
                visibility: ShaderVisibility::Vertex,
                count: 16,
            },
        ],
        depth: false,
    }
}

/// World matrix of every node, parents applied before their children
///
/// Nodes no other node lists as a child are roots. Children that are not
/// published yet are skipped; nodes only reachable through a cycle keep
/// their local transform.
fn world_transforms(nodes: &[&Node]) -> Vec<Mat4> {
    let mut is_child = vec![false; nodes.len()];
    for node in nodes {
        for &child in &node.children {
            if let Some(flag) = is_child.get_mut(child) {
                *flag = true;
            }
        }
    }

    let mut transforms: Vec<Option<Mat4>> = vec![None; nodes.len()];
    let mut stack: Vec<(usize, Mat4)> = (0..nodes.len())
        .filter(|index| !is_child[*index])
        .map(|index| (index, Mat4::IDENTITY))
        .collect();
    while let Some((index, parent)) = stack.pop() {
        if transforms[index].is_some() {
            continue;
        }
        let transform = parent * nodes[index].transform();
        transforms[index] = Some(transform);
        stack.extend(
            nodes[index]
                .children
                .iter()
                .filter(|child| **child < nodes.len())
                .map(|child| (*child, transform)),
        );
    }

    transforms
        .into_iter()
        .zip(nodes)
        .map(|(transform, node)| transform.unwrap_or_else(|| node.transform()))
        .collect()
}

/// Column-major world matrix as root constants
fn transform_constants(transform: Mat4) -> Vec<u32> {
    let columns: [u32; 16] = bytemuck::cast(transform.to_cols_array());
    columns.to_vec()
}

impl RenderPass for ScenePass {
    fn setup(&mut self, builder: &mut PassBuilder) {
        self.table = Some(builder.new_input("texture-table", ResourceState::PixelShaderResource));
        let target = builder.add_resource("scene-target", ResourceKind::RenderTarget);
        builder.new_output("scene-target", ResourceState::RenderTarget, Some(target));
        self.target = Some(target);
    }

    fn start(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
        let target = self.target()?;
        let size = ctx.context().scene_size();
        let desc = TextureDescriptor::new_2d(
            size,
            TextureFormat::Rgba8Unorm,
            ResourceState::RenderTarget,
        )
        .with_label("scene-target")
        .render_target();

        let texture = ctx.context().create_texture(&desc)?;
        let rtv = ctx.context().create_render_target_view(texture)?;
        let slot = ctx.context().alloc_heap_slot()?;
        let srv = ctx.context().create_shader_view(texture, slot)?;
        let pipeline = ctx.context().create_pipeline(&scene_pipeline())?;

        let resource = ctx.resource_mut(target)?;
        resource.bind_texture(texture);
        resource.bind_render_target_view(rtv);
        resource.bind_shader_view(slot, srv);

        self.native = Some(SceneTarget {
            texture,
            size,
            pipeline,
        });
        log::debug!(
            target: ctx.log_target(),
            "{}: created {} scene target",
            ctx.name(),
            size
        );
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
        let native = self
            .native
            .ok_or_else(|| GraphError::PassNotStarted(ctx.name().to_string()))?;
        let target = self.target()?;
        let rtv = ctx
            .resource(target)?
            .render_target_view()
            .ok_or_else(|| GraphError::Unbound("scene-target".to_string()))?;

        let table = self
            .table
            .ok_or_else(|| GraphError::Unbound("texture-table".to_string()))?;
        let table = ctx.input_id(table)?;

        let world = Arc::clone(&self.world);
        let tables = Arc::clone(&self.tables);
        let mut tables = tables.lock();

        let uploaded: Vec<Barrier> = tables
            .pending
            .drain(..)
            .map(|texture| Barrier {
                resource: table,
                handle: Some(NativeHandle::Texture(texture)),
                before: ResourceState::CopyDest,
                after: ResourceState::PixelShaderResource,
            })
            .collect();
        if !uploaded.is_empty() {
            log::trace!(
                target: ctx.log_target(),
                "{}: {} uploaded textures ready for sampling",
                ctx.name(),
                uploaded.len()
            );
            ctx.commands().transition(&uploaded);
        }

        let nodes: Vec<&Node> = world.nodes().iter().collect();
        let transforms = world_transforms(&nodes);

        let commands = ctx.commands();
        commands.set_render_target(rtv, Some(self.clear_color));
        commands.set_view(&View::full(native.size));
        commands.set_pipeline(native.pipeline);

        let mut drawn = 0;
        for (node, transform) in nodes.iter().zip(&transforms) {
            let mut constants = None;
            for primitive in &node.primitives {
                let Some(primitive) = world.primitives().get(*primitive) else {
                    continue;
                };
                let (Some(vertices), Some(indices)) = (
                    tables.vertex_buffers.get(primitive.vertices),
                    tables.index_buffers.get(primitive.indices),
                ) else {
                    continue;
                };
                let Some(texture) = tables
                    .textures
                    .get(primitive.texture)
                    .or_else(|| tables.textures.first())
                else {
                    continue;
                };

                let values = constants
                    .get_or_insert_with(|| transform_constants(*transform))
                    .clone();
                commands.bind(&Binding::Table {
                    index: 0,
                    table: texture.view,
                });
                commands.bind(&Binding::Const { index: 1, values });
                commands.draw_mesh(&MeshDraw {
                    vertex_buffer: vertices.buffer,
                    vertex_stride: Vertex::STRIDE,
                    vertex_count: vertices.count,
                    index_buffer: indices.buffer,
                    index_count: indices.count,
                });
                drawn += 1;
            }
        }
        self.drawn = drawn;
        Ok(())
    }

    fn stop(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
        let target = self.target()?;
        let slot = ctx.resource_mut(target)?.unbind();
        if let Some(slot) = slot {
            ctx.context().free_heap_slot(slot);
        }
        if let Some(native) = self.native.take() {
            ctx.context().release_texture(native.texture);
        }
        Ok(())
    }

    fn debug_ui(&mut self, ui: &mut egui::Ui) {
        match self.native {
            Some(native) => ui.label(format!("Target: {}", native.size)),
            None => ui.label("Target: not created"),
        };
        ui.label(format!("Primitives drawn: {}", self.drawn));
    }
}
