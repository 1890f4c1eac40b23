//! Composites the scene target onto the back buffer

use crate::backend::types::*;
use crate::render_graph::*;

/// Color of the bars around the letterboxed scene
pub const LETTERBOX_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Screen-space vertex of the fullscreen quad
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadVertex {
    position: [f32; 2],
    uv: [f32; 2],
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
];

const QUAD_INDICES: [u32; 6] = [0, 1, 2, 1, 3, 2];

#[derive(Debug, Clone, Copy)]
struct Quad {
    vertices: BufferHandle,
    indices: BufferHandle,
    pipeline: PipelineHandle,
    view: View,
}

impl Quad {
    fn draw(&self) -> MeshDraw {
        MeshDraw {
            vertex_buffer: self.vertices,
            vertex_stride: std::mem::size_of::<QuadVertex>() as u32,
            vertex_count: QUAD_VERTICES.len() as u32,
            index_buffer: self.indices,
            index_count: QUAD_INDICES.len() as u32,
        }
    }
}

/// Samples the scene target into the back buffer, keeping its aspect ratio
///
/// Both inputs are relayed so later passes can keep using them. The
/// letterbox view depends on the window size, so the pass restarts on
/// resize.
#[derive(Debug, Default)]
pub struct PostPass {
    scene: Option<InputId>,
    quad: Option<Quad>,
}

impl PostPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// Letterbox view of the current window size, once started
    pub fn view(&self) -> Option<View> {
        self.quad.map(|quad| quad.view)
    }
}

fn post_pipeline() -> PipelineDescriptor {
    PipelineDescriptor {
        label: Some("post".to_string()),
        vertex_shader: "post.vs".to_string(),
        pixel_shader: "post.ps".to_string(),
        bindings: vec![BindingLayout::Table {
            visibility: ShaderVisibility::Pixel,
        }],
        depth: false,
    }
}

fn upload(
    ctx: &mut PassContext,
    label: &str,
    state: ResourceState,
    bytes: &[u8],
) -> GraphResult<BufferHandle> {
    let buffer = ctx.context().create_buffer(&BufferDescriptor {
        label: Some(label.to_string()),
        size: bytes.len() as u64,
        initial_state: state,
        host_visible: true,
    })?;
    ctx.context().write_buffer(buffer, bytes)?;
    Ok(buffer)
}

impl RenderPass for PostPass {
    fn setup(&mut self, builder: &mut PassBuilder) {
        let scene = builder.new_input("scene-target", ResourceState::PixelShaderResource);
        builder.new_relay("scene-target", scene, None);
        let rtv = builder.new_input("rtv", ResourceState::RenderTarget);
        builder.new_relay("rtv", rtv, None);
        self.scene = Some(scene);
    }

    fn start(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
        let view = View::letterbox(ctx.context().scene_size(), ctx.context().window_size());
        let vertices = upload(
            ctx,
            "quad vertices",
            ResourceState::VertexAndConstantBuffer,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;
        let indices = upload(
            ctx,
            "quad indices",
            ResourceState::IndexBuffer,
            bytemuck::cast_slice(&QUAD_INDICES),
        )?;
        let pipeline = ctx.context().create_pipeline(&post_pipeline())?;

        self.quad = Some(Quad {
            vertices,
            indices,
            pipeline,
            view,
        });
        Ok(())
    }

    fn execute(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
        let quad = self
            .quad
            .ok_or_else(|| GraphError::PassNotStarted(ctx.name().to_string()))?;
        let scene = self
            .scene
            .ok_or_else(|| GraphError::Unbound("scene-target".to_string()))?;
        let scene = ctx.input(scene)?;
        let srv = scene
            .shader_view()
            .ok_or_else(|| GraphError::Unbound(scene.name().to_string()))?;
        let target = ctx.context().back_buffer_view();

        let commands = ctx.commands();
        commands.set_view(&quad.view);
        commands.set_render_target(target, Some(LETTERBOX_COLOR));
        commands.set_pipeline(quad.pipeline);
        commands.bind(&Binding::Table {
            index: 0,
            table: srv,
        });
        commands.draw_mesh(&quad.draw());
        Ok(())
    }

    fn stop(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
        if let Some(quad) = self.quad.take() {
            ctx.context().release_buffer(quad.vertices);
            ctx.context().release_buffer(quad.indices);
        }
        Ok(())
    }

    fn resize_dependent(&self) -> bool {
        true
    }

    fn debug_ui(&mut self, ui: &mut egui::Ui) {
        if let Some(quad) = self.quad {
            let viewport = quad.view.viewport;
            ui.label(format!(
                "Viewport: {}x{} at ({}, {})",
                viewport.width, viewport.height, viewport.x, viewport.y
            ));
        }
    }
}
