//! World rendering pipeline
//!
//! Five passes render the streamed world:
//! 1. Upload - copies new textures and geometry to the GPU (copy queue)
//! 2. Scene - draws every node into an offscreen target at scene resolution
//! 3. Global - hands out the swapchain image
//! 4. Post - letterboxes the scene target into the back buffer
//! 5. Present - transitions the back buffer for presentation

pub mod global;
pub mod post;
pub mod present;
pub mod scene;
pub mod upload;

pub use global::GlobalPass;
pub use post::PostPass;
pub use present::PresentPass;
pub use scene::ScenePass;
pub use upload::{GpuBuffer, GpuTables, GpuTexture, SharedTables, UploadPass};

use std::sync::Arc;

use crate::assets::World;
use crate::render_graph::{Diagnostics, GraphResult, PassId, RenderGraph};
use crate::EngineConfig;

pub const GLOBAL_PASS: &str = "global";
pub const UPLOAD_PASS: &str = "upload";
pub const SCENE_PASS: &str = "scene";
pub const POST_PASS: &str = "post";
pub const PRESENT_PASS: &str = "present";

/// Passes added by [`build_world_graph`]
#[derive(Debug, Clone)]
pub struct WorldPasses {
    pub global: PassId,
    pub upload: PassId,
    pub scene: PassId,
    pub post: PassId,
    pub present: PassId,
    /// GPU tables filled by the upload pass and drawn by the scene pass
    pub tables: SharedTables,
}

/// Build the world render graph
///
/// The graph is wired but not compiled; the caller picks the root.
pub fn build_world_graph(
    config: &EngineConfig,
    world: Arc<World>,
) -> GraphResult<(RenderGraph, WorldPasses)> {
    let mut graph = RenderGraph::new(Diagnostics::new(config.log_target.as_str()));
    let tables = SharedTables::default();

    let global = graph.add_pass(GLOBAL_PASS, GlobalPass::new())?;
    let upload = graph.add_pass(
        UPLOAD_PASS,
        UploadPass::new(Arc::clone(&world), Arc::clone(&tables), config.upload_budget),
    )?;
    let scene = graph.add_pass(
        SCENE_PASS,
        ScenePass::new(Arc::clone(&world), Arc::clone(&tables), config.clear_color),
    )?;
    let post = graph.add_pass(POST_PASS, PostPass::new())?;
    let present = graph.add_pass(PRESENT_PASS, PresentPass::new(world))?;

    graph.link_by_name(SCENE_PASS, "texture-table", UPLOAD_PASS, "texture-table")?;
    graph.link_by_name(POST_PASS, "scene-target", SCENE_PASS, "scene-target")?;
    graph.link_by_name(POST_PASS, "rtv", GLOBAL_PASS, "rtv")?;
    graph.link_by_name(PRESENT_PASS, "rtv", POST_PASS, "rtv")?;
    graph.link_by_name(PRESENT_PASS, "scene-target", POST_PASS, "scene-target")?;

    Ok((
        graph,
        WorldPasses {
            global,
            upload,
            scene,
            post,
            present,
            tables,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyContext, QueueKind, ResourceState, TextureSize};

    fn world() -> Arc<World> {
        Arc::new(World::new(8, 8, 8))
    }

    #[test]
    fn test_world_graph_order() {
        let config = EngineConfig::default();
        let (mut graph, passes) = build_world_graph(&config, world()).unwrap();
        let compiled = graph.compile(passes.present).unwrap();
        let order = compiled.pass_order.clone();
        assert_eq!(
            graph.pass_names(&order),
            vec!["upload", "scene", "global", "post", "present"]
        );
        assert!(graph.compiled().unwrap().uses_queue(QueueKind::Copy));
    }

    #[test]
    fn test_scene_root_skips_composition() {
        let config = EngineConfig::default();
        let (mut graph, passes) = build_world_graph(&config, world()).unwrap();
        let order = graph.compile(passes.scene).unwrap().pass_order.clone();
        assert_eq!(graph.pass_names(&order), vec!["upload", "scene"]);
    }

    #[test]
    fn test_world_graph_barriers() {
        let config = EngineConfig::default();
        let mut ctx = DummyContext::new(2, TextureSize::new(64, 64), TextureSize::new(128, 64));
        let (mut graph, passes) = build_world_graph(&config, world()).unwrap();
        graph.start(&mut ctx).unwrap();

        let stats = graph.execute(&mut ctx, passes.present).unwrap();
        let transitions: Vec<(ResourceState, ResourceState)> = stats
            .barriers
            .iter()
            .map(|barrier| (barrier.before, barrier.after))
            .collect();
        assert_eq!(
            transitions,
            vec![
                (ResourceState::CopyDest, ResourceState::PixelShaderResource),
                (ResourceState::RenderTarget, ResourceState::PixelShaderResource),
                (ResourceState::Present, ResourceState::RenderTarget),
                (ResourceState::RenderTarget, ResourceState::Present),
                (ResourceState::PixelShaderResource, ResourceState::RenderTarget),
            ]
        );

        graph.stop(&mut ctx).unwrap();
        assert_eq!(ctx.used_heap_slots(), 0);
        assert_eq!(ctx.live_buffers(), 0);
    }
}
