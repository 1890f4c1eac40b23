//! Main engine orchestrator

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

use crate::assets::gltf::{load_gltf_async, LoadSummary};
use crate::assets::{AssetError, World};
use crate::backend::traits::*;
use crate::backend::types::TextureSize;
use crate::frame::FrameSync;
use crate::pipeline::{build_world_graph, WorldPasses};
use crate::render_graph::{FrameStats, GraphError, PassId, RenderGraph};
use crate::EngineConfig;

/// Errors surfaced by [`Engine`]
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Drives the world graph on a graphics context
///
/// Owns the context, the graph and the frame pacing. Assets are loaded into
/// the shared [`World`] on background threads and picked up by the upload
/// pass as they appear.
pub struct Engine<C: GraphicsContext> {
    context: C,
    graph: RenderGraph,
    frames: FrameSync,
    world: Arc<World>,
    passes: WorldPasses,
    root: PassId,
    config: EngineConfig,
    running: bool,
}

impl<C: GraphicsContext> Engine<C> {
    /// Build, compile and start the world graph on `context`
    pub fn new(mut context: C, config: EngineConfig) -> EngineResult<Self> {
        config.validate().map_err(EngineError::Config)?;
        if context.frame_count() != config.frames_in_flight {
            log::warn!(
                target: config.log_target.as_str(),
                "{} has {} back buffers, configured for {} frames in flight",
                context.name(),
                context.frame_count(),
                config.frames_in_flight
            );
        }

        let world = Arc::new(World::new(
            config.max_textures,
            config.max_nodes,
            config.max_primitives,
        ));
        let (mut graph, passes) = build_world_graph(&config, Arc::clone(&world))?;
        let root = graph
            .find_pass(&config.root_pass)
            .ok_or_else(|| GraphError::UnknownPass(config.root_pass.clone()))?;
        graph.compile(root)?;
        graph.start(&mut context)?;

        log::info!(
            target: config.log_target.as_str(),
            "engine started on {} (scene {}, window {})",
            context.name(),
            context.scene_size(),
            context.window_size()
        );

        Ok(Self {
            context,
            graph,
            frames: FrameSync::new(config.frames_in_flight),
            world,
            passes,
            root,
            config,
            running: true,
        })
    }

    /// Record, submit and present one frame, then wait for the next slot
    pub fn render_frame(&mut self) -> EngineResult<FrameStats> {
        let stats = self.graph.execute(&mut self.context, self.root)?.clone();
        self.frames.wait_for_frame(&mut self.context)?;
        Ok(stats)
    }

    /// Resize the swapchain and restart the passes that depend on it
    pub fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        let size = TextureSize::new(width, height);
        if size.is_empty() {
            log::debug!(target: self.config.log_target.as_str(), "ignoring resize to {}", size);
            return Ok(());
        }
        if size == self.context.window_size() {
            return Ok(());
        }

        self.frames.wait_idle(&mut self.context)?;
        self.context.resize(size)?;
        self.frames.sync_slot(&self.context);
        self.graph.resize(&mut self.context)?;
        self.config.window_size = size;
        Ok(())
    }

    /// Stream a glTF file into the world on a background thread
    pub fn load_gltf(
        &self,
        path: impl Into<PathBuf>,
    ) -> EngineResult<JoinHandle<Result<LoadSummary, AssetError>>> {
        Ok(load_gltf_async(path, Arc::clone(&self.world))?)
    }

    /// Wait for the GPU and stop every pass
    ///
    /// Also runs on drop; calling it twice is a no-op.
    pub fn shutdown(&mut self) -> EngineResult<()> {
        if !self.running {
            return Ok(());
        }
        self.running = false;
        self.frames.wait_idle(&mut self.context)?;
        self.graph.stop(&mut self.context)?;
        log::info!(
            target: self.config.log_target.as_str(),
            "engine stopped after {} frames",
            self.frames.frame_count()
        );
        Ok(())
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.context
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn passes(&self) -> &WorldPasses {
        &self.passes
    }

    pub fn root(&self) -> PassId {
        self.root
    }

    pub fn frames(&self) -> &FrameSync {
        &self.frames
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Graph inspector
    pub fn debug_ui(&mut self, ui: &mut egui::Ui) {
        ui.label(format!("Backend: {}", self.context.name()));
        ui.label(format!("Frames: {}", self.frames.frame_count()));
        self.graph.debug_ui(ui);
    }
}

impl<C: GraphicsContext> Drop for Engine<C> {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            log::error!(
                target: self.config.log_target.as_str(),
                "engine shutdown failed: {}",
                error
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyContext;

    fn context() -> DummyContext {
        DummyContext::new(2, TextureSize::new(64, 64), TextureSize::new(128, 64))
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            heap_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            Engine::new(context(), config),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_unknown_root_rejected() {
        let config = EngineConfig {
            root_pass: "missing".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Engine::new(context(), config),
            Err(EngineError::Graph(GraphError::UnknownPass(_)))
        ));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let mut engine = Engine::new(context(), EngineConfig::default()).unwrap();
        engine.render_frame().unwrap();
        engine.shutdown().unwrap();
        engine.shutdown().unwrap();
        assert_eq!(engine.context().live_buffers(), 0);
        assert_eq!(engine.context().used_heap_slots(), 0);
    }

    #[test]
    fn test_same_size_resize_is_ignored() {
        let mut engine = Engine::new(context(), EngineConfig::default()).unwrap();
        engine.context_mut().clear_logs();
        engine.resize(128, 64).unwrap();
        engine.resize(0, 64).unwrap();
        assert!(engine.context().events().is_empty());
    }
}
