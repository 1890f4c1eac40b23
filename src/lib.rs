//! Render Graph Engine - pass scheduling with automatic resource barriers
//!
//! Passes declare the resources they read and write along with the state
//! each needs. The graph orders the passes a root depends on, inserts the
//! state transitions between them and paces frames in flight with a fence.
//!
//! # Features
//! - Render graph with relays, cycle detection and per-frame barrier tracking
//! - Copy and direct queues, copy work fenced before dependent direct work
//! - Frame pacing for N frames in flight
//! - Append-only world tables fed by a background glTF loader
//! - Headless [`DummyContext`](backend::DummyContext) backend for tests and tooling

pub mod assets;
pub mod backend;
pub mod engine;
pub mod frame;
pub mod pipeline;
pub mod render_graph;

pub use assets::{World, WorldSink};
pub use backend::{GraphicsContext, TextureSize};
pub use engine::{Engine, EngineError, EngineResult};
pub use frame::FrameSync;
pub use render_graph::{RenderGraph, RenderPass};

/// Configuration for initializing the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Number of back buffers, and frames the CPU may record ahead
    pub frames_in_flight: usize,
    /// Internal resolution the scene is rendered at
    pub scene_size: TextureSize,
    /// Initial window size
    pub window_size: TextureSize,
    /// Shader-visible descriptor heap slots
    pub heap_size: usize,
    /// Name of the pass frames are rendered up to
    pub root_pass: String,
    pub max_textures: usize,
    pub max_nodes: usize,
    pub max_primitives: usize,
    /// Textures and buffers uploaded per frame at most
    pub upload_budget: usize,
    /// Clear color of the scene target
    pub clear_color: [f32; 4],
    /// Log target of graph messages
    pub log_target: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: frame::DEFAULT_FRAMES_IN_FLIGHT,
            scene_size: TextureSize::new(1280, 720),
            window_size: TextureSize::new(1280, 720),
            heap_size: 1024,
            root_pass: pipeline::PRESENT_PASS.to_string(),
            max_textures: 512,
            max_nodes: 4096,
            max_primitives: 8192,
            upload_budget: 16,
            clear_color: [0.1, 0.1, 0.15, 1.0],
            log_target: render_graph::DEFAULT_LOG_TARGET.to_string(),
        }
    }
}

impl EngineConfig {
    /// Check the configuration for values no backend can honor
    pub fn validate(&self) -> Result<(), String> {
        if self.frames_in_flight == 0 {
            return Err("frames_in_flight must be at least 1".to_string());
        }
        if self.scene_size.is_empty() {
            return Err(format!("scene size {} is empty", self.scene_size));
        }
        if self.window_size.is_empty() {
            return Err(format!("window size {} is empty", self.window_size));
        }
        if self.heap_size == 0 {
            return Err("heap_size must be at least 1".to_string());
        }
        if self.root_pass.is_empty() {
            return Err("root_pass is empty".to_string());
        }
        Ok(())
    }
}

/// Initialize logging for binaries and tools
///
/// Honors `RUST_LOG`, defaulting to `info`. Safe to call more than once.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.root_pass, "present");
        assert_eq!(config.frames_in_flight, 2);
    }

    #[test]
    fn test_validate_rejects_empty_sizes() {
        let config = EngineConfig {
            window_size: TextureSize::new(0, 720),
            ..Default::default()
        };
        assert!(config.validate().unwrap_err().contains("window size"));

        let config = EngineConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
