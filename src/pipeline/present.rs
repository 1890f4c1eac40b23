//! Root of the world pipeline

use std::sync::Arc;

use crate::assets::World;
use crate::backend::types::ResourceState;
use crate::render_graph::*;

/// Brings the back buffer into the present state
///
/// Records nothing itself: its `rtv` input makes the graph transition the
/// back buffer for presentation, and its `scene-target` input hands the
/// scene target back as a render target for the next frame.
pub struct PresentPass {
    world: Arc<World>,
    frames: u64,
}

impl PresentPass {
    pub fn new(world: Arc<World>) -> Self {
        Self { world, frames: 0 }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl RenderPass for PresentPass {
    fn setup(&mut self, builder: &mut PassBuilder) {
        builder.new_input("rtv", ResourceState::Present);
        builder.new_input("scene-target", ResourceState::RenderTarget);
    }

    fn execute(&mut self, _ctx: &mut PassContext) -> GraphResult<()> {
        self.frames += 1;
        Ok(())
    }

    fn debug_ui(&mut self, ui: &mut egui::Ui) {
        ui.label(format!("Frames: {}", self.frames));
        ui.label(format!(
            "World: {} nodes, {} primitives, {} textures",
            self.world.nodes().len(),
            self.world.primitives().len(),
            self.world.textures().len()
        ));
    }
}
