//! Swapchain image producer

use crate::backend::types::ResourceState;
use crate::render_graph::*;

/// Publishes the current back buffer as the `rtv` resource
///
/// The native image comes from the context each frame, so this pass has
/// nothing to create or record. It exists so the back buffer has an owner
/// that hands it out in the present state.
#[derive(Debug, Default)]
pub struct GlobalPass {
    rtv: Option<ResourceId>,
}

impl GlobalPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_target(&self) -> Option<ResourceId> {
        self.rtv
    }
}

impl RenderPass for GlobalPass {
    fn setup(&mut self, builder: &mut PassBuilder) {
        let rtv = builder.add_resource("rtv", ResourceKind::BackBuffer);
        builder.new_output("rtv", ResourceState::Present, Some(rtv));
        self.rtv = Some(rtv);
    }

    fn execute(&mut self, _ctx: &mut PassContext) -> GraphResult<()> {
        Ok(())
    }
}
