//! Render pass definitions for the render graph

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::edge::*;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::resource::*;

/// Unique identifier for a render pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u32);

impl PassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Context for declaring a pass's edges and owned resources
///
/// Handed to [`RenderPass::setup`] once, when the pass is added. Declaration
/// errors are collected and reported by
/// [`RenderGraph::add_pass`](super::RenderGraph::add_pass).
pub struct PassBuilder<'a> {
    pass: PassId,
    name: &'a str,
    queue: QueueKind,
    input_base: u32,
    output_base: u32,
    resource_base: u32,
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) resources: Vec<Resource>,
    pub(crate) error: Option<GraphError>,
}

impl<'a> PassBuilder<'a> {
    pub(crate) fn new(
        pass: PassId,
        name: &'a str,
        queue: QueueKind,
        input_base: usize,
        output_base: usize,
        resource_base: usize,
    ) -> Self {
        Self {
            pass,
            name,
            queue,
            input_base: input_base as u32,
            output_base: output_base as u32,
            resource_base: resource_base as u32,
            inputs: Vec::new(),
            outputs: Vec::new(),
            resources: Vec::new(),
            error: None,
        }
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// Declare an input expecting the resource in `state`
    pub fn new_input(&mut self, name: &str, state: ResourceState) -> InputId {
        let id = InputId(self.input_base + self.inputs.len() as u32);
        if self.inputs.iter().any(|input| input.name == name) {
            self.fail(GraphError::DuplicateEdge {
                pass: self.name.to_string(),
                edge: name.to_string(),
            });
        }
        self.check_state(name, state);
        self.inputs.push(Input {
            name: name.to_string(),
            pass: self.pass,
            state,
        });
        id
    }

    /// Declare an output producing an owned resource in `state`
    ///
    /// With `resource` unset, a fresh texture resource named after the output
    /// is created.
    pub fn new_output(
        &mut self,
        name: &str,
        state: ResourceState,
        resource: Option<ResourceId>,
    ) -> OutputId {
        self.check_output_name(name);
        self.check_state(name, state);

        let resource = match resource {
            Some(resource) => resource,
            None => self.add_resource(name, ResourceKind::Texture),
        };
        match self.local_resource(resource) {
            Some(local) => self.resources[local].declare_initial_state(state),
            None => self.fail(GraphError::NotOwner {
                pass: self.name.to_string(),
                resource: format!("#{}", resource.0),
            }),
        }

        self.push_output(name, state, OutputSource::Source(resource))
    }

    /// Declare an output forwarding one of this pass's inputs
    ///
    /// `state` defaults to the input's expected state.
    pub fn new_relay(
        &mut self,
        name: &str,
        input: InputId,
        state: Option<ResourceState>,
    ) -> OutputId {
        self.check_output_name(name);

        let local = input
            .0
            .checked_sub(self.input_base)
            .map(|index| index as usize)
            .filter(|index| *index < self.inputs.len());
        let state = match (local, state) {
            (Some(_), Some(state)) => state,
            (Some(index), None) => self.inputs[index].state,
            (None, state) => {
                self.fail(GraphError::InvalidRelay {
                    pass: self.name.to_string(),
                    edge: name.to_string(),
                });
                state.unwrap_or_default()
            }
        };
        self.check_state(name, state);

        self.push_output(name, state, OutputSource::Relay(input))
    }

    /// Create a resource owned by this pass
    pub fn add_resource(&mut self, name: &str, kind: ResourceKind) -> ResourceId {
        let id = ResourceId(self.resource_base + self.resources.len() as u32);
        self.resources.push(Resource::new(name, kind, self.pass));
        id
    }

    fn push_output(&mut self, name: &str, state: ResourceState, source: OutputSource) -> OutputId {
        let id = OutputId(self.output_base + self.outputs.len() as u32);
        self.outputs.push(Output {
            name: name.to_string(),
            pass: self.pass,
            state,
            source,
        });
        id
    }

    fn local_resource(&self, resource: ResourceId) -> Option<usize> {
        resource
            .0
            .checked_sub(self.resource_base)
            .map(|index| index as usize)
            .filter(|index| *index < self.resources.len())
    }

    fn check_output_name(&mut self, name: &str) {
        if self.outputs.iter().any(|output| output.name == name) {
            self.fail(GraphError::DuplicateEdge {
                pass: self.name.to_string(),
                edge: name.to_string(),
            });
        }
    }

    fn check_state(&mut self, name: &str, state: ResourceState) {
        if state == ResourceState::Invalid {
            self.fail(GraphError::InvalidState {
                pass: self.name.to_string(),
                edge: name.to_string(),
            });
        }
    }

    fn fail(&mut self, error: GraphError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }
}

/// Context handed to a pass while starting, executing or stopping
pub struct PassContext<'a> {
    pub(crate) pass: PassId,
    pub(crate) name: &'a str,
    pub(crate) log_target: &'a str,
    pub(crate) queue: QueueKind,
    pub(crate) context: &'a mut dyn GraphicsContext,
    pub(crate) resources: &'a mut [Resource],
    pub(crate) inputs: &'a [Input],
    pub(crate) outputs: &'a [Output],
    pub(crate) resolved: &'a [Option<ResourceId>],
}

impl<'a> PassContext<'a> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub fn queue(&self) -> QueueKind {
        self.queue
    }

    /// Log target of the graph running the pass
    pub fn log_target(&self) -> &'a str {
        self.log_target
    }

    pub fn context(&mut self) -> &mut dyn GraphicsContext {
        &mut *self.context
    }

    /// Recorder of the pass's queue
    pub fn commands(&mut self) -> &mut dyn CommandRecorder {
        self.context.commands(self.queue)
    }

    /// Resource an input resolves to this frame
    pub fn input(&self, input: InputId) -> GraphResult<&Resource> {
        self.resource(self.input_id(input)?)
    }

    /// Id of the resource an input resolves to this frame
    pub fn input_id(&self, input: InputId) -> GraphResult<ResourceId> {
        self.resolved
            .get(input.index())
            .copied()
            .flatten()
            .ok_or_else(|| GraphError::UnwiredInput {
                pass: self.name.to_string(),
                input: self
                    .inputs
                    .get(input.index())
                    .map(|input| input.name.clone())
                    .unwrap_or_else(|| format!("#{}", input.0)),
            })
    }

    /// Resource behind an output, following relays
    pub fn output(&self, output: OutputId) -> GraphResult<&Resource> {
        let source = self
            .outputs
            .get(output.index())
            .map(|output| output.source)
            .ok_or_else(|| GraphError::InvalidId(format!("output #{}", output.0)))?;
        match source {
            OutputSource::Source(resource) => self.resource(resource),
            OutputSource::Relay(input) => self.input(input),
        }
    }

    pub fn resource(&self, resource: ResourceId) -> GraphResult<&Resource> {
        self.resources
            .get(resource.index())
            .ok_or_else(|| GraphError::InvalidId(format!("resource #{}", resource.0)))
    }

    /// Mutable access to a resource this pass owns
    pub fn resource_mut(&mut self, resource: ResourceId) -> GraphResult<&mut Resource> {
        let pass = self.pass;
        let name = self.name;
        let entry = self
            .resources
            .get_mut(resource.index())
            .ok_or_else(|| GraphError::InvalidId(format!("resource #{}", resource.0)))?;
        if entry.owner() != pass {
            return Err(GraphError::NotOwner {
                pass: name.to_string(),
                resource: entry.name().to_string(),
            });
        }
        Ok(entry)
    }
}

/// A node of the render graph
///
/// `setup` declares edges once, when the pass is added. `start` and `stop`
/// bracket the lifetime of the pass's native resources and run exactly once
/// each, except that
/// resize-dependent passes are stopped and started again on resize.
/// `execute` records the pass's commands for one frame.
pub trait RenderPass: Send {
    /// Queue the pass records into
    fn queue(&self) -> QueueKind {
        QueueKind::Direct
    }

    /// Declare inputs, outputs and owned resources
    fn setup(&mut self, builder: &mut PassBuilder);

    /// Create native resources
    fn start(&mut self, _ctx: &mut PassContext) -> GraphResult<()> {
        Ok(())
    }

    /// Record commands
    fn execute(&mut self, ctx: &mut PassContext) -> GraphResult<()>;

    /// Release native resources
    fn stop(&mut self, _ctx: &mut PassContext) -> GraphResult<()> {
        Ok(())
    }

    /// Whether the pass must restart when the window is resized
    fn resize_dependent(&self) -> bool {
        false
    }

    /// Inspector UI
    fn debug_ui(&mut self, _ui: &mut egui::Ui) {}
}

/// Lifecycle of a pass's native resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
    Created,
    Started,
    Stopped,
}

/// Metadata about a pass in the graph
#[derive(Debug)]
pub struct PassNode {
    pub id: PassId,
    pub name: String,
    pub queue: QueueKind,
    pub inputs: Vec<InputId>,
    pub outputs: Vec<OutputId>,
    pub resources: Vec<ResourceId>,
    pub status: PassStatus,
}

impl PassNode {
    pub fn owns_resource(&self, resource: ResourceId) -> bool {
        self.resources.contains(&resource)
    }
}
