//! Render graph definition and compilation

use crate::backend::types::QueueKind;
use crate::render_graph::diagnostics::{Diagnostics, FrameStats};
use crate::render_graph::edge::*;
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;
use std::collections::HashMap;

/// The main render graph structure
///
/// Passes, edges and resources live in arenas indexed by their ids. Wiring is
/// mutable until the graph is compiled; after that it is finalized.
pub struct RenderGraph {
    pub(crate) passes: Vec<Box<dyn RenderPass>>,
    pub(crate) nodes: Vec<PassNode>,
    pub(crate) inputs: Vec<Input>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) resources: Vec<Resource>,
    /// Output each input is wired to
    pub(crate) wires: Vec<Option<OutputId>>,
    /// Resource each input resolved to during the last frame
    pub(crate) resolved: Vec<Option<ResourceId>>,
    pass_names: HashMap<String, PassId>,
    pub(crate) compiled: Option<CompiledGraph>,
    pub(crate) diagnostics: Diagnostics,
    pub(crate) frame_index: u64,
}

impl RenderGraph {
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self {
            passes: Vec::new(),
            nodes: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            resources: Vec::new(),
            wires: Vec::new(),
            resolved: Vec::new(),
            pass_names: HashMap::new(),
            compiled: None,
            diagnostics,
            frame_index: 0,
        }
    }

    /// Add a render pass to the graph
    ///
    /// Runs the pass's `setup` and registers everything it declares.
    pub fn add_pass<P: RenderPass + 'static>(
        &mut self,
        name: &str,
        mut pass: P,
    ) -> GraphResult<PassId> {
        self.ensure_mutable()?;
        if self.pass_names.contains_key(name) {
            return Err(GraphError::DuplicatePass(name.to_string()));
        }

        let id = PassId(self.nodes.len() as u32);
        let queue = pass.queue();
        let mut builder = PassBuilder::new(
            id,
            name,
            queue,
            self.inputs.len(),
            self.outputs.len(),
            self.resources.len(),
        );
        pass.setup(&mut builder);
        if let Some(error) = builder.error.take() {
            return Err(error);
        }

        let input_base = self.inputs.len() as u32;
        let output_base = self.outputs.len() as u32;
        let resource_base = self.resources.len() as u32;
        let PassBuilder {
            inputs,
            outputs,
            resources,
            ..
        } = builder;

        let node = PassNode {
            id,
            name: name.to_string(),
            queue,
            inputs: (0..inputs.len() as u32)
                .map(|i| InputId(input_base + i))
                .collect(),
            outputs: (0..outputs.len() as u32)
                .map(|i| OutputId(output_base + i))
                .collect(),
            resources: (0..resources.len() as u32)
                .map(|i| ResourceId(resource_base + i))
                .collect(),
            status: PassStatus::Created,
        };

        log::debug!(
            target: self.diagnostics.target(),
            "added pass `{}` on {} queue ({} inputs, {} outputs, {} resources)",
            name,
            queue,
            inputs.len(),
            outputs.len(),
            resources.len()
        );

        self.wires.resize(self.wires.len() + inputs.len(), None);
        self.resolved.resize(self.resolved.len() + inputs.len(), None);
        self.inputs.extend(inputs);
        self.outputs.extend(outputs);
        self.resources.extend(resources);
        self.pass_names.insert(name.to_string(), id);
        self.nodes.push(node);
        self.passes.push(Box::new(pass));

        Ok(id)
    }

    /// Wire a consumer's input to a producer's output
    ///
    /// An input takes exactly one wire. Every input wired to the same output
    /// must expect the same state.
    pub fn link(&mut self, input: InputId, output: OutputId) -> GraphResult<()> {
        self.ensure_mutable()?;
        let consumer = self
            .inputs
            .get(input.index())
            .ok_or_else(|| GraphError::InvalidId(format!("input #{}", input.0)))?;
        let producer = self
            .outputs
            .get(output.index())
            .ok_or_else(|| GraphError::InvalidId(format!("output #{}", output.0)))?;

        if self.wires[input.index()].is_some() {
            return Err(GraphError::InputAlreadyWired {
                pass: self.nodes[consumer.pass.index()].name.clone(),
                input: consumer.name.clone(),
            });
        }
        if consumer.pass == producer.pass {
            return Err(GraphError::SelfWire(
                self.nodes[consumer.pass.index()].name.clone(),
            ));
        }
        if let Some(existing) = self
            .consumers(output)
            .map(|other| self.inputs[other.index()].state)
            .find(|state| *state != consumer.state)
        {
            return Err(GraphError::ConflictingConsumerStates {
                output: self.output_label(output),
                existing,
                requested: consumer.state,
            });
        }

        log::debug!(
            target: self.diagnostics.target(),
            "wired `{}` -> `{}`",
            self.output_label(output),
            self.input_label(input)
        );
        self.wires[input.index()] = Some(output);
        Ok(())
    }

    /// Wire edges looked up by pass and edge name
    pub fn link_by_name(
        &mut self,
        consumer: &str,
        input: &str,
        producer: &str,
        output: &str,
    ) -> GraphResult<()> {
        let input = self.find_input(consumer, input)?;
        let output = self.find_output(producer, output)?;
        self.link(input, output)
    }

    pub fn find_pass(&self, name: &str) -> Option<PassId> {
        self.pass_names.get(name).copied()
    }

    pub fn find_input(&self, pass: &str, input: &str) -> GraphResult<InputId> {
        let node = self.node_by_name(pass)?;
        node.inputs
            .iter()
            .copied()
            .find(|id| self.inputs[id.index()].name == input)
            .ok_or_else(|| GraphError::UnknownEdge {
                pass: pass.to_string(),
                edge: input.to_string(),
            })
    }

    pub fn find_output(&self, pass: &str, output: &str) -> GraphResult<OutputId> {
        let node = self.node_by_name(pass)?;
        node.outputs
            .iter()
            .copied()
            .find(|id| self.outputs[id.index()].name == output)
            .ok_or_else(|| GraphError::UnknownEdge {
                pass: pass.to_string(),
                edge: output.to_string(),
            })
    }

    /// Output an input is wired to
    pub fn wire(&self, input: InputId) -> Option<OutputId> {
        self.wires.get(input.index()).copied().flatten()
    }

    /// Inputs wired to an output
    pub fn consumers(&self, output: OutputId) -> impl Iterator<Item = InputId> + '_ {
        self.wires
            .iter()
            .enumerate()
            .filter(move |(_, wire)| **wire == Some(output))
            .map(|(index, _)| InputId(index as u32))
    }

    /// Resource an output carries, following relays through their wires
    ///
    /// `None` while some relay along the chain is unwired.
    pub fn resolve_output(&self, output: OutputId) -> Option<ResourceId> {
        let mut current = output;
        // A chain longer than the output count would have to repeat itself
        for _ in 0..=self.outputs.len() {
            match self.outputs.get(current.index())?.source {
                OutputSource::Source(resource) => return Some(resource),
                OutputSource::Relay(input) => current = self.wire(input)?,
            }
        }
        None
    }

    /// Resource an input resolves to
    pub fn resolve_input(&self, input: InputId) -> Option<ResourceId> {
        self.wire(input).and_then(|output| self.resolve_output(output))
    }

    /// Validate the graph and order the passes the root depends on
    ///
    /// Every input of every pass must be wired and the graph must be acyclic.
    /// The result is cached per root; compiling finalizes the graph.
    pub fn compile(&mut self, root: PassId) -> GraphResult<&CompiledGraph> {
        let compiled = match self.compiled.take() {
            Some(compiled) if compiled.root == root => compiled,
            previous => match self.build_order(root) {
                Ok(compiled) => compiled,
                Err(error) => {
                    self.compiled = previous;
                    return Err(error);
                }
            },
        };
        Ok(self.compiled.insert(compiled))
    }

    fn build_order(&self, root: PassId) -> GraphResult<CompiledGraph> {
        let root_node = self
            .nodes
            .get(root.index())
            .ok_or_else(|| GraphError::UnknownPass(format!("#{}", root.0)))?;

        if let Some(index) = self.wires.iter().position(Option::is_none) {
            let input = &self.inputs[index];
            return Err(GraphError::UnwiredInput {
                pass: self.nodes[input.pass.index()].name.clone(),
                input: input.name.clone(),
            });
        }

        // Producer passes each pass depends on, in input declaration order
        let dependencies: Vec<Vec<PassId>> = self
            .nodes
            .iter()
            .map(|node| {
                node.inputs
                    .iter()
                    .filter_map(|input| self.wire(*input))
                    .map(|output| self.outputs[output.index()].pass)
                    .collect()
            })
            .collect();

        if let Some(cycle) = find_cycle(&dependencies) {
            return Err(GraphError::Cycle(
                cycle
                    .into_iter()
                    .map(|pass| self.nodes[pass.index()].name.clone())
                    .collect(),
            ));
        }

        let mut visited = vec![false; self.nodes.len()];
        let mut pass_order = Vec::new();
        post_order(root, &dependencies, &mut visited, &mut pass_order);

        let mut queues = Vec::new();
        for pass in &pass_order {
            let queue = self.nodes[pass.index()].queue;
            if !queues.contains(&queue) {
                queues.push(queue);
            }
        }

        // Resource lifetimes in terms of execution order
        let mut resource_lifetimes: HashMap<ResourceId, ResourceLifetime> = HashMap::new();
        for (step, pass) in pass_order.iter().enumerate() {
            let node = &self.nodes[pass.index()];
            let used = node
                .inputs
                .iter()
                .filter_map(|input| self.resolve_input(*input))
                .chain(node.resources.iter().copied());
            for resource in used {
                resource_lifetimes
                    .entry(resource)
                    .and_modify(|lifetime| lifetime.last_use = step)
                    .or_insert(ResourceLifetime {
                        first_use: step,
                        last_use: step,
                    });
            }
        }

        log::info!(
            target: self.diagnostics.target(),
            "compiled render graph: {} of {} passes reachable from `{}`",
            pass_order.len(),
            self.nodes.len(),
            root_node.name
        );

        Ok(CompiledGraph {
            root,
            pass_order,
            queues,
            resource_lifetimes,
        })
    }

    pub fn is_finalized(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn compiled(&self) -> Option<&CompiledGraph> {
        self.compiled.as_ref()
    }

    /// Get pass node by ID
    pub fn pass_node(&self, id: PassId) -> Option<&PassNode> {
        self.nodes.get(id.index())
    }

    /// Get pass nodes (metadata)
    pub fn pass_nodes(&self) -> &[PassNode] {
        &self.nodes
    }

    pub fn pass_name(&self, id: PassId) -> Option<&str> {
        self.nodes.get(id.index()).map(|node| node.name.as_str())
    }

    /// Names of the given passes, skipping unknown ids
    pub fn pass_names<'a>(&'a self, ids: &'a [PassId]) -> Vec<&'a str> {
        ids.iter().filter_map(|id| self.pass_name(*id)).collect()
    }

    pub fn input(&self, id: InputId) -> Option<&Input> {
        self.inputs.get(id.index())
    }

    pub fn output(&self, id: OutputId) -> Option<&Output> {
        self.outputs.get(id.index())
    }

    pub fn resource(&self, id: ResourceId) -> Option<&Resource> {
        self.resources.get(id.index())
    }

    /// Get all resources
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Statistics of the last executed frame
    pub fn last_frame(&self) -> Option<&FrameStats> {
        self.diagnostics.last_frame()
    }

    /// Number of frames executed so far
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Inspector listing every pass with its edges and wiring
    pub fn debug_ui(&mut self, ui: &mut egui::Ui) {
        ui.label(format!("frame {}", self.frame_index));
        if let Some(stats) = self.diagnostics.last_frame() {
            ui.label(format!(
                "{} passes, {} barriers",
                stats.executed.len(),
                stats.barriers.len()
            ));
        }
        ui.separator();

        let inputs = &self.inputs;
        let outputs = &self.outputs;
        let nodes = &self.nodes;
        let wires = &self.wires;
        for (node, pass) in nodes.iter().zip(self.passes.iter_mut()) {
            ui.collapsing(node.name.as_str(), |ui| {
                ui.label(format!("queue: {}, status: {:?}", node.queue, node.status));
                for input in &node.inputs {
                    let edge = &inputs[input.index()];
                    let source = match wires[input.index()] {
                        Some(output) => {
                            let output = &outputs[output.index()];
                            format!("{}.{}", nodes[output.pass.index()].name, output.name)
                        }
                        None => "unwired".to_string(),
                    };
                    ui.monospace(format!("in  {} [{}] <- {}", edge.name, edge.state, source));
                }
                for output in &node.outputs {
                    let edge = &outputs[output.index()];
                    let kind = if edge.is_relay() { "relay" } else { "source" };
                    ui.monospace(format!("out {} [{}] {}", edge.name, edge.state, kind));
                }
                pass.debug_ui(ui);
            });
        }
    }

    fn ensure_mutable(&self) -> GraphResult<()> {
        if self.compiled.is_some() {
            return Err(GraphError::Finalized);
        }
        Ok(())
    }

    fn node_by_name(&self, name: &str) -> GraphResult<&PassNode> {
        self.find_pass(name)
            .map(|id| &self.nodes[id.index()])
            .ok_or_else(|| GraphError::UnknownPass(name.to_string()))
    }

    fn input_label(&self, input: InputId) -> String {
        let input = &self.inputs[input.index()];
        format!("{}.{}", self.nodes[input.pass.index()].name, input.name)
    }

    fn output_label(&self, output: OutputId) -> String {
        let output = &self.outputs[output.index()];
        format!("{}.{}", self.nodes[output.pass.index()].name, output.name)
    }
}

impl Default for RenderGraph {
    fn default() -> Self {
        Self::new(Diagnostics::default())
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Visiting,
    Done,
}

/// First cycle found, listed from producer to consumer with the first pass repeated
fn find_cycle(dependencies: &[Vec<PassId>]) -> Option<Vec<PassId>> {
    fn visit(
        pass: PassId,
        dependencies: &[Vec<PassId>],
        marks: &mut [Mark],
        stack: &mut Vec<PassId>,
    ) -> Option<Vec<PassId>> {
        marks[pass.index()] = Mark::Visiting;
        stack.push(pass);
        for &dependency in &dependencies[pass.index()] {
            match marks[dependency.index()] {
                Mark::Visiting => {
                    let begin = stack.iter().position(|p| *p == dependency)?;
                    let mut cycle = stack[begin..].to_vec();
                    cycle.push(dependency);
                    cycle.reverse();
                    return Some(cycle);
                }
                Mark::Unvisited => {
                    if let Some(cycle) = visit(dependency, dependencies, marks, stack) {
                        return Some(cycle);
                    }
                }
                Mark::Done => {}
            }
        }
        stack.pop();
        marks[pass.index()] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; dependencies.len()];
    let mut stack = Vec::new();
    for index in 0..dependencies.len() {
        if marks[index] == Mark::Unvisited {
            if let Some(cycle) = visit(PassId(index as u32), dependencies, &mut marks, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Dependencies first, then the pass itself
fn post_order(
    pass: PassId,
    dependencies: &[Vec<PassId>],
    visited: &mut [bool],
    order: &mut Vec<PassId>,
) {
    if visited[pass.index()] {
        return;
    }
    visited[pass.index()] = true;
    for &dependency in &dependencies[pass.index()] {
        post_order(dependency, dependencies, visited, order);
    }
    order.push(pass);
}

/// Resource lifetime in terms of pass execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLifetime {
    pub first_use: usize,
    pub last_use: usize,
}

/// Compiled render graph with execution order and resource lifetimes
#[derive(Debug, Clone)]
pub struct CompiledGraph {
    pub root: PassId,
    pub pass_order: Vec<PassId>,
    /// Queues used by the ordered passes, in first-use order
    pub queues: Vec<QueueKind>,
    pub resource_lifetimes: HashMap<ResourceId, ResourceLifetime>,
}

impl CompiledGraph {
    pub fn uses_queue(&self, queue: QueueKind) -> bool {
        self.queues.contains(&queue)
    }

    /// Check if a resource is alive at a given execution step
    pub fn is_resource_alive(&self, resource: ResourceId, step: usize) -> bool {
        self.resource_lifetimes
            .get(&resource)
            .is_some_and(|lifetime| step >= lifetime.first_use && step <= lifetime.last_use)
    }
}
