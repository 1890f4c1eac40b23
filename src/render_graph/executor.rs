//! Render graph executor
//!
//! Runs the compiled pass order for one frame: opens command lists lazily per
//! queue, records the barriers each pass needs before it executes, then
//! submits and presents.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::render_graph::diagnostics::FrameStats;
use crate::render_graph::edge::{Output, OutputId, OutputSource};
use crate::render_graph::error::{GraphError, GraphResult};
use crate::render_graph::graph::RenderGraph;
use crate::render_graph::pass::*;
use crate::render_graph::resource::*;

/// Transitions recorded during one frame, for rollback on failure
#[derive(Debug, Default)]
struct FrameJournal {
    transitions: Vec<(QueueKind, ResourceId, ResourceState)>,
    submitted: [bool; QueueKind::COUNT],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Execute,
    Stop,
}

impl RenderGraph {
    /// Start every pass that is not running yet, in insertion order
    pub fn start(&mut self, ctx: &mut dyn GraphicsContext) -> GraphResult<()> {
        for index in 0..self.nodes.len() {
            if self.nodes[index].status != PassStatus::Started {
                self.start_pass(ctx, PassId(index as u32))?;
            }
        }
        Ok(())
    }

    /// Stop every running pass, in reverse insertion order
    pub fn stop(&mut self, ctx: &mut dyn GraphicsContext) -> GraphResult<()> {
        for index in (0..self.nodes.len()).rev() {
            if self.nodes[index].status == PassStatus::Started {
                self.stop_pass(ctx, PassId(index as u32))?;
            }
        }
        Ok(())
    }

    /// Restart resize-dependent passes after the context was resized
    ///
    /// Back buffer resources return to their declared state since the
    /// swapchain images were recreated.
    pub fn resize(&mut self, ctx: &mut dyn GraphicsContext) -> GraphResult<()> {
        for resource in &mut self.resources {
            if resource.kind() == ResourceKind::BackBuffer {
                resource.reset_state();
            }
        }

        let dependent: Vec<PassId> = self
            .nodes
            .iter()
            .filter(|node| node.status == PassStatus::Started)
            .map(|node| node.id)
            .filter(|id| self.passes[id.index()].resize_dependent())
            .collect();

        log::info!(
            target: self.diagnostics.target(),
            "resized to {}, restarting {} passes",
            ctx.window_size(),
            dependent.len()
        );

        for pass in dependent.iter().rev() {
            self.stop_pass(ctx, *pass)?;
        }
        for pass in &dependent {
            self.start_pass(ctx, *pass)?;
        }
        Ok(())
    }

    /// Execute one frame rooted at `root`
    ///
    /// Compiles on first use. Copy queue work is submitted and waited on
    /// before the direct queue is submitted; the frame is then presented.
    ///
    /// On failure, tracked states recorded into command lists that never
    /// reached a queue are rolled back, so the next frame starts from what
    /// the GPU actually executed.
    pub fn execute(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        root: PassId,
    ) -> GraphResult<&FrameStats> {
        let order = self.compile(root)?.pass_order.clone();

        let mut journal = FrameJournal::default();
        match self.run_frame(ctx, &order, &mut journal) {
            Ok(stats) => {
                self.frame_index += 1;
                Ok(self.diagnostics.record(stats))
            }
            Err(error) => {
                let rolled_back = self.rewind(&journal);
                log::warn!(
                    target: self.diagnostics.target(),
                    "frame {} failed, rolled back {} transitions",
                    self.frame_index,
                    rolled_back
                );
                Err(error)
            }
        }
    }

    fn run_frame(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        order: &[PassId],
        journal: &mut FrameJournal,
    ) -> GraphResult<FrameStats> {
        let mut stats = FrameStats {
            frame: self.frame_index,
            ..Default::default()
        };
        let mut open = [false; QueueKind::COUNT];

        for &pass in order {
            let node = &self.nodes[pass.index()];
            if node.status != PassStatus::Started {
                return Err(GraphError::PassNotStarted(node.name.clone()));
            }
            let queue = node.queue;

            if !open[queue.index()] {
                ctx.begin_commands(queue)?;
                open[queue.index()] = true;
            }

            let barriers = self.collect_barriers(&*ctx, pass);
            journal
                .transitions
                .extend(barriers.iter().map(|barrier| (queue, barrier.resource, barrier.before)));
            if !barriers.is_empty() {
                ctx.commands(queue).transition(&barriers);
            }

            self.run_phase(ctx, pass, Phase::Execute)?;

            stats.barriers.extend(barriers);
            stats.executed.push(pass);
        }

        if open[QueueKind::Copy.index()] {
            ctx.submit(QueueKind::Copy)?;
            journal.submitted[QueueKind::Copy.index()] = true;
            ctx.wait_queue_idle(QueueKind::Copy)?;
            stats.submitted.push(QueueKind::Copy);
        }
        if open[QueueKind::Direct.index()] {
            ctx.submit(QueueKind::Direct)?;
            journal.submitted[QueueKind::Direct.index()] = true;
            stats.submitted.push(QueueKind::Direct);
        }
        ctx.present()?;
        Ok(stats)
    }

    /// Undo transitions of queues that were never submitted, newest first
    fn rewind(&mut self, journal: &FrameJournal) -> usize {
        let mut count = 0;
        for &(queue, resource, before) in journal.transitions.iter().rev() {
            if !journal.submitted[queue.index()] {
                self.resources[resource.index()].restore_state(before);
                count += 1;
            }
        }
        count
    }

    /// Transitions needed before `pass` executes
    ///
    /// Each input's resource moves to the state the input expects. Resources
    /// the pass produces move back to their declared output state, which
    /// reclaims them from whatever state the previous frame left behind.
    /// Tracked states are updated as barriers are emitted, so a resource
    /// already in the expected state costs nothing.
    fn collect_barriers(&mut self, ctx: &dyn GraphicsContext, pass: PassId) -> Vec<Barrier> {
        let node = &self.nodes[pass.index()];
        let target = self.diagnostics.target();
        let mut barriers = Vec::new();

        for &input in &node.inputs {
            let resource = self
                .wires
                .get(input.index())
                .copied()
                .flatten()
                .and_then(|output| resolve(&self.outputs, &self.wires, output));
            self.resolved[input.index()] = resource;
            if let Some(resource) = resource {
                let expected = self.inputs[input.index()].state;
                push_barrier(
                    &mut self.resources,
                    resource,
                    expected,
                    ctx,
                    &mut barriers,
                    target,
                    &node.name,
                );
            }
        }

        for &output in &node.outputs {
            let output = &self.outputs[output.index()];
            if let OutputSource::Source(resource) = output.source {
                push_barrier(
                    &mut self.resources,
                    resource,
                    output.state,
                    ctx,
                    &mut barriers,
                    target,
                    &node.name,
                );
            }
        }

        barriers
    }

    fn start_pass(&mut self, ctx: &mut dyn GraphicsContext, pass: PassId) -> GraphResult<()> {
        self.run_phase(ctx, pass, Phase::Start)?;
        let node = &mut self.nodes[pass.index()];
        node.status = PassStatus::Started;
        log::info!(target: self.diagnostics.target(), "started pass `{}`", node.name);
        Ok(())
    }

    fn stop_pass(&mut self, ctx: &mut dyn GraphicsContext, pass: PassId) -> GraphResult<()> {
        self.run_phase(ctx, pass, Phase::Stop)?;
        let node = &mut self.nodes[pass.index()];
        node.status = PassStatus::Stopped;
        for resource in &node.resources {
            self.resources[resource.index()].reset_state();
        }
        log::info!(target: self.diagnostics.target(), "stopped pass `{}`", node.name);
        Ok(())
    }

    fn run_phase(
        &mut self,
        ctx: &mut dyn GraphicsContext,
        pass: PassId,
        phase: Phase,
    ) -> GraphResult<()> {
        let index = pass.index();
        let node = &self.nodes[index];
        let mut pass_ctx = PassContext {
            pass,
            name: &node.name,
            log_target: self.diagnostics.target(),
            queue: node.queue,
            context: ctx,
            resources: &mut self.resources,
            inputs: &self.inputs,
            outputs: &self.outputs,
            resolved: &self.resolved,
        };

        let render_pass = &mut self.passes[index];
        let result = match phase {
            Phase::Start => render_pass.start(&mut pass_ctx),
            Phase::Execute => render_pass.execute(&mut pass_ctx),
            Phase::Stop => render_pass.stop(&mut pass_ctx),
        };

        result.map_err(|source| {
            log::error!(
                target: self.diagnostics.target(),
                "pass `{}` failed during {:?}: {}",
                node.name,
                phase,
                source
            );
            GraphError::Pass {
                pass: node.name.clone(),
                source: Box::new(source),
            }
        })
    }
}

fn resolve(outputs: &[Output], wires: &[Option<OutputId>], output: OutputId) -> Option<ResourceId> {
    let mut current = output;
    for _ in 0..=outputs.len() {
        match outputs.get(current.index())?.source {
            OutputSource::Source(resource) => return Some(resource),
            OutputSource::Relay(input) => current = wires.get(input.index()).copied().flatten()?,
        }
    }
    None
}

fn push_barrier(
    resources: &mut [Resource],
    id: ResourceId,
    after: ResourceState,
    ctx: &dyn GraphicsContext,
    barriers: &mut Vec<Barrier>,
    target: &str,
    pass: &str,
) {
    let resource = &mut resources[id.index()];
    if resource.state() == after {
        return;
    }

    let before = resource.transition_to(after);
    let handle = match resource.kind() {
        ResourceKind::BackBuffer => Some(NativeHandle::Texture(ctx.back_buffer())),
        _ => resource.handle(),
    };
    log::trace!(
        target: target,
        "barrier before `{}`: `{}` {} -> {}",
        pass,
        resource.name(),
        before,
        after
    );
    barriers.push(Barrier {
        resource: id,
        handle,
        before,
        after,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::dummy::{DummyContext, Event};
    use crate::render_graph::diagnostics::Diagnostics;
    use crate::render_graph::edge::InputId;
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Pass that records its lifecycle calls
    struct RecordingPass {
        log: Log,
        queue: QueueKind,
        inputs: Vec<(&'static str, ResourceState)>,
        outputs: Vec<(&'static str, ResourceState)>,
        relays: Vec<(&'static str, usize)>,
        input_ids: Vec<InputId>,
        output_ids: Vec<OutputId>,
        /// Executions left that fail before succeeding
        failures: usize,
        resize_dependent: bool,
    }

    impl RecordingPass {
        fn new(log: &Log) -> Self {
            Self {
                log: log.clone(),
                queue: QueueKind::Direct,
                inputs: Vec::new(),
                outputs: Vec::new(),
                relays: Vec::new(),
                input_ids: Vec::new(),
                output_ids: Vec::new(),
                failures: 0,
                resize_dependent: false,
            }
        }

        fn on(mut self, queue: QueueKind) -> Self {
            self.queue = queue;
            self
        }

        fn input(mut self, name: &'static str, state: ResourceState) -> Self {
            self.inputs.push((name, state));
            self
        }

        fn output(mut self, name: &'static str, state: ResourceState) -> Self {
            self.outputs.push((name, state));
            self
        }

        fn relay(mut self, name: &'static str, input: usize) -> Self {
            self.relays.push((name, input));
            self
        }
    }

    impl RenderPass for RecordingPass {
        fn queue(&self) -> QueueKind {
            self.queue
        }

        fn setup(&mut self, builder: &mut PassBuilder) {
            for (name, state) in &self.inputs {
                self.input_ids.push(builder.new_input(name, *state));
            }
            for (name, state) in &self.outputs {
                self.output_ids.push(builder.new_output(name, *state, None));
            }
            for (name, input) in &self.relays {
                self.output_ids
                    .push(builder.new_relay(name, self.input_ids[*input], None));
            }
        }

        fn start(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
            self.log.lock().push(format!("start {}", ctx.name()));
            Ok(())
        }

        fn execute(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
            for input in &self.input_ids {
                ctx.input(*input)?;
            }
            if self.failures > 0 {
                self.failures -= 1;
                return Err(GraphError::Backend(BackendError::DeviceLost));
            }
            self.log.lock().push(format!("execute {}", ctx.name()));
            Ok(())
        }

        fn stop(&mut self, ctx: &mut PassContext) -> GraphResult<()> {
            self.log.lock().push(format!("stop {}", ctx.name()));
            Ok(())
        }

        fn resize_dependent(&self) -> bool {
            self.resize_dependent
        }
    }

    const RT: ResourceState = ResourceState::RenderTarget;
    const PSR: ResourceState = ResourceState::PixelShaderResource;

    fn context() -> DummyContext {
        DummyContext::new(2, TextureSize::new(64, 64), TextureSize::new(64, 64))
    }

    fn transitions(barriers: &[Barrier]) -> Vec<(ResourceState, ResourceState)> {
        barriers.iter().map(|b| (b.before, b.after)).collect()
    }

    #[test]
    fn test_matching_states_need_no_barrier() {
        let log = Log::default();
        let mut graph = RenderGraph::new(Diagnostics::new("test"));
        graph
            .add_pass("a", RecordingPass::new(&log).output("out", RT))
            .unwrap();
        let b = graph
            .add_pass("b", RecordingPass::new(&log).input("in", RT))
            .unwrap();
        graph.link_by_name("b", "in", "a", "out").unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        let stats = graph.execute(&mut ctx, b).unwrap();
        assert!(stats.barriers.is_empty());
    }

    #[test]
    fn test_mismatched_states_insert_one_barrier() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        graph
            .add_pass("a", RecordingPass::new(&log).output("out", RT))
            .unwrap();
        let b = graph
            .add_pass("b", RecordingPass::new(&log).input("in", PSR))
            .unwrap();
        graph.link_by_name("b", "in", "a", "out").unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        let stats = graph.execute(&mut ctx, b).unwrap();
        assert_eq!(transitions(&stats.barriers), vec![(RT, PSR)]);

        // Next frame the owner reclaims its resource before producing it again
        let stats = graph.execute(&mut ctx, b).unwrap();
        assert_eq!(transitions(&stats.barriers), vec![(PSR, RT), (RT, PSR)]);
    }

    #[test]
    fn test_fan_out_transitions_once() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        graph
            .add_pass("a", RecordingPass::new(&log).output("out", RT))
            .unwrap();
        graph
            .add_pass("b", RecordingPass::new(&log).input("in", PSR).relay("out", 0))
            .unwrap();
        graph
            .add_pass("c", RecordingPass::new(&log).input("in", PSR).relay("out", 0))
            .unwrap();
        let root = graph
            .add_pass("root", RecordingPass::new(&log).input("b", PSR).input("c", PSR))
            .unwrap();
        graph.link_by_name("b", "in", "a", "out").unwrap();
        graph.link_by_name("c", "in", "a", "out").unwrap();
        graph.link_by_name("root", "b", "b", "out").unwrap();
        graph.link_by_name("root", "c", "c", "out").unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        let stats = graph.execute(&mut ctx, root).unwrap();
        assert_eq!(transitions(&stats.barriers), vec![(RT, PSR)]);
        assert_eq!(stats.executed.len(), 4);
    }

    #[test]
    fn test_relay_chain_barriers() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        graph
            .add_pass("a", RecordingPass::new(&log).output("out", RT))
            .unwrap();
        graph
            .add_pass("b", RecordingPass::new(&log).input("in", PSR).relay("out", 0))
            .unwrap();
        let c = graph
            .add_pass("c", RecordingPass::new(&log).input("in", RT))
            .unwrap();
        graph.link_by_name("b", "in", "a", "out").unwrap();
        graph.link_by_name("c", "in", "b", "out").unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        let stats = graph.execute(&mut ctx, c).unwrap();
        assert_eq!(transitions(&stats.barriers), vec![(RT, PSR), (PSR, RT)]);

        // The resource ends the frame in the owner's state, so no reclaim
        let stats = graph.execute(&mut ctx, c).unwrap();
        assert_eq!(transitions(&stats.barriers), vec![(RT, PSR), (PSR, RT)]);
    }

    #[test]
    fn test_copy_queue_submitted_and_drained_before_direct() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        graph
            .add_pass(
                "upload",
                RecordingPass::new(&log)
                    .on(QueueKind::Copy)
                    .output("data", ResourceState::CopyDest),
            )
            .unwrap();
        let draw = graph
            .add_pass("draw", RecordingPass::new(&log).input("data", PSR))
            .unwrap();
        graph.link_by_name("draw", "data", "upload", "data").unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        let stats = graph.execute(&mut ctx, draw).unwrap();
        assert_eq!(stats.submitted, vec![QueueKind::Copy, QueueKind::Direct]);

        let events: Vec<Event> = ctx
            .events()
            .iter()
            .copied()
            .filter(|event| !matches!(event, Event::BeginCommands(_)))
            .collect();
        assert_eq!(
            events,
            vec![
                Event::Submit(QueueKind::Copy),
                Event::WaitQueueIdle(QueueKind::Copy),
                Event::Submit(QueueKind::Direct),
                Event::Present,
            ]
        );
    }

    #[test]
    fn test_direct_only_frame_skips_copy_queue() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        let a = graph
            .add_pass("a", RecordingPass::new(&log).output("out", RT))
            .unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        graph.execute(&mut ctx, a).unwrap();
        assert_eq!(
            ctx.events(),
            &[
                Event::BeginCommands(QueueKind::Direct),
                Event::Submit(QueueKind::Direct),
                Event::Present,
            ]
        );
    }

    #[test]
    fn test_execute_requires_started_passes() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        let a = graph
            .add_pass("a", RecordingPass::new(&log).output("out", RT))
            .unwrap();

        let mut ctx = context();
        assert!(matches!(
            graph.execute(&mut ctx, a),
            Err(GraphError::PassNotStarted(_))
        ));
    }

    #[test]
    fn test_pass_error_propagates_without_present() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        let mut failing = RecordingPass::new(&log).output("out", RT);
        failing.failures = 1;
        let a = graph.add_pass("a", failing).unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        match graph.execute(&mut ctx, a) {
            Err(GraphError::Pass { pass, source }) => {
                assert_eq!(pass, "a");
                assert!(matches!(*source, GraphError::Backend(BackendError::DeviceLost)));
            }
            other => panic!("unexpected result: {:?}", other.map(|s| s.frame)),
        }
        assert_eq!(ctx.presented(), 0);
        assert!(graph.last_frame().is_none());
    }

    #[test]
    fn test_failed_frame_rolls_back_tracked_states() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        graph
            .add_pass("a", RecordingPass::new(&log).output("out", RT))
            .unwrap();
        let mut consumer = RecordingPass::new(&log).input("in", PSR);
        consumer.failures = 1;
        let b = graph.add_pass("b", consumer).unwrap();
        graph.link_by_name("b", "in", "a", "out").unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        assert!(graph.execute(&mut ctx, b).is_err());
        assert!(ctx.submissions().is_empty());

        // The discarded barrier is recorded again from the real state
        let stats = graph.execute(&mut ctx, b).unwrap();
        assert_eq!(stats.frame, 0);
        assert_eq!(transitions(&stats.barriers), vec![(RT, PSR)]);
        assert_eq!(transitions(&ctx.submitted_barriers()), vec![(RT, PSR)]);

        let stats = graph.execute(&mut ctx, b).unwrap();
        assert_eq!(transitions(&stats.barriers), vec![(PSR, RT), (RT, PSR)]);
    }

    #[test]
    fn test_failure_after_copy_work_rolls_back_both_queues() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        graph
            .add_pass(
                "upload",
                RecordingPass::new(&log)
                    .on(QueueKind::Copy)
                    .output("data", ResourceState::CopyDest),
            )
            .unwrap();
        let mut draw = RecordingPass::new(&log).input("data", PSR);
        draw.failures = 2;
        let draw = graph.add_pass("draw", draw).unwrap();
        graph.link_by_name("draw", "data", "upload", "data").unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        assert!(graph.execute(&mut ctx, draw).is_err());
        assert!(graph.execute(&mut ctx, draw).is_err());

        let stats = graph.execute(&mut ctx, draw).unwrap();
        assert_eq!(
            transitions(&stats.barriers),
            vec![(ResourceState::CopyDest, PSR)]
        );
        assert_eq!(ctx.presented(), 1);
    }

    #[test]
    fn test_lifecycle_runs_once_and_resize_restarts_dependents() {
        let log = Log::default();
        let mut graph = RenderGraph::default();
        graph
            .add_pass("a", RecordingPass::new(&log).output("out", RT))
            .unwrap();
        let mut dependent = RecordingPass::new(&log).input("in", PSR);
        dependent.resize_dependent = true;
        let b = graph.add_pass("b", dependent).unwrap();
        graph.link_by_name("b", "in", "a", "out").unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        graph.start(&mut ctx).unwrap();
        graph.execute(&mut ctx, b).unwrap();
        graph.resize(&mut ctx).unwrap();
        graph.stop(&mut ctx).unwrap();
        graph.stop(&mut ctx).unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "start a", "start b", "execute a", "execute b", "stop b", "start b", "stop b",
                "stop a",
            ]
        );
    }

    #[test]
    fn test_back_buffer_barrier_targets_current_image() {
        struct Swapchain;

        impl RenderPass for Swapchain {
            fn setup(&mut self, builder: &mut PassBuilder) {
                let image = builder.add_resource("image", ResourceKind::BackBuffer);
                builder.new_output("image", ResourceState::Present, Some(image));
            }

            fn execute(&mut self, _ctx: &mut PassContext) -> GraphResult<()> {
                Ok(())
            }
        }

        let log = Log::default();
        let mut graph = RenderGraph::default();
        graph.add_pass("swapchain", Swapchain).unwrap();
        let draw = graph
            .add_pass("draw", RecordingPass::new(&log).input("image", RT))
            .unwrap();
        graph
            .link_by_name("draw", "image", "swapchain", "image")
            .unwrap();

        let mut ctx = context();
        graph.start(&mut ctx).unwrap();
        let expected = ctx.back_buffer();
        let stats = graph.execute(&mut ctx, draw).unwrap();
        assert_eq!(
            stats.barriers[0].handle,
            Some(NativeHandle::Texture(expected))
        );

        let expected = ctx.back_buffer();
        let stats = graph.execute(&mut ctx, draw).unwrap();
        assert_eq!(
            transitions(&stats.barriers),
            vec![(RT, ResourceState::Present), (ResourceState::Present, RT)]
        );
        assert_eq!(
            stats.barriers[1].handle,
            Some(NativeHandle::Texture(expected))
        );
    }
}
