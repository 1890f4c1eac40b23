//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use render_graph_engine::backend::{DummyContext, QueueKind, ResourceState, TextureSize};
use render_graph_engine::render_graph::{
    GraphResult, InputId, PassBuilder, PassContext, RenderPass,
};

pub const SCENE_SIZE: TextureSize = TextureSize {
    width: 64,
    height: 64,
};

pub const WINDOW_SIZE: TextureSize = TextureSize {
    width: 128,
    height: 64,
};

/// Route log output through the test harness
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn context(frames: usize) -> DummyContext {
    DummyContext::new(frames, SCENE_SIZE, WINDOW_SIZE)
}

/// Names of executed passes, shared between passes of one graph
pub type ExecutionLog = Arc<Mutex<Vec<String>>>;

/// Pass built from edge tables that records when it executes
pub struct TestPass {
    label: String,
    queue: QueueKind,
    inputs: Vec<(&'static str, ResourceState)>,
    outputs: Vec<(&'static str, ResourceState)>,
    relays: Vec<(&'static str, &'static str, Option<ResourceState>)>,
    log: ExecutionLog,
}

impl TestPass {
    pub fn new(label: &str, log: &ExecutionLog) -> Self {
        Self {
            label: label.to_string(),
            queue: QueueKind::Direct,
            inputs: Vec::new(),
            outputs: Vec::new(),
            relays: Vec::new(),
            log: Arc::clone(log),
        }
    }

    pub fn on_queue(mut self, queue: QueueKind) -> Self {
        self.queue = queue;
        self
    }

    pub fn input(mut self, name: &'static str, state: ResourceState) -> Self {
        self.inputs.push((name, state));
        self
    }

    pub fn output(mut self, name: &'static str, state: ResourceState) -> Self {
        self.outputs.push((name, state));
        self
    }

    /// Forward the input called `input` as output `name`
    pub fn relay(mut self, name: &'static str, input: &'static str) -> Self {
        self.relays.push((name, input, None));
        self
    }

    /// Forward an input, handing it on in `state`
    pub fn relay_as(
        mut self,
        name: &'static str,
        input: &'static str,
        state: ResourceState,
    ) -> Self {
        self.relays.push((name, input, Some(state)));
        self
    }
}

impl RenderPass for TestPass {
    fn queue(&self) -> QueueKind {
        self.queue
    }

    fn setup(&mut self, builder: &mut PassBuilder) {
        let inputs: Vec<(&str, InputId)> = self
            .inputs
            .iter()
            .map(|(name, state)| (*name, builder.new_input(name, *state)))
            .collect();
        for (name, state) in &self.outputs {
            builder.new_output(name, *state, None);
        }
        for (name, input, state) in &self.relays {
            if let Some((_, id)) = inputs.iter().find(|(candidate, _)| candidate == input) {
                builder.new_relay(name, *id, *state);
            }
        }
    }

    fn execute(&mut self, _ctx: &mut PassContext) -> GraphResult<()> {
        self.log.lock().push(self.label.clone());
        Ok(())
    }
}

/// Minimal glTF document: one indexed-on-import quad under a translated root
pub const QUAD_GLTF: &str = r#"{
    "asset": { "version": "2.0" },
    "scene": 0,
    "scenes": [{ "nodes": [0] }],
    "nodes": [
        { "name": "root", "children": [1], "translation": [1.0, 2.0, 3.0] },
        { "name": "quad", "mesh": 0 }
    ],
    "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }],
    "accessors": [{
        "bufferView": 0,
        "componentType": 5126,
        "count": 6,
        "type": "VEC3",
        "min": [0.0, 0.0, 0.0],
        "max": [1.0, 1.0, 0.0]
    }],
    "bufferViews": [{ "buffer": 0, "byteLength": 72 }],
    "buffers": [{
        "byteLength": 72,
        "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAACAPwAAAAAAAAAAAACAPwAAgD8AAAAAAAAAAAAAgD8AAAAA"
    }]
}"#;
