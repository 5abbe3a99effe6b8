//! Common utilities for render graph integration tests.
//!
//! [`RecordingNode`] logs every invocation (its inputs and view) into a
//! shared [`TestLog`] and marks the frame's command buffer with its name,
//! so tests can check execution order from both sides.

#![allow(dead_code)]

use std::sync::Arc;

use bevy_ecs::entity::Entity;
use parking_lot::Mutex;
use redlilium_render_graph::backend::{
    BufferDescriptor, BufferHandle, BufferUsage, DummyRenderDevice, RenderDevice, TextureDescriptor,
    TextureHandle,
};
use redlilium_render_graph::render_graph::{
    GraphLabel, Node, NodeRunError, RenderContext, RenderGraphContext, RenderResource,
    RenderResourceKind, RunSubGraphError, SlotInfo, SlotLabel, SlotValue,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn dummy_device() -> Arc<DummyRenderDevice> {
    Arc::new(DummyRenderDevice::new())
}

pub fn texture(device: &DummyRenderDevice) -> TextureHandle {
    device
        .create_texture(&TextureDescriptor::default())
        .expect("dummy texture")
}

pub fn buffer(device: &DummyRenderDevice) -> BufferHandle {
    device
        .create_buffer(&BufferDescriptor::new("test", 64, BufferUsage::UNIFORM))
        .expect("dummy buffer")
}

/// One recorded node run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub node: String,
    pub inputs: Vec<SlotValue>,
    pub view: Option<Entity>,
}

/// Invocations and rejected sub-graph requests, shared by every node of a
/// test.
#[derive(Debug, Clone, Default)]
pub struct TestLog {
    invocations: Arc<Mutex<Vec<Invocation>>>,
    rejected: Arc<Mutex<Vec<RunSubGraphError>>>,
}

impl TestLog {
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }

    /// Node names in invocation order.
    pub fn order(&self) -> Vec<String> {
        self.invocations
            .lock()
            .iter()
            .map(|invocation| invocation.node.clone())
            .collect()
    }

    pub fn invocation(&self, node: &str) -> Option<Invocation> {
        self.invocations
            .lock()
            .iter()
            .find(|invocation| invocation.node == node)
            .cloned()
    }

    pub fn position(&self, node: &str) -> Option<usize> {
        self.order().iter().position(|name| name == node)
    }

    pub fn rejected(&self) -> Vec<RunSubGraphError> {
        self.rejected.lock().clone()
    }

    pub fn clear(&self) {
        self.invocations.lock().clear();
        self.rejected.lock().clear();
    }
}

struct SubGraphRequest {
    name: GraphLabel,
    inputs: Vec<SlotValue>,
    view: Option<Entity>,
}

/// A node that records its invocations.
pub struct RecordingNode {
    name: String,
    inputs: Vec<SlotInfo>,
    outputs: Vec<SlotValue>,
    requests: Vec<SubGraphRequest>,
    log: TestLog,
}

impl RecordingNode {
    pub fn new(name: impl Into<String>, log: &TestLog) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            requests: Vec::new(),
            log: log.clone(),
        }
    }

    pub fn with_input(mut self, name: &'static str, kind: RenderResourceKind) -> Self {
        self.inputs.push(SlotInfo::new(name, kind));
        self
    }

    /// Declare an output slot that always produces `value`.
    pub fn with_output(mut self, name: &'static str, value: impl Into<RenderResource>) -> Self {
        self.outputs.push(SlotValue::new(name, value));
        self
    }

    /// Request a sub-graph run every time this node runs.
    pub fn requesting(
        mut self,
        sub_graph: &'static str,
        inputs: Vec<SlotValue>,
        view: Option<Entity>,
    ) -> Self {
        self.requests.push(SubGraphRequest {
            name: sub_graph.into(),
            inputs,
            view,
        });
        self
    }
}

impl Node for RecordingNode {
    fn input(&self) -> Vec<SlotInfo> {
        self.inputs.clone()
    }

    fn output(&self) -> Vec<SlotInfo> {
        self.outputs
            .iter()
            .map(|value| SlotInfo::new(value.name.clone(), value.kind()))
            .collect()
    }

    fn run(
        &self,
        graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
    ) -> Result<Vec<SlotValue>, NodeRunError> {
        self.log.invocations.lock().push(Invocation {
            node: self.name.clone(),
            inputs: graph.inputs().to_vec(),
            view: graph.view_entity(),
        });
        render_context.command_buffer().insert_debug_marker(&self.name);

        for request in &self.requests {
            if let Err(error) =
                graph.run_sub_graph(request.name.clone(), request.inputs.clone(), request.view)
            {
                self.log.rejected.lock().push(error);
            }
        }

        Ok(self.outputs.clone())
    }
}

/// Slot label shorthand.
pub fn slot(name: &'static str) -> SlotLabel {
    SlotLabel::new(name)
}
