//! Per-invocation state handed to a node, and the shared render context

use crate::backend::{
    BackendResult, BufferHandle, CommandBuffer, CommandQueue, RenderDevice, SamplerHandle,
    TextureHandle,
};
use crate::render_graph::graph::RenderGraph;
use crate::render_graph::label::{GraphLabel, NodeLabel, SlotLabel};
use crate::render_graph::node::NodeState;
use crate::render_graph::resource::{RenderResource, RenderResourceKind};
use crate::render_graph::slot::{SlotInfos, SlotMismatch, SlotValue};
use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;
use std::sync::Arc;
use thiserror::Error;

/// A sub-graph run requested by a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSubGraph {
    pub name: GraphLabel,
    pub inputs: Vec<SlotValue>,
    pub view_entity: Option<Entity>,
}

/// Why a sub-graph run request was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunSubGraphError {
    #[error("attempted to run sub-graph {0}, but it does not exist")]
    MissingSubGraph(GraphLabel),
    #[error("attempted to pass inputs to sub-graph {0}, which has no entry node")]
    SubGraphHasNoInputs(GraphLabel),
    #[error("sub-graph {graph_name} is missing input {slot_name} (index {slot_index})")]
    MissingInput {
        slot_index: usize,
        slot_name: SlotLabel,
        graph_name: GraphLabel,
    },
    #[error("sub-graph {graph_name} takes {expected} inputs, {actual} were passed")]
    UnexpectedInputs {
        graph_name: GraphLabel,
        expected: usize,
        actual: usize,
    },
    #[error("sub-graph {graph_name} input {slot_name} (index {slot_index}) expects {expected}, got {actual}")]
    MismatchedInputSlotType {
        graph_name: GraphLabel,
        slot_index: usize,
        slot_name: SlotLabel,
        expected: RenderResourceKind,
        actual: RenderResourceKind,
    },
}

/// Failed input lookup by slot name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputSlotError {
    #[error("node has no input slot named {0}")]
    InvalidSlot(SlotLabel),
    #[error("input slot {0} is not connected")]
    Unconnected(SlotLabel),
    #[error("input slot {label} holds a {actual}, expected {expected}")]
    MismatchedSlotType {
        label: SlotLabel,
        expected: RenderResourceKind,
        actual: RenderResourceKind,
    },
}

/// State of one node invocation: its resolved inputs, the world, the view
/// it runs for, and the sub-graph runs it requested.
pub struct RenderGraphContext<'a> {
    graph: &'a RenderGraph,
    node: &'a NodeState,
    inputs: Vec<SlotValue>,
    // Declared input slot index of each entry in `inputs`, ascending
    input_indices: Vec<usize>,
    world: &'a World,
    view_entity: Option<Entity>,
    run_sub_graphs: Vec<RunSubGraph>,
}

impl<'a> RenderGraphContext<'a> {
    /// `inputs` must be sorted by their declared slot index, given in
    /// `input_indices`.
    pub(crate) fn new(
        graph: &'a RenderGraph,
        node: &'a NodeState,
        inputs: Vec<SlotValue>,
        input_indices: Vec<usize>,
        world: &'a World,
        view_entity: Option<Entity>,
    ) -> Self {
        Self {
            graph,
            node,
            inputs,
            input_indices,
            world,
            view_entity,
            run_sub_graphs: Vec::new(),
        }
    }

    /// The graph being traversed.
    pub fn graph(&self) -> &RenderGraph {
        self.graph
    }

    pub fn node_label(&self) -> &NodeLabel {
        &self.node.label
    }

    pub fn world(&self) -> &'a World {
        self.world
    }

    /// The view this invocation renders for, inherited from the sub-graph
    /// run it belongs to.
    pub fn view_entity(&self) -> Option<Entity> {
        self.view_entity
    }

    /// Resolved values of the connected input slots, in declared order.
    pub fn inputs(&self) -> &[SlotValue] {
        &self.inputs
    }

    pub fn input_info(&self) -> &SlotInfos {
        &self.node.input_slots
    }

    /// Value of the input slot with the given name.
    pub fn get_input(
        &self,
        label: impl Into<SlotLabel>,
    ) -> Result<&RenderResource, InputSlotError> {
        let label = label.into();
        let index = self
            .node
            .input_slots
            .index_of(&label)
            .ok_or_else(|| InputSlotError::InvalidSlot(label.clone()))?;
        self.input_indices
            .binary_search(&index)
            .map(|position| &self.inputs[position].value)
            .map_err(|_| InputSlotError::Unconnected(label))
    }

    /// Like [`get_input`](Self::get_input), but fails unless the value has
    /// the given kind.
    pub fn get_input_of_kind(
        &self,
        label: impl Into<SlotLabel>,
        expected: RenderResourceKind,
    ) -> Result<&RenderResource, InputSlotError> {
        let label = label.into();
        let value = self.get_input(label.clone())?;
        if value.kind() != expected {
            return Err(InputSlotError::MismatchedSlotType {
                label,
                expected,
                actual: value.kind(),
            });
        }
        Ok(value)
    }

    pub fn get_input_texture(&self, label: impl Into<SlotLabel>) -> Option<TextureHandle> {
        self.get_input(label).ok().and_then(RenderResource::texture)
    }

    pub fn get_input_buffer(&self, label: impl Into<SlotLabel>) -> Option<BufferHandle> {
        self.get_input(label).ok().and_then(RenderResource::buffer)
    }

    pub fn get_input_sampler(&self, label: impl Into<SlotLabel>) -> Option<SamplerHandle> {
        self.get_input(label).ok().and_then(RenderResource::sampler)
    }

    pub fn get_input_entity(&self, label: impl Into<SlotLabel>) -> Option<Entity> {
        self.get_input(label).ok().and_then(RenderResource::entity)
    }

    /// Queue a run of the named sub-graph. It runs after this node returns,
    /// before any node that depends on this one.
    ///
    /// `inputs` are checked against the sub-graph's entry node. A rejected
    /// request is logged and dropped; this node keeps running.
    pub fn run_sub_graph(
        &mut self,
        name: impl Into<GraphLabel>,
        inputs: Vec<SlotValue>,
        view_entity: Option<Entity>,
    ) -> Result<(), RunSubGraphError> {
        let name = name.into();
        if let Err(error) = self.validate_sub_graph_run(&name, &inputs) {
            log::error!(
                "[Validation Error] node {} requested sub-graph run: {}",
                self.node.label,
                error
            );
            return Err(error);
        }

        self.run_sub_graphs.push(RunSubGraph {
            name,
            inputs,
            view_entity,
        });
        Ok(())
    }

    fn validate_sub_graph_run(
        &self,
        name: &GraphLabel,
        inputs: &[SlotValue],
    ) -> Result<(), RunSubGraphError> {
        let sub_graph = self
            .graph
            .get_sub_graph(name)
            .ok_or_else(|| RunSubGraphError::MissingSubGraph(name.clone()))?;

        let Some(entry) = sub_graph.entry_node() else {
            if inputs.is_empty() {
                return Ok(());
            }
            return Err(RunSubGraphError::SubGraphHasNoInputs(name.clone()));
        };

        entry
            .input_slots
            .check_values(inputs)
            .map_err(|mismatch| match mismatch {
                SlotMismatch::Missing {
                    index,
                    name: slot_name,
                } => RunSubGraphError::MissingInput {
                    slot_index: index,
                    slot_name,
                    graph_name: name.clone(),
                },
                SlotMismatch::Kind {
                    index,
                    name: slot_name,
                    expected,
                    actual,
                } => RunSubGraphError::MismatchedInputSlotType {
                    graph_name: name.clone(),
                    slot_index: index,
                    slot_name,
                    expected,
                    actual,
                },
                SlotMismatch::Extra { expected, actual } => RunSubGraphError::UnexpectedInputs {
                    graph_name: name.clone(),
                    expected,
                    actual,
                },
            })
    }

    /// Sub-graph runs requested so far, in request order.
    pub fn pending_sub_graphs(&self) -> &[RunSubGraph] {
        &self.run_sub_graphs
    }

    pub(crate) fn finish(self) -> Vec<RunSubGraph> {
        self.run_sub_graphs
    }
}

/// GPU-side state shared by every node of a frame: the device, the queue
/// and one lazily created command buffer.
pub struct RenderContext {
    device: Arc<dyn RenderDevice>,
    command_queue: Arc<dyn CommandQueue>,
    command_buffer: Option<Box<dyn CommandBuffer>>,
    command_buffer_label: Option<String>,
}

impl RenderContext {
    /// Create a context with a fresh queue from `device`.
    pub fn new(device: Arc<dyn RenderDevice>) -> Self {
        let command_queue = device.create_command_queue();
        Self::with_queue(device, command_queue)
    }

    pub fn with_queue(device: Arc<dyn RenderDevice>, command_queue: Arc<dyn CommandQueue>) -> Self {
        Self {
            device,
            command_queue,
            command_buffer: None,
            command_buffer_label: None,
        }
    }

    /// Label given to the shared command buffer when it is created.
    pub fn set_command_buffer_label(&mut self, label: Option<String>) {
        self.command_buffer_label = label;
    }

    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    pub fn command_queue(&self) -> &Arc<dyn CommandQueue> {
        &self.command_queue
    }

    /// The shared command buffer, created on first use.
    pub fn command_buffer(&mut self) -> &mut dyn CommandBuffer {
        let queue = &self.command_queue;
        let label = self.command_buffer_label.as_deref();
        &mut **self
            .command_buffer
            .get_or_insert_with(|| queue.make_command_buffer(label))
    }

    pub fn has_command_buffer(&self) -> bool {
        self.command_buffer.is_some()
    }

    /// Commit the shared command buffer, if one was created. Returns whether
    /// anything was submitted.
    pub fn finish(&mut self) -> BackendResult<bool> {
        match self.command_buffer.take() {
            Some(command_buffer) => {
                command_buffer.commit()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
