//! Nodes: the units of work in a render graph

use crate::backend::BackendError;
use crate::render_graph::context::{InputSlotError, RenderContext, RenderGraphContext};
use crate::render_graph::label::{GraphLabel, NodeLabel};
use crate::render_graph::slot::{SlotInfo, SlotInfos, SlotValue};
use bevy_ecs::world::World;
use slotmap::new_key_type;
use thiserror::Error;

new_key_type! {
    /// Arena handle of a node inside one [`RenderGraph`](crate::render_graph::RenderGraph).
    pub struct NodeId;
}

/// Failure of a single node run. Aborts the rest of the traversal.
#[derive(Error, Debug)]
pub enum NodeRunError {
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("input slot error: {0}")]
    InputSlot(#[from] InputSlotError),
    #[error("{0}")]
    Custom(String),
}

/// A unit of GPU-encoding work with declared typed inputs and outputs.
///
/// Slot declarations are read once, when the node is added to a graph.
pub trait Node: Send + Sync + 'static {
    /// Input slots, in the order their values are handed to [`Node::run`].
    fn input(&self) -> Vec<SlotInfo> {
        Vec::new()
    }

    /// Output slots. [`Node::run`] must return exactly one value per slot,
    /// in this order.
    fn output(&self) -> Vec<SlotInfo> {
        Vec::new()
    }

    /// Called once per frame for every node of the graph and its sub-graphs,
    /// before traversal begins.
    fn update(&mut self, _world: &World) {}

    /// Encode this node's work.
    ///
    /// Sub-graph runs requested through
    /// [`RenderGraphContext::run_sub_graph`] start once this returns.
    fn run(
        &self,
        graph: &mut RenderGraphContext,
        render_context: &mut RenderContext,
    ) -> Result<Vec<SlotValue>, NodeRunError>;
}

/// A dependency between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Output slot `output_index` of `output_node` feeds input slot
    /// `input_index` of `input_node`.
    SlotEdge {
        output_node: NodeId,
        output_index: usize,
        input_node: NodeId,
        input_index: usize,
    },
    /// `input_node` runs after `output_node`; no value flows.
    NodeEdge {
        output_node: NodeId,
        input_node: NodeId,
    },
}

impl Edge {
    pub fn output_node(&self) -> NodeId {
        match self {
            Edge::SlotEdge { output_node, .. } | Edge::NodeEdge { output_node, .. } => {
                *output_node
            }
        }
    }

    pub fn input_node(&self) -> NodeId {
        match self {
            Edge::SlotEdge { input_node, .. } | Edge::NodeEdge { input_node, .. } => *input_node,
        }
    }
}

/// Graph-internal record of a node: the node itself, its cached slot
/// declarations and the edges on both sides.
pub struct NodeState {
    pub label: NodeLabel,
    pub node: Box<dyn Node>,
    pub input_slots: SlotInfos,
    pub output_slots: SlotInfos,
    pub(crate) input_edges: Vec<Edge>,
    pub(crate) output_edges: Vec<Edge>,
}

impl NodeState {
    pub fn new<T: Node>(label: NodeLabel, node: T) -> Self {
        Self::from_boxed(label, Box::new(node))
    }

    pub fn from_boxed(label: NodeLabel, node: Box<dyn Node>) -> Self {
        Self {
            label,
            input_slots: node.input().into(),
            output_slots: node.output().into(),
            node,
            input_edges: Vec::new(),
            output_edges: Vec::new(),
        }
    }

    pub fn input_edges(&self) -> &[Edge] {
        &self.input_edges
    }

    pub fn output_edges(&self) -> &[Edge] {
        &self.output_edges
    }

    /// The slot edge feeding input slot `index`, if any.
    pub fn input_slot_edge(&self, index: usize) -> Option<&Edge> {
        self.input_edges.iter().find(|edge| {
            matches!(edge, Edge::SlotEdge { input_index, .. } if *input_index == index)
        })
    }

    pub fn has_input_edge(&self, edge: &Edge) -> bool {
        self.input_edges.contains(edge)
    }

    pub fn has_output_edge(&self, edge: &Edge) -> bool {
        self.output_edges.contains(edge)
    }

    pub(crate) fn remove_input_edge(&mut self, edge: &Edge) -> bool {
        let before = self.input_edges.len();
        self.input_edges.retain(|e| e != edge);
        self.input_edges.len() != before
    }

    pub(crate) fn remove_output_edge(&mut self, edge: &Edge) -> bool {
        let before = self.output_edges.len();
        self.output_edges.retain(|e| e != edge);
        self.output_edges.len() != before
    }
}

impl std::fmt::Debug for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeState")
            .field("label", &self.label)
            .field("input_slots", &self.input_slots)
            .field("output_slots", &self.output_slots)
            .field("input_edges", &self.input_edges.len())
            .field("output_edges", &self.output_edges.len())
            .finish()
    }
}

/// Pass-through node that exposes a graph's per-frame inputs as outputs.
///
/// The executor records the supplied inputs as this node's output directly;
/// [`Node::run`] is only reached when the node is used outside an entry role.
#[derive(Debug, Clone)]
pub struct GraphEntryNode {
    inputs: Vec<SlotInfo>,
}

impl GraphEntryNode {
    pub const LABEL: NodeLabel = NodeLabel::new("_graph_entry");

    pub fn new(inputs: Vec<SlotInfo>) -> Self {
        Self { inputs }
    }
}

impl Node for GraphEntryNode {
    fn input(&self) -> Vec<SlotInfo> {
        self.inputs.clone()
    }

    fn output(&self) -> Vec<SlotInfo> {
        self.inputs.clone()
    }

    fn run(
        &self,
        graph: &mut RenderGraphContext,
        _render_context: &mut RenderContext,
    ) -> Result<Vec<SlotValue>, NodeRunError> {
        if graph.inputs().len() != self.inputs.len() {
            return Err(NodeRunError::Custom(format!(
                "graph entry expects {} connected inputs, got {}",
                self.inputs.len(),
                graph.inputs().len()
            )));
        }
        Ok(graph.inputs().to_vec())
    }
}

/// A node that does nothing. Useful as an ordering anchor.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyNode;

impl Node for EmptyNode {
    fn run(
        &self,
        _graph: &mut RenderGraphContext,
        _render_context: &mut RenderContext,
    ) -> Result<Vec<SlotValue>, NodeRunError> {
        Ok(Vec::new())
    }
}

/// Forwards its inputs and the current view to a sub-graph.
#[derive(Debug, Clone)]
pub struct RunSubGraphNode {
    sub_graph: GraphLabel,
    inputs: Vec<SlotInfo>,
}

impl RunSubGraphNode {
    pub fn new(sub_graph: impl Into<GraphLabel>, inputs: Vec<SlotInfo>) -> Self {
        Self {
            sub_graph: sub_graph.into(),
            inputs,
        }
    }
}

impl Node for RunSubGraphNode {
    fn input(&self) -> Vec<SlotInfo> {
        self.inputs.clone()
    }

    fn run(
        &self,
        graph: &mut RenderGraphContext,
        _render_context: &mut RenderContext,
    ) -> Result<Vec<SlotValue>, NodeRunError> {
        let inputs = graph.inputs().to_vec();
        let view_entity = graph.view_entity();
        // Rejections are logged by the context and leave this node's output intact.
        let _ = graph.run_sub_graph(self.sub_graph.clone(), inputs, view_entity);
        Ok(Vec::new())
    }
}
