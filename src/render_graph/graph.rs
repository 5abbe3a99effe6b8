//! Render graph definition and validation
//!
//! A [`RenderGraph`] holds nodes in an arena, the slot and ordering edges
//! between them, an optional entry node and named sub-graphs. Every edge is
//! validated when it is added, so traversal never re-checks slot kinds.

use crate::render_graph::label::{GraphLabel, NodeLabel, SlotLabel};
use crate::render_graph::node::{Edge, GraphEntryNode, Node, NodeId, NodeState};
use crate::render_graph::resource::RenderResourceKind;
use crate::render_graph::slot::SlotInfo;
use bevy_ecs::world::World;
use slotmap::{SecondaryMap, SlotMap};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use thiserror::Error;

/// Build-time validation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderGraphError {
    #[error("node {0} does not exist")]
    InvalidNode(NodeLabel),
    #[error("node {node} has no output slot {slot}")]
    InvalidOutputNodeSlot { node: NodeLabel, slot: SlotLabel },
    #[error("node {node} has no input slot {slot}")]
    InvalidInputNodeSlot { node: NodeLabel, slot: SlotLabel },
    #[error("input slot {input_slot} of node {input_node} is already connected to {occupied_by}")]
    NodeInputSlotAlreadyOccupied {
        input_node: NodeLabel,
        input_slot: SlotLabel,
        occupied_by: NodeLabel,
    },
    #[error("cannot connect {output_node}.{output_slot} ({output_kind}) to {input_node}.{input_slot} ({input_kind})")]
    MismatchedNodeSlots {
        output_node: NodeLabel,
        output_slot: SlotLabel,
        output_kind: RenderResourceKind,
        input_node: NodeLabel,
        input_slot: SlotLabel,
        input_kind: RenderResourceKind,
    },
    #[error("edge from {output_node} to {input_node} already exists")]
    EdgeAlreadyExists {
        output_node: NodeLabel,
        input_node: NodeLabel,
    },
    #[error("graph contains a cycle through {nodes:?}")]
    CyclicGraph { nodes: Vec<NodeLabel> },
}

/// The static topology of one render pipeline.
#[derive(Default)]
pub struct RenderGraph {
    label: Option<String>,
    nodes: SlotMap<NodeId, NodeState>,
    node_ids: HashMap<NodeLabel, NodeId>,
    sub_graphs: HashMap<GraphLabel, RenderGraph>,
    entry_node: Option<NodeId>,
}

impl RenderGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Add a node under `label`.
    ///
    /// An existing node with the same label is removed first, together with
    /// every edge that references it. Edges are not migrated to the new node.
    pub fn add_node<T: Node>(&mut self, label: impl Into<NodeLabel>, node: T) -> NodeId {
        self.add_boxed_node(label, Box::new(node))
    }

    pub fn add_boxed_node(&mut self, label: impl Into<NodeLabel>, node: Box<dyn Node>) -> NodeId {
        let label = label.into();
        if self.node_ids.contains_key(&label) {
            log::warn!(
                "Node {} already exists in graph {}, replacing it and dropping its edges",
                label,
                self.display_name()
            );
            self.remove_node(label.clone());
        }

        let id = self.nodes.insert(NodeState::from_boxed(label.clone(), node));
        self.node_ids.insert(label, id);
        id
    }

    /// Add the pass-through node that injects per-frame inputs, replacing
    /// any previous entry node. Returns its label.
    pub fn add_entry_node(&mut self, inputs: Vec<SlotInfo>) -> NodeLabel {
        let previous = self.entry_node().map(|entry| entry.label.clone());
        if let Some(previous) = previous {
            log::warn!(
                "Graph {} already has an entry node, replacing it",
                self.display_name()
            );
            self.remove_node(previous);
        }

        let id = self.add_node(GraphEntryNode::LABEL, GraphEntryNode::new(inputs));
        self.entry_node = Some(id);
        GraphEntryNode::LABEL
    }

    pub fn entry_node(&self) -> Option<&NodeState> {
        self.entry_node.and_then(|id| self.nodes.get(id))
    }

    pub fn entry_node_id(&self) -> Option<NodeId> {
        self.entry_node
    }

    /// Remove a node and every edge that references it. Returns whether the
    /// node was present.
    pub fn remove_node(&mut self, label: impl Into<NodeLabel>) -> bool {
        let label = label.into();
        let Some(id) = self.node_ids.remove(&label) else {
            return false;
        };
        let Some(state) = self.nodes.remove(id) else {
            return false;
        };

        for edge in &state.input_edges {
            if let Some(producer) = self.nodes.get_mut(edge.output_node()) {
                producer.remove_output_edge(edge);
            }
        }
        for edge in &state.output_edges {
            if let Some(consumer) = self.nodes.get_mut(edge.input_node()) {
                consumer.remove_input_edge(edge);
            }
        }

        if self.entry_node == Some(id) {
            self.entry_node = None;
        }
        true
    }

    pub fn get_node_id(&self, label: impl Into<NodeLabel>) -> Result<NodeId, RenderGraphError> {
        let label = label.into();
        self.node_ids
            .get(&label)
            .copied()
            .ok_or(RenderGraphError::InvalidNode(label))
    }

    pub fn get_node_state(
        &self,
        label: impl Into<NodeLabel>,
    ) -> Result<&NodeState, RenderGraphError> {
        let label = label.into();
        self.node_ids
            .get(&label)
            .and_then(|id| self.nodes.get(*id))
            .ok_or(RenderGraphError::InvalidNode(label))
    }

    pub fn get_node_state_mut(
        &mut self,
        label: impl Into<NodeLabel>,
    ) -> Result<&mut NodeState, RenderGraphError> {
        let label = label.into();
        match self.node_ids.get(&label) {
            Some(id) => self
                .nodes
                .get_mut(*id)
                .ok_or(RenderGraphError::InvalidNode(label)),
            None => Err(RenderGraphError::InvalidNode(label)),
        }
    }

    /// Node state by arena handle.
    pub fn node_state(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(id)
    }

    pub fn contains_node(&self, label: impl Into<NodeLabel>) -> bool {
        let label: NodeLabel = label.into();
        self.node_ids.contains_key(&label)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter_nodes(&self) -> impl Iterator<Item = &NodeState> {
        self.nodes.values()
    }

    pub fn iter_nodes_mut(&mut self) -> impl Iterator<Item = &mut NodeState> {
        self.nodes.values_mut()
    }

    pub(crate) fn iter_node_ids(&self) -> impl Iterator<Item = (NodeId, &NodeState)> {
        self.nodes.iter()
    }

    pub fn input_edges(&self, label: impl Into<NodeLabel>) -> Result<&[Edge], RenderGraphError> {
        Ok(self.get_node_state(label)?.input_edges())
    }

    pub fn output_edges(&self, label: impl Into<NodeLabel>) -> Result<&[Edge], RenderGraphError> {
        Ok(self.get_node_state(label)?.output_edges())
    }

    /// Connect output slot `output_slot` of `output_node` to input slot
    /// `input_slot` of `input_node`.
    ///
    /// Fails, logs and leaves the graph unchanged when a node or slot does
    /// not exist, the input slot is already connected, or the slot kinds
    /// differ.
    pub fn add_slot_edge(
        &mut self,
        output_node: impl Into<NodeLabel>,
        output_slot: impl Into<SlotLabel>,
        input_node: impl Into<NodeLabel>,
        input_slot: impl Into<SlotLabel>,
    ) -> Result<(), RenderGraphError> {
        let edge = self
            .resolve_slot_edge(
                output_node.into(),
                output_slot.into(),
                input_node.into(),
                input_slot.into(),
            )
            .and_then(|edge| self.validate_edge(&edge).map(|_| edge))
            .map_err(validation_failed)?;

        self.insert_edge(edge);
        Ok(())
    }

    /// Make `input_node` run after `output_node` without passing a value.
    pub fn add_node_edge(
        &mut self,
        output_node: impl Into<NodeLabel>,
        input_node: impl Into<NodeLabel>,
    ) -> Result<(), RenderGraphError> {
        let edge = self
            .resolve_node_edge(output_node.into(), input_node.into())
            .and_then(|edge| self.validate_edge(&edge).map(|_| edge))
            .map_err(validation_failed)?;

        self.insert_edge(edge);
        Ok(())
    }

    /// Remove a single slot edge. Returns whether it was present.
    pub fn remove_slot_edge(
        &mut self,
        output_node: impl Into<NodeLabel>,
        output_slot: impl Into<SlotLabel>,
        input_node: impl Into<NodeLabel>,
        input_slot: impl Into<SlotLabel>,
    ) -> bool {
        match self.resolve_slot_edge(
            output_node.into(),
            output_slot.into(),
            input_node.into(),
            input_slot.into(),
        ) {
            Ok(edge) => self.remove_edge(&edge),
            Err(_) => false,
        }
    }

    /// Remove a single ordering edge. Returns whether it was present.
    pub fn remove_node_edge(
        &mut self,
        output_node: impl Into<NodeLabel>,
        input_node: impl Into<NodeLabel>,
    ) -> bool {
        match self.resolve_node_edge(output_node.into(), input_node.into()) {
            Ok(edge) => self.remove_edge(&edge),
            Err(_) => false,
        }
    }

    pub fn has_edge(&self, edge: &Edge) -> bool {
        let output = self.nodes.get(edge.output_node());
        let input = self.nodes.get(edge.input_node());
        matches!(
            (output, input),
            (Some(output), Some(input)) if output.has_output_edge(edge) && input.has_input_edge(edge)
        )
    }

    fn resolve_slot_edge(
        &self,
        output_label: NodeLabel,
        output_slot: SlotLabel,
        input_label: NodeLabel,
        input_slot: SlotLabel,
    ) -> Result<Edge, RenderGraphError> {
        let output_node = self.get_node_id(output_label.clone())?;
        let input_node = self.get_node_id(input_label.clone())?;
        let output_state = self.get_node_state(output_label.clone())?;
        let input_state = self.get_node_state(input_label.clone())?;

        let output_index = output_state.output_slots.index_of(&output_slot).ok_or(
            RenderGraphError::InvalidOutputNodeSlot {
                node: output_label,
                slot: output_slot,
            },
        )?;
        let input_index = input_state.input_slots.index_of(&input_slot).ok_or(
            RenderGraphError::InvalidInputNodeSlot {
                node: input_label,
                slot: input_slot,
            },
        )?;

        Ok(Edge::SlotEdge {
            output_node,
            output_index,
            input_node,
            input_index,
        })
    }

    fn resolve_node_edge(
        &self,
        output_label: NodeLabel,
        input_label: NodeLabel,
    ) -> Result<Edge, RenderGraphError> {
        Ok(Edge::NodeEdge {
            output_node: self.get_node_id(output_label)?,
            input_node: self.get_node_id(input_label)?,
        })
    }

    fn node_label(&self, id: NodeId) -> NodeLabel {
        self.nodes
            .get(id)
            .map(|state| state.label.clone())
            .unwrap_or(NodeLabel::new("<removed>"))
    }

    /// Check an edge against the current graph without inserting it.
    pub fn validate_edge(&self, edge: &Edge) -> Result<(), RenderGraphError> {
        if self.has_edge(edge) {
            return Err(RenderGraphError::EdgeAlreadyExists {
                output_node: self.node_label(edge.output_node()),
                input_node: self.node_label(edge.input_node()),
            });
        }

        let output_state = self
            .nodes
            .get(edge.output_node())
            .ok_or_else(|| RenderGraphError::InvalidNode(self.node_label(edge.output_node())))?;
        let input_state = self
            .nodes
            .get(edge.input_node())
            .ok_or_else(|| RenderGraphError::InvalidNode(self.node_label(edge.input_node())))?;

        let Edge::SlotEdge {
            output_index,
            input_index,
            ..
        } = *edge
        else {
            return Ok(());
        };

        let output_slot = output_state.output_slots.get(output_index).ok_or_else(|| {
            RenderGraphError::InvalidOutputNodeSlot {
                node: output_state.label.clone(),
                slot: SlotLabel::from(output_index.to_string()),
            }
        })?;
        let input_slot = input_state.input_slots.get(input_index).ok_or_else(|| {
            RenderGraphError::InvalidInputNodeSlot {
                node: input_state.label.clone(),
                slot: SlotLabel::from(input_index.to_string()),
            }
        })?;

        if let Some(occupied) = input_state.input_slot_edge(input_index) {
            return Err(RenderGraphError::NodeInputSlotAlreadyOccupied {
                input_node: input_state.label.clone(),
                input_slot: input_slot.name.clone(),
                occupied_by: self.node_label(occupied.output_node()),
            });
        }

        if output_slot.kind != input_slot.kind {
            return Err(RenderGraphError::MismatchedNodeSlots {
                output_node: output_state.label.clone(),
                output_slot: output_slot.name.clone(),
                output_kind: output_slot.kind,
                input_node: input_state.label.clone(),
                input_slot: input_slot.name.clone(),
                input_kind: input_slot.kind,
            });
        }

        Ok(())
    }

    fn insert_edge(&mut self, edge: Edge) {
        if let Some(output) = self.nodes.get_mut(edge.output_node()) {
            output.output_edges.push(edge);
        }
        if let Some(input) = self.nodes.get_mut(edge.input_node()) {
            input.input_edges.push(edge);
        }
    }

    fn remove_edge(&mut self, edge: &Edge) -> bool {
        if !self.has_edge(edge) {
            return false;
        }
        if let Some(output) = self.nodes.get_mut(edge.output_node()) {
            output.remove_output_edge(edge);
        }
        if let Some(input) = self.nodes.get_mut(edge.input_node()) {
            input.remove_input_edge(edge);
        }
        true
    }

    /// Register a sub-graph under `name`, replacing any previous one.
    pub fn add_sub_graph(&mut self, name: impl Into<GraphLabel>, sub_graph: RenderGraph) {
        let name = name.into();
        if self.sub_graphs.insert(name.clone(), sub_graph).is_some() {
            log::warn!(
                "Sub-graph {} of graph {} was replaced",
                name,
                self.display_name()
            );
        }
    }

    pub fn remove_sub_graph(&mut self, name: impl AsRef<str>) -> Option<RenderGraph> {
        self.sub_graphs.remove(name.as_ref())
    }

    pub fn get_sub_graph(&self, name: impl AsRef<str>) -> Option<&RenderGraph> {
        self.sub_graphs.get(name.as_ref())
    }

    pub fn get_sub_graph_mut(&mut self, name: impl AsRef<str>) -> Option<&mut RenderGraph> {
        self.sub_graphs.get_mut(name.as_ref())
    }

    pub fn sub_graphs(&self) -> impl Iterator<Item = (&GraphLabel, &RenderGraph)> {
        self.sub_graphs.iter()
    }

    /// Let every node, including those of sub-graphs, refresh itself from
    /// the world before traversal.
    pub fn update(&mut self, world: &World) {
        for state in self.nodes.values_mut() {
            state.node.update(world);
        }
        for sub_graph in self.sub_graphs.values_mut() {
            sub_graph.update(world);
        }
    }

    /// Order the nodes so that every producer precedes its consumers
    /// (Kahn's algorithm). Fails with [`RenderGraphError::CyclicGraph`]
    /// naming the nodes that sit on or behind a cycle.
    pub fn topological_order(&self) -> Result<Vec<NodeId>, RenderGraphError> {
        let mut in_degree: SecondaryMap<NodeId, usize> = SecondaryMap::new();
        let mut queue = VecDeque::new();
        for (id, state) in self.nodes.iter() {
            in_degree.insert(id, state.input_edges.len());
            if state.input_edges.is_empty() {
                queue.push_back(id);
            }
        }

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(id) = queue.pop_front() {
            order.push(id);
            let Some(state) = self.nodes.get(id) else {
                continue;
            };
            for edge in &state.output_edges {
                if let Some(degree) = in_degree.get_mut(edge.input_node()) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(edge.input_node());
                    }
                }
            }
        }

        if order.len() < self.nodes.len() {
            let mut nodes: Vec<NodeLabel> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(id, _)| self.node_label(id))
                .collect();
            nodes.sort();
            return Err(RenderGraphError::CyclicGraph { nodes });
        }
        Ok(order)
    }

    pub(crate) fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or("unnamed")
    }
}

fn validation_failed(error: RenderGraphError) -> RenderGraphError {
    log::error!("[Validation Error] {}", error);
    error
}

impl fmt::Display for RenderGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RenderGraph {} ({} nodes)", self.display_name(), self.nodes.len())?;
        for state in self.nodes.values() {
            write!(f, "  {}", state.label)?;
            if self.entry_node().map(|entry| &entry.label) == Some(&state.label) {
                write!(f, " [entry]")?;
            }
            writeln!(f)?;
            for slot in &state.input_slots {
                writeln!(f, "    in  {}: {}", slot.name, slot.kind)?;
            }
            for slot in &state.output_slots {
                writeln!(f, "    out {}: {}", slot.name, slot.kind)?;
            }
        }

        let edges: Vec<&Edge> = self
            .nodes
            .values()
            .flat_map(|state| state.output_edges.iter())
            .collect();
        if !edges.is_empty() {
            writeln!(f, "  edges:")?;
        }
        for edge in edges {
            match *edge {
                Edge::SlotEdge {
                    output_node,
                    output_index,
                    input_node,
                    input_index,
                } => {
                    let output = self.nodes.get(output_node);
                    let input = self.nodes.get(input_node);
                    let output_slot = output
                        .and_then(|state| state.output_slots.get(output_index))
                        .map(|slot| slot.name.to_string())
                        .unwrap_or_else(|| output_index.to_string());
                    let input_slot = input
                        .and_then(|state| state.input_slots.get(input_index))
                        .map(|slot| slot.name.to_string())
                        .unwrap_or_else(|| input_index.to_string());
                    writeln!(
                        f,
                        "    {}.{} -> {}.{}",
                        self.node_label(output_node),
                        output_slot,
                        self.node_label(input_node),
                        input_slot
                    )?;
                }
                Edge::NodeEdge {
                    output_node,
                    input_node,
                } => {
                    writeln!(
                        f,
                        "    {} -> {}",
                        self.node_label(output_node),
                        self.node_label(input_node)
                    )?;
                }
            }
        }

        if !self.sub_graphs.is_empty() {
            let mut names: Vec<&GraphLabel> = self.sub_graphs.keys().collect();
            names.sort();
            let names: Vec<&str> = names.into_iter().map(GraphLabel::as_str).collect();
            writeln!(f, "  sub-graphs: {}", names.join(", "))?;
        }
        Ok(())
    }
}

impl fmt::Debug for RenderGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderGraph")
            .field("label", &self.label)
            .field("nodes", &self.nodes.len())
            .field("sub_graphs", &self.sub_graphs.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_graph::context::{RenderContext, RenderGraphContext};
    use crate::render_graph::node::{EmptyNode, NodeRunError};
    use crate::render_graph::slot::SlotValue;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct TestNode {
        inputs: Vec<SlotInfo>,
        outputs: Vec<SlotInfo>,
        updates: Arc<AtomicUsize>,
    }

    impl TestNode {
        fn new(inputs: usize, outputs: usize) -> Self {
            Self {
                inputs: (0..inputs)
                    .map(|i| SlotInfo::new(format!("in_{i}"), RenderResourceKind::Texture))
                    .collect(),
                outputs: (0..outputs)
                    .map(|i| SlotInfo::new(format!("out_{i}"), RenderResourceKind::Texture))
                    .collect(),
                updates: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Node for TestNode {
        fn input(&self) -> Vec<SlotInfo> {
            self.inputs.clone()
        }

        fn output(&self) -> Vec<SlotInfo> {
            self.outputs.clone()
        }

        fn update(&mut self, _world: &World) {
            self.updates.fetch_add(1, Ordering::Relaxed);
        }

        fn run(
            &self,
            _graph: &mut RenderGraphContext,
            _render_context: &mut RenderContext,
        ) -> Result<Vec<SlotValue>, NodeRunError> {
            Ok(Vec::new())
        }
    }

    fn input_nodes(graph: &RenderGraph, label: &'static str) -> Vec<NodeLabel> {
        graph
            .input_edges(label)
            .unwrap()
            .iter()
            .map(|edge| graph.node_label(edge.output_node()))
            .collect()
    }

    fn output_nodes(graph: &RenderGraph, label: &'static str) -> Vec<NodeLabel> {
        graph
            .output_edges(label)
            .unwrap()
            .iter()
            .map(|edge| graph.node_label(edge.input_node()))
            .collect()
    }

    #[test]
    fn test_add_edges() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", TestNode::new(0, 1));
        graph.add_node("B", TestNode::new(0, 1));
        graph.add_node("C", TestNode::new(1, 1));
        graph.add_node("D", TestNode::new(1, 0));

        graph.add_slot_edge("A", "out_0", "C", "in_0").unwrap();
        graph.add_node_edge("B", "C").unwrap();
        graph.add_slot_edge("C", "out_0", "D", "in_0").unwrap();

        assert!(input_nodes(&graph, "A").is_empty());
        assert!(input_nodes(&graph, "B").is_empty());
        assert_eq!(
            input_nodes(&graph, "C"),
            vec![NodeLabel::from("A"), NodeLabel::from("B")]
        );
        assert_eq!(input_nodes(&graph, "D"), vec![NodeLabel::from("C")]);
        assert_eq!(output_nodes(&graph, "A"), vec![NodeLabel::from("C")]);
        assert_eq!(output_nodes(&graph, "C"), vec![NodeLabel::from("D")]);
    }

    #[test]
    fn test_missing_nodes_and_slots() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", TestNode::new(0, 1));
        graph.add_node("B", TestNode::new(1, 0));

        assert_eq!(
            graph.add_slot_edge("A", "out_0", "X", "in_0"),
            Err(RenderGraphError::InvalidNode("X".into()))
        );
        assert_eq!(
            graph.add_slot_edge("A", "out_9", "B", "in_0"),
            Err(RenderGraphError::InvalidOutputNodeSlot {
                node: "A".into(),
                slot: "out_9".into()
            })
        );
        assert_eq!(
            graph.add_slot_edge("A", "out_0", "B", "in_9"),
            Err(RenderGraphError::InvalidInputNodeSlot {
                node: "B".into(),
                slot: "in_9".into()
            })
        );
        assert_eq!(
            graph.add_node_edge("X", "B"),
            Err(RenderGraphError::InvalidNode("X".into()))
        );
        assert!(graph.input_edges("B").unwrap().is_empty());
    }

    #[test]
    fn test_occupied_input_slot() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", TestNode::new(0, 1));
        graph.add_node("B", TestNode::new(0, 1));
        graph.add_node("C", TestNode::new(1, 0));

        graph.add_slot_edge("A", "out_0", "C", "in_0").unwrap();
        assert_eq!(
            graph.add_slot_edge("B", "out_0", "C", "in_0"),
            Err(RenderGraphError::NodeInputSlotAlreadyOccupied {
                input_node: "C".into(),
                input_slot: "in_0".into(),
                occupied_by: "A".into(),
            })
        );
        assert_eq!(input_nodes(&graph, "C"), vec![NodeLabel::from("A")]);
        assert!(output_nodes(&graph, "B").is_empty());
    }

    #[test]
    fn test_duplicate_edges_are_rejected() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", TestNode::new(0, 1));
        graph.add_node("B", TestNode::new(1, 0));

        graph.add_slot_edge("A", "out_0", "B", "in_0").unwrap();
        assert!(matches!(
            graph.add_slot_edge("A", "out_0", "B", "in_0"),
            Err(RenderGraphError::EdgeAlreadyExists { .. })
        ));
        graph.add_node_edge("A", "B").unwrap();
        assert!(matches!(
            graph.add_node_edge("A", "B"),
            Err(RenderGraphError::EdgeAlreadyExists { .. })
        ));
        assert_eq!(graph.input_edges("B").unwrap().len(), 2);
    }

    #[test]
    fn test_remove_edges() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", TestNode::new(0, 1));
        graph.add_node("B", TestNode::new(1, 0));
        graph.add_slot_edge("A", "out_0", "B", "in_0").unwrap();
        graph.add_node_edge("A", "B").unwrap();

        assert!(graph.remove_slot_edge("A", "out_0", "B", "in_0"));
        assert!(!graph.remove_slot_edge("A", "out_0", "B", "in_0"));
        assert!(!graph.remove_slot_edge("A", "out_0", "missing", "in_0"));
        assert_eq!(graph.input_edges("B").unwrap().len(), 1);

        assert!(graph.remove_node_edge("A", "B"));
        assert!(graph.input_edges("B").unwrap().is_empty());
        assert!(graph.output_edges("A").unwrap().is_empty());

        // The freed slot accepts a new connection
        graph.add_slot_edge("A", "out_0", "B", "in_0").unwrap();
    }

    #[test]
    fn test_replacing_node_drops_its_edges() {
        let mut graph = RenderGraph::new();
        graph.add_node("A", TestNode::new(0, 1));
        graph.add_node("B", TestNode::new(1, 1));
        graph.add_node("C", TestNode::new(1, 0));
        graph.add_slot_edge("A", "out_0", "B", "in_0").unwrap();
        graph.add_slot_edge("B", "out_0", "C", "in_0").unwrap();

        graph.add_node("B", EmptyNode);

        assert_eq!(graph.node_count(), 3);
        assert!(graph.output_edges("A").unwrap().is_empty());
        assert!(graph.input_edges("C").unwrap().is_empty());
        assert!(graph.input_edges("B").unwrap().is_empty());
    }

    #[test]
    fn test_entry_node_replacement() {
        let mut graph = RenderGraph::new();
        let label = graph.add_entry_node(vec![SlotInfo::new("target", RenderResourceKind::Texture)]);
        graph.add_node("A", TestNode::new(1, 0));
        graph.add_slot_edge(label.clone(), "target", "A", "in_0").unwrap();

        let entry = graph.entry_node().unwrap();
        assert_eq!(entry.output_slots.len(), 1);
        assert_eq!(entry.input_slots, entry.output_slots);

        graph.add_entry_node(Vec::new());
        assert_eq!(graph.node_count(), 2);
        assert!(graph.entry_node().unwrap().output_slots.is_empty());
        assert!(graph.input_edges("A").unwrap().is_empty());

        assert!(graph.remove_node(label));
        assert!(graph.entry_node().is_none());
    }

    #[test]
    fn test_topological_order() {
        let mut graph = RenderGraph::new();
        let d = graph.add_node("D", TestNode::new(2, 0));
        let c = graph.add_node("C", TestNode::new(1, 1));
        let b = graph.add_node("B", TestNode::new(1, 1));
        let a = graph.add_node("A", TestNode::new(0, 2));
        graph.add_slot_edge("A", "out_0", "B", "in_0").unwrap();
        graph.add_slot_edge("A", "out_1", "C", "in_0").unwrap();
        graph.add_slot_edge("B", "out_0", "D", "in_0").unwrap();
        graph.add_slot_edge("C", "out_0", "D", "in_1").unwrap();

        let order = graph.topological_order().unwrap();
        let position = |id| order.iter().position(|n| *n == id).unwrap();
        assert_eq!(order.len(), 4);
        assert!(position(a) < position(b));
        assert!(position(a) < position(c));
        assert!(position(b) < position(d));
        assert!(position(c) < position(d));
    }

    #[test]
    fn test_cycle_is_reported() {
        let mut graph = RenderGraph::new();
        graph.add_node("root", TestNode::new(0, 1));
        graph.add_node("A", TestNode::new(1, 1));
        graph.add_node("B", TestNode::new(0, 0));
        graph.add_slot_edge("root", "out_0", "A", "in_0").unwrap();
        graph.add_node_edge("A", "B").unwrap();
        graph.add_node_edge("B", "A").unwrap();

        assert_eq!(
            graph.topological_order(),
            Err(RenderGraphError::CyclicGraph {
                nodes: vec!["A".into(), "B".into()]
            })
        );
    }

    #[test]
    fn test_update_reaches_sub_graphs() {
        let top = TestNode::new(0, 0);
        let nested = TestNode::new(0, 0);
        let top_updates = top.updates.clone();
        let nested_updates = nested.updates.clone();

        let mut sub_graph = RenderGraph::new();
        sub_graph.add_node("nested", nested);
        let mut graph = RenderGraph::new();
        graph.add_node("top", top);
        graph.add_sub_graph("sub", sub_graph);

        let world = World::new();
        graph.update(&world);
        graph.update(&world);

        assert_eq!(top_updates.load(Ordering::Relaxed), 2);
        assert_eq!(nested_updates.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_sub_graph_registry() {
        let mut graph = RenderGraph::new();
        graph.add_sub_graph("ui", RenderGraph::with_label("ui"));
        assert_eq!(graph.get_sub_graph("ui").and_then(|g| g.label()), Some("ui"));

        graph.add_sub_graph("ui", RenderGraph::with_label("ui_v2"));
        assert_eq!(graph.sub_graphs().count(), 1);
        assert_eq!(
            graph.get_sub_graph(GraphLabel::from("ui")).and_then(|g| g.label()),
            Some("ui_v2")
        );

        assert!(graph.remove_sub_graph("ui").is_some());
        assert!(graph.get_sub_graph("ui").is_none());
    }

    #[test]
    fn test_display_lists_nodes_edges_and_sub_graphs() {
        let mut graph = RenderGraph::with_label("main");
        graph.add_entry_node(vec![SlotInfo::new("target", RenderResourceKind::Texture)]);
        graph.add_node("A", TestNode::new(1, 0));
        graph.add_node("B", EmptyNode);
        graph
            .add_slot_edge(GraphEntryNode::LABEL, "target", "A", "in_0")
            .unwrap();
        graph.add_node_edge("A", "B").unwrap();
        graph.add_sub_graph("shadows", RenderGraph::new());

        let dump = graph.to_string();
        assert!(dump.starts_with("RenderGraph main (3 nodes)"));
        assert!(dump.contains("_graph_entry [entry]"));
        assert!(dump.contains("in  in_0: texture"));
        assert!(dump.contains("_graph_entry.target -> A.in_0"));
        assert!(dump.contains("A -> B"));
        assert!(dump.contains("sub-graphs: shadows"));
    }
}
