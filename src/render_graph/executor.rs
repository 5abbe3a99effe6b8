//! Render graph executor
//!
//! Traverses a graph with deferred retry: nodes without input edges are
//! queued first, a node whose producers have not all run yet goes back to
//! the end of the queue, and a node that ran queues everything it feeds.
//! Sub-graphs requested by a node run to completion, each with its own
//! written-output map, before the node's dependents are queued.

use crate::backend::{BackendError, RenderDevice};
use crate::render_graph::context::{RenderContext, RenderGraphContext};
use crate::render_graph::graph::{RenderGraph, RenderGraphError};
use crate::render_graph::label::{NodeLabel, SlotLabel};
use crate::render_graph::node::{Edge, NodeId, NodeRunError};
use crate::render_graph::resource::RenderResourceKind;
use crate::render_graph::slot::{SlotInfos, SlotMismatch, SlotValue};
use bevy_ecs::entity::Entity;
use bevy_ecs::world::World;
use slotmap::SecondaryMap;
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

/// Failures that abort a traversal.
#[derive(Error, Debug)]
pub enum RenderGraphRunnerError {
    #[error("node {node} failed: {error}")]
    NodeRunError {
        node: NodeLabel,
        #[source]
        error: NodeRunError,
    },
    #[error("graph {graph} is missing input {slot_name} (index {slot_index})")]
    MissingInput {
        graph: String,
        slot_index: usize,
        slot_name: SlotLabel,
    },
    #[error("graph {graph} takes {expected} inputs, {actual} were supplied")]
    UnexpectedInputs {
        graph: String,
        expected: usize,
        actual: usize,
    },
    #[error("graph {graph} input {slot_name} (index {slot_index}) expects {expected}, got {actual}")]
    MismatchedInputSlotType {
        graph: String,
        slot_index: usize,
        slot_name: SlotLabel,
        expected: RenderResourceKind,
        actual: RenderResourceKind,
    },
    #[error("node {node} produced {actual} outputs but declares {expected}")]
    MismatchedNodeOutputs {
        node: NodeLabel,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Graph(#[from] RenderGraphError),
    #[error("graph {graph} stalled with nodes still waiting: {pending:?}")]
    Stalled {
        graph: String,
        pending: Vec<NodeLabel>,
    },
    #[error("sub-graph {graph} exceeds the maximum nesting depth {max_depth}")]
    SubGraphDepthExceeded { graph: String, max_depth: usize },
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Executor configuration
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Run a topological precheck before traversing each graph and fail on
    /// cycles instead of traversing them
    pub validate_acyclic: bool,
    /// Deepest allowed chain of nested sub-graph runs
    pub max_sub_graph_depth: usize,
    /// Label of the per-frame command buffer
    pub queue_label: Option<String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            validate_acyclic: true,
            max_sub_graph_depth: 16,
            queue_label: Some("render_graph".to_string()),
        }
    }
}

/// Runs render graphs, one frame at a time.
#[derive(Debug, Clone, Default)]
pub struct RenderGraphExecutor {
    config: ExecutorConfig,
}

impl RenderGraphExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Run `graph` for one frame without entry inputs, then commit the
    /// frame's command buffer.
    pub fn execute(
        &self,
        graph: &RenderGraph,
        device: Arc<dyn RenderDevice>,
        world: &World,
    ) -> Result<(), RenderGraphRunnerError> {
        self.execute_with_inputs(graph, device, world, &[])
    }

    /// Run `graph` for one frame with `inputs` fed to its entry node, then
    /// commit the frame's command buffer.
    pub fn execute_with_inputs(
        &self,
        graph: &RenderGraph,
        device: Arc<dyn RenderDevice>,
        world: &World,
        inputs: &[SlotValue],
    ) -> Result<(), RenderGraphRunnerError> {
        let mut render_context = RenderContext::new(device);
        render_context.set_command_buffer_label(self.config.queue_label.clone());

        self.execute_in_context(graph, &mut render_context, world, inputs)?;
        render_context.finish()?;
        Ok(())
    }

    /// Traverse `graph` against an existing render context. Committing the
    /// context's command buffer is left to the caller.
    pub fn execute_in_context(
        &self,
        graph: &RenderGraph,
        render_context: &mut RenderContext,
        world: &World,
        inputs: &[SlotValue],
    ) -> Result<(), RenderGraphRunnerError> {
        crate::profile_scope!("render_graph");
        self.run_graph(graph, None, render_context, world, inputs, None, 0)
    }

    #[allow(clippy::too_many_arguments)]
    fn run_graph(
        &self,
        graph: &RenderGraph,
        sub_graph: Option<&str>,
        render_context: &mut RenderContext,
        world: &World,
        inputs: &[SlotValue],
        view_entity: Option<Entity>,
        depth: usize,
    ) -> Result<(), RenderGraphRunnerError> {
        let graph_name = sub_graph.unwrap_or_else(|| graph.display_name());
        if depth > self.config.max_sub_graph_depth {
            return Err(RenderGraphRunnerError::SubGraphDepthExceeded {
                graph: graph_name.to_string(),
                max_depth: self.config.max_sub_graph_depth,
            });
        }
        if self.config.validate_acyclic {
            graph.topological_order()?;
        }

        log::trace!("Begin render graph {}", graph_name);

        let mut node_outputs: SecondaryMap<NodeId, Vec<SlotValue>> = SecondaryMap::new();
        let mut queue: VecDeque<NodeId> = graph
            .iter_node_ids()
            .filter(|(_, state)| state.input_edges().is_empty())
            .map(|(id, _)| id)
            .collect();

        match (graph.entry_node_id(), graph.entry_node()) {
            (Some(entry_id), Some(entry)) => {
                Self::validate_entry_inputs(graph_name, &entry.input_slots, inputs)?;
                node_outputs.insert(entry_id, inputs.to_vec());
                queue.extend(entry.output_edges().iter().map(Edge::input_node));
            }
            _ if !inputs.is_empty() => {
                return Err(RenderGraphRunnerError::UnexpectedInputs {
                    graph: graph_name.to_string(),
                    expected: 0,
                    actual: inputs.len(),
                });
            }
            _ => {}
        }

        // Deferrals since a node last ran. Once every queued node has been
        // deferred without progress, none of them can ever run.
        let mut deferred = 0usize;

        'handle_node: while let Some(node_id) = queue.pop_front() {
            if node_outputs.contains_key(node_id) {
                continue;
            }
            let Some(node_state) = graph.node_state(node_id) else {
                continue;
            };

            let mut slot_indices_and_inputs: Vec<(usize, SlotValue)> = Vec::new();
            for edge in node_state.input_edges() {
                let ready = match *edge {
                    Edge::SlotEdge {
                        output_node,
                        output_index,
                        input_index,
                        ..
                    } => match node_outputs.get(output_node) {
                        Some(outputs) => {
                            slot_indices_and_inputs.push((input_index, outputs[output_index].clone()));
                            true
                        }
                        None => false,
                    },
                    Edge::NodeEdge { output_node, .. } => node_outputs.contains_key(output_node),
                };

                if !ready {
                    queue.push_back(node_id);
                    deferred += 1;
                    if deferred >= queue.len() {
                        return Err(Self::stalled(graph, graph_name, &queue, &node_outputs));
                    }
                    continue 'handle_node;
                }
            }

            slot_indices_and_inputs.sort_by_key(|(index, _)| *index);
            let (input_indices, node_inputs): (Vec<usize>, Vec<SlotValue>) =
                slot_indices_and_inputs.into_iter().unzip();

            let mut context = RenderGraphContext::new(
                graph,
                node_state,
                node_inputs,
                input_indices,
                world,
                view_entity,
            );

            let outputs = {
                crate::profile_scope_dynamic!(node_state.label.as_str());
                node_state
                    .node
                    .run(&mut context, render_context)
                    .map_err(|error| RenderGraphRunnerError::NodeRunError {
                        node: node_state.label.clone(),
                        error,
                    })?
            };
            let sub_graph_runs = context.finish();
            deferred = 0;

            for run in sub_graph_runs {
                let Some(sub_graph) = graph.get_sub_graph(&run.name) else {
                    log::error!("Sub-graph {} disappeared before it could run", run.name);
                    continue;
                };
                log::debug!(
                    "Running sub-graph {} requested by {}",
                    run.name,
                    node_state.label
                );
                self.run_graph(
                    sub_graph,
                    Some(run.name.as_str()),
                    render_context,
                    world,
                    &run.inputs,
                    run.view_entity,
                    depth + 1,
                )?;
            }

            if outputs.len() != node_state.output_slots.len() {
                return Err(RenderGraphRunnerError::MismatchedNodeOutputs {
                    node: node_state.label.clone(),
                    expected: node_state.output_slots.len(),
                    actual: outputs.len(),
                });
            }
            node_outputs.insert(node_id, outputs);
            queue.extend(node_state.output_edges().iter().map(Edge::input_node));
        }

        // Nodes on a cycle that nothing feeds are never queued at all.
        if node_outputs.len() < graph.node_count() {
            let unreached: VecDeque<NodeId> = graph
                .iter_node_ids()
                .map(|(id, _)| id)
                .filter(|id| !node_outputs.contains_key(*id))
                .collect();
            return Err(Self::stalled(graph, graph_name, &unreached, &node_outputs));
        }

        log::trace!("End render graph {}", graph_name);
        Ok(())
    }

    fn validate_entry_inputs(
        graph_name: &str,
        slots: &SlotInfos,
        inputs: &[SlotValue],
    ) -> Result<(), RenderGraphRunnerError> {
        slots.check_values(inputs).map_err(|mismatch| match mismatch {
            SlotMismatch::Missing { index, name } => RenderGraphRunnerError::MissingInput {
                graph: graph_name.to_string(),
                slot_index: index,
                slot_name: name,
            },
            SlotMismatch::Kind {
                index,
                name,
                expected,
                actual,
            } => RenderGraphRunnerError::MismatchedInputSlotType {
                graph: graph_name.to_string(),
                slot_index: index,
                slot_name: name,
                expected,
                actual,
            },
            SlotMismatch::Extra { expected, actual } => RenderGraphRunnerError::UnexpectedInputs {
                graph: graph_name.to_string(),
                expected,
                actual,
            },
        })
    }

    fn stalled(
        graph: &RenderGraph,
        graph_name: &str,
        queue: &VecDeque<NodeId>,
        node_outputs: &SecondaryMap<NodeId, Vec<SlotValue>>,
    ) -> RenderGraphRunnerError {
        let mut pending: Vec<NodeLabel> = queue
            .iter()
            .filter(|id| !node_outputs.contains_key(**id))
            .filter_map(|id| graph.node_state(*id))
            .map(|state| state.label.clone())
            .collect();
        pending.sort();
        pending.dedup();
        RenderGraphRunnerError::Stalled {
            graph: graph_name.to_string(),
            pending,
        }
    }
}
