//! Per-camera sub-graph dispatch
//!
//! Every entity with a [`CameraRenderGraph`] names the sub-graph that renders
//! it. [`CameraDriverNode`] runs those sub-graphs once per camera, passing the
//! camera entity both as the single entry input and as the view.

use crate::render_graph::{
    GraphLabel, Node, NodeRunError, RenderContext, RenderGraphContext, RenderResourceKind,
    SlotInfo, SlotLabel, SlotValue,
};
use bevy_ecs::prelude::*;
use bevy_ecs::world::WorldId;

/// Selects the sub-graph a camera entity is rendered with.
#[derive(Component, Debug, Clone)]
pub struct CameraRenderGraph {
    pub sub_graph: GraphLabel,
    /// Cameras run in ascending order
    pub order: isize,
    pub is_active: bool,
}

impl CameraRenderGraph {
    pub fn new(sub_graph: impl Into<GraphLabel>) -> Self {
        Self {
            sub_graph: sub_graph.into(),
            order: 0,
            is_active: true,
        }
    }

    pub fn with_order(mut self, order: isize) -> Self {
        self.order = order;
        self
    }
}

type CameraQuery = QueryState<(Entity, &'static CameraRenderGraph)>;

/// Runs the sub-graph of every active camera.
///
/// The camera query follows whichever world the graph is updated or run
/// with.
pub struct CameraDriverNode {
    cameras: Option<CameraQuery>,
    world_id: WorldId,
}

impl CameraDriverNode {
    /// Entry slot through which camera sub-graphs receive the camera entity.
    pub const VIEW_ENTITY: SlotLabel = SlotLabel::new("view");

    pub fn new(world: &mut World) -> Self {
        Self {
            cameras: Some(world.query()),
            world_id: world.id(),
        }
    }

    /// Entry inputs a camera sub-graph must declare.
    pub fn sub_graph_inputs() -> Vec<SlotInfo> {
        vec![SlotInfo::new(Self::VIEW_ENTITY, RenderResourceKind::Entity)]
    }
}

impl Node for CameraDriverNode {
    fn update(&mut self, world: &World) {
        if world.id() != self.world_id || self.cameras.is_none() {
            log::debug!("Camera driver rebuilding its query for {:?}", world.id());
            self.cameras = world.try_query();
            self.world_id = world.id();
        }
        if let Some(cameras) = &mut self.cameras {
            cameras.update_archetypes(world);
        }
    }

    fn run(
        &self,
        graph: &mut RenderGraphContext,
        _render_context: &mut RenderContext,
    ) -> Result<Vec<SlotValue>, NodeRunError> {
        let world = graph.world();
        // Run without a matching update: query this world directly.
        let fresh: Option<CameraQuery>;
        let cameras = if world.id() == self.world_id {
            self.cameras.as_ref()
        } else {
            fresh = world.try_query();
            fresh.as_ref()
        };
        // `None` means the component was never registered, so no cameras.
        let Some(cameras) = cameras else {
            return Ok(Vec::new());
        };

        let mut views: Vec<(isize, Entity, GraphLabel)> = cameras
            .iter_manual(world)
            .filter(|(_, camera)| camera.is_active)
            .map(|(entity, camera)| (camera.order, entity, camera.sub_graph.clone()))
            .collect();
        views.sort_by_key(|(order, entity, _)| (*order, *entity));

        for (_, entity, sub_graph) in views {
            let inputs = vec![SlotValue::new(Self::VIEW_ENTITY, entity)];
            if graph.run_sub_graph(sub_graph, inputs, Some(entity)).is_err() {
                log::warn!("Skipping camera {:?}", entity);
            }
        }

        Ok(Vec::new())
    }
}
