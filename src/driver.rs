//! Per-frame driver
//!
//! Refreshes the graph's nodes from the world, runs one traversal and
//! decides what a failed frame means for the caller.

use crate::backend::RenderDevice;
use crate::render_graph::{
    ExecutorConfig, RenderGraph, RenderGraphExecutor, RenderGraphRunnerError, SlotValue,
};
use bevy_ecs::world::World;
use std::sync::Arc;

/// What to do when a frame fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameErrorPolicy {
    /// Log the error and report [`FrameStatus::Failed`]; the next frame runs
    /// normally.
    #[default]
    LogAndContinue,
    /// Return the error to the caller.
    Propagate,
}

/// Configuration for [`FrameDriver`]
#[derive(Debug, Clone)]
pub struct FrameDriverConfig {
    pub on_error: FrameErrorPolicy,
    /// Call [`RenderGraph::update`] before each traversal
    pub update_nodes: bool,
    pub executor: ExecutorConfig,
}

impl Default for FrameDriverConfig {
    fn default() -> Self {
        Self {
            on_error: FrameErrorPolicy::LogAndContinue,
            update_nodes: true,
            executor: ExecutorConfig::default(),
        }
    }
}

/// Outcome of one [`FrameDriver::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    Failed,
}

/// Drives a render graph once per frame.
pub struct FrameDriver {
    device: Arc<dyn RenderDevice>,
    executor: RenderGraphExecutor,
    on_error: FrameErrorPolicy,
    update_nodes: bool,
    frames_rendered: u64,
    frames_failed: u64,
}

impl FrameDriver {
    pub fn new(device: Arc<dyn RenderDevice>, config: FrameDriverConfig) -> Self {
        log::debug!("Frame driver using {} device", device.name());
        Self {
            device,
            executor: RenderGraphExecutor::new(config.executor),
            on_error: config.on_error,
            update_nodes: config.update_nodes,
            frames_rendered: 0,
            frames_failed: 0,
        }
    }

    pub fn device(&self) -> &Arc<dyn RenderDevice> {
        &self.device
    }

    pub fn executor(&self) -> &RenderGraphExecutor {
        &self.executor
    }

    /// Update and run `graph` for one frame.
    pub fn render_frame(
        &mut self,
        graph: &mut RenderGraph,
        world: &World,
    ) -> Result<FrameStatus, RenderGraphRunnerError> {
        self.render_frame_with_inputs(graph, world, &[])
    }

    /// Update and run `graph` for one frame, feeding `inputs` to its entry
    /// node.
    pub fn render_frame_with_inputs(
        &mut self,
        graph: &mut RenderGraph,
        world: &World,
        inputs: &[SlotValue],
    ) -> Result<FrameStatus, RenderGraphRunnerError> {
        if self.update_nodes {
            crate::profile_scope!("render_graph_update");
            graph.update(world);
        }

        let result = self
            .executor
            .execute_with_inputs(graph, self.device.clone(), world, inputs);
        crate::frame_mark!();

        match result {
            Ok(()) => {
                self.frames_rendered += 1;
                Ok(FrameStatus::Rendered)
            }
            Err(error) => {
                self.frames_failed += 1;
                match self.on_error {
                    FrameErrorPolicy::LogAndContinue => {
                        log::error!("Frame {} failed: {}", self.frame_index() - 1, error);
                        Ok(FrameStatus::Failed)
                    }
                    FrameErrorPolicy::Propagate => Err(error),
                }
            }
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn frames_failed(&self) -> u64 {
        self.frames_failed
    }

    /// Index of the next frame.
    pub fn frame_index(&self) -> u64 {
        self.frames_rendered + self.frames_failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DummyRenderDevice;
    use crate::render_graph::{
        NodeRunError, Node, RenderContext, RenderGraphContext, RenderResourceKind, SlotInfo,
    };

    struct Marker(&'static str);

    impl Node for Marker {
        fn run(
            &self,
            _graph: &mut RenderGraphContext,
            render_context: &mut RenderContext,
        ) -> Result<Vec<SlotValue>, NodeRunError> {
            render_context.command_buffer().insert_debug_marker(self.0);
            Ok(Vec::new())
        }
    }

    fn graph_with_texture_entry() -> RenderGraph {
        let mut graph = RenderGraph::with_label("main");
        graph.add_entry_node(vec![SlotInfo::new("target", RenderResourceKind::Texture)]);
        graph.add_node("marker", Marker("marker"));
        graph
    }

    #[test]
    fn test_frames_are_counted() {
        let device = Arc::new(DummyRenderDevice::new());
        let mut driver = FrameDriver::new(device.clone(), FrameDriverConfig::default());
        let mut graph = RenderGraph::new();
        graph.add_node("marker", Marker("marker"));
        let world = World::new();

        assert_eq!(driver.render_frame(&mut graph, &world).unwrap(), FrameStatus::Rendered);
        assert_eq!(driver.render_frame(&mut graph, &world).unwrap(), FrameStatus::Rendered);
        assert_eq!(driver.frames_rendered(), 2);
        assert_eq!(driver.frame_index(), 2);
        assert_eq!(device.submission_count(), 2);
    }

    #[test]
    fn test_log_and_continue() {
        let device = Arc::new(DummyRenderDevice::new());
        let mut driver = FrameDriver::new(device.clone(), FrameDriverConfig::default());
        let mut graph = graph_with_texture_entry();

        // Entry expects a texture but nothing is supplied
        let status = driver.render_frame(&mut graph, &World::new()).unwrap();
        assert_eq!(status, FrameStatus::Failed);
        assert_eq!(driver.frames_failed(), 1);
        assert_eq!(device.submission_count(), 0);
    }

    #[test]
    fn test_propagate() {
        let mut driver = FrameDriver::new(
            Arc::new(DummyRenderDevice::new()),
            FrameDriverConfig {
                on_error: FrameErrorPolicy::Propagate,
                ..Default::default()
            },
        );
        let mut graph = graph_with_texture_entry();

        let result = driver.render_frame(&mut graph, &World::new());
        assert!(matches!(
            result,
            Err(RenderGraphRunnerError::MissingInput { slot_index: 0, .. })
        ));
        assert_eq!(driver.frames_failed(), 1);
    }
}
