//! RedLilium Render Graph - dependency-driven render graph execution
//!
//! Nodes declare typed input and output slots. Edges between them are
//! validated when the graph is built, and every frame the executor runs each
//! node after all of its producers, one node at a time.
//!
//! # Features
//! - Typed slot edges and ordering-only edges, checked at insertion time
//! - Entry nodes that inject per-frame inputs
//! - Sub-graphs that nodes run on demand, e.g. once per camera
//! - Cycle detection before traversal
//! - Backend abstraction with a recording dummy backend and an optional
//!   wgpu backend (`wgpu-backend` feature)
//! - Tracy instrumentation (`profiling` feature)
//!
//! # Example
//!
//! ```ignore
//! use redlilium_render_graph::prelude::*;
//!
//! let mut graph = RenderGraph::with_label("main");
//! graph.add_node("clear", ClearNode::new());
//! graph.add_node("ui", UiNode::new());
//! graph.add_node_edge("clear", "ui")?;
//!
//! let executor = RenderGraphExecutor::default();
//! executor.execute(&graph, device, &world)?;
//! ```

pub mod backend;
pub mod camera;
pub mod driver;
pub mod profiling;
pub mod render_graph;

/// Commonly used types
pub mod prelude {
    pub use crate::backend::{DummyRenderDevice, RenderDevice};
    pub use crate::camera::{CameraDriverNode, CameraRenderGraph};
    pub use crate::driver::{FrameDriver, FrameDriverConfig, FrameErrorPolicy, FrameStatus};
    pub use crate::render_graph::{
        EmptyNode, ExecutorConfig, GraphLabel, Node, NodeLabel, NodeRunError, RenderContext,
        RenderGraph, RenderGraphContext, RenderGraphError, RenderGraphExecutor,
        RenderGraphRunnerError, RenderResource, RenderResourceKind, RunSubGraphNode, SlotInfo,
        SlotLabel, SlotValue,
    };
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the crate version. Call once after installing a logger.
pub fn init() {
    log::info!("RedLilium render graph v{}", VERSION);
}
