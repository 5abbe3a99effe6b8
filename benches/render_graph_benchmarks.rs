use std::sync::Arc;

use bevy_ecs::world::World;
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use redlilium_render_graph::backend::{DummyRenderDevice, RenderDevice, TextureDescriptor};
use redlilium_render_graph::render_graph::{
    Node, NodeRunError, RenderContext, RenderGraph, RenderGraphContext, RenderGraphExecutor,
    RenderResourceKind, SlotInfo, SlotValue,
};

/// Passes its input texture through, or produces `texture` when it has no
/// input.
struct PassThrough {
    has_input: bool,
    texture: SlotValue,
}

impl Node for PassThrough {
    fn input(&self) -> Vec<SlotInfo> {
        if self.has_input {
            vec![SlotInfo::new("in", RenderResourceKind::Texture)]
        } else {
            Vec::new()
        }
    }

    fn output(&self) -> Vec<SlotInfo> {
        vec![SlotInfo::new("out", RenderResourceKind::Texture)]
    }

    fn run(
        &self,
        graph: &mut RenderGraphContext,
        _render_context: &mut RenderContext,
    ) -> Result<Vec<SlotValue>, NodeRunError> {
        let value = match graph.inputs().first() {
            Some(input) => input.value.clone(),
            None => self.texture.value.clone(),
        };
        Ok(vec![SlotValue::new("out", value)])
    }
}

fn chain(length: usize, texture: &SlotValue) -> RenderGraph {
    let mut graph = RenderGraph::with_label("chain");
    // Inserted back to front so most nodes are deferred at least once
    for i in (0..length).rev() {
        graph.add_node(
            format!("pass_{i}"),
            PassThrough {
                has_input: i > 0,
                texture: texture.clone(),
            },
        );
    }
    for i in 1..length {
        graph
            .add_slot_edge(format!("pass_{}", i - 1), "out", format!("pass_{i}"), "in")
            .unwrap();
    }
    graph
}

/// `width` parallel chains of `depth` nodes, all fed by one root.
fn fan_out(width: usize, depth: usize, texture: &SlotValue) -> RenderGraph {
    let mut graph = RenderGraph::with_label("fan_out");
    graph.add_node(
        "root",
        PassThrough {
            has_input: false,
            texture: texture.clone(),
        },
    );
    for w in 0..width {
        let mut prev = "root".to_string();
        for d in 0..depth {
            let name = format!("branch_{w}_{d}");
            graph.add_node(
                name.clone(),
                PassThrough {
                    has_input: true,
                    texture: texture.clone(),
                },
            );
            graph.add_slot_edge(prev, "out", name.clone(), "in").unwrap();
            prev = name;
        }
    }
    graph
}

fn texture_value(device: &DummyRenderDevice) -> SlotValue {
    let texture = device
        .create_texture(&TextureDescriptor::default())
        .unwrap();
    SlotValue::new("out", texture)
}

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

fn bench_build_chain(c: &mut Criterion) {
    let device = DummyRenderDevice::new();
    let texture = texture_value(&device);
    c.bench_function("render_graph_build_32_node_chain", |b| {
        b.iter(|| black_box(chain(32, &texture)));
    });
}

fn bench_topological_order(c: &mut Criterion) {
    let device = DummyRenderDevice::new();
    let texture = texture_value(&device);
    let graph = fan_out(8, 8, &texture);
    c.bench_function("render_graph_topological_order_65_nodes", |b| {
        b.iter(|| black_box(graph.topological_order().unwrap()));
    });
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

fn bench_execute_chain(c: &mut Criterion) {
    let device = Arc::new(DummyRenderDevice::new());
    let texture = texture_value(&device);
    let graph = chain(32, &texture);
    let world = World::new();
    let executor = RenderGraphExecutor::default();
    c.bench_function("render_graph_execute_32_node_chain", |b| {
        b.iter(|| {
            executor.execute(&graph, device.clone(), &world).unwrap();
        });
    });
}

fn bench_execute_fan_out(c: &mut Criterion) {
    let device = Arc::new(DummyRenderDevice::new());
    let texture = texture_value(&device);
    let graph = fan_out(8, 8, &texture);
    let world = World::new();
    let executor = RenderGraphExecutor::default();
    c.bench_function("render_graph_execute_8x8_fan_out", |b| {
        b.iter(|| {
            executor.execute(&graph, device.clone(), &world).unwrap();
        });
    });
}

criterion_group!(
    benches,
    bench_build_chain,
    bench_topological_order,
    bench_execute_chain,
    bench_execute_fan_out,
);
criterion_main!(benches);
