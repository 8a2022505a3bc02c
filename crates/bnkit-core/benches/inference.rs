//! # Inference benchmarks
//!
//! Posterior queries on layered networks of growing size:
//! - Variable elimination
//! - Recursive conditioning
//! - Simple conditioning
//! - Elimination-order search

use std::sync::Arc;

use bnkit_core::{
    EliminationEngine, EliminationOrderSearch, InferenceEngine, MoralGraph, Network,
    RecursiveConditioningEngine, SimpleConditioningEngine,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Layers of `width` binary variables; each variable has up to two parents in the
/// layer above. Tables are deterministic for reproducibility.
fn layered_network(layers: usize, width: usize) -> Arc<Network> {
    let mut net = Network::new(format!("layered{}x{}", layers, width));
    let mut previous = Vec::new();
    for layer in 0..layers {
        let mut current = Vec::with_capacity(width);
        for i in 0..width {
            let var = net
                .add_variable(&format!("l{}_{}", layer, i), ["f", "t"])
                .unwrap();
            if !previous.is_empty() {
                net.add_parent(var, previous[i]).unwrap();
                net.add_parent(var, previous[(i + 1) % width]).unwrap();
            }
            let rows = net.variable(var).parent_combinations();
            let table = (0..rows)
                .flat_map(|row| {
                    let p = 0.1 + 0.8 * ((row * 7 + i * 3 + layer) % 10) as f64 / 10.0;
                    [p, 1.0 - p]
                })
                .collect();
            net.set_cpt(var, table).unwrap();
            current.push(var);
        }
        previous = current;
    }
    Arc::new(net)
}

fn bench_engine<E, F>(c: &mut Criterion, group: &str, build: F)
where
    E: InferenceEngine,
    F: Fn(Arc<Network>) -> E,
{
    let mut group = c.benchmark_group(group);
    for layers in [3, 5, 8] {
        let net = layered_network(layers, 4);
        let last = format!("l{}_0", layers - 1);
        group.bench_with_input(BenchmarkId::from_parameter(layers * 4), &net, |b, net| {
            b.iter(|| {
                let mut engine = build(net.clone());
                engine.add_evidence(&last, "t").unwrap();
                black_box(engine.conditional_probability("l0_0", "t").unwrap())
            });
        });
    }
    group.finish();
}

fn bench_elimination(c: &mut Criterion) {
    bench_engine(c, "elimination", |net| EliminationEngine::new(net).unwrap());
}

fn bench_recursive_conditioning(c: &mut Criterion) {
    bench_engine(c, "recursive_conditioning", |net| {
        RecursiveConditioningEngine::new(net).unwrap()
    });
}

fn bench_simple_conditioning(c: &mut Criterion) {
    bench_engine(c, "simple_conditioning", |net| {
        SimpleConditioningEngine::new(net).unwrap()
    });
}

fn bench_order_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_search");
    for layers in [3, 5, 8] {
        let graph = MoralGraph::of_network(&layered_network(layers, 4));
        group.bench_with_input(BenchmarkId::from_parameter(layers * 4), &graph, |b, graph| {
            b.iter(|| black_box(EliminationOrderSearch::new(graph.clone()).run().unwrap()));
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_elimination,
    bench_recursive_conditioning,
    bench_simple_conditioning,
    bench_order_search
);
criterion_main!(benches);
