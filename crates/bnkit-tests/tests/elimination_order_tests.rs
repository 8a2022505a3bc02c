//! Elimination-order search against exhaustive enumeration of all orders.

use bnkit_core::engine::elimination_order::{greedy_order, induced_width};
use bnkit_core::{
    CancellationToken, EliminationOrderConfig, EliminationOrderSearch, MoralGraph, Network, VarId,
};
use bnkit_tests::{asia, chain, random_network};
use rand::rngs::SmallRng;
use rand::SeedableRng;

fn exhaustive_width(graph: &MoralGraph, remaining: &mut Vec<VarId>, best: &mut usize, so_far: usize) {
    if so_far >= *best {
        return;
    }
    if remaining.is_empty() {
        *best = so_far;
        return;
    }
    for i in 0..remaining.len() {
        let var = remaining.swap_remove(i);
        let mut next = graph.clone();
        let degree = next.eliminate(var);
        exhaustive_width(&next, remaining, best, so_far.max(degree));
        remaining.push(var);
        let last = remaining.len() - 1;
        remaining.swap(i, last);
    }
}

fn optimal_width(graph: &MoralGraph) -> usize {
    let mut nodes: Vec<VarId> = graph.nodes().collect();
    let mut best = usize::MAX;
    exhaustive_width(graph, &mut nodes, &mut best, 0);
    if best == usize::MAX {
        0
    } else {
        best
    }
}

#[test]
fn search_is_optimal_on_small_random_networks() {
    let mut rng = SmallRng::seed_from_u64(2024);
    for n in 1..=8 {
        for _ in 0..6 {
            let net = random_network(&mut rng, n, 3, 2);
            let graph = MoralGraph::of_network(&net);
            let result = EliminationOrderSearch::new(graph.clone()).run().unwrap();
            assert!(result.exact);
            assert_eq!(result.order.len(), n);
            assert_eq!(induced_width(&graph, &result.order), result.width);
            assert_eq!(result.width, optimal_width(&graph), "n = {}", n);
        }
    }
}

#[test]
fn known_widths() {
    let graph = MoralGraph::of_network(&chain(8, 2));
    assert_eq!(EliminationOrderSearch::new(graph).run().unwrap().width, 1);
    let graph = MoralGraph::of_network(&asia());
    let result = EliminationOrderSearch::new(graph.clone()).run().unwrap();
    assert_eq!(result.width, optimal_width(&graph));
    assert_eq!(result.width, 2);
}

#[test]
fn capped_search_falls_back_to_a_complete_order() {
    let net = random_network(&mut SmallRng::seed_from_u64(9), 12, 4, 2);
    let graph = MoralGraph::of_network(&net);
    let capped = EliminationOrderSearch::new(graph.clone())
        .with_config(EliminationOrderConfig { max_expansions: 1 })
        .run()
        .unwrap();
    assert_eq!(capped.order.len(), 12);
    assert_eq!(induced_width(&graph, &capped.order), capped.width);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let cancelled = EliminationOrderSearch::new(graph.clone())
        .with_cancellation(cancel)
        .run()
        .unwrap();
    assert!(!cancelled.exact);
    assert_eq!(cancelled.order.len(), 12);
}

#[test]
fn long_chain_needs_no_expansion() {
    let graph = MoralGraph::of_network(&chain(200, 2));
    let result = EliminationOrderSearch::new(graph).run().unwrap();
    assert!(result.exact);
    assert_eq!(result.width, 1);
    assert_eq!(result.order.len(), 200);
    assert_eq!(result.expansions, 0);
}

#[test]
fn two_tree_of_forty_variables_needs_no_expansion() {
    // x(i) has parents x(i-1) and x(i-2): every moral clique is a triangle
    let mut net = Network::new("two-tree");
    let mut ids = Vec::new();
    for i in 0..40 {
        let var = net.add_variable(&format!("x{}", i), ["a", "b"]).unwrap();
        if i >= 1 {
            net.add_parent(var, ids[i - 1]).unwrap();
        }
        if i >= 2 {
            net.add_parent(var, ids[i - 2]).unwrap();
        }
        ids.push(var);
    }
    let graph = MoralGraph::of_network(&net);
    let result = EliminationOrderSearch::new(graph.clone()).run().unwrap();
    assert!(result.exact);
    assert_eq!(result.width, 2);
    assert_eq!(result.expansions, 0);
    assert_eq!(induced_width(&graph, &result.order), 2);
}

#[test]
fn mid_sized_search_never_loses_to_greedy() {
    let net = random_network(&mut SmallRng::seed_from_u64(1), 36, 3, 3);
    let graph = MoralGraph::of_network(&net);
    let (_, greedy_width) = greedy_order(&graph);
    let result = EliminationOrderSearch::new(graph.clone())
        .with_config(EliminationOrderConfig { max_expansions: 200 })
        .run()
        .unwrap();
    assert!(result.expansions <= 200);
    assert_eq!(result.order.len(), 36);
    assert_eq!(induced_width(&graph, &result.order), result.width);
    assert!(result.width <= greedy_width);
}
