//! Best-first search for a minimum-width elimination order.
//!
//! States are elimination prefixes. Each state carries the width accumulated so far
//! (the largest degree seen at elimination time), the residual moral graph, and the
//! residual graph's clique lower bound. The open set is ordered by
//! `max(width, lower_bound)`; because the bound never overestimates the remaining
//! width and the key never decreases along a path, the first goal state popped (empty
//! residual graph) has minimum width.
//!
//! Prefixes that eliminate the same node set reach the same residual graph, so states
//! are deduplicated by residual node set, keeping the smaller width.
//!
//! The greedy min-fill order seeds an upper bound: children that cannot beat its width
//! are never queued, and when the root's clique bound already equals it the greedy
//! order is returned without expanding anything. An open set that empties therefore
//! proves the greedy order optimal.
//!
//! The search is exponential in the worst case. Once `max_expansions` is exceeded, or
//! the cancellation token fires, the most promising open state is completed with the
//! greedy min-fill heuristic and the result is marked non-exact.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rustc_hash::FxHashMap;

use crate::engine::cancel::CancellationToken;
use crate::engine::errors::{BnError, BnResult};
use crate::engine::moral_graph::MoralGraph;
use crate::engine::network::{Network, VarId};

/// Limits for [`EliminationOrderSearch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EliminationOrderConfig {
    /// Expansions allowed before falling back to greedy completion.
    pub max_expansions: usize,
}

impl Default for EliminationOrderConfig {
    fn default() -> Self {
        Self {
            max_expansions: 20_000,
        }
    }
}

impl EliminationOrderConfig {
    pub fn validate(self) -> BnResult<Self> {
        if self.max_expansions == 0 {
            return Err(BnError::InvalidConfig(
                "elimination order: max_expansions must be > 0".into(),
            ));
        }
        Ok(self)
    }
}

/// Result of an elimination-order search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EliminationOrder {
    /// Variables in elimination order.
    pub order: Vec<VarId>,
    /// Induced width of `order`.
    pub width: usize,
    /// Whether the search proved `width` minimal.
    pub exact: bool,
    /// Search expansions performed.
    pub expansions: u64,
}

/// Width of eliminating `order` from `graph`, in that order.
pub fn induced_width(graph: &MoralGraph, order: &[VarId]) -> usize {
    let mut graph = graph.clone();
    order
        .iter()
        .map(|var| graph.eliminate(*var))
        .max()
        .unwrap_or(0)
}

#[derive(Debug)]
struct SearchState {
    prefix: Vec<VarId>,
    width: usize,
    graph: MoralGraph,
}

/// Best-first search over elimination prefixes.
#[derive(Debug, Clone)]
pub struct EliminationOrderSearch {
    graph: MoralGraph,
    config: EliminationOrderConfig,
    cancel: CancellationToken,
}

impl EliminationOrderSearch {
    pub fn new(graph: MoralGraph) -> Self {
        Self {
            graph,
            config: EliminationOrderConfig::default(),
            cancel: CancellationToken::never(),
        }
    }

    /// Search over the moral graph of `subset`.
    pub fn for_subset(network: &Network, subset: &[VarId]) -> Self {
        Self::new(MoralGraph::new(network, subset))
    }

    pub fn with_config(mut self, config: EliminationOrderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn run(&self) -> BnResult<EliminationOrder> {
        let config = self.config.validate()?;
        let (greedy, upper) = greedy_order(&self.graph);
        let node_count = self.graph.nodes().count();

        if self.cancel.is_cancelled() {
            return Ok(EliminationOrder {
                order: greedy,
                width: upper,
                exact: false,
                expansions: 0,
            });
        }
        let root_bound = self.graph.lower_bound_from_clique();
        if root_bound >= upper {
            #[cfg(feature = "tracing")]
            tracing::debug!("elimination order search: greedy width {} meets the clique bound", upper);
            return Ok(EliminationOrder {
                order: greedy,
                width: upper,
                exact: true,
                expansions: 0,
            });
        }

        let mut arena: Vec<Option<SearchState>> = Vec::new();
        let mut open: BinaryHeap<Reverse<(usize, Reverse<usize>, usize)>> = BinaryHeap::new();
        let mut best: FxHashMap<Vec<VarId>, usize> = FxHashMap::default();
        let mut expansions = 0u64;

        best.insert(self.graph.nodes().collect(), 0);
        arena.push(Some(SearchState {
            prefix: Vec::new(),
            width: 0,
            graph: self.graph.clone(),
        }));
        open.push(Reverse((root_bound, Reverse(0), 0)));

        while let Some(Reverse((_, _, slot))) = open.pop() {
            let Some(state) = arena[slot].take() else {
                continue;
            };
            let residual: Vec<VarId> = state.graph.nodes().collect();
            if best.get(&residual).is_some_and(|w| *w < state.width) {
                continue;
            }
            if state.graph.is_empty() {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "elimination order search: width {} after {} expansions",
                    state.width,
                    expansions
                );
                return Ok(EliminationOrder {
                    order: state.prefix,
                    width: state.width,
                    exact: true,
                    expansions,
                });
            }
            if self.cancel.is_cancelled() || expansions >= config.max_expansions as u64 {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "elimination order search stopped after {} expansions; completing greedily",
                    expansions
                );
                let (order, width) = complete_greedily(state.prefix, state.width, state.graph);
                let (order, width) = if width < upper {
                    (order, width)
                } else {
                    (greedy, upper)
                };
                return Ok(EliminationOrder {
                    order,
                    width,
                    exact: false,
                    expansions,
                });
            }

            expansions += 1;
            for var in residual.iter().copied() {
                let mut graph = state.graph.clone();
                let degree = graph.eliminate(var);
                let width = state.width.max(degree);
                // the greedy order already achieves `upper`
                if width >= upper {
                    continue;
                }
                let key: Vec<VarId> = graph.nodes().collect();
                if best.get(&key).is_some_and(|w| *w <= width) {
                    continue;
                }
                best.insert(key, width);
                let bound = graph.lower_bound_from_clique();
                if bound >= upper {
                    continue;
                }
                let mut prefix = state.prefix.clone();
                prefix.push(var);
                let depth = prefix.len();
                arena.push(Some(SearchState {
                    prefix,
                    width,
                    graph,
                }));
                open.push(Reverse((width.max(bound), Reverse(depth), arena.len() - 1)));
            }
        }

        // Every prefix that could beat the greedy width was pruned or exhausted.
        if greedy.len() != node_count {
            return Err(BnError::EliminationOrderSearchExhausted);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "elimination order search: greedy width {} is optimal after {} expansions",
            upper,
            expansions
        );
        Ok(EliminationOrder {
            order: greedy,
            width: upper,
            exact: true,
            expansions,
        })
    }
}

/// Greedy min-fill completion (ties: smaller degree, then smaller id).
pub fn complete_greedily(
    mut prefix: Vec<VarId>,
    mut width: usize,
    mut graph: MoralGraph,
) -> (Vec<VarId>, usize) {
    while let Some(var) = graph
        .nodes()
        .min_by_key(|v| (graph.fill_in(*v), graph.degree(*v), *v))
    {
        width = width.max(graph.eliminate(var));
        prefix.push(var);
    }
    (prefix, width)
}

/// Greedy min-fill order of a whole graph.
pub fn greedy_order(graph: &MoralGraph) -> (Vec<VarId>, usize) {
    complete_greedily(Vec::new(), 0, graph.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_from_edges(n: u32, edges: &[(u32, u32)]) -> MoralGraph {
        let mut g = MoralGraph::default();
        for i in 0..n {
            g.add_node(VarId(i));
        }
        for &(a, b) in edges {
            g.add_edge(VarId(a), VarId(b));
        }
        g
    }

    fn permutations(items: &[VarId]) -> Vec<Vec<VarId>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut all = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head);
                all.push(tail);
            }
        }
        all
    }

    fn brute_force_width(g: &MoralGraph) -> usize {
        let nodes: Vec<VarId> = g.nodes().collect();
        permutations(&nodes)
            .iter()
            .map(|order| induced_width(g, order))
            .min()
            .unwrap_or(0)
    }

    #[test]
    fn tree_has_width_one() {
        let g = graph_from_edges(5, &[(0, 1), (1, 2), (1, 3), (3, 4)]);
        let result = EliminationOrderSearch::new(g.clone()).run().unwrap();
        assert!(result.exact);
        assert_eq!(result.width, 1);
        assert_eq!(result.order.len(), 5);
        assert_eq!(induced_width(&g, &result.order), 1);
    }

    #[test]
    fn cycle_has_width_two() {
        let g = graph_from_edges(6, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0)]);
        let result = EliminationOrderSearch::new(g).run().unwrap();
        assert_eq!(result.width, 2);
    }

    #[test]
    fn matches_exhaustive_search_on_small_graphs() {
        let cases: Vec<(u32, Vec<(u32, u32)>)> = vec![
            (6, vec![(0, 1), (0, 2), (1, 2), (2, 3), (3, 4), (4, 5), (5, 2)]),
            (7, vec![(0, 1), (1, 2), (2, 3), (3, 0), (0, 4), (4, 5), (5, 6), (6, 1)]),
            (
                7,
                vec![(0, 1), (0, 2), (0, 3), (1, 4), (2, 5), (3, 6), (4, 5), (5, 6), (6, 4)],
            ),
        ];
        for (n, edges) in cases {
            let g = graph_from_edges(n, &edges);
            let result = EliminationOrderSearch::new(g.clone()).run().unwrap();
            assert!(result.exact);
            assert_eq!(result.width, brute_force_width(&g), "edges {:?}", edges);
            assert_eq!(induced_width(&g, &result.order), result.width);
        }
    }

    #[test]
    fn empty_graph_yields_empty_order() {
        let result = EliminationOrderSearch::new(MoralGraph::default()).run().unwrap();
        assert!(result.order.is_empty());
        assert_eq!(result.width, 0);
    }

    fn grid(side: u32) -> MoralGraph {
        let mut edges = Vec::new();
        for r in 0..side {
            for c in 0..side {
                let v = r * side + c;
                if c + 1 < side {
                    edges.push((v, v + 1));
                }
                if r + 1 < side {
                    edges.push((v, v + side));
                }
            }
        }
        graph_from_edges(side * side, &edges)
    }

    #[test]
    fn expansion_cap_falls_back_to_greedy() {
        // triangle-free, so the root bound (1) is far below the width (3)
        let g = grid(3);
        let result = EliminationOrderSearch::new(g.clone())
            .with_config(EliminationOrderConfig { max_expansions: 1 })
            .run()
            .unwrap();
        assert!(!result.exact);
        assert_eq!(result.order.len(), 9);
        assert_eq!(induced_width(&g, &result.order), result.width);
        assert!(result.width <= greedy_order(&g).1);
    }

    #[test]
    fn grid_width_is_proven_optimal() {
        let g = grid(3);
        let result = EliminationOrderSearch::new(g.clone()).run().unwrap();
        assert!(result.exact);
        assert_eq!(result.width, 3);
        assert_eq!(induced_width(&g, &result.order), 3);
    }

    #[test]
    fn greedy_meeting_the_clique_bound_needs_no_expansion() {
        // cycle with a chord: two triangles, bound 2
        let g = graph_from_edges(4, &[(0, 1), (1, 2), (2, 3), (3, 0), (0, 2)]);
        let result = EliminationOrderSearch::new(g).run().unwrap();
        assert!(result.exact);
        assert_eq!(result.width, 2);
        assert_eq!(result.expansions, 0);
    }

    #[test]
    fn pruned_search_proves_greedy_optimal() {
        // the 6-cycle has bound 1 but every child already reaches the greedy width 2
        let g = graph_from_edges(6, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5), (5, 0)]);
        let result = EliminationOrderSearch::new(g).run().unwrap();
        assert!(result.exact);
        assert_eq!(result.expansions, 1);
    }

    #[test]
    fn zero_expansions_is_rejected() {
        let search = EliminationOrderSearch::new(MoralGraph::default())
            .with_config(EliminationOrderConfig { max_expansions: 0 });
        assert!(matches!(search.run(), Err(BnError::InvalidConfig(_))));
    }
}
