//! Moral graph of a variable subset.
//!
//! Moralization drops edge directions and marries co-parents: the undirected graph has
//! an edge for every parent–child pair and for every pair of parents sharing a child,
//! both restricted to the chosen subset. Eliminating a node connects its neighbours
//! (fill-in edges) and removes it, which is the triangulation step used by the
//! elimination-order search.

use std::collections::{BTreeMap, BTreeSet};

use crate::engine::network::{Network, VarId};

/// Undirected graph over a variable subset. Cloning is a plain deep copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoralGraph {
    adjacency: BTreeMap<VarId, BTreeSet<VarId>>,
}

impl MoralGraph {
    /// Moral graph of `subset`.
    pub fn new(network: &Network, subset: &[VarId]) -> Self {
        let mut graph = MoralGraph::default();
        for &var in subset {
            graph.add_node(var);
        }
        for &child in subset {
            let parents: Vec<VarId> = network
                .variable(child)
                .parents()
                .iter()
                .copied()
                .filter(|p| graph.adjacency.contains_key(p))
                .collect();
            for (i, &parent) in parents.iter().enumerate() {
                graph.add_edge(child, parent);
                for &other in &parents[i + 1..] {
                    graph.add_edge(parent, other);
                }
            }
        }
        graph
    }

    /// Moral graph of the whole network.
    pub fn of_network(network: &Network) -> Self {
        let all: Vec<VarId> = network.ids().collect();
        Self::new(network, &all)
    }

    pub fn add_node(&mut self, var: VarId) {
        self.adjacency.entry(var).or_default();
    }

    pub fn add_edge(&mut self, a: VarId, b: VarId) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn contains(&self, var: VarId) -> bool {
        self.adjacency.contains_key(&var)
    }

    /// Nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = VarId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn neighbors(&self, var: VarId) -> impl Iterator<Item = VarId> + '_ {
        self.adjacency.get(&var).into_iter().flatten().copied()
    }

    pub fn degree(&self, var: VarId) -> usize {
        self.adjacency.get(&var).map_or(0, BTreeSet::len)
    }

    pub fn has_edge(&self, a: VarId, b: VarId) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Removes a node and its incident edges.
    pub fn remove_node(&mut self, var: VarId) {
        if let Some(neighbors) = self.adjacency.remove(&var) {
            for n in neighbors {
                if let Some(adj) = self.adjacency.get_mut(&n) {
                    adj.remove(&var);
                }
            }
        }
    }

    /// Number of fill-in edges eliminating `var` would add.
    pub fn fill_in(&self, var: VarId) -> usize {
        let neighbors: Vec<VarId> = self.neighbors(var).collect();
        let mut missing = 0;
        for (i, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[i + 1..] {
                if !self.has_edge(a, b) {
                    missing += 1;
                }
            }
        }
        missing
    }

    /// Connects the neighbours of `var` pairwise, removes it, and returns its degree at
    /// elimination time.
    pub fn eliminate(&mut self, var: VarId) -> usize {
        let neighbors: Vec<VarId> = self.neighbors(var).collect();
        for (i, &a) in neighbors.iter().enumerate() {
            for &b in &neighbors[i + 1..] {
                self.add_edge(a, b);
            }
        }
        self.remove_node(var);
        neighbors.len()
    }

    /// Size of the largest clique (Bron–Kerbosch with pivoting).
    pub fn max_clique_size(&self) -> usize {
        let mut best = 0;
        let candidates: BTreeSet<VarId> = self.adjacency.keys().copied().collect();
        self.bron_kerbosch(0, candidates, BTreeSet::new(), &mut best);
        best
    }

    /// `max clique size − 1`: an admissible lower bound on the induced width of any
    /// elimination order of this graph.
    pub fn lower_bound_from_clique(&self) -> usize {
        self.max_clique_size().saturating_sub(1)
    }

    fn bron_kerbosch(
        &self,
        clique: usize,
        mut candidates: BTreeSet<VarId>,
        mut excluded: BTreeSet<VarId>,
        best: &mut usize,
    ) {
        if candidates.is_empty() {
            if excluded.is_empty() {
                *best = (*best).max(clique);
            }
            return;
        }
        if clique + candidates.len() <= *best {
            return;
        }
        let empty = BTreeSet::new();
        let pivot = candidates
            .iter()
            .chain(excluded.iter())
            .copied()
            .max_by_key(|u| {
                self.adjacency
                    .get(u)
                    .map_or(0, |n| n.intersection(&candidates).count())
            });
        let pivot_neighbors = pivot
            .and_then(|u| self.adjacency.get(&u))
            .unwrap_or(&empty);
        let branch: Vec<VarId> = candidates.difference(pivot_neighbors).copied().collect();
        for v in branch {
            let neighbors = self.adjacency.get(&v).unwrap_or(&empty);
            let next_candidates = candidates.intersection(neighbors).copied().collect();
            let next_excluded = excluded.intersection(neighbors).copied().collect();
            self.bron_kerbosch(clique + 1, next_candidates, next_excluded, best);
            candidates.remove(&v);
            excluded.insert(v);
        }
    }
}
