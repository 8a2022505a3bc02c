//! Decomposition trees for recursive conditioning.
//!
//! A dtree is a full binary tree whose leaves are factors. It is built from an
//! elimination order: for each variable in order, every subtree mentioning it is
//! composed into one; whatever remains is composed at the end.
//!
//! For an internal node `T` with children `L` and `R`:
//!
//! ```text
//! cutset(T)  = vars(L) ∩ vars(R) \ acutset(T)
//! acutset(T) = union of cutset(A) over the strict ancestors A of T
//! ```
//!
//! Conditioning on the cutset makes the two children independent. Every variable a
//! subtree shares with the rest of the tree lies in its acutset, so a leaf only ever
//! sums over variables no other leaf mentions.
//!
//! Sub-results are cached per node, keyed by the instantiation of the node's own
//! variables at entry (instantiated or not, and to which value). The key carries the
//! evidence too, so one cache stays valid across evidence changes.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::counters::InferenceCounters;
use crate::engine::factor::Factor;
use crate::engine::network::VarId;

type VarSet = SmallVec<[VarId; 8]>;
type CacheKey = SmallVec<[Option<u32>; 8]>;

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(Arc<Factor>),
    Internal { left: usize, right: usize },
}

#[derive(Debug, Clone)]
struct DtreeNode {
    kind: NodeKind,
    /// Sorted variables mentioned below this node.
    vars: VarSet,
    cutset: VarSet,
}

/// A decomposition tree with its recursive-conditioning cache.
#[derive(Debug, Clone)]
pub struct Dtree {
    nodes: Vec<DtreeNode>,
    root: Option<usize>,
    cards: Vec<usize>,
    cache: Vec<FxHashMap<CacheKey, f64>>,
    cached: usize,
    cache_limit: usize,
}

impl Dtree {
    /// Builds a dtree over `factors` by composing along `order`.
    ///
    /// `cards` holds the cardinality of every variable, indexed by [`VarId`].
    pub fn build(factors: Vec<Arc<Factor>>, order: &[VarId], cards: Vec<usize>, cache_limit: usize) -> Self {
        let mut nodes: Vec<DtreeNode> = Vec::with_capacity(factors.len() * 2);
        let mut open: Vec<usize> = Vec::with_capacity(factors.len());
        for factor in factors {
            let mut vars: VarSet = factor.scope().iter().copied().collect();
            vars.sort_unstable();
            open.push(nodes.len());
            nodes.push(DtreeNode {
                kind: NodeKind::Leaf(factor),
                vars,
                cutset: VarSet::new(),
            });
        }

        for var in order {
            let (mentioning, rest): (Vec<usize>, Vec<usize>) = open
                .into_iter()
                .partition(|&t| nodes[t].vars.binary_search(var).is_ok());
            open = rest;
            if let Some(tree) = compose_all(&mut nodes, mentioning) {
                open.push(tree);
            }
        }
        let root = compose_all(&mut nodes, open);

        if let Some(root) = root {
            assign_cutsets(&mut nodes, root);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "dtree: {} nodes, widest cutset {}",
            nodes.len(),
            nodes.iter().map(|n| n.cutset.len()).max().unwrap_or(0)
        );
        let cache = vec![FxHashMap::default(); nodes.len()];
        Self {
            nodes,
            root,
            cards,
            cache,
            cached: 0,
            cache_limit,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Variables of the root (every variable mentioned by any leaf).
    pub fn vars(&self) -> &[VarId] {
        match self.root {
            Some(root) => &self.nodes[root].vars,
            None => &[],
        }
    }

    /// Largest cutset over all internal nodes.
    pub fn max_cutset(&self) -> usize {
        self.nodes.iter().map(|n| n.cutset.len()).max().unwrap_or(0)
    }

    /// Cached sub-results currently held.
    pub fn cache_len(&self) -> usize {
        self.cached
    }

    pub fn clear_cache(&mut self) {
        self.cache.iter_mut().for_each(FxHashMap::clear);
        self.cached = 0;
    }

    /// Sum over every uninstantiated variable of the product of all leaves, under the
    /// partial `instantiation` (indexed by [`VarId`]). Leaves the instantiation as given.
    pub fn evaluate(&mut self, instantiation: &mut [Option<u32>], counters: &mut InferenceCounters) -> f64 {
        let Some(root) = self.root else {
            return 1.0;
        };
        let mut walk = Walk {
            nodes: &self.nodes,
            cards: &self.cards,
            cache: &mut self.cache,
            cached: &mut self.cached,
            cache_limit: self.cache_limit,
            counters,
        };
        walk.rc(root, instantiation)
    }
}

/// Composes trees left-deep; `None` for an empty list.
fn compose_all(nodes: &mut Vec<DtreeNode>, trees: Vec<usize>) -> Option<usize> {
    let mut trees = trees.into_iter();
    let first = trees.next()?;
    Some(trees.fold(first, |left, right| {
        let vars = union(&nodes[left].vars, &nodes[right].vars);
        nodes.push(DtreeNode {
            kind: NodeKind::Internal { left, right },
            vars,
            cutset: VarSet::new(),
        });
        nodes.len() - 1
    }))
}

fn assign_cutsets(nodes: &mut [DtreeNode], root: usize) {
    let mut stack: Vec<(usize, VarSet)> = vec![(root, VarSet::new())];
    while let Some((node, acutset)) = stack.pop() {
        let NodeKind::Internal { left, right } = nodes[node].kind else {
            continue;
        };
        let cutset: VarSet = nodes[left]
            .vars
            .iter()
            .copied()
            .filter(|v| nodes[right].vars.binary_search(v).is_ok())
            .filter(|v| acutset.binary_search(v).is_err())
            .collect();
        let below = union(&acutset, &cutset);
        nodes[node].cutset = cutset;
        stack.push((left, below.clone()));
        stack.push((right, below));
    }
}

fn union(a: &[VarId], b: &[VarId]) -> VarSet {
    let mut out = VarSet::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

struct Walk<'a> {
    nodes: &'a [DtreeNode],
    cards: &'a [usize],
    cache: &'a mut [FxHashMap<CacheKey, f64>],
    cached: &'a mut usize,
    cache_limit: usize,
    counters: &'a mut InferenceCounters,
}

impl Walk<'_> {
    fn rc(&mut self, node: usize, inst: &mut [Option<u32>]) -> f64 {
        self.counters.rc_calls += 1;
        let nodes = self.nodes;
        let current = &nodes[node];
        let (left, right) = match &current.kind {
            NodeKind::Leaf(factor) => return factor.sum_consistent(inst),
            NodeKind::Internal { left, right } => (*left, *right),
        };

        let key: CacheKey = current.vars.iter().map(|v| inst[v.index()]).collect();
        if let Some(hit) = self.cache[node].get(&key) {
            self.counters.rc_cache_hits += 1;
            return *hit;
        }

        let free: SmallVec<[VarId; 8]> = current
            .cutset
            .iter()
            .copied()
            .filter(|v| inst[v.index()].is_none())
            .collect();
        let mut total = 0.0;
        if free.iter().all(|v| self.cards[v.index()] > 0) {
            let mut digits: SmallVec<[u32; 8]> = SmallVec::from_elem(0, free.len());
            loop {
                for (var, value) in free.iter().zip(&digits) {
                    inst[var.index()] = Some(*value);
                }
                let l = self.rc(left, inst);
                if l != 0.0 {
                    total += l * self.rc(right, inst);
                }
                let mut k = 0;
                while k < free.len() {
                    digits[k] += 1;
                    if (digits[k] as usize) < self.cards[free[k].index()] {
                        break;
                    }
                    digits[k] = 0;
                    k += 1;
                }
                if k == free.len() {
                    break;
                }
            }
            for var in &free {
                inst[var.index()] = None;
            }
        }

        if *self.cached >= self.cache_limit {
            self.cache.iter_mut().for_each(FxHashMap::clear);
            *self.cached = 0;
        }
        self.cache[node].insert(key, total);
        *self.cached += 1;
        total
    }
}
