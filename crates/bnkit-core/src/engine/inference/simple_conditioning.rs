//! Simple conditioning: enumeration over the relevant ancestral slice.
//!
//! For a known assignment `K` (evidence, plus the queried value), only the ancestral
//! closure of `K` matters; every other variable is barren and sums to one. The engine
//! enumerates the nuisance variables of that slice depth-first in topological order,
//! multiplying CPT entries as it descends.
//!
//! The enumeration memoizes each depth on its *frontier*: the already assigned
//! variables that still have a child further down. Two prefixes agreeing on the
//! frontier have identical suffix sums.
//!
//! Results are cached at two levels: per compute cycle by `(variable, value)`, and
//! across queries in a bounded LRU keyed by the known assignment, then by the nuisance
//! variable set. Clones of an engine share the cross-query cache.

use std::sync::Arc;

use moka::sync::Cache;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::BnResult;
use crate::engine::evidence::Evidence;
use crate::engine::inference::{EngineConfig, EngineState, InferenceEngine};
use crate::engine::network::{Network, VarId};

type NuisanceKey = SmallVec<[VarId; 16]>;
type FrontierKey = (usize, SmallVec<[u32; 8]>);

/// Exact inference by enumerating the relevant ancestral slice of each query.
#[derive(Debug, Clone)]
pub struct SimpleConditioningEngine {
    network: Arc<Network>,
    state: EngineState,
    cycle: FxHashMap<(VarId, usize), f64>,
    shared: Cache<Evidence, Cache<NuisanceKey, f64>>,
}

impl SimpleConditioningEngine {
    pub fn new(network: Arc<Network>) -> BnResult<Self> {
        Self::with_config(network, EngineConfig::default())
    }

    pub fn with_config(network: Arc<Network>, config: EngineConfig) -> BnResult<Self> {
        network.validate()?;
        let state = EngineState::new(config)?;
        let shared = Cache::new(state.config().simple_cache_capacity);
        Ok(Self {
            network,
            state,
            cycle: FxHashMap::default(),
            shared,
        })
    }

    /// Drops every cross-query cache entry.
    pub fn clear_shared_cache(&self) {
        self.shared.invalidate_all();
    }

    /// Sum of the joint over the nuisance variables of `known`'s ancestral slice.
    fn slice_probability(&mut self, known: &Evidence) -> f64 {
        let mask = self.network.ancestor_mask(known.vars());
        let relevant: Vec<VarId> = self
            .network
            .topological_order()
            .iter()
            .copied()
            .filter(|var| mask[var.index()])
            .collect();
        let mut nuisance: NuisanceKey = relevant
            .iter()
            .copied()
            .filter(|var| !known.contains(*var))
            .collect();
        nuisance.sort_unstable();

        let inner = self.shared.get(known);
        if let Some(hit) = inner.as_ref().and_then(|inner| inner.get(&nuisance)) {
            self.state.counters_mut().simple_cache_hits += 1;
            return hit;
        }

        let mut enumeration = Enumeration::new(&self.network, &relevant, known);
        let probability = enumeration.sum(0);
        self.state.counters_mut().enumerated_assignments += enumeration.leaves;

        let inner = inner.unwrap_or_else(|| {
            let fresh = Cache::new(self.state.config().simple_cache_nuisance_capacity);
            self.shared.insert(known.clone(), fresh.clone());
            fresh
        });
        inner.insert(nuisance, probability);
        probability
    }
}

struct Enumeration<'a> {
    network: &'a Network,
    relevant: &'a [VarId],
    known: Vec<Option<u32>>,
    /// Per depth: assigned variables with a child at this depth or deeper.
    frontier: Vec<SmallVec<[VarId; 8]>>,
    values: Vec<usize>,
    memo: FxHashMap<FrontierKey, f64>,
    leaves: u64,
}

impl<'a> Enumeration<'a> {
    fn new(network: &'a Network, relevant: &'a [VarId], known: &Evidence) -> Self {
        // last depth at which each variable is still needed as a parent
        let mut last_use = vec![0usize; network.len()];
        for (depth, var) in relevant.iter().enumerate() {
            for parent in network.variable(*var).parents() {
                last_use[parent.index()] = last_use[parent.index()].max(depth);
            }
        }
        let frontier = (0..=relevant.len())
            .map(|depth| {
                relevant[..depth]
                    .iter()
                    .copied()
                    .filter(|var| last_use[var.index()] >= depth)
                    .collect()
            })
            .collect();

        let known_dense = known.to_instantiation(network.len());
        let mut values = vec![0usize; network.len()];
        for (var, value) in known.iter() {
            values[var.index()] = value;
        }
        Self {
            network,
            relevant,
            known: known_dense,
            frontier,
            values,
            memo: FxHashMap::default(),
            leaves: 0,
        }
    }

    fn sum(&mut self, depth: usize) -> f64 {
        if depth == self.relevant.len() {
            self.leaves += 1;
            return 1.0;
        }
        let key: FrontierKey = (
            depth,
            self.frontier[depth]
                .iter()
                .map(|var| self.values[var.index()] as u32)
                .collect(),
        );
        if let Some(hit) = self.memo.get(&key) {
            return *hit;
        }

        let network = self.network;
        let var = self.relevant[depth];
        let variable = network.variable(var);
        let total = match self.known[var.index()] {
            Some(value) => {
                let p = variable.probability_given(value as usize, &self.values);
                if p == 0.0 {
                    0.0
                } else {
                    p * self.sum(depth + 1)
                }
            }
            None => {
                let mut total = 0.0;
                for value in 0..variable.cardinality() {
                    let p = variable.probability_given(value, &self.values);
                    if p == 0.0 {
                        continue;
                    }
                    self.values[var.index()] = value;
                    total += p * self.sum(depth + 1);
                    if total >= 1.0 {
                        break;
                    }
                }
                total
            }
        };
        self.memo.insert(key, total);
        total
    }
}

impl InferenceEngine for SimpleConditioningEngine {
    fn network(&self) -> &Network {
        &self.network
    }

    fn state(&self) -> &EngineState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    fn recompute(&mut self) -> BnResult<()> {
        self.cycle.clear();
        Ok(())
    }

    fn unnormalized_posterior(&mut self, var: VarId) -> BnResult<Vec<f64>> {
        let card = self.network.variable(var).cardinality();
        let mut posterior = Vec::with_capacity(card);
        for value in 0..card {
            if let Some(hit) = self.cycle.get(&(var, value)) {
                self.state.counters_mut().simple_cache_hits += 1;
                posterior.push(*hit);
                continue;
            }
            let mut known = self.state.evidence().clone();
            known.set(var, value);
            let probability = self.slice_probability(&known);
            self.cycle.insert((var, value), probability);
            posterior.push(probability);
        }
        Ok(posterior)
    }

    fn joint_evidence_probability(&mut self) -> BnResult<f64> {
        let evidence = self.state.evidence().clone();
        Ok(self.slice_probability(&evidence))
    }
}
