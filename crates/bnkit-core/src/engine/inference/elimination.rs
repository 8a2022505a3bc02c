//! Variable elimination.
//!
//! The engine searches one global elimination order for the whole network (lazily, on
//! first use) and reuses it for every query. Evidence is applied by zeroing the
//! inconsistent entries of each family factor. A query only touches the ancestral
//! closure of the query and evidence variables; barren descendants sum to one and are
//! skipped.

use std::sync::Arc;

use crate::engine::cancel::CancellationToken;
use crate::engine::counters::InferenceCounters;
use crate::engine::elimination_order::EliminationOrder;
use crate::engine::errors::{BnError, BnResult};
use crate::engine::factor::Factor;
use crate::engine::inference::{search_network_order, EngineConfig, EngineState, InferenceEngine};
use crate::engine::network::{Network, VarId};

/// Exact inference by bucket elimination along a searched order.
#[derive(Debug, Clone)]
pub struct EliminationEngine {
    network: Arc<Network>,
    state: EngineState,
    order: Option<Arc<EliminationOrder>>,
    observed: Vec<Arc<Factor>>,
    cancel: CancellationToken,
}

impl EliminationEngine {
    pub fn new(network: Arc<Network>) -> BnResult<Self> {
        Self::with_config(network, EngineConfig::default())
    }

    pub fn with_config(network: Arc<Network>, config: EngineConfig) -> BnResult<Self> {
        network.validate()?;
        Ok(Self {
            network,
            state: EngineState::new(config)?,
            order: None,
            observed: Vec::new(),
            cancel: CancellationToken::never(),
        })
    }

    /// Token polled by the order search.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The global elimination order, searched on first use.
    pub fn elimination_order(&mut self) -> BnResult<Arc<EliminationOrder>> {
        if let Some(order) = &self.order {
            return Ok(order.clone());
        }
        let order = search_network_order(&self.network, &mut self.state, &self.cancel)?;
        self.order = Some(order.clone());
        Ok(order)
    }

    /// Multiplies the family factors selected by `relevant` and sums out every
    /// variable except `keep`.
    fn eliminate(&mut self, relevant: &[bool], keep: Option<VarId>) -> BnResult<Factor> {
        let order = self.elimination_order()?;
        let mut pool: Vec<Arc<Factor>> = self
            .network
            .ids()
            .filter(|var| relevant[var.index()])
            .map(|var| self.observed[var.index()].clone())
            .collect();

        let counters = self.state.counters_mut();
        for &var in order.order.iter() {
            if !relevant[var.index()] || Some(var) == keep {
                continue;
            }
            let (bucket, rest): (Vec<_>, Vec<_>) = pool.into_iter().partition(|f| f.contains(var));
            pool = rest;
            let Some(product) = multiply_all(&bucket, counters) else {
                continue;
            };
            let summed = product.sum_out(var);
            counters.factor_entries += summed.len() as u64;
            pool.push(Arc::new(summed));
        }

        multiply_all(&pool, counters).ok_or_else(|| {
            BnError::Internal("variable elimination ended with no factors".into())
        })
    }
}

fn multiply_all(factors: &[Arc<Factor>], counters: &mut InferenceCounters) -> Option<Factor> {
    let (first, rest) = factors.split_first()?;
    let mut product = Factor::clone(first);
    for factor in rest {
        product = product.multiply(factor);
        counters.factor_multiplications += 1;
        counters.factor_entries += product.len() as u64;
    }
    Some(product)
}

impl InferenceEngine for EliminationEngine {
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
        self.elimination_order()?;
        let evidence = self.state.evidence().clone();
        self.observed = self
            .network
            .ids()
            .map(|var| {
                let factor = self.network.factor(var);
                if evidence.vars().any(|e| factor.contains(e)) {
                    let mut reduced = Factor::clone(&factor);
                    reduced.observe_all(&evidence);
                    Arc::new(reduced)
                } else {
                    factor
                }
            })
            .collect();
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "elimination engine: applied {} evidence entries",
            evidence.len()
        );
        Ok(())
    }

    fn unnormalized_posterior(&mut self, var: VarId) -> BnResult<Vec<f64>> {
        let relevant = self
            .network
            .ancestor_mask(self.state.evidence().vars().chain(std::iter::once(var)));
        let result = self.eliminate(&relevant, Some(var))?;
        let card = self.network.variable(var).cardinality();
        (0..card).map(|value| result.get(&[(var, value)])).collect()
    }

    fn joint_evidence_probability(&mut self) -> BnResult<f64> {
        let relevant = self.network.ancestor_mask(self.state.evidence().vars());
        let result = self.eliminate(&relevant, None)?;
        Ok(result.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn census() -> Arc<Network> {
        let mut net = Network::new("census");
        let gender = net.add_variable("gender", ["male", "female"]).unwrap();
        let age = net.add_variable("age", ["<15", ">=15"]).unwrap();
        net.add_parent(age, gender).unwrap();
        net.set_cpt(gender, vec![0.55, 0.45]).unwrap();
        net.set_cpt(age, vec![0.55, 0.45, 0.50, 0.50]).unwrap();
        Arc::new(net)
    }

    #[test]
    fn prior_and_posterior() {
        let mut engine = EliminationEngine::new(census()).unwrap();
        let p = engine.conditional_probability("age", "<15").unwrap();
        assert!((p - 0.5275).abs() < 1e-12);

        engine.add_evidence("gender", "male").unwrap();
        let p = engine.conditional_probability("age", "<15").unwrap();
        assert!((p - 0.55).abs() < 1e-12);
        assert!((engine.probability_of_evidence().unwrap() - 0.55).abs() < 1e-12);
    }

    #[test]
    fn diagnostic_query_uses_bayes_rule() {
        let mut engine = EliminationEngine::new(census()).unwrap();
        engine.add_evidence("age", "<15").unwrap();
        let p = engine.conditional_probability("gender", "male").unwrap();
        assert!((p - 0.55 * 0.55 / 0.5275).abs() < 1e-12);
        assert!((engine.probability_of_evidence().unwrap() - 0.5275).abs() < 1e-12);
    }

    #[test]
    fn evidence_short_circuit_and_state_machine() {
        let mut engine = EliminationEngine::new(census()).unwrap();
        engine.add_evidence("gender", "female").unwrap();
        assert!(engine.is_dirty());
        assert_eq!(engine.conditional_probability("gender", "female").unwrap(), 1.0);
        assert_eq!(engine.conditional_probability("gender", "male").unwrap(), 0.0);
        assert!(engine.is_dirty());
        engine.compute().unwrap();
        assert!(!engine.is_dirty());
        engine.clear_evidence();
        assert_eq!(engine.probability_of_evidence().unwrap(), 1.0);
    }

    #[test]
    fn impossible_evidence_follows_policy() {
        let mut net = Network::new("n");
        let a = net.add_variable("a", ["x", "y"]).unwrap();
        let b = net.add_variable("b", ["x", "y", "z"]).unwrap();
        net.add_parent(b, a).unwrap();
        net.set_cpt(a, vec![1.0, 0.0]).unwrap();
        net.set_cpt(b, vec![0.2, 0.3, 0.5, 0.1, 0.1, 0.8]).unwrap();
        let mut engine = EliminationEngine::new(Arc::new(net)).unwrap();
        engine.add_evidence("a", "y").unwrap();
        assert_eq!(engine.probability_of_evidence().unwrap(), 0.0);
        let posterior = engine.marginal("b").unwrap();
        for p in posterior.iter() {
            assert!((p - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn counters_track_work() {
        let mut engine = EliminationEngine::new(census()).unwrap();
        engine.conditional_probability("age", "<15").unwrap();
        let counters = engine.counters();
        assert_eq!(counters.recomputations, 1);
        assert!(counters.factor_multiplications >= 1);
        engine.reset_counters();
        assert_eq!(engine.counters(), InferenceCounters::default());
    }

    #[test]
    fn rejects_invalid_networks() {
        let mut net = Network::new("n");
        net.add_variable("a", ["x", "y"]).unwrap();
        assert!(matches!(
            EliminationEngine::new(Arc::new(net)),
            Err(BnError::MalformedCpt { .. })
        ));
    }
}
