//! Recursive conditioning.
//!
//! Two dtrees are kept. The baseline tree is built once over the full family factors
//! and answers `P(e)` for any evidence; its cache is keyed by evidence too and survives
//! evidence changes. The reduced tree is built over the family factors restricted to
//! the current evidence, so evidence variables disappear from it entirely; it answers
//! single-variable conditionals and is rebuilt lazily after every evidence change.

use std::sync::Arc;

use crate::engine::cancel::CancellationToken;
use crate::engine::elimination_order::EliminationOrder;
use crate::engine::errors::BnResult;
use crate::engine::factor::Factor;
use crate::engine::inference::dtree::Dtree;
use crate::engine::inference::{search_network_order, EngineConfig, EngineState, InferenceEngine};
use crate::engine::network::{Network, VarId};

/// Exact inference by recursive conditioning over decomposition trees.
#[derive(Debug, Clone)]
pub struct RecursiveConditioningEngine {
    network: Arc<Network>,
    state: EngineState,
    order: Option<Arc<EliminationOrder>>,
    baseline: Option<Dtree>,
    reduced: Option<Dtree>,
    cancel: CancellationToken,
}

impl RecursiveConditioningEngine {
    pub fn new(network: Arc<Network>) -> BnResult<Self> {
        Self::with_config(network, EngineConfig::default())
    }

    pub fn with_config(network: Arc<Network>, config: EngineConfig) -> BnResult<Self> {
        network.validate()?;
        Ok(Self {
            network,
            state: EngineState::new(config)?,
            order: None,
            baseline: None,
            reduced: None,
            cancel: CancellationToken::never(),
        })
    }

    /// Token polled by the order search.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn order(&mut self) -> BnResult<Arc<EliminationOrder>> {
        if let Some(order) = &self.order {
            return Ok(order.clone());
        }
        let order = search_network_order(&self.network, &mut self.state, &self.cancel)?;
        self.order = Some(order.clone());
        Ok(order)
    }

    fn cardinalities(&self) -> Vec<usize> {
        self.network
            .variables()
            .iter()
            .map(|v| v.cardinality())
            .collect()
    }

    fn baseline(&mut self) -> BnResult<&mut Dtree> {
        let tree = match self.baseline.take() {
            Some(tree) => tree,
            None => {
                let order = self.order()?;
                let factors = self.network.ids().map(|var| self.network.factor(var)).collect();
                Dtree::build(
                    factors,
                    &order.order,
                    self.cardinalities(),
                    self.state.config().rc_cache_limit,
                )
            }
        };
        Ok(self.baseline.insert(tree))
    }

    fn reduced(&mut self) -> BnResult<&mut Dtree> {
        let tree = match self.reduced.take() {
            Some(tree) => tree,
            None => {
                let order = self.order()?;
                let evidence = self.state.evidence().clone();
                let factors = self
                    .network
                    .ids()
                    .map(|var| {
                        let family = self.network.factor(var);
                        if !evidence.vars().any(|e| family.contains(e)) {
                            return family;
                        }
                        let mut reduced = Factor::clone(&family);
                        for (var, value) in evidence.iter() {
                            reduced = reduced.restrict(var, value);
                        }
                        Arc::new(reduced)
                    })
                    .collect();
                Dtree::build(
                    factors,
                    &order.order,
                    self.cardinalities(),
                    self.state.config().rc_cache_limit,
                )
            }
        };
        Ok(self.reduced.insert(tree))
    }

    /// Cached sub-results held by the baseline and reduced trees.
    pub fn cache_len(&self) -> usize {
        self.baseline.as_ref().map_or(0, Dtree::cache_len)
            + self.reduced.as_ref().map_or(0, Dtree::cache_len)
    }
}

impl InferenceEngine for RecursiveConditioningEngine {
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
        self.order()?;
        self.reduced = None;
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "recursive conditioning: reduced dtree dropped for {} evidence entries",
            self.state.evidence().len()
        );
        Ok(())
    }

    fn unnormalized_posterior(&mut self, var: VarId) -> BnResult<Vec<f64>> {
        let card = self.network.variable(var).cardinality();
        let mut instantiation = vec![None; self.network.len()];
        let mut counters = *self.state.counters();
        let tree = self.reduced()?;
        let mut posterior = Vec::with_capacity(card);
        for value in 0..card {
            instantiation[var.index()] = Some(value as u32);
            posterior.push(tree.evaluate(&mut instantiation, &mut counters));
        }
        *self.state.counters_mut() = counters;
        Ok(posterior)
    }

    fn joint_evidence_probability(&mut self) -> BnResult<f64> {
        let mut instantiation = self.state.evidence().to_instantiation(self.network.len());
        let mut counters = *self.state.counters();
        let probability = self.baseline()?.evaluate(&mut instantiation, &mut counters);
        *self.state.counters_mut() = counters;
        Ok(probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inference::EliminationEngine;

    /// Rain → Sprinkler, {Rain, Sprinkler} → WetGrass.
    fn sprinkler() -> Arc<Network> {
        let mut net = Network::new("sprinkler");
        let rain = net.add_variable("rain", ["no", "yes"]).unwrap();
        let sprinkler = net.add_variable("sprinkler", ["off", "on"]).unwrap();
        let wet = net.add_variable("wet", ["dry", "wet"]).unwrap();
        net.add_parent(sprinkler, rain).unwrap();
        net.add_parent(wet, rain).unwrap();
        net.add_parent(wet, sprinkler).unwrap();
        net.set_cpt(rain, vec![0.8, 0.2]).unwrap();
        net.set_cpt(sprinkler, vec![0.6, 0.4, 0.99, 0.01]).unwrap();
        net.set_cpt(wet, vec![1.0, 0.0, 0.2, 0.8, 0.1, 0.9, 0.01, 0.99]).unwrap();
        Arc::new(net)
    }

    #[test]
    fn matches_elimination() {
        let net = sprinkler();
        let mut rc = RecursiveConditioningEngine::new(net.clone()).unwrap();
        let mut ve = EliminationEngine::new(net).unwrap();
        for engine in [&mut rc as &mut dyn InferenceEngine, &mut ve] {
            engine.add_evidence("wet", "wet").unwrap();
        }
        let p_rc = rc.conditional_probability("rain", "yes").unwrap();
        let p_ve = ve.conditional_probability("rain", "yes").unwrap();
        assert!((p_rc - p_ve).abs() < 1e-12);
        let e_rc = rc.probability_of_evidence().unwrap();
        let e_ve = ve.probability_of_evidence().unwrap();
        assert!((e_rc - e_ve).abs() < 1e-12);
        assert!((e_rc - 0.44838).abs() < 1e-9);
    }

    #[test]
    fn baseline_cache_survives_evidence_changes() {
        let mut rc = RecursiveConditioningEngine::new(sprinkler()).unwrap();
        rc.add_evidence("wet", "wet").unwrap();
        let first = rc.probability_of_evidence().unwrap();
        rc.add_evidence("wet", "dry").unwrap();
        let dry = rc.probability_of_evidence().unwrap();
        assert!((first + dry - 1.0).abs() < 1e-12);

        rc.add_evidence("wet", "wet").unwrap();
        rc.reset_counters();
        let again = rc.probability_of_evidence().unwrap();
        assert_eq!(first, again);
        assert!(rc.counters().rc_cache_hits >= 1);
    }

    #[test]
    fn worked_example() {
        let mut net = Network::new("census");
        let gender = net.add_variable("gender", ["male", "female"]).unwrap();
        let age = net.add_variable("age", ["<15", ">=15"]).unwrap();
        net.add_parent(age, gender).unwrap();
        net.set_cpt(gender, vec![0.55, 0.45]).unwrap();
        net.set_cpt(age, vec![0.55, 0.45, 0.50, 0.50]).unwrap();
        let mut rc = RecursiveConditioningEngine::new(Arc::new(net)).unwrap();
        assert!((rc.conditional_probability("age", "<15").unwrap() - 0.5275).abs() < 1e-12);
        rc.add_evidence("gender", "male").unwrap();
        assert!((rc.conditional_probability("age", "<15").unwrap() - 0.55).abs() < 1e-12);
        assert!(rc.cache_len() > 0);
    }
}
