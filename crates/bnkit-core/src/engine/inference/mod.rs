//! Exact inference engines.
//!
//! Three algorithms share one contract, [`InferenceEngine`]:
//!
//! - **elimination**: variable elimination along a searched elimination order
//! - **recursive_conditioning**: recursive conditioning over decomposition trees
//! - **simple_conditioning**: enumeration over the relevant ancestral slice with caching
//!
//! ## Evidence state machine
//!
//! Every engine holds an [`EngineState`]. Changing evidence marks it dirty; the next
//! query calls [`compute`](InferenceEngine::compute) transparently. Two answers never
//! touch the algorithm: a query on an evidenced variable (1.0 or 0.0) and the
//! probability of empty evidence (1.0).
//!
//! Posterior vectors are cached per compute cycle in the shared state, so the engines
//! only implement the unnormalized posterior `P(X = x, e)` and `P(e)`.

pub mod dtree;
pub mod elimination;
pub mod recursive_conditioning;
pub mod simple_conditioning;

use std::sync::Arc;

use rand::RngCore;
use rustc_hash::FxHashMap;

use crate::engine::cancel::CancellationToken;
use crate::engine::counters::InferenceCounters;
use crate::engine::elimination_order::{EliminationOrder, EliminationOrderConfig, EliminationOrderSearch};
use crate::engine::errors::{BnError, BnResult};
use crate::engine::evidence::Evidence;
use crate::engine::moral_graph::MoralGraph;
use crate::engine::network::{Network, VarId};
use crate::engine::sampling::ForwardSampler;

pub use elimination::EliminationEngine;
pub use recursive_conditioning::RecursiveConditioningEngine;
pub use simple_conditioning::SimpleConditioningEngine;

/// What a conditional query returns when the evidence has probability zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ZeroEvidencePolicy {
    /// Every value of the queried variable gets `1 / |domain|`.
    #[default]
    Equiprobable,
    /// Every value of the queried variable gets 0.
    Zero,
}

/// Configuration shared by the inference engines.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EngineConfig {
    /// Conditional queries under impossible evidence.
    pub zero_evidence: ZeroEvidencePolicy,
    /// Limits for the elimination-order search.
    pub order_search: EliminationOrderConfig,
    /// Cached sub-results per dtree before the cache is flushed.
    pub rc_cache_limit: usize,
    /// Known-assignment keys held by the simple-conditioning cross-query cache.
    pub simple_cache_capacity: u64,
    /// Nuisance-set keys held per known-assignment key.
    pub simple_cache_nuisance_capacity: u64,
    /// Cumulative distributions kept by the forward sampler before it is flushed.
    pub sampler_cache_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            zero_evidence: ZeroEvidencePolicy::default(),
            order_search: EliminationOrderConfig::default(),
            rc_cache_limit: 1 << 20,
            simple_cache_capacity: 5_000,
            simple_cache_nuisance_capacity: 100,
            sampler_cache_limit: 100_000,
        }
    }
}

impl EngineConfig {
    pub fn validate(self) -> BnResult<Self> {
        self.order_search.validate()?;
        if self.rc_cache_limit == 0 {
            return Err(BnError::InvalidConfig(
                "engine: rc_cache_limit must be > 0".into(),
            ));
        }
        if self.simple_cache_capacity == 0 || self.simple_cache_nuisance_capacity == 0 {
            return Err(BnError::InvalidConfig(
                "engine: simple-conditioning cache capacities must be > 0".into(),
            ));
        }
        if self.sampler_cache_limit == 0 {
            return Err(BnError::InvalidConfig(
                "engine: sampler_cache_limit must be > 0".into(),
            ));
        }
        Ok(self)
    }
}

/// Evidence plus the per-cycle caches every engine carries.
#[derive(Debug, Clone)]
pub struct EngineState {
    config: EngineConfig,
    evidence: Evidence,
    dirty: bool,
    posteriors: FxHashMap<VarId, Arc<[f64]>>,
    evidence_probability: Option<f64>,
    sampler: ForwardSampler,
    counters: InferenceCounters,
}

impl EngineState {
    pub fn new(config: EngineConfig) -> BnResult<Self> {
        let config = config.validate()?;
        Ok(Self {
            config,
            evidence: Evidence::new(),
            dirty: true,
            posteriors: FxHashMap::default(),
            evidence_probability: None,
            sampler: ForwardSampler::new(config.sampler_cache_limit),
            counters: InferenceCounters::default(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn evidence(&self) -> &Evidence {
        &self.evidence
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn counters(&self) -> &InferenceCounters {
        &self.counters
    }

    pub fn counters_mut(&mut self) -> &mut InferenceCounters {
        &mut self.counters
    }

    fn set(&mut self, var: VarId, value: usize) {
        if self.evidence.set(var, value) {
            self.dirty = true;
        }
    }

    fn remove(&mut self, var: VarId) {
        if self.evidence.remove(var) {
            self.dirty = true;
        }
    }

    fn replace(&mut self, evidence: Evidence) {
        if self.evidence != evidence {
            self.evidence = evidence;
            self.dirty = true;
        }
    }

    fn discard_cycle(&mut self) {
        self.posteriors.clear();
        self.evidence_probability = None;
    }
}

/// Searches an elimination order for the whole network and records the expansions.
pub(crate) fn search_network_order(
    network: &Network,
    state: &mut EngineState,
    cancel: &CancellationToken,
) -> BnResult<Arc<EliminationOrder>> {
    let result = EliminationOrderSearch::new(MoralGraph::of_network(network))
        .with_config(state.config().order_search)
        .with_cancellation(cancel.clone())
        .run()?;
    state.counters_mut().search_expansions += result.expansions;
    #[cfg(feature = "tracing")]
    tracing::debug!(
        "order search: width {} (exact: {}) for '{}'",
        result.width,
        result.exact,
        network.name()
    );
    Ok(Arc::new(result))
}

/// The contract shared by the exact inference engines.
///
/// Implementors provide the network, the shared state and three algorithm hooks;
/// everything else (evidence handling, short-circuits, normalization, sampling) is
/// provided.
pub trait InferenceEngine {
    fn network(&self) -> &Network;

    fn state(&self) -> &EngineState;

    fn state_mut(&mut self) -> &mut EngineState;

    /// Rebuilds algorithm structures for the current evidence.
    fn recompute(&mut self) -> BnResult<()>;

    /// `P(var = x, e)` for every value `x` of a variable that is not in the evidence.
    fn unnormalized_posterior(&mut self, var: VarId) -> BnResult<Vec<f64>>;

    /// `P(e)` for non-empty evidence.
    fn joint_evidence_probability(&mut self) -> BnResult<f64>;

    fn evidence(&self) -> &Evidence {
        self.state().evidence()
    }

    fn counters(&self) -> InferenceCounters {
        *self.state().counters()
    }

    fn reset_counters(&mut self) {
        self.state_mut().counters_mut().reset();
    }

    /// Whether evidence changed since the last [`compute`](Self::compute).
    fn is_dirty(&self) -> bool {
        self.state().is_dirty()
    }

    /// Asserts `var = value` by name.
    fn add_evidence(&mut self, var: &str, value: &str) -> BnResult<()> {
        let (var, value) = self.network().resolve(var, value)?;
        self.state_mut().set(var, value);
        Ok(())
    }

    /// Asserts every `name → label` pair, or none of them if any is invalid.
    fn add_evidence_map<'a, I>(&mut self, pairs: I) -> BnResult<()>
    where
        Self: Sized,
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let parsed = Evidence::from_labels(self.network(), pairs)?;
        for (var, value) in parsed.iter() {
            self.state_mut().set(var, value);
        }
        Ok(())
    }

    /// Asserts `var = value` by index.
    fn set_evidence(&mut self, var: VarId, value: usize) -> BnResult<()> {
        let variable = self
            .network()
            .get(var)
            .ok_or_else(|| BnError::UnknownVariable(format!("#{}", var.0)))?;
        if value >= variable.cardinality() {
            return Err(BnError::ValueNotInDomain {
                variable: variable.name().to_string(),
                value: format!("#{}", value),
            });
        }
        self.state_mut().set(var, value);
        Ok(())
    }

    fn remove_evidence(&mut self, var: VarId) {
        self.state_mut().remove(var);
    }

    fn clear_evidence(&mut self) {
        self.state_mut().replace(Evidence::new());
    }

    /// Swaps in a whole evidence set (used to restore evidence after sampling).
    fn replace_evidence(&mut self, evidence: Evidence) {
        self.state_mut().replace(evidence);
    }

    /// Brings the engine up to date with its evidence. No-op when clean.
    ///
    /// A failing recomputation leaves the engine dirty with no cached results.
    fn compute(&mut self) -> BnResult<()> {
        if !self.state().is_dirty() {
            return Ok(());
        }
        self.state_mut().discard_cycle();
        self.state_mut().counters_mut().recomputations += 1;
        match self.recompute() {
            Ok(()) => {
                self.state_mut().dirty = false;
                Ok(())
            }
            Err(err) => {
                self.state_mut().discard_cycle();
                Err(err)
            }
        }
    }

    /// Posterior distribution of one variable given the evidence.
    fn marginal_of(&mut self, var: VarId) -> BnResult<Arc<[f64]>> {
        let card = self
            .network()
            .get(var)
            .ok_or_else(|| BnError::UnknownVariable(format!("#{}", var.0)))?
            .cardinality();
        if let Some(observed) = self.evidence().get(var) {
            let mut one_hot = vec![0.0; card];
            one_hot[observed] = 1.0;
            return Ok(one_hot.into());
        }
        self.compute()?;
        if let Some(cached) = self.state().posteriors.get(&var) {
            return Ok(cached.clone());
        }
        let mut posterior = self.unnormalized_posterior(var)?;
        let total: f64 = posterior.iter().sum();
        if total > 0.0 {
            posterior.iter_mut().for_each(|p| *p /= total);
        } else {
            let fill = match self.state().config().zero_evidence {
                ZeroEvidencePolicy::Equiprobable => 1.0 / card.max(1) as f64,
                ZeroEvidencePolicy::Zero => 0.0,
            };
            posterior.iter_mut().for_each(|p| *p = fill);
        }
        let posterior: Arc<[f64]> = posterior.into();
        self.state_mut().posteriors.insert(var, posterior.clone());
        Ok(posterior)
    }

    /// Posterior distribution of a variable by name.
    fn marginal(&mut self, var: &str) -> BnResult<Arc<[f64]>> {
        let var = self.network().variable_id(var)?;
        self.marginal_of(var)
    }

    /// Posterior distributions of every variable, indexed by [`VarId`].
    fn marginals(&mut self) -> BnResult<Vec<Arc<[f64]>>> {
        let ids: Vec<VarId> = self.network().ids().collect();
        ids.into_iter().map(|var| self.marginal_of(var)).collect()
    }

    /// `P(var = value | e)` by index.
    fn conditional_probability_at(&mut self, var: VarId, value: usize) -> BnResult<f64> {
        if let Some(observed) = self.evidence().get(var) {
            return Ok(if observed == value { 1.0 } else { 0.0 });
        }
        let posterior = self.marginal_of(var)?;
        posterior.get(value).copied().ok_or_else(|| {
            BnError::ValueNotInDomain {
                variable: self.network().variable(var).name().to_string(),
                value: format!("#{}", value),
            }
        })
    }

    /// `P(var = value | e)` by name.
    fn conditional_probability(&mut self, var: &str, value: &str) -> BnResult<f64> {
        let (var, value) = self.network().resolve(var, value)?;
        self.conditional_probability_at(var, value)
    }

    /// `P(e)`; exactly 1.0 for empty evidence.
    fn probability_of_evidence(&mut self) -> BnResult<f64> {
        if self.evidence().is_empty() {
            return Ok(1.0);
        }
        self.compute()?;
        if let Some(cached) = self.state().evidence_probability {
            return Ok(cached);
        }
        let probability = self.joint_evidence_probability()?;
        self.state_mut().evidence_probability = Some(probability);
        Ok(probability)
    }

    /// Probability of one external record (missing cells are unobserved).
    ///
    /// The engine's own evidence is restored afterwards.
    fn probability_of_row<I, K, V>(&mut self, row: I) -> BnResult<f64>
    where
        Self: Sized,
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let record = Evidence::from_row(self.network(), row)?;
        let saved = self.evidence().clone();
        self.replace_evidence(record);
        let result = self.probability_of_evidence();
        self.replace_evidence(saved);
        result
    }

    /// Draws one complete assignment (indexed by [`VarId`]) consistent with the evidence.
    ///
    /// The evidence is unchanged afterwards.
    fn sample_one(&mut self, rng: &mut dyn RngCore) -> BnResult<Vec<usize>> {
        let mut sampler = std::mem::take(&mut self.state_mut().sampler);
        let result = sampler.sample_one(self, rng);
        self.state_mut().sampler = sampler;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_capacities_are_rejected() {
        let config = EngineConfig {
            simple_cache_capacity: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(BnError::InvalidConfig(_))));
        let config = EngineConfig {
            rc_cache_limit: 0,
            ..EngineConfig::default()
        };
        assert!(EngineState::new(config).is_err());
    }
}
