//! Sampling from a network given evidence.
//!
//! [`ForwardSampler`] draws one complete assignment at a time by walking the network in
//! topological order and asking the engine for each variable's conditional. The
//! stratified samplers in [`stratified`] generate exact-count populations instead.

pub mod stratified;

use std::sync::Arc;

use rand::{Rng, RngCore};
use rustc_hash::FxHashMap;

use crate::engine::errors::{BnError, BnResult};
use crate::engine::evidence::Evidence;
use crate::engine::inference::InferenceEngine;
use crate::engine::network::VarId;

pub use stratified::{RemainderStrategy, Stratum, StratifiedConfig, StratifiedSampler};

/// One-at-a-time sampler shared by every engine.
///
/// Caches the cumulative distribution of each variable under each evidence set it has
/// seen; the cache is flushed once it holds `limit` tables.
#[derive(Debug, Clone, Default)]
pub struct ForwardSampler {
    cdfs: FxHashMap<(VarId, Evidence), Arc<[f64]>>,
    limit: usize,
}

impl ForwardSampler {
    pub fn new(limit: usize) -> Self {
        Self {
            cdfs: FxHashMap::default(),
            limit,
        }
    }

    /// Cached cumulative tables.
    pub fn len(&self) -> usize {
        self.cdfs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cdfs.is_empty()
    }

    /// Draws one assignment indexed by [`VarId`] consistent with the engine's evidence.
    ///
    /// Drawn values are asserted as evidence while walking and the original evidence is
    /// restored afterwards, also on failure.
    pub fn sample_one<E>(&mut self, engine: &mut E, rng: &mut dyn RngCore) -> BnResult<Vec<usize>>
    where
        E: InferenceEngine + ?Sized,
    {
        if engine.probability_of_evidence()? == 0.0 {
            return Err(BnError::InfeasibleEvidence);
        }
        let original = engine.evidence().clone();
        let result = self.walk(engine, rng, &original);
        engine.replace_evidence(original);
        result
    }

    fn walk<E>(&mut self, engine: &mut E, rng: &mut dyn RngCore, original: &Evidence) -> BnResult<Vec<usize>>
    where
        E: InferenceEngine + ?Sized,
    {
        let order = engine.network().topological_order();
        let mut assignment = vec![0usize; engine.network().len()];
        for &var in order.iter() {
            if let Some(observed) = original.get(var) {
                assignment[var.index()] = observed;
                continue;
            }
            let cdf = self.cdf(engine, var)?;
            let value = pick(&cdf, rng.random::<f64>());
            assignment[var.index()] = value;
            engine.set_evidence(var, value)?;
        }
        Ok(assignment)
    }

    fn cdf<E>(&mut self, engine: &mut E, var: VarId) -> BnResult<Arc<[f64]>>
    where
        E: InferenceEngine + ?Sized,
    {
        let key = (var, engine.evidence().clone());
        if let Some(cdf) = self.cdfs.get(&key) {
            return Ok(cdf.clone());
        }
        let marginal = engine.marginal_of(var)?;
        let cdf: Arc<[f64]> = marginal
            .iter()
            .scan(0.0, |acc, p| {
                *acc += p;
                Some(*acc)
            })
            .collect();
        if self.cdfs.len() >= self.limit.max(1) {
            self.cdfs.clear();
        }
        self.cdfs.insert(key, cdf.clone());
        Ok(cdf)
    }
}

/// Index of the first cumulative entry exceeding `u × total`, never a zero-mass value.
fn pick(cdf: &[f64], u: f64) -> usize {
    let total = cdf.last().copied().unwrap_or(0.0);
    let target = u * total;
    let index = cdf.partition_point(|c| *c <= target);
    if index < cdf.len() {
        return index;
    }
    // rounding pushed the draw past the end: take the last value with mass
    let mut last = cdf.len().saturating_sub(1);
    while last > 0 && cdf[last] == cdf[last - 1] {
        last -= 1;
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::inference::{EliminationEngine, SimpleConditioningEngine};
    use crate::engine::network::Network;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

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
    fn pick_skips_zero_mass_values() {
        let cdf = [0.25, 0.25, 1.0, 1.0];
        assert_eq!(pick(&cdf, 0.0), 0);
        assert_eq!(pick(&cdf, 0.25), 2);
        assert_eq!(pick(&cdf, 0.999), 2);
        assert_eq!(pick(&cdf, 1.0), 2);
    }

    #[test]
    fn samples_respect_evidence_and_restore_it() {
        let mut engine = EliminationEngine::new(census()).unwrap();
        engine.add_evidence("age", "<15").unwrap();
        let before = engine.evidence().clone();
        let mut rng = SmallRng::seed_from_u64(7);
        for _ in 0..50 {
            let sample = engine.sample_one(&mut rng).unwrap();
            assert_eq!(sample[1], 0);
        }
        assert_eq!(engine.evidence(), &before);
    }

    #[test]
    fn sample_frequencies_follow_the_prior() {
        let mut engine = SimpleConditioningEngine::new(census()).unwrap();
        let mut rng = SmallRng::seed_from_u64(42);
        let n = 20_000;
        let mut young = 0;
        for _ in 0..n {
            if engine.sample_one(&mut rng).unwrap()[1] == 0 {
                young += 1;
            }
        }
        let freq = young as f64 / n as f64;
        assert!((freq - 0.5275).abs() < 0.02, "frequency {}", freq);
    }

    #[test]
    fn impossible_evidence_is_infeasible() {
        let mut net = Network::new("n");
        let a = net.add_variable("a", ["x", "y"]).unwrap();
        net.set_cpt(a, vec![1.0, 0.0]).unwrap();
        let mut engine = EliminationEngine::new(Arc::new(net)).unwrap();
        engine.add_evidence("a", "y").unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(engine.sample_one(&mut rng), Err(BnError::InfeasibleEvidence));
        assert_eq!(engine.evidence().get(a), Some(1));
    }
}
