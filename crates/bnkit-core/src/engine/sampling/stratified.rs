//! Stratified exact-count sampling.
//!
//! Instead of drawing `N` independent rows, the sampler partitions `N` over the first
//! variable's domain in proportion to its conditional, asserts each non-empty stratum
//! as evidence, and recurses into the next variable in topological order. The leaves
//! are `(assignment, count)` pairs whose counts sum to exactly `N`.
//!
//! The recursion is an explicit stack of frames, one per depth, so wide networks do
//! not grow the call stack. A sampler that has not yet descended into some values of a
//! frame can [split](StratifiedSampler::split) them off into an independent sampler;
//! [`par_generate`](StratifiedSampler::par_generate) hands that to rayon.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::Binomial;
use smallvec::SmallVec;

use crate::engine::cancel::CancellationToken;
use crate::engine::errors::{BnError, BnResult};
use crate::engine::evidence::Evidence;
use crate::engine::inference::InferenceEngine;
use crate::engine::network::VarId;

/// One generated stratum: a complete assignment indexed by [`VarId`] and its count.
pub type Stratum = (Vec<usize>, u64);

/// How the rounding remainder of a proportional split is distributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RemainderStrategy {
    /// Floor every share, then hand out the remainder by roulette over the fractional
    /// parts.
    #[default]
    RoundAndSample,
    /// Draw the whole split as a multinomial via sequential binomials.
    Multinomial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StratifiedConfig {
    pub strategy: RemainderStrategy,
    /// Seed of the sampler's random stream.
    pub seed: u64,
}

#[derive(Debug, Clone)]
struct Frame {
    depth: usize,
    counts: SmallVec<[u64; 8]>,
    /// Next value index to descend into.
    next: usize,
}

/// Exact-count population generator over an engine's current evidence.
#[derive(Debug)]
pub struct StratifiedSampler<E: InferenceEngine> {
    engine: E,
    order: Vec<VarId>,
    base: Evidence,
    frames: Vec<Frame>,
    strategy: RemainderStrategy,
    rng: SmallRng,
    cancel: CancellationToken,
    failed: bool,
}

impl<E: InferenceEngine> StratifiedSampler<E> {
    /// Prepares to generate `total` rows from `engine` under its current evidence.
    ///
    /// Fails with [`BnError::InfeasibleEvidence`] when the evidence has probability 0.
    pub fn new(mut engine: E, total: u64, config: StratifiedConfig) -> BnResult<Self> {
        if engine.probability_of_evidence()? == 0.0 {
            return Err(BnError::InfeasibleEvidence);
        }
        let order = engine.network().topological_order().to_vec();
        let base = engine.evidence().clone();
        let mut sampler = Self {
            engine,
            order,
            base,
            frames: Vec::new(),
            strategy: config.strategy,
            rng: SmallRng::seed_from_u64(config.seed),
            cancel: CancellationToken::never(),
            failed: false,
        };
        if total > 0 {
            let counts = if sampler.order.is_empty() {
                SmallVec::from_elem(total, 1)
            } else {
                sampler.allocate(0, total)?
            };
            sampler.frames.push(Frame {
                depth: 0,
                counts,
                next: 0,
            });
        }
        Ok(sampler)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Gives the engine back with its original evidence.
    pub fn into_engine(mut self) -> E {
        self.engine.replace_evidence(self.base.clone());
        self.engine
    }

    /// Splits the counts at depth `depth` across the domain of the variable there.
    fn allocate(&mut self, depth: usize, total: u64) -> BnResult<SmallVec<[u64; 8]>> {
        let var = self.order[depth];
        let probabilities = self.engine.marginal_of(var)?;
        Ok(match self.strategy {
            RemainderStrategy::RoundAndSample => {
                round_and_sample(total, &probabilities, &mut self.rng)
            }
            RemainderStrategy::Multinomial => multinomial(total, &probabilities, &mut self.rng)?,
        })
    }

    fn retract(&mut self, depth: usize) {
        if let Some(&var) = self.order.get(depth) {
            if !self.base.contains(var) {
                self.engine.remove_evidence(var);
            }
        }
    }

    fn leaf(&self) -> Vec<usize> {
        let mut assignment = vec![0usize; self.engine.network().len()];
        for (var, value) in self.engine.evidence().iter() {
            assignment[var.index()] = value;
        }
        assignment
    }

    fn step(&mut self) -> BnResult<Option<Stratum>> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let Some(top) = self.frames.last_mut() else {
                return Ok(None);
            };
            let depth = top.depth;
            let Some(value) = (top.next..top.counts.len()).find(|&v| top.counts[v] > 0) else {
                self.frames.pop();
                self.retract(depth);
                continue;
            };
            top.next = value + 1;
            let count = top.counts[value];

            if self.order.is_empty() {
                return Ok(Some((Vec::new(), count)));
            }
            self.engine.set_evidence(self.order[depth], value)?;
            if depth + 1 == self.order.len() {
                return Ok(Some((self.leaf(), count)));
            }
            let counts = self.allocate(depth + 1, count)?;
            self.frames.push(Frame {
                depth: depth + 1,
                counts,
                next: 0,
            });
        }
    }

    /// Hands the second half of the untouched values of the shallowest splittable
    /// frame to a new sampler. Returns `(self, None)` when nothing can be split.
    pub fn split(mut self) -> (Self, Option<Self>)
    where
        E: Clone,
    {
        let Some(index) = self.frames.iter().position(|f| untouched(f).count() >= 2) else {
            return (self, None);
        };
        let given: SmallVec<[usize; 8]> = {
            let values: SmallVec<[usize; 8]> = untouched(&self.frames[index]).collect();
            values[values.len() / 2..].iter().copied().collect()
        };

        let frame = &mut self.frames[index];
        let mut counts = SmallVec::from_elem(0, frame.counts.len());
        for &value in &given {
            counts[value] = frame.counts[value];
            frame.counts[value] = 0;
        }
        let depth = frame.depth;

        let mut prefix = self.engine.evidence().clone();
        for deeper in &self.frames[index..] {
            if let Some(&var) = self.order.get(deeper.depth) {
                if !self.base.contains(var) {
                    prefix.remove(var);
                }
            }
        }
        let mut engine = self.engine.clone();
        engine.replace_evidence(prefix);
        let rng = SmallRng::seed_from_u64(self.rng.random());
        let other = Self {
            engine,
            order: self.order.clone(),
            base: self.base.clone(),
            frames: vec![Frame {
                depth,
                counts,
                next: given[0],
            }],
            strategy: self.strategy,
            rng,
            cancel: self.cancel.clone(),
            failed: false,
        };
        (self, Some(other))
    }

    /// Generates the population in parallel, one rayon task per split piece.
    #[cfg(feature = "parallel")]
    pub fn par_generate(self) -> impl ParallelIterator<Item = BnResult<Stratum>>
    where
        E: Clone + Send,
    {
        rayon::iter::split(self, Self::split).flat_map_iter(|piece| piece)
    }
}

fn untouched(frame: &Frame) -> impl Iterator<Item = usize> + '_ {
    (frame.next..frame.counts.len()).filter(|&v| frame.counts[v] > 0)
}

impl<E: InferenceEngine> Iterator for StratifiedSampler<E> {
    type Item = BnResult<Stratum>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.step() {
            Ok(stratum) => stratum.map(Ok),
            Err(err) => {
                self.failed = true;
                self.frames.clear();
                Some(Err(err))
            }
        }
    }
}

/// Floors each proportional share, then distributes the remainder by roulette over
/// the fractional parts.
pub fn round_and_sample<R: Rng + ?Sized>(total: u64, probabilities: &[f64], rng: &mut R) -> SmallVec<[u64; 8]> {
    let mass: f64 = probabilities.iter().sum();
    let mut counts: SmallVec<[u64; 8]> = SmallVec::from_elem(0, probabilities.len());
    if probabilities.is_empty() || mass <= 0.0 {
        return counts;
    }
    let mut fractions: SmallVec<[f64; 8]> = SmallVec::with_capacity(probabilities.len());
    let mut assigned = 0u64;
    for (count, p) in counts.iter_mut().zip(probabilities) {
        let share = total as f64 * (p / mass);
        let floor = share.floor();
        *count = floor as u64;
        assigned += *count;
        fractions.push(share - floor);
    }
    while assigned > total {
        // only reachable through rounding: take back from the largest share
        if let Some(largest) = (0..counts.len()).max_by_key(|&i| counts[i]) {
            counts[largest] -= 1;
            assigned -= 1;
        }
    }
    let remainder = total - assigned;
    if remainder == 0 {
        return counts;
    }
    let weights: SmallVec<[f64; 8]> = if fractions.iter().any(|f| *f > 0.0) {
        fractions
    } else {
        probabilities.iter().copied().collect()
    };
    if let Ok(roulette) = WeightedIndex::new(&weights) {
        for _ in 0..remainder {
            counts[roulette.sample(rng)] += 1;
        }
    }
    counts
}

/// Multinomial split by sequential binomials over the remaining mass.
pub fn multinomial<R: Rng + ?Sized>(total: u64, probabilities: &[f64], rng: &mut R) -> BnResult<SmallVec<[u64; 8]>> {
    let mut counts: SmallVec<[u64; 8]> = SmallVec::from_elem(0, probabilities.len());
    let positive: SmallVec<[usize; 8]> = (0..probabilities.len())
        .filter(|&i| probabilities[i] > 0.0)
        .collect();
    let Some((&last, rest)) = positive.split_last() else {
        return Ok(counts);
    };
    let mut remaining = total;
    let mut mass: f64 = positive.iter().map(|&i| probabilities[i]).sum();
    for &i in rest {
        if remaining == 0 {
            break;
        }
        let p = (probabilities[i] / mass).clamp(0.0, 1.0);
        let binomial = Binomial::new(remaining, p)
            .map_err(|err| BnError::Internal(format!("binomial({}, {}): {}", remaining, p, err)))?;
        let drawn = binomial.sample(rng);
        counts[i] = drawn;
        remaining -= drawn;
        mass -= probabilities[i];
    }
    counts[last] += remaining;
    Ok(counts)
}
