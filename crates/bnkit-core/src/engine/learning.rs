//! CPT parameter learning from data.
//!
//! Each parent combination of each variable is a Dirichlet-categorical model: the
//! learner accumulates (optionally weighted) counts per cell and writes the posterior
//! mean back into the network. A uniform prior spreads `pseudo_count` over the
//! combination's `K` values (`α_k = pseudo_count / K`).
//!
//! A parent combination that saw no data and has no prior mass follows the configured
//! [`ZeroSumPolicy`]: keep whatever the network held before, or assume equiprobability.

use crate::engine::errors::{BnError, BnResult};
use crate::engine::network::{Network, VarId, ZeroSumPolicy};

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LearningConfig {
    /// Total Dirichlet prior mass per parent combination.
    pub pseudo_count: f64,
    /// Policy for parent combinations with no data and no prior mass.
    pub empty_combination: ZeroSumPolicy,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            pseudo_count: 0.0,
            empty_combination: ZeroSumPolicy::KeepPrevious,
        }
    }
}

impl LearningConfig {
    pub fn validate(self) -> BnResult<Self> {
        if !self.pseudo_count.is_finite() || self.pseudo_count < 0.0 {
            return Err(BnError::InvalidConfig(
                "learning: pseudo_count must be finite and >= 0".into(),
            ));
        }
        Ok(self)
    }
}

/// Accumulates counts shaped like a network's CPTs.
#[derive(Debug, Clone)]
pub struct ParameterLearner {
    config: LearningConfig,
    counts: Vec<Vec<f64>>,
    cards: Vec<usize>,
    observed: f64,
    skipped: u64,
}

impl ParameterLearner {
    pub fn new(network: &Network, config: LearningConfig) -> BnResult<Self> {
        let config = config.validate()?;
        Ok(Self {
            config,
            counts: network
                .variables()
                .iter()
                .map(|v| vec![0.0; v.cpt().len()])
                .collect(),
            cards: network.variables().iter().map(|v| v.cardinality()).collect(),
            observed: 0.0,
            skipped: 0,
        })
    }

    /// Total weight of the observed records.
    pub fn observed(&self) -> f64 {
        self.observed
    }

    /// Incomplete records skipped by [`observe_row`](Self::observe_row).
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Accumulated counts of one variable, in CPT layout.
    pub fn counts(&self, var: VarId) -> &[f64] {
        &self.counts[var.index()]
    }

    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| c.fill(0.0));
        self.observed = 0.0;
        self.skipped = 0;
    }

    /// Adds one complete assignment indexed by [`VarId`].
    pub fn observe(&mut self, network: &Network, assignment: &[usize]) -> BnResult<()> {
        self.observe_weighted(network, assignment, 1.0)
    }

    /// Adds one complete assignment with a weight, e.g. a stratum count.
    pub fn observe_weighted(&mut self, network: &Network, assignment: &[usize], weight: f64) -> BnResult<()> {
        self.check_shape(network)?;
        if assignment.len() != network.len() {
            return Err(BnError::Internal(format!(
                "assignment covers {} variables, network has {}",
                assignment.len(),
                network.len()
            )));
        }
        for variable in network.variables() {
            let value = assignment[variable.id().index()];
            if value >= variable.cardinality() {
                return Err(BnError::ValueNotInDomain {
                    variable: variable.name().to_string(),
                    value: format!("#{}", value),
                });
            }
        }
        for variable in network.variables() {
            let parents: smallvec::SmallVec<[usize; 4]> = variable
                .parents()
                .iter()
                .map(|p| assignment[p.index()])
                .collect();
            let offset = variable.row_offset(&parents) + assignment[variable.id().index()];
            self.counts[variable.id().index()][offset] += weight;
        }
        self.observed += weight;
        Ok(())
    }

    /// Adds one external record. Records with a missing cell are skipped and reported
    /// as `false`; unknown names or labels are errors.
    pub fn observe_row<I, K, V>(&mut self, network: &Network, row: I) -> BnResult<bool>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut assignment: Vec<Option<usize>> = vec![None; network.len()];
        let mut complete = true;
        for (name, value) in row {
            let var = network.variable_id(name.as_ref())?;
            match value {
                Some(value) => {
                    let (_, index) = network.resolve(name.as_ref(), value.as_ref())?;
                    assignment[var.index()] = Some(index);
                }
                None => complete = false,
            }
        }
        let dense: Option<Vec<usize>> = assignment.into_iter().collect();
        match dense {
            Some(dense) if complete => {
                self.observe(network, &dense)?;
                Ok(true)
            }
            _ => {
                self.skipped += 1;
                Ok(false)
            }
        }
    }

    /// Writes the posterior-mean CPTs into `network`.
    pub fn apply(&self, network: &mut Network) -> BnResult<()> {
        self.check_shape(network)?;
        let ids: Vec<VarId> = network.ids().collect();
        for var in ids {
            let card = self.cards[var.index()];
            let previous = network.variable(var).cpt().to_vec();
            let prior = self.config.pseudo_count / card as f64;
            let mut table = Vec::with_capacity(previous.len());
            for (row, old) in self.counts[var.index()]
                .chunks(card)
                .zip(previous.chunks(card))
            {
                let total: f64 = row.iter().map(|c| c + prior).sum();
                if total > 0.0 {
                    table.extend(row.iter().map(|c| (c + prior) / total));
                    continue;
                }
                match self.config.empty_combination {
                    ZeroSumPolicy::KeepPrevious => table.extend_from_slice(old),
                    ZeroSumPolicy::Equiprobable => {
                        table.extend(std::iter::repeat(1.0 / card as f64).take(card))
                    }
                }
            }
            network.set_cpt(var, table)?;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "learned CPTs for '{}' from {} weighted records",
            network.name(),
            self.observed
        );
        Ok(())
    }

    fn check_shape(&self, network: &Network) -> BnResult<()> {
        let matches = network.len() == self.counts.len()
            && network
                .variables()
                .iter()
                .zip(&self.counts)
                .all(|(v, c)| v.cpt().len() == c.len());
        if matches {
            Ok(())
        } else {
            Err(BnError::Internal(
                "network structure changed since the learner was created".into(),
            ))
        }
    }
}
