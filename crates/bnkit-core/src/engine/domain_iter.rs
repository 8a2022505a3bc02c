//! Cartesian enumeration of joint assignments.
//!
//! A [`DomainSpliterator`] describes a box of joint assignments: one value range per
//! variable. It can be [split](DomainSpliterator::split) into two disjoint halves that
//! together cover the box exactly, which lets a work-stealing scheduler enumerate huge
//! joint spaces in parallel. Turning it into a [`DomainIterator`] starts a lazy,
//! single-pass walk in mixed-radix order with the *last* variable varying fastest.
//!
//! Both poll a [`CancellationToken`] once per produced element; a cancelled walk
//! simply ends.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use smallvec::SmallVec;

use crate::engine::cancel::CancellationToken;
use crate::engine::evidence::Evidence;
use crate::engine::network::{Network, VarId};

/// Value indices of one joint assignment, in the enumerator's variable order.
pub type Combination = SmallVec<[usize; 8]>;

/// A splittable box of joint assignments over an ordered variable list.
#[derive(Debug, Clone)]
pub struct DomainSpliterator {
    vars: SmallVec<[VarId; 8]>,
    cards: SmallVec<[usize; 8]>,
    lows: Combination,
    highs: Combination,
    cancel: CancellationToken,
}

impl DomainSpliterator {
    /// Enumerates the full joint domain of `vars`.
    pub fn new(network: &Network, vars: &[VarId]) -> Self {
        Self::over(
            vars.iter()
                .map(|var| (*var, network.variable(*var).cardinality())),
        )
    }

    /// Enumerates the full joint domain of explicit `(variable, cardinality)` pairs.
    pub fn over(vars: impl IntoIterator<Item = (VarId, usize)>) -> Self {
        let (vars, cards): (SmallVec<[VarId; 8]>, SmallVec<[usize; 8]>) = vars.into_iter().unzip();
        let lows = Combination::from_elem(0, vars.len());
        let highs = cards.clone();
        Self {
            vars,
            cards,
            lows,
            highs,
            cancel: CancellationToken::never(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }

    /// Number of assignments in the box.
    pub fn size(&self) -> u128 {
        self.lows
            .iter()
            .zip(&self.highs)
            .map(|(lo, hi)| hi.saturating_sub(*lo) as u128)
            .product()
    }

    /// Splits along the variable with the widest remaining range (ties go to the larger
    /// domain, then the earlier variable). Returns `(self, None)` when no range is wider
    /// than one value.
    pub fn split(mut self) -> (Self, Option<Self>) {
        let axis = (0..self.vars.len())
            .filter(|&k| self.highs[k] - self.lows[k] >= 2)
            .max_by(|&a, &b| {
                let wa = self.highs[a] - self.lows[a];
                let wb = self.highs[b] - self.lows[b];
                wa.cmp(&wb)
                    .then(self.cards[a].cmp(&self.cards[b]))
                    .then(b.cmp(&a))
            });
        let Some(axis) = axis else {
            return (self, None);
        };
        let mid = self.lows[axis] + (self.highs[axis] - self.lows[axis]) / 2;
        let mut upper = self.clone();
        upper.lows[axis] = mid;
        self.highs[axis] = mid;
        (self, Some(upper))
    }

    /// Enumerates the box in parallel, one rayon task per split piece.
    #[cfg(feature = "parallel")]
    pub fn into_par_iter(self) -> impl ParallelIterator<Item = Combination> {
        rayon::iter::split(self, DomainSpliterator::split).flat_map_iter(|piece| piece.into_iter())
    }
}

impl IntoIterator for DomainSpliterator {
    type Item = Combination;
    type IntoIter = DomainIterator;

    fn into_iter(self) -> DomainIterator {
        DomainIterator {
            current: self.lows.clone(),
            range: self,
            state: IterState::Fresh,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    Fresh,
    Running,
    Done,
}

/// Lazy single-pass walk over a [`DomainSpliterator`] box.
#[derive(Debug, Clone)]
pub struct DomainIterator {
    range: DomainSpliterator,
    current: Combination,
    state: IterState,
}

impl DomainIterator {
    pub fn new(network: &Network, vars: &[VarId]) -> Self {
        DomainSpliterator::new(network, vars).into_iter()
    }

    pub fn vars(&self) -> &[VarId] {
        &self.range.vars
    }
}

impl Iterator for DomainIterator {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        if self.state == IterState::Done {
            return None;
        }
        if self.range.cancel.is_cancelled() {
            self.state = IterState::Done;
            return None;
        }
        if self.state == IterState::Fresh {
            if self.range.size() == 0 {
                self.state = IterState::Done;
                return None;
            }
            self.state = IterState::Running;
            return Some(self.current.clone());
        }
        for k in (0..self.current.len()).rev() {
            self.current[k] += 1;
            if self.current[k] < self.range.highs[k] {
                return Some(self.current.clone());
            }
            self.current[k] = self.range.lows[k];
        }
        self.state = IterState::Done;
        None
    }
}

/// Probability of `evidence` by brute-force summation of the full joint.
///
/// Exponential in the number of unobserved variables; meant for small networks and as a
/// reference for the exact engines. Runs in parallel when the `parallel` feature is on.
/// A cancelled run returns the partial sum accumulated so far.
pub fn joint_probability_of_evidence(
    network: &Network,
    evidence: &Evidence,
    cancel: &CancellationToken,
) -> f64 {
    let free: Vec<VarId> = network.ids().filter(|v| !evidence.contains(*v)).collect();
    let mut template = vec![0usize; network.len()];
    for (var, value) in evidence.iter() {
        template[var.index()] = value;
    }
    let pieces = DomainSpliterator::new(network, &free).with_cancellation(cancel.clone());
    let weigh = |combination: Combination| {
        let mut assignment = template.clone();
        for (var, value) in free.iter().zip(combination) {
            assignment[var.index()] = value;
        }
        network.joint_probability(&assignment)
    };

    #[cfg(feature = "parallel")]
    {
        pieces.into_par_iter().map(weigh).sum()
    }
    #[cfg(not(feature = "parallel"))]
    {
        pieces.into_iter().map(weigh).sum()
    }
}
