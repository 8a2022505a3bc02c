//! Caller-owned performance counters.
//!
//! Every engine owns one [`InferenceCounters`] and bumps it as it works. Callers read
//! it through the engine and reset it between measurements; nothing is global.

use std::ops::AddAssign;

/// Work counters for inference and sampling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InferenceCounters {
    /// Pairwise factor multiplications performed.
    pub factor_multiplications: u64,
    /// Factor entries written by multiplication and marginalization.
    pub factor_entries: u64,
    /// Recursive-conditioning node visits.
    pub rc_calls: u64,
    /// Recursive-conditioning cache hits.
    pub rc_cache_hits: u64,
    /// Simple-conditioning cache hits (per-cycle and cross-query).
    pub simple_cache_hits: u64,
    /// Joint assignments visited by enumeration.
    pub enumerated_assignments: u64,
    /// Elimination-order search expansions.
    pub search_expansions: u64,
    /// Full engine recomputations triggered by evidence changes.
    pub recomputations: u64,
}

impl InferenceCounters {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl AddAssign for InferenceCounters {
    fn add_assign(&mut self, rhs: Self) {
        self.factor_multiplications += rhs.factor_multiplications;
        self.factor_entries += rhs.factor_entries;
        self.rc_calls += rhs.rc_calls;
        self.rc_cache_hits += rhs.rc_cache_hits;
        self.simple_cache_hits += rhs.simple_cache_hits;
        self.enumerated_assignments += rhs.enumerated_assignments;
        self.search_expansions += rhs.search_expansions;
        self.recomputations += rhs.recomputations;
    }
}
