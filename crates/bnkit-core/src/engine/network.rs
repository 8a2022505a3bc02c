//! # Discrete Bayesian network
//!
//! The network is an arena of [`Variable`]s addressed by stable [`VarId`]s. Parent and
//! child relations are id lists, so the structure has no reference cycles and clones
//! cheaply.
//!
//! ## CPT layout
//!
//! Each variable stores its conditional probability table as one flat `Vec<f64>` of
//! length `|domain| × Π |parent domain|`. The variable's own value is the fastest
//! varying digit, followed by each parent in parent-addition order:
//!
//! ```text
//! index = value + strides[1] * p0 + strides[2] * p1 + ...
//! strides[0] = 1, strides[i + 1] = strides[i] * |domain of digit i|
//! ```
//!
//! The strides are recomputed whenever a parent is added or a domain grows. Both
//! operations reset the affected tables to zero: callers re-populate them.
//!
//! ## Cached views
//!
//! The topological order and the per-variable CPT factors are computed lazily and
//! shared through `OnceLock`s. Every structural mutation takes `&mut self` and drops
//! them, so concurrent readers never observe a half-updated cache.

use std::collections::{BTreeMap, BinaryHeap};
use std::cmp::Reverse;
use std::sync::{Arc, OnceLock};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::engine::errors::{BnError, BnResult};
use crate::engine::factor::Factor;

/// Maximum deviation from 1 tolerated when validating a parent combination.
pub const CPT_SUM_TOLERANCE: f64 = 1e-8;

/// Parent combinations whose sum is this close to 1 are left untouched by
/// [`Network::normalize`], which makes normalization an exact fixed point.
const NORMALIZED_EPSILON: f64 = 1e-12;

/// A unique identifier for a variable in a network.
///
/// Ids are dense indices issued by [`Network::add_variable`].
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VarId(pub u32);

impl VarId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What [`Network::normalize`] does with a parent combination summing to exactly 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ZeroSumPolicy {
    /// Assume every value is equally likely.
    #[default]
    Equiprobable,
    /// Leave the previous values in place.
    KeepPrevious,
}

/// A discrete random variable with its conditional probability table.
#[derive(Debug, Clone)]
pub struct Variable {
    id: VarId,
    name: Arc<str>,
    domain: Vec<Arc<str>>,
    domain_index: FxHashMap<Arc<str>, usize>,
    parents: SmallVec<[VarId; 4]>,
    children: SmallVec<[VarId; 4]>,
    cpt: Vec<f64>,
    strides: SmallVec<[usize; 5]>,
}

impl Variable {
    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered domain labels.
    pub fn domain(&self) -> &[Arc<str>] {
        &self.domain
    }

    /// Number of domain values.
    pub fn cardinality(&self) -> usize {
        self.domain.len()
    }

    /// Index of a domain label, if present.
    pub fn value_index(&self, label: &str) -> Option<usize> {
        self.domain_index.get(label).copied()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.domain.get(index).map(|label| label.as_ref())
    }

    /// Parents in parent-addition order (the CPT digit order).
    pub fn parents(&self) -> &[VarId] {
        &self.parents
    }

    pub fn children(&self) -> &[VarId] {
        &self.children
    }

    /// The flat CPT.
    pub fn cpt(&self) -> &[f64] {
        &self.cpt
    }

    /// Number of parent-value combinations (rows of the CPT).
    pub fn parent_combinations(&self) -> usize {
        match self.domain.len() {
            0 => 0,
            card => self.cpt.len() / card,
        }
    }

    /// Mixed-radix strides: `strides[0]` for the own value, `strides[i + 1]` for parent `i`.
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// CPT offset of the row selected by parent value indices.
    #[inline]
    pub fn row_offset(&self, parent_values: &[usize]) -> usize {
        parent_values
            .iter()
            .zip(&self.strides[1..])
            .map(|(value, stride)| value * stride)
            .sum()
    }

    /// P(value | parents) reading parent values from a dense assignment indexed by [`VarId`].
    #[inline]
    pub fn probability_given(&self, value: usize, assignment: &[usize]) -> f64 {
        let offset: usize = self
            .parents
            .iter()
            .zip(&self.strides[1..])
            .map(|(parent, stride)| assignment[parent.index()] * stride)
            .sum();
        self.cpt[offset + value]
    }

    fn resolve(&self, label: &str) -> BnResult<usize> {
        self.value_index(label)
            .ok_or_else(|| BnError::ValueNotInDomain {
                variable: self.name.to_string(),
                value: label.to_string(),
            })
    }

    fn check_arity(&self, got: usize) -> BnResult<()> {
        if got != self.parents.len() {
            return Err(BnError::ParentArity {
                variable: self.name.to_string(),
                expected: self.parents.len(),
                got,
            });
        }
        Ok(())
    }

    fn check_value_index(&self, value: usize) -> BnResult<()> {
        if value >= self.domain.len() {
            return Err(BnError::ValueNotInDomain {
                variable: self.name.to_string(),
                value: format!("#{}", value),
            });
        }
        Ok(())
    }
}

/// A discrete Bayesian network.
#[derive(Debug, Clone, Default)]
pub struct Network {
    name: String,
    variables: Vec<Variable>,
    by_name: FxHashMap<Arc<str>, VarId>,
    topological: OnceLock<Arc<[VarId]>>,
    factors: Vec<OnceLock<Arc<Factor>>>,
}

impl Network {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Number of variables.
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// All variable ids in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = VarId> + '_ {
        self.variables.iter().map(|v| v.id)
    }

    /// The variable behind an id issued by this network.
    ///
    /// Panics if the id was issued by a different, larger network.
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn get(&self, id: VarId) -> Option<&Variable> {
        self.variables.get(id.index())
    }

    /// Resolves a variable name.
    pub fn variable_id(&self, name: &str) -> BnResult<VarId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| BnError::UnknownVariable(name.to_string()))
    }

    /// Resolves a variable name and one of its labels.
    pub fn resolve(&self, name: &str, value: &str) -> BnResult<(VarId, usize)> {
        let id = self.variable_id(name)?;
        let index = self.variable(id).resolve(value)?;
        Ok((id, index))
    }

    /// Adds a parentless variable with the given ordered domain.
    ///
    /// The CPT starts zeroed; populate it with [`set_cpt`](Self::set_cpt) or
    /// [`set_probability`](Self::set_probability).
    pub fn add_variable<I, S>(&mut self, name: &str, domain: I) -> BnResult<VarId>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        if self.by_name.contains_key(name) {
            return Err(BnError::DuplicateVariable(name.to_string()));
        }
        let mut labels: Vec<Arc<str>> = Vec::new();
        let mut domain_index = FxHashMap::default();
        for label in domain {
            let label: Arc<str> = Arc::from(label.as_ref());
            if domain_index.insert(label.clone(), labels.len()).is_some() {
                return Err(BnError::DuplicateDomainValue {
                    variable: name.to_string(),
                    value: label.to_string(),
                });
            }
            labels.push(label);
        }

        let id = VarId(self.variables.len() as u32);
        let name: Arc<str> = Arc::from(name);
        self.by_name.insert(name.clone(), id);
        self.variables.push(Variable {
            id,
            name,
            domain: labels,
            domain_index,
            parents: SmallVec::new(),
            children: SmallVec::new(),
            cpt: Vec::new(),
            strides: SmallVec::new(),
        });
        self.factors.push(OnceLock::new());
        self.resize_table(id);
        self.invalidate();
        Ok(id)
    }

    /// Appends a label to a variable's domain and returns its index.
    ///
    /// Resets the variable's table and the tables of all its children.
    pub fn add_domain_value(&mut self, id: VarId, label: &str) -> BnResult<usize> {
        let variable = &mut self.variables[id.index()];
        if variable.domain_index.contains_key(label) {
            return Err(BnError::DuplicateDomainValue {
                variable: variable.name.to_string(),
                value: label.to_string(),
            });
        }
        let label: Arc<str> = Arc::from(label);
        let index = variable.domain.len();
        variable.domain_index.insert(label.clone(), index);
        variable.domain.push(label);

        let children = variable.children.clone();
        self.resize_table(id);
        for child in children {
            self.resize_table(child);
        }
        self.invalidate();
        Ok(index)
    }

    /// Adds `parent` as the next parent digit of `child`.
    ///
    /// Resets the child's table.
    pub fn add_parent(&mut self, child: VarId, parent: VarId) -> BnResult<()> {
        let child_name = self.variable(child).name.to_string();
        let parent_name = self.variable(parent).name.to_string();
        if self.variable(child).parents.contains(&parent) {
            return Err(BnError::DuplicateParent {
                child: child_name,
                parent: parent_name,
            });
        }
        if child == parent || self.ancestor_mask([parent])[child.index()] {
            return Err(BnError::CyclicStructure {
                child: child_name,
                parent: parent_name,
            });
        }

        self.variables[child.index()].parents.push(parent);
        self.variables[parent.index()].children.push(child);
        self.resize_table(child);
        self.invalidate();
        Ok(())
    }

    /// Replaces a variable's whole flat table.
    ///
    /// Fails with [`BnError::MalformedCpt`] if the length does not match the layout.
    /// Values are stored as given; call [`validate_cpt`](Self::validate_cpt) to check them.
    pub fn set_cpt(&mut self, id: VarId, table: Vec<f64>) -> BnResult<()> {
        let variable = &mut self.variables[id.index()];
        if table.len() != variable.cpt.len() {
            return Err(BnError::MalformedCpt {
                variable: variable.name.to_string(),
                reason: format!(
                    "expected {} values, got {}",
                    variable.cpt.len(),
                    table.len()
                ),
            });
        }
        variable.cpt = table;
        self.factors[id.index()] = OnceLock::new();
        Ok(())
    }

    /// Sets P(`value` | `parent_values`) by label. Parent labels follow parent order.
    pub fn set_probability(
        &mut self,
        id: VarId,
        value: &str,
        parent_values: &[&str],
        probability: f64,
    ) -> BnResult<()> {
        let (value, parents) = self.resolve_row(id, value, parent_values)?;
        self.set_probability_at(id, value, &parents, probability)
    }

    /// Sets P(`value` | `parent_values`) by domain indices.
    pub fn set_probability_at(
        &mut self,
        id: VarId,
        value: usize,
        parent_values: &[usize],
        probability: f64,
    ) -> BnResult<()> {
        let offset = self.checked_offset(id, value, parent_values)?;
        self.variables[id.index()].cpt[offset] = probability;
        self.factors[id.index()] = OnceLock::new();
        Ok(())
    }

    /// P(`value` | `parent_values`) by label.
    pub fn probability(&self, id: VarId, value: &str, parent_values: &[&str]) -> BnResult<f64> {
        let (value, parents) = self.resolve_row(id, value, parent_values)?;
        self.probability_at(id, value, &parents)
    }

    /// P(`value` | `parent_values`) by domain indices.
    pub fn probability_at(&self, id: VarId, value: usize, parent_values: &[usize]) -> BnResult<f64> {
        let offset = self.checked_offset(id, value, parent_values)?;
        Ok(self.variables[id.index()].cpt[offset])
    }

    fn resolve_row(
        &self,
        id: VarId,
        value: &str,
        parent_values: &[&str],
    ) -> BnResult<(usize, SmallVec<[usize; 4]>)> {
        let variable = self.variable(id);
        variable.check_arity(parent_values.len())?;
        let value = variable.resolve(value)?;
        let parents = variable
            .parents
            .iter()
            .zip(parent_values)
            .map(|(parent, label)| self.variable(*parent).resolve(label))
            .collect::<BnResult<SmallVec<[usize; 4]>>>()?;
        Ok((value, parents))
    }

    fn checked_offset(&self, id: VarId, value: usize, parent_values: &[usize]) -> BnResult<usize> {
        let variable = self.variable(id);
        variable.check_arity(parent_values.len())?;
        variable.check_value_index(value)?;
        for (parent, &parent_value) in variable.parents.iter().zip(parent_values) {
            self.variable(*parent).check_value_index(parent_value)?;
        }
        Ok(variable.row_offset(parent_values) + value)
    }

    /// Rescales every parent combination of one variable to sum to 1.
    ///
    /// Rows summing to exactly 0 follow `policy`. Rows already within `1e-12` of 1 are
    /// left untouched, so normalizing twice is a fixed point.
    pub fn normalize(&mut self, id: VarId, policy: ZeroSumPolicy) {
        let variable = &mut self.variables[id.index()];
        let card = variable.domain.len();
        if card == 0 {
            return;
        }
        for row in variable.cpt.chunks_mut(card) {
            let sum: f64 = row.iter().sum();
            if sum == 0.0 {
                if policy == ZeroSumPolicy::Equiprobable {
                    row.fill(1.0 / card as f64);
                }
                continue;
            }
            if (sum - 1.0).abs() <= NORMALIZED_EPSILON {
                continue;
            }
            for value in row.iter_mut() {
                *value /= sum;
            }
        }
        self.factors[id.index()] = OnceLock::new();
    }

    /// Normalizes every variable.
    pub fn normalize_all(&mut self, policy: ZeroSumPolicy) {
        for index in 0..self.variables.len() {
            self.normalize(VarId(index as u32), policy);
        }
    }

    /// Checks that every value lies in [0, 1] and every row sums to 1.
    pub fn validate_cpt(&self, id: VarId) -> BnResult<()> {
        let variable = self.variable(id);
        let card = variable.domain.len();
        if card == 0 {
            return Err(BnError::MalformedCpt {
                variable: variable.name.to_string(),
                reason: "empty domain".into(),
            });
        }
        if let Some(bad) = variable
            .cpt
            .iter()
            .find(|p| !(0.0..=1.0).contains(*p) || !p.is_finite())
        {
            return Err(BnError::MalformedCpt {
                variable: variable.name.to_string(),
                reason: format!("probability {} outside [0, 1]", bad),
            });
        }
        for (row_index, row) in variable.cpt.chunks(card).enumerate() {
            let sum: f64 = row.iter().sum();
            if (sum - 1.0).abs() > CPT_SUM_TOLERANCE {
                return Err(BnError::MalformedCpt {
                    variable: variable.name.to_string(),
                    reason: format!("parent combination {} sums to {}", row_index, sum),
                });
            }
        }
        Ok(())
    }

    /// Validates every CPT.
    pub fn validate(&self) -> BnResult<()> {
        self.ids().try_for_each(|id| self.validate_cpt(id))
    }

    /// Parents-before-children order, ties broken by descending domain size then id.
    pub fn topological_order(&self) -> Arc<[VarId]> {
        self.topological
            .get_or_init(|| self.compute_topological_order())
            .clone()
    }

    fn compute_topological_order(&self) -> Arc<[VarId]> {
        let mut pending: Vec<usize> = self.variables.iter().map(|v| v.parents.len()).collect();
        let mut ready: BinaryHeap<(usize, Reverse<VarId>)> = self
            .variables
            .iter()
            .filter(|v| v.parents.is_empty())
            .map(|v| (v.cardinality(), Reverse(v.id)))
            .collect();
        let mut order = Vec::with_capacity(self.variables.len());
        while let Some((_, Reverse(id))) = ready.pop() {
            order.push(id);
            for &child in &self.variable(id).children {
                pending[child.index()] -= 1;
                if pending[child.index()] == 0 {
                    ready.push((self.variable(child).cardinality(), Reverse(child)));
                }
            }
        }
        order.into()
    }

    /// The CPT of a variable as a factor over `[variable, parents...]`, cached.
    pub fn factor(&self, id: VarId) -> Arc<Factor> {
        self.factors[id.index()]
            .get_or_init(|| Arc::new(Factor::from_cpt(self.variable(id), |p| self.variable(p).cardinality())))
            .clone()
    }

    /// Inclusive ancestral closure of `seeds` as a mask indexed by [`VarId`].
    pub fn ancestor_mask<I>(&self, seeds: I) -> Vec<bool>
    where
        I: IntoIterator<Item = VarId>,
    {
        let mut mask = vec![false; self.variables.len()];
        let mut stack: Vec<VarId> = seeds.into_iter().collect();
        while let Some(id) = stack.pop() {
            if mask[id.index()] {
                continue;
            }
            mask[id.index()] = true;
            stack.extend(self.variable(id).parents.iter().copied());
        }
        mask
    }

    /// Inclusive ancestral closure of `seeds`, in topological order.
    pub fn ancestors<I>(&self, seeds: I) -> Vec<VarId>
    where
        I: IntoIterator<Item = VarId>,
    {
        let mask = self.ancestor_mask(seeds);
        self.topological_order()
            .iter()
            .copied()
            .filter(|id| mask[id.index()])
            .collect()
    }

    /// Product of all CPT entries selected by a complete assignment indexed by [`VarId`].
    pub fn joint_probability(&self, assignment: &[usize]) -> f64 {
        let mut product = 1.0;
        for variable in &self.variables {
            product *= variable.probability_given(assignment[variable.id.index()], assignment);
            if product == 0.0 {
                break;
            }
        }
        product
    }

    /// Converts a complete assignment into `name → label` pairs.
    pub fn assignment_to_row(&self, assignment: &[usize]) -> BTreeMap<String, String> {
        self.variables
            .iter()
            .filter_map(|variable| {
                let label = variable.label(*assignment.get(variable.id.index())?)?;
                Some((variable.name.to_string(), label.to_string()))
            })
            .collect()
    }

    fn resize_table(&mut self, id: VarId) {
        let cards: SmallVec<[usize; 5]> = std::iter::once(self.variable(id).cardinality())
            .chain(
                self.variable(id)
                    .parents
                    .iter()
                    .map(|p| self.variable(*p).cardinality()),
            )
            .collect();
        let mut strides = SmallVec::with_capacity(cards.len());
        let mut size = 1usize;
        for card in cards {
            strides.push(size);
            size *= card;
        }
        let variable = &mut self.variables[id.index()];
        variable.strides = strides;
        variable.cpt = vec![0.0; size];
    }

    fn invalidate(&mut self) {
        self.topological = OnceLock::new();
        for slot in &mut self.factors {
            *slot = OnceLock::new();
        }
    }
}
