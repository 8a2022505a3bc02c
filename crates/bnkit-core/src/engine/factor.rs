//! Factor algebra for variable elimination and recursive conditioning.
//!
//! A [`Factor`] maps every joint assignment over an explicit scope to a value. The
//! table is stored flat with the *first* scope variable varying fastest, which makes a
//! CPT factor (scope `[variable, parents...]`) a plain copy of the CPT.

use smallvec::SmallVec;

use crate::engine::errors::{BnError, BnResult};
use crate::engine::evidence::Evidence;
use crate::engine::network::{VarId, Variable};

type Digits = SmallVec<[usize; 8]>;

/// A table over an explicit variable scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    scope: SmallVec<[VarId; 8]>,
    cards: Digits,
    strides: Digits,
    values: Vec<f64>,
}

impl Factor {
    /// Builds a factor from `(variable, cardinality)` pairs and a flat table.
    pub fn new(scope: &[(VarId, usize)], values: Vec<f64>) -> BnResult<Self> {
        let mut vars: SmallVec<[VarId; 8]> = SmallVec::with_capacity(scope.len());
        let mut cards = Digits::with_capacity(scope.len());
        for &(var, card) in scope {
            if vars.contains(&var) {
                return Err(BnError::Internal(format!(
                    "factor scope lists variable #{} twice",
                    var.0
                )));
            }
            vars.push(var);
            cards.push(card);
        }
        let strides = strides_for(&cards);
        let size: usize = cards.iter().product();
        if values.len() != size {
            return Err(BnError::Internal(format!(
                "factor table has {} entries, scope requires {}",
                values.len(),
                size
            )));
        }
        Ok(Self {
            scope: vars,
            cards,
            strides,
            values,
        })
    }

    /// A factor with empty scope holding one value.
    pub fn scalar(value: f64) -> Self {
        Self {
            scope: SmallVec::new(),
            cards: Digits::new(),
            strides: Digits::new(),
            values: vec![value],
        }
    }

    /// The CPT of `variable` as a factor over `[variable, parents...]`.
    pub fn from_cpt(variable: &Variable, cardinality_of: impl Fn(VarId) -> usize) -> Self {
        let mut scope: SmallVec<[VarId; 8]> = SmallVec::with_capacity(variable.parents().len() + 1);
        let mut cards = Digits::with_capacity(variable.parents().len() + 1);
        scope.push(variable.id());
        cards.push(variable.cardinality());
        for &parent in variable.parents() {
            scope.push(parent);
            cards.push(cardinality_of(parent));
        }
        let strides = strides_for(&cards);
        Self {
            scope,
            cards,
            strides,
            values: variable.cpt().to_vec(),
        }
    }

    pub fn scope(&self) -> &[VarId] {
        &self.scope
    }

    pub fn cardinalities(&self) -> &[usize] {
        &self.cards
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_scalar(&self) -> bool {
        self.scope.is_empty()
    }

    pub fn contains(&self, var: VarId) -> bool {
        self.scope.contains(&var)
    }

    fn position(&self, var: VarId) -> Option<usize> {
        self.scope.iter().position(|v| *v == var)
    }

    /// Value for an assignment given as `(variable, value)` pairs.
    ///
    /// Extra pairs outside the scope are ignored; a scope variable without a pair (or
    /// with an out-of-range value) fails with [`BnError::UndefinedFactorEntry`].
    pub fn get(&self, assignment: &[(VarId, usize)]) -> BnResult<f64> {
        let mut offset = 0;
        for (k, var) in self.scope.iter().enumerate() {
            let value = assignment
                .iter()
                .find(|(v, _)| v == var)
                .map(|(_, value)| *value)
                .ok_or_else(|| {
                    BnError::UndefinedFactorEntry(format!("variable #{} is not assigned", var.0))
                })?;
            if value >= self.cards[k] {
                return Err(BnError::UndefinedFactorEntry(format!(
                    "value {} out of range for variable #{}",
                    value, var.0
                )));
            }
            offset += value * self.strides[k];
        }
        Ok(self.values[offset])
    }

    /// Value for a complete dense assignment indexed by [`VarId`].
    #[inline]
    pub fn value_dense(&self, assignment: &[usize]) -> f64 {
        let offset: usize = self
            .scope
            .iter()
            .zip(&self.strides)
            .map(|(var, stride)| assignment[var.index()] * stride)
            .sum();
        self.values[offset]
    }

    /// Pointwise product over the union of both scopes.
    pub fn multiply(&self, other: &Factor) -> Factor {
        if other.is_scalar() {
            let scale = other.values[0];
            let mut result = self.clone();
            result.values.iter_mut().for_each(|v| *v *= scale);
            return result;
        }
        if self.is_scalar() {
            return other.multiply(self);
        }

        let mut scope = self.scope.clone();
        let mut cards = self.cards.clone();
        for (var, card) in other.scope.iter().zip(&other.cards) {
            if !scope.contains(var) {
                scope.push(*var);
                cards.push(*card);
            }
        }
        let stride_in = |factor: &Factor| -> Digits {
            scope
                .iter()
                .map(|var| factor.position(*var).map_or(0, |k| factor.strides[k]))
                .collect()
        };
        let left = stride_in(self);
        let right = stride_in(other);
        let size: usize = cards.iter().product();

        let mut values = Vec::with_capacity(size);
        let mut digits = Digits::from_elem(0, scope.len());
        let (mut i, mut j) = (0usize, 0usize);
        for _ in 0..size {
            let a = self.values[i];
            values.push(if a == 0.0 { 0.0 } else { a * other.values[j] });
            for k in 0..scope.len() {
                digits[k] += 1;
                i += left[k];
                j += right[k];
                if digits[k] < cards[k] {
                    break;
                }
                i -= left[k] * cards[k];
                j -= right[k] * cards[k];
                digits[k] = 0;
            }
        }

        let strides = strides_for(&cards);
        Factor {
            scope,
            cards,
            strides,
            values,
        }
    }

    /// Marginalizes `var` out. A factor without `var` is returned unchanged.
    pub fn sum_out(&self, var: VarId) -> Factor {
        let Some(k) = self.position(var) else {
            return self.clone();
        };
        let stride = self.strides[k];
        let card = self.cards[k];
        let mut values = vec![0.0; self.values.len() / card.max(1)];
        for (i, value) in self.values.iter().enumerate() {
            let low = i % stride;
            let high = i / (stride * card);
            values[low + high * stride] += value;
        }
        self.without(k, values)
    }

    /// Fixes `var = value` and drops it from the scope.
    pub fn restrict(&self, var: VarId, value: usize) -> Factor {
        let Some(k) = self.position(var) else {
            return self.clone();
        };
        let stride = self.strides[k];
        let card = self.cards[k];
        let size = self.values.len() / card.max(1);
        let values = (0..size)
            .map(|r| {
                let low = r % stride;
                let high = r / stride;
                self.values[low + value * stride + high * stride * card]
            })
            .collect();
        self.without(k, values)
    }

    fn without(&self, k: usize, values: Vec<f64>) -> Factor {
        let mut scope = self.scope.clone();
        let mut cards = self.cards.clone();
        scope.remove(k);
        cards.remove(k);
        let strides = strides_for(&cards);
        Factor {
            scope,
            cards,
            strides,
            values,
        }
    }

    /// Zeroes every entry where `var` differs from `value`.
    pub fn observe(&mut self, var: VarId, value: usize) {
        let Some(k) = self.position(var) else {
            return;
        };
        let stride = self.strides[k];
        let card = self.cards[k];
        for (i, entry) in self.values.iter_mut().enumerate() {
            if (i / stride) % card != value {
                *entry = 0.0;
            }
        }
    }

    /// Applies every evidence entry that falls inside the scope.
    pub fn observe_all(&mut self, evidence: &Evidence) {
        for (var, value) in evidence.iter() {
            self.observe(var, value);
        }
    }

    /// Sums the entries consistent with a partial instantiation indexed by [`VarId`].
    pub fn sum_consistent(&self, instantiation: &[Option<u32>]) -> f64 {
        let mut base = 0usize;
        let mut free: SmallVec<[(usize, usize); 8]> = SmallVec::new();
        for (k, var) in self.scope.iter().enumerate() {
            match instantiation[var.index()] {
                Some(value) => base += value as usize * self.strides[k],
                None => free.push((self.strides[k], self.cards[k])),
            }
        }
        if free.is_empty() {
            return self.values[base];
        }
        let size: usize = free.iter().map(|(_, card)| card).product();
        let mut digits = Digits::from_elem(0, free.len());
        let mut offset = base;
        let mut total = 0.0;
        for _ in 0..size {
            total += self.values[offset];
            for (d, (stride, card)) in free.iter().enumerate() {
                digits[d] += 1;
                offset += stride;
                if digits[d] < *card {
                    break;
                }
                offset -= stride * card;
                digits[d] = 0;
            }
        }
        total
    }

    /// Sum of all entries.
    pub fn total(&self) -> f64 {
        self.values.iter().sum()
    }
}

fn strides_for(cards: &[usize]) -> Digits {
    let mut strides = Digits::with_capacity(cards.len());
    let mut size = 1;
    for card in cards {
        strides.push(size);
        size *= card;
    }
    strides
}
