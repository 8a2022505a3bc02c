//! Evidence: a partial assignment of variables to domain values.
//!
//! Entries are kept sorted by [`VarId`], so two evidence sets with the same entries
//! compare and hash equal regardless of insertion order. That makes [`Evidence`]
//! directly usable as a cache key.

use smallvec::SmallVec;

use crate::engine::errors::BnResult;
use crate::engine::network::{Network, VarId};

/// A sorted partial assignment `variable → value index`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Evidence {
    entries: SmallVec<[(VarId, u32); 8]>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds evidence from label pairs, validating each against the network.
    pub fn from_labels<'a, I>(network: &Network, pairs: I) -> BnResult<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut evidence = Self::new();
        for (name, value) in pairs {
            let (var, index) = network.resolve(name, value)?;
            evidence.set(var, index);
        }
        Ok(evidence)
    }

    /// Builds evidence from one external record.
    ///
    /// `None` (a missing cell) means "no evidence for this variable in this record".
    pub fn from_row<I, K, V>(network: &Network, row: I) -> BnResult<Self>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut evidence = Self::new();
        for (name, value) in row {
            let Some(value) = value else {
                continue;
            };
            let (var, index) = network.resolve(name.as_ref(), value.as_ref())?;
            evidence.set(var, index);
        }
        Ok(evidence)
    }

    /// Sets `var = value`. Returns `true` if the evidence changed.
    pub fn set(&mut self, var: VarId, value: usize) -> bool {
        let value = value as u32;
        match self.entries.binary_search_by_key(&var, |(v, _)| *v) {
            Ok(pos) => {
                let changed = self.entries[pos].1 != value;
                self.entries[pos].1 = value;
                changed
            }
            Err(pos) => {
                self.entries.insert(pos, (var, value));
                true
            }
        }
    }

    /// Removes the entry for `var`. Returns `true` if there was one.
    pub fn remove(&mut self, var: VarId) -> bool {
        match self.entries.binary_search_by_key(&var, |(v, _)| *v) {
            Ok(pos) => {
                self.entries.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn get(&self, var: VarId) -> Option<usize> {
        self.entries
            .binary_search_by_key(&var, |(v, _)| *v)
            .ok()
            .map(|pos| self.entries[pos].1 as usize)
    }

    pub fn contains(&self, var: VarId) -> bool {
        self.get(var).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries in ascending [`VarId`] order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, usize)> + '_ {
        self.entries.iter().map(|(v, value)| (*v, *value as usize))
    }

    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.entries.iter().map(|(v, _)| *v)
    }

    /// Dense instantiation indexed by [`VarId`] over `len` variables.
    pub fn to_instantiation(&self, len: usize) -> Vec<Option<u32>> {
        let mut dense = vec![None; len];
        for (var, value) in &self.entries {
            dense[var.index()] = Some(*value);
        }
        dense
    }

    /// Evidence restricted to the variables selected by `mask`.
    pub fn restricted(&self, mask: &[bool]) -> Evidence {
        Evidence {
            entries: self
                .entries
                .iter()
                .copied()
                .filter(|(v, _)| mask[v.index()])
                .collect(),
        }
    }

    /// Whether a complete assignment agrees with every entry.
    pub fn is_consistent_with(&self, assignment: &[usize]) -> bool {
        self.entries
            .iter()
            .all(|(v, value)| assignment[v.index()] == *value as usize)
    }
}

impl FromIterator<(VarId, usize)> for Evidence {
    fn from_iter<T: IntoIterator<Item = (VarId, usize)>>(iter: T) -> Self {
        let mut evidence = Evidence::new();
        for (var, value) in iter {
            evidence.set(var, value);
        }
        evidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn order_independent_equality() {
        let a: Evidence = [(VarId(3), 1), (VarId(1), 0)].into_iter().collect();
        let b: Evidence = [(VarId(1), 0), (VarId(3), 1)].into_iter().collect();
        assert_eq!(a, b);
        assert_eq!(a.iter().map(|(v, _)| v).collect::<Vec<_>>(), vec![VarId(1), VarId(3)]);
    }

    #[test]
    fn set_reports_changes() {
        let mut e = Evidence::new();
        assert!(e.set(VarId(0), 1));
        assert!(!e.set(VarId(0), 1));
        assert!(e.set(VarId(0), 0));
        assert!(e.remove(VarId(0)));
        assert!(!e.remove(VarId(0)));
        assert!(e.is_empty());
    }

    #[test]
    fn rows_skip_missing_cells() {
        let mut net = Network::new("n");
        net.add_variable("a", ["x", "y"]).unwrap();
        net.add_variable("b", ["x", "y"]).unwrap();
        let row: HashMap<&str, Option<&str>> = HashMap::from([("a", Some("y")), ("b", None)]);
        let e = Evidence::from_row(&net, row).unwrap();
        assert_eq!(e.len(), 1);
        assert_eq!(e.get(VarId(0)), Some(1));

        let bad: Vec<(&str, Option<&str>)> = vec![("a", Some("z"))];
        assert!(Evidence::from_row(&net, bad).is_err());
    }
}
