//! Identifier mangling for text formats whose names must be identifiers.
//!
//! Runs of characters outside `[A-Za-z0-9]` collapse to one `_`, and a name starting
//! with a digit gets an `n` prefix. [`IdentifierTable`] additionally keeps mangled
//! names unique within one export.

use rustc_hash::FxHashSet;

/// Identifier-safe form of `name`.
pub fn mangle(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    let mut in_run = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    if out.is_empty() {
        out.push('_');
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'n');
    }
    out
}

/// Hands out mangled identifiers, suffixing `_2`, `_3`, ... on collisions.
#[derive(Debug, Default)]
pub struct IdentifierTable {
    taken: FxHashSet<String>,
}

impl IdentifierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identifier(&mut self, name: &str) -> String {
        let base = mangle(name);
        if self.taken.insert(base.clone()) {
            return base;
        }
        let mut suffix = 2;
        loop {
            let candidate = format!("{}_{}", base, suffix);
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_runs_and_prefixes_digits() {
        assert_eq!(mangle("age group"), "age_group");
        assert_eq!(mangle("a -- b"), "a_b");
        assert_eq!(mangle(">=15"), "_15");
        assert_eq!(mangle("15-64"), "n15_64");
        assert_eq!(mangle("plain"), "plain");
        assert_eq!(mangle(""), "_");
    }

    #[test]
    fn table_disambiguates() {
        let mut table = IdentifierTable::new();
        assert_eq!(table.identifier("a b"), "a_b");
        assert_eq!(table.identifier("a-b"), "a_b_2");
        assert_eq!(table.identifier("a+b"), "a_b_3");
        assert_eq!(table.identifier("c"), "c");
    }
}
