//! Error types for network construction, inference and sampling.

use thiserror::Error;

/// Errors raised by the network model, the inference engines and the samplers.
///
/// Structural and input errors (unknown variable, bad value, malformed CPT) are
/// returned as soon as they are detected and never leave a network half-mutated.
/// Numerical edge cases are not errors: they follow the policy configured on the
/// operation (see [`ZeroSumPolicy`](crate::engine::network::ZeroSumPolicy) and
/// [`ZeroEvidencePolicy`](crate::engine::inference::ZeroEvidencePolicy)).
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BnError {
    /// A variable name that is not part of the network.
    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    /// A label outside the variable's domain.
    #[error("value '{value}' is not in the domain of '{variable}'")]
    ValueNotInDomain { variable: String, value: String },

    /// A variable name added twice.
    #[error("variable '{0}' already exists")]
    DuplicateVariable(String),

    /// A domain label added twice to the same variable.
    #[error("value '{value}' already exists in the domain of '{variable}'")]
    DuplicateDomainValue { variable: String, value: String },

    /// The same parent added twice to a variable.
    #[error("'{parent}' is already a parent of '{child}'")]
    DuplicateParent { child: String, parent: String },

    /// Adding the parent would close a directed cycle.
    #[error("adding '{parent}' as a parent of '{child}' would create a cycle")]
    CyclicStructure { child: String, parent: String },

    /// A CPT accessor received the wrong number of parent values.
    #[error("'{variable}' has {expected} parents but {got} parent values were given")]
    ParentArity {
        variable: String,
        expected: usize,
        got: usize,
    },

    /// CPT values out of [0, 1] or a parent combination not summing to 1.
    #[error("malformed CPT for '{variable}': {reason}")]
    MalformedCpt { variable: String, reason: String },

    /// The evidence has probability zero, so nothing can be sampled from it.
    #[error("evidence has zero probability")]
    InfeasibleEvidence,

    /// The best-first order search emptied its open set without reaching the goal.
    #[error("elimination order search exhausted its open set")]
    EliminationOrderSearchExhausted,

    /// A factor lookup with an assignment that does not cover the factor's scope.
    #[error("undefined factor entry: {0}")]
    UndefinedFactorEntry(String),

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internal invariant violation (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias used across the core crate.
pub type BnResult<T> = Result<T, BnError>;
