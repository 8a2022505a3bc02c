//! # bnkit core
//!
//! Discrete Bayesian networks: CPT storage, exact inference and exact-count sampling.
//!
//! ```
//! use std::sync::Arc;
//! use bnkit_core::{EliminationEngine, InferenceEngine, Network};
//!
//! let mut net = Network::new("census");
//! let gender = net.add_variable("gender", ["male", "female"])?;
//! let age = net.add_variable("age", ["<15", ">=15"])?;
//! net.add_parent(age, gender)?;
//! net.set_cpt(gender, vec![0.55, 0.45])?;
//! net.set_cpt(age, vec![0.55, 0.45, 0.50, 0.50])?;
//!
//! let mut engine = EliminationEngine::new(Arc::new(net))?;
//! let p = engine.conditional_probability("age", "<15")?;
//! assert!((p - 0.5275).abs() < 1e-12);
//! # Ok::<(), bnkit_core::BnError>(())
//! ```

#![forbid(unsafe_code)]

pub mod engine;

pub use engine::cancel::CancellationToken;
pub use engine::counters::InferenceCounters;
pub use engine::domain_iter::{joint_probability_of_evidence, Combination, DomainIterator, DomainSpliterator};
pub use engine::elimination_order::{EliminationOrder, EliminationOrderConfig, EliminationOrderSearch};
pub use engine::errors::{BnError, BnResult};
pub use engine::evidence::Evidence;
pub use engine::factor::Factor;
pub use engine::inference::{
    EliminationEngine, EngineConfig, InferenceEngine, RecursiveConditioningEngine,
    SimpleConditioningEngine, ZeroEvidencePolicy,
};
pub use engine::learning::{LearningConfig, ParameterLearner};
pub use engine::moral_graph::MoralGraph;
pub use engine::network::{Network, VarId, Variable, ZeroSumPolicy};
pub use engine::sampling::{ForwardSampler, RemainderStrategy, StratifiedConfig, StratifiedSampler, Stratum};
