//! The bnkit engine.
//!
//! This module provides:
//! - **errors**: the error taxonomy shared by every operation
//! - **network**: variables, domains and flat CPT storage
//! - **evidence**: partial assignments used as queries and cache keys
//! - **domain_iter**: splittable Cartesian enumeration of joint assignments
//! - **factor**: factor algebra for the exact engines
//! - **moral_graph** / **elimination_order**: moralization and width-optimal order search
//! - **inference**: the three exact inference engines
//! - **sampling**: forward and stratified exact-count sampling
//! - **learning**: CPT estimation from counts

pub mod cancel;
pub mod counters;
pub mod domain_iter;
pub mod elimination_order;
pub mod errors;
pub mod evidence;
pub mod factor;
pub mod inference;
pub mod learning;
pub mod moral_graph;
pub mod network;
pub mod sampling;
