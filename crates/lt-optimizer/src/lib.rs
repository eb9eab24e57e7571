//! # lt-optimizer
//!
//! Search space definitions and cache-aware exhaustive sweeps for Lattice.
//!
//! A [`SearchSpace`] declares the axes of an experiment; the
//! [`ExhaustiveOptimizer`] walks its deterministic enumeration, skipping
//! combinations the results directory already accounts for, until the
//! space or the trial budget is exhausted.

mod exhaustive;
mod space;

pub use exhaustive::ExhaustiveOptimizer;
pub use space::{CompositeSearchSpace, DimensionDef, DimensionKind, SearchSpace};
