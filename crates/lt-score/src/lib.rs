//! # lt-score
//!
//! Quality metrics over sweep outputs, plus memoization of the scalar
//! score next to each entry's prediction artifacts.

mod memo;
mod metrics;

pub use memo::cached_metric;
pub use metrics::{ChrF, ExactMatch, LengthRatio, WordErrorRate};
