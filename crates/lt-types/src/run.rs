//! Completed-run records and sweep counters.

use serde::{Deserialize, Serialize};

use crate::params::ParameterAssignment;

/// A completed cache entry reified for reporting: parameters, the produced
/// predictions, and a derived display name. Built only from entries whose
/// output artifact exists; immutable once assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRun {
    pub parameters: ParameterAssignment,
    pub predictions: Vec<String>,
    pub name: String,
    /// Scalar quality score, when the entry has been scored.
    pub metric: Option<f64>,
}

impl CompletedRun {
    pub fn new(parameters: ParameterAssignment, predictions: Vec<String>, name: String) -> Self {
        Self {
            parameters,
            predictions,
            name,
            metric: None,
        }
    }

    pub fn with_metric(mut self, metric: f64) -> Self {
        self.metric = Some(metric);
        self
    }
}

/// Counters describing what one sweep pass actually did.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepStats {
    /// Outputs served from existing artifacts without invoking a backend.
    pub cache_hits: u64,
    /// Backend invocations that produced an output artifact.
    pub invocations: u64,
    /// Assignments skipped because another process held the lock, or the
    /// entry had already failed terminally.
    pub skips: u64,
    /// Backend invocations that ended in a failure marker.
    pub failures: u64,
}

impl SweepStats {
    pub fn attempts(&self) -> u64 {
        self.cache_hits + self.invocations + self.failures
    }

    pub fn hit_rate(&self) -> f64 {
        if self.attempts() == 0 {
            0.0
        } else {
            self.cache_hits as f64 / self.attempts() as f64
        }
    }
}
