//! The scoring capability interface.

use crate::errors::LatticeResult;

/// A scalar quality metric over produced outputs and ground truth.
///
/// Implementations must be pure: no cache or filesystem side effects (the
/// caller decides whether and where a score is persisted). Contexts are the
/// rendered inputs of each example (conversation text for chat sweeps, audio
/// paths for transcription) and may be ignored by metrics that only compare
/// predictions to labels.
pub trait Metric: Send + Sync + std::fmt::Debug {
    /// Short metric name used in logs and reports.
    fn name(&self) -> &str;

    /// Score `predictions` against `labels`; higher is better unless the
    /// metric documents otherwise.
    fn score(
        &self,
        contexts: &[String],
        labels: &[String],
        predictions: &[String],
    ) -> LatticeResult<f64>;
}
