//! # lt-report
//!
//! Turns a results directory full of artifacts into a sorted collection of
//! completed runs and a serialized sweep report. The core's obligation
//! ends here; visualization is downstream.

mod assemble;
mod naming;

pub use assemble::{assemble_runs, SweepReport};
pub use naming::{composite_parameters_to_name, parameters_to_name};
