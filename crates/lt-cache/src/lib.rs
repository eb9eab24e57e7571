//! Filesystem-backed memoization for sweep runs.
//!
//! Every unit of work is addressed by a fingerprint of its parameter
//! assignment. All coordination happens through artifact files next to
//! each other in the results directory, so concurrent workers and
//! restarted sweeps agree on progress without any shared process state.

pub mod entry;
pub mod fingerprint;
pub mod lock;
pub mod store;

pub use entry::*;
pub use fingerprint::*;
pub use lock::*;
pub use store::*;
