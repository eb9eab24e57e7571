//! Run execution for Lattice sweeps: generation backends, dataset
//! normalization, and the cache-honoring executor that ties one parameter
//! assignment to at most one produced output.

pub mod backend;
pub mod chat_api;
pub mod dataset;
pub mod local;
pub mod runner;
pub mod whisper;

pub use backend::*;
pub use chat_api::*;
pub use dataset::*;
pub use local::*;
pub use runner::*;
pub use whisper::*;
