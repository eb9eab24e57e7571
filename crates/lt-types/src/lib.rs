pub mod chat;
pub mod errors;
pub mod metric;
pub mod params;
pub mod run;

pub use chat::*;
pub use errors::*;
pub use metric::*;
pub use params::*;
pub use run::*;
