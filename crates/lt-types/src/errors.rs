use thiserror::Error;

/// Main error type for the Lattice system
#[derive(Error, Debug)]
pub enum LatticeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors: bad search-space references, malformed parameter
/// values, unknown presets. Always fatal, never retried.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Search space does not declare dimension: {name}")]
    UnknownDimension { name: String },

    #[error("Categorical dimension has no candidate values: {name}")]
    EmptyCategorical { name: String },

    #[error("Assignment is missing required parameter: {name}")]
    MissingParameter { name: String },

    #[error("Parameter {name} has the wrong type: expected {expected}")]
    WrongValueType { name: String, expected: &'static str },

    #[error("Unknown {kind} preset: {name}")]
    UnknownPreset { kind: String, name: String },

    #[error("Unknown experiment: {name}")]
    UnknownExperiment { name: String },

    #[error("Conflicting options: {message}")]
    ConflictingOptions { message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Cache integrity errors. A collision is fatal: two distinct assignments
/// resolving to one artifact root would silently corrupt unrelated runs.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache collision at {fingerprint}: stored parameters {existing} do not match {incoming}")]
    Collision {
        fingerprint: String,
        existing: String,
        incoming: String,
    },

    #[error("Corrupt cache artifact {path}: {message}")]
    CorruptArtifact { path: String, message: String },

    #[error("Cache artifact not found: {path}")]
    MissingArtifact { path: String },
}

/// Generation-backend failures. Recorded durably as a failure marker and
/// propagated; never retried automatically.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Generation failed on {backend}: {message}")]
    Generation { backend: String, message: String },

    #[error("Request to {backend} failed: {message}")]
    Request { backend: String, message: String },

    #[error("Unexpected response from {backend}: {message}")]
    UnexpectedResponse { backend: String, message: String },

    #[error("Missing credential for {backend}: set {variable}")]
    MissingCredential { backend: String, variable: String },
}

/// Dataset loading and normalization errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data source not found: {path}")]
    SourceNotFound { path: String },

    #[error("Data parsing error: {message}")]
    ParseError { message: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Dataset is empty: {path}")]
    EmptyDataset { path: String },

    #[error("Length mismatch: {labels} labels vs {predictions} predictions")]
    LengthMismatch { labels: usize, predictions: usize },
}

/// Result type alias for Lattice operations
pub type LatticeResult<T> = Result<T, LatticeError>;

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::LatticeError::Config($crate::ConfigError::Invalid {
            message: format!($($arg)*),
        })
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::LatticeError::Internal(format!($($arg)*))
    };
}
