//! Error types for featparse_core.
//!
//! Only setup and I/O problems surface as `Err`. Anomalies inside an example
//! line are reported as [`crate::parser::ParseWarning`] values instead.

use thiserror::Error;

/// Errors raised while building a parser configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config JSON: {0}")]
    Json(String),

    #[error("Invalid affix spec {spec:?}: {message}")]
    Affix { spec: String, message: String },

    #[error("Invalid namespace redefinition {spec:?}: {message}")]
    Redefine { spec: String, message: String },

    #[error("Invalid interaction {term:?}: {message}")]
    Interaction { term: String, message: String },

    #[error("Unknown hash mode: {0}")]
    HashMode(String),

    #[error("Namespace name must be exactly one byte, got {0:?}")]
    NamespaceName(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Json(err.to_string())
    }
}

/// Fatal problems detected before (or while) running the demangle pass.
#[derive(Debug, Error)]
pub enum DemangleError {
    #[error("demangle output path is missing")]
    MissingOutput,

    #[error("demangle requires auditing to be enabled")]
    AuditDisabled,

    #[error("demangle can't be used with a dataset cache file")]
    CacheFile,

    #[error("demangle can't be used with passes > 1 (got {0})")]
    MultiplePasses(u32),

    #[error("regressor has no non-zero weights, nothing to demangle")]
    NoWeights,

    #[error("multiclass options are mutually exclusive: {0}")]
    ConflictingClassOptions(String),

    #[error("class count must be positive")]
    ZeroClasses,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A label could not be interpreted; the example is still parsed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LabelError {
    #[error("malformed label value {0:?}")]
    MalformedFloat(String),

    #[error("malformed label, {0} tokens")]
    TooManyTokens(usize),
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
