use crate::values::ValueKind;
use thiserror::Error;

/// Errors raised by the simulation harness and by user callbacks
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Kind mismatch for '{name}': expected {expected}, got {actual}")]
    KindMismatch {
        name: String,
        expected: ValueKind,
        actual: ValueKind,
    },

    #[error("Context is read-only")]
    ReadOnly,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index {index} out of range (len {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("Unsupported domain: {0}")]
    UnsupportedDomain(String),

    #[error("Not configured: {0}")]
    NotConfigured(String),

    #[error("Ensemble has not been run")]
    NotRun,

    #[error("Variable '{name}' holds {kind} values, which are not numeric")]
    NotNumeric { name: String, kind: ValueKind },

    /// Raised from inside a user callback
    #[error("Callback failed: {0}")]
    Callback(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("Run {run} failed: {source}")]
    RunFailed {
        run: usize,
        #[source]
        source: Box<SimError>,
    },
}

impl SimError {
    /// Convenience constructor for callback-raised failures
    pub fn callback(msg: impl Into<String>) -> Self {
        Self::Callback(msg.into())
    }

    /// Strip any `RunFailed` wrapping and return the underlying error
    pub fn root_cause(&self) -> &SimError {
        match self {
            SimError::RunFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type SimResult<T> = std::result::Result<T, SimError>;
