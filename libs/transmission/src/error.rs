//! Transmission Error Types
//!
//! Errors raised while building, wiring and driving a router. Query misses
//! are not errors: a missing data holder or computation resolves to `None`.

use crate::identifier::TransformerId;
use crate::message::{DataKey, ExecutionKey};
use thiserror::Error;

/// Main runtime error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransmissionError {
    /// Invalid router or bus configuration
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Router constructed without any transformer
    #[error("Configuration error: transformer set should not be empty")]
    EmptyTransformerSet,

    /// Two transformers share one identifier
    #[error("Configuration error: duplicate transformer identifier '{0}'")]
    DuplicateTransformer(TransformerId),

    /// A transformer uses an identifier reserved by the router
    #[error("Configuration error: transformer identifier '{0}' is reserved")]
    ReservedIdentifier(TransformerId),

    /// A transformer already holds a data holder for this variant
    #[error("Transformer '{owner}' already holds data '{key}'")]
    DuplicateDataHolder { owner: TransformerId, key: DataKey },

    /// A computation is already registered for this variant
    #[error("Transformer '{owner}' already registered computation '{key}'")]
    DuplicateComputation { owner: TransformerId, key: DataKey },

    /// An execution is already registered under this key
    #[error("Transformer '{owner}' already registered execution '{key}'")]
    DuplicateExecution {
        owner: TransformerId,
        key: ExecutionKey,
    },

    /// Operation requires an initialized router
    #[error("Router is not running")]
    RouterNotRunning,

    /// Operation attempted after the router was cleared
    #[error("Router has been cleared")]
    RouterCleared,

    /// Operation attempted after the transformer was cleared
    #[error("Transformer '{0}' has been cleared")]
    TransformerCleared(TransformerId),

    /// Send attempted on a closed bus
    #[error("Bus '{0}' is closed")]
    BusClosed(&'static str),

    /// No tokio runtime is available to spawn tasks on
    #[error("No tokio runtime available: {0}")]
    NoRuntime(String),

    /// Generic I/O errors (configuration files)
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, TransmissionError>;

impl TransmissionError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a duplicate data holder error
    pub fn duplicate_data_holder(owner: &TransformerId, key: DataKey) -> Self {
        Self::DuplicateDataHolder {
            owner: owner.clone(),
            key,
        }
    }

    /// Create a duplicate computation error
    pub fn duplicate_computation(owner: &TransformerId, key: DataKey) -> Self {
        Self::DuplicateComputation {
            owner: owner.clone(),
            key,
        }
    }

    /// Create a duplicate execution error
    pub fn duplicate_execution(owner: &TransformerId, key: ExecutionKey) -> Self {
        Self::DuplicateExecution {
            owner: owner.clone(),
            key,
        }
    }

    /// Startup errors abort router construction and are never retried
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TransmissionError::Configuration { .. }
                | TransmissionError::EmptyTransformerSet
                | TransmissionError::DuplicateTransformer(_)
                | TransmissionError::ReservedIdentifier(_)
        )
    }

    /// Get error category for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            TransmissionError::Configuration { .. } => "configuration",
            TransmissionError::EmptyTransformerSet => "configuration",
            TransmissionError::DuplicateTransformer(_) => "configuration",
            TransmissionError::ReservedIdentifier(_) => "configuration",
            TransmissionError::DuplicateDataHolder { .. } => "registration",
            TransmissionError::DuplicateComputation { .. } => "registration",
            TransmissionError::DuplicateExecution { .. } => "registration",
            TransmissionError::RouterNotRunning => "lifecycle",
            TransmissionError::RouterCleared => "lifecycle",
            TransmissionError::TransformerCleared(_) => "lifecycle",
            TransmissionError::BusClosed(_) => "bus",
            TransmissionError::NoRuntime(_) => "runtime",
            TransmissionError::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for TransmissionError {
    fn from(err: std::io::Error) -> Self {
        TransmissionError::Io(err.to_string())
    }
}
