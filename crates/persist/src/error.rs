//! Error types for the persistence layer
//!
//! Bootstrap-time failures (configuration, mapping) and runtime collection
//! load failures. Runtime failures always carry a [`NormalizedError`]; raw
//! driver errors never reach callers except as its preserved cause.

use crate::translation::NormalizedError;

/// Result type alias for persistence operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for persistence operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum OrmError {
    /// An error translator's configuration hook rejected the configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A collection role cannot be expressed as a static select
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// Owner keys that do not fit the statement they are bound to
    #[error("Invalid key error: {0}")]
    InvalidKey(String),

    /// Batch sizes start at one
    #[error("Invalid batch size {0}: a collection loader needs at least one key per batch")]
    InvalidBatchSize(usize),

    /// Database failure while loading a collection, already translated
    #[error("Collection load failed for role '{role}' at {call_site}: {source}")]
    CollectionLoad {
        role: String,
        call_site: &'static str,
        #[source]
        source: Box<NormalizedError>,
    },
}

impl OrmError {
    /// The normalized database error behind a runtime failure, if any
    pub fn normalized(&self) -> Option<&NormalizedError> {
        match self {
            OrmError::CollectionLoad { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Returns true for failures raised while wiring components at bootstrap
    pub fn is_bootstrap_error(&self) -> bool {
        matches!(
            self,
            OrmError::Configuration(_) | OrmError::Mapping(_) | OrmError::InvalidBatchSize(_)
        )
    }
}
