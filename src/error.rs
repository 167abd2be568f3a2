use thiserror::Error;

/// Cross mapping error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("Source and target pose trackers not yet initialized")]
    NotInitialized,

    #[error("Interpolator has not been solved")]
    NotFitted,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),

    #[error("Snapshot not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for mapping operations
pub type MResult<T> = Result<T, MappingError>;

impl MappingError {
    /// Singular-matrix error carrying the actionable hint for snapshot users
    pub fn duplicate_inputs(detail: impl Into<String>) -> Self {
        MappingError::SingularMatrix(format!(
            "{} (two or more snapshots have identical input values)",
            detail.into()
        ))
    }
}

impl From<serde_json::Error> for MappingError {
    fn from(err: serde_json::Error) -> Self {
        MappingError::Storage(err.to_string())
    }
}

impl From<std::io::Error> for MappingError {
    fn from(err: std::io::Error) -> Self {
        MappingError::Storage(err.to_string())
    }
}
