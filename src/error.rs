use thiserror::Error;

/// Errors raised before or around a generation run. Failures of individual
/// sets are never raised; they are recorded in `SetOutcome`.
#[derive(Debug, Error)]
pub enum GenError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("invalid document id: {0}")]
    InvalidId(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
