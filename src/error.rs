use crate::models::MovieId;
use thiserror::Error;

/// Feedback store failures. Only underlying I/O or a corrupt document can
/// fail a store operation, never business logic.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("feedback store I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("feedback store document is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// A concrete lookup was asked for an id the index does not know.
    /// Cold start is not an error and never maps here.
    #[error("unknown movie id {0}")]
    InvalidInput(MovieId),

    /// Recommendation requested before startup initialization completed.
    /// Callers should retry instead of treating this as an empty result.
    #[error("recommendation engine is still initializing")]
    ModelUnavailable,

    /// Poster lookup failure. Recovered inside the recommender by degrading
    /// to a missing poster; surfaced only by the poster client itself.
    #[error("external poster service failure: {0}")]
    ExternalService(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
