//! Error types for publish persistence.

/// Errors that can occur while storing or reading publish records.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    /// No pooled connection could be checked out.
    #[error("publish store unavailable: {0}")]
    Pool(#[from] r2d2::Error),

    /// A database operation failed.
    #[error("publish database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// JSON serialization or deserialization failed.
    #[error("publish serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored column held a value outside its enumeration.
    #[error("invalid stored value: {0}")]
    InvalidColumn(String),
}
