//! Error types for the metadata layer.

use thiserror::Error;

/// Result type alias for metadata operations.
pub type MetaResult<T> = Result<T, MetaError>;

/// Errors that can occur while talking to the metadata store or waiting on
/// a projection.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MetaError {
    /// The shared cancellation signal fired before the operation finished.
    #[error("interrupted")]
    Interrupted,

    /// The store actor has shut down and no longer accepts requests.
    #[error("metadata store closed")]
    StoreClosed,

    /// The writer side of a projection went away while someone was waiting
    /// for it to change.
    #[error("projection closed: {0}")]
    ProjectionClosed(String),
}
