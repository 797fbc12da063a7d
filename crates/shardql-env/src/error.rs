//! Error types for query environment operations.

use shardql_meta::MetaError;
use thiserror::Error;

/// Result type alias for environment operations.
pub type EnvResult<T> = Result<T, EnvError>;

/// Errors surfaced by the query environment.
///
/// Storage errors are relayed unchanged; nothing at this layer retries.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvError {
    /// The query itself is malformed. Reported to the client before
    /// evaluation starts.
    #[error("{0}")]
    Query(String),

    /// The query's cancellation signal fired during a blocking step.
    #[error("interrupted")]
    Interrupted,

    /// The storage layer (or the metadata store) could not serve the request.
    #[error("cannot perform query: {0}")]
    CannotPerformQuery(String),

    /// Internal programmer error. Fatal to the current operation.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl EnvError {
    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn cannot_perform(msg: impl Into<String>) -> Self {
        Self::CannotPerformQuery(msg.into())
    }

    pub fn duplicate_optarg(key: &str) -> Self {
        Self::Query(format!("Duplicate global optarg: {key}"))
    }

    /// Whether this error is the client's fault rather than ours.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::Query(_))
    }
}

impl From<MetaError> for EnvError {
    fn from(e: MetaError) -> Self {
        match e {
            MetaError::Interrupted => Self::Interrupted,
            MetaError::StoreClosed => Self::CannotPerformQuery("metadata store closed".into()),
            MetaError::ProjectionClosed(name) => {
                Self::CannotPerformQuery(format!("{name} projection closed"))
            }
        }
    }
}
