//! Error types for document stores.

use thiserror::Error;

/// Errors raised by a [`DocumentStore`](crate::DocumentStore) or the ingestion ledger.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The service could not be reached or did not answer in time.
    #[error("cannot reach {backend} store: {message}")]
    Connection { backend: &'static str, message: String },

    /// The service answered but refused the request (bad credentials, unknown index, bad query).
    #[error("{backend} store rejected the request ({status}): {message}")]
    Rejected {
        backend: &'static str,
        status: u16,
        message: String,
    },

    /// The response could not be decoded.
    #[error("unexpected response from {backend} store: {message}")]
    Malformed { backend: &'static str, message: String },

    /// A document's embedding does not fit the table's vector column.
    #[error("embedding has {actual} dimensions, store expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Failure inside the embedded local backend.
    #[error("local store error: {0}")]
    Local(String),

    #[error("ledger error: {0}")]
    Ledger(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

pub(crate) fn local<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Local(e.to_string())
}
