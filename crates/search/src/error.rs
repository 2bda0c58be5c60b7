use embed::EmbedError;
use store::StoreError;
use thiserror::Error;

/// Errors produced while building or running a search.
#[derive(Debug, Error)]
pub enum SearchError {
	/// The request itself is malformed; nothing was sent anywhere.
	#[error("invalid request: {0}")]
	InvalidRequest(String),

	#[error("embedding provider error: {0}")]
	Embedding(#[from] EmbedError),

	#[error("store error: {0}")]
	Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, SearchError>;
