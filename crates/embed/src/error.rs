//! Error types for embedding providers.

use thiserror::Error;

/// Errors raised while requesting embeddings.
#[derive(Debug, Error)]
pub enum EmbedError {
	/// The provider throttled the request (HTTP 429).
	#[error("embedding provider rate limited the request: {0}")]
	RateLimited(String),

	/// The provider answered with a server-side failure (HTTP 5xx).
	#[error("embedding provider unavailable ({status}): {message}")]
	Unavailable { status: u16, message: String },

	/// The request never produced an HTTP response (connect, timeout, TLS).
	#[error("embedding request failed: {0}")]
	Transport(String),

	/// Missing or rejected credentials (HTTP 401/403).
	#[error("embedding provider rejected credentials: {0}")]
	Auth(String),

	/// The provider refused the input or the model name (other 4xx).
	#[error("embedding provider rejected input: {0}")]
	InvalidInput(String),

	/// The vector length does not match the index schema.
	#[error("embedding has {actual} dimensions, index expects {expected}")]
	DimensionMismatch { expected: usize, actual: usize },

	/// The response body could not be decoded.
	#[error("malformed embedding response: {0}")]
	MalformedResponse(String),

	/// A transient failure persisted across every allowed attempt.
	#[error("embedding failed after {attempts} attempts: {last}")]
	Exhausted {
		attempts: u32,
		#[source]
		last: Box<EmbedError>,
	},
}

impl EmbedError {
	/// Whether retrying the same request may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			EmbedError::RateLimited(_) | EmbedError::Unavailable { .. } | EmbedError::Transport(_)
		)
	}
}

/// Convenience result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;
