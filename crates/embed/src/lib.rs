//! Embedding abstraction for Movie Search.
//
// Provides a trait for turning text into fixed-length vectors, an HTTP client for
// OpenAI-compatible embedding endpoints and a bounded retry wrapper.

use async_trait::async_trait;

mod error;
mod openai;
mod retry;

pub use error::{EmbedError, Result};
pub use openai::{OpenAiEmbedder, DEFAULT_BASE_URL, DEFAULT_DIMENSIONS, DEFAULT_MODEL};
pub use retry::{RetryPolicy, RetryingEmbedder};

/// Trait for generating embeddings from text.
#[async_trait]
pub trait Embedder: Send + Sync {
	async fn embed(&self, text: &str) -> Result<Vec<f32>>;
	/// Embed multiple texts in a batch for efficiency.
	async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
		let mut out = Vec::with_capacity(texts.len());
		for text in texts {
			out.push(self.embed(text).await?);
		}
		Ok(out)
	}
	/// Return the embedding dimension.
	fn dimension(&self) -> usize;
}

#[async_trait]
impl<E: Embedder + ?Sized> Embedder for std::sync::Arc<E> {
	async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		(**self).embed(text).await
	}

	async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
		(**self).embed_batch(texts).await
	}

	fn dimension(&self) -> usize {
		(**self).dimension()
	}
}

/// Reject a vector whose length differs from the dimension declared by the index.
pub fn check_dimension(embedding: &[f32], expected: usize) -> Result<()> {
	if embedding.len() != expected {
		return Err(EmbedError::DimensionMismatch { expected, actual: embedding.len() });
	}
	Ok(())
}

/// Deterministic offline embedder for tests and dry runs.
///
/// Each lowercase alphanumeric token is hashed (CRC-32) into one bucket of the output
/// vector and the result is L2-normalised, so texts sharing words have a positive dot
/// product. Buckets do not depend on the toolchain, so stored vectors stay comparable.
pub struct DummyEmbedder {
	dim: usize,
}

impl DummyEmbedder {
	pub fn new(dim: usize) -> Self {
		Self { dim }
	}
}

impl Default for DummyEmbedder {
	fn default() -> Self {
		Self::new(DEFAULT_DIMENSIONS)
	}
}

#[async_trait]
impl Embedder for DummyEmbedder {
	async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		let mut vector = vec![0.0f32; self.dim];
		if self.dim == 0 {
			return Ok(vector);
		}
		let tokens = text
			.split(|c: char| !c.is_alphanumeric())
			.filter(|t| !t.is_empty())
			.map(|t| t.to_lowercase());
		for token in tokens {
			let bucket = (crc32fast::hash(token.as_bytes()) as u64 % self.dim as u64) as usize;
			vector[bucket] += 1.0;
		}
		let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
		if norm > 0.0 {
			vector.iter_mut().for_each(|v| *v /= norm);
		}
		Ok(vector)
	}

	fn dimension(&self) -> usize {
		self.dim
	}
}
