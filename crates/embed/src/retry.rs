//! Bounded retry with increasing backoff for transient embedding failures.

use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::error::{EmbedError, Result};
use crate::Embedder;

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	/// Total attempts, including the first one. Zero is treated as one.
	pub max_attempts: u32,
	/// Delay after the first failed attempt.
	pub initial_backoff: Duration,
	/// Factor applied to the delay after every further failure.
	pub multiplier: u32,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: 3,
			initial_backoff: Duration::from_millis(500),
			multiplier: 2,
		}
	}
}

impl RetryPolicy {
	/// Policy that never retries.
	pub fn none() -> Self {
		Self { max_attempts: 1, ..Self::default() }
	}

	/// Delay to wait after the given failed attempt (1-based).
	pub fn backoff_after(&self, attempt: u32) -> Duration {
		let exp = attempt.saturating_sub(1);
		let factor = self.multiplier.max(1).saturating_pow(exp);
		self.initial_backoff.saturating_mul(factor)
	}

	/// Run `op` until it succeeds, fails permanently or runs out of attempts.
	pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
	where
		F: FnMut() -> Fut + Send,
		Fut: std::future::Future<Output = Result<T>> + Send,
		T: Send,
	{
		let max = self.max_attempts.max(1);
		let mut attempt = 1;
		loop {
			match op().await {
				Ok(v) => return Ok(v),
				Err(e) if !e.is_transient() => return Err(e),
				Err(e) if attempt >= max => {
					if max == 1 {
						return Err(e);
					}
					return Err(EmbedError::Exhausted { attempts: attempt, last: Box::new(e) });
				}
				Err(e) => {
					let delay = self.backoff_after(attempt);
					warn!("{} failed (attempt {}/{}): {}; retrying in {:?}", what, attempt, max, e, delay);
					tokio::time::sleep(delay).await;
					attempt += 1;
				}
			}
		}
	}
}

/// Wraps another embedder and retries transient failures according to a [`RetryPolicy`].
pub struct RetryingEmbedder<E: Embedder> {
	inner: E,
	policy: RetryPolicy,
}

impl<E: Embedder> RetryingEmbedder<E> {
	pub fn new(inner: E, policy: RetryPolicy) -> Self {
		Self { inner, policy }
	}

	pub fn inner(&self) -> &E {
		&self.inner
	}
}

#[async_trait]
impl<E: Embedder> Embedder for RetryingEmbedder<E> {
	async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		self.policy.run("embedding request", || self.inner.embed(text)).await
	}

	async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
		self.policy.run("batch embedding request", || self.inner.embed_batch(texts)).await
	}

	fn dimension(&self) -> usize {
		self.inner.dimension()
	}
}
