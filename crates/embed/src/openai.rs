//! Client for OpenAI-compatible `/embeddings` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{EmbedError, Result};
use crate::Embedder;

/// Default API root; `/embeddings` is appended.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used by the reference index.
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Output size of `text-embedding-3-small`.
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Embedder backed by the OpenAI embeddings API (or any server speaking the same protocol).
pub struct OpenAiEmbedder {
	client: reqwest::Client,
	api_key: String,
	base_url: String,
	model: String,
	dim: usize,
	/// Sent to the API only when set, for models that support shortened outputs.
	request_dimensions: Option<usize>,
}

impl OpenAiEmbedder {
	/// Create a client with the default model, endpoint and a 30 second timeout.
	pub fn new(api_key: impl Into<String>) -> Result<Self> {
		Self::with_timeout(api_key, Duration::from_secs(30))
	}

	pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
		let api_key = api_key.into();
		if api_key.trim().is_empty() {
			return Err(EmbedError::Auth("API key must not be empty".into()));
		}
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.build()
			.map_err(|e| EmbedError::Transport(e.to_string()))?;
		Ok(Self {
			client,
			api_key,
			base_url: DEFAULT_BASE_URL.to_string(),
			model: DEFAULT_MODEL.to_string(),
			dim: DEFAULT_DIMENSIONS,
			request_dimensions: None,
		})
	}

	pub fn with_model(mut self, model: impl Into<String>) -> Self {
		self.model = model.into();
		self
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into().trim_end_matches('/').to_string();
		self
	}

	/// Declare the dimension the index expects without changing the request.
	pub fn with_dimension(mut self, dim: usize) -> Self {
		self.dim = dim;
		self
	}

	/// Ask the API to shorten its output to `dim` values.
	pub fn with_request_dimensions(mut self, dim: usize) -> Self {
		self.dim = dim;
		self.request_dimensions = Some(dim);
		self
	}

	fn endpoint(&self) -> String {
		format!("{}/embeddings", self.base_url)
	}
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
	model: &'a str,
	input: Vec<&'a str>,
	#[serde(skip_serializing_if = "Option::is_none")]
	dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
	data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
	#[serde(default)]
	index: Option<usize>,
	embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
	error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
	message: String,
}

/// Map a non-success status to the error taxonomy used by the retry policy.
fn classify(status: StatusCode, detail: String) -> EmbedError {
	match status {
		StatusCode::TOO_MANY_REQUESTS => EmbedError::RateLimited(detail),
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => EmbedError::Auth(detail),
		s if s.is_server_error() => EmbedError::Unavailable { status: s.as_u16(), message: detail },
		StatusCode::REQUEST_TIMEOUT => EmbedError::Transport(detail),
		_ => EmbedError::InvalidInput(format!("{}: {}", status, detail)),
	}
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
	async fn embed(&self, text: &str) -> Result<Vec<f32>> {
		let mut out = self.embed_batch(&[text]).await?;
		if out.is_empty() {
			return Err(EmbedError::MalformedResponse("response contained no embeddings".into()));
		}
		Ok(out.swap_remove(0))
	}

	async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
		if texts.is_empty() {
			return Ok(vec![]);
		}
		debug!("embedding {} text(s) with {}", texts.len(), self.model);

		let body = EmbeddingRequest {
			model: &self.model,
			input: texts.to_vec(),
			dimensions: self.request_dimensions,
		};

		let response = self
			.client
			.post(self.endpoint())
			.bearer_auth(&self.api_key)
			.json(&body)
			.send()
			.await
			.map_err(|e| EmbedError::Transport(e.to_string()))?;

		let status = response.status();
		if !status.is_success() {
			let raw = response.text().await.unwrap_or_default();
			let detail = serde_json::from_str::<ErrorResponse>(&raw)
				.map(|e| e.error.message)
				.unwrap_or(raw);
			return Err(classify(status, detail));
		}

		let parsed: EmbeddingResponse = response
			.json()
			.await
			.map_err(|e| EmbedError::MalformedResponse(e.to_string()))?;

		if parsed.data.len() != texts.len() {
			return Err(EmbedError::MalformedResponse(format!(
				"expected {} embeddings, got {}",
				texts.len(),
				parsed.data.len()
			)));
		}

		// The API may reorder entries; `index` restores input order when present.
		let mut data = parsed.data;
		if data.iter().all(|d| d.index.is_some()) {
			data.sort_by_key(|d| d.index);
		}
		Ok(data.into_iter().map(|d| d.embedding).collect())
	}

	fn dimension(&self) -> usize {
		self.dim
	}
}
