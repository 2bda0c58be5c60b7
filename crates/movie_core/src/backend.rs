//! Building embedders, stores and searchers from configuration.

use std::sync::Arc;
use std::time::Duration;

use embed::{DummyEmbedder, EmbedError, Embedder, OpenAiEmbedder, RetryPolicy, RetryingEmbedder};
use log::debug;
use search::{HybridSearcher, QueryBuilder};
use store::{CouchbaseStore, DocumentStore, IngestLedger, LanceStore, StoreError};
use thiserror::Error;

use crate::config::{Backend, ConfigError, EmbeddingProvider, MovieSearchConfig};

#[derive(Debug, Error)]
pub enum BuildError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error(transparent)]
	Embed(#[from] EmbedError),

	#[error(transparent)]
	Store(#[from] StoreError),
}

pub type Searcher = HybridSearcher<Arc<dyn Embedder>, Arc<dyn DocumentStore>>;

/// Embedder for the configured provider. HTTP providers retry transient failures.
pub fn build_embedder(config: &MovieSearchConfig) -> Result<Arc<dyn Embedder>, BuildError> {
	config.validate()?;
	let emb = &config.embedding;

	match emb.provider {
		EmbeddingProvider::Hash => Ok(Arc::new(DummyEmbedder::new(emb.dimensions))),
		EmbeddingProvider::Openai => {
			let mut client = OpenAiEmbedder::with_timeout(emb.api_key.clone(), config.http_timeout())?
				.with_model(emb.model.clone())
				.with_base_url(emb.base_url.clone())
				.with_dimension(emb.dimensions);
			// Only text-embedding-3 models accept a requested size.
			if emb.dimensions != embed::DEFAULT_DIMENSIONS && emb.model.starts_with("text-embedding-3") {
				client = client.with_request_dimensions(emb.dimensions);
			}
			let policy = RetryPolicy {
				max_attempts: emb.max_attempts,
				initial_backoff: Duration::from_millis(emb.initial_backoff_ms),
				multiplier: 2,
			};
			Ok(Arc::new(RetryingEmbedder::new(client, policy)))
		}
	}
}

/// Store for the configured backend.
pub async fn build_store(config: &MovieSearchConfig) -> Result<Arc<dyn DocumentStore>, BuildError> {
	config.validate()?;

	match config.storage.backend {
		Backend::Couchbase => {
			let settings = config.couchbase_settings()?;
			debug!("using couchbase at {}", settings.query_url);
			Ok(Arc::new(CouchbaseStore::new(settings)?))
		}
		Backend::Local => {
			let data_dir = config.data_dir();
			debug!("using local store at {}", data_dir.display());
			Ok(Arc::new(LanceStore::new(data_dir, config.embedding.dimensions).await?))
		}
	}
}

/// Ingestion ledger in the data directory.
pub fn open_ledger(config: &MovieSearchConfig) -> Result<Arc<IngestLedger>, BuildError> {
	Ok(Arc::new(IngestLedger::new(&config.data_dir())?))
}

/// Searcher wired to the configured embedder and store.
pub async fn build_searcher(config: &MovieSearchConfig) -> Result<Searcher, BuildError> {
	let embedder = build_embedder(config)?;
	let store = build_store(config).await?;
	Ok(HybridSearcher::new(embedder, store, QueryBuilder::new(config.search.max_results)))
}
