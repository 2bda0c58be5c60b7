//! Hybrid search and result presentation for Movie Search.
//
// A request is validated, its text embedded, and the resulting query sent to a
// document store in a single round trip. Ranking happens in the store; this crate only
// enforces the ordering and limit on what comes back.

use async_trait::async_trait;
use embed::{check_dimension, Embedder};
use log::debug;
use store::{DocumentStore, ScoredMovie};

mod error;
mod present;
mod request;

pub use error::{Result, SearchError};
pub use present::{cleanup_poster_url, present, render_json, render_text, snippet, DisplayMovie};
pub use request::{QueryBuilder, QueryPlan, QueryRequest, DEFAULT_MAX_RESULTS, DEFAULT_RESULT_LIMIT};

/// Trait for hybrid search and ranking.
#[async_trait]
pub trait HybridSearch: Send + Sync {
	async fn search(&self, request: &QueryRequest) -> Result<Vec<ScoredMovie>>;
}

/// Runs requests against one embedder and one store.
pub struct HybridSearcher<E, S> {
	embedder: E,
	store: S,
	builder: QueryBuilder,
}

impl<E: Embedder, S: DocumentStore> HybridSearcher<E, S> {
	pub fn new(embedder: E, store: S, builder: QueryBuilder) -> Self {
		Self { embedder, store, builder }
	}

	/// Validate and embed a request without querying the store.
	///
	/// Invalid and unsatisfiable requests return before the embedding provider is called.
	pub async fn plan(&self, request: &QueryRequest) -> Result<QueryPlan> {
		self.builder.validate(request)?;
		if request.is_unsatisfiable() {
			debug!("inverted range, returning no results");
			return Ok(QueryPlan::Empty);
		}

		let vector = if request.has_text() {
			let vector = self.embedder.embed(request.query_text.trim()).await?;
			check_dimension(&vector, self.embedder.dimension())?;
			Some(vector)
		} else {
			None
		};
		self.builder.build(request, vector)
	}

	/// Run a plan against the store.
	pub async fn execute(&self, plan: &QueryPlan) -> Result<Vec<ScoredMovie>> {
		let query = match plan {
			QueryPlan::Empty => return Ok(vec![]),
			QueryPlan::Search(query) => query,
		};

		debug!(
			"searching {} with {} clause(s), limit {}",
			self.store.backend_name(),
			query.clauses().len(),
			query.limit()
		);
		let mut hits = self.store.hybrid_search(query).await?;

		// Stable, so ties keep the store's order.
		if query.vector().is_some() {
			hits.sort_by(|a, b| {
				let a = a.score.unwrap_or(f32::NEG_INFINITY);
				let b = b.score.unwrap_or(f32::NEG_INFINITY);
				b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
			});
		}
		hits.truncate(query.limit());
		Ok(hits)
	}
}

#[async_trait]
impl<E: Embedder, S: DocumentStore> HybridSearch for HybridSearcher<E, S> {
	async fn search(&self, request: &QueryRequest) -> Result<Vec<ScoredMovie>> {
		let plan = self.plan(request).await?;
		self.execute(&plan).await
	}
}
