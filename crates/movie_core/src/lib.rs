//! Ingestion pipeline and configuration for Movie Search.
//
// Reads dataset records, embeds each overview and upserts the resulting document.
// One bad record never stops the run; it is reported in the summary instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use embed::{check_dimension, Embedder};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use store::{DocumentStore, IngestLedger, MovieDocument, RecordState};
use thiserror::Error;

pub mod backend;
pub mod config;
mod source;

pub use backend::{build_embedder, build_searcher, build_store, open_ledger, BuildError, Searcher};
pub use config::{Backend, ConfigError, EmbeddingProvider, MovieSearchConfig};
pub use source::{normalize, read_csv, read_csv_path, RawRecord, RecordSource};

/// Errors that stop an ingestion run before it starts.
#[derive(Debug, Error)]
pub enum IngestError {
	#[error("cannot open {path}: {source}")]
	Open {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("malformed CSV: {0}")]
	Csv(#[from] csv::Error),

	#[error("CSV header is empty")]
	EmptyHeader,
}

/// Options for configuring the ingester.
#[derive(Debug, Clone)]
pub struct IngestOptions {
	/// Records embedded and written at once.
	pub concurrency: usize,
	/// Ignore the ledger and rewrite every record.
	pub force: bool,
}

impl Default for IngestOptions {
	fn default() -> Self {
		Self { concurrency: 4, force: false }
	}
}

/// Why a record was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
	/// A later record in the same source has the same key.
	Duplicate,
	/// The ledger shows this exact record was already written.
	Unchanged,
}

/// Events emitted during ingestion for progress reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
	RecordStarted { key: String },
	/// `embedded` is false for records stored without a vector.
	RecordIngested { key: String, embedded: bool },
	RecordSkipped { key: String, reason: SkipReason },
	RecordFailed { key: String, reason: String },
	Done,
}

/// A record that could not be ingested.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestFailure {
	pub key: String,
	pub title: String,
	pub reason: String,
}

/// Summary of the ingestion run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestSummary {
	pub ingested: usize,
	pub skipped: usize,
	pub failed: usize,
	pub failures: Vec<IngestFailure>,
}

struct Pending {
	key: String,
	document: MovieDocument,
	fingerprint: Option<String>,
}

/// Main orchestrator for the ingestion pipeline.
pub struct Ingester<E: Embedder, S: DocumentStore> {
	options: IngestOptions,
	embedder: E,
	store: S,
	ledger: Option<(Arc<IngestLedger>, String)>,
}

impl<E: Embedder, S: DocumentStore> Ingester<E, S> {
	pub fn new(options: IngestOptions, embedder: E, store: S) -> Self {
		Self { options, embedder, store, ledger: None }
	}

	/// Use a ledger to skip unchanged records. `model` is part of the fingerprint, so
	/// switching embedding models re-embeds everything.
	pub fn with_ledger(mut self, ledger: Arc<IngestLedger>, model: impl Into<String>) -> Self {
		self.ledger = Some((ledger, model.into()));
		self
	}

	/// Run the pipeline (no progress reporting).
	pub async fn run(&self, source: impl Into<RecordSource>) -> IngestSummary {
		self.run_with_progress(source, |_| ()).await
	}

	/// Run the pipeline, reporting progress via callback.
	pub async fn run_with_progress<F>(&self, source: impl Into<RecordSource>, cb: F) -> IngestSummary
	where
		F: FnMut(IngestEvent) + Send,
	{
		let source = source.into();
		let cb = Mutex::new(cb);
		let emit = |event: IngestEvent| {
			if let Ok(mut guard) = cb.lock() {
				(*guard)(event);
			}
		};

		let mut summary = IngestSummary::default();
		for failure in source.rejected {
			emit(IngestEvent::RecordFailed { key: failure.key.clone(), reason: failure.reason.clone() });
			summary.failed += 1;
			summary.failures.push(failure);
		}

		// Last record wins for duplicate keys, so no two workers write the same key.
		let documents: Vec<MovieDocument> = source.records.iter().map(normalize).collect();
		let keys: Vec<String> = documents.iter().map(MovieDocument::key).collect();
		let mut last_index: HashMap<&str, usize> = HashMap::new();
		for (i, key) in keys.iter().enumerate() {
			last_index.insert(key.as_str(), i);
		}

		let target = self.store.target();
		let mut work = Vec::new();
		for (i, (key, document)) in keys.iter().zip(documents).enumerate() {
			if last_index.get(key.as_str()) != Some(&i) {
				debug!("{} appears again later in the source, skipping", key);
				emit(IngestEvent::RecordSkipped { key: key.clone(), reason: SkipReason::Duplicate });
				summary.skipped += 1;
				continue;
			}

			let fingerprint = match &self.ledger {
				Some((ledger, model)) if document.has_stable_key() => {
					let fingerprint = fingerprint_of(&document, model);
					if !self.options.force {
						match ledger.record_state(&target, key, &fingerprint) {
							Ok(RecordState::Unchanged) => {
								emit(IngestEvent::RecordSkipped { key: key.clone(), reason: SkipReason::Unchanged });
								summary.skipped += 1;
								continue;
							}
							Ok(_) => {}
							Err(e) => warn!("ledger lookup failed for {}: {}", key, e),
						}
					}
					Some(fingerprint)
				}
				_ => None,
			};
			work.push(Pending { key: key.clone(), document, fingerprint });
		}

		info!(
			"ingesting {} record(s) into {} with concurrency {}",
			work.len(),
			self.store.backend_name(),
			self.options.concurrency
		);

		let mut outcomes = stream::iter(work)
			.map(|pending| {
				emit(IngestEvent::RecordStarted { key: pending.key.clone() });
				self.process(pending)
			})
			.buffer_unordered(self.options.concurrency.max(1));

		while let Some((pending, outcome)) = outcomes.next().await {
			match outcome {
				Ok(embedded) => {
					if let (Some((ledger, _)), Some(fingerprint)) = (&self.ledger, &pending.fingerprint) {
						if let Err(e) = ledger.mark_ingested(&target, &pending.key, fingerprint) {
							warn!("failed to update ledger for {}: {}", pending.key, e);
						}
					}
					emit(IngestEvent::RecordIngested { key: pending.key, embedded });
					summary.ingested += 1;
				}
				Err(reason) => {
					warn!("failed to ingest {}: {}", pending.key, reason);
					emit(IngestEvent::RecordFailed { key: pending.key.clone(), reason: reason.clone() });
					summary.failed += 1;
					summary.failures.push(IngestFailure {
						key: pending.key,
						title: pending.document.title,
						reason,
					});
				}
			}
		}

		info!(
			"ingestion done: {} ingested, {} skipped, {} failed",
			summary.ingested, summary.skipped, summary.failed
		);
		emit(IngestEvent::Done);
		summary
	}

	/// Embed and store one record. Returns whether an embedding was stored.
	async fn process(&self, pending: Pending) -> (Pending, Result<bool, String>) {
		let mut document = pending.document.clone();

		if !document.overview.trim().is_empty() {
			let embedding = match self.embedder.embed(&document.overview).await {
				Ok(embedding) => embedding,
				Err(e) => return (pending, Err(format!("embedding failed: {}", e))),
			};
			if let Err(e) = check_dimension(&embedding, self.embedder.dimension()) {
				return (pending, Err(e.to_string()));
			}
			document.overview_embedding = Some(embedding);
		}

		let embedded = document.overview_embedding.is_some();
		match self.store.upsert(&pending.key, &document).await {
			Ok(()) => (pending, Ok(embedded)),
			Err(e) => (pending, Err(format!("upsert failed: {}", e))),
		}
	}
}

/// Fingerprint of everything that goes into a stored document.
fn fingerprint_of(document: &MovieDocument, model: &str) -> String {
	let body = serde_json::to_string(&document.without_embedding()).unwrap_or_default();
	format!("{}\n{}", model, body)
}
