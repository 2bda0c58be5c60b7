//! Document storage and hybrid search backends for Movie Search.
//!
//! Two backends implement [`DocumentStore`]:
//! - [`CouchbaseStore`]: the managed Query and Search services over HTTP.
//! - [`LanceStore`]: an embedded LanceDB table plus a Tantivy title index, for running
//!   without a cluster.
//!
//! [`MemoryStore`] implements the same query semantics in memory for tests.

use async_trait::async_trait;

mod couchbase;
mod document;
mod error;
mod lance;
mod lexical;
mod memory;
mod query;
mod state;

pub use couchbase::{search_request_body, service_urls, CouchbaseSettings, CouchbaseStore};
pub use document::{document_key, fields, slugify, MovieDocument, ScoredMovie};
pub use error::{Result, StoreError};
pub use lance::LanceStore;
pub use lexical::TitleIndex;
pub use memory::MemoryStore;
pub use query::{
    default_order, phrase_matches, tokenize, Clause, HybridQuery, LexicalClause, NumericField,
    RangeClause, ResultOrder, TextField, VectorClause,
};
pub use state::{IngestLedger, RecordState};

/// Trait for a document store with hybrid search.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or overwrite the document stored under `key`.
    async fn upsert(&self, key: &str, document: &MovieDocument) -> Result<()>;
    /// Run a hybrid query. Constraints are applied before ranking.
    async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<ScoredMovie>>;
    async fn get(&self, key: &str) -> Result<Option<MovieDocument>>;
    async fn count(&self) -> Result<usize>;
    /// Short name for logs and the ledger.
    fn backend_name(&self) -> &'static str;
    /// Identifies where documents go, so ledgers for different targets do not mix.
    fn target(&self) -> String;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for std::sync::Arc<S> {
    async fn upsert(&self, key: &str, document: &MovieDocument) -> Result<()> {
        (**self).upsert(key, document).await
    }

    async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<ScoredMovie>> {
        (**self).hybrid_search(query).await
    }

    async fn get(&self, key: &str) -> Result<Option<MovieDocument>> {
        (**self).get(key).await
    }

    async fn count(&self) -> Result<usize> {
        (**self).count().await
    }

    fn backend_name(&self) -> &'static str {
        (**self).backend_name()
    }

    fn target(&self) -> String {
        (**self).target()
    }
}
