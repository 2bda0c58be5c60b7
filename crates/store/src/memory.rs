//! In-memory store with the same filtering and ranking rules as the real backends.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::{MovieDocument, ScoredMovie};
use crate::error::{Result, StoreError};
use crate::query::{default_order, HybridQuery, ResultOrder};
use crate::DocumentStore;

/// Documents keyed by upsert key. Counts calls so tests can assert that nothing was sent.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: RwLock<HashMap<String, MovieDocument>>,
    upserts: AtomicUsize,
    searches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of upsert calls received.
    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }

    /// Number of search calls received.
    pub fn search_calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.docs.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, key: &str, document: &MovieDocument) -> Result<()> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.docs.write().await.insert(key.to_string(), document.clone());
        Ok(())
    }

    async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<ScoredMovie>> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let docs = self.docs.read().await;

        // Pre-filter, then rank.
        let candidates = docs.iter().filter(|(_, doc)| query.admits(doc));

        let mut hits: Vec<ScoredMovie> = match query.vector() {
            Some(clause) => {
                let mut scored = Vec::new();
                for (key, doc) in candidates {
                    let Some(embedding) = doc.overview_embedding.as_deref() else {
                        continue;
                    };
                    if embedding.len() != clause.vector.len() {
                        return Err(StoreError::DimensionMismatch {
                            expected: embedding.len(),
                            actual: clause.vector.len(),
                        });
                    }
                    scored.push(ScoredMovie {
                        key: key.clone(),
                        document: doc.clone(),
                        score: Some(dot(embedding, &clause.vector)),
                    });
                }
                scored
            }
            None => candidates
                .map(|(key, doc)| ScoredMovie { key: key.clone(), document: doc.clone(), score: None })
                .collect(),
        };

        match query.order() {
            ResultOrder::Score => hits.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.key.cmp(&b.key))
            }),
            ResultOrder::Default => hits.sort_by(|a, b| {
                default_order(&a.document, &b.document).then_with(|| a.key.cmp(&b.key))
            }),
        }
        let k = query.vector().map_or(query.limit(), |v| v.k.min(query.limit()));
        hits.truncate(k);
        Ok(hits)
    }

    async fn get(&self, key: &str) -> Result<Option<MovieDocument>> {
        Ok(self.docs.read().await.get(key).cloned())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.docs.read().await.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}
