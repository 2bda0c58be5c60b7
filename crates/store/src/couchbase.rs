//! Couchbase backend over the Query and Search REST services.
//!
//! Documents are written with a parameterised `UPSERT` through the Query service. Hybrid
//! searches go to the Search service: constraints become a conjunctive query, and the
//! vector clause becomes a `knn` entry whose `filter` carries the same conjunction so the
//! neighbours are chosen from the filtered set.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::document::{fields, MovieDocument, ScoredMovie};
use crate::error::{Result, StoreError};
use crate::query::{Clause, HybridQuery};
use crate::DocumentStore;

const BACKEND: &str = "couchbase";

/// Connection details for one collection and its search index.
#[derive(Debug, Clone)]
pub struct CouchbaseSettings {
    /// Base URL of the Query service, e.g. `http://localhost:8093`.
    pub query_url: String,
    /// Base URL of the Search service, e.g. `http://localhost:8094`.
    pub search_url: String,
    pub username: String,
    pub password: String,
    pub bucket: String,
    pub scope: String,
    pub collection: String,
    pub index_name: String,
    pub timeout: Duration,
}

/// Derive Query and Search service URLs from a `couchbase://` or `couchbases://`
/// connection string. Only the first host is used.
pub fn service_urls(conn_str: &str) -> Option<(String, String)> {
    let (secure, rest) = if let Some(rest) = conn_str.strip_prefix("couchbases://") {
        (true, rest)
    } else if let Some(rest) = conn_str.strip_prefix("couchbase://") {
        (false, rest)
    } else {
        return None;
    };

    let host = rest
        .split(|c: char| c == '?' || c == '/' || c == ',' || c == ';')
        .next()
        .unwrap_or("");
    // A port in the connection string addresses the data service, not Query/Search.
    let host = match host.rsplit_once(':') {
        Some((h, port)) if !h.is_empty() && port.chars().all(|c| c.is_ascii_digit()) => h,
        _ => host,
    };
    if host.is_empty() {
        return None;
    }

    Some(if secure {
        (format!("https://{}:18093", host), format!("https://{}:18094", host))
    } else {
        (format!("http://{}:8093", host), format!("http://{}:8094", host))
    })
}

/// JSON body of a Search service request for `query`.
pub fn search_request_body(query: &HybridQuery) -> Value {
    let conjuncts: Vec<Value> = query
        .constraints()
        .filter_map(|clause| match clause {
            Clause::Range(range) => {
                let mut obj = Map::new();
                obj.insert("field".into(), json!(range.field.stored_name()));
                if let Some(min) = range.min {
                    obj.insert("min".into(), json!(min));
                    obj.insert("inclusive_min".into(), json!(true));
                }
                if let Some(max) = range.max {
                    obj.insert("max".into(), json!(max));
                    obj.insert("inclusive_max".into(), json!(true));
                }
                Some(Value::Object(obj))
            }
            Clause::Lexical(lex) => Some(json!({
                "field": lex.field.stored_name(),
                "match_phrase": lex.phrase,
            })),
            Clause::Vector(_) => None,
        })
        .collect();

    let has_constraints = !conjuncts.is_empty();
    let filter = if conjuncts.is_empty() {
        json!({ "match_all": {} })
    } else {
        json!({ "conjuncts": conjuncts })
    };

    match query.vector() {
        Some(vector) => {
            let mut knn = json!({
                "field": vector.stored_field(),
                "vector": vector.vector,
                "k": vector.k,
            });
            if has_constraints {
                knn["filter"] = filter;
            }
            json!({
                "query": { "match_none": {} },
                "knn": [knn],
                "size": query.limit(),
                "fields": ["*"],
            })
        }
        None => json!({
            "query": filter,
            "size": query.limit(),
            "fields": ["*"],
            "sort": [format!("-{}", fields::RELEASED_YEAR), fields::TITLE],
        }),
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    fields: Option<Value>,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    errors: Vec<QueryError>,
}

#[derive(Deserialize)]
struct QueryError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

/// Couchbase-backed document store.
pub struct CouchbaseStore {
    client: reqwest::Client,
    settings: CouchbaseSettings,
}

impl CouchbaseStore {
    pub fn new(settings: CouchbaseSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| StoreError::Connection { backend: BACKEND, message: e.to_string() })?;
        Ok(Self { client, settings })
    }

    /// Fully qualified keyspace, quoted for N1QL.
    fn keyspace(&self) -> String {
        format!(
            "`{}`.`{}`.`{}`",
            self.settings.bucket, self.settings.scope, self.settings.collection
        )
    }

    fn search_endpoint(&self) -> String {
        format!(
            "{}/api/bucket/{}/scope/{}/index/{}/query",
            self.settings.search_url.trim_end_matches('/'),
            self.settings.bucket,
            self.settings.scope,
            self.settings.index_name
        )
    }

    fn query_endpoint(&self) -> String {
        format!("{}/query/service", self.settings.query_url.trim_end_matches('/'))
    }

    async fn post(&self, url: String, body: &Value) -> Result<String> {
        let response = self
            .client
            .post(url)
            .basic_auth(&self.settings.username, Some(&self.settings.password))
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Connection { backend: BACKEND, message: e.to_string() })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| StoreError::Connection { backend: BACKEND, message: e.to_string() })?;
        if !status.is_success() {
            return Err(StoreError::Rejected {
                backend: BACKEND,
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }

    /// Run a N1QL statement with named parameters and return its result rows.
    async fn run_statement(&self, statement: String, params: Map<String, Value>) -> Result<Vec<Value>> {
        let mut body = params;
        body.insert("statement".into(), Value::String(statement));
        let body = Value::Object(body);

        let text = match self.post(self.query_endpoint(), &body).await {
            Ok(text) => text,
            // The Query service reports statement errors with non-2xx codes and a JSON body.
            Err(StoreError::Rejected { status, message, .. }) => {
                let detail = serde_json::from_str::<QueryResponse>(&message)
                    .ok()
                    .and_then(|r| r.errors.into_iter().next())
                    .map(|e| format!("{} ({})", e.msg, e.code))
                    .unwrap_or(message);
                return Err(StoreError::Rejected { backend: BACKEND, status, message: detail });
            }
            Err(e) => return Err(e),
        };

        let parsed: QueryResponse = serde_json::from_str(&text)
            .map_err(|e| StoreError::Malformed { backend: BACKEND, message: e.to_string() })?;
        if parsed.status != "success" {
            let detail = parsed
                .errors
                .first()
                .map(|e| format!("{} ({})", e.msg, e.code))
                .unwrap_or_else(|| format!("status {}", parsed.status));
            return Err(StoreError::Rejected { backend: BACKEND, status: 200, message: detail });
        }
        Ok(parsed.results)
    }
}

#[async_trait]
impl DocumentStore for CouchbaseStore {
    async fn upsert(&self, key: &str, document: &MovieDocument) -> Result<()> {
        let doc = serde_json::to_value(document)
            .map_err(|e| StoreError::Malformed { backend: BACKEND, message: e.to_string() })?;
        let mut params = Map::new();
        params.insert("$key".into(), json!(key));
        params.insert("$doc".into(), doc);
        let statement = format!("UPSERT INTO {} (KEY, VALUE) VALUES ($key, $doc)", self.keyspace());
        self.run_statement(statement, params).await?;
        Ok(())
    }

    async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<ScoredMovie>> {
        let body = search_request_body(query);
        debug!("search request to index {}", self.settings.index_name);
        let text = self.post(self.search_endpoint(), &body).await?;

        let parsed: SearchResponse = serde_json::from_str(&text)
            .map_err(|e| StoreError::Malformed { backend: BACKEND, message: e.to_string() })?;

        let vector_ranked = query.vector().is_some();
        let mut hits = Vec::with_capacity(parsed.hits.len());
        for hit in parsed.hits {
            let document: MovieDocument = match hit.fields {
                Some(fields) => serde_json::from_value(fields).map_err(|e| StoreError::Malformed {
                    backend: BACKEND,
                    message: format!("hit {}: {}", hit.id, e),
                })?,
                None => MovieDocument::default(),
            };
            hits.push(ScoredMovie {
                key: hit.id,
                document,
                score: vector_ranked.then_some(hit.score),
            });
        }
        Ok(hits)
    }

    async fn get(&self, key: &str) -> Result<Option<MovieDocument>> {
        let mut params = Map::new();
        params.insert("$key".into(), json!(key));
        let statement = format!("SELECT RAW d FROM {} AS d USE KEYS $key", self.keyspace());
        let rows = self.run_statement(statement, params).await?;
        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| StoreError::Malformed { backend: BACKEND, message: e.to_string() }),
            None => Ok(None),
        }
    }

    async fn count(&self) -> Result<usize> {
        let statement = format!("SELECT RAW COUNT(*) FROM {}", self.keyspace());
        let rows = self.run_statement(statement, Map::new()).await?;
        rows.first()
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .ok_or_else(|| StoreError::Malformed { backend: BACKEND, message: "missing count".into() })
    }

    fn backend_name(&self) -> &'static str {
        BACKEND
    }

    fn target(&self) -> String {
        format!(
            "couchbase:{}/{}.{}.{}",
            self.settings.query_url, self.settings.bucket, self.settings.scope, self.settings.collection
        )
    }
}
