//! Local backend: LanceDB for documents and vectors, Tantivy for title phrases.
//!
//! Data is stored on disk under one directory, so the demo runs without a cluster.
//! Range constraints and title matches are turned into a SQL predicate that LanceDB
//! applies before the nearest-neighbour search.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use lancedb::connect;
use lancedb::query::{QueryBase, ExecutableQuery};
use lancedb::DistanceType;
use arrow_array::{
    RecordBatch, RecordBatchIterator, StringArray, Float32Array, Float64Array, Int32Array,
    BooleanArray, FixedSizeListArray, ArrayRef, Array,
};
use arrow_array::builder::{FixedSizeListBuilder, Float32Builder};
use arrow_schema::{Schema, Field, DataType};
use futures::TryStreamExt;
use log::debug;
use tokio::sync::RwLock;

use crate::document::{MovieDocument, ScoredMovie};
use crate::error::{local, Result, StoreError};
use crate::lexical::TitleIndex;
use crate::query::{default_order, HybridQuery, NumericField};
use crate::DocumentStore;

const TABLE_NAME: &str = "movies";

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn column_for(field: NumericField) -> &'static str {
    match field {
        NumericField::ReleasedYear => "released_year",
        NumericField::ImdbRating => "imdb_rating",
    }
}

/// LanceDB-backed movie store.
pub struct LanceStore {
    db: Arc<lancedb::Connection>,
    table: RwLock<Option<lancedb::Table>>,
    titles: TitleIndex,
    data_dir: PathBuf,
    dim: usize,
}

impl LanceStore {
    /// Create or open a store at the given directory for vectors of `dim` values.
    pub async fn new(data_dir: PathBuf, dim: usize) -> Result<Self> {
        std::fs::create_dir_all(&data_dir)?;
        let db_path = data_dir.join("lance").to_string_lossy().to_string();
        let db = connect(&db_path).execute().await.map_err(|e| StoreError::Connection {
            backend: "local",
            message: e.to_string(),
        })?;

        let table = match db.open_table(TABLE_NAME).execute().await {
            Ok(t) => Some(t),
            Err(lancedb::Error::TableNotFound { .. }) => None,
            Err(e) => return Err(local(e)),
        };

        if let Some(ref t) = table {
            let schema = t.schema().await.map_err(local)?;
            if let Ok(field) = schema.field_with_name("vector") {
                if let DataType::FixedSizeList(_, n) = field.data_type() {
                    if *n as usize != dim {
                        return Err(StoreError::DimensionMismatch { expected: *n as usize, actual: dim });
                    }
                }
            }
        }

        let titles = TitleIndex::new(&data_dir.join("title_index"))?;

        Ok(Self {
            db: Arc::new(db),
            table: RwLock::new(table),
            titles,
            data_dir,
            dim,
        })
    }

    /// Arrow schema of the movies table.
    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("key", DataType::Utf8, false),
            Field::new("title", DataType::Utf8, false),
            Field::new("released_year", DataType::Int32, true),
            Field::new("imdb_rating", DataType::Float64, true),
            Field::new("has_embedding", DataType::Boolean, false),
            // Everything except the embedding, as JSON
            Field::new("document", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dim as i32,
                ),
                false,
            ),
        ]))
    }

    /// Create a RecordBatch holding one document.
    fn create_batch(&self, key: &str, document: &MovieDocument) -> Result<RecordBatch> {
        let json = serde_json::to_string(&document.without_embedding()).map_err(local)?;

        let key_col = StringArray::from(vec![key]);
        let title = StringArray::from(vec![document.title.as_str()]);
        let year = Int32Array::from(vec![document.released_year]);
        let rating = Float64Array::from(vec![document.imdb_rating]);
        let has_embedding = BooleanArray::from(vec![document.overview_embedding.is_some()]);
        let doc_col = StringArray::from(vec![json.as_str()]);

        // Documents without an embedding get a zero vector and are excluded from
        // vector searches through `has_embedding`.
        let mut list_builder = FixedSizeListBuilder::new(Float32Builder::new(), self.dim as i32);
        let values_builder = list_builder.values();
        match &document.overview_embedding {
            Some(embedding) => {
                for v in embedding {
                    values_builder.append_value(*v);
                }
            }
            None => {
                for _ in 0..self.dim {
                    values_builder.append_value(0.0);
                }
            }
        }
        list_builder.append(true);
        let vector = list_builder.finish();

        RecordBatch::try_new(
            self.schema(),
            vec![
                Arc::new(key_col) as ArrayRef,
                Arc::new(title) as ArrayRef,
                Arc::new(year) as ArrayRef,
                Arc::new(rating) as ArrayRef,
                Arc::new(has_embedding) as ArrayRef,
                Arc::new(doc_col) as ArrayRef,
                Arc::new(vector) as ArrayRef,
            ],
        )
        .map_err(local)
    }

    /// Turn result batches back into documents.
    fn read_rows(batches: Vec<RecordBatch>, scored: bool) -> Result<Vec<ScoredMovie>> {
        let mut out = Vec::new();
        for batch in batches {
            let keys = batch
                .column_by_name("key")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let documents = batch
                .column_by_name("document")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>());
            let has_embedding = batch
                .column_by_name("has_embedding")
                .and_then(|c| c.as_any().downcast_ref::<BooleanArray>());
            let vectors = batch
                .column_by_name("vector")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>());
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>());

            let (Some(keys), Some(documents), Some(has_embedding)) = (keys, documents, has_embedding) else {
                return Err(StoreError::Malformed {
                    backend: "local",
                    message: "result batch is missing document columns".into(),
                });
            };

            for i in 0..batch.num_rows() {
                let mut document: MovieDocument =
                    serde_json::from_str(documents.value(i)).map_err(local)?;
                if has_embedding.value(i) {
                    if let Some(vectors) = vectors {
                        let values = vectors.value(i);
                        if let Some(values) = values.as_any().downcast_ref::<Float32Array>() {
                            document.overview_embedding = Some(values.values().to_vec());
                        }
                    }
                }
                // Lance reports dot distance as `1 - dot`.
                let score = if scored {
                    distances.map(|d| 1.0 - d.value(i))
                } else {
                    None
                };
                out.push(ScoredMovie { key: keys.value(i).to_string(), document, score });
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl DocumentStore for LanceStore {
    async fn upsert(&self, key: &str, document: &MovieDocument) -> Result<()> {
        if let Some(embedding) = &document.overview_embedding {
            if embedding.len() != self.dim {
                return Err(StoreError::DimensionMismatch { expected: self.dim, actual: embedding.len() });
            }
        }
        let batch = self.create_batch(key, document)?;

        let mut table_guard = self.table.write().await;

        if let Some(ref table) = *table_guard {
            // One commit replaces the earlier version of this key, or inserts it.
            let mut merge = table.merge_insert(&["key"]);
            merge.when_matched_update_all(None).when_not_matched_insert_all();
            merge
                .execute(Box::new(RecordBatchIterator::new(vec![Ok(batch)], self.schema())))
                .await
                .map_err(local)?;
        } else {
            // Create new table
            let new_table = self.db.create_table(
                TABLE_NAME,
                RecordBatchIterator::new(vec![Ok(batch)], self.schema()),
            ).execute().await.map_err(local)?;
            *table_guard = Some(new_table);
        }

        // Only after the row is committed, and still under the table lock so the title
        // index sees writes in the same order.
        self.titles.upsert(key, &document.title)?;
        self.titles.commit()?;
        Ok(())
    }

    async fn hybrid_search(&self, query: &HybridQuery) -> Result<Vec<ScoredMovie>> {
        let table_guard = self.table.read().await;

        let table = match &*table_guard {
            Some(t) => t,
            None => return Ok(vec![]), // No table means no results
        };

        let mut predicates = Vec::new();
        for range in query.ranges() {
            let column = column_for(range.field);
            if let Some(min) = range.min {
                predicates.push(format!("{} >= {}", column, min));
            }
            if let Some(max) = range.max {
                predicates.push(format!("{} <= {}", column, max));
            }
        }
        for lexical in query.lexical() {
            let keys = self.titles.matching_keys(&lexical.phrase)?;
            if keys.is_empty() {
                return Ok(vec![]);
            }
            let list: Vec<String> = keys.iter().map(|k| quote(k)).collect();
            predicates.push(format!("key IN ({})", list.join(", ")));
        }

        match query.vector() {
            Some(clause) => {
                if clause.vector.len() != self.dim {
                    return Err(StoreError::DimensionMismatch { expected: self.dim, actual: clause.vector.len() });
                }
                predicates.push("has_embedding = true".to_string());
                let filter = predicates.join(" AND ");
                debug!("local vector search, filter: {}", filter);

                let results = table
                    .vector_search(clause.vector.clone())
                    .map_err(local)?
                    .column("vector")
                    .distance_type(DistanceType::Dot)
                    .only_if(filter)
                    .limit(clause.k.min(query.limit()))
                    .execute()
                    .await
                    .map_err(local)?
                    .try_collect::<Vec<_>>()
                    .await
                    .map_err(local)?;

                Self::read_rows(results, true)
            }
            None => {
                let total = table.count_rows(None).await.map_err(local)?;
                let mut q = table.query().limit(total.max(1));
                if !predicates.is_empty() {
                    let filter = predicates.join(" AND ");
                    debug!("local filtered scan, filter: {}", filter);
                    q = q.only_if(filter);
                }
                let results = q
                    .execute()
                    .await
                    .map_err(local)?
                    .try_collect::<Vec<_>>()
                    .await
                    .map_err(local)?;

                let mut hits = Self::read_rows(results, false)?;
                hits.sort_by(|a, b| {
                    default_order(&a.document, &b.document).then_with(|| a.key.cmp(&b.key))
                });
                hits.truncate(query.limit());
                Ok(hits)
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<MovieDocument>> {
        let table_guard = self.table.read().await;

        let table = match &*table_guard {
            Some(t) => t,
            None => return Ok(None),
        };

        let results = table
            .query()
            .only_if(format!("key = {}", quote(key)))
            .limit(1)
            .execute()
            .await
            .map_err(local)?
            .try_collect::<Vec<_>>()
            .await
            .map_err(local)?;

        Ok(Self::read_rows(results, false)?.into_iter().next().map(|hit| hit.document))
    }

    async fn count(&self) -> Result<usize> {
        let table_guard = self.table.read().await;

        match &*table_guard {
            Some(table) => table.count_rows(None).await.map_err(local),
            None => Ok(0),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn target(&self) -> String {
        format!("local:{}", self.data_dir.display())
    }
}
