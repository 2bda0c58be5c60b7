//! Title index using Tantivy.
//!
//! Answers phrase matches on movie titles for the local backend; the vector table only
//! stores titles for display.

use std::path::Path;
use std::sync::RwLock;
use tantivy::{
    schema::{Schema, STRING, STORED, TEXT, Field, Value},
    Index, IndexWriter, IndexReader, TantivyDocument, Term,
    query::QueryParser,
    collector::TopDocs,
};

use crate::error::{local, Result, StoreError};
use crate::query::tokenize;

/// Tantivy index of `key -> title`.
pub struct TitleIndex {
    index: Index,
    writer: RwLock<IndexWriter>,
    reader: RwLock<IndexReader>,
    key_field: Field,
    title_field: Field,
}

fn poisoned<E: std::fmt::Display>(what: &str, e: E) -> StoreError {
    StoreError::Local(format!("{} lock poisoned: {}", what, e))
}

impl TitleIndex {
    /// Create or open a title index at the given directory.
    pub fn new(index_path: &Path) -> Result<Self> {
        std::fs::create_dir_all(index_path)?;

        let mut schema_builder = Schema::builder();
        // key: exact-match term, used to replace documents on upsert
        let key_field = schema_builder.add_text_field("key", STRING | STORED);
        // title: tokenized with positions for phrase queries
        let title_field = schema_builder.add_text_field("title", TEXT);
        let schema = schema_builder.build();

        let index = if index_path.join("meta.json").exists() {
            Index::open_in_dir(index_path).map_err(local)?
        } else {
            Index::create_in_dir(index_path, schema).map_err(local)?
        };

        // Titles are tiny; one indexing thread with a small heap is plenty.
        let writer = index.writer_with_num_threads(1, 20_000_000).map_err(local)?;
        let reader = index.reader().map_err(local)?;

        Ok(Self {
            index,
            writer: RwLock::new(writer),
            reader: RwLock::new(reader),
            key_field,
            title_field,
        })
    }

    /// Replace the title stored for `key`. Visible after [`commit`](Self::commit).
    pub fn upsert(&self, key: &str, title: &str) -> Result<()> {
        let writer = self.writer.write().map_err(|e| poisoned("writer", e))?;
        writer.delete_term(Term::from_field_text(self.key_field, key));

        let mut doc = TantivyDocument::default();
        doc.add_text(self.key_field, key);
        doc.add_text(self.title_field, title);
        writer.add_document(doc).map_err(local)?;
        Ok(())
    }

    /// Commit pending changes and make them visible to searches.
    pub fn commit(&self) -> Result<()> {
        let mut writer = self.writer.write().map_err(|e| poisoned("writer", e))?;
        writer.commit().map_err(local)?;

        let reader = self.reader.write().map_err(|e| poisoned("reader", e))?;
        reader.reload().map_err(local)?;
        Ok(())
    }

    /// Keys of every title containing `phrase` as a contiguous token sequence.
    pub fn matching_keys(&self, phrase: &str) -> Result<Vec<String>> {
        let tokens = tokenize(phrase);
        if tokens.is_empty() {
            return Ok(vec![]);
        }

        let reader = self.reader.read().map_err(|e| poisoned("reader", e))?;
        let searcher = reader.searcher();
        let total = searcher.num_docs() as usize;
        if total == 0 {
            return Ok(vec![]);
        }

        // Tokens are alphanumeric only, so quoting them cannot break the query syntax.
        let query_parser = QueryParser::for_index(&self.index, vec![self.title_field]);
        let query = query_parser
            .parse_query(&format!("\"{}\"", tokens.join(" ")))
            .map_err(local)?;

        let top_docs = searcher.search(&query, &TopDocs::with_limit(total)).map_err(local)?;

        let mut keys = Vec::with_capacity(top_docs.len());
        for (_score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher.doc(doc_address).map_err(local)?;
            if let Some(key) = doc.get_first(self.key_field).and_then(|v| v.as_str()) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_phrase_lookup() {
        let dir = tempdir().unwrap();
        let index = TitleIndex::new(dir.path()).unwrap();

        index.upsert("movie::the-godfather::1972", "The Godfather").unwrap();
        index.upsert("movie::the-godfather-part-ii::1974", "The Godfather: Part II").unwrap();
        index.upsert("movie::goodfellas::1990", "Goodfellas").unwrap();
        index.commit().unwrap();

        let keys = index.matching_keys("Godfather").unwrap();
        assert_eq!(keys, vec!["movie::the-godfather-part-ii::1974", "movie::the-godfather::1972"]);

        let keys = index.matching_keys("godfather part").unwrap();
        assert_eq!(keys, vec!["movie::the-godfather-part-ii::1974"]);

        assert!(index.matching_keys("part godfather").unwrap().is_empty());
        assert!(index.matching_keys("!!").unwrap().is_empty());
    }

    #[test]
    fn test_upsert_replaces_title() {
        let dir = tempdir().unwrap();
        let index = TitleIndex::new(dir.path()).unwrap();

        index.upsert("k1", "Heat").unwrap();
        index.commit().unwrap();
        index.upsert("k1", "Heat").unwrap();
        index.commit().unwrap();

        index.upsert("k1", "Heat 2").unwrap();
        index.commit().unwrap();

        assert_eq!(index.matching_keys("heat").unwrap(), vec!["k1"]);
        assert_eq!(index.matching_keys("heat 2").unwrap(), vec!["k1"]);
    }

    #[test]
    fn test_reopen_keeps_titles() {
        let dir = tempdir().unwrap();
        {
            let index = TitleIndex::new(dir.path()).unwrap();
            index.upsert("k1", "Alien").unwrap();
            index.commit().unwrap();
        }
        let index = TitleIndex::new(dir.path()).unwrap();
        assert_eq!(index.matching_keys("alien").unwrap(), vec!["k1"]);
    }
}
