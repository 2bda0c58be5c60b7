//! Movie documents as stored in the search index.
//!
//! Field names follow the columns of the IMDb top-1000 dataset, which is also what the
//! search index definition refers to.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Stored field names used by the index schema.
pub mod fields {
    pub const TITLE: &str = "Series_Title";
    pub const OVERVIEW: &str = "Overview";
    pub const OVERVIEW_EMBEDDING: &str = "Overview_embedding";
    pub const RELEASED_YEAR: &str = "Released_Year";
    pub const IMDB_RATING: &str = "IMDB_Rating";
    pub const RUNTIME: &str = "Runtime";
    pub const POSTER_LINK: &str = "Poster_Link";
}

/// One movie. Optional numeric fields are `None` when the source value was missing or
/// unparsable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MovieDocument {
    #[serde(rename = "Series_Title", default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(rename = "Overview", default, deserialize_with = "lenient_string")]
    pub overview: String,
    /// `None` when the overview was empty; such documents are not vector-searchable.
    #[serde(
        rename = "Overview_embedding",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub overview_embedding: Option<Vec<f32>>,
    #[serde(rename = "Released_Year", default, deserialize_with = "lenient_i32")]
    pub released_year: Option<i32>,
    #[serde(rename = "IMDB_Rating", default, deserialize_with = "lenient_f64")]
    pub imdb_rating: Option<f64>,
    #[serde(rename = "Runtime", default, deserialize_with = "lenient_string")]
    pub runtime: String,
    #[serde(rename = "Poster_Link", default, deserialize_with = "lenient_string")]
    pub poster_link: String,

    #[serde(rename = "Certificate", default, deserialize_with = "lenient_string")]
    pub certificate: String,
    #[serde(rename = "Genre", default, deserialize_with = "lenient_string")]
    pub genre: String,
    #[serde(rename = "Meta_score", default, deserialize_with = "lenient_f64")]
    pub meta_score: Option<f64>,
    #[serde(rename = "Director", default, deserialize_with = "lenient_string")]
    pub director: String,
    #[serde(rename = "Star1", default, deserialize_with = "lenient_string")]
    pub star1: String,
    #[serde(rename = "Star2", default, deserialize_with = "lenient_string")]
    pub star2: String,
    #[serde(rename = "Star3", default, deserialize_with = "lenient_string")]
    pub star3: String,
    #[serde(rename = "Star4", default, deserialize_with = "lenient_string")]
    pub star4: String,
    #[serde(rename = "No_of_Votes", default, deserialize_with = "lenient_u64")]
    pub votes: Option<u64>,
    #[serde(rename = "Gross", default, deserialize_with = "lenient_f64")]
    pub gross: Option<f64>,
}

impl MovieDocument {
    /// Identity used as the upsert key.
    ///
    /// Titles are not unique across remakes, so the release year is part of the key.
    /// Documents without a title have no stable identity and get a random key.
    pub fn key(&self) -> String {
        document_key(&self.title, self.released_year)
    }

    /// Whether the key is derived from the document rather than generated.
    pub fn has_stable_key(&self) -> bool {
        !slugify(&self.title).is_empty()
    }

    /// The document without its embedding, for fingerprints and local storage.
    pub fn without_embedding(&self) -> MovieDocument {
        MovieDocument { overview_embedding: None, ..self.clone() }
    }
}

/// Build the upsert key for a title and release year.
pub fn document_key(title: &str, released_year: Option<i32>) -> String {
    let slug = slugify(title);
    if slug.is_empty() {
        return format!("movie::{}", Uuid::new_v4().simple());
    }
    match released_year {
        Some(year) => format!("movie::{}::{}", slug, year),
        None => format!("movie::{}::unknown", slug),
    }
}

/// Lowercase alphanumeric runs joined with `-`.
pub fn slugify(text: &str) -> String {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

/// A document returned by a search, with its relevance score when vector ranking applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMovie {
    pub key: String,
    pub document: MovieDocument,
    pub score: Option<f32>,
}

// Search hits and hand-edited documents do not always agree on types: years arrive as
// strings, ratings as integers, missing values as null.

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(match Value::deserialize(d)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect::<Vec<_>>()
            .join(", "),
        other => return Err(de::Error::custom(format!("expected string, got {}", other))),
    })
}

fn number_of(value: Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    Ok(number_of(Value::deserialize(d)?).filter(|v| v.is_finite()))
}

fn lenient_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    Ok(number_of(Value::deserialize(d)?)
        .filter(|v| v.fract() == 0.0 && *v >= i32::MIN as f64 && *v <= i32::MAX as f64)
        .map(|v| v as i32))
}

fn lenient_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
    Ok(number_of(Value::deserialize(d)?)
        .filter(|v| v.fract() == 0.0 && *v >= 0.0)
        .map(|v| v as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_uses_title_and_year() {
        assert_eq!(document_key("The Godfather", Some(1972)), "movie::the-godfather::1972");
        assert_eq!(
            document_key("Léon: The Professional", None),
            "movie::léon-the-professional::unknown"
        );
    }

    #[test]
    fn untitled_documents_get_random_keys() {
        let a = document_key("  ", Some(2000));
        let b = document_key("", Some(2000));
        assert!(a.starts_with("movie::"));
        assert_ne!(a, b);
    }

    #[test]
    fn serializes_with_index_field_names() {
        let doc = MovieDocument {
            title: "Heat".into(),
            released_year: Some(1995),
            imdb_rating: Some(8.3),
            ..Default::default()
        };
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v[fields::TITLE], "Heat");
        assert_eq!(v[fields::RELEASED_YEAR], 1995);
        assert!(v.get(fields::OVERVIEW_EMBEDDING).is_none());
    }

    #[test]
    fn deserializes_loose_hit_fields() {
        let doc: MovieDocument = serde_json::from_value(json!({
            "Series_Title": "Apollo 13",
            "Released_Year": "1995",
            "IMDB_Rating": 7,
            "Gross": "173,837,933",
            "Poster_Link": null
        }))
        .unwrap();
        assert_eq!(doc.released_year, Some(1995));
        assert_eq!(doc.imdb_rating, Some(7.0));
        assert_eq!(doc.gross, Some(173_837_933.0));
        assert_eq!(doc.poster_link, "");
        assert_eq!(doc.overview_embedding, None);
    }

    #[test]
    fn non_numeric_year_becomes_none() {
        let doc: MovieDocument = serde_json::from_value(json!({ "Released_Year": "PG" })).unwrap();
        assert_eq!(doc.released_year, None);
    }
}
