//! Structured hybrid search requests.
//!
//! A [`HybridQuery`] is a list of [`Clause`]s plus a result limit. The vector clause (at
//! most one) decides the score; lexical and range clauses are conjunctive pre-filters that
//! only decide membership. Each backend translates the clauses into its own wire format.

use std::cmp::Ordering;

use crate::document::{fields, MovieDocument};

/// Numeric fields usable in range clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    ReleasedYear,
    ImdbRating,
}

impl NumericField {
    /// Name of the field in the index schema.
    pub fn stored_name(self) -> &'static str {
        match self {
            NumericField::ReleasedYear => fields::RELEASED_YEAR,
            NumericField::ImdbRating => fields::IMDB_RATING,
        }
    }

    /// Value of this field in a document.
    pub fn value(self, doc: &MovieDocument) -> Option<f64> {
        match self {
            NumericField::ReleasedYear => doc.released_year.map(f64::from),
            NumericField::ImdbRating => doc.imdb_rating,
        }
    }
}

/// Text fields usable in lexical clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextField {
    Title,
}

impl TextField {
    pub fn stored_name(self) -> &'static str {
        match self {
            TextField::Title => fields::TITLE,
        }
    }

    pub fn value(self, doc: &MovieDocument) -> &str {
        match self {
            TextField::Title => &doc.title,
        }
    }
}

/// Similarity ranking against the overview embedding.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorClause {
    pub vector: Vec<f32>,
    /// Number of nearest neighbours to consider.
    pub k: usize,
}

impl VectorClause {
    pub fn stored_field(&self) -> &'static str {
        fields::OVERVIEW_EMBEDDING
    }
}

/// Phrase match against a text field.
#[derive(Debug, Clone, PartialEq)]
pub struct LexicalClause {
    pub field: TextField,
    pub phrase: String,
}

/// Inclusive numeric range. A missing bound is unbounded on that side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeClause {
    pub field: NumericField,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeClause {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |lo| value >= lo) && self.max.map_or(true, |hi| value <= hi)
    }
}

/// One part of a hybrid search.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Vector(VectorClause),
    Lexical(LexicalClause),
    Range(RangeClause),
}

impl Clause {
    /// Whether a document satisfies this clause as a filter. Vector clauses never filter.
    pub fn admits(&self, doc: &MovieDocument) -> bool {
        match self {
            Clause::Vector(_) => true,
            Clause::Lexical(lex) => phrase_matches(lex.field.value(doc), &lex.phrase),
            Clause::Range(range) => range.field.value(doc).map_or(false, |v| range.contains(v)),
        }
    }
}

/// How results are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultOrder {
    /// Descending similarity score.
    Score,
    /// Newest release first, then title; used when there is no vector clause.
    Default,
}

/// A complete hybrid search request.
#[derive(Debug, Clone, PartialEq)]
pub struct HybridQuery {
    clauses: Vec<Clause>,
    limit: usize,
}

impl HybridQuery {
    pub fn new(limit: usize) -> Self {
        Self { clauses: Vec::new(), limit }
    }

    /// Add a clause. A second vector clause replaces the first.
    pub fn with(mut self, clause: Clause) -> Self {
        if matches!(clause, Clause::Vector(_)) {
            self.clauses.retain(|c| !matches!(c, Clause::Vector(_)));
        }
        self.clauses.push(clause);
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn vector(&self) -> Option<&VectorClause> {
        self.clauses.iter().find_map(|c| match c {
            Clause::Vector(v) => Some(v),
            _ => None,
        })
    }

    /// Lexical and range clauses.
    pub fn constraints(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.iter().filter(|c| !matches!(c, Clause::Vector(_)))
    }

    pub fn ranges(&self) -> impl Iterator<Item = &RangeClause> {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Range(r) => Some(r),
            _ => None,
        })
    }

    pub fn lexical(&self) -> impl Iterator<Item = &LexicalClause> {
        self.clauses.iter().filter_map(|c| match c {
            Clause::Lexical(l) => Some(l),
            _ => None,
        })
    }

    pub fn order(&self) -> ResultOrder {
        if self.vector().is_some() {
            ResultOrder::Score
        } else {
            ResultOrder::Default
        }
    }

    /// Whether a document passes every constraint (conjunction).
    pub fn admits(&self, doc: &MovieDocument) -> bool {
        self.constraints().all(|c| c.admits(doc))
    }
}

/// Lowercase alphanumeric tokens, the same split the title index applies.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// True when the phrase's tokens occur contiguously in the text. A phrase without any
/// tokens matches nothing, as in the title index.
pub fn phrase_matches(text: &str, phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() {
        return false;
    }
    let haystack = tokenize(text);
    haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

/// Ordering used when no vector score exists: newest first, unknown years last, then title.
pub fn default_order(a: &MovieDocument, b: &MovieDocument) -> Ordering {
    match (a.released_year, b.released_year) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| a.title.cmp(&b.title))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(title: &str, year: Option<i32>, rating: Option<f64>) -> MovieDocument {
        MovieDocument {
            title: title.into(),
            released_year: year,
            imdb_rating: rating,
            ..Default::default()
        }
    }

    #[test]
    fn phrase_matching() {
        assert!(phrase_matches("The Godfather: Part II", "godfather"));
        assert!(phrase_matches("The Godfather: Part II", "Godfather part"));
        assert!(!phrase_matches("The Godfather: Part II", "part godfather"));
        assert!(!phrase_matches("Goodfellas", "Godfather"));
    }

    #[test]
    fn punctuation_only_phrase_matches_nothing() {
        assert!(!phrase_matches("The Godfather", "!!"));
        assert!(!phrase_matches("", "  "));

        let q = HybridQuery::new(5).with(Clause::Lexical(LexicalClause {
            field: TextField::Title,
            phrase: "?!".into(),
        }));
        assert!(!q.admits(&movie("Heat", Some(1995), None)));
    }

    #[test]
    fn ranges_are_inclusive_and_conjunctive() {
        let q = HybridQuery::new(5)
            .with(Clause::Range(RangeClause {
                field: NumericField::ReleasedYear,
                min: Some(1990.0),
                max: Some(2000.0),
            }))
            .with(Clause::Range(RangeClause {
                field: NumericField::ImdbRating,
                min: Some(8.0),
                max: None,
            }));
        assert!(q.admits(&movie("Se7en", Some(1995), Some(8.6))));
        assert!(q.admits(&movie("Edge", Some(2000), Some(8.0))));
        assert!(!q.admits(&movie("Old", Some(1989), Some(9.0))));
        assert!(!q.admits(&movie("Weak", Some(1995), Some(7.9))));
        assert!(!q.admits(&movie("Unknown", None, Some(9.0))));
    }

    #[test]
    fn only_one_vector_clause() {
        let q = HybridQuery::new(3)
            .with(Clause::Vector(VectorClause { vector: vec![1.0], k: 3 }))
            .with(Clause::Vector(VectorClause { vector: vec![2.0], k: 3 }));
        assert_eq!(q.clauses().len(), 1);
        assert_eq!(q.vector().unwrap().vector, vec![2.0]);
        assert_eq!(q.order(), ResultOrder::Score);
    }

    #[test]
    fn default_order_newest_first() {
        let mut docs = vec![
            movie("B", Some(1972), None),
            movie("A", None, None),
            movie("C", Some(1990), None),
            movie("A", Some(1972), None),
        ];
        docs.sort_by(default_order);
        let titles: Vec<_> = docs.iter().map(|d| (d.title.as_str(), d.released_year)).collect();
        assert_eq!(
            titles,
            vec![("C", Some(1990)), ("A", Some(1972)), ("B", Some(1972)), ("A", None)]
        );
    }
}
