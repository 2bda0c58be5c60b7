//! Query requests and their translation into hybrid queries.

use serde::{Deserialize, Serialize};
use store::{Clause, HybridQuery, LexicalClause, NumericField, RangeClause, TextField, VectorClause};

use crate::error::{Result, SearchError};

pub const DEFAULT_RESULT_LIMIT: i64 = 5;
pub const DEFAULT_MAX_RESULTS: usize = 100;

/// What the user asked for. Bounds are inclusive; a missing bound is unbounded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
	pub query_text: String,
	pub title_keyword: Option<String>,
	pub year_min: Option<i32>,
	pub year_max: Option<i32>,
	pub rating_min: Option<f64>,
	pub rating_max: Option<f64>,
	pub result_limit: i64,
}

impl Default for QueryRequest {
	fn default() -> Self {
		Self {
			query_text: String::new(),
			title_keyword: None,
			year_min: None,
			year_max: None,
			rating_min: None,
			rating_max: None,
			result_limit: DEFAULT_RESULT_LIMIT,
		}
	}
}

impl QueryRequest {
	pub fn new(query_text: impl Into<String>) -> Self {
		Self { query_text: query_text.into(), ..Default::default() }
	}

	/// Whether the query text asks for vector ranking.
	pub fn has_text(&self) -> bool {
		!self.query_text.trim().is_empty()
	}

	fn keyword(&self) -> Option<&str> {
		self.title_keyword.as_deref().map(str::trim).filter(|k| !k.is_empty())
	}

	/// True when an inverted range makes the result empty.
	pub fn is_unsatisfiable(&self) -> bool {
		let years = matches!((self.year_min, self.year_max), (Some(lo), Some(hi)) if lo > hi);
		let ratings = matches!((self.rating_min, self.rating_max), (Some(lo), Some(hi)) if lo > hi);
		years || ratings
	}
}

/// Outcome of planning a request.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
	/// Run this query against the store.
	Search(HybridQuery),
	/// The answer is known to be empty; do not contact anything.
	Empty,
}

/// Turns [`QueryRequest`]s into [`HybridQuery`]s. Stateless apart from its limits.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
	max_results: usize,
}

impl Default for QueryBuilder {
	fn default() -> Self {
		Self { max_results: DEFAULT_MAX_RESULTS }
	}
}

impl QueryBuilder {
	pub fn new(max_results: usize) -> Self {
		Self { max_results }
	}

	/// Check the request and return its limit.
	pub fn validate(&self, request: &QueryRequest) -> Result<usize> {
		if request.result_limit <= 0 {
			return Err(SearchError::InvalidRequest(format!(
				"result_limit must be positive, got {}",
				request.result_limit
			)));
		}
		let limit = request.result_limit as usize;
		if limit > self.max_results {
			return Err(SearchError::InvalidRequest(format!(
				"result_limit {} exceeds the maximum of {}",
				limit, self.max_results
			)));
		}
		for (name, bound) in [("rating_min", request.rating_min), ("rating_max", request.rating_max)] {
			if let Some(value) = bound {
				if !value.is_finite() {
					return Err(SearchError::InvalidRequest(format!("{} is not a finite number", name)));
				}
			}
		}
		Ok(limit)
	}

	/// Build the query. `query_vector` is the embedding of the query text, if any.
	pub fn build(&self, request: &QueryRequest, query_vector: Option<Vec<f32>>) -> Result<QueryPlan> {
		let limit = self.validate(request)?;
		if request.is_unsatisfiable() {
			return Ok(QueryPlan::Empty);
		}

		let mut query = HybridQuery::new(limit);
		if let Some(vector) = query_vector {
			query = query.with(Clause::Vector(VectorClause { vector, k: limit }));
		}
		if let Some(keyword) = request.keyword() {
			query = query.with(Clause::Lexical(LexicalClause {
				field: TextField::Title,
				phrase: keyword.to_string(),
			}));
		}
		if request.year_min.is_some() || request.year_max.is_some() {
			query = query.with(Clause::Range(RangeClause {
				field: NumericField::ReleasedYear,
				min: request.year_min.map(f64::from),
				max: request.year_max.map(f64::from),
			}));
		}
		if request.rating_min.is_some() || request.rating_max.is_some() {
			query = query.with(Clause::Range(RangeClause {
				field: NumericField::ImdbRating,
				min: request.rating_min,
				max: request.rating_max,
			}));
		}
		Ok(QueryPlan::Search(query))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_limit_bounds() {
		let builder = QueryBuilder::default();
		for bad in [0, -3, 101] {
			let req = QueryRequest { result_limit: bad, ..QueryRequest::new("x") };
			assert!(matches!(builder.validate(&req), Err(SearchError::InvalidRequest(_))));
		}
		let req = QueryRequest { result_limit: 100, ..QueryRequest::new("x") };
		assert_eq!(builder.validate(&req).unwrap(), 100);
	}

	#[test]
	fn test_nan_rating_is_invalid() {
		let req = QueryRequest { rating_min: Some(f64::NAN), ..Default::default() };
		assert!(QueryBuilder::default().build(&req, None).is_err());
	}

	#[test]
	fn test_inverted_range_plans_empty() {
		let req = QueryRequest { year_min: Some(2000), year_max: Some(1990), ..QueryRequest::new("x") };
		assert_eq!(QueryBuilder::default().build(&req, None).unwrap(), QueryPlan::Empty);
	}

	#[test]
	fn test_clauses_follow_request() {
		let req = QueryRequest {
			title_keyword: Some("  Godfather ".into()),
			year_min: Some(1990),
			rating_min: Some(8.0),
			..QueryRequest::new("a detective investigates a murder")
		};
		let QueryPlan::Search(query) = QueryBuilder::default().build(&req, Some(vec![0.5, 0.5])).unwrap() else {
			panic!("expected a search plan");
		};
		assert_eq!(query.limit(), 5);
		assert_eq!(query.vector().unwrap().k, 5);
		assert_eq!(query.lexical().next().unwrap().phrase, "Godfather");

		let ranges: Vec<_> = query.ranges().collect();
		assert_eq!(ranges.len(), 2);
		assert_eq!(ranges[0].field, NumericField::ReleasedYear);
		assert_eq!((ranges[0].min, ranges[0].max), (Some(1990.0), None));
	}

	#[test]
	fn test_blank_keyword_adds_nothing() {
		let req = QueryRequest { title_keyword: Some("   ".into()), ..Default::default() };
		let QueryPlan::Search(query) = QueryBuilder::default().build(&req, None).unwrap() else {
			panic!("expected a search plan");
		};
		assert!(query.clauses().is_empty());
	}
}
