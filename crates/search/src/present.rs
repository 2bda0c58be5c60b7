//! Turning search hits into display records.

use serde::Serialize;
use store::ScoredMovie;

const SNIPPET_CHARS: usize = 200;
const PLACEHOLDER: &str = "—";

/// One row of search output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayMovie {
	pub title: String,
	pub year: Option<i32>,
	pub rating: Option<f64>,
	pub runtime: Option<String>,
	pub poster: Option<String>,
	pub snippet: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub score: Option<f32>,
}

fn non_empty(value: &str) -> Option<String> {
	let trimmed = value.trim();
	(!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl DisplayMovie {
	/// Map a hit. The score is only carried when `show_score` is set.
	pub fn from_hit(hit: &ScoredMovie, show_score: bool) -> Self {
		let doc = &hit.document;
		Self {
			title: doc.title.clone(),
			year: doc.released_year,
			rating: doc.imdb_rating,
			runtime: non_empty(&doc.runtime),
			poster: non_empty(&doc.poster_link).map(|p| cleanup_poster_url(&p)),
			snippet: snippet(&doc.overview),
			score: if show_score { hit.score } else { None },
		}
	}
}

pub fn present(hits: &[ScoredMovie], show_score: bool) -> Vec<DisplayMovie> {
	hits.iter().map(|hit| DisplayMovie::from_hit(hit, show_score)).collect()
}

/// Rewrite an IMDb thumbnail link to the full-size image.
///
/// `…@._V1_UX67_CR0,0,67,98_AL_.jpg` becomes `…@._V1_.jpg`.
pub fn cleanup_poster_url(url: &str) -> String {
	match (url.find("_V1_"), url.find("_AL_")) {
		(Some(v1), Some(al)) if v1 < al => {
			format!("{}{}", &url[..v1 + "_V1_".len()], &url[al + "_AL_".len()..])
		}
		_ => url.to_string(),
	}
}

/// First 200 characters of the overview, with `...` when cut.
pub fn snippet(text: &str) -> String {
	let text = text.trim();
	match text.char_indices().nth(SNIPPET_CHARS) {
		Some((cut, _)) => format!("{}...", &text[..cut]),
		None => text.to_string(),
	}
}

fn or_placeholder<T: ToString>(value: Option<T>) -> String {
	value.map(|v| v.to_string()).unwrap_or_else(|| PLACEHOLDER.to_string())
}

/// Human-readable listing.
pub fn render_text(movies: &[DisplayMovie]) -> String {
	if movies.is_empty() {
		return "No results found.\n".to_string();
	}

	let mut out = String::new();
	for (i, movie) in movies.iter().enumerate() {
		let title = if movie.title.is_empty() { PLACEHOLDER } else { movie.title.as_str() };
		out.push_str(&format!("{}. {} ({})", i + 1, title, or_placeholder(movie.year)));
		if let Some(score) = movie.score {
			out.push_str(&format!("  [score: {:.4}]", score));
		}
		out.push('\n');
		out.push_str(&format!(
			"   Rating: {}  Runtime: {}\n",
			or_placeholder(movie.rating.map(|r| format!("{:.1}", r))),
			or_placeholder(movie.runtime.as_deref())
		));
		out.push_str(&format!("   Poster: {}\n", or_placeholder(movie.poster.as_deref())));
		if !movie.snippet.is_empty() {
			out.push_str(&format!("   {}\n", movie.snippet));
		}
		out.push('\n');
	}
	out
}

pub fn render_json(movies: &[DisplayMovie]) -> serde_json::Result<String> {
	serde_json::to_string_pretty(movies)
}
