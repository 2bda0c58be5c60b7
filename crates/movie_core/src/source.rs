//! Reading the movie dataset.
//!
//! Records stay string-keyed until [`normalize`] turns them into documents, so that a
//! bad value in one column only blanks that field.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use log::warn;
use store::{fields, MovieDocument};

use crate::{IngestError, IngestFailure};

/// One row of the source, keyed by column header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
	fields: HashMap<String, String>,
}

impl RawRecord {
	pub fn from_pairs<K, V, I>(pairs: I) -> Self
	where
		K: Into<String>,
		V: Into<String>,
		I: IntoIterator<Item = (K, V)>,
	{
		Self { fields: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
	}

	/// Trimmed value of a column, empty when absent.
	pub fn get(&self, column: &str) -> &str {
		self.fields.get(column).map(|v| v.trim()).unwrap_or("")
	}
}

/// Records read from a source, plus rows that could not be read at all.
#[derive(Debug, Default)]
pub struct RecordSource {
	pub records: Vec<RawRecord>,
	pub rejected: Vec<IngestFailure>,
}

impl From<Vec<RawRecord>> for RecordSource {
	fn from(records: Vec<RawRecord>) -> Self {
		Self { records, rejected: Vec::new() }
	}
}

/// Read a CSV file with a header row.
pub fn read_csv_path(path: &Path) -> Result<RecordSource, IngestError> {
	let file = File::open(path).map_err(|e| IngestError::Open { path: path.to_path_buf(), source: e })?;
	read_csv(file)
}

/// Read CSV with a header row. Unreadable rows are reported in `rejected`.
pub fn read_csv<R: Read>(input: R) -> Result<RecordSource, IngestError> {
	let mut reader = ReaderBuilder::new()
		.trim(Trim::All)
		.flexible(true)
		.from_reader(input);

	let headers = reader.headers()?.clone();
	if headers.is_empty() {
		return Err(IngestError::EmptyHeader);
	}

	let mut source = RecordSource::default();
	for (i, row) in reader.records().enumerate() {
		match row {
			Ok(row) => {
				source.records.push(RawRecord::from_pairs(
					headers.iter().zip(row.iter()).map(|(h, v)| (h.to_string(), v.to_string())),
				));
			}
			Err(e) => {
				// Header is line 1
				let line = e.position().map(|p| p.line()).unwrap_or(i as u64 + 2);
				warn!("skipping unreadable row at line {}: {}", line, e);
				source.rejected.push(IngestFailure {
					key: format!("line {}", line),
					title: String::new(),
					reason: e.to_string(),
				});
			}
		}
	}
	Ok(source)
}

fn parse_number(value: &str) -> Option<f64> {
	value.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Coerce a raw record into a document. Never fails; bad values become `None` or empty.
///
/// `Gross` defaults to 0, `Certificate` to `NA` and `Meta_score` to -1 when empty.
pub fn normalize(record: &RawRecord) -> MovieDocument {
	let text = |column: &str| record.get(column).to_string();

	MovieDocument {
		title: text(fields::TITLE),
		overview: text(fields::OVERVIEW),
		overview_embedding: None,
		released_year: record.get(fields::RELEASED_YEAR).parse::<i32>().ok(),
		imdb_rating: parse_number(record.get(fields::IMDB_RATING)),
		runtime: text(fields::RUNTIME),
		poster_link: text(fields::POSTER_LINK),
		certificate: match record.get("Certificate") {
			"" => "NA".to_string(),
			value => value.to_string(),
		},
		genre: text("Genre"),
		meta_score: Some(parse_number(record.get("Meta_score")).unwrap_or(-1.0)),
		director: text("Director"),
		star1: text("Star1"),
		star2: text("Star2"),
		star3: text("Star3"),
		star4: text("Star4"),
		votes: record.get("No_of_Votes").replace(',', "").parse::<u64>().ok(),
		gross: Some(parse_number(record.get("Gross")).unwrap_or(0.0)),
	}
}
