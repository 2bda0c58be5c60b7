//! Configuration file handling for Movie Search.
//!
//! Loads settings from `movie-search.config.toml` with the following search order:
//! 1. Current directory
//! 2. ~/.config/movie-search/movie-search.config.toml (Linux/macOS)
//! 3. ~/.movie-search/movie-search.config.toml
//!
//! Environment variables (and a `.env` file) override the file, using the same names as
//! the original deployment scripts (`DB_CONN_STR`, `OPENAI_API_KEY`, ...).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use store::{service_urls, CouchbaseSettings};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration key {key} (or set {env})")]
    Missing { key: &'static str, env: &'static str },

    #[error("invalid configuration key {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to write config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

const REDACTED: &str = "********";

/// Main configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovieSearchConfig {
    /// Per-request timeout for HTTP clients.
    pub http_timeout_secs: u64,
    pub couchbase: CouchbaseConfig,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub ingest: IngestConfig,
    pub storage: StorageConfig,
}

impl Default for MovieSearchConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: 30,
            couchbase: CouchbaseConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            ingest: IngestConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// Cluster connection and keyspace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CouchbaseConfig {
    /// `couchbase://host` or `couchbases://host`.
    pub conn_str: String,
    pub username: String,
    pub password: String,
    pub bucket: String,
    pub scope: String,
    pub collection: String,
    /// Search index with the vector field.
    pub index_name: String,
    /// Overrides the Query service URL derived from `conn_str`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_url: Option<String>,
    /// Overrides the Search service URL derived from `conn_str`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_url: Option<String>,
}

/// Which embedder to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// OpenAI-compatible HTTP API.
    #[default]
    Openai,
    /// Deterministic token hashing, offline. Only useful for demos and tests.
    Hash,
}

/// Embedding API configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    pub api_key: String,
    pub model: String,
    /// Must match the vector field of the search index.
    pub dimensions: usize,
    pub base_url: String,
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Openai,
            api_key: String::new(),
            model: embed::DEFAULT_MODEL.into(),
            dimensions: embed::DEFAULT_DIMENSIONS,
            base_url: embed::DEFAULT_BASE_URL.into(),
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Default number of results.
    pub results_count: i64,
    /// Upper bound accepted for `--limit`.
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            results_count: search::DEFAULT_RESULT_LIMIT,
            max_results: search::DEFAULT_MAX_RESULTS,
        }
    }
}

/// Ingestion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// CSV file read by `ingest` when no path is given.
    pub dataset: PathBuf,
    /// Records processed at once.
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("imdb_top_1000.csv"),
            concurrency: 4,
        }
    }
}

/// Where documents live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Couchbase,
    /// Embedded LanceDB table in the data directory.
    Local,
}

impl std::str::FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "couchbase" => Ok(Backend::Couchbase),
            "local" => Ok(Backend::Local),
            other => Err(ConfigError::Invalid {
                key: "storage.backend",
                message: format!("unknown backend {:?}, expected \"couchbase\" or \"local\"", other),
            }),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// Path for local data and the ingestion ledger.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl MovieSearchConfig {
    /// Config file name.
    pub const FILENAME: &'static str = "movie-search.config.toml";

    /// Load `.env`, the config file and environment overrides.
    ///
    /// Uses `explicit` if given, otherwise searches the standard locations and falls back
    /// to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();
        let found = explicit.map(Path::to_path_buf).or_else(Self::find_config_file);
        let mut config = match found {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_with(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific path, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: MovieSearchConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Render as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = self.to_toml()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Find config file in standard locations.
    pub fn find_config_file() -> Option<PathBuf> {
        // 1. Current directory
        let current = PathBuf::from(Self::FILENAME);
        if current.exists() {
            return Some(current);
        }

        // 2. Config directory (~/.config/movie-search/ on Linux)
        if let Some(config_dir) = dirs::config_dir() {
            let path = config_dir.join("movie-search").join(Self::FILENAME);
            if path.exists() {
                return Some(path);
            }
        }

        // 3. Home directory fallback
        if let Some(home) = dirs::home_dir() {
            let path = home.join(".movie-search").join(Self::FILENAME);
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Get the default config file path for the current platform.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("movie-search").join(Self::FILENAME))
    }

    /// Apply environment overrides. `lookup` returns the value of a variable, if set.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let strings: [(&str, &mut String); 9] = [
            ("DB_CONN_STR", &mut self.couchbase.conn_str),
            ("DB_USERNAME", &mut self.couchbase.username),
            ("DB_PASSWORD", &mut self.couchbase.password),
            ("DB_BUCKET", &mut self.couchbase.bucket),
            ("DB_SCOPE", &mut self.couchbase.scope),
            ("DB_COLLECTION", &mut self.couchbase.collection),
            ("INDEX_NAME", &mut self.couchbase.index_name),
            ("OPENAI_API_KEY", &mut self.embedding.api_key),
            ("EMBEDDING_MODEL", &mut self.embedding.model),
        ];
        for (name, slot) in strings {
            if let Some(value) = get(name) {
                *slot = value;
            }
        }

        if let Some(backend) = get("MOVIE_SEARCH_BACKEND") {
            self.storage.backend = backend.parse()?;
        }
        Ok(())
    }

    /// Check that everything the selected backend and embedder need is present.
    /// Reports the first missing key.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.provider == EmbeddingProvider::Openai && self.embedding.api_key.trim().is_empty() {
            return Err(ConfigError::Missing { key: "embedding.api_key", env: "OPENAI_API_KEY" });
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::Invalid {
                key: "embedding.dimensions",
                message: "must be greater than zero".into(),
            });
        }
        if self.embedding.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "embedding.max_attempts",
                message: "must be at least 1".into(),
            });
        }
        if self.search.max_results == 0 {
            return Err(ConfigError::Invalid {
                key: "search.max_results",
                message: "must be greater than zero".into(),
            });
        }
        if self.ingest.concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "ingest.concurrency",
                message: "must be greater than zero".into(),
            });
        }

        if self.storage.backend == Backend::Couchbase {
            let cb = &self.couchbase;
            let has_urls = cb.query_url.is_some() && cb.search_url.is_some();
            let required: [(&'static str, &'static str, &str, bool); 7] = [
                ("couchbase.conn_str", "DB_CONN_STR", &cb.conn_str, !has_urls),
                ("couchbase.username", "DB_USERNAME", &cb.username, true),
                ("couchbase.password", "DB_PASSWORD", &cb.password, true),
                ("couchbase.bucket", "DB_BUCKET", &cb.bucket, true),
                ("couchbase.scope", "DB_SCOPE", &cb.scope, true),
                ("couchbase.collection", "DB_COLLECTION", &cb.collection, true),
                ("couchbase.index_name", "INDEX_NAME", &cb.index_name, true),
            ];
            for (key, env, value, needed) in required {
                if needed && value.trim().is_empty() {
                    return Err(ConfigError::Missing { key, env });
                }
            }
        }
        Ok(())
    }

    /// HTTP client timeout.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    /// Settings for the Couchbase store. Service URLs come from `conn_str` unless set.
    pub fn couchbase_settings(&self) -> Result<CouchbaseSettings> {
        let cb = &self.couchbase;
        let derived = service_urls(&cb.conn_str);
        let pick = |explicit: &Option<String>, derived: Option<String>| -> Result<String> {
            explicit.clone().or(derived).ok_or_else(|| ConfigError::Invalid {
                key: "couchbase.conn_str",
                message: format!("cannot derive service URLs from {:?}", cb.conn_str),
            })
        };
        let (query_derived, search_derived) = match derived {
            Some((q, s)) => (Some(q), Some(s)),
            None => (None, None),
        };

        Ok(CouchbaseSettings {
            query_url: pick(&cb.query_url, query_derived)?,
            search_url: pick(&cb.search_url, search_derived)?,
            username: cb.username.clone(),
            password: cb.password.clone(),
            bucket: cb.bucket.clone(),
            scope: cb.scope.clone(),
            collection: cb.collection.clone(),
            index_name: cb.index_name.clone(),
            timeout: self.http_timeout(),
        })
    }

    /// Get the data directory path (uses storage.path or default).
    pub fn data_dir(&self) -> PathBuf {
        self.storage.path.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("movie_search")
        })
    }

    /// Copy with secrets replaced, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [&mut copy.couchbase.password, &mut copy.embedding.api_key] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        copy
    }

    /// Generate a default config file with comments.
    pub fn generate_default_config() -> String {
        r#"# Movie Search Configuration
# Place this file at:
#   - ./movie-search.config.toml (current directory)
#   - ~/.config/movie-search/movie-search.config.toml (Linux/macOS)
#   - ~/.movie-search/movie-search.config.toml
#
# Every value below can also be set through the environment or a .env file:
# DB_CONN_STR, DB_USERNAME, DB_PASSWORD, DB_BUCKET, DB_SCOPE, DB_COLLECTION,
# INDEX_NAME, OPENAI_API_KEY, EMBEDDING_MODEL, MOVIE_SEARCH_BACKEND

# Timeout for each HTTP request (seconds)
http_timeout_secs = 30

[couchbase]
# couchbase://host for plain connections, couchbases://host for TLS
conn_str = "couchbase://localhost"
username = "Administrator"
# password = "..."
bucket = "movies"
scope = "_default"
collection = "_default"

# Search index with a vector field named Overview_embedding
index_name = "movies_hybrid"

# Service URLs are derived from conn_str; set these to override
# query_url = "http://localhost:8093"
# search_url = "http://localhost:8094"

[embedding]
# "openai" or "hash" (offline, for demos only)
provider = "openai"
# api_key = "sk-..."
model = "text-embedding-3-small"

# Must match the dims of the vector field in the search index
dimensions = 1536
base_url = "https://api.openai.com/v1"

# Retries for rate limits and server errors
max_attempts = 3
initial_backoff_ms = 500

[search]
# Default number of results
results_count = 5

# Largest --limit accepted
max_results = 100

[ingest]
# CSV read by `movie-search ingest` when no path is given
dataset = "imdb_top_1000.csv"

# Records embedded and written at once
concurrency = 4

[storage]
# "couchbase" or "local" (LanceDB in the data directory)
backend = "couchbase"

# Path for local data and the ingestion ledger (default: ~/.local/share/movie_search)
# path = "/custom/path/to/movie_search"
"#.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    fn complete() -> MovieSearchConfig {
        let mut config = MovieSearchConfig::default();
        config
            .apply_env_with(env(&[
                ("DB_CONN_STR", "couchbase://localhost"),
                ("DB_USERNAME", "Administrator"),
                ("DB_PASSWORD", "password"),
                ("DB_BUCKET", "movies"),
                ("DB_SCOPE", "imdb"),
                ("DB_COLLECTION", "top1000"),
                ("INDEX_NAME", "movies_hybrid"),
                ("OPENAI_API_KEY", "sk-test"),
            ]))
            .unwrap();
        config
    }

    #[test]
    fn test_default_config() {
        let config = MovieSearchConfig::default();
        assert_eq!(config.search.results_count, 5);
        assert_eq!(config.search.max_results, 100);
        assert_eq!(config.embedding.dimensions, 1536);
        assert_eq!(config.embedding.model, "text-embedding-3-small");
        assert_eq!(config.storage.backend, Backend::Couchbase);
    }

    #[test]
    fn test_generated_config_parses() {
        let config: MovieSearchConfig =
            toml::from_str(&MovieSearchConfig::generate_default_config()).unwrap();
        assert_eq!(config.couchbase.index_name, "movies_hybrid");
        assert_eq!(config.ingest.concurrency, 4);
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
            [storage]
            backend = "local"
            path = "/tmp/movies"

            [embedding]
            provider = "hash"
            dimensions = 64
        "#;

        let config: MovieSearchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage.backend, Backend::Local);
        assert_eq!(config.data_dir(), PathBuf::from("/tmp/movies"));
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hash);
        assert_eq!(config.embedding.dimensions, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_key_is_named() {
        let err = MovieSearchConfig::default().validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing configuration key embedding.api_key (or set OPENAI_API_KEY)"
        );

        let mut config = complete();
        config.couchbase.username.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Missing { key: "couchbase.username", .. })
        ));
    }

    #[test]
    fn test_env_overrides_and_urls() {
        let config = complete();
        assert!(config.validate().is_ok());

        let settings = config.couchbase_settings().unwrap();
        assert_eq!(settings.query_url, "http://localhost:8093");
        assert_eq!(settings.search_url, "http://localhost:8094");
        assert_eq!(settings.scope, "imdb");
        assert_eq!(settings.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_backend_from_env() {
        let mut config = MovieSearchConfig::default();
        config.apply_env_with(env(&[("MOVIE_SEARCH_BACKEND", "Local")])).unwrap();
        assert_eq!(config.storage.backend, Backend::Local);

        assert!(config.apply_env_with(env(&[("MOVIE_SEARCH_BACKEND", "mongo")])).is_err());
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let shown = complete().redacted();
        assert_eq!(shown.couchbase.password, REDACTED);
        assert_eq!(shown.embedding.api_key, REDACTED);
        assert_eq!(shown.couchbase.username, "Administrator");
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = std::env::temp_dir().join(format!("movie_search_config_{}", std::process::id()));
        let path = dir.join(MovieSearchConfig::FILENAME);
        let config = complete();
        config.save_to(&path).unwrap();
        assert_eq!(MovieSearchConfig::load_from(&path).unwrap(), config);
        let _ = fs::remove_dir_all(&dir);
    }
}
