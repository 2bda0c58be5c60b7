//! CLI entrypoint for Movie Search.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::debug;
use movie_core::{
    build_embedder, build_searcher, build_store, open_ledger, read_csv_path, Backend, IngestEvent,
    IngestOptions, Ingester, MovieSearchConfig,
};
use search::{present, render_json, render_text, QueryPlan, QueryRequest};
use serde_json::{json, Value};
use store::search_request_body;

#[derive(Parser)]
#[command(name = "movie-search", version)]
#[command(about = "Movie Search: hybrid vector and keyword search over a movie dataset", long_about = None)]
struct Cli {
    /// Config file (default: search standard locations)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the storage backend (couchbase or local)
    #[arg(long, global = true)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed and store every movie in a CSV dataset
    Ingest {
        /// CSV file (default: ingest.dataset from the config)
        path: Option<PathBuf>,
        /// Rewrite records even if the ledger says they are unchanged
        #[arg(long)]
        force: bool,
        /// Records processed at once
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Search for movies
    Search {
        /// What the movie is about; leave empty to only filter
        #[arg(default_value = "")]
        query: String,
        /// Phrase that must appear in the title
        #[arg(long)]
        title: Option<String>,
        /// Use the query text as the title phrase
        #[arg(long, conflicts_with = "title")]
        title_from_query: bool,
        #[arg(long)]
        year_min: Option<i32>,
        #[arg(long)]
        year_max: Option<i32>,
        #[arg(long, allow_negative_numbers = true)]
        rating_min: Option<f64>,
        #[arg(long, allow_negative_numbers = true)]
        rating_max: Option<f64>,
        /// Number of results (default: search.results_count from the config)
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Include relevance scores
        #[arg(long)]
        show_score: bool,
        /// Print the search request sent to the store
        #[arg(long)]
        show_request: bool,
    },
    /// Show a stored movie by key
    Show {
        key: String,
    },
    /// Show store and ledger status
    Status,
    /// Manage the config file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a commented default config file
    Init {
        /// Where to write (default: the platform config directory)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration with secrets hidden
    Show,
}

fn load_config(cli: &Cli) -> Result<MovieSearchConfig> {
    let mut config = MovieSearchConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }
    Ok(config)
}

/// Replace the query vector with its length; 1536 floats help nobody.
fn preview_body(plan: &QueryPlan) -> Value {
    match plan {
        QueryPlan::Empty => json!({ "empty": "an inverted range matches nothing, no request is sent" }),
        QueryPlan::Search(query) => {
            let mut body = search_request_body(query);
            if let Some(knn) = body.get_mut("knn").and_then(Value::as_array_mut) {
                for entry in knn {
                    let len = entry["vector"].as_array().map_or(0, Vec::len);
                    entry["vector"] = json!(format!("<{} values>", len));
                }
            }
            body
        }
    }
}

async fn run_ingest(
    config: &MovieSearchConfig,
    path: Option<PathBuf>,
    force: bool,
    concurrency: Option<usize>,
) -> Result<()> {
    config.validate()?;
    let path = path.unwrap_or_else(|| config.ingest.dataset.clone());
    let source = read_csv_path(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let total = source.records.len();
    eprintln!("Ingesting {} record(s) from {}", total, path.display());

    let embedder = build_embedder(config)?;
    let store = build_store(config).await?;
    let ledger = open_ledger(config)?;
    eprintln!("Target: {}", store.target());

    let options = IngestOptions {
        concurrency: concurrency.unwrap_or(config.ingest.concurrency),
        force,
    };
    let ingester = Ingester::new(options, embedder, store).with_ledger(ledger, config.embedding.model.clone());

    let mut done = 0usize;
    let summary = ingester
        .run_with_progress(source, |event| match event {
            IngestEvent::RecordIngested { key, embedded } => {
                done += 1;
                let note = if embedded { "" } else { " (no overview, not vector-searchable)" };
                eprintln!("  [{}/{}] {}{}", done, total, key, note);
            }
            IngestEvent::RecordSkipped { key, reason } => {
                done += 1;
                debug!("skipped {}: {:?}", key, reason);
            }
            IngestEvent::RecordFailed { key, reason } => {
                done += 1;
                eprintln!("  [{}/{}] {} FAILED: {}", done, total, key, reason);
            }
            IngestEvent::RecordStarted { .. } | IngestEvent::Done => {}
        })
        .await;

    eprintln!(
        "done: {} ingested, {} skipped, {} failed",
        summary.ingested, summary.skipped, summary.failed
    );
    if summary.ingested == 0 && summary.failed > 0 {
        bail!("no records were ingested");
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_search(
    config: &MovieSearchConfig,
    query: String,
    title: Option<String>,
    title_from_query: bool,
    years: (Option<i32>, Option<i32>),
    ratings: (Option<f64>, Option<f64>),
    limit: Option<i64>,
    json: bool,
    show_score: bool,
    show_request: bool,
) -> Result<()> {
    let title_keyword = if title_from_query { Some(query.clone()) } else { title };
    let request = QueryRequest {
        query_text: query,
        title_keyword,
        year_min: years.0,
        year_max: years.1,
        rating_min: ratings.0,
        rating_max: ratings.1,
        result_limit: limit.unwrap_or(config.search.results_count),
    };

    let searcher = build_searcher(config).await?;
    let plan = searcher.plan(&request).await?;
    if show_request {
        eprintln!("{}", serde_json::to_string_pretty(&preview_body(&plan))?);
    }
    let hits = searcher.execute(&plan).await?;

    let movies = present(&hits, show_score);
    if json {
        println!("{}", render_json(&movies)?);
    } else {
        print!("{}", render_text(&movies));
    }
    Ok(())
}

async fn run_show(config: &MovieSearchConfig, key: &str) -> Result<()> {
    let store = build_store(config).await?;
    match store.get(key).await? {
        Some(doc) => {
            println!("{}", serde_json::to_string_pretty(&doc.without_embedding())?);
            Ok(())
        }
        None => bail!("no movie stored under {}", key),
    }
}

async fn run_status(config: &MovieSearchConfig) -> Result<()> {
    let store = build_store(config).await?;
    let target = store.target();
    let count = store.count().await.context("Failed to count documents")?;

    println!("Backend: {}", store.backend_name());
    println!("Target: {}", target);
    println!("Documents: {}", count);
    println!("Embedding model: {} ({} dims)", config.embedding.model, config.embedding.dimensions);

    let ledger = open_ledger(config)?;
    println!("Ledger entries: {}", ledger.record_count(&target)?);
    match ledger.last_ingested_at(&target)? {
        Some(ts) => {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(ts);
            println!("Last ingestion: {}s ago", (now - ts).max(0));
        }
        None => println!("Last ingestion: never"),
    }
    Ok(())
}

fn run_config(cli: &Cli, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Init { path, force } => {
            let path = match path.clone().or_else(MovieSearchConfig::default_config_path) {
                Some(p) => p,
                None => bail!("no config directory on this platform; pass --path"),
            };
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, MovieSearchConfig::generate_default_config())
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Show => {
            let config = load_config(cli)?;
            match cli.config.clone().or_else(MovieSearchConfig::find_config_file) {
                Some(p) => println!("# loaded from {}", p.display()),
                None => println!("# no config file found, using defaults"),
            }
            let shown = config.redacted();
            print!("{}", shown.to_toml()?);
            if let Err(e) = config.validate() {
                println!("# warning: {}", e);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match &cli.command {
        Commands::Config { action } => run_config(&cli, action),
        Commands::Ingest { path, force, concurrency } => {
            let config = load_config(&cli)?;
            run_ingest(&config, path.clone(), *force, *concurrency).await
        }
        Commands::Search {
            query,
            title,
            title_from_query,
            year_min,
            year_max,
            rating_min,
            rating_max,
            limit,
            json,
            show_score,
            show_request,
        } => {
            let config = load_config(&cli)?;
            run_search(
                &config,
                query.clone(),
                title.clone(),
                *title_from_query,
                (*year_min, *year_max),
                (*rating_min, *rating_max),
                *limit,
                *json,
                *show_score,
                *show_request,
            )
            .await
        }
        Commands::Show { key } => {
            let config = load_config(&cli)?;
            run_show(&config, key).await
        }
        Commands::Status => {
            let config = load_config(&cli)?;
            run_status(&config).await
        }
    }
}
