use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const ENV_OVERRIDES: [&str; 10] = [
    "DB_CONN_STR",
    "DB_USERNAME",
    "DB_PASSWORD",
    "DB_BUCKET",
    "DB_SCOPE",
    "DB_COLLECTION",
    "INDEX_NAME",
    "OPENAI_API_KEY",
    "EMBEDDING_MODEL",
    "MOVIE_SEARCH_BACKEND",
];

const DATASET: &str = r#"Poster_Link,Series_Title,Released_Year,Certificate,Runtime,Genre,IMDB_Rating,Overview,Meta_score,Director,Star1,Star2,Star3,Star4,No_of_Votes,Gross
,The Godfather,1972,A,175 min,"Crime, Drama",9.2,An organized crime dynasty's aging patriarch transfers control of his clandestine empire to his reluctant son.,100,Francis Ford Coppola,Marlon Brando,Al Pacino,James Caan,Diane Keaton,1620367,"134,966,411"
,The Godfather: Part II,1974,A,202 min,"Crime, Drama",9.0,The early life and career of Vito Corleone in 1920s New York City is portrayed.,90,Francis Ford Coppola,Al Pacino,Robert De Niro,Robert Duvall,Diane Keaton,1129952,"57,300,000"
,Toy Story,1995,U,81 min,"Animation, Adventure",8.3,A cowboy doll is profoundly threatened when a new spaceman figure supplants him as top toy.,95,John Lasseter,Tom Hanks,Tim Allen,Don Rickles,Jim Varney,887429,"191,796,233"
"#;

fn movie_search(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("movie-search").unwrap();
    cmd.current_dir(dir);
    for name in ENV_OVERRIDES {
        cmd.env_remove(name);
    }
    cmd
}

/// Workspace with a local, offline config in the current directory.
fn local_workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let config = format!(
        "[embedding]\nprovider = \"hash\"\ndimensions = 16\n\n[storage]\nbackend = \"local\"\npath = {:?}\n",
        dir.path().join("data").display().to_string()
    );
    fs::write(dir.path().join("movie-search.config.toml"), config).unwrap();
    fs::write(dir.path().join("movies.csv"), DATASET).unwrap();
    dir
}

#[test]
fn prints_help() {
    let dir = tempfile::tempdir().unwrap();
    movie_search(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("hybrid vector and keyword search"));
}

#[test]
fn search_help() {
    let dir = tempfile::tempdir().unwrap();
    movie_search(dir.path())
        .args(["search", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--year-min"))
        .stdout(predicate::str::contains("--title"));
}

#[test]
fn invalid_command_fails() {
    let dir = tempfile::tempdir().unwrap();
    movie_search(dir.path()).arg("foo").assert().failure();
}

#[test]
fn zero_limit_is_rejected() {
    let dir = local_workspace();
    movie_search(dir.path())
        .args(["search", "heist", "--limit", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid request"));
}

#[test]
fn missing_credentials_are_named() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("movie-search.config.toml"),
        "[embedding]\nprovider = \"hash\"\n\n[storage]\nbackend = \"couchbase\"\n",
    )
    .unwrap();
    movie_search(dir.path())
        .args(["search", "heist"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing configuration key"));
}

#[test]
fn config_init_then_show_hides_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("movie-search.config.toml");
    movie_search(dir.path())
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.exists());

    // A second init without --force leaves the file alone
    movie_search(dir.path())
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    movie_search(dir.path())
        .args(["config", "show"])
        .env("OPENAI_API_KEY", "sk-very-secret")
        .assert()
        .success()
        .stdout(predicate::str::contains("********"))
        .stdout(predicate::str::contains("sk-very-secret").not());
}

#[test]
fn ingest_then_search_by_title() {
    let dir = local_workspace();
    movie_search(dir.path())
        .args(["ingest", "movies.csv"])
        .assert()
        .success()
        .stderr(predicate::str::contains("3 ingested"));

    movie_search(dir.path())
        .args(["search", "--title", "godfather"])
        .assert()
        .success()
        .stdout(predicate::str::contains("The Godfather (1972)"))
        .stdout(predicate::str::contains("Toy Story").not());

    movie_search(dir.path())
        .args(["search", "a toy cowboy", "--year-min", "1990", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"Toy Story\""))
        .stdout(predicate::str::contains("Godfather").not());

    // Unchanged records are skipped on the next run
    movie_search(dir.path())
        .args(["ingest", "movies.csv"])
        .assert()
        .success()
        .stderr(predicate::str::contains("0 ingested, 3 skipped"));

    movie_search(dir.path())
        .args(["show", "movie::the-godfather::1972"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Marlon Brando"));
}

#[test]
fn inverted_range_finds_nothing() {
    let dir = local_workspace();
    movie_search(dir.path())
        .args(["search", "crime", "--year-min", "2000", "--year-max", "1990"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No results found."));
}
