use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use embed::{
    DummyEmbedder, EmbedError, Embedder, OpenAiEmbedder, RetryPolicy, RetryingEmbedder,
};
use httpmock::prelude::*;
use serde_json::json;

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::ZERO,
        multiplier: 2,
    }
}

/// Fails with the given error for the first `failures` calls, then succeeds.
struct FlakyEmbedder {
    calls: AtomicU32,
    failures: u32,
    make_error: fn() -> EmbedError,
}

impl FlakyEmbedder {
    fn new(failures: u32, make_error: fn() -> EmbedError) -> Self {
        Self { calls: AtomicU32::new(0), failures, make_error }
    }
}

#[async_trait]
impl Embedder for FlakyEmbedder {
    async fn embed(&self, _text: &str) -> embed::Result<Vec<f32>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            Err((self.make_error)())
        } else {
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn dimension(&self) -> usize {
        3
    }
}

#[tokio::test]
async fn test_dummy_embedder() {
    let embedder = DummyEmbedder::new(384);
    let vec = embedder.embed("hello world").await.unwrap();
    assert_eq!(vec.len(), 384);
    assert_eq!(embedder.dimension(), 384);
}

#[tokio::test]
async fn test_dummy_embedder_batch() {
    let embedder = DummyEmbedder::new(384);
    let vecs = embedder.embed_batch(&["hello", "world"]).await.unwrap();
    assert_eq!(vecs.len(), 2);
    assert_eq!(vecs[0].len(), 384);
}

#[tokio::test]
async fn retry_recovers_from_rate_limit() {
    let retrying = RetryingEmbedder::new(
        FlakyEmbedder::new(2, || EmbedError::RateLimited("429".into())),
        fast_policy(3),
    );
    let v = retrying.embed("text").await.unwrap();
    assert_eq!(v, vec![1.0, 0.0, 0.0]);
    assert_eq!(retrying.inner().calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_gives_up_after_max_attempts() {
    let retrying = RetryingEmbedder::new(
        FlakyEmbedder::new(10, || EmbedError::Transport("connection reset".into())),
        fast_policy(3),
    );
    let err = retrying.embed("text").await.unwrap_err();
    assert!(matches!(err, EmbedError::Exhausted { attempts: 3, .. }));
    assert_eq!(retrying.inner().calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn persistent_errors_are_not_retried() {
    let retrying = RetryingEmbedder::new(
        FlakyEmbedder::new(10, || EmbedError::Auth("bad key".into())),
        fast_policy(3),
    );
    let err = retrying.embed("text").await.unwrap_err();
    assert!(matches!(err, EmbedError::Auth(_)));
    assert_eq!(retrying.inner().calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn openai_embedder_parses_response() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/embeddings")
                .header("authorization", "Bearer sk-test");
            then.status(200).json_body(json!({
                "object": "list",
                "data": [{ "object": "embedding", "index": 0, "embedding": [0.1, 0.2, 0.3] }],
                "model": "text-embedding-3-small"
            }));
        })
        .await;

    let embedder = OpenAiEmbedder::new("sk-test")
        .unwrap()
        .with_base_url(format!("{}/v1", server.base_url()))
        .with_dimension(3);
    let v = embedder.embed("a detective investigates a murder").await.unwrap();
    assert_eq!(v, vec![0.1, 0.2, 0.3]);
    assert_eq!(embedder.dimension(), 3);
    mock.assert_async().await;
}

#[tokio::test]
async fn openai_rate_limit_is_transient_and_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(429)
                .json_body(json!({ "error": { "message": "Rate limit reached" } }));
        })
        .await;

    let embedder = OpenAiEmbedder::new("sk-test")
        .unwrap()
        .with_base_url(format!("{}/v1", server.base_url()));
    let retrying = RetryingEmbedder::new(embedder, fast_policy(3));
    let err = retrying.embed("hello").await.unwrap_err();
    match err {
        EmbedError::Exhausted { attempts, last } => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, EmbedError::RateLimited(ref m) if m.contains("Rate limit")));
        }
        other => panic!("unexpected error: {other}"),
    }
    mock.assert_hits_async(3).await;
}

#[tokio::test]
async fn openai_auth_failure_is_not_retried() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/embeddings");
            then.status(401)
                .json_body(json!({ "error": { "message": "Incorrect API key provided" } }));
        })
        .await;

    let embedder = OpenAiEmbedder::new("sk-wrong")
        .unwrap()
        .with_base_url(format!("{}/v1", server.base_url()));
    let retrying = RetryingEmbedder::new(embedder, fast_policy(3));
    let err = retrying.embed("hello").await.unwrap_err();
    assert!(matches!(err, EmbedError::Auth(_)));
    mock.assert_hits_async(1).await;
}
