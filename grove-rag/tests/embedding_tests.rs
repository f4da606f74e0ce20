//! Tests for batching, ordering, normalization and failure reporting in the embedder.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use common::{FailingEmbedder, HashEmbedder, ReversingEmbedder, StalledEmbedder};
use grove_rag::{Embedder, EmbeddingProvider, RagError, Result};
use proptest::prelude::*;

/// Echoes pre-generated raw vectors, one per text, in order.
struct FixedEmbedder {
    vectors: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.vectors[t.parse::<usize>().unwrap()].clone()).collect())
    }

    fn dimensions(&self) -> usize {
        self.vectors[0].len()
    }

    fn model_id(&self) -> &str {
        "fixed"
    }
}

/// Returns one vector too few.
struct ShortEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "short"
    }
}

mod prop_normalization {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn every_vector_has_unit_norm(
            vectors in proptest::collection::vec(
                proptest::collection::vec(-100.0f32..100.0f32, 8),
                1..30,
            ).prop_filter("non-degenerate", |vs| vs.iter().all(|v| v.iter().any(|x| x.abs() > 1e-3))),
            batch_size in 1usize..8,
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            let texts: Vec<String> = (0..vectors.len()).map(|i| i.to_string()).collect();
            let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let embedder = Embedder::new(Arc::new(FixedEmbedder { vectors: vectors.clone() }), batch_size);

            let out = rt.block_on(embedder.embed(&refs)).unwrap();
            prop_assert_eq!(out.len(), vectors.len());
            for v in &out {
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                prop_assert!((norm - 1.0).abs() < 1e-5, "norm was {}", norm);
            }
        }
    }
}

#[tokio::test]
async fn large_requests_are_split_into_sub_batches() {
    let provider = HashEmbedder::new();
    let embedder = Embedder::new(provider.clone(), 3);
    let texts = ["a", "b", "c", "d", "e", "f", "g"];

    let vectors = embedder.embed(&texts).await.unwrap();
    assert_eq!(vectors.len(), 7);
    assert_eq!(provider.calls(), 3);
    assert_eq!(provider.texts_seen.load(Ordering::SeqCst), 7);
}

#[tokio::test(start_paused = true)]
async fn concurrent_sub_batches_keep_input_order() {
    let embedder = Embedder::new(Arc::new(ReversingEmbedder), 2).with_max_concurrent(4);
    let texts: Vec<String> = (0..10).map(|i| format!("t{i}")).collect();
    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();

    let vectors = embedder.embed(&refs).await.unwrap();
    for (i, v) in vectors.iter().enumerate() {
        let ratio = v[1] / v[0];
        assert!((ratio - i as f32).abs() < 1e-3, "vector {i} out of order: {v:?}");
    }
}

#[tokio::test]
async fn provider_failure_reports_batch_size_and_cause() {
    let provider = Arc::new(FailingEmbedder::default());
    let embedder = Embedder::new(provider.clone(), 5);

    let err = embedder.embed(&["a", "b", "c"]).await.unwrap_err();
    match err {
        RagError::EmbeddingUnavailable { provider: name, batch_size, cause } => {
            assert_eq!(name, "failing");
            assert_eq!(batch_size, 3);
            assert!(cause.contains("rate limited"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(embedder.embed(&["a"]).await.unwrap_err().is_transient());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn deadline_turns_into_embedding_unavailable() {
    let embedder =
        Embedder::new(Arc::new(StalledEmbedder), 4).with_timeout(Some(Duration::from_secs(2)));
    let err = embedder.embed(&["slow"]).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingUnavailable { batch_size: 1, .. }));
    assert!(err.to_string().contains("deadline"));
}

#[tokio::test]
async fn missing_vectors_are_reported() {
    let embedder = Embedder::new(Arc::new(ShortEmbedder), 4);
    let err = embedder.embed(&["a", "b"]).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingUnavailable { batch_size: 2, .. }));
}

#[tokio::test]
async fn empty_input_makes_no_request() {
    let provider = HashEmbedder::new();
    let embedder = Embedder::new(provider.clone(), 4);
    assert!(embedder.embed(&[]).await.unwrap().is_empty());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn non_finite_provider_output_is_unavailable() {
    let vectors = vec![vec![1.0, 0.0], vec![f32::INFINITY, 0.0], vec![f32::NAN, 1.0]];
    let embedder = Embedder::new(Arc::new(FixedEmbedder { vectors }), 4);

    assert!(embedder.embed(&["0"]).await.is_ok());
    for text in ["1", "2"] {
        let err = embedder.embed(&["0", text]).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingUnavailable { batch_size: 2, .. }), "{err:?}");
        assert!(err.to_string().contains("non-finite"));
    }
}
