//! Embedding capability and the batching/normalizing [`Embedder`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error};

use crate::error::{RagError, Result};

/// Added to the L2 norm before dividing so an all-zero vector stays finite.
pub const NORMALIZATION_EPSILON: f32 = 1e-12;

/// A provider that turns text into fixed-dimension vectors.
///
/// Implementations wrap a concrete embedding backend. Every vector that will
/// ever live in one corpus must come from the same [`model_id`](Self::model_id);
/// vectors from different models are silently incompatible.
///
/// # Example
///
/// ```rust,ignore
/// use grove_rag::EmbeddingProvider;
///
/// let vectors = provider.embed_batch(&["hello", "world"]).await?;
/// assert_eq!(vectors[0].len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, returning one vector per text in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    ///
    /// The default implementation sends a one-element batch.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text]).await?;
        vectors.pop().ok_or_else(|| RagError::EmbeddingUnavailable {
            provider: self.name().to_string(),
            batch_size: 1,
            cause: "provider returned no vector".to_string(),
        })
    }

    /// Dimensionality of the vectors this provider returns.
    fn dimensions(&self) -> usize;

    /// Identifier of the embedding model.
    fn model_id(&self) -> &str;

    /// Short provider name used in errors and logs.
    fn name(&self) -> &str {
        "embedding"
    }

    /// Largest batch the backend accepts in one request.
    fn max_batch_size(&self) -> usize {
        2048
    }
}

/// L2-normalize `vector` in place, dividing by `norm + epsilon`.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    let scale = 1.0 / (norm + NORMALIZATION_EPSILON);
    vector.iter_mut().for_each(|x| *x *= scale);
}

/// Turns texts into unit-length vectors through an [`EmbeddingProvider`].
///
/// Requests larger than the batch size are split into sub-batches. Up to
/// `max_concurrent` sub-batches are in flight at once; results are joined by
/// sub-batch index, so output order always matches input order. Failures are
/// not retried here: they surface as [`RagError::EmbeddingUnavailable`] and
/// the caller decides what to do.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    max_concurrent: usize,
    timeout: Option<Duration>,
}

impl Embedder {
    /// Wrap a provider, sending at most `batch_size` texts per request.
    ///
    /// The effective batch size never exceeds the provider's own limit.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        let batch_size = batch_size.clamp(1, provider.max_batch_size().max(1));
        Self { provider, batch_size, max_concurrent: 1, timeout: None }
    }

    /// Allow up to `n` sub-batches to be in flight at once.
    pub fn with_max_concurrent(mut self, n: usize) -> Self {
        self.max_concurrent = n.max(1);
        self
    }

    /// Fail any sub-batch that takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Effective sub-batch size.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Embed `texts`, returning one normalized vector per text in input order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingUnavailable`] if any sub-batch fails, times
    /// out, or returns the wrong number of vectors, and
    /// [`RagError::DimensionMismatch`] if the provider returns vectors of
    /// inconsistent dimension. A vector with a NaN or infinite component is
    /// reported as [`RagError::EmbeddingUnavailable`].
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = self.provider.name(),
            model = self.provider.model_id(),
            text_count = texts.len(),
            batch_size = self.batch_size,
            "embedding texts"
        );

        // `buffered` yields in submission order regardless of completion order.
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(self.batch_size))
            .map(|batch| self.embed_sub_batch(batch))
            .buffered(self.max_concurrent)
            .try_collect()
            .await?;

        let mut vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
        let dimension = vectors[0].len();
        for vector in &mut vectors {
            if vector.len() != dimension {
                return Err(RagError::DimensionMismatch { expected: dimension, actual: vector.len() });
            }
            if vector.iter().any(|x| !x.is_finite()) {
                let cause = "provider returned non-finite values".to_string();
                return Err(self.unavailable(texts.len(), cause));
            }
            normalize(vector);
        }
        Ok(vectors)
    }

    /// Embed a single query text.
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text]).await?;
        vectors.pop().ok_or_else(|| self.unavailable(1, "provider returned no vector".into()))
    }

    async fn embed_sub_batch(&self, batch: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = self.provider.embed_batch(batch);
        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(self.unavailable(
                        batch.len(),
                        format!("deadline of {limit:?} exceeded"),
                    ));
                }
            },
            None => request.await,
        };

        let vectors = result.map_err(|e| {
            error!(provider = self.provider.name(), batch_size = batch.len(), error = %e, "embedding request failed");
            match e {
                RagError::EmbeddingUnavailable { .. } => e,
                other => self.unavailable(batch.len(), other.to_string()),
            }
        })?;

        if vectors.len() != batch.len() {
            return Err(self.unavailable(
                batch.len(),
                format!("provider returned {} vectors for {} texts", vectors.len(), batch.len()),
            ));
        }
        Ok(vectors)
    }

    fn unavailable(&self, batch_size: usize, cause: String) -> RagError {
        RagError::EmbeddingUnavailable {
            provider: self.provider.name().to_string(),
            batch_size,
            cause,
        }
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider.name())
            .field("model", &self.provider.model_id())
            .field("batch_size", &self.batch_size)
            .field("max_concurrent", &self.max_concurrent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_vector() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn normalize_keeps_zero_vector_finite() {
        let mut v = vec![0.0; 4];
        normalize(&mut v);
        assert!(v.iter().all(|x| x.is_finite() && *x == 0.0));
    }
}
