//! Configuration for the RAG pipeline.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RagError, Result};

/// Configuration parameters consumed by the core pipeline.
///
/// Deserializes from JSON with every field optional; missing fields take
/// their [`Default`] values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum number of tokens per segment.
    pub max_tokens: usize,
    /// Number of tokens shared by consecutive segments.
    pub overlap_tokens: usize,
    /// Number of segments retrieved per query.
    pub top_k: usize,
    /// Embedding model identifier. Every vector in one corpus must come from this model.
    pub embedding_model: String,
    /// Chat model identifier used for answer composition.
    pub chat_model: String,
    /// Sampling temperature for answer composition.
    pub temperature: f32,
    /// Upper bound on generated answer length, in tokens.
    pub max_output_tokens: u32,
    /// Maximum number of texts sent to the embedding provider in one request.
    pub embedding_batch_size: usize,
    /// How many embedding sub-batches may be in flight at once.
    pub max_concurrent_batches: usize,
    /// Length of the citation preview, in characters.
    pub preview_chars: usize,
    /// Keep each segment's full text in the metadata store.
    ///
    /// When `false`, only the preview is stored and used as grounding
    /// context, which noticeably lowers answer quality.
    pub store_full_text: bool,
    /// Optional token budget for the grounding context block.
    pub max_context_tokens: Option<usize>,
    /// Optional deadline applied to each embedding and chat request.
    #[serde(with = "duration_secs")]
    pub request_timeout: Option<Duration>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            overlap_tokens: 50,
            top_k: 4,
            embedding_model: "text-embedding-3-small".to_string(),
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_output_tokens: 800,
            embedding_batch_size: 96,
            max_concurrent_batches: 1,
            preview_chars: 200,
            store_full_text: true,
            max_context_tokens: None,
            request_timeout: None,
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Check that the parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `max_tokens == 0`
    /// - `top_k == 0`
    /// - `embedding_batch_size == 0` or `max_concurrent_batches == 0`
    /// - `temperature` is outside `0.0..=2.0`
    /// - `max_output_tokens == 0`
    /// - a model identifier is empty
    pub fn validate(&self) -> Result<()> {
        if self.max_tokens == 0 {
            return Err(RagError::Config("max_tokens must be greater than zero".to_string()));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.embedding_batch_size == 0 {
            return Err(RagError::Config(
                "embedding_batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err(RagError::Config(
                "max_concurrent_batches must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(RagError::Config(format!(
                "temperature ({}) must be between 0.0 and 2.0",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(RagError::Config(
                "max_output_tokens must be greater than zero".to_string(),
            ));
        }
        if self.embedding_model.trim().is_empty() || self.chat_model.trim().is_empty() {
            return Err(RagError::Config("model identifiers must not be empty".to_string()));
        }
        if self.overlap_tokens >= self.max_tokens {
            warn!(
                max_tokens = self.max_tokens,
                overlap_tokens = self.overlap_tokens,
                "overlap_tokens >= max_tokens; chunker will advance one token per segment"
            );
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Start from an existing configuration, e.g. one loaded from a file.
    pub fn from_config(config: RagConfig) -> Self {
        Self { config }
    }

    /// Set the maximum segment size in tokens.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the overlap between consecutive segments in tokens.
    pub fn overlap_tokens(mut self, overlap: usize) -> Self {
        self.config.overlap_tokens = overlap;
        self
    }

    /// Set the number of segments retrieved per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the embedding model identifier.
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    /// Set the chat model identifier.
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.config.chat_model = model.into();
        self
    }

    /// Set the sampling temperature.
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.config.temperature = temperature;
        self
    }

    /// Set the maximum answer length in tokens.
    pub fn max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.config.max_output_tokens = max_output_tokens;
        self
    }

    /// Set the embedding request batch size.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set how many embedding sub-batches may run concurrently.
    pub fn max_concurrent_batches(mut self, n: usize) -> Self {
        self.config.max_concurrent_batches = n;
        self
    }

    /// Set the preview length in characters.
    pub fn preview_chars(mut self, chars: usize) -> Self {
        self.config.preview_chars = chars;
        self
    }

    /// Choose whether full segment text is stored alongside the preview.
    pub fn store_full_text(mut self, store: bool) -> Self {
        self.config.store_full_text = store;
        self
    }

    /// Set a token budget for the grounding context.
    pub fn max_context_tokens(mut self, budget: usize) -> Self {
        self.config.max_context_tokens = Some(budget);
        self
    }

    /// Set a deadline for each external embedding or chat request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = Some(timeout);
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// See [`RagConfig::validate`].
    pub fn build(self) -> Result<RagConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Serializes `Option<Duration>` as fractional seconds.
mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&d.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(deserializer)?;
        secs.map(|s| {
            Duration::try_from_secs_f64(s)
                .map_err(|e| serde::de::Error::custom(format!("invalid timeout {s}: {e}")))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_settings() {
        let config = RagConfig::default();
        assert_eq!(config.max_tokens, 500);
        assert_eq!(config.overlap_tokens, 50);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.embedding_model, "text-embedding-3-small");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_zero_top_k() {
        assert!(RagConfig::builder().top_k(0).build().is_err());
    }

    #[test]
    fn rejects_zero_max_tokens() {
        assert!(RagConfig::builder().max_tokens(0).build().is_err());
    }

    #[test]
    fn rejects_out_of_range_temperature() {
        assert!(RagConfig::builder().temperature(2.5).build().is_err());
        assert!(RagConfig::builder().temperature(-0.1).build().is_err());
    }

    #[test]
    fn accepts_overlap_not_smaller_than_max() {
        let config = RagConfig::builder().max_tokens(10).overlap_tokens(10).build().unwrap();
        assert_eq!(config.overlap_tokens, 10);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: RagConfig =
            serde_json::from_str(r#"{"top_k": 6, "request_timeout": 2.5}"#).unwrap();
        assert_eq!(config.top_k, 6);
        assert_eq!(config.max_tokens, 500);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(2500)));
    }

    #[test]
    fn out_of_range_timeout_is_an_error() {
        for raw in [r#"{"request_timeout": 1e30}"#, r#"{"request_timeout": -1}"#] {
            let err = serde_json::from_str::<RagConfig>(raw).unwrap_err();
            assert!(err.to_string().contains("invalid timeout"), "{err}");
        }
        let config: RagConfig = serde_json::from_str(r#"{"request_timeout": null}"#).unwrap();
        assert_eq!(config.request_timeout, None);
    }
}
