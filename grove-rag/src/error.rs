//! Error types for the `grove-rag` crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while building a corpus or answering a query.
///
/// Each kind is a distinct variant so callers can decide per kind whether to
/// retry, skip or abort. See [`RagError::is_transient`].
#[derive(Debug, Error)]
pub enum RagError {
    /// A single extraction unit (e.g. a PDF page) could not be read.
    ///
    /// The pipeline recovers from this locally; it only surfaces as a
    /// warning in the build report.
    #[error("Extraction failed for '{source_id}' (unit {unit}): {message}")]
    Extraction {
        /// The document the unit belongs to.
        source_id: String,
        /// One-based unit number (page number for PDFs).
        unit: usize,
        /// A description of the failure.
        message: String,
    },

    /// No usable segments remained after extraction and chunking.
    #[error("Corpus is empty: no usable segments after extraction and chunking")]
    EmptyCorpus,

    /// The embedding capability failed.
    #[error("Embedding unavailable ({provider}, batch of {batch_size}): {cause}")]
    EmbeddingUnavailable {
        /// The embedding provider that produced the error.
        provider: String,
        /// Number of texts in the batch that failed.
        batch_size: usize,
        /// The underlying cause.
        cause: String,
    },

    /// A vector did not match the dimension fixed by the index.
    #[error("Dimension mismatch: index holds {expected}-d vectors, got {actual}-d")]
    DimensionMismatch {
        /// The dimension fixed by the first insertion.
        expected: usize,
        /// The offending dimension.
        actual: usize,
    },

    /// A vector held a NaN or infinite component.
    #[error("Non-finite component in {vector}")]
    NonFiniteVector {
        /// Which vector was rejected, e.g. "vector 7" or "query".
        vector: String,
    },

    /// The query was empty or whitespace only.
    #[error("Query is empty")]
    EmptyQuery,

    /// A query was issued while the corpus is held exclusively by a build.
    #[error("Corpus is being rebuilt; retry once the build completes")]
    CorpusRebuilding,

    /// The vector index and metadata store disagree.
    ///
    /// This is never repaired automatically.
    #[error("Corpus is inconsistent: {vectors} vectors vs {records} metadata records")]
    Inconsistent {
        /// Number of vectors in the index.
        vectors: usize,
        /// Number of records in the metadata store.
        records: usize,
    },

    /// The chat-completion capability failed.
    #[error("Chat model unavailable ({provider}): {cause}")]
    ChatUnavailable {
        /// The chat provider that produced the error.
        provider: String,
        /// The underlying cause.
        cause: String,
    },

    /// A persisted corpus failed validation on load.
    #[error("Corrupt corpus at {}: {reason}", path.display())]
    CorruptCorpus {
        /// The corpus directory.
        path: PathBuf,
        /// Why the corpus was rejected.
        reason: String,
    },

    /// Tokenizer construction or decoding failed.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error while reading documents or corpus files.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A (de)serialization error for persisted metadata.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl RagError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingUnavailable { .. }
                | RagError::ChatUnavailable { .. }
                | RagError::CorpusRebuilding
        )
    }
}

/// A convenience result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;
