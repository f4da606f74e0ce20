//! Query-time lookup: embed the query, search the index, attach metadata.

use tracing::{debug, error};

use crate::corpus::Corpus;
use crate::document::QueryResult;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};

/// Answers top-k similarity queries against a borrowed [`Corpus`].
///
/// The retriever never mutates the corpus, so any number of retrievers can
/// share one corpus.
#[derive(Debug, Clone)]
pub struct Retriever<'a> {
    corpus: &'a Corpus,
    embedder: &'a Embedder,
    top_k: usize,
}

impl<'a> Retriever<'a> {
    /// Create a retriever returning `top_k` results by default.
    pub fn new(corpus: &'a Corpus, embedder: &'a Embedder, top_k: usize) -> Self {
        Self { corpus, embedder, top_k }
    }

    /// The default number of results.
    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve the configured number of results for `query`.
    pub async fn retrieve(&self, query: &str) -> Result<Vec<QueryResult>> {
        self.retrieve_with_k(query, self.top_k).await
    }

    /// Retrieve the `k` segments most similar to `query`, best first.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyQuery`] for an empty or whitespace-only query; the
    ///   embedder is not called
    /// - [`RagError::Config`] if `k == 0` or the embedder's model differs
    ///   from the corpus model
    /// - [`RagError::EmbeddingUnavailable`] if the query cannot be embedded
    /// - [`RagError::Inconsistent`] if a hit has no metadata record
    pub async fn retrieve_with_k(&self, query: &str, k: usize) -> Result<Vec<QueryResult>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if k == 0 {
            return Err(RagError::Config("k must be greater than zero".to_string()));
        }
        self.corpus.ensure_model(self.embedder.provider().model_id())?;

        let query_vector = self.embedder.embed_one(query).await.map_err(|e| {
            error!(error = %e, "embedding failed during query");
            e
        })?;

        let hits = self.corpus.index().search(&query_vector, k)?;
        let results = hits
            .into_iter()
            .map(|hit| {
                let record = self.corpus.record(hit.position)?;
                Ok(QueryResult {
                    record: record.clone(),
                    similarity_score: hit.score,
                    position: hit.position,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(k, result_count = results.len(), "retrieved segments");
        Ok(results)
    }
}
