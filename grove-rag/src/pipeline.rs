//! RAG pipeline orchestrator.
//!
//! The [`RagPipeline`] wires a [`Tokenizer`], a [`Chunker`], an [`Embedder`]
//! and an optional [`ChatModel`] together and runs both phases of the
//! workflow:
//!
//! - build: extract → chunk → embed → [`Corpus`]
//! - query: embed → search → metadata lookup → [`AnswerComposer`]
//!
//! The pipeline holds no corpus itself. The application owns the
//! [`Corpus`] (or a [`CorpusHandle`]) and passes it in.
//!
//! # Example
//!
//! ```rust,ignore
//! use grove_rag::{Document, Persona, RagConfig, RagPipeline};
//!
//! let pipeline = RagPipeline::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(openai.clone()))
//!     .chat_model(Arc::new(openai))
//!     .build()?;
//!
//! let (corpus, report) = pipeline.build_corpus(&documents).await?;
//! let answer = pipeline.ask(&corpus, "How does the forest survive?", &Persona::default()).await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::chat::ChatModel;
use crate::chunking::{Chunker, TokenChunker};
use crate::composer::{Answer, AnswerComposer, Persona};
use crate::config::RagConfig;
use crate::corpus::{Corpus, CorpusHandle};
use crate::document::{Document, MetadataRecord, QueryResult, Segment};
use crate::embedding::{Embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::extract::{ExtractionWarning, extract_path, source_id_for};
use crate::retriever::Retriever;
use crate::tokenizer::{TiktokenTokenizer, Tokenizer};

/// Segment count for one ingested document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentReport {
    /// Identifier of the document.
    pub source_id: String,
    /// Number of segments it contributed.
    pub segment_count: usize,
}

/// Summary of a build or append.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    /// Per-document segment counts, in input order.
    pub documents: Vec<DocumentReport>,
    /// Units skipped during extraction.
    pub warnings: Vec<ExtractionWarning>,
    /// Total segments added.
    pub segment_count: usize,
}

/// The RAG pipeline orchestrator.
///
/// Construct one via [`RagPipeline::builder()`].
pub struct RagPipeline {
    config: RagConfig,
    tokenizer: Arc<dyn Tokenizer>,
    chunker: Arc<dyn Chunker>,
    embedder: Embedder,
    chat_model: Option<Arc<dyn ChatModel>>,
}

impl RagPipeline {
    /// Create a new [`RagPipelineBuilder`].
    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Return a reference to the pipeline configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedder.
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Return a reference to the tokenizer.
    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Build a new corpus from `documents`.
    ///
    /// Segments of every document are embedded together; the corpus is
    /// only assembled once all vectors are in hand, so a failure leaves
    /// nothing behind.
    ///
    /// # Errors
    ///
    /// - [`RagError::EmptyCorpus`] if no document yields a non-blank
    ///   segment; the embedder is not called
    /// - [`RagError::EmbeddingUnavailable`] if any embedding request fails
    pub async fn build_corpus(&self, documents: &[Document]) -> Result<(Corpus, BuildReport)> {
        let mut corpus = Corpus::new(self.embedder.provider().model_id());
        let report = self.append_documents(&mut corpus, documents).await?;
        Ok((corpus, report))
    }

    /// Extract the files at `paths` and build a corpus from them.
    ///
    /// Unreadable files and pages are skipped and listed in
    /// [`BuildReport::warnings`].
    pub async fn build_corpus_from_paths(
        &self,
        paths: &[PathBuf],
    ) -> Result<(Corpus, BuildReport)> {
        let (documents, warnings) = extract_documents(paths).await;
        let (corpus, mut report) = self.build_corpus(&documents).await?;
        report.warnings = warnings;
        Ok((corpus, report))
    }

    /// Add `documents` to an existing corpus.
    ///
    /// The corpus is only touched after every new segment is embedded, so
    /// on error it is exactly as before.
    ///
    /// # Errors
    ///
    /// As [`build_corpus`](Self::build_corpus), plus [`RagError::Config`] if
    /// the corpus was built with another embedding model and
    /// [`RagError::DimensionMismatch`] if the new vectors do not fit.
    pub async fn append_documents(
        &self,
        corpus: &mut Corpus,
        documents: &[Document],
    ) -> Result<BuildReport> {
        corpus.ensure_model(self.embedder.provider().model_id())?;

        let mut report = BuildReport::default();
        let mut segments: Vec<(&str, Segment)> = Vec::new();
        for document in documents {
            let chunks = self.chunker.chunk(&document.text)?;
            info!(document.id = %document.id, segment_count = chunks.len(), "segmented document");
            report.documents.push(DocumentReport {
                source_id: document.id.clone(),
                segment_count: chunks.len(),
            });
            segments.extend(chunks.into_iter().map(|s| (document.id.as_str(), s)));
        }

        if segments.is_empty() {
            error!(document_count = documents.len(), "no usable segments; nothing to embed");
            return Err(RagError::EmptyCorpus);
        }

        let texts: Vec<&str> = segments.iter().map(|(_, s)| s.text.as_str()).collect();
        let vectors = self.embedder.embed(&texts).await.inspect_err(|e| {
            error!(segment_count = texts.len(), error = %e, "embedding failed; discarding build");
        })?;

        let records: Vec<MetadataRecord> = segments
            .iter()
            .map(|(source_id, segment)| {
                MetadataRecord::from_segment(
                    source_id,
                    segment,
                    self.config.preview_chars,
                    self.config.store_full_text,
                )
            })
            .collect();

        corpus.append(vectors, records)?;
        report.segment_count = segments.len();
        info!(
            document_count = documents.len(),
            segment_count = report.segment_count,
            corpus_size = corpus.len(),
            "appended documents"
        );
        Ok(report)
    }

    /// Extract the files at `paths` and add them to `corpus`.
    pub async fn append_paths(&self, corpus: &mut Corpus, paths: &[PathBuf]) -> Result<BuildReport> {
        let (documents, warnings) = extract_documents(paths).await;
        let mut report = self.append_documents(corpus, &documents).await?;
        report.warnings = warnings;
        Ok(report)
    }

    /// Replace the corpus behind `handle` with one built from `documents`.
    ///
    /// Holds the handle exclusively for the whole build, so concurrent
    /// queries fail with [`RagError::CorpusRebuilding`]. On error the old
    /// corpus stays in place.
    pub async fn rebuild(&self, handle: &CorpusHandle, documents: &[Document]) -> Result<BuildReport> {
        let mut guard = handle.write().await;
        let (corpus, report) = self.build_corpus(documents).await?;
        *guard = corpus;
        Ok(report)
    }

    /// Append `documents` to the corpus behind `handle`, holding it exclusively.
    pub async fn append(&self, handle: &CorpusHandle, documents: &[Document]) -> Result<BuildReport> {
        let mut guard = handle.write().await;
        self.append_documents(&mut guard, documents).await
    }

    /// A retriever over `corpus` using the configured `top_k`.
    pub fn retriever<'a>(&'a self, corpus: &'a Corpus) -> Retriever<'a> {
        Retriever::new(corpus, &self.embedder, self.config.top_k)
    }

    /// An answer composer using the configured chat model and sampling.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if no chat model was configured.
    pub fn composer(&self) -> Result<AnswerComposer> {
        let chat = self
            .chat_model
            .clone()
            .ok_or_else(|| RagError::Config("chat_model is required to compose answers".into()))?;
        let composer = AnswerComposer::new(chat)
            .with_sampling(self.config.temperature, self.config.max_output_tokens)
            .with_timeout(self.config.request_timeout);
        Ok(match self.config.max_context_tokens {
            Some(budget) => composer.with_context_budget(self.tokenizer.clone(), budget),
            None => composer,
        })
    }

    /// Retrieve `top_k` segments for `query` from the corpus behind `handle`.
    ///
    /// # Errors
    ///
    /// Fails fast with [`RagError::CorpusRebuilding`] during a build.
    pub async fn search(&self, handle: &CorpusHandle, query: &str) -> Result<Vec<QueryResult>> {
        let corpus = handle.read()?;
        self.retriever(&corpus).retrieve(query).await
    }

    /// Retrieve context for `query` and compose a grounded answer.
    ///
    /// # Errors
    ///
    /// Retrieval errors propagate ([`RagError::EmptyQuery`],
    /// [`RagError::EmbeddingUnavailable`], ...). Chat failures do not: they
    /// come back as an [`Answer`] with a failed outcome.
    pub async fn ask(&self, corpus: &Corpus, query: &str, persona: &Persona) -> Result<Answer> {
        let composer = self.composer()?;
        let results = self.retriever(corpus).retrieve(query).await?;
        Ok(composer.compose_answer(query, &results, persona).await)
    }

    /// [`ask`](Self::ask) against the corpus behind `handle`.
    pub async fn ask_handle(
        &self,
        handle: &CorpusHandle,
        query: &str,
        persona: &Persona,
    ) -> Result<Answer> {
        let corpus = handle.read()?;
        self.ask(&corpus, query, persona).await
    }
}

async fn extract_documents(paths: &[PathBuf]) -> (Vec<Document>, Vec<ExtractionWarning>) {
    let mut documents = Vec::with_capacity(paths.len());
    let mut warnings = Vec::new();
    for path in paths {
        let extraction = extract_path(path).await;
        let source_id = source_id_for(path);
        warnings.extend(extraction.warnings.iter().cloned());
        if extraction.is_empty() {
            warn!(document.id = %source_id, "document contributed no text");
            continue;
        }
        info!(document.id = %source_id, units = extraction.units, "extracted document");
        documents.push(Document::new(source_id, extraction.text));
    }
    (documents, warnings)
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("config", &self.config)
            .field("tokenizer", &self.tokenizer.name())
            .field("embedder", &self.embedder)
            .field("chat_model", &self.chat_model.as_ref().map(|c| c.model_id().to_string()))
            .finish()
    }
}

/// Builder for constructing a [`RagPipeline`].
///
/// Only the embedding provider is required. The tokenizer defaults to
/// `cl100k_base`, the chunker to a [`TokenChunker`] sized from the config,
/// and the config to [`RagConfig::default()`].
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = RagPipeline::builder()
///     .config(config)
///     .embedding_provider(Arc::new(embedder))
///     .chat_model(Arc::new(chat))      // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RagPipelineBuilder {
    config: Option<RagConfig>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    chunker: Option<Arc<dyn Chunker>>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    chat_model: Option<Arc<dyn ChatModel>>,
}

impl RagPipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the tokenizer used for chunking and context budgeting.
    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Replace the default token-window chunker.
    pub fn chunker(mut self, chunker: Arc<dyn Chunker>) -> Self {
        self.chunker = Some(chunker);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the chat model used to compose answers.
    pub fn chat_model(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat_model = Some(chat);
        self
    }

    /// Build the [`RagPipeline`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the embedding provider is missing, the
    /// config is invalid, or the provider's model differs from
    /// `config.embedding_model`. Returns [`RagError::Tokenizer`] if the
    /// default tokenizer cannot be loaded.
    pub fn build(self) -> Result<RagPipeline> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let provider = self
            .embedding_provider
            .ok_or_else(|| RagError::Config("embedding_provider is required".to_string()))?;
        if provider.model_id() != config.embedding_model {
            return Err(RagError::Config(format!(
                "embedding provider serves '{}', config expects '{}'",
                provider.model_id(),
                config.embedding_model
            )));
        }

        let tokenizer: Arc<dyn Tokenizer> = match self.tokenizer {
            Some(tokenizer) => tokenizer,
            None => Arc::new(TiktokenTokenizer::cl100k()?),
        };
        let chunker = self.chunker.unwrap_or_else(|| {
            Arc::new(TokenChunker::new(tokenizer.clone(), config.max_tokens, config.overlap_tokens))
        });
        let embedder = Embedder::new(provider, config.embedding_batch_size)
            .with_max_concurrent(config.max_concurrent_batches)
            .with_timeout(config.request_timeout);

        Ok(RagPipeline { config, tokenizer, chunker, embedder, chat_model: self.chat_model })
    }
}
