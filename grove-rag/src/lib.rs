//! # grove-rag
//!
//! Retrieval-augmented question answering over a small document corpus.
//!
//! Documents are split into overlapping token windows, embedded into
//! unit-length vectors and kept in a [`Corpus`] that pairs an exact
//! inner-product [`VectorIndex`] with a parallel [`MetadataStore`]. Queries
//! retrieve the most similar segments and an [`AnswerComposer`] asks a chat
//! model to answer from those segments only, citing their sources.
//!
//! ## Features
//!
//! - **Token-window chunking**: `cl100k_base` by default, any [`Tokenizer`] pluggable
//! - **Ordered batch embedding**: sub-batches, bounded concurrency, deadlines
//! - **Exact search**: brute-force inner product with stable tie-breaking
//! - **Checked persistence**: vectors and metadata saved as a pair and
//!   verified by checksum on load
//! - **Grounded answers**: no context means no model call
//!
//! Cargo features: `pdf` (default, lopdf text extraction), `openai`
//! (OpenAI embeddings and chat), `hf-tokenizer` (HuggingFace tokenizers),
//! `full`.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use grove_rag::{Persona, RagConfig, RagPipeline, openai::OpenAIClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = Arc::new(OpenAIClient::from_env()?);
//!     let pipeline = RagPipeline::builder()
//!         .config(RagConfig::default())
//!         .embedding_provider(client.clone())
//!         .chat_model(client)
//!         .build()?;
//!
//!     let (corpus, _report) = pipeline.build_corpus_from_paths(&["report.pdf".into()]).await?;
//!     corpus.save("corpus")?;
//!     let answer = pipeline.ask(&corpus, "How does the forest survive?", &Persona::default()).await?;
//!     println!("{answer}");
//!     Ok(())
//! }
//! ```

pub mod chat;
pub mod chunking;
pub mod composer;
pub mod config;
pub mod corpus;
pub mod document;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod metadata;
pub mod pipeline;
pub mod retriever;
pub mod tokenizer;

#[cfg(feature = "openai")]
pub mod openai;

pub use chat::{ChatMessage, ChatModel, ChatRequest, Role};
pub use chunking::{Chunker, TokenChunker};
pub use composer::{Answer, AnswerComposer, AnswerOutcome, Language, Persona, PersonaBuilder};
pub use config::{RagConfig, RagConfigBuilder};
pub use corpus::{Corpus, CorpusHandle, CorpusStats};
pub use document::{Document, MetadataRecord, QueryResult, Segment};
pub use embedding::{Embedder, EmbeddingProvider};
pub use error::{RagError, Result};
pub use extract::{Extraction, ExtractionWarning, PlainTextExtractor, TextExtractor, extract_path};
pub use index::{Hit, VectorIndex};
pub use metadata::MetadataStore;
pub use pipeline::{BuildReport, DocumentReport, RagPipeline, RagPipelineBuilder};
pub use retriever::Retriever;
pub use tokenizer::{TiktokenTokenizer, Tokenizer};

#[cfg(feature = "pdf")]
pub use extract::PdfExtractor;
#[cfg(feature = "hf-tokenizer")]
pub use tokenizer::HfTokenizer;
