//! Deterministic providers shared by the integration tests.

#![allow(dead_code)]

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use grove_rag::{
    ChatModel, ChatRequest, Document, EmbeddingProvider, RagConfig, RagError, RagPipeline, Result,
};

pub const HASH_MODEL: &str = "hash-embedding";
pub const HASH_DIM: usize = 64;

/// Bag-of-words embedder: each lowercase word adds one to a hashed bucket.
///
/// Texts that share words get a positive inner product, which is enough for
/// retrieval tests to be predictable.
#[derive(Debug, Default)]
pub struct HashEmbedder {
    pub calls: AtomicUsize,
    pub texts_seen: AtomicUsize,
}

impl HashEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn hash_vector(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; HASH_DIM];
    for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % HASH_DIM as u64) as usize] += 1.0;
    }
    vector
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts_seen.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| hash_vector(t)).collect())
    }

    fn dimensions(&self) -> usize {
        HASH_DIM
    }

    fn model_id(&self) -> &str {
        HASH_MODEL
    }

    fn name(&self) -> &str {
        "hash"
    }
}

/// Always fails, counting how often it was asked.
#[derive(Debug, Default)]
pub struct FailingEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(RagError::Config("rate limited".into()))
    }

    fn dimensions(&self) -> usize {
        HASH_DIM
    }

    fn model_id(&self) -> &str {
        HASH_MODEL
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Returns `[1, n]` for a text `"t{n}"`, and finishes later batches first.
#[derive(Debug, Default)]
pub struct ReversingEmbedder;

#[async_trait]
impl EmbeddingProvider for ReversingEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let first: u64 = texts[0].trim_start_matches('t').parse().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(200u64.saturating_sub(first * 10))).await;
        Ok(texts
            .iter()
            .map(|t| vec![1.0, t.trim_start_matches('t').parse::<f32>().unwrap_or(0.0)])
            .collect())
    }

    fn dimensions(&self) -> usize {
        2
    }

    fn model_id(&self) -> &str {
        "reversing"
    }
}

/// Never answers within any reasonable deadline.
#[derive(Debug, Default)]
pub struct StalledEmbedder;

#[async_trait]
impl EmbeddingProvider for StalledEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(texts.iter().map(|_| vec![1.0]).collect())
    }

    fn dimensions(&self) -> usize {
        1
    }

    fn model_id(&self) -> &str {
        "stalled"
    }
}

/// Replies with a fixed completion and records every request.
#[derive(Debug)]
pub struct ScriptedChat {
    reply: std::result::Result<String, String>,
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChat {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self { reply: Ok(reply.to_string()), requests: Mutex::new(Vec::new()) })
    }

    pub fn failing(cause: &str) -> Arc<Self> {
        Arc::new(Self { reply: Err(cause.to_string()), requests: Mutex::new(Vec::new()) })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ChatRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(cause) => {
                Err(RagError::ChatUnavailable { provider: "scripted".into(), cause: cause.clone() })
            }
        }
    }

    fn model_id(&self) -> &str {
        "scripted-chat"
    }
}

/// Config whose embedding model matches [`HashEmbedder`].
pub fn hash_config() -> RagConfig {
    RagConfig::builder().embedding_model(HASH_MODEL).build().unwrap()
}

/// A pipeline over [`HashEmbedder`] with `chat` for composition.
pub fn pipeline_with(
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatModel>,
    config: RagConfig,
) -> RagPipeline {
    RagPipeline::builder()
        .config(config)
        .embedding_provider(embedder)
        .chat_model(chat)
        .build()
        .unwrap()
}

pub fn forest_document() -> Document {
    Document::new("forest.pdf", "The forest survives through sustainable economics.")
}
