//! OpenAI embeddings and chat completions over `reqwest`.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::chat::{ChatMessage, ChatModel, ChatRequest};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const PROVIDER: &str = "OpenAI";

/// Largest number of inputs the embeddings endpoint accepts per request.
const MAX_EMBEDDING_INPUTS: usize = 2048;

/// Native output size of the known embedding models.
fn native_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

/// A client for the OpenAI embeddings and chat-completions endpoints.
///
/// Implements both [`EmbeddingProvider`] and [`ChatModel`], so one client
/// can be shared by the build and query paths. The base URL can point at
/// any OpenAI-compatible server.
///
/// # Configuration
///
/// - `embedding_model` – defaults to `text-embedding-3-small`.
/// - `chat_model` – defaults to `gpt-4o-mini`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
/// - `base_url` – from [`with_base_url`](Self::with_base_url) or `OPENAI_BASE_URL`.
///
/// # Example
///
/// ```rust,ignore
/// use grove_rag::openai::OpenAIClient;
///
/// let client = OpenAIClient::from_env()?.with_chat_model("gpt-4o");
/// let vector = client.embed("hello world").await?;
/// ```
#[derive(Clone)]
pub struct OpenAIClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    embedding_model: String,
    chat_model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIClient {
    /// Create a new client with the given API key.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Config("OpenAI API key must not be empty".into()));
        }

        let embedding_model = "text-embedding-3-small".to_string();
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            dimensions: native_dimensions(&embedding_model),
            embedding_model,
            chat_model: "gpt-4o-mini".to_string(),
            request_dimensions: None,
        })
    }

    /// Create a new client from `OPENAI_API_KEY` and, if set, `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::Config("OPENAI_API_KEY environment variable not set".into())
        })?;
        let client = Self::new(api_key)?;
        Ok(match std::env::var("OPENAI_BASE_URL") {
            Ok(url) if !url.trim().is_empty() => client.with_base_url(url),
            _ => client,
        })
    }

    /// Point the client at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the embedding model (e.g. `text-embedding-3-large`).
    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        if self.request_dimensions.is_none() {
            self.dimensions = native_dimensions(&self.embedding_model);
        }
        self
    }

    /// Set the chat model (e.g. `gpt-4o`).
    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// POST `body` to `path` and decode the JSON reply, mapping failures with `fail`.
    async fn post<B, R>(&self, path: &str, body: &B, fail: impl Fn(String) -> RagError) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, path, error = %e, "request failed");
                fail(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, path, %status, "API error");
            return Err(fail(format!("API returned {status}: {detail}")));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, path, error = %e, "failed to parse response");
            fail(format!("failed to parse response: {e}"))
        })
    }
}

impl std::fmt::Debug for OpenAIClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAIClient")
            .field("base_url", &self.base_url)
            .field("embedding_model", &self.embedding_model)
            .field("chat_model", &self.chat_model)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIClient {
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.embedding_model,
            "embedding batch"
        );

        let request_body = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let fail = |cause| RagError::EmbeddingUnavailable {
            provider: PROVIDER.into(),
            batch_size: texts.len(),
            cause,
        };
        let mut response: EmbeddingResponse =
            self.post("embeddings", &request_body, fail).await?;

        // The API tags each vector with its input index.
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }

    fn name(&self) -> &str {
        PROVIDER
    }

    fn max_batch_size(&self) -> usize {
        MAX_EMBEDDING_INPUTS
    }
}

// ── ChatModel implementation ───────────────────────────────────────

#[async_trait]
impl ChatModel for OpenAIClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.chat_model,
            message_count = request.messages.len(),
            "requesting completion"
        );

        let request_body = CompletionRequest {
            model: &self.chat_model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_output_tokens,
        };
        let fail = |cause| RagError::ChatUnavailable { provider: PROVIDER.into(), cause };
        let response: CompletionResponse =
            self.post("chat/completions", &request_body, fail).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| fail("API returned no choices".into()))
    }

    fn model_id(&self) -> &str {
        &self.chat_model
    }

    fn name(&self) -> &str {
        PROVIDER
    }
}
