//! Grounded answer composition.
//!
//! The [`AnswerComposer`] turns retrieved [`QueryResult`]s into a two-message
//! chat request: a [`Persona`] system message carrying the grounding and
//! citation rules, and a user message holding the labeled context blocks
//! followed by the question.
//!
//! Composition never fails. With no retrieved context the chat model is not
//! called and the answer is a fixed reply in the persona's [`Language`]; a
//! chat failure becomes an [`Answer`] whose text includes the cause.
//!
//! # Example
//!
//! ```rust,ignore
//! use grove_rag::{AnswerComposer, Persona};
//!
//! let composer = AnswerComposer::new(chat).with_sampling(0.3, 800);
//! let answer = composer.compose_answer("How does the forest survive?", &results, &Persona::default()).await;
//! println!("{answer}");
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::chat::{ChatMessage, ChatModel, ChatRequest};
use crate::document::QueryResult;
use crate::error::{RagError, Result};
use crate::tokenizer::Tokenizer;

const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 800;

// ── Language ───────────────────────────────────────────────────────

/// Language of the prompt scaffolding and the fixed replies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// English.
    #[default]
    English,
    /// Brazilian Portuguese.
    Portuguese,
}

struct Labels {
    you_are: &'static str,
    characteristics: &'static str,
    instructions: &'static str,
    ground_rule: &'static str,
    cite_rule: &'static str,
    question: &'static str,
    context: &'static str,
    sources: &'static str,
}

impl Language {
    /// The reply used when retrieval found nothing.
    pub fn no_context_reply(self) -> &'static str {
        match self {
            Language::English => {
                "Sorry, I could not find relevant information to answer your question."
            }
            Language::Portuguese => {
                "Desculpe, não encontrei informações relevantes para responder sua pergunta."
            }
        }
    }

    /// The reply used when generation failed with `cause`.
    pub fn generation_error(self, cause: &str) -> String {
        match self {
            Language::English => format!("Error generating the answer: {cause}"),
            Language::Portuguese => format!("Erro ao gerar resposta: {cause}"),
        }
    }

    fn answer_as(self, name: &str) -> String {
        match self {
            Language::English => {
                format!("Answer as {name}, relying exclusively on the information provided.")
            }
            Language::Portuguese => {
                format!("Responda como {name}, baseando-se exclusivamente nas informações fornecidas.")
            }
        }
    }

    fn labels(self) -> Labels {
        match self {
            Language::English => Labels {
                you_are: "You are",
                characteristics: "CHARACTERISTICS",
                instructions: "INSTRUCTIONS",
                ground_rule: "Answer ONLY from the supplied sources",
                cite_rule: "Cite the source identifier in brackets, e.g. [report.pdf], for every fact you use",
                question: "Question",
                context: "Relevant context",
                sources: "Sources",
            },
            Language::Portuguese => Labels {
                you_are: "Você é",
                characteristics: "CARACTERÍSTICAS",
                instructions: "INSTRUÇÕES",
                ground_rule: "Responda APENAS com base nas fontes fornecidas",
                cite_rule: "Cite o identificador da fonte entre colchetes, ex. [relatorio.pdf], para cada fato utilizado",
                question: "Pergunta",
                context: "Contexto relevante",
                sources: "Fontes",
            },
        }
    }
}

impl FromStr for Language {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "pt" | "pt-br" | "portuguese" => Ok(Language::Portuguese),
            other => Err(RagError::Config(format!("unsupported language '{other}'"))),
        }
    }
}

// ── Persona ────────────────────────────────────────────────────────

/// Who the model speaks as, and how.
///
/// The grounding rule and the citation rule are always part of the system
/// prompt; `instructions` add to them and cannot remove them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Display name, e.g. "Dr. Ana Souza".
    pub name: String,
    /// One or two sentences of background.
    #[serde(default)]
    pub description: String,
    /// Tone and expertise bullet points.
    #[serde(default)]
    pub characteristics: Vec<String>,
    /// Extra behavior rules.
    #[serde(default)]
    pub instructions: Vec<String>,
    /// Language of the scaffolding and fixed replies.
    #[serde(default)]
    pub language: Language,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "a research assistant".to_string(),
            description: "You answer questions about the user's documents.".to_string(),
            characteristics: vec!["Precise and concise".to_string()],
            instructions: vec!["Say so plainly when the sources do not cover the question".to_string()],
            language: Language::English,
        }
    }
}

impl Persona {
    /// Start building a persona named `name`.
    pub fn builder(name: impl Into<String>) -> PersonaBuilder {
        PersonaBuilder {
            persona: Persona {
                name: name.into(),
                description: String::new(),
                characteristics: Vec::new(),
                instructions: Vec::new(),
                language: Language::English,
            },
        }
    }

    /// Charles Frewen ("Dr_C"), an Anglo-Brazilian biodiversity specialist
    /// who answers in Portuguese.
    pub fn dr_c() -> Self {
        Self {
            name: "Charles Frewen (Dr_C)".to_string(),
            description: "Especialista anglo-brasileiro em biodiversidade com mais de 30 anos \
                          de experiência na Amazônia."
                .to_string(),
            characteristics: [
                "Formado no Eton College",
                "Pioneiro em unir conservação com viabilidade econômica",
                "Tom inspirador mas pragmático",
                "Defende que \"a floresta só sobreviverá se for economicamente viável\"",
                "Foca em cuidar das pessoas que vivem na Amazônia",
            ]
            .map(String::from)
            .to_vec(),
            instructions: [
                "Use tom pessoal como se fosse realmente Charles Frewen",
                "Conecte sempre conservação com economia",
                "Cite experiências práticas quando relevante",
                "Seja específico e objetivo",
            ]
            .map(String::from)
            .to_vec(),
            language: Language::Portuguese,
        }
    }

    /// Look up a built-in persona by name: `default` or `dr_c`.
    pub fn preset(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "default" => Some(Self::default()),
            "dr_c" => Some(Self::dr_c()),
            _ => None,
        }
    }

    /// Render the system message.
    pub fn system_prompt(&self) -> String {
        let labels = self.language.labels();
        let mut prompt = format!("{} {}.", labels.you_are, self.name);
        if !self.description.trim().is_empty() {
            prompt.push(' ');
            prompt.push_str(self.description.trim());
        }

        if !self.characteristics.is_empty() {
            prompt.push_str(&format!("\n\n{}:", labels.characteristics));
            for item in &self.characteristics {
                prompt.push_str(&format!("\n- {item}"));
            }
        }

        prompt.push_str(&format!("\n\n{}:", labels.instructions));
        prompt.push_str(&format!("\n- {}", labels.ground_rule));
        prompt.push_str(&format!("\n- {}", labels.cite_rule));
        for item in &self.instructions {
            prompt.push_str(&format!("\n- {item}"));
        }
        prompt
    }
}

/// Builder for [`Persona`].
#[derive(Debug, Clone)]
pub struct PersonaBuilder {
    persona: Persona,
}

impl PersonaBuilder {
    /// Set the background description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.persona.description = description.into();
        self
    }

    /// Add a characteristic.
    pub fn characteristic(mut self, item: impl Into<String>) -> Self {
        self.persona.characteristics.push(item.into());
        self
    }

    /// Add an instruction.
    pub fn instruction(mut self, item: impl Into<String>) -> Self {
        self.persona.instructions.push(item.into());
        self
    }

    /// Set the language.
    pub fn language(mut self, language: Language) -> Self {
        self.persona.language = language;
        self
    }

    /// Finish the persona.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if the name is blank.
    pub fn build(self) -> Result<Persona> {
        if self.persona.name.trim().is_empty() {
            return Err(RagError::Config("persona name must not be empty".to_string()));
        }
        Ok(self.persona)
    }
}

// ── Answer ─────────────────────────────────────────────────────────

/// How an [`Answer`] came about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerOutcome {
    /// The chat model produced the text.
    Generated,
    /// Nothing was retrieved; the text is the fixed no-context reply.
    NoContext,
    /// The chat model failed; the text is a readable error.
    Failed {
        /// The underlying cause.
        cause: String,
    },
}

/// A composed answer with the sources it was grounded on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    /// The answer body.
    pub text: String,
    /// Distinct source identifiers of the context blocks sent, in rank order.
    pub sources: Vec<String>,
    /// How the text was produced.
    pub outcome: AnswerOutcome,
    /// Language used for the rendered footer.
    pub language: Language,
}

impl Answer {
    /// Whether the chat model produced the text.
    pub fn is_generated(&self) -> bool {
        self.outcome == AnswerOutcome::Generated
    }
}

/// Renders the body followed by a `Sources:` footer for generated answers.
impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        if self.is_generated() && !self.sources.is_empty() {
            let label = self.language.labels().sources;
            write!(f, "\n\n{label}: {}", self.sources.join(", "))?;
        }
        Ok(())
    }
}

// ── Composer ───────────────────────────────────────────────────────

struct ContextBudget {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
}

/// Builds grounded prompts and calls a [`ChatModel`].
pub struct AnswerComposer {
    chat: Arc<dyn ChatModel>,
    temperature: f32,
    max_output_tokens: u32,
    timeout: Option<Duration>,
    budget: Option<ContextBudget>,
}

impl AnswerComposer {
    /// Create a composer with temperature 0.3 and an 800-token answer limit.
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self {
            chat,
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            timeout: None,
            budget: None,
        }
    }

    /// Set the sampling parameters.
    pub fn with_sampling(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Fail the chat call after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Limit the context blocks to `max_tokens` as counted by `tokenizer`.
    ///
    /// Blocks are admitted whole in rank order; the first block that would
    /// overflow the budget ends the context. The top-ranked block is always
    /// admitted.
    pub fn with_context_budget(mut self, tokenizer: Arc<dyn Tokenizer>, max_tokens: usize) -> Self {
        self.budget = Some(ContextBudget { tokenizer, max_tokens });
        self
    }

    /// The leading results that fit the context budget.
    pub fn select_context<'r>(&self, results: &'r [QueryResult]) -> &'r [QueryResult] {
        let Some(budget) = &self.budget else {
            return results;
        };
        let mut used = 0;
        let mut admitted = 0;
        for result in results {
            let cost = budget.tokenizer.count(&context_block(result));
            if admitted > 0 && used + cost > budget.max_tokens {
                break;
            }
            if admitted == 0 && cost > budget.max_tokens {
                warn!(
                    source_id = %result.record.source_id,
                    tokens = cost,
                    budget = budget.max_tokens,
                    "top-ranked segment exceeds context budget; sending it alone"
                );
            }
            used += cost;
            admitted += 1;
        }
        if admitted < results.len() {
            debug!(admitted, dropped = results.len() - admitted, used, "context budget reached");
        }
        &results[..admitted]
    }

    /// Build the chat request for `query` grounded on `results`.
    ///
    /// Returns the request and the distinct source ids it cites.
    pub fn build_request(
        &self,
        query: &str,
        results: &[QueryResult],
        persona: &Persona,
    ) -> (ChatRequest, Vec<String>) {
        let admitted = self.select_context(results);
        let labels = persona.language.labels();
        let context =
            admitted.iter().map(context_block).collect::<Vec<_>>().join("\n\n");
        let user = format!(
            "{}: {query}\n\n{}:\n{context}\n\n{}",
            labels.question,
            labels.context,
            persona.language.answer_as(&persona.name)
        );

        let request = ChatRequest {
            messages: vec![ChatMessage::system(persona.system_prompt()), ChatMessage::user(user)],
            temperature: self.temperature,
            max_output_tokens: self.max_output_tokens,
        };
        (request, distinct_sources(admitted))
    }

    /// Compose an answer for `query` from `results`.
    ///
    /// Never fails: empty `results` yields the no-context reply without
    /// calling the chat model, and a chat failure yields a readable error.
    pub async fn compose_answer(
        &self,
        query: &str,
        results: &[QueryResult],
        persona: &Persona,
    ) -> Answer {
        let language = persona.language;
        if results.is_empty() {
            debug!("no retrieved context; skipping chat model");
            return Answer {
                text: language.no_context_reply().to_string(),
                sources: Vec::new(),
                outcome: AnswerOutcome::NoContext,
                language,
            };
        }

        let (request, sources) = self.build_request(query, results, persona);
        match self.complete(&request).await {
            Ok(text) => {
                debug!(provider = self.chat.name(), sources = sources.len(), "composed answer");
                Answer { text, sources, outcome: AnswerOutcome::Generated, language }
            }
            Err(e) => {
                error!(provider = self.chat.name(), error = %e, "answer generation failed");
                let cause = e.to_string();
                Answer {
                    text: language.generation_error(&cause),
                    sources: Vec::new(),
                    outcome: AnswerOutcome::Failed { cause },
                    language,
                }
            }
        }
    }

    /// Compose an answer and render it with its sources footer.
    pub async fn compose(&self, query: &str, results: &[QueryResult], persona: &Persona) -> String {
        self.compose_answer(query, results, persona).await.to_string()
    }

    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        let call = self.chat.complete(request);
        let text = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                RagError::ChatUnavailable {
                    provider: self.chat.name().to_string(),
                    cause: format!("deadline of {limit:?} exceeded"),
                }
            })??,
            None => call.await?,
        };
        if text.trim().is_empty() {
            return Err(RagError::ChatUnavailable {
                provider: self.chat.name().to_string(),
                cause: "model returned an empty completion".to_string(),
            });
        }
        Ok(text)
    }
}

impl fmt::Debug for AnswerComposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnswerComposer")
            .field("chat", &self.chat.model_id())
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("timeout", &self.timeout)
            .field("context_budget", &self.budget.as_ref().map(|b| b.max_tokens))
            .finish()
    }
}

fn context_block(result: &QueryResult) -> String {
    format!("[{}]\n{}", result.record.source_id, result.record.context_text())
}

fn distinct_sources(results: &[QueryResult]) -> Vec<String> {
    let mut seen = HashSet::new();
    results
        .iter()
        .filter(|r| seen.insert(r.record.source_id.as_str()))
        .map(|r| r.record.source_id.clone())
        .collect()
}
