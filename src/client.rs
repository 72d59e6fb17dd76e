//! the completion capability the turn controller calls, and its `llm`
//! crate implementation.

use crate::config::ClientSettings;
use crate::message::{Message, Role};
use bevy::log::debug;
use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::{ChatMessage, ChatProvider};
use llm::error::LLMError;

/// everything that can go wrong between sending a request and getting text
/// back. all of it is recoverable at the turn level.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompletionError {
    /// network, auth, quota or model errors reported by the provider.
    #[error("completion provider error: {0}")]
    Provider(String),
    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
    /// the worker driving the request went away before answering.
    #[error("completion worker failed: {0}")]
    Worker(String),
}

impl From<LLMError> for CompletionError {
    fn from(err: LLMError) -> Self {
        CompletionError::Provider(err.to_string())
    }
}

/// one non-streaming chat completion.
///
/// `messages` is the fully assembled request: one leading system message,
/// the history window, and the new user message.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CompletionError>;
}

/// [`CompletionClient`] backed by an `llm` provider (groq by default).
///
/// model, sampling and the system instruction change per turn, so a
/// provider is built for every call; building one is cheap and does no io.
#[derive(Clone)]
pub struct LlmCompletionClient {
    backend: LLMBackend,
    api_key: String,
    base_url: Option<String>,
}

impl LlmCompletionClient {
    pub fn new(backend: LLMBackend, api_key: impl Into<String>) -> Self {
        Self { backend, api_key: api_key.into(), base_url: None }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn from_settings(settings: &ClientSettings) -> Self {
        let client = Self::new(settings.backend.clone(), settings.api_key.clone());
        match &settings.base_url {
            Some(url) => client.with_base_url(url.clone()),
            None => client,
        }
    }
}

impl std::fmt::Debug for LlmCompletionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmCompletionClient")
            .field("backend", &self.backend)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// split assembled messages into the provider's system instruction and its
/// user/assistant chat list.
fn to_llm_messages(messages: &[Message]) -> (String, Vec<ChatMessage>) {
    let mut system = Vec::new();
    let mut chat = Vec::with_capacity(messages.len());
    for m in messages {
        match m.role() {
            Role::System => system.push(m.content()),
            Role::User => chat.push(ChatMessage::user().content(m.content()).build()),
            Role::Assistant => chat.push(ChatMessage::assistant().content(m.content()).build()),
        }
    }
    (system.join("\n\n"), chat)
}

/// the assistant text of a provider response. missing text is malformed;
/// empty text is a valid (empty) answer and is kept as-is.
fn response_text(text: Option<String>) -> Result<String, CompletionError> {
    text.ok_or_else(|| CompletionError::MalformedResponse("response carried no text".into()))
}

#[async_trait::async_trait]
impl CompletionClient for LlmCompletionClient {
    async fn complete(
        &self,
        model: &str,
        messages: &[Message],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let (system, chat) = to_llm_messages(messages);
        debug!(target: "bevy_chatbot",
            "llm complete: backend={:?} model={} msgs={} temperature={} max_tokens={}",
            self.backend, model, chat.len(), temperature, max_tokens
        );

        let mut b = LLMBuilder::new()
            .backend(self.backend.clone())
            .api_key(self.api_key.clone())
            .model(model)
            .temperature(temperature)
            .max_tokens(max_tokens);
        if let Some(url) = &self.base_url {
            b = b.base_url(url.clone());
        }
        if !system.is_empty() {
            b = b.system(system);
        }
        let provider = b.build()?;

        let resp = provider.chat(&chat).await?;
        response_text(resp.text())
    }
}
