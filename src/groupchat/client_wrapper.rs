//! The text-completion capability consumed by selectors and agents.
//!
//! A [`ClientWrapper`] is a thin adapter around a specific cloud LLM service. It does not keep
//! conversation state: callers pass the full message list on every request. Agents rebuild that
//! list from the shared [`Transcript`](crate::transcript::Transcript) on each turn, and prompt
//! based selectors send a single rendered prompt through [`ClientWrapper::complete`].

use crate::groupchat::orchestration::OrchestrationError;
use async_trait::async_trait;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// Represents the possible roles for a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    // set by the developer to steer the model's responses
    System,
    // a message sent by a human user, or another participant rendered as one
    User,
    // lets the model know the content was generated by itself
    Assistant,
}

impl Role {
    /// Wire name used by OpenAI-compatible chat APIs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

/// Represents a generic message to be sent to an LLM.
#[derive(Clone, Debug)]
pub struct Message {
    /// The role associated with the message.
    pub role: Role,
    /// The actual content of the message.
    pub content: Arc<str>,
}

impl Message {
    pub fn new(role: Role, content: impl AsRef<str>) -> Self {
        Self {
            role,
            content: Arc::from(content.as_ref()),
        }
    }
}

/// Per-request knobs understood by every client.
///
/// # Examples
///
/// ```
/// use groupchat::client_wrapper::CompletionOptions;
///
/// let opts = CompletionOptions::json().with_temperature(0.0);
/// assert!(opts.json_mode);
/// assert_eq!(opts.temperature, Some(0.0));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletionOptions {
    /// Ask the provider to constrain the reply to a single JSON object.
    pub json_mode: bool,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<usize>,
}

impl CompletionOptions {
    /// Options with structured (JSON object) output enabled.
    pub fn json() -> Self {
        Self {
            json_mode: true,
            ..Self::default()
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: usize) -> Self {
        self.max_output_tokens = Some(max_output_tokens);
        self
    }
}

/// Trait defining the interface to interact with various LLM services.
#[async_trait]
pub trait ClientWrapper: Send + Sync {
    /// Send the message list to the LLM and return the assistant reply.
    ///
    /// Implementations are expected to enforce their own request deadline; the orchestrator
    /// only observes timeouts between turns.
    async fn send_message(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>>;

    /// Model identifier used for logging.
    fn model_name(&self) -> &str;

    /// Single-prompt completion.
    ///
    /// Fails with [`OrchestrationError::Completion`] when the upstream call errors or when the
    /// reply carries no content.
    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, OrchestrationError> {
        let messages = [Message::new(Role::User, prompt)];
        let reply = self
            .send_message(&messages, options)
            .await
            .map_err(|e| OrchestrationError::Completion(e.to_string()))?;

        if reply.content.trim().is_empty() {
            return Err(OrchestrationError::Completion(format!(
                "model '{}' returned no content",
                self.model_name()
            )));
        }
        Ok(reply.content.to_string())
    }

    /// Hook to retrieve usage from the *last* send_message() call.
    /// Default impl returns None so wrappers without accounting don't have to care.
    fn get_last_usage(&self) -> Option<TokenUsage> {
        self.usage_slot()
            .and_then(|slot| slot.lock().ok().and_then(|u| u.clone()))
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        // Wrappers supporting TokenUsage tracking override this.
        None
    }
}
