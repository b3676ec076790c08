//! LLM-backed participant.
//!
//! An [`AssistantAgent`] is stateless between turns: every turn it rebuilds the model context
//! from the shared transcript, so one agent can sit in several group chats at once. Its own
//! earlier messages are replayed as assistant turns and everyone else's as `source: content`
//! user turns.
//!
//! During a turn the agent may call tools using the JSON convention
//! `{"tool_call": {"name": "...", "parameters": {...}}}`. Results are fed back to the model
//! until it answers without a tool call or the iteration cap is hit. Calling
//! `transfer_to_<id>` for one of the agent's configured handoff targets ends the turn and
//! appends a handoff message naming that successor.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::agent::AssistantAgent;
//! use groupchat::clients::openai::{Model, OpenAIClient};
//! use std::sync::Arc;
//!
//! let client = Arc::new(OpenAIClient::new_with_model_enum("key", Model::GPT4oMini));
//! let planner = AssistantAgent::new(
//!     "planner",
//!     "Breaks the task into steps and decides who should work on them.",
//!     client,
//! )
//! .with_system_prompt("Plan first. Say [TERMINATE] when the answer is complete.")
//! .with_handoffs(["agent_selector"]);
//! ```

use crate::groupchat::client_wrapper::{
    ClientWrapper, CompletionOptions, Message, Role, TokenUsage,
};
use crate::groupchat::event::{AgentEvent, EventHandler};
use crate::groupchat::orchestration::OrchestrationError;
use crate::groupchat::participant::{Participant, ResponseStream};
use crate::groupchat::tool_protocol::{ToolError, ToolRegistry};
use crate::groupchat::transcript::{ChatMessage, Transcript};
use futures_util::stream::{self, StreamExt};
use serde_json::Value as JsonValue;
use std::error::Error;
use std::sync::Arc;

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant collaborating with other participants in a group chat.";

const DEFAULT_MAX_TOOL_ITERATIONS: usize = 5;

const TRANSFER_PREFIX: &str = "transfer_to_";

/// A participant that answers with a language model.
pub struct AssistantAgent {
    pub id: String,
    pub description: String,
    system_prompt: String,
    client: Arc<dyn ClientWrapper>,
    tools: Option<Arc<ToolRegistry>>,
    handoffs: Vec<String>,
    max_tool_iterations: usize,
    options: CompletionOptions,
    event_handler: Option<Arc<dyn EventHandler>>,
}

struct ToolCall {
    name: String,
    parameters: JsonValue,
    /// Byte offset of the JSON fragment in the reply.
    start: usize,
}

impl AssistantAgent {
    /// Create an agent with the default system prompt, no tools and no handoffs.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            client,
            tools: None,
            handoffs: Vec::new(),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            options: CompletionOptions::default(),
            event_handler: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_tools(mut self, registry: ToolRegistry) -> Self {
        self.tools = Some(Arc::new(registry));
        self
    }

    /// Share one registry between several agents.
    pub fn with_shared_tools(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tools = Some(registry);
        self
    }

    /// Participants this agent may transfer control to.
    pub fn with_handoffs<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handoffs = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }

    pub fn with_completion_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    async fn emit(&self, event: AgentEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_agent_event(&event).await;
        }
    }

    fn system_message(&self) -> String {
        let mut prompt = format!(
            "You are {}.\nYour role: {}\n\n{}",
            self.id, self.description, self.system_prompt
        );

        let tools: Vec<_> = self
            .tools
            .as_ref()
            .map(|registry| registry.list_tools())
            .unwrap_or_default();

        if !tools.is_empty() {
            prompt.push_str("\n\nYou have access to the following tools:\n");
            for tool in &tools {
                prompt.push_str(&tool.describe());
            }
        }

        if !self.handoffs.is_empty() {
            prompt.push_str(
                "\n\nYou can hand the conversation over to another participant with these tools:\n",
            );
            for target in &self.handoffs {
                prompt.push_str(&format!(
                    "- {}{}: Transfer control to {}.\n",
                    TRANSFER_PREFIX, target, target
                ));
            }
        }

        if !tools.is_empty() || !self.handoffs.is_empty() {
            prompt.push_str(
                "\nTo use a tool, respond with a JSON object in the following format:\n\
                 {\"tool_call\": {\"name\": \"tool_name\", \"parameters\": {...}}}\n\
                 After tool execution, I'll provide the result and you can continue.\n",
            );
        }

        prompt
    }

    fn build_messages(&self, transcript: &Transcript) -> Vec<Message> {
        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(Message::new(Role::System, self.system_message()));
        for entry in transcript.all() {
            if entry.source == self.id && !entry.is_control() {
                messages.push(Message::new(Role::Assistant, &entry.content));
            } else {
                messages.push(Message::new(Role::User, entry.render()));
            }
        }
        messages
    }

    fn handoff_target(&self, tool_name: &str) -> Option<String> {
        let target = tool_name.strip_prefix(TRANSFER_PREFIX)?;
        self.handoffs
            .iter()
            .find(|h| h.as_str() == target)
            .cloned()
    }

    /// Run one turn against `transcript` and return the messages to append.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::Completion`] if a model call fails, or if the model answers with
    /// neither text nor a tool call.
    pub async fn generate(
        &self,
        transcript: &Transcript,
    ) -> Result<Vec<ChatMessage>, OrchestrationError> {
        self.emit(AgentEvent::TurnStarted {
            agent_id: self.id.clone(),
            transcript_len: transcript.len(),
        })
        .await;

        let mut messages = self.build_messages(transcript);
        let mut tool_calls_made = 0;
        let mut iteration = 0;
        let mut usage: Option<TokenUsage> = None;

        let (text, handoff) = loop {
            iteration += 1;
            self.emit(AgentEvent::LLMCallStarted {
                agent_id: self.id.clone(),
                iteration,
            })
            .await;

            let reply = self
                .client
                .send_message(&messages, &self.options)
                .await
                .map_err(|e| {
                    log::error!("AssistantAgent '{}': model call failed: {}", self.id, e);
                    OrchestrationError::Completion(format!("{}: {}", self.id, e))
                })?;

            if let Some(last) = self.client.get_last_usage() {
                let total = usage.get_or_insert_with(TokenUsage::default);
                total.input_tokens += last.input_tokens;
                total.output_tokens += last.output_tokens;
                total.total_tokens += last.total_tokens;
            }

            let content = reply.content.to_string();
            self.emit(AgentEvent::LLMCallCompleted {
                agent_id: self.id.clone(),
                iteration,
                response_length: content.len(),
            })
            .await;

            let Some(call) = parse_tool_call(&content) else {
                if content.trim().is_empty() {
                    return Err(OrchestrationError::Completion(format!(
                        "model '{}' returned no content for '{}'",
                        self.client.model_name(),
                        self.id
                    )));
                }
                break (content, None);
            };

            if let Some(target) = self.handoff_target(&call.name) {
                self.emit(AgentEvent::HandoffDeclared {
                    agent_id: self.id.clone(),
                    target: target.clone(),
                })
                .await;
                break (content[..call.start].trim().to_string(), Some(target));
            }

            if tool_calls_made >= self.max_tool_iterations {
                log::warn!(
                    "AssistantAgent '{}': tool loop stopped after {} calls",
                    self.id,
                    tool_calls_made
                );
                self.emit(AgentEvent::ToolMaxIterationsReached {
                    agent_id: self.id.clone(),
                })
                .await;
                break (
                    format!("{}\n\n[Warning: Maximum tool iterations reached]", content),
                    None,
                );
            }

            tool_calls_made += 1;
            self.emit(AgentEvent::ToolCallDetected {
                agent_id: self.id.clone(),
                tool_name: call.name.clone(),
                parameters: call.parameters.clone(),
                iteration: tool_calls_made,
            })
            .await;

            let result = match &self.tools {
                Some(registry) => registry.execute_tool(&call.name, call.parameters).await,
                None => Err(Box::new(ToolError::NotFound(call.name.clone()))
                    as Box<dyn Error + Send + Sync>),
            };

            let (feedback, success, error) = match result {
                Ok(result) if result.success => (
                    format!(
                        "Tool '{}' executed successfully. Result: {}",
                        call.name,
                        serde_json::to_string_pretty(&result.output)
                            .unwrap_or_else(|_| result.output.to_string())
                    ),
                    true,
                    None,
                ),
                Ok(result) => {
                    let err = result
                        .error
                        .unwrap_or_else(|| "Unknown error".to_string());
                    (
                        format!("Tool '{}' failed. Error: {}", call.name, err),
                        false,
                        Some(err),
                    )
                }
                Err(e) => (
                    format!("Tool execution error: {}", e),
                    false,
                    Some(e.to_string()),
                ),
            };

            self.emit(AgentEvent::ToolExecutionCompleted {
                agent_id: self.id.clone(),
                tool_name: call.name.clone(),
                success,
                error,
                iteration: tool_calls_made,
            })
            .await;

            messages.push(Message::new(Role::Assistant, &content));
            messages.push(Message::new(Role::User, feedback));
        };

        let mut produced = Vec::with_capacity(2);
        if !text.is_empty() {
            produced.push(ChatMessage::new(self.id.clone(), text.clone()));
        }
        if let Some(target) = handoff {
            produced.push(ChatMessage::handoff(self.id.clone(), target));
        }

        self.emit(AgentEvent::TurnCompleted {
            agent_id: self.id.clone(),
            tool_calls_made,
            tokens_used: usage,
            response_length: text.len(),
        })
        .await;

        Ok(produced)
    }
}

impl Participant for AssistantAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn respond<'a>(&'a self, transcript: &'a Transcript) -> ResponseStream<'a> {
        Box::pin(
            stream::once(self.generate(transcript)).flat_map(|outcome| {
                let items: Vec<Result<ChatMessage, OrchestrationError>> = match outcome {
                    Ok(messages) => messages.into_iter().map(Ok).collect(),
                    Err(err) => vec![Err(err)],
                };
                stream::iter(items)
            }),
        )
    }

    fn handoffs(&self) -> &[String] {
        &self.handoffs
    }
}

/// Locate a `{"tool_call": ...}` fragment by brace matching, ignoring braces inside strings.
fn parse_tool_call(response: &str) -> Option<ToolCall> {
    let start = response.find("{\"tool_call\"")?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (offset, ch) in response[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    end = Some(start + offset + ch.len_utf8());
                    break;
                }
            }
            _ => {}
        }
    }

    let parsed: JsonValue = serde_json::from_str(&response[start..end?]).ok()?;
    let call = parsed.get("tool_call")?;
    let name = call.get("name")?.as_str()?.to_string();
    let parameters = call
        .get("parameters")
        .cloned()
        .unwrap_or_else(|| serde_json::json!({}));

    Some(ToolCall {
        name,
        parameters,
        start,
    })
}
