//! Agent and group chat event system.
//!
//! Provides a callback-based observability layer. Implement [`EventHandler`] to receive
//! real-time notifications about:
//!
//! - **Run lifecycle**: start, state transitions, termination
//! - **Turn flow**: speaker selection, fallbacks, each appended message
//! - **LLM round-trips**: when an agent sends to and receives from its model
//! - **Tool operations**: tool call detection and execution outcomes
//! - **Handoffs**: successor declarations made by agents
//!
//! Both trait methods have default no-op implementations, so you only override what you care
//! about. Handlers are shared as `Arc<dyn EventHandler>`; registering one on a
//! [`GroupChat`](crate::orchestration::GroupChat) covers run events, and registering the same
//! handler on each [`AssistantAgent`](crate::agent::AssistantAgent) adds agent events.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::event::{AgentEvent, EventHandler, OrchestrationEvent};
//! use async_trait::async_trait;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl EventHandler for Printer {
//!     async fn on_agent_event(&self, event: &AgentEvent) {
//!         if let AgentEvent::LLMCallCompleted { agent_id, response_length, .. } = event {
//!             println!("{} answered ({} chars)", agent_id, response_length);
//!         }
//!     }
//!     async fn on_orchestration_event(&self, event: &OrchestrationEvent) {
//!         if let OrchestrationEvent::MessageAppended { message, .. } = event {
//!             println!("{}", message.render());
//!         }
//!     }
//! }
//! ```

use crate::groupchat::client_wrapper::TokenUsage;
use crate::groupchat::orchestration::{RunState, TerminationReason};
use crate::groupchat::transcript::ChatMessage;
use async_trait::async_trait;

/// Events emitted by an [`AssistantAgent`](crate::agent::AssistantAgent) while it produces a
/// turn.
///
/// ```text
/// TurnStarted
///   └─ LLMCallStarted { iteration: 1 }
///   └─ LLMCallCompleted { iteration: 1 }
///   └─ (if a tool call is detected)
///       ├─ ToolCallDetected
///       ├─ ToolExecutionCompleted
///       └─ LLMCallStarted { iteration: 2 } ...
///   └─ (if a transfer tool is called) HandoffDeclared
/// TurnCompleted
/// ```
#[derive(Debug, Clone)]
pub enum AgentEvent {
    TurnStarted {
        agent_id: String,
        /// Length of the transcript the agent is answering.
        transcript_len: usize,
    },
    TurnCompleted {
        agent_id: String,
        tool_calls_made: usize,
        /// Usage summed over every model call in the turn, when the client reports it.
        tokens_used: Option<TokenUsage>,
        response_length: usize,
    },
    /// Fired **before** each model round-trip inside the tool loop.
    LLMCallStarted {
        agent_id: String,
        /// 1-based (1 = initial call, 2+ = tool follow-ups).
        iteration: usize,
    },
    LLMCallCompleted {
        agent_id: String,
        iteration: usize,
        response_length: usize,
    },
    ToolCallDetected {
        agent_id: String,
        tool_name: String,
        parameters: serde_json::Value,
        iteration: usize,
    },
    ToolExecutionCompleted {
        agent_id: String,
        tool_name: String,
        success: bool,
        error: Option<String>,
        iteration: usize,
    },
    /// The tool loop hit its iteration cap.
    ToolMaxIterationsReached { agent_id: String },
    HandoffDeclared { agent_id: String, target: String },
}

/// Events emitted by a [`GroupChat`](crate::orchestration::GroupChat) run.
#[derive(Debug, Clone)]
pub enum OrchestrationEvent {
    RunStarted {
        run_id: String,
        chat_id: String,
        /// Selection policy name (`"PromptBased"`, `"FunctionBased"`, `"HandoffBased"`).
        policy: String,
        participant_count: usize,
    },
    StateChanged {
        run_id: String,
        state: RunState,
    },
    SpeakerSelected {
        run_id: String,
        participant_id: String,
        turn: usize,
    },
    /// An invalid selection or handoff was redirected to the fallback participant.
    SelectionFallback {
        run_id: String,
        rejected: String,
        fallback: String,
    },
    MessageAppended {
        run_id: String,
        position: usize,
        message: ChatMessage,
    },
    TurnCompleted {
        run_id: String,
        participant_id: String,
        turn: usize,
        messages_appended: usize,
    },
    RunTerminated {
        run_id: String,
        reason: TerminationReason,
        transcript_len: usize,
        turns: usize,
    },
}

/// Receives agent and orchestration events. Both methods default to no-ops.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_agent_event(&self, _event: &AgentEvent) {}

    async fn on_orchestration_event(&self, _event: &OrchestrationEvent) {}
}
