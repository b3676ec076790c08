//! # groupchat
//!
//! Turn orchestration for teams of LLM-backed agents. A team shares one transcript; at every
//! step the engine decides who speaks next, appends what they say and checks whether the task is
//! done.
//!
//! Two coordination models are supported:
//!
//! * **Selector-driven** ([`SelectionPolicy::PromptBased`], [`SelectionPolicy::FunctionBased`]):
//!   a model prompt or a plain Rust rule picks the next speaker from the whole roster.
//! * **Handoff-driven** ([`SelectionPolicy::HandoffBased`]): each participant names its own
//!   successor by calling a `transfer_to_<id>` tool.
//!
//! Runs stop when a composable [`TerminationCondition`] fires (message cap, mention of a token,
//! wall-clock timeout, and `&`/`|` combinations of those), when no participant is selected, or
//! when a turn fails. The transcript is always returned, whatever the reason.
//!
//! ## Building blocks
//!
//! * [`transcript`]: append-only message log shared by the team.
//! * [`termination`]: stop conditions and their per-run evaluators.
//! * [`participant`]: the [`Participant`] trait and the [`Roster`].
//! * [`selector`]: speaker selection policies.
//! * [`orchestration`]: the [`GroupChat`] engine, [`run_orchestration`] and the error taxonomy.
//! * [`agent`]: [`AssistantAgent`], a participant backed by a [`ClientWrapper`] with tools.
//! * [`tool_protocol`] / [`tool_protocols`]: tool registry, closures as tools and the agent
//!   directory used for delegation.
//! * [`clients`]: an OpenAI-compatible [`ClientWrapper`].
//! * [`event`]: lifecycle callbacks.
//! * [`config`]: [`TeamConfig`] defaults and environment loading.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use groupchat::{
//!     AssistantAgent, CoordinatorSelector, GroupChat, PromptSelector, SelectionPolicy, TeamConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     groupchat::init_logger();
//!
//!     let config = TeamConfig::from_env()?;
//!     let client = Arc::new(config.client()?);
//!
//!     let selector = CoordinatorSelector::new("planner", Arc::new(PromptSelector::new(client.clone())));
//!
//!     let chat = GroupChat::new("weather", "Weather desk")
//!         .with_selection(SelectionPolicy::function_based(selector))
//!         .with_termination(config.termination()?)
//!         .with_participant(Arc::new(AssistantAgent::new(
//!             "planner",
//!             "Plans the work and says [TERMINATE] when done",
//!             client.clone(),
//!         )))?
//!         .with_participant(Arc::new(AssistantAgent::new(
//!             "forecaster",
//!             "Answers questions about the weather",
//!             client,
//!         )))?;
//!
//!     let result = chat.run("Will it rain in Lisbon tomorrow?").await?;
//!     println!("{}", result.transcript().render_history());
//!     println!("stopped: {}", result.reason);
//!     Ok(())
//! }
//! ```

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// Applications that already install a logger should skip this; the crate only talks to the
/// `log` facade.
///
/// ```rust
/// groupchat::init_logger();
/// groupchat::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        // A host application may have installed its own logger already.
        let _ = env_logger::try_init();
    });
}

pub mod groupchat;

// Re-exporting key items for easier external access.
pub use groupchat::agent;
pub use groupchat::agent::AssistantAgent;
pub use groupchat::client_wrapper;
pub use groupchat::client_wrapper::{ClientWrapper, CompletionOptions, Message, Role, TokenUsage};
pub use groupchat::clients;
pub use groupchat::config;
pub use groupchat::config::TeamConfig;
pub use groupchat::event;
pub use groupchat::event::{AgentEvent, EventHandler, OrchestrationEvent};
pub use groupchat::orchestration;
pub use groupchat::orchestration::{
    run_orchestration, GroupChat, OrchestrationError, RunItem, RunResult, RunState, RunStream,
    TerminationReason,
};
pub use groupchat::participant;
pub use groupchat::participant::{Participant, ResponseStream, Roster};
pub use groupchat::selector;
pub use groupchat::selector::{
    CoordinatorSelector, FnSelector, MissingHandoff, PromptSelector, SelectionPolicy,
    SelectorPrompt, SpeakerSelector, StructuredSelector,
};
pub use groupchat::termination;
pub use groupchat::termination::{StopCause, TerminationCondition, TerminationState};
pub use groupchat::tool_protocol;
pub use groupchat::tool_protocols;
pub use groupchat::transcript;
pub use groupchat::transcript::{ChatMessage, MessageKind, Transcript};
