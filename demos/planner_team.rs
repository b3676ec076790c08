//! Selector-driven team with a planning coordinator.
//!
//! Every other turn belongs to `planner`; after the planner speaks a model picks which
//! specialist goes next. The run stops after 12 messages, when someone says `[TERMINATE]`, or
//! after the configured timeout.
//!
//! ```text
//! export OPENAI_API_KEY=sk-...
//! RUST_LOG=groupchat=debug cargo run --example planner_team
//! ```

use async_trait::async_trait;
use groupchat::selector::SelectorPrompt;
use groupchat::tool_protocol::{
    ToolMetadata, ToolParameter, ToolParameterType, ToolRegistry, ToolResult,
};
use groupchat::tool_protocols::CustomToolProtocol;
use groupchat::{
    AssistantAgent, CoordinatorSelector, EventHandler, GroupChat, OrchestrationEvent,
    SelectionPolicy, StructuredSelector, TeamConfig, TerminationCondition,
};
use std::sync::Arc;

struct Progress;

#[async_trait]
impl EventHandler for Progress {
    async fn on_orchestration_event(&self, event: &OrchestrationEvent) {
        match event {
            OrchestrationEvent::SpeakerSelected {
                participant_id,
                turn,
                ..
            } => println!("[turn {}] {}", turn, participant_id),
            OrchestrationEvent::SelectionFallback {
                rejected, fallback, ..
            } => println!("[fallback] '{}' is not on the team, using '{}'", rejected, fallback),
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    groupchat::init_logger();

    let config = TeamConfig::from_env()?;
    let client = Arc::new(config.client()?);

    let local = Arc::new(CustomToolProtocol::new());
    local
        .register_tool(
            ToolMetadata::new("word_count", "Count the words in a text").with_parameter(
                ToolParameter::new("text", ToolParameterType::String)
                    .with_description("Text to count")
                    .required(),
            ),
            Arc::new(|params: serde_json::Value| {
                let words = params["text"].as_str().unwrap_or("").split_whitespace().count();
                Ok(ToolResult::success(serde_json::json!({ "words": words })))
            }),
        )
        .await;
    let mut tools = ToolRegistry::empty();
    tools.add_protocol("local", local).await?;

    let planner = AssistantAgent::new(
        "planner",
        "Breaks the request into tasks and decides who works on them",
        client.clone(),
    )
    .with_system_prompt(
        "Plan the work and assign each task to a team member by name. \
         When the answer is complete, reply with the final summary and [TERMINATE].",
    );
    let researcher = AssistantAgent::new(
        "researcher",
        "Gathers facts and background for a task",
        client.clone(),
    );
    let editor = AssistantAgent::new(
        "editor",
        "Tightens drafts and checks their length",
        client.clone(),
    )
    .with_tools(tools);

    let prompt = SelectorPrompt::new(
        "The following team members are available:\n{roles}\n\n\
         Conversation so far:\n{history}\n\n\
         Choose the member from [{participants}] who should act on the planner's last message.",
    )?;
    let selector = CoordinatorSelector::new(
        "planner",
        Arc::new(StructuredSelector::new(client, prompt)),
    );

    let termination = TerminationCondition::max_messages(12)
        | TerminationCondition::text_mention(config.termination_text.clone())
        | TerminationCondition::timeout(config.timeout);

    let chat = GroupChat::new("planner-team", "Planner team")
        .with_selection(SelectionPolicy::function_based(selector))
        .with_termination(termination)
        .with_fallback("planner")
        .with_event_handler(Arc::new(Progress))
        .with_participant(Arc::new(planner))?
        .with_participant(Arc::new(researcher))?
        .with_participant(Arc::new(editor))?;

    let result = chat
        .run("Write a 100-word explainer on why the sky is blue.")
        .await?;

    println!();
    for message in result.messages() {
        println!("{}\n", message.render());
    }
    println!("stopped after {} turns: {}", result.turns, result.reason);
    println!("speakers: {}", result.speakers.join(" -> "));

    Ok(())
}
