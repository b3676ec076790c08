//! Handoff team with a delegating selector agent.
//!
//! `planner` drafts a plan and hands off to `agent_selector`, which discovers three research
//! agents through the agent directory tools, runs the ones it needs and hands the results back.
//! The planner replies `[TERMINATE]` once every part of the task is covered.
//!
//! ```text
//! export OPENAI_API_KEY=sk-...
//! RUST_LOG=groupchat=info cargo run --example handoff_team
//! ```

use futures_util::StreamExt;
use groupchat::tool_protocol::ToolRegistry;
use groupchat::tool_protocols::AgentDirectoryProtocol;
use groupchat::{AssistantAgent, GroupChat, Participant, RunItem, SelectionPolicy, TeamConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    groupchat::init_logger();

    let config = TeamConfig::from_env()?;
    let client = Arc::new(config.client()?);

    let workers: Vec<Arc<dyn Participant>> = vec![
        Arc::new(
            AssistantAgent::new(
                "science_researcher",
                "Answers questions about science",
                client.clone(),
            )
            .with_system_prompt("You are a science researcher. Answer questions about science."),
        ),
        Arc::new(
            AssistantAgent::new(
                "philosophy_researcher",
                "Answers questions about philosophy",
                client.clone(),
            )
            .with_system_prompt(
                "You are a philosophy researcher. Answer questions about philosophy.",
            ),
        ),
        Arc::new(
            AssistantAgent::new(
                "anime_researcher",
                "Answers questions about anime",
                client.clone(),
            )
            .with_system_prompt("You are an anime researcher. Answer questions about anime."),
        ),
    ];

    let mut directory = ToolRegistry::empty();
    directory
        .add_protocol("agents", Arc::new(AgentDirectoryProtocol::new(workers)))
        .await?;

    let planner = AssistantAgent::new(
        "planner",
        "Plans how to satisfy the request and coordinates the other agents",
        client.clone(),
    )
    .with_system_prompt(
        "Make a plan and a task list for the user's request.\n\
         Hand the tasks to agent_selector, which can run specialist agents.\n\
         When every task is done, reply with a summary followed by [TERMINATE].",
    )
    .with_handoffs(["agent_selector"]);

    let agent_selector = AssistantAgent::new(
        "agent_selector",
        "Calls the specialist agents",
        client,
    )
    .with_system_prompt(
        "Use list_agents to see which agents exist, then execute_agent to run the ones that \
         match the planner's tasks. Hand the results back to the planner.",
    )
    .with_tools(directory)
    .with_handoffs(["planner"]);

    let chat = Arc::new(
        GroupChat::new("swarm", "Planner and selector")
            .with_selection(SelectionPolicy::handoff("planner"))
            .with_termination(config.termination()?)
            .with_participant(Arc::new(planner))?
            .with_participant(Arc::new(agent_selector))?,
    );

    let task = "Summarise what we know about the universe from three angles:\n\
                * how it came to be\n\
                * the philosophical view of the universe\n\
                * anime about space";

    let mut items = chat.run_stream(task);
    while let Some(item) = items.next().await {
        match item {
            RunItem::Message(message) => println!("{}\n", message.render()),
            RunItem::Finished(outcome) => {
                let result = outcome?;
                println!("--- {} turns, stopped: {}", result.turns, result.reason);
            }
        }
    }

    Ok(())
}
