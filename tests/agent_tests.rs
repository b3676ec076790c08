use async_trait::async_trait;
use futures_util::StreamExt;
use groupchat::agent::AssistantAgent;
use groupchat::client_wrapper::{ClientWrapper, CompletionOptions, Message, Role, TokenUsage};
use groupchat::event::{AgentEvent, EventHandler};
use groupchat::orchestration::{GroupChat, OrchestrationError};
use groupchat::participant::Participant;
use groupchat::selector::SelectionPolicy;
use groupchat::termination::TerminationCondition;
use groupchat::tool_protocol::{
    ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol, ToolRegistry, ToolResult,
};
use groupchat::tool_protocols::{AgentDirectoryProtocol, CustomToolProtocol};
use groupchat::transcript::{ChatMessage, MessageKind, Transcript};
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// Plays back canned replies and records every request.
struct MockClient {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
    usage: Mutex<Option<TokenUsage>>,
}

impl MockClient {
    fn new(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| r.to_string()).collect()),
            requests: Mutex::new(Vec::new()),
            usage: Mutex::new(None),
        })
    }

    fn request(&self, index: usize) -> Vec<Message> {
        self.requests.lock().unwrap()[index].clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(
        &self,
        messages: &[Message],
        _options: &CompletionOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        self.requests.lock().unwrap().push(messages.to_vec());
        *self.usage.lock().unwrap() = Some(TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            total_tokens: 15,
        });
        let reply = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        Ok(Message::new(Role::Assistant, reply))
    }

    fn model_name(&self) -> &str {
        "mock"
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.usage)
    }
}

#[derive(Default)]
struct AgentLog {
    events: Mutex<Vec<AgentEvent>>,
}

#[async_trait]
impl EventHandler for AgentLog {
    async fn on_agent_event(&self, event: &AgentEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

async fn collect(agent: &AssistantAgent, transcript: &Transcript) -> Vec<ChatMessage> {
    agent
        .respond(transcript)
        .map(|item| item.unwrap())
        .collect()
        .await
}

async fn calculator() -> ToolRegistry {
    let local = Arc::new(CustomToolProtocol::new());
    local
        .register_tool(
            ToolMetadata::new("add", "Add two numbers")
                .with_parameter(ToolParameter::new("a", ToolParameterType::Number).required())
                .with_parameter(ToolParameter::new("b", ToolParameterType::Number).required()),
            Arc::new(|params: serde_json::Value| {
                let a = params["a"].as_f64().unwrap_or(0.0);
                let b = params["b"].as_f64().unwrap_or(0.0);
                Ok(ToolResult::success(serde_json::json!({ "sum": a + b })))
            }),
        )
        .await;
    let mut registry = ToolRegistry::empty();
    registry.add_protocol("local", local).await.unwrap();
    registry
}

#[tokio::test]
async fn context_replays_own_messages_as_assistant_turns() {
    let client = MockClient::new(&["noted"]);
    let agent = AssistantAgent::new("scientist", "Answers science questions", client.clone())
        .with_system_prompt("Be precise.");

    let mut transcript = Transcript::seeded("Why is the sky blue?");
    transcript.append(ChatMessage::new("scientist", "Rayleigh scattering."));
    transcript.append(ChatMessage::new("planner", "Explain more simply."));

    let produced = collect(&agent, &transcript).await;
    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].source, "scientist");
    assert_eq!(produced[0].content, "noted");

    let sent = client.request(0);
    let roles: Vec<Role> = sent.iter().map(|m| m.role.clone()).collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert!(sent[0]
        .content
        .starts_with("You are scientist.\nYour role: Answers science questions\n\nBe precise."));
    assert_eq!(&*sent[1].content, "user: Why is the sky blue?");
    assert_eq!(&*sent[2].content, "Rayleigh scattering.");
    assert_eq!(&*sent[3].content, "planner: Explain more simply.");
}

#[tokio::test]
async fn tool_results_are_fed_back_to_the_model() {
    let client = MockClient::new(&[
        r#"{"tool_call": {"name": "add", "parameters": {"a": 2, "b": 3}}}"#,
        "The sum is 5.",
    ]);
    let agent =
        AssistantAgent::new("math", "Does arithmetic", client.clone()).with_tools(calculator().await);

    let produced = collect(&agent, &Transcript::seeded("What is 2 + 3?")).await;

    assert_eq!(produced.len(), 1);
    assert_eq!(produced[0].content, "The sum is 5.");
    assert_eq!(client.request_count(), 2);

    let system = client.request(0)[0].content.to_string();
    assert!(system.contains("- add: Add two numbers"));
    assert!(system.contains("\"tool_call\""));

    let follow_up = client.request(1);
    let feedback = follow_up.last().unwrap();
    assert_eq!(feedback.role, Role::User);
    assert!(feedback
        .content
        .starts_with("Tool 'add' executed successfully. Result:"));
    assert!(feedback.content.contains("\"sum\": 5.0"));
}

#[tokio::test]
async fn the_tool_loop_is_capped() {
    let call = r#"{"tool_call": {"name": "add", "parameters": {"a": 1, "b": 1}}}"#;
    let client = MockClient::new(&[call, call, call]);
    let log = Arc::new(AgentLog::default());
    let agent = AssistantAgent::new("math", "Does arithmetic", client.clone())
        .with_tools(calculator().await)
        .with_max_tool_iterations(2)
        .with_event_handler(log.clone());

    let produced = collect(&agent, &Transcript::seeded("loop forever")).await;

    assert_eq!(client.request_count(), 3);
    assert!(produced[0]
        .content
        .ends_with("[Warning: Maximum tool iterations reached]"));
    assert!(log
        .events
        .lock()
        .unwrap()
        .iter()
        .any(|e| matches!(e, AgentEvent::ToolMaxIterationsReached { .. })));
}

#[tokio::test]
async fn transfer_tools_declare_a_handoff() {
    let client = MockClient::new(&[
        r#"Plan ready. {"tool_call": {"name": "transfer_to_agent_selector", "parameters": {}}}"#,
    ]);
    let log = Arc::new(AgentLog::default());
    let planner = AssistantAgent::new("planner", "Plans", client.clone())
        .with_handoffs(["agent_selector"])
        .with_event_handler(log.clone());

    assert_eq!(planner.handoffs(), &["agent_selector".to_string()]);

    let produced = collect(&planner, &Transcript::seeded("task")).await;

    assert_eq!(produced.len(), 2);
    assert_eq!(produced[0].content, "Plan ready.");
    assert_eq!(produced[1].kind, MessageKind::Control);
    assert_eq!(produced[1].handoff_target.as_deref(), Some("agent_selector"));
    assert_eq!(client.request_count(), 1);

    let system = client.request(0)[0].content.to_string();
    assert!(system.contains("- transfer_to_agent_selector: Transfer control to agent_selector."));

    let events = log.events.lock().unwrap();
    assert!(matches!(events.first(), Some(AgentEvent::TurnStarted { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        AgentEvent::HandoffDeclared { target, .. } if target == "agent_selector"
    )));
    match events.last() {
        Some(AgentEvent::TurnCompleted { tokens_used, .. }) => {
            assert_eq!(tokens_used.as_ref().map(|u| u.total_tokens), Some(15));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn undeclared_transfers_are_unknown_tools() {
    let client = MockClient::new(&[
        r#"{"tool_call": {"name": "transfer_to_ghost", "parameters": {}}}"#,
        "I'll handle it myself.",
    ]);
    let agent = AssistantAgent::new("planner", "Plans", client.clone()).with_handoffs(["critic"]);

    let produced = collect(&agent, &Transcript::seeded("task")).await;

    assert_eq!(produced.len(), 1);
    assert!(produced[0].handoff_target.is_none());
    let feedback = client.request(1).last().unwrap().content.to_string();
    assert!(feedback.contains("Tool not found: transfer_to_ghost"));
}

#[tokio::test]
async fn an_empty_reply_is_a_completion_error() {
    let agent = AssistantAgent::new("mute", "Says nothing", MockClient::new(&["   "]));

    let items: Vec<Result<ChatMessage, OrchestrationError>> =
        agent.respond(&Transcript::seeded("hello?")).collect().await;

    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(OrchestrationError::Completion(_))));
}

#[tokio::test]
async fn the_agent_directory_lists_and_runs_workers() {
    let worker_client = MockClient::new(&["The universe began with the Big Bang."]);
    let workers: Vec<Arc<dyn Participant>> = vec![Arc::new(AssistantAgent::new(
        "science_researcher",
        "Answers questions about science",
        worker_client.clone(),
    ))];
    let directory = AgentDirectoryProtocol::new(workers);

    let listed = directory
        .execute("list_agents", serde_json::json!({}))
        .await
        .unwrap();
    assert_eq!(
        listed.output,
        serde_json::json!([{
            "name": "science_researcher",
            "description": "Answers questions about science"
        }])
    );

    let ran = directory
        .execute(
            "execute_agent",
            serde_json::json!({
                "agent_name": "science_researcher",
                "initial_message": "How did the universe begin?"
            }),
        )
        .await
        .unwrap();
    assert!(ran.success);
    assert_eq!(
        ran.output,
        "science_researcher: The universe began with the Big Bang."
    );
    assert_eq!(
        &*worker_client.request(0)[1].content,
        "user: How did the universe begin?"
    );

    let missing = directory
        .execute(
            "execute_agent",
            serde_json::json!({ "agent_name": "chef", "initial_message": "cook" }),
        )
        .await
        .unwrap();
    assert!(!missing.success);
    assert_eq!(
        missing.error.as_deref(),
        Some("The specified agent does not exist: chef")
    );

    assert!(directory
        .execute("execute_agent", serde_json::json!({ "agent_name": 7 }))
        .await
        .is_err());
}

#[tokio::test]
async fn planner_and_selector_swarm_runs_to_completion() {
    let worker_client = MockClient::new(&["Big Bang, 13.8 billion years ago."]);
    let workers: Vec<Arc<dyn Participant>> = vec![Arc::new(AssistantAgent::new(
        "science_researcher",
        "Answers questions about science",
        worker_client,
    ))];
    let mut directory = ToolRegistry::empty();
    directory
        .add_protocol("agents", Arc::new(AgentDirectoryProtocol::new(workers)))
        .await
        .unwrap();

    let planner_client = MockClient::new(&[
        r#"{"tool_call": {"name": "transfer_to_agent_selector"}}"#,
        "Summary: the universe began with the Big Bang. [TERMINATE]",
    ]);
    let selector_client = MockClient::new(&[
        r#"{"tool_call": {"name": "execute_agent", "parameters": {"agent_name": "science_researcher", "initial_message": "How did the universe begin?"}}}"#,
        r#"Results are in. {"tool_call": {"name": "transfer_to_planner"}}"#,
    ]);

    let planner = AssistantAgent::new("planner", "Plans the work", planner_client.clone())
        .with_handoffs(["agent_selector"]);
    let agent_selector =
        AssistantAgent::new("agent_selector", "Calls other agents", selector_client.clone())
            .with_tools(directory)
            .with_handoffs(["planner"]);

    let chat = GroupChat::new("swarm", "Swarm")
        .with_participant(Arc::new(planner))
        .unwrap()
        .with_participant(Arc::new(agent_selector))
        .unwrap()
        .with_selection(SelectionPolicy::handoff("planner"))
        .with_termination(
            TerminationCondition::max_messages(100)
                | TerminationCondition::text_mention("[TERMINATE]"),
        );

    let result = chat.run("Summarise the origin of the universe").await.unwrap();

    assert_eq!(result.speakers, vec!["planner", "agent_selector", "planner"]);
    assert_eq!(result.reason.as_str(), "text_mention");

    let rendered: Vec<String> = result.messages().iter().map(|m| m.render()).collect();
    assert_eq!(
        rendered,
        vec![
            "user: Summarise the origin of the universe".to_string(),
            "planner: Transferred to agent_selector, adopting the role of agent_selector immediately."
                .to_string(),
            "agent_selector: Results are in.".to_string(),
            "agent_selector: Transferred to planner, adopting the role of planner immediately."
                .to_string(),
            "planner: Summary: the universe began with the Big Bang. [TERMINATE]".to_string(),
        ]
    );

    let feedback = selector_client.request(1).last().unwrap().content.to_string();
    assert!(feedback.starts_with("Tool 'execute_agent' executed successfully."));
    assert!(feedback.contains("science_researcher: Big Bang, 13.8 billion years ago."));

    // The planner's second turn sees the handoff back as a user message.
    let second = planner_client.request(1);
    assert_eq!(
        &*second.last().unwrap().content,
        "agent_selector: Transferred to planner, adopting the role of planner immediately."
    );
}
