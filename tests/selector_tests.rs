use async_trait::async_trait;
use futures_util::stream;
use groupchat::client_wrapper::{ClientWrapper, CompletionOptions, Message, Role};
use groupchat::orchestration::{GroupChat, OrchestrationError};
use groupchat::participant::{Participant, ResponseStream, Roster};
use groupchat::selector::{
    CoordinatorSelector, PromptSelector, SelectionPolicy, SelectorPrompt, SpeakerSelector,
    StructuredSelector,
};
use groupchat::termination::TerminationCondition;
use groupchat::transcript::{ChatMessage, Transcript};
use std::collections::VecDeque;
use std::error::Error;
use std::sync::{Arc, Mutex};

/// Replies from a queue and remembers every request.
struct MockClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    options: Mutex<Vec<CompletionOptions>>,
}

impl MockClient {
    fn replying(replies: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        })
    }

    fn failing(error: &str) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from(vec![Err(error.to_string())])),
            prompts: Mutex::new(Vec::new()),
            options: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ClientWrapper for MockClient {
    async fn send_message(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        if let Some(last) = messages.last() {
            self.prompts.lock().unwrap().push(last.content.to_string());
        }
        self.options.lock().unwrap().push(options.clone());

        let next = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()));
        match next {
            Ok(text) => Ok(Message::new(Role::Assistant, text)),
            Err(error) => Err(error.into()),
        }
    }

    fn model_name(&self) -> &str {
        "mock-selector"
    }
}

struct Member {
    id: &'static str,
    description: &'static str,
}

impl Participant for Member {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        self.description
    }

    fn respond<'a>(&'a self, _transcript: &'a Transcript) -> ResponseStream<'a> {
        let reply: Result<ChatMessage, OrchestrationError> =
            Ok(ChatMessage::new(self.id, format!("{} reporting", self.id)));
        Box::pin(stream::iter(vec![reply]))
    }
}

fn team() -> Roster {
    let members: Vec<Arc<dyn Participant>> = vec![
        Arc::new(Member {
            id: "planner",
            description: "Plans the work",
        }),
        Arc::new(Member {
            id: "scientist",
            description: "Answers science questions",
        }),
    ];
    Roster::from_participants(members).unwrap()
}

fn history() -> Transcript {
    let mut transcript = Transcript::seeded("Why is the sky blue?");
    transcript.append(ChatMessage::new("planner", "scientist, explain scattering"));
    transcript
}

#[tokio::test]
async fn prompt_selector_renders_the_default_template() {
    let client = MockClient::replying(&["  scientist\n"]);
    let selector = PromptSelector::new(client.clone());

    let choice = selector.select(&team(), &history()).await.unwrap();
    assert_eq!(choice.as_deref(), Some("scientist"));

    let prompt = client.last_prompt();
    assert!(prompt.contains("planner: Plans the work\nscientist: Answers science questions"));
    assert!(prompt.contains("select the next role from planner, scientist to play"));
    assert!(prompt.contains("user: Why is the sky blue?\nplanner: scientist, explain scattering"));
    assert!(!prompt.contains("{history}"));
}

#[tokio::test]
async fn prompt_selector_trusts_the_reply_verbatim() {
    let client = MockClient::replying(&["The scientist should go next."]);
    let selector = PromptSelector::new(client);

    // Validation against the roster is the orchestrator's job.
    let choice = selector.select(&team(), &history()).await.unwrap();
    assert_eq!(choice.as_deref(), Some("The scientist should go next."));
}

#[tokio::test]
async fn templates_without_required_placeholders_are_rejected() {
    let client = MockClient::replying(&[]);
    assert!(matches!(
        PromptSelector::with_template(client.clone(), "Pick one of {participants}"),
        Err(OrchestrationError::Configuration(_))
    ));
    assert!(PromptSelector::with_template(client, "{participants}\n{history}").is_ok());
}

#[tokio::test]
async fn completion_failures_become_completion_errors() {
    let selector = PromptSelector::new(MockClient::failing("connection reset"));
    match selector.select(&team(), &history()).await {
        Err(OrchestrationError::Completion(msg)) => assert!(msg.contains("connection reset")),
        other => panic!("unexpected {:?}", other),
    }

    let blank = PromptSelector::new(MockClient::replying(&["   "]));
    assert!(matches!(
        blank.select(&team(), &history()).await,
        Err(OrchestrationError::Completion(_))
    ));
}

#[tokio::test]
async fn structured_selector_reads_the_member_field_in_json_mode() {
    let client = MockClient::replying(&[r#"{"member": "scientist", "reason": "physics"}"#]);
    let selector = StructuredSelector::new(client.clone(), SelectorPrompt::default());

    let choice = selector.select(&team(), &history()).await.unwrap();
    assert_eq!(choice.as_deref(), Some("scientist"));

    let options = client.options.lock().unwrap();
    assert!(options[0].json_mode);
    assert!(client.last_prompt().contains("{\"member\":"));
}

#[tokio::test]
async fn structured_selector_abstains_on_unusable_replies() {
    let client = MockClient::replying(&["scientist", r#"{"next": "scientist"}"#]);
    let selector = StructuredSelector::new(client, SelectorPrompt::default());

    assert_eq!(selector.select(&team(), &history()).await.unwrap(), None);
    assert_eq!(selector.select(&team(), &history()).await.unwrap(), None);
}

#[tokio::test]
async fn structured_selector_field_is_configurable() {
    let client = MockClient::replying(&[r#"{"next": "planner"}"#]);
    let selector = StructuredSelector::new(client, SelectorPrompt::default()).with_field("next");

    assert_eq!(
        selector.select(&team(), &history()).await.unwrap().as_deref(),
        Some("planner")
    );
}

#[tokio::test]
async fn coordinator_selector_falls_back_to_the_coordinator() {
    let client = MockClient::replying(&[r#"{"member": "astronaut"}"#, "not json"]);
    let selector = CoordinatorSelector::new(
        "planner",
        Arc::new(StructuredSelector::new(client.clone(), SelectorPrompt::default())),
    );

    // Someone other than the planner spoke last: no model call needed.
    let mut transcript = history();
    transcript.append(ChatMessage::new("scientist", "Rayleigh scattering"));
    assert_eq!(
        selector.select(&team(), &transcript).await.unwrap().as_deref(),
        Some("planner")
    );
    assert!(client.prompts.lock().unwrap().is_empty());

    // The planner spoke last and the model names someone outside the team.
    assert_eq!(
        selector.select(&team(), &history()).await.unwrap().as_deref(),
        Some("planner")
    );
    // The model's reply is not JSON.
    assert_eq!(
        selector.select(&team(), &history()).await.unwrap().as_deref(),
        Some("planner")
    );
    assert_eq!(client.prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn prompt_based_runs_fall_back_on_hallucinated_names() {
    let client = MockClient::replying(&["scientist", "astronaut", "scientist"]);

    let chat = GroupChat::new("desk", "Science desk")
        .with_roster(team())
        .with_selection(SelectionPolicy::prompt_based(PromptSelector::new(client)))
        .with_termination(TerminationCondition::max_messages(4))
        .with_fallback("planner");

    let result = chat.run("Why is the sky blue?").await.unwrap();

    assert_eq!(result.speakers, vec!["scientist", "planner", "scientist"]);
    assert_eq!(result.transcript().len(), 4);
}

#[tokio::test]
async fn prompt_based_runs_stop_when_the_selector_fails() {
    let chat = GroupChat::new("desk", "Science desk")
        .with_roster(team())
        .with_selection(SelectionPolicy::prompt_based(PromptSelector::new(
            MockClient::failing("rate limited"),
        )))
        .with_termination(TerminationCondition::max_messages(4));

    let result = chat.run("task").await.unwrap();

    assert_eq!(result.reason.as_str(), "completion_error");
    assert_eq!(result.transcript().len(), 1);
}
