use futures_util::stream;
use groupchat::orchestration::{GroupChat, OrchestrationError, TerminationReason};
use groupchat::participant::{Participant, ResponseStream};
use groupchat::selector::{MissingHandoff, SelectionPolicy};
use groupchat::termination::TerminationCondition;
use groupchat::transcript::{ChatMessage, MessageKind, Transcript};
use std::sync::Arc;

/// Says one line per turn, then hands off to each id in `transfers` (in order).
struct Relay {
    id: &'static str,
    line: &'static str,
    transfers: Vec<&'static str>,
    declared: Vec<String>,
}

impl Relay {
    fn new(id: &'static str, line: &'static str) -> Self {
        Self {
            id,
            line,
            transfers: Vec::new(),
            declared: Vec::new(),
        }
    }

    /// Hands off to `target` and declares it.
    fn to(mut self, target: &'static str) -> Self {
        self.transfers.push(target);
        self.declared.push(target.to_string());
        self
    }

    /// Hands off to `target` without declaring it up front.
    fn sneaking_to(mut self, target: &'static str) -> Self {
        self.transfers.push(target);
        self
    }
}

impl Participant for Relay {
    fn id(&self) -> &str {
        self.id
    }

    fn description(&self) -> &str {
        "relay"
    }

    fn respond<'a>(&'a self, _transcript: &'a Transcript) -> ResponseStream<'a> {
        let mut messages: Vec<Result<ChatMessage, OrchestrationError>> =
            vec![Ok(ChatMessage::new(self.id, self.line))];
        messages.extend(
            self.transfers
                .iter()
                .map(|target| Ok(ChatMessage::handoff(self.id, *target))),
        );
        Box::pin(stream::iter(messages))
    }

    fn handoffs(&self) -> &[String] {
        &self.declared
    }
}

fn team(members: Vec<Relay>) -> GroupChat {
    members
        .into_iter()
        .try_fold(GroupChat::new("swarm", "Swarm"), |chat, relay| {
            chat.with_participant(Arc::new(relay))
        })
        .unwrap()
}

fn handoff(entry: &str, on_missing: MissingHandoff) -> SelectionPolicy {
    SelectionPolicy::HandoffBased {
        entry: entry.to_string(),
        on_missing,
    }
}

#[tokio::test]
async fn control_follows_the_handoff_chain() {
    let chat = team(vec![
        Relay::new("a", "starting").to("b"),
        Relay::new("b", "middle").to("c"),
        Relay::new("c", "finished"),
    ])
    .with_selection(handoff("a", MissingHandoff::Terminate))
    .with_termination(TerminationCondition::max_messages(50));

    let result = chat.run("relay race").await.unwrap();

    assert_eq!(result.speakers, vec!["a", "b", "c"]);
    assert_eq!(result.reason, TerminationReason::NoActor);

    let handoffs: Vec<(&str, &str)> = result
        .messages()
        .iter()
        .filter(|m| m.kind == MessageKind::Control)
        .map(|m| (m.source.as_str(), m.handoff_target.as_deref().unwrap_or("")))
        .collect();
    assert_eq!(handoffs, vec![("a", "b"), ("b", "c")]);
    assert_eq!(result.transcript().len(), 6);
}

#[tokio::test]
async fn a_missing_handoff_returns_to_the_previous_actor() {
    let chat = team(vec![
        Relay::new("planner", "please research").to("researcher"),
        Relay::new("researcher", "findings"),
    ])
    .with_selection(SelectionPolicy::handoff("planner"))
    .with_termination(TerminationCondition::max_messages(6));

    let result = chat.run("task").await.unwrap();

    // seed + (text, handoff) + text + (text, handoff)
    assert_eq!(result.speakers, vec!["planner", "researcher", "planner"]);
    assert_eq!(result.transcript().len(), 6);
    assert_eq!(result.reason.as_str(), "max_messages");
}

#[tokio::test]
async fn the_entry_actor_has_nobody_to_return_to() {
    let chat = team(vec![Relay::new("solo", "done already")])
        .with_selection(SelectionPolicy::handoff("solo"))
        .with_termination(TerminationCondition::max_messages(10));

    let result = chat.run("task").await.unwrap();

    assert_eq!(result.speakers, vec!["solo"]);
    assert_eq!(result.reason, TerminationReason::NoActor);
}

#[tokio::test]
async fn the_last_handoff_of_a_turn_wins() {
    let chat = team(vec![
        Relay::new("a", "changing my mind").to("b").to("c"),
        Relay::new("b", "unused"),
        Relay::new("c", "picked"),
    ])
    .with_selection(handoff("a", MissingHandoff::Terminate))
    .with_termination(TerminationCondition::max_messages(20));

    let result = chat.run("task").await.unwrap();

    assert_eq!(result.speakers, vec!["a", "c"]);
}

#[tokio::test]
async fn an_unknown_successor_fails_the_run() {
    let chat = team(vec![Relay::new("a", "over to you").sneaking_to("ghost")])
        .with_selection(SelectionPolicy::handoff("a"))
        .with_termination(TerminationCondition::max_messages(20));

    let result = chat.run("task").await.unwrap();

    assert_eq!(
        result.reason,
        TerminationReason::Failed(OrchestrationError::Selection("ghost".to_string()))
    );
    // The turn that declared the bad handoff is kept.
    assert_eq!(result.transcript().len(), 3);
}

#[tokio::test]
async fn an_unknown_successor_goes_to_the_fallback() {
    let chat = team(vec![
        Relay::new("a", "over to you").sneaking_to("ghost"),
        Relay::new("coordinator", "I'll take it"),
    ])
    .with_selection(handoff("a", MissingHandoff::Terminate))
    .with_termination(TerminationCondition::max_messages(20))
    .with_fallback("coordinator");

    let result = chat.run("task").await.unwrap();

    assert_eq!(result.speakers, vec!["a", "coordinator"]);
    assert_eq!(result.reason, TerminationReason::NoActor);
}

#[tokio::test]
async fn declared_handoffs_are_validated_up_front() {
    let chat = team(vec![Relay::new("a", "hi").to("nobody")])
        .with_selection(SelectionPolicy::handoff("a"))
        .with_termination(TerminationCondition::max_messages(5));

    match chat.run("task").await {
        Err(OrchestrationError::Configuration(msg)) => assert!(msg.contains("nobody")),
        other => panic!("unexpected {:?}", other),
    }
}

#[tokio::test]
async fn the_entry_must_be_on_the_team() {
    let chat = team(vec![Relay::new("a", "hi")])
        .with_selection(SelectionPolicy::handoff("z"))
        .with_termination(TerminationCondition::max_messages(5));

    assert!(matches!(
        chat.validate(),
        Err(OrchestrationError::Configuration(_))
    ));
}

#[tokio::test]
async fn text_mention_still_applies_in_handoff_mode() {
    let chat = team(vec![
        Relay::new("a", "working").to("b"),
        Relay::new("b", "[TERMINATE]").to("a"),
    ])
    .with_selection(SelectionPolicy::handoff("a"))
    .with_termination(
        TerminationCondition::max_messages(100) | TerminationCondition::text_mention("[TERMINATE]"),
    );

    let result = chat.run("task").await.unwrap();

    assert_eq!(result.speakers, vec!["a", "b"]);
    assert_eq!(result.reason.as_str(), "text_mention");
}
