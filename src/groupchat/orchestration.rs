//! Group chat orchestration engine.
//!
//! A [`GroupChat`] owns a [`Roster`] of participants, a [`SelectionPolicy`] and a
//! [`TerminationCondition`]. Each call to [`GroupChat::run`] starts a fresh [`Transcript`]
//! seeded with the task and drives it through a small state machine:
//!
//! ```text
//!            ┌──────────── check termination ◄──────────────┐
//!            ▼                                              │
//!  Running ──select──► AwaitingResponse(actor) ──append all──┘
//!     │
//!     └── stop cause / no actor / error ──► Terminated(reason)
//! ```
//!
//! # Coordination models
//!
//! - **Centralized** ([`SelectionPolicy::PromptBased`], [`SelectionPolicy::FunctionBased`]): a
//!   selector names the next speaker from the whole roster before every turn.
//! - **Handoff** ([`SelectionPolicy::HandoffBased`]): the entry participant acts first; after
//!   that the successor is whoever the previous actor handed off to
//!   ([`ChatMessage::handoff`]). A turn without a handoff follows
//!   [`MissingHandoff`](crate::selector::MissingHandoff).
//!
//! Exactly one participant acts at a time. Every message of a turn is appended, in emission
//! order, before termination is checked; termination is never checked mid-turn. A turn must
//! append at least one message; an empty turn fails the run with
//! [`OrchestrationError::Completion`]. Termination is
//! also checked once right after the task message is seeded, so `MaxMessages(1)` ends a run
//! before anyone speaks.
//!
//! # Errors
//!
//! Structural problems (empty roster, malformed termination condition, unknown fallback or
//! entry participant) are returned as `Err` before any message is appended. Problems during a
//! turn (a selection outside the roster with no fallback, a failed model call) end the run
//! with [`TerminationReason::Failed`]; the transcript accumulated so far is kept.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::agent::AssistantAgent;
//! use groupchat::clients::openai::{Model, OpenAIClient};
//! use groupchat::orchestration::GroupChat;
//! use groupchat::selector::{PromptSelector, SelectionPolicy};
//! use groupchat::termination::TerminationCondition;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async {
//! let client = Arc::new(OpenAIClient::new_with_model_enum("key", Model::GPT4oMini));
//!
//! let mut chat = GroupChat::new("research", "Research Team")
//!     .with_selection(SelectionPolicy::prompt_based(PromptSelector::new(client.clone())))
//!     .with_termination(
//!         TerminationCondition::max_messages(10)
//!             | TerminationCondition::text_mention("[TERMINATE]")
//!             | TerminationCondition::timeout(Duration::from_secs(120)),
//!     );
//!
//! chat.add_participant(Arc::new(AssistantAgent::new("planner", "Plans the work", client.clone())))?;
//! chat.add_participant(Arc::new(AssistantAgent::new("scientist", "Answers science questions", client)))?;
//!
//! let result = chat.run("Why is the sky blue?").await?;
//! for message in result.messages() {
//!     println!("{}", message.render());
//! }
//! println!("stopped: {}", result.reason);
//! # Ok::<(), groupchat::orchestration::OrchestrationError>(())
//! # };
//! ```

use crate::groupchat::event::{EventHandler, OrchestrationEvent};
use crate::groupchat::participant::{Participant, Roster};
use crate::groupchat::selector::{MissingHandoff, SelectionPolicy, SpeakerSelector};
use crate::groupchat::termination::{StopCause, TerminationCondition, TerminationState};
use crate::groupchat::transcript::{ChatMessage, Transcript, TASK_SOURCE};
use futures_util::stream::{self, Stream, StreamExt};
use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Errors raised while configuring or running a group chat.
///
/// # Examples
///
/// ```
/// use groupchat::orchestration::OrchestrationError;
///
/// let err = OrchestrationError::Selection("ghost".into());
/// assert_eq!(err.to_string(), "Selection error: 'ghost' is not a participant in this run");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrationError {
    /// A selector or handoff named an id outside the roster and no fallback is configured.
    /// Carries the offending id.
    Selection(String),

    /// The completion capability failed or returned no content.
    Completion(String),

    /// A run was started without participants.
    EmptyRoster,

    /// Malformed termination condition, selection template or run setup.
    Configuration(String),

    /// Two participants share an id.
    DuplicateParticipant(String),
}

impl fmt::Display for OrchestrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestrationError::Selection(id) => {
                write!(f, "Selection error: '{}' is not a participant in this run", id)
            }
            OrchestrationError::Completion(msg) => write!(f, "Completion error: {}", msg),
            OrchestrationError::EmptyRoster => write!(f, "Cannot start a run without participants"),
            OrchestrationError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            OrchestrationError::DuplicateParticipant(id) => {
                write!(f, "Duplicate participant id: {}", id)
            }
        }
    }
}

impl Error for OrchestrationError {}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    /// A termination condition fired.
    Condition(StopCause),
    /// The selector abstained, or a handoff-model turn ended without a successor.
    NoActor,
    /// A turn failed; the transcript up to the failure is kept.
    Failed(OrchestrationError),
}

impl TerminationReason {
    /// Short machine-friendly label.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Condition(cause) => cause.as_str(),
            TerminationReason::NoActor => "no_actor",
            TerminationReason::Failed(OrchestrationError::Selection(_)) => "selection_error",
            TerminationReason::Failed(OrchestrationError::Completion(_)) => "completion_error",
            TerminationReason::Failed(_) => "error",
        }
    }

    pub fn stop_cause(&self) -> Option<&StopCause> {
        match self {
            TerminationReason::Condition(cause) => Some(cause),
            _ => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TerminationReason::Failed(_))
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Condition(cause) => write!(f, "{}", cause),
            TerminationReason::NoActor => write!(f, "No participant selected to speak next"),
            TerminationReason::Failed(err) => write!(f, "{}", err),
        }
    }
}

/// Run state, published through [`OrchestrationEvent::StateChanged`].
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Running,
    AwaitingResponse(String),
    Terminated(TerminationReason),
}

/// Outcome of a completed run.
///
/// The transcript is only reachable through shared references (or by taking ownership with
/// [`into_transcript`](RunResult::into_transcript)); the engine never touches it again.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Unique id of the run (UUID v4), matching the ids in emitted events.
    pub run_id: String,
    pub reason: TerminationReason,
    /// Number of turns started, including one that failed.
    pub turns: usize,
    /// Speaker of every turn, in order.
    pub speakers: Vec<String>,
    transcript: Transcript,
}

impl RunResult {
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.all()
    }

    pub fn into_transcript(self) -> Transcript {
        self.transcript
    }
}

/// Items yielded by [`GroupChat::run_stream`].
#[derive(Debug)]
pub enum RunItem {
    /// A message, yielded right after it was appended (the seed task message included).
    Message(ChatMessage),
    /// Always the last item.
    Finished(Result<RunResult, OrchestrationError>),
}

pub type RunStream = Pin<Box<dyn Stream<Item = RunItem> + Send>>;

/// Mutable bookkeeping of one run.
struct Run<'o> {
    id: String,
    transcript: Transcript,
    turns: usize,
    speakers: Vec<String>,
    current: Option<String>,
    previous: Option<String>,
    /// Successor declared during the most recent turn.
    declared: Option<String>,
    observer: Option<&'o mpsc::UnboundedSender<RunItem>>,
}

/// The orchestration engine.
///
/// A `GroupChat` is configuration plus a roster; it holds no per-run state, so one instance can
/// run many tasks (concurrently, through `Arc` and [`run_stream`](GroupChat::run_stream)).
pub struct GroupChat {
    /// Stable identifier used for logging and events.
    pub id: String,

    /// Human-readable name.
    pub name: String,

    roster: Roster,

    policy: Option<SelectionPolicy>,

    termination: Option<TerminationCondition>,

    /// Participant that receives the turn when a selection or handoff names an unknown id.
    fallback: Option<String>,

    event_handler: Option<Arc<dyn EventHandler>>,
}

impl GroupChat {
    /// Create an empty group chat. A selection policy and a termination condition must be set
    /// before running.
    ///
    /// ```
    /// use groupchat::orchestration::GroupChat;
    ///
    /// let chat = GroupChat::new("qa-team", "QA Review Team");
    /// assert_eq!(chat.id, "qa-team");
    /// assert!(chat.roster().is_empty());
    /// ```
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roster: Roster::new(),
            policy: None,
            termination: None,
            fallback: None,
            event_handler: None,
        }
    }

    /// Replace the roster (builder pattern).
    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_selection(mut self, policy: SelectionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_termination(mut self, condition: TerminationCondition) -> Self {
        self.termination = Some(condition);
        self
    }

    /// Redirect invalid selections and handoffs to `participant_id` instead of failing the run.
    pub fn with_fallback(mut self, participant_id: impl Into<String>) -> Self {
        self.fallback = Some(participant_id.into());
        self
    }

    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Add a participant (builder pattern).
    pub fn with_participant(
        mut self,
        participant: Arc<dyn Participant>,
    ) -> Result<Self, OrchestrationError> {
        self.roster.add(participant)?;
        Ok(self)
    }

    /// Add a participant.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::DuplicateParticipant`] if the id is taken.
    pub fn add_participant(
        &mut self,
        participant: Arc<dyn Participant>,
    ) -> Result<(), OrchestrationError> {
        self.roster.add(participant)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn policy(&self) -> Option<&SelectionPolicy> {
        self.policy.as_ref()
    }

    /// Check the configuration without running anything.
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        self.prepare().map(|_| ())
    }

    async fn emit(&self, event: OrchestrationEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_orchestration_event(&event).await;
        }
    }

    /// Validate structure and start the termination clock.
    fn prepare(&self) -> Result<(&SelectionPolicy, TerminationState), OrchestrationError> {
        if self.roster.is_empty() {
            return Err(OrchestrationError::EmptyRoster);
        }

        let policy = self.policy.as_ref().ok_or_else(|| {
            OrchestrationError::Configuration("no selection policy configured".to_string())
        })?;
        let termination = self.termination.as_ref().ok_or_else(|| {
            OrchestrationError::Configuration("no termination condition configured".to_string())
        })?;

        if let Some(fallback) = &self.fallback {
            if !self.roster.contains(fallback) {
                return Err(OrchestrationError::Configuration(format!(
                    "fallback participant '{}' is not in the roster",
                    fallback
                )));
            }
        }

        if let SelectionPolicy::HandoffBased { entry, .. } = policy {
            if !self.roster.contains(entry) {
                return Err(OrchestrationError::Configuration(format!(
                    "entry participant '{}' is not in the roster",
                    entry
                )));
            }
            for participant in self.roster.iter() {
                if let Some(target) = participant
                    .handoffs()
                    .iter()
                    .find(|t| !self.roster.contains(t))
                {
                    return Err(OrchestrationError::Configuration(format!(
                        "'{}' declares a handoff to unknown participant '{}'",
                        participant.id(),
                        target
                    )));
                }
            }
        }

        // Started last so the timeout clock begins with the run itself.
        let state = termination.start()?;
        Ok((policy, state))
    }

    /// Run the group chat on `task` until a termination condition fires, no participant is
    /// selected, or a turn fails.
    ///
    /// # Errors
    ///
    /// Only structural errors: [`OrchestrationError::EmptyRoster`] and
    /// [`OrchestrationError::Configuration`]. Failures during the run are reported through
    /// [`RunResult::reason`].
    pub async fn run(&self, task: &str) -> Result<RunResult, OrchestrationError> {
        self.execute(task, None).await
    }

    /// Run on a background task and observe messages as they are appended.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// ```rust,no_run
    /// # use groupchat::orchestration::{GroupChat, RunItem};
    /// # use futures_util::StreamExt;
    /// # use std::sync::Arc;
    /// # async fn demo(chat: Arc<GroupChat>) {
    /// let mut items = chat.run_stream("Summarise the meeting notes");
    /// while let Some(item) = items.next().await {
    ///     match item {
    ///         RunItem::Message(m) => println!("{}", m.render()),
    ///         RunItem::Finished(Ok(result)) => println!("done: {}", result.reason),
    ///         RunItem::Finished(Err(e)) => eprintln!("could not start: {}", e),
    ///     }
    /// }
    /// # }
    /// ```
    pub fn run_stream(self: Arc<Self>, task: impl Into<String>) -> RunStream {
        let task = task.into();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let outcome = self.execute(&task, Some(&tx)).await;
            // Receiver gone means the caller stopped listening.
            let _ = tx.send(RunItem::Finished(outcome));
        });

        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        }))
    }

    async fn execute(
        &self,
        task: &str,
        observer: Option<&mpsc::UnboundedSender<RunItem>>,
    ) -> Result<RunResult, OrchestrationError> {
        let (policy, mut termination) = self.prepare()?;

        let mut run = Run {
            id: Uuid::new_v4().to_string(),
            transcript: Transcript::new(),
            turns: 0,
            speakers: Vec::new(),
            current: None,
            previous: None,
            declared: None,
            observer,
        };

        log::info!(
            "GroupChat '{}': run {} started ({}, {} participants)",
            self.id,
            run.id,
            policy.name(),
            self.roster.len()
        );
        self.emit(OrchestrationEvent::RunStarted {
            run_id: run.id.clone(),
            chat_id: self.id.clone(),
            policy: policy.name().to_string(),
            participant_count: self.roster.len(),
        })
        .await;
        self.transition(&run, RunState::Running).await;

        self.append(&mut run, ChatMessage::new(TASK_SOURCE, task))
            .await;

        let reason = loop {
            if let Some(cause) = termination.check(&run.transcript) {
                break TerminationReason::Condition(cause);
            }

            let actor_id = match self.next_speaker(policy, &run).await {
                Ok(Some(id)) => id,
                Ok(None) => break TerminationReason::NoActor,
                Err(err) => break TerminationReason::Failed(err),
            };

            // Every id reaching this point has been checked against the roster.
            let Some(actor) = self.roster.get(&actor_id) else {
                break TerminationReason::Failed(OrchestrationError::Selection(actor_id));
            };

            run.turns += 1;
            self.emit(OrchestrationEvent::SpeakerSelected {
                run_id: run.id.clone(),
                participant_id: actor_id.clone(),
                turn: run.turns,
            })
            .await;
            self.transition(&run, RunState::AwaitingResponse(actor_id.clone()))
                .await;

            run.previous = run.current.replace(actor_id.clone());
            run.speakers.push(actor_id.clone());

            let appended = match self.take_turn(&mut run, actor).await {
                Ok(appended) => appended,
                Err(err) => {
                    log::error!(
                        "GroupChat '{}': turn {} by '{}' failed: {}",
                        self.id,
                        run.turns,
                        actor_id,
                        err
                    );
                    break TerminationReason::Failed(err);
                }
            };

            self.emit(OrchestrationEvent::TurnCompleted {
                run_id: run.id.clone(),
                participant_id: actor_id,
                turn: run.turns,
                messages_appended: appended,
            })
            .await;
            self.transition(&run, RunState::Running).await;
        };

        log::info!(
            "GroupChat '{}': run {} terminated after {} turns: {}",
            self.id,
            run.id,
            run.turns,
            reason
        );
        self.transition(&run, RunState::Terminated(reason.clone()))
            .await;
        self.emit(OrchestrationEvent::RunTerminated {
            run_id: run.id.clone(),
            reason: reason.clone(),
            transcript_len: run.transcript.len(),
            turns: run.turns,
        })
        .await;

        Ok(RunResult {
            run_id: run.id,
            reason,
            turns: run.turns,
            speakers: run.speakers,
            transcript: run.transcript,
        })
    }

    async fn transition(&self, run: &Run<'_>, state: RunState) {
        log::debug!("GroupChat '{}': run {} -> {:?}", self.id, run.id, state);
        self.emit(OrchestrationEvent::StateChanged {
            run_id: run.id.clone(),
            state,
        })
        .await;
    }

    async fn append(&self, run: &mut Run<'_>, message: ChatMessage) {
        let position = run.transcript.append(message.clone());
        if let Some(observer) = run.observer {
            let _ = observer.send(RunItem::Message(message.clone()));
        }
        self.emit(OrchestrationEvent::MessageAppended {
            run_id: run.id.clone(),
            position,
            message,
        })
        .await;
    }

    /// Drain one participant's response into the transcript. Returns the number of messages
    /// appended.
    ///
    /// Messages are always attributed to the actor. An empty response is a completion error.
    async fn take_turn(
        &self,
        run: &mut Run<'_>,
        actor: &Arc<dyn Participant>,
    ) -> Result<usize, OrchestrationError> {
        // The actor reads the transcript as of the start of its turn.
        let snapshot = run.transcript.clone();
        let mut responses = actor.respond(&snapshot);

        let mut appended = 0;
        let mut declared = None;
        while let Some(item) = responses.next().await {
            let mut message = item?;
            if message.source != actor.id() {
                log::warn!(
                    "GroupChat '{}': '{}' emitted a message as '{}', attributing it to '{}'",
                    self.id,
                    actor.id(),
                    message.source,
                    actor.id()
                );
                message.source = actor.id().to_string();
            }
            if let Some(target) = &message.handoff_target {
                declared = Some(target.clone());
            }
            self.append(run, message).await;
            appended += 1;
        }

        // A turn must grow the transcript, otherwise the run could never advance.
        if appended == 0 {
            return Err(OrchestrationError::Completion(format!(
                "'{}' produced no messages",
                actor.id()
            )));
        }

        run.declared = declared;
        Ok(appended)
    }

    async fn next_speaker(
        &self,
        policy: &SelectionPolicy,
        run: &Run<'_>,
    ) -> Result<Option<String>, OrchestrationError> {
        match policy {
            SelectionPolicy::PromptBased(selector) => {
                let choice = selector.select(&self.roster, &run.transcript).await?;
                self.checked(run, choice).await
            }
            SelectionPolicy::FunctionBased(selector) => {
                let choice = selector.select(&self.roster, &run.transcript).await?;
                self.checked(run, choice).await
            }
            SelectionPolicy::HandoffBased { entry, on_missing } => {
                if run.current.is_none() {
                    return Ok(Some(entry.clone()));
                }
                match (&run.declared, on_missing) {
                    (Some(target), _) => self.checked(run, Some(target.clone())).await,
                    (None, MissingHandoff::ReturnToPrevious) => Ok(run.previous.clone()),
                    (None, MissingHandoff::Terminate) => Ok(None),
                }
            }
        }
    }

    /// Validate a choice against the roster, applying the fallback when configured.
    async fn checked(
        &self,
        run: &Run<'_>,
        choice: Option<String>,
    ) -> Result<Option<String>, OrchestrationError> {
        let Some(id) = choice else {
            return Ok(None);
        };
        if self.roster.contains(&id) {
            return Ok(Some(id));
        }

        match &self.fallback {
            Some(fallback) => {
                log::warn!(
                    "GroupChat '{}': '{}' is not a participant, falling back to '{}'",
                    self.id,
                    id,
                    fallback
                );
                self.emit(OrchestrationEvent::SelectionFallback {
                    run_id: run.id.clone(),
                    rejected: id,
                    fallback: fallback.clone(),
                })
                .await;
                Ok(Some(fallback.clone()))
            }
            None => Err(OrchestrationError::Selection(id)),
        }
    }
}

/// Run `task` once with an ad-hoc group chat.
///
/// Equivalent to building a [`GroupChat`] from the arguments and calling
/// [`run`](GroupChat::run). The returned [`RunResult`] carries the final transcript and the
/// termination reason.
pub async fn run_orchestration(
    task: &str,
    roster: Roster,
    policy: SelectionPolicy,
    termination: TerminationCondition,
) -> Result<RunResult, OrchestrationError> {
    GroupChat::new("group-chat", "Group Chat")
        .with_roster(roster)
        .with_selection(policy)
        .with_termination(termination)
        .run(task)
        .await
}
