//! The participant capability and the roster of a run.
//!
//! A [`Participant`] answers a transcript with a finite stream of messages. The orchestrator
//! drives that stream to completion, appending each message as it arrives, before it considers
//! anyone else. Participants are owned by the caller and shared with runs through `Arc`, so the
//! same roster can serve many runs.

use crate::groupchat::orchestration::OrchestrationError;
use crate::groupchat::transcript::{ChatMessage, Transcript};
use futures_util::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// Messages produced by one turn, in emission order.
pub type ResponseStream<'a> =
    Pin<Box<dyn Stream<Item = Result<ChatMessage, OrchestrationError>> + Send + 'a>>;

/// Anything that can take a turn in a group chat.
///
/// # Example
///
/// ```
/// use futures_util::stream;
/// use groupchat::orchestration::OrchestrationError;
/// use groupchat::participant::{Participant, ResponseStream};
/// use groupchat::transcript::{ChatMessage, Transcript};
///
/// struct Echo;
///
/// impl Participant for Echo {
///     fn id(&self) -> &str { "echo" }
///     fn description(&self) -> &str { "Repeats the last message." }
///     fn respond<'a>(&'a self, transcript: &'a Transcript) -> ResponseStream<'a> {
///         let text = transcript.last().map(|m| m.content.clone()).unwrap_or_default();
///         let reply: Result<ChatMessage, OrchestrationError> = Ok(ChatMessage::new("echo", text));
///         Box::pin(stream::iter(vec![reply]))
///     }
/// }
/// ```
pub trait Participant: Send + Sync {
    /// Unique id within a roster. Used as the message source.
    fn id(&self) -> &str;

    /// Shown to selectors when choosing the next speaker.
    fn description(&self) -> &str;

    /// Produce this turn's messages. The stream must end in finite time and yield at least one
    /// message; an empty turn fails the run. Messages are attributed to [`id`](Participant::id)
    /// whatever `source` they carry.
    ///
    /// A handoff is declared by emitting a [`ChatMessage::handoff`]; the last one in the turn
    /// names the successor.
    fn respond<'a>(&'a self, transcript: &'a Transcript) -> ResponseStream<'a>;

    /// Participants this one may hand off to.
    fn handoffs(&self) -> &[String] {
        &[]
    }
}

/// Ordered set of participants with unique ids.
///
/// ```
/// # use futures_util::stream;
/// # use groupchat::participant::{Participant, ResponseStream, Roster};
/// # use groupchat::orchestration::OrchestrationError;
/// # use groupchat::transcript::{ChatMessage, Transcript};
/// # use std::sync::Arc;
/// # struct Quiet(&'static str);
/// # impl Participant for Quiet {
/// #     fn id(&self) -> &str { self.0 }
/// #     fn description(&self) -> &str { "says nothing" }
/// #     fn respond<'a>(&'a self, _t: &'a Transcript) -> ResponseStream<'a> {
/// #         Box::pin(stream::empty::<Result<ChatMessage, OrchestrationError>>())
/// #     }
/// # }
/// let mut roster = Roster::new();
/// roster.add(Arc::new(Quiet("planner"))).unwrap();
/// roster.add(Arc::new(Quiet("critic"))).unwrap();
/// assert!(roster.add(Arc::new(Quiet("planner"))).is_err());
///
/// assert_eq!(roster.participants_list(), "planner, critic");
/// assert_eq!(roster.roles(), "planner: says nothing\ncritic: says nothing");
/// ```
#[derive(Clone, Default)]
pub struct Roster {
    members: Vec<Arc<dyn Participant>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from participants in order, failing on the first duplicate id.
    pub fn from_participants<I>(participants: I) -> Result<Self, OrchestrationError>
    where
        I: IntoIterator<Item = Arc<dyn Participant>>,
    {
        let mut roster = Self::new();
        for participant in participants {
            roster.add(participant)?;
        }
        Ok(roster)
    }

    /// Add a participant, rejecting duplicate ids.
    pub fn add(&mut self, participant: Arc<dyn Participant>) -> Result<(), OrchestrationError> {
        if self.contains(participant.id()) {
            return Err(OrchestrationError::DuplicateParticipant(
                participant.id().to_string(),
            ));
        }
        self.members.push(participant);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn Participant>> {
        self.members.iter().find(|p| p.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.members.iter().map(|p| p.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Participant>> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// `id: description` lines, one per participant.
    pub fn roles(&self) -> String {
        self.members
            .iter()
            .map(|p| format!("{}: {}", p.id(), p.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Comma separated ids.
    pub fn participants_list(&self) -> String {
        self.ids().join(", ")
    }
}

impl fmt::Debug for Roster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}
