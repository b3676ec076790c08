//! Append-only record of one group chat run.
//!
//! Every [`ChatMessage`] a run produces lands in a single [`Transcript`], in the order it was
//! emitted. The transcript is the only source of truth for selection, handoff and termination
//! decisions; nothing ever removes or reorders entries.
//!
//! # Example
//!
//! ```
//! use groupchat::transcript::{ChatMessage, Transcript};
//!
//! let mut transcript = Transcript::seeded("Plan a trip to Kyoto");
//! transcript.append(ChatMessage::new("planner", "Let's split this up."));
//!
//! assert_eq!(transcript.len(), 2);
//! assert_eq!(transcript.last().unwrap().source, "planner");
//! assert_eq!(
//!     transcript.render_history(),
//!     "user: Plan a trip to Kyoto\nplanner: Let's split this up."
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source id used for the task message that seeds every run.
pub const TASK_SOURCE: &str = "user";

/// Whether a message is conversation content or a coordination signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Normal,
    /// Coordination traffic such as handoff declarations.
    Control,
}

/// A single message in a [`Transcript`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Participant id of the author, or [`TASK_SOURCE`] for the seed message.
    pub source: String,
    pub content: String,
    pub kind: MessageKind,
    /// Successor declared by a handoff message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_target: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    /// A normal content message.
    pub fn new(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            content: content.into(),
            kind: MessageKind::Normal,
            handoff_target: None,
            timestamp: Utc::now(),
        }
    }

    /// A control message without a successor declaration.
    pub fn control(source: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Control,
            ..Self::new(source, content)
        }
    }

    /// A handoff from `source` to `target`.
    ///
    /// ```
    /// use groupchat::transcript::{ChatMessage, MessageKind};
    ///
    /// let msg = ChatMessage::handoff("planner", "agent_selector");
    /// assert_eq!(msg.kind, MessageKind::Control);
    /// assert_eq!(msg.handoff_target.as_deref(), Some("agent_selector"));
    /// assert_eq!(
    ///     msg.content,
    ///     "Transferred to agent_selector, adopting the role of agent_selector immediately."
    /// );
    /// ```
    pub fn handoff(source: impl Into<String>, target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            content: format!(
                "Transferred to {}, adopting the role of {} immediately.",
                target, target
            ),
            kind: MessageKind::Control,
            handoff_target: Some(target),
            source: source.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_control(&self) -> bool {
        self.kind == MessageKind::Control
    }

    /// `source: content`, the line format used in prompts and delegated results.
    pub fn render(&self) -> String {
        format!("{}: {}", self.source, self.content)
    }
}

/// Ordered, append-only sequence of [`ChatMessage`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript holding only the task message, authored by [`TASK_SOURCE`].
    pub fn seeded(task: impl Into<String>) -> Self {
        let mut transcript = Self::new();
        transcript.append(ChatMessage::new(TASK_SOURCE, task));
        transcript
    }

    /// Append a message and return its position.
    pub fn append(&mut self, message: ChatMessage) -> usize {
        self.messages.push(message);
        self.messages.len() - 1
    }

    pub fn all(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages at or after `position`; empty when `position` is past the end.
    pub fn since(&self, position: usize) -> &[ChatMessage] {
        self.messages.get(position..).unwrap_or(&[])
    }

    /// Author of the most recent message.
    pub fn last_source(&self) -> Option<&str> {
        self.last().map(|m| m.source.as_str())
    }

    /// Every message rendered as a `source: content` line.
    pub fn render_history(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::render)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn since_is_clamped() {
        let mut t = Transcript::seeded("task");
        t.append(ChatMessage::new("a", "one"));
        assert_eq!(t.since(1).len(), 1);
        assert_eq!(t.since(2).len(), 0);
        assert_eq!(t.since(99).len(), 0);
    }

    #[test]
    fn append_returns_monotonic_positions() {
        let mut t = Transcript::new();
        assert_eq!(t.append(ChatMessage::new("a", "x")), 0);
        assert_eq!(t.append(ChatMessage::new("b", "y")), 1);
        assert_eq!(t.last_source(), Some("b"));
    }

    #[test]
    fn json_export_keeps_order_and_kind() {
        let mut t = Transcript::seeded("task");
        t.append(ChatMessage::handoff("planner", "worker"));
        let json = t.to_json().unwrap();
        let back: Transcript = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back.all()[1].kind, MessageKind::Control);
        assert_eq!(back.all()[1].handoff_target.as_deref(), Some("worker"));
    }
}
