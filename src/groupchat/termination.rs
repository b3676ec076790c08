//! Composable stop conditions for a group chat run.
//!
//! A [`TerminationCondition`] is plain configuration. Calling
//! [`start`](TerminationCondition::start) validates it and produces a [`TerminationState`], the
//! per-run evaluator that owns the timeout clock and the cursor over already-inspected
//! messages. The orchestrator checks the state once after the task message is seeded and once
//! after every turn, never in the middle of a turn.
//!
//! # Example
//!
//! ```
//! use groupchat::termination::{StopCause, TerminationCondition};
//! use groupchat::transcript::{ChatMessage, Transcript};
//! use std::time::Duration;
//!
//! let condition = TerminationCondition::max_messages(3)
//!     | TerminationCondition::text_mention("DONE")
//!     | TerminationCondition::timeout(Duration::from_secs(120));
//!
//! let mut state = condition.start().unwrap();
//! let mut transcript = Transcript::seeded("task");
//! assert!(state.check(&transcript).is_none());
//!
//! transcript.append(ChatMessage::new("writer", "All DONE here"));
//! assert_eq!(
//!     state.check(&transcript),
//!     Some(StopCause::TextMention { token: "DONE".into(), source: "writer".into() })
//! );
//! ```

use crate::groupchat::orchestration::OrchestrationError;
use crate::groupchat::transcript::Transcript;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::time::{Duration, Instant};

/// Declarative stop condition.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationCondition {
    /// Stop once the transcript holds at least this many messages, seed included.
    MaxMessages(usize),
    /// Stop after a message whose content contains the token (case-sensitive substring).
    TextMention(String),
    /// Stop once wall-clock time since run start exceeds the duration.
    Timeout(Duration),
    /// Stop when every child has fired.
    And(Vec<TerminationCondition>),
    /// Stop when any child fires.
    Or(Vec<TerminationCondition>),
}

impl TerminationCondition {
    pub fn max_messages(limit: usize) -> Self {
        TerminationCondition::MaxMessages(limit)
    }

    pub fn text_mention(token: impl Into<String>) -> Self {
        TerminationCondition::TextMention(token.into())
    }

    pub fn timeout(duration: Duration) -> Self {
        TerminationCondition::Timeout(duration)
    }

    /// Reject malformed conditions before a run begins.
    ///
    /// ```
    /// use groupchat::termination::TerminationCondition;
    ///
    /// assert!(TerminationCondition::max_messages(0).validate().is_err());
    /// assert!(TerminationCondition::Or(vec![]).validate().is_err());
    /// assert!(TerminationCondition::max_messages(1).validate().is_ok());
    /// ```
    pub fn validate(&self) -> Result<(), OrchestrationError> {
        match self {
            TerminationCondition::MaxMessages(0) => Err(OrchestrationError::Configuration(
                "MaxMessages limit must be at least 1".to_string(),
            )),
            TerminationCondition::MaxMessages(_) => Ok(()),
            TerminationCondition::TextMention(token) if token.is_empty() => {
                Err(OrchestrationError::Configuration(
                    "TextMention token must not be empty".to_string(),
                ))
            }
            TerminationCondition::TextMention(_) => Ok(()),
            TerminationCondition::Timeout(duration) if duration.is_zero() => {
                Err(OrchestrationError::Configuration(
                    "Timeout duration must be greater than zero".to_string(),
                ))
            }
            TerminationCondition::Timeout(_) => Ok(()),
            TerminationCondition::And(children) | TerminationCondition::Or(children) => {
                if children.is_empty() {
                    return Err(OrchestrationError::Configuration(format!(
                        "{} combinator needs at least one condition",
                        self.kind_name()
                    )));
                }
                children.iter().try_for_each(TerminationCondition::validate)
            }
        }
    }

    /// Validate and create the per-run evaluator. The timeout clock starts now.
    pub fn start(&self) -> Result<TerminationState, OrchestrationError> {
        self.validate()?;
        Ok(TerminationState {
            root: Node::build(self, Instant::now()),
        })
    }

    fn kind_name(&self) -> &'static str {
        match self {
            TerminationCondition::MaxMessages(_) => "MaxMessages",
            TerminationCondition::TextMention(_) => "TextMention",
            TerminationCondition::Timeout(_) => "Timeout",
            TerminationCondition::And(_) => "And",
            TerminationCondition::Or(_) => "Or",
        }
    }
}

impl BitOr for TerminationCondition {
    type Output = TerminationCondition;

    fn bitor(self, rhs: TerminationCondition) -> TerminationCondition {
        let mut children = match self {
            TerminationCondition::Or(children) => children,
            other => vec![other],
        };
        match rhs {
            TerminationCondition::Or(more) => children.extend(more),
            other => children.push(other),
        }
        TerminationCondition::Or(children)
    }
}

impl BitAnd for TerminationCondition {
    type Output = TerminationCondition;

    fn bitand(self, rhs: TerminationCondition) -> TerminationCondition {
        let mut children = match self {
            TerminationCondition::And(children) => children,
            other => vec![other],
        };
        match rhs {
            TerminationCondition::And(more) => children.extend(more),
            other => children.push(other),
        }
        TerminationCondition::And(children)
    }
}

/// Which condition stopped the run.
#[derive(Debug, Clone, PartialEq)]
pub enum StopCause {
    MaxMessages { limit: usize, count: usize },
    /// `source` is the author of the first message that contained `token`.
    TextMention { token: String, source: String },
    Timeout { limit: Duration, elapsed: Duration },
    /// Every child of an `And` fired; causes are in list order.
    All(Vec<StopCause>),
}

impl StopCause {
    /// Short machine-friendly label.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopCause::MaxMessages { .. } => "max_messages",
            StopCause::TextMention { .. } => "text_mention",
            StopCause::Timeout { .. } => "timeout",
            StopCause::All(_) => "all",
        }
    }
}

impl fmt::Display for StopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopCause::MaxMessages { limit, count } => {
                write!(f, "Maximum number of messages {} reached, current message count: {}", limit, count)
            }
            StopCause::TextMention { token, source } => {
                write!(f, "Text '{}' mentioned by {}", token, source)
            }
            StopCause::Timeout { limit, elapsed } => write!(
                f,
                "Timeout of {:.1}s exceeded after {:.1}s",
                limit.as_secs_f64(),
                elapsed.as_secs_f64()
            ),
            StopCause::All(causes) => {
                let parts: Vec<String> = causes.iter().map(|c| c.to_string()).collect();
                write!(f, "All conditions met: {}", parts.join("; "))
            }
        }
    }
}

/// Per-run evaluator created by [`TerminationCondition::start`].
///
/// Leaf conditions latch: once one fires it keeps reporting the same cause, so checking an
/// unchanged transcript twice gives the same answer.
#[derive(Debug)]
pub struct TerminationState {
    root: Node,
}

impl TerminationState {
    /// Evaluate against the transcript; `Some` means the run must stop.
    pub fn check(&mut self, transcript: &Transcript) -> Option<StopCause> {
        self.root.check(transcript)
    }
}

#[derive(Debug)]
enum Node {
    MaxMessages {
        limit: usize,
        fired: Option<StopCause>,
    },
    TextMention {
        token: String,
        cursor: usize,
        fired: Option<StopCause>,
    },
    Timeout {
        limit: Duration,
        started: Instant,
        fired: Option<StopCause>,
    },
    And(Vec<Node>),
    Or(Vec<Node>),
}

impl Node {
    fn build(condition: &TerminationCondition, started: Instant) -> Node {
        match condition {
            TerminationCondition::MaxMessages(limit) => Node::MaxMessages {
                limit: *limit,
                fired: None,
            },
            TerminationCondition::TextMention(token) => Node::TextMention {
                token: token.clone(),
                cursor: 0,
                fired: None,
            },
            TerminationCondition::Timeout(limit) => Node::Timeout {
                limit: *limit,
                started,
                fired: None,
            },
            TerminationCondition::And(children) => {
                Node::And(children.iter().map(|c| Node::build(c, started)).collect())
            }
            TerminationCondition::Or(children) => {
                Node::Or(children.iter().map(|c| Node::build(c, started)).collect())
            }
        }
    }

    fn check(&mut self, transcript: &Transcript) -> Option<StopCause> {
        match self {
            Node::MaxMessages { limit, fired } => {
                if fired.is_none() && transcript.len() >= *limit {
                    *fired = Some(StopCause::MaxMessages {
                        limit: *limit,
                        count: transcript.len(),
                    });
                }
                fired.clone()
            }
            Node::TextMention {
                token,
                cursor,
                fired,
            } => {
                if fired.is_none() {
                    if let Some(hit) = transcript
                        .since(*cursor)
                        .iter()
                        .find(|m| m.content.contains(token.as_str()))
                    {
                        *fired = Some(StopCause::TextMention {
                            token: token.clone(),
                            source: hit.source.clone(),
                        });
                    }
                }
                *cursor = transcript.len();
                fired.clone()
            }
            Node::Timeout {
                limit,
                started,
                fired,
            } => {
                if fired.is_none() {
                    let elapsed = started.elapsed();
                    if elapsed > *limit {
                        *fired = Some(StopCause::Timeout {
                            limit: *limit,
                            elapsed,
                        });
                    }
                }
                fired.clone()
            }
            Node::And(children) => {
                // Every child observes every check so cursors stay current.
                let causes: Vec<Option<StopCause>> =
                    children.iter_mut().map(|c| c.check(transcript)).collect();
                if causes.iter().all(Option::is_some) {
                    Some(StopCause::All(causes.into_iter().flatten().collect()))
                } else {
                    None
                }
            }
            Node::Or(children) => {
                let causes: Vec<Option<StopCause>> =
                    children.iter_mut().map(|c| c.check(transcript)).collect();
                causes.into_iter().flatten().next()
            }
        }
    }
}
