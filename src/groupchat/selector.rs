//! Turn selection policies.
//!
//! A [`SpeakerSelector`] looks at the roster and the transcript and names the next speaker, or
//! abstains with `None`. Selectors may return ids that are not in the roster (a model can
//! answer anything); the orchestrator validates every answer and applies its fallback rule.
//!
//! | Selector | Decides by |
//! |---|---|
//! | [`PromptSelector`] | asking a model, trusting its trimmed reply as the id |
//! | [`StructuredSelector`] | asking a model in JSON mode and reading one field |
//! | [`CoordinatorSelector`] | routing every turn back to a coordinator, which then delegates |
//! | [`FnSelector`] | a plain closure |
//!
//! [`SelectionPolicy`] wraps the choice of centralized selection or participant handoffs.

use crate::groupchat::client_wrapper::{ClientWrapper, CompletionOptions};
use crate::groupchat::orchestration::OrchestrationError;
use crate::groupchat::participant::Roster;
use crate::groupchat::transcript::Transcript;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Default prompt for model-driven selection.
pub const DEFAULT_SELECTOR_PROMPT: &str = "You are in a role play game. The following roles are available:
{roles}.
Read the following conversation. Then select the next role from {participants} to play. Only return the role.

{history}

Read the above conversation. Then select the next role from {participants} to play. Only return the role.";

const ROLES: &str = "{roles}";
const PARTICIPANTS: &str = "{participants}";
const HISTORY: &str = "{history}";

/// Names the next speaker.
#[async_trait]
pub trait SpeakerSelector: Send + Sync {
    /// `Ok(None)` means no one should speak and the run ends.
    async fn select(
        &self,
        roster: &Roster,
        transcript: &Transcript,
    ) -> Result<Option<String>, OrchestrationError>;
}

/// A validated selection template.
///
/// `{participants}` and `{history}` are required; `{roles}` is optional.
///
/// ```
/// use groupchat::selector::SelectorPrompt;
///
/// assert!(SelectorPrompt::new("Pick from {participants}:\n{history}").is_ok());
/// assert!(SelectorPrompt::new("Pick someone from {roles}").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorPrompt {
    template: String,
}

impl SelectorPrompt {
    pub fn new(template: impl Into<String>) -> Result<Self, OrchestrationError> {
        let template = template.into();
        for placeholder in [PARTICIPANTS, HISTORY] {
            if !template.contains(placeholder) {
                return Err(OrchestrationError::Configuration(format!(
                    "selector template is missing the {} placeholder",
                    placeholder
                )));
            }
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Fill in roles, participant ids and the `source: content` history.
    pub fn render(&self, roster: &Roster, transcript: &Transcript) -> String {
        self.template
            .replace(ROLES, &roster.roles())
            .replace(PARTICIPANTS, &roster.participants_list())
            .replace(HISTORY, &transcript.render_history())
    }
}

impl Default for SelectorPrompt {
    fn default() -> Self {
        Self {
            template: DEFAULT_SELECTOR_PROMPT.to_string(),
        }
    }
}

/// Asks a model to name the next speaker and trusts the trimmed reply verbatim.
pub struct PromptSelector {
    client: Arc<dyn ClientWrapper>,
    prompt: SelectorPrompt,
    options: CompletionOptions,
}

impl PromptSelector {
    /// Selector using [`DEFAULT_SELECTOR_PROMPT`].
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            client,
            prompt: SelectorPrompt::default(),
            options: CompletionOptions::default(),
        }
    }

    /// Selector with a custom template; fails if a required placeholder is missing.
    pub fn with_template(
        client: Arc<dyn ClientWrapper>,
        template: impl Into<String>,
    ) -> Result<Self, OrchestrationError> {
        Ok(Self {
            client,
            prompt: SelectorPrompt::new(template)?,
            options: CompletionOptions::default(),
        })
    }

    pub fn with_completion_options(mut self, options: CompletionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn prompt(&self) -> &SelectorPrompt {
        &self.prompt
    }
}

#[async_trait]
impl SpeakerSelector for PromptSelector {
    async fn select(
        &self,
        roster: &Roster,
        transcript: &Transcript,
    ) -> Result<Option<String>, OrchestrationError> {
        let prompt = self.prompt.render(roster, transcript);
        let reply = self.client.complete(&prompt, &self.options).await?;
        let chosen = reply.trim().to_string();
        log::debug!("PromptSelector: model chose '{}'", chosen);
        Ok(Some(chosen))
    }
}

/// Asks a model for a JSON object and reads the speaker id from one field.
///
/// A reply that is not JSON, or lacks the field, is treated as an abstention so a wrapping
/// [`CoordinatorSelector`] can fall back.
pub struct StructuredSelector {
    client: Arc<dyn ClientWrapper>,
    prompt: SelectorPrompt,
    field: String,
}

impl StructuredSelector {
    pub fn new(client: Arc<dyn ClientWrapper>, prompt: SelectorPrompt) -> Self {
        Self {
            client,
            prompt,
            field: "member".to_string(),
        }
    }

    /// JSON field holding the chosen id (default `member`).
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = field.into();
        self
    }

    fn instructions(&self, rendered: &str) -> String {
        format!(
            "{}\n\nRespond with a JSON object of the form {{\"{}\": \"<one of the names above>\"}}.",
            rendered, self.field
        )
    }
}

#[async_trait]
impl SpeakerSelector for StructuredSelector {
    async fn select(
        &self,
        roster: &Roster,
        transcript: &Transcript,
    ) -> Result<Option<String>, OrchestrationError> {
        let prompt = self.instructions(&self.prompt.render(roster, transcript));
        let reply = self.client.complete(&prompt, &CompletionOptions::json()).await?;

        match serde_json::from_str::<serde_json::Value>(&reply) {
            Ok(value) => Ok(value
                .get(&self.field)
                .and_then(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())),
            Err(err) => {
                log::warn!("StructuredSelector: reply is not JSON ({}): {}", err, reply);
                Ok(None)
            }
        }
    }
}

/// Coordinator-first selection.
///
/// If the last message was not written by the coordinator, the coordinator speaks next.
/// Otherwise the secondary selector picks; when it abstains, errors out at the parsing level
/// (returns `None`), or names someone outside the roster, the coordinator speaks again. The
/// selector therefore never abstains while the coordinator is in the roster.
pub struct CoordinatorSelector {
    coordinator: String,
    secondary: Arc<dyn SpeakerSelector>,
}

impl CoordinatorSelector {
    pub fn new(coordinator: impl Into<String>, secondary: Arc<dyn SpeakerSelector>) -> Self {
        Self {
            coordinator: coordinator.into(),
            secondary,
        }
    }

    pub fn coordinator(&self) -> &str {
        &self.coordinator
    }
}

#[async_trait]
impl SpeakerSelector for CoordinatorSelector {
    async fn select(
        &self,
        roster: &Roster,
        transcript: &Transcript,
    ) -> Result<Option<String>, OrchestrationError> {
        if transcript.last_source() != Some(self.coordinator.as_str()) {
            return Ok(Some(self.coordinator.clone()));
        }

        match self.secondary.select(roster, transcript).await? {
            Some(id) if roster.contains(&id) => Ok(Some(id)),
            other => {
                log::info!(
                    "CoordinatorSelector: secondary choice {:?} unusable, returning to '{}'",
                    other,
                    self.coordinator
                );
                Ok(Some(self.coordinator.clone()))
            }
        }
    }
}

/// Closure-backed selector.
///
/// ```
/// use groupchat::selector::FnSelector;
///
/// // Always pick the first participant that did not speak last.
/// let selector = FnSelector::new(|roster, transcript| {
///     let last = transcript.last_source();
///     roster.ids().into_iter().find(|id| Some(*id) != last).map(String::from)
/// });
/// # let _ = selector;
/// ```
pub struct FnSelector<F> {
    rule: F,
}

impl<F> FnSelector<F>
where
    F: Fn(&Roster, &Transcript) -> Option<String> + Send + Sync,
{
    pub fn new(rule: F) -> Self {
        Self { rule }
    }
}

#[async_trait]
impl<F> SpeakerSelector for FnSelector<F>
where
    F: Fn(&Roster, &Transcript) -> Option<String> + Send + Sync,
{
    async fn select(
        &self,
        roster: &Roster,
        transcript: &Transcript,
    ) -> Result<Option<String>, OrchestrationError> {
        Ok((self.rule)(roster, transcript))
    }
}

/// What happens when a participant ends a handoff-model turn without naming a successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingHandoff {
    /// Control returns to the participant that acted before the current one.
    #[default]
    ReturnToPrevious,
    /// The run ends with [`TerminationReason::NoActor`](crate::orchestration::TerminationReason::NoActor).
    Terminate,
}

/// How the next speaker is chosen. Fixed for the duration of a run.
#[derive(Clone)]
pub enum SelectionPolicy {
    /// A model picks from the whole roster.
    PromptBased(Arc<PromptSelector>),
    /// A rule over roster and transcript.
    FunctionBased(Arc<dyn SpeakerSelector>),
    /// Participants name their successor; `entry` acts first.
    HandoffBased {
        entry: String,
        on_missing: MissingHandoff,
    },
}

impl SelectionPolicy {
    pub fn prompt_based(selector: PromptSelector) -> Self {
        SelectionPolicy::PromptBased(Arc::new(selector))
    }

    pub fn function_based<S>(selector: S) -> Self
    where
        S: SpeakerSelector + 'static,
    {
        SelectionPolicy::FunctionBased(Arc::new(selector))
    }

    /// Shorthand for [`FnSelector`] wrapped in `FunctionBased`.
    pub fn function<F>(rule: F) -> Self
    where
        F: Fn(&Roster, &Transcript) -> Option<String> + Send + Sync + 'static,
    {
        Self::function_based(FnSelector::new(rule))
    }

    /// Handoff model starting at `entry`, returning to the previous speaker on a missing
    /// handoff.
    pub fn handoff(entry: impl Into<String>) -> Self {
        SelectionPolicy::HandoffBased {
            entry: entry.into(),
            on_missing: MissingHandoff::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionPolicy::PromptBased(_) => "PromptBased",
            SelectionPolicy::FunctionBased(_) => "FunctionBased",
            SelectionPolicy::HandoffBased { .. } => "HandoffBased",
        }
    }
}

impl fmt::Debug for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::HandoffBased { entry, on_missing } => f
                .debug_struct("HandoffBased")
                .field("entry", entry)
                .field("on_missing", on_missing)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}
