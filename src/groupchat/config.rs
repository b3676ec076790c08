//! Team configuration.
//!
//! [`TeamConfig`] gathers the handful of knobs the demos and most applications need: which model
//! backs the team, where the API lives, and the default stop rule. It is a plain struct; build it
//! by hand or load it from the environment.
//!
//! | Variable                  | Field             | Default                      |
//! |---------------------------|-------------------|------------------------------|
//! | `OPENAI_API_KEY`          | `api_key`         | required by `from_env`       |
//! | `OPENAI_BASE_URL`         | `base_url`        | `https://api.openai.com/v1`  |
//! | `GROUPCHAT_MODEL`         | `model`           | `gpt-4o-mini`                |
//! | `GROUPCHAT_MAX_MESSAGES`  | `max_messages`    | `10`                         |
//! | `GROUPCHAT_TIMEOUT_SECS`  | `timeout`         | `120`                        |
//!
//! # Example
//!
//! ```rust
//! use groupchat::config::TeamConfig;
//!
//! let config = TeamConfig::default();
//! assert_eq!(config.model, "gpt-4o-mini");
//! assert_eq!(config.termination_text, "[TERMINATE]");
//! assert!(config.termination().is_ok());
//! ```

use crate::groupchat::clients::openai::{OpenAIClient, DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT};
use crate::groupchat::orchestration::OrchestrationError;
use crate::groupchat::termination::TerminationCondition;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TERMINATION_TEXT: &str = "[TERMINATE]";
pub const DEFAULT_MAX_MESSAGES: usize = 10;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq)]
pub struct TeamConfig {
    /// Only `None` for hand-built configs; `from_env` requires it.
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    /// Token that ends a run when any participant mentions it.
    pub termination_text: String,
    pub max_messages: usize,
    /// Cooperative wall-clock limit for a whole run.
    pub timeout: Duration,
    /// Hard deadline for a single completion request.
    pub request_timeout: Duration,
}

impl Default for TeamConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            termination_text: DEFAULT_TERMINATION_TEXT.to_string(),
            max_messages: DEFAULT_MAX_MESSAGES,
            timeout: DEFAULT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl TeamConfig {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::Configuration`] when `OPENAI_API_KEY` is missing or a numeric
    /// variable does not parse.
    pub fn from_env() -> Result<Self, OrchestrationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable lookup.
    ///
    /// ```rust
    /// use groupchat::config::TeamConfig;
    ///
    /// let config = TeamConfig::from_lookup(|name| match name {
    ///     "OPENAI_API_KEY" => Some("sk-test".to_string()),
    ///     "GROUPCHAT_MAX_MESSAGES" => Some("4".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.max_messages, 4);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OrchestrationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let api_key = present("OPENAI_API_KEY").ok_or_else(|| {
            OrchestrationError::Configuration("OPENAI_API_KEY is not set".to_string())
        })?;

        let mut config = Self {
            api_key: Some(api_key),
            ..Self::default()
        };

        if let Some(base_url) = present("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        if let Some(model) = present("GROUPCHAT_MODEL") {
            config.model = model;
        }
        if let Some(raw) = present("GROUPCHAT_MAX_MESSAGES") {
            config.max_messages = parse_positive("GROUPCHAT_MAX_MESSAGES", &raw)?;
        }
        if let Some(raw) = present("GROUPCHAT_TIMEOUT_SECS") {
            config.timeout =
                Duration::from_secs(parse_positive("GROUPCHAT_TIMEOUT_SECS", &raw)? as u64);
        }

        log::debug!(
            "TeamConfig loaded: model={}, base_url={}, max_messages={}, timeout={:?}",
            config.model,
            config.base_url,
            config.max_messages,
            config.timeout
        );
        Ok(config)
    }

    /// The standard stop rule: message cap, termination text or timeout, whichever comes first.
    pub fn termination(&self) -> Result<TerminationCondition, OrchestrationError> {
        let condition = TerminationCondition::max_messages(self.max_messages)
            | TerminationCondition::text_mention(self.termination_text.clone())
            | TerminationCondition::timeout(self.timeout);
        condition.validate()?;
        Ok(condition)
    }

    /// Build an OpenAI-compatible client for `model`.
    ///
    /// # Errors
    ///
    /// [`OrchestrationError::Configuration`] when no API key is configured.
    pub fn client(&self) -> Result<OpenAIClient, OrchestrationError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            OrchestrationError::Configuration("no API key configured".to_string())
        })?;
        Ok(
            OpenAIClient::new_with_base_url(api_key, &self.model, &self.base_url)
                .with_request_timeout(self.request_timeout),
        )
    }
}

fn parse_positive(name: &str, raw: &str) -> Result<usize, OrchestrationError> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(OrchestrationError::Configuration(format!(
            "{} must be a positive integer, got '{}'",
            name, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groupchat::client_wrapper::ClientWrapper;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn api_key_is_required() {
        let err = TeamConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, OrchestrationError::Configuration(_)));
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn overrides_are_applied() {
        let config = TeamConfig::from_lookup(lookup(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
            ("GROUPCHAT_MODEL", "gpt-4.1-nano"),
            ("GROUPCHAT_TIMEOUT_SECS", "30"),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.model, "gpt-4.1-nano");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_messages, DEFAULT_MAX_MESSAGES);

        let client = config.client().unwrap();
        assert_eq!(client.model_name(), "gpt-4.1-nano");
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
    }

    #[test]
    fn malformed_numbers_are_configuration_errors() {
        for bad in ["zero", "0", "-3"] {
            let err = TeamConfig::from_lookup(lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("GROUPCHAT_MAX_MESSAGES", bad),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains("GROUPCHAT_MAX_MESSAGES"), "{}", bad);
        }
    }

    #[test]
    fn client_needs_a_key() {
        assert!(TeamConfig::default().client().is_err());
    }
}
