//! The `OpenAIClient` struct implements `ClientWrapper` for OpenAI's Chat Completions API,
//! capturing both the assistant response and the token usage of the last request.
//!
//! # Example
//!
//! ```rust,no_run
//! use groupchat::clients::openai::{Model, OpenAIClient};
//! use groupchat::client_wrapper::{ClientWrapper, CompletionOptions, Message, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let key = std::env::var("OPENAI_API_KEY")?;
//!     let client = OpenAIClient::new_with_model_enum(&key, Model::GPT4oMini);
//!
//!     let reply = client
//!         .send_message(
//!             &[
//!                 Message::new(Role::System, "You are an assistant."),
//!                 Message::new(Role::User, "Hello!"),
//!             ],
//!             &CompletionOptions::default(),
//!         )
//!         .await?;
//!     println!("Assistant: {}", reply.content);
//!
//!     if let Some(usage) = client.get_last_usage() {
//!         println!("Tokens: {} in / {} out", usage.input_tokens, usage.output_tokens);
//!     }
//!     Ok(())
//! }
//! ```

use std::error::Error;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use openai_rust2 as openai_rust;

use crate::groupchat::client_wrapper::{
    ClientWrapper, CompletionOptions, Message, Role, TokenUsage,
};
use crate::groupchat::clients::common::{format_messages, send_and_track, send_json_and_track};
use crate::groupchat::clients::http_pool::get_http_client;

/// Default endpoint for the public OpenAI API.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default hard deadline for a single completion request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Model identifiers commonly used for team members and selectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Model {
    /// `gpt-4o`
    GPT4o,
    /// `gpt-4o-mini`
    GPT4oMini,
    /// `gpt-4.1`
    GPT41,
    /// `gpt-4.1-mini`
    GPT41Mini,
    /// `gpt-4.1-nano`
    GPT41Nano,
}

/// Convert a [`Model`] variant into the string identifier expected by the REST API.
pub fn model_to_string(model: Model) -> String {
    match model {
        Model::GPT4o => "gpt-4o".to_string(),
        Model::GPT4oMini => "gpt-4o-mini".to_string(),
        Model::GPT41 => "gpt-4.1".to_string(),
        Model::GPT41Mini => "gpt-4.1-mini".to_string(),
        Model::GPT41Nano => "gpt-4.1-nano".to_string(),
    }
}

/// Client wrapper for OpenAI's Chat Completions API (and compatible endpoints).
///
/// Requests go through the pooled `reqwest::Client` for the configured base URL. The request
/// timeout is the hard deadline for a turn's model call.
pub struct OpenAIClient {
    /// Underlying SDK client pointing at the REST endpoint.
    client: openai_rust::Client,
    /// Pooled HTTP client, also used directly for JSON-mode requests.
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    request_timeout: Duration,
    token_usage: Mutex<Option<TokenUsage>>,
}

impl OpenAIClient {
    /// Construct a new client using the provided API key and [`Model`] variant.
    pub fn new_with_model_enum(secret_key: &str, model: Model) -> Self {
        Self::new_with_model_string(secret_key, &model_to_string(model))
    }

    /// Construct a new client using the provided API key and explicit model name.
    pub fn new_with_model_string(secret_key: &str, model_name: &str) -> Self {
        Self::new_with_base_url(secret_key, model_name, DEFAULT_BASE_URL)
    }

    /// Construct a client targeting a custom OpenAI compatible base URL.
    pub fn new_with_base_url(secret_key: &str, model_name: &str, base_url: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        let http = get_http_client(&base_url, DEFAULT_REQUEST_TIMEOUT);
        OpenAIClient {
            client: openai_rust::Client::new_with_client_and_base_url(
                secret_key,
                http.clone(),
                &base_url,
            ),
            http,
            api_key: secret_key.to_string(),
            base_url,
            model: model_name.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            token_usage: Mutex::new(None),
        }
    }

    /// Override the per-request deadline (builder pattern).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self.http = get_http_client(&self.base_url, timeout);
        self.client = openai_rust::Client::new_with_client_and_base_url(
            &self.api_key,
            self.http.clone(),
            &self.base_url,
        );
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[async_trait]
impl ClientWrapper for OpenAIClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn send_message(
        &self,
        messages: &[Message],
        options: &CompletionOptions,
    ) -> Result<Message, Box<dyn Error + Send + Sync>> {
        log::debug!(
            "OpenAIClient::send_message(...): {} messages to {} (json_mode={})",
            messages.len(),
            self.model,
            options.json_mode
        );

        let formatted_messages = format_messages(messages);
        let content = if options.json_mode {
            send_json_and_track(
                &self.http,
                &self.base_url,
                &self.api_key,
                &self.model,
                &formatted_messages,
                options,
                &self.token_usage,
            )
            .await?
        } else {
            send_and_track(
                &self.client,
                &self.model,
                formatted_messages,
                options,
                &self.token_usage,
            )
            .await?
        };

        Ok(Message::new(Role::Assistant, content))
    }

    fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
        Some(&self.token_usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalised() {
        let client = OpenAIClient::new_with_base_url("key", "gpt-4o-mini", "http://localhost:8080/v1/");
        assert_eq!(client.base_url(), "http://localhost:8080/v1");
        assert_eq!(client.model_name(), "gpt-4o-mini");
    }

    #[test]
    fn request_timeout_is_configurable() {
        let client = OpenAIClient::new_with_model_enum("key", Model::GPT4oMini)
            .with_request_timeout(Duration::from_secs(5));
        assert_eq!(client.request_timeout(), Duration::from_secs(5));
        assert!(client.get_last_usage().is_none());
    }
}
