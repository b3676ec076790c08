//! Request plumbing shared by OpenAI-compatible chat completion clients.
//!
//! Plain completions go through `openai_rust2`. Its `ChatArguments` has no `response_format`
//! field, so JSON-mode requests are posted directly with `reqwest`.

use crate::groupchat::client_wrapper::{CompletionOptions, Message, TokenUsage};
use openai_rust::chat;
use openai_rust2 as openai_rust;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::sync::Mutex;

/// Path appended to the base URL for chat completions.
pub const CHAT_COMPLETIONS_PATH: &str = "/chat/completions";

/// Convert messages into the format expected by `openai_rust`.
pub fn format_messages(messages: &[Message]) -> Vec<chat::Message> {
    messages
        .iter()
        .map(|m| chat::Message {
            role: m.role.as_str().to_owned(),
            content: m.content.to_string(),
        })
        .collect()
}

fn record_usage(usage_slot: &Mutex<Option<TokenUsage>>, usage: TokenUsage) {
    *usage_slot
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(usage);
}

/// Send a chat request, record its usage, and return the assistant's content.
pub async fn send_and_track(
    api: &openai_rust::Client,
    model: &str,
    formatted_msgs: Vec<chat::Message>,
    options: &CompletionOptions,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    let mut chat_arguments = chat::ChatArguments::new(model, formatted_msgs);
    chat_arguments.temperature = options.temperature;
    chat_arguments.max_tokens = options.max_output_tokens.map(|tokens| tokens as u32);

    let response = api
        .create_chat(chat_arguments, Some(CHAT_COMPLETIONS_PATH.to_string()))
        .await;

    match response {
        Ok(response) => {
            record_usage(
                usage_slot,
                TokenUsage {
                    input_tokens: response.usage.prompt_tokens as usize,
                    output_tokens: response.usage.completion_tokens as usize,
                    total_tokens: response.usage.total_tokens as usize,
                },
            );
            Ok(response
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .unwrap_or_default())
        }
        Err(err) => {
            log::error!(
                "groupchat::clients::common::send_and_track(...): OpenAI API Error: {}",
                err
            );
            Err(err.into())
        }
    }
}

#[derive(Serialize)]
struct JsonChatRequest<'a> {
    model: &'a str,
    messages: &'a [chat::Message],
    response_format: ResponseFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct JsonChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: usize,
    completion_tokens: usize,
    total_tokens: usize,
}

/// Non-success HTTP status returned by the provider.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub body: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API returned status {}: {}", self.status, self.body)
    }
}

impl Error for ApiError {}

fn json_request_body<'a>(
    model: &'a str,
    formatted_msgs: &'a [chat::Message],
    options: &CompletionOptions,
) -> JsonChatRequest<'a> {
    JsonChatRequest {
        model,
        messages: formatted_msgs,
        response_format: ResponseFormat {
            kind: "json_object",
        },
        temperature: options.temperature,
        max_tokens: options.max_output_tokens,
    }
}

/// Send a JSON-mode chat request (`response_format: json_object`), record its usage, and
/// return the assistant's content.
///
/// A reply without any choice, or whose first choice has no content, yields an empty string;
/// callers decide whether that is an error.
pub async fn send_json_and_track(
    http: &reqwest::Client,
    base_url: &str,
    api_key: &str,
    model: &str,
    formatted_msgs: &[chat::Message],
    options: &CompletionOptions,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, Box<dyn Error + Send + Sync>> {
    let url = format!("{}{}", base_url, CHAT_COMPLETIONS_PATH);
    let body = json_request_body(model, formatted_msgs, options);

    let response = http
        .post(&url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(|err| {
            log::error!(
                "groupchat::clients::common::send_json_and_track(...): request to {} failed: {}",
                url,
                err
            );
            err
        })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        log::error!(
            "groupchat::clients::common::send_json_and_track(...): API error {}: {}",
            status,
            body
        );
        return Err(Box::new(ApiError {
            status: status.as_u16(),
            body,
        }));
    }

    let parsed: JsonChatResponse = response.json().await?;

    if let Some(usage) = parsed.usage {
        record_usage(
            usage_slot,
            TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
        );
    }

    Ok(parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groupchat::client_wrapper::Role;

    #[test]
    fn messages_keep_roles_and_order() {
        let formatted = format_messages(&[
            Message::new(Role::System, "be brief"),
            Message::new(Role::User, "hi"),
        ]);
        assert_eq!(formatted.len(), 2);
        assert_eq!(formatted[0].role, "system");
        assert_eq!(formatted[1].role, "user");
        assert_eq!(formatted[1].content, "hi");
    }

    #[test]
    fn json_requests_set_response_format() {
        let formatted = format_messages(&[Message::new(Role::User, "hi")]);
        let body = json_request_body("gpt-4o-mini", &formatted, &CompletionOptions::json());
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["response_format"]["type"], "json_object");
        assert_eq!(value["messages"][0]["role"], "user");
        assert!(value.get("temperature").is_none());
    }
}
