//! Chat-completions transport for the planning, judge and rewrite models.
//!
//! The [`ChatModel`] trait decouples the agents from HTTP. Tests use scripted
//! models that return predetermined replies without network access.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::error::LlmError;
use crate::io::config::ModelEndpoint;

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

/// Abstraction over chat-completion backends.
pub trait ChatModel {
    /// Model identifier, used to name decomposition directories.
    fn model_name(&self) -> &str;

    /// Send one conversation and return the assistant's text content.
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

impl<T: ChatModel + ?Sized> ChatModel for &T {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        (**self).complete(messages)
    }
}

/// OpenAI-compatible chat-completions client.
pub struct HttpChatModel {
    client: reqwest::blocking::Client,
    api_url: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    timeout: Duration,
}

impl HttpChatModel {
    /// Build a client for `endpoint`, reading its API key from the environment.
    pub fn new(endpoint: &ModelEndpoint, proxy: Option<&str>) -> Result<Self> {
        let api_key = match &endpoint.api_key_env {
            Some(var) => Some(
                std::env::var(var).with_context(|| format!("read API key from ${var}"))?,
            ),
            None => None,
        };

        let mut builder = reqwest::blocking::Client::builder().timeout(endpoint.timeout());
        if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|err| anyhow!("invalid proxy {proxy}: {err}"))?;
            builder = builder.proxy(proxy);
        }
        let client = builder.build().context("build HTTP client")?;

        Ok(Self {
            client,
            api_url: endpoint.api_url.clone(),
            api_key,
            model: endpoint.model.clone(),
            temperature: endpoint.temperature,
            timeout: endpoint.timeout(),
        })
    }
}

impl ChatModel for HttpChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model, timeout_secs = self.timeout.as_secs()))]
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let body = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        let mut request = self.client.post(&self.api_url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(messages = messages.len(), "sending chat completion");
        let response = request.send().map_err(classify_transport_error)?;
        let status = response.status();
        let text = response.text().map_err(classify_transport_error)?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "model endpoint returned error status");
            return Err(LlmError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = response_content(&text);
        if content.trim().is_empty() {
            return Err(LlmError::EmptyContent);
        }
        debug!(content_len = content.len(), "chat completion received");
        Ok(content)
    }
}

fn classify_transport_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else if err.is_connect() {
        LlmError::Connect(err.to_string())
    } else {
        LlmError::Transport(err.to_string())
    }
}

/// Pull the assistant text out of a response body.
///
/// Providers disagree on envelopes, so this tries `choices[0].message.content`,
/// then `choices[0].text`, then a top-level `content`, and finally falls back
/// to the raw body.
pub fn response_content(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.to_string();
    };
    let first_choice = value.get("choices").and_then(|c| c.get(0));
    let candidates = [
        first_choice
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content")),
        first_choice.and_then(|c| c.get("text")),
        value.get("content"),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(Value::as_str)
        .map_or_else(|| body.to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_openai_message_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"status\":true}"}}]}"#;
        assert_eq!(response_content(body), "{\"status\":true}");
    }

    #[test]
    fn falls_back_to_choice_text_then_top_level_content() {
        assert_eq!(response_content(r#"{"choices":[{"text":"plain"}]}"#), "plain");
        assert_eq!(response_content(r#"{"content":"top"}"#), "top");
    }

    #[test]
    fn falls_back_to_raw_body() {
        assert_eq!(response_content("not json at all"), "not json at all");
        assert_eq!(response_content(r#"{"id":"x"}"#), r#"{"id":"x"}"#);
    }

    #[test]
    fn missing_api_key_env_is_an_error() {
        let endpoint = ModelEndpoint {
            api_key_env: Some("TASKCHAIN_TEST_KEY_THAT_IS_NEVER_SET".to_string()),
            ..ModelEndpoint::default()
        };
        let err = HttpChatModel::new(&endpoint, None).err().expect("error");
        assert!(format!("{err:#}").contains("TASKCHAIN_TEST_KEY_THAT_IS_NEVER_SET"));
    }

    #[test]
    fn connection_refused_is_classified() {
        let endpoint = ModelEndpoint {
            api_url: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            api_key_env: None,
            timeout_secs: 5,
            ..ModelEndpoint::default()
        };
        let model = HttpChatModel::new(&endpoint, None).expect("client");
        let err = model
            .complete(&[ChatMessage::user("hi")])
            .expect_err("port 9 should refuse");
        assert!(matches!(err, LlmError::Connect(_) | LlmError::Transport(_)));
    }
}
