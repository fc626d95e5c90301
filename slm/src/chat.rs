use crate::error::AiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: String,
}

impl LlmMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::System,
            content: content.into(),
        }
    }
}

/// Schema-constrained chat. The returned value conforms to `response_schema`;
/// anything else is an `AiError` the caller can recover from.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn chat_with_schema(
        &self,
        messages: &[LlmMessage],
        response_schema: &Value,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Value, AiError>;
}

/// OpenAI-compatible chat client with structured output.
pub struct HttpChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl HttpChatClient {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
        })
    }
}

#[async_trait]
impl ChatClient for HttpChatClient {
    async fn chat_with_schema(
        &self,
        messages: &[LlmMessage],
        response_schema: &Value,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Value, AiError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "response",
                    "schema": response_schema,
                },
            },
        });

        let url = format!("{}/chat/completions", self.base_url);
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(model = %self.model, messages = messages.len(), "chat request");

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AiError::Chat(format!("status {}: {}", status, text)));
        }

        let payload: Value = response.json().await?;
        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AiError::MalformedResponse("missing message content".to_string()))?;

        serde_json::from_str(content)
            .map_err(|err| AiError::MalformedResponse(format!("content is not schema JSON: {err}")))
    }
}

/// Test double that replays queued responses in order. An empty queue
/// simulates a chat failure so fallback paths can be exercised.
#[derive(Default)]
pub struct ScriptedChatClient {
    responses: Mutex<VecDeque<Value>>,
}

impl ScriptedChatClient {
    pub fn new(responses: Vec<Value>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }

    pub fn failing() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn chat_with_schema(
        &self,
        _messages: &[LlmMessage],
        _response_schema: &Value,
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<Value, AiError> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AiError::Chat("scripted client exhausted".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_client_replays_in_order() {
        let client = ScriptedChatClient::new(vec![json!({"a": 1}), json!({"a": 2})]);
        let schema = json!({"type": "object"});

        let first = client
            .chat_with_schema(&[LlmMessage::user("x")], &schema, 0.2, 100)
            .await
            .unwrap();
        assert_eq!(first["a"], 1);

        let second = client
            .chat_with_schema(&[LlmMessage::user("x")], &schema, 0.2, 100)
            .await
            .unwrap();
        assert_eq!(second["a"], 2);

        let err = client
            .chat_with_schema(&[LlmMessage::user("x")], &schema, 0.2, 100)
            .await;
        assert!(err.is_err());
    }
}
