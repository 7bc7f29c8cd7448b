use crate::conversation::BackendChatRequest;
use crate::error::TranslateError;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use serde_json::Value;

/// HTTP client for the agent backend.
pub struct AgentBackend {
    client: Client,
    base_url: String,
}

/// What the backend answered with, decided by its declared content type.
pub enum BackendReply {
    Streaming(reqwest::Response),
    Payload(ChatPayload),
}

/// The backend's atomic `/chat` answer.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatPayload {
    pub ok: bool,
    #[serde(default)]
    pub parts: Option<Vec<Value>>,
    #[serde(default)]
    pub message: Option<PayloadMessage>,
    #[serde(default)]
    pub usage: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PayloadMessage {
    /// Null for replies that only carried tool calls.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatPayload {
    /// Message to surface when `ok` is false.
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(Value::String(message)) => message.clone(),
            Some(Value::Object(error)) => error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(error.clone()).to_string()),
            _ => "backend reported failure without a message".to_string(),
        }
    }
}

impl AgentBackend {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn send_chat(
        &self,
        request: &BackendChatRequest,
    ) -> Result<BackendReply, TranslateError> {
        let response = self
            .client
            .post(format!("{}/chat", self.base_url))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        if is_streaming(&response) {
            return Ok(BackendReply::Streaming(response));
        }

        let body = response.bytes().await?;
        let payload = serde_json::from_slice(&body).map_err(TranslateError::MalformedResponse)?;
        Ok(BackendReply::Payload(payload))
    }

    pub async fn health(&self) -> Result<Value, TranslateError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TranslateError::BackendStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(TranslateError::MalformedResponse)
    }
}

fn is_streaming(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            let value = value.to_ascii_lowercase();
            value.starts_with("text/plain") || value.starts_with("text/event-stream")
        })
        .unwrap_or(false)
}
