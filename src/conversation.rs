use crate::error::TranslateError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentMode {
    Chat,
    Agent,
    #[default]
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MessageContent {
    /// Concatenates the text of every part.
    pub fn flatten(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|part| part.text.as_deref())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Body of `POST /api/chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRequest {
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Value>,
    #[serde(default)]
    pub agent_mode: AgentMode,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub settings: Map<String, Value>,
}

impl ConversationRequest {
    pub fn from_body(body: &[u8]) -> Result<Self, TranslateError> {
        if body.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(TranslateError::InvalidRequest(
                "request body is empty".to_string(),
            ));
        }

        serde_json::from_slice(body)
            .map_err(|err| TranslateError::InvalidRequest(format!("invalid request body: {}", err)))
    }

    /// Messages in forwarding order: system messages first (stable), then the
    /// rest. The `system` prompt is only used when no system message exists.
    pub fn ordered_messages(&self) -> Vec<Message> {
        let (mut ordered, rest): (Vec<Message>, Vec<Message>) = self
            .messages
            .iter()
            .cloned()
            .partition(|message| message.role == Role::System);

        if ordered.is_empty() {
            if let Some(system) = self.system.as_deref().filter(|s| !s.trim().is_empty()) {
                ordered.push(Message::text(Role::System, system));
            }
        }

        ordered.extend(rest);
        ordered
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendMessage {
    pub role: Role,
    pub content: String,
}

/// Payload for the agent backend's `POST /chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendChatRequest {
    pub messages: Vec<BackendMessage>,
    pub provider: String,
    pub model: String,
    pub agent_mode: AgentMode,
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct BackendDefaults {
    pub provider: String,
    pub model: String,
}

impl Default for BackendDefaults {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
        }
    }
}

impl BackendChatRequest {
    pub fn from_conversation(request: &ConversationRequest, defaults: &BackendDefaults) -> Self {
        let messages = request
            .ordered_messages()
            .into_iter()
            .map(|message| BackendMessage {
                role: message.role,
                content: message.content.flatten(),
            })
            .collect();

        let setting = |key: &str, fallback: &str| {
            request
                .settings
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or(fallback)
                .to_string()
        };

        Self {
            messages,
            provider: setting("provider", &defaults.provider),
            model: setting("model", &defaults.model),
            agent_mode: AgentMode::Agent,
            settings: request.settings.clone(),
        }
    }
}
