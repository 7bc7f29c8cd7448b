use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Tool name reserved for thought-card envelopes.
pub const THOUGHT_CARD_TOOL: &str = "thought_card";

pub const FINISH_REASON_STOP: &str = "stop";

/// One line of the chat stream protocol: `<tag>:<json>\n`.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `0:"text"`
    Text(String),
    /// `b:{"toolCallId","toolName"}`
    ToolCallStart(ToolCallStart),
    /// `c:{"toolCallId","argsTextDelta"}`
    ToolCallDelta(ToolCallDelta),
    /// `9:{"toolCallId","toolName","args"}`
    ToolCall(ToolCall),
    /// `3:"message"`
    Error(String),
    /// `d:{"finishReason","usage"}`
    Finish(Finish),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallStart {
    pub tool_call_id: String,
    pub tool_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallDelta {
    pub tool_call_id: String,
    pub args_text_delta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
}

impl ToolCall {
    /// Builds a thought-card call whose `args` is the card serialized as a JSON string.
    pub fn thought_card(index: usize, card: &Value) -> Result<Self, serde_json::Error> {
        Ok(Self {
            tool_call_id: format!("thought_{}", index),
            tool_name: THOUGHT_CARD_TOOL.to_string(),
            args: Value::String(serde_json::to_string(card)?),
        })
    }

    /// Argument text as the chat runtime exposes it.
    pub fn args_text(&self) -> String {
        match &self.args {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finish {
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Value,
}

impl Finish {
    pub fn stop(usage: Option<Value>) -> Self {
        Self {
            finish_reason: FINISH_REASON_STOP.to_string(),
            usage: usage.unwrap_or_else(|| Value::Object(Default::default())),
        }
    }
}

impl Default for Finish {
    fn default() -> Self {
        Self::stop(None)
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame has no tag separator")]
    MissingTag,
    #[error("invalid payload for frame '{tag}': {source}")]
    Payload {
        tag: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Frame {
    pub fn tag(&self) -> &'static str {
        match self {
            Frame::Text(_) => "0",
            Frame::ToolCallStart(_) => "b",
            Frame::ToolCallDelta(_) => "c",
            Frame::ToolCall(_) => "9",
            Frame::Error(_) => "3",
            Frame::Finish(_) => "d",
        }
    }

    /// Encodes the frame as a single newline-terminated line.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let payload = match self {
            Frame::Text(text) | Frame::Error(text) => serde_json::to_string(text)?,
            Frame::ToolCallStart(start) => serde_json::to_string(start)?,
            Frame::ToolCallDelta(delta) => serde_json::to_string(delta)?,
            Frame::ToolCall(call) => serde_json::to_string(call)?,
            Frame::Finish(finish) => serde_json::to_string(finish)?,
        };
        Ok(format!("{}:{}\n", self.tag(), payload))
    }

    /// Decodes one protocol line. Returns `Ok(None)` for blank lines and tags this
    /// client does not act on.
    pub fn parse_line(line: &str) -> Result<Option<Frame>, FrameError> {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let (tag, payload) = line.split_once(':').ok_or(FrameError::MissingTag)?;
        let decode_err = |source| FrameError::Payload {
            tag: tag.to_string(),
            source,
        };

        let frame = match tag {
            "0" => Frame::Text(serde_json::from_str(payload).map_err(decode_err)?),
            "b" => Frame::ToolCallStart(serde_json::from_str(payload).map_err(decode_err)?),
            "c" => Frame::ToolCallDelta(serde_json::from_str(payload).map_err(decode_err)?),
            "9" => Frame::ToolCall(serde_json::from_str(payload).map_err(decode_err)?),
            "3" => Frame::Error(serde_json::from_str(payload).map_err(decode_err)?),
            // Some agent backends terminate with a bare `d:`.
            "d" if payload.trim().is_empty() => Frame::Finish(Finish::default()),
            "d" => Frame::Finish(serde_json::from_str(payload).map_err(decode_err)?),
            _ => return Ok(None),
        };

        Ok(Some(frame))
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Frame::Finish(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Thinking,
    Executing,
    ToolExecution,
    ToolResult,
    Progress,
    LiveText,
    FileWriting,
    FileComplete,
    FinalAnswer,
    Complete,
    #[serde(other)]
    Other,
}

/// A structured step of the agent's reasoning or tool use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThoughtCard {
    pub card_type: CardType,
    pub content: String,
    #[serde(default)]
    pub step: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_typing: Option<bool>,
}
