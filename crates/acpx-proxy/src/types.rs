//! OpenAI chat-completions wire types.
//!
//! The proxy accepts (a subset of) OpenAI's `chat/completions` request
//! format and renders responses/chunks in the matching envelope. Incoming
//! message `content` can be a plain string or an array of typed parts;
//! both are accepted via an `#[serde(untagged)]` enum.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Model id prefix stamped onto every response envelope.
pub const MODEL_PREFIX: &str = "cursor-acp";

/// Request body for `POST /v1/chat/completions`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub tools: Option<Vec<DeclaredTool>>,
    #[serde(default)]
    pub stream: Option<bool>,
}

impl ChatCompletionRequest {
    /// Tool names the caller declared as available this turn.
    pub fn allowed_tool_names(&self) -> HashSet<String> {
        self.tools
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|t| t.function.name.clone())
            .collect()
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

/// One entry of the request's message history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// Either a string shorthand or an array of typed content parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    String(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Lossy plain-text representation (non-text parts are dropped).
    pub fn to_plaintext(&self) -> String {
        match self {
            MessageContent::String(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// A tool declared by the caller in `tools[]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredTool {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: DeclaredFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclaredFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

/// An OpenAI-shaped tool call.
///
/// Invariant: `function.arguments` is always a syntactically valid JSON
/// object string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: String) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// Envelope identity shared by every chunk of one logical turn.
#[derive(Debug, Clone)]
pub struct ToolLoopMeta {
    pub id: String,
    pub created: i64,
    pub model: String,
}

impl ToolLoopMeta {
    pub fn new(requested_model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp(),
            model: format!("{MODEL_PREFIX}/{requested_model}"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    // The agent stream reports no token accounting.
    pub fn zero() -> Self {
        Self {
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
        }
    }
}

/// Non-streaming response body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<CompletionChoice>,
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionChoice {
    pub index: u32,
    pub message: AssistantMessage,
    pub finish_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantMessage {
    pub role: &'static str,
    /// `null` when the turn ends in tool calls.
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatCompletionResponse {
    pub fn text(meta: &ToolLoopMeta, content: String) -> Self {
        Self::build(
            meta,
            AssistantMessage {
                role: "assistant",
                content: Some(content),
                tool_calls: None,
            },
            "stop",
        )
    }

    pub fn tool_call(meta: &ToolLoopMeta, call: ToolCall) -> Self {
        Self::build(
            meta,
            AssistantMessage {
                role: "assistant",
                content: None,
                tool_calls: Some(vec![call]),
            },
            "tool_calls",
        )
    }

    fn build(meta: &ToolLoopMeta, message: AssistantMessage, finish_reason: &str) -> Self {
        Self {
            id: meta.id.clone(),
            object: "chat.completion",
            created: meta.created,
            model: meta.model.clone(),
            choices: vec![CompletionChoice {
                index: 0,
                message,
                finish_reason: finish_reason.to_string(),
            }],
            usage: Usage::zero(),
        }
    }
}

/// One streaming chunk.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkChoice {
    pub index: u32,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl ChatCompletionChunk {
    pub fn role_preamble(meta: &ToolLoopMeta) -> Self {
        Self::build(
            meta,
            ChunkDelta {
                role: Some("assistant"),
                ..Default::default()
            },
            None,
        )
    }

    pub fn text_delta(meta: &ToolLoopMeta, text: String) -> Self {
        Self::build(
            meta,
            ChunkDelta {
                content: Some(text),
                ..Default::default()
            },
            None,
        )
    }

    pub fn tool_call_delta(meta: &ToolLoopMeta, call: ToolCall) -> Self {
        Self::build(
            meta,
            ChunkDelta {
                tool_calls: Some(vec![call]),
                ..Default::default()
            },
            None,
        )
    }

    /// Terminal chunk: empty delta, finish reason set. Must be the last
    /// chunk on the stream.
    pub fn terminal(meta: &ToolLoopMeta, finish_reason: &str) -> Self {
        Self::build(meta, ChunkDelta::default(), Some(finish_reason.to_string()))
    }

    fn build(meta: &ToolLoopMeta, delta: ChunkDelta, finish_reason: Option<String>) -> Self {
        Self {
            id: meta.id.clone(),
            object: "chat.completion.chunk",
            created: meta.created,
            model: meta.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_accepts_string_and_part_content() {
        let req: ChatCompletionRequest = serde_json::from_value(json!({
            "model": "gpt-5",
            "messages": [
                {"role": "user", "content": "hi"},
                {"role": "user", "content": [{"type": "text", "text": "there"}]}
            ]
        }))
        .unwrap();
        assert_eq!(req.messages[0].content.as_ref().unwrap().to_plaintext(), "hi");
        assert_eq!(
            req.messages[1].content.as_ref().unwrap().to_plaintext(),
            "there"
        );
        assert!(req.allowed_tool_names().is_empty());
        assert!(!req.is_streaming());
    }

    #[test]
    fn tool_call_response_has_null_content() {
        let meta = ToolLoopMeta::new("gpt-5");
        let call = ToolCall::function("call_1", "read", "{}".to_string());
        let resp = ChatCompletionResponse::tool_call(&meta, call);

        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["object"], "chat.completion");
        assert_eq!(v["model"], "cursor-acp/gpt-5");
        assert_eq!(v["choices"][0]["index"], 0);
        assert_eq!(v["choices"][0]["finish_reason"], "tool_calls");
        assert!(v["choices"][0]["message"]["content"].is_null());
        assert_eq!(
            v["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
            "read"
        );
        assert_eq!(v["usage"]["total_tokens"], 0);
    }

    #[test]
    fn terminal_chunk_has_empty_delta() {
        let meta = ToolLoopMeta::new("gpt-5");
        let chunk = ChatCompletionChunk::terminal(&meta, "stop");
        let v = serde_json::to_value(&chunk).unwrap();
        assert_eq!(v["object"], "chat.completion.chunk");
        assert_eq!(v["choices"][0]["delta"], json!({}));
        assert_eq!(v["choices"][0]["finish_reason"], "stop");
    }
}
