//! NDJSON event parsing.
//!
//! The agent process emits one JSON value per stdout line. `parse_line`
//! is total: every input line produces either a JSON object or an
//! explicit absence, never an error that could kill the consuming stream.
//! Malformed lines are logged at debug level only.

use serde_json::Value;
use tracing::debug;

/// Parse one raw line into a JSON object.
///
/// Empty lines, undecodable lines, and non-object payloads (scalars,
/// arrays) all yield `None`.
pub fn parse_line(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => Some(value),
        Ok(_) => {
            debug!("dropping non-object ndjson payload");
            None
        }
        Err(err) => {
            debug!(error = %err, "dropping undecodable ndjson line");
            None
        }
    }
}

/// A typed event from the agent's NDJSON stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Incremental assistant text.
    AssistantTextDelta { text: String },
    /// A tool invocation. The raw object is retained so the translator
    /// can apply its name/args/call-id extraction rules.
    ToolInvocation { payload: Value },
    /// Generation finished.
    Done,
    /// The agent reported a failure; `raw` is classified downstream.
    ErrorEvent { raw: String },
}

/// Parse and classify one line. Objects with an unrecognized `type`
/// produce no event.
pub fn event_from_line(line: &str) -> Option<AgentEvent> {
    let value = parse_line(line)?;
    classify_event(value)
}

fn classify_event(value: Value) -> Option<AgentEvent> {
    let kind = value.get("type").and_then(|t| t.as_str())?;

    match kind {
        "assistant" => extract_assistant_text(&value)
            .map(|text| AgentEvent::AssistantTextDelta { text }),
        "tool_call" => Some(AgentEvent::ToolInvocation { payload: value }),
        "result" | "done" => Some(AgentEvent::Done),
        "error" => Some(AgentEvent::ErrorEvent {
            raw: extract_error_text(&value),
        }),
        _ => None,
    }
}

/// Assistant text arrives either as `message.content[].text` blocks or as
/// a top-level `text` field, depending on the agent build.
fn extract_assistant_text(value: &Value) -> Option<String> {
    if let Some(blocks) = value
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_array())
    {
        let text: String = blocks
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|b| b.get("text").and_then(|t| t.as_str()))
            .collect();
        return Some(text);
    }

    value
        .get("text")
        .and_then(|t| t.as_str())
        .map(|s| s.to_string())
}

fn extract_error_text(value: &Value) -> String {
    value
        .get("message")
        .or_else(|| value.get("error"))
        .and_then(|m| m.as_str())
        .map(|s| s.to_string())
        .unwrap_or_else(|| value.to_string())
}
