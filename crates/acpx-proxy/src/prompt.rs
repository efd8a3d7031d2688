//! Prompt building.
//!
//! The agent consumes a single text prompt per turn, so the OpenAI
//! message history (including prior assistant tool calls and their
//! `role:"tool"` results) and the declared tool catalogue are flattened
//! into one document. Tool results must round-trip: a follow-up request
//! carrying a `role:"tool"` message continues the same conversation from
//! the agent's point of view.

use crate::types::{ChatMessage, DeclaredTool};

/// Flatten chat history and tool catalogue into the agent prompt.
pub fn build_prompt(messages: &[ChatMessage], tools: Option<&[DeclaredTool]>) -> String {
    let mut sections: Vec<String> = Vec::new();

    if let Some(tools) = tools.filter(|t| !t.is_empty()) {
        sections.push(render_tool_catalogue(tools));
    }

    for message in messages {
        match message.role.as_str() {
            "system" => {
                if let Some(text) = content_text(message) {
                    sections.push(format!("[system] {text}"));
                }
            }
            "user" => {
                if let Some(text) = content_text(message) {
                    sections.push(format!("[user] {text}"));
                }
            }
            "assistant" => {
                if let Some(text) = content_text(message) {
                    sections.push(format!("[assistant] {text}"));
                }
                for call in message.tool_calls.as_deref().unwrap_or_default() {
                    sections.push(format!(
                        "[assistant] requested tool {} (id {}) with arguments {}",
                        call.function.name, call.id, call.function.arguments
                    ));
                }
            }
            "tool" => {
                let call_id = message.tool_call_id.as_deref().unwrap_or("call_unknown");
                let text = content_text(message).unwrap_or_default();
                sections.push(format!("[tool result {call_id}] {text}"));
            }
            other => {
                // Unknown roles are flattened as plain context, not dropped.
                if let Some(text) = content_text(message) {
                    sections.push(format!("[{other}] {text}"));
                }
            }
        }
    }

    sections.push("[assistant]".to_string());
    sections.join("\n\n")
}

/// Render a locally executed tool result as a follow-up agent turn.
pub fn render_tool_result(tool_name: &str, call_id: &str, body: &str, success: bool) -> String {
    let status = if success { "ok" } else { "error" };
    format!("[tool result {call_id}] {tool_name} ({status}): {body}")
}

fn render_tool_catalogue(tools: &[DeclaredTool]) -> String {
    let mut out = String::from(
        "You may request the following tools. To call one, emit a tool_call event with the tool name and JSON arguments.",
    );
    for tool in tools {
        out.push_str(&format!("\n- {}", tool.function.name));
        if let Some(desc) = &tool.function.description {
            out.push_str(&format!(": {desc}"));
        }
        if let Some(params) = &tool.function.parameters {
            out.push_str(&format!(" (parameters: {params})"));
        }
    }
    out
}

fn content_text(message: &ChatMessage) -> Option<String> {
    let text = message.content.as_ref()?.to_plaintext();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeclaredFunction, MessageContent, ToolCall};
    use serde_json::json;

    fn msg(role: &str, content: &str) -> ChatMessage {
        ChatMessage {
            role: role.to_string(),
            content: Some(MessageContent::String(content.to_string())),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    #[test]
    fn history_is_flattened_in_order() {
        let prompt = build_prompt(
            &[
                msg("system", "be terse"),
                msg("user", "list files"),
                msg("assistant", "sure"),
            ],
            None,
        );
        let sys = prompt.find("[system] be terse").unwrap();
        let user = prompt.find("[user] list files").unwrap();
        let assistant = prompt.find("[assistant] sure").unwrap();
        assert!(sys < user && user < assistant);
        assert!(prompt.trim_end().ends_with("[assistant]"));
    }

    #[test]
    fn tool_results_round_trip_with_call_id() {
        let history = vec![
            msg("user", "read the readme"),
            ChatMessage {
                role: "assistant".to_string(),
                content: None,
                tool_calls: Some(vec![ToolCall::function(
                    "call_7",
                    "read",
                    r#"{"path":"README.md"}"#.to_string(),
                )]),
                tool_call_id: None,
            },
            ChatMessage {
                role: "tool".to_string(),
                content: Some(MessageContent::String("# acpx".to_string())),
                tool_calls: None,
                tool_call_id: Some("call_7".to_string()),
            },
        ];
        let prompt = build_prompt(&history, None);
        assert!(prompt.contains("requested tool read (id call_7)"));
        assert!(prompt.contains("[tool result call_7] # acpx"));
    }

    #[test]
    fn catalogue_lists_declared_tools() {
        let tools = vec![DeclaredTool {
            kind: "function".to_string(),
            function: DeclaredFunction {
                name: "read".to_string(),
                description: Some("Read a file".to_string()),
                parameters: Some(json!({"type": "object"})),
            },
        }];
        let prompt = build_prompt(&[msg("user", "hi")], Some(&tools));
        assert!(prompt.contains("- read: Read a file"));
        assert!(prompt.contains(r#"(parameters: {"type":"object"})"#));
    }

    #[test]
    fn local_tool_result_rendering() {
        let ok = render_tool_result("ls", "call_1", "a.txt", true);
        assert_eq!(ok, "[tool result call_1] ls (ok): a.txt");
        let err = render_tool_result("read", "call_2", "no such file", false);
        assert!(err.contains("(error)"));
    }
}
