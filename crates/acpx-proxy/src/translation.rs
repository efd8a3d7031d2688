//! Agent tool-invocation -> OpenAI tool-call translation.
//!
//! Agent events carry loosely-typed invocation payloads in two shapes:
//! a flat `{name, call_id, args}` object, or a nested `tool_call` map
//! keyed by an upstream event name such as `readToolCall`. Translation
//! resolves the name and arguments, gates on the caller's declared tool
//! set, and canonicalizes arguments into a valid JSON-object string.

use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::types::ToolCall;

pub const FALLBACK_CALL_ID: &str = "call_unknown";

/// A resolved invocation, before the allowed-name gate.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationParts {
    pub name: String,
    pub call_id: String,
    pub args: Option<Value>,
}

/// Resolve `{name, call_id, args}` out of a raw invocation payload.
///
/// The top-level `name` field takes precedence; otherwise the first entry
/// of a nested `tool_call` map is used, with its key normalized via
/// [`normalize_tool_name`] and its `args` field as arguments. Payloads
/// with neither shape resolve to `None`.
pub fn extract_invocation(payload: &Value) -> Option<ToolInvocationParts> {
    let call_id = payload
        .get("call_id")
        .or_else(|| payload.get("tool_call_id"))
        .and_then(|v| v.as_str())
        .unwrap_or(FALLBACK_CALL_ID)
        .to_string();

    if let Some(name) = payload.get("name").and_then(|v| v.as_str()) {
        return Some(ToolInvocationParts {
            name: name.to_string(),
            call_id,
            args: payload.get("args").cloned(),
        });
    }

    let nested = payload.get("tool_call").and_then(|v| v.as_object())?;
    let (key, entry) = nested.iter().next()?;
    Some(ToolInvocationParts {
        name: normalize_tool_name(key),
        call_id,
        args: entry.get("args").cloned(),
    })
}

/// Normalize an upstream event key into a tool name: a trailing
/// `ToolCall` suffix is stripped and the result is lower-camel-cased.
///
/// This mirrors the upstream agent's event naming (`readToolCall`,
/// `WebSearchToolCall`, ...); it is not a general tool-naming rule.
pub fn normalize_tool_name(key: &str) -> String {
    let stem = key.strip_suffix("ToolCall").filter(|s| !s.is_empty()).unwrap_or(key);
    let mut chars = stem.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Serialize invocation arguments into a valid JSON-object string.
///
/// Object strings are re-serialized canonically; scalar JSON strings and
/// native scalars are wrapped as `{"value": ...}`; unparsable strings are
/// wrapped with the raw text; a missing value becomes `"{}"`.
pub fn arguments_to_json_string(args: Option<&Value>) -> String {
    let wrapped = match args {
        None => return "{}".to_string(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Value::Object(map),
            Ok(other) => json!({ "value": other }),
            Err(_) => json!({ "value": s }),
        },
        Some(Value::Object(map)) => Value::Object(map.clone()),
        Some(other) => json!({ "value": other }),
    };
    serialize_object(wrapped)
}

fn serialize_object(value: Value) -> String {
    serde_json::to_string(&value).unwrap_or_else(|_| "{}".to_string())
}

/// Decide whether an invocation payload is a legitimate, forwardable
/// OpenAI tool call.
///
/// Returns `None` when the caller declared no tools (agent-native tool
/// chatter is suppressed, not errored), when the payload has no
/// resolvable name, or when the resolved name is not in the caller's
/// declared set.
pub fn translate_tool_invocation(
    payload: &Value,
    allowed_tool_names: &HashSet<String>,
) -> Option<ToolCall> {
    if allowed_tool_names.is_empty() {
        return None;
    }

    let parts = extract_invocation(payload)?;
    if !allowed_tool_names.contains(&parts.name) {
        return None;
    }

    Some(ToolCall::function(
        parts.call_id,
        parts.name,
        arguments_to_json_string(parts.args.as_ref()),
    ))
}

/// Build the argument object handed to the local executor chain.
pub fn arguments_as_object(args: Option<&Value>) -> Value {
    match serde_json::from_str::<Value>(&arguments_to_json_string(args)) {
        Ok(v) => v,
        Err(_) => Value::Object(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_declared_tools_suppresses_everything() {
        let payload = json!({"type": "tool_call", "name": "read", "args": {"path": "x"}});
        assert_eq!(translate_tool_invocation(&payload, &HashSet::new()), None);
    }

    #[test]
    fn undeclared_name_is_suppressed() {
        let payload = json!({"type": "tool_call", "name": "internal_scratchpad"});
        assert_eq!(translate_tool_invocation(&payload, &allowed(&["read"])), None);
    }

    #[test]
    fn top_level_name_takes_precedence_over_nested() {
        let payload = json!({
            "type": "tool_call",
            "name": "read",
            "tool_call": {"writeToolCall": {"args": {}}},
            "args": {"path": "x"}
        });
        let call = translate_tool_invocation(&payload, &allowed(&["read", "write"])).unwrap();
        assert_eq!(call.function.name, "read");
    }

    #[test]
    fn nested_key_is_normalized() {
        assert_eq!(normalize_tool_name("readToolCall"), "read");
        assert_eq!(normalize_tool_name("WebSearchToolCall"), "webSearch");
        assert_eq!(normalize_tool_name("grep"), "grep");
        assert_eq!(normalize_tool_name("ToolCall"), "toolCall");

        let payload = json!({
            "type": "tool_call",
            "tool_call": {"ReadToolCall": {"args": {"path": "x"}}}
        });
        let call = translate_tool_invocation(&payload, &allowed(&["read"])).unwrap();
        assert_eq!(call.function.name, "read");
        assert_eq!(call.function.arguments, r#"{"path":"x"}"#);
    }

    #[test]
    fn call_id_defaulting_chain() {
        let with_call_id = json!({"name": "read", "call_id": "c1", "tool_call_id": "c2"});
        assert_eq!(extract_invocation(&with_call_id).unwrap().call_id, "c1");

        let with_tool_call_id = json!({"name": "read", "tool_call_id": "c2"});
        assert_eq!(extract_invocation(&with_tool_call_id).unwrap().call_id, "c2");

        let bare = json!({"name": "read"});
        assert_eq!(extract_invocation(&bare).unwrap().call_id, "call_unknown");
    }

    #[test]
    fn object_string_arguments_reserialize_canonically() {
        let args = Value::String(r#"{"a":1}"#.to_string());
        assert_eq!(arguments_to_json_string(Some(&args)), r#"{"a":1}"#);
    }

    #[test]
    fn scalar_arguments_are_wrapped() {
        assert_eq!(
            arguments_to_json_string(Some(&json!(42))),
            r#"{"value":42}"#
        );
        assert_eq!(
            arguments_to_json_string(Some(&Value::String("7".to_string()))),
            r#"{"value":7}"#
        );
    }

    #[test]
    fn unparsable_string_arguments_are_wrapped_raw() {
        let args = Value::String("not {json".to_string());
        assert_eq!(
            arguments_to_json_string(Some(&args)),
            r#"{"value":"not {json"}"#
        );
    }

    #[test]
    fn native_object_arguments_serialize_directly() {
        assert_eq!(
            arguments_to_json_string(Some(&json!({"a": 1}))),
            r#"{"a":1}"#
        );
    }

    #[test]
    fn missing_arguments_become_empty_object() {
        assert_eq!(arguments_to_json_string(None), "{}");
    }

    #[test]
    fn payload_without_resolvable_name_is_absent() {
        assert_eq!(extract_invocation(&json!({"type": "tool_call"})), None);
        assert_eq!(
            extract_invocation(&json!({"type": "tool_call", "tool_call": {}})),
            None
        );
        assert_eq!(
            extract_invocation(&json!({"type": "tool_call", "tool_call": "not-a-map"})),
            None
        );
    }
}
