//! Tool registry: name -> definition, populated once at startup.

use std::collections::HashMap;

use serde_json::json;
use tracing::warn;

use crate::{ToolDefinition, ToolSource};

/// Registry of tool definitions, keyed by name.
///
/// Registration happens once at startup; the registry is read-only
/// afterwards, so concurrent in-flight requests need no locking.
/// Registering a name twice replaces the earlier definition (last wins).
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registry pre-populated with the fixed set of local tools.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for def in default_local_tools() {
            registry.register(def);
        }
        registry
    }

    pub fn register(&mut self, def: ToolDefinition) {
        if let Some(previous) = self.tools.insert(def.name.clone(), def) {
            warn!(name = %previous.name, "tool registration replaced an existing definition");
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn definitions(&self) -> Vec<&ToolDefinition> {
        let mut defs: Vec<&ToolDefinition> = self.tools.values().collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

fn string_arg(description: &str) -> serde_json::Value {
    json!({"type": "string", "description": description})
}

/// The fixed default tool set served by the local executor.
pub fn default_local_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "bash",
            "Run a shell command and return its combined output.",
            json!({
                "type": "object",
                "properties": {
                    "command": string_arg("The shell command to run"),
                    "timeout_ms": {"type": "number", "description": "Kill the command after this many milliseconds"}
                },
                "required": ["command"]
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "read",
            "Read the contents of a file.",
            json!({
                "type": "object",
                "properties": {
                    "path": string_arg("Path of the file to read"),
                    "offset": {"type": "number", "description": "Line to start from (0-indexed)"},
                    "limit": {"type": "number", "description": "Maximum number of lines"}
                },
                "required": ["path"]
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "write",
            "Write content to a file, creating parent directories as needed.",
            json!({
                "type": "object",
                "properties": {
                    "path": string_arg("Path of the file to write"),
                    "content": string_arg("Content to write")
                },
                "required": ["path", "content"]
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "edit",
            "Replace an exact string in a file. The old string must match exactly.",
            json!({
                "type": "object",
                "properties": {
                    "path": string_arg("Path of the file to edit"),
                    "old_string": string_arg("Exact string to replace"),
                    "new_string": string_arg("Replacement string"),
                    "replace_all": {"type": "boolean", "description": "Replace every occurrence (default: first only)"}
                },
                "required": ["path", "old_string", "new_string"]
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "grep",
            "Search file contents with a regular expression.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": string_arg("Regular expression to search for"),
                    "path": string_arg("File or directory to search (defaults to the working directory)"),
                    "case_insensitive": {"type": "boolean"}
                },
                "required": ["pattern"]
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "ls",
            "List directory entries.",
            json!({
                "type": "object",
                "properties": {"path": string_arg("Directory to list (defaults to the working directory)")}
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "mkdir",
            "Create a directory, including missing parents.",
            json!({
                "type": "object",
                "properties": {"path": string_arg("Directory to create")},
                "required": ["path"]
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "rm",
            "Remove a file, or a directory when recursive is set.",
            json!({
                "type": "object",
                "properties": {
                    "path": string_arg("Path to remove"),
                    "recursive": {"type": "boolean", "description": "Required to remove directories"}
                },
                "required": ["path"]
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "stat",
            "Report metadata (kind, size, modification time) for a path.",
            json!({
                "type": "object",
                "properties": {"path": string_arg("Path to inspect")},
                "required": ["path"]
            }),
            ToolSource::Local,
        ),
        ToolDefinition::new(
            "glob",
            "Find files matching a glob pattern like '**/*.rs'.",
            json!({
                "type": "object",
                "properties": {
                    "pattern": string_arg("Glob pattern to match"),
                    "path": string_arg("Base directory (defaults to the working directory)")
                },
                "required": ["pattern"]
            }),
            ToolSource::Local,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_the_local_tool_set() {
        let registry = ToolRegistry::with_defaults();
        for name in [
            "bash", "read", "write", "edit", "grep", "ls", "mkdir", "rm", "stat", "glob",
        ] {
            assert!(registry.has(name), "missing default tool {name}");
        }
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn duplicate_registration_last_wins() {
        let mut registry = ToolRegistry::new();
        registry.register(ToolDefinition::new(
            "echo",
            "first",
            json!({"type": "object"}),
            ToolSource::Local,
        ));
        registry.register(ToolDefinition::new(
            "echo",
            "second",
            json!({"type": "object"}),
            ToolSource::Cli,
        ));

        assert_eq!(registry.len(), 1);
        let def = registry.get("echo").unwrap();
        assert_eq!(def.description, "second");
        assert_eq!(def.source, ToolSource::Cli);
    }

    #[test]
    fn names_are_sorted() {
        let registry = ToolRegistry::with_defaults();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
    }
}
