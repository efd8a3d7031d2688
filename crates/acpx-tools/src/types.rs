//! Tool metadata and execution result types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Where a tool definition came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    Sdk,
    Cli,
    Local,
    Mcp,
}

/// A registered tool. Immutable after startup registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's arguments.
    pub parameters: Value,
    pub source: ToolSource,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        source: ToolSource,
    ) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            description: description.into(),
            parameters,
            source,
        }
    }
}

/// Outcome status of a single tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecStatus {
    Success,
    Error,
}

/// How a failed execution should be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecErrorType {
    Recoverable,
    Fatal,
}

/// Result of exactly one executor handling one invocation.
///
/// Either `output` or `error` is set, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ExecErrorType>,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            status: ExecStatus::Success,
            output: Some(output.into()),
            error: None,
            error_type: None,
        }
    }

    pub fn failure(error: impl Into<String>, error_type: ExecErrorType) -> Self {
        Self {
            status: ExecStatus::Error,
            output: None,
            error: Some(error.into()),
            error_type: Some(error_type),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecStatus::Success
    }
}

impl From<ToolError> for ExecutionResult {
    fn from(err: ToolError) -> Self {
        let error_type = match err {
            ToolError::InvalidInput { .. } | ToolError::NotFound { .. } => ExecErrorType::Fatal,
            ToolError::ExecutionFailed { .. } => ExecErrorType::Recoverable,
        };
        ExecutionResult::failure(err.to_string(), error_type)
    }
}

/// Typed failures inside an executor. These never cross the chain boundary;
/// they are converted into error [`ExecutionResult`]s.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("tool not found: {name}")]
    NotFound { name: String },

    #[error("execution failed: {message}")]
    ExecutionFailed { message: String },
}
