//! Executor capability trait and the first-match executor chain.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{ExecErrorType, ExecutionResult};

/// A handler capable of executing some subset of tool names.
///
/// Implementations must never raise past this boundary: any underlying
/// failure is reported through an error [`ExecutionResult`].
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Whether this executor claims the given tool id.
    fn can_execute(&self, tool_id: &str) -> bool;

    /// Execute the tool. Only called after `can_execute` returned true.
    async fn execute(&self, tool_id: &str, args: &Value) -> ExecutionResult;
}

/// Route an invocation through an ordered executor chain.
///
/// Executors are consulted in order; the first one claiming the tool
/// executes it and its result is returned verbatim. When no executor
/// claims the tool, the single defined "unknown tool" error shape is
/// returned without invoking anyone.
pub async fn execute_with_chain(
    executors: &[Box<dyn ToolExecutor>],
    tool_id: &str,
    args: &Value,
) -> ExecutionResult {
    for executor in executors {
        if executor.can_execute(tool_id) {
            debug!(tool = %tool_id, "dispatching tool invocation");
            return executor.execute(tool_id, args).await;
        }
    }

    ExecutionResult::failure(
        format!("No executor available for tool '{tool_id}'"),
        ExecErrorType::Fatal,
    )
}
