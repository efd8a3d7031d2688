//! Tool layer for the acpx bridge: definitions, registry, and the chained
//! execution engine.
//!
//! The registry holds immutable [`ToolDefinition`]s registered once at
//! startup. Invocations are routed through an ordered list of
//! [`ToolExecutor`]s; the first executor that claims a tool name runs it
//! and its [`ExecutionResult`] is returned verbatim.

pub mod chain;
pub mod local;
pub mod registry;
pub mod types;

pub use chain::{execute_with_chain, ToolExecutor};
pub use local::{LocalExecutor, LOCAL_TOOL_NAMES};
pub use registry::{default_local_tools, ToolRegistry};
pub use types::{ExecErrorType, ExecStatus, ExecutionResult, ToolDefinition, ToolError, ToolSource};
