//! acpx proxy - local HTTP bridge from an NDJSON coding agent to the
//! OpenAI chat-completions API.
//!
//! The proxy binds a loopback port from a fixed range, accepts
//! `POST /v1/chat/completions` (streaming and non-streaming), flattens the
//! chat history into a prompt for the agent subprocess, and turns the
//! agent's NDJSON event stream back into OpenAI envelopes. Tool calls the
//! caller declared in `tools[]` end the turn with `finish_reason:
//! "tool_calls"`; everything else is executed locally and fed back so the
//! agent can keep going.

pub mod classify;
pub mod config;
pub mod ndjson;
pub mod port;
pub mod prompt;
pub mod server;
pub mod session;
pub mod streaming;
pub mod translation;
pub mod turn;
pub mod types;

pub use classify::{classify, format_error_for_user, is_recoverable_error, ClassifiedError, ErrorKind};
pub use config::ProxyConfig;
pub use port::{find_available_port, BASE_PORT, PORT_RANGE};
pub use server::{serve, ProxyServer};
pub use session::{AgentSession, SessionFactory};
pub use types::{ChatCompletionRequest, ChatCompletionResponse, ToolCall, MODEL_PREFIX};
