//! Configuration from environment variables.
//!
//! **Environment variables:**
//! - `ACPX_PORT`: fixed server port (default: allocate from the range)
//! - `ACPX_HOST`: bind host (default: 127.0.0.1)
//! - `ACPX_HEALTH_PATH`: health-check route (default: /health)
//! - `ACPX_AGENT_CMD`: agent command line, whitespace-separated
//!   (default: `cursor-agent --output-format stream-json`)
//! - `REQUEST_TIMEOUT_SECS`: per-request turn timeout (default: 120)
//! - `ACPX_MAX_TOOL_TURNS`: bound on internal tool invocations per
//!   request (default: 16)

use std::env;

/// Proxy configuration. Consumed, not owned, by the core components.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Fixed port; `None` or `Some(0)` means allocate from the range.
    pub port: Option<u16>,
    pub host: String,
    pub health_check_path: String,
    pub request_timeout_secs: u64,
    pub agent_command: String,
    pub agent_args: Vec<String>,
    pub max_tool_turns: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        let (agent_command, agent_args) = parse_agent_cmd(
            &env::var("ACPX_AGENT_CMD")
                .unwrap_or_else(|_| "cursor-agent --output-format stream-json".to_string()),
        );

        Self {
            port: env::var("ACPX_PORT").ok().and_then(|p| p.parse().ok()),
            host: env::var("ACPX_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            health_check_path: env::var("ACPX_HEALTH_PATH")
                .unwrap_or_else(|_| "/health".to_string()),
            request_timeout_secs: env::var("REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(120),
            agent_command,
            agent_args,
            max_tool_turns: env::var("ACPX_MAX_TOOL_TURNS")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(16),
        }
    }
}

impl ProxyConfig {
    /// Whether a usable fixed port was requested.
    pub fn fixed_port(&self) -> Option<u16> {
        self.port.filter(|p| *p != 0)
    }
}

fn parse_agent_cmd(raw: &str) -> (String, Vec<String>) {
    let mut parts = raw.split_whitespace().map(|s| s.to_string());
    let command = parts.next().unwrap_or_else(|| "cursor-agent".to_string());
    (command, parts.collect())
}
