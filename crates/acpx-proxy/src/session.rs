//! Agent session boundary.
//!
//! An agent session is an external process that, given prompt text on
//! stdin, emits NDJSON event lines on stdout. The proxy only depends on
//! the [`AgentSession`] contract; [`ProcessSession`] is the production
//! implementation, and tests substitute scripted sessions through
//! [`SessionFactory`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use crate::config::ProxyConfig;

/// A live agent conversation.
#[async_trait]
pub trait AgentSession: Send {
    /// Feed a user-visible turn (prompt or tool result) into the session.
    async fn send(&mut self, text: &str) -> Result<()>;

    /// Next raw NDJSON line, or `None` when the stream ends.
    async fn next_line(&mut self) -> Result<Option<String>>;
}

/// Spawns sessions; one per HTTP request.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn spawn(&self) -> Result<Box<dyn AgentSession>>;
}

/// Session backed by the configured agent subprocess.
pub struct ProcessSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl ProcessSession {
    pub fn spawn(command: &str, args: &[String]) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn agent process '{command}'"))?;

        let stdin = child
            .stdin
            .take()
            .context("agent process has no stdin handle")?;
        let stdout = child
            .stdout
            .take()
            .context("agent process has no stdout handle")?;

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        })
    }
}

#[async_trait]
impl AgentSession for ProcessSession {
    async fn send(&mut self, text: &str) -> Result<()> {
        // One JSON line per turn; the agent reads newline-delimited input.
        let line = serde_json::to_string(&serde_json::json!({
            "type": "user",
            "text": text,
        }))
        .context("failed to encode user turn")?;

        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("failed to write to agent stdin")?;
        self.stdin
            .write_all(b"\n")
            .await
            .context("failed to write to agent stdin")?;
        self.stdin
            .flush()
            .await
            .context("failed to flush agent stdin")?;
        Ok(())
    }

    async fn next_line(&mut self) -> Result<Option<String>> {
        let line = self
            .stdout
            .next_line()
            .await
            .context("failed to read from agent stdout")?;
        if line.is_none() {
            debug!("agent stdout closed");
        }
        Ok(line)
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
    }
}

/// Factory for [`ProcessSession`]s using the configured agent command.
pub struct ProcessSessionFactory {
    command: String,
    args: Vec<String>,
}

impl ProcessSessionFactory {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            command: config.agent_command.clone(),
            args: config.agent_args.clone(),
        }
    }
}

#[async_trait]
impl SessionFactory for ProcessSessionFactory {
    async fn spawn(&self) -> Result<Box<dyn AgentSession>> {
        Ok(Box::new(ProcessSession::spawn(&self.command, &self.args)?))
    }
}
