//! Multi-turn loop driver.
//!
//! Consumes one request's agent event stream and yields turn items in
//! arrival order. A forwardable tool call ends the turn (the caller
//! continues the loop with a follow-up request); non-forwardable
//! invocations are executed locally through the executor chain and their
//! results fed back into the session, which then resumes generation.

use std::collections::HashSet;
use std::sync::Arc;

use async_stream::stream;
use futures::Stream;
use tracing::{debug, warn};

use acpx_tools::{execute_with_chain, ToolExecutor};

use crate::classify::{classify, ClassifiedError};
use crate::ndjson::{event_from_line, AgentEvent};
use crate::prompt::render_tool_result;
use crate::session::AgentSession;
use crate::translation::{arguments_as_object, extract_invocation, translate_tool_invocation};
use crate::types::ToolCall;

/// One observable step of a turn.
#[derive(Debug)]
pub enum TurnItem {
    TextDelta(String),
    ToolCall(ToolCall),
    Done,
    Failed(ClassifiedError),
}

/// Per-request turn parameters.
pub struct TurnContext {
    pub allowed_tool_names: HashSet<String>,
    pub executors: Arc<Vec<Box<dyn ToolExecutor>>>,
    pub max_tool_turns: usize,
}

/// Drive one agent turn to completion.
///
/// The final item is always `ToolCall`, `Done`, or `Failed`; text deltas
/// are yielded strictly in agent-event arrival order.
pub fn drive_turn(
    mut session: Box<dyn AgentSession>,
    prompt: String,
    ctx: TurnContext,
) -> impl Stream<Item = TurnItem> {
    stream! {
        if let Err(err) = session.send(&prompt).await {
            warn!(error = %err, "failed to start agent turn");
            yield TurnItem::Failed(classify(Some(&err.to_string())));
            return;
        }

        let mut internal_turns = 0usize;
        loop {
            let line = match session.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    // Stream ended without an explicit result event.
                    yield TurnItem::Done;
                    return;
                }
                Err(err) => {
                    yield TurnItem::Failed(classify(Some(&err.to_string())));
                    return;
                }
            };

            let Some(event) = event_from_line(&line) else {
                continue;
            };

            match event {
                AgentEvent::AssistantTextDelta { text } => {
                    if !text.is_empty() {
                        yield TurnItem::TextDelta(text);
                    }
                }
                AgentEvent::Done => {
                    yield TurnItem::Done;
                    return;
                }
                AgentEvent::ErrorEvent { raw } => {
                    yield TurnItem::Failed(classify(Some(&raw)));
                    return;
                }
                AgentEvent::ToolInvocation { payload } => {
                    if let Some(call) =
                        translate_tool_invocation(&payload, &ctx.allowed_tool_names)
                    {
                        // The single tool call of this turn; continuation
                        // is the caller's follow-up request.
                        yield TurnItem::ToolCall(call);
                        return;
                    }

                    // Internal tool: execute locally and resume.
                    let Some(parts) = extract_invocation(&payload) else {
                        continue;
                    };

                    internal_turns += 1;
                    if internal_turns > ctx.max_tool_turns {
                        warn!(
                            limit = ctx.max_tool_turns,
                            "internal tool loop limit reached"
                        );
                        let mut err = ClassifiedError::unknown(false);
                        err.user_message = format!(
                            "The agent exceeded the internal tool limit of {} invocations.",
                            ctx.max_tool_turns
                        );
                        yield TurnItem::Failed(err);
                        return;
                    }

                    let args = arguments_as_object(parts.args.as_ref());
                    let result = execute_with_chain(&ctx.executors, &parts.name, &args).await;
                    debug!(
                        tool = %parts.name,
                        success = result.is_success(),
                        "executed internal tool"
                    );

                    let body = if result.is_success() {
                        result.output.clone().unwrap_or_default()
                    } else {
                        result.error.clone().unwrap_or_default()
                    };
                    let follow_up =
                        render_tool_result(&parts.name, &parts.call_id, &body, result.is_success());

                    if let Err(err) = session.send(&follow_up).await {
                        yield TurnItem::Failed(classify(Some(&err.to_string())));
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::Value;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays one queued batch of NDJSON lines per `send` call.
    struct ScriptedSession {
        batches: VecDeque<Vec<String>>,
        queue: VecDeque<String>,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedSession {
        fn new(batches: Vec<Vec<&str>>) -> (Self, Arc<Mutex<Vec<String>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    batches: batches
                        .into_iter()
                        .map(|b| b.into_iter().map(|s| s.to_string()).collect())
                        .collect(),
                    queue: VecDeque::new(),
                    sent: Arc::clone(&sent),
                },
                sent,
            )
        }
    }

    #[async_trait]
    impl AgentSession for ScriptedSession {
        async fn send(&mut self, text: &str) -> anyhow::Result<()> {
            self.sent.lock().unwrap().push(text.to_string());
            if let Some(batch) = self.batches.pop_front() {
                self.queue.extend(batch);
            }
            Ok(())
        }

        async fn next_line(&mut self) -> anyhow::Result<Option<String>> {
            Ok(self.queue.pop_front())
        }
    }

    struct ScratchExecutor;

    #[async_trait]
    impl ToolExecutor for ScratchExecutor {
        fn can_execute(&self, tool_id: &str) -> bool {
            tool_id == "scratch"
        }

        async fn execute(&self, _tool_id: &str, _args: &Value) -> acpx_tools::ExecutionResult {
            acpx_tools::ExecutionResult::success("47")
        }
    }

    fn ctx(allowed: &[&str], executors: Vec<Box<dyn ToolExecutor>>, max: usize) -> TurnContext {
        TurnContext {
            allowed_tool_names: allowed.iter().map(|s| s.to_string()).collect(),
            executors: Arc::new(executors),
            max_tool_turns: max,
        }
    }

    async fn collect(
        session: ScriptedSession,
        prompt: &str,
        ctx: TurnContext,
    ) -> Vec<TurnItem> {
        let stream = drive_turn(Box::new(session), prompt.to_string(), ctx);
        futures::pin_mut!(stream);
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn plain_text_turn_yields_deltas_then_done() {
        let (session, _) = ScriptedSession::new(vec![vec![
            r#"{"type": "assistant", "text": "Hel"}"#,
            r#"{"type": "assistant", "text": "lo"}"#,
            r#"{"type": "garbage"}"#,
            "not json",
            r#"{"type": "result"}"#,
        ]]);

        let items = collect(session, "hi", ctx(&[], vec![], 16)).await;
        assert_eq!(items.len(), 3);
        assert!(matches!(&items[0], TurnItem::TextDelta(t) if t == "Hel"));
        assert!(matches!(&items[1], TurnItem::TextDelta(t) if t == "lo"));
        assert!(matches!(items[2], TurnItem::Done));
    }

    #[tokio::test]
    async fn declared_tool_call_ends_the_turn() {
        let (session, _) = ScriptedSession::new(vec![vec![
            r#"{"type": "tool_call", "name": "read", "call_id": "c1", "args": {"path": "x"}}"#,
            r#"{"type": "result"}"#,
        ]]);

        let items = collect(session, "hi", ctx(&["read"], vec![], 16)).await;
        assert_eq!(items.len(), 1);
        match &items[0] {
            TurnItem::ToolCall(call) => {
                assert_eq!(call.id, "c1");
                assert_eq!(call.function.name, "read");
                assert_eq!(call.function.arguments, r#"{"path":"x"}"#);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn internal_tool_is_executed_and_session_resumes() {
        let (session, sent) = ScriptedSession::new(vec![
            vec![r#"{"type": "tool_call", "name": "scratch", "call_id": "c9"}"#],
            vec![
                r#"{"type": "assistant", "text": "the answer is 47"}"#,
                r#"{"type": "result"}"#,
            ],
        ]);

        let items = collect(
            session,
            "compute",
            ctx(&[], vec![Box::new(ScratchExecutor)], 16),
        )
        .await;

        assert!(matches!(&items[0], TurnItem::TextDelta(t) if t.contains("47")));
        assert!(matches!(items[1], TurnItem::Done));

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], "compute");
        assert!(sent[1].contains("scratch (ok): 47"));
        assert!(sent[1].contains("c9"));
    }

    #[tokio::test]
    async fn unclaimed_internal_tool_feeds_back_the_error() {
        let (session, sent) = ScriptedSession::new(vec![
            vec![r#"{"type": "tool_call", "name": "mystery"}"#],
            vec![r#"{"type": "result"}"#],
        ]);

        let items = collect(session, "go", ctx(&[], vec![], 16)).await;
        assert!(matches!(items.last(), Some(TurnItem::Done)));

        let sent = sent.lock().unwrap();
        assert!(sent[1].contains("(error)"));
        assert!(sent[1].contains("No executor"));
    }

    #[tokio::test]
    async fn agent_error_event_is_classified() {
        let (session, _) = ScriptedSession::new(vec![vec![
            r#"{"type": "error", "message": "connect ECONNREFUSED 127.0.0.1:1"}"#,
        ]]);

        let items = collect(session, "hi", ctx(&[], vec![], 16)).await;
        match &items[0] {
            TurnItem::Failed(err) => {
                assert_eq!(err.kind, ErrorKind::Network);
                assert!(err.recoverable);
            }
            other => panic!("unexpected item: {other:?}"),
        }
    }

    #[tokio::test]
    async fn internal_loop_is_bounded() {
        let (session, _) = ScriptedSession::new(vec![
            vec![r#"{"type": "tool_call", "name": "scratch"}"#],
            vec![r#"{"type": "tool_call", "name": "scratch"}"#],
            vec![r#"{"type": "result"}"#],
        ]);

        let items = collect(
            session,
            "loop forever",
            ctx(&[], vec![Box::new(ScratchExecutor)], 1),
        )
        .await;

        match items.last() {
            Some(TurnItem::Failed(err)) => {
                assert_eq!(err.kind, ErrorKind::Unknown);
                assert!(!err.recoverable);
                assert!(err.user_message.contains("tool limit"));
            }
            other => panic!("unexpected final item: {other:?}"),
        }
    }
}
