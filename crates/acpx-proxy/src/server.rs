//! Proxy server lifecycle and HTTP surface.
//!
//! Each [`ProxyServer`] instance owns its own configuration, bound port,
//! and actix server handle; there are no globals, so multiple instances
//! can run side by side. Routes: `GET {health_check_path}`,
//! `POST /v1/chat/completions`, everything else 404.
//!
//! A client disconnect mid-stream drops the response body stream, which
//! drops the agent session and kills the subprocess; the server itself is
//! unaffected.

use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use anyhow::{Context, Result};
use futures::StreamExt;
use serde_json::json;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use acpx_tools::{LocalExecutor, ToolExecutor, ToolRegistry};

use crate::classify::{classify, ClassifiedError};
use crate::config::ProxyConfig;
use crate::port::find_available_port;
use crate::prompt::build_prompt;
use crate::session::{AgentSession, ProcessSessionFactory, SessionFactory};
use crate::streaming::sse_stream;
use crate::translation::FALLBACK_CALL_ID;
use crate::turn::{drive_turn, TurnContext, TurnItem};
use crate::types::{ChatCompletionRequest, ChatCompletionResponse, ToolCall, ToolLoopMeta};

/// Shared per-server state handed to every handler.
pub struct AppState {
    pub config: ProxyConfig,
    pub registry: Arc<ToolRegistry>,
    pub executors: Arc<Vec<Box<dyn ToolExecutor>>>,
    pub sessions: Arc<dyn SessionFactory>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Stopped,
    Starting,
    Listening,
}

/// A single proxy server instance.
pub struct ProxyServer {
    config: ProxyConfig,
    sessions: Arc<dyn SessionFactory>,
    state: ServerState,
    handle: Option<ServerHandle>,
    port: Option<u16>,
}

impl ProxyServer {
    /// Server backed by the configured agent subprocess.
    pub fn new(config: ProxyConfig) -> Self {
        let sessions = Arc::new(ProcessSessionFactory::from_config(&config));
        Self::with_session_factory(config, sessions)
    }

    /// Server with an injected session factory.
    pub fn with_session_factory(config: ProxyConfig, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            config,
            sessions,
            state: ServerState::Stopped,
            handle: None,
            port: None,
        }
    }

    /// Start listening and return the base URL. Idempotent: a listening
    /// server returns its existing base URL unchanged.
    pub async fn start(&mut self) -> Result<String> {
        if self.state == ServerState::Listening {
            return Ok(self.base_url());
        }
        self.state = ServerState::Starting;

        let listener = match self.bind_listener() {
            Ok(listener) => listener,
            Err(err) => {
                self.state = ServerState::Stopped;
                return Err(err);
            }
        };
        listener
            .set_nonblocking(true)
            .context("failed to configure listener")?;
        let port = listener
            .local_addr()
            .context("failed to read bound address")?
            .port();

        let registry = Arc::new(ToolRegistry::with_defaults());
        info!(tools = registry.len(), port, "starting proxy server");

        let executors: Arc<Vec<Box<dyn ToolExecutor>>> =
            Arc::new(vec![Box::new(LocalExecutor::new())]);
        let state = web::Data::new(AppState {
            config: self.config.clone(),
            registry,
            executors,
            sessions: Arc::clone(&self.sessions),
        });

        let health_path = self.config.health_check_path.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .route(&health_path, web::get().to(health))
                .route("/v1/chat/completions", web::post().to(chat_completions))
                .default_service(web::route().to(not_found))
        })
        .workers(1)
        .disable_signals()
        .listen(listener)
        .context("failed to attach listener")?
        .run();

        self.handle = Some(server.handle());
        tokio::spawn(server);

        self.port = Some(port);
        self.state = ServerState::Listening;
        Ok(self.base_url())
    }

    /// Force-close the listener. No-op when not started.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            // stop(false): no graceful drain, in-flight streams are cut.
            handle.stop(false).await;
            info!(port = self.port, "proxy server stopped");
        }
        self.port = None;
        self.state = ServerState::Stopped;
    }

    /// Bound port while listening.
    pub fn port(&self) -> Option<u16> {
        if self.state == ServerState::Listening {
            self.port
        } else {
            None
        }
    }

    /// `http://{host}:{port}/v1` while listening, empty otherwise.
    pub fn base_url(&self) -> String {
        match self.port() {
            Some(port) => format!("http://{}:{}/v1", self.config.host, port),
            None => String::new(),
        }
    }

    fn bind_listener(&self) -> Result<TcpListener> {
        let host = self.config.host.as_str();

        if let Some(port) = self.config.fixed_port() {
            return match TcpListener::bind((host, port)) {
                Ok(listener) => Ok(listener),
                Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                    warn!(port, "requested port is busy, allocating another");
                    let fallback = find_available_port(host).with_context(|| {
                        format!("requested port {port} is busy ({err}) and fallback allocation failed")
                    })?;
                    TcpListener::bind((host, fallback))
                        .with_context(|| format!("failed to bind fallback port {fallback}"))
                }
                Err(err) => {
                    // Only AddrInUse gets the fallback; anything else is
                    // logged and propagated as-is.
                    error!(port, error = %err, "failed to bind requested port");
                    Err(err).with_context(|| format!("failed to bind {host}:{port}"))
                }
            };
        }

        let port = find_available_port(host)?;
        TcpListener::bind((host, port)).with_context(|| format!("failed to bind {host}:{port}"))
    }
}

/// Start a server from config and run until interrupted.
pub async fn serve(config: ProxyConfig) -> Result<()> {
    let mut server = ProxyServer::new(config);
    let base_url = server.start().await?;
    info!(%base_url, "proxy listening");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    server.stop().await;
    Ok(())
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"ok": true}))
}

async fn not_found() -> impl Responder {
    HttpResponse::NotFound().json(json!({
        "error": {
            "message": "not found",
            "type": "invalid_request_error",
        }
    }))
}

async fn chat_completions(
    state: web::Data<AppState>,
    body: web::Json<ChatCompletionRequest>,
) -> HttpResponse {
    let request = body.into_inner();
    let meta = ToolLoopMeta::new(&request.model);
    let prompt = build_prompt(&request.messages, request.tools.as_deref());

    for name in request.allowed_tool_names() {
        if state.registry.has(&name) {
            debug!(tool = %name, "caller-declared tool shadows a local tool");
        }
    }

    let session = match state.sessions.spawn().await {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "failed to spawn agent session");
            let classified = classify(Some(&err.to_string()));
            return HttpResponse::InternalServerError().json(classified.http_body());
        }
    };

    let ctx = TurnContext {
        allowed_tool_names: request.allowed_tool_names(),
        executors: Arc::clone(&state.executors),
        max_tool_turns: state.config.max_tool_turns,
    };

    if request.is_streaming() {
        let items = drive_turn(session, prompt, ctx);
        return HttpResponse::Ok()
            .content_type("text/event-stream")
            .insert_header(("Cache-Control", "no-cache"))
            .streaming(sse_stream(meta, items));
    }

    let timeout_secs = state.config.request_timeout_secs;
    match timeout(
        Duration::from_secs(timeout_secs),
        collect_turn(session, prompt, ctx),
    )
    .await
    {
        Ok(outcome) => render_non_streaming(&meta, outcome),
        Err(_) => {
            warn!(timeout_secs, "agent turn timed out");
            let mut err = ClassifiedError::unknown(true);
            err.user_message =
                format!("The agent did not complete within {timeout_secs} seconds.");
            HttpResponse::InternalServerError().json(err.http_body())
        }
    }
}

enum TurnOutcome {
    Text(String),
    ToolCall(ToolCall),
    Failed(ClassifiedError),
}

/// Run a whole turn to completion, accumulating text deltas.
async fn collect_turn(
    session: Box<dyn AgentSession>,
    prompt: String,
    ctx: TurnContext,
) -> TurnOutcome {
    let items = drive_turn(session, prompt, ctx);
    futures::pin_mut!(items);

    let mut text = String::new();
    while let Some(item) = items.next().await {
        match item {
            TurnItem::TextDelta(delta) => text.push_str(&delta),
            TurnItem::ToolCall(call) => return TurnOutcome::ToolCall(call),
            TurnItem::Done => return TurnOutcome::Text(text),
            TurnItem::Failed(err) => return TurnOutcome::Failed(err),
        }
    }
    TurnOutcome::Text(text)
}

fn render_non_streaming(meta: &ToolLoopMeta, outcome: TurnOutcome) -> HttpResponse {
    match outcome {
        TurnOutcome::Text(content) => {
            HttpResponse::Ok().json(ChatCompletionResponse::text(meta, content))
        }
        TurnOutcome::ToolCall(call) => {
            debug!(
                tool = %call.function.name,
                synthetic_id = call.id == FALLBACK_CALL_ID,
                "turn ended in a tool call"
            );
            HttpResponse::Ok().json(ChatCompletionResponse::tool_call(meta, call))
        }
        TurnOutcome::Failed(err) => {
            error!(kind = err.kind.as_str(), "agent turn failed");
            HttpResponse::InternalServerError().json(err.http_body())
        }
    }
}
