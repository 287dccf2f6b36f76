//! JSON-RPC server component.
//!
//! Speaks newline-delimited JSON over TCP: one request object per line, one
//! response object per line.
//!
//! ```text
//! → {"id": 1, "method": "ping"}
//! ← {"jsonrpc":"2.0","id":1,"result":"pong"}
//! ```
//!
//! Methods: `ping`, `echo` (returns its params), `app.info`.
//!
//! Lines longer than [`MAX_LINE_BYTES`] get a parse error and the connection is
//! closed. Every read and write races the shutdown token, so a peer that stops
//! reading cannot hold up shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::RpcConfig;
use crate::error::ComponentError;
use crate::lifecycle::{AppInfo, Component, Scope};
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};
use crate::servers::{describe, RunState};

pub const PARSE_ERROR: i64 = -32700;
pub const METHOD_NOT_FOUND: i64 = -32601;
/// Server-defined: `app.info` called outside a coordinator run.
pub const APP_INFO_NOT_FOUND: i64 = -32000;

/// Longest accepted request line, excluding the newline.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// How long connections get to close after shutdown before they are aborted.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Pause after a failed accept (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn err(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Handle one request line.
pub fn dispatch(line: &str, app: Option<&dyn AppInfo>) -> RpcResponse {
    let request: RpcRequest = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => return RpcResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {}", e)),
    };

    match request.method.as_str() {
        "ping" => RpcResponse::ok(request.id, Value::from("pong")),
        "echo" => RpcResponse::ok(request.id, request.params),
        "app.info" => match app {
            Some(app) => RpcResponse::ok(request.id, describe(app)),
            None => RpcResponse::err(request.id, APP_INFO_NOT_FOUND, "app info not found"),
        },
        other => RpcResponse::err(
            request.id,
            METHOD_NOT_FOUND,
            format!("method not found: {}", other),
        ),
    }
}

/// Handle one raw request line. Invalid UTF-8 is a parse error.
pub fn dispatch_bytes(line: &[u8], app: Option<&dyn AppInfo>) -> RpcResponse {
    match std::str::from_utf8(line) {
        Ok(line) => dispatch(line, app),
        Err(e) => RpcResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {}", e)),
    }
}

/// Line-delimited JSON-RPC server.
pub struct RpcServer {
    config: RpcConfig,
    state: RunState,
    connections: ConnectionTracker,
}

impl RpcServer {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config,
            state: RunState::new(),
            connections: ConnectionTracker::new(),
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.state.local_addr()
    }

    /// Wait until the listener is bound.
    pub async fn bound(&self) -> SocketAddr {
        self.state.bound().await
    }

    pub fn active_connections(&self) -> u64 {
        self.connections.active_count()
    }
}

#[async_trait]
impl Component for RpcServer {
    fn id(&self) -> &str {
        &self.config.name
    }

    async fn start(&self, scope: Scope) -> Result<(), ComponentError> {
        let running = self.state.begin(&scope);

        let listener = Listener::bind(&self.config.bind_address, self.config.max_connections)
            .await
            .map_err(ComponentError::other)?;
        let addr = listener.local_addr()?;
        self.state.set_addr(addr);
        tracing::info!(component = %self.config.name, address = %addr, "RPC server starting");

        let token = running.token().clone();
        let app = scope.app_info();
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let conn = Connection {
                            guard: self.connections.track(),
                            _permit: permit,
                            peer,
                        };
                        tasks.spawn(serve_connection(conn, stream, token.clone(), app.clone()));
                    }
                    Err(ListenerError::Closed) => break,
                    Err(e) => {
                        tracing::warn!(component = %self.config.name, error = %e, "Accept failed");
                        if !back_off(&token, ACCEPT_BACKOFF).await {
                            break;
                        }
                    }
                },
            }
        }

        drop(listener);
        tracing::debug!(
            component = %self.config.name,
            active = self.connections.active_count(),
            "Draining RPC connections"
        );
        if tokio::time::timeout(DRAIN_TIMEOUT, self.connections.wait_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                component = %self.config.name,
                active = self.connections.active_count(),
                "Connections did not drain in time, aborting"
            );
            tasks.abort_all();
        }
        while tasks.join_next().await.is_some() {}

        tracing::info!(component = %self.config.name, "RPC server stopped");
        Ok(())
    }

    async fn stop(&self, scope: Scope) -> Result<(), ComponentError> {
        self.state.request_shutdown();
        self.state.wait_stopped(&scope).await
    }
}

struct Connection {
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
    peer: SocketAddr,
}

/// Sleep for `delay` unless `token` fires first. Returns false when cancelled.
async fn back_off(token: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Line {
    /// `buf` holds one line without its terminator.
    Complete,
    TooLong,
    Eof,
}

async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let limit = MAX_LINE_BYTES as u64 + 1;
    let n = reader.take(limit).read_until(b'\n', buf).await?;
    if n == 0 {
        return Ok(Line::Eof);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
        return Ok(Line::Complete);
    }
    if buf.len() > MAX_LINE_BYTES {
        return Ok(Line::TooLong);
    }
    // Unterminated final line before EOF.
    Ok(Line::Complete)
}

async fn serve_connection(
    conn: Connection,
    stream: TcpStream,
    token: CancellationToken,
    app: Option<Arc<dyn AppInfo>>,
) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        let read = tokio::select! {
            _ = token.cancelled() => break,
            read = read_line(&mut reader, &mut buf) => read,
        };

        let (response, last) = match read {
            Ok(Line::Complete) => {
                if buf.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                (dispatch_bytes(&buf, app.as_deref()), false)
            }
            Ok(Line::TooLong) => {
                tracing::debug!(connection_id = %conn.guard.id(), "Request line too long");
                let message = format!("parse error: line exceeds {} bytes", MAX_LINE_BYTES);
                (RpcResponse::err(Value::Null, PARSE_ERROR, message), true)
            }
            Ok(Line::Eof) => break,
            Err(e) => {
                tracing::debug!(connection_id = %conn.guard.id(), error = %e, "Read failed");
                break;
            }
        };

        let mut out = match serde_json::to_vec(&response) {
            Ok(out) => out,
            Err(e) => {
                tracing::error!(connection_id = %conn.guard.id(), error = %e, "Failed to encode response");
                break;
            }
        };
        out.push(b'\n');
        let written = tokio::select! {
            _ = token.cancelled() => break,
            written = writer.write_all(&out) => written,
        };
        if let Err(e) = written {
            tracing::debug!(connection_id = %conn.guard.id(), error = %e, "Write failed");
            break;
        }
        if last {
            break;
        }
    }

    let _ = writer.shutdown().await;
    tracing::debug!(connection_id = %conn.guard.id(), peer = %conn.peer, "Connection finished");
}
