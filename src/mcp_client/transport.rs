//! Duplex JSON-RPC channels to MCP servers.
//!
//! Two variants sit behind the [`Transport`] trait:
//! - [`StdioTransport`]: a spawned child process, line-delimited JSON over
//!   its stdin/stdout
//! - `HttpStreamTransport` (see `http_stream`): HTTP POST with JSON or SSE
//!   framed responses
//!
//! [`Connector`] picks the variant from a `ServerConfig`. Every transport is
//! single-use: opened for one session and closed right after.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::errors::McpError;
use super::types::{
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ServerConfig, TransportSpec,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// How long a child gets to exit after stdin closes before it is killed.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bytes of stderr kept for failure diagnostics.
const STDERR_TAIL_BYTES: usize = 2000;

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Contract ────────────────────────────────────────────────────────────────

/// A duplex request/response channel to one server.
#[async_trait]
pub trait Transport: Send {
    /// Send a request and wait for the response carrying the same id.
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError>;

    /// Send a notification (no response expected).
    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError>;

    /// End the protocol-level session. Runs before [`Transport::close`].
    async fn end_session(&mut self) -> Result<(), McpError> {
        Ok(())
    }

    /// Release the process or connection. Must be safe to call twice.
    async fn close(&mut self) -> Result<(), McpError>;

    /// Anything the server wrote out-of-band (e.g. stderr), for error context.
    fn diagnostics(&self) -> Option<String> {
        None
    }
}

/// Opens transports. The seam between session management and the wire.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a channel for `config`. `env` is the fully merged environment and
    /// only reaches process transports.
    async fn open(
        &self,
        server_name: &str,
        config: &ServerConfig,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn Transport>, McpError>;
}

/// Production connector: stdio for `command` entries, HTTP stream for `url`.
#[derive(Debug, Default, Clone)]
pub struct DefaultConnector;

#[async_trait]
impl Connector for DefaultConnector {
    async fn open(
        &self,
        server_name: &str,
        config: &ServerConfig,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn Transport>, McpError> {
        match config.transport_spec(server_name)? {
            TransportSpec::Process { command, args } => {
                let transport = StdioTransport::spawn(server_name, command, args, env)?;
                Ok(Box::new(transport))
            }
            TransportSpec::Stream { url } => open_stream(server_name, url, &config.headers),
        }
    }
}

#[cfg(feature = "streamable-http")]
fn open_stream(
    server_name: &str,
    url: &str,
    headers: &HashMap<String, String>,
) -> Result<Box<dyn Transport>, McpError> {
    let transport = super::http_stream::HttpStreamTransport::connect(server_name, url, headers)?;
    Ok(Box::new(transport))
}

#[cfg(not(feature = "streamable-http"))]
fn open_stream(
    server_name: &str,
    _url: &str,
    _headers: &HashMap<String, String>,
) -> Result<Box<dyn Transport>, McpError> {
    Err(McpError::ConfigError {
        reason: format!(
            "server '{server_name}' declares a 'url' but this build has no HTTP stream support \
             (enable the `streamable-http` feature)"
        ),
    })
}

// ─── Stdio Transport ─────────────────────────────────────────────────────────

/// Line-delimited JSON-RPC over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    child: Child,
    writer: Option<ChildStdin>,
    reader: BufReader<ChildStdout>,
    stderr_tail: Arc<Mutex<String>>,
    closed: bool,
}

impl StdioTransport {
    /// Spawn `command` with exactly `env` as its environment.
    ///
    /// The child is killed if the transport is dropped without `close`, so a
    /// cancelled caller never leaks a process.
    pub fn spawn(
        server_name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        cmd.env_clear();
        cmd.envs(env);

        // Windows: prevent console window from appearing for child processes
        #[cfg(target_os = "windows")]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            cmd.creation_flags(CREATE_NO_WINDOW);
        }

        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| McpError::SpawnFailed {
            name: server_name.to_string(),
            reason: format!("{command}: {e}"),
        })?;

        let stdin = child.stdin.take().ok_or(McpError::SpawnFailed {
            name: server_name.to_string(),
            reason: "failed to capture stdin".into(),
        })?;

        let stdout = child.stdout.take().ok_or(McpError::SpawnFailed {
            name: server_name.to_string(),
            reason: "failed to capture stdout".into(),
        })?;

        let stderr_tail = Arc::new(Mutex::new(String::new()));
        if let Some(stderr) = child.stderr.take() {
            drain_stderr(server_name.to_string(), stderr, Arc::clone(&stderr_tail));
        }

        tracing::debug!(server = server_name, command, pid = ?child.id(), "spawned server process");

        Ok(Self {
            server_name: server_name.to_string(),
            child,
            writer: Some(stdin),
            reader: BufReader::new(stdout),
            stderr_tail,
            closed: false,
        })
    }

    async fn write_line(&mut self, json: &str) -> Result<(), McpError> {
        let writer = self.writer.as_mut().ok_or_else(|| McpError::TransportError {
            server: self.server_name.clone(),
            reason: "stdin already closed".into(),
        })?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| McpError::TransportError {
                server: self.server_name.clone(),
                reason: format!("failed to write to stdin: {e}"),
            })?;
        writer.write_all(b"\n").await.map_err(|e| McpError::TransportError {
            server: self.server_name.clone(),
            reason: format!("failed to write to stdin: {e}"),
        })?;
        writer.flush().await.map_err(|e| McpError::TransportError {
            server: self.server_name.clone(),
            reason: format!("failed to flush stdin: {e}"),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let json = serde_json::to_string(&req).map_err(|e| McpError::TransportError {
            server: self.server_name.clone(),
            reason: format!("failed to serialize request: {e}"),
        })?;
        self.write_line(&json).await?;

        let mut line_buf = String::new();
        loop {
            line_buf.clear();
            let bytes_read = self
                .reader
                .read_line(&mut line_buf)
                .await
                .map_err(|e| McpError::TransportError {
                    server: self.server_name.clone(),
                    reason: format!("failed to read from stdout: {e}"),
                })?;

            if bytes_read == 0 {
                return Err(McpError::TransportError {
                    server: self.server_name.clone(),
                    reason: "server stdout closed (process may have exited)".into(),
                });
            }

            let trimmed = line_buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            // Notifications, server-initiated requests and stray log lines
            // are skipped; only the matching response ends the wait.
            match JsonRpcResponse::parse_reply(trimmed, id) {
                Some(resp) => return Ok(resp),
                None => {
                    tracing::trace!(server = %self.server_name, line = trimmed, "skipping non-reply line");
                    continue;
                }
            }
        }
    }

    async fn notify(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notification).map_err(|e| McpError::TransportError {
            server: self.server_name.clone(),
            reason: format!("failed to serialize notification: {e}"),
        })?;
        self.write_line(&json).await
    }

    async fn close(&mut self) -> Result<(), McpError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        // Closing stdin is the stdio shutdown signal.
        drop(self.writer.take());

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::debug!(server = %self.server_name, %status, "server process exited");
                Ok(())
            }
            _ => {
                tracing::debug!(server = %self.server_name, "server did not exit in time, killing");
                self.child.kill().await.map_err(|e| McpError::TransportError {
                    server: self.server_name.clone(),
                    reason: format!("failed to kill server process: {e}"),
                })
            }
        }
    }

    fn diagnostics(&self) -> Option<String> {
        let tail = self.stderr_tail.lock().ok()?;
        let trimmed = tail.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

/// Forward child stderr to tracing and keep a bounded tail for diagnostics.
///
/// Draining continuously keeps a chatty server from blocking on a full pipe.
fn drain_stderr(
    server_name: String,
    stderr: tokio::process::ChildStderr,
    tail: Arc<Mutex<String>>,
) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server_name, stderr = %line, "server stderr");
            if let Ok(mut buf) = tail.lock() {
                buf.push_str(&line);
                buf.push('\n');
                if buf.len() > STDERR_TAIL_BYTES {
                    let mut cut = buf.len() - STDERR_TAIL_BYTES;
                    while !buf.is_char_boundary(cut) {
                        cut += 1;
                    }
                    buf.drain(..cut);
                }
            }
        }
    });
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: -32603,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
