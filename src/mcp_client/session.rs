//! Per-call session lifecycle.
//!
//! [`SessionManager::apply`] is the only way the rest of the crate talks to a
//! server:
//! 1. Snapshot the process environment
//! 2. Interpolate `${VAR}` templates in the server's `env`
//! 3. Open a transport with the merged environment
//! 4. Run the MCP `initialize` handshake
//! 5. Run one unit of work ([`SessionFn`])
//! 6. End the session, then close the transport, whatever step 4/5 returned
//!
//! Nothing is pooled: two calls mean two processes (or two HTTP sessions).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::events::{AgentEvent, EventSink, TracingSink};

use super::errors::McpError;
use super::transport::{extract_result, Connector, DefaultConnector, Transport};
use super::types::{
    CallToolResult, InitializeResult, ListToolsResult, ServerConfig, ServerInfo, ToolDescriptor,
    TransportSpec, PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for the initialize handshake.
///
/// Generous because servers launched through `npx`/`uvx` may install
/// packages on first start.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for a single request inside a session.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on `tools/list` pages followed for one server.
const MAX_LIST_PAGES: usize = 64;

// ─── Environment ─────────────────────────────────────────────────────────────

/// Snapshot the ambient process environment off the async executor.
pub async fn snapshot_env() -> HashMap<String, String> {
    tokio::task::spawn_blocking(|| {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    })
    .await
    .unwrap_or_default()
}

/// Replace every `${NAME}` in `value` with `env[NAME]`.
///
/// Unknown names, empty `${}` and an unterminated `${` are left verbatim.
pub fn interpolate_env_vars(value: &str, env: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match env.get(name) {
                    Some(resolved) if !name.is_empty() => result.push_str(resolved),
                    _ => {
                        result.push_str("${");
                        result.push_str(name);
                        result.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

/// Inherited environment with the server's interpolated entries on top.
pub fn merge_env(
    server_env: &HashMap<String, String>,
    ambient: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut merged = ambient.clone();
    for (key, value) in server_env {
        merged.insert(key.clone(), interpolate_env_vars(value, ambient));
    }
    merged
}

// ─── Unit of Work ────────────────────────────────────────────────────────────

/// One operation executed inside a freshly opened, initialized session.
#[async_trait]
pub trait SessionFn: Send + Sync {
    type Output: Send;

    async fn call(&self, server_name: &str, session: &mut Session)
        -> Result<Self::Output, McpError>;
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Timeouts applied inside a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    pub init: Duration,
    pub call: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            init: DEFAULT_INIT_TIMEOUT,
            call: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// An initialized protocol session over one transport.
pub struct Session {
    server_name: String,
    transport: Box<dyn Transport>,
    timeouts: SessionTimeouts,
    server_info: Option<ServerInfo>,
}

impl Session {
    fn new(server_name: &str, transport: Box<dyn Transport>, timeouts: SessionTimeouts) -> Self {
        Self {
            server_name: server_name.to_string(),
            transport,
            timeouts,
            server_info: None,
        }
    }

    /// Name and version the server reported during the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Perform the MCP initialization handshake.
    async fn initialize(&mut self) -> Result<(), McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
            },
        });

        let init_timeout = self.timeouts.init;
        let handshake = async {
            let response = self.transport.request("initialize", Some(params)).await?;
            let result = extract_result(response)?;
            let init: InitializeResult =
                serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
                    server: self.server_name.clone(),
                    reason: format!("failed to parse initialize response: {e}"),
                })?;
            self.transport
                .notify("notifications/initialized", None)
                .await?;
            Ok::<_, McpError>(init)
        };

        let init = match tokio::time::timeout(init_timeout, handshake).await {
            Ok(Ok(init)) => init,
            Ok(Err(e)) => {
                return Err(McpError::InitFailed {
                    name: self.server_name.clone(),
                    reason: format!("{e}{}", self.stderr_suffix()),
                })
            }
            Err(_) => {
                return Err(McpError::InitFailed {
                    name: self.server_name.clone(),
                    reason: format!(
                        "initialization timed out after {}s{}",
                        init_timeout.as_secs(),
                        self.stderr_suffix()
                    ),
                })
            }
        };

        tracing::debug!(
            server = %self.server_name,
            protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
            server_name = init.server_info.as_ref().and_then(|i| i.name.as_deref()).unwrap_or("unknown"),
            "session initialized"
        );
        self.server_info = init.server_info;
        Ok(())
    }

    /// Send one request under the per-call timeout and unwrap its result.
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let response = tokio::time::timeout(
            self.timeouts.call,
            self.transport.request(method, params),
        )
        .await
        .map_err(|_| McpError::Timeout {
            server: self.server_name.clone(),
            operation: method.to_string(),
            timeout_ms: self.timeouts.call.as_millis() as u64,
        })??;
        extract_result(response)
    }

    /// Enumerate every tool the server advertises, following pagination.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolDescriptor>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let result = self.request("tools/list", params).await?;
            let page: ListToolsResult =
                serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
                    server: self.server_name.clone(),
                    reason: format!("failed to parse tools/list response: {e}"),
                })?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(tools),
            }
        }

        tracing::warn!(server = %self.server_name, pages = MAX_LIST_PAGES, "tools/list pagination cut off");
        Ok(tools)
    }

    /// Invoke a tool. `isError: true` comes back as `Ok` with the flag set.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<CallToolResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments,
        });
        let result = self.request("tools/call", Some(params)).await?;
        serde_json::from_value(result).map_err(|e| McpError::ProtocolError {
            server: self.server_name.clone(),
            reason: format!("failed to parse tools/call response: {e}"),
        })
    }

    /// End the session, then close the transport. Never fails; problems are
    /// logged because the caller's outcome is already decided.
    async fn teardown(mut self) {
        if let Err(e) = self.transport.end_session().await {
            tracing::debug!(server = %self.server_name, error = %e, "session end failed");
        }
        if let Err(e) = self.transport.close().await {
            tracing::warn!(server = %self.server_name, error = %e, "transport close failed");
        }
    }

    fn stderr_suffix(&self) -> String {
        match self.transport.diagnostics() {
            Some(stderr) => format!(" | stderr: {stderr}"),
            None => String::new(),
        }
    }
}

// ─── SessionManager ──────────────────────────────────────────────────────────

/// Opens one fresh session per call and guarantees teardown.
#[derive(Clone)]
pub struct SessionManager {
    connector: Arc<dyn Connector>,
    events: Arc<dyn EventSink>,
    timeouts: SessionTimeouts,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(Arc::new(DefaultConnector), Arc::new(TracingSink))
    }
}

impl SessionManager {
    pub fn new(connector: Arc<dyn Connector>, events: Arc<dyn EventSink>) -> Self {
        Self {
            connector,
            events,
            timeouts: SessionTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: SessionTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn events(&self) -> &Arc<dyn EventSink> {
        &self.events
    }

    /// Run `work` against `server_name` inside a single-use session.
    ///
    /// Teardown (session end, then transport close) runs on every return
    /// path once the transport is open. If the returned future is dropped
    /// mid-flight, dropping the transport releases the child process or
    /// connection.
    pub async fn apply<F: SessionFn>(
        &self,
        server_name: &str,
        config: &ServerConfig,
        work: &F,
    ) -> Result<F::Output, McpError> {
        let kind = match config.transport_spec(server_name)? {
            TransportSpec::Process { .. } => "process",
            TransportSpec::Stream { .. } => "stream",
        };

        let ambient = snapshot_env().await;
        let env = merge_env(&config.env, &ambient);

        let transport = self.connector.open(server_name, config, &env).await?;
        self.events.record(AgentEvent::SessionOpened {
            server: server_name.to_string(),
            transport: kind,
        });

        let mut session = Session::new(server_name, transport, self.timeouts);
        let outcome = async {
            session.initialize().await?;
            work.call(server_name, &mut session).await
        }
        .await;

        session.teardown().await;
        self.events.record(AgentEvent::SessionClosed {
            server: server_name.to_string(),
            succeeded: outcome.is_ok(),
        });

        outcome
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
