//! Scripted in-memory servers for exercising sessions, discovery and routing
//! without spawning processes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::errors::McpError;
use super::transport::{Connector, Transport};
use super::types::{JsonRpcError, JsonRpcResponse, ServerConfig, ToolDescriptor, PROTOCOL_VERSION};

type FailureFn = Arc<dyn Fn(&str) -> McpError + Send + Sync>;

// ─── FakeServer ──────────────────────────────────────────────────────────────

/// Behaviour script for one fake server.
#[derive(Clone, Default)]
pub struct FakeServer {
    tools: Vec<ToolDescriptor>,
    page_size: Option<usize>,
    fail_open: bool,
    fail_initialize: bool,
    fail_list: bool,
    hang_on_list: bool,
    delay: Option<Duration>,
    reported_errors: HashMap<String, String>,
    call_failures: HashMap<String, FailureFn>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advertise a tool whose description is `"{name} tool"`.
    pub fn tool(mut self, name: &str) -> Self {
        self.tools.push(ToolDescriptor {
            name: name.to_string(),
            description: format!("{name} tool"),
            input_schema: serde_json::json!({"type": "object"}),
        });
        self
    }

    pub fn page_size(mut self, size: usize) -> Self {
        self.page_size = Some(size);
        self
    }

    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    pub fn fail_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn fail_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn hang_on_list(mut self) -> Self {
        self.hang_on_list = true;
        self
    }

    /// Sleep before answering every request.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// `tools/call` for `tool` answers with `isError: true`.
    pub fn tool_reports_error(mut self, tool: &str, message: &str) -> Self {
        self.reported_errors
            .insert(tool.to_string(), message.to_string());
        self
    }

    /// `tools/call` for `tool` fails with the error built by `failure`.
    pub fn tool_fails_with(
        mut self,
        tool: &str,
        failure: impl Fn(&str) -> McpError + Send + Sync + 'static,
    ) -> Self {
        self.call_failures
            .insert(tool.to_string(), Arc::new(failure));
        self
    }
}

// ─── Probe ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct ProbeState {
    opened: HashMap<String, usize>,
    closed: HashMap<String, usize>,
    teardown: HashMap<String, Vec<&'static str>>,
    envs: HashMap<String, HashMap<String, String>>,
    calls: Vec<(String, String)>,
}

/// Shared view of everything the fakes observed.
#[derive(Clone, Default)]
pub struct Probe {
    state: Arc<Mutex<ProbeState>>,
    live: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Probe {
    pub fn opened(&self, server: &str) -> usize {
        self.with(|s| s.opened.get(server).copied().unwrap_or(0))
    }

    pub fn closed(&self, server: &str) -> usize {
        self.with(|s| s.closed.get(server).copied().unwrap_or(0))
    }

    pub fn teardown_order(&self, server: &str) -> Vec<&'static str> {
        self.with(|s| s.teardown.get(server).cloned().unwrap_or_default())
    }

    pub fn last_env(&self, server: &str) -> Option<HashMap<String, String>> {
        self.with(|s| s.envs.get(server).cloned())
    }

    /// `(server, tool)` pairs in the order `tools/call` reached them.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.with(|s| s.calls.clone())
    }

    /// Transports opened and not yet dropped.
    pub fn live_transports(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously live transports.
    pub fn peak_live_transports(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn with<T>(&self, f: impl FnOnce(&mut ProbeState) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }
}

// ─── FakeConnector ───────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct FakeConnector {
    servers: HashMap<String, FakeServer>,
    probe: Probe,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(mut self, name: &str, server: FakeServer) -> Self {
        self.servers.insert(name.to_string(), server);
        self
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn open(
        &self,
        server_name: &str,
        _config: &ServerConfig,
        env: &HashMap<String, String>,
    ) -> Result<Box<dyn Transport>, McpError> {
        let server = match self.servers.get(server_name) {
            Some(server) if !server.fail_open => server.clone(),
            _ => {
                return Err(McpError::SpawnFailed {
                    name: server_name.to_string(),
                    reason: "fake server refused to start".into(),
                })
            }
        };

        self.probe.with(|s| {
            *s.opened.entry(server_name.to_string()).or_default() += 1;
            s.envs.insert(server_name.to_string(), env.clone());
        });
        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.peak.fetch_max(live, Ordering::SeqCst);

        Ok(Box::new(FakeTransport {
            name: server_name.to_string(),
            server,
            probe: self.probe.clone(),
            closed: false,
        }))
    }
}

// ─── FakeTransport ───────────────────────────────────────────────────────────

struct FakeTransport {
    name: String,
    server: FakeServer,
    probe: Probe,
    closed: bool,
}

impl FakeTransport {
    fn ok(result: serde_json::Value) -> Result<JsonRpcResponse, McpError> {
        Ok(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 0,
            result: Some(result),
            error: None,
        })
    }

    fn rpc_error(code: i32, message: String) -> Result<JsonRpcResponse, McpError> {
        Ok(JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 0,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        })
    }

    fn list_page(&self, params: Option<&serde_json::Value>) -> Result<JsonRpcResponse, McpError> {
        let start = params
            .and_then(|p| p.get("cursor"))
            .and_then(|c| c.as_str())
            .and_then(|c| c.parse::<usize>().ok())
            .unwrap_or(0);
        let size = self.server.page_size.unwrap_or(usize::MAX);
        let end = start.saturating_add(size).min(self.server.tools.len());
        let page = &self.server.tools[start.min(end)..end];
        let mut result = serde_json::json!({ "tools": page });
        if end < self.server.tools.len() {
            result["nextCursor"] = serde_json::json!(end.to_string());
        }
        Self::ok(result)
    }

    fn call(&self, params: Option<&serde_json::Value>) -> Result<JsonRpcResponse, McpError> {
        let tool = params
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        let arguments = params
            .and_then(|p| p.get("arguments"))
            .cloned()
            .unwrap_or(serde_json::Value::Null);

        self.probe
            .with(|s| s.calls.push((self.name.clone(), tool.clone())));

        if let Some(failure) = self.server.call_failures.get(&tool) {
            return Err((failure.as_ref())(&self.name));
        }
        if let Some(message) = self.server.reported_errors.get(&tool) {
            return Self::ok(serde_json::json!({
                "content": [{"type": "text", "text": message}],
                "isError": true,
            }));
        }
        if !self.server.tools.iter().any(|t| t.name == tool) {
            return Self::rpc_error(-32602, format!("Unknown tool: {tool}"));
        }
        Self::ok(serde_json::json!({
            "content": [{"type": "text", "text": format!("{tool}:{}:{arguments}", self.name)}],
            "isError": false,
        }))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn request(
        &mut self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        if let Some(delay) = self.server.delay {
            tokio::time::sleep(delay).await;
        }
        match method {
            "initialize" if self.server.fail_initialize => Err(McpError::TransportError {
                server: self.name.clone(),
                reason: "handshake refused".into(),
            }),
            "initialize" => Self::ok(serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"tools": {}},
                "serverInfo": {"name": format!("fake-{}", self.name), "version": "0.0.0"},
            })),
            "tools/list" if self.server.hang_on_list => std::future::pending().await,
            "tools/list" if self.server.fail_list => Err(McpError::TransportError {
                server: self.name.clone(),
                reason: "connection reset".into(),
            }),
            "tools/list" => self.list_page(params.as_ref()),
            "tools/call" => self.call(params.as_ref()),
            other => Self::rpc_error(-32601, format!("Method not found: {other}")),
        }
    }

    async fn notify(
        &mut self,
        _method: &str,
        _params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        Ok(())
    }

    async fn end_session(&mut self) -> Result<(), McpError> {
        self.probe.with(|s| {
            s.teardown
                .entry(self.name.clone())
                .or_default()
                .push("end_session")
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), McpError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.probe.with(|s| {
            s.teardown.entry(self.name.clone()).or_default().push("close");
            *s.closed.entry(self.name.clone()).or_default() += 1;
        });
        Ok(())
    }
}

impl Drop for FakeTransport {
    fn drop(&mut self) {
        self.probe.live.fetch_sub(1, Ordering::SeqCst);
    }
}
