//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 envelopes, MCP protocol payloads, and the server
//! configuration shape consumed from `{"mcpServers": …}` documents.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use super::errors::McpError;

/// MCP protocol revision sent in the `initialize` request.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no `id`, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Parse `text` as the reply to request `id`.
    ///
    /// Server-initiated requests and notifications carry a `method` and are
    /// never replies, even when their `id` collides with ours.
    pub fn parse_reply(text: &str, id: u64) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(text).ok()?;
        if value.get("method").is_some() {
            return None;
        }
        serde_json::from_value::<Self>(value)
            .ok()
            .filter(|resp| resp.id == id)
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// A tool advertised by a server via `tools/list`.
///
/// Names are unique within one server but may collide across servers; the
/// router resolves collisions by server declaration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: serde_json::Value,
}

/// `tools/list` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// `tools/call` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolResult {
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl CallToolResult {
    /// Serialize the content blocks to a single text payload.
    pub fn content_text(&self) -> String {
        serde_json::to_string(&self.content).unwrap_or_else(|_| format!("{:?}", self.content))
    }
}

/// MCP initialize response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default, rename = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, rename = "serverInfo", alias = "server_info")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

// ─── Server Configuration ────────────────────────────────────────────────────

/// One entry of the `mcpServers` mapping.
///
/// Exactly one transport shape must be present: `command` (with optional
/// `args`/`env`) for a spawned process, or `url` for an HTTP stream. The
/// shape is checked when a session is opened, so a malformed entry only
/// disables its own server.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Literal values or `${VAR}` templates, resolved per session.
    #[serde(default, deserialize_with = "deserialize_env")]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Extra HTTP headers for stream servers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// The validated transport shape of a `ServerConfig`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSpec<'a> {
    Process { command: &'a str, args: &'a [String] },
    Stream { url: &'a str },
}

impl ServerConfig {
    /// A subprocess server.
    pub fn process(command: &str, args: &[&str]) -> Self {
        Self {
            command: Some(command.to_string()),
            args: args.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    /// An HTTP stream server.
    pub fn stream(url: &str) -> Self {
        Self {
            url: Some(url.to_string()),
            ..Self::default()
        }
    }

    /// Add an env entry (literal or `${VAR}` template).
    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.env.insert(key.to_string(), value.to_string());
        self
    }

    /// Resolve which transport this entry declares.
    pub fn transport_spec(&self, server_name: &str) -> Result<TransportSpec<'_>, McpError> {
        match (self.command.as_deref(), self.url.as_deref()) {
            (Some(command), None) if !command.trim().is_empty() => Ok(TransportSpec::Process {
                command,
                args: &self.args,
            }),
            (None, Some(url)) if !url.trim().is_empty() => Ok(TransportSpec::Stream { url }),
            (Some(_), Some(_)) => Err(McpError::ConfigError {
                reason: format!("server '{server_name}' declares both 'command' and 'url'"),
            }),
            _ => Err(McpError::ConfigError {
                reason: format!("server '{server_name}' declares neither 'command' nor 'url'"),
            }),
        }
    }
}

/// Accept string values verbatim and stringify numbers/booleans.
fn deserialize_env<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<HashMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    let mut env = HashMap::new();
    for (key, value) in raw.unwrap_or_default() {
        let rendered = match value {
            serde_json::Value::String(s) => s,
            serde_json::Value::Number(n) => n.to_string(),
            serde_json::Value::Bool(b) => b.to_string(),
            serde_json::Value::Null => continue,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "env entry '{key}' must be a string, got {other}"
                )))
            }
        };
        env.insert(key, rendered);
    }
    Ok(env)
}

/// Top-level MCP servers document. Iteration order is fallback priority.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct McpServersConfig {
    #[serde(default, rename = "mcpServers")]
    pub mcp_servers: IndexMap<String, ServerConfig>,
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC / MCP error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reply_skips_server_requests_with_same_id() {
        let server_request = r#"{"jsonrpc":"2.0","id":7,"method":"sampling/createMessage","params":{}}"#;
        assert!(JsonRpcResponse::parse_reply(server_request, 7).is_none());

        let reply = r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#;
        assert_eq!(JsonRpcResponse::parse_reply(reply, 7).unwrap().result.unwrap()["ok"], true);
        assert!(JsonRpcResponse::parse_reply(reply, 8).is_none());
        assert!(JsonRpcResponse::parse_reply("not json", 7).is_none());
    }

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_string(&note).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("notifications/initialized"));
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "result": null,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_tool_descriptor_wire_names() {
        let json = r#"{"name": "search", "inputSchema": {"type": "object"}}"#;
        let tool: ToolDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema["type"], "object");

        let back = serde_json::to_value(&tool).unwrap();
        assert!(back.get("inputSchema").is_some());
    }

    #[test]
    fn test_call_tool_result_content_text() {
        let json = r#"{"content": [{"type": "text", "text": "hi"}], "isError": false}"#;
        let result: CallToolResult = serde_json::from_str(json).unwrap();
        assert!(!result.is_error);
        assert_eq!(result.content_text(), r#"[{"type":"text","text":"hi"}]"#);
    }

    #[test]
    fn test_servers_config_preserves_declaration_order() {
        let json = r#"{"mcpServers": {
            "zeta": {"command": "npx", "args": ["zeta-mcp"]},
            "alpha": {"url": "http://localhost:9000/mcp"},
            "mid": {"command": "uvx", "env": {"TOKEN": "${API_KEY}", "PORT": 8080}}
        }}"#;
        let config: McpServersConfig = serde_json::from_str(json).unwrap();
        let names: Vec<&str> = config.mcp_servers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(config.mcp_servers["mid"].env["PORT"], "8080");
        assert_eq!(config.mcp_servers["mid"].env["TOKEN"], "${API_KEY}");
    }

    #[test]
    fn test_transport_spec_process_and_stream() {
        let p = ServerConfig::process("node", &["server.js"]);
        assert!(matches!(
            p.transport_spec("p").unwrap(),
            TransportSpec::Process { command: "node", .. }
        ));

        let s = ServerConfig::stream("http://localhost/mcp");
        assert_eq!(
            s.transport_spec("s").unwrap(),
            TransportSpec::Stream { url: "http://localhost/mcp" }
        );
    }

    #[test]
    fn test_transport_spec_rejects_neither_or_both() {
        let empty = ServerConfig::default();
        assert!(matches!(
            empty.transport_spec("empty"),
            Err(McpError::ConfigError { .. })
        ));

        let mut both = ServerConfig::process("node", &[]);
        both.url = Some("http://localhost".into());
        let err = both.transport_spec("both").unwrap_err();
        assert!(err.to_string().contains("both"));
    }
}
