//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur while opening, driving, or tearing down a session.
#[derive(Debug, Error)]
pub enum McpError {
    /// Malformed or incomplete server entry, or a transport this build
    /// cannot provide.
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed { name: String, reason: String },

    /// An HTTP stream endpoint could not be reached.
    #[error("failed to connect to server '{name}': {reason}")]
    ConnectFailed { name: String, reason: String },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed { name: String, reason: String },

    /// Malformed message, dropped stream, or I/O error on an open channel.
    #[error("transport error for server '{server}': {reason}")]
    TransportError { server: String, reason: String },

    /// A response arrived but its payload did not match the protocol.
    #[error("protocol error for server '{server}': {reason}")]
    ProtocolError { server: String, reason: String },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// `tools/call` completed with `isError: true`; `content` is the
    /// serialized content blocks.
    #[error("{content}")]
    ToolError { tool: String, content: String },

    /// An operation timed out.
    #[error("{operation} on server '{server}' timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        operation: String,
        timeout_ms: u64,
    },
}
