//! MCP Client — single-use sessions against configured tool servers.
//!
//! This module handles:
//! - Loading the ordered `mcpServers` table
//! - Opening stdio or HTTP stream transports with interpolated environments
//! - Running exactly one unit of work per session, with ordered teardown
//! - Concurrent tool discovery across all servers
//!
//! Routing and fallback live in `agent_core::tool_router`, on top of
//! [`SessionManager::apply`].

pub mod catalog;
pub mod config;
pub mod errors;
#[cfg(feature = "streamable-http")]
pub mod http_stream;
pub mod operations;
pub mod session;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenience
pub use catalog::{discover, routing_descriptions, DiscoveryReport};
pub use config::load_servers_config;
pub use errors::McpError;
pub use operations::{ListTools, RoutingDescription, RunTool};
pub use session::{SessionFn, SessionManager, SessionTimeouts};
pub use transport::{Connector, DefaultConnector, Transport};
pub use types::{McpServersConfig, ServerConfig, ToolDescriptor};
