//! Units of work run inside a session by [`SessionManager::apply`].
//!
//! [`SessionManager::apply`]: super::session::SessionManager::apply

use async_trait::async_trait;

use super::errors::McpError;
use super::session::{Session, SessionFn};
use super::types::ToolDescriptor;

/// Enumerate the server's tools.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListTools;

#[async_trait]
impl SessionFn for ListTools {
    type Output = Vec<ToolDescriptor>;

    async fn call(
        &self,
        _server_name: &str,
        session: &mut Session,
    ) -> Result<Self::Output, McpError> {
        session.list_tools().await
    }
}

/// Invoke one tool and return its serialized content.
///
/// A result flagged `isError` becomes [`McpError::ToolError`] carrying the
/// same serialized content.
#[derive(Debug, Clone)]
pub struct RunTool {
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

impl RunTool {
    pub fn new(tool_name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
        }
    }
}

#[async_trait]
impl SessionFn for RunTool {
    type Output = String;

    async fn call(&self, server_name: &str, session: &mut Session) -> Result<String, McpError> {
        let result = session
            .call_tool(&self.tool_name, self.arguments.clone())
            .await?;
        let content = result.content_text();
        if result.is_error {
            tracing::debug!(server = server_name, tool = %self.tool_name, "tool reported isError");
            return Err(McpError::ToolError {
                tool: self.tool_name.clone(),
                content,
            });
        }
        Ok(content)
    }
}

/// Summarize a server as `(server_name, description)` for routing indexes.
///
/// The description lists each tool as `name: description`, one per line,
/// prefixed by the server's self-reported name when it gave one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutingDescription;

#[async_trait]
impl SessionFn for RoutingDescription {
    type Output = (String, String);

    async fn call(
        &self,
        server_name: &str,
        session: &mut Session,
    ) -> Result<Self::Output, McpError> {
        let header = session
            .server_info()
            .and_then(|info| info.name.clone())
            .unwrap_or_else(|| server_name.to_string());
        let tools = session.list_tools().await?;
        Ok((server_name.to_string(), describe_tools(&header, &tools)))
    }
}

fn describe_tools(header: &str, tools: &[ToolDescriptor]) -> String {
    let mut out = format!("{header}\n");
    for tool in tools {
        if tool.description.is_empty() {
            out.push_str(&format!("- {}\n", tool.name));
        } else {
            out.push_str(&format!("- {}: {}\n", tool.name, tool.description.trim()));
        }
    }
    out.trim_end().to_string()
}
