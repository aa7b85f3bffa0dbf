//! ToolRouter — dispatches model tool calls to MCP servers.
//!
//! Each call walks the configured servers in declaration order, opening a
//! fresh session per attempt:
//! - first success wins; later servers are never contacted
//! - a non-retryable failure (bad arguments) stops the chain
//! - a retryable failure moves on to the next server
//!
//! When every server has been tried the model gets a composite error that
//! says so, carrying the last classified failure.

use futures::future::join_all;
use indexmap::IndexMap;

use crate::events::{AgentEvent, ToolStage};
use crate::mcp_client::operations::RunTool;
use crate::mcp_client::types::ServerConfig;
use crate::mcp_client::SessionManager;

use super::error_classifier::classify;
use super::types::{ToolCallRequest, ToolCallResult};

// ─── ToolRouter ─────────────────────────────────────────────────────────────

/// Routes tool calls across an ordered set of servers.
pub struct ToolRouter<'a> {
    sessions: &'a SessionManager,
    servers: &'a IndexMap<String, ServerConfig>,
}

impl<'a> ToolRouter<'a> {
    pub fn new(sessions: &'a SessionManager, servers: &'a IndexMap<String, ServerConfig>) -> Self {
        Self { sessions, servers }
    }

    // ─── Dispatch ───────────────────────────────────────────────────────

    /// Resolve every tool call of one model turn.
    ///
    /// Calls run concurrently; results come back in request order so call
    /// ids stay aligned with the assistant turn that issued them.
    pub async fn dispatch_tool_calls(&self, tool_calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        join_all(tool_calls.iter().map(|call| self.route(call))).await
    }

    /// Run one tool call through the fallback chain.
    pub async fn route(&self, call: &ToolCallRequest) -> ToolCallResult {
        let events = self.sessions.events();
        let work = RunTool::new(&call.name, call.arguments.clone());

        let mut attempts = 0usize;
        let mut last_error: Option<String> = None;

        for (server, config) in self.servers {
            attempts += 1;
            events.record(AgentEvent::ToolExecution {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                server: server.clone(),
                stage: ToolStage::Started {
                    arguments: call.arguments.clone(),
                },
            });

            match self.sessions.apply(server, config, &work).await {
                Ok(content) => {
                    events.record(AgentEvent::tool_succeeded(
                        &call.id, &call.name, server, &content,
                    ));
                    tracing::debug!(tool = %call.name, server = %server, attempts, "tool routed");
                    return ToolCallResult::success(call, server, content);
                }
                Err(e) => {
                    let classified = classify(&e);
                    events.record(AgentEvent::ToolExecution {
                        call_id: call.id.clone(),
                        tool: call.name.clone(),
                        server: server.clone(),
                        stage: ToolStage::Failed {
                            error: classified.description.clone(),
                            retryable: classified.retryable,
                        },
                    });

                    if !classified.retryable {
                        tracing::info!(
                            tool = %call.name,
                            server = %server,
                            "non-retryable failure, skipping remaining servers"
                        );
                        return ToolCallResult::failure(call, classified.description);
                    }
                    last_error = Some(classified.description);
                }
            }
        }

        events.record(AgentEvent::FallbackExhausted {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            attempts,
        });
        ToolCallResult::failure(call, exhausted_message(&call.name, attempts, last_error))
    }
}

/// Composite error once no server could serve the tool.
fn exhausted_message(tool: &str, attempts: usize, last_error: Option<String>) -> String {
    match last_error {
        Some(last) => format!(
            "Tool '{tool}' could not be executed on any server ({attempts} tried). Last error: {last}"
        ),
        None => format!("Tool '{tool}' could not be executed: no servers are configured"),
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
