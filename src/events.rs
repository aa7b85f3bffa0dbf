//! Structured event sink.
//!
//! Components report what happened through an injected [`EventSink`] rather
//! than a global logger. [`TracingSink`] forwards to `tracing`; [`NullSink`]
//! drops everything. Tests use a `RecordingSink` that keeps events in memory.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::agent_core::types::RunStatus;
use crate::text::preview;

/// Characters of a successful tool result shown in the execution log.
pub const RESULT_PREVIEW_BYTES: usize = 100;

// ─── Events ──────────────────────────────────────────────────────────────────

/// Phase of a single tool execution attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolStage {
    Started { arguments: serde_json::Value },
    Succeeded { result_preview: String },
    Failed { error: String, retryable: bool },
}

/// Something worth reporting during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    SessionOpened {
        server: String,
        transport: &'static str,
    },
    SessionClosed {
        server: String,
        succeeded: bool,
    },
    DiscoveryCompleted {
        server: String,
        tool_count: usize,
    },
    DiscoveryFailed {
        server: String,
        error: String,
    },
    ToolExecution {
        call_id: String,
        tool: String,
        server: String,
        stage: ToolStage,
    },
    /// No server could serve the tool.
    FallbackExhausted {
        call_id: String,
        tool: String,
        attempts: usize,
    },
    StatusChanged {
        from: RunStatus,
        to: RunStatus,
        at: DateTime<Utc>,
    },
}

impl AgentEvent {
    /// Build a `Succeeded` execution event with a bounded preview.
    pub fn tool_succeeded(call_id: &str, tool: &str, server: &str, content: &str) -> Self {
        AgentEvent::ToolExecution {
            call_id: call_id.to_string(),
            tool: tool.to_string(),
            server: server.to_string(),
            stage: ToolStage::Succeeded {
                result_preview: preview(content, RESULT_PREVIEW_BYTES),
            },
        }
    }
}

// ─── Sinks ───────────────────────────────────────────────────────────────────

/// Receives events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn record(&self, event: AgentEvent);
}

/// Forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, event: AgentEvent) {
        match event {
            AgentEvent::SessionOpened { server, transport } => {
                tracing::debug!(server = %server, transport, "session opened");
            }
            AgentEvent::SessionClosed { server, succeeded } => {
                tracing::debug!(server = %server, succeeded, "session closed");
            }
            AgentEvent::DiscoveryCompleted { server, tool_count } => {
                tracing::info!(server = %server, tool_count, "discovered tools");
            }
            AgentEvent::DiscoveryFailed { server, error } => {
                tracing::warn!(server = %server, error = %error, "tool discovery failed");
            }
            AgentEvent::ToolExecution {
                call_id,
                tool,
                server,
                stage,
            } => match stage {
                ToolStage::Started { arguments } => {
                    tracing::info!(call_id = %call_id, tool = %tool, server = %server, %arguments, "tool execution started");
                }
                ToolStage::Succeeded { result_preview } => {
                    tracing::info!(call_id = %call_id, tool = %tool, server = %server, result_preview = %result_preview, "tool execution succeeded");
                }
                ToolStage::Failed { error, retryable } => {
                    tracing::warn!(call_id = %call_id, tool = %tool, server = %server, retryable, error = %error, "tool execution failed");
                }
            },
            AgentEvent::FallbackExhausted {
                call_id,
                tool,
                attempts,
            } => {
                tracing::warn!(call_id = %call_id, tool = %tool, attempts, "no server could serve tool");
            }
            AgentEvent::StatusChanged { from, to, .. } => {
                tracing::debug!(from = ?from, to = ?to, "run status changed");
            }
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: AgentEvent) {}
}

/// Keeps every event in memory, in arrival order.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<AgentEvent>>,
}

#[cfg(test)]
impl RecordingSink {
    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<AgentEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// The `to` side of every status transition, in order.
    pub fn statuses(&self) -> Vec<RunStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                AgentEvent::StatusChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
impl EventSink for RecordingSink {
    fn record(&self, event: AgentEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_sink_keeps_order() {
        let sink = RecordingSink::default();
        sink.record(AgentEvent::DiscoveryCompleted {
            server: "a".into(),
            tool_count: 2,
        });
        sink.record(AgentEvent::DiscoveryFailed {
            server: "b".into(),
            error: "boom".into(),
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], AgentEvent::DiscoveryFailed { .. }));
    }

    #[test]
    fn test_tool_succeeded_preview_is_bounded() {
        let long = "x".repeat(500);
        match AgentEvent::tool_succeeded("c1", "t", "s", &long) {
            AgentEvent::ToolExecution {
                stage: ToolStage::Succeeded { result_preview },
                ..
            } => {
                assert_eq!(result_preview.len(), RESULT_PREVIEW_BYTES + 3);
                assert!(result_preview.ends_with("..."));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_tracing_sink_accepts_every_event_without_subscriber() {
        let sink = TracingSink;
        sink.record(AgentEvent::StatusChanged {
            from: RunStatus::Idle,
            to: RunStatus::Discovering,
            at: Utc::now(),
        });
        sink.record(AgentEvent::FallbackExhausted {
            call_id: "c".into(),
            tool: "t".into(),
            attempts: 2,
        });
    }
}
