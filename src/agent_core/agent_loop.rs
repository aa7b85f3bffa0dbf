//! AgentLoop — the idle → discovering → awaiting_model ⇄ awaiting_tools
//! state machine.
//!
//! One run discovers the catalog once, then alternates between asking the
//! model and routing the tool calls it requests until the model answers
//! without tools. Every transition is reported through the session
//! manager's event sink.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio_util::sync::CancellationToken;

use crate::events::{AgentEvent, EventSink};
use crate::inference::ChatModel;
use crate::mcp_client::types::{ServerConfig, ToolDescriptor};
use crate::mcp_client::{discover, SessionManager};

use super::errors::AgentError;
use super::tool_router::ToolRouter;
use super::types::{RunStatus, Transcript, Turn};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Tool rounds allowed before the run is stopped.
pub const MAX_TOOL_ROUNDS: u32 = 10;

// ─── Settings ───────────────────────────────────────────────────────────────

/// Limits applied to a single run.
#[derive(Debug, Clone, Copy)]
pub struct AgentSettings {
    /// Model replies that request tools, at most.
    pub max_rounds: u32,
    /// Wall-clock budget for the whole run.
    pub deadline: Option<Duration>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_rounds: MAX_TOOL_ROUNDS,
            deadline: None,
        }
    }
}

// ─── Outcome ────────────────────────────────────────────────────────────────

/// Everything a finished run leaves behind.
#[derive(Debug)]
pub struct RunOutcome {
    /// Always terminal: `Done` or `Error`.
    pub status: RunStatus,
    pub transcript: Transcript,
    pub catalog: Vec<ToolDescriptor>,
    /// Tool rounds executed.
    pub rounds: u32,
    /// Set exactly when `status` is `Error`.
    pub error: Option<AgentError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Mutable state of an in-flight run.
struct RunState {
    status: RunStatus,
    transcript: Transcript,
    catalog: Vec<ToolDescriptor>,
    rounds: u32,
    events: Arc<dyn EventSink>,
}

impl RunState {
    fn transition(&mut self, to: RunStatus) {
        let from = self.status;
        if from == to {
            return;
        }
        self.status = to;
        self.events.record(AgentEvent::StatusChanged {
            from,
            to,
            at: Utc::now(),
        });
    }

    fn append(&mut self, turns: impl IntoIterator<Item = Turn>) {
        self.transcript = std::mem::take(&mut self.transcript).with_all(turns);
    }
}

// ─── AgentLoop ──────────────────────────────────────────────────────────────

/// Drives one conversation against a model and a set of servers.
pub struct AgentLoop {
    model: Arc<dyn ChatModel>,
    sessions: SessionManager,
    settings: AgentSettings,
}

impl AgentLoop {
    pub fn new(model: Arc<dyn ChatModel>, sessions: SessionManager) -> Self {
        Self {
            model,
            sessions,
            settings: AgentSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: AgentSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run to a terminal state.
    ///
    /// Cancellation and the deadline drop the in-flight work; any open
    /// session is released with it. The transcript keeps every turn that
    /// was complete at that point.
    pub async fn run(
        &self,
        servers: &IndexMap<String, ServerConfig>,
        transcript: Transcript,
        cancel: CancellationToken,
    ) -> RunOutcome {
        let started_at = Utc::now();
        let mut state = RunState {
            status: RunStatus::Idle,
            transcript,
            catalog: Vec::new(),
            rounds: 0,
            events: self.sessions.events().clone(),
        };

        let result = {
            let deadline = self.settings.deadline;
            let expired = async move {
                match deadline {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(AgentError::Cancelled),
                _ = expired => Err(AgentError::DeadlineExceeded {
                    deadline_secs: deadline.map(|d| d.as_secs()).unwrap_or_default(),
                }),
                result = self.drive(servers, &mut state) => result,
            }
        };

        let error = match result {
            Ok(()) => {
                state.transition(RunStatus::Done);
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, rounds = state.rounds, "agent run failed");
                state.transition(RunStatus::Error);
                Some(e)
            }
        };

        RunOutcome {
            status: state.status,
            transcript: state.transcript,
            catalog: state.catalog,
            rounds: state.rounds,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }

    async fn drive(
        &self,
        servers: &IndexMap<String, ServerConfig>,
        state: &mut RunState,
    ) -> Result<(), AgentError> {
        state.transition(RunStatus::Discovering);
        if servers.is_empty() {
            return Err(AgentError::NoServersConfigured);
        }

        let report = discover(&self.sessions, servers).await;
        if report.is_total_failure() {
            return Err(AgentError::DiscoveryFailed {
                reason: report.error_summary(),
            });
        }
        state.catalog = report.tools;

        let router = ToolRouter::new(&self.sessions, servers);
        loop {
            state.transition(RunStatus::AwaitingModel);
            if state.transcript.is_empty() {
                return Err(AgentError::EmptyTranscript);
            }

            let reply = self.model.complete(&state.transcript, &state.catalog).await?;

            if reply.tool_calls.is_empty() {
                state.append([Turn::Assistant {
                    content: reply.content,
                    tool_calls: Vec::new(),
                }]);
                return Ok(());
            }

            if state.rounds >= self.settings.max_rounds {
                return Err(AgentError::RoundLimitExceeded {
                    rounds: state.rounds,
                });
            }

            state.transition(RunStatus::AwaitingTools);
            state.rounds += 1;
            tracing::info!(
                round = state.rounds,
                tool_calls = reply.tool_calls.len(),
                "executing tool calls"
            );

            let results = router.dispatch_tool_calls(&reply.tool_calls).await;

            // The assistant turn and its results land together so a dropped
            // run never leaves unanswered call ids behind.
            let assistant = Turn::Assistant {
                content: reply.content,
                tool_calls: reply.tool_calls,
            };
            state.append(std::iter::once(assistant).chain(results.into_iter().map(Turn::ToolResult)));
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
