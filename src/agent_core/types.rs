//! Shared types for the agent core.
//!
//! Tool-call requests and results, the append-only transcript, and the run
//! status of the control loop.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix that marks a failed tool result in the transcript.
pub const ERROR_PREFIX: &str = "Error:";

// ─── Tool Calls ─────────────────────────────────────────────────────────────

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id echoed back on the result.
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Payload of a tool result: content or an error description, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Content(String),
    Error(String),
}

/// The answer to exactly one [`ToolCallRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub call_id: String,
    pub tool_name: String,
    /// Server that produced the content, when one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    pub outcome: ToolOutcome,
}

impl ToolCallResult {
    pub fn success(request: &ToolCallRequest, server: &str, content: String) -> Self {
        Self {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            server: Some(server.to_string()),
            outcome: ToolOutcome::Content(content),
        }
    }

    pub fn failure(request: &ToolCallRequest, description: String) -> Self {
        Self {
            call_id: request.id.clone(),
            tool_name: request.name.clone(),
            server: None,
            outcome: ToolOutcome::Error(description),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    /// Text handed to the model. Failures carry the `Error:` prefix.
    pub fn text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Content(content) => content.clone(),
            ToolOutcome::Error(description) => format!("{ERROR_PREFIX} {description}"),
        }
    }
}

// ─── Transcript ─────────────────────────────────────────────────────────────

/// One entry of the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    Human {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    ToolResult(ToolCallResult),
}

/// Ordered, append-only conversation history.
///
/// Appending consumes the transcript and returns the extended one, so a
/// snapshot handed to a collaborator can never be changed behind the loop's
/// back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transcript holding a single human turn.
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new().with(Turn::Human {
            content: prompt.into(),
        })
    }

    #[must_use]
    pub fn with(mut self, turn: Turn) -> Self {
        self.turns.push(turn);
        self
    }

    #[must_use]
    pub fn with_all(mut self, turns: impl IntoIterator<Item = Turn>) -> Self {
        self.turns.extend(turns);
        self
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Text of the most recent assistant turn, if any.
    pub fn final_reply(&self) -> Option<&str> {
        self.turns.iter().rev().find_map(|turn| match turn {
            Turn::Assistant { content, .. } => content.as_deref(),
            _ => None,
        })
    }

    /// `(succeeded, failed)` tool results across the whole transcript.
    pub fn tool_result_counts(&self) -> (usize, usize) {
        self.turns.iter().fold((0, 0), |(ok, err), turn| match turn {
            Turn::ToolResult(result) if result.is_error() => (ok, err + 1),
            Turn::ToolResult(_) => (ok + 1, err),
            _ => (ok, err),
        })
    }
}

// ─── Run Status ─────────────────────────────────────────────────────────────

/// Where the control loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Discovering,
    AwaitingModel,
    AwaitingTools,
    Done,
    Error,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Error)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Idle => "idle",
            RunStatus::Discovering => "discovering",
            RunStatus::AwaitingModel => "awaiting_model",
            RunStatus::AwaitingTools => "awaiting_tools",
            RunStatus::Done => "done",
            RunStatus::Error => "error",
        };
        f.write_str(name)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
