//! Agent Core — the control loop and everything it drives.
//!
//! Submodules:
//! - `agent_loop`: The run state machine (discover, ask the model, route tools)
//! - `tool_router`: Fallback chain across servers for each tool call
//! - `error_classifier`: Model-readable failure text plus a fallback verdict
//! - `types`: Transcript, tool calls and run status
//! - `errors`: Errors that end a run

pub mod agent_loop;
pub mod error_classifier;
pub mod errors;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use agent_loop::{AgentLoop, AgentSettings, RunOutcome, MAX_TOOL_ROUNDS};
pub use error_classifier::{classify, ClassifiedError};
pub use errors::AgentError;
pub use tool_router::ToolRouter;
pub use types::{RunStatus, ToolCallRequest, ToolCallResult, Transcript, Turn};
