//! Agent Core error types.

use thiserror::Error;

use crate::inference::errors::InferenceError;

/// Errors that end a run in the `error` state.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The servers table is empty.
    #[error("no MCP servers configured")]
    NoServersConfigured,

    /// Processing was attempted on a transcript with no turns.
    #[error("transcript is empty")]
    EmptyTranscript,

    /// Every configured server failed discovery.
    #[error("tool discovery failed on every server: {reason}")]
    DiscoveryFailed { reason: String },

    /// The model collaborator failed.
    #[error("model call failed: {0}")]
    Inference(#[from] InferenceError),

    /// The model kept requesting tools past the round cap.
    #[error("model requested tools for {rounds} rounds without finishing")]
    RoundLimitExceeded { rounds: u32 },

    /// The run's wall-clock deadline passed.
    #[error("run deadline of {deadline_secs}s exceeded")]
    DeadlineExceeded { deadline_secs: u64 },

    /// The run was cancelled from outside.
    #[error("run cancelled")]
    Cancelled,
}
