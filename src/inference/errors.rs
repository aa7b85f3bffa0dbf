//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to
//! build meaningful log entries.

use thiserror::Error;

/// Errors that can occur during inference operations.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the model endpoint failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    /// The model endpoint did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout { duration_secs: u64 },

    /// Non-2xx HTTP response from the model endpoint.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The response body was not a chat completion.
    #[error("malformed response: {reason}")]
    MalformedResponse { reason: String },

    /// Failed to parse a tool call from the model's response.
    #[error("tool call parse error: {reason}")]
    ToolCallParseError { raw_response: String, reason: String },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    ConfigError { reason: String },
}
