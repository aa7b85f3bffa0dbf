//! Inference — the model-call collaborator.
//!
//! This module handles:
//! - The [`ChatModel`] seam the agent loop talks to
//! - An OpenAI-compatible implementation over HTTP
//! - Model configuration loading from YAML
//!
//! Switching endpoints or models is a config change, not a code change.

pub mod client;
pub mod config;
pub mod errors;
pub mod model;
pub mod types;

// Re-exports for convenience
pub use client::OpenAiChatModel;
pub use config::{load_model_config, ModelConfig};
pub use errors::InferenceError;
pub use model::{ChatModel, ModelReply};
