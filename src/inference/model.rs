//! The model-call collaborator seen by the agent loop.

use async_trait::async_trait;

use crate::agent_core::types::{ToolCallRequest, Transcript};
use crate::mcp_client::types::ToolDescriptor;

use super::errors::InferenceError;

/// What the model said back: text, tool-call requests, or both.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls,
        }
    }
}

/// Given the transcript and the tool catalog, produce the next reply.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        transcript: &Transcript,
        tools: &[ToolDescriptor],
    ) -> Result<ModelReply, InferenceError>;
}
