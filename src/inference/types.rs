//! Wire types for the OpenAI Chat Completions API.

use serde::{Deserialize, Serialize};

// ─── Request Types ───────────────────────────────────────────────────────────

/// A single message in the conversation.
///
/// `content` is sent as `""` rather than `null` for assistant messages with
/// tool calls; several OpenAI-compatible servers reject `null` there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    /// Tool call results are sent back as `tool` role messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Assistant messages may contain tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
        }
    }
}

/// Emit `""` instead of `null` when `content` is `None`.
fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match value {
        Some(s) => serializer.serialize_str(s),
        None => serializer.serialize_str(""),
    }
}

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

// ─── Response Types ──────────────────────────────────────────────────────────

/// Tool call as carried in the OpenAI message format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub id: String,
    pub r#type: String,
    pub function: FunctionCallResponse,
}

/// Function call details; `arguments` is a JSON document in a string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    pub arguments: String,
}

/// Non-streaming completion response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
    #[allow(dead_code)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<CompletionToolCall>>,
}

/// Tool call in a response; some servers omit `id` or `type`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub function: FunctionCallResponse,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_content_serializes_as_empty_string() {
        let msg = ChatMessage {
            role: Role::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(vec![]),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "");
        assert_eq!(json["role"], "assistant");
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn test_max_tokens_omitted_when_none() {
        let req = ChatCompletionRequest {
            model: "test".to_string(),
            messages: vec![],
            tools: None,
            tool_choice: None,
            temperature: 0.0,
            max_tokens: None,
            stream: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("max_tokens"));
        assert!(!json.contains("tools"));
    }
}
