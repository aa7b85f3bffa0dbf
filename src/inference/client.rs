//! OpenAI-compatible chat model.
//!
//! Sends non-streaming chat completion requests with the tool catalog
//! attached and turns the reply into a [`ModelReply`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use crate::agent_core::types::{ToolCallRequest, Transcript, Turn};
use crate::mcp_client::types::ToolDescriptor;

use super::config::ModelConfig;
use super::errors::InferenceError;
use super::model::{ChatModel, ModelReply};
use super::types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, FunctionCallResponse,
    FunctionDefinition, Role, ToolCallResponse, ToolDefinition,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// ─── OpenAiChatModel ─────────────────────────────────────────────────────────

/// Chat model behind `POST {base_url}/chat/completions`.
pub struct OpenAiChatModel {
    http: HttpClient,
    config: ModelConfig,
}

impl OpenAiChatModel {
    /// Build the HTTP client. Connectivity is checked on the first request.
    pub fn new(config: ModelConfig) -> Result<Self, InferenceError> {
        let http = HttpClient::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| InferenceError::ConnectionFailed {
                endpoint: config.base_url.clone(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        tracing::debug!(
            provider = config.provider(),
            model = config.model_name(),
            base_url = %config.base_url,
            "chat model configured"
        );
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Send one non-streaming chat completion request.
    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
        tools: Option<Vec<ToolDefinition>>,
    ) -> Result<ModelReply, InferenceError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let body = ChatCompletionRequest {
            model: self.config.model_name().to_string(),
            messages,
            tool_choice: tools.as_ref().map(|_| "auto".to_string()),
            tools,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            stream: false,
        };

        // Metadata only; the body can be huge
        tracing::info!(
            url = %url,
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            "chat completion request"
        );

        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                InferenceError::Timeout {
                    duration_secs: self.config.request_timeout_secs,
                }
            } else {
                InferenceError::ConnectionFailed {
                    endpoint: url.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(InferenceError::HttpError {
                status: status.as_u16(),
                body: body_text,
            });
        }

        let body_text = response
            .text()
            .await
            .map_err(|e| InferenceError::MalformedResponse {
                reason: format!("failed to read response body: {e}"),
            })?;

        parse_completion_response(&body_text)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(
        &self,
        transcript: &Transcript,
        tools: &[ToolDescriptor],
    ) -> Result<ModelReply, InferenceError> {
        let messages = build_messages(&self.config.system_prompt, transcript);
        let tools = (!tools.is_empty()).then(|| tool_definitions(tools));
        self.chat_completion(messages, tools).await
    }
}

// ─── Conversion ──────────────────────────────────────────────────────────────

/// System prompt followed by one message per transcript turn.
pub fn build_messages(system_prompt: &str, transcript: &Transcript) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    if !system_prompt.is_empty() {
        messages.push(ChatMessage::text(Role::System, system_prompt));
    }

    for turn in transcript.turns() {
        let message = match turn {
            Turn::Human { content } => ChatMessage::text(Role::User, content.clone()),
            Turn::Assistant {
                content,
                tool_calls,
            } => ChatMessage {
                role: Role::Assistant,
                content: content.clone(),
                tool_call_id: None,
                tool_calls: (!tool_calls.is_empty()).then(|| {
                    tool_calls
                        .iter()
                        .map(|call| ToolCallResponse {
                            id: call.id.clone(),
                            r#type: "function".to_string(),
                            function: FunctionCallResponse {
                                name: call.name.clone(),
                                arguments: call.arguments.to_string(),
                            },
                        })
                        .collect()
                }),
            },
            Turn::ToolResult(result) => ChatMessage {
                role: Role::Tool,
                content: Some(result.text()),
                tool_call_id: Some(result.call_id.clone()),
                tool_calls: None,
            },
        };
        messages.push(message);
    }
    messages
}

/// The catalog as OpenAI function tools.
pub fn tool_definitions(tools: &[ToolDescriptor]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|tool| ToolDefinition {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: if tool.input_schema.is_object() {
                    tool.input_schema.clone()
                } else {
                    serde_json::json!({"type": "object", "properties": {}})
                },
            },
        })
        .collect()
}

/// Parse a non-streaming completion into a reply.
pub fn parse_completion_response(body: &str) -> Result<ModelReply, InferenceError> {
    let resp: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::MalformedResponse {
            reason: format!("failed to parse completion response: {e}"),
        })?;

    let choice = resp
        .choices
        .into_iter()
        .next()
        .ok_or(InferenceError::MalformedResponse {
            reason: "empty choices array".into(),
        })?;

    let content = choice.message.content.filter(|c| !c.is_empty());

    let mut tool_calls = Vec::new();
    for tc in choice.message.tool_calls.unwrap_or_default() {
        let id = tc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4()));
        let raw = tc.function.arguments;
        let arguments = if raw.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&raw).map_err(|e| InferenceError::ToolCallParseError {
                raw_response: raw.clone(),
                reason: format!("invalid JSON: {e}"),
            })?
        };
        tool_calls.push(ToolCallRequest::new(id, tc.function.name, arguments));
    }

    Ok(ModelReply {
        content,
        tool_calls,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
