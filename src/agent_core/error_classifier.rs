//! Error classifier — turns a failed tool attempt into model-readable text
//! and a fallback verdict.
//!
//! Checks, in order:
//! 1. Structured JSON error objects (`status` / `code` / `message`)
//! 2. Free text mentioning `validation_error`
//! 3. An HTTP status embedded in the message (400/401/403/404/429/500)
//! 4. Any other tool-reported failure
//! 5. Everything else (spawn, connect, timeout, malformed response)
//!
//! Only validation failures and HTTP 400 stop the fallback chain: the next
//! server would reject the same arguments the same way.

use serde_json::Value;

use crate::mcp_client::types::error_codes;
use crate::mcp_client::McpError;
use crate::text::preview;

// ─── Constants ──────────────────────────────────────────────────────────────

/// Preview length for free-text validation errors.
const VALIDATION_PREVIEW_BYTES: usize = 300;

/// Preview length for HTTP errors that carry a `request_id`.
const HTTP_PREVIEW_WITH_REQUEST_ID: usize = 200;

/// Preview length for other HTTP errors.
const HTTP_PREVIEW_BYTES: usize = 150;

/// Preview of the original message inside block-validation guidance.
const BLOCK_GUIDANCE_PREVIEW_BYTES: usize = 200;

/// Statuses with a fixed explanation.
const HTTP_STATUSES: [u16; 6] = [400, 401, 403, 404, 429, 500];

// ─── Types ──────────────────────────────────────────────────────────────────

/// Which rule matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A structured error object (not a validation error).
    Structured,
    /// Bad arguments; the tool will never accept them.
    Validation,
    /// HTTP status found in the message.
    Http(u16),
    /// The tool ran and reported a failure.
    Execution,
    /// Could not reach or talk to the server.
    Unexpected,
}

/// A failure rendered for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub description: String,
    pub retryable: bool,
    pub kind: FailureKind,
}

impl ClassifiedError {
    fn new(description: String, kind: FailureKind) -> Self {
        let retryable = !matches!(kind, FailureKind::Validation | FailureKind::Http(400));
        Self {
            description,
            retryable,
            kind,
        }
    }
}

// ─── Classification ─────────────────────────────────────────────────────────

/// Classify one failed attempt.
pub fn classify(error: &McpError) -> ClassifiedError {
    let classified = match error {
        McpError::ToolError { content, .. } => classify_tool_text(&tool_error_text(content)),
        McpError::ServerError {
            code,
            message,
            data,
        } => classify_server_error(*code, message, data.as_ref()),
        McpError::TransportError { reason, .. } => {
            match classify_message(reason) {
                Some(classified) => classified,
                None => unexpected(error),
            }
        }
        _ => unexpected(error),
    };

    tracing::debug!(
        kind = ?classified.kind,
        retryable = classified.retryable,
        "classified tool failure"
    );
    classified
}

fn classify_tool_text(text: &str) -> ClassifiedError {
    classify_message(text).unwrap_or_else(|| {
        ClassifiedError::new(format!("Tool execution error: {text}"), FailureKind::Execution)
    })
}

fn classify_server_error(code: i32, message: &str, data: Option<&Value>) -> ClassifiedError {
    if let Some(Value::Object(map)) = data {
        if has_error_fields(map) {
            return format_structured_error(map);
        }
    }
    if let Some(classified) = classify_message(message) {
        return classified;
    }
    // Invalid params is the server rejecting the arguments, unless it is
    // just saying it does not have the tool.
    if code == error_codes::INVALID_PARAMS && !names_missing_tool(message) {
        return ClassifiedError::new(
            format!("Validation Error ({code}): {message}"),
            FailureKind::Validation,
        );
    }
    ClassifiedError::new(
        format!("Tool execution error: server error [{code}]: {message}"),
        FailureKind::Execution,
    )
}

/// Rules 1 to 3 over a raw message. `None` when none of them match.
fn classify_message(text: &str) -> Option<ClassifiedError> {
    if let Some(Value::Object(map)) = parse_json_object(text) {
        return Some(format_structured_error(&map));
    }

    if text.to_ascii_lowercase().contains("validation_error") {
        return Some(ClassifiedError::new(
            format!("Validation Error: {}", preview(text, VALIDATION_PREVIEW_BYTES)),
            FailureKind::Validation,
        ));
    }

    embedded_http_status(text).map(|status| format_http_error(text, status))
}

fn unexpected(error: &McpError) -> ClassifiedError {
    ClassifiedError::new(
        format!("Unexpected error during tool execution: {error}"),
        FailureKind::Unexpected,
    )
}

// ─── Formatting ─────────────────────────────────────────────────────────────

fn format_structured_error(map: &serde_json::Map<String, Value>) -> ClassifiedError {
    let status = map
        .get("status")
        .map(render_scalar)
        .unwrap_or_else(|| "unknown".to_string());
    let code = map
        .get("code")
        .and_then(Value::as_str)
        .unwrap_or("unknown_error");
    let message = map
        .get("message")
        .map(render_scalar)
        .unwrap_or_else(|| Value::Object(map.clone()).to_string());

    if code == "validation_error" {
        return ClassifiedError::new(
            format_validation_message(&message, &status),
            FailureKind::Validation,
        );
    }

    let description = if map.get("object").and_then(Value::as_str) == Some("error") {
        format!("API Error ({status}): {message}")
    } else {
        format!("Error ({status}): {message}")
    };
    let kind = match status.parse::<u16>() {
        Ok(400) => FailureKind::Http(400),
        _ => FailureKind::Structured,
    };
    ClassifiedError::new(description, kind)
}

fn format_validation_message(message: &str, status: &str) -> String {
    if message.contains("body.children[") {
        return format!(
            "Notion Block Validation Error ({status}): The block content structure is incorrect. \
             Each block must have exactly one content type defined (paragraph, heading, list, etc.). \
             Original error: {}",
            preview(message, BLOCK_GUIDANCE_PREVIEW_BYTES)
        );
    }
    format!("Validation Error ({status}): {message}")
}

fn format_http_error(text: &str, status: u16) -> ClassifiedError {
    let base = match status {
        400 => "Bad Request - The request was invalid or malformed",
        401 => "Unauthorized - Authentication failed or token is invalid",
        403 => "Forbidden - Access denied to the requested resource",
        404 => "Not Found - The requested resource does not exist",
        429 => "Rate Limited - Too many requests, please wait before retrying",
        _ => "Internal Server Error - Something went wrong on the server",
    };
    let description = if text.contains("request_id") {
        format!("{base}. {}", preview(text, HTTP_PREVIEW_WITH_REQUEST_ID))
    } else {
        format!("{base}: {}", preview(text, HTTP_PREVIEW_BYTES))
    };
    ClassifiedError::new(description, FailureKind::Http(status))
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Tool errors arrive as serialized content blocks; pull out their text.
fn tool_error_text(content: &str) -> String {
    let Ok(Value::Array(blocks)) = serde_json::from_str::<Value>(content) else {
        return content.to_string();
    };
    let texts: Vec<&str> = blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();
    if texts.is_empty() {
        content.to_string()
    } else {
        texts.join("\n")
    }
}

fn parse_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str::<Value>(trimmed)
        .ok()
        .filter(Value::is_object)
}

fn has_error_fields(map: &serde_json::Map<String, Value>) -> bool {
    ["status", "code", "message"]
        .iter()
        .any(|key| map.contains_key(*key))
}

fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A known status number that reads as an HTTP status.
///
/// The number must stand alone and either follow `HTTP`, `status` or
/// `code`, or be followed by its reason phrase (`404 Not Found`). Other
/// numbers in tool output (`the 400 KB limit`) are not statuses.
fn embedded_http_status(text: &str) -> Option<u16> {
    let words: Vec<&str> = text.split_whitespace().collect();
    words.iter().enumerate().find_map(|(i, word)| {
        let digits = word.trim_matches(|c: char| !c.is_ascii_alphanumeric());
        if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let status = digits.parse::<u16>().ok().filter(|s| HTTP_STATUSES.contains(s))?;

        let after_keyword = i
            .checked_sub(1)
            .map(|prev| {
                let prev = words[prev]
                    .trim_matches(|c: char| !c.is_ascii_alphanumeric())
                    .to_ascii_lowercase();
                prev.starts_with("http") || prev == "status" || prev == "code"
            })
            .unwrap_or(false);
        let before_reason = {
            let rest = words[i + 1..].join(" ").to_ascii_lowercase();
            rest.starts_with(reason_phrase(status))
        };
        (after_keyword || before_reason).then_some(status)
    })
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "bad request",
        401 => "unauthorized",
        403 => "forbidden",
        404 => "not found",
        429 => "too many requests",
        _ => "internal server error",
    }
}

fn names_missing_tool(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("unknown tool") || (lower.contains("tool") && lower.contains("not found"))
}

// ─── Tests ──────────────────────────────────────────────────────────────────
