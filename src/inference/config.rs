//! Model configuration loading.
//!
//! Reads a small YAML file describing one OpenAI-compatible endpoint.
//! String values may use `${VAR}` or `${VAR:-default}`; defaults get a
//! leading `~` expanded.

use std::path::Path;

use serde::Deserialize;

use crate::mcp_client::config::expand_tilde;

use super::errors::InferenceError;

// ─── Constants ───────────────────────────────────────────────────────────────

/// Model used when nothing is configured.
pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

/// Endpoint used when neither the file nor `OPENAI_BASE_URL` names one.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// System prompt prepended to every request.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful assistant with access to various tools. Use them when needed to help the user.";

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_base_url() -> String {
    std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
}
fn default_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty())
}
fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Runtime configuration of the chat model.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    /// `provider/model` or a bare model name.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Sent as a bearer token when present.
    #[serde(default = "default_api_key")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            api_key: default_api_key(),
            temperature: 0.0,
            max_tokens: None,
            system_prompt: default_system_prompt(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ModelConfig {
    /// Provider half of `provider/model`; `openai` for bare names.
    pub fn provider(&self) -> &str {
        self.model
            .split_once('/')
            .map(|(provider, _)| provider)
            .unwrap_or("openai")
    }

    /// Model name sent on the wire.
    pub fn model_name(&self) -> &str {
        self.model
            .split_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&self.model)
    }

    /// Override the model, keeping everything else.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load and parse a model configuration file.
pub fn load_model_config(path: &Path) -> Result<ModelConfig, InferenceError> {
    let raw = std::fs::read_to_string(path).map_err(|e| InferenceError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    parse_model_config(&raw)
}

/// Parse model configuration YAML after env-var interpolation.
pub fn parse_model_config(raw: &str) -> Result<ModelConfig, InferenceError> {
    let interpolated = interpolate_env_vars(raw);
    let config: ModelConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| InferenceError::ConfigError {
            reason: format!("failed to parse model config: {e}"),
        })?;

    if config.model_name().is_empty() {
        return Err(InferenceError::ConfigError {
            reason: format!("model '{}' has an empty name", config.model),
        });
    }
    Ok(config)
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
