//! Server configuration loading.
//!
//! The servers document is `{"mcpServers": {name: entry, …}}`, as JSON or
//! YAML. Entry order is preserved and becomes fallback priority. `${VAR}`
//! templates inside `env` are kept as-is here and resolved per session.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use super::errors::McpError;
use super::types::{McpServersConfig, ServerConfig};

/// Env var naming the servers document when no path is given.
pub const CONFIG_PATH_ENV: &str = "MCP_RELAY_SERVERS";

/// Resolve the servers document path.
///
/// Order: explicit path, then `$MCP_RELAY_SERVERS`, then
/// `<config dir>/mcp-relay/servers.json`.
pub fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf, McpError> {
    if let Some(path) = explicit {
        return Ok(PathBuf::from(expand_tilde(&path.to_string_lossy())));
    }

    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(expand_tilde(&path)));
        }
    }

    dirs::config_dir()
        .map(|dir| dir.join("mcp-relay").join("servers.json"))
        .ok_or_else(|| McpError::ConfigError {
            reason: format!("no servers config given and ${CONFIG_PATH_ENV} is not set"),
        })
}

/// Load the ordered server table from a JSON or YAML document.
pub fn load_servers_config(path: &Path) -> Result<IndexMap<String, ServerConfig>, McpError> {
    let raw = std::fs::read_to_string(path).map_err(|e| McpError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    let config = parse_servers_config(&raw, is_yaml(path))?;

    tracing::info!(
        path = %path.display(),
        servers = config.mcp_servers.len(),
        "loaded MCP servers config"
    );
    Ok(config.mcp_servers)
}

/// Parse a servers document. Per-entry shape problems are not reported here.
pub fn parse_servers_config(raw: &str, yaml: bool) -> Result<McpServersConfig, McpError> {
    if yaml {
        serde_yaml::from_str(raw).map_err(|e| McpError::ConfigError {
            reason: format!("failed to parse servers config: {e}"),
        })
    } else {
        serde_json::from_str(raw).map_err(|e| McpError::ConfigError {
            reason: format!("failed to parse servers config: {e}"),
        })
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
}

/// Expand a leading `~` to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_load_json_config_keeps_order() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"mcpServers": {{
                "notion": {{"command": "npx", "args": ["-y", "@notionhq/notion-mcp-server"],
                           "env": {{"OPENAPI_MCP_HEADERS": "${{NOTION_HEADERS}}"}}}},
                "fetch": {{"url": "http://localhost:8931/mcp"}}
            }}}}"#
        )
        .unwrap();

        let servers = load_servers_config(file.path()).unwrap();
        let names: Vec<&String> = servers.keys().collect();
        assert_eq!(names, vec!["notion", "fetch"]);
        assert_eq!(servers["notion"].env["OPENAPI_MCP_HEADERS"], "${NOTION_HEADERS}");
        assert_eq!(servers["fetch"].url.as_deref(), Some("http://localhost:8931/mcp"));
    }

    #[test]
    fn test_load_yaml_config() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "mcpServers:\n  files:\n    command: uvx\n    args: [mcp-server-filesystem, /tmp]\n    env:\n      DEBUG: true"
        )
        .unwrap();

        let servers = load_servers_config(file.path()).unwrap();
        assert_eq!(servers["files"].command.as_deref(), Some("uvx"));
        assert_eq!(servers["files"].args.len(), 2);
        assert_eq!(servers["files"].env["DEBUG"], "true");
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = load_servers_config(Path::new("/nonexistent/servers.json")).unwrap_err();
        assert!(matches!(err, McpError::ConfigError { .. }));
    }

    #[test]
    fn test_structured_env_value_is_rejected() {
        let raw = r#"{"mcpServers": {"x": {"command": "a", "env": {"K": {"nested": 1}}}}}"#;
        assert!(parse_servers_config(raw, false).is_err());
    }

    #[test]
    fn test_malformed_entry_still_parses() {
        let raw = r#"{"mcpServers": {"empty": {}}}"#;
        let config = parse_servers_config(raw, false).unwrap();
        assert!(config.mcp_servers["empty"].transport_spec("empty").is_err());
    }

    #[test]
    fn test_explicit_path_wins_and_expands_tilde() {
        let path = resolve_config_path(Some(Path::new("~/servers.json"))).unwrap();
        assert!(!path.to_string_lossy().starts_with('~'));
        assert!(path.ends_with("servers.json"));
    }
}
