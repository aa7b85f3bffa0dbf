//! Tool catalog builder.
//!
//! Every configured server is asked for its tools concurrently, each inside
//! its own session. Results are merged in declaration order; a failing server
//! only loses its own tools.

use futures::future::join_all;
use indexmap::IndexMap;

use crate::events::AgentEvent;

use super::errors::McpError;
use super::operations::{ListTools, RoutingDescription};
use super::session::SessionManager;
use super::types::{ServerConfig, ToolDescriptor};

/// Outcome of one discovery pass.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    /// Concatenation of each responsive server's tools, in server order.
    /// Name collisions across servers are kept.
    pub tools: Vec<ToolDescriptor>,
    /// Servers that answered, in declaration order.
    pub servers_ok: Vec<String>,
    /// Servers that failed, with the reason, in declaration order.
    pub errors: Vec<(String, McpError)>,
}

impl DiscoveryReport {
    /// True when servers were configured and none of them answered.
    pub fn is_total_failure(&self) -> bool {
        self.servers_ok.is_empty() && !self.errors.is_empty()
    }

    /// One line per failed server, for terminal error messages.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|(server, e)| format!("{server}: {e}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Enumerate tools on every server concurrently and merge the results.
pub async fn discover(
    manager: &SessionManager,
    servers: &IndexMap<String, ServerConfig>,
) -> DiscoveryReport {
    let attempts = servers.iter().map(|(name, config)| async move {
        (name, manager.apply(name, config, &ListTools).await)
    });
    let outcomes = join_all(attempts).await;

    let mut report = DiscoveryReport::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(tools) => {
                manager.events().record(AgentEvent::DiscoveryCompleted {
                    server: name.clone(),
                    tool_count: tools.len(),
                });
                report.servers_ok.push(name.clone());
                report.tools.extend(tools);
            }
            Err(e) => {
                manager.events().record(AgentEvent::DiscoveryFailed {
                    server: name.clone(),
                    error: e.to_string(),
                });
                report.errors.push((name.clone(), e));
            }
        }
    }

    tracing::info!(
        tools = report.tools.len(),
        servers_ok = report.servers_ok.len(),
        servers_failed = report.errors.len(),
        "tool discovery complete"
    );
    report
}

/// Gather a `(server_name, description)` pair from every server that answers.
///
/// Feeds external routing indexes; unreachable servers are logged and left
/// out.
pub async fn routing_descriptions(
    manager: &SessionManager,
    servers: &IndexMap<String, ServerConfig>,
) -> Vec<(String, String)> {
    let attempts = servers.iter().map(|(name, config)| async move {
        (name, manager.apply(name, config, &RoutingDescription).await)
    });

    join_all(attempts)
        .await
        .into_iter()
        .filter_map(|(name, outcome)| match outcome {
            Ok(pair) => Some(pair),
            Err(e) => {
                tracing::warn!(server = %name, error = %e, "routing description unavailable");
                None
            }
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::events::{NullSink, RecordingSink};
    use crate::mcp_client::testing::{FakeConnector, FakeServer};

    fn servers(names: &[&str]) -> IndexMap<String, ServerConfig> {
        names
            .iter()
            .map(|n| (n.to_string(), ServerConfig::process("fake", &[])))
            .collect()
    }

    fn names(tools: &[ToolDescriptor]) -> Vec<&str> {
        tools.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_discover_merges_in_server_order() {
        let connector = FakeConnector::new()
            .with_server("b", FakeServer::new().tool("b1").tool("b2"))
            .with_server("a", FakeServer::new().tool("a1"));
        let manager = SessionManager::new(Arc::new(connector), Arc::new(NullSink));

        let report = discover(&manager, &servers(&["b", "a"])).await;
        assert_eq!(names(&report.tools), vec!["b1", "b2", "a1"]);
        assert_eq!(report.servers_ok, vec!["b", "a"]);
        assert!(report.errors.is_empty());
    }

    #[tokio::test]
    async fn test_discover_keeps_name_collisions() {
        let connector = FakeConnector::new()
            .with_server("a", FakeServer::new().tool("search"))
            .with_server("b", FakeServer::new().tool("search"));
        let manager = SessionManager::new(Arc::new(connector), Arc::new(NullSink));

        let report = discover(&manager, &servers(&["a", "b"])).await;
        assert_eq!(names(&report.tools), vec!["search", "search"]);
    }

    #[tokio::test]
    async fn test_discover_partial_failure_omits_only_failed_server() {
        let connector = FakeConnector::new()
            .with_server("up", FakeServer::new().tool("t"))
            .with_server("down", FakeServer::new().fail_list())
            .with_server("gone", FakeServer::new().fail_open());
        let sink = Arc::new(RecordingSink::default());
        let manager = SessionManager::new(Arc::new(connector), sink.clone());

        let report = discover(&manager, &servers(&["down", "up", "gone"])).await;
        assert_eq!(names(&report.tools), vec!["t"]);
        assert!(!report.is_total_failure());
        let failed: Vec<&str> = report.errors.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(failed, vec!["down", "gone"]);

        let discovery_failures = sink
            .events()
            .iter()
            .filter(|e| matches!(e, AgentEvent::DiscoveryFailed { .. }))
            .count();
        assert_eq!(discovery_failures, 2);
    }

    #[tokio::test]
    async fn test_discover_total_failure() {
        let connector = FakeConnector::new()
            .with_server("x", FakeServer::new().fail_open())
            .with_server("y", FakeServer::new().fail_initialize());
        let manager = SessionManager::new(Arc::new(connector), Arc::new(NullSink));

        let report = discover(&manager, &servers(&["x", "y"])).await;
        assert!(report.is_total_failure());
        assert!(report.error_summary().contains("x:"));
        assert!(report.error_summary().contains("y:"));
    }

    #[tokio::test]
    async fn test_discover_empty_server_list_is_not_total_failure() {
        let manager = SessionManager::new(Arc::new(FakeConnector::new()), Arc::new(NullSink));
        let report = discover(&manager, &IndexMap::new()).await;
        assert!(report.tools.is_empty());
        assert!(!report.is_total_failure());
    }

    #[tokio::test]
    async fn test_discover_runs_servers_concurrently() {
        let slow = || FakeServer::new().tool("t").delay(Duration::from_millis(50));
        let connector = FakeConnector::new()
            .with_server("a", slow())
            .with_server("b", slow())
            .with_server("c", slow());
        let probe = connector.probe();
        let manager = SessionManager::new(Arc::new(connector), Arc::new(NullSink));

        let report = discover(&manager, &servers(&["a", "b", "c"])).await;
        assert_eq!(report.tools.len(), 3);
        assert_eq!(probe.peak_live_transports(), 3);
        assert_eq!(probe.live_transports(), 0);
    }

    #[tokio::test]
    async fn test_routing_descriptions_skip_unreachable_servers() {
        let connector = FakeConnector::new()
            .with_server("web", FakeServer::new().tool("fetch"))
            .with_server("dead", FakeServer::new().fail_open());
        let manager = SessionManager::new(Arc::new(connector), Arc::new(NullSink));

        let pairs = routing_descriptions(&manager, &servers(&["web", "dead"])).await;
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "web");
        assert!(pairs[0].1.contains("fetch"));
    }
}
