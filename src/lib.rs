pub mod agent_core;
pub mod events;
pub mod inference;
pub mod mcp_client;

pub(crate) mod text;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Filter applied when `RUST_LOG` is unset, by verbosity level.
fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "mcp_relay=info,warn",
        1 => "mcp_relay=debug,info",
        _ => "mcp_relay=trace,debug",
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr so stdout carries only the agent's reply. `RUST_LOG`
/// wins over `verbosity`. Calling this twice is harmless; the second call
/// leaves the first subscriber in place.
pub fn init_tracing(verbosity: u8, format: LogFormat) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            "mcp-relay starting"
        );
    }
}
