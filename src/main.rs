//! `mcp-relay` — run an agent against on-demand MCP servers from the shell.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use mcp_relay::agent_core::{AgentLoop, AgentSettings, RunStatus, Transcript, MAX_TOOL_ROUNDS};
use mcp_relay::inference::{load_model_config, ModelConfig, OpenAiChatModel};
use mcp_relay::mcp_client::config::resolve_config_path;
use mcp_relay::mcp_client::{
    discover, load_servers_config, routing_descriptions, SessionManager, SessionTimeouts,
};
use mcp_relay::{init_tracing, LogFormat};

#[derive(Parser)]
#[command(name = "mcp-relay", version)]
#[command(about = "Route LLM tool calls across MCP servers, one fresh session per call")]
#[command(long_about = "mcp-relay discovers the tools of every configured MCP server, hands the \
catalog to an OpenAI-compatible model, and routes each tool call the model makes across the \
servers in declaration order until one succeeds.\n\n\
Environment Variables:\n\
  MCP_RELAY_SERVERS  Servers file used when --servers is not given\n\
  OPENAI_API_KEY     API key for the model endpoint\n\
  OPENAI_BASE_URL    Model endpoint (defaults to https://api.openai.com/v1)\n\
  RUST_LOG           Log filter, overrides -v")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Prompt to send when no subcommand is given
    prompt: Option<String>,

    /// Servers file (`{"mcpServers": {...}}`, JSON or YAML)
    #[arg(short = 's', long, global = true, value_name = "PATH")]
    servers: Option<PathBuf>,

    /// Model configuration file (YAML)
    #[arg(long, global = true, value_name = "PATH")]
    model_config: Option<PathBuf>,

    /// Model as `provider/name`, overriding the configuration file
    #[arg(short = 'm', long, global = true)]
    model: Option<String>,

    /// Tool rounds allowed before the run stops
    #[arg(long, global = true, default_value_t = MAX_TOOL_ROUNDS)]
    max_rounds: u32,

    /// Wall-clock budget for the whole run, in seconds
    #[arg(long, global = true)]
    deadline_secs: Option<u64>,

    /// Timeout for each request inside a session, in seconds
    #[arg(long, global = true, default_value_t = 30)]
    call_timeout_secs: u64,

    /// Timeout for the initialize handshake, in seconds
    #[arg(long, global = true, default_value_t = 30)]
    init_timeout_secs: u64,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    /// More log output (-v, -vv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Run the agent on a prompt (default)
    Run {
        /// The user's request
        prompt: String,
    },
    /// List the tools every server advertises
    Tools,
    /// Print one routing description per server
    Describe,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.json_logs {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    init_tracing(cli.verbose, format);

    let servers_path = resolve_config_path(cli.servers.as_deref())?;
    let servers = load_servers_config(&servers_path)
        .with_context(|| format!("loading servers from {}", servers_path.display()))?;

    let sessions = SessionManager::default().with_timeouts(SessionTimeouts {
        init: Duration::from_secs(cli.init_timeout_secs),
        call: Duration::from_secs(cli.call_timeout_secs),
    });

    let command = match (cli.command, cli.prompt) {
        (Some(command), _) => command,
        (None, Some(prompt)) => Command::Run { prompt },
        (None, None) => bail!("nothing to do: pass a prompt or a subcommand (see --help)"),
    };

    match command {
        Command::Tools => {
            let report = discover(&sessions, &servers).await;
            for (server, e) in &report.errors {
                eprintln!("{server}: {e}");
            }
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report.tools)?);
            } else {
                for tool in &report.tools {
                    println!("{:<32} {}", tool.name, tool.description);
                }
            }
            if report.is_total_failure() {
                bail!("no server answered tool discovery");
            }
        }
        Command::Describe => {
            for (server, description) in routing_descriptions(&sessions, &servers).await {
                println!("## {server}\n{description}\n");
            }
        }
        Command::Run { prompt } => {
            let mut model_config = match &cli.model_config {
                Some(path) => load_model_config(path)
                    .with_context(|| format!("loading model config from {}", path.display()))?,
                None => ModelConfig::default(),
            };
            if let Some(model) = &cli.model {
                model_config = model_config.with_model(model);
            }
            let model = OpenAiChatModel::new(model_config).context("building model client")?;

            let agent = AgentLoop::new(Arc::new(model), sessions).with_settings(AgentSettings {
                max_rounds: cli.max_rounds,
                deadline: cli.deadline_secs.map(Duration::from_secs),
            });

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_signal.cancel();
                }
            });

            let outcome = agent
                .run(&servers, Transcript::from_prompt(prompt), cancel)
                .await;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome.transcript)?);
            } else if let Some(reply) = outcome.transcript.final_reply() {
                println!("{reply}");
            }

            let (ok, failed) = outcome.transcript.tool_result_counts();
            tracing::info!(
                status = %outcome.status,
                rounds = outcome.rounds,
                tools_ok = ok,
                tools_failed = failed,
                elapsed_ms = (outcome.finished_at - outcome.started_at).num_milliseconds(),
                "run finished"
            );

            if outcome.status == RunStatus::Error {
                match outcome.error {
                    Some(e) => return Err(e).context("agent run failed"),
                    None => bail!("agent run failed"),
                }
            }
        }
    }

    Ok(())
}
