//! CLI entrypoint and subcommand orchestration.

mod config;
mod console;
#[cfg(test)]
mod test_support;

use std::sync::Arc;

use agent::{AgentRuntime, AnthropicProvider, EventSink, LlmProvider, SessionEventHub, ToolRegistry};
use clap::{Parser, Subcommand};
use gateway::{AppState, BrowserProvider, SteelClient};
use proto::{ConversationHistory, SessionId, Turn};
use tools::ActionExecutor;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::console::ConsoleSink;

#[cfg(not(test))]
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Top-level command-line arguments.
#[derive(Parser)]
#[command(name = "browserpilot")]
#[command(about = "Browser-driving AI agent", version = "0.1.0")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable debug logging to ~/.browserpilot/logs/debug.log
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP/SSE API
    Serve {
        /// Override the configured port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one task against a hosted browser and print the answer
    Run {
        /// Task for the agent
        #[arg(short, long)]
        exec: String,
        /// Reuse an existing browser session instead of creating one
        #[arg(short, long)]
        session: Option<String>,
    },
}

#[cfg(not(test))]
#[tokio::main]
/// Program entrypoint.
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    // WorkerGuard must outlive main() so buffered file writes are flushed on exit.
    let _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>;

    let debug_writer = if cli.debug {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        let log_dir = std::path::PathBuf::from(home)
            .join(".browserpilot")
            .join("logs");
        std::fs::create_dir_all(&log_dir).ok();
        let appender = tracing_appender::rolling::daily(&log_dir, "debug.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        _file_guard = Some(guard);
        Some(writer)
    } else {
        _file_guard = None;
        None
    };

    // `run` prints the answer on stdout, so console logs go to stderr.
    match debug_writer {
        Some(writer) => {
            let console = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(console_filter);
            let file = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .with_filter(EnvFilter::new(
                    "debug,hyper_util=info,rustls=info,reqwest=info,chromiumoxide=info,tungstenite=info",
                ));
            tracing_subscriber::registry()
                .with(console)
                .with(file)
                .init();
        }
        None => {
            fmt()
                .with_env_filter(console_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
    }

    if cli.debug {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            command = command_label(&cli.command),
            log_level = %cli.log_level,
            "========== browserpilot session start =========="
        );
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => cmd_serve(config, port).await,
        Commands::Run { exec, session } => cmd_run(config, exec, session).await,
    }
}

fn command_label(command: &Commands) -> &'static str {
    match command {
        Commands::Serve { .. } => "serve",
        Commands::Run { .. } => "run",
    }
}

/// Builds the Anthropic provider from config.
fn build_provider(config: &Config) -> Arc<dyn LlmProvider> {
    if config.agent.api_key.is_empty() {
        warn!("No API key configured. Set ANTHROPIC_API_KEY or send apiKey per request.");
    }
    match config.agent.base_url.as_deref() {
        Some(base_url) => Arc::new(AnthropicProvider::with_base_url(
            config.agent.api_key.clone(),
            base_url,
        )),
        None => Arc::new(AnthropicProvider::new(config.agent.api_key.clone())),
    }
}

/// Creates a runtime wired to the browser tool set and the given sink.
fn build_runtime(config: &Config, sink: Arc<dyn EventSink>) -> Arc<AgentRuntime> {
    let executor = Arc::new(ActionExecutor::new(config.navigation_timeout()));
    let registry = Arc::new(ToolRegistry::browser(
        executor,
        config.browser.display_width,
        config.browser.display_height,
    ));
    info!(tools = ?registry.tool_names(), model = %config.agent.model, "runtime ready");
    Arc::new(
        AgentRuntime::new(build_provider(config), registry, sink, config.agent.model.clone())
            .with_max_tokens(config.agent.max_tokens),
    )
}

fn build_steel(config: &Config) -> SteelClient {
    if config.browser.api_key.is_empty() {
        warn!("No browser host key configured. Set STEEL_API_KEY.");
    }
    SteelClient::new(
        config.browser.api_url.clone(),
        config.browser.websocket_url.clone(),
        config.browser.api_key.clone(),
    )
    .with_viewport(config.browser.viewport())
}

async fn cmd_serve(mut config: Config, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    let addr = config.server.socket_addr()?;

    let hub = Arc::new(SessionEventHub::new());
    let state = AppState {
        runtime: build_runtime(&config, hub.clone()),
        hub,
        provider: Arc::new(build_steel(&config)),
        defaults: config.session_config(),
        session_timeout_ms: config.server.session_timeout_ms,
    };

    gateway::serve(state, addr).await?;
    Ok(())
}

async fn cmd_run(config: Config, exec: String, session: Option<String>) -> anyhow::Result<()> {
    let steel = build_steel(&config);
    let (session_id, created) = match session {
        Some(id) => (SessionId::from(id), false),
        None => {
            let record = steel.create_session(config.server.session_timeout_ms).await?;
            let id = record["id"]
                .as_str()
                .ok_or_else(|| anyhow::anyhow!("browser host returned a session without an id"))?;
            (SessionId::from(id), true)
        }
    };

    eprintln!("{}", format_run_header(&exec, &session_id));

    let sink = Arc::new(ConsoleSink::new(std::io::stdout()));
    let runtime = build_runtime(&config, sink);
    let history = ConversationHistory::from_turns(vec![Turn::user_text(exec)])?;

    let outcome = match steel.connect(&session_id).await {
        Ok(connected) => {
            let result = runtime
                .run_session(&session_id, history, connected.page.clone(), &config.session_config())
                .await;
            drop(connected);
            result.map(|_| ()).map_err(anyhow::Error::from)
        }
        Err(e) => Err(e.into()),
    };

    if created && let Err(e) = steel.release_session(session_id.as_str()).await {
        error!(session = %session_id, "Failed to release session: {e}");
    }

    outcome
}

fn format_run_header(exec: &str, session_id: &SessionId) -> String {
    format!("Running: {exec} (session {session_id})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_run_header_embeds_exec_and_session() {
        assert_eq!(
            format_run_header("open example.com", &SessionId::from("abc")),
            "Running: open example.com (session abc)"
        );
    }

    #[test]
    fn run_command_parses_exec_and_session() {
        let cli = Cli::try_parse_from(["browserpilot", "run", "-e", "find the weather", "-s", "s1"])
            .expect("parse");
        match cli.command {
            Commands::Run { exec, session } => {
                assert_eq!(exec, "find the weather");
                assert_eq!(session.as_deref(), Some("s1"));
            }
            Commands::Serve { .. } => panic!("expected run"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn serve_command_accepts_port_override() {
        let cli = Cli::try_parse_from(["browserpilot", "--debug", "serve", "--port", "8081"])
            .expect("parse");
        assert!(cli.debug);
        assert!(matches!(cli.command, Commands::Serve { port: Some(8081) }));
        assert_eq!(command_label(&cli.command), "serve");
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["browserpilot"]).is_err());
    }

    #[test]
    fn runtime_uses_configured_model() {
        let mut config = Config::default();
        config.agent.model = "claude-test".to_string();
        let runtime = build_runtime(&config, Arc::new(SessionEventHub::new()));
        assert_eq!(runtime.model(), "claude-test");
    }
}
