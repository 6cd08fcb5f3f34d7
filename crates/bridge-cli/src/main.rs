//! mcp-bridge: chat with an LLM that can call tools on an MCP server.

mod repl;

use anyhow::{Context, Result};
use bridge_api::{OpenAiCompatProvider, RetryConfig};
use bridge_config::{BridgeConfig, CliOverrides};
use bridge_core::{Agent, ChatSession, ToolCatalog};
use bridge_mcp::{McpClient, ServerCommand};
use bridge_types::{provider::Provider, server::ToolServer};
use clap::Parser;
use repl::Exit;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Exit status after Ctrl+C, matching shells' 128 + SIGINT.
const INTERRUPTED_EXIT_CODE: u8 = 130;

#[derive(Parser)]
#[command(
    name = "mcp-bridge",
    version,
    about = "Chat with an LLM that can call tools exposed by an MCP server",
    after_help = "Examples:\n  mcp-bridge weather.py\n  mcp-bridge -- npx -y @playwright/mcp@latest"
)]
struct Cli {
    /// Tool server to launch: a .py or .js script, or an executable
    server: String,

    /// Arguments passed to the tool server
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Model to use (overrides MODEL)
    #[arg(long)]
    model: Option<String>,

    /// API key (overrides API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Chat-completions base URL (overrides BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// Per-call tool timeout in milliseconds
    #[arg(long)]
    tool_timeout_ms: Option<u64>,

    /// Maximum model-to-tools rounds per question
    #[arg(long)]
    max_tool_rounds: Option<usize>,

    /// Enable verbose/debug logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli).await {
        Ok(Exit::Quit) => ExitCode::SUCCESS,
        Ok(Exit::Interrupted) => ExitCode::from(INTERRUPTED_EXIT_CODE),
        Ok(Exit::Fatal(e)) | Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Exit> {
    let config = BridgeConfig::load(CliOverrides {
        api_key: cli.api_key,
        model: cli.model,
        base_url: cli.base_url,
        tool_timeout_ms: cli.tool_timeout_ms,
        max_tool_rounds: cli.max_tool_rounds,
    })
    .context("Failed to load configuration")?;

    let command = ServerCommand::resolve(&cli.server, &cli.args, &config.server)
        .context("No tool server command given")?;

    let provider = OpenAiCompatProvider::new(
        config.api_key.clone(),
        config.base_url.clone(),
        config.api_timeout(),
    )
    .context("Failed to create API client")?
    .with_retry_config(RetryConfig {
        max_retries: config.max_retries,
        ..RetryConfig::default()
    });

    // Ctrl+C cancels whatever is in progress and ends the session
    let interrupt = CancellationToken::new();
    let watcher = {
        let interrupt = interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        })
    };

    tracing::info!("Starting tool server: {}", command.display());
    // Dropping a half-started client kills the child process
    let client = tokio::select! {
        _ = interrupt.cancelled() => return Ok(Exit::Interrupted),
        client = McpClient::start(&command) => client
            .with_context(|| format!("Failed to start tool server '{}'", command.display()))?,
    };

    let discovered = tokio::select! {
        _ = interrupt.cancelled() => None,
        catalog = discover_tools(&client) => Some(catalog),
    };
    let catalog = match discovered {
        Some(Ok(catalog)) => catalog,
        Some(Err(e)) => {
            client.shutdown().await;
            return Err(e);
        }
        None => {
            client.shutdown().await;
            return Ok(Exit::Interrupted);
        }
    };
    print_banner(&client, &catalog, &config);

    let client = Arc::new(client);
    let mut agent = Agent::new(
        Arc::new(provider) as Arc<dyn Provider>,
        Arc::clone(&client) as Arc<dyn ToolServer>,
        catalog,
        config.model.clone(),
        config.max_tokens,
    );
    agent.set_system_prompt(config.system_prompt.clone());
    agent.set_temperature(config.temperature);
    agent.set_max_tool_rounds(config.max_tool_rounds);
    let mut session = ChatSession::new(agent, config.quit_command.clone());

    let exit = repl::run(&mut session, interrupt).await;
    watcher.abort();

    let usage = session.usage().clone();
    let tool_calls = session.tool_calls();
    drop(session);

    // The session held the only other reference
    match Arc::try_unwrap(client) {
        Ok(client) => client.shutdown().await,
        Err(_) => tracing::warn!("Tool server still referenced; relying on kill-on-drop"),
    }

    repl::print_usage(&usage, tool_calls);
    Ok(exit)
}

/// List the server's tools and build the catalog.
async fn discover_tools(client: &McpClient) -> Result<ToolCatalog> {
    let tools = client
        .list_tools()
        .await
        .context("Failed to list tools")?;
    tracing::debug!("Tool catalog: {tools:?}");
    ToolCatalog::build(tools).context("Tool server declared an invalid tool catalog")
}

fn print_banner(client: &McpClient, catalog: &ToolCatalog, config: &BridgeConfig) {
    let names: Vec<&str> = catalog.names().collect();
    tracing::info!("Connected to {} ({} tools)", client.server_name(), names.len());
    if names.is_empty() {
        println!("Connected to {}; it offers no tools.", client.server_name());
    } else {
        println!(
            "Connected to {} with tools: {}",
            client.server_name(),
            names.join(", ")
        );
    }
    eprintln!(
        "mcp-bridge v{} (model: {}, tool timeout: {}ms)",
        env!("CARGO_PKG_VERSION"),
        config.model,
        client.tool_timeout().as_millis()
    );
    eprintln!(
        "Type your message. Type '{}' or press Ctrl+D to exit.\n",
        config.quit_command
    );
}
