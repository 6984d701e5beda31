/// Operator-facing CLI: `serve` starts the dispatcher behind whichever
/// transport the configuration selects, `run-once` drives the exact
/// same dispatcher path for one ad-hoc request, useful for local
/// smoke-testing and CI without standing up a transport at all.
///
/// Grounded on the teacher's `clap`-derive `cli.rs` shape.
use crate::config::{SandboxConfig, TransportMode};
use crate::dependency_ticker::DependencyTicker;
use crate::dispatcher::Dispatcher;
use crate::mcp::{self, McpServer};
use crate::types::{Language, RunRequest, RunnerOptions};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sandboxd", version, about = "Multi-tenant code-execution sandbox service")]
pub struct Cli {
    /// Path to a YAML configuration file. Falls back to built-in
    /// defaults, overridden by environment variables, if absent.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the dispatcher and serve the configured transport.
    Serve,
    /// Run a single piece of source code through the sandbox and print
    /// the result, without starting any transport loop.
    RunOnce {
        /// Interpreter to run the source under.
        #[arg(long, value_enum)]
        language: LanguageArg,
        /// Path to the source file to execute. Reads stdin if omitted.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Permit the child to reach the network for this run.
        #[arg(long)]
        enable_network: bool,
        /// Wall-clock deadline in seconds, overriding the configured
        /// worker timeout.
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum LanguageArg {
    Python,
    Node,
}

impl From<LanguageArg> for Language {
    fn from(value: LanguageArg) -> Self {
        match value {
            LanguageArg::Python => Language::Python,
            LanguageArg::Node => Language::Node,
        }
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Arc::new(
        SandboxConfig::load(cli.config.as_deref()).context("loading sandbox configuration")?,
    );

    match cli.command {
        Command::Serve => serve(config),
        Command::RunOnce {
            language,
            file,
            enable_network,
            timeout_secs,
        } => run_once(config, language.into(), file, enable_network, timeout_secs),
    }
}

fn serve(config: Arc<SandboxConfig>) -> Result<()> {
    let dispatcher = Dispatcher::new(Arc::clone(&config));
    let deps = Arc::new(DependencyTicker::new(Arc::clone(&config)));
    deps.spawn();

    let server = McpServer::new(dispatcher, deps);

    log::info!(
        "sandboxd starting: transport={:?} max_workers={} max_requests={}",
        config.mcp.transport.mode,
        config.execution.max_workers,
        config.execution.max_requests,
    );

    match config.mcp.transport.mode {
        TransportMode::Stdio => mcp::run_stdio(server).context("stdio transport loop"),
        TransportMode::SseHttp | TransportMode::StreamableHttp => {
            mcp::run_http(server, config.mcp.transport.http_port).context("http transport loop")
        }
    }
    .map_err(Into::into)
}

fn run_once(
    config: Arc<SandboxConfig>,
    language: Language,
    file: Option<PathBuf>,
    enable_network: bool,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let source = match file {
        Some(path) => std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
        None => {
            use std::io::Read;
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            buf
        }
    };

    let deadline = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(config.execution.worker_timeout);

    let dispatcher = Dispatcher::new(Arc::clone(&config));
    let request = RunRequest::new(language, source, deadline)
        .with_options(RunnerOptions { enable_network: enable_network && config.security.enable_network });

    let result = dispatcher.submit(request)?;

    print!("{}", result.stdout);
    eprint!("{}", result.stderr);
    if !result.is_success() {
        anyhow::bail!("sandboxed run failed: {} (code {})", result.message, result.code);
    }
    Ok(())
}
