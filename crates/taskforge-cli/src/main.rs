//! taskforge - turn a requirement into code
//!
//! Without `--oracle-url` requirements run through the static engine
//! (decomposer task list). With it, an HTTP decision oracle picks each tool
//! call and the execution strategy gates it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

use taskforge_core::oracle::HttpOracle;
use taskforge_core::tools::{ToolContext, ToolRegistry};
use taskforge_core::{
    paths, ExecutionEngine, ExecutionResult, GuidedExecutionEngine, SessionStore,
    TaskExecutionEngine, TaskforgeConfig,
};

/// taskforge - requirement-to-code execution agent
#[derive(Parser)]
#[command(name = "taskforge")]
#[command(about = "Turn a requirement into code with a bounded, resumable tool loop", long_about = None)]
struct Cli {
    /// Config file (defaults to ~/.taskforge/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project directory tools operate in
    #[arg(short = 'C', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Rounds allowed per run/continue call
    #[arg(long, global = true)]
    max_rounds: Option<i64>,

    /// Decision oracle base URL; enables the guided engine
    #[arg(long, global = true, env = "TASKFORGE_ORACLE_URL")]
    oracle_url: Option<String>,

    /// Mirror logs to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new session for a requirement
    Run {
        /// Natural-language requirement
        requirement: String,
    },

    /// Resume a session paused in WAITING_USER
    Continue {
        session_id: String,

        /// Run the tool call waiting for confirmation (guided engine only)
        #[arg(long)]
        approve: bool,
    },

    /// List sessions, most recently updated first
    Sessions,

    /// Print a session as JSON
    Show { session_id: String },

    /// Delete a session
    Delete { session_id: String },

    /// Delete every session
    Clear,

    /// List registered tools and their parameters
    Tools,
}

enum Engine {
    Static(TaskExecutionEngine),
    Guided(GuidedExecutionEngine),
}

impl Engine {
    fn as_dyn(&self) -> &dyn ExecutionEngine {
        match self {
            Engine::Static(engine) => engine,
            Engine::Guided(engine) => engine,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let config = match &cli.config {
        Some(path) => TaskforgeConfig::load(path)?,
        None => TaskforgeConfig::load_default()?,
    };
    let store = Arc::new(SessionStore::open(config.sessions_path()));

    match &cli.command {
        Commands::Run { requirement } => {
            let engine = build_engine(&cli, &config, store).await?;
            let result = engine.as_dyn().execute(requirement).await?;
            print_result(&result)?;
        }
        Commands::Continue {
            session_id,
            approve,
        } => {
            let engine = build_engine(&cli, &config, store).await?;
            let result = match (&engine, *approve) {
                (Engine::Guided(guided), true) => guided.approve_pending(session_id).await?,
                (Engine::Static(_), true) => {
                    anyhow::bail!("--approve needs the guided engine (pass --oracle-url)")
                }
                (engine, false) => engine.as_dyn().continue_conversation(session_id).await?,
            };
            print_result(&result)?;
        }
        Commands::Sessions => {
            let sessions = store.list_sessions();
            if sessions.is_empty() {
                println!("No sessions");
            }
            for session in sessions {
                let updated = chrono::DateTime::from_timestamp(session.updated_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {:<12}  {:>3} rounds  {}  {}",
                    session.id,
                    session.status(),
                    session.state.execution_round,
                    updated,
                    first_line(&session.requirement)
                );
            }
        }
        Commands::Show { session_id } => {
            let session = store
                .get_session(session_id)
                .with_context(|| format!("session not found: {}", session_id))?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        Commands::Delete { session_id } => {
            if store.delete_session(session_id)? {
                println!("Deleted {}", session_id);
            } else {
                anyhow::bail!("session not found: {}", session_id);
            }
        }
        Commands::Clear => {
            let count = store.len();
            store.clear_all()?;
            println!("Deleted {} session(s)", count);
        }
        Commands::Tools => {
            let registry = ToolRegistry::with_builtin_tools().await;
            for tool in registry.all_tool_metadata().await {
                println!("{} [{}]", tool.name, tool.category);
                println!("    {}", tool.description);
                for param in &tool.parameters {
                    let marker = if param.required { "*" } else { " " };
                    println!("    {}{}: {}", marker, param.name, param.description);
                }
            }
        }
    }

    Ok(())
}

async fn build_engine(
    cli: &Cli,
    config: &TaskforgeConfig,
    store: Arc<SessionStore>,
) -> Result<Engine> {
    let working_dir = match &cli.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed to read current directory")?,
    };
    let registry = Arc::new(ToolRegistry::with_builtin_tools().await);
    let tool_ctx = ToolContext::new(working_dir).with_settings(config.tools.clone());

    let engine = match &cli.oracle_url {
        Some(url) => {
            let oracle = HttpOracle::new(url)?;
            tracing::info!(oracle = %oracle.base_url(), "Using guided engine");
            Engine::Guided(
                GuidedExecutionEngine::new(registry, store, tool_ctx, Arc::new(oracle))
                    .with_strategy(config.strategy.to_strategy()),
            )
        }
        None => Engine::Static(TaskExecutionEngine::new(registry, store, tool_ctx)),
    };

    let rounds = cli
        .max_rounds
        .unwrap_or_else(|| i64::try_from(config.max_execution_rounds).unwrap_or(i64::MAX));
    engine.as_dyn().set_max_execution_rounds(rounds)?;
    Ok(engine)
}

fn print_result(result: &ExecutionResult) -> Result<()> {
    println!("Session:  {}", result.session_id);
    println!("Status:   {}", result.final_status);
    println!(
        "Rounds:   {} ({} step(s), {} ms)",
        result.execution_rounds, result.executed_steps, result.execution_time_ms
    );
    for step in &result.steps {
        let mark = if step.result.success { "ok" } else { "FAILED" };
        println!(
            "  [{:>3}] {:<20} {:<6} {}",
            step.round,
            step.tool_call.tool_name(),
            mark,
            step.task_id
        );
    }
    if let Some(summary) = &result.summary {
        println!("\n{}", summary);
    }
    if let Some(error) = &result.error {
        eprintln!("\nError: {}", error);
    }
    Ok(())
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}

/// Log to ~/.taskforge/logs/taskforge.log, falling back to the null device
fn init_logging(verbose: bool) -> Result<()> {
    let log_dir = paths::logs_dir();
    if let Err(e) = std::fs::create_dir_all(&log_dir) {
        eprintln!("Failed to create log directory: {}", e);
    }

    #[cfg(unix)]
    let null_device = "/dev/null";
    #[cfg(windows)]
    let null_device = "NUL";

    let log_file = match std::fs::File::create(log_dir.join("taskforge.log")) {
        Ok(file) => file,
        Err(e) => {
            eprintln!(
                "Failed to create log file: {}, falling back to null device",
                e
            );
            std::fs::File::create(null_device)
                .with_context(|| format!("failed to open null device {}", null_device))?
        }
    };

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false);
    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}
