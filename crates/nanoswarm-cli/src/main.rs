mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{parse_meta, NanoswarmConfig};
use nanoswarm_agent::LlmClient;
use nanoswarm_orchestrator::{FileContext, FlatOrchestrator, HierarchicalSwarm, RunOutcome};
use nanoswarm_state::{InMemoryStore, StateLayer, StateStore};
use nanoswarm_tools::{register_builtins, ToolRegistry};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "nanoswarm", about = "nanoswarm: hierarchical LLM task orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "nanoswarm.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal and print the outcome as JSON
    Run {
        /// What the swarm should accomplish
        goal: String,
        /// One worker per task instead of lead + specialist pipelines
        #[arg(long)]
        flat: bool,
        /// Continue from an earlier session, giving the planner its history
        #[arg(long, value_name = "SESSION_ID", conflicts_with = "flat")]
        follow_up: Option<String>,
        /// Session metadata as key=value (repeatable)
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
        /// File whose contents are given to the planner as background
        #[arg(long)]
        context_file: Option<PathBuf>,
    },
    /// List registered tools
    Tools,
    /// Print the swarm health view
    Health,
    /// Print a session record and its journal summary
    Session {
        /// Session id
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = NanoswarmConfig::load(&cli.config).await?;

    let store = match &config.state.snapshot_path {
        Some(path) => Arc::new(InMemoryStore::load_snapshot(path).await?),
        None => Arc::new(InMemoryStore::new()),
    };
    let shared: Arc<dyn StateStore> = store.clone();
    let state = Arc::new(StateLayer::new(shared, config.state.ttl.clone()));

    let mut registry = ToolRegistry::new();
    register_builtins(&mut registry, &config.tools)?;
    let tools = Arc::new(registry);

    let result = execute(cli.command, &config, state, tools).await;

    if let Some(path) = &config.state.snapshot_path {
        if let Err(e) = store.save_snapshot(path).await {
            warn!(path = %path.display(), error = %e, "State snapshot not saved");
        }
    }
    result
}

async fn execute(
    command: Commands,
    config: &NanoswarmConfig,
    state: Arc<StateLayer>,
    tools: Arc<ToolRegistry>,
) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            goal,
            flat,
            follow_up,
            meta,
            context_file,
        } => {
            let metadata = parse_meta(&meta)?;
            let llm = LlmClient::new(&config.model)
                .context("failed to build the LLM client")?
                .backend();
            info!(
                provider = ?config.model.provider,
                model = %config.model.model_id,
                flat,
                "Starting run"
            );

            let outcome: RunOutcome = if flat {
                let mut orchestrator =
                    FlatOrchestrator::new(llm, tools, state, config.swarm.clone());
                if let Some(path) = context_file {
                    orchestrator = orchestrator.with_context_provider(Arc::new(FileContext::new(path)));
                }
                orchestrator.run(&goal, metadata).await?
            } else {
                let mut swarm = HierarchicalSwarm::new(llm, tools, state, config.swarm.clone());
                if let Some(path) = context_file {
                    swarm = swarm.with_context_provider(Arc::new(FileContext::new(path)));
                }
                match follow_up {
                    Some(parent) => swarm.run_followup(&parent, &goal, metadata).await?,
                    None => swarm.run(&goal, metadata).await?,
                }
            };
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            if !outcome.success {
                warn!(
                    session_id = %outcome.session_id,
                    error = outcome.error.as_deref().unwrap_or(""),
                    "Run did not succeed"
                );
            }
        }
        Commands::Tools => {
            let descriptors = tools.list_descriptors();
            if descriptors.is_empty() {
                println!("No tools registered.");
                println!("Configure builtin tools in nanoswarm.toml under [tools]");
            } else {
                println!("Registered tools:");
                for tool in &descriptors {
                    println!("  {}: {}", tool.name, tool.description);
                }
                println!("\nTotal: {} tool(s)", descriptors.len());
            }
        }
        Commands::Health => {
            let health = state.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Commands::Session { id } => {
            let session = state.sessions.require(&id).await?;
            let summary = state.journal(&id).summary().await?;
            let view = json!({ "session": session, "summary": summary });
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
    }
    Ok(())
}
