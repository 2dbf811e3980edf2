mod enqueue_cmd;
mod metrics_cmd;
mod start_cmd;
mod status_cmd;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use foreman_core::provider::cli_adapter::CliAdapter;
use foreman_core::provider::registry::ProviderRegistry;
use foreman_core::provider::stub::StubProvider;
use foreman_core::state::StateManager;
use foreman_core::Config;
use foreman_db::config::KvConfig;
use foreman_db::model::{Goal, SupervisorState, SupervisorStatus};
use foreman_db::{KvStore, RedisStore, TaskQueue};

#[derive(Parser)]
#[command(name = "foreman", about = "Persistent control plane for autonomous AI-assisted development")]
struct Cli {
    #[arg(long, global = true)]
    redis_host: Option<String>,
    #[arg(long, global = true)]
    redis_port: Option<u16>,
    #[arg(long, global = true)]
    state_key: Option<String>,
    #[arg(long, global = true)]
    queue_name: Option<String>,
    #[arg(long, global = true)]
    queue_db: Option<u8>,
    #[arg(long, global = true)]
    state_db: Option<u8>,
    #[arg(long, global = true)]
    sandbox_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum ExecutionMode {
    Auto,
    Manual,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the initial state blob; fails if one already exists
    InitState {
        #[arg(long, value_enum, default_value_t = ExecutionMode::Auto)]
        execution_mode: ExecutionMode,
        #[arg(long)]
        goal: Option<String>,
        #[arg(long, default_value = "default")]
        project_id: String,
    },
    /// Replace the goal in state
    SetGoal {
        #[arg(long)]
        description: String,
        #[arg(long)]
        project_id: Option<String>,
    },
    /// LPUSH one or more tasks read from a file (a single task object or an array)
    Enqueue {
        #[arg(long)]
        task_file: PathBuf,
    },
    /// Run the control loop until halt or completion
    Start,
    /// Set status=HALTED; the loop exits at its next safe point
    Halt {
        #[arg(long)]
        reason: Option<String>,
    },
    /// Set status=RUNNING; operator must then invoke `start`
    Resume,
    /// Print a summary of the current state
    Status,
    /// Print the analytics summary
    Metrics,
}

fn kv_config(cli: &Cli) -> KvConfig {
    KvConfig::resolve(cli.redis_host.clone(), cli.redis_port, cli.state_key.clone(), cli.queue_name.clone(), cli.queue_db, cli.state_db)
}

async fn connect_state(kv: &KvConfig) -> Result<Arc<dyn KvStore>> {
    Ok(Arc::new(RedisStore::connect(&kv.state_url()).await.context("failed to connect to state store")?))
}

async fn connect_queue(kv: &KvConfig) -> Result<Arc<dyn KvStore>> {
    Ok(Arc::new(RedisStore::connect(&kv.queue_url()).await.context("failed to connect to queue store")?))
}

/// Build the provider registry from `Config::provider_priority`: a real
/// `CliAdapter` for every named provider, using a `<PROVIDER>_CLI_PATH`
/// environment override or the bare binary name on PATH as a fallback;
/// `gemini_stub` (the priority list's deterministic fallback) is registered
/// as a `StubProvider` since it has no real binary.
fn build_providers(config: &Config) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    for name in &config.provider_priority {
        if name == "gemini_stub" {
            registry.register(Box::new(StubProvider::always_ok("gemini_stub", "stub provider: no real agent configured")));
            continue;
        }
        let env_var = format!("{}_CLI_PATH", name.to_uppercase());
        let binary_path = std::env::var(&env_var).unwrap_or_else(|_| name.clone());
        registry.register(Box::new(CliAdapter::new(name.clone(), binary_path)));
    }
    registry
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let kv = kv_config(&cli);

    if let Err(e) = run(cli, kv).await {
        eprintln!("{e:#}");
        std::process::exit(exit_code_for(&e));
    }
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<foreman_core::ForemanError>().is_some_and(|e| e.is_critical()) {
        2
    } else {
        1
    }
}

async fn run(cli: Cli, kv: KvConfig) -> Result<()> {
    match &cli.command {
        Commands::InitState { execution_mode, goal, project_id } => {
            let state_store = connect_state(&kv).await?;
            let manager = StateManager::new(state_store, kv.state_key.clone());
            let goal = Goal { description: goal.clone().unwrap_or_default(), project_id: project_id.clone(), completed: false };
            let start_running = *execution_mode == ExecutionMode::Auto;
            let state = SupervisorState::new(goal, start_running);
            manager.init(&state).await?;
            println!("State initialized under key '{}', status={}", kv.state_key, state.status);
            Ok(())
        }
        Commands::SetGoal { description, project_id } => {
            let state_store = connect_state(&kv).await?;
            let manager = StateManager::new(state_store, kv.state_key.clone());
            let mut state = manager.load_required().await?;
            state.goal.description = description.clone();
            if let Some(project_id) = project_id {
                state.goal.project_id = project_id.clone();
            }
            manager.persist(&state).await?;
            println!("Goal set: {description}");
            Ok(())
        }
        Commands::Enqueue { task_file } => {
            let queue_store = connect_queue(&kv).await?;
            let queue = TaskQueue::new(queue_store, kv.queue_name.clone());
            enqueue_cmd::run_enqueue(&queue, task_file).await
        }
        Commands::Start => {
            let config = Config::resolve(cli.sandbox_root.clone(), kv.clone());
            let state_store = connect_state(&kv).await?;
            let queue_store = connect_queue(&kv).await?;
            let providers = build_providers(&config);
            start_cmd::run_start(state_store, queue_store, config, providers).await
        }
        Commands::Halt { reason } => {
            let state_store = connect_state(&kv).await?;
            let manager = StateManager::new(state_store, kv.state_key.clone());
            let mut state = manager.load_required().await?;
            state.status = SupervisorStatus::Halted;
            state.halt_details = reason.clone();
            manager.persist(&state).await?;
            println!("Halt requested; the loop will exit at its next safe point.");
            Ok(())
        }
        Commands::Resume => {
            let state_store = connect_state(&kv).await?;
            let manager = StateManager::new(state_store, kv.state_key.clone());
            let mut state = manager.load_required().await?;
            state.status = SupervisorStatus::Running;
            state.halt_reason = None;
            state.halt_details = None;
            manager.persist(&state).await?;
            println!("Status set to RUNNING. Run `foreman start` to resume the loop.");
            Ok(())
        }
        Commands::Status => {
            let state_store = connect_state(&kv).await?;
            let queue_store = connect_queue(&kv).await?;
            let manager = StateManager::new(state_store, kv.state_key.clone());
            let queue = TaskQueue::new(queue_store, kv.queue_name.clone());
            status_cmd::run_status(&manager, &queue).await
        }
        Commands::Metrics => {
            let sandbox_root = cli.sandbox_root.clone().unwrap_or_else(|| PathBuf::from("./sandbox"));
            let state_store = connect_state(&kv).await?;
            let manager = StateManager::new(state_store, kv.state_key.clone());
            metrics_cmd::run_metrics(&manager, &sandbox_root).await
        }
    }
}
