//! `triad` — serve the three-engine coordination core.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use triad_coordinator::{Coordinator, CreativeEngine, Engine, MemoryEngine, ParallelEngine};
use triad_core::{Task, TriadConfig, TriadResult};
use triad_creative::{SolutionGenerator, TemplateStrategy};
use triad_gateway::AppState;
use triad_pool::{ExecutionHandler, WorkerPool};
use triad_recall::{FileRecallStore, InMemoryRecallStore, RecallStore};
use triad_status::StatusBroadcaster;

mod config_watcher;

use config_watcher::ConfigWatcher;

#[derive(Parser)]
#[command(name = "triad", about = "Triad — three-engine task coordination core")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "triad.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Address to bind to (overrides config)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Validate the config file and print the effective settings
    Check,
}

/// Placeholder execution handler: echoes the task payload back upper-cased.
///
/// Deployments substitute their own handler behind the same seam; it must be
/// idempotent or duplicate-tolerant because pool execution is at-least-once.
struct EchoHandler;

#[async_trait]
impl ExecutionHandler for EchoHandler {
    async fn execute(&self, task: &Task) -> TriadResult<String> {
        Ok(task.payload.to_uppercase())
    }
}

async fn load_config(path: &PathBuf) -> anyhow::Result<TriadConfig> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TriadConfig::default());
    }
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to read config '{}': {}", path.display(), e))?;
    Ok(TriadConfig::from_toml(&content)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let mut config = load_config(&cli.config).await?;

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }

            let broadcaster = StatusBroadcaster::new(&config.status);
            let search_budget = Duration::from_millis(config.recall.search_budget_ms);

            let store: Arc<dyn RecallStore> = match &config.recall.data_path {
                Some(path) => {
                    info!(path = %path.display(), "Opening durable recall store");
                    Arc::new(FileRecallStore::open(path.clone(), search_budget).await?)
                }
                None => {
                    info!("Using in-memory recall store");
                    Arc::new(InMemoryRecallStore::new(search_budget))
                }
            };

            let pool = WorkerPool::new(
                config.pool.clone(),
                Arc::new(EchoHandler),
                broadcaster.clone(),
            );
            let _background = pool.start_background();

            let generator = Arc::new(SolutionGenerator::new(
                vec![Arc::new(TemplateStrategy::new("template"))],
                config.creative.clone(),
            ));

            let engines: Vec<Arc<dyn Engine>> = vec![
                Arc::new(MemoryEngine::new(store)),
                Arc::new(ParallelEngine::new(pool.clone())),
                Arc::new(CreativeEngine::new(generator)),
            ];
            let coordinator = Coordinator::new(
                config.coordinator.clone(),
                engines,
                broadcaster.clone(),
            );

            // Hot-reload the pool's scaling knobs on config edits.
            let _watcher = if cli.config.exists() {
                let reload_pool = pool.clone();
                match ConfigWatcher::start(cli.config.clone(), 500, move |reloaded| {
                    if let Some(pool_config) = reloaded.pool {
                        info!(
                            min = pool_config.min_workers,
                            max = pool_config.max_workers,
                            "Applying reloaded pool config"
                        );
                        reload_pool.update_config(pool_config);
                    }
                }) {
                    Ok(watcher) => Some(watcher),
                    Err(e) => {
                        warn!(error = %e, "Config hot-reload unavailable");
                        None
                    }
                }
            } else {
                None
            };

            let state = AppState {
                coordinator,
                broadcaster,
            };
            triad_gateway::serve(&config.server, state).await?;
            pool.shutdown();
        }
        Commands::Check => {
            config.validate()?;
            println!("Config OK: {}", cli.config.display());
            println!("  server.bind          = {}", config.server.bind);
            println!(
                "  pool.workers         = {}..{}",
                config.pool.min_workers, config.pool.max_workers
            );
            println!("  pool.max_retries     = {}", config.pool.max_retries);
            println!(
                "  recall.search_budget = {}ms",
                config.recall.search_budget_ms
            );
            match &config.recall.data_path {
                Some(path) => println!("  recall.data_path     = {}", path.display()),
                None => println!("  recall.data_path     = (in-memory)"),
            }
            println!(
                "  coordinator.deadline = {}ms",
                config.coordinator.default_deadline_ms
            );
            println!(
                "  status.replay        = {} events",
                config.status.replay_capacity
            );
        }
    }

    Ok(())
}
