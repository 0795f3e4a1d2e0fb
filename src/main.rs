use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

use socratic_engine::{
    agents::AgentCatalog,
    config::{Config, LogFormat},
    events::EventBus,
    graph::{InvokeConfig, TurnGraph},
    llm::{display_cost, LlmService},
    state::TurnState,
    storage::{Idea, SqliteStorage, Storage},
};

/// Socratic research-assistant REPL: one line in, one assistant reply out.
#[derive(Parser, Debug)]
#[command(name = "socratic-engine", version, about)]
struct Cli {
    /// Thread to resume (a new one is created when omitted)
    #[arg(long)]
    thread: Option<String>,

    /// Idea to bind the conversation to (enables maturity snapshots)
    #[arg(long)]
    idea: Option<String>,

    /// Override DATABASE_PATH
    #[arg(long)]
    database_path: Option<PathBuf>,

    /// Override EVENT_LOG_DIR
    #[arg(long)]
    event_log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(path) = cli.database_path {
        config.database.path = path;
    }
    if let Some(dir) = cli.event_log_dir {
        config.events.dir = dir;
    }

    // Initialize logging
    init_logging(&config);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Socratic engine starting..."
    );

    // Initialize storage
    let storage = match SqliteStorage::new(&config.database).await {
        Ok(s) => {
            info!(path = %config.database.path.display(), "Database initialized");
            s
        }
        Err(e) => {
            error!(error = %e, "Failed to initialize database");
            return Err(e.into());
        }
    };

    // Initialize event bus
    let events = EventBus::new(&config.events.dir)?;
    info!(dir = %config.events.dir.display(), "Event log initialized");

    // Initialize LLM service and agent catalog
    let llm = Arc::new(LlmService::from_config(&config)?);
    let catalog = AgentCatalog::load(config.agents.config_dir.as_deref())?;

    let graph = TurnGraph::new(&config, storage.clone(), llm, events, &catalog)?;

    // Resolve the thread: explicit flag, the bound idea's thread, or fresh
    let thread_id = match (&cli.thread, &cli.idea) {
        (Some(thread), _) => thread.clone(),
        (None, Some(idea_id)) => resolve_idea_thread(&storage, idea_id).await?,
        (None, None) => Uuid::new_v4().to_string(),
    };

    let mut invoke_config = InvokeConfig::new(&thread_id);
    if let Some(idea_id) = &cli.idea {
        invoke_config = invoke_config.with_idea(idea_id);
    }

    println!("Thread: {}", thread_id);
    println!("Descreva sua observação de pesquisa (Ctrl-D para sair).");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        let state = TurnState::for_new_session(input);
        match graph.invoke(state, &invoke_config).await {
            Ok(final_state) => {
                if let Some(reply) = final_state.messages.last() {
                    println!("\n{}\n", reply.content);
                }
                println!(
                    "[turno {} | {} | custo {}]",
                    final_state.turn_count,
                    final_state
                        .next_step
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    display_cost(final_state.last_agent_cost, &config.telemetry),
                );
            }
            Err(e) => {
                error!(error = %e, "Turn failed");
                eprintln!("Erro no turno: {}", e);
            }
        }
    }

    info!("Session closed");
    Ok(())
}

/// Use the idea's bound thread, binding a fresh one on first use
async fn resolve_idea_thread(storage: &SqliteStorage, idea_id: &str) -> anyhow::Result<String> {
    match storage.get_idea(idea_id).await? {
        Some(idea) => match idea.thread_id {
            Some(thread_id) => Ok(thread_id),
            None => {
                let thread_id = Uuid::new_v4().to_string();
                let mut updated = idea;
                updated.thread_id = Some(thread_id.clone());
                storage.update_idea(&updated).await?;
                Ok(thread_id)
            }
        },
        None => {
            let thread_id = Uuid::new_v4().to_string();
            let idea = Idea::new(format!("Ideia {}", idea_id)).with_thread(&thread_id);
            let mut idea = idea;
            idea.id = idea_id.to_string();
            storage.create_idea(&idea).await?;
            info!(idea_id = %idea_id, "Created idea for new conversation");
            Ok(thread_id)
        }
    }
}

/// Initialize tracing/logging
fn init_logging(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
