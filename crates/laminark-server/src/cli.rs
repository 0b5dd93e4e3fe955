// crates/laminark-server/src/cli.rs
// CLI argument types and subcommand implementations

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use laminark::config::{self, EnvConfig, LaminarkConfig, TopicDetectionConfig};
use laminark::curation::{CURATION_INTERVAL, CurationAgent};
use laminark::db::Database;
use laminark::mcp::LaminarkServer;
use laminark::pipeline::{EnrichmentPipeline, HeuristicClassifier};
use laminark::utils::project_hash;
use std::sync::Arc;
use std::time::Duration;

/// Grace period for the embedding worker on shutdown
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "laminark", version, about = "Developer memory engine for AI coding assistants")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the MCP server over stdio (default)
    Serve,
    /// Run a Claude Code hook handler (reads JSON from stdin)
    Hook {
        #[arg(value_enum)]
        action: HookAction,
    },
    /// Print engine status for the current project
    Status,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum HookAction {
    PostTool,
    SessionStart,
    SessionEnd,
}

/// Resolve the project directory: LAMINARK_PROJECT_DIR override, else cwd.
fn resolve_project_dir() -> std::path::PathBuf {
    std::env::var("LAMINARK_PROJECT_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(std::path::PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| std::path::PathBuf::from("."))
}

/// Run the MCP server with the full background stack.
pub async fn run_serve() -> Result<()> {
    let data_dir = config::data_dir();
    let env_config = EnvConfig::from_env();
    let file_config = LaminarkConfig::load(&data_dir);
    let topic_config = TopicDetectionConfig::load(&data_dir);

    let project_dir = resolve_project_dir();
    let hash = project_hash(&project_dir);
    let project_path = project_dir.to_string_lossy().into_owned();

    let db = Arc::new(Database::open(&config::db_path()).context("Failed to open database")?);
    db.record_project(&hash, &project_path)?;

    let worker = laminark::embeddings::from_config(&env_config);

    let pipeline = EnrichmentPipeline::new(
        db.clone(),
        &hash,
        worker.clone(),
        Arc::new(HeuristicClassifier::new()),
        &topic_config,
        file_config.debug_flow.clone(),
    )?;
    let pipeline_shutdown = laminark::pipeline::spawn(pipeline);

    let curation_shutdown = if file_config.curation.enabled {
        let interval = if file_config.curation.interval_secs > 0 {
            Duration::from_secs(file_config.curation.interval_secs)
        } else {
            CURATION_INTERVAL
        };
        Some(laminark::curation::spawn(
            CurationAgent::new(db.clone(), hash.clone()),
            interval,
        ))
    } else {
        None
    };

    let server = LaminarkServer::new(db.clone(), hash, project_path, worker.clone());

    tracing::info!("Laminark MCP server starting (stdio)");
    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;

    // Run until the client disconnects or a signal arrives
    let shutdown_reason = tokio::select! {
        result = service.waiting() => match result {
            Ok(_) => "client disconnected",
            Err(_) => "transport error",
        },
        _ = shutdown_signal() => "signal",
    };
    tracing::info!("Shutting down ({shutdown_reason})");

    // Teardown order: stop timers, drain the worker, checkpoint, close
    let _ = pipeline_shutdown.send(true);
    if let Some(curation) = curation_shutdown {
        let _ = curation.send(true);
    }
    worker.shutdown(WORKER_SHUTDOWN_GRACE).await;
    db.close();

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Print the status payload as text (no server, read-only queries).
pub async fn run_status() -> Result<()> {
    use laminark::db::graph::GraphStore;
    use laminark::db::observations::ObservationStore;
    use laminark::db::{SessionStore, StashStore};

    let project_dir = resolve_project_dir();
    let hash = project_hash(&project_dir);
    let db = Arc::new(Database::open(&config::db_path()).context("Failed to open database")?);

    let observations = ObservationStore::new(db.clone(), hash.clone());
    let graph = GraphStore::new(db.clone(), hash.clone());
    let stashes = StashStore::new(db.clone(), hash.clone());
    let sessions = SessionStore::new(db.clone(), hash.clone());

    let (live, deleted) = observations.counts()?;
    let content_chars = observations.total_content_chars()?;
    let stats = graph.stats()?;

    println!("Project: {} ({})", project_dir.display(), hash);
    println!(
        "Vector store: {}",
        if db.has_vector_support() { "available" } else { "unavailable" }
    );
    println!(
        "Session: {}",
        sessions
            .current()?
            .map(|s| s.id)
            .unwrap_or_else(|| "none".to_string())
    );
    println!(
        "Observations: {} live, {} purged (~{} tokens stored)",
        live,
        deleted,
        (content_chars as usize).div_ceil(4)
    );
    println!("Graph: {} nodes, {} edges", stats.node_count, stats.edge_count);
    println!("Stashes: {}", stashes.count()?);

    db.close();
    Ok(())
}
