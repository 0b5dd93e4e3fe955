// crates/laminark-server/src/main.rs
// Laminark - developer memory engine for AI coding assistants

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands, HookAction};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from the data directory only (never from CWD -- a malicious
    // repo could override configuration)
    if let Err(e) = dotenvy::from_path(laminark::config::data_dir().join(".env")) {
        tracing::debug!("No data-dir .env loaded: {}", e);
    }

    let cli = Cli::parse();

    // Set up logging based on command
    let log_level = match &cli.command {
        // Hooks: quiet by default, no timestamps -- they are ephemeral processes
        Some(Commands::Hook { .. }) => Level::WARN,
        // Quiet for MCP stdio
        Some(Commands::Serve) | None => Level::WARN,
        Some(Commands::Status) => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None | Some(Commands::Serve) => {
            cli::run_serve().await?;
        }
        Some(Commands::Hook { action }) => {
            // Hooks must NEVER exit non-zero -- the caller treats that as a
            // broken hook. Catch errors, log to stderr, emit `{}` on stdout.
            let result = tokio::task::spawn(async move {
                match action {
                    HookAction::PostTool => laminark::hooks::post_tool::run().await,
                    HookAction::SessionStart => laminark::hooks::session::run_start().await,
                    HookAction::SessionEnd => laminark::hooks::session::run_end().await,
                }
            })
            .await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[laminark] Hook error (non-fatal): {e:#}");
                    laminark::hooks::write_hook_output(&serde_json::json!({}));
                }
                Err(join_err) => {
                    eprintln!("[laminark] Hook panic (non-fatal): {join_err}");
                    laminark::hooks::write_hook_output(&serde_json::json!({}));
                }
            }
        }
        Some(Commands::Status) => {
            cli::run_status().await?;
        }
    }

    Ok(())
}
