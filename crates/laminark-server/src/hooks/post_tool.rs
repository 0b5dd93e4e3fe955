// crates/laminark-server/src/hooks/post_tool.rs
// PostToolUse hook -- turns tool events into observations and research provenance

use super::{HookInput, read_hook_input, resolve_project_dir, write_hook_output};
use crate::config;
use crate::db::observations::{CreateObservation, ObservationStore};
use crate::db::{Database, ResearchBufferStore, ToolRegistryStore};
use crate::utils::{project_hash, truncate};
use anyhow::Result;
use std::sync::Arc;

/// Tools whose output is research context, not a change
const RESEARCH_TOOLS: [&str; 4] = ["Read", "Grep", "Glob", "WebFetch"];

/// Tools that modify files
const WRITE_TOOLS: [&str; 3] = ["Write", "Edit", "NotebookEdit"];

/// Bash commands that look like verification runs
fn is_verification_command(command: &str) -> bool {
    let lower = command.to_lowercase();
    ["test", "check", "clippy", "lint", "build", "tsc", "pytest"]
        .iter()
        .any(|marker| lower.contains(marker))
}

pub async fn run() -> Result<()> {
    let json = read_hook_input()?;
    let input = HookInput::from_json(&json);
    let project_dir = resolve_project_dir(&json);
    let hash = project_hash(&project_dir);

    let db = match Database::open(&config::db_path()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            tracing::warn!("Hook could not open database: {e}");
            write_hook_output(&serde_json::json!({}));
            return Ok(());
        }
    };

    let registry = ToolRegistryStore::new(db.clone(), hash.clone());
    if !input.tool_name.is_empty() {
        let _ = registry.upsert(&input.tool_name, "builtin", "global", None, None, None);
        let _ = registry.record_usage(&input.tool_name, input.session_id.as_deref(), true);
    }

    if RESEARCH_TOOLS.contains(&input.tool_name.as_str()) {
        let target = input
            .file_path
            .as_deref()
            .or(input.pattern.as_deref())
            .or(input.url.as_deref());
        if let Some(target) = target {
            let research = ResearchBufferStore::new(db, hash);
            let _ = research.record(input.session_id.as_deref(), &input.tool_name, target);
        }
        write_hook_output(&serde_json::json!({}));
        return Ok(());
    }

    if WRITE_TOOLS.contains(&input.tool_name.as_str()) {
        if let Some(ref file_path) = input.file_path {
            create_change_observation(&db, &hash, &input, file_path)?;
        }
        write_hook_output(&serde_json::json!({}));
        return Ok(());
    }

    if input.tool_name == "Bash" {
        if let Some(ref command) = input.command {
            if is_verification_command(command) {
                let store = ObservationStore::new(db, hash);
                let content = format!("Ran `{}`", truncate(command, 500));
                let _ = store.create(CreateObservation {
                    content: &content,
                    source: "hook:Bash",
                    kind: "verification",
                    session_id: input.session_id.as_deref(),
                    ..Default::default()
                });
            }
        }
    }

    write_hook_output(&serde_json::json!({}));
    Ok(())
}

/// A file change becomes a `change` observation; recent research-buffer
/// entries of the session ride along as provenance.
fn create_change_observation(
    db: &Arc<Database>,
    hash: &str,
    input: &HookInput,
    file_path: &str,
) -> Result<()> {
    let mut content = format!("{} {}", input.tool_name, file_path);

    if let Some(ref session_id) = input.session_id {
        let research = ResearchBufferStore::new(db.clone(), hash.to_string());
        if let Ok(entries) = research.recent_for_session(session_id, 5) {
            if !entries.is_empty() {
                let targets: Vec<String> = entries
                    .iter()
                    .map(|e| format!("{}:{}", e.tool_name, truncate(&e.target, 80)))
                    .collect();
                content.push_str(&format!(" (after {})", targets.join(", ")));
            }
        }
    }

    let store = ObservationStore::new(db.clone(), hash.to_string());
    let source = format!("hook:{}", input.tool_name);
    if let Err(e) = store.create(CreateObservation {
        content: &content,
        title: Some(file_path),
        source: &source,
        kind: "change",
        session_id: input.session_id.as_deref(),
        ..Default::default()
    }) {
        tracing::warn!("Failed to create change observation: {e}");
    }
    Ok(())
}
