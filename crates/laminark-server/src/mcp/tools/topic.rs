// crates/laminark-server/src/mcp/tools/topic.rs
// topic_context: recent stashes with progressive disclosure

use crate::db::StashStore;
use crate::mcp::LaminarkServer;
use crate::utils::truncate;

const MAX_LIMIT: usize = 20;
const DEFAULT_LIMIT: usize = 10;

/// Disclosure tiers: full for the first 3, detail through 8, compact beyond
const FULL_TIER: usize = 3;
const DETAIL_TIER: usize = 8;

pub async fn topic_context(
    server: &LaminarkServer,
    query: Option<String>,
    limit: Option<usize>,
) -> Result<String, String> {
    let limit = limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let store = StashStore::new(server.db.clone(), server.project_hash.clone());
    let stashes = store
        .list_recent(query.as_deref(), limit)
        .map_err(|e| e.to_string())?;

    if stashes.is_empty() {
        return Ok(server.with_notifications("No context stashes.".to_string()));
    }

    let mut lines = Vec::with_capacity(stashes.len());
    for (index, stash) in stashes.iter().enumerate() {
        let line = if index < FULL_TIER {
            let mut block = format!(
                "[{}] {} ({}, {})\n  summary: {}",
                stash.id,
                stash.topic_label,
                stash.status,
                stash.created_at,
                stash.summary.as_deref().unwrap_or("-")
            );
            for snapshot in &stash.observations {
                block.push_str(&format!(
                    "\n  - {} {}",
                    snapshot.created_at,
                    truncate(&snapshot.content, 120)
                ));
            }
            block
        } else if index < DETAIL_TIER {
            format!(
                "[{}] {} ({}) -- {}",
                stash.id,
                stash.topic_label,
                stash.status,
                stash.summary.as_deref().unwrap_or("-")
            )
        } else {
            format!("[{}] {}", stash.id, stash.topic_label)
        };
        lines.push(line);
    }

    Ok(server.with_notifications(format!(
        "{} stashes:\n{}",
        stashes.len(),
        lines.join("\n")
    )))
}
