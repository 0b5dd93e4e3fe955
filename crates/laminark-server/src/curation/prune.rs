// crates/laminark-server/src/curation/prune.rs
// Low-value pruning: soft-delete tiny, old, unlinked, auto-captured rows

use crate::db::Database;
use crate::utils::now_iso;
use rusqlite::params;
use std::sync::Arc;

/// Minimum content length worth keeping regardless of age
const MIN_VALUABLE_LEN: i64 = 20;

/// Age before auto-captured scraps become prunable
const PRUNE_AFTER_DAYS: i64 = 90;

/// Sources that mark explicit user intent; never pruned
const PROTECTED_SOURCES: [&str; 2] = ["mcp:save_memory", "slash:remember"];

/// Soft-delete observations meeting every low-value criterion: shorter than
/// 20 chars, linked to no graph node, older than 90 days, auto-captured, and
/// not already deleted. Returns rows pruned.
pub fn prune_low_value(db: &Arc<Database>, project_hash: &str) -> crate::Result<usize> {
    let cutoff = (chrono::Utc::now() - chrono::Duration::days(PRUNE_AFTER_DAYS))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();

    let conn = db.conn();
    let pruned = conn
        .prepare_cached(
            "UPDATE observations SET deleted_at = ?1, updated_at = ?1
             WHERE project_hash = ?2
               AND deleted_at IS NULL
               AND LENGTH(content) < ?3
               AND created_at < ?4
               AND source NOT IN (?5, ?6)
               AND NOT EXISTS (
                   SELECT 1 FROM graph_nodes n, json_each(n.observation_ids) link
                   WHERE n.project_hash = ?2 AND link.value = observations.id)",
        )?
        .execute(params![
            now_iso(),
            project_hash,
            MIN_VALUABLE_LEN,
            cutoff,
            PROTECTED_SOURCES[0],
            PROTECTED_SOURCES[1],
        ])?;

    if pruned > 0 {
        tracing::info!("Pruned {} low-value observations", pruned);
    }
    Ok(pruned)
}
