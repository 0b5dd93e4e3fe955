// crates/laminark-server/src/curation/staleness.rs
// Staleness flagging: detect contradictions between consecutive observations
// of recently-touched entities. Flags are advisory; nothing is hidden.

use crate::db::observations::{Observation, ObservationStore};
use crate::db::{GraphStore, StalenessStore};
use std::collections::HashSet;

/// Only entities touched within this window are examined
const RECENT_HOURS: i64 = 24;

/// Negation keywords: contradiction when present in the newer text only
const NEGATION_KEYWORDS: [&str; 8] =
    ["not", "no longer", "stopped", "isn't", "doesn't", "won't", "never", "broken"];

/// Explicit replacement phrases in the newer text
const REPLACEMENT_PHRASES: [&str; 6] = [
    "switched to",
    "migrated from",
    "migrated to",
    "replaced",
    "instead of",
    "moved to",
];

/// Status-change keywords: contradiction when present in the newer text only
const STATUS_KEYWORDS: [&str; 6] =
    ["removed", "deprecated", "archived", "deleted", "disabled", "obsolete"];

fn contains_keyword(text: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return text.contains(keyword);
    }
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .any(|word| word == keyword)
}

/// The contradiction signal between an older and a newer observation, if any.
fn contradiction_reason(older: &str, newer: &str) -> Option<String> {
    let older_lower = older.to_lowercase();
    let newer_lower = newer.to_lowercase();

    for keyword in NEGATION_KEYWORDS {
        if contains_keyword(&newer_lower, keyword) && !contains_keyword(&older_lower, keyword) {
            return Some(format!("negation: '{keyword}'"));
        }
    }
    for phrase in REPLACEMENT_PHRASES {
        if newer_lower.contains(phrase) {
            return Some(format!("replacement: '{phrase}'"));
        }
    }
    for keyword in STATUS_KEYWORDS {
        if contains_keyword(&newer_lower, keyword) && !contains_keyword(&older_lower, keyword) {
            return Some(format!("status change: '{keyword}'"));
        }
    }
    None
}

/// Flag contradicted observations of recently-updated entities. Returns the
/// number of new flags written (re-runs over unchanged data add none).
pub fn flag_contradicted_observations(
    graph: &GraphStore,
    observations: &ObservationStore,
    staleness: &StalenessStore,
) -> crate::Result<usize> {
    let mut flagged_total = 0;

    for node in graph.nodes_updated_since(RECENT_HOURS)? {
        if node.observation_ids.len() < 2 {
            continue;
        }
        let mut rows: Vec<Observation> = Vec::new();
        for id in &node.observation_ids {
            if let Some(obs) = observations.get_by_id(id)? {
                rows.push(obs);
            }
        }
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.rowid.cmp(&b.rowid)));

        let already_flagged: HashSet<String> = staleness
            .list_for_node(&node.id)?
            .into_iter()
            .map(|f| f.observation_id)
            .collect();

        for pair in rows.windows(2) {
            let (older, newer) = (&pair[0], &pair[1]);
            if already_flagged.contains(&older.id) {
                continue;
            }
            if let Some(reason) = contradiction_reason(&older.content, &newer.content) {
                staleness.flag(&node.id, &older.id, Some(&newer.id), Some(&reason))?;
                flagged_total += 1;
                tracing::debug!(
                    "Flagged observation {} as stale for '{}' ({})",
                    older.id,
                    node.name,
                    reason
                );
            }
        }
    }
    Ok(flagged_total)
}
