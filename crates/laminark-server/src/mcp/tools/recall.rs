// crates/laminark-server/src/mcp/tools/recall.rs
// recall: search / inspect / purge / restore observations under a token budget

use crate::db::observations::{Observation, ObservationStore};
use crate::mcp::LaminarkServer;
use crate::mcp::requests::RecallRequest;
use crate::search::hybrid_search;
use crate::utils::truncate;

/// Response budget: ~2000 tokens at ~4 chars per token
const BUDGET_CHARS: usize = 8_000;

const TRUNCATION_MARKER: &str = "\n… [response truncated to fit budget]";

const MAX_LIMIT: usize = 50;
const DEFAULT_LIMIT: usize = 10;

enum Action {
    View,
    Purge,
    Restore,
}

enum Detail {
    Compact,
    Timeline,
    Full,
}

fn parse_action(action: Option<&str>) -> Result<Action, String> {
    match action.unwrap_or("view") {
        "view" => Ok(Action::View),
        "purge" => Ok(Action::Purge),
        "restore" => Ok(Action::Restore),
        other => Err(format!("unknown action '{other}' (view, purge, restore)")),
    }
}

fn parse_detail(detail: Option<&str>) -> Result<Detail, String> {
    match detail.unwrap_or("compact") {
        "compact" => Ok(Detail::Compact),
        "timeline" => Ok(Detail::Timeline),
        "full" => Ok(Detail::Full),
        other => Err(format!("unknown detail '{other}' (compact, timeline, full)")),
    }
}

/// Clip a response to the token budget, appending a marker when cut.
fn enforce_budget(mut body: String) -> String {
    if body.len() <= BUDGET_CHARS {
        return body;
    }
    let mut end = BUDGET_CHARS - TRUNCATION_MARKER.len();
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    body.truncate(end);
    body.push_str(TRUNCATION_MARKER);
    body
}

fn format_line(obs: &Observation, detail: &Detail) -> String {
    let title = obs.title.as_deref().unwrap_or("(untitled)");
    let tombstone = if obs.deleted_at.is_some() { " [purged]" } else { "" };
    match detail {
        Detail::Compact => {
            format!("[{}]{} {} -- {}", obs.id, tombstone, title, truncate(&obs.content, 80))
        }
        Detail::Timeline => format!(
            "{} [{}]{} ({}) {} -- {}",
            obs.created_at,
            obs.id,
            tombstone,
            obs.kind,
            title,
            truncate(&obs.content, 120)
        ),
        Detail::Full => format!(
            "[{}]{} {} ({}, {}, created {})\n{}\n",
            obs.id, tombstone, title, obs.kind, obs.source, obs.created_at, obs.content
        ),
    }
}

pub async fn recall(server: &LaminarkServer, req: RecallRequest) -> Result<String, String> {
    let action = parse_action(req.action.as_deref())?;
    let detail = parse_detail(req.detail.as_deref())?;
    let limit = req.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let include_purged = req.include_purged.unwrap_or(false);

    let store = ObservationStore::new(server.db.clone(), server.project_hash.clone());

    // Resolve the target set from exactly one selector
    let mut targets: Vec<Observation> = Vec::new();
    let mut snippets: Vec<Option<String>> = Vec::new();

    if let Some(ids) = collect_ids(&req) {
        for id in ids.iter().take(limit) {
            let row = if include_purged || matches!(action, Action::Restore) {
                store.get_by_id_including_deleted(id)
            } else {
                store.get_by_id(id)
            }
            .map_err(|e| e.to_string())?;
            if let Some(obs) = row {
                targets.push(obs);
                snippets.push(None);
            }
        }
    } else if let Some(ref title) = req.title {
        targets = store.get_by_title(title, limit).map_err(|e| e.to_string())?;
        snippets = vec![None; targets.len()];
    } else if let Some(ref query) = req.query {
        let results = hybrid_search(
            &server.db,
            &server.project_hash,
            query,
            None,
            limit,
            Some(&server.worker),
        )
        .await
        .map_err(|e| e.to_string())?;
        for result in results {
            snippets.push(Some(format!(
                "{} [{}]",
                result.snippet,
                result.match_type.as_str()
            )));
            targets.push(result.observation);
        }
    } else {
        return Err("one of query, id, ids, or title is required".to_string());
    }

    if targets.is_empty() {
        return Ok(server.with_notifications("No matching observations.".to_string()));
    }

    let body = match action {
        Action::View => {
            let mut lines = Vec::with_capacity(targets.len());
            for (obs, snippet) in targets.iter().zip(snippets.iter()) {
                let mut line = format_line(obs, &detail);
                if let Some(snippet) = snippet {
                    line.push_str(&format!("\n    {snippet}"));
                }
                lines.push(line);
            }
            format!("{} observations:\n{}", targets.len(), lines.join("\n"))
        }
        Action::Purge => {
            let mut purged = 0;
            for obs in &targets {
                if store.soft_delete(&obs.id).map_err(|e| e.to_string())? {
                    purged += 1;
                }
            }
            format!("purged: {purged}")
        }
        Action::Restore => {
            let mut restored = 0;
            for obs in &targets {
                if store.restore(&obs.id).map_err(|e| e.to_string())? {
                    restored += 1;
                }
            }
            format!("restored: {restored}")
        }
    };

    Ok(server.with_notifications(enforce_budget(body)))
}

fn collect_ids(req: &RecallRequest) -> Option<Vec<String>> {
    match (&req.id, &req.ids) {
        (Some(id), _) => Some(vec![id.clone()]),
        (None, Some(ids)) if !ids.is_empty() => Some(ids.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_enforcement_truncates_with_marker() {
        let long = "x".repeat(BUDGET_CHARS * 2);
        let clipped = enforce_budget(long);
        assert!(clipped.len() <= BUDGET_CHARS);
        assert!(clipped.ends_with(TRUNCATION_MARKER));

        let short = "short response".to_string();
        assert_eq!(enforce_budget(short.clone()), short);
    }

    #[test]
    fn action_and_detail_parsing() {
        assert!(parse_action(None).is_ok());
        assert!(parse_action(Some("purge")).is_ok());
        assert!(parse_action(Some("destroy")).is_err());
        assert!(parse_detail(Some("timeline")).is_ok());
        assert!(parse_detail(Some("verbose")).is_err());
    }
}
