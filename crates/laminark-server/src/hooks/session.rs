// crates/laminark-server/src/hooks/session.rs
// SessionStart / SessionEnd hooks

use super::{HookInput, read_hook_input, resolve_project_dir, write_hook_output};
use crate::config;
use crate::db::observations::ObservationStore;
use crate::db::{Database, SessionStore};
use crate::utils::{project_hash, truncate};
use anyhow::Result;
use std::sync::Arc;

/// Observations folded into the session-end summary
const SUMMARY_OBSERVATIONS: usize = 10;
const SUMMARY_CHARS: usize = 500;

pub async fn run_start() -> Result<()> {
    let json = read_hook_input()?;
    let input = HookInput::from_json(&json);
    let project_dir = resolve_project_dir(&json);
    let hash = project_hash(&project_dir);

    if let Ok(db) = Database::open(&config::db_path()) {
        let db = Arc::new(db);
        let sessions = SessionStore::new(db, hash);
        match sessions.start(input.session_id.as_deref()) {
            Ok(session) => tracing::info!("Session {} started", session.id),
            Err(e) => tracing::warn!("Failed to start session: {e}"),
        }
    }
    write_hook_output(&serde_json::json!({}));
    Ok(())
}

pub async fn run_end() -> Result<()> {
    let json = read_hook_input()?;
    let input = HookInput::from_json(&json);
    let project_dir = resolve_project_dir(&json);
    let hash = project_hash(&project_dir);

    if let Ok(db) = Database::open(&config::db_path()) {
        let db = Arc::new(db);
        let sessions = SessionStore::new(db.clone(), hash.clone());
        let session = match input.session_id {
            Some(ref id) => sessions.get(id).ok().flatten(),
            None => sessions.current().ok().flatten(),
        };

        if let Some(session) = session {
            let summary = build_summary(&db, &hash, &session.id);
            if let Err(e) = sessions.end(&session.id, summary.as_deref()) {
                tracing::warn!("Failed to end session: {e}");
            }
        }
    }
    write_hook_output(&serde_json::json!({}));
    Ok(())
}

/// Compress the session's observations into a short summary string.
fn build_summary(db: &Arc<Database>, hash: &str, session_id: &str) -> Option<String> {
    let store = ObservationStore::new(db.clone(), hash.to_string());
    let recent = store.recent_in_session(session_id, SUMMARY_OBSERVATIONS).ok()?;
    if recent.is_empty() {
        return None;
    }
    let parts: Vec<String> = recent
        .iter()
        .rev()
        .map(|obs| {
            obs.title
                .clone()
                .unwrap_or_else(|| truncate(&obs.content, 60))
        })
        .collect();
    Some(truncate(&parts.join("; "), SUMMARY_CHARS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::observations::CreateObservation;

    #[test]
    fn summary_collects_titles_oldest_first() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let hash = "testhash00000000";
        let store = ObservationStore::new(db.clone(), hash);
        for (title, content) in
            [("first", "content one"), ("second", "content two")]
        {
            store
                .create(CreateObservation {
                    content,
                    title: Some(title),
                    source: "hook:Edit",
                    kind: "change",
                    session_id: Some("s1"),
                    ..Default::default()
                })
                .unwrap();
        }

        let summary = build_summary(&db, hash, "s1").unwrap();
        assert_eq!(summary, "first; second");
    }

    #[test]
    fn summary_is_none_for_empty_session() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        assert!(build_summary(&db, "testhash00000000", "empty").is_none());
    }
}
