// crates/laminark-server/src/db/stashes.rs
// Context stashes -- frozen topic snapshots created on topic shift
//
// Snapshot columns hold JSON text; parsing happens here at the repository
// boundary so raw strings never leak upward.

use super::Database;
use crate::db::observations::Observation;
use crate::utils::{new_id, now_iso};
use rusqlite::{OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Self-contained copy of an observation at stash time. Does not follow
/// later mutations of the source row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObservationSnapshot {
    pub id: String,
    pub content: String,
    pub title: Option<String>,
    pub kind: String,
    pub created_at: String,
}

impl From<&Observation> for ObservationSnapshot {
    fn from(obs: &Observation) -> Self {
        Self {
            id: obs.id.clone(),
            content: obs.content.clone(),
            title: obs.title.clone(),
            kind: obs.kind.clone(),
            created_at: obs.created_at.clone(),
        }
    }
}

/// A frozen topic snapshot
#[derive(Debug, Clone)]
pub struct ContextStash {
    pub id: String,
    pub project_id: String,
    pub session_id: Option<String>,
    pub topic_label: String,
    pub summary: Option<String>,
    pub observations: Vec<ObservationSnapshot>,
    pub observation_ids: Vec<String>,
    pub status: String,
    pub created_at: String,
    pub resumed_at: Option<String>,
}

fn map_row(row: &Row) -> rusqlite::Result<ContextStash> {
    let observations_json: String = row.get(5)?;
    let ids_json: String = row.get(6)?;
    Ok(ContextStash {
        id: row.get(0)?,
        project_id: row.get(1)?,
        session_id: row.get(2)?,
        topic_label: row.get(3)?,
        summary: row.get(4)?,
        observations: serde_json::from_str(&observations_json).unwrap_or_default(),
        observation_ids: serde_json::from_str(&ids_json).unwrap_or_default(),
        status: row.get(7)?,
        created_at: row.get(8)?,
        resumed_at: row.get(9)?,
    })
}

const SELECT_COLUMNS: &str = "id, project_id, session_id, topic_label, summary, \
     observations, observation_ids, status, created_at, resumed_at";

pub struct StashStore {
    db: Arc<Database>,
    project_hash: String,
}

impl StashStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Freeze a topic thread into a stash.
    pub fn create(
        &self,
        session_id: Option<&str>,
        topic_label: &str,
        summary: Option<&str>,
        snapshots: &[ObservationSnapshot],
    ) -> crate::Result<ContextStash> {
        let id = new_id();
        let ids: Vec<&str> = snapshots.iter().map(|s| s.id.as_str()).collect();
        let observations_json = serde_json::to_string(snapshots)?;
        let ids_json = serde_json::to_string(&ids)?;

        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT INTO context_stashes
                (id, project_id, session_id, topic_label, summary,
                 observations, observation_ids, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'stashed', ?8)",
        )?
        .execute(params![
            id,
            self.project_hash,
            session_id,
            topic_label,
            summary,
            observations_json,
            ids_json,
            now_iso(),
        ])?;
        drop(conn);

        self.get(&id)?
            .ok_or_else(|| crate::LaminarkError::Other("stash insert vanished".into()))
    }

    pub fn get(&self, id: &str) -> crate::Result<Option<ContextStash>> {
        let conn = self.db.conn();
        let row = conn
            .prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM context_stashes
                 WHERE id = ?1 AND project_id = ?2"
            ))?
            .query_row(params![id, self.project_hash], map_row)
            .optional()?;
        Ok(row)
    }

    /// Recent stashes, newest first, optionally filtered by a label/summary
    /// substring (case-insensitive).
    pub fn list_recent(&self, query: Option<&str>, limit: usize) -> crate::Result<Vec<ContextStash>> {
        let pattern = query.map(|q| format!("%{}%", q.to_lowercase()));
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM context_stashes
             WHERE project_id = ?1
               AND (?2 IS NULL
                    OR LOWER(topic_label) LIKE ?2
                    OR LOWER(COALESCE(summary, '')) LIKE ?2)
             ORDER BY created_at DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, pattern, limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Mark a stash resumed. Returns false if missing or already resumed.
    pub fn mark_resumed(&self, id: &str) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE context_stashes SET status = 'resumed', resumed_at = ?1
                 WHERE id = ?2 AND project_id = ?3 AND status = 'stashed'",
            )?
            .execute(params![now_iso(), id, self.project_hash])?;
        Ok(changed > 0)
    }

    /// Expire stashes older than the cutoff that were never resumed.
    pub fn expire_older_than(&self, cutoff: &str) -> crate::Result<usize> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE context_stashes SET status = 'expired'
                 WHERE project_id = ?1 AND status = 'stashed' AND created_at < ?2",
            )?
            .execute(params![self.project_hash, cutoff])?;
        Ok(changed)
    }

    pub fn count(&self) -> crate::Result<i64> {
        let conn = self.db.conn();
        let count = conn
            .prepare_cached("SELECT COUNT(*) FROM context_stashes WHERE project_id = ?1")?
            .query_row(params![self.project_hash], |row| row.get(0))?;
        Ok(count)
    }
}
