// crates/laminark-server/src/db/sessions.rs
// Session lifecycle -- at most one open session per project

use super::Database;
use crate::utils::{new_id, now_iso};
use rusqlite::{OptionalExtension, Row, params};
use std::sync::Arc;

/// A logical work session
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub project_hash: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub summary: Option<String>,
}

fn map_row(row: &Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        project_hash: row.get(1)?,
        started_at: row.get(2)?,
        ended_at: row.get(3)?,
        summary: row.get(4)?,
    })
}

pub struct SessionStore {
    db: Arc<Database>,
    project_hash: String,
}

impl SessionStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Start a new session. Any session still open for this project is ended
    /// first, preserving the one-open-session invariant.
    pub fn start(&self, session_id: Option<&str>) -> crate::Result<Session> {
        let now = now_iso();
        let id = session_id
            .map(|s| s.to_string())
            .unwrap_or_else(new_id);

        let conn = self.db.conn();
        conn.prepare_cached(
            "UPDATE sessions SET ended_at = ?1
             WHERE project_hash = ?2 AND ended_at IS NULL",
        )?
        .execute(params![now, self.project_hash])?;

        conn.prepare_cached(
            "INSERT OR IGNORE INTO sessions (id, project_hash, started_at)
             VALUES (?1, ?2, ?3)",
        )?
        .execute(params![id, self.project_hash, now])?;
        // Reopen in case the id already existed (hook retries)
        conn.prepare_cached(
            "UPDATE sessions SET ended_at = NULL
             WHERE id = ?1 AND project_hash = ?2",
        )?
        .execute(params![id, self.project_hash])?;
        drop(conn);

        self.get(&id)?
            .ok_or_else(|| crate::LaminarkError::Other("session insert vanished".into()))
    }

    /// The currently open session, if any.
    pub fn current(&self) -> crate::Result<Option<Session>> {
        let conn = self.db.conn();
        let row = conn
            .prepare_cached(
                "SELECT id, project_hash, started_at, ended_at, summary FROM sessions
                 WHERE project_hash = ?1 AND ended_at IS NULL
                 ORDER BY started_at DESC LIMIT 1",
            )?
            .query_row(params![self.project_hash], map_row)
            .optional()?;
        Ok(row)
    }

    /// End a session, optionally attaching a compressed summary.
    pub fn end(&self, session_id: &str, summary: Option<&str>) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE sessions SET ended_at = ?1, summary = COALESCE(?2, summary)
                 WHERE id = ?3 AND project_hash = ?4 AND ended_at IS NULL",
            )?
            .execute(params![now_iso(), summary, session_id, self.project_hash])?;
        Ok(changed > 0)
    }

    pub fn get(&self, session_id: &str) -> crate::Result<Option<Session>> {
        let conn = self.db.conn();
        let row = conn
            .prepare_cached(
                "SELECT id, project_hash, started_at, ended_at, summary FROM sessions
                 WHERE id = ?1 AND project_hash = ?2",
            )?
            .query_row(params![session_id, self.project_hash], map_row)
            .optional()?;
        Ok(row)
    }

    /// Recent sessions, newest first.
    pub fn recent(&self, limit: usize) -> crate::Result<Vec<Session>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, project_hash, started_at, ended_at, summary FROM sessions
             WHERE project_hash = ?1
             ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![self.project_hash, limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}
