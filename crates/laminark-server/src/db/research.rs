// crates/laminark-server/src/db/research.rs
// Research buffer -- transient read/search provenance, flushed after 30 minutes

use super::Database;
use crate::utils::now_iso;
use rusqlite::params;
use std::sync::Arc;

/// Entries older than this are flushed by the background scheduler
pub const FLUSH_AFTER_MINUTES: i64 = 30;

/// A transient research event (a Read/Grep/WebFetch target)
#[derive(Debug, Clone)]
pub struct ResearchEntry {
    pub session_id: Option<String>,
    pub tool_name: String,
    pub target: String,
    pub created_at: String,
}

pub struct ResearchBufferStore {
    db: Arc<Database>,
    project_hash: String,
}

impl ResearchBufferStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Record a research event.
    pub fn record(
        &self,
        session_id: Option<&str>,
        tool_name: &str,
        target: &str,
    ) -> crate::Result<()> {
        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT INTO research_buffer (project_hash, session_id, tool_name, target, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(params![self.project_hash, session_id, tool_name, target, now_iso()])?;
        Ok(())
    }

    /// Recent entries for a session, newest first. Used as provenance when a
    /// change observation is created.
    pub fn recent_for_session(
        &self,
        session_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<ResearchEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT session_id, tool_name, target, created_at FROM research_buffer
             WHERE project_hash = ?1 AND session_id = ?2
             ORDER BY created_at DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(params![self.project_hash, session_id, limit as i64], |row| {
                Ok(ResearchEntry {
                    session_id: row.get(0)?,
                    tool_name: row.get(1)?,
                    target: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Delete entries older than the flush window. Returns rows removed.
    pub fn flush_expired(&self) -> crate::Result<usize> {
        let cutoff = (chrono::Utc::now()
            - chrono::Duration::minutes(FLUSH_AFTER_MINUTES))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();
        let conn = self.db.conn();
        let deleted = conn
            .prepare_cached(
                "DELETE FROM research_buffer WHERE project_hash = ?1 AND created_at < ?2",
            )?
            .execute(params![self.project_hash, cutoff])?;
        if deleted > 0 {
            tracing::debug!("Flushed {} expired research-buffer entries", deleted);
        }
        Ok(deleted)
    }
}
