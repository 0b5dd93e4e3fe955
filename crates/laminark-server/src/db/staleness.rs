// crates/laminark-server/src/db/staleness.rs
// Advisory staleness flags -- written by curation, never read by search

use super::Database;
use crate::utils::now_iso;
use rusqlite::params;
use std::sync::Arc;

/// An advisory flag marking an observation likely superseded by a newer one
#[derive(Debug, Clone)]
pub struct StalenessFlag {
    pub node_id: String,
    pub observation_id: String,
    pub superseded_by: Option<String>,
    pub reason: Option<String>,
    pub flagged_at: String,
}

pub struct StalenessStore {
    db: Arc<Database>,
    project_hash: String,
}

impl StalenessStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Flag an observation as stale relative to a node. INSERT OR REPLACE
    /// keyed on (node_id, observation_id) makes re-flagging idempotent.
    pub fn flag(
        &self,
        node_id: &str,
        observation_id: &str,
        superseded_by: Option<&str>,
        reason: Option<&str>,
    ) -> crate::Result<()> {
        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT OR REPLACE INTO staleness_flags
                (node_id, observation_id, superseded_by, reason, project_hash, flagged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            node_id,
            observation_id,
            superseded_by,
            reason,
            self.project_hash,
            now_iso(),
        ])?;
        Ok(())
    }

    pub fn open_count(&self) -> crate::Result<i64> {
        let conn = self.db.conn();
        let count = conn
            .prepare_cached("SELECT COUNT(*) FROM staleness_flags WHERE project_hash = ?1")?
            .query_row(params![self.project_hash], |row| row.get(0))?;
        Ok(count)
    }

    /// Flags attached to a node.
    pub fn list_for_node(&self, node_id: &str) -> crate::Result<Vec<StalenessFlag>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT node_id, observation_id, superseded_by, reason, flagged_at
             FROM staleness_flags
             WHERE project_hash = ?1 AND node_id = ?2
             ORDER BY flagged_at DESC",
        )?;
        let rows = stmt
            .query_map(params![self.project_hash, node_id], |row| {
                Ok(StalenessFlag {
                    node_id: row.get(0)?,
                    observation_id: row.get(1)?,
                    superseded_by: row.get(2)?,
                    reason: row.get(3)?,
                    flagged_at: row.get(4)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Remove flags for an observation (called when the row is purged).
    pub fn clear_for_observation(&self, observation_id: &str) -> crate::Result<usize> {
        let conn = self.db.conn();
        let deleted = conn
            .prepare_cached(
                "DELETE FROM staleness_flags
                 WHERE project_hash = ?1 AND observation_id = ?2",
            )?
            .execute(params![self.project_hash, observation_id])?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> StalenessStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        StalenessStore::new(db, "testhash00000000")
    }

    #[test]
    fn flagging_is_idempotent() {
        let store = store();
        store.flag("node1", "obs1", Some("obs2"), Some("negation")).unwrap();
        store.flag("node1", "obs1", Some("obs2"), Some("negation")).unwrap();
        store.flag("node1", "obs1", Some("obs3"), Some("replacement")).unwrap();

        assert_eq!(store.open_count().unwrap(), 1);
        let flags = store.list_for_node("node1").unwrap();
        assert_eq!(flags[0].superseded_by.as_deref(), Some("obs3"));
    }

    #[test]
    fn clear_removes_observation_flags() {
        let store = store();
        store.flag("node1", "obs1", None, None).unwrap();
        store.flag("node2", "obs1", None, None).unwrap();
        store.flag("node1", "obs2", None, None).unwrap();

        assert_eq!(store.clear_for_observation("obs1").unwrap(), 2);
        assert_eq!(store.open_count().unwrap(), 1);
    }

    #[test]
    fn flags_are_project_scoped() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store_a = StalenessStore::new(db.clone(), "projecta00000000");
        let store_b = StalenessStore::new(db, "projectb00000000");

        store_a.flag("node1", "obs1", None, None).unwrap();
        assert_eq!(store_b.open_count().unwrap(), 0);
        assert!(store_b.list_for_node("node1").unwrap().is_empty());
    }
}
