// crates/laminark-server/src/db/debug_paths.rs
// Debug paths and their strictly-ordered waypoints

use super::Database;
use crate::utils::{new_id, now_iso};
use rusqlite::{OptionalExtension, Row, params};
use std::sync::Arc;
use strum::{Display, EnumString};

/// Hard cap on waypoints per path
pub const MAX_WAYPOINTS: i64 = 30;

/// Waypoint taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum WaypointType {
    Error,
    Attempt,
    Failure,
    Success,
    Pivot,
    Revert,
    Discovery,
    Resolution,
}

/// A persistent debugging session
#[derive(Debug, Clone)]
pub struct DebugPath {
    pub id: String,
    pub project_hash: String,
    pub status: String,
    pub started_at: String,
    pub resolved_at: Option<String>,
}

/// One event along a debug path
#[derive(Debug, Clone)]
pub struct PathWaypoint {
    pub id: String,
    pub path_id: String,
    pub sequence_order: i64,
    pub waypoint_type: WaypointType,
    pub content: String,
    pub observation_id: Option<String>,
    pub created_at: String,
}

fn map_path(row: &Row) -> rusqlite::Result<DebugPath> {
    Ok(DebugPath {
        id: row.get(0)?,
        project_hash: row.get(1)?,
        status: row.get(2)?,
        started_at: row.get(3)?,
        resolved_at: row.get(4)?,
    })
}

fn map_waypoint(row: &Row) -> rusqlite::Result<PathWaypoint> {
    let type_text: String = row.get(3)?;
    Ok(PathWaypoint {
        id: row.get(0)?,
        path_id: row.get(1)?,
        sequence_order: row.get(2)?,
        waypoint_type: type_text.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(3, "type".into(), rusqlite::types::Type::Text)
        })?,
        content: row.get(4)?,
        observation_id: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub struct DebugPathStore {
    db: Arc<Database>,
    project_hash: String,
}

impl DebugPathStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Open a new active path.
    pub fn create(&self) -> crate::Result<DebugPath> {
        let id = new_id();
        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT INTO debug_paths (id, project_hash, status, started_at)
             VALUES (?1, ?2, 'active', ?3)",
        )?
        .execute(params![id, self.project_hash, now_iso()])?;
        drop(conn);
        self.get(&id)?
            .ok_or_else(|| crate::LaminarkError::Other("path insert vanished".into()))
    }

    pub fn get(&self, id: &str) -> crate::Result<Option<DebugPath>> {
        let conn = self.db.conn();
        let row = conn
            .prepare_cached(
                "SELECT id, project_hash, status, started_at, resolved_at FROM debug_paths
                 WHERE id = ?1 AND project_hash = ?2",
            )?
            .query_row(params![id, self.project_hash], map_path)
            .optional()?;
        Ok(row)
    }

    /// The project's active path, if one exists (crash recovery).
    pub fn active_path(&self) -> crate::Result<Option<DebugPath>> {
        let conn = self.db.conn();
        let row = conn
            .prepare_cached(
                "SELECT id, project_hash, status, started_at, resolved_at FROM debug_paths
                 WHERE project_hash = ?1 AND status = 'active'
                 ORDER BY started_at DESC LIMIT 1",
            )?
            .query_row(params![self.project_hash], map_path)
            .optional()?;
        Ok(row)
    }

    /// Append a waypoint with `sequence_order = MAX + 1`, atomically.
    ///
    /// Returns None once the path holds MAX_WAYPOINTS entries.
    pub fn append_waypoint(
        &self,
        path_id: &str,
        waypoint_type: WaypointType,
        content: &str,
        observation_id: Option<&str>,
    ) -> crate::Result<Option<PathWaypoint>> {
        let conn = self.db.conn();
        conn.execute_batch("BEGIN")?;
        let result = (|| -> crate::Result<Option<String>> {
            let (count, max_seq): (i64, i64) = conn
                .prepare_cached(
                    "SELECT COUNT(*), COALESCE(MAX(sequence_order), 0)
                     FROM path_waypoints WHERE path_id = ?1",
                )?
                .query_row(params![path_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
            if count >= MAX_WAYPOINTS {
                return Ok(None);
            }
            let id = new_id();
            conn.prepare_cached(
                "INSERT INTO path_waypoints
                    (id, path_id, sequence_order, type, content, observation_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?
            .execute(params![
                id,
                path_id,
                max_seq + 1,
                waypoint_type.to_string(),
                content,
                observation_id,
                now_iso(),
            ])?;
            Ok(Some(id))
        })();
        match result {
            Ok(maybe_id) => {
                conn.execute_batch("COMMIT")?;
                drop(conn);
                match maybe_id {
                    Some(id) => {
                        let waypoint = self
                            .waypoints(path_id)?
                            .into_iter()
                            .find(|w| w.id == id);
                        Ok(waypoint)
                    }
                    None => Ok(None),
                }
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Waypoints of a path in sequence order.
    pub fn waypoints(&self, path_id: &str) -> crate::Result<Vec<PathWaypoint>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT w.id, w.path_id, w.sequence_order, w.type, w.content,
                    w.observation_id, w.created_at
             FROM path_waypoints w
             JOIN debug_paths p ON p.id = w.path_id
             WHERE w.path_id = ?1 AND p.project_hash = ?2
             ORDER BY w.sequence_order ASC",
        )?;
        let rows = stmt
            .query_map(params![path_id, self.project_hash], map_waypoint)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Mark a path resolved and stamp resolved_at.
    pub fn resolve(&self, path_id: &str) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE debug_paths SET status = 'resolved', resolved_at = ?1
                 WHERE id = ?2 AND project_hash = ?3 AND status = 'active'",
            )?
            .execute(params![now_iso(), path_id, self.project_hash])?;
        Ok(changed > 0)
    }

    /// Mark a path abandoned.
    pub fn abandon(&self, path_id: &str) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE debug_paths SET status = 'abandoned'
                 WHERE id = ?1 AND project_hash = ?2 AND status = 'active'",
            )?
            .execute(params![path_id, self.project_hash])?;
        Ok(changed > 0)
    }

    /// Recent paths, newest first.
    pub fn recent(&self, limit: usize) -> crate::Result<Vec<DebugPath>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, project_hash, status, started_at, resolved_at FROM debug_paths
             WHERE project_hash = ?1
             ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![self.project_hash, limit as i64], map_path)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DebugPathStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        DebugPathStore::new(db, "testhash00000000")
    }

    #[test]
    fn create_and_recover_active_path() {
        let store = store();
        assert!(store.active_path().unwrap().is_none());
        let path = store.create().unwrap();
        assert_eq!(path.status, "active");

        let recovered = store.active_path().unwrap().unwrap();
        assert_eq!(recovered.id, path.id);
    }

    #[test]
    fn waypoints_are_strictly_monotonic() {
        let store = store();
        let path = store.create().unwrap();

        for i in 0..5 {
            store
                .append_waypoint(&path.id, WaypointType::Error, &format!("error {i}"), None)
                .unwrap()
                .unwrap();
        }
        let waypoints = store.waypoints(&path.id).unwrap();
        assert_eq!(waypoints.len(), 5);
        for (i, w) in waypoints.iter().enumerate() {
            assert_eq!(w.sequence_order, i as i64 + 1);
        }
    }

    #[test]
    fn waypoint_cap_is_enforced() {
        let store = store();
        let path = store.create().unwrap();
        for i in 0..MAX_WAYPOINTS {
            assert!(store
                .append_waypoint(&path.id, WaypointType::Attempt, &format!("try {i}"), None)
                .unwrap()
                .is_some());
        }
        let over = store
            .append_waypoint(&path.id, WaypointType::Attempt, "one too many", None)
            .unwrap();
        assert!(over.is_none());
        assert_eq!(store.waypoints(&path.id).unwrap().len() as i64, MAX_WAYPOINTS);
    }

    #[test]
    fn resolve_stamps_and_is_terminal() {
        let store = store();
        let path = store.create().unwrap();
        assert!(store.resolve(&path.id).unwrap());
        let resolved = store.get(&path.id).unwrap().unwrap();
        assert_eq!(resolved.status, "resolved");
        assert!(resolved.resolved_at.is_some());

        assert!(!store.resolve(&path.id).unwrap(), "resolving twice is a no-op");
        assert!(store.active_path().unwrap().is_none());
    }

    #[test]
    fn waypoints_cascade_on_path_delete() {
        let store = store();
        let path = store.create().unwrap();
        store
            .append_waypoint(&path.id, WaypointType::Error, "boom", None)
            .unwrap();

        store
            .db
            .conn()
            .execute("DELETE FROM debug_paths WHERE id = ?1", params![path.id])
            .unwrap();
        let orphans: i64 = store
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM path_waypoints", [], |row| row.get(0))
            .unwrap();
        assert_eq!(orphans, 0);
    }

    #[test]
    fn paths_are_project_scoped() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store_a = DebugPathStore::new(db.clone(), "projecta00000000");
        let store_b = DebugPathStore::new(db, "projectb00000000");

        let path = store_a.create().unwrap();
        store_a
            .append_waypoint(&path.id, WaypointType::Error, "private", None)
            .unwrap();

        assert!(store_b.get(&path.id).unwrap().is_none());
        assert!(store_b.active_path().unwrap().is_none());
        assert!(store_b.waypoints(&path.id).unwrap().is_empty());
        assert!(!store_b.resolve(&path.id).unwrap());
    }
}
