// crates/laminark-server/src/db/tool_registry.rs
// Tool registry -- discovered tools with usage tracking

use super::Database;
use crate::utils::now_iso;
use rusqlite::{OptionalExtension, Row, params};
use std::sync::Arc;

/// A registered tool
#[derive(Debug, Clone)]
pub struct ToolRegistryEntry {
    pub name: String,
    pub tool_type: String,
    pub scope: String,
    pub source: Option<String>,
    pub project_hash: Option<String>,
    pub description: Option<String>,
    pub server_name: Option<String>,
    pub usage_count: i64,
    pub last_used_at: Option<String>,
    pub status: String,
}

fn map_row(row: &Row) -> rusqlite::Result<ToolRegistryEntry> {
    Ok(ToolRegistryEntry {
        name: row.get(0)?,
        tool_type: row.get(1)?,
        scope: row.get(2)?,
        source: row.get(3)?,
        project_hash: row.get(4)?,
        description: row.get(5)?,
        server_name: row.get(6)?,
        usage_count: row.get(7)?,
        last_used_at: row.get(8)?,
        status: row.get(9)?,
    })
}

const SELECT_COLUMNS: &str = "name, tool_type, scope, source, project_hash, description, \
     server_name, usage_count, last_used_at, status";

pub struct ToolRegistryStore {
    db: Arc<Database>,
    project_hash: String,
}

impl ToolRegistryStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Register or refresh a tool. Project-scoped tools carry this store's
    /// project hash; global and plugin tools carry NULL.
    pub fn upsert(
        &self,
        name: &str,
        tool_type: &str,
        scope: &str,
        source: Option<&str>,
        description: Option<&str>,
        server_name: Option<&str>,
    ) -> crate::Result<()> {
        let project_hash = if scope == "project" {
            Some(self.project_hash.as_str())
        } else {
            None
        };
        let now = now_iso();
        let conn = self.db.conn();
        let existing: Option<i64> = conn
            .prepare_cached(
                "SELECT id FROM tool_registry
                 WHERE name = ?1 AND COALESCE(project_hash, '') = COALESCE(?2, '')",
            )?
            .query_row(params![name, project_hash], |row| row.get(0))
            .optional()?;

        if let Some(id) = existing {
            conn.prepare_cached(
                "UPDATE tool_registry SET
                    tool_type = ?1, scope = ?2, source = ?3,
                    description = COALESCE(?4, description),
                    server_name = COALESCE(?5, server_name),
                    status = 'active', updated_at = ?6
                 WHERE id = ?7",
            )?
            .execute(params![tool_type, scope, source, description, server_name, now, id])?;
        } else {
            conn.prepare_cached(
                "INSERT INTO tool_registry
                    (name, tool_type, scope, source, project_hash, description,
                     server_name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            )?
            .execute(params![
                name,
                tool_type,
                scope,
                source,
                project_hash,
                description,
                server_name,
                now,
            ])?;
        }
        Ok(())
    }

    /// Record one invocation: bump the counter and append a usage event.
    pub fn record_usage(
        &self,
        name: &str,
        session_id: Option<&str>,
        success: bool,
    ) -> crate::Result<()> {
        let now = now_iso();
        let conn = self.db.conn();
        conn.prepare_cached(
            "UPDATE tool_registry SET usage_count = usage_count + 1, last_used_at = ?1
             WHERE name = ?2 AND (project_hash IS NULL OR project_hash = ?3)",
        )?
        .execute(params![now, name, self.project_hash])?;
        conn.prepare_cached(
            "INSERT INTO tool_usage_events (tool_name, project_hash, session_id, success, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?
        .execute(params![name, self.project_hash, session_id, success, now])?;
        Ok(())
    }

    /// Visible tools: global/plugin entries plus this project's entries.
    pub fn list(&self, limit: usize) -> crate::Result<Vec<ToolRegistryEntry>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM tool_registry
             WHERE project_hash IS NULL OR project_hash = ?1
             ORDER BY usage_count DESC, name ASC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Keyword search over visible tools, with a LIKE fallback for queries
    /// the FTS sanitizer rejects.
    pub fn search(&self, query: &str, limit: usize) -> crate::Result<Vec<ToolRegistryEntry>> {
        if let Some(match_expr) = crate::search::sanitize_match_query(query) {
            let conn = self.db.conn();
            let mut stmt = conn.prepare_cached(
                "SELECT t.name, t.tool_type, t.scope, t.source, t.project_hash, t.description,
                        t.server_name, t.usage_count, t.last_used_at, t.status
                 FROM tool_registry_fts
                 JOIN tool_registry t ON t.id = tool_registry_fts.rowid
                 WHERE tool_registry_fts MATCH ?1
                   AND (t.project_hash IS NULL OR t.project_hash = ?2)
                 ORDER BY bm25(tool_registry_fts, 2.0, 1.0)
                 LIMIT ?3",
            )?;
            let rows: Vec<ToolRegistryEntry> = stmt
                .query_map(params![match_expr, self.project_hash, limit as i64], map_row)?
                .filter_map(|r| r.ok())
                .collect();
            if !rows.is_empty() {
                return Ok(rows);
            }
        }

        let pattern = format!("%{}%", query.to_lowercase());
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM tool_registry
             WHERE (project_hash IS NULL OR project_hash = ?1)
               AND (LOWER(name) LIKE ?2 OR LOWER(COALESCE(description, '')) LIKE ?2)
             ORDER BY usage_count DESC, name ASC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, pattern, limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Transition a tool's status (`active`, `stale`, `demoted`).
    pub fn set_status(&self, name: &str, status: &str) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE tool_registry SET status = ?1, updated_at = ?2
                 WHERE name = ?3 AND (project_hash IS NULL OR project_hash = ?4)",
            )?
            .execute(params![status, now_iso(), name, self.project_hash])?;
        Ok(changed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ToolRegistryStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        ToolRegistryStore::new(db, "testhash00000000")
    }

    #[test]
    fn upsert_then_update_in_place() {
        let store = store();
        store.upsert("Grep", "builtin", "global", None, Some("search files"), None).unwrap();
        store.upsert("Grep", "builtin", "global", None, Some("content search"), None).unwrap();

        let tools = store.list(10).unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].description.as_deref(), Some("content search"));
    }

    #[test]
    fn same_name_different_scope_coexists() {
        let store = store();
        store.upsert("deploy", "mcp", "global", None, None, Some("ops")).unwrap();
        store.upsert("deploy", "mcp", "project", None, None, Some("local")).unwrap();
        assert_eq!(store.list(10).unwrap().len(), 2);
    }

    #[test]
    fn usage_bumps_counter_and_logs_event() {
        let store = store();
        store.upsert("Bash", "builtin", "global", None, None, None).unwrap();
        store.record_usage("Bash", Some("s1"), true).unwrap();
        store.record_usage("Bash", Some("s1"), false).unwrap();

        let tools = store.list(10).unwrap();
        assert_eq!(tools[0].usage_count, 2);
        assert!(tools[0].last_used_at.is_some());

        let events: i64 = store
            .db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM tool_usage_events WHERE tool_name = 'Bash'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(events, 2);
    }

    #[test]
    fn search_matches_name_and_description() {
        let store = store();
        store.upsert("save_memory", "mcp", "global", None, Some("store a note"), None).unwrap();
        store.upsert("recall", "mcp", "global", None, Some("search memory"), None).unwrap();

        assert_eq!(store.search("memory", 10).unwrap().len(), 2);
        assert_eq!(store.search("recall", 10).unwrap().len(), 1);
    }

    #[test]
    fn status_transitions() {
        let store = store();
        store.upsert("old_tool", "mcp", "global", None, None, None).unwrap();
        assert!(store.set_status("old_tool", "stale").unwrap());
        assert_eq!(store.list(10).unwrap()[0].status, "stale");
    }

    #[test]
    fn project_tools_are_isolated() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store_a = ToolRegistryStore::new(db.clone(), "projecta00000000");
        let store_b = ToolRegistryStore::new(db, "projectb00000000");

        store_a.upsert("local_a", "mcp", "project", None, None, None).unwrap();
        store_a.upsert("shared", "builtin", "global", None, None, None).unwrap();

        let visible_to_b: Vec<String> =
            store_b.list(10).unwrap().into_iter().map(|t| t.name).collect();
        assert!(visible_to_b.contains(&"shared".to_string()));
        assert!(!visible_to_b.contains(&"local_a".to_string()));
    }
}
