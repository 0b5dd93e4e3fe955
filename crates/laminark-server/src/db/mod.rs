// crates/laminark-server/src/db/mod.rs
// Unified database layer with rusqlite + sqlite-vec

pub mod debug_paths;
pub mod graph;
pub mod migrations;
pub mod notifications;
pub mod observations;
pub mod research;
mod schema;
pub mod sessions;
pub mod staleness;
pub mod stashes;
pub mod thresholds;
pub mod tool_registry;

pub use debug_paths::{DebugPath, DebugPathStore, PathWaypoint, WaypointType};
pub use graph::{EdgeType, GraphEdge, GraphNode, GraphStats, GraphStore, NodeType};
pub use notifications::NotificationStore;
pub use observations::{CreateObservation, ListOptions, Observation, ObservationStore, UpdateObservation};
pub use research::ResearchBufferStore;
pub use sessions::{Session, SessionStore};
pub use staleness::StalenessStore;
pub use stashes::{ContextStash, ObservationSnapshot, StashStore};
pub use thresholds::{ShiftDecisionRecord, ThresholdStore};
pub use tool_registry::{ToolRegistryEntry, ToolRegistryStore};

use anyhow::{Context, Result};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::{Mutex, Once};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Registers sqlite-vec extension globally (once per process).
/// Must be called before any SQLite connections are opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        // SAFETY: sqlite3_vec_init has the signature expected by
        // sqlite3_auto_extension. The transmute converts the fn-pointer to the
        // Option<extern "C" fn()> that sqlite3_auto_extension accepts; the
        // pointer stays valid for the process lifetime since it points to a
        // statically-linked symbol.
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Database wrapper holding the single process-wide connection.
///
/// All repositories lock this connection per call; the single-writer contract
/// means no further locking is needed inside them.
pub struct Database {
    conn: Mutex<Connection>,
    has_vector_support: bool,
    path: Option<String>,
}

impl Database {
    /// Open database at path, creating if needed
    pub fn open(path: &Path) -> Result<Self> {
        ensure_sqlite_vec_registered();

        // Ensure parent directory exists with secure permissions
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                let mut perms = std::fs::metadata(parent)?.permissions();
                perms.set_mode(0o700);
                std::fs::set_permissions(parent, perms)?;
            }
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        #[cfg(unix)]
        {
            let mut perms = std::fs::metadata(path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(path, perms)?;
        }

        Self::from_connection(conn, Some(path.to_string_lossy().into_owned()))
    }

    /// Open in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        ensure_sqlite_vec_registered();
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn, None)
    }

    fn from_connection(conn: Connection, path: Option<String>) -> Result<Self> {
        apply_pragmas(&conn);
        let has_vector_support = probe_vector_support(&conn);
        if !has_vector_support {
            tracing::warn!("sqlite-vec unavailable -- running in keyword-only mode");
        }

        let db = Self {
            conn: Mutex::new(conn),
            has_vector_support,
            path,
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a lock on the connection
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the vector extension loaded and vector code paths are active
    pub fn has_vector_support(&self) -> bool {
        self.has_vector_support
    }

    /// Database file path (None for in-memory)
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply any unapplied migrations (idempotent)
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn();
        migrations::run_all(&conn, self.has_vector_support)
    }

    /// Record (or refresh) the project-metadata row for a project hash.
    pub fn record_project(&self, project_hash: &str, project_path: &str) -> Result<()> {
        let now = crate::utils::now_iso();
        let conn = self.conn();
        conn.execute(
            "INSERT INTO project_metadata (project_hash, project_path, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(project_hash) DO UPDATE SET project_path = ?2, updated_at = ?3",
            rusqlite::params![project_hash, project_path, now],
        )?;
        Ok(())
    }

    /// Flush the WAL and release it before process exit.
    pub fn close(&self) {
        let conn = self.conn();
        if let Err(e) = conn.execute_batch("PRAGMA wal_checkpoint(PASSIVE);") {
            tracing::debug!("WAL checkpoint on close skipped: {}", e);
        }
        if let Err(e) = conn.execute_batch("PRAGMA optimize;") {
            tracing::debug!("PRAGMA optimize on close skipped: {}", e);
        }
    }
}

/// Mandatory connection configuration. WAL failure (read-only filesystem)
/// warns and continues; everything else is applied unconditionally.
fn apply_pragmas(conn: &Connection) {
    match conn.query_row("PRAGMA journal_mode=WAL", [], |row| {
        row.get::<_, String>(0)
    }) {
        Ok(mode) if mode.eq_ignore_ascii_case("wal") || mode.eq_ignore_ascii_case("memory") => {}
        Ok(mode) => {
            tracing::warn!("WAL mode unavailable (got '{}'), continuing without it", mode)
        }
        Err(e) => tracing::warn!("Failed to enable WAL mode: {}", e),
    }

    if let Err(e) = conn.execute_batch(
        "PRAGMA busy_timeout=5000;
         PRAGMA synchronous=NORMAL;
         PRAGMA temp_store=MEMORY;
         PRAGMA foreign_keys=ON;
         PRAGMA wal_autocheckpoint=1000;",
    ) {
        tracing::warn!("Failed to apply connection pragmas: {}", e);
    }
}

/// Check whether the vec0 module is actually available on this connection.
fn probe_vector_support(conn: &Connection) -> bool {
    conn.execute_batch(
        "CREATE VIRTUAL TABLE temp.vec_probe USING vec0(embedding float[4]);
         DROP TABLE temp.vec_probe;",
    )
    .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().expect("Failed to open in-memory db");
        assert!(db.has_vector_support(), "bundled sqlite-vec should load");
        // Migrations table exists and has rows
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert!(count > 0);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("laminark.db");
        let applied = {
            let db = Database::open(&path).unwrap();
            let n: i64 = db
                .conn()
                .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
                .unwrap();
            db.close();
            n
        };
        // Second open must not re-apply or fail
        let db = Database::open(&path).unwrap();
        let n: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, applied);
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let db = Database::open_in_memory().unwrap();
        let fk: i64 = db
            .conn()
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }
}
