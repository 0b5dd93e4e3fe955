// crates/laminark-server/src/db/migrations.rs
// Versioned, append-only migration runner

use super::schema;
use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::info;

/// How a migration applies itself
pub enum MigrationKind {
    /// A batch of SQL statements
    Sql(&'static str),
    /// Arbitrary connection work for migrations SQL cannot express
    Fn(fn(&Connection) -> Result<()>),
}

/// One versioned schema change
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub kind: MigrationKind,
    /// Skipped (not recorded) while the vector extension is unavailable, so
    /// it applies automatically once the extension appears.
    pub requires_vector: bool,
}

/// The ordered migration list. Append-only: never edit or reorder released
/// entries; schema fixes get a new version.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "core_observations_fts_sessions",
            kind: MigrationKind::Sql(schema::V1_CORE),
            requires_vector: false,
        },
        Migration {
            version: 2,
            name: "topic_stashes_thresholds_decisions",
            kind: MigrationKind::Sql(schema::V2_TOPIC),
            requires_vector: false,
        },
        Migration {
            version: 3,
            name: "knowledge_graph",
            kind: MigrationKind::Sql(schema::V3_GRAPH),
            requires_vector: false,
        },
        Migration {
            version: 4,
            name: "debug_paths_waypoints",
            kind: MigrationKind::Sql(schema::V4_DEBUG),
            requires_vector: false,
        },
        Migration {
            version: 5,
            name: "research_buffer_notifications",
            kind: MigrationKind::Sql(schema::V5_BUFFERS),
            requires_vector: false,
        },
        Migration {
            version: 6,
            name: "tool_registry_usage_events",
            kind: MigrationKind::Sql(schema::V6_TOOLS),
            requires_vector: false,
        },
        Migration {
            version: 7,
            name: "staleness_flags",
            kind: MigrationKind::Sql(schema::V7_STALENESS),
            requires_vector: false,
        },
        Migration {
            version: 8,
            name: "observation_embeddings_vec",
            kind: MigrationKind::Sql(schema::V8_VECTORS),
            requires_vector: true,
        },
        Migration {
            version: 9,
            name: "tool_registry_fts",
            kind: MigrationKind::Sql(schema::V9_TOOL_FTS),
            requires_vector: false,
        },
    ]
}

/// Run every unapplied migration in version order.
///
/// Each migration runs inside its own transaction together with its tracking
/// row, so a failure leaves the database exactly as it was. Re-running is a
/// no-op for applied versions.
pub fn run_all(conn: &Connection, has_vector_support: bool) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        );",
    )
    .context("Failed to create _migrations table")?;

    for migration in all_migrations() {
        if is_applied(conn, migration.version)? {
            continue;
        }
        if migration.requires_vector && !has_vector_support {
            tracing::debug!(
                "Skipping vector migration v{} ({}) -- extension unavailable",
                migration.version,
                migration.name
            );
            continue;
        }

        apply(conn, &migration).with_context(|| {
            format!("Migration v{} ({}) failed", migration.version, migration.name)
        })?;
        info!("Applied migration v{} ({})", migration.version, migration.name);
    }

    Ok(())
}

fn is_applied(conn: &Connection, version: i64) -> Result<bool> {
    let applied = conn
        .query_row(
            "SELECT 1 FROM _migrations WHERE version = ?1",
            [version],
            |_| Ok(true),
        )
        .unwrap_or(false);
    Ok(applied)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    conn.execute_batch("BEGIN")?;
    let result = (|| -> Result<()> {
        match &migration.kind {
            MigrationKind::Sql(sql) => conn.execute_batch(sql)?,
            MigrationKind::Fn(f) => f(conn)?,
        }
        conn.execute(
            "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![migration.version, migration.name, crate::utils::now_iso()],
        )?;
        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}
