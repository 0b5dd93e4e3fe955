// crates/laminark-server/src/db/notifications.rs
// Consume-on-read notification queue for background components

use super::Database;
use crate::utils::{new_id, now_iso};
use rusqlite::params;
use std::sync::Arc;

/// Max notifications drained per consume call
const CONSUME_BATCH: usize = 10;

pub struct NotificationStore {
    db: Arc<Database>,
    project_hash: String,
}

impl NotificationStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Queue a user-facing message.
    pub fn push(&self, message: &str) -> crate::Result<()> {
        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT INTO pending_notifications (id, project_id, message, created_at)
             VALUES (?1, ?2, ?3, ?4)",
        )?
        .execute(params![new_id(), self.project_hash, message, now_iso()])?;
        Ok(())
    }

    /// Drain up to 10 pending notifications, oldest first. Consumed rows are
    /// deleted inside the same transaction so a message is delivered once.
    pub fn consume(&self) -> crate::Result<Vec<String>> {
        let conn = self.db.conn();
        conn.execute_batch("BEGIN")?;
        let result = (|| -> crate::Result<Vec<String>> {
            let rows: Vec<(String, String)> = conn
                .prepare_cached(
                    "SELECT id, message FROM pending_notifications
                     WHERE project_id = ?1
                     ORDER BY created_at ASC
                     LIMIT ?2",
                )?
                .query_map(params![self.project_hash, CONSUME_BATCH as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?
                .filter_map(|r| r.ok())
                .collect();
            for (id, _) in &rows {
                conn.prepare_cached("DELETE FROM pending_notifications WHERE id = ?1")?
                    .execute(params![id])?;
            }
            Ok(rows.into_iter().map(|(_, m)| m).collect())
        })();
        match result {
            Ok(messages) => {
                conn.execute_batch("COMMIT")?;
                Ok(messages)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    pub fn pending_count(&self) -> crate::Result<i64> {
        let conn = self.db.conn();
        let count = conn
            .prepare_cached("SELECT COUNT(*) FROM pending_notifications WHERE project_id = ?1")?
            .query_row(params![self.project_hash], |row| row.get(0))?;
        Ok(count)
    }
}
