// crates/laminark-server/src/db/thresholds.rs
// Threshold history (EWMA seeds across sessions) and the shift-decision audit log

use super::Database;
use crate::utils::now_iso;
use rusqlite::{OptionalExtension, params};
use std::sync::Arc;

/// Audit row for one topic-shift detector invocation (shifts and non-shifts alike)
#[derive(Debug, Clone)]
pub struct ShiftDecisionRecord {
    pub observation_id: Option<String>,
    pub distance: f64,
    pub threshold: f64,
    pub ewma_mean: Option<f64>,
    pub ewma_variance: Option<f64>,
    pub sensitivity: Option<f64>,
    pub shifted: bool,
    pub confidence: f64,
    pub stash_id: Option<String>,
}

pub struct ThresholdStore {
    db: Arc<Database>,
    project_hash: String,
}

impl ThresholdStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Persist the closing EWMA state of a session.
    pub fn persist(
        &self,
        session_id: Option<&str>,
        mean: f64,
        variance: f64,
        observation_count: i64,
    ) -> crate::Result<()> {
        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT INTO threshold_history
                (project_hash, session_id, mean, variance, observation_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?
        .execute(params![
            self.project_hash,
            session_id,
            mean,
            variance,
            observation_count,
            now_iso(),
        ])?;
        Ok(())
    }

    /// Seed for a new session: the average of the last 10 persisted EWMA
    /// states, or None when the project has no history.
    pub fn seed(&self) -> crate::Result<Option<(f64, f64)>> {
        let conn = self.db.conn();
        let row: Option<(f64, f64, i64)> = conn
            .prepare_cached(
                "SELECT AVG(mean), AVG(variance), COUNT(*)
                 FROM (SELECT mean, variance FROM threshold_history
                       WHERE project_hash = ?1
                       ORDER BY created_at DESC LIMIT 10)",
            )?
            .query_row(params![self.project_hash], |row| {
                Ok((
                    row.get::<_, Option<f64>>(0)?.unwrap_or(0.0),
                    row.get::<_, Option<f64>>(1)?.unwrap_or(0.0),
                    row.get(2)?,
                ))
            })
            .optional()?;
        Ok(match row {
            Some((_, _, 0)) | None => None,
            Some((mean, variance, _)) => Some((mean, variance)),
        })
    }

    /// Append a shift-decision audit row.
    pub fn record_decision(&self, decision: &ShiftDecisionRecord) -> crate::Result<()> {
        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT INTO shift_decisions
                (project_hash, observation_id, distance, threshold, ewma_mean,
                 ewma_variance, sensitivity, shifted, confidence, stash_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?
        .execute(params![
            self.project_hash,
            decision.observation_id,
            decision.distance,
            decision.threshold,
            decision.ewma_mean,
            decision.ewma_variance,
            decision.sensitivity,
            decision.shifted,
            decision.confidence,
            decision.stash_id,
            now_iso(),
        ])?;
        Ok(())
    }

    /// Number of recorded decisions (for status / tuning views).
    pub fn decision_count(&self) -> crate::Result<i64> {
        let conn = self.db.conn();
        let count = conn
            .prepare_cached("SELECT COUNT(*) FROM shift_decisions WHERE project_hash = ?1")?
            .query_row(params![self.project_hash], |row| row.get(0))?;
        Ok(count)
    }
}
