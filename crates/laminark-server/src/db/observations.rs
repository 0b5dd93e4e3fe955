// crates/laminark-server/src/db/observations.rs
// Observation repository -- the unit of captured context
//
// Every statement carries the project_hash predicate captured at construction;
// callers cannot read rows outside their project.

use super::Database;
use crate::search::{bytes_to_embedding, embedding_to_bytes};
use crate::utils::{new_id, now_iso};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::sync::Arc;

/// Content length bounds enforced on create
const MIN_CONTENT_LEN: usize = 1;
const MAX_CONTENT_LEN: usize = 100_000;

/// Grace window during which unclassified rows still appear in default listings
const UNCLASSIFIED_GRACE_SECS: i64 = 60;

/// A single captured observation
#[derive(Debug, Clone)]
pub struct Observation {
    pub rowid: i64,
    pub id: String,
    pub project_hash: String,
    pub content: String,
    pub title: Option<String>,
    pub source: String,
    pub kind: String,
    pub session_id: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub embedding_model: Option<String>,
    pub embedding_version: Option<i64>,
    pub classification: Option<String>,
    pub classified_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

/// Parameters for creating an observation
#[derive(Debug, Default)]
pub struct CreateObservation<'a> {
    pub content: &'a str,
    pub title: Option<&'a str>,
    pub source: &'a str,
    pub kind: &'a str,
    pub session_id: Option<&'a str>,
    pub embedding: Option<&'a [f32]>,
}

/// Partial update; None fields are left untouched
#[derive(Debug, Default)]
pub struct UpdateObservation<'a> {
    pub content: Option<&'a str>,
    pub embedding: Option<&'a [f32]>,
    pub embedding_model: Option<&'a str>,
    pub embedding_version: Option<i64>,
}

/// Listing options
#[derive(Debug, Default, Clone)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    pub session_id: Option<String>,
    pub since: Option<String>,
    pub kind: Option<String>,
    pub include_unclassified: bool,
}

/// Observation repository scoped to one project
pub struct ObservationStore {
    db: Arc<Database>,
    project_hash: String,
}

const SELECT_COLUMNS: &str = "rowid, id, project_hash, content, title, source, kind, session_id, \
     embedding, embedding_model, embedding_version, classification, classified_at, \
     created_at, updated_at, deleted_at";

pub(crate) fn map_row(row: &Row) -> rusqlite::Result<Observation> {
    let blob: Option<Vec<u8>> = row.get(8)?;
    Ok(Observation {
        rowid: row.get(0)?,
        id: row.get(1)?,
        project_hash: row.get(2)?,
        content: row.get(3)?,
        title: row.get(4)?,
        source: row.get(5)?,
        kind: row.get(6)?,
        session_id: row.get(7)?,
        embedding: blob.as_deref().map(bytes_to_embedding),
        embedding_model: row.get(9)?,
        embedding_version: row.get(10)?,
        classification: row.get(11)?,
        classified_at: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        deleted_at: row.get(15)?,
    })
}

impl ObservationStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    pub fn project_hash(&self) -> &str {
        &self.project_hash
    }

    /// Insert a new observation, validating content length.
    pub fn create(&self, params_in: CreateObservation) -> crate::Result<Observation> {
        let len = params_in.content.chars().count();
        if !(MIN_CONTENT_LEN..=MAX_CONTENT_LEN).contains(&len) {
            return Err(crate::LaminarkError::InvalidInput(format!(
                "content length {} outside 1..=100000",
                len
            )));
        }

        let id = new_id();
        let now = now_iso();
        let blob = params_in.embedding.map(embedding_to_bytes);

        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT INTO observations
                (id, project_hash, content, title, source, kind, session_id,
                 embedding, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        )?
        .execute(params![
            id,
            self.project_hash,
            params_in.content,
            params_in.title,
            params_in.source,
            params_in.kind,
            params_in.session_id,
            blob,
            now,
        ])?;

        if let (Some(embedding), true) = (params_in.embedding, self.db.has_vector_support()) {
            store_vector(&conn, &id, embedding)?;
        }

        drop(conn);
        self.get_by_id_including_deleted(&id)?
            .ok_or_else(|| crate::LaminarkError::Other("insert vanished".into()))
    }

    /// Fetch a live observation by id.
    pub fn get_by_id(&self, id: &str) -> crate::Result<Option<Observation>> {
        let conn = self.db.conn();
        let row = conn
            .prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM observations
                 WHERE id = ?1 AND project_hash = ?2 AND deleted_at IS NULL"
            ))?
            .query_row(params![id, self.project_hash], map_row)
            .optional()?;
        Ok(row)
    }

    /// Fetch by id even when soft-deleted (required for restore).
    pub fn get_by_id_including_deleted(&self, id: &str) -> crate::Result<Option<Observation>> {
        let conn = self.db.conn();
        let row = conn
            .prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM observations
                 WHERE id = ?1 AND project_hash = ?2"
            ))?
            .query_row(params![id, self.project_hash], map_row)
            .optional()?;
        Ok(row)
    }

    /// List live observations, newest first.
    ///
    /// Noise-classified rows are hidden unless `include_unclassified`; rows
    /// that have not been classified yet appear during a 60-second grace
    /// window so fresh captures show up immediately.
    pub fn list(&self, opts: &ListOptions) -> crate::Result<Vec<Observation>> {
        let grace_cutoff = (chrono::Utc::now()
            - chrono::Duration::seconds(UNCLASSIFIED_GRACE_SECS))
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string();

        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM observations
             WHERE project_hash = ?1
               AND deleted_at IS NULL
               AND (?2 OR (
                    (classification IS NOT NULL AND classification != 'noise')
                    OR (classification IS NULL AND created_at >= ?3)))
               AND (?4 IS NULL OR session_id = ?4)
               AND (?5 IS NULL OR created_at >= ?5)
               AND (?6 IS NULL OR kind = ?6)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?7 OFFSET ?8"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    self.project_hash,
                    opts.include_unclassified,
                    grace_cutoff,
                    opts.session_id,
                    opts.since,
                    opts.kind,
                    opts.limit as i64,
                    opts.offset as i64,
                ],
                map_row,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Partial update. Missing rows fail silently (returns None).
    pub fn update(
        &self,
        id: &str,
        update: UpdateObservation,
    ) -> crate::Result<Option<Observation>> {
        if self.get_by_id_including_deleted(id)?.is_none() {
            return Ok(None);
        }

        let blob = update.embedding.map(embedding_to_bytes);
        let now = now_iso();
        let conn = self.db.conn();
        conn.prepare_cached(
            "UPDATE observations SET
                content = COALESCE(?1, content),
                embedding = COALESCE(?2, embedding),
                embedding_model = COALESCE(?3, embedding_model),
                embedding_version = COALESCE(?4, embedding_version),
                updated_at = ?5
             WHERE id = ?6 AND project_hash = ?7",
        )?
        .execute(params![
            update.content,
            blob,
            update.embedding_model,
            update.embedding_version,
            now,
            id,
            self.project_hash,
        ])?;

        if let (Some(embedding), true) = (update.embedding, self.db.has_vector_support()) {
            store_vector(&conn, id, embedding)?;
        }
        drop(conn);

        self.get_by_id_including_deleted(id)
    }

    /// Record embedding output from the worker: blob, vector row, and metadata.
    pub fn set_embedding(
        &self,
        id: &str,
        embedding: &[f32],
        model: &str,
        version: i64,
    ) -> crate::Result<bool> {
        let updated = self
            .update(
                id,
                UpdateObservation {
                    embedding: Some(embedding),
                    embedding_model: Some(model),
                    embedding_version: Some(version),
                    ..Default::default()
                },
            )?
            .is_some();
        Ok(updated)
    }

    /// Soft-delete. Returns false when the row is missing or already deleted.
    pub fn soft_delete(&self, id: &str) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE observations SET deleted_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND project_hash = ?3 AND deleted_at IS NULL",
            )?
            .execute(params![now_iso(), id, self.project_hash])?;
        Ok(changed > 0)
    }

    /// Clear the tombstone. Idempotent: restoring a live row is a no-op
    /// returning true when the row exists.
    pub fn restore(&self, id: &str) -> crate::Result<bool> {
        let conn = self.db.conn();
        let exists: bool = conn
            .prepare_cached(
                "SELECT 1 FROM observations WHERE id = ?1 AND project_hash = ?2",
            )?
            .query_row(params![id, self.project_hash], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Ok(false);
        }
        conn.prepare_cached(
            "UPDATE observations SET deleted_at = NULL, updated_at = ?1
             WHERE id = ?2 AND project_hash = ?3 AND deleted_at IS NOT NULL",
        )?
        .execute(params![now_iso(), id, self.project_hash])?;
        Ok(true)
    }

    /// Set classification and stamp classified_at.
    pub fn update_classification(&self, id: &str, classification: &str) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE observations SET classification = ?1, classified_at = ?2
                 WHERE id = ?3 AND project_hash = ?4",
            )?
            .execute(params![classification, now_iso(), id, self.project_hash])?;
        Ok(changed > 0)
    }

    /// Unclassified live rows, oldest first.
    pub fn list_unclassified(&self, limit: usize) -> crate::Result<Vec<Observation>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM observations
             WHERE project_hash = ?1 AND deleted_at IS NULL AND classification IS NULL
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Live rows without an embedding, oldest first. Drives the background
    /// enrichment loop.
    pub fn find_unembedded(&self, limit: usize) -> crate::Result<Vec<Observation>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM observations
             WHERE project_hash = ?1 AND deleted_at IS NULL AND embedding IS NULL
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Context window around a pivot timestamp: `window` rows before and
    /// after, deduplicated, in time order.
    pub fn list_context(
        &self,
        pivot_timestamp: &str,
        window: usize,
    ) -> crate::Result<Vec<Observation>> {
        let conn = self.db.conn();
        let mut before: Vec<Observation> = conn
            .prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM observations
                 WHERE project_hash = ?1 AND deleted_at IS NULL AND created_at <= ?2
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?3"
            ))?
            .query_map(params![self.project_hash, pivot_timestamp, window as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        let after: Vec<Observation> = conn
            .prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM observations
                 WHERE project_hash = ?1 AND deleted_at IS NULL AND created_at > ?2
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT ?3"
            ))?
            .query_map(params![self.project_hash, pivot_timestamp, window as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        drop(conn);

        before.reverse();
        let mut seen = std::collections::HashSet::new();
        let mut merged = Vec::with_capacity(before.len() + after.len());
        for obs in before.into_iter().chain(after) {
            if seen.insert(obs.id.clone()) {
                merged.push(obs);
            }
        }
        merged.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then(a.rowid.cmp(&b.rowid))
        });
        Ok(merged)
    }

    /// Case-sensitive substring match on title; noise rows excluded.
    pub fn get_by_title(&self, partial: &str, limit: usize) -> crate::Result<Vec<Observation>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM observations
             WHERE project_hash = ?1
               AND deleted_at IS NULL
               AND title IS NOT NULL
               AND instr(title, ?2) > 0
               AND (classification IS NULL OR classification != 'noise')
             ORDER BY created_at DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, partial, limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Most recent live rows of a session, newest first. Used for duplicate
    /// suppression and stash snapshots.
    pub fn recent_in_session(
        &self,
        session_id: &str,
        limit: usize,
    ) -> crate::Result<Vec<Observation>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {SELECT_COLUMNS} FROM observations
             WHERE project_hash = ?1 AND deleted_at IS NULL AND session_id = ?2
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, session_id, limit as i64], map_row)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Live / soft-deleted counts for status reporting.
    pub fn counts(&self) -> crate::Result<(i64, i64)> {
        let conn = self.db.conn();
        let live: i64 = conn
            .prepare_cached(
                "SELECT COUNT(*) FROM observations
                 WHERE project_hash = ?1 AND deleted_at IS NULL",
            )?
            .query_row(params![self.project_hash], |row| row.get(0))?;
        let deleted: i64 = conn
            .prepare_cached(
                "SELECT COUNT(*) FROM observations
                 WHERE project_hash = ?1 AND deleted_at IS NOT NULL",
            )?
            .query_row(params![self.project_hash], |row| row.get(0))?;
        Ok((live, deleted))
    }

    /// Total stored characters, for the status token estimate.
    pub fn total_content_chars(&self) -> crate::Result<i64> {
        let conn = self.db.conn();
        let chars: i64 = conn
            .prepare_cached(
                "SELECT COALESCE(SUM(LENGTH(content)), 0) FROM observations
                 WHERE project_hash = ?1 AND deleted_at IS NULL",
            )?
            .query_row(params![self.project_hash], |row| row.get(0))?;
        Ok(chars)
    }
}

/// Replace the vector-table row for an observation.
fn store_vector(conn: &Connection, id: &str, embedding: &[f32]) -> crate::Result<()> {
    let blob = embedding_to_bytes(embedding);
    conn.prepare_cached("DELETE FROM observation_embeddings WHERE observation_id = ?1")?
        .execute(params![id])?;
    conn.prepare_cached(
        "INSERT INTO observation_embeddings (observation_id, embedding) VALUES (?1, ?2)",
    )?
    .execute(params![id, blob])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ObservationStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        ObservationStore::new(db, "testhash00000000")
    }

    fn create_simple(store: &ObservationStore, content: &str) -> Observation {
        store
            .create(CreateObservation {
                content,
                source: "manual",
                kind: "finding",
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn create_and_get() {
        let store = store();
        let obs = create_simple(&store, "use pnpm for installs");
        assert_eq!(obs.id.len(), 32);
        assert!(obs.rowid > 0);

        let fetched = store.get_by_id(&obs.id).unwrap().unwrap();
        assert_eq!(fetched.content, "use pnpm for installs");
        assert_eq!(fetched.project_hash, "testhash00000000");
    }

    #[test]
    fn create_rejects_empty_and_oversized() {
        let store = store();
        assert!(store
            .create(CreateObservation { content: "", source: "manual", kind: "finding", ..Default::default() })
            .is_err());
        let huge = "x".repeat(100_001);
        assert!(store
            .create(CreateObservation { content: &huge, source: "manual", kind: "finding", ..Default::default() })
            .is_err());
    }

    #[test]
    fn soft_delete_and_restore_round_trip() {
        let store = store();
        let obs = store
            .create(CreateObservation {
                content: "remember me",
                title: Some("a title"),
                source: "manual",
                kind: "finding",
                embedding: Some(&[0.5f32; 384]),
                ..Default::default()
            })
            .unwrap();

        assert!(store.soft_delete(&obs.id).unwrap());
        assert!(store.get_by_id(&obs.id).unwrap().is_none());
        assert!(store.get_by_id_including_deleted(&obs.id).unwrap().is_some());

        // Double delete returns false, never errors
        assert!(!store.soft_delete(&obs.id).unwrap());

        assert!(store.restore(&obs.id).unwrap());
        let restored = store.get_by_id(&obs.id).unwrap().unwrap();
        assert_eq!(restored.content, "remember me");
        assert_eq!(restored.title.as_deref(), Some("a title"));
        assert_eq!(restored.embedding.as_ref().map(|e| e.len()), Some(384));

        // Double restore is a no-op
        assert!(store.restore(&obs.id).unwrap());
    }

    #[test]
    fn soft_delete_missing_returns_false() {
        let store = store();
        assert!(!store.soft_delete("does-not-exist").unwrap());
        assert!(!store.restore("does-not-exist").unwrap());
    }

    #[test]
    fn update_missing_returns_none() {
        let store = store();
        let result = store
            .update("missing", UpdateObservation { content: Some("x"), ..Default::default() })
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn update_bumps_updated_at() {
        let store = store();
        let obs = create_simple(&store, "original");
        let updated = store
            .update(&obs.id, UpdateObservation { content: Some("changed"), ..Default::default() })
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "changed");
        assert!(updated.updated_at >= obs.updated_at);
    }

    #[test]
    fn list_hides_noise_but_not_fresh_unclassified() {
        let store = store();
        let fresh = create_simple(&store, "fresh unclassified");
        let noisy = create_simple(&store, "noisy row");
        store.update_classification(&noisy.id, "noise").unwrap();
        let kept = create_simple(&store, "useful row");
        store.update_classification(&kept.id, "finding").unwrap();

        let rows = store
            .list(&ListOptions { limit: 10, ..Default::default() })
            .unwrap();
        let ids: Vec<&str> = rows.iter().map(|o| o.id.as_str()).collect();
        assert!(ids.contains(&fresh.id.as_str()), "grace window should admit fresh rows");
        assert!(ids.contains(&kept.id.as_str()));
        assert!(!ids.contains(&noisy.id.as_str()), "noise must be hidden by default");

        // include_unclassified reveals everything
        let rows = store
            .list(&ListOptions { limit: 10, include_unclassified: true, ..Default::default() })
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn list_hides_stale_unclassified_rows() {
        let store = store();
        let obs = create_simple(&store, "old unclassified");
        // Age the row past the grace window
        {
            let conn = store.db.conn();
            conn.execute(
                "UPDATE observations SET created_at = '2020-01-01T00:00:00.000Z' WHERE id = ?1",
                params![obs.id],
            )
            .unwrap();
        }
        let rows = store
            .list(&ListOptions { limit: 10, ..Default::default() })
            .unwrap();
        assert!(rows.is_empty());

        let rows = store
            .list(&ListOptions { limit: 10, include_unclassified: true, ..Default::default() })
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn noise_still_reachable_by_id() {
        let store = store();
        let obs = create_simple(&store, "noisy");
        store.update_classification(&obs.id, "noise").unwrap();
        assert!(store.get_by_id(&obs.id).unwrap().is_some());
    }

    #[test]
    fn list_filters_by_session_and_kind() {
        let store = store();
        store
            .create(CreateObservation {
                content: "in session",
                source: "manual",
                kind: "change",
                session_id: Some("s1"),
                ..Default::default()
            })
            .unwrap();
        create_simple(&store, "no session");

        let rows = store
            .list(&ListOptions {
                limit: 10,
                session_id: Some("s1".into()),
                include_unclassified: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "in session");

        let rows = store
            .list(&ListOptions {
                limit: 10,
                kind: Some("change".into()),
                include_unclassified: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn unclassified_listing_is_oldest_first() {
        let store = store();
        let a = create_simple(&store, "first");
        let b = create_simple(&store, "second");
        let rows = store.list_unclassified(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, a.id);
        assert_eq!(rows[1].id, b.id);
    }

    #[test]
    fn find_unembedded_skips_embedded() {
        let store = store();
        let bare = create_simple(&store, "no vector yet");
        store
            .create(CreateObservation {
                content: "already embedded",
                source: "manual",
                kind: "finding",
                embedding: Some(&[0.1f32; 384]),
                ..Default::default()
            })
            .unwrap();
        let rows = store.find_unembedded(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, bare.id);
    }

    #[test]
    fn set_embedding_records_metadata() {
        let store = store();
        let obs = create_simple(&store, "embed me");
        assert!(store.set_embedding(&obs.id, &[0.2f32; 384], "all-minilm", 1).unwrap());
        let fetched = store.get_by_id(&obs.id).unwrap().unwrap();
        assert_eq!(fetched.embedding_model.as_deref(), Some("all-minilm"));
        assert_eq!(fetched.embedding_version, Some(1));
        assert_eq!(fetched.embedding.map(|e| e.len()), Some(384));
    }

    #[test]
    fn title_lookup_is_case_sensitive() {
        let store = store();
        store
            .create(CreateObservation {
                content: "body",
                title: Some("Deploy Checklist"),
                source: "manual",
                kind: "reference",
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.get_by_title("Deploy", 10).unwrap().len(), 1);
        assert_eq!(store.get_by_title("deploy", 10).unwrap().len(), 0);
    }

    #[test]
    fn context_window_dedups_and_orders() {
        let store = store();
        let conn_fix = |id: &str, ts: &str| {
            let conn = store.db.conn();
            conn.execute(
                "UPDATE observations SET created_at = ?1 WHERE id = ?2",
                params![ts, id],
            )
            .unwrap();
        };
        let a = create_simple(&store, "a");
        conn_fix(&a.id, "2026-01-01T00:00:01.000Z");
        let b = create_simple(&store, "b");
        conn_fix(&b.id, "2026-01-01T00:00:02.000Z");
        let c = create_simple(&store, "c");
        conn_fix(&c.id, "2026-01-01T00:00:03.000Z");

        let window = store.list_context("2026-01-01T00:00:02.000Z", 2).unwrap();
        let contents: Vec<&str> = window.iter().map(|o| o.content.as_str()).collect();
        assert_eq!(contents, vec!["a", "b", "c"]);
    }

    #[test]
    fn project_isolation() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store_a = ObservationStore::new(db.clone(), "projecta00000000");
        let store_b = ObservationStore::new(db, "projectb00000000");

        let obs = store_a
            .create(CreateObservation {
                content: "private to A",
                source: "manual",
                kind: "finding",
                ..Default::default()
            })
            .unwrap();

        assert!(store_b.get_by_id(&obs.id).unwrap().is_none());
        assert!(store_b.get_by_id_including_deleted(&obs.id).unwrap().is_none());
        assert!(store_b
            .list(&ListOptions { limit: 10, include_unclassified: true, ..Default::default() })
            .unwrap()
            .is_empty());
        assert!(!store_b.soft_delete(&obs.id).unwrap());
    }
}
