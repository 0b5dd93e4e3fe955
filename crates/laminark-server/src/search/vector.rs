// crates/laminark-server/src/search/vector.rs
// Project-scoped vector KNN over the cosine-distance vec0 table

use crate::db::Database;
use crate::search::embedding_to_bytes;
use rusqlite::params;

/// One KNN hit: observation id and cosine distance (ascending = closer)
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub observation_id: String,
    pub distance: f64,
}

/// KNN over this project's non-deleted observations.
///
/// Every failure path (extension missing, malformed blob, SQL error)
/// degrades to an empty result so hybrid search falls back to keyword-only.
pub fn vector_search(
    db: &Database,
    project_hash: &str,
    embedding: &[f32],
    limit: usize,
) -> Vec<VectorHit> {
    if !db.has_vector_support() || embedding.is_empty() {
        return Vec::new();
    }
    let blob = embedding_to_bytes(embedding);
    let conn = db.conn();
    conn.prepare_cached(
        "SELECT e.observation_id, vec_distance_cosine(e.embedding, ?1) AS distance
         FROM observation_embeddings e
         JOIN observations o ON o.id = e.observation_id
         WHERE o.project_hash = ?2 AND o.deleted_at IS NULL
         ORDER BY distance ASC
         LIMIT ?3",
    )
    .and_then(|mut stmt| {
        stmt.query_map(params![blob, project_hash, limit as i64], |row| {
            Ok(VectorHit { observation_id: row.get(0)?, distance: row.get(1)? })
        })
        .map(|rows| rows.filter_map(|r| r.ok()).collect())
    })
    .unwrap_or_else(|e| {
        tracing::debug!("Vector search degraded to empty: {}", e);
        Vec::new()
    })
}
