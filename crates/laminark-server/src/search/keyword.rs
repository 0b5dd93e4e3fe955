// crates/laminark-server/src/search/keyword.rs
// FTS5 keyword search with MATCH sanitization and bm25 ranking

use crate::db::observations::Observation;
use crate::db::Database;
use rusqlite::params;

/// Snippet window in tokens
const SNIPPET_TOKENS: i64 = 32;

/// FTS reserved words stripped from user queries
const RESERVED_WORDS: [&str; 4] = ["NEAR", "OR", "AND", "NOT"];

/// A keyword hit: the observation, its absolute bm25 score, and a
/// `<mark>`-delimited snippet.
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub observation: Observation,
    pub score: f64,
    pub snippet: String,
}

/// Sanitize free text into an FTS5 MATCH expression.
///
/// Operator characters are stripped (words and hyphens survive), reserved
/// words are dropped, and each surviving token is quoted so hyphenated terms
/// stay intact. Returns None when nothing searchable remains.
pub fn sanitize_match_query(query: &str) -> Option<String> {
    let tokens: Vec<String> = query
        .split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_'))
        .filter(|t| !t.is_empty())
        .filter(|t| !RESERVED_WORDS.contains(t))
        .map(|t| format!("\"{}\"", t))
        .collect();
    if tokens.is_empty() {
        None
    } else {
        Some(tokens.join(" "))
    }
}

/// Project-scoped keyword search.
///
/// Ranking contract: `bm25(observations_fts, 2.0, 1.0)` -- title matches
/// weigh double content matches; more-negative scores rank first.
pub fn keyword_search(
    db: &Database,
    project_hash: &str,
    query: &str,
    session_id: Option<&str>,
    limit: usize,
) -> crate::Result<Vec<KeywordHit>> {
    let Some(match_expr) = sanitize_match_query(query) else {
        return Ok(Vec::new());
    };

    let conn = db.conn();
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT o.rowid, o.id, o.project_hash, o.content, o.title, o.source, o.kind,
                o.session_id, o.embedding, o.embedding_model, o.embedding_version,
                o.classification, o.classified_at, o.created_at, o.updated_at, o.deleted_at,
                bm25(observations_fts, 2.0, 1.0) AS score,
                snippet(observations_fts, 1, '<mark>', '</mark>', '…', {SNIPPET_TOKENS}) AS snip
         FROM observations_fts
         JOIN observations o ON o.rowid = observations_fts.rowid
         WHERE observations_fts MATCH ?1
           AND o.project_hash = ?2
           AND o.deleted_at IS NULL
           AND (o.classification IS NULL OR o.classification != 'noise')
           AND (?3 IS NULL OR o.session_id = ?3)
         ORDER BY bm25(observations_fts, 2.0, 1.0)
         LIMIT ?4"
    ))?;

    let rows = stmt
        .query_map(
            params![match_expr, project_hash, session_id, limit as i64],
            |row| {
                let observation = crate::db::observations::map_row(row)?;
                let score: f64 = row.get(16)?;
                let snippet: String = row.get(17)?;
                Ok(KeywordHit { observation, score: score.abs(), snippet })
            },
        )?
        .filter_map(|r| r.ok())
        .collect();
    Ok(rows)
}
