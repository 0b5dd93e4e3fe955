// crates/laminark-server/src/search/mod.rs
// Hybrid keyword + vector search with reciprocal rank fusion

pub mod fusion;
pub mod keyword;
pub mod vector;

pub use fusion::reciprocal_rank_fusion;
pub use keyword::{KeywordHit, keyword_search, sanitize_match_query};
pub use vector::{VectorHit, vector_search};

use crate::db::observations::{Observation, ObservationStore};
use crate::db::Database;
use crate::embeddings::EmbeddingHandle;
use std::collections::HashMap;
use std::sync::Arc;

/// Synthesized snippet length when a hit has no FTS snippet
const FALLBACK_SNIPPET_CHARS: usize = 100;

/// How a result was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    Fts,
    Vector,
    Hybrid,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::Fts => "fts",
            MatchType::Vector => "vector",
            MatchType::Hybrid => "hybrid",
        }
    }
}

/// A hybrid search result
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub observation: Observation,
    pub score: f64,
    pub snippet: String,
    pub match_type: MatchType,
}

/// Encode a float vector as a little-endian f32 blob.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode a little-endian f32 blob back into a float vector.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Hybrid search: BM25 keyword ranking fused with cosine-distance KNN.
///
/// Degrades to pure keyword results whenever the worker is down, the query
/// embedding fails, or no vectors exist -- same ordering, same scores.
pub async fn hybrid_search(
    db: &Arc<Database>,
    project_hash: &str,
    query: &str,
    session_id: Option<&str>,
    limit: usize,
    worker: Option<&EmbeddingHandle>,
) -> crate::Result<Vec<SearchResult>> {
    let keyword_hits = keyword_search(db, project_hash, query, session_id, limit)?;

    let vector_hits = match worker {
        Some(handle) if handle.is_ready() => match handle.embed(query.to_string()).await {
            Some(embedding) => vector_search(db, project_hash, &embedding, limit * 2),
            None => Vec::new(),
        },
        _ => Vec::new(),
    };

    if vector_hits.is_empty() {
        return Ok(keyword_hits
            .into_iter()
            .map(|hit| SearchResult {
                observation: hit.observation,
                score: hit.score,
                snippet: hit.snippet,
                match_type: MatchType::Fts,
            })
            .collect());
    }

    let keyword_ids: Vec<String> =
        keyword_hits.iter().map(|h| h.observation.id.clone()).collect();
    let vector_ids: Vec<String> =
        vector_hits.iter().map(|h| h.observation_id.clone()).collect();
    let fused = reciprocal_rank_fusion(&keyword_ids, &vector_ids, limit);

    let mut by_id: HashMap<String, KeywordHit> = keyword_hits
        .into_iter()
        .map(|h| (h.observation.id.clone(), h))
        .collect();
    let vector_set: std::collections::HashSet<&str> =
        vector_ids.iter().map(|s| s.as_str()).collect();
    let observations = ObservationStore::new(db.clone(), project_hash);

    let mut results = Vec::with_capacity(fused.len());
    for (id, score) in fused {
        let in_vector = vector_set.contains(id.as_str());
        match by_id.remove(&id) {
            Some(hit) => {
                results.push(SearchResult {
                    observation: hit.observation,
                    score,
                    snippet: hit.snippet,
                    match_type: if in_vector { MatchType::Hybrid } else { MatchType::Fts },
                });
            }
            None => {
                // Vector-only hit: load the row and synthesize a snippet
                if let Some(observation) = observations.get_by_id(&id)? {
                    let snippet =
                        crate::utils::truncate(&observation.content, FALLBACK_SNIPPET_CHARS);
                    results.push(SearchResult {
                        observation,
                        score,
                        snippet,
                        match_type: MatchType::Vector,
                    });
                }
            }
        }
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_blob_round_trip() {
        let original = vec![0.0f32, 1.5, -2.25, f32::MIN_POSITIVE];
        let bytes = embedding_to_bytes(&original);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_embedding(&bytes), original);
    }

    #[test]
    fn blob_is_little_endian() {
        let bytes = embedding_to_bytes(&[1.0f32]);
        assert_eq!(bytes, 1.0f32.to_le_bytes().to_vec());
    }

    #[test]
    fn truncated_blob_drops_partial_floats() {
        let mut bytes = embedding_to_bytes(&[1.0f32, 2.0]);
        bytes.pop();
        assert_eq!(bytes_to_embedding(&bytes), vec![1.0f32]);
    }

    #[test]
    fn match_type_labels() {
        assert_eq!(MatchType::Fts.as_str(), "fts");
        assert_eq!(MatchType::Vector.as_str(), "vector");
        assert_eq!(MatchType::Hybrid.as_str(), "hybrid");
    }
}
