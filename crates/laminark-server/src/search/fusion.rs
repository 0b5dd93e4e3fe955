// crates/laminark-server/src/search/fusion.rs
// Reciprocal rank fusion of keyword and vector result lists

/// RRF constant; dampens the influence of top ranks
const RRF_K: f64 = 60.0;

/// Fuse ranked id lists: `score(id) = sum over lists of 1 / (k + rank + 1)`
/// with zero-based ranks. Output is sorted by score descending with a
/// deterministic id tie-break, truncated to `limit`.
pub fn reciprocal_rank_fusion(
    keyword_ids: &[String],
    vector_ids: &[String],
    limit: usize,
) -> Vec<(String, f64)> {
    let mut scores: std::collections::HashMap<&str, f64> = std::collections::HashMap::new();
    for list in [keyword_ids, vector_ids] {
        for (rank, id) in list.iter().enumerate() {
            *scores.entry(id.as_str()).or_insert(0.0) += 1.0 / (RRF_K + rank as f64 + 1.0);
        }
    }

    let mut fused: Vec<(String, f64)> = scores
        .into_iter()
        .map(|(id, score)| (id.to_string(), score))
        .collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused.truncate(limit);
    fused
}
