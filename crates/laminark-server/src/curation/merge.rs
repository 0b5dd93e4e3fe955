// crates/laminark-server/src/curation/merge.rs
// Observation merge: collapse near-duplicate clusters per entity

use crate::db::observations::{CreateObservation, Observation, ObservationStore};
use crate::db::GraphStore;
use crate::similarity::{cosine_similarity, jaccard_words};

/// Minimum cluster size worth consolidating
const MIN_CLUSTER: usize = 3;

/// Pairwise similarity thresholds
const COSINE_THRESHOLD: f32 = 0.95;
const JACCARD_THRESHOLD: f64 = 0.85;

/// Keywords appended to the consolidated summary
const MAX_KEYWORDS: usize = 10;

/// Source marker for consolidated observations
const MERGE_SOURCE: &str = "curation:merge";

/// True when two observations are near-duplicates: embedding cosine when both
/// are embedded, Jaccard over words otherwise.
fn similar(a: &Observation, b: &Observation) -> bool {
    match (&a.embedding, &b.embedding) {
        (Some(ea), Some(eb)) => cosine_similarity(ea, eb) >= COSINE_THRESHOLD,
        _ => jaccard_words(&a.content, &b.content) >= JACCARD_THRESHOLD,
    }
}

/// Greedy closure clustering: a candidate joins a cluster only when it is
/// similar to every existing member.
fn cluster(observations: &[Observation]) -> Vec<Vec<usize>> {
    let mut clusters: Vec<Vec<usize>> = Vec::new();
    let mut assigned = vec![false; observations.len()];

    for i in 0..observations.len() {
        if assigned[i] {
            continue;
        }
        let mut members = vec![i];
        for j in (i + 1)..observations.len() {
            if assigned[j] {
                continue;
            }
            if members.iter().all(|&m| similar(&observations[m], &observations[j])) {
                members.push(j);
            }
        }
        if members.len() >= MIN_CLUSTER {
            for &m in &members {
                assigned[m] = true;
            }
            clusters.push(members);
        }
    }
    clusters
}

/// Consolidated summary: the longest member text, with up to 10 unique
/// keywords from the other members appended.
fn consolidated_summary(members: &[&Observation]) -> String {
    let base = members
        .iter()
        .max_by_key(|o| o.content.len())
        .map(|o| o.content.clone())
        .unwrap_or_default();
    let base_words: std::collections::HashSet<String> = base
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();

    let mut keywords: Vec<String> = Vec::new();
    for member in members {
        for word in member.content.split_whitespace() {
            let lower = word.to_lowercase();
            if lower.len() > 3 && !base_words.contains(&lower) && !keywords.contains(&lower) {
                keywords.push(lower);
                if keywords.len() >= MAX_KEYWORDS {
                    break;
                }
            }
        }
        if keywords.len() >= MAX_KEYWORDS {
            break;
        }
    }

    if keywords.is_empty() {
        base
    } else {
        format!("{base} (also: {})", keywords.join(", "))
    }
}

/// Element-wise mean of the members' embeddings; None when no member has one.
fn mean_embedding(members: &[&Observation]) -> Option<Vec<f32>> {
    let embedded: Vec<&Vec<f32>> = members.iter().filter_map(|o| o.embedding.as_ref()).collect();
    if embedded.is_empty() {
        return None;
    }
    let dims = embedded[0].len();
    let mut mean = vec![0.0f32; dims];
    for embedding in &embedded {
        for (slot, value) in mean.iter_mut().zip(embedding.iter()) {
            *slot += value;
        }
    }
    let n = embedded.len() as f32;
    for slot in &mut mean {
        *slot /= n;
    }
    Some(mean)
}

/// Merge clusters of near-duplicate observations per entity. Returns the
/// number of original observations folded into consolidated ones.
pub fn merge_similar_observations(
    graph: &GraphStore,
    observations: &ObservationStore,
) -> crate::Result<usize> {
    let mut merged_total = 0;

    for node in graph.list_nodes()? {
        if node.observation_ids.len() < MIN_CLUSTER {
            continue;
        }
        // Live rows only; soft-deleted members never re-cluster
        let mut rows: Vec<Observation> = Vec::new();
        for id in &node.observation_ids {
            if let Some(obs) = observations.get_by_id(id)? {
                rows.push(obs);
            }
        }
        if rows.len() < MIN_CLUSTER {
            continue;
        }

        for members_idx in cluster(&rows) {
            let members: Vec<&Observation> = members_idx.iter().map(|&i| &rows[i]).collect();
            let summary = consolidated_summary(&members);
            let embedding = mean_embedding(&members);
            let base = members
                .iter()
                .max_by_key(|o| o.content.len())
                .ok_or_else(|| crate::LaminarkError::Other("empty cluster".into()))?;

            let consolidated = observations.create(CreateObservation {
                content: &summary,
                title: base.title.as_deref(),
                source: MERGE_SOURCE,
                kind: &base.kind,
                session_id: base.session_id.as_deref(),
                embedding: embedding.as_deref(),
            })?;

            // Rewrite the entity's provenance: merged ids out, new id in
            let member_ids: std::collections::HashSet<&str> =
                members.iter().map(|o| o.id.as_str()).collect();
            let mut provenance: Vec<String> = node
                .observation_ids
                .iter()
                .filter(|id| !member_ids.contains(id.as_str()))
                .cloned()
                .collect();
            provenance.push(consolidated.id.clone());
            graph.set_node_provenance(&node.id, &provenance)?;

            // Audit-preserving: originals are tombstoned, not purged
            for member in &members {
                observations.soft_delete(&member.id)?;
                merged_total += 1;
            }
            tracing::info!(
                "Merged {} observations of entity '{}' into {}",
                members.len(),
                node.name,
                consolidated.id
            );
        }
    }
    Ok(merged_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, NodeType};
    use std::sync::Arc;

    fn setup() -> (Arc<Database>, ObservationStore, GraphStore) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let observations = ObservationStore::new(db.clone(), "testhash00000000");
        let graph = GraphStore::new(db.clone(), "testhash00000000");
        (db, observations, graph)
    }

    fn create(observations: &ObservationStore, content: &str) -> Observation {
        observations
            .create(CreateObservation {
                content,
                source: "hook:Write",
                kind: "finding",
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn identical_observations_merge() {
        let (_db, observations, graph) = setup();
        let ids: Vec<String> = (0..3)
            .map(|_| create(&observations, "retry the flaky network call").id)
            .collect();
        graph
            .upsert_node(NodeType::Problem, "flaky network", serde_json::Map::new(), &ids)
            .unwrap();

        let merged = merge_similar_observations(&graph, &observations).unwrap();
        assert_eq!(merged, 3);

        for id in &ids {
            let row = observations.get_by_id_including_deleted(id).unwrap().unwrap();
            assert!(row.deleted_at.is_some(), "originals must be soft-deleted");
        }

        // The entity now points at exactly one live consolidated observation
        let node = graph.find_nodes("flaky network", None, 1).unwrap().remove(0);
        let live: Vec<_> = node
            .observation_ids
            .iter()
            .filter_map(|id| observations.get_by_id(id).unwrap())
            .collect();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].source, MERGE_SOURCE);
    }

    #[test]
    fn dissimilar_observations_do_not_merge() {
        let (_db, observations, graph) = setup();
        let ids = vec![
            create(&observations, "retry the flaky network call").id,
            create(&observations, "cache headers missing on static assets").id,
            create(&observations, "database connection pool exhausted under load").id,
        ];
        graph
            .upsert_node(NodeType::Problem, "misc", serde_json::Map::new(), &ids)
            .unwrap();

        assert_eq!(merge_similar_observations(&graph, &observations).unwrap(), 0);
        for id in &ids {
            assert!(observations.get_by_id(id).unwrap().is_some());
        }
    }

    #[test]
    fn two_members_are_not_enough() {
        let (_db, observations, graph) = setup();
        let ids = vec![
            create(&observations, "same exact text here").id,
            create(&observations, "same exact text here").id,
        ];
        graph
            .upsert_node(NodeType::Problem, "pair", serde_json::Map::new(), &ids)
            .unwrap();
        assert_eq!(merge_similar_observations(&graph, &observations).unwrap(), 0);
    }

    #[test]
    fn summary_appends_unique_keywords() {
        let a = Observation {
            rowid: 1,
            id: "a".into(),
            project_hash: "p".into(),
            content: "the long base text describing cache invalidation in detail".into(),
            title: None,
            source: "manual".into(),
            kind: "finding".into(),
            session_id: None,
            embedding: None,
            embedding_model: None,
            embedding_version: None,
            classification: None,
            classified_at: None,
            created_at: String::new(),
            updated_at: String::new(),
            deleted_at: None,
        };
        let mut b = a.clone();
        b.id = "b".into();
        b.content = "cache invalidation stampede herd".into();

        let summary = consolidated_summary(&[&a, &b]);
        assert!(summary.starts_with("the long base text"));
        assert!(summary.contains("stampede"));
        assert!(summary.contains("herd"));
    }

    #[test]
    fn mean_embedding_averages_members() {
        let mut a = Observation {
            rowid: 1,
            id: "a".into(),
            project_hash: "p".into(),
            content: String::new(),
            title: None,
            source: "m".into(),
            kind: "finding".into(),
            session_id: None,
            embedding: Some(vec![1.0, 0.0]),
            embedding_model: None,
            embedding_version: None,
            classification: None,
            classified_at: None,
            created_at: String::new(),
            updated_at: String::new(),
            deleted_at: None,
        };
        let mut b = a.clone();
        b.embedding = Some(vec![0.0, 1.0]);
        let mean = mean_embedding(&[&a, &b]).unwrap();
        assert_eq!(mean, vec![0.5, 0.5]);

        a.embedding = None;
        b.embedding = None;
        assert!(mean_embedding(&[&a, &b]).is_none());
    }

    #[test]
    fn greedy_closure_requires_similarity_to_all_members() {
        // a ~ b and b ~ c, but a !~ c: no 3-cluster may form
        let make = |content: &str| Observation {
            rowid: 0,
            id: content.into(),
            project_hash: "p".into(),
            content: content.into(),
            title: None,
            source: "m".into(),
            kind: "finding".into(),
            session_id: None,
            embedding: None,
            embedding_model: None,
            embedding_version: None,
            classification: None,
            classified_at: None,
            created_at: String::new(),
            updated_at: String::new(),
            deleted_at: None,
        };
        let a = make("alpha beta gamma delta epsilon zeta eta");
        let b = make("alpha beta gamma delta epsilon zeta theta");
        let c = make("alpha beta gamma delta iota kappa theta");
        let clusters = cluster(&[a, b, c]);
        assert!(clusters.is_empty());
    }
}
