// crates/laminark-server/src/curation/dedupe.rs
// Entity dedupe: same node under different spellings collapses to one

use crate::db::graph::{GraphNode, GraphStore, NodeType};
use std::collections::HashMap;

/// Well-known abbreviation expansions applied to whole names
const ABBREVIATIONS: [(&str, &str); 6] = [
    ("ts", "typescript"),
    ("js", "javascript"),
    ("k8s", "kubernetes"),
    ("db", "database"),
    ("config", "configuration"),
    ("auth", "authentication"),
];

/// Canonical form used as the duplicate key within one type.
fn normalize(name: &str, node_type: NodeType) -> String {
    let mut canonical = name.trim().to_lowercase();

    if node_type == NodeType::File {
        // Path normalization: strip ./, collapse //, already lowercased
        while let Some(stripped) = canonical.strip_prefix("./") {
            canonical = stripped.to_string();
        }
        while canonical.contains("//") {
            canonical = canonical.replace("//", "/");
        }
        return canonical;
    }

    for (abbrev, expansion) in ABBREVIATIONS {
        if canonical == abbrev {
            return expansion.to_string();
        }
    }
    canonical
}

/// Collapse duplicate entities within each type. The node with more
/// provenance survives; ties keep the older row. Returns nodes merged away.
pub fn dedupe_entities(graph: &GraphStore) -> crate::Result<usize> {
    let nodes = graph.list_nodes()?;
    let mut groups: HashMap<(NodeType, String), Vec<GraphNode>> = HashMap::new();
    for node in nodes {
        groups
            .entry((node.node_type, normalize(&node.name, node.node_type)))
            .or_default()
            .push(node);
    }

    let mut merged_total = 0;
    for (_, mut group) in groups {
        if group.len() < 2 {
            continue;
        }
        // Most provenance first; ties resolved by age so the outcome is stable
        group.sort_by(|a, b| {
            b.observation_ids
                .len()
                .cmp(&a.observation_ids.len())
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        let keeper = group.remove(0);
        for duplicate in group {
            match graph.merge_nodes(&keeper.id, &duplicate.id) {
                Ok(()) => {
                    merged_total += 1;
                    tracing::info!(
                        "Deduped entity '{}' into '{}' ({})",
                        duplicate.name,
                        keeper.name,
                        keeper.node_type
                    );
                }
                Err(e) => {
                    tracing::warn!("Entity merge failed for '{}': {}", duplicate.name, e)
                }
            }
        }
    }
    Ok(merged_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, EdgeType};
    use std::sync::Arc;

    fn graph() -> GraphStore {
        let db = Arc::new(Database::open_in_memory().unwrap());
        GraphStore::new(db, "testhash00000000")
    }

    #[test]
    fn normalize_file_paths() {
        assert_eq!(normalize("./src//Auth.TS", NodeType::File), "src/auth.ts");
        assert_eq!(normalize("src/main.rs", NodeType::File), "src/main.rs");
    }

    #[test]
    fn normalize_abbreviations() {
        assert_eq!(normalize("TS", NodeType::Decision), "typescript");
        assert_eq!(normalize("k8s", NodeType::Decision), "kubernetes");
        // Abbreviations apply to whole names only
        assert_eq!(normalize("ts compiler", NodeType::Decision), "ts compiler");
    }

    #[test]
    fn case_insensitive_duplicates_merge_into_higher_provenance() {
        let graph = graph();
        let big = graph
            .upsert_node(
                NodeType::Decision,
                "Use Postgres",
                serde_json::Map::new(),
                &["o1".into(), "o2".into(), "o3".into()],
            )
            .unwrap();
        let small = graph
            .upsert_node(NodeType::Decision, "use postgres", serde_json::Map::new(), &["o4".into()])
            .unwrap();
        let neighbor = graph
            .upsert_node(NodeType::File, "db.rs", serde_json::Map::new(), &[])
            .unwrap();
        graph
            .insert_edge(&small.id, &neighbor.id, EdgeType::Modifies, 0.7, serde_json::Map::new())
            .unwrap();

        assert_eq!(dedupe_entities(&graph).unwrap(), 1);
        assert!(graph.get_node(&small.id).unwrap().is_none());

        let kept = graph.get_node(&big.id).unwrap().unwrap();
        assert_eq!(kept.observation_ids.len(), 4);
        assert_eq!(graph.node_degree(&big.id).unwrap(), 1, "edges rerouted to keeper");
    }

    #[test]
    fn abbreviation_duplicates_merge() {
        let graph = graph();
        graph
            .upsert_node(NodeType::Decision, "typescript", serde_json::Map::new(), &["o1".into()])
            .unwrap();
        graph
            .upsert_node(NodeType::Decision, "ts", serde_json::Map::new(), &[])
            .unwrap();
        assert_eq!(dedupe_entities(&graph).unwrap(), 1);
    }

    #[test]
    fn different_types_never_merge() {
        let graph = graph();
        graph
            .upsert_node(NodeType::Problem, "timeout", serde_json::Map::new(), &[])
            .unwrap();
        graph
            .upsert_node(NodeType::Solution, "Timeout", serde_json::Map::new(), &[])
            .unwrap();
        assert_eq!(dedupe_entities(&graph).unwrap(), 0);
    }

    #[test]
    fn dedupe_is_idempotent() {
        let graph = graph();
        graph
            .upsert_node(NodeType::File, "./src/a.rs", serde_json::Map::new(), &["o1".into()])
            .unwrap();
        graph
            .upsert_node(NodeType::File, "src/a.rs", serde_json::Map::new(), &[])
            .unwrap();
        assert_eq!(dedupe_entities(&graph).unwrap(), 1);
        assert_eq!(dedupe_entities(&graph).unwrap(), 0);
    }
}
