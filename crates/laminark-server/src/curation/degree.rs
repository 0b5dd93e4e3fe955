// crates/laminark-server/src/curation/degree.rs
// Degree enforcement: keep every node at or under the edge cap

use crate::db::graph::{GraphStore, MAX_NODE_DEGREE};

/// Nodes above this watermark get pruned back to the cap
const ENFORCE_WATERMARK: f64 = 0.9;

/// Recompute degree for each node and prune overloaded ones down to the cap.
/// Returns total edges removed.
pub fn enforce_degree_caps(graph: &GraphStore) -> crate::Result<usize> {
    let watermark = (ENFORCE_WATERMARK * MAX_NODE_DEGREE as f64) as i64;
    let mut pruned_total = 0;

    for node in graph.list_nodes()? {
        let degree = graph.node_degree(&node.id)?;
        if degree > watermark {
            pruned_total += graph.enforce_degree_cap(&node.id)?;
        }
    }
    Ok(pruned_total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, EdgeType, NodeType};
    use std::sync::Arc;

    #[test]
    fn overloaded_node_is_pruned_to_cap() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let graph = GraphStore::new(db, "testhash00000000");
        let hub = graph
            .upsert_node(NodeType::File, "hub.rs", serde_json::Map::new(), &[])
            .unwrap();
        for i in 0..60 {
            let other = graph
                .upsert_node(NodeType::Decision, &format!("d{i}"), serde_json::Map::new(), &[])
                .unwrap();
            graph
                .insert_edge(&hub.id, &other.id, EdgeType::RelatedTo, (i as f64) / 100.0, serde_json::Map::new())
                .unwrap();
        }

        let pruned = enforce_degree_caps(&graph).unwrap();
        assert_eq!(pruned, 10);
        assert_eq!(graph.node_degree(&hub.id).unwrap() as usize, MAX_NODE_DEGREE);

        // Second pass is a no-op
        assert_eq!(enforce_degree_caps(&graph).unwrap(), 0);
    }

    #[test]
    fn nodes_under_watermark_are_untouched() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let graph = GraphStore::new(db, "testhash00000000");
        let hub = graph
            .upsert_node(NodeType::File, "hub.rs", serde_json::Map::new(), &[])
            .unwrap();
        for i in 0..20 {
            let other = graph
                .upsert_node(NodeType::Decision, &format!("d{i}"), serde_json::Map::new(), &[])
                .unwrap();
            graph
                .insert_edge(&hub.id, &other.id, EdgeType::RelatedTo, 0.5, serde_json::Map::new())
                .unwrap();
        }
        assert_eq!(enforce_degree_caps(&graph).unwrap(), 0);
        assert_eq!(graph.node_degree(&hub.id).unwrap(), 20);
    }
}
