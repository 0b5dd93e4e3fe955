// crates/laminark-server/src/mcp/tools/graph.rs
// query_graph and graph_stats tools

use crate::db::graph::{EdgeType, GraphStore, NodeType};
use crate::db::observations::ObservationStore;
use crate::mcp::LaminarkServer;
use crate::mcp::requests::QueryGraphRequest;
use crate::utils::truncate;

const MAX_DEPTH: usize = 4;
const MAX_LIMIT: usize = 50;
const DEFAULT_LIMIT: usize = 20;

/// Linked observations attached to the response
const LINKED_OBSERVATIONS: usize = 10;

pub async fn query_graph(
    server: &LaminarkServer,
    req: QueryGraphRequest,
) -> Result<String, String> {
    let depth = req.depth.unwrap_or(2).min(MAX_DEPTH);
    let limit = req.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let node_type = match req.entity_type.as_deref() {
        Some(t) => Some(
            t.parse::<NodeType>()
                .map_err(|_| format!("unknown entity type '{t}'"))?,
        ),
        None => None,
    };
    let relationship_types = match req.relationship_types {
        Some(types) if !types.is_empty() => {
            let mut parsed = Vec::with_capacity(types.len());
            for t in &types {
                parsed.push(
                    t.parse::<EdgeType>()
                        .map_err(|_| format!("unknown relationship type '{t}'"))?,
                );
            }
            Some(parsed)
        }
        _ => None,
    };

    let graph = GraphStore::new(server.db.clone(), server.project_hash.clone());
    let roots = graph
        .find_nodes(&req.query, node_type, 3)
        .map_err(|e| e.to_string())?;
    let Some(root) = roots.first() else {
        return Ok(server.with_notifications(format!("No entity matches \"{}\".", req.query)));
    };

    let (mut nodes, edges) = graph
        .traverse(&root.id, depth, relationship_types.as_deref())
        .map_err(|e| e.to_string())?;
    nodes.truncate(limit);

    let mut body = format!(
        "Root: {} ({})\n\n{} nodes:\n",
        root.name, root.node_type, nodes.len()
    );
    for node in &nodes {
        body.push_str(&format!(
            "  [{}] {} ({}, {} observations)\n",
            node.id,
            node.name,
            node.node_type,
            node.observation_ids.len()
        ));
    }
    body.push_str(&format!("\n{} edges:\n", edges.len()));
    let name_of = |id: &str| {
        nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string())
    };
    for edge in &edges {
        body.push_str(&format!(
            "  {} -{}-> {} (weight {:.2})\n",
            name_of(&edge.source_id),
            edge.edge_type,
            name_of(&edge.target_id),
            edge.weight
        ));
    }

    // Up to 10 linked observations, most recent first
    let observations = ObservationStore::new(server.db.clone(), server.project_hash.clone());
    let mut linked = Vec::new();
    'outer: for node in &nodes {
        for id in node.observation_ids.iter().rev() {
            if linked.iter().any(|(seen, _)| seen == id) {
                continue;
            }
            if let Ok(Some(obs)) = observations.get_by_id(id) {
                linked.push((id.clone(), obs));
                if linked.len() >= LINKED_OBSERVATIONS {
                    break 'outer;
                }
            }
        }
    }
    if !linked.is_empty() {
        linked.sort_by(|a, b| b.1.created_at.cmp(&a.1.created_at));
        body.push_str(&format!("\n{} linked observations:\n", linked.len()));
        for (_, obs) in &linked {
            body.push_str(&format!(
                "  [{}] {} -- {}\n",
                obs.id,
                obs.created_at,
                truncate(&obs.content, 100)
            ));
        }
    }

    Ok(server.with_notifications(body))
}

pub async fn graph_stats(server: &LaminarkServer) -> Result<String, String> {
    let graph = GraphStore::new(server.db.clone(), server.project_hash.clone());
    let stats = graph.stats().map_err(|e| e.to_string())?;

    let mut body = format!(
        "Nodes: {}\nEdges: {}\nAvg degree: {:.2}\nMax degree: {}\nHotspots (>= 80% of cap): {}\nDuplicate candidates: {}\nOpen staleness flags: {}\n",
        stats.node_count,
        stats.edge_count,
        stats.avg_degree,
        stats.max_degree,
        stats.hotspot_count,
        stats.duplicate_candidates,
        stats.open_staleness_flags
    );

    let mut node_types: Vec<_> = stats.nodes_by_type.iter().collect();
    node_types.sort();
    body.push_str("\nNodes by type:\n");
    for (node_type, count) in node_types {
        body.push_str(&format!("  {node_type}: {count}\n"));
    }
    let mut edge_types: Vec<_> = stats.edges_by_type.iter().collect();
    edge_types.sort();
    body.push_str("Edges by type:\n");
    for (edge_type, count) in edge_types {
        body.push_str(&format!("  {edge_type}: {count}\n"));
    }

    Ok(server.with_notifications(body))
}
