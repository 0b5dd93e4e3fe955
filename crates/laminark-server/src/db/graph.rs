// crates/laminark-server/src/db/graph.rs
// Typed knowledge graph: nodes, edges, traversal, degree enforcement, merges
//
// Node and edge taxonomies are closed sum types validated at every write;
// the CHECK constraints in the schema are the last line of defense.

use super::Database;
use crate::utils::{new_id, now_iso};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::sync::Arc;
use strum::{Display, EnumString};

/// Maximum edges per node; lowest-weight edges are pruned on overflow
pub const MAX_NODE_DEGREE: usize = 50;

/// Entity taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum NodeType {
    Project,
    File,
    Decision,
    Problem,
    Solution,
    Reference,
}

/// Relationship taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum EdgeType {
    RelatedTo,
    SolvedBy,
    CausedBy,
    Modifies,
    InformedBy,
    References,
    VerifiedBy,
    PrecededBy,
}

/// A typed entity
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub node_type: NodeType,
    pub name: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub observation_ids: Vec<String>,
    pub project_hash: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A typed directed relationship
#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub edge_type: EdgeType,
    pub weight: f64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub project_hash: String,
    pub created_at: String,
}

/// Aggregate statistics for the graph_stats tool
#[derive(Debug, Clone, Default)]
pub struct GraphStats {
    pub node_count: i64,
    pub edge_count: i64,
    pub nodes_by_type: HashMap<String, i64>,
    pub edges_by_type: HashMap<String, i64>,
    pub avg_degree: f64,
    pub max_degree: i64,
    pub hotspot_count: i64,
    pub duplicate_candidates: i64,
    pub open_staleness_flags: i64,
}

fn parse_json_map(text: &str) -> serde_json::Map<String, serde_json::Value> {
    serde_json::from_str(text).unwrap_or_default()
}

fn parse_json_ids(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_default()
}

fn map_node(row: &Row) -> rusqlite::Result<GraphNode> {
    let type_text: String = row.get(1)?;
    let metadata_text: String = row.get(3)?;
    let ids_text: String = row.get(4)?;
    Ok(GraphNode {
        id: row.get(0)?,
        node_type: type_text.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(1, "type".into(), rusqlite::types::Type::Text)
        })?,
        name: row.get(2)?,
        metadata: parse_json_map(&metadata_text),
        observation_ids: parse_json_ids(&ids_text),
        project_hash: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn map_edge(row: &Row) -> rusqlite::Result<GraphEdge> {
    let type_text: String = row.get(3)?;
    let metadata_text: String = row.get(5)?;
    Ok(GraphEdge {
        id: row.get(0)?,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        edge_type: type_text.parse().map_err(|_| {
            rusqlite::Error::InvalidColumnType(3, "type".into(), rusqlite::types::Type::Text)
        })?,
        weight: row.get(4)?,
        metadata: parse_json_map(&metadata_text),
        project_hash: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const NODE_COLUMNS: &str =
    "id, type, name, metadata, observation_ids, project_hash, created_at, updated_at";
const EDGE_COLUMNS: &str =
    "id, source_id, target_id, type, weight, metadata, project_hash, created_at";

pub struct GraphStore {
    db: Arc<Database>,
    project_hash: String,
}

impl GraphStore {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        Self { db, project_hash: project_hash.into() }
    }

    /// Upsert by natural key `(name, type, project_hash)`.
    ///
    /// Existing rows merge metadata (new keys override) and union the
    /// observation-id provenance.
    pub fn upsert_node(
        &self,
        node_type: NodeType,
        name: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
        observation_ids: &[String],
    ) -> crate::Result<GraphNode> {
        let now = now_iso();
        let conn = self.db.conn();
        let existing = conn
            .prepare_cached(&format!(
                "SELECT {NODE_COLUMNS} FROM graph_nodes
                 WHERE name = ?1 AND type = ?2 AND project_hash = ?3"
            ))?
            .query_row(
                params![name, node_type.to_string(), self.project_hash],
                map_node,
            )
            .optional()?;

        let id = match existing {
            Some(node) => {
                let mut merged_meta = node.metadata.clone();
                for (k, v) in metadata {
                    merged_meta.insert(k, v);
                }
                let mut merged_ids = node.observation_ids.clone();
                for oid in observation_ids {
                    if !merged_ids.contains(oid) {
                        merged_ids.push(oid.clone());
                    }
                }
                conn.prepare_cached(
                    "UPDATE graph_nodes SET metadata = ?1, observation_ids = ?2, updated_at = ?3
                     WHERE id = ?4",
                )?
                .execute(params![
                    serde_json::to_string(&merged_meta)?,
                    serde_json::to_string(&merged_ids)?,
                    now,
                    node.id,
                ])?;
                node.id
            }
            None => {
                let id = new_id();
                conn.prepare_cached(
                    "INSERT INTO graph_nodes
                        (id, type, name, metadata, observation_ids, project_hash,
                         created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                )?
                .execute(params![
                    id,
                    node_type.to_string(),
                    name,
                    serde_json::to_string(&metadata)?,
                    serde_json::to_string(observation_ids)?,
                    self.project_hash,
                    now,
                ])?;
                id
            }
        };
        drop(conn);

        self.get_node(&id)?
            .ok_or_else(|| crate::LaminarkError::Other("node upsert vanished".into()))
    }

    pub fn get_node(&self, id: &str) -> crate::Result<Option<GraphNode>> {
        let conn = self.db.conn();
        let row = conn
            .prepare_cached(&format!(
                "SELECT {NODE_COLUMNS} FROM graph_nodes WHERE id = ?1 AND project_hash = ?2"
            ))?
            .query_row(params![id, self.project_hash], map_node)
            .optional()?;
        Ok(row)
    }

    /// Root lookup for traversal: exact name match first, then LIKE.
    pub fn find_nodes(
        &self,
        query: &str,
        node_type: Option<NodeType>,
        limit: usize,
    ) -> crate::Result<Vec<GraphNode>> {
        let type_text = node_type.map(|t| t.to_string());
        let conn = self.db.conn();
        let exact: Vec<GraphNode> = conn
            .prepare_cached(&format!(
                "SELECT {NODE_COLUMNS} FROM graph_nodes
                 WHERE project_hash = ?1 AND name = ?2 AND (?3 IS NULL OR type = ?3)
                 LIMIT ?4"
            ))?
            .query_map(params![self.project_hash, query, type_text, limit as i64], map_node)?
            .filter_map(|r| r.ok())
            .collect();
        if !exact.is_empty() {
            return Ok(exact);
        }

        let pattern = format!("%{}%", query.to_lowercase());
        let rows = conn
            .prepare_cached(&format!(
                "SELECT {NODE_COLUMNS} FROM graph_nodes
                 WHERE project_hash = ?1 AND LOWER(name) LIKE ?2 AND (?3 IS NULL OR type = ?3)
                 ORDER BY LENGTH(name) ASC
                 LIMIT ?4"
            ))?
            .query_map(params![self.project_hash, pattern, type_text, limit as i64], map_node)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// All nodes of this project (curation passes iterate these).
    pub fn list_nodes(&self) -> crate::Result<Vec<GraphNode>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {NODE_COLUMNS} FROM graph_nodes WHERE project_hash = ?1 ORDER BY name"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash], map_node)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Nodes touched within the last `hours` hours.
    pub fn nodes_updated_since(&self, hours: i64) -> crate::Result<Vec<GraphNode>> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::hours(hours))
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {NODE_COLUMNS} FROM graph_nodes
             WHERE project_hash = ?1 AND updated_at >= ?2"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, cutoff], map_node)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Insert an edge; the `(source, target, type)` conflict keeps the larger
    /// weight. Returns false when either endpoint is missing (the edge is
    /// skipped, not an error, per the batch-continues contract).
    pub fn insert_edge(
        &self,
        source_id: &str,
        target_id: &str,
        edge_type: EdgeType,
        weight: f64,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> crate::Result<bool> {
        if self.get_node(source_id)?.is_none() || self.get_node(target_id)?.is_none() {
            tracing::debug!(
                "Skipping edge {} -{}-> {}: endpoint missing",
                source_id,
                edge_type,
                target_id
            );
            return Ok(false);
        }
        let weight = weight.clamp(0.0, 1.0);
        let conn = self.db.conn();
        conn.prepare_cached(
            "INSERT INTO graph_edges
                (id, source_id, target_id, type, weight, metadata, project_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(source_id, target_id, type)
             DO UPDATE SET weight = MAX(weight, excluded.weight)",
        )?
        .execute(params![
            new_id(),
            source_id,
            target_id,
            edge_type.to_string(),
            weight,
            serde_json::to_string(&metadata)?,
            self.project_hash,
            now_iso(),
        ])?;
        Ok(true)
    }

    /// Edge count touching a node (in either direction).
    pub fn node_degree(&self, node_id: &str) -> crate::Result<i64> {
        let conn = self.db.conn();
        let degree = conn
            .prepare_cached(
                "SELECT COUNT(*) FROM graph_edges
                 WHERE project_hash = ?1 AND (source_id = ?2 OR target_id = ?2)",
            )?
            .query_row(params![self.project_hash, node_id], |row| row.get(0))?;
        Ok(degree)
    }

    /// Prune lowest-weight edges until the node is at or under the cap.
    /// Returns the number of edges removed.
    pub fn enforce_degree_cap(&self, node_id: &str) -> crate::Result<usize> {
        let degree = self.node_degree(node_id)? as usize;
        if degree <= MAX_NODE_DEGREE {
            return Ok(0);
        }
        let excess = degree - MAX_NODE_DEGREE;
        let conn = self.db.conn();
        let pruned = conn
            .prepare_cached(
                "DELETE FROM graph_edges WHERE id IN (
                    SELECT id FROM graph_edges
                    WHERE project_hash = ?1 AND (source_id = ?2 OR target_id = ?2)
                    ORDER BY weight ASC, created_at ASC
                    LIMIT ?3)",
            )?
            .execute(params![self.project_hash, node_id, excess as i64])?;
        if pruned > 0 {
            tracing::info!("Pruned {} low-weight edges from node {}", pruned, node_id);
        }
        Ok(pruned)
    }

    /// All edges touching a node.
    pub fn edges_for_node(&self, node_id: &str) -> crate::Result<Vec<GraphEdge>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS} FROM graph_edges
             WHERE project_hash = ?1 AND (source_id = ?2 OR target_id = ?2)
             ORDER BY weight DESC"
        ))?;
        let rows = stmt
            .query_map(params![self.project_hash, node_id], map_edge)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Cycle-safe breadth traversal from a root node via recursive CTE.
    ///
    /// Follows edges in both directions up to `depth` hops (capped at 4).
    /// Returns the reachable nodes (root included) and the edges among them.
    pub fn traverse(
        &self,
        root_id: &str,
        depth: usize,
        relationship_types: Option<&[EdgeType]>,
    ) -> crate::Result<(Vec<GraphNode>, Vec<GraphEdge>)> {
        let depth = depth.min(4) as i64;
        let type_filter = match relationship_types {
            Some(types) if !types.is_empty() => {
                let list = types
                    .iter()
                    .map(|t| format!("'{}'", t))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("AND e.type IN ({list})")
            }
            _ => String::new(),
        };

        let conn = self.db.conn();
        let sql = format!(
            "WITH RECURSIVE reachable(id, hops) AS (
                SELECT ?1, 0
                UNION
                SELECT CASE WHEN e.source_id = r.id THEN e.target_id ELSE e.source_id END,
                       r.hops + 1
                FROM graph_edges e, reachable r
                WHERE (e.source_id = r.id OR e.target_id = r.id)
                  AND e.project_hash = ?2
                  AND r.hops < ?3
                  {type_filter}
            )
            SELECT DISTINCT n.id, n.type, n.name, n.metadata, n.observation_ids,
                            n.project_hash, n.created_at, n.updated_at
            FROM reachable r JOIN graph_nodes n ON n.id = r.id
            WHERE n.project_hash = ?2"
        );
        let nodes: Vec<GraphNode> = conn
            .prepare(&sql)?
            .query_map(params![root_id, self.project_hash, depth], map_node)?
            .filter_map(|r| r.ok())
            .collect();
        drop(conn);

        let node_ids: std::collections::HashSet<&str> =
            nodes.iter().map(|n| n.id.as_str()).collect();
        let mut edges = Vec::new();
        for node in &nodes {
            for edge in self.edges_for_node(&node.id)? {
                if node_ids.contains(edge.source_id.as_str())
                    && node_ids.contains(edge.target_id.as_str())
                    && !edges.iter().any(|e: &GraphEdge| e.id == edge.id)
                {
                    if let Some(types) = relationship_types {
                        if !types.is_empty() && !types.contains(&edge.edge_type) {
                            continue;
                        }
                    }
                    edges.push(edge);
                }
            }
        }
        Ok((nodes, edges))
    }

    /// Merge `merge_id` into `keep_id`: union provenance, reroute edges
    /// (skipping self-loops; `(src, tgt, type)` collisions keep the higher
    /// weight), then delete the merged node. Runs in one transaction.
    pub fn merge_nodes(&self, keep_id: &str, merge_id: &str) -> crate::Result<()> {
        let keep = self
            .get_node(keep_id)?
            .ok_or_else(|| crate::LaminarkError::InvalidInput("keep node missing".into()))?;
        let merged = self
            .get_node(merge_id)?
            .ok_or_else(|| crate::LaminarkError::InvalidInput("merge node missing".into()))?;
        let rerouted = self.edges_for_node(merge_id)?;

        let mut union_ids = keep.observation_ids.clone();
        for oid in &merged.observation_ids {
            if !union_ids.contains(oid) {
                union_ids.push(oid.clone());
            }
        }

        let conn = self.db.conn();
        conn.execute_batch("BEGIN")?;
        let result = (|| -> crate::Result<()> {
            conn.prepare_cached(
                "UPDATE graph_nodes SET observation_ids = ?1, updated_at = ?2 WHERE id = ?3",
            )?
            .execute(params![serde_json::to_string(&union_ids)?, now_iso(), keep_id])?;

            // Cascade clears the merged node's edges; re-add them rerouted.
            conn.prepare_cached("DELETE FROM graph_nodes WHERE id = ?1 AND project_hash = ?2")?
                .execute(params![merge_id, self.project_hash])?;

            for edge in &rerouted {
                let source = if edge.source_id == merge_id { keep_id } else { edge.source_id.as_str() };
                let target = if edge.target_id == merge_id { keep_id } else { edge.target_id.as_str() };
                if source == target {
                    continue;
                }
                insert_edge_raw(
                    &conn,
                    &self.project_hash,
                    source,
                    target,
                    edge.edge_type,
                    edge.weight,
                    &edge.metadata,
                )?;
            }
            Ok(())
        })();
        match result {
            Ok(()) => {
                conn.execute_batch("COMMIT")?;
                Ok(())
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Overwrite a node's provenance list. upsert_node unions; consolidation
    /// after an observation merge needs replacement.
    pub fn set_node_provenance(
        &self,
        node_id: &str,
        observation_ids: &[String],
    ) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached(
                "UPDATE graph_nodes SET observation_ids = ?1, updated_at = ?2
                 WHERE id = ?3 AND project_hash = ?4",
            )?
            .execute(params![
                serde_json::to_string(observation_ids)?,
                now_iso(),
                node_id,
                self.project_hash,
            ])?;
        Ok(changed > 0)
    }

    /// Delete a node; its edges cascade.
    pub fn delete_node(&self, id: &str) -> crate::Result<bool> {
        let conn = self.db.conn();
        let changed = conn
            .prepare_cached("DELETE FROM graph_nodes WHERE id = ?1 AND project_hash = ?2")?
            .execute(params![id, self.project_hash])?;
        Ok(changed > 0)
    }

    /// Aggregate statistics for the graph_stats tool.
    pub fn stats(&self) -> crate::Result<GraphStats> {
        let conn = self.db.conn();
        let mut stats = GraphStats::default();

        stats.node_count = conn
            .prepare_cached("SELECT COUNT(*) FROM graph_nodes WHERE project_hash = ?1")?
            .query_row(params![self.project_hash], |row| row.get(0))?;
        stats.edge_count = conn
            .prepare_cached("SELECT COUNT(*) FROM graph_edges WHERE project_hash = ?1")?
            .query_row(params![self.project_hash], |row| row.get(0))?;

        let mut stmt = conn.prepare_cached(
            "SELECT type, COUNT(*) FROM graph_nodes WHERE project_hash = ?1 GROUP BY type",
        )?;
        for row in stmt.query_map(params![self.project_hash], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })? {
            if let Ok((t, n)) = row {
                stats.nodes_by_type.insert(t, n);
            }
        }
        let mut stmt = conn.prepare_cached(
            "SELECT type, COUNT(*) FROM graph_edges WHERE project_hash = ?1 GROUP BY type",
        )?;
        for row in stmt.query_map(params![self.project_hash], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })? {
            if let Ok((t, n)) = row {
                stats.edges_by_type.insert(t, n);
            }
        }

        // Degree distribution over endpoints
        let hotspot_floor = (0.8 * MAX_NODE_DEGREE as f64) as i64;
        let (avg, max, hotspots): (f64, i64, i64) = conn
            .prepare_cached(
                "SELECT COALESCE(AVG(degree), 0), COALESCE(MAX(degree), 0),
                        COALESCE(SUM(CASE WHEN degree >= ?2 THEN 1 ELSE 0 END), 0)
                 FROM (
                    SELECT COUNT(*) AS degree FROM (
                        SELECT source_id AS node_id FROM graph_edges WHERE project_hash = ?1
                        UNION ALL
                        SELECT target_id FROM graph_edges WHERE project_hash = ?1
                    ) GROUP BY node_id
                 )",
            )?
            .query_row(params![self.project_hash, hotspot_floor], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
        stats.avg_degree = avg;
        stats.max_degree = max;
        stats.hotspot_count = hotspots;

        stats.duplicate_candidates = conn
            .prepare_cached(
                "SELECT COALESCE(SUM(n - 1), 0) FROM (
                    SELECT COUNT(*) AS n FROM graph_nodes
                    WHERE project_hash = ?1
                    GROUP BY type, LOWER(name)
                    HAVING COUNT(*) > 1
                 )",
            )?
            .query_row(params![self.project_hash], |row| row.get(0))?;

        stats.open_staleness_flags = conn
            .prepare_cached("SELECT COUNT(*) FROM staleness_flags WHERE project_hash = ?1")?
            .query_row(params![self.project_hash], |row| row.get(0))?;

        Ok(stats)
    }
}

/// Edge insert against an already-held connection (transaction contexts).
fn insert_edge_raw(
    conn: &Connection,
    project_hash: &str,
    source_id: &str,
    target_id: &str,
    edge_type: EdgeType,
    weight: f64,
    metadata: &serde_json::Map<String, serde_json::Value>,
) -> crate::Result<()> {
    conn.prepare_cached(
        "INSERT INTO graph_edges
            (id, source_id, target_id, type, weight, metadata, project_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(source_id, target_id, type)
         DO UPDATE SET weight = MAX(weight, excluded.weight)",
    )?
    .execute(params![
        new_id(),
        source_id,
        target_id,
        edge_type.to_string(),
        weight.clamp(0.0, 1.0),
        serde_json::to_string(metadata)?,
        project_hash,
        now_iso(),
    ])?;
    Ok(())
}
