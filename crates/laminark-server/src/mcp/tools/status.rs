// crates/laminark-server/src/mcp/tools/status.rs
// status: project identity, capabilities, counts, token estimate, uptime

use crate::db::graph::GraphStore;
use crate::db::observations::ObservationStore;
use crate::db::{SessionStore, StashStore};
use crate::mcp::LaminarkServer;

pub async fn status(server: &LaminarkServer) -> Result<String, String> {
    let observations = ObservationStore::new(server.db.clone(), server.project_hash.clone());
    let graph = GraphStore::new(server.db.clone(), server.project_hash.clone());
    let stashes = StashStore::new(server.db.clone(), server.project_hash.clone());
    let sessions = SessionStore::new(server.db.clone(), server.project_hash.clone());

    let (live, deleted) = observations.counts().map_err(|e| e.to_string())?;
    let content_chars = observations.total_content_chars().map_err(|e| e.to_string())?;
    let graph_stats = graph.stats().map_err(|e| e.to_string())?;
    let stash_count = stashes.count().map_err(|e| e.to_string())?;
    let current_session = sessions.current().map_err(|e| e.to_string())?;

    let uptime = server.started_at.elapsed();
    let estimated_tokens = (content_chars as usize).div_ceil(4);

    let body = format!(
        "Project: {} ({})\n\
         Search: {}{}\n\
         Vector store: {}\n\
         Session: {}\n\
         Observations: {} live, {} purged (~{} tokens stored)\n\
         Graph: {} nodes, {} edges\n\
         Stashes: {}\n\
         Uptime: {}s\n",
        server.project_path,
        server.project_hash,
        server.worker.engine_name(),
        if server.worker.is_ready() {
            format!(" ({} dims)", server.worker.dimensions())
        } else {
            String::new()
        },
        if server.db.has_vector_support() { "available" } else { "unavailable" },
        current_session.map(|s| s.id).unwrap_or_else(|| "none".to_string()),
        live,
        deleted,
        estimated_tokens,
        graph_stats.node_count,
        graph_stats.edge_count,
        stash_count,
        uptime.as_secs()
    );

    Ok(server.with_notifications(body))
}
