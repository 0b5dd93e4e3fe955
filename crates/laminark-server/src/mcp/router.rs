// crates/laminark-server/src/mcp/router.rs
// MCP tool router -- #[tool] annotated methods

use super::LaminarkServer;
use super::requests::*;
use super::tools;

use rmcp::{
    ErrorData,
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content},
    tool, tool_router,
};

fn tool_result(result: Result<String, String>) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(text) => Ok(CallToolResult::success(vec![Content::text(text)])),
        Err(e) => Ok(CallToolResult::error(vec![Content::text(e)])),
    }
}

#[tool_router]
impl LaminarkServer {
    #[tool(
        description = "Save a memory for this project. Auto-titles from the first sentence; duplicate content within the session is suppressed."
    )]
    async fn save_memory(
        &self,
        Parameters(req): Parameters<SaveMemoryRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(tools::save_memory(self, req.text, req.title, req.source).await)
    }

    #[tool(
        description = "Recall observations by query (hybrid keyword + vector search), id, ids, or title. Actions: view (default), purge (soft-delete), restore. Detail: compact, timeline, full."
    )]
    async fn recall(
        &self,
        Parameters(req): Parameters<RecallRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(tools::recall(self, req).await)
    }

    #[tool(
        description = "List recent context stashes (frozen topic snapshots created on topic shift), optionally filtered by label or summary."
    )]
    async fn topic_context(
        &self,
        Parameters(req): Parameters<TopicContextRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(tools::topic_context(self, req.query, req.limit).await)
    }

    #[tool(
        description = "Query the knowledge graph: look up an entity by name and traverse its relationships (depth <= 4), returning linked nodes, edges, and recent observations."
    )]
    async fn query_graph(
        &self,
        Parameters(req): Parameters<QueryGraphRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(tools::query_graph(self, req).await)
    }

    #[tool(
        description = "Knowledge-graph statistics: totals, per-type counts, degree distribution, hotspots, duplicate candidates, staleness flags."
    )]
    async fn graph_stats(
        &self,
        Parameters(_req): Parameters<GraphStatsRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(tools::graph_stats(self).await)
    }

    #[tool(
        description = "Engine status: project identity, search capabilities, storage counts, estimated stored tokens, uptime."
    )]
    async fn status(
        &self,
        Parameters(_req): Parameters<StatusRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        tool_result(tools::status(self).await)
    }
}

impl LaminarkServer {
    /// Expose the macro-generated tool_router() to the parent module constructor.
    pub(super) fn create_tool_router() -> ToolRouter<Self> {
        Self::tool_router()
    }
}
