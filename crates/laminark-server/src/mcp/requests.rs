// crates/laminark-server/src/mcp/requests.rs
// MCP tool request types

use rmcp::schemars;
use serde::Deserialize;

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct SaveMemoryRequest {
    #[schemars(description = "Content to remember (max 10000 chars)")]
    pub text: String,
    #[schemars(description = "Optional title; auto-generated from the first sentence when omitted")]
    pub title: Option<String>,
    #[schemars(description = "Origin marker, e.g. mcp:save_memory or slash:remember")]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct RecallRequest {
    #[schemars(description = "Free-text search query (hybrid keyword + vector)")]
    pub query: Option<String>,
    #[schemars(description = "Observation id")]
    pub id: Option<String>,
    #[schemars(description = "Multiple observation ids")]
    pub ids: Option<Vec<String>>,
    #[schemars(description = "Title substring (case-sensitive)")]
    pub title: Option<String>,
    #[schemars(description = "Action: view (default), purge, restore")]
    pub action: Option<String>,
    #[schemars(description = "Detail level: compact (default), timeline, full")]
    pub detail: Option<String>,
    #[schemars(description = "Max results (<= 50)")]
    pub limit: Option<usize>,
    #[schemars(description = "Include soft-deleted observations")]
    pub include_purged: Option<bool>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct TopicContextRequest {
    #[schemars(description = "Filter stashes by label/summary substring")]
    pub query: Option<String>,
    #[schemars(description = "Max stashes (<= 20)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct QueryGraphRequest {
    #[schemars(description = "Entity name to look up (exact first, then substring)")]
    pub query: String,
    #[schemars(description = "Entity type filter: Project, File, Decision, Problem, Solution, Reference")]
    pub entity_type: Option<String>,
    #[schemars(description = "Traversal depth (<= 4)")]
    pub depth: Option<usize>,
    #[schemars(description = "Relationship types to follow, e.g. solved_by, modifies")]
    pub relationship_types: Option<Vec<String>>,
    #[schemars(description = "Max nodes (<= 50)")]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct GraphStatsRequest {}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct StatusRequest {}
