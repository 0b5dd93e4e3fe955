// crates/laminark-server/src/mcp/mod.rs
// MCP server state and shared helpers

pub mod handler;
pub mod requests;
mod router;
pub mod tools;

use crate::db::{Database, NotificationStore, SessionStore};
use crate::embeddings::EmbeddingHandle;
use rmcp::handler::server::router::tool::ToolRouter;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

/// MCP server state, scoped to one project.
#[derive(Clone)]
pub struct LaminarkServer {
    pub db: Arc<Database>,
    pub project_hash: String,
    pub project_path: String,
    pub worker: EmbeddingHandle,
    /// Current session ID (created on first tool call or by the session hook)
    pub session_id: Arc<RwLock<Option<String>>>,
    pub started_at: Instant,
    tool_router: ToolRouter<Self>,
}

impl LaminarkServer {
    pub fn new(
        db: Arc<Database>,
        project_hash: impl Into<String>,
        project_path: impl Into<String>,
        worker: EmbeddingHandle,
    ) -> Self {
        Self {
            db,
            project_hash: project_hash.into(),
            project_path: project_path.into(),
            worker,
            session_id: Arc::new(RwLock::new(None)),
            started_at: Instant::now(),
            tool_router: Self::create_tool_router(),
        }
    }

    /// Get or create the current session ID.
    pub async fn get_or_create_session(&self) -> String {
        let mut guard = self.session_id.write().await;
        if let Some(ref id) = *guard {
            return id.clone();
        }
        let sessions = SessionStore::new(self.db.clone(), self.project_hash.clone());
        let id = match sessions.current() {
            Ok(Some(session)) => session.id,
            _ => match sessions.start(None) {
                Ok(session) => session.id,
                Err(e) => {
                    tracing::warn!("Failed to start session: {}", e);
                    crate::utils::new_id()
                }
            },
        };
        *guard = Some(id.clone());
        id
    }

    /// Prepend any pending notifications (consumed on read) to a response body.
    pub fn with_notifications(&self, body: String) -> String {
        let notifications = NotificationStore::new(self.db.clone(), self.project_hash.clone());
        match notifications.consume() {
            Ok(messages) if !messages.is_empty() => {
                let mut out = String::new();
                for message in messages {
                    out.push_str(&format!("[Laminark] {message}\n"));
                }
                out.push('\n');
                out.push_str(&body);
                out
            }
            Ok(_) => body,
            Err(e) => {
                tracing::debug!("Notification consume failed: {}", e);
                body
            }
        }
    }
}
