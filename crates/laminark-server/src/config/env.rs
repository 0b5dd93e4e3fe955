// crates/laminark-server/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use tracing::info;

/// Runtime configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Ollama host for local embeddings (OLLAMA_HOST)
    pub ollama_host: Option<String>,
    /// Embedding model override (LAMINARK_EMBEDDING_MODEL)
    pub embedding_model: Option<String>,
    /// Disable embeddings entirely (LAMINARK_DISABLE_EMBEDDINGS)
    pub disable_embeddings: bool,
}

impl EnvConfig {
    /// Load from environment variables (single source of truth)
    pub fn from_env() -> Self {
        let disable_embeddings =
            parse_bool_env("LAMINARK_DISABLE_EMBEDDINGS").unwrap_or(false);
        if disable_embeddings {
            info!("LAMINARK_DISABLE_EMBEDDINGS is set -- running keyword-only");
        }
        Self {
            ollama_host: read_var("OLLAMA_HOST"),
            embedding_model: read_var("LAMINARK_EMBEDDING_MODEL"),
            disable_embeddings,
        }
    }
}

/// Read a single env var, filtering empty values
fn read_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a boolean env var: "1", "true", "yes" (case-insensitive) are true.
pub fn parse_bool_env(name: &str) -> Option<bool> {
    std::env::var(name).ok().map(|v| {
        matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes")
    })
}
