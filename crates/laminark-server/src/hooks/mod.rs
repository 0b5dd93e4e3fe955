// crates/laminark-server/src/hooks/mod.rs
// Claude Code hook handlers
//
// Hooks are short-lived processes: read one JSON payload from stdin, write
// into the shared database, emit `{}` on stdout. They must never exit
// non-zero -- the caller treats that as a broken hook.

pub mod post_tool;
pub mod session;

use anyhow::{Context, Result};
use std::io::Read;
use std::path::PathBuf;

/// Read the hook payload from stdin.
pub fn read_hook_input() -> Result<serde_json::Value> {
    let mut buffer = String::new();
    std::io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read hook input from stdin")?;
    if buffer.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    serde_json::from_str(&buffer).context("Failed to parse hook input JSON")
}

/// Write the hook response to stdout.
pub fn write_hook_output(value: &serde_json::Value) {
    use std::io::Write;
    let _ = writeln!(std::io::stdout(), "{value}");
}

/// Resolve the project directory for this hook invocation: the payload's cwd
/// when present, otherwise the process cwd.
pub fn resolve_project_dir(input: &serde_json::Value) -> PathBuf {
    input
        .get("cwd")
        .and_then(|v| v.as_str())
        .map(PathBuf::from)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Shared typed view of the common hook fields.
#[derive(Debug)]
pub struct HookInput {
    pub session_id: Option<String>,
    pub tool_name: String,
    pub file_path: Option<String>,
    pub command: Option<String>,
    pub pattern: Option<String>,
    pub url: Option<String>,
}

impl HookInput {
    pub fn from_json(json: &serde_json::Value) -> Self {
        let tool_input = json.get("tool_input");
        let get_str = |value: Option<&serde_json::Value>, key: &str| {
            value
                .and_then(|v| v.get(key))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
        };
        Self {
            session_id: json
                .get("session_id")
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string()),
            tool_name: json
                .get("tool_name")
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string(),
            file_path: get_str(tool_input, "file_path"),
            command: get_str(tool_input, "command"),
            pattern: get_str(tool_input, "pattern"),
            url: get_str(tool_input, "url"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_input_extracts_nested_fields() {
        let json = serde_json::json!({
            "session_id": "sess-1",
            "tool_name": "Edit",
            "tool_input": { "file_path": "src/lib.rs" },
            "cwd": "/work/project"
        });
        let input = HookInput::from_json(&json);
        assert_eq!(input.session_id.as_deref(), Some("sess-1"));
        assert_eq!(input.tool_name, "Edit");
        assert_eq!(input.file_path.as_deref(), Some("src/lib.rs"));
        assert_eq!(resolve_project_dir(&json), PathBuf::from("/work/project"));
    }

    #[test]
    fn missing_fields_default_safely() {
        let input = HookInput::from_json(&serde_json::json!({}));
        assert!(input.session_id.is_none());
        assert_eq!(input.tool_name, "");
        assert!(input.file_path.is_none());
    }

    #[test]
    fn empty_session_id_is_none() {
        let input = HookInput::from_json(&serde_json::json!({"session_id": ""}));
        assert!(input.session_id.is_none());
    }
}
