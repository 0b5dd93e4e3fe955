//! crates/laminark-server/src/utils.rs
//! Shared utility functions used across the codebase

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Truncate a string to max length with ellipsis.
///
/// If the string is longer than `max_len`, it will be truncated at a char
/// boundary and "..." will be appended.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

/// Generate a 16-byte random identifier as a 32-char lowercase hex string.
pub fn new_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Current time as an ISO-8601 UTC string with second precision.
pub fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Compute the project hash for a project directory: the first 16 hex chars
/// of SHA-256 over the realpath-canonicalized absolute path.
///
/// Canonicalization falls back to the raw path when the directory does not
/// exist (hooks can fire for paths that were just removed).
pub fn project_hash(project_dir: &Path) -> String {
    let canonical = std::fs::canonicalize(project_dir)
        .unwrap_or_else(|_| project_dir.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<String>()[..16]
        .to_string()
}

/// Estimate token count for a response budget (~4 chars per token).
pub fn estimate_tokens(text: &str) -> usize {
    text.len().div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_short_string() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn test_truncate_exact_length() {
        assert_eq!(truncate("hello", 5), "hello");
    }

    #[test]
    fn test_truncate_long_string() {
        assert_eq!(truncate("hello world", 5), "hello...");
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        // "héllo" has a 2-byte char at index 1; truncating at 2 must not split it
        assert_eq!(truncate("héllo", 2), "h...");
    }

    #[test]
    fn test_new_id_shape() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_new_id_unique() {
        assert_ne!(new_id(), new_id());
    }

    #[test]
    fn test_project_hash_is_16_hex() {
        let hash = project_hash(Path::new("/tmp"));
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_project_hash_stable() {
        let a = project_hash(Path::new("/tmp"));
        let b = project_hash(Path::new("/tmp"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }
}
