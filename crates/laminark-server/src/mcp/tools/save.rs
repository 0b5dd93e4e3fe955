// crates/laminark-server/src/mcp/tools/save.rs
// save_memory: explicit observation capture with duplicate suppression

use crate::db::observations::{CreateObservation, ObservationStore};
use crate::mcp::LaminarkServer;
use crate::similarity::jaccard_words;
use crate::utils::truncate;

/// Input cap for explicit saves (hooks may store more)
const MAX_SAVE_CHARS: usize = 10_000;

/// Auto-title bounds
const TITLE_SENTENCE_MAX: usize = 100;
const TITLE_FALLBACK_CHARS: usize = 80;

/// Duplicate suppression threshold within the session
const DUPLICATE_JACCARD: f64 = 0.85;

/// Recent rows checked for duplicates
const DUPLICATE_LOOKBACK: usize = 20;

/// Derive a title: the first sentence when it fits in 100 chars, otherwise
/// the first 80 chars with an ellipsis.
pub fn auto_title(text: &str) -> String {
    let first_sentence = text
        .split_inclusive(['.', '!', '?', '\n'])
        .next()
        .unwrap_or(text)
        .trim();
    if !first_sentence.is_empty() && first_sentence.chars().count() <= TITLE_SENTENCE_MAX {
        return first_sentence.trim_end_matches('\n').to_string();
    }
    let prefix: String = text.chars().take(TITLE_FALLBACK_CHARS).collect();
    format!("{}…", prefix.trim_end())
}

pub async fn save_memory(
    server: &LaminarkServer,
    text: String,
    title: Option<String>,
    source: Option<String>,
) -> Result<String, String> {
    if text.trim().is_empty() {
        return Err("text must not be empty".to_string());
    }
    if text.chars().count() > MAX_SAVE_CHARS {
        return Err(format!("text exceeds {MAX_SAVE_CHARS} chars"));
    }

    let session_id = server.get_or_create_session().await;
    let store = ObservationStore::new(server.db.clone(), server.project_hash.clone());

    // Duplicate suppression within the session (Jaccard fallback path; an
    // embedded comparison would need the vector before the row exists)
    let recent = store
        .recent_in_session(&session_id, DUPLICATE_LOOKBACK)
        .map_err(|e| e.to_string())?;
    for existing in &recent {
        if jaccard_words(&existing.content, &text) >= DUPLICATE_JACCARD {
            return Ok(server.with_notifications(format!(
                "save: false, reason: duplicate (matches {} \"{}\")",
                existing.id,
                truncate(&existing.content, 60)
            )));
        }
    }

    let title = title.unwrap_or_else(|| auto_title(&text));
    let source = source.unwrap_or_else(|| "mcp:save_memory".to_string());
    let observation = store
        .create(CreateObservation {
            content: &text,
            title: Some(&title),
            source: &source,
            kind: "finding",
            session_id: Some(&session_id),
            embedding: None,
        })
        .map_err(|e| e.to_string())?;

    Ok(server.with_notifications(format!(
        "Saved observation {} (\"{}\")",
        observation.id,
        truncate(&title, 80)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_title_uses_first_sentence_when_short() {
        assert_eq!(auto_title("Use pnpm. It is faster."), "Use pnpm.");
        assert_eq!(auto_title("one line\nsecond line"), "one line");
    }

    #[test]
    fn auto_title_falls_back_to_prefix_for_long_sentences() {
        let long = "a".repeat(150);
        let title = auto_title(&long);
        assert!(title.ends_with('…'));
        assert_eq!(title.chars().count(), TITLE_FALLBACK_CHARS + 1);
    }

    #[test]
    fn auto_title_boundary_at_100() {
        let sentence = format!("{}.", "b".repeat(99));
        assert_eq!(auto_title(&sentence), sentence);
        let over = format!("{}.", "b".repeat(100));
        assert!(auto_title(&over).ends_with('…'));
    }
}
