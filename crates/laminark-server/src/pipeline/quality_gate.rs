// crates/laminark-server/src/pipeline/quality_gate.rs
// Fixed entity quality gate between the classifier and the graph
//
// The classifier proposes; this gate disposes. Its rules are deterministic:
// the pass/reject partition depends only on the input entities and the
// observation kind.

use super::classifier::CandidateEntity;
use crate::db::NodeType;

/// Confidence multiplier for File entities outside change/write observations
const NON_CHANGE_FILE_DAMPING: f64 = 0.74;

/// Name length bounds
const MIN_NAME_LEN: usize = 3;
const MAX_NAME_LEN: usize = 200;

/// Max File entities kept per observation
const MAX_FILES_PER_OBSERVATION: usize = 5;

/// Names starting with these (case-insensitive) are too vague to be entities
const VAGUE_PREFIXES: [&str; 17] = [
    "the ", "this ", "that ", "it ", "some ", "a ", "an ", "here ", "there ", "now ", "just ",
    "ok ", "yes ", "no ", "maybe ", "done ", "tmp ",
];

/// Minimum confidence per entity type
fn min_confidence(entity_type: NodeType) -> f64 {
    match entity_type {
        NodeType::File => 0.95,
        NodeType::Project => 0.80,
        NodeType::Reference => 0.85,
        NodeType::Decision => 0.65,
        NodeType::Problem => 0.60,
        NodeType::Solution => 0.60,
    }
}

/// Run the gate over the classifier's candidates.
pub fn apply(observation_kind: &str, candidates: Vec<CandidateEntity>) -> Vec<CandidateEntity> {
    let is_change_kind = matches!(observation_kind, "change" | "write");

    let mut survivors: Vec<CandidateEntity> = candidates
        .into_iter()
        .map(|mut entity| {
            // Context-aware damping: a file mentioned outside a change is weak
            // evidence unless its confidence was very high to begin with
            if entity.entity_type == NodeType::File && !is_change_kind {
                entity.confidence *= NON_CHANGE_FILE_DAMPING;
            }
            entity
        })
        .filter(|entity| {
            let len = entity.name.chars().count();
            (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len)
        })
        .filter(|entity| {
            let lower = entity.name.to_lowercase();
            !VAGUE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
        })
        .filter(|entity| entity.confidence >= min_confidence(entity.entity_type))
        .collect();

    // Cap File entities, keeping the highest confidences
    let file_count = survivors
        .iter()
        .filter(|e| e.entity_type == NodeType::File)
        .count();
    if file_count > MAX_FILES_PER_OBSERVATION {
        let mut files: Vec<CandidateEntity> = survivors
            .iter()
            .filter(|e| e.entity_type == NodeType::File)
            .cloned()
            .collect();
        files.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.name.cmp(&b.name))
        });
        let kept: std::collections::HashSet<String> = files
            .into_iter()
            .take(MAX_FILES_PER_OBSERVATION)
            .map(|e| e.name)
            .collect();
        survivors.retain(|e| e.entity_type != NodeType::File || kept.contains(&e.name));
    }

    survivors
}
