// crates/laminark-server/src/pipeline/relationships.rs
// Relationship detection over co-occurring entities in one observation
//
// Type selection order: context-signal regexes in specificity order, then the
// fixed type-pair default table, otherwise the pair is skipped -- there is no
// weak catch-all relation.

use super::classifier::CandidateEntity;
use crate::db::{EdgeType, NodeType};
use regex::Regex;
use std::sync::LazyLock;

/// Default minimum confidence to persist an edge
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.45;

/// Context window radius around each entity pair
const CONTEXT_RADIUS: usize = 50;

/// Proximity bonus applies within this many characters
const PROXIMITY_CHARS: usize = 50;

/// A detected relationship between two entities (by name + type)
#[derive(Debug, Clone)]
pub struct DetectedRelationship {
    pub source: CandidateEntity,
    pub target: CandidateEntity,
    pub edge_type: EdgeType,
    pub confidence: f64,
}

static MODIFIES_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(modif\w*|chang\w*|updat\w*|edit\w*|refactor\w*|rewrote|rewrit\w*)\b")
        .expect("modifies regex")
});
static INFORMED_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(based on|according to|following|informed by|per the|guided by)\b")
        .expect("informed_by regex")
});
static VERIFIED_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(verif\w*|test(ed|s|ing)?|confirm\w*|validat\w*|checked)\b")
        .expect("verified_by regex")
});
static CAUSED_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(caus\w*|because of|due to|led to|triggered|broke|introduc\w*)\b")
        .expect("caused_by regex")
});
static SOLVED_BY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(solv\w*|fix(ed|es|ing)?|resolv\w*|address\w*|workaround)\b")
        .expect("solved_by regex")
});

/// Context-signal regexes in specificity order; first match wins.
fn signal_edge_type(context: &str) -> Option<EdgeType> {
    if MODIFIES_RE.is_match(context) {
        Some(EdgeType::Modifies)
    } else if INFORMED_BY_RE.is_match(context) {
        Some(EdgeType::InformedBy)
    } else if VERIFIED_BY_RE.is_match(context) {
        Some(EdgeType::VerifiedBy)
    } else if CAUSED_BY_RE.is_match(context) {
        Some(EdgeType::CausedBy)
    } else if SOLVED_BY_RE.is_match(context) {
        Some(EdgeType::SolvedBy)
    } else {
        None
    }
}

/// Fixed defaults for ordered type pairs without a context signal.
fn pair_default(source: NodeType, target: NodeType) -> Option<EdgeType> {
    match (source, target) {
        (NodeType::Problem, NodeType::Solution) => Some(EdgeType::SolvedBy),
        (NodeType::File, NodeType::Reference) | (NodeType::Reference, NodeType::File) => {
            Some(EdgeType::References)
        }
        (NodeType::Decision, NodeType::File) => Some(EdgeType::Modifies),
        (NodeType::Decision, NodeType::Reference) => Some(EdgeType::InformedBy),
        (NodeType::Problem, NodeType::File) => Some(EdgeType::CausedBy),
        _ => None,
    }
}

/// True when a sentence boundary lies between the two positions.
fn sentence_boundary_between(text: &str, start: usize, end: usize) -> bool {
    text[start..end].contains(['.', '!', '?', '\n'])
}

/// Detect relationships among the surviving entities of one observation.
pub fn detect(
    content: &str,
    entities: &[CandidateEntity],
    min_confidence: f64,
) -> Vec<DetectedRelationship> {
    let positions: Vec<Option<usize>> = entities
        .iter()
        .map(|e| content.find(e.name.as_str()))
        .collect();

    let mut detected = Vec::new();
    for (i, source) in entities.iter().enumerate() {
        for (j, target) in entities.iter().enumerate() {
            if i == j {
                continue;
            }
            let (Some(pos_a), Some(pos_b)) = (positions[i], positions[j]) else {
                continue;
            };

            let earlier = if pos_a <= pos_b { i } else { j };
            let span_start = pos_a.min(pos_b);
            let later_start = pos_a.max(pos_b);
            let earlier_end = (span_start + entities[earlier].name.len()).min(later_start);
            let span_end =
                (later_start + entities[if earlier == i { j } else { i }].name.len())
                    .min(content.len());
            let window_start = span_start.saturating_sub(CONTEXT_RADIUS);
            let window_end = (span_end + CONTEXT_RADIUS).min(content.len());
            let context = safe_slice(content, window_start, window_end);

            let edge_type = match signal_edge_type(context) {
                Some(t) => t,
                None => match pair_default(source.entity_type, target.entity_type) {
                    Some(t) => t,
                    None => continue,
                },
            };

            let mut confidence: f64 = 0.5;
            let gap = pos_a.abs_diff(pos_b);
            if gap <= PROXIMITY_CHARS {
                confidence += 0.1;
            }
            // Boundary check covers the text strictly between the two
            // mentions so dots inside file names do not count
            if !sentence_boundary_between(content, earlier_end, later_start) {
                confidence += 0.15;
            }
            let confidence = confidence.min(1.0);

            if confidence > min_confidence {
                detected.push(DetectedRelationship {
                    source: source.clone(),
                    target: target.clone(),
                    edge_type,
                    confidence,
                });
            }
        }
    }
    detected
}

/// Slice on char boundaries, widening outward as needed.
fn safe_slice(text: &str, mut start: usize, mut end: usize) -> &str {
    while start > 0 && !text.is_char_boundary(start) {
        start -= 1;
    }
    while end < text.len() && !text.is_char_boundary(end) {
        end += 1;
    }
    &text[start..end]
}
