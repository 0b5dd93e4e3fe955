// crates/laminark-server/src/pipeline/classifier.rs
// Sentence classification: debug signals, entity candidates, noise detection
//
// The trait is the seam for an LLM-backed classifier; the heuristic
// implementation below is the in-tree default and keeps the pipeline fully
// functional offline.

use crate::db::{NodeType, WaypointType};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// Classifier verdict about debugging activity in one observation
#[derive(Debug, Clone, Default)]
pub struct DebugSignal {
    pub is_error: bool,
    pub is_resolution: bool,
    pub waypoint_hint: Option<WaypointType>,
    pub confidence: f64,
}

/// An entity candidate prior to the quality gate
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateEntity {
    pub name: String,
    pub entity_type: NodeType,
    pub confidence: f64,
}

/// Full classifier output for one observation
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// `noise` hides the row from default listings; other labels are advisory
    pub classification: Option<String>,
    pub debug_signal: DebugSignal,
    pub entities: Vec<CandidateEntity>,
}

/// A sentence-classification callable. Implementations must be cheap to call
/// concurrently; the pipeline enforces the deadline, not the implementation.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, title: Option<&str>, content: &str) -> crate::Result<Classification>;
}

static ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(error|exception|panic|traceback|failed|failure|crash(es|ed)?|cannot|can't|unable to|broken|segfault|stack trace|ENOENT|undefined is not)\b",
    )
    .expect("error regex")
});

static RESOLUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(fixed|resolved|solved|works now|working now|passing|all green|tests pass|succeeded|no longer fails)\b",
    )
    .expect("resolution regex")
});

static FILE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b[\w./-]*[\w-]+\.(rs|ts|tsx|js|jsx|py|go|java|rb|c|h|cpp|css|html|json|toml|yaml|yml|md|sql|sh)\b",
    )
    .expect("file path regex")
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)>\]]+").expect("url regex"));

static DECISION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:decided to|decision:|we will|going with|chose|switching to|use)\s+([A-Za-z][\w-][\w -]{1,59})")
        .expect("decision regex")
});

static PROBLEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:problem|bug|issue|error)\s*(?:with|in|:)\s+([A-Za-z][\w-][\w -]{1,59})")
        .expect("problem regex")
});

static SOLUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:fixed by|solved by|solution:|workaround:)\s+([A-Za-z][\w-][\w -]{1,59})")
        .expect("solution regex")
});

static FILLER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(ok(ay)?|yes|no|done|thanks?|sure|got it|nice|cool|hm+)\s*[.!?]*\s*$")
        .expect("filler regex")
});

/// Regex-driven classifier. Deterministic; no model calls.
#[derive(Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }

    fn debug_signal(content: &str) -> DebugSignal {
        let error_hits = ERROR_RE.find_iter(content).count();
        let resolution_hits = RESOLUTION_RE.find_iter(content).count();

        if error_hits == 0 && resolution_hits == 0 {
            return DebugSignal::default();
        }

        // Errors dominate: "fixed one error, hit another" is still an error
        let is_error = error_hits >= resolution_hits && error_hits > 0;
        let is_resolution = !is_error && resolution_hits > 0;
        let hits = error_hits.max(resolution_hits);
        let confidence = (0.5 + 0.2 * hits as f64).min(0.95);

        DebugSignal {
            is_error,
            is_resolution,
            waypoint_hint: if is_error {
                Some(WaypointType::Error)
            } else {
                Some(WaypointType::Resolution)
            },
            confidence,
        }
    }

    fn entities(content: &str) -> Vec<CandidateEntity> {
        let mut entities: Vec<CandidateEntity> = Vec::new();
        let mut push = |name: String, entity_type: NodeType, confidence: f64| {
            let name = name.trim().trim_end_matches(['.', ',', ';', ':']).to_string();
            if !entities
                .iter()
                .any(|e| e.entity_type == entity_type && e.name == name)
            {
                entities.push(CandidateEntity { name, entity_type, confidence });
            }
        };

        for m in FILE_PATH_RE.find_iter(content) {
            // Paths with directory structure are stronger evidence than bare names
            let confidence = if m.as_str().contains('/') { 0.97 } else { 0.95 };
            push(m.as_str().to_string(), NodeType::File, confidence);
        }
        for m in URL_RE.find_iter(content) {
            push(m.as_str().to_string(), NodeType::Reference, 0.9);
        }
        for caps in DECISION_RE.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                push(m.as_str().to_string(), NodeType::Decision, 0.7);
            }
        }
        for caps in PROBLEM_RE.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                push(m.as_str().to_string(), NodeType::Problem, 0.65);
            }
        }
        for caps in SOLUTION_RE.captures_iter(content) {
            if let Some(m) = caps.get(1) {
                push(m.as_str().to_string(), NodeType::Solution, 0.65);
            }
        }
        entities
    }

    fn label(content: &str, signal: &DebugSignal) -> String {
        if content.len() < 10 || FILLER_RE.is_match(content) {
            return "noise".to_string();
        }
        if signal.is_error || signal.is_resolution {
            return "debug".to_string();
        }
        "signal".to_string()
    }
}

#[async_trait]
impl Classifier for HeuristicClassifier {
    async fn classify(&self, title: Option<&str>, content: &str) -> crate::Result<Classification> {
        let text = match title {
            Some(t) => format!("{t}\n{content}"),
            None => content.to_string(),
        };
        let debug_signal = Self::debug_signal(&text);
        let entities = Self::entities(&text);
        let classification = Some(Self::label(content, &debug_signal));
        Ok(Classification { classification, debug_signal, entities })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(content: &str) -> Classification {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(HeuristicClassifier::new().classify(None, content))
            .unwrap()
    }

    #[test]
    fn error_text_produces_error_signal() {
        let c = classify("TypeError: cannot read properties of undefined in auth flow");
        assert!(c.debug_signal.is_error);
        assert!(!c.debug_signal.is_resolution);
        assert!(c.debug_signal.confidence >= 0.5);
        assert_eq!(c.debug_signal.waypoint_hint, Some(WaypointType::Error));
    }

    #[test]
    fn resolution_text_produces_resolution_signal() {
        let c = classify("tests pass after the retry change, all green");
        assert!(c.debug_signal.is_resolution);
        assert!(!c.debug_signal.is_error);
    }

    #[test]
    fn plain_text_has_no_signal() {
        let c = classify("reading through the session handling module for context");
        assert!(!c.debug_signal.is_error);
        assert!(!c.debug_signal.is_resolution);
        assert_eq!(c.debug_signal.confidence, 0.0);
    }

    #[test]
    fn filler_is_noise() {
        assert_eq!(classify("ok").classification.as_deref(), Some("noise"));
        assert_eq!(classify("done!").classification.as_deref(), Some("noise"));
        assert_ne!(
            classify("migrated the search module to FTS5 external content")
                .classification
                .as_deref(),
            Some("noise")
        );
    }

    #[test]
    fn extracts_file_paths_with_higher_confidence_for_dirs() {
        let c = classify("edited src/auth/jwt.rs and also config.toml today");
        let files: Vec<&CandidateEntity> = c
            .entities
            .iter()
            .filter(|e| e.entity_type == NodeType::File)
            .collect();
        assert_eq!(files.len(), 2);
        let pathy = files.iter().find(|e| e.name == "src/auth/jwt.rs").unwrap();
        let bare = files.iter().find(|e| e.name == "config.toml").unwrap();
        assert!(pathy.confidence > bare.confidence);
    }

    #[test]
    fn extracts_urls_as_references() {
        let c = classify("see https://docs.rs/rusqlite for the API");
        assert!(c
            .entities
            .iter()
            .any(|e| e.entity_type == NodeType::Reference
                && e.name.starts_with("https://docs.rs")));
    }

    #[test]
    fn extracts_decisions_and_problems() {
        let c = classify("decided to use sqlite-vec. problem with token refresh remains");
        assert!(c.entities.iter().any(|e| e.entity_type == NodeType::Decision));
        assert!(c.entities.iter().any(|e| e.entity_type == NodeType::Problem));
    }

    #[test]
    fn classification_is_deterministic() {
        let content = "error in src/db.rs, decided to use WAL mode";
        let a = classify(content);
        let b = classify(content);
        assert_eq!(a.entities, b.entities);
        assert_eq!(a.classification, b.classification);
    }
}
