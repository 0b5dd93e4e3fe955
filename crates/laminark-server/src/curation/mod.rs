// crates/laminark-server/src/curation/mod.rs
// Periodic maintenance cycle: merge, dedupe, enforce degree, flag staleness, prune
//
// Each step is isolated; a failing step lands in the report and the cycle
// continues. Running the cycle twice over unchanged data reports all zeros.

mod degree;
mod dedupe;
mod merge;
mod prune;
mod staleness;

use crate::db::{Database, GraphStore, ObservationStore, StalenessStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Default curation cadence
pub const CURATION_INTERVAL: Duration = Duration::from_secs(300);

/// Outcome of one curation cycle
#[derive(Debug, Default, Clone)]
pub struct CurationReport {
    pub observations_merged: usize,
    pub entities_deduped: usize,
    pub edges_pruned: usize,
    pub staleness_flagged: usize,
    pub low_value_pruned: usize,
    pub errors: Vec<String>,
}

impl CurationReport {
    pub fn is_empty(&self) -> bool {
        self.observations_merged == 0
            && self.entities_deduped == 0
            && self.edges_pruned == 0
            && self.staleness_flagged == 0
            && self.low_value_pruned == 0
    }
}

pub struct CurationAgent {
    db: Arc<Database>,
    project_hash: String,
    observations: ObservationStore,
    graph: GraphStore,
    staleness: StalenessStore,
}

impl CurationAgent {
    pub fn new(db: Arc<Database>, project_hash: impl Into<String>) -> Self {
        let project_hash = project_hash.into();
        Self {
            observations: ObservationStore::new(db.clone(), project_hash.clone()),
            graph: GraphStore::new(db.clone(), project_hash.clone()),
            staleness: StalenessStore::new(db.clone(), project_hash.clone()),
            db,
            project_hash,
        }
    }

    /// Run the five-step cycle once.
    pub fn run_cycle(&self) -> CurationReport {
        let mut report = CurationReport::default();

        match merge::merge_similar_observations(&self.graph, &self.observations) {
            Ok(n) => report.observations_merged = n,
            Err(e) => report.errors.push(format!("merge: {e}")),
        }
        match dedupe::dedupe_entities(&self.graph) {
            Ok(n) => report.entities_deduped = n,
            Err(e) => report.errors.push(format!("dedupe: {e}")),
        }
        match degree::enforce_degree_caps(&self.graph) {
            Ok(n) => report.edges_pruned = n,
            Err(e) => report.errors.push(format!("degree: {e}")),
        }
        match staleness::flag_contradicted_observations(
            &self.graph,
            &self.observations,
            &self.staleness,
        ) {
            Ok(n) => report.staleness_flagged = n,
            Err(e) => report.errors.push(format!("staleness: {e}")),
        }
        match prune::prune_low_value(&self.db, &self.project_hash) {
            Ok(n) => report.low_value_pruned = n,
            Err(e) => report.errors.push(format!("prune: {e}")),
        }

        if !report.is_empty() || !report.errors.is_empty() {
            tracing::info!(
                "Curation: merged={} deduped={} edges_pruned={} flagged={} pruned={} errors={}",
                report.observations_merged,
                report.entities_deduped,
                report.edges_pruned,
                report.staleness_flagged,
                report.low_value_pruned,
                report.errors.len()
            );
        }
        report
    }

    /// Periodic loop.
    pub async fn run(self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Curation agent started ({}s cycle)", interval.as_secs());
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() {
                break;
            }
            let _ = self.run_cycle();
        }
        tracing::info!("Curation agent stopped");
    }
}

/// Spawn the curation loop; the returned sender stops it.
pub fn spawn(agent: CurationAgent, interval: Duration) -> watch::Sender<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        agent.run(interval, shutdown_rx).await;
    });
    shutdown_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateObservation, NodeType};

    #[test]
    fn cycle_is_idempotent() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let observations = ObservationStore::new(db.clone(), "testhash00000000");
        let graph = GraphStore::new(db.clone(), "testhash00000000");

        // Three identical observations linked to one entity (Jaccard = 1.0)
        let mut ids = Vec::new();
        for _ in 0..3 {
            let obs = observations
                .create(CreateObservation {
                    content: "the cache invalidation misses trailing slashes",
                    source: "hook:Write",
                    kind: "finding",
                    ..Default::default()
                })
                .unwrap();
            ids.push(obs.id);
        }
        graph
            .upsert_node(NodeType::Problem, "cache invalidation", serde_json::Map::new(), &ids)
            .unwrap();

        let agent = CurationAgent::new(db, "testhash00000000");
        let first = agent.run_cycle();
        assert!(first.observations_merged >= 2, "report: {first:?}");
        assert!(first.errors.is_empty());

        let second = agent.run_cycle();
        assert!(second.is_empty(), "second cycle must be a no-op: {second:?}");
        assert!(second.errors.is_empty());
    }
}
