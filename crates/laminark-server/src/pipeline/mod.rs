// crates/laminark-server/src/pipeline/mod.rs
// Background enrichment: embed -> shift-detect -> classify -> extract -> path-signal
//
// Each per-observation step is individually wrapped; a failure logs and moves
// on. Nothing in here ever surfaces to the user except through notifications.

pub mod classifier;
pub mod debug_flow;
pub mod quality_gate;
pub mod relationships;
pub mod topic_shift;

pub use classifier::{CandidateEntity, Classification, Classifier, DebugSignal, HeuristicClassifier};
pub use debug_flow::{DebugFlow, FlowEvent};
pub use topic_shift::{AdaptiveThreshold, ShiftDetection, TopicShiftDetector};

use crate::config::TopicDetectionConfig;
use crate::config::file::DebugFlowConfig;
use crate::db::{
    Database, GraphStore, NotificationStore, Observation, ObservationStore, ResearchBufferStore,
    SessionStore, StashStore, ThresholdStore,
};
use crate::db::stashes::ObservationSnapshot;
use crate::db::thresholds::ShiftDecisionRecord;
use crate::embeddings::{EMBEDDING_VERSION, EmbeddingHandle};
use crate::utils::truncate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Enrichment cadence
const ENRICH_INTERVAL: Duration = Duration::from_secs(5);

/// Observations processed per cycle
const BATCH_SIZE: usize = 10;

/// Classifier deadline per observation
const CLASSIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Observations snapshotted into a stash on topic shift
const STASH_THREAD_LEN: usize = 20;

/// Stash label / summary caps
const LABEL_CHARS: usize = 50;
const SUMMARY_CHARS: usize = 200;

pub struct EnrichmentPipeline {
    worker: EmbeddingHandle,
    classifier: Arc<dyn Classifier>,
    detector: TopicShiftDetector,
    flow: DebugFlow,
    observations: ObservationStore,
    stashes: StashStore,
    thresholds: ThresholdStore,
    notifications: NotificationStore,
    graph: GraphStore,
    sessions: SessionStore,
    research: ResearchBufferStore,
}

impl EnrichmentPipeline {
    pub fn new(
        db: Arc<Database>,
        project_hash: &str,
        worker: EmbeddingHandle,
        classifier: Arc<dyn Classifier>,
        topic_config: &TopicDetectionConfig,
        debug_config: DebugFlowConfig,
    ) -> crate::Result<Self> {
        let thresholds = ThresholdStore::new(db.clone(), project_hash);
        let mut detector = TopicShiftDetector::new(topic_config);
        if let Some((mean, variance)) = thresholds.seed()? {
            detector.seed(mean, variance);
        }
        let flow = DebugFlow::recover(
            crate::db::DebugPathStore::new(db.clone(), project_hash),
            debug_config,
        )?;

        Ok(Self {
            worker,
            classifier,
            detector,
            flow,
            observations: ObservationStore::new(db.clone(), project_hash),
            stashes: StashStore::new(db.clone(), project_hash),
            thresholds,
            notifications: NotificationStore::new(db.clone(), project_hash),
            graph: GraphStore::new(db.clone(), project_hash),
            sessions: SessionStore::new(db.clone(), project_hash),
            research: ResearchBufferStore::new(db, project_hash),
        })
    }

    /// One enrichment cycle. Returns observations processed.
    pub async fn process_batch(&mut self) -> crate::Result<usize> {
        // With a live worker, drive on missing embeddings (covers fresh rows
        // and embed-failed retries). Keyword-only mode drives on missing
        // classifications so rows are still enriched exactly once.
        let batch = if self.worker.is_ready() {
            self.observations.find_unembedded(BATCH_SIZE)?
        } else {
            self.observations.list_unclassified(BATCH_SIZE)?
        };
        if batch.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = batch
            .iter()
            .map(|obs| match &obs.title {
                Some(title) => format!("{title}\n{}", obs.content),
                None => obs.content.clone(),
            })
            .collect();
        let embeddings = self.worker.embed_batch(texts).await;

        for (obs, embedding) in batch.iter().zip(embeddings.into_iter()) {
            self.enrich_one(obs, embedding).await;
        }
        Ok(batch.len())
    }

    /// All enrichment steps for one observation, individually wrapped.
    async fn enrich_one(&mut self, obs: &Observation, embedding: Option<Vec<f32>>) {
        if let Some(ref vector) = embedding {
            if let Err(e) = self.observations.set_embedding(
                &obs.id,
                vector,
                self.worker.engine_name(),
                EMBEDDING_VERSION,
            ) {
                tracing::warn!("Failed to store embedding for {}: {}", obs.id, e);
            }

            if let Err(e) = self.detect_shift(obs, vector) {
                tracing::warn!("Topic-shift step failed for {}: {}", obs.id, e);
            }
        }

        if obs.classification.is_none() {
            if let Err(e) = self.classify_and_extract(obs).await {
                tracing::warn!("Classification step failed for {}: {}", obs.id, e);
            }
        }
    }

    /// Topic-shift detection, stash creation, decision audit.
    fn detect_shift(&mut self, obs: &Observation, embedding: &[f32]) -> crate::Result<()> {
        let detection = self.detector.detect(embedding);

        let stash_id = if detection.shifted {
            match self.stash_previous_thread(obs) {
                Ok(id) => Some(id),
                Err(e) => {
                    tracing::warn!("Stash-on-shift failed for {}: {}", obs.id, e);
                    None
                }
            }
        } else {
            None
        };

        let (mean, variance, _) = self.detector.threshold().state();
        self.thresholds.record_decision(&ShiftDecisionRecord {
            observation_id: Some(obs.id.clone()),
            distance: detection.distance,
            threshold: detection.threshold,
            ewma_mean: Some(mean),
            ewma_variance: Some(variance),
            sensitivity: Some(self.detector.threshold().sensitivity()),
            shifted: detection.shifted,
            confidence: detection.confidence,
            stash_id,
        })?;
        Ok(())
    }

    /// Freeze the previous topic thread into a stash and queue a notification.
    fn stash_previous_thread(&self, current: &Observation) -> crate::Result<String> {
        let session_id = match &current.session_id {
            Some(id) => Some(id.clone()),
            None => self.sessions.current()?.map(|s| s.id),
        };

        let mut thread: Vec<Observation> = match &session_id {
            Some(sid) => self.observations.recent_in_session(sid, STASH_THREAD_LEN + 1)?,
            None => self.observations.list(&crate::db::ListOptions {
                limit: STASH_THREAD_LEN + 1,
                include_unclassified: true,
                ..Default::default()
            })?,
        };
        thread.retain(|o| o.id != current.id);
        thread.truncate(STASH_THREAD_LEN);
        // Newest-first from the store; chronological in the stash
        thread.reverse();

        let label = thread
            .last()
            .map(|o| truncate(&o.content, LABEL_CHARS))
            .unwrap_or_else(|| "earlier topic".to_string());
        let summary_src: Vec<&str> = thread
            .iter()
            .rev()
            .take(3)
            .map(|o| o.content.as_str())
            .collect();
        let summary = truncate(&summary_src.join(" / "), SUMMARY_CHARS);

        let snapshots: Vec<ObservationSnapshot> =
            thread.iter().map(ObservationSnapshot::from).collect();
        let stash = self.stashes.create(
            session_id.as_deref(),
            &label,
            Some(&summary),
            &snapshots,
        )?;

        self.notifications.push(&format!(
            "Topic shift detected -- stashed {} observations under \"{}\"",
            snapshots.len(),
            label
        ))?;
        tracing::info!("Created context stash {} ({} observations)", stash.id, snapshots.len());
        Ok(stash.id)
    }

    /// Classify, then extract entities and relationships into the graph and
    /// feed the debug-path machine.
    async fn classify_and_extract(&mut self, obs: &Observation) -> crate::Result<()> {
        let classification = match tokio::time::timeout(
            CLASSIFY_TIMEOUT,
            self.classifier.classify(obs.title.as_deref(), &obs.content),
        )
        .await
        {
            Ok(Ok(c)) => c,
            Ok(Err(e)) => {
                tracing::warn!("Classifier error for {}: {}", obs.id, e);
                return Ok(());
            }
            Err(_) => {
                tracing::warn!("Classifier deadline exceeded for {}", obs.id);
                return Ok(());
            }
        };

        if let Some(ref label) = classification.classification {
            self.observations.update_classification(&obs.id, label)?;
        }

        if let Err(e) = self.extract_graph(obs, &classification) {
            tracing::warn!("Graph extraction failed for {}: {}", obs.id, e);
        }

        match self.flow.handle(&classification.debug_signal, &obs.id, &obs.content) {
            Ok(Some(FlowEvent::PathResolved { path_id })) => {
                let _ = self
                    .notifications
                    .push(&format!("Debug path {} resolved", path_id));
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Debug-path step failed for {}: {}", obs.id, e),
        }
        Ok(())
    }

    /// Quality gate, node upserts, relationship detection, degree caps.
    fn extract_graph(
        &self,
        obs: &Observation,
        classification: &Classification,
    ) -> crate::Result<()> {
        let survivors = quality_gate::apply(&obs.kind, classification.entities.clone());
        if survivors.is_empty() {
            return Ok(());
        }

        let provenance = vec![obs.id.clone()];
        let mut node_ids: Vec<(CandidateEntity, String)> = Vec::new();
        for entity in &survivors {
            match self.graph.upsert_node(
                entity.entity_type,
                &entity.name,
                serde_json::Map::new(),
                &provenance,
            ) {
                Ok(node) => node_ids.push((entity.clone(), node.id)),
                Err(e) => tracing::warn!("Node upsert failed for '{}': {}", entity.name, e),
            }
        }

        let relationships = relationships::detect(
            &obs.content,
            &survivors,
            relationships::DEFAULT_MIN_CONFIDENCE,
        );
        let mut touched: Vec<String> = Vec::new();
        for rel in relationships {
            let source = node_ids
                .iter()
                .find(|(e, _)| e.name == rel.source.name && e.entity_type == rel.source.entity_type);
            let target = node_ids
                .iter()
                .find(|(e, _)| e.name == rel.target.name && e.entity_type == rel.target.entity_type);
            let (Some((_, source_id)), Some((_, target_id))) = (source, target) else {
                continue;
            };
            match self.graph.insert_edge(
                source_id,
                target_id,
                rel.edge_type,
                rel.confidence,
                serde_json::Map::new(),
            ) {
                Ok(true) => {
                    if !touched.contains(source_id) {
                        touched.push(source_id.clone());
                    }
                    if !touched.contains(target_id) {
                        touched.push(target_id.clone());
                    }
                }
                Ok(false) => {}
                Err(e) => tracing::warn!("Edge insert failed: {}", e),
            }
        }
        for node_id in touched {
            if let Err(e) = self.graph.enforce_degree_cap(&node_id) {
                tracing::warn!("Degree enforcement failed for {}: {}", node_id, e);
            }
        }
        Ok(())
    }

    /// Persist the detector's EWMA state for the next session's cold start.
    pub fn persist_threshold_state(&self, session_id: Option<&str>) -> crate::Result<()> {
        let (mean, variance, count) = self.detector.threshold().state();
        if count == 0 {
            return Ok(());
        }
        self.thresholds.persist(session_id, mean, variance, count)
    }

    /// Main loop: enrich every 5 s, flush the research buffer as we go.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Enrichment pipeline started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_batch().await {
                Ok(n) if n > 0 => tracing::debug!("Enriched {} observations", n),
                Ok(_) => {}
                Err(e) => tracing::warn!("Enrichment cycle error: {}", e),
            }
            if let Err(e) = self.research.flush_expired() {
                tracing::debug!("Research buffer flush failed: {}", e);
            }

            tokio::select! {
                _ = tokio::time::sleep(ENRICH_INTERVAL) => {}
                _ = shutdown.changed() => {}
            }
        }

        let session_id = self.sessions.current().ok().flatten().map(|s| s.id);
        if let Err(e) = self.persist_threshold_state(session_id.as_deref()) {
            tracing::debug!("Threshold persist on shutdown failed: {}", e);
        }
        tracing::info!("Enrichment pipeline stopped");
    }
}

/// Spawn the pipeline loop; the returned sender stops it.
pub fn spawn(pipeline: EnrichmentPipeline) -> watch::Sender<bool> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        pipeline.run(shutdown_rx).await;
    });
    shutdown_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CreateObservation;
    use async_trait::async_trait;

    struct FixedClassifier;

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(
            &self,
            _title: Option<&str>,
            content: &str,
        ) -> crate::Result<Classification> {
            Ok(Classification {
                classification: Some(if content.len() < 10 { "noise" } else { "signal" }.into()),
                debug_signal: DebugSignal::default(),
                entities: vec![],
            })
        }
    }

    fn pipeline(db: &Arc<Database>) -> EnrichmentPipeline {
        EnrichmentPipeline::new(
            db.clone(),
            "testhash00000000",
            EmbeddingHandle::keyword_only(),
            Arc::new(FixedClassifier),
            &TopicDetectionConfig::default(),
            DebugFlowConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn keyword_only_mode_still_classifies() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = ObservationStore::new(db.clone(), "testhash00000000");
        let obs = store
            .create(CreateObservation {
                content: "a useful observation about the build",
                source: "manual",
                kind: "finding",
                ..Default::default()
            })
            .unwrap();

        let mut pipeline = pipeline(&db);
        assert_eq!(pipeline.process_batch().await.unwrap(), 1);

        let enriched = store.get_by_id(&obs.id).unwrap().unwrap();
        assert_eq!(enriched.classification.as_deref(), Some("signal"));

        // Second cycle finds nothing left to do
        assert_eq!(pipeline.process_batch().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn batch_is_capped() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = ObservationStore::new(db.clone(), "testhash00000000");
        for i in 0..15 {
            store
                .create(CreateObservation {
                    content: &format!("observation number {i} with some length"),
                    source: "manual",
                    kind: "finding",
                    ..Default::default()
                })
                .unwrap();
        }
        let mut pipeline = pipeline(&db);
        assert_eq!(pipeline.process_batch().await.unwrap(), 10);
        assert_eq!(pipeline.process_batch().await.unwrap(), 5);
    }
}
