// crates/laminark-server/src/embeddings/mod.rs
// Embedding worker: off-loop model host with a typed channel API
//
// Failures never propagate. Every error, timeout, or worker death resolves
// requests to None; an observation without an embedding stays searchable by
// keyword and a later background pass can embed it.

mod ollama;

pub use ollama::OllamaEngine;

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Vector width of the observation embedding tables
pub const EMBEDDING_DIMENSIONS: usize = 384;

/// Version stamped into observation embedding metadata
pub const EMBEDDING_VERSION: i64 = 1;

/// Engine name reported when no model is available
pub const KEYWORD_ONLY_ENGINE: &str = "keyword-only";

/// Worker startup budget
const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-request budget
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// An embedding model hosted by the worker
#[async_trait]
pub trait EmbeddingEngine: Send + Sync {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Startup probe; the default embeds a short sentinel text.
    async fn warmup(&self) -> anyhow::Result<()> {
        self.embed_batch(&["warmup".to_string()]).await.map(|_| ())
    }
}

enum WorkerRequest {
    Embed {
        text: String,
        reply: oneshot::Sender<Option<Vec<f32>>>,
    },
    EmbedBatch {
        texts: Vec<String>,
        reply: oneshot::Sender<Vec<Option<Vec<f32>>>>,
    },
    Shutdown,
}

/// Clonable API for talking to the embedding worker.
#[derive(Clone)]
pub struct EmbeddingHandle {
    tx: Option<mpsc::Sender<WorkerRequest>>,
    ready: Arc<AtomicBool>,
    engine_name: Arc<String>,
    dimensions: usize,
}

impl EmbeddingHandle {
    /// Spawn the worker task hosting `engine`.
    ///
    /// The handle is returned immediately; `ready` flips true once the
    /// engine's warmup completes inside the 30 s startup budget, and stays
    /// false forever if it does not (subsequent calls short-circuit).
    pub fn spawn(engine: Box<dyn EmbeddingEngine>) -> Self {
        let engine_name = engine.name().to_string();
        let dimensions = engine.dimensions();
        let (tx, mut rx) = mpsc::channel::<WorkerRequest>(64);
        let ready = Arc::new(AtomicBool::new(false));

        let worker_ready = ready.clone();
        tokio::spawn(async move {
            match tokio::time::timeout(STARTUP_TIMEOUT, engine.warmup()).await {
                Ok(Ok(())) => {
                    worker_ready.store(true, Ordering::SeqCst);
                    tracing::info!(
                        engine = engine.name(),
                        dimensions = engine.dimensions(),
                        "Embedding worker ready"
                    );
                }
                Ok(Err(e)) => {
                    tracing::warn!("Embedding engine failed to start: {} -- keyword-only", e);
                    return;
                }
                Err(_) => {
                    tracing::warn!("Embedding engine startup timed out -- keyword-only");
                    return;
                }
            }

            while let Some(request) = rx.recv().await {
                match request {
                    WorkerRequest::Embed { text, reply } => {
                        let result = engine
                            .embed_batch(std::slice::from_ref(&text))
                            .await
                            .ok()
                            .and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) });
                        let _ = reply.send(result);
                    }
                    WorkerRequest::EmbedBatch { texts, reply } => {
                        let result = match engine.embed_batch(&texts).await {
                            Ok(vectors) if vectors.len() == texts.len() => {
                                vectors.into_iter().map(Some).collect()
                            }
                            Ok(_) | Err(_) => vec![None; texts.len()],
                        };
                        let _ = reply.send(result);
                    }
                    WorkerRequest::Shutdown => break,
                }
            }
            worker_ready.store(false, Ordering::SeqCst);
            tracing::debug!("Embedding worker exited");
        });

        Self {
            tx: Some(tx),
            ready,
            engine_name: Arc::new(engine_name),
            dimensions,
        }
    }

    /// A handle with no worker behind it: never ready, always returns None.
    pub fn keyword_only() -> Self {
        Self {
            tx: None,
            ready: Arc::new(AtomicBool::new(false)),
            engine_name: Arc::new(KEYWORD_ONLY_ENGINE.to_string()),
            dimensions: 0,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn engine_name(&self) -> &str {
        if self.is_ready() { self.engine_name.as_str() } else { KEYWORD_ONLY_ENGINE }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one text. None on any failure or timeout.
    pub async fn embed(&self, text: String) -> Option<Vec<f32>> {
        if !self.is_ready() {
            return None;
        }
        let tx = self.tx.as_ref()?;
        let (reply, rx) = oneshot::channel();
        if tx.send(WorkerRequest::Embed { text, reply }).await.is_err() {
            self.ready.store(false, Ordering::SeqCst);
            return None;
        }
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                // Worker dropped the reply: it died mid-request
                self.ready.store(false, Ordering::SeqCst);
                None
            }
            Err(_) => {
                tracing::warn!("Embedding request timed out after {:?}", REQUEST_TIMEOUT);
                None
            }
        }
    }

    /// Embed a batch; the output always has one slot per input, None where
    /// embedding failed.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Vec<Option<Vec<f32>>> {
        let slots = texts.len();
        if !self.is_ready() || slots == 0 {
            return vec![None; slots];
        }
        let Some(tx) = self.tx.as_ref() else {
            return vec![None; slots];
        };
        let (reply, rx) = oneshot::channel();
        if tx.send(WorkerRequest::EmbedBatch { texts, reply }).await.is_err() {
            self.ready.store(false, Ordering::SeqCst);
            return vec![None; slots];
        }
        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.ready.store(false, Ordering::SeqCst);
                vec![None; slots]
            }
            Err(_) => {
                tracing::warn!("Embedding batch timed out after {:?}", REQUEST_TIMEOUT);
                vec![None; slots]
            }
        }
    }

    /// Orderly worker shutdown with a grace period.
    pub async fn shutdown(&self, grace: Duration) {
        if let Some(tx) = self.tx.as_ref() {
            let _ = tokio::time::timeout(grace, tx.send(WorkerRequest::Shutdown)).await;
        }
        self.ready.store(false, Ordering::SeqCst);
    }
}

/// Build the embedding handle from configuration: Ollama when a host is
/// configured and embeddings are not disabled, keyword-only otherwise.
pub fn from_config(config: &crate::config::EnvConfig) -> EmbeddingHandle {
    if config.disable_embeddings {
        return EmbeddingHandle::keyword_only();
    }
    match config.ollama_host.as_ref() {
        Some(host) => EmbeddingHandle::spawn(Box::new(OllamaEngine::new(
            host.clone(),
            config.embedding_model.clone(),
        ))),
        None => EmbeddingHandle::keyword_only(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEngine {
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingEngine for StubEngine {
        fn name(&self) -> &str {
            "stub"
        }
        fn dimensions(&self) -> usize {
            EMBEDDING_DIMENSIONS
        }
        async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            if self.fail {
                anyhow::bail!("stub failure");
            }
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; EMBEDDING_DIMENSIONS];
                    v[t.len() % EMBEDDING_DIMENSIONS] = 1.0;
                    v
                })
                .collect())
        }
    }

    async fn wait_ready(handle: &EmbeddingHandle) {
        for _ in 0..100 {
            if handle.is_ready() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn embed_round_trip() {
        let handle = EmbeddingHandle::spawn(Box::new(StubEngine { fail: false }));
        wait_ready(&handle).await;
        assert!(handle.is_ready());
        assert_eq!(handle.engine_name(), "stub");

        let vec = handle.embed("hello".to_string()).await.unwrap();
        assert_eq!(vec.len(), EMBEDDING_DIMENSIONS);
    }

    #[tokio::test]
    async fn batch_preserves_slot_count() {
        let handle = EmbeddingHandle::spawn(Box::new(StubEngine { fail: false }));
        wait_ready(&handle).await;
        let results = handle
            .embed_batch(vec!["a".to_string(), "bb".to_string(), "ccc".to_string()])
            .await;
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_some()));
    }

    #[tokio::test]
    async fn failed_startup_degrades_to_keyword_only() {
        let handle = EmbeddingHandle::spawn(Box::new(StubEngine { fail: true }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_ready());
        assert_eq!(handle.engine_name(), KEYWORD_ONLY_ENGINE);
        assert!(handle.embed("anything".to_string()).await.is_none());
    }

    #[tokio::test]
    async fn keyword_only_handle_short_circuits() {
        let handle = EmbeddingHandle::keyword_only();
        assert!(!handle.is_ready());
        assert_eq!(handle.dimensions(), 0);
        assert!(handle.embed("text".to_string()).await.is_none());
        assert_eq!(handle.embed_batch(vec!["a".to_string()]).await, vec![None]);
    }

    #[tokio::test]
    async fn shutdown_makes_handle_unready() {
        let handle = EmbeddingHandle::spawn(Box::new(StubEngine { fail: false }));
        wait_ready(&handle).await;
        handle.shutdown(Duration::from_secs(1)).await;
        assert!(!handle.is_ready());
        assert!(handle.embed("after shutdown".to_string()).await.is_none());
    }
}
