use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use triad_core::{EngineKind, EngineResult, Task, TriadError, TriadResult};
use triad_creative::SolutionGenerator;
use triad_pool::WorkerPool;
use triad_recall::{RecallStore, SearchQuery};

/// Hits requested from the recall store per dispatch.
const RECALL_TOP_K: usize = 3;

/// Uniform dispatch seam over the three engines.
///
/// An engine turns one task into one [`EngineResult`]. Timeouts are applied
/// by the coordinator around `run`, never inside it; cancellation is
/// cooperative through the token.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Which engine this adapter dispatches to.
    fn kind(&self) -> EngineKind;

    /// Execute the task on this engine.
    async fn run(&self, task: &Task, cancel: CancellationToken) -> TriadResult<EngineResult>;
}

/// Memory engine: budget-bounded recall search over stored entities.
pub struct MemoryEngine {
    store: Arc<dyn RecallStore>,
}

impl MemoryEngine {
    /// Wrap a recall store as a dispatchable engine.
    pub fn new(store: Arc<dyn RecallStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Engine for MemoryEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Memory
    }

    async fn run(&self, task: &Task, _cancel: CancellationToken) -> TriadResult<EngineResult> {
        let started = Instant::now();
        let query = SearchQuery::text(&task.payload);
        let response = self.store.search(&query, RECALL_TOP_K).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let confidence = response.hits.first().map_or(0.0, |hit| hit.score);
        let payload = response
            .hits
            .iter()
            .map(|hit| hit.entity.content.clone())
            .collect::<Vec<_>>()
            .join("\n");

        // A budget-bounded partial scan is usable but flagged, not an error.
        if response.degraded || response.hits.is_empty() {
            Ok(EngineResult::degraded(
                EngineKind::Memory,
                task.id,
                payload,
                confidence,
                latency_ms,
            ))
        } else {
            Ok(EngineResult::ok(
                EngineKind::Memory,
                task.id,
                payload,
                confidence,
                latency_ms,
            ))
        }
    }
}

/// Parallel engine: the task runs on the auto-scaling worker pool.
pub struct ParallelEngine {
    pool: WorkerPool,
}

impl ParallelEngine {
    /// Wrap a worker pool as a dispatchable engine.
    pub fn new(pool: WorkerPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Engine for ParallelEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Parallel
    }

    async fn run(&self, task: &Task, cancel: CancellationToken) -> TriadResult<EngineResult> {
        let reply = self.pool.submit(task.clone(), cancel);
        reply
            .await
            .map_err(|_| TriadError::Pool("worker pool dropped the reply channel".into()))?
    }
}

/// Creative engine: ranked multi-candidate generation.
pub struct CreativeEngine {
    generator: Arc<SolutionGenerator>,
}

impl CreativeEngine {
    /// Wrap a solution generator as a dispatchable engine.
    pub fn new(generator: Arc<SolutionGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl Engine for CreativeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Creative
    }

    async fn run(&self, task: &Task, _cancel: CancellationToken) -> TriadResult<EngineResult> {
        let started = Instant::now();
        // n = 0 defers to the generator's configured candidate count.
        let candidates = self.generator.generate(&task.payload, 0).await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let confidence = candidates.first().map_or(0.0, |c| c.quality);
        let payload = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {} (via {})", i + 1, c.content, c.source))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(EngineResult::ok(
            EngineKind::Creative,
            task.id,
            payload,
            confidence,
            latency_ms,
        ))
    }
}
