use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use triad_core::{EngineKind, EngineResult, PoolConfig, StatusEvent, Task, TriadError, TriadResult};
use triad_status::StatusBroadcaster;

use crate::queue::{QueueEntry, TaskQueue};
use crate::registry::{WorkerRegistry, WorkerState};

/// Confidence assigned to results produced by the pool's handler.
const WORKER_CONFIDENCE: f32 = 0.9;

/// The injected collaborator performing the actual work (e.g. an inference
/// call). The pool is execution-agnostic; because execution is
/// at-least-once, handlers must be idempotent or duplicate-tolerant.
#[async_trait]
pub trait ExecutionHandler: Send + Sync {
    /// Execute one task and return its output payload.
    async fn execute(&self, task: &Task) -> TriadResult<String>;
}

struct WorkerHandle {
    join: JoinHandle<()>,
    drain: CancellationToken,
}

struct PoolInner {
    config: RwLock<PoolConfig>,
    queue: TaskQueue,
    registry: WorkerRegistry,
    inflight: Mutex<HashMap<Uuid, QueueEntry>>,
    handles: Mutex<HashMap<Uuid, WorkerHandle>>,
    handler: Arc<dyn ExecutionHandler>,
    broadcaster: Arc<StatusBroadcaster>,
    shutdown: CancellationToken,
}

/// Auto-scaling worker pool over a priority queue.
///
/// `new` spawns the configured minimum of workers immediately;
/// [`start_background`](Self::start_background) adds the scaling sampler and
/// the heartbeat monitor. Pool size stays within `[min, max]` at every
/// sampled instant.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

impl WorkerPool {
    /// Create the pool and spawn `min_workers` workers.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        config: PoolConfig,
        handler: Arc<dyn ExecutionHandler>,
        broadcaster: Arc<StatusBroadcaster>,
    ) -> Self {
        let min = config.min_workers;
        let pool = Self {
            inner: Arc::new(PoolInner {
                config: RwLock::new(config),
                queue: TaskQueue::new(),
                registry: WorkerRegistry::new(),
                inflight: Mutex::new(HashMap::new()),
                handles: Mutex::new(HashMap::new()),
                handler,
                broadcaster,
                shutdown: CancellationToken::new(),
            }),
        };
        for _ in 0..min {
            pool.spawn_worker();
        }
        pool
    }

    /// Submit a task; the returned channel resolves with the engine result
    /// once a worker completes it (possibly after bounded requeues).
    pub fn submit(
        &self,
        task: Task,
        cancel: CancellationToken,
    ) -> oneshot::Receiver<TriadResult<EngineResult>> {
        let (reply, rx) = oneshot::channel();
        self.inner.queue.push(QueueEntry {
            task,
            attempts: 0,
            reply,
            cancel,
        });
        rx
    }

    /// Start the auto-scaling sampler and the heartbeat monitor.
    pub fn start_background(&self) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(scaler_loop(self.inner.clone())),
            tokio::spawn(monitor_loop(self.inner.clone())),
        ]
    }

    /// Stop all workers and background loops.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Replace the scaling/heartbeat knobs (hot reload).
    ///
    /// New bounds apply from the next scaling sample.
    pub fn update_config(&self, config: PoolConfig) {
        *self.inner.config.write() = config;
    }

    /// Number of live (non-dead) workers.
    pub fn size(&self) -> usize {
        self.inner.registry.live_count()
    }

    /// Current queue depth.
    pub fn queue_depth(&self) -> usize {
        self.inner.queue.depth()
    }

    /// Fraction of live workers currently busy.
    pub fn utilization(&self) -> f64 {
        let live = self.inner.registry.live_count();
        if live == 0 {
            return 0.0;
        }
        self.inner.registry.busy_count() as f64 / live as f64
    }

    fn spawn_worker(&self) {
        spawn_worker(&self.inner);
    }

    #[cfg(test)]
    fn abort_worker(&self, id: Uuid) {
        if let Some(handle) = self.inner.handles.lock().remove(&id) {
            handle.join.abort();
        }
    }

    #[cfg(test)]
    fn worker_ids(&self) -> Vec<Uuid> {
        self.inner.registry.snapshot().into_iter().map(|w| w.id).collect()
    }
}

fn spawn_worker(inner: &Arc<PoolInner>) {
    let id = Uuid::new_v4();
    let drain = CancellationToken::new();
    inner.registry.insert(id);
    let join = tokio::spawn(run_worker(inner.clone(), id, drain.clone()));
    inner.handles.lock().insert(id, WorkerHandle { join, drain });
    inner.broadcaster.publish(StatusEvent::worker(
        id,
        "worker.spawned",
        serde_json::Value::Null,
    ));
    info!(worker_id = %id, "Worker spawned");
}

fn drain_one(inner: &Arc<PoolInner>) -> bool {
    let Some(id) = inner.registry.idle_worker() else {
        return false;
    };
    inner.registry.set_state(id, WorkerState::Draining);
    if let Some(handle) = inner.handles.lock().get(&id) {
        handle.drain.cancel();
    }
    inner.broadcaster.publish(StatusEvent::worker(
        id,
        "worker.draining",
        serde_json::Value::Null,
    ));
    info!(worker_id = %id, "Worker draining");
    true
}

fn heartbeat_interval(inner: &PoolInner) -> Duration {
    Duration::from_millis(inner.config.read().heartbeat_interval_ms.max(10))
}

/// One worker's lifecycle: pop, claim, execute with heartbeats, reply.
///
/// Heartbeats are emitted both while waiting for work and between execution
/// steps, so an idle worker never looks stale to the monitor. The interval is
/// re-read from config on every beat, picking up hot reloads.
async fn run_worker(inner: Arc<PoolInner>, worker_id: Uuid, drain: CancellationToken) {
    'lifecycle: loop {
        inner.registry.heartbeat(worker_id);

        let entry = loop {
            tokio::select! {
                _ = drain.cancelled() => break 'lifecycle,
                _ = inner.shutdown.cancelled() => break 'lifecycle,
                entry = inner.queue.pop() => break entry,
                _ = tokio::time::sleep(heartbeat_interval(&inner)) => {
                    inner.registry.heartbeat(worker_id);
                }
            }
        };

        if entry.cancel.is_cancelled() {
            let _ = entry
                .reply
                .send(Err(TriadError::Pool("task cancelled before execution".into())));
            continue;
        }

        let task = entry.task.clone();
        let cancel = entry.cancel.clone();
        let attempts = entry.attempts;
        inner.registry.assign(worker_id, task.id);
        inner.inflight.lock().insert(worker_id, entry);

        let started = Instant::now();
        let exec = inner.handler.execute(&task);
        tokio::pin!(exec);

        // Heartbeat between execution steps; cancellation is cooperative,
        // never preemptive.
        let outcome = loop {
            tokio::select! {
                result = &mut exec => break Some(result),
                _ = cancel.cancelled() => break None,
                _ = tokio::time::sleep(heartbeat_interval(&inner)) => {
                    inner.registry.heartbeat(worker_id);
                }
            }
        };

        // The heartbeat monitor may have declared this worker dead and
        // requeued the entry; in that case the late outcome is dropped
        // (duplicate-tolerant at-least-once execution).
        let Some(entry) = inner.inflight.lock().remove(&worker_id) else {
            inner.registry.release(worker_id);
            continue;
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Some(Ok(payload)) => {
                let mut result =
                    EngineResult::ok(EngineKind::Parallel, task.id, payload, WORKER_CONFIDENCE, latency_ms);
                result.attempt = attempts;
                let _ = entry.reply.send(Ok(result));
            }
            Some(Err(e)) => {
                warn!(worker_id = %worker_id, task_id = %task.id, error = %e, "Handler failed");
                let _ = entry.reply.send(Err(e));
            }
            None => {
                let _ = entry
                    .reply
                    .send(Err(TriadError::Pool("task cancelled".into())));
            }
        }
        inner.registry.release(worker_id);
    }

    inner.registry.remove(worker_id);
    inner.handles.lock().remove(&worker_id);
    inner.broadcaster.publish(StatusEvent::worker(
        worker_id,
        "worker.stopped",
        serde_json::Value::Null,
    ));
}

/// Fixed-interval scaling sampler.
///
/// Pressure blends queue depth per worker with rolling utilization; N
/// consecutive over-threshold samples scale up (bounded by max), M
/// consecutive under-threshold samples drain one idle worker (bounded by
/// min).
async fn scaler_loop(inner: Arc<PoolInner>) {
    let mut rolling_utilization = 0.0f64;
    let mut over_samples = 0u32;
    let mut under_samples = 0u32;

    loop {
        let config = inner.config.read().clone();
        let interval = Duration::from_millis(config.sample_interval_ms.max(10));
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        let live = inner.registry.live_count().max(1);
        let depth = inner.queue.depth();
        let utilization = inner.registry.busy_count() as f64 / live as f64;
        rolling_utilization = 0.5 * rolling_utilization + 0.5 * utilization;
        let pressure = depth as f64 / live as f64 + rolling_utilization;

        if pressure > config.high_watermark {
            over_samples += 1;
            under_samples = 0;
        } else if pressure < config.low_watermark {
            under_samples += 1;
            over_samples = 0;
        } else {
            over_samples = 0;
            under_samples = 0;
        }

        let size = inner.registry.live_count();
        if over_samples >= config.scale_up_samples && size < config.max_workers {
            spawn_worker(&inner);
            inner.broadcaster.publish(StatusEvent::engine(
                EngineKind::Parallel,
                "pool.scale_up",
                serde_json::json!({ "size": size + 1, "depth": depth }),
            ));
            over_samples = 0;
        } else if under_samples >= config.scale_down_samples && size > config.min_workers {
            if drain_one(&inner) {
                inner.broadcaster.publish(StatusEvent::engine(
                    EngineKind::Parallel,
                    "pool.scale_down",
                    serde_json::json!({ "size": size - 1, "depth": depth }),
                ));
            }
            under_samples = 0;
        }
    }
}

/// Heartbeat monitor: workers silent beyond the grace period are declared
/// dead, their in-flight task is requeued under the bounded retry counter,
/// and a replacement is spawned if the pool fell below its minimum.
async fn monitor_loop(inner: Arc<PoolInner>) {
    loop {
        let config = inner.config.read().clone();
        let grace = Duration::from_millis(config.heartbeat_grace_ms.max(10));
        tokio::select! {
            _ = inner.shutdown.cancelled() => break,
            _ = tokio::time::sleep(grace / 2) => {}
        }

        for record in inner.registry.stale_workers(grace) {
            warn!(worker_id = %record.id, "Worker missed heartbeats, declaring dead");
            inner.registry.set_state(record.id, WorkerState::Dead);
            inner.broadcaster.publish(StatusEvent::worker(
                record.id,
                "worker.dead",
                serde_json::json!({ "task_id": record.current_task_id }),
            ));

            if let Some(handle) = inner.handles.lock().remove(&record.id) {
                handle.join.abort();
            }
            inner.registry.remove(record.id);

            // Requeue the orphaned task, bounded by the retry limit.
            if let Some(mut entry) = inner.inflight.lock().remove(&record.id) {
                entry.attempts += 1;
                let task_id = entry.task.id;
                if entry.attempts > config.max_retries {
                    warn!(task_id = %task_id, attempts = entry.attempts, "Retry bound exceeded");
                    let _ = entry.reply.send(Err(TriadError::MaxRetriesExceeded(format!(
                        "task {task_id} failed after {} attempts",
                        entry.attempts
                    ))));
                } else {
                    info!(task_id = %task_id, attempts = entry.attempts, "Requeueing task");
                    inner.broadcaster.publish(StatusEvent::task(
                        task_id,
                        "task.requeued",
                        serde_json::json!({ "attempts": entry.attempts }),
                    ));
                    inner.queue.push(entry);
                }
            }

            if inner.registry.live_count() < config.min_workers {
                spawn_worker(&inner);
            }
        }
    }
}
