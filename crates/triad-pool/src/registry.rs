use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Waiting for a task.
    Idle,
    /// Executing a task.
    Busy,
    /// Asked to exit after its current loop iteration.
    Draining,
    /// Missed heartbeats beyond the grace period.
    Dead,
}

/// Registry record for one worker.
#[derive(Debug, Clone)]
pub struct WorkerRecord {
    /// Worker identifier.
    pub id: Uuid,
    /// Current lifecycle state.
    pub state: WorkerState,
    /// The single task this worker holds, if any.
    pub current_task_id: Option<Uuid>,
    /// Last observed heartbeat.
    pub last_heartbeat: Instant,
}

/// Shared worker registry.
///
/// The registry and the task queue are the only structures mutated from
/// multiple concurrent contexts; every state transition happens under one
/// lock so transitions are atomic and a worker holds at most one task.
pub struct WorkerRegistry {
    workers: RwLock<HashMap<Uuid, WorkerRecord>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a freshly spawned worker as idle.
    pub fn insert(&self, id: Uuid) {
        self.workers.write().insert(
            id,
            WorkerRecord {
                id,
                state: WorkerState::Idle,
                current_task_id: None,
                last_heartbeat: Instant::now(),
            },
        );
    }

    /// Remove a worker record (scale-down or death detection).
    pub fn remove(&self, id: Uuid) -> Option<WorkerRecord> {
        self.workers.write().remove(&id)
    }

    /// Record a heartbeat.
    pub fn heartbeat(&self, id: Uuid) {
        if let Some(record) = self.workers.write().get_mut(&id) {
            record.last_heartbeat = Instant::now();
        }
    }

    /// Atomically claim a task for a worker (idle → busy).
    pub fn assign(&self, id: Uuid, task_id: Uuid) {
        if let Some(record) = self.workers.write().get_mut(&id) {
            record.state = WorkerState::Busy;
            record.current_task_id = Some(task_id);
            record.last_heartbeat = Instant::now();
        }
    }

    /// Release a worker's task (busy → idle), unless it is draining or dead.
    pub fn release(&self, id: Uuid) {
        if let Some(record) = self.workers.write().get_mut(&id) {
            record.current_task_id = None;
            if record.state == WorkerState::Busy {
                record.state = WorkerState::Idle;
            }
        }
    }

    /// Move a worker to the given state.
    pub fn set_state(&self, id: Uuid, state: WorkerState) {
        if let Some(record) = self.workers.write().get_mut(&id) {
            record.state = state;
        }
    }

    /// Workers not yet dead.
    pub fn live_count(&self) -> usize {
        self.workers
            .read()
            .values()
            .filter(|w| w.state != WorkerState::Dead)
            .count()
    }

    /// Workers currently executing a task.
    pub fn busy_count(&self) -> usize {
        self.workers
            .read()
            .values()
            .filter(|w| w.state == WorkerState::Busy)
            .count()
    }

    /// Pick one idle worker, if any.
    pub fn idle_worker(&self) -> Option<Uuid> {
        self.workers
            .read()
            .values()
            .find(|w| w.state == WorkerState::Idle)
            .map(|w| w.id)
    }

    /// Workers whose last heartbeat is older than the grace period.
    pub fn stale_workers(&self, grace: Duration) -> Vec<WorkerRecord> {
        let now = Instant::now();
        self.workers
            .read()
            .values()
            .filter(|w| {
                w.state != WorkerState::Dead
                    && now.duration_since(w.last_heartbeat) > grace
            })
            .cloned()
            .collect()
    }

    /// Snapshot of all records.
    pub fn snapshot(&self) -> Vec<WorkerRecord> {
        self.workers.read().values().cloned().collect()
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
