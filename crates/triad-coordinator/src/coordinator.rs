use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use triad_core::{
    CoordinatorConfig, EngineKind, EngineResult, FailureCode, IntakeRequest, StatusEvent, Task,
    TaskStatus, TriadError, TriadResult,
};
use triad_status::StatusBroadcaster;

use crate::engines::Engine;
use crate::merge;
use crate::strategy::StrategyPlan;

/// The engine coordinator: intake, dispatch, collection, merge.
///
/// Tasks move through `queued → dispatched → running → merging → terminal`;
/// each transition is published exactly once, and every accepted task reaches
/// exactly one terminal status. Engine dispatches run concurrently under
/// per-engine timeouts inside the task's overall deadline.
pub struct Coordinator {
    config: CoordinatorConfig,
    engines: HashMap<EngineKind, Arc<dyn Engine>>,
    tasks: RwLock<HashMap<Uuid, Task>>,
    cancels: Mutex<HashMap<Uuid, CancellationToken>>,
    broadcaster: Arc<StatusBroadcaster>,
}

impl Coordinator {
    /// Create a coordinator over the given engine adapters.
    pub fn new(
        config: CoordinatorConfig,
        engines: Vec<Arc<dyn Engine>>,
        broadcaster: Arc<StatusBroadcaster>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            engines: engines.into_iter().map(|e| (e.kind(), e)).collect(),
            tasks: RwLock::new(HashMap::new()),
            cancels: Mutex::new(HashMap::new()),
            broadcaster,
        })
    }

    /// Accept a task: validate synchronously, enqueue, start the run loop.
    ///
    /// Malformed requests are rejected here and never enqueued.
    pub fn intake(self: &Arc<Self>, request: IntakeRequest) -> TriadResult<Uuid> {
        request.validate()?;

        let task = Task::new(
            request.payload,
            request.priority.unwrap_or(self.config.default_priority),
            request.strategy.unwrap_or_default(),
            request.deadline_ms.unwrap_or(self.config.default_deadline_ms),
        );
        let task_id = task.id;

        info!(task_id = %task_id, strategy = %task.strategy, "Task accepted");
        self.broadcaster.publish(StatusEvent::task(
            task_id,
            "task.queued",
            serde_json::json!({ "priority": task.priority, "strategy": task.strategy }),
        ));

        let cancel = CancellationToken::new();
        self.tasks.write().insert(task_id, task);
        self.cancels.lock().insert(task_id, cancel.clone());

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run_task(task_id, cancel).await;
        });

        Ok(task_id)
    }

    /// Snapshot of a task, including per-engine sub-results and merged output.
    pub fn get_task(&self, task_id: Uuid) -> Option<Task> {
        self.tasks.read().get(&task_id).cloned()
    }

    /// Snapshot of every known task.
    pub fn list_tasks(&self) -> Vec<Task> {
        self.tasks.read().values().cloned().collect()
    }

    /// Request cooperative cancellation of a non-terminal task.
    ///
    /// Returns false when the task is unknown or already terminal. The run
    /// loop observes the token and settles the task as failed/cancelled; the
    /// terminal event is still published exactly once, from the run loop.
    pub fn cancel(&self, task_id: Uuid) -> bool {
        let cancellable = self
            .tasks
            .read()
            .get(&task_id)
            .is_some_and(|t| !t.status.is_terminal());
        if !cancellable {
            return false;
        }
        if let Some(token) = self.cancels.lock().get(&task_id) {
            token.cancel();
            return true;
        }
        false
    }

    fn update_task(&self, task_id: Uuid, f: impl FnOnce(&mut Task)) {
        if let Some(task) = self.tasks.write().get_mut(&task_id) {
            f(task);
        }
    }

    fn set_status(&self, task_id: Uuid, status: TaskStatus) {
        self.update_task(task_id, |t| t.status = status);
        let event_type = match status {
            TaskStatus::Queued => "task.queued",
            TaskStatus::Dispatched => "task.dispatched",
            TaskStatus::Running => "task.running",
            TaskStatus::Merging => "task.merging",
            TaskStatus::Done => "task.done",
            TaskStatus::Failed { .. } => "task.failed",
            TaskStatus::TimedOut => "task.timed_out",
        };
        self.broadcaster.publish(StatusEvent::task(
            task_id,
            event_type,
            serde_json::json!({ "status": status }),
        ));
    }

    /// Dispatch, collect, and settle one task.
    async fn run_task(self: Arc<Self>, task_id: Uuid, cancel: CancellationToken) {
        let Some(task) = self.get_task(task_id) else {
            return;
        };
        let plan = StrategyPlan::resolve(task.strategy, task.deadline_ms, &self.config);
        self.set_status(task_id, TaskStatus::Dispatched);

        let mut dispatches = FuturesUnordered::new();
        for kind in &plan.engines {
            let Some(engine) = self.engines.get(kind).cloned() else {
                warn!(task_id = %task_id, engine = %kind, "No adapter registered for engine");
                continue;
            };
            let kind = *kind;
            let task = task.clone();
            let cancel = cancel.child_token();
            let timeout = plan.engine_timeout;
            dispatches.push(async move {
                let outcome = tokio::time::timeout(timeout, engine.run(&task, cancel)).await;
                (kind, outcome)
            });
        }
        self.set_status(task_id, TaskStatus::Running);

        let deadline = tokio::time::sleep(Duration::from_millis(task.deadline_ms));
        tokio::pin!(deadline);

        let mut errors: HashMap<EngineKind, FailureCode> = HashMap::new();
        let mut cancelled = false;
        let mut deadline_hit = false;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                _ = &mut deadline => {
                    deadline_hit = true;
                    break;
                }
                next = dispatches.next() => {
                    let Some((kind, outcome)) = next else { break };
                    let result = match outcome {
                        Ok(Ok(result)) => {
                            self.broadcaster.publish(StatusEvent::engine(
                                kind,
                                "engine.result",
                                serde_json::json!({
                                    "task_id": task_id,
                                    "status": result.status,
                                    "confidence": result.confidence,
                                    "latency_ms": result.latency_ms,
                                }),
                            ));
                            result
                        }
                        Ok(Err(e)) => {
                            warn!(task_id = %task_id, engine = %kind, error = %e, "Engine failed");
                            errors.insert(kind, failure_code_for(&e));
                            self.broadcaster.publish(StatusEvent::engine(
                                kind,
                                "engine.failed",
                                serde_json::json!({ "task_id": task_id, "error": e.to_string() }),
                            ));
                            EngineResult::missing(kind, task_id, plan.engine_timeout.as_millis() as u64)
                        }
                        Err(_) => {
                            warn!(task_id = %task_id, engine = %kind, "Engine timed out");
                            self.broadcaster.publish(StatusEvent::engine(
                                kind,
                                "engine.timeout",
                                serde_json::json!({ "task_id": task_id }),
                            ));
                            EngineResult::missing(kind, task_id, plan.engine_timeout.as_millis() as u64)
                        }
                    };
                    self.update_task(task_id, |t| t.record_result(result));
                }
            }
        }

        // Unanswered engines get explicit missing markers so the merge
        // policy sees the full participation set.
        self.update_task(task_id, |t| {
            for kind in &plan.engines {
                if !t.results.contains_key(kind) {
                    t.record_result(EngineResult::missing(
                        *kind,
                        task_id,
                        t.deadline_ms,
                    ));
                }
            }
        });

        self.settle(task_id, &plan, &errors, cancelled, deadline_hit);
        self.cancels.lock().remove(&task_id);
    }

    /// Decide the terminal status and merge if the task succeeded.
    fn settle(
        &self,
        task_id: Uuid,
        plan: &StrategyPlan,
        errors: &HashMap<EngineKind, FailureCode>,
        cancelled: bool,
        deadline_hit: bool,
    ) {
        let Some(task) = self.get_task(task_id) else {
            return;
        };

        if cancelled {
            info!(task_id = %task_id, "Task cancelled");
            self.set_status(
                task_id,
                TaskStatus::Failed {
                    code: FailureCode::Cancelled,
                },
            );
            return;
        }

        // Every engine window closed without a result and without a hard
        // error: the task timed out rather than failed.
        let any_present = task.results.values().any(EngineResult::is_present);
        if !any_present && errors.is_empty() {
            warn!(
                task_id = %task_id,
                deadline_ms = task.deadline_ms,
                deadline_hit,
                "No engine produced a result in time"
            );
            self.set_status(task_id, TaskStatus::TimedOut);
            return;
        }

        // A mandatory engine without a usable result fails the task, with
        // the most specific failure code that engine reported.
        for kind in &plan.mandatory {
            let present = task
                .results
                .get(kind)
                .is_some_and(EngineResult::is_present);
            if !present {
                let code = errors
                    .get(kind)
                    .copied()
                    .unwrap_or(FailureCode::PartialEngineFailure);
                warn!(task_id = %task_id, engine = %kind, ?code, "Mandatory engine produced no result");
                self.set_status(task_id, TaskStatus::Failed { code });
                return;
            }
        }

        self.set_status(task_id, TaskStatus::Merging);
        match merge::merge_results(plan.merge, &task.results) {
            Some(merged) => {
                self.update_task(task_id, |t| t.merged = Some(merged));
                info!(task_id = %task_id, "Task done");
                self.set_status(task_id, TaskStatus::Done);
            }
            None => {
                // Mandatory checks passed yet nothing merged: only possible
                // when the participation set was empty.
                self.set_status(task_id, TaskStatus::TimedOut);
            }
        }
    }
}

fn failure_code_for(error: &TriadError) -> FailureCode {
    match error {
        TriadError::MaxRetriesExceeded(_) => FailureCode::MaxRetriesExceeded,
        TriadError::GenerationUnavailable(_) => FailureCode::GenerationUnavailable,
        _ => FailureCode::PartialEngineFailure,
    }
}
