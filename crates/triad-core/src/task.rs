use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::{TriadError, TriadResult};

/// The three engines a task can be dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Recall store — keyed storage with bounded-latency similarity search.
    Memory,
    /// Worker pool — auto-scaling executors over a priority queue.
    Parallel,
    /// Solution generator — ranked multi-candidate output.
    Creative,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Memory => write!(f, "memory"),
            EngineKind::Parallel => write!(f, "parallel"),
            EngineKind::Creative => write!(f, "creative"),
        }
    }
}

/// A named, statically resolved engine participation profile.
///
/// A strategy resolves exactly once, at intake, to a participation set,
/// per-engine timeouts, and a merge policy. It is never re-evaluated
/// mid-task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// All three engines, concatenating results tagged by provenance.
    #[default]
    Collaborative,
    /// Parallel engine only, tight timeout, best-confidence merge.
    FastPath,
    /// Memory engine only.
    MemoryOnly,
    /// Creative engine only.
    CreativeOnly,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Collaborative => write!(f, "collaborative"),
            Strategy::FastPath => write!(f, "fast_path"),
            Strategy::MemoryOnly => write!(f, "memory_only"),
            Strategy::CreativeOnly => write!(f, "creative_only"),
        }
    }
}

/// How collected engine results are combined into the final task output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Concatenate all present results in engine order, tagged by engine.
    ConcatProvenance,
    /// Select the single highest-confidence result; ties break by engine order.
    BestConfidence,
}

/// Terminal failure codes surfaced through `get_task`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// A mandatory engine produced no usable result.
    PartialEngineFailure,
    /// Worker-death requeue exceeded the retry bound.
    MaxRetriesExceeded,
    /// Every generation strategy failed and the creative engine was mandatory.
    GenerationUnavailable,
    /// The task was cancelled before reaching a result.
    Cancelled,
}

/// Status of a task in the coordinator state machine.
///
/// Transitions are monotonic forward (`queued → dispatched → running →
/// merging → terminal`), except that a worker-death requeue may re-enter
/// `queued` under the bounded retry counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Accepted at intake, waiting for dispatch.
    Queued,
    /// Strategy resolved, engine dispatches issued.
    Dispatched,
    /// At least one engine is executing.
    Running,
    /// Results collected, merge in progress.
    Merging,
    /// Merged result available.
    Done,
    /// Terminal failure with a machine-readable code.
    Failed {
        /// Why the task failed.
        code: FailureCode,
    },
    /// No engine result arrived before the deadline.
    TimedOut,
}

impl TaskStatus {
    /// Whether this status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed { .. } | TaskStatus::TimedOut
        )
    }
}

/// Status of one engine's result for one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    /// Produced normally within its timeout.
    Ok,
    /// Produced under timeout or partial-failure conditions; lower confidence.
    Degraded,
    /// The engine never answered; represented explicitly for the merge policy.
    Missing,
}

/// The output (or degraded/missing marker) produced by one engine for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineResult {
    /// Which engine produced this result.
    pub engine: EngineKind,
    /// The task this result belongs to.
    pub task_id: Uuid,
    /// Engine-specific output payload.
    pub payload: String,
    /// Confidence score in `[0, 1]`.
    pub confidence: f32,
    /// Wall-clock latency of the engine call in milliseconds.
    pub latency_ms: u64,
    /// Ok, degraded, or missing.
    pub status: ResultStatus,
    /// Execution attempt that produced this result (for last-write-wins).
    #[serde(default)]
    pub attempt: u32,
}

impl EngineResult {
    /// A normal result.
    pub fn ok(
        engine: EngineKind,
        task_id: Uuid,
        payload: impl Into<String>,
        confidence: f32,
        latency_ms: u64,
    ) -> Self {
        Self {
            engine,
            task_id,
            payload: payload.into(),
            confidence: confidence.clamp(0.0, 1.0),
            latency_ms,
            status: ResultStatus::Ok,
            attempt: 0,
        }
    }

    /// A degraded result (timeout or partial failure), flagged low-confidence.
    pub fn degraded(
        engine: EngineKind,
        task_id: Uuid,
        payload: impl Into<String>,
        confidence: f32,
        latency_ms: u64,
    ) -> Self {
        Self {
            engine,
            task_id,
            payload: payload.into(),
            confidence: confidence.clamp(0.0, 1.0),
            latency_ms,
            status: ResultStatus::Degraded,
            attempt: 0,
        }
    }

    /// A marker for an engine that never answered.
    pub fn missing(engine: EngineKind, task_id: Uuid, latency_ms: u64) -> Self {
        Self {
            engine,
            task_id,
            payload: String::new(),
            confidence: 0.0,
            latency_ms,
            status: ResultStatus::Missing,
            attempt: 0,
        }
    }

    /// Whether this result carries a usable payload.
    pub fn is_present(&self) -> bool {
        self.status != ResultStatus::Missing
    }
}

/// A unit of work submitted to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: Uuid,
    /// Opaque request payload handed to the engines.
    pub payload: String,
    /// Scheduling priority; higher runs first, FIFO within a priority.
    pub priority: u8,
    /// Strategy resolved once at intake.
    pub strategy: Strategy,
    /// Overall deadline in milliseconds from dispatch.
    pub deadline_ms: u64,
    /// Current position in the state machine.
    pub status: TaskStatus,
    /// UTC creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Worker-death requeue counter (bounded by the pool's retry limit).
    #[serde(default)]
    pub attempts: u32,
    /// Per-engine sub-results; at most one in-flight result per engine.
    #[serde(default)]
    pub results: HashMap<EngineKind, EngineResult>,
    /// Merged output, present once the task reaches `done`.
    #[serde(default)]
    pub merged: Option<String>,
}

impl Task {
    /// Create a queued task from validated intake fields.
    pub fn new(
        payload: impl Into<String>,
        priority: u8,
        strategy: Strategy,
        deadline_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: payload.into(),
            priority,
            strategy,
            deadline_ms,
            status: TaskStatus::Queued,
            created_at: Utc::now(),
            attempts: 0,
            results: HashMap::new(),
            merged: None,
        }
    }

    /// Record an engine result, last-write-wins keyed by attempt.
    ///
    /// A duplicate result for the same engine only replaces the stored one
    /// when its attempt counter is greater than or equal to the existing
    /// attempt.
    pub fn record_result(&mut self, result: EngineResult) {
        match self.results.get(&result.engine) {
            Some(existing) if existing.attempt > result.attempt => {}
            _ => {
                self.results.insert(result.engine, result);
            }
        }
    }
}

/// An intake request as accepted by the external surface.
///
/// Only `payload` is required; priority, strategy, and deadline fall back to
/// coordinator defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRequest {
    /// Opaque request payload.
    pub payload: String,
    /// Scheduling priority, defaults to the coordinator's configured value.
    #[serde(default)]
    pub priority: Option<u8>,
    /// Strategy override; defaults to `collaborative`.
    #[serde(default)]
    pub strategy: Option<Strategy>,
    /// Overall deadline override in milliseconds.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
}

impl IntakeRequest {
    /// Synchronous intake validation; malformed requests are never enqueued.
    pub fn validate(&self) -> TriadResult<()> {
        if self.payload.trim().is_empty() {
            return Err(TriadError::Validation("payload must not be empty".into()));
        }
        if let Some(0) = self.deadline_ms {
            return Err(TriadError::Validation(
                "deadline_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("summarize Q3 costs", 5, Strategy::Collaborative, 500);
        assert_eq!(task.status, TaskStatus::Queued);
        assert_eq!(task.priority, 5);
        assert!(task.results.is_empty());
        assert!(task.merged.is_none());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!TaskStatus::Queued.is_terminal());
        assert!(!TaskStatus::Merging.is_terminal());
        assert!(TaskStatus::Done.is_terminal());
        assert!(TaskStatus::TimedOut.is_terminal());
        assert!(TaskStatus::Failed {
            code: FailureCode::PartialEngineFailure
        }
        .is_terminal());
    }

    #[test]
    fn test_record_result_last_write_wins() {
        let mut task = Task::new("x", 0, Strategy::FastPath, 500);
        let id = task.id;

        let mut first = EngineResult::ok(EngineKind::Parallel, id, "attempt-1", 0.9, 10);
        first.attempt = 1;
        task.record_result(first);

        // Same attempt replaces (last write wins).
        let mut dup = EngineResult::ok(EngineKind::Parallel, id, "attempt-1b", 0.8, 12);
        dup.attempt = 1;
        task.record_result(dup);
        assert_eq!(task.results[&EngineKind::Parallel].payload, "attempt-1b");

        // An older attempt never overwrites a newer one.
        let stale = EngineResult::ok(EngineKind::Parallel, id, "attempt-0", 0.99, 5);
        task.record_result(stale);
        assert_eq!(task.results[&EngineKind::Parallel].payload, "attempt-1b");

        // At most one result per (task, engine).
        assert_eq!(task.results.len(), 1);
    }

    #[test]
    fn test_confidence_is_clamped() {
        let r = EngineResult::ok(EngineKind::Memory, Uuid::new_v4(), "m", 1.7, 3);
        assert_eq!(r.confidence, 1.0);
        let r = EngineResult::degraded(EngineKind::Memory, Uuid::new_v4(), "m", -0.2, 3);
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn test_intake_validation() {
        let ok = IntakeRequest {
            payload: "do the thing".into(),
            priority: None,
            strategy: None,
            deadline_ms: Some(500),
        };
        assert!(ok.validate().is_ok());

        let empty = IntakeRequest {
            payload: "   ".into(),
            priority: None,
            strategy: None,
            deadline_ms: None,
        };
        assert!(matches!(
            empty.validate(),
            Err(TriadError::Validation(_))
        ));

        let zero_deadline = IntakeRequest {
            payload: "x".into(),
            priority: None,
            strategy: None,
            deadline_ms: Some(0),
        };
        assert!(zero_deadline.validate().is_err());
    }

    #[test]
    fn test_task_status_serialization() {
        let status = TaskStatus::Failed {
            code: FailureCode::MaxRetriesExceeded,
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("max_retries_exceeded"));
        let parsed: TaskStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, status);
    }

    #[test]
    fn test_strategy_default_and_display() {
        assert_eq!(Strategy::default(), Strategy::Collaborative);
        assert_eq!(Strategy::FastPath.to_string(), "fast_path");
        assert_eq!(EngineKind::Creative.to_string(), "creative");
    }

    #[test]
    fn test_task_roundtrip_with_results() {
        let mut task = Task::new("merge me", 1, Strategy::Collaborative, 500);
        let id = task.id;
        task.record_result(EngineResult::ok(EngineKind::Memory, id, "hit", 0.8, 50));
        task.record_result(EngineResult::missing(EngineKind::Creative, id, 500));

        let json = serde_json::to_string(&task).unwrap();
        let parsed: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[&EngineKind::Creative].status, ResultStatus::Missing);
    }
}
