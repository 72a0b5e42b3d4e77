use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What kind of subject a status event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// A task state transition.
    Task,
    /// An engine-level event within a task.
    Engine,
    /// A worker lifecycle event.
    Worker,
}

/// A single state-transition event published to live observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
    /// Task, engine, or worker.
    pub subject: SubjectKind,
    /// Identifier of the subject (task id, engine name, worker id).
    pub subject_id: String,
    /// Machine-readable event type, e.g. `task.done` or `worker.dead`.
    pub event_type: String,
    /// Event-specific payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl StatusEvent {
    /// An event about a task.
    pub fn task(task_id: Uuid, event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            timestamp: Utc::now(),
            subject: SubjectKind::Task,
            subject_id: task_id.to_string(),
            event_type: event_type.into(),
            payload,
        }
    }

    /// An event about one engine's work on a task.
    pub fn engine(
        engine: impl std::fmt::Display,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            subject: SubjectKind::Engine,
            subject_id: engine.to_string(),
            event_type: event_type.into(),
            payload,
        }
    }

    /// An event about a worker lifecycle transition.
    pub fn worker(
        worker_id: Uuid,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            subject: SubjectKind::Worker,
            subject_id: worker_id.to_string(),
            event_type: event_type.into(),
            payload,
        }
    }

    /// The marker substituted for events dropped from a slow subscriber's queue.
    pub fn gap(dropped: usize) -> Self {
        Self {
            timestamp: Utc::now(),
            subject: SubjectKind::Task,
            subject_id: String::new(),
            event_type: "stream.gap".into(),
            payload: serde_json::json!({ "dropped": dropped }),
        }
    }

    /// Whether this event is a gap marker.
    pub fn is_gap(&self) -> bool {
        self.event_type == "stream.gap"
    }
}

/// A subscriber-supplied filter; empty fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionFilter {
    /// Subject kinds to receive; empty means all.
    #[serde(default)]
    pub subject_kinds: Vec<SubjectKind>,
    /// Restrict task events to these ids; empty means all tasks.
    #[serde(default)]
    pub task_ids: Vec<Uuid>,
}

impl SubscriptionFilter {
    /// Whether the given event passes this filter.
    ///
    /// Gap markers always pass so a lagging subscriber learns it lost events.
    pub fn matches(&self, event: &StatusEvent) -> bool {
        if event.is_gap() {
            return true;
        }
        if !self.subject_kinds.is_empty() && !self.subject_kinds.contains(&event.subject) {
            return false;
        }
        if !self.task_ids.is_empty() && event.subject == SubjectKind::Task {
            return self
                .task_ids
                .iter()
                .any(|id| id.to_string() == event.subject_id);
        }
        true
    }
}
