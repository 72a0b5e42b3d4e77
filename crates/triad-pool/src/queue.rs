use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;

use triad_core::{EngineResult, Task, TriadResult};

/// A queued unit of work: the task, its retry counter, the caller's reply
/// channel, and the task's cancellation token.
pub struct QueueEntry {
    /// The task to execute.
    pub task: Task,
    /// Worker-death requeues so far.
    pub attempts: u32,
    /// Completion channel back to the submitter.
    pub reply: oneshot::Sender<TriadResult<EngineResult>>,
    /// Cooperative cancellation, checked by workers between steps.
    pub cancel: CancellationToken,
}

struct Prioritized {
    priority: u8,
    seq: u64,
    entry: QueueEntry,
}

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Prioritized {}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Prioritized {
    // Max-heap: highest priority first, lowest sequence (oldest) among ties.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Priority task queue: higher priority pops first, FIFO within a priority.
///
/// Enqueue and dequeue are atomic; a popped entry belongs to exactly one
/// worker.
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<Prioritized>>,
    seq: AtomicU64,
    notify: Notify,
}

impl TaskQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            seq: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }

    /// Enqueue an entry and wake one waiting worker.
    pub fn push(&self, entry: QueueEntry) {
        let prioritized = Prioritized {
            priority: entry.task.priority,
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            entry,
        };
        self.heap.lock().push(prioritized);
        self.notify.notify_one();
    }

    /// Dequeue the highest-priority entry, waiting until one is available.
    pub async fn pop(&self) -> QueueEntry {
        loop {
            let notified = self.notify.notified();
            if let Some(p) = self.heap.lock().pop() {
                return p.entry;
            }
            notified.await;
        }
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<QueueEntry> {
        self.heap.lock().pop().map(|p| p.entry)
    }

    /// Current queue depth.
    pub fn depth(&self) -> usize {
        self.heap.lock().len()
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use triad_core::Strategy;

    fn entry(payload: &str, priority: u8) -> QueueEntry {
        let (reply, _rx) = oneshot::channel();
        QueueEntry {
            task: Task::new(payload, priority, Strategy::FastPath, 1_000),
            attempts: 0,
            reply,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_priority_ordering() {
        let queue = TaskQueue::new();
        queue.push(entry("low", 1));
        queue.push(entry("high", 9));
        queue.push(entry("mid", 5));

        assert_eq!(queue.pop().await.task.payload, "high");
        assert_eq!(queue.pop().await.task.payload, "mid");
        assert_eq!(queue.pop().await.task.payload, "low");
    }

    #[tokio::test]
    async fn test_fifo_within_priority() {
        let queue = TaskQueue::new();
        queue.push(entry("first", 5));
        queue.push(entry("second", 5));
        queue.push(entry("third", 5));

        assert_eq!(queue.pop().await.task.payload, "first");
        assert_eq!(queue.pop().await.task.payload, "second");
        assert_eq!(queue.pop().await.task.payload, "third");
    }

    #[tokio::test]
    async fn test_depth_and_try_pop() {
        let queue = TaskQueue::new();
        assert_eq!(queue.depth(), 0);
        assert!(queue.try_pop().is_none());

        queue.push(entry("a", 1));
        assert_eq!(queue.depth(), 1);
        assert!(queue.try_pop().is_some());
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = std::sync::Arc::new(TaskQueue::new());
        let q = queue.clone();
        let handle = tokio::spawn(async move { q.pop().await.task.payload });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        queue.push(entry("late", 1));

        let payload = tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payload, "late");
    }

    #[tokio::test]
    async fn test_single_ownership_dequeue() {
        let queue = std::sync::Arc::new(TaskQueue::new());
        for n in 0..50 {
            queue.push(entry(&format!("t{n}"), 1));
        }

        let mut handles = Vec::new();
        for _ in 0..5 {
            let q = queue.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(e) = q.try_pop() {
                    seen.push(e.task.id);
                }
                seen
            }));
        }

        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort();
        let before = all.len();
        all.dedup();
        // No task claimed by two consumers.
        assert_eq!(before, all.len());
        assert_eq!(before, 50);
    }
}
