use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use triad_core::{StatusConfig, StatusEvent, SubscriptionFilter};

/// Per-subscriber bounded queue.
///
/// `dropped` counts events lost to overflow since the last gap marker was
/// handed out; the receive side converts it into a single gap event before
/// draining the surviving buffer.
struct SubscriberQueue {
    buf: VecDeque<StatusEvent>,
    dropped: usize,
    closed: bool,
}

struct SubscriberState {
    filter: SubscriptionFilter,
    queue: Mutex<SubscriberQueue>,
    notify: Notify,
}

impl SubscriberState {
    /// Enqueue an event, dropping the oldest buffered event on overflow.
    /// The connection is never torn down for lagging.
    fn push(&self, event: StatusEvent, capacity: usize) {
        {
            let mut q = self.queue.lock();
            if q.closed {
                return;
            }
            while q.buf.len() >= capacity.max(1) {
                q.buf.pop_front();
                q.dropped += 1;
            }
            q.buf.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        self.queue.lock().closed = true;
        self.notify.notify_one();
    }
}

/// Publish side of the status stream.
///
/// Cheap to share (`Arc`); every state transition in the coordinator, pool,
/// and engines flows through [`publish`](Self::publish).
pub struct StatusBroadcaster {
    replay: Mutex<VecDeque<StatusEvent>>,
    subscribers: Mutex<HashMap<Uuid, Arc<SubscriberState>>>,
    replay_capacity: usize,
    subscriber_capacity: usize,
}

impl StatusBroadcaster {
    /// Create a broadcaster with the given ring and per-subscriber capacities.
    pub fn new(config: &StatusConfig) -> Arc<Self> {
        Arc::new(Self {
            replay: Mutex::new(VecDeque::with_capacity(config.replay_capacity)),
            subscribers: Mutex::new(HashMap::new()),
            replay_capacity: config.replay_capacity.max(1),
            subscriber_capacity: config.subscriber_capacity.max(1),
        })
    }

    /// Publish an event to the replay ring and all matching subscribers.
    pub fn publish(&self, event: StatusEvent) {
        {
            let mut replay = self.replay.lock();
            while replay.len() >= self.replay_capacity {
                replay.pop_front();
            }
            replay.push_back(event.clone());
        }

        // Snapshot the subscriber set so delivery never holds the map lock.
        let targets: Vec<Arc<SubscriberState>> =
            self.subscribers.lock().values().cloned().collect();

        for sub in targets {
            if sub.filter.matches(&event) {
                sub.push(event.clone(), self.subscriber_capacity);
            }
        }
    }

    /// Subscribe with a filter; the replay ring is delivered before live events.
    pub fn subscribe(self: &Arc<Self>, filter: SubscriptionFilter) -> Subscription {
        let id = Uuid::new_v4();

        let mut buf = VecDeque::new();
        {
            let replay = self.replay.lock();
            for event in replay.iter() {
                if filter.matches(event) {
                    buf.push_back(event.clone());
                }
            }
        }

        let state = Arc::new(SubscriberState {
            filter,
            queue: Mutex::new(SubscriberQueue {
                buf,
                dropped: 0,
                closed: false,
            }),
            notify: Notify::new(),
        });

        self.subscribers.lock().insert(id, state.clone());
        tracing::debug!(subscriber_id = %id, "Subscriber added");

        Subscription {
            id,
            state,
            broadcaster: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber and wake its pending receive with end-of-stream.
    pub fn unsubscribe(&self, id: Uuid) {
        if let Some(state) = self.subscribers.lock().remove(&id) {
            state.close();
            tracing::debug!(subscriber_id = %id, "Subscriber removed");
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    /// Number of events currently held in the replay ring.
    pub fn replay_len(&self) -> usize {
        self.replay.lock().len()
    }
}

/// One observer's end of the status stream.
///
/// Dropping the subscription unsubscribes it from the broadcaster.
pub struct Subscription {
    id: Uuid,
    state: Arc<SubscriberState>,
    broadcaster: Weak<StatusBroadcaster>,
}

impl Subscription {
    /// Receive the next event, waiting if the queue is empty.
    ///
    /// Returns `None` once the subscription is closed and drained. If events
    /// were lost to overflow, a single gap marker is yielded before the
    /// surviving buffered events.
    pub async fn recv(&mut self) -> Option<StatusEvent> {
        loop {
            let notified = self.state.notify.notified();
            {
                let mut q = self.state.queue.lock();
                if q.dropped > 0 {
                    let dropped = std::mem::take(&mut q.dropped);
                    return Some(StatusEvent::gap(dropped));
                }
                if let Some(event) = q.buf.pop_front() {
                    return Some(event);
                }
                if q.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Receive without waiting; `None` when the queue is currently empty.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        let mut q = self.state.queue.lock();
        if q.dropped > 0 {
            let dropped = std::mem::take(&mut q.dropped);
            return Some(StatusEvent::gap(dropped));
        }
        q.buf.pop_front()
    }

    /// This subscription's identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(broadcaster) = self.broadcaster.upgrade() {
            broadcaster.unsubscribe(self.id);
        }
    }
}
