//! Worker pool — the parallel engine of the Triad coordination core.
//!
//! Auto-scaling executors pulling from a priority task queue. Execution is
//! at-least-once: a worker that misses heartbeats beyond the grace period is
//! declared dead and its task is requeued under a bounded retry counter, so
//! the injected execution handler must be idempotent or duplicate-tolerant.
//!
//! # Main types
//!
//! - [`WorkerPool`] — `submit` API, worker lifecycle, background scaler and
//!   heartbeat monitor.
//! - [`ExecutionHandler`] — the injected collaborator actually doing the work.
//! - [`TaskQueue`] — priority ordering with FIFO tie-break.
//! - [`WorkerRegistry`] — atomic worker-state transitions and liveness.

/// Pool, worker loop, scaler, and heartbeat monitor.
pub mod pool;
/// Priority queue with FIFO tie-break.
pub mod queue;
/// Worker records and the shared registry.
pub mod registry;

pub use pool::{ExecutionHandler, WorkerPool};
pub use queue::{QueueEntry, TaskQueue};
pub use registry::{WorkerRegistry, WorkerRecord, WorkerState};
